#![cfg(feature = "dev")]
use fastDensity::internals::evaluation::separation::{detect_separation, flagged_observations};
use fastDensity::internals::evaluation::sweep::{
    acceptance_check, build_run, run_sweep, smooth_dimension, AcceptedRun, RunStore,
    SweepOptions, SweepPlan,
};
use fastDensity::prelude::*;
use ndarray::Array2;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread;
use std::time::Duration;

// ============================================================================
// Fixtures
// ============================================================================

fn census() -> Census<f64> {
    let rows = [
        ("o1", "oak", 10.0, 10.0, 12.0, true),
        ("o2", "oak", 14.0, 12.0, 30.0, false),
        ("o3", "oak", 40.0, 40.0, 8.0, false),
        ("o4", "oak", 44.0, 41.0, 21.0, true),
        ("p1", "pine", 12.0, 15.0, 5.0, true),
        ("p2", "pine", 42.0, 45.0, 15.0, false),
        ("p3", "pine", 70.0, 70.0, 25.0, false),
        ("a1", "ash", 72.0, 73.0, 9.0, false),
        ("a2", "ash", 20.0, 80.0, 11.0, false),
        ("e1", "elm", 22.0, 83.0, 14.0, true),
        ("e2", "elm", 80.0, 20.0, 16.0, true),
    ];
    Census::new(
        rows.iter()
            .map(|&(id, group, x, y, size, outcome)| {
                Individual::new(id, group, x, y, size, outcome, 5.0)
            })
            .collect(),
    )
    .unwrap()
}

fn builder() -> DensityBuilder<f64> {
    Density::new()
        .radius(10.0)
        .edge_margin(0.0)
        .window(PlotWindow::new(0.0, 100.0, 0.0, 100.0))
        .decay_shapes(vec![5.0])
}

fn table_and_pipeline(parallel: bool) -> (FeatureTable<f64>, DensityPipeline<f64>) {
    let pipeline = builder().parallel(parallel).build().unwrap();
    let table = pipeline.features(&census()).unwrap();
    (table, pipeline)
}

fn good_fit(data: &FitData, log_likelihood: f64) -> FitResult {
    let n = data.n_obs();
    FitResult {
        converged: true,
        log_likelihood,
        fitted: vec![0.5; n],
        leverage: vec![0.2; n],
        coefficients: vec![0.0; 3],
        iterations: 4,
        covariance: Some(Array2::eye(3)),
    }
}

/// Label of the own-group and total decay shapes encoded in the smooth names.
fn shape_labels(spec: &ModelSpec) -> (String, String) {
    let tail = |name: &str| name.rsplit('.').next().unwrap_or_default().to_string();
    (tail(&spec.smooths[1].name), tail(&spec.smooths[2].name))
}

fn is_count(spec: &ModelSpec) -> bool {
    spec.smooths[1].name.contains(".count.")
}

/// Scores one combination per group above the rest.
fn scripted(spec: &ModelSpec, data: &FitData, _: &FitControl) -> Result<FitResult, FitError> {
    let (own, total) = shape_labels(spec);
    let ll = match (spec.group.as_str(), own.as_str(), total.as_str(), is_count(spec)) {
        ("oak", "exp_5", "none", true) => -1.0,
        ("pine", "exp_5", "none", true) => -5.0,
        ("pine", "none", "exp_5", true) => -2.0,
        _ => -10.0,
    };
    Ok(good_fit(data, ll))
}

// ============================================================================
// Acceptance Checks and State Machine
// ============================================================================

fn sample_data(n: usize) -> FitData {
    FitData {
        response: vec![0.0; n],
        covariates: vec![vec![0.0; n]; 3],
        exposure: vec![1.0; n],
    }
}

#[test]
fn test_acceptance_precedence() {
    let data = sample_data(20);

    let accepted = acceptance_check(Ok(good_fit(&data, -3.0)), false).unwrap();
    assert_eq!(accepted.log_likelihood, -3.0);

    assert_eq!(
        acceptance_check(Err(FitError::RankDeficient), false).unwrap_err(),
        RejectReason::FitFailed
    );
    assert_eq!(
        acceptance_check(Ok(good_fit(&data, -3.0)), true).unwrap_err(),
        RejectReason::FitFailed
    );
    assert_eq!(
        acceptance_check(Ok(good_fit(&data, f64::NEG_INFINITY)), false).unwrap_err(),
        RejectReason::FitFailed
    );

    // Every later check fails too; the earliest one names the rejection.
    let mut bad = good_fit(&data, -3.0);
    bad.converged = false;
    bad.fitted[0] = 1.0;
    bad.leverage[0] = 0.9;
    bad.covariance = None;
    assert_eq!(
        acceptance_check(Ok(bad.clone()), false).unwrap_err(),
        RejectReason::NoConvergence
    );

    bad.converged = true;
    assert_eq!(
        acceptance_check(Ok(bad.clone()), false).unwrap_err(),
        RejectReason::Separation
    );

    bad.fitted[0] = 0.5;
    assert_eq!(
        acceptance_check(Ok(bad), false).unwrap_err(),
        RejectReason::NoCovariance
    );
}

#[test]
fn test_run_state_transitions() {
    let fitting = RunState::Pending.begin();
    assert_eq!(fitting, RunState::Fitting);
    assert!(!fitting.is_terminal());

    assert_eq!(fitting.complete(Ok(())), RunState::Accepted);
    let rejected = fitting.complete(Err(RejectReason::Separation));
    assert_eq!(rejected, RunState::Rejected(RejectReason::Separation));
    assert!(rejected.is_terminal());

    // Terminal and pending states ignore out-of-order transitions.
    assert_eq!(RunState::Accepted.begin(), RunState::Accepted);
    assert_eq!(RunState::Pending.complete(Ok(())), RunState::Pending);
    assert_eq!(
        rejected.complete(Ok(())),
        RunState::Rejected(RejectReason::Separation)
    );
}

#[test]
fn test_reject_reason_labels() {
    assert_eq!(RejectReason::FitFailed.to_string(), "fit-failed");
    assert_eq!(RejectReason::NoConvergence.to_string(), "no-convergence");
    assert_eq!(
        serde_json::to_string(&RejectReason::NoCovariance).unwrap(),
        "\"no-covariance\""
    );
}

#[test]
fn test_smooth_dimension_adapts_to_cardinality() {
    assert_eq!(smooth_dimension(3, 10), 8);
    assert_eq!(smooth_dimension(9, 10), 8);
    assert_eq!(smooth_dimension(10, 10), 10);
    assert_eq!(smooth_dimension(500, 10), 10);
    assert_eq!(smooth_dimension(1, 3), 1);
}

#[test]
fn test_separation_detector() {
    let mut fitted = vec![0.4; 20];
    let mut leverage: Vec<f64> = (0..20).map(|i| 0.01 * i as f64).collect();
    assert!(flagged_observations(&fitted).is_empty());
    assert!(!detect_separation(&fitted, &leverage, 0.10));

    // Flagged at a low-leverage position: outside the top 2 of 20.
    fitted[0] = 0.0;
    assert_eq!(flagged_observations(&fitted), vec![0]);
    assert!(!detect_separation(&fitted, &leverage, 0.10));

    // Flagged at the second-highest leverage.
    fitted[18] = 1.0;
    assert!(detect_separation(&fitted, &leverage, 0.10));

    // Non-finite leverage ranks last.
    leverage[18] = f64::NAN;
    assert!(!detect_separation(&fitted, &leverage, 0.10));
}

#[test]
fn test_separation_top_set_rounds_up() {
    // 5 observations at 10% still inspect one observation.
    let fitted = vec![0.5, 0.5, 1.0, 0.5, 0.5];
    let leverage = vec![0.1, 0.2, 0.9, 0.3, 0.4];
    assert!(detect_separation(&fitted, &leverage, 0.10));
}

// ============================================================================
// Plan and Run Construction
// ============================================================================

#[test]
fn test_plan_enumeration() {
    let (table, pipeline) = table_and_pipeline(false);
    let plan = pipeline.plan(&table);
    assert_eq!(plan.groups(), ["ash", "elm", "oak", "pine"]);
    assert_eq!(plan.combinations().len(), 8);
    assert_eq!(plan.len(), 32);

    let first = &plan.runs()[0];
    assert_eq!(
        (first.group.as_str(), first.own_shape, first.total_shape, first.basis),
        ("ash", 0, 0, Basis::Count)
    );
    let second = &plan.runs()[1];
    assert_eq!(second.basis, Basis::Size);

    let focal = ["oak".to_string()];
    let restricted = SweepPlan::new(&table, Some(&focal[..]));
    assert_eq!(restricted.groups(), ["oak"]);
    assert_eq!(restricted.len(), 8);
}

#[test]
fn test_plan_reports_unmatched_focal_groups() {
    let (table, _) = table_and_pipeline(false);
    let allowed = ["pine".to_string(), "birch".to_string(), "oak".to_string()];
    let plan = SweepPlan::new(&table, Some(&allowed[..]));
    assert_eq!(plan.groups(), ["oak", "pine"]);
    assert_eq!(plan.unmatched_groups(), ["birch"]);
    assert!(SweepPlan::new(&table, None).unmatched_groups().is_empty());
}

#[test]
fn test_build_run_formula_and_data() {
    let (table, pipeline) = table_and_pipeline(false);
    let plan = pipeline.plan(&table);
    let key = plan
        .runs()
        .iter()
        .find(|k| k.group == "oak" && k.own_shape == 1 && k.total_shape == 0 && k.basis == Basis::Size)
        .unwrap();
    let rows: Vec<usize> = table
        .rows()
        .iter()
        .enumerate()
        .filter(|(_, r)| r.group == "oak")
        .map(|(i, _)| i)
        .collect();

    let (spec, data) = build_run(&table, &rows, key, 10);
    assert_eq!(spec.group, "oak");
    assert_eq!(
        spec.to_string(),
        "outcome ~ s(size, k = 8) + s(own.size.exp_5, k = 8) + s(combined.size.none, k = 8) + offset(log(interval))"
    );
    assert_eq!(data.n_obs(), 4);
    assert_eq!(data.response, vec![1.0, 0.0, 0.0, 1.0]);
    assert_eq!(data.covariates[0], vec![12.0, 30.0, 8.0, 21.0]);
    assert_eq!(data.exposure, vec![5.0; 4]);
}

// ============================================================================
// Sweep Execution
// ============================================================================

#[test]
fn test_all_runs_accepted() {
    let (table, pipeline) = table_and_pipeline(true);
    let report = pipeline.sweep(&table, &scripted);
    assert_eq!(report.summary.total, 32);
    assert_eq!(report.summary.accepted, 32);
    assert_eq!(report.summary.rejected_total(), 0);
    assert_eq!(report.accepted.len(), 32);

    // Ids follow enumeration order.
    for (run, key) in report.accepted.iter().zip(report.plan.runs()) {
        assert_eq!(&run.key, key);
        assert_eq!(run.id, report.plan.runs().iter().position(|k| k == key).unwrap());
    }
}

#[test]
fn test_rejections_are_recorded_with_reasons() {
    let (table, pipeline) = table_and_pipeline(true);
    let fitter = |spec: &ModelSpec, data: &FitData, _: &FitControl| -> Result<FitResult, FitError> {
        let mut result = good_fit(data, -4.0);
        match spec.group.as_str() {
            "ash" => return Err(FitError::InsufficientData { n_obs: 2, n_params: 20 }),
            "elm" => result.converged = false,
            "pine" => result.covariance = None,
            _ => {}
        }
        Ok(result)
    };
    let report = pipeline.sweep(&table, &fitter);

    assert_eq!(report.summary.accepted, 8);
    assert_eq!(report.summary.rejected["fit-failed"], 8);
    assert_eq!(report.summary.rejected["no-convergence"], 8);
    assert_eq!(report.summary.rejected["no-covariance"], 8);
    assert_eq!(report.rejected.len(), 24);
    assert!(report.rejected.iter().all(|r| r.key.group != "oak"));
}

#[test]
fn test_overrunning_fit_is_rejected_as_fit_failed() {
    let pipeline = builder()
        .parallel(false)
        .focal_groups(["oak"])
        .run_timeout(Duration::from_millis(1))
        .build()
        .unwrap();
    let table = pipeline.features(&census()).unwrap();
    let slow = |_: &ModelSpec, data: &FitData, _: &FitControl| -> Result<FitResult, FitError> {
        thread::sleep(Duration::from_millis(15));
        Ok(good_fit(data, -1.0))
    };
    let report = pipeline.sweep(&table, &slow);
    assert_eq!(report.summary.accepted, 0);
    assert_eq!(report.summary.rejected["fit-failed"], 8);
}

#[test]
fn test_backend_sees_deadline() {
    let pipeline = builder()
        .parallel(false)
        .focal_groups(["oak"])
        .run_timeout(Duration::from_secs(60))
        .build()
        .unwrap();
    let table = pipeline.features(&census()).unwrap();
    let fitter = |_: &ModelSpec, data: &FitData, control: &FitControl| -> Result<FitResult, FitError> {
        if control.deadline.is_none() || control.expired() {
            return Err(FitError::TimedOut);
        }
        Ok(good_fit(data, -1.0))
    };
    assert_eq!(pipeline.sweep(&table, &fitter).summary.accepted, 8);
}

#[test]
fn test_unrepresentable_deadline_runs_unbounded() {
    let (table, _) = table_and_pipeline(false);
    let plan = SweepPlan::new(&table, None);
    let options = SweepOptions {
        timeout: Some(Duration::MAX),
        parallel: false,
        ..SweepOptions::default()
    };
    let fitter = |_: &ModelSpec, data: &FitData, control: &FitControl| -> Result<FitResult, FitError> {
        assert!(control.deadline.is_none());
        Ok(good_fit(data, -1.0))
    };
    let store = RunStore::new();
    let summary = run_sweep(&table, &plan, &fitter, &options, &store, &CancelToken::new());
    assert_eq!(summary.accepted, plan.len());
}

#[test]
fn test_cancel_before_start_discards_everything() {
    let (table, pipeline) = table_and_pipeline(true);
    let cancel = CancelToken::new();
    cancel.cancel();
    let report = pipeline.sweep_with_cancel(&table, &scripted, &cancel);
    assert!(report.summary.cancelled);
    assert_eq!(report.summary.discarded, 32);
    assert!(report.accepted.is_empty());
    assert!(report.rejected.is_empty());
}

#[test]
fn test_cancel_mid_sweep_keeps_completed_runs() {
    let (table, pipeline) = table_and_pipeline(false);
    let cancel = CancelToken::new();
    let calls = AtomicUsize::new(0);
    let fitter = |spec: &ModelSpec, data: &FitData, c: &FitControl| -> Result<FitResult, FitError> {
        // The fourth fit is interrupted while in flight.
        if calls.fetch_add(1, Ordering::SeqCst) == 3 {
            cancel.cancel();
        }
        scripted(spec, data, c)
    };
    let report = pipeline.sweep_with_cancel(&table, &fitter, &cancel);

    assert!(report.summary.cancelled);
    assert_eq!(report.summary.accepted, 3);
    assert_eq!(report.summary.discarded, 29);
    assert_eq!(calls.load(Ordering::SeqCst), 4);
    assert_eq!(report.accepted.len(), 3);
}

#[test]
fn test_run_store_first_write_wins() {
    let (table, pipeline) = table_and_pipeline(false);
    let plan = pipeline.plan(&table);
    let key = plan.runs()[0].clone();
    let data = sample_data(3);
    let run = |ll: f64| AcceptedRun {
        id: 0,
        key: key.clone(),
        formula: String::new(),
        smooths: Vec::new(),
        n_obs: 3,
        log_likelihood: ll,
        result: good_fit(&data, ll),
    };

    let store = RunStore::new();
    store.record_accepted(run(-1.0));
    store.record_accepted(run(-2.0));
    assert_eq!(store.accepted_len(), 1);
    assert!(store.is_accepted(&key));

    let (accepted, rejected) = store.into_parts();
    assert_eq!(accepted[0].log_likelihood, -1.0);
    assert!(rejected.is_empty());
}

// ============================================================================
// Selection
// ============================================================================

#[test]
fn test_selection_excludes_groups_without_contrast() {
    let (table, pipeline) = table_and_pipeline(true);
    let selection = pipeline.sweep(&table, &scripted).selection;

    assert_eq!(selection.included, ["oak", "pine"]);
    assert_eq!(selection.excluded["ash"], ExclusionReason::NoPositiveOutcomes);
    assert_eq!(selection.excluded["elm"], ExclusionReason::NoNegativeOutcomes);
    assert!(selection
        .group_records
        .iter()
        .all(|r| matches!(r.group.as_deref(), Some("oak") | Some("pine"))));
    assert!(selection.group_optimum("ash", Basis::Count).is_none());
}

#[test]
fn test_global_and_group_optima() {
    let (table, pipeline) = table_and_pipeline(true);
    let selection = pipeline.sweep(&table, &scripted).selection;

    // Summed over oak and pine: (exp_5, none) scores -1 + -5.
    let best = selection.global_optimum(Basis::Count).unwrap();
    assert_eq!((best.own_label.as_str(), best.total_label.as_str()), ("exp_5", "none"));
    assert_eq!(best.sum_log_likelihood, -6.0);
    assert_eq!(best.runs, 2);
    assert_eq!(best.mean_log_likelihood, -3.0);

    // Size basis is flat: the first combination wins the tie.
    let flat = selection.global_optimum(Basis::Size).unwrap();
    assert_eq!((flat.own_shape, flat.total_shape), (0, 0));
    assert_eq!(flat.sum_log_likelihood, -20.0);

    let pine = selection.group_optimum("pine", Basis::Count).unwrap();
    assert_eq!((pine.own_label.as_str(), pine.total_label.as_str()), ("none", "exp_5"));
    assert_eq!(pine.sum_log_likelihood, -2.0);

    let oak = selection.group_optimum("oak", Basis::Count).unwrap();
    assert_eq!((oak.own_shape, oak.total_shape), (1, 0));

    assert_eq!(selection.global_records.len(), 8);
    assert_eq!(selection.group_records.len(), 16);
    assert_eq!(selection.global_optima.len(), 2);
    assert_eq!(selection.group_optima.len(), 4);
}

#[test]
fn test_incomplete_group_is_excluded() {
    let (table, pipeline) = table_and_pipeline(true);
    let fitter = |spec: &ModelSpec, data: &FitData, c: &FitControl| -> Result<FitResult, FitError> {
        let (own, total) = shape_labels(spec);
        if spec.group == "pine" && own == "exp_5" && total == "exp_5" && !is_count(spec) {
            return Err(FitError::RankDeficient);
        }
        scripted(spec, data, c)
    };
    let selection = pipeline.sweep(&table, &fitter).selection;

    assert_eq!(
        selection.excluded["pine"],
        ExclusionReason::Incomplete {
            accepted: 7,
            expected: 8
        }
    );
    assert_eq!(selection.included, ["oak"]);
    let best = selection.global_optimum(Basis::Count).unwrap();
    assert_eq!(best.sum_log_likelihood, -1.0);
}

#[test]
fn test_selection_is_empty_when_nothing_is_accepted() {
    let (table, pipeline) = table_and_pipeline(true);
    let failing = |_: &ModelSpec, _: &FitData, _: &FitControl| -> Result<FitResult, FitError> {
        Err(FitError::Backend("unavailable".to_string()))
    };
    let report = pipeline.sweep(&table, &failing);
    assert_eq!(report.summary.rejected["fit-failed"], 32);
    assert!(report.selection.included.is_empty());
    assert!(report.selection.global_optima.is_empty());
    assert_eq!(report.selection.excluded.len(), 4);
}

#[test]
fn test_selection_is_deterministic() {
    let (table, pipeline) = table_and_pipeline(true);
    let first = pipeline.sweep(&table, &scripted);
    let second = pipeline.sweep(&table, &scripted);
    assert_eq!(first.selection, second.selection);
    assert_eq!(first.summary, second.summary);
    assert_eq!(first.rejected, second.rejected);
}
