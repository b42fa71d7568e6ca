#![cfg(feature = "dev")]
use approx::assert_abs_diff_eq;
use fastDensity::internals::evaluation::separation::flagged_observations;
use fastDensity::internals::evaluation::sweep::acceptance_check;
use fastDensity::prelude::*;

struct Lcg(u64);

impl Lcg {
    fn next(&mut self) -> f64 {
        self.0 = self
            .0
            .wrapping_mul(6_364_136_223_846_793_005)
            .wrapping_add(1_442_695_040_888_963_407);
        (self.0 >> 11) as f64 / (1u64 << 53) as f64
    }
}

/// Two groups on a 200 x 100 plot; death risk rises with own-group crowding.
fn stand(n: usize, seed: u64) -> Census<f64> {
    let mut rng = Lcg(seed);
    let mut xy: Vec<(f64, f64)> = Vec::with_capacity(n);
    for _ in 0..n {
        xy.push((rng.next() * 200.0, rng.next() * 100.0));
    }
    let groups: Vec<&str> = (0..n).map(|i| if i % 2 == 0 { "oak" } else { "ash" }).collect();

    let individuals = (0..n)
        .map(|i| {
            let crowding = (0..n)
                .filter(|&j| j != i && groups[j] == groups[i])
                .filter(|&j| {
                    let (dx, dy) = (xy[j].0 - xy[i].0, xy[j].1 - xy[i].1);
                    dx * dx + dy * dy <= 100.0
                })
                .count() as f64;
            let size = 2.0 + rng.next() * 40.0;
            let interval = 4.0 + rng.next() * 2.0;
            let eta = -4.0 + 0.6 * crowding - 0.02 * size + interval.ln();
            let p = 1.0 - (-eta.exp()).exp();
            let outcome = rng.next() < p;
            Individual::new(format!("s{i}"), groups[i], xy[i].0, xy[i].1, size, outcome, interval)
        })
        .collect();
    Census::new(individuals).unwrap()
}

fn pipeline(parallel: bool) -> DensityPipeline<f64> {
    Density::new()
        .radius(15.0)
        .edge_margin(5.0)
        .window(PlotWindow::new(0.0, 200.0, 0.0, 100.0))
        .decay_shapes(vec![2.0, 8.0])
        .smooth_ceiling(5)
        .parallel(parallel)
        .build()
        .unwrap()
}

// ============================================================================
// Parallel vs Sequential
// ============================================================================

#[test]
fn test_parallel_features_match_sequential() {
    let census = stand(600, 42);
    let parallel = pipeline(true).features(&census).unwrap();
    let sequential = pipeline(false).features(&census).unwrap();
    assert_eq!(parallel, sequential);
}

#[test]
fn test_parallel_sweep_matches_sequential() {
    let census = stand(400, 9);
    let glm = PenalizedGlm::default();

    let par = pipeline(true).run(&census, &glm).unwrap();
    let seq = pipeline(false).run(&census, &glm).unwrap();

    assert_eq!(par.sweep.summary, seq.sweep.summary);
    assert_eq!(par.sweep.rejected, seq.sweep.rejected);
    assert_eq!(par.sweep.selection, seq.sweep.selection);
    assert_eq!(par.sweep.accepted.len(), seq.sweep.accepted.len());
    for (a, b) in par.sweep.accepted.iter().zip(&seq.sweep.accepted) {
        assert_eq!(a.key, b.key);
        assert_eq!(a.log_likelihood, b.log_likelihood);
    }
}

// ============================================================================
// Built-in Backend
// ============================================================================

#[test]
fn test_glm_end_to_end() {
    let census = stand(500, 3);
    let report = pipeline(true).run(&census, &PenalizedGlm::default()).unwrap();
    let sweep = &report.sweep;

    // 3 shapes -> 3 x 3 x 2 combinations per group.
    assert_eq!(sweep.plan.combinations().len(), 18);
    assert_eq!(sweep.summary.total, 36);
    assert_eq!(
        sweep.summary.accepted + sweep.summary.rejected_total(),
        sweep.summary.total
    );
    assert!(sweep.summary.accepted > 0);

    for run in &sweep.accepted {
        assert!(run.log_likelihood.is_finite() && run.log_likelihood < 0.0);
        assert!(run.result.converged);
        assert!(run.result.has_covariance());
        assert!(run.formula.ends_with("offset(log(interval))"));
        assert!(run.result.fitted.iter().all(|&p| p > 0.0 && p < 1.0));
        assert_eq!(run.result.fitted.len(), run.n_obs);
    }

    for best in &sweep.selection.global_optima {
        let max = sweep
            .selection
            .global_records
            .iter()
            .filter(|r| r.basis == best.basis)
            .map(|r| r.sum_log_likelihood)
            .fold(f64::NEG_INFINITY, f64::max);
        assert_eq!(best.sum_log_likelihood, max);
    }

    let json = serde_json::to_value(&report).unwrap();
    assert!(json["features"]["rows"].is_array());
    assert!(json["sweep"]["summary"]["accepted"].is_u64());
}

fn simulated(n: usize, seed: u64) -> (ModelSpec, FitData) {
    let mut rng = Lcg(seed);
    let mut covariates = vec![Vec::with_capacity(n), Vec::with_capacity(n), Vec::with_capacity(n)];
    let mut response = Vec::with_capacity(n);
    let mut exposure = Vec::with_capacity(n);
    for _ in 0..n {
        let (a, b, c) = (rng.next(), rng.next(), rng.next());
        let t = 4.0 + rng.next() * 2.0;
        let eta = -2.5 + 1.5 * a - 0.5 * b + t.ln();
        let p = 1.0 - (-eta.exp()).exp();
        response.push(if rng.next() < p { 1.0 } else { 0.0 });
        covariates[0].push(a);
        covariates[1].push(b);
        covariates[2].push(c);
        exposure.push(t);
    }
    let spec = ModelSpec {
        group: "sim".to_string(),
        response: "outcome".to_string(),
        smooths: ["a", "b", "c"]
            .iter()
            .map(|name| SmoothTerm {
                name: name.to_string(),
                k: 5,
            })
            .collect(),
        exposure: "interval".to_string(),
    };
    (
        spec,
        FitData {
            response,
            covariates,
            exposure,
        },
    )
}

#[test]
fn test_glm_fits_simulated_data() {
    let (spec, data) = simulated(800, 17);
    let fit = PenalizedGlm::default()
        .fit(&spec, &data, &FitControl::default())
        .unwrap();

    assert!(fit.converged);
    assert!(fit.has_covariance());
    // Intercept plus (1 linear + 3 knots) per smooth.
    assert_eq!(fit.coefficients.len(), 13);
    assert_eq!(fit.leverage.len(), 800);

    // Leverages sum to the effective degrees of freedom.
    let edf: f64 = fit.leverage.iter().sum();
    assert!(edf > 1.0 && edf <= 13.0 + 1e-6);

    // Fitted probabilities track the observed rate.
    let observed = data.response.iter().sum::<f64>() / 800.0;
    let mean_fitted = fit.fitted.iter().sum::<f64>() / 800.0;
    assert_abs_diff_eq!(observed, mean_fitted, epsilon = 0.02);
}

#[test]
fn test_glm_reports_backend_failures() {
    let glm = PenalizedGlm::default();
    let control = FitControl::default();

    let (spec, mut data) = simulated(200, 5);
    data.covariates[1] = vec![3.0; 200];
    assert_eq!(
        glm.fit(&spec, &data, &control).unwrap_err(),
        FitError::RankDeficient
    );

    let (spec, data) = simulated(6, 5);
    assert!(matches!(
        glm.fit(&spec, &data, &control),
        Err(FitError::InsufficientData { n_obs: 6, .. })
    ));

    let (spec, mut data) = simulated(50, 5);
    data.exposure[0] = 0.0;
    assert!(matches!(
        glm.fit(&spec, &data, &control),
        Err(FitError::NonFiniteInput(_))
    ));

    let (spec, data) = simulated(50, 5);
    let expired = FitControl {
        deadline: Some(std::time::Instant::now()),
    };
    assert_eq!(glm.fit(&spec, &data, &expired).unwrap_err(), FitError::TimedOut);
}

#[test]
fn test_glm_separated_outcome_is_rejected_as_separation() {
    // Every small stem survives and every large stem dies.
    let n = 60;
    let size: Vec<f64> = (0..n).map(|i| if i < n / 2 { 10.0 } else { 40.0 }).collect();
    let response: Vec<f64> = size.iter().map(|&s| if s >= 30.0 { 1.0 } else { 0.0 }).collect();
    let spec = ModelSpec {
        group: "oak".to_string(),
        response: "outcome".to_string(),
        smooths: vec![SmoothTerm {
            name: "size".to_string(),
            k: 5,
        }],
        exposure: "interval".to_string(),
    };
    let data = FitData {
        response,
        covariates: vec![size],
        exposure: vec![1.0; n],
    };

    let outcome = PenalizedGlm::default().fit(&spec, &data, &FitControl::default());
    let fit = outcome.clone().unwrap();
    assert!(fit.converged);
    assert!(fit.log_likelihood.is_finite());
    assert_eq!(flagged_observations(&fit.fitted).len(), n);

    assert_eq!(
        acceptance_check(outcome, false).unwrap_err(),
        RejectReason::Separation
    );
}

#[test]
fn test_glm_from_config() {
    let mut config = PipelineConfig::default();
    config.ridge_penalty = 0.5;
    config.max_iterations = 7;
    let glm = PenalizedGlm::from_config(&config);
    assert_eq!(glm.ridge_penalty, 0.5);
    assert_eq!(glm.max_iterations, 7);
}
