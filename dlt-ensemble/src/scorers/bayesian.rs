use std::collections::BTreeMap;

use dlt_db::models::{Draw, Pool};
use serde_json::json;

use super::{appearance_counts, check_history, normalize_scores, recent_window, sample_confidence, Scorer, ScorerOutput};
use crate::error::ScorerError;
use crate::sampler::sample_sets;

const PRIOR: f64 = 1.0;
const SAMPLED_SETS: usize = 3;

/// Dirichlet-multinomial posterior mean with a flat prior:
/// `(count + 1) / (picks + pool size)`.
pub struct BayesianScorer {
    window: usize,
    seed: u64,
    min_history: usize,
    fit: Option<BayesianFit>,
}

struct BayesianFit {
    front: Vec<f64>,
    back: Vec<f64>,
    draws: usize,
}

impl BayesianScorer {
    pub fn new(window: usize, seed: u64) -> Self {
        Self {
            window,
            seed,
            min_history: 20,
            fit: None,
        }
    }

    pub fn with_min_history(mut self, min_history: usize) -> Self {
        self.min_history = min_history;
        self
    }
}

pub fn posterior_mean(draws: &[Draw], pool: Pool) -> Vec<f64> {
    let picks = (draws.len() * pool.pick_count()) as f64;
    let denominator = picks + PRIOR * pool.size() as f64;
    appearance_counts(draws, pool)
        .into_iter()
        .map(|count| (count + PRIOR) / denominator)
        .collect()
}

impl Scorer for BayesianScorer {
    fn name(&self) -> &str {
        "Bayesian"
    }

    fn version(&self) -> &str {
        "1.0"
    }

    fn train(&mut self, history: &[Draw]) -> Result<(), ScorerError> {
        self.fit = None;
        check_history(self.name(), history, self.min_history)?;
        let draws = recent_window(history, self.window);
        self.fit = Some(BayesianFit {
            front: posterior_mean(draws, Pool::Front),
            back: posterior_mean(draws, Pool::Back),
            draws: draws.len(),
        });
        Ok(())
    }

    fn predict(&self, _history: &[Draw]) -> Result<ScorerOutput, ScorerError> {
        let fit = self
            .fit
            .as_ref()
            .ok_or_else(|| ScorerError::NotTrained(self.name().to_string()))?;

        // Seeded by history length so a given prefix always samples the same sets.
        let seed = self.seed ^ fit.draws as u64;
        let sampled = match sample_sets(&fit.front, &fit.back, SAMPLED_SETS, seed) {
            Ok(sets) => json!(sets),
            Err(e) => json!({ "error": e.to_string() }),
        };

        Ok(ScorerOutput {
            front: normalize_scores(self.name(), Pool::Front, fit.front.clone()),
            back: normalize_scores(self.name(), Pool::Back, fit.back.clone()),
            confidence: sample_confidence(0.60, fit.draws),
            diagnostics: json!({
                "draws": fit.draws,
                "prior": PRIOR,
                "seed": seed,
                "sampled_sets": sampled,
            }),
        })
    }

    fn params(&self) -> BTreeMap<String, f64> {
        BTreeMap::from([
            ("window".to_string(), self.window as f64),
            ("prior".to_string(), PRIOR),
            ("seed".to_string(), self.seed as f64),
            ("min_history".to_string(), self.min_history as f64),
        ])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scorers::{draw, make_test_draws, validate_scores};

    #[test]
    fn test_posterior_sums_to_one() {
        let draws = make_test_draws(30);
        for pool in Pool::all() {
            let posterior = posterior_mean(&draws, pool);
            let sum: f64 = posterior.iter().sum();
            assert!((sum - 1.0).abs() < 1e-9, "{pool}");
        }
    }

    #[test]
    fn test_posterior_never_zero() {
        let draws = vec![draw("001", [1, 2, 3, 4, 5], [1, 2]); 4];
        let mut scorer = BayesianScorer::new(0, 42).with_min_history(4);
        scorer.train(&draws).unwrap();
        let out = scorer.predict(&draws).unwrap();
        assert!(validate_scores(&out.front, Pool::Front));
        assert_eq!(out.front[0], 1.0);
        // (0 + 1) / (4 + 1)
        assert!((out.front[34] - 0.2).abs() < 1e-12);
        assert!(out.back.iter().all(|&s| s > 0.0));
    }

    #[test]
    fn test_sampled_sets_are_reproducible() {
        let draws = make_test_draws(25);
        let mut a = BayesianScorer::new(0, 7);
        let mut b = BayesianScorer::new(0, 7);
        a.train(&draws).unwrap();
        b.train(&draws).unwrap();
        let da = a.predict(&draws).unwrap().diagnostics;
        let db = b.predict(&draws).unwrap().diagnostics;
        assert_eq!(da, db);
        assert_eq!(da["sampled_sets"].as_array().map(|s| s.len()), Some(SAMPLED_SETS));
    }

    #[test]
    fn test_sampled_sets_record_lift() {
        let draws = make_test_draws(25);
        let mut scorer = BayesianScorer::new(0, 3);
        scorer.train(&draws).unwrap();
        let diagnostics = scorer.predict(&draws).unwrap().diagnostics;
        let sets = diagnostics["sampled_sets"].as_array().unwrap();
        for set in sets {
            let lift = set["lift"].as_f64().unwrap();
            assert!(lift.is_finite() && lift > 0.0);
            assert_eq!(set["front"].as_array().map(|f| f.len()), Some(5));
            assert_eq!(set["back"].as_array().map(|b| b.len()), Some(2));
        }
    }
}
