use std::collections::BTreeMap;

use dlt_db::models::{Draw, Pool};
use serde_json::json;

use super::{check_history, current_omission, normalize_scores, recent_window, sample_confidence, Scorer, ScorerOutput};
use crate::error::ScorerError;

/// Scores each number by the length of its current absence streak.
pub struct OmissionScorer {
    window: usize,
    min_history: usize,
    fit: Option<OmissionFit>,
}

struct OmissionFit {
    front: Vec<f64>,
    back: Vec<f64>,
    draws: usize,
}

impl OmissionScorer {
    pub fn new(window: usize) -> Self {
        Self {
            window,
            min_history: 20,
            fit: None,
        }
    }

    pub fn with_min_history(mut self, min_history: usize) -> Self {
        self.min_history = min_history;
        self
    }
}

impl Scorer for OmissionScorer {
    fn name(&self) -> &str {
        "Omission"
    }

    fn version(&self) -> &str {
        "1.0"
    }

    fn train(&mut self, history: &[Draw]) -> Result<(), ScorerError> {
        self.fit = None;
        check_history(self.name(), history, self.min_history)?;
        let draws = recent_window(history, self.window);
        self.fit = Some(OmissionFit {
            front: current_omission(draws, Pool::Front),
            back: current_omission(draws, Pool::Back),
            draws: draws.len(),
        });
        Ok(())
    }

    fn predict(&self, _history: &[Draw]) -> Result<ScorerOutput, ScorerError> {
        let fit = self
            .fit
            .as_ref()
            .ok_or_else(|| ScorerError::NotTrained(self.name().to_string()))?;

        let longest = fit.front.iter().cloned().fold(0.0f64, f64::max);

        Ok(ScorerOutput {
            front: normalize_scores(self.name(), Pool::Front, fit.front.clone()),
            back: normalize_scores(self.name(), Pool::Back, fit.back.clone()),
            confidence: sample_confidence(0.45, fit.draws),
            diagnostics: json!({
                "draws": fit.draws,
                "longest_front_omission": longest,
            }),
        })
    }

    fn params(&self) -> BTreeMap<String, f64> {
        BTreeMap::from([
            ("window".to_string(), self.window as f64),
            ("min_history".to_string(), self.min_history as f64),
        ])
    }
}
