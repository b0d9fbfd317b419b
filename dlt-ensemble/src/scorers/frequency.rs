use std::collections::BTreeMap;

use dlt_db::models::{Draw, Pool};
use serde_json::json;

use super::{appearance_counts, check_history, normalize_scores, recent_window, sample_confidence, Scorer, ScorerOutput};
use crate::error::ScorerError;

/// Appearance counts over a window, scaled so the most frequent number scores 1.
pub struct FrequencyScorer {
    window: usize,
    min_history: usize,
    fit: Option<FrequencyFit>,
}

struct FrequencyFit {
    front: Vec<f64>,
    back: Vec<f64>,
    draws: usize,
}

impl FrequencyScorer {
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

impl Scorer for FrequencyScorer {
    fn name(&self) -> &str {
        "Frequency"
    }

    fn version(&self) -> &str {
        "1.0"
    }

    fn train(&mut self, history: &[Draw]) -> Result<(), ScorerError> {
        self.fit = None;
        check_history(self.name(), history, self.min_history)?;
        let draws = recent_window(history, self.window);
        self.fit = Some(FrequencyFit {
            front: appearance_counts(draws, Pool::Front),
            back: appearance_counts(draws, Pool::Back),
            draws: draws.len(),
        });
        Ok(())
    }

    fn predict(&self, _history: &[Draw]) -> Result<ScorerOutput, ScorerError> {
        let fit = self
            .fit
            .as_ref()
            .ok_or_else(|| ScorerError::NotTrained(self.name().to_string()))?;

        let max_front = fit.front.iter().cloned().fold(0.0f64, f64::max);
        let max_back = fit.back.iter().cloned().fold(0.0f64, f64::max);

        Ok(ScorerOutput {
            front: normalize_scores(self.name(), Pool::Front, fit.front.clone()),
            back: normalize_scores(self.name(), Pool::Back, fit.back.clone()),
            confidence: sample_confidence(0.50, fit.draws),
            diagnostics: json!({
                "draws": fit.draws,
                "max_front_count": max_front,
                "max_back_count": max_back,
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
