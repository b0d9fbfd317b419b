use std::collections::BTreeMap;

use dlt_db::models::{Draw, Pool};
use serde_json::json;

use super::{
    appearance_counts, check_history, current_omission, max_normalize, normalize_scores,
    recent_window, sample_confidence, Scorer, ScorerOutput,
};
use crate::error::ScorerError;

const HOT_WEIGHT: f64 = 0.6;
const COLD_WEIGHT: f64 = 0.4;

/// Blends recent frequency ("hot") with how long a number has been absent
/// from the recent window ("cold").
pub struct HotColdScorer {
    hot_window: usize,
    min_history: usize,
    fit: Option<HotColdFit>,
}

struct HotColdFit {
    front: Vec<f64>,
    back: Vec<f64>,
    draws: usize,
}

impl HotColdScorer {
    pub fn new(hot_window: usize) -> Self {
        Self {
            hot_window,
            min_history: 20,
            fit: None,
        }
    }

    pub fn with_min_history(mut self, min_history: usize) -> Self {
        self.min_history = min_history;
        self
    }
}

fn blend(draws: &[Draw], pool: Pool) -> Vec<f64> {
    let hot = max_normalize(appearance_counts(draws, pool)).unwrap_or_else(|| vec![0.0; pool.size()]);
    let cold = max_normalize(current_omission(draws, pool)).unwrap_or_else(|| vec![0.0; pool.size()]);
    hot.iter()
        .zip(&cold)
        .map(|(h, c)| HOT_WEIGHT * h + COLD_WEIGHT * c)
        .collect()
}

impl Scorer for HotColdScorer {
    fn name(&self) -> &str {
        "HotCold"
    }

    fn version(&self) -> &str {
        "1.0"
    }

    fn train(&mut self, history: &[Draw]) -> Result<(), ScorerError> {
        self.fit = None;
        check_history(self.name(), history, self.min_history)?;
        let draws = recent_window(history, self.hot_window);
        self.fit = Some(HotColdFit {
            front: blend(draws, Pool::Front),
            back: blend(draws, Pool::Back),
            draws: history.len(),
        });
        Ok(())
    }

    fn predict(&self, _history: &[Draw]) -> Result<ScorerOutput, ScorerError> {
        let fit = self
            .fit
            .as_ref()
            .ok_or_else(|| ScorerError::NotTrained(self.name().to_string()))?;

        Ok(ScorerOutput {
            front: normalize_scores(self.name(), Pool::Front, fit.front.clone()),
            back: normalize_scores(self.name(), Pool::Back, fit.back.clone()),
            confidence: sample_confidence(0.55, fit.draws),
            diagnostics: json!({
                "hot_window": self.hot_window,
                "hot_weight": HOT_WEIGHT,
                "cold_weight": COLD_WEIGHT,
            }),
        })
    }

    fn params(&self) -> BTreeMap<String, f64> {
        BTreeMap::from([
            ("hot_window".to_string(), self.hot_window as f64),
            ("hot_weight".to_string(), HOT_WEIGHT),
            ("cold_weight".to_string(), COLD_WEIGHT),
            ("min_history".to_string(), self.min_history as f64),
        ])
    }
}
