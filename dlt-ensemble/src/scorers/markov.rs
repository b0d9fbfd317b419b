use std::collections::BTreeMap;

use dlt_db::models::{Draw, Pool};
use ndarray::Array2;
use serde_json::json;

use super::{check_history, normalize_scores, recent_window, sample_confidence, uniform_scores, Scorer, ScorerOutput};
use crate::error::ScorerError;

/// First-order transitions between consecutive front draws. The back pool is
/// too small to carry a useful transition signal and scores uniformly.
pub struct MarkovScorer {
    window: usize,
    min_history: usize,
    fit: Option<MarkovFit>,
}

struct MarkovFit {
    /// Row-normalized: `transition[[a, b]]` = P(b follows | a was drawn).
    transition: Array2<f64>,
    observed_rows: Vec<bool>,
    last_front: [u8; 5],
    transitions: usize,
    draws: usize,
}

impl MarkovScorer {
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

pub fn transition_matrix(draws: &[Draw]) -> (Array2<f64>, Vec<bool>) {
    let size = Pool::Front.size();
    let mut transition = Array2::<f64>::zeros((size, size));

    for pair in draws.windows(2) {
        for &a in &pair[0].front {
            for &b in &pair[1].front {
                transition[[(a - 1) as usize, (b - 1) as usize]] += 1.0;
            }
        }
    }

    let mut observed = vec![false; size];
    for (i, mut row) in transition.rows_mut().into_iter().enumerate() {
        let total: f64 = row.sum();
        if total > 0.0 {
            row /= total;
            observed[i] = true;
        }
    }
    (transition, observed)
}

impl Scorer for MarkovScorer {
    fn name(&self) -> &str {
        "Markov"
    }

    fn version(&self) -> &str {
        "1.0"
    }

    fn train(&mut self, history: &[Draw]) -> Result<(), ScorerError> {
        self.fit = None;
        check_history(self.name(), history, self.min_history.max(2))?;
        let draws = recent_window(history, self.window);
        let last = history.last().ok_or_else(|| ScorerError::InsufficientData {
            scorer: self.name().to_string(),
            have: 0,
            need: self.min_history,
        })?;
        let (transition, observed_rows) = transition_matrix(draws);
        self.fit = Some(MarkovFit {
            transition,
            observed_rows,
            last_front: last.front,
            transitions: draws.len().saturating_sub(1),
            draws: draws.len(),
        });
        Ok(())
    }

    fn predict(&self, _history: &[Draw]) -> Result<ScorerOutput, ScorerError> {
        let fit = self
            .fit
            .as_ref()
            .ok_or_else(|| ScorerError::NotTrained(self.name().to_string()))?;

        let mut front = vec![0.0f64; Pool::Front.size()];
        let mut covered = 0usize;
        for &a in &fit.last_front {
            let row = (a - 1) as usize;
            if fit.observed_rows[row] {
                covered += 1;
            }
            for (score, p) in front.iter_mut().zip(fit.transition.row(row)) {
                *score += p;
            }
        }
        let coverage = covered as f64 / fit.last_front.len() as f64;

        Ok(ScorerOutput {
            front: normalize_scores(self.name(), Pool::Front, front),
            back: uniform_scores(Pool::Back),
            confidence: sample_confidence(0.50, fit.draws) * coverage,
            diagnostics: json!({
                "transitions": fit.transitions,
                "last_front": fit.last_front,
                "row_coverage": coverage,
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
