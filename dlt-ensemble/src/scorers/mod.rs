pub mod bayesian;
pub mod frequency;
pub mod graph;
pub mod hot_cold;
pub mod markov;
pub mod omission;

use std::collections::BTreeMap;

use dlt_db::models::{Draw, Pool};

use crate::config::ScorerConfig;
use crate::error::ScorerError;

pub const SCORER_NAMES: [&str; 6] = [
    "Frequency",
    "HotCold",
    "Omission",
    "Bayesian",
    "Markov",
    "GraphAssociation",
];

/// Draw count at which a scorer's sample-size factor reaches one half.
const CONFIDENCE_SATURATION: f64 = 50.0;

pub fn canonical_name(name: &str) -> Option<&'static str> {
    SCORER_NAMES
        .iter()
        .copied()
        .find(|known| known.eq_ignore_ascii_case(name))
}

#[derive(Debug, Clone, PartialEq)]
pub struct ScorerOutput {
    pub front: Vec<f64>,
    pub back: Vec<f64>,
    pub confidence: f64,
    pub diagnostics: serde_json::Value,
}

pub trait Scorer: Send {
    fn name(&self) -> &str;
    fn version(&self) -> &str;
    /// `history` is oldest first and ends just before the target period.
    /// Leaves the scorer untrained on failure.
    fn train(&mut self, history: &[Draw]) -> Result<(), ScorerError>;
    /// Score vectors are indexed by `number - 1`, total over the pool and max-normalized.
    fn predict(&self, history: &[Draw]) -> Result<ScorerOutput, ScorerError>;
    fn params(&self) -> BTreeMap<String, f64>;
}

pub fn build_scorer(name: &str, config: &ScorerConfig) -> Option<Box<dyn Scorer>> {
    let min = config.min_history;
    let scorer: Box<dyn Scorer> = match canonical_name(name)? {
        "Frequency" => Box::new(frequency::FrequencyScorer::new(config.window).with_min_history(min)),
        "HotCold" => Box::new(hot_cold::HotColdScorer::new(config.hot_window).with_min_history(min)),
        "Omission" => Box::new(omission::OmissionScorer::new(config.window).with_min_history(min)),
        "Bayesian" => Box::new(
            bayesian::BayesianScorer::new(config.window, config.seed).with_min_history(min),
        ),
        "Markov" => Box::new(markov::MarkovScorer::new(config.window).with_min_history(min)),
        "GraphAssociation" => Box::new(graph::GraphScorer::new(config.window).with_min_history(min)),
        _ => return None,
    };
    Some(scorer)
}

/// Fresh, untrained scorers in configured order.
pub fn all_scorers(config: &ScorerConfig) -> Vec<Box<dyn Scorer>> {
    config
        .enabled
        .iter()
        .filter_map(|name| build_scorer(name, config))
        .collect()
}

pub(crate) fn check_history(scorer: &str, history: &[Draw], min_history: usize) -> Result<(), ScorerError> {
    if history.len() < min_history {
        return Err(ScorerError::InsufficientData {
            scorer: scorer.to_string(),
            have: history.len(),
            need: min_history,
        });
    }
    Ok(())
}

/// The most recent `window` draws; 0 keeps everything.
pub(crate) fn recent_window(history: &[Draw], window: usize) -> &[Draw] {
    if window == 0 || window >= history.len() {
        history
    } else {
        &history[history.len() - window..]
    }
}

pub(crate) fn appearance_counts(draws: &[Draw], pool: Pool) -> Vec<f64> {
    let mut counts = vec![0.0f64; pool.size()];
    for draw in draws {
        for &n in pool.numbers_from(draw) {
            counts[(n - 1) as usize] += 1.0;
        }
    }
    counts
}

/// Draws elapsed since each number last appeared; `draws.len()` if it never did.
pub(crate) fn current_omission(draws: &[Draw], pool: Pool) -> Vec<f64> {
    let total = draws.len();
    let mut omission = vec![total as f64; pool.size()];
    for (t, draw) in draws.iter().enumerate() {
        for &n in pool.numbers_from(draw) {
            omission[(n - 1) as usize] = (total - 1 - t) as f64;
        }
    }
    omission
}

/// Clamps negatives and non-finite values to zero, then divides by the maximum.
/// Returns None when nothing positive is left.
pub fn max_normalize(mut scores: Vec<f64>) -> Option<Vec<f64>> {
    for s in &mut scores {
        if !s.is_finite() || *s < 0.0 {
            *s = 0.0;
        }
    }
    let max = scores.iter().cloned().fold(0.0f64, f64::max);
    if max <= 0.0 {
        return None;
    }
    for s in &mut scores {
        *s /= max;
    }
    Some(scores)
}

pub fn uniform_scores(pool: Pool) -> Vec<f64> {
    vec![1.0; pool.size()]
}

/// Max-normalizes `raw`; a degenerate vector is replaced by the uniform one.
pub(crate) fn normalize_scores(scorer: &str, pool: Pool, raw: Vec<f64>) -> Vec<f64> {
    match max_normalize(raw) {
        Some(scores) => scores,
        None => {
            let err = ScorerError::NumericDegenerate {
                scorer: scorer.to_string(),
                pool,
            };
            tracing::warn!("{err}");
            uniform_scores(pool)
        }
    }
}

pub(crate) fn sample_confidence(base: f64, draws: usize) -> f64 {
    let n = draws as f64;
    (base * n / (n + CONFIDENCE_SATURATION)).clamp(0.0, 1.0)
}

pub fn validate_scores(scores: &[f64], pool: Pool) -> bool {
    if scores.len() != pool.size() {
        return false;
    }
    if scores.iter().any(|&s| !s.is_finite() || !(0.0..=1.0).contains(&s)) {
        return false;
    }
    let max = scores.iter().cloned().fold(0.0f64, f64::max);
    (max - 1.0).abs() < 1e-9
}

/// Valid chronological draws, period ids 2024001, 2024002, ...
#[cfg(test)]
pub fn make_test_draws(n: usize) -> Vec<Draw> {
    let start = chrono::NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
    (0..n)
        .map(|i| {
            let front = [0usize, 6, 12, 18, 24].map(|k| ((i * 7 + k) % 35 + 1) as u8);
            let back = [((i * 5) % 12 + 1) as u8, ((i * 5 + 4) % 12 + 1) as u8];
            Draw::new(
                format!("{}", 2024001 + i),
                start + chrono::Days::new(3 * i as u64),
                front,
                back,
            )
            .unwrap()
        })
        .collect()
}

#[cfg(test)]
pub fn draw(period: &str, front: [u8; 5], back: [u8; 2]) -> Draw {
    Draw::new(
        period,
        chrono::NaiveDate::from_ymd_opt(2025, 1, 1).unwrap(),
        front,
        back,
    )
    .unwrap()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_scores() {
        assert!(validate_scores(&uniform_scores(Pool::Front), Pool::Front));
        assert!(!validate_scores(&vec![1.0; 34], Pool::Front));
        let mut scores = vec![0.5; 12];
        assert!(!validate_scores(&scores, Pool::Back));
        scores[3] = 1.0;
        assert!(validate_scores(&scores, Pool::Back));
        scores[0] = -0.1;
        assert!(!validate_scores(&scores, Pool::Back));
    }

    #[test]
    fn test_max_normalize_degenerate() {
        assert!(max_normalize(vec![0.0; 12]).is_none());
        assert!(max_normalize(vec![f64::NAN, -1.0]).is_none());
        assert_eq!(max_normalize(vec![2.0, 1.0, f64::INFINITY]).unwrap(), vec![1.0, 0.5, 0.0]);
    }

    #[test]
    fn test_normalize_scores_falls_back_to_uniform() {
        let scores = normalize_scores("Test", Pool::Back, vec![0.0; 12]);
        assert_eq!(scores, uniform_scores(Pool::Back));
    }

    #[test]
    fn test_current_omission() {
        let draws = vec![
            draw("001", [1, 2, 3, 4, 5], [1, 2]),
            draw("002", [1, 6, 7, 8, 9], [1, 3]),
            draw("003", [2, 6, 10, 11, 12], [3, 4]),
        ];
        let omission = current_omission(&draws, Pool::Front);
        assert_eq!(omission[0], 1.0); // 1 last seen in the middle draw
        assert_eq!(omission[1], 0.0); // 2 in the latest draw
        assert_eq!(omission[2], 2.0);
        assert_eq!(omission[34], 3.0); // never drawn
    }

    #[test]
    fn test_recent_window() {
        let draws = make_test_draws(10);
        assert_eq!(recent_window(&draws, 0).len(), 10);
        assert_eq!(recent_window(&draws, 4).len(), 4);
        assert_eq!(recent_window(&draws, 4)[0].period_id, "2024007");
        assert_eq!(recent_window(&draws, 40).len(), 10);
    }

    #[test]
    fn test_make_test_draws_valid() {
        let draws = make_test_draws(60);
        assert_eq!(draws.len(), 60);
        assert!(draws.windows(2).all(|w| w[0].period_id < w[1].period_id));
    }

    #[test]
    fn test_all_scorers_follow_config_order() {
        let config = ScorerConfig {
            enabled: vec!["Markov".into(), "Frequency".into()],
            ..ScorerConfig::default()
        };
        let names: Vec<String> = all_scorers(&config).iter().map(|s| s.name().to_string()).collect();
        assert_eq!(names, vec!["Markov", "Frequency"]);
    }

    /// Every scorer emits total, max-normalized vectors from 20 draws.
    #[test]
    fn test_every_scorer_covers_full_pool() {
        let draws = make_test_draws(20);
        for mut scorer in all_scorers(&ScorerConfig::default()) {
            scorer.train(&draws).unwrap();
            let out = scorer.predict(&draws).unwrap();
            assert!(validate_scores(&out.front, Pool::Front), "{} front", scorer.name());
            assert!(validate_scores(&out.back, Pool::Back), "{} back", scorer.name());
            assert!((0.0..=1.0).contains(&out.confidence), "{} confidence", scorer.name());
        }
    }

    #[test]
    fn test_every_scorer_rejects_short_history() {
        let draws = make_test_draws(19);
        for mut scorer in all_scorers(&ScorerConfig::default()) {
            let err = scorer.train(&draws).unwrap_err();
            assert!(matches!(err, ScorerError::InsufficientData { have: 19, need: 20, .. }));
            assert!(matches!(scorer.predict(&draws), Err(ScorerError::NotTrained(_))));
        }
    }

    /// Appending future draws never changes a prediction made at a cutoff.
    #[test]
    fn test_prefix_dependence_only() {
        let full = make_test_draws(60);
        let mut altered = full.clone();
        altered.truncate(40);
        altered.extend(make_test_draws(60).into_iter().skip(45).take(20));

        for (mut a, mut b) in all_scorers(&ScorerConfig::default())
            .into_iter()
            .zip(all_scorers(&ScorerConfig::default()))
        {
            a.train(&full[..40]).unwrap();
            b.train(&altered[..40]).unwrap();
            let pa = a.predict(&full[..40]).unwrap();
            let pb = b.predict(&altered[..40]).unwrap();
            assert_eq!(pa, pb, "{}", a.name());
        }
    }
}
