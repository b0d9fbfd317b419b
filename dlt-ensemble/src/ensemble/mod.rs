pub mod evaluation;
pub mod weights;

use std::cmp::Ordering;

use dlt_db::models::{Pool, ScorerSnapshot};

use crate::scorers::max_normalize;
use weights::WeightMap;

/// Per-pool fused scores for one target period.
#[derive(Debug, Clone, PartialEq)]
pub struct FusedRanking {
    pub period_id: String,
    /// Sorted by fused score descending, lower number first on ties.
    pub front: Vec<(u8, f64)>,
    pub back: Vec<(u8, f64)>,
    /// Σ w·confidence over the scorers that contributed.
    pub confidence: f64,
    /// Effective (renormalized) weight of every scorer present.
    pub contributors: Vec<(String, f64)>,
    /// Per-number standard deviation across contributing scorers, indexed by `number - 1`.
    pub front_spread: Vec<f64>,
    pub back_spread: Vec<f64>,
}

impl FusedRanking {
    pub fn ranked(&self, pool: Pool) -> &[(u8, f64)] {
        match pool {
            Pool::Front => &self.front,
            Pool::Back => &self.back,
        }
    }

    /// The `k` best numbers of a pool, in rank order.
    pub fn top(&self, pool: Pool, k: usize) -> Vec<u8> {
        self.ranked(pool).iter().take(k).map(|&(n, _)| n).collect()
    }

    pub fn score_of(&self, pool: Pool, number: u8) -> f64 {
        self.ranked(pool)
            .iter()
            .find(|&&(n, _)| n == number)
            .map(|&(_, s)| s)
            .unwrap_or(0.0)
    }
}

/// Orders `(number, score)` pairs by score descending, lower number first on ties.
pub fn rank_scores(scores: &[f64]) -> Vec<(u8, f64)> {
    let mut ranked: Vec<(u8, f64)> = scores
        .iter()
        .enumerate()
        .map(|(i, &s)| ((i + 1) as u8, if s.is_finite() { s } else { 0.0 }))
        .collect();
    ranked.sort_by(|a, b| match b.1.total_cmp(&a.1) {
        Ordering::Equal => a.0.cmp(&b.0),
        other => other,
    });
    ranked
}

pub fn top_numbers(scores: &[f64], k: usize) -> Vec<u8> {
    rank_scores(scores).into_iter().take(k).map(|(n, _)| n).collect()
}

/// Weighted linear combination of the snapshots' score vectors.
///
/// Weights are renormalized over the scorers present in `snapshots`; a scorer
/// without a weight entry gets zero, and if every present weight is zero the
/// present scorers share the mass evenly. Each vector is max-normalized first;
/// an all-zero vector contributes nothing.
pub fn fuse(weights: &WeightMap, snapshots: &[ScorerSnapshot], period_id: &str) -> FusedRanking {
    let names: Vec<&str> = snapshots.iter().map(|s| s.scorer_name.as_str()).collect();
    let effective = weights.restricted_to(&names);

    let mut confidence = 0.0;
    let mut contributors = Vec::with_capacity(snapshots.len());
    let mut front = PoolSum::new(Pool::Front);
    let mut back = PoolSum::new(Pool::Back);

    for snapshot in snapshots {
        let w = effective.get(&snapshot.scorer_name);
        contributors.push((snapshot.scorer_name.clone(), w));
        let front_added = front.add(snapshot, w);
        let back_added = back.add(snapshot, w);
        if front_added || back_added {
            confidence += w * snapshot.confidence.clamp(0.0, 1.0);
        }
    }

    FusedRanking {
        period_id: period_id.to_string(),
        front: rank_scores(&front.fused),
        back: rank_scores(&back.fused),
        confidence,
        contributors,
        front_spread: compute_spread(&front.vectors, Pool::Front.size()),
        back_spread: compute_spread(&back.vectors, Pool::Back.size()),
    }
}

struct PoolSum {
    pool: Pool,
    fused: Vec<f64>,
    vectors: Vec<Vec<f64>>,
}

impl PoolSum {
    fn new(pool: Pool) -> Self {
        Self {
            pool,
            fused: vec![0.0; pool.size()],
            vectors: Vec::new(),
        }
    }

    /// Returns false when the snapshot's vector was malformed or all zero.
    fn add(&mut self, snapshot: &ScorerSnapshot, weight: f64) -> bool {
        let scores = snapshot.scores(self.pool);
        if scores.len() != self.pool.size() {
            tracing::warn!(
                scorer = %snapshot.scorer_name,
                "{} vector has {} entries, expected {}; skipped",
                self.pool,
                scores.len(),
                self.pool.size()
            );
            return false;
        }
        let Some(normalized) = max_normalize(scores.to_vec()) else {
            return false;
        };
        for (f, s) in self.fused.iter_mut().zip(&normalized) {
            *f += weight * s;
        }
        self.vectors.push(normalized);
        true
    }
}

fn compute_spread(vectors: &[Vec<f64>], size: usize) -> Vec<f64> {
    if vectors.is_empty() {
        return vec![0.0; size];
    }
    let n = vectors.len() as f64;
    (0..size)
        .map(|j| {
            let mean = vectors.iter().map(|v| v[j]).sum::<f64>() / n;
            let variance = vectors.iter().map(|v| (v[j] - mean).powi(2)).sum::<f64>() / n;
            variance.sqrt()
        })
        .collect()
}

#[cfg(test)]
pub(crate) fn test_snapshot(name: &str, period: &str, front: Vec<f64>, back: Vec<f64>, confidence: f64) -> ScorerSnapshot {
    ScorerSnapshot {
        scorer_name: name.to_string(),
        scorer_version: "1.0".to_string(),
        period_id: period.to_string(),
        created_at: chrono::Utc::now(),
        front_scores: front,
        back_scores: back,
        confidence,
        params: Default::default(),
        diagnostics: serde_json::Value::Null,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    fn front_with(entries: &[(u8, f64)]) -> Vec<f64> {
        let mut v = vec![0.0; 35];
        for &(n, s) in entries {
            v[(n - 1) as usize] = s;
        }
        v
    }

    fn weights(entries: &[(&str, f64)]) -> WeightMap {
        WeightMap::from_map(entries.iter().map(|&(k, v)| (k.to_string(), v)).collect::<BTreeMap<_, _>>())
    }

    fn s2_snapshots() -> Vec<ScorerSnapshot> {
        vec![
            test_snapshot("A", "001", front_with(&[(1, 1.0), (2, 0.5)]), vec![1.0; 12], 0.4),
            test_snapshot("B", "001", front_with(&[(2, 1.0), (3, 0.5)]), vec![1.0; 12], 0.6),
        ]
    }

    #[test]
    fn test_two_scorer_fusion() {
        let fused = fuse(&weights(&[("A", 0.5), ("B", 0.5)]), &s2_snapshots(), "001");
        assert_eq!(fused.front[0], (2, 0.75));
        assert_eq!(fused.front[1], (1, 0.5));
        assert_eq!(fused.front[2], (3, 0.25));
        assert!(fused.front[3..].iter().all(|&(_, s)| s == 0.0));
        assert_eq!(fused.top(Pool::Front, 1), vec![2]);
        assert!((fused.confidence - 0.5).abs() < 1e-12);
    }

    #[test]
    fn test_every_number_ranked_once() {
        let fused = fuse(&WeightMap::default(), &s2_snapshots(), "001");
        assert_eq!(fused.front.len(), 35);
        assert_eq!(fused.back.len(), 12);
        let mut numbers: Vec<u8> = fused.front.iter().map(|&(n, _)| n).collect();
        numbers.sort_unstable();
        assert_eq!(numbers, (1..=35).collect::<Vec<u8>>());
    }

    #[test]
    fn test_ties_break_to_lower_number() {
        let fused = fuse(&WeightMap::default(), &s2_snapshots(), "001");
        // Back vectors are flat: order is plain ascending.
        assert_eq!(fused.top(Pool::Back, 4), vec![1, 2, 3, 4]);
        // Zero-scored front numbers follow in ascending order.
        assert_eq!(fused.front[3].0, 4);
        assert_eq!(fused.front[34].0, 35);
    }

    #[test]
    fn test_linear_in_weights() {
        let snapshots = s2_snapshots();
        let w1 = weights(&[("A", 0.8), ("B", 0.2)]);
        let w2 = weights(&[("A", 0.1), ("B", 0.9)]);
        let (alpha, beta) = (0.3, 0.7);
        let mixed = weights(&[("A", alpha * 0.8 + beta * 0.1), ("B", alpha * 0.2 + beta * 0.9)]);

        let f1 = fuse(&w1, &snapshots, "001");
        let f2 = fuse(&w2, &snapshots, "001");
        let fm = fuse(&mixed, &snapshots, "001");
        for n in 1..=35u8 {
            let expected = alpha * f1.score_of(Pool::Front, n) + beta * f2.score_of(Pool::Front, n);
            assert!((fm.score_of(Pool::Front, n) - expected).abs() < 1e-12, "number {n}");
        }
    }

    #[test]
    fn test_missing_scorer_weight_redistributed() {
        // C has weight but no snapshot; A and B share the full mass.
        let w = weights(&[("A", 0.25), ("B", 0.25), ("C", 0.5)]);
        let fused = fuse(&w, &s2_snapshots(), "001");
        assert_eq!(fused.score_of(Pool::Front, 2), 0.75);
        let total: f64 = fused.contributors.iter().map(|(_, w)| w).sum();
        assert!((total - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_degenerate_vector_contributes_nothing() {
        let mut snapshots = s2_snapshots();
        snapshots.push(test_snapshot("Z", "001", vec![0.0; 35], vec![0.0; 12], 0.9));
        let fused = fuse(&WeightMap::default(), &snapshots, "001");
        // Uniform thirds; Z adds nothing and claims no confidence.
        assert!((fused.score_of(Pool::Front, 2) - 0.5).abs() < 1e-12);
        assert!((fused.confidence - (0.4 + 0.6) / 3.0).abs() < 1e-12);
    }

    #[test]
    fn test_unscaled_vectors_are_normalized() {
        let snapshots = vec![test_snapshot("A", "001", front_with(&[(1, 4.0), (2, 2.0)]), vec![3.0; 12], 0.5)];
        let fused = fuse(&WeightMap::default(), &snapshots, "001");
        assert_eq!(fused.front[0], (1, 1.0));
        assert_eq!(fused.front[1], (2, 0.5));
    }

    #[test]
    fn test_top_selection_cardinality() {
        let draws = crate::scorers::make_test_draws(40);
        let snapshots: Vec<ScorerSnapshot> = crate::scorers::all_scorers(&Default::default())
            .into_iter()
            .map(|mut s| {
                s.train(&draws).unwrap();
                let out = s.predict(&draws).unwrap();
                test_snapshot(s.name(), "2024041", out.front, out.back, out.confidence)
            })
            .collect();
        let fused = fuse(&WeightMap::default(), &snapshots, "2024041");

        let mut front = fused.top(Pool::Front, 5);
        let mut back = fused.top(Pool::Back, 2);
        front.sort_unstable();
        front.dedup();
        back.sort_unstable();
        back.dedup();
        assert_eq!(front.len(), 5);
        assert_eq!(back.len(), 2);
        assert!(front.iter().all(|&n| Pool::Front.contains(n)));
        assert!(back.iter().all(|&n| Pool::Back.contains(n)));
    }

    #[test]
    fn test_spread_zero_when_scorers_agree() {
        let snapshots = vec![
            test_snapshot("A", "001", front_with(&[(1, 1.0)]), vec![1.0; 12], 0.5),
            test_snapshot("B", "001", front_with(&[(1, 1.0)]), vec![1.0; 12], 0.5),
        ];
        let fused = fuse(&WeightMap::default(), &snapshots, "001");
        assert!(fused.front_spread.iter().all(|&s| s == 0.0));
    }
}
