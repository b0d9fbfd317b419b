use std::collections::BTreeMap;

use dlt_db::models::EvaluationRecord;
use serde::{Deserialize, Serialize};

/// Scorer name to fusion weight. Normalized maps sum to 1.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WeightMap(BTreeMap<String, f64>);

impl WeightMap {
    pub fn uniform<S: AsRef<str>>(names: &[S]) -> Self {
        if names.is_empty() {
            return Self::default();
        }
        let w = 1.0 / names.len() as f64;
        Self(names.iter().map(|n| (n.as_ref().to_string(), w)).collect())
    }

    pub fn from_map(map: BTreeMap<String, f64>) -> Self {
        Self(map)
    }

    pub fn as_map(&self) -> &BTreeMap<String, f64> {
        &self.0
    }

    /// Missing entries weigh zero.
    pub fn get(&self, name: &str) -> f64 {
        self.0.get(name).copied().unwrap_or(0.0)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &f64)> {
        self.0.iter()
    }

    pub fn total(&self) -> f64 {
        self.0.values().sum()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Weights of `names` only, renormalized to sum to 1. Falls back to
    /// uniform over `names` when they carry no mass.
    pub fn restricted_to<S: AsRef<str>>(&self, names: &[S]) -> Self {
        let restricted: BTreeMap<String, f64> = names
            .iter()
            .map(|n| (n.as_ref().to_string(), sanitize(self.get(n.as_ref()))))
            .collect();
        let total: f64 = restricted.values().sum();
        if total <= 0.0 {
            return Self::uniform(names);
        }
        Self(restricted.into_iter().map(|(k, v)| (k, v / total)).collect())
    }
}

fn sanitize(x: f64) -> f64 {
    if x.is_finite() && x > 0.0 {
        x
    } else {
        0.0
    }
}

/// New fusion weights for `scorers` from recent evaluation records.
///
/// Each scorer's mean composite (over the periods where it was evaluated)
/// is normalized to a distribution, then blended with `previous`:
/// `alpha * recent + (1 - alpha) * previous`, renormalized. Without any
/// usable record the result is uniform. An empty `previous` counts as uniform.
pub fn update_weights<S: AsRef<str>>(
    records: &[EvaluationRecord],
    scorers: &[S],
    previous: &WeightMap,
    alpha: f64,
) -> WeightMap {
    let names: Vec<&str> = scorers.iter().map(|s| s.as_ref()).collect();
    let relevant: Vec<&EvaluationRecord> = records
        .iter()
        .filter(|r| names.contains(&r.scorer_name.as_str()))
        .collect();
    if relevant.is_empty() || names.is_empty() {
        return WeightMap::uniform(&names);
    }

    let mut sums: BTreeMap<&str, (f64, usize)> = BTreeMap::new();
    for record in &relevant {
        let entry = sums.entry(record.scorer_name.as_str()).or_insert((0.0, 0));
        entry.0 += sanitize(record.composite);
        entry.1 += 1;
    }
    let averages: BTreeMap<&str, f64> = names
        .iter()
        .map(|&n| {
            let avg = sums.get(n).map_or(0.0, |&(sum, count)| sum / count as f64);
            (n, avg)
        })
        .collect();

    let total: f64 = averages.values().sum();
    let recent: BTreeMap<&str, f64> = if total > 0.0 {
        averages.iter().map(|(&n, &a)| (n, a / total)).collect()
    } else {
        let w = 1.0 / names.len() as f64;
        names.iter().map(|&n| (n, w)).collect()
    };

    let prior = if previous.is_empty() {
        WeightMap::uniform(&names)
    } else {
        previous.clone()
    };
    let alpha = alpha.clamp(0.0, 1.0);

    let blended: BTreeMap<String, f64> = names
        .iter()
        .map(|&n| {
            let fresh = recent.get(n).copied().unwrap_or(0.0);
            let w = alpha * fresh + (1.0 - alpha) * sanitize(prior.get(n));
            (n.to_string(), w)
        })
        .collect();

    let sum: f64 = blended.values().sum();
    if sum <= 0.0 {
        return WeightMap::uniform(&names);
    }
    WeightMap(blended.into_iter().map(|(k, v)| (k, v / sum)).collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    const SIX: [&str; 6] = ["s1", "s2", "s3", "s4", "s5", "s6"];

    fn record(scorer: &str, period: &str, composite: f64) -> EvaluationRecord {
        EvaluationRecord {
            scorer_name: scorer.to_string(),
            period_id: period.to_string(),
            front_hits: 0,
            back_hits: 0,
            hit_rate: 0.0,
            composite,
            evaluated_at: Utc::now(),
        }
    }

    fn assert_normalized(w: &WeightMap) {
        assert!((w.total() - 1.0).abs() < 1e-9, "sum {}", w.total());
        assert!(w.iter().all(|(_, &v)| v >= 0.0 && v.is_finite()));
    }

    #[test]
    fn test_cold_start_is_uniform() {
        let w = update_weights(&[], &SIX, &WeightMap::default(), 0.6);
        for name in SIX {
            assert!((w.get(name) - 1.0 / 6.0).abs() < 1e-12);
        }
    }

    #[test]
    fn test_warm_start_blend() {
        let composites = [0.2, 0.1, 0.05, 0.05, 0.0, 0.0];
        let records: Vec<EvaluationRecord> = (1..=5)
            .flat_map(|p| {
                SIX.iter()
                    .zip(composites)
                    .map(move |(s, c)| record(s, &format!("00{p}"), c))
            })
            .collect();

        let w = update_weights(&records, &SIX, &WeightMap::uniform(&SIX), 0.6);
        assert_normalized(&w);
        let expected = [0.3667, 0.2167, 0.1417, 0.1417, 0.0667, 0.0667];
        for (name, e) in SIX.iter().zip(expected) {
            assert!((w.get(name) - e).abs() < 1e-3, "{name}: {}", w.get(name));
        }
    }

    #[test]
    fn test_all_zero_composites_fall_back_to_uniform_recent() {
        let records: Vec<EvaluationRecord> = SIX.iter().map(|s| record(s, "001", 0.0)).collect();
        let mut previous = WeightMap::uniform(&SIX);
        previous.0.insert("s1".into(), 0.5);
        let w = update_weights(&records, &SIX, &previous.restricted_to(&SIX), 1.0);
        for name in SIX {
            assert!((w.get(name) - 1.0 / 6.0).abs() < 1e-12);
        }
    }

    #[test]
    fn test_non_finite_and_negative_clamped() {
        let records = vec![
            record("s1", "001", f64::NAN),
            record("s2", "001", -0.5),
            record("s3", "001", 0.3),
            record("s4", "001", f64::INFINITY),
        ];
        let names = ["s1", "s2", "s3", "s4"];
        let w = update_weights(&records, &names, &WeightMap::default(), 1.0);
        assert_normalized(&w);
        assert!((w.get("s3") - 1.0).abs() < 1e-12);
        assert_eq!(w.get("s1"), 0.0);
    }

    #[test]
    fn test_removed_scorer_mass_redistributed() {
        let previous = WeightMap::uniform(&SIX);
        let records: Vec<EvaluationRecord> = SIX.iter().map(|s| record(s, "001", 0.1)).collect();
        let remaining = ["s1", "s2", "s3"];
        let w = update_weights(&records, &remaining, &previous, 0.6);
        assert_normalized(&w);
        assert!(w.get("s6") == 0.0 && !w.as_map().contains_key("s6"));
        for name in remaining {
            assert!((w.get(name) - 1.0 / 3.0).abs() < 1e-12);
        }
    }

    #[test]
    fn test_mean_over_evaluated_periods() {
        // s2 missed a period; its mean is over the one period it was evaluated.
        let records = vec![
            record("s1", "001", 0.2),
            record("s1", "002", 0.0),
            record("s2", "002", 0.1),
        ];
        let w = update_weights(&records, &["s1", "s2"], &WeightMap::default(), 1.0);
        assert!((w.get("s1") - 0.5).abs() < 1e-12);
        assert!((w.get("s2") - 0.5).abs() < 1e-12);
    }

    #[test]
    fn test_output_always_normalized() {
        let mut rng = StdRng::seed_from_u64(17);
        for round in 0..50 {
            let records: Vec<EvaluationRecord> = SIX
                .iter()
                .enumerate()
                .map(|(i, s)| record(s, &format!("{:03}", round + i), rng.random_range(-0.2..0.8)))
                .collect();
            let previous = WeightMap::uniform(&SIX[..(round % 6) + 1]);
            let alpha = 0.05 + (round as f64) / 55.0;
            let w = update_weights(&records, &SIX, &previous, alpha);
            assert_normalized(&w);
        }
    }

    #[test]
    fn test_restricted_to_renormalizes() {
        let w = WeightMap::from_map(BTreeMap::from([
            ("a".to_string(), 0.2),
            ("b".to_string(), 0.2),
            ("c".to_string(), 0.6),
        ]));
        let r = w.restricted_to(&["a", "b"]);
        assert!((r.get("a") - 0.5).abs() < 1e-12);
        assert_eq!(r.get("c"), 0.0);
        let u = WeightMap::default().restricted_to(&["x", "y"]);
        assert_eq!(u.get("x"), 0.5);
    }
}
