use rand::distr::weighted::{Error as WeightError, WeightedIndex};
use rand::prelude::Distribution;
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SampledSet {
    pub front: Vec<u8>,
    pub back: Vec<u8>,
    /// Joint lift of the front and back picks over uniform sampling.
    pub lift: f64,
}

/// Draws `count` distinct numbers with probability proportional to `weights`
/// (indexed by `number - 1`). Returns the numbers sorted ascending and their
/// joint lift over a uniform pick.
pub fn sample_without_replacement(
    weights: &[f64],
    count: usize,
    rng: &mut StdRng,
) -> Result<(Vec<u8>, f64), WeightError> {
    let total: f64 = weights.iter().sum();
    let uniform = 1.0 / weights.len() as f64;
    let mut available: Vec<(u8, f64)> = weights
        .iter()
        .enumerate()
        .map(|(i, &w)| ((i + 1) as u8, w))
        .collect();
    let mut selected = Vec::with_capacity(count);
    let mut lift = 1.0f64;

    for _ in 0..count {
        let dist = WeightedIndex::new(available.iter().map(|(_, w)| *w))?;
        let idx = dist.sample(rng);

        let (number, weight) = available.remove(idx);
        selected.push(number);
        if total > 0.0 {
            lift *= (weight / total) / uniform;
        }
    }

    selected.sort_unstable();
    Ok((selected, lift))
}

/// Several sampled front/back sets from one seed.
pub fn sample_sets(
    front_weights: &[f64],
    back_weights: &[f64],
    sets: usize,
    seed: u64,
) -> Result<Vec<SampledSet>, WeightError> {
    let mut rng = StdRng::seed_from_u64(seed);
    (0..sets)
        .map(|_| {
            let (front, front_lift) = sample_without_replacement(front_weights, 5, &mut rng)?;
            let (back, back_lift) = sample_without_replacement(back_weights, 2, &mut rng)?;
            Ok(SampledSet {
                front,
                back,
                lift: front_lift * back_lift,
            })
        })
        .collect()
}
