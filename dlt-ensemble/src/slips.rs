use std::fmt;
use std::str::FromStr;

use dlt_db::models::Pool;
use serde::Serialize;

use crate::ensemble::FusedRanking;
use crate::error::SlipError;

/// How the dan ("certain") numbers of a dan-tuo slip are chosen.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DanSpec {
    /// The top `n` of the fused ranking.
    Count(usize),
    /// Caller-picked numbers.
    Numbers(Vec<u8>),
}

impl DanSpec {
    fn len(&self) -> usize {
        match self {
            DanSpec::Count(n) => *n,
            DanSpec::Numbers(v) => v.len(),
        }
    }
}

/// A requested slip layout, before it is filled from a ranking.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SlipShape {
    Single,
    Compound {
        front: usize,
        back: usize,
    },
    DanTuo {
        front_dan: DanSpec,
        front_tuo: usize,
        back_dan: DanSpec,
        back_tuo: usize,
    },
}

impl SlipShape {
    /// Cardinality checks that do not need a ranking.
    pub fn validate(&self) -> Result<(), SlipError> {
        match self {
            SlipShape::Single => Ok(()),
            SlipShape::Compound { front, back } => check_compound_sizes(*front, *back),
            SlipShape::DanTuo {
                front_dan,
                front_tuo,
                back_dan,
                back_tuo,
            } => {
                check_dan_tuo_sizes(front_dan.len(), *front_tuo, back_dan.len(), *back_tuo)?;
                if let DanSpec::Numbers(numbers) = front_dan {
                    check_numbers(Pool::Front, numbers, "front dan")?;
                }
                if let DanSpec::Numbers(numbers) = back_dan {
                    check_numbers(Pool::Back, numbers, "back dan")?;
                }
                Ok(())
            }
        }
    }
}

impl fmt::Display for SlipShape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SlipShape::Single => write!(f, "single"),
            SlipShape::Compound { front, back } => write!(f, "compound:{front}+{back}"),
            SlipShape::DanTuo {
                front_dan,
                front_tuo,
                back_dan,
                back_tuo,
            } => write!(
                f,
                "dantuo:{}+{front_tuo}/{}+{back_tuo}",
                front_dan.len(),
                back_dan.len()
            ),
        }
    }
}

impl FromStr for SlipShape {
    type Err = SlipError;

    /// `single`, `compound:K1+K2`, or `dantuo:DF+TF/DB+TB` (dan counts taken
    /// from the top of the ranking).
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim().to_ascii_lowercase();
        let invalid = || SlipError::InvalidSlipShape(format!("cannot parse '{s}'"));

        if s == "single" {
            return Ok(SlipShape::Single);
        }
        if let Some(rest) = s.strip_prefix("compound:") {
            let (front, back) = parse_pair(rest).ok_or_else(invalid)?;
            return Ok(SlipShape::Compound { front, back });
        }
        if let Some(rest) = s.strip_prefix("dantuo:") {
            let (front, back) = rest.split_once('/').ok_or_else(invalid)?;
            let (front_dan, front_tuo) = parse_pair(front).ok_or_else(invalid)?;
            let (back_dan, back_tuo) = parse_pair(back).ok_or_else(invalid)?;
            return Ok(SlipShape::DanTuo {
                front_dan: DanSpec::Count(front_dan),
                front_tuo,
                back_dan: DanSpec::Count(back_dan),
                back_tuo,
            });
        }
        Err(invalid())
    }
}

fn parse_pair(s: &str) -> Option<(usize, usize)> {
    let (a, b) = s.split_once('+')?;
    Some((a.trim().parse().ok()?, b.trim().parse().ok()?))
}

/// A concrete bet. All number lists are sorted ascending.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum BetSlip {
    Single {
        front: Vec<u8>,
        back: Vec<u8>,
    },
    Compound {
        front: Vec<u8>,
        back: Vec<u8>,
    },
    DanTuo {
        front_dan: Vec<u8>,
        front_tuo: Vec<u8>,
        back_dan: Vec<u8>,
        back_tuo: Vec<u8>,
    },
}

impl BetSlip {
    pub fn single(front: Vec<u8>, back: Vec<u8>) -> Result<Self, SlipError> {
        check_numbers(Pool::Front, &front, "front")?;
        check_numbers(Pool::Back, &back, "back")?;
        if front.len() != 5 || back.len() != 2 {
            return Err(SlipError::InvalidSlipShape(format!(
                "single slip needs 5+2 numbers, got {}+{}",
                front.len(),
                back.len()
            )));
        }
        Ok(BetSlip::Single {
            front: sorted(front),
            back: sorted(back),
        })
    }

    pub fn compound(front: Vec<u8>, back: Vec<u8>) -> Result<Self, SlipError> {
        check_compound_sizes(front.len(), back.len())?;
        check_numbers(Pool::Front, &front, "front")?;
        check_numbers(Pool::Back, &back, "back")?;
        Ok(BetSlip::Compound {
            front: sorted(front),
            back: sorted(back),
        })
    }

    pub fn dan_tuo(
        front_dan: Vec<u8>,
        front_tuo: Vec<u8>,
        back_dan: Vec<u8>,
        back_tuo: Vec<u8>,
    ) -> Result<Self, SlipError> {
        check_dan_tuo_sizes(front_dan.len(), front_tuo.len(), back_dan.len(), back_tuo.len())?;

        let front_all: Vec<u8> = front_dan.iter().chain(&front_tuo).copied().collect();
        let back_all: Vec<u8> = back_dan.iter().chain(&back_tuo).copied().collect();
        // Duplicates across the concatenation mean dan and tuo overlap.
        check_numbers(Pool::Front, &front_all, "front dan/tuo")?;
        check_numbers(Pool::Back, &back_all, "back dan/tuo")?;

        Ok(BetSlip::DanTuo {
            front_dan: sorted(front_dan),
            front_tuo: sorted(front_tuo),
            back_dan: sorted(back_dan),
            back_tuo: sorted(back_tuo),
        })
    }

    /// Number of 5+2 tickets the slip stands for.
    pub fn combinations(&self) -> u64 {
        match self {
            BetSlip::Single { .. } => 1,
            BetSlip::Compound { front, back } => binomial(front.len(), 5) * binomial(back.len(), 2),
            BetSlip::DanTuo {
                front_dan,
                front_tuo,
                back_dan,
                back_tuo,
            } => {
                binomial(front_tuo.len(), 5usize.saturating_sub(front_dan.len()))
                    * binomial(back_tuo.len(), 2usize.saturating_sub(back_dan.len()))
            }
        }
    }
}

pub fn binomial(n: usize, k: usize) -> u64 {
    if k > n {
        return 0;
    }
    let k = k.min(n - k);
    let mut result = 1u64;
    for i in 0..k {
        result = result * (n - i) as u64 / (i + 1) as u64;
    }
    result
}

fn sorted(mut numbers: Vec<u8>) -> Vec<u8> {
    numbers.sort_unstable();
    numbers
}

fn check_numbers(pool: Pool, numbers: &[u8], label: &str) -> Result<(), SlipError> {
    if let Some(&n) = numbers.iter().find(|&&n| !pool.contains(n)) {
        return Err(SlipError::InvalidSlipShape(format!(
            "{label} number {n} outside 1-{}",
            pool.size()
        )));
    }
    let mut seen = vec![false; pool.size() + 1];
    for &n in numbers {
        if seen[n as usize] {
            return Err(SlipError::InvalidSlipShape(format!("{label} number {n} listed twice")));
        }
        seen[n as usize] = true;
    }
    Ok(())
}

fn check_compound_sizes(front: usize, back: usize) -> Result<(), SlipError> {
    if !(5..=Pool::Front.size()).contains(&front) || !(2..=Pool::Back.size()).contains(&back) {
        return Err(SlipError::InvalidSlipShape(format!(
            "compound needs 5-35 front and 2-12 back, got {front}+{back}"
        )));
    }
    Ok(())
}

fn check_dan_tuo_sizes(d_f: usize, t_f: usize, d_b: usize, t_b: usize) -> Result<(), SlipError> {
    if !(1..=4).contains(&d_f) {
        return Err(SlipError::InvalidSlipShape(format!("front dan count {d_f} outside 1-4")));
    }
    if d_f + t_f < 6 {
        return Err(SlipError::InvalidSlipShape(format!(
            "front dan+tuo is {}, needs at least 6",
            d_f + t_f
        )));
    }
    if d_b > 1 {
        return Err(SlipError::InvalidSlipShape(format!("back dan count {d_b} outside 0-1")));
    }
    if d_b + t_b < 3 {
        return Err(SlipError::InvalidSlipShape(format!(
            "back dan+tuo is {}, needs at least 3",
            d_b + t_b
        )));
    }
    if d_f + t_f > Pool::Front.size() || d_b + t_b > Pool::Back.size() {
        return Err(SlipError::InvalidSlipShape(format!(
            "dan-tuo {d_f}+{t_f}/{d_b}+{t_b} exceeds the pools"
        )));
    }
    Ok(())
}

fn resolve_dan(ranking: &FusedRanking, pool: Pool, dan: &DanSpec) -> Result<Vec<u8>, SlipError> {
    match dan {
        DanSpec::Count(n) => {
            if *n > pool.size() {
                return Err(SlipError::InvalidSlipShape(format!("{n} {pool} dan numbers requested")));
            }
            Ok(ranking.top(pool, *n))
        }
        DanSpec::Numbers(numbers) => {
            check_numbers(pool, numbers, &format!("{pool} dan"))?;
            Ok(numbers.clone())
        }
    }
}

/// Next-best numbers of `pool` not already in `dan`.
fn fill_tuo(ranking: &FusedRanking, pool: Pool, dan: &[u8], count: usize) -> Vec<u8> {
    ranking
        .ranked(pool)
        .iter()
        .map(|&(n, _)| n)
        .filter(|n| !dan.contains(n))
        .take(count)
        .collect()
}

/// Fills `shape` with the best-ranked numbers.
pub fn build_slip(ranking: &FusedRanking, shape: &SlipShape) -> Result<BetSlip, SlipError> {
    match shape {
        SlipShape::Single => BetSlip::single(ranking.top(Pool::Front, 5), ranking.top(Pool::Back, 2)),
        SlipShape::Compound { front, back } => {
            check_compound_sizes(*front, *back)?;
            BetSlip::compound(ranking.top(Pool::Front, *front), ranking.top(Pool::Back, *back))
        }
        SlipShape::DanTuo {
            front_dan,
            front_tuo,
            back_dan,
            back_tuo,
        } => {
            check_dan_tuo_sizes(front_dan.len(), *front_tuo, back_dan.len(), *back_tuo)?;
            let front_dan = resolve_dan(ranking, Pool::Front, front_dan)?;
            let back_dan = resolve_dan(ranking, Pool::Back, back_dan)?;
            let front_tuo = fill_tuo(ranking, Pool::Front, &front_dan, *front_tuo);
            let back_tuo = fill_tuo(ranking, Pool::Back, &back_dan, *back_tuo);
            BetSlip::dan_tuo(front_dan, front_tuo, back_dan, back_tuo)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ensemble::{fuse, test_snapshot, weights::WeightMap};

    /// Front ranked 1, 2, 3, ... and back ranked 12, 11, 10, ...
    fn ranking() -> FusedRanking {
        let front: Vec<f64> = (0..35).map(|i| 1.0 - i as f64 / 40.0).collect();
        let back: Vec<f64> = (0..12).map(|i| 0.1 + i as f64 / 20.0).collect();
        fuse(&WeightMap::default(), &[test_snapshot("A", "001", front, back, 0.5)], "001")
    }

    #[test]
    fn test_binomial() {
        assert_eq!(binomial(6, 3), 20);
        assert_eq!(binomial(35, 5), 324_632);
        assert_eq!(binomial(12, 2), 66);
        assert_eq!(binomial(4, 5), 0);
        assert_eq!(binomial(7, 0), 1);
    }

    #[test]
    fn test_single_from_ranking() {
        let slip = build_slip(&ranking(), &SlipShape::Single).unwrap();
        assert_eq!(
            slip,
            BetSlip::Single {
                front: vec![1, 2, 3, 4, 5],
                back: vec![11, 12]
            }
        );
        assert_eq!(slip.combinations(), 1);
    }

    #[test]
    fn test_compound_combinations() {
        let slip = build_slip(&ranking(), &SlipShape::Compound { front: 7, back: 3 }).unwrap();
        assert_eq!(slip.combinations(), 21 * 3);
        let BetSlip::Compound { front, back } = slip else {
            panic!("expected compound");
        };
        assert_eq!(front, vec![1, 2, 3, 4, 5, 6, 7]);
        assert_eq!(back, vec![10, 11, 12]);
    }

    #[test]
    fn test_compound_rejects_small_sets() {
        for (front, back) in [(4, 2), (5, 1), (36, 2), (5, 13)] {
            let err = build_slip(&ranking(), &SlipShape::Compound { front, back }).unwrap_err();
            assert!(matches!(err, SlipError::InvalidSlipShape(_)), "{front}+{back}");
        }
    }

    #[test]
    fn test_dan_tuo_counts_from_ranking() {
        let shape = SlipShape::DanTuo {
            front_dan: DanSpec::Count(2),
            front_tuo: 6,
            back_dan: DanSpec::Count(1),
            back_tuo: 4,
        };
        let slip = build_slip(&ranking(), &shape).unwrap();
        assert_eq!(slip.combinations(), 80);
        assert_eq!(
            slip,
            BetSlip::DanTuo {
                front_dan: vec![1, 2],
                front_tuo: vec![3, 4, 5, 6, 7, 8],
                back_dan: vec![12],
                back_tuo: vec![8, 9, 10, 11],
            }
        );
    }

    #[test]
    fn test_dan_tuo_explicit_lists() {
        let slip = BetSlip::dan_tuo(vec![1, 9], vec![3, 7, 11, 22, 31, 34], vec![5], vec![9, 11, 12]).unwrap();
        assert_eq!(slip.combinations(), 60);
    }

    #[test]
    fn test_dan_tuo_explicit_dan_skipped_in_tuo() {
        let shape = SlipShape::DanTuo {
            front_dan: DanSpec::Numbers(vec![3, 30]),
            front_tuo: 4,
            back_dan: DanSpec::Numbers(vec![]),
            back_tuo: 3,
        };
        let slip = build_slip(&ranking(), &shape).unwrap();
        let BetSlip::DanTuo { front_tuo, back_dan, .. } = &slip else {
            panic!("expected dan-tuo");
        };
        assert_eq!(front_tuo, &vec![1, 2, 4, 5]);
        assert!(back_dan.is_empty());
        assert_eq!(slip.combinations(), binomial(4, 3) * binomial(3, 2));
    }

    #[test]
    fn test_dan_tuo_violations() {
        let cases = [
            (vec![], vec![1, 2, 3, 4, 5, 6], vec![1], vec![2, 3]),
            (vec![1, 2, 3, 4, 5], vec![6], vec![1], vec![2, 3]),
            (vec![1, 2], vec![3, 4, 5], vec![1], vec![2, 3]),
            (vec![1, 2], vec![3, 4, 5, 6], vec![1, 2], vec![3]),
            (vec![1, 2], vec![3, 4, 5, 6], vec![1], vec![2]),
            (vec![1, 2], vec![2, 4, 5, 6], vec![1], vec![2, 3]),
            (vec![1, 2], vec![3, 4, 5, 6], vec![1], vec![1, 3]),
            (vec![1, 2], vec![3, 4, 5, 36], vec![1], vec![2, 3]),
        ];
        for (fd, ft, bd, bt) in cases {
            let label = format!("{fd:?} {ft:?} {bd:?} {bt:?}");
            assert!(BetSlip::dan_tuo(fd, ft, bd, bt).is_err(), "{label}");
        }
    }

    #[test]
    fn test_parse_shapes() {
        assert_eq!("single".parse::<SlipShape>().unwrap(), SlipShape::Single);
        assert_eq!(
            "Compound:7+3".parse::<SlipShape>().unwrap(),
            SlipShape::Compound { front: 7, back: 3 }
        );
        let dantuo: SlipShape = "dantuo:2+6/1+4".parse().unwrap();
        assert_eq!(
            dantuo,
            SlipShape::DanTuo {
                front_dan: DanSpec::Count(2),
                front_tuo: 6,
                back_dan: DanSpec::Count(1),
                back_tuo: 4,
            }
        );
        assert_eq!(dantuo.to_string(), "dantuo:2+6/1+4");
        assert!("compound:7".parse::<SlipShape>().is_err());
        assert!("dantuo:2+6".parse::<SlipShape>().is_err());
        assert!("triple".parse::<SlipShape>().is_err());
    }

    #[test]
    fn test_validate_without_ranking() {
        assert!(SlipShape::Single.validate().is_ok());
        assert!(SlipShape::Compound { front: 4, back: 2 }.validate().is_err());
        let bad_dan = SlipShape::DanTuo {
            front_dan: DanSpec::Numbers(vec![1, 40]),
            front_tuo: 5,
            back_dan: DanSpec::Count(1),
            back_tuo: 2,
        };
        assert!(bad_dan.validate().is_err());
    }

    #[test]
    fn test_single_rejects_wrong_cardinality() {
        assert!(BetSlip::single(vec![1, 2, 3, 4], vec![1, 2]).is_err());
        assert!(BetSlip::single(vec![1, 2, 3, 4, 4], vec![1, 2]).is_err());
    }
}
