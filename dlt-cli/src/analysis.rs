use dlt_db::models::{Draw, NumberStats, Pool};

/// Frequency and current omission of every number of `pool`.
/// `draws` are most recent first, as returned by `fetch_last_draws`.
pub fn compute_stats(draws: &[Draw], pool: Pool) -> Vec<NumberStats> {
    let mut stats: Vec<NumberStats> = (1..=pool.size() as u8)
        .map(|n| NumberStats {
            number: n,
            frequency: 0,
            omission: draws.len() as u32,
        })
        .collect();
    let mut seen = vec![false; pool.size()];

    for (i, draw) in draws.iter().enumerate() {
        for &n in pool.numbers_from(draw) {
            let idx = (n - 1) as usize;
            if let Some(stat) = stats.get_mut(idx) {
                stat.frequency += 1;
                if !seen[idx] {
                    stat.omission = i as u32;
                    seen[idx] = true;
                }
            }
        }
    }

    stats
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn draw(id: &str, front: [u8; 5], back: [u8; 2]) -> Draw {
        Draw::new(id, NaiveDate::from_ymd_opt(2025, 1, 1).unwrap(), front, back).unwrap()
    }

    #[test]
    fn test_frequency_and_omission() {
        // Most recent first.
        let draws = vec![
            draw("003", [1, 2, 3, 4, 5], [1, 2]),
            draw("002", [1, 6, 7, 8, 9], [1, 3]),
            draw("001", [10, 6, 11, 12, 13], [4, 5]),
        ];
        let front = compute_stats(&draws, Pool::Front);
        assert_eq!(front.len(), 35);
        assert_eq!(front[0].frequency, 2);
        assert_eq!(front[0].omission, 0);
        assert_eq!(front[5].frequency, 2);
        assert_eq!(front[5].omission, 1);
        assert_eq!(front[9].omission, 2);
        assert_eq!(front[34].frequency, 0);
        assert_eq!(front[34].omission, 3);

        let back = compute_stats(&draws, Pool::Back);
        assert_eq!(back.len(), 12);
        assert_eq!(back[0].frequency, 2);
        assert_eq!(back[3].omission, 2);
    }

    #[test]
    fn test_frequencies_sum_to_picks() {
        let draws = vec![
            draw("002", [1, 2, 3, 4, 5], [1, 2]),
            draw("001", [31, 32, 33, 34, 35], [11, 12]),
        ];
        let total: u32 = compute_stats(&draws, Pool::Front).iter().map(|s| s.frequency).sum();
        assert_eq!(total, 10);
    }
}
