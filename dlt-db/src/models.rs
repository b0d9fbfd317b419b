use std::collections::BTreeMap;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{DbError, Result};

/// Front numbers at or above this value count as "large".
pub const LARGE_THRESHOLD: u8 = 18;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Draw {
    pub period_id: String,
    pub draw_date: NaiveDate,
    pub front: [u8; 5],
    pub back: [u8; 2],
}

impl Draw {
    /// Sorts both sets, then checks ranges and duplicates.
    pub fn new(
        period_id: impl Into<String>,
        draw_date: NaiveDate,
        mut front: [u8; 5],
        mut back: [u8; 2],
    ) -> Result<Self> {
        front.sort_unstable();
        back.sort_unstable();
        validate_draw(&front, &back)?;
        Ok(Self {
            period_id: period_id.into(),
            draw_date,
            front,
            back,
        })
    }

    pub fn stats(&self) -> DrawStats {
        let odd = self.front.iter().filter(|&&n| n % 2 == 1).count() as u8;
        let large = self.front.iter().filter(|&&n| n >= LARGE_THRESHOLD).count() as u8;
        let consecutive_pairs = self
            .front
            .windows(2)
            .filter(|w| w[1] == w[0] + 1)
            .count() as u8;

        DrawStats {
            front_sum: self.front.iter().map(|&n| n as u32).sum(),
            back_sum: self.back.iter().map(|&n| n as u32).sum(),
            span: self.front[4] - self.front[0],
            odd,
            even: 5 - odd,
            large,
            small: 5 - large,
            consecutive_pairs,
        }
    }
}

/// Pure functions of a draw's front and back sets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DrawStats {
    pub front_sum: u32,
    pub back_sum: u32,
    pub span: u8,
    pub odd: u8,
    pub even: u8,
    pub large: u8,
    pub small: u8,
    pub consecutive_pairs: u8,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Pool {
    Front,
    Back,
}

impl Pool {
    pub fn size(&self) -> usize {
        match self {
            Pool::Front => 35,
            Pool::Back => 12,
        }
    }

    pub fn pick_count(&self) -> usize {
        match self {
            Pool::Front => 5,
            Pool::Back => 2,
        }
    }

    pub fn numbers_from<'a>(&self, draw: &'a Draw) -> &'a [u8] {
        match self {
            Pool::Front => &draw.front,
            Pool::Back => &draw.back,
        }
    }

    pub fn contains(&self, number: u8) -> bool {
        number >= 1 && (number as usize) <= self.size()
    }

    pub fn all() -> [Pool; 2] {
        [Pool::Front, Pool::Back]
    }
}

impl std::fmt::Display for Pool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Pool::Front => write!(f, "front"),
            Pool::Back => write!(f, "back"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct NumberStats {
    pub number: u8,
    pub frequency: u32,
    pub omission: u32,
}

/// One scorer's persisted prediction for a target period.
/// Score vectors are indexed by `number - 1` and cover the whole pool.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScorerSnapshot {
    pub scorer_name: String,
    pub scorer_version: String,
    pub period_id: String,
    pub created_at: DateTime<Utc>,
    pub front_scores: Vec<f64>,
    pub back_scores: Vec<f64>,
    pub confidence: f64,
    pub params: BTreeMap<String, f64>,
    pub diagnostics: serde_json::Value,
}

impl ScorerSnapshot {
    pub fn scores(&self, pool: Pool) -> &[f64] {
        match pool {
            Pool::Front => &self.front_scores,
            Pool::Back => &self.back_scores,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluationRecord {
    pub scorer_name: String,
    pub period_id: String,
    pub front_hits: u8,
    pub back_hits: u8,
    pub hit_rate: f64,
    pub composite: f64,
    pub evaluated_at: DateTime<Utc>,
}

/// Weight map produced by learning from `period_id`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeightRecord {
    pub period_id: String,
    pub weights: BTreeMap<String, f64>,
    pub alpha: f64,
    pub updated_at: DateTime<Utc>,
}

pub fn validate_draw(front: &[u8; 5], back: &[u8; 2]) -> Result<()> {
    for &n in front {
        if !Pool::Front.contains(n) {
            return Err(DbError::InvalidDraw(format!("front number {} out of range (1-35)", n)));
        }
    }
    for &n in back {
        if !Pool::Back.contains(n) {
            return Err(DbError::InvalidDraw(format!("back number {} out of range (1-12)", n)));
        }
    }
    for i in 0..front.len() {
        for j in (i + 1)..front.len() {
            if front[i] == front[j] {
                return Err(DbError::InvalidDraw(format!("duplicate front number: {}", front[i])));
            }
        }
    }
    if back[0] == back[1] {
        return Err(DbError::InvalidDraw(format!("duplicate back number: {}", back[0])));
    }
    Ok(())
}
