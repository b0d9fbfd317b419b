use chrono::{DateTime, Utc};
use dlt_db::models::{Draw, EvaluationRecord, Pool, ScorerSnapshot};

use super::top_numbers;
use crate::error::{PipelineError, Result};

/// Numbers a snapshot effectively bet on: its top 5 front and top 2 back.
pub fn selected_numbers(snapshot: &ScorerSnapshot) -> (Vec<u8>, Vec<u8>) {
    (
        top_numbers(&snapshot.front_scores, Pool::Front.pick_count()),
        top_numbers(&snapshot.back_scores, Pool::Back.pick_count()),
    )
}

pub fn evaluate_snapshot(actual: &Draw, snapshot: &ScorerSnapshot, evaluated_at: DateTime<Utc>) -> EvaluationRecord {
    let (front, back) = selected_numbers(snapshot);
    let front_hits = front.iter().filter(|&&n| actual.front.contains(&n)).count() as u8;
    let back_hits = back.iter().filter(|&&n| actual.back.contains(&n)).count() as u8;
    let hit_rate = (front_hits + back_hits) as f64 / 7.0;
    let confidence = if snapshot.confidence.is_finite() {
        snapshot.confidence.clamp(0.0, 1.0)
    } else {
        0.0
    };

    EvaluationRecord {
        scorer_name: snapshot.scorer_name.clone(),
        period_id: actual.period_id.clone(),
        front_hits,
        back_hits,
        hit_rate,
        composite: hit_rate * confidence,
        evaluated_at,
    }
}

/// One record per snapshot targeting `actual`'s period.
pub fn evaluate(actual: &Draw, snapshots: &[ScorerSnapshot]) -> Result<Vec<EvaluationRecord>> {
    let now = Utc::now();
    let records: Vec<EvaluationRecord> = snapshots
        .iter()
        .filter(|s| s.period_id == actual.period_id)
        .map(|s| evaluate_snapshot(actual, s, now))
        .collect();
    if records.is_empty() {
        return Err(PipelineError::MissingSnapshot(actual.period_id.clone()));
    }
    Ok(records)
}
