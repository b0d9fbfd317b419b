//! Prediction snapshots, evaluation records and weight history.
//!
//! Snapshot sets and evaluation sets are written inside one transaction:
//! either the whole set lands or nothing does.

use std::collections::BTreeMap;

use rusqlite::Connection;

use crate::error::{DbError, Result};
use crate::models::{EvaluationRecord, Pool, ScorerSnapshot, WeightRecord};

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS predictions (
    scorer_name     TEXT NOT NULL,
    scorer_version  TEXT NOT NULL,
    period_id       TEXT NOT NULL,
    created_at      TEXT NOT NULL,
    front_scores    TEXT NOT NULL,
    back_scores     TEXT NOT NULL,
    confidence      REAL NOT NULL,
    params          TEXT NOT NULL DEFAULT '{}',
    diagnostics     TEXT NOT NULL DEFAULT 'null',
    PRIMARY KEY (scorer_name, period_id)
);

CREATE TABLE IF NOT EXISTS evaluations (
    scorer_name   TEXT NOT NULL,
    period_id     TEXT NOT NULL,
    front_hits    INTEGER NOT NULL,
    back_hits     INTEGER NOT NULL,
    hit_rate      REAL NOT NULL,
    composite     REAL NOT NULL,
    evaluated_at  TEXT NOT NULL,
    PRIMARY KEY (scorer_name, period_id)
);

CREATE TABLE IF NOT EXISTS weights (
    period_id   TEXT PRIMARY KEY,
    weights     TEXT NOT NULL,
    alpha       REAL NOT NULL,
    updated_at  TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_predictions_period ON predictions(period_id);
CREATE INDEX IF NOT EXISTS idx_evaluations_period ON evaluations(period_id);
";

const SNAPSHOT_COLUMNS: &str = "scorer_name, scorer_version, period_id, created_at, front_scores, back_scores, confidence, params, diagnostics";
const EVALUATION_COLUMNS: &str =
    "scorer_name, period_id, front_hits, back_hits, hit_rate, composite, evaluated_at";

pub fn migrate(conn: &Connection) -> Result<()> {
    conn.execute_batch(SCHEMA)?;
    Ok(())
}

/// Score vectors are stored as a JSON object `number -> score`.
fn scores_to_json(scores: &[f64]) -> Result<String> {
    let map: BTreeMap<u8, f64> = scores
        .iter()
        .enumerate()
        .map(|(i, &s)| ((i + 1) as u8, s))
        .collect();
    Ok(serde_json::to_string(&map)?)
}

fn scores_from_json(json: &str, pool: Pool) -> Result<Vec<f64>> {
    let map: BTreeMap<u8, f64> = serde_json::from_str(json)?;
    let mut scores = vec![0.0; pool.size()];
    for (number, score) in map {
        if !pool.contains(number) {
            return Err(DbError::Corrupt(format!("{} number {} in stored scores", pool, number)));
        }
        scores[(number - 1) as usize] = score;
    }
    Ok(scores)
}

struct RawSnapshot {
    scorer_name: String,
    scorer_version: String,
    period_id: String,
    created_at: chrono::DateTime<chrono::Utc>,
    front_scores: String,
    back_scores: String,
    confidence: f64,
    params: String,
    diagnostics: String,
}

impl RawSnapshot {
    fn decode(self) -> Result<ScorerSnapshot> {
        Ok(ScorerSnapshot {
            front_scores: scores_from_json(&self.front_scores, Pool::Front)?,
            back_scores: scores_from_json(&self.back_scores, Pool::Back)?,
            params: serde_json::from_str(&self.params)?,
            diagnostics: serde_json::from_str(&self.diagnostics)?,
            scorer_name: self.scorer_name,
            scorer_version: self.scorer_version,
            period_id: self.period_id,
            created_at: self.created_at,
            confidence: self.confidence,
        })
    }
}

/// Persists a snapshot set atomically. Without `overwrite`, a key that already
/// exists aborts the whole set.
pub fn save_snapshots(conn: &Connection, snapshots: &[ScorerSnapshot], overwrite: bool) -> Result<usize> {
    let verb = if overwrite { "INSERT OR REPLACE" } else { "INSERT" };
    let sql = format!(
        "{verb} INTO predictions ({SNAPSHOT_COLUMNS}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)"
    );

    let tx = conn.unchecked_transaction()?;
    {
        let mut stmt = tx.prepare(&sql)?;
        for snapshot in snapshots {
            stmt.execute(rusqlite::params![
                snapshot.scorer_name,
                snapshot.scorer_version,
                snapshot.period_id,
                snapshot.created_at,
                scores_to_json(&snapshot.front_scores)?,
                scores_to_json(&snapshot.back_scores)?,
                snapshot.confidence,
                serde_json::to_string(&snapshot.params)?,
                serde_json::to_string(&snapshot.diagnostics)?,
            ])?;
        }
    }
    tx.commit()?;
    tracing::debug!(count = snapshots.len(), overwrite, "snapshot set committed");
    Ok(snapshots.len())
}

pub fn load_snapshots(conn: &Connection, period_id: &str) -> Result<Vec<ScorerSnapshot>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {SNAPSHOT_COLUMNS} FROM predictions WHERE period_id = ?1 ORDER BY scorer_name"
    ))?;
    let raws = stmt
        .query_map([period_id], |row| {
            Ok(RawSnapshot {
                scorer_name: row.get(0)?,
                scorer_version: row.get(1)?,
                period_id: row.get(2)?,
                created_at: row.get(3)?,
                front_scores: row.get(4)?,
                back_scores: row.get(5)?,
                confidence: row.get(6)?,
                params: row.get(7)?,
                diagnostics: row.get(8)?,
            })
        })?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    raws.into_iter().map(RawSnapshot::decode).collect()
}

pub fn snapshot_scorers(conn: &Connection, period_id: &str) -> Result<Vec<String>> {
    let mut stmt =
        conn.prepare("SELECT scorer_name FROM predictions WHERE period_id = ?1 ORDER BY scorer_name")?;
    let names = stmt
        .query_map([period_id], |row| row.get(0))?
        .collect::<rusqlite::Result<Vec<String>>>()?;
    Ok(names)
}

/// Upserts an evaluation set atomically; re-evaluating a period replaces its rows.
pub fn save_evaluations(conn: &Connection, records: &[EvaluationRecord]) -> Result<()> {
    let tx = conn.unchecked_transaction()?;
    {
        let mut stmt = tx.prepare(&format!(
            "INSERT OR REPLACE INTO evaluations ({EVALUATION_COLUMNS}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)"
        ))?;
        for record in records {
            stmt.execute(rusqlite::params![
                record.scorer_name,
                record.period_id,
                record.front_hits,
                record.back_hits,
                record.hit_rate,
                record.composite,
                record.evaluated_at,
            ])?;
        }
    }
    tx.commit()?;
    Ok(())
}

fn row_to_evaluation(row: &rusqlite::Row) -> rusqlite::Result<EvaluationRecord> {
    Ok(EvaluationRecord {
        scorer_name: row.get(0)?,
        period_id: row.get(1)?,
        front_hits: row.get(2)?,
        back_hits: row.get(3)?,
        hit_rate: row.get(4)?,
        composite: row.get(5)?,
        evaluated_at: row.get(6)?,
    })
}

pub fn load_evaluations(conn: &Connection, period_id: &str) -> Result<Vec<EvaluationRecord>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {EVALUATION_COLUMNS} FROM evaluations WHERE period_id = ?1 ORDER BY scorer_name"
    ))?;
    let records = stmt
        .query_map([period_id], row_to_evaluation)?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(records)
}

/// Records of the `periods` most recent evaluated periods up to and including `up_to`.
pub fn load_recent_evaluations(conn: &Connection, up_to: &str, periods: usize) -> Result<Vec<EvaluationRecord>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {EVALUATION_COLUMNS} FROM evaluations
         WHERE period_id IN (
             SELECT DISTINCT period_id FROM evaluations
             WHERE period_id <= ?1 ORDER BY period_id DESC LIMIT ?2
         )
         ORDER BY period_id, scorer_name"
    ))?;
    let records = stmt
        .query_map(rusqlite::params![up_to, periods as i64], row_to_evaluation)?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(records)
}

pub fn save_weights(conn: &Connection, record: &WeightRecord) -> Result<()> {
    conn.execute(
        "INSERT OR REPLACE INTO weights (period_id, weights, alpha, updated_at) VALUES (?1, ?2, ?3, ?4)",
        rusqlite::params![
            record.period_id,
            serde_json::to_string(&record.weights)?,
            record.alpha,
            record.updated_at,
        ],
    )?;
    Ok(())
}

fn query_weights(conn: &Connection, sql: &str, params: impl rusqlite::Params) -> Result<Vec<WeightRecord>> {
    let mut stmt = conn.prepare(sql)?;
    let raws = stmt
        .query_map(params, |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, f64>(2)?,
                row.get::<_, chrono::DateTime<chrono::Utc>>(3)?,
            ))
        })?
        .collect::<rusqlite::Result<Vec<_>>>()?;

    raws.into_iter()
        .map(|(period_id, weights, alpha, updated_at)| {
            Ok(WeightRecord {
                period_id,
                weights: serde_json::from_str(&weights)?,
                alpha,
                updated_at,
            })
        })
        .collect()
}

/// Latest-wins: the weight row learned from the greatest period.
pub fn load_current_weights(conn: &Connection) -> Result<Option<WeightRecord>> {
    let mut rows = query_weights(
        conn,
        "SELECT period_id, weights, alpha, updated_at FROM weights ORDER BY period_id DESC LIMIT 1",
        [],
    )?;
    Ok(rows.pop())
}

pub fn load_weights_before(conn: &Connection, period_id: &str) -> Result<Option<WeightRecord>> {
    let mut rows = query_weights(
        conn,
        "SELECT period_id, weights, alpha, updated_at FROM weights WHERE period_id < ?1 ORDER BY period_id DESC LIMIT 1",
        [period_id],
    )?;
    Ok(rows.pop())
}

/// Newest first.
pub fn load_weight_history(conn: &Connection, limit: u32) -> Result<Vec<WeightRecord>> {
    query_weights(
        conn,
        "SELECT period_id, weights, alpha, updated_at FROM weights ORDER BY period_id DESC LIMIT ?1",
        [limit],
    )
}

pub fn count_weight_rows(conn: &Connection) -> Result<u32> {
    let count: u32 = conn.query_row("SELECT COUNT(*) FROM weights", [], |row| row.get(0))?;
    Ok(count)
}
