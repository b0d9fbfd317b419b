use rusqlite::{Connection, OptionalExtension};
use std::path::Path;

use crate::error::{DbError, Result};
use crate::models::{validate_draw, Draw};

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS draws (
    period_id  TEXT PRIMARY KEY,
    draw_date  TEXT NOT NULL,
    front_1    INTEGER NOT NULL,
    front_2    INTEGER NOT NULL,
    front_3    INTEGER NOT NULL,
    front_4    INTEGER NOT NULL,
    front_5    INTEGER NOT NULL,
    back_1     INTEGER NOT NULL,
    back_2     INTEGER NOT NULL
);
";

const DRAW_COLUMNS: &str =
    "period_id, draw_date, front_1, front_2, front_3, front_4, front_5, back_1, back_2";

pub fn db_path() -> std::path::PathBuf {
    let mut path = std::env::current_dir().unwrap_or_default();
    path.push("data");
    path.push("dlt.db");
    path
}

pub fn open_db(path: &Path) -> Result<Connection> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    let conn = Connection::open(path)?;
    Ok(conn)
}

pub fn migrate(conn: &Connection) -> Result<()> {
    conn.execute_batch(SCHEMA)?;
    Ok(())
}

pub fn insert_draw(conn: &Connection, draw: &Draw) -> Result<bool> {
    let changed = conn.execute(
        &format!("INSERT OR IGNORE INTO draws ({DRAW_COLUMNS}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)"),
        rusqlite::params![
            draw.period_id,
            draw.draw_date,
            draw.front[0],
            draw.front[1],
            draw.front[2],
            draw.front[3],
            draw.front[4],
            draw.back[0],
            draw.back[1],
        ],
    )?;
    Ok(changed > 0)
}

fn row_to_draw(row: &rusqlite::Row) -> rusqlite::Result<Draw> {
    Ok(Draw {
        period_id: row.get(0)?,
        draw_date: row.get(1)?,
        front: [
            row.get::<_, u8>(2)?,
            row.get::<_, u8>(3)?,
            row.get::<_, u8>(4)?,
            row.get::<_, u8>(5)?,
            row.get::<_, u8>(6)?,
        ],
        back: [row.get::<_, u8>(7)?, row.get::<_, u8>(8)?],
    })
}

/// Stored rows bypass `Draw::new`; anything out of range or repeated is
/// reported as corruption rather than handed to the scorers.
fn checked(draw: Draw) -> Result<Draw> {
    validate_draw(&draw.front, &draw.back)
        .map_err(|e| DbError::Corrupt(format!("period {}: {}", draw.period_id, e)))?;
    Ok(draw)
}

fn collect_checked(rows: impl Iterator<Item = rusqlite::Result<Draw>>) -> Result<Vec<Draw>> {
    rows.map(|row| checked(row?)).collect()
}

/// Most recent draws first.
pub fn fetch_last_draws(conn: &Connection, limit: u32) -> Result<Vec<Draw>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {DRAW_COLUMNS} FROM draws ORDER BY period_id DESC LIMIT ?1"
    ))?;
    let draws = stmt.query_map([limit], row_to_draw)?;
    collect_checked(draws)
}

/// History prefix strictly before `period_id`, oldest first.
pub fn fetch_history_before(conn: &Connection, period_id: &str) -> Result<Vec<Draw>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {DRAW_COLUMNS} FROM draws WHERE period_id < ?1 ORDER BY period_id ASC"
    ))?;
    let draws = stmt.query_map([period_id], row_to_draw)?;
    collect_checked(draws)
}

/// Draws with `from <= period_id <= to`, oldest first.
pub fn fetch_draws_between(conn: &Connection, from: &str, to: &str) -> Result<Vec<Draw>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {DRAW_COLUMNS} FROM draws WHERE period_id >= ?1 AND period_id <= ?2 ORDER BY period_id ASC"
    ))?;
    let draws = stmt.query_map([from, to], row_to_draw)?;
    collect_checked(draws)
}

pub fn fetch_draw(conn: &Connection, period_id: &str) -> Result<Option<Draw>> {
    let draw = conn
        .query_row(
            &format!("SELECT {DRAW_COLUMNS} FROM draws WHERE period_id = ?1"),
            [period_id],
            row_to_draw,
        )
        .optional()?;
    draw.map(checked).transpose()
}

pub fn count_draws(conn: &Connection) -> Result<u32> {
    let count: u32 = conn.query_row("SELECT COUNT(*) FROM draws", [], |row| row.get(0))?;
    Ok(count)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn test_draw(id: &str, day: u32) -> Draw {
        Draw::new(
            id,
            NaiveDate::from_ymd_opt(2025, 1, day).unwrap(),
            [1, 2, 3, 4, 5],
            [1, 2],
        )
        .unwrap()
    }

    fn setup() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        migrate(&conn).unwrap();
        conn
    }

    #[test]
    fn test_insert_and_count() {
        let conn = setup();
        assert_eq!(count_draws(&conn).unwrap(), 0);

        insert_draw(&conn, &test_draw("2025001", 1)).unwrap();
        assert_eq!(count_draws(&conn).unwrap(), 1);
    }

    #[test]
    fn test_duplicate_ignored() {
        let conn = setup();

        assert!(insert_draw(&conn, &test_draw("2025001", 1)).unwrap());
        assert!(!insert_draw(&conn, &test_draw("2025001", 1)).unwrap());
        assert_eq!(count_draws(&conn).unwrap(), 1);
    }

    #[test]
    fn test_fetch_last_order() {
        let conn = setup();
        insert_draw(&conn, &test_draw("2025001", 1)).unwrap();
        insert_draw(&conn, &test_draw("2025003", 5)).unwrap();
        insert_draw(&conn, &test_draw("2025002", 3)).unwrap();

        let draws = fetch_last_draws(&conn, 10).unwrap();
        let ids: Vec<&str> = draws.iter().map(|d| d.period_id.as_str()).collect();
        assert_eq!(ids, vec!["2025003", "2025002", "2025001"]);
    }

    #[test]
    fn test_history_before_excludes_target() {
        let conn = setup();
        for (i, id) in ["2025001", "2025002", "2025003", "2025004"].iter().enumerate() {
            insert_draw(&conn, &test_draw(id, i as u32 + 1)).unwrap();
        }

        let history = fetch_history_before(&conn, "2025003").unwrap();
        let ids: Vec<&str> = history.iter().map(|d| d.period_id.as_str()).collect();
        assert_eq!(ids, vec!["2025001", "2025002"]);
    }

    #[test]
    fn test_fetch_draw_roundtrip() {
        let conn = setup();
        let draw = test_draw("2025001", 7);
        insert_draw(&conn, &draw).unwrap();

        assert_eq!(fetch_draw(&conn, "2025001").unwrap(), Some(draw));
        assert_eq!(fetch_draw(&conn, "2025999").unwrap(), None);
    }

    #[test]
    fn test_fetch_between_inclusive() {
        let conn = setup();
        for (i, id) in ["2025001", "2025002", "2025003", "2025004"].iter().enumerate() {
            insert_draw(&conn, &test_draw(id, i as u32 + 1)).unwrap();
        }
        let draws = fetch_draws_between(&conn, "2025002", "2025003").unwrap();
        assert_eq!(draws.len(), 2);
        assert_eq!(draws[0].period_id, "2025002");
    }

    #[test]
    fn test_out_of_range_row_reported_corrupt() {
        let conn = setup();
        insert_draw(&conn, &test_draw("2025001", 1)).unwrap();
        insert_draw(&conn, &test_draw("2025002", 2)).unwrap();
        conn.execute("UPDATE draws SET front_5 = 36 WHERE period_id = '2025001'", [])
            .unwrap();

        assert!(matches!(fetch_history_before(&conn, "2025002"), Err(DbError::Corrupt(_))));
        assert!(matches!(fetch_last_draws(&conn, 10), Err(DbError::Corrupt(_))));
        assert!(matches!(fetch_draws_between(&conn, "2025001", "2025002"), Err(DbError::Corrupt(_))));
        assert!(matches!(fetch_draw(&conn, "2025001"), Err(DbError::Corrupt(_))));
        // Rows outside the corrupt one still read cleanly.
        assert!(fetch_draw(&conn, "2025002").unwrap().is_some());
        assert!(fetch_history_before(&conn, "2025001").unwrap().is_empty());
    }

    #[test]
    fn test_repeated_number_row_reported_corrupt() {
        let conn = setup();
        insert_draw(&conn, &test_draw("2025001", 1)).unwrap();
        conn.execute("UPDATE draws SET back_2 = back_1 WHERE period_id = '2025001'", [])
            .unwrap();

        match fetch_draw(&conn, "2025001") {
            Err(DbError::Corrupt(msg)) => assert!(msg.contains("2025001")),
            other => panic!("expected corrupt record, got {:?}", other),
        }
    }
}
