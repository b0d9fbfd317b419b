use anyhow::{bail, Context, Result};
use chrono::NaiveDate;
use dlt_db::rusqlite::Connection;
use std::io::Read;
use std::path::Path;

use dlt_db::db::insert_draw;
use dlt_db::models::Draw;

const HEADER: [&str; 9] = [
    "period_id",
    "draw_date",
    "front_1",
    "front_2",
    "front_3",
    "front_4",
    "front_5",
    "back_1",
    "back_2",
];

pub fn parse_date(raw: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d")
        .with_context(|| format!("invalid date '{}', expected YYYY-MM-DD", raw))
}

fn parse_record(record: &csv::StringRecord) -> Result<Draw> {
    let get = |idx: usize| -> Result<String> {
        record
            .get(idx)
            .map(|s| s.trim().to_string())
            .with_context(|| format!("missing field {}", HEADER[idx]))
    };

    let get_u8 = |idx: usize| -> Result<u8> {
        let s = get(idx)?;
        s.parse::<u8>()
            .with_context(|| format!("cannot parse {} '{}'", HEADER[idx], s))
    };

    let period_id = get(0)?;
    if period_id.is_empty() {
        bail!("empty period_id");
    }
    let draw_date = parse_date(&get(1)?)?;
    let front = [get_u8(2)?, get_u8(3)?, get_u8(4)?, get_u8(5)?, get_u8(6)?];
    let back = [get_u8(7)?, get_u8(8)?];

    Ok(Draw::new(period_id, draw_date, front, back)?)
}

#[derive(Debug, Default, PartialEq, Eq)]
pub struct ImportResult {
    pub total_records: u32,
    pub inserted: u32,
    pub skipped: u32,
    pub errors: u32,
}

pub fn import_csv(conn: &Connection, path: &Path) -> Result<ImportResult> {
    let file = std::fs::File::open(path).with_context(|| format!("cannot open {:?}", path))?;
    import_reader(conn, file)
}

/// Imports every row in one transaction. Malformed rows are counted and skipped.
pub fn import_reader<R: Read>(conn: &Connection, input: R) -> Result<ImportResult> {
    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .from_reader(input);

    let headers = reader.headers().context("cannot read CSV header")?.clone();
    let names: Vec<&str> = headers.iter().map(str::trim).collect();
    if names != HEADER {
        bail!("unexpected CSV header '{}', expected '{}'", names.join(","), HEADER.join(","));
    }

    let tx = conn
        .unchecked_transaction()
        .context("cannot start transaction")?;

    let mut result = ImportResult::default();

    for record_result in reader.records() {
        result.total_records += 1;
        let line = result.total_records + 1;
        match record_result {
            Ok(record) => match parse_record(&record) {
                Ok(draw) => match insert_draw(&tx, &draw) {
                    Ok(true) => result.inserted += 1,
                    Ok(false) => result.skipped += 1,
                    Err(e) => {
                        tracing::warn!(line, "insert failed: {e}");
                        result.errors += 1;
                    }
                },
                Err(e) => {
                    tracing::warn!(line, "rejected row: {e:#}");
                    result.errors += 1;
                }
            },
            Err(e) => {
                tracing::warn!(line, "unreadable row: {e}");
                result.errors += 1;
            }
        }
    }

    tx.commit().context("commit failed")?;
    tracing::info!(
        inserted = result.inserted,
        skipped = result.skipped,
        errors = result.errors,
        "import finished"
    );
    Ok(result)
}
