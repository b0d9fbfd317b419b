mod analysis;
mod display;
mod import;

use std::io::{self, Write};
use std::path::PathBuf;

use anyhow::{Context, Result};
use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::analysis::compute_stats;
use crate::display::{display_draws, display_import_summary, display_stats};
use dlt_db::db::{count_draws, db_path, fetch_last_draws, insert_draw, migrate, open_db};
use dlt_db::models::{validate_draw, Draw, Pool};
use dlt_db::rusqlite::Connection;

#[derive(Parser)]
#[command(name = "dlt", about = "Super Lotto draw history")]
struct Cli {
    /// History database (defaults to data/dlt.db in the working directory)
    #[arg(long, global = true, env = "DLT_HISTORY__URL")]
    db: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Import draws from a CSV file
    Import {
        /// CSV with header period_id,draw_date,front_1..front_5,back_1,back_2
        #[arg(short, long, default_value = "assets/dlt.csv")]
        file: PathBuf,
    },

    /// Print the database path
    DbPath,

    /// List the most recent draws
    List {
        /// Number of draws
        #[arg(short, long, default_value = "10")]
        last: u32,
    },

    /// Per-number frequency and omission
    Stats {
        /// Number of recent draws to analyse
        #[arg(short, long, default_value = "100")]
        window: u32,
    },

    /// Enter a draw by hand
    Add,
}

fn main() -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("dlt_db=info,dlt=info"));
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();
    let path = cli.db.unwrap_or_else(db_path);
    let conn = open_db(&path).with_context(|| format!("cannot open {}", path.display()))?;
    migrate(&conn)?;

    match cli.command {
        Command::Import { file } => cmd_import(&conn, &file),
        Command::DbPath => {
            println!("{}", path.display());
            Ok(())
        }
        Command::List { last } => cmd_list(&conn, last),
        Command::Stats { window } => cmd_stats(&conn, window),
        Command::Add => cmd_add(&conn),
    }
}

fn cmd_import(conn: &Connection, file: &PathBuf) -> Result<()> {
    let result = import::import_csv(conn, file)?;
    display_import_summary(&result);
    Ok(())
}

fn cmd_list(conn: &Connection, last: u32) -> Result<()> {
    let n = count_draws(conn)?;
    if n == 0 {
        println!("Empty history. Run: dlt import");
        return Ok(());
    }
    let draws = fetch_last_draws(conn, last)?;
    display_draws(&draws);
    Ok(())
}

fn cmd_stats(conn: &Connection, window: u32) -> Result<()> {
    let n = count_draws(conn)?;
    if n == 0 {
        println!("Empty history. Run: dlt import");
        return Ok(());
    }
    let effective_window = window.min(n);
    let draws = fetch_last_draws(conn, effective_window)?;

    let front = compute_stats(&draws, Pool::Front);
    let back = compute_stats(&draws, Pool::Back);
    display_stats(&front, &back, effective_window);
    Ok(())
}

fn cmd_add(conn: &Connection) -> Result<()> {
    println!("Manual draw entry\n");

    let period_id = prompt("Period id (e.g. 2025121): ")?;
    if period_id.is_empty() {
        anyhow::bail!("period id is required");
    }
    let raw_date = prompt("Draw date (YYYY-MM-DD): ")?;
    let draw_date = NaiveDate::parse_from_str(&raw_date, "%Y-%m-%d").context("invalid date")?;

    let front = prompt_numbers::<5>(Pool::Front)?;
    let back = prompt_numbers::<2>(Pool::Back)?;

    let draw = Draw::new(period_id, draw_date, front, back)?;

    println!("\nDraw to insert:");
    display_draws(std::slice::from_ref(&draw));

    let confirm = prompt("\nInsert it? (y/n): ")?;
    if confirm.eq_ignore_ascii_case("y") {
        if insert_draw(conn, &draw)? {
            println!("Draw inserted.");
        } else {
            println!("Period already recorded (duplicate ignored).");
        }
    } else {
        println!("Cancelled.");
    }

    Ok(())
}

fn prompt(msg: &str) -> Result<String> {
    print!("{}", msg);
    io::stdout().flush()?;
    let mut input = String::new();
    io::stdin().read_line(&mut input).context("cannot read stdin")?;
    Ok(input.trim().to_string())
}

fn prompt_numbers<const N: usize>(pool: Pool) -> Result<[u8; N]> {
    loop {
        let input = prompt(&format!("{} {} numbers (1-{}, space separated): ", N, pool, pool.size()))?;
        let parsed: Result<Vec<u8>, _> = input.split_whitespace().map(|s| s.parse::<u8>()).collect();
        match parsed.ok().and_then(|v| <[u8; N]>::try_from(v).ok()) {
            Some(numbers) if numbers_valid(pool, &numbers) => return Ok(numbers),
            Some(_) => println!("Numbers out of range or repeated. Try again."),
            None => println!("Enter exactly {} numbers. Try again.", N),
        }
    }
}

fn numbers_valid(pool: Pool, numbers: &[u8]) -> bool {
    match pool {
        Pool::Front => <[u8; 5]>::try_from(numbers).is_ok_and(|f| validate_draw(&f, &[1, 2]).is_ok()),
        Pool::Back => <[u8; 2]>::try_from(numbers).is_ok_and(|b| validate_draw(&[1, 2, 3, 4, 5], &b).is_ok()),
    }
}
