use std::path::Path;
use std::process::ExitCode;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use dlt_db::rusqlite::Connection;
use dlt_db::{db, store, DbError};
use dlt_ensemble::config::AppConfig;
use dlt_ensemble::display;
use dlt_ensemble::pipeline::{BackfillReport, BackfillStep, Pipeline};
use dlt_ensemble::slips::SlipShape;
use dlt_ensemble::PipelineError;

#[derive(Parser)]
#[command(name = "dlt-ensemble", about = "Super Lotto adaptive ensemble recommendations")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Score a future period and print the fused recommendation
    Predict {
        /// Target period id (e.g. 2025121)
        target: String,

        /// Slip shape: single, compound:K1+K2 or dantuo:DF+TF/DB+TB (repeatable)
        #[arg(short, long = "slip")]
        slips: Vec<SlipShape>,

        /// Recompute every scorer and overwrite stored snapshots
        #[arg(long)]
        rerun: bool,
    },

    /// Evaluate a completed period and update the fusion weights
    Evaluate {
        /// Completed period id
        period: String,
    },

    /// Predict and learn over a range of completed periods, oldest first
    Backfill {
        /// Range as FROM..TO or FROM:TO (inclusive)
        range: String,

        /// Only evaluate periods that already have snapshots
        #[arg(long)]
        evaluate_only: bool,
    },

    /// Show the current fusion weights
    ShowWeights {
        /// Also list the last N learned weight maps
        #[arg(long)]
        history: Option<u32>,
    },

    /// Show the most recent draws
    History {
        /// Number of draws
        #[arg(short, long, default_value = "10")]
        last: u32,
    },
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("dlt_ensemble=info,dlt_db=info"));
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

fn main() -> ExitCode {
    init_tracing();
    match run(Cli::parse()) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e:#}");
            ExitCode::from(exit_code(&e))
        }
    }
}

fn exit_code(err: &anyhow::Error) -> u8 {
    if let Some(e) = err.downcast_ref::<PipelineError>() {
        return e.exit_code();
    }
    if err.downcast_ref::<DbError>().is_some() {
        return 2;
    }
    1
}

fn open(path: &str) -> Result<Connection> {
    db::open_db(Path::new(path)).with_context(|| format!("cannot open database {path}"))
}

fn run(cli: Cli) -> Result<()> {
    let config = AppConfig::load()?;

    let history = open(&config.history.url)?;
    db::migrate(&history)?;
    let store_conn = open(&config.store.url)?;
    store::migrate(&store_conn)?;

    let pipeline = Pipeline::new(&history, &store_conn, &config);
    dispatch(cli.command, &pipeline, &history)
}

/// Stored weights naming an unknown scorer fail every command, before any work.
fn dispatch(command: Command, pipeline: &Pipeline, history: &Connection) -> Result<()> {
    pipeline.current_weights()?;

    match command {
        Command::Predict { target, slips, rerun } => cmd_predict(pipeline, &target, &slips, rerun),
        Command::Evaluate { period } => cmd_evaluate(pipeline, history, &period),
        Command::Backfill { range, evaluate_only } => cmd_backfill(pipeline, &range, evaluate_only),
        Command::ShowWeights { history: limit } => cmd_show_weights(pipeline, limit),
        Command::History { last } => cmd_history(history, last),
    }
}

fn cmd_predict(pipeline: &Pipeline, target: &str, slips: &[SlipShape], rerun: bool) -> Result<()> {
    let outcome = pipeline.predict_period(target, slips, rerun)?;
    display::display_predict_outcome(&outcome);
    Ok(())
}

fn cmd_evaluate(pipeline: &Pipeline, history: &Connection, period: &str) -> Result<()> {
    let outcome = pipeline.evaluate_and_learn(period)?;
    let actual = db::fetch_draw(history, period)?;
    display::display_learn_outcome(&outcome, actual.as_ref());
    Ok(())
}

fn parse_range(range: &str) -> Result<(String, String)> {
    let (from, to) = range
        .split_once("..")
        .or_else(|| range.split_once(':'))
        .with_context(|| format!("invalid range '{range}', expected FROM..TO"))?;
    let (from, to) = (from.trim(), to.trim());
    if from.is_empty() || to.is_empty() {
        bail!("invalid range '{range}', expected FROM..TO");
    }
    if from > to {
        bail!("range start {from} is after its end {to}");
    }
    Ok((from.to_string(), to.to_string()))
}

fn cmd_backfill(pipeline: &Pipeline, range: &str, evaluate_only: bool) -> Result<()> {
    let (from, to) = parse_range(range)?;
    let periods = pipeline.backfill_periods(&from, &to)?;
    if periods.is_empty() {
        bail!("no draws recorded between {from} and {to}");
    }

    println!("Backfill of {} periods ({from} → {to})...", periods.len());

    let pb = ProgressBar::new(periods.len() as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} {msg}")
            .context("invalid progress template")?
            .progress_chars("=> "),
    );

    let mut report = BackfillReport::default();
    for period in &periods {
        pb.set_message(period.clone());
        match pipeline.backfill_step(period, evaluate_only) {
            Ok(BackfillStep::Learned { predicted, .. }) => {
                if predicted {
                    report.predicted += 1;
                }
                report.evaluated += 1;
            }
            Ok(BackfillStep::Skipped { reason }) => report.skipped.push((period.clone(), reason)),
            Err(e) => {
                pb.abandon_with_message(format!("stopped at {period}"));
                return Err(e.into());
            }
        }
        pb.inc(1);
    }
    pb.finish_with_message("done");

    display::display_backfill_report(&report);
    display::display_weights("Current weights", &pipeline.current_weights()?);
    Ok(())
}

fn cmd_show_weights(pipeline: &Pipeline, history: Option<u32>) -> Result<()> {
    display::display_weights("Current weights", &pipeline.current_weights()?);
    if let Some(limit) = history {
        println!();
        display::display_weight_history(&pipeline.weight_history(limit)?);
    }
    Ok(())
}

fn cmd_history(conn: &Connection, last: u32) -> Result<()> {
    let n = db::count_draws(conn)?;
    if n == 0 {
        bail!("history is empty; run `dlt import` first");
    }
    let draws = db::fetch_last_draws(conn, last)?;
    display::display_draws(&draws);
    Ok(())
}
