use comfy_table::{presets::UTF8_FULL, Cell, Color, ContentArrangement, Table};

use dlt_db::models::{Draw, EvaluationRecord, Pool, WeightRecord};

use crate::ensemble::weights::WeightMap;
use crate::pipeline::{BackfillReport, LearnOutcome, PredictOutcome, Recommendation};
use crate::slips::BetSlip;

fn new_table() -> Table {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic);
    table
}

pub fn format_numbers(numbers: &[u8]) -> String {
    numbers
        .iter()
        .map(|n| format!("{:02}", n))
        .collect::<Vec<_>>()
        .join(" ")
}

fn weight_bar(weight: f64) -> String {
    "█".repeat((weight.clamp(0.0, 1.0) * 30.0).round() as usize)
}

pub fn display_predict_outcome(outcome: &PredictOutcome) {
    if outcome.cached {
        println!("Snapshot set already stored, reusing it.");
    } else if !outcome.ran.is_empty() {
        println!("Scorers run: {}", outcome.ran.join(", "));
    }
    for (name, err) in &outcome.failures {
        println!("  ✗ {name}: {err}");
    }
    display_recommendation(&outcome.recommendation);
}

pub fn display_recommendation(rec: &Recommendation) {
    println!(
        "\n== Recommendation for {} (confidence {:.3}) ==",
        rec.period_id, rec.ranking.confidence
    );

    for pool in Pool::all() {
        let (ranked, spread) = match pool {
            Pool::Front => (rec.top_front(), &rec.ranking.front_spread),
            Pool::Back => (rec.top_back(), &rec.ranking.back_spread),
        };
        println!("\n── Top {} {} ──", ranked.len(), pool);

        let mut table = new_table();
        table.set_header(vec!["#", "Number", "Score", "Spread"]);
        for (rank, &(number, score)) in ranked.iter().enumerate() {
            let s = spread.get((number - 1) as usize).copied().unwrap_or(0.0);
            table.add_row(vec![
                format!("{}", rank + 1),
                format!("{:02}", number),
                format!("{:.4}", score),
                format!("{:.4}", s),
            ]);
        }
        println!("{table}");
    }

    println!("\n── Contributors ──");
    let mut table = new_table();
    table.set_header(vec!["Scorer", "Weight", ""]);
    for (name, w) in &rec.ranking.contributors {
        table.add_row(vec![name.clone(), format!("{:.4}", w), weight_bar(*w)]);
    }
    println!("{table}");

    if !rec.slips.is_empty() {
        display_slips(&rec.slips.iter().map(|(_, slip)| slip.clone()).collect::<Vec<_>>());
    }
}

pub fn display_slips(slips: &[BetSlip]) {
    println!("\n── Slips ──");
    let mut table = new_table();
    table.set_header(vec!["Kind", "Front", "Back", "Combinations"]);
    for slip in slips {
        let (kind, front, back) = match slip {
            BetSlip::Single { front, back } => ("single", format_numbers(front), format_numbers(back)),
            BetSlip::Compound { front, back } => ("compound", format_numbers(front), format_numbers(back)),
            BetSlip::DanTuo {
                front_dan,
                front_tuo,
                back_dan,
                back_tuo,
            } => (
                "dan-tuo",
                format!("[{}] {}", format_numbers(front_dan), format_numbers(front_tuo)),
                format!("[{}] {}", format_numbers(back_dan), format_numbers(back_tuo)),
            ),
        };
        table.add_row(vec![
            kind.to_string(),
            front,
            back,
            slip.combinations().to_string(),
        ]);
    }
    println!("{table}");
}

pub fn display_weights(title: &str, weights: &WeightMap) {
    println!("\n== {title} ==\n");
    let mut table = new_table();
    table.set_header(vec!["Scorer", "Weight", "Contribution"]);
    for (name, &w) in weights.iter() {
        table.add_row(vec![name.clone(), format!("{:.4}", w), weight_bar(w)]);
    }
    println!("{table}");
}

pub fn display_weight_history(records: &[WeightRecord]) {
    if records.is_empty() {
        println!("No weights learned yet.");
        return;
    }
    let names: Vec<&String> = {
        let mut names: Vec<&String> = records.iter().flat_map(|r| r.weights.keys()).collect();
        names.sort();
        names.dedup();
        names
    };

    let mut table = new_table();
    let mut header = vec!["Period".to_string(), "α".to_string()];
    header.extend(names.iter().map(|n| n.to_string()));
    table.set_header(header);

    for record in records {
        let mut row = vec![record.period_id.clone(), format!("{:.2}", record.alpha)];
        for name in &names {
            row.push(
                record
                    .weights
                    .get(*name)
                    .map(|w| format!("{:.4}", w))
                    .unwrap_or_else(|| "—".to_string()),
            );
        }
        table.add_row(row);
    }
    println!("{table}");
}

pub fn display_evaluations(records: &[EvaluationRecord]) {
    let mut table = new_table();
    table.set_header(vec!["Scorer", "Front hits", "Back hits", "Hit rate", "Composite"]);
    for r in records {
        let hits = Cell::new(r.front_hits);
        let hits = if r.front_hits >= 2 { hits.fg(Color::Green) } else { hits };
        table.add_row(vec![
            Cell::new(&r.scorer_name),
            hits,
            Cell::new(r.back_hits),
            Cell::new(format!("{:.3}", r.hit_rate)),
            Cell::new(format!("{:.4}", r.composite)),
        ]);
    }
    println!("{table}");
}

pub fn display_learn_outcome(outcome: &LearnOutcome, actual: Option<&Draw>) {
    println!("\n== Evaluation of {} ==", outcome.period_id);
    if let Some(draw) = actual {
        println!("Drawn: {} + {}", format_numbers(&draw.front), format_numbers(&draw.back));
    }
    display_evaluations(&outcome.records);

    println!("\n── Weights ──");
    let mut table = new_table();
    table.set_header(vec!["Scorer", "Before", "After", "Δ"]);
    for (name, &after) in outcome.weights.iter() {
        let before = outcome.previous.get(name);
        let delta = after - before;
        let delta_cell = Cell::new(format!("{:+.4}", delta)).fg(if delta >= 0.0 { Color::Green } else { Color::Red });
        table.add_row(vec![
            Cell::new(name),
            Cell::new(format!("{:.4}", before)),
            Cell::new(format!("{:.4}", after)),
            delta_cell,
        ]);
    }
    println!("{table}");
}

pub fn display_backfill_report(report: &BackfillReport) {
    println!("Backfill done:");
    println!("  Predicted : {}", report.predicted);
    println!("  Evaluated : {}", report.evaluated);
    if !report.skipped.is_empty() {
        println!("  Skipped   : {}", report.skipped.len());
        for (period, reason) in &report.skipped {
            println!("    {period}: {reason}");
        }
    }
}

pub fn display_draws(draws: &[Draw]) {
    if draws.is_empty() {
        println!("No draws to show.");
        return;
    }
    let mut table = new_table();
    table.set_header(vec!["Period", "Date", "Front", "Back", "Sum", "Odd/Even"]);
    for draw in draws {
        let stats = draw.stats();
        table.add_row(vec![
            draw.period_id.clone(),
            draw.draw_date.to_string(),
            format_numbers(&draw.front),
            format_numbers(&draw.back),
            stats.front_sum.to_string(),
            format!("{}/{}", stats.odd, stats.even),
        ]);
    }
    println!("{table}");
}
