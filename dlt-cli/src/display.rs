use comfy_table::{presets::UTF8_FULL, Cell, Color, ContentArrangement, Table};

use crate::import::ImportResult;
use dlt_db::models::{Draw, NumberStats, Pool};

fn format_numbers(numbers: &[u8]) -> String {
    numbers
        .iter()
        .map(|n| format!("{:02}", n))
        .collect::<Vec<_>>()
        .join(" ")
}

pub fn display_draws(draws: &[Draw]) {
    if draws.is_empty() {
        println!("No draws to show.");
        return;
    }

    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(vec![
            "Period", "Date", "Front", "Back", "Sum", "Span", "Odd/Even", "Large/Small", "Consec.",
        ]);

    for draw in draws {
        let stats = draw.stats();
        table.add_row(vec![
            draw.period_id.clone(),
            draw.draw_date.to_string(),
            format_numbers(&draw.front),
            format_numbers(&draw.back),
            format!("{} + {}", stats.front_sum, stats.back_sum),
            stats.span.to_string(),
            format!("{}/{}", stats.odd, stats.even),
            format!("{}/{}", stats.large, stats.small),
            stats.consecutive_pairs.to_string(),
        ]);
    }

    println!("{table}");
}

pub fn display_import_summary(result: &ImportResult) {
    println!("Import finished:");
    println!("  Rows read        : {}", result.total_records);
    println!("  Inserted         : {}", result.inserted);
    println!("  Duplicates       : {}", result.skipped);
    if result.errors > 0 {
        println!("  Rejected         : {}", result.errors);
    }
}

pub fn display_stats(front: &[NumberStats], back: &[NumberStats], window: u32) {
    println!("\nStatistics over the last {} draws\n", window);

    for (pool, stats) in [(Pool::Front, front), (Pool::Back, back)] {
        println!("── {} (1-{}) ──", pool, pool.size());
        let mut table = Table::new();
        table
            .load_preset(UTF8_FULL)
            .set_content_arrangement(ContentArrangement::Dynamic)
            .set_header(vec!["Number", "Frequency", "Omission"]);

        let mut sorted = stats.to_vec();
        sorted.sort_by(|a, b| b.frequency.cmp(&a.frequency).then(a.number.cmp(&b.number)));

        let expected = window as f64 * pool.pick_count() as f64 / pool.size() as f64;
        for stat in &sorted {
            let freq = Cell::new(stat.frequency);
            let freq = if stat.frequency as f64 > expected * 1.3 {
                freq.fg(Color::Red)
            } else if (stat.frequency as f64) < expected * 0.7 {
                freq.fg(Color::Blue)
            } else {
                freq
            };
            table.add_row(vec![Cell::new(format!("{:02}", stat.number)), freq, Cell::new(stat.omission)]);
        }
        println!("{table}\n");
    }
}
