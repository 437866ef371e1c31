//! Table output using comfy-table.
//!
//! Columns: Size | Passes | Radix (ms) | std (ms) | Speedup | Mkeys/s | CV% | Valid

use comfy_table::{Attribute, Cell, CellAlignment, Color, ContentArrangement, Table};

use crate::harness::{format_size, DataPoint};

/// Render results as a table under a `title` banner.
pub fn render_table(title: &str, data: &[DataPoint]) {
    if data.is_empty() {
        println!("No results to display.");
        return;
    }

    let mut table = Table::new();
    table
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(
            ["Size", "Passes", "Radix (ms)", "std (ms)", "Speedup", "Mkeys/s", "CV%", "Valid"]
                .into_iter()
                .map(|h| Cell::new(h).add_attribute(Attribute::Bold)),
        );

    for dp in data {
        let speedup = format!("{:.2}x", dp.speedup);
        let speedup_cell = if dp.speedup >= 1.0 {
            Cell::new(&speedup).fg(Color::Green)
        } else {
            Cell::new(&speedup).fg(Color::Yellow)
        };
        let valid_cell = if dp.validated {
            Cell::new("ok").fg(Color::Green)
        } else {
            Cell::new("MISMATCH").fg(Color::Red)
        };

        table.add_row(vec![
            Cell::new(format_size(dp.size)).set_alignment(CellAlignment::Right),
            Cell::new(dp.passes).set_alignment(CellAlignment::Right),
            Cell::new(format!("{:.3}", dp.sort_stats.mean)).set_alignment(CellAlignment::Right),
            Cell::new(format!("{:.3}", dp.baseline_stats.mean))
                .set_alignment(CellAlignment::Right),
            speedup_cell.set_alignment(CellAlignment::Right),
            Cell::new(format!("{:.1}", dp.mkeys_per_sec)).set_alignment(CellAlignment::Right),
            Cell::new(format!("{:.1}", dp.sort_stats.cv_percent))
                .set_alignment(CellAlignment::Right),
            valid_cell,
        ]);
    }

    println!("\n=== {} ===", title);
    println!("{table}");
}
