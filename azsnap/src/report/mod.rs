//! Result aggregation and output files

pub mod aggregator;
pub mod writer;

pub use aggregator::{BatchReport, BatchSummary, Partition, ResultAggregator};
pub use writer::{append_ids, append_outcome, current_user, latest_invalid_file, remove_ids, ReportWriter};

/// Plain-text table printed at the end of every run
pub fn render_summary_table(summary: &BatchSummary) -> String {
    let rows = [
        ("Total", summary.total),
        ("Succeeded", summary.succeeded),
        ("Failed", summary.failed),
        ("Skipped", summary.skipped),
    ];

    let title = format!("{} summary", summary.operation);
    let width = title.len().max(26);
    let rule = "-".repeat(width);

    let mut table = format!("{}\n{}\n{}\n", rule, title, rule);
    for (label, count) in rows {
        table.push_str(&format!("{:<12}{:>width$}\n", label, count, width = width - 12));
    }
    table.push_str(&format!(
        "{:<12}{:>width$}\n",
        "Duration",
        format!("{}s", summary.duration_seconds()),
        width = width - 12
    ));
    table.push_str(&rule);
    table.push('\n');
    table
}
