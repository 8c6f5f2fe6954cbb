//! Human-readable and JSON rendering of progress events and run summaries.

use std::path::Path;

use tablecopy::{CopyError, CopyEvent, Reconciliation, RunSummary, SqlValue};
use tokio::sync::mpsc::UnboundedReceiver;
use tokio::task::JoinHandle;

/// Print events until the channel closes: JSON lines when `json` is set,
/// otherwise short text lines.
pub fn spawn(mut rx: UnboundedReceiver<CopyEvent>, json: bool) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(event) = rx.recv().await {
            if json {
                match serde_json::to_string(&event) {
                    Ok(line) => println!("{}", line),
                    Err(e) => eprintln!("cannot encode progress event: {}", e),
                }
            } else if let Some(line) = render_event(&event) {
                println!("{}", line);
            }
        }
    })
}

pub fn render_event(event: &CopyEvent) -> Option<String> {
    match event {
        CopyEvent::RunStarted { tables, dry_run, .. } => Some(format!(
            "Copying {} table{}{}",
            tables,
            if *tables == 1 { "" } else { "s" },
            if *dry_run { " (dry run)" } else { "" }
        )),
        CopyEvent::DdlPlanned {
            table,
            ddl,
            executed: false,
        } => Some(format!("  {}: would create\n{}", table, indent(ddl))),
        CopyEvent::SampleRow {
            table,
            index,
            values,
        } => Some(format!(
            "  {}: sample #{}: ({})",
            table,
            index + 1,
            values.iter().map(render_value).collect::<Vec<_>>().join(", ")
        )),
        CopyEvent::TableFinished { result } => Some(format!(
            "  {} -> {}: {} rows in {:.2}s [{}]",
            result.table,
            result.target_table,
            result.migrated,
            result.elapsed.as_secs_f64(),
            status(&result.reconciliation())
        )),
        CopyEvent::TableFailed { table, error } => Some(format!("  {}: FAILED: {}", table, error)),
        _ => None,
    }
}

fn render_value(value: &SqlValue) -> String {
    match value {
        SqlValue::Text(s) => format!("{:?}", s),
        other => other.to_string(),
    }
}

fn indent(text: &str) -> String {
    text.lines()
        .map(|l| format!("    {}", l))
        .collect::<Vec<_>>()
        .join("\n")
}

fn status(reconciliation: &Reconciliation) -> String {
    match reconciliation.diff() {
        Some(0) | None => reconciliation.label().to_string(),
        Some(diff) => format!("{} {:+}", reconciliation.label(), diff),
    }
}

pub fn render_summary(summary: &RunSummary, dry_run: bool) -> String {
    let mut out = String::new();
    out.push_str(if dry_run {
        "\nDry run completed!\n"
    } else {
        "\nCopy completed!\n"
    });
    out.push_str(&format!(
        "  Started: {}\n",
        summary.started_at.format("%Y-%m-%d %H:%M:%S UTC")
    ));
    out.push_str(&format!("  Duration: {:.2}s\n", summary.elapsed_secs()));
    out.push_str(&format!("  Tables: {}\n", summary.tables.len()));
    out.push_str(&format!("  Rows copied: {}\n", summary.total_migrated));
    out.push_str(&format!(
        "  Source rows: {} / target rows: {} [{}]\n",
        summary.total_source,
        summary.total_target,
        status(&summary.reconciliation)
    ));

    if summary.incomplete {
        out.push_str("  Warning: some row counts were unavailable and are excluded from the totals\n");
    }

    let mismatches: Vec<_> = summary.mismatches().collect();
    if !mismatches.is_empty() {
        out.push_str("  Mismatched tables:\n");
        for t in mismatches {
            out.push_str(&format!(
                "    {}: source {}, target {} ({})\n",
                t.table,
                t.source_count.as_sentinel(),
                t.target_count.as_sentinel(),
                status(&t.reconciliation())
            ));
        }
    }
    out
}

pub fn write_json(path: &Path, summary: &RunSummary) -> Result<(), CopyError> {
    let json = serde_json::to_string_pretty(summary)?;
    std::fs::write(path, json)?;
    Ok(())
}
