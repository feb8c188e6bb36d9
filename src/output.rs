use std::io::{self, Write};

use serde::Serialize;
use tracing::info;

use crate::app::{ProgressEvent, ProgressSink, RunReport};

pub struct JsonOutput;

impl JsonOutput {
    pub fn print_report(result: &RunReport) -> io::Result<()> {
        Self::print_json(result)
    }

    fn print_json<T: Serialize>(value: &T) -> io::Result<()> {
        let json = serde_json::to_string_pretty(value).map_err(io::Error::other)?;
        let mut stdout = io::stdout();
        stdout.write_all(json.as_bytes())?;
        stdout.write_all(b"\n")?;
        Ok(())
    }
}

impl ProgressSink for JsonOutput {
    fn event(&self, _event: ProgressEvent) {}
}

/// Forwards progress events to the tracing subscriber.
pub struct LogProgress;

impl ProgressSink for LogProgress {
    fn event(&self, event: ProgressEvent) {
        match event.elapsed {
            Some(elapsed) => info!(elapsed_ms = elapsed.as_millis() as u64, "{}", event.message),
            None => info!("{}", event.message),
        }
    }
}

/// Plain-text summary for interactive use.
pub fn write_summary<W: Write>(out: &mut W, report: &RunReport) -> io::Result<()> {
    writeln!(out, "operation: {}", report.operation)?;
    if let Some(index) = &report.index {
        let state = if index.refreshed { "refreshed" } else { "cached" };
        writeln!(out, "listing:   {} ({state})", index.path)?;
    }
    if let Some(fetch) = &report.fetch {
        writeln!(
            out,
            "fetch:     {} references, {} selected, {} downloaded, {} failed",
            fetch.links_found,
            fetch.selected,
            fetch.dispatch.downloaded.len(),
            fetch.dispatch.failed.len()
        )?;
        for planned in &fetch.dispatch.planned {
            writeln!(out, "  would download {planned}")?;
        }
        for failed in &fetch.dispatch.failed {
            writeln!(out, "  failed {}: {}", failed.url, failed.error)?;
        }
    }
    if let Some(organize) = &report.organize {
        writeln!(
            out,
            "organize:  {} handed off, {} skipped",
            organize.emitted.len(),
            organize.skipped.len()
        )?;
        for skipped in &organize.skipped {
            writeln!(out, "  skipped {}: {}", skipped.file, skipped.reason)?;
        }
    }
    writeln!(out, "elapsed:   {} ms", report.elapsed_ms)
}
