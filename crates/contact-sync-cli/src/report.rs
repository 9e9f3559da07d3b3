use std::path::Path;

use anyhow::{Context, Result};
use contact_sync_core::models::{RecordOutcome, RunReport};
use serde::Serialize;
use uuid::Uuid;

/// One CSV line per processed record.
#[derive(Debug, Serialize)]
struct ReportLine<'a> {
    run_id: Uuid,
    row: usize,
    reference: &'a str,
    outcome: &'static str,
    email: &'a str,
    provenance: &'static str,
    detail: &'a str,
}

/// Write a run report as CSV, one line per record.
pub fn write_report(path: &Path, report: &RunReport) -> Result<()> {
    let mut writer = csv::Writer::from_path(path)
        .with_context(|| format!("Failed to create report file: {}", path.display()))?;

    for record in &report.records {
        let (email, provenance, detail) = match &record.outcome {
            RecordOutcome::Enriched { email, provenance } => {
                (email.as_str(), provenance.as_str(), "")
            }
            RecordOutcome::NotFound => ("", "", ""),
            RecordOutcome::Skipped { reason } => ("", "", reason.as_str()),
            RecordOutcome::Failed { error } => ("", "", error.as_str()),
        };
        writer.serialize(ReportLine {
            run_id: report.run_id,
            row: record.row,
            reference: &record.reference,
            outcome: record.outcome.label(),
            email,
            provenance,
            detail,
        })?;
    }

    writer.flush().context("Failed to flush report file")?;
    Ok(())
}
