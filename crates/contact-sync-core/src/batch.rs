use uuid::Uuid;

use crate::enrich::EnrichmentResolver;
use crate::error::AppError;
use crate::models::{
    Provenance, RecordOutcome, RecordReport, RunReport, SourceRecord, StagedBatch,
};
use crate::traits::{ProfileApi, RecordSource, ResultSink};

/// Records processed between two flushes.
pub const DEFAULT_WINDOW_SIZE: usize = 100;

/// Events emitted by the driver for monitoring/logging.
#[derive(Debug, Clone)]
pub enum BatchEvent<'a> {
    Started {
        run_id: Uuid,
        pending: usize,
    },
    WindowStarted {
        index: usize,
        size: usize,
    },
    RecordStarted {
        record: &'a SourceRecord,
    },
    RecordEnriched {
        record: &'a SourceRecord,
        email: &'a str,
        provenance: Provenance,
    },
    RecordNotFound {
        record: &'a SourceRecord,
    },
    RecordSkipped {
        record: &'a SourceRecord,
        reason: &'a str,
    },
    RecordFailed {
        record: &'a SourceRecord,
        error: &'a str,
    },
    WindowFlushed {
        index: usize,
        marked: usize,
        appended: usize,
    },
    Finished {
        report: &'a RunReport,
    },
}

/// Trait for receiving batch events (decoupled logging).
pub trait BatchReporter: Send + Sync {
    fn report(&self, event: BatchEvent<'_>) {
        let _ = event;
    }
}

/// Reporter that uses the `tracing` crate.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingBatchReporter;

impl BatchReporter for TracingBatchReporter {
    fn report(&self, event: BatchEvent<'_>) {
        match event {
            BatchEvent::Started { run_id, pending } => {
                tracing::info!(%run_id, pending, "Processing records in batches");
            }
            BatchEvent::WindowStarted { index, size } => {
                tracing::debug!(window = index, size, "Window started");
            }
            BatchEvent::RecordStarted { record } => {
                tracing::info!(
                    row = record.row,
                    username = %record.username,
                    url = %record.reference,
                    "Processing record"
                );
            }
            BatchEvent::RecordEnriched {
                record,
                email,
                provenance,
            } => {
                tracing::info!(
                    username = %record.username,
                    %email,
                    %provenance,
                    "Email found"
                );
            }
            BatchEvent::RecordNotFound { record } => {
                tracing::info!(url = %record.reference, "No email found");
            }
            BatchEvent::RecordSkipped { record, reason } => {
                tracing::warn!(row = record.row, %reason, "Skipping record");
            }
            BatchEvent::RecordFailed { record, error } => {
                tracing::error!(url = %record.reference, %error, "Failed to process record");
            }
            BatchEvent::WindowFlushed {
                index,
                marked,
                appended,
            } => {
                tracing::info!(window = index, marked, appended, "Window flushed");
            }
            BatchEvent::Finished { report } => {
                tracing::info!(
                    run_id = %report.run_id,
                    enriched = report.enriched(),
                    not_found = report.not_found(),
                    skipped = report.skipped(),
                    failed = report.failed(),
                    "Run finished"
                );
            }
        }
    }
}

/// Drives pending records through the resolver and commits results window by window.
pub struct EnrichmentDriver<P: ProfileApi> {
    resolver: EnrichmentResolver<P>,
    window_size: usize,
}

impl<P: ProfileApi> EnrichmentDriver<P> {
    pub fn new(resolver: EnrichmentResolver<P>) -> Self {
        Self {
            resolver,
            window_size: DEFAULT_WINDOW_SIZE,
        }
    }

    pub fn with_window_size(mut self, size: usize) -> Self {
        self.window_size = size.max(1);
        self
    }

    /// Run one pass over every pending record.
    ///
    /// Listing and flush failures abort the run. Per-record failures are
    /// reported and leave the record unmarked for the next run.
    pub async fn run<S, K, R>(
        &mut self,
        source: &S,
        sink: &K,
        reporter: &R,
    ) -> Result<RunReport, AppError>
    where
        S: RecordSource,
        K: ResultSink,
        R: BatchReporter,
    {
        let mut report = RunReport::start();
        let records = source.pending_records().await?;
        reporter.report(BatchEvent::Started {
            run_id: report.run_id,
            pending: records.len(),
        });

        for (index, window) in records.chunks(self.window_size).enumerate() {
            reporter.report(BatchEvent::WindowStarted {
                index,
                size: window.len(),
            });

            let mut staged = StagedBatch::default();
            for record in window {
                let outcome = self.process_record(record, &mut staged, reporter).await;
                report.records.push(RecordReport {
                    row: record.row,
                    reference: record.reference.clone(),
                    outcome,
                });
            }

            if !staged.is_empty() {
                sink.flush(&staged).await?;
            }
            report.windows_flushed += 1;
            reporter.report(BatchEvent::WindowFlushed {
                index,
                marked: staged.done_rows.len(),
                appended: staged.enrichment_rows.len(),
            });
        }

        report.finish();
        reporter.report(BatchEvent::Finished { report: &report });
        Ok(report)
    }

    async fn process_record<R: BatchReporter>(
        &mut self,
        record: &SourceRecord,
        staged: &mut StagedBatch,
        reporter: &R,
    ) -> RecordOutcome {
        if record.reference.trim().is_empty() {
            let reason = "missing profile URL";
            reporter.report(BatchEvent::RecordSkipped { record, reason });
            return RecordOutcome::Skipped {
                reason: reason.to_string(),
            };
        }

        reporter.report(BatchEvent::RecordStarted { record });
        match self.resolver.resolve(&record.reference).await {
            Ok(result) => {
                staged.done_rows.push(record.row);
                match (result.email, result.provenance) {
                    (Some(email), Some(provenance)) => {
                        reporter.report(BatchEvent::RecordEnriched {
                            record,
                            email: &email,
                            provenance,
                        });
                        staged.enrichment_rows.push(record.enrichment_row(&email));
                        RecordOutcome::Enriched { email, provenance }
                    }
                    _ => {
                        reporter.report(BatchEvent::RecordNotFound { record });
                        RecordOutcome::NotFound
                    }
                }
            }
            Err(e) => {
                let error = e.to_string();
                reporter.report(BatchEvent::RecordFailed {
                    record,
                    error: &error,
                });
                RecordOutcome::Failed { error }
            }
        }
    }
}
