use std::fmt;

use chrono::{DateTime, Utc};
use uuid::Uuid;

/// A pending row read from the source worksheet.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct SourceRecord {
    /// 1-based sheet row (the header occupies row 1).
    pub row: usize,
    /// Profile URL, e.g. `https://github.com/octocat`.
    pub reference: String,
    pub username: String,
    pub user_id: String,
    pub repo: String,
    pub done: bool,
}

impl SourceRecord {
    /// Row for the enrichment table: username, user id, profile url, email, repo.
    pub fn enrichment_row(&self, email: &str) -> EnrichmentRow {
        EnrichmentRow {
            username: self.username.clone(),
            user_id: self.user_id.clone(),
            profile_url: self.reference.clone(),
            email: email.to_string(),
            repo: self.repo.clone(),
        }
    }
}

/// Which resolver tier produced a value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Provenance {
    StructuredField,
    DocumentFallback,
    PageScrapeFallback,
}

impl Provenance {
    pub fn as_str(&self) -> &'static str {
        match self {
            Provenance::StructuredField => "structured-field",
            Provenance::DocumentFallback => "document-fallback",
            Provenance::PageScrapeFallback => "page-scrape-fallback",
        }
    }
}

impl fmt::Display for Provenance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of resolving one profile reference.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct EnrichmentResult {
    pub email: Option<String>,
    pub provenance: Option<Provenance>,
}

impl EnrichmentResult {
    pub fn found(email: impl Into<String>, provenance: Provenance) -> Self {
        Self {
            email: Some(email.into()),
            provenance: Some(provenance),
        }
    }

    /// No tier produced a value. A valid terminal outcome, not an error.
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.email.is_none()
    }
}

/// Row appended to the enrichment worksheet.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct EnrichmentRow {
    pub username: String,
    pub user_id: String,
    pub profile_url: String,
    pub email: String,
    pub repo: String,
}

impl EnrichmentRow {
    pub fn into_cells(self) -> Vec<String> {
        vec![
            self.username,
            self.user_id,
            self.profile_url,
            self.email,
            self.repo,
        ]
    }
}

/// Writes accumulated during one batch window.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StagedBatch {
    /// Sheet rows to mark as done.
    pub done_rows: Vec<usize>,
    pub enrichment_rows: Vec<EnrichmentRow>,
}

impl StagedBatch {
    pub fn is_empty(&self) -> bool {
        self.done_rows.is_empty() && self.enrichment_rows.is_empty()
    }
}

/// What happened to a single record during a run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecordOutcome {
    Enriched {
        email: String,
        provenance: Provenance,
    },
    /// Every tier came back empty; the record is still marked done.
    NotFound,
    /// Left unmarked so the next run picks it up again.
    Skipped { reason: String },
    /// Resolution raised; not staged.
    Failed { error: String },
}

impl RecordOutcome {
    pub fn label(&self) -> &'static str {
        match self {
            RecordOutcome::Enriched { .. } => "enriched",
            RecordOutcome::NotFound => "not_found",
            RecordOutcome::Skipped { .. } => "skipped",
            RecordOutcome::Failed { .. } => "failed",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordReport {
    pub row: usize,
    pub reference: String,
    pub outcome: RecordOutcome,
}

/// Summary of one enrichment run.
#[derive(Debug, Clone)]
pub struct RunReport {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub records: Vec<RecordReport>,
    pub windows_flushed: usize,
}

impl RunReport {
    pub fn start() -> Self {
        Self {
            run_id: Uuid::new_v4(),
            started_at: Utc::now(),
            finished_at: None,
            records: Vec::new(),
            windows_flushed: 0,
        }
    }

    pub fn finish(&mut self) {
        self.finished_at = Some(Utc::now());
    }

    fn count(&self, label: &str) -> usize {
        self.records
            .iter()
            .filter(|r| r.outcome.label() == label)
            .count()
    }

    pub fn enriched(&self) -> usize {
        self.count("enriched")
    }

    pub fn not_found(&self) -> usize {
        self.count("not_found")
    }

    pub fn skipped(&self) -> usize {
        self.count("skipped")
    }

    pub fn failed(&self) -> usize {
        self.count("failed")
    }
}

/// A row of the contact directory (an Airtable record).
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct ContactRecord {
    pub id: String,
    #[serde(default)]
    pub fields: serde_json::Map<String, serde_json::Value>,
}

impl ContactRecord {
    /// String value of a field, if present and textual.
    pub fn field_str(&self, name: &str) -> Option<&str> {
        self.fields.get(name).and_then(|v| v.as_str())
    }
}

/// A queued exmailing row: worksheet row number and directory record id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExmailRequest {
    pub row: usize,
    pub record_id: String,
}
