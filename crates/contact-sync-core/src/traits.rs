use std::future::Future;

use crate::error::AppError;
use crate::models::{ContactRecord, ExmailRequest, SourceRecord, StagedBatch};

/// Reports the remaining call quota of a credential.
pub trait QuotaProbe: Send + Sync {
    fn remaining_quota(
        &self,
        credential: &str,
    ) -> impl Future<Output = Result<u64, AppError>> + Send;
}

/// Biography block scraped from a public profile page.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProfileBio {
    /// Visible text of the bio element.
    pub text: String,
    /// Raw value of the element's structured data attribute.
    pub data_text: Option<String>,
}

/// Remote profile service queried by the enrichment resolver.
///
/// Non-success responses surface as [`AppError::HttpStatus`]; the resolver
/// decides whether that ends a tier or the record.
pub trait ProfileApi: QuotaProbe {
    /// Email field of the structured profile record, if set.
    fn user_email(
        &self,
        username: &str,
        credential: &str,
    ) -> impl Future<Output = Result<Option<String>, AppError>> + Send;

    /// Full text of the profile's root-level README document.
    fn readme(
        &self,
        username: &str,
        credential: &str,
    ) -> impl Future<Output = Result<String, AppError>> + Send;

    /// Bio block of the public profile page, fetched unauthenticated.
    fn profile_bio(
        &self,
        username: &str,
    ) -> impl Future<Output = Result<Option<ProfileBio>, AppError>> + Send;
}

/// Yields records that are not yet marked processed.
pub trait RecordSource: Send + Sync {
    fn pending_records(&self) -> impl Future<Output = Result<Vec<SourceRecord>, AppError>> + Send;
}

/// Commits staged writes: done markers plus appended enrichment rows.
pub trait ResultSink: Send + Sync {
    fn flush(&self, batch: &StagedBatch) -> impl Future<Output = Result<(), AppError>> + Send;
}

/// Contact directory table (one Airtable table).
pub trait ContactDirectory: Send + Sync {
    /// All records matching a filter formula.
    fn find_records(
        &self,
        formula: &str,
    ) -> impl Future<Output = Result<Vec<ContactRecord>, AppError>> + Send;

    fn get_record(
        &self,
        record_id: &str,
    ) -> impl Future<Output = Result<ContactRecord, AppError>> + Send;

    fn update_fields(
        &self,
        record_id: &str,
        fields: serde_json::Map<String, serde_json::Value>,
    ) -> impl Future<Output = Result<(), AppError>> + Send;

    fn create_record(
        &self,
        fields: serde_json::Map<String, serde_json::Value>,
    ) -> impl Future<Output = Result<(), AppError>> + Send;
}

/// Email platform suppression groups and contact list.
pub trait SuppressionService: Send + Sync {
    fn list_suppressions(
        &self,
        group_id: u64,
    ) -> impl Future<Output = Result<Vec<String>, AppError>> + Send;

    fn add_suppressions(
        &self,
        group_id: u64,
        emails: &[String],
    ) -> impl Future<Output = Result<(), AppError>> + Send;

    fn remove_suppression(
        &self,
        group_id: u64,
        email: &str,
    ) -> impl Future<Output = Result<(), AppError>> + Send;

    fn upsert_contacts(&self, emails: &[String])
    -> impl Future<Output = Result<(), AppError>> + Send;
}

/// Spreadsheet column of addresses an import has already handled.
pub trait UnsubscribeLedger: Send + Sync {
    fn emails(&self) -> impl Future<Output = Result<Vec<String>, AppError>> + Send;

    fn append(&self, email: &str) -> impl Future<Output = Result<(), AppError>> + Send;
}

/// Worksheet of directory record ids queued for exmailing.
pub trait ExmailQueue: Send + Sync {
    /// Queued rows not yet marked done.
    fn pending(&self) -> impl Future<Output = Result<Vec<ExmailRequest>, AppError>> + Send;

    fn mark_done(&self, row: usize) -> impl Future<Output = Result<(), AppError>> + Send;
}
