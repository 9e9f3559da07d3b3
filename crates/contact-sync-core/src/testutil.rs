//! Test utilities: mock implementations of all core traits.
//!
//! Handwritten mocks for dependency injection in unit tests.
//! All mocks use `Arc<Mutex<_>>` for interior mutability, allowing
//! test assertions on recorded calls.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};

use serde_json::{Map, Value};

use crate::batch::{BatchEvent, BatchReporter};
use crate::error::AppError;
use crate::models::{ContactRecord, ExmailRequest, SourceRecord, StagedBatch};
use crate::traits::{
    ContactDirectory, ExmailQueue, ProfileApi, ProfileBio, QuotaProbe, RecordSource, ResultSink,
    SuppressionService, UnsubscribeLedger,
};

/// Canned reply for one profile lookup.
#[derive(Debug, Clone)]
pub enum MockReply<T> {
    Ok(T),
    /// Non-success HTTP status.
    Status(u16),
    /// Transport failure after retries.
    Unreachable,
}

impl<T: Clone> MockReply<T> {
    fn to_result(&self, url: &str) -> Result<T, AppError> {
        match self {
            MockReply::Ok(value) => Ok(value.clone()),
            MockReply::Status(status) => Err(AppError::HttpStatus {
                status: *status,
                url: url.to_string(),
            }),
            MockReply::Unreachable => Err(AppError::RetriesExhausted {
                url: url.to_string(),
                attempts: 4,
                last_error: "connection refused".into(),
            }),
        }
    }
}

// ---------------------------------------------------------------------------
// MockProfileApi
// ---------------------------------------------------------------------------

/// Mock profile service keyed by username.
///
/// Unmapped usernames answer 404 on every tier. Quota replies are popped
/// from a queue; an empty queue reports 5000 remaining.
#[derive(Clone, Default)]
pub struct MockProfileApi {
    quota: Arc<Mutex<Vec<Result<u64, AppError>>>>,
    users: Arc<Mutex<HashMap<String, MockReply<Option<String>>>>>,
    readmes: Arc<Mutex<HashMap<String, MockReply<String>>>>,
    bios: Arc<Mutex<HashMap<String, MockReply<Option<ProfileBio>>>>>,
    pub quota_checked_with: Arc<Mutex<Vec<String>>>,
    pub user_calls: Arc<Mutex<Vec<String>>>,
    pub user_credentials: Arc<Mutex<Vec<String>>>,
    pub readme_calls: Arc<Mutex<Vec<String>>>,
    pub bio_calls: Arc<Mutex<Vec<String>>>,
}

impl MockProfileApi {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_quota(self, replies: Vec<Result<u64, AppError>>) -> Self {
        *self.quota.lock().unwrap() = replies;
        self
    }

    pub fn with_user(self, username: &str, reply: MockReply<Option<String>>) -> Self {
        self.users
            .lock()
            .unwrap()
            .insert(username.to_string(), reply);
        self
    }

    pub fn with_readme(self, username: &str, reply: MockReply<String>) -> Self {
        self.readmes
            .lock()
            .unwrap()
            .insert(username.to_string(), reply);
        self
    }

    pub fn with_bio(self, username: &str, reply: MockReply<Option<ProfileBio>>) -> Self {
        self.bios
            .lock()
            .unwrap()
            .insert(username.to_string(), reply);
        self
    }
}

impl QuotaProbe for MockProfileApi {
    async fn remaining_quota(&self, credential: &str) -> Result<u64, AppError> {
        self.quota_checked_with
            .lock()
            .unwrap()
            .push(credential.to_string());
        let mut quota = self.quota.lock().unwrap();
        if quota.is_empty() {
            Ok(5000)
        } else {
            quota.remove(0)
        }
    }
}

impl ProfileApi for MockProfileApi {
    async fn user_email(&self, username: &str, credential: &str) -> Result<Option<String>, AppError> {
        self.user_calls.lock().unwrap().push(username.to_string());
        self.user_credentials
            .lock()
            .unwrap()
            .push(credential.to_string());
        let url = format!("https://api.github.com/users/{username}");
        match self.users.lock().unwrap().get(username) {
            Some(reply) => reply.to_result(&url),
            None => MockReply::Status(404).to_result(&url),
        }
    }

    async fn readme(&self, username: &str, _credential: &str) -> Result<String, AppError> {
        self.readme_calls.lock().unwrap().push(username.to_string());
        let url = format!("https://raw.githubusercontent.com/{username}/{username}/main/README.md");
        match self.readmes.lock().unwrap().get(username) {
            Some(reply) => reply.to_result(&url),
            None => MockReply::Status(404).to_result(&url),
        }
    }

    async fn profile_bio(&self, username: &str) -> Result<Option<ProfileBio>, AppError> {
        self.bio_calls.lock().unwrap().push(username.to_string());
        let url = format!("https://github.com/{username}");
        match self.bios.lock().unwrap().get(username) {
            Some(reply) => reply.to_result(&url),
            None => MockReply::Status(404).to_result(&url),
        }
    }
}

// ---------------------------------------------------------------------------
// MockRecordStore
// ---------------------------------------------------------------------------

/// In-memory worksheet acting as both record source and result sink.
#[derive(Clone)]
pub struct MockRecordStore {
    records: Arc<Mutex<Result<Vec<SourceRecord>, AppError>>>,
    flush_error: Arc<Mutex<Option<AppError>>>,
    pub flushed: Arc<Mutex<Vec<StagedBatch>>>,
}

impl MockRecordStore {
    pub fn with_records(records: Vec<SourceRecord>) -> Self {
        Self {
            records: Arc::new(Mutex::new(Ok(records))),
            flush_error: Arc::new(Mutex::new(None)),
            flushed: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn with_list_error(error: AppError) -> Self {
        Self {
            records: Arc::new(Mutex::new(Err(error))),
            flush_error: Arc::new(Mutex::new(None)),
            flushed: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// The next flush fails with `error`.
    pub fn with_flush_error(self, error: AppError) -> Self {
        *self.flush_error.lock().unwrap() = Some(error);
        self
    }
}

impl RecordSource for MockRecordStore {
    async fn pending_records(&self) -> Result<Vec<SourceRecord>, AppError> {
        let mut records = self.records.lock().unwrap();
        if records.is_err() {
            return std::mem::replace(&mut *records, Ok(Vec::new()));
        }
        let pending = records
            .as_ref()
            .map(|list| list.iter().filter(|r| !r.done).cloned().collect())
            .unwrap_or_default();
        Ok(pending)
    }
}

impl ResultSink for MockRecordStore {
    async fn flush(&self, batch: &StagedBatch) -> Result<(), AppError> {
        if let Some(error) = self.flush_error.lock().unwrap().take() {
            return Err(error);
        }
        self.flushed.lock().unwrap().push(batch.clone());
        Ok(())
    }
}

/// Unprocessed record whose reference is the profile URL of `username`.
pub fn make_source_record(row: usize, username: &str) -> SourceRecord {
    SourceRecord {
        row,
        reference: format!("https://github.com/{username}"),
        username: username.to_string(),
        user_id: format!("{}", 1000 + row),
        repo: format!("{username}/project"),
        done: false,
    }
}

// ---------------------------------------------------------------------------
// MockBatchReporter
// ---------------------------------------------------------------------------

/// Records the variant name of each event.
#[derive(Clone, Default)]
pub struct MockBatchReporter {
    pub events: Arc<Mutex<Vec<String>>>,
}

impl MockBatchReporter {
    pub fn new() -> Self {
        Self::default()
    }
}

impl BatchReporter for MockBatchReporter {
    fn report(&self, event: BatchEvent<'_>) {
        let label = match event {
            BatchEvent::Started { .. } => "Started",
            BatchEvent::WindowStarted { .. } => "WindowStarted",
            BatchEvent::RecordStarted { .. } => "RecordStarted",
            BatchEvent::RecordEnriched { .. } => "RecordEnriched",
            BatchEvent::RecordNotFound { .. } => "RecordNotFound",
            BatchEvent::RecordSkipped { .. } => "RecordSkipped",
            BatchEvent::RecordFailed { .. } => "RecordFailed",
            BatchEvent::WindowFlushed { .. } => "WindowFlushed",
            BatchEvent::Finished { .. } => "Finished",
        };
        self.events.lock().unwrap().push(label.to_string());
    }
}

// ---------------------------------------------------------------------------
// MockDirectory
// ---------------------------------------------------------------------------

/// Mock directory table.
///
/// `find_records` answers formulas registered with `with_formula_results`,
/// otherwise pops queued results (empty once exhausted), and records each
/// formula. `get_record` serves records registered with `with_record`.
#[derive(Clone, Default)]
pub struct MockDirectory {
    find_results: Arc<Mutex<Vec<Result<Vec<ContactRecord>, AppError>>>>,
    formula_results: Arc<Mutex<HashMap<String, Vec<ContactRecord>>>>,
    records: Arc<Mutex<HashMap<String, ContactRecord>>>,
    failing_updates: Arc<Mutex<HashSet<String>>>,
    fail_creates: Arc<Mutex<bool>>,
    pub queries: Arc<Mutex<Vec<String>>>,
    pub updates: Arc<Mutex<Vec<(String, Map<String, Value>)>>>,
    pub created: Arc<Mutex<Vec<Map<String, Value>>>>,
}

impl MockDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_find_results(self, results: Vec<Result<Vec<ContactRecord>, AppError>>) -> Self {
        *self.find_results.lock().unwrap() = results;
        self
    }

    pub fn with_formula_results(self, formula: &str, records: Vec<ContactRecord>) -> Self {
        self.formula_results
            .lock()
            .unwrap()
            .insert(formula.to_string(), records);
        self
    }

    pub fn with_create_error(self) -> Self {
        *self.fail_creates.lock().unwrap() = true;
        self
    }

    pub fn with_record(self, record: ContactRecord) -> Self {
        self.records
            .lock()
            .unwrap()
            .insert(record.id.clone(), record);
        self
    }

    pub fn with_update_error(self, record_id: &str) -> Self {
        self.failing_updates
            .lock()
            .unwrap()
            .insert(record_id.to_string());
        self
    }
}

impl ContactDirectory for MockDirectory {
    async fn find_records(&self, formula: &str) -> Result<Vec<ContactRecord>, AppError> {
        self.queries.lock().unwrap().push(formula.to_string());
        if let Some(records) = self.formula_results.lock().unwrap().get(formula) {
            return Ok(records.clone());
        }
        let mut results = self.find_results.lock().unwrap();
        if results.is_empty() {
            Ok(Vec::new())
        } else {
            results.remove(0)
        }
    }

    async fn get_record(&self, record_id: &str) -> Result<ContactRecord, AppError> {
        self.records
            .lock()
            .unwrap()
            .get(record_id)
            .cloned()
            .ok_or_else(|| AppError::HttpStatus {
                status: 404,
                url: format!("https://api.airtable.com/v0/base/table/{record_id}"),
            })
    }

    async fn update_fields(
        &self,
        record_id: &str,
        fields: Map<String, Value>,
    ) -> Result<(), AppError> {
        if self.failing_updates.lock().unwrap().contains(record_id) {
            return Err(AppError::HttpStatus {
                status: 422,
                url: format!("https://api.airtable.com/v0/base/table/{record_id}"),
            });
        }
        self.updates
            .lock()
            .unwrap()
            .push((record_id.to_string(), fields));
        Ok(())
    }

    async fn create_record(&self, fields: Map<String, Value>) -> Result<(), AppError> {
        if *self.fail_creates.lock().unwrap() {
            return Err(AppError::HttpStatus {
                status: 422,
                url: "https://api.airtable.com/v0/base/table".into(),
            });
        }
        self.created.lock().unwrap().push(fields);
        Ok(())
    }
}

/// Directory record with a single email cell.
pub fn make_contact(id: &str, email: &str) -> ContactRecord {
    let mut fields = Map::new();
    fields.insert("Email".into(), Value::String(email.to_string()));
    ContactRecord {
        id: id.to_string(),
        fields,
    }
}

// ---------------------------------------------------------------------------
// MockSuppressions
// ---------------------------------------------------------------------------

/// Mock suppression service with a fixed suppressed list.
#[derive(Clone, Default)]
pub struct MockSuppressions {
    suppressed: Arc<Mutex<Vec<String>>>,
    pub listed_groups: Arc<Mutex<Vec<u64>>>,
    pub added: Arc<Mutex<Vec<(u64, Vec<String>)>>>,
    pub removed: Arc<Mutex<Vec<(u64, String)>>>,
    pub upserted: Arc<Mutex<Vec<Vec<String>>>>,
}

impl MockSuppressions {
    pub fn with_suppressed(emails: &[&str]) -> Self {
        Self {
            suppressed: Arc::new(Mutex::new(emails.iter().map(|e| e.to_string()).collect())),
            ..Self::default()
        }
    }
}

impl SuppressionService for MockSuppressions {
    async fn list_suppressions(&self, group_id: u64) -> Result<Vec<String>, AppError> {
        self.listed_groups.lock().unwrap().push(group_id);
        Ok(self.suppressed.lock().unwrap().clone())
    }

    async fn add_suppressions(&self, group_id: u64, emails: &[String]) -> Result<(), AppError> {
        self.added.lock().unwrap().push((group_id, emails.to_vec()));
        Ok(())
    }

    async fn remove_suppression(&self, group_id: u64, email: &str) -> Result<(), AppError> {
        self.removed
            .lock()
            .unwrap()
            .push((group_id, email.to_string()));
        Ok(())
    }

    async fn upsert_contacts(&self, emails: &[String]) -> Result<(), AppError> {
        self.upserted.lock().unwrap().push(emails.to_vec());
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// MockLedger
// ---------------------------------------------------------------------------

#[derive(Clone, Default)]
pub struct MockLedger {
    emails: Arc<Mutex<Vec<String>>>,
    pub appended: Arc<Mutex<Vec<String>>>,
}

impl MockLedger {
    pub fn with_emails(emails: &[&str]) -> Self {
        Self {
            emails: Arc::new(Mutex::new(emails.iter().map(|e| e.to_string()).collect())),
            appended: Arc::new(Mutex::new(Vec::new())),
        }
    }
}

impl UnsubscribeLedger for MockLedger {
    async fn emails(&self) -> Result<Vec<String>, AppError> {
        Ok(self.emails.lock().unwrap().clone())
    }

    async fn append(&self, email: &str) -> Result<(), AppError> {
        self.appended.lock().unwrap().push(email.to_string());
        self.emails.lock().unwrap().push(email.to_string());
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// MockExmailQueue
// ---------------------------------------------------------------------------

/// Mock exmailing worksheet. `pending` serves the queued rows and
/// `mark_done` records row numbers.
#[derive(Clone, Default)]
pub struct MockExmailQueue {
    requests: Arc<Mutex<Vec<ExmailRequest>>>,
    pub done: Arc<Mutex<Vec<usize>>>,
}

impl MockExmailQueue {
    pub fn with_requests(record_ids: &[&str]) -> Self {
        let requests = record_ids
            .iter()
            .enumerate()
            .map(|(i, id)| ExmailRequest {
                row: i + 1,
                record_id: id.to_string(),
            })
            .collect();
        Self {
            requests: Arc::new(Mutex::new(requests)),
            ..Self::default()
        }
    }
}

impl ExmailQueue for MockExmailQueue {
    async fn pending(&self) -> Result<Vec<ExmailRequest>, AppError> {
        Ok(self.requests.lock().unwrap().clone())
    }

    async fn mark_done(&self, row: usize) -> Result<(), AppError> {
        self.done.lock().unwrap().push(row);
        Ok(())
    }
}
