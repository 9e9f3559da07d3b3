//! Consent state sync between the contact directory, the email platform's
//! suppression groups and the unsubscribe ledgers.

use std::collections::HashSet;

use chrono::{DateTime, NaiveDate, TimeDelta, Utc};
use serde_json::{Map, Value};

use crate::email::{normalize_email, split_and_normalize, standardize_email};
use crate::error::AppError;
use crate::models::{ContactRecord, ExmailRequest};
use crate::traits::{ContactDirectory, ExmailQueue, SuppressionService, UnsubscribeLedger};

pub const EMAIL_FIELD: &str = "Email";
pub const NEWSLETTER_CONSENT_FIELD: &str = "Newsletter Consent";
pub const INMAILING_CONSENT_FIELD: &str = "InMailing Consent";
pub const CONSENT_SNAPSHOT_FIELD: &str = "Consent Snapshot";
pub const CONSENT_GIVEN: &str = "Consent Given";
pub const CONSENT_REVOKED: &str = "Consent Revoked";

pub const NEWSLETTER_GROUP_ID: u64 = 18613;
pub const PERSONALIZED_GROUP_ID: u64 = 26120;

/// How far back consent changes are picked up.
pub const CONSENT_WINDOW_HOURS: i64 = 2;
/// How far back main email changes are picked up.
pub const EMAIL_CHANGE_WINDOW_DAYS: i64 = 1;

/// Timestamp literal for formula comparisons, e.g. `2024-05-01T10:00:00.000000Z`.
pub fn formula_timestamp(at: DateTime<Utc>) -> String {
    at.format("%Y-%m-%dT%H:%M:%S%.6fZ").to_string()
}

fn quote(value: &str) -> String {
    format!("'{}'", value.replace('\\', "\\\\").replace('\'', "\\'"))
}

/// Records whose newsletter consent moved to `status` after `since`.
pub fn consent_changed_formula(status: &str, since: DateTime<Utc>) -> String {
    format!(
        "AND({{{NEWSLETTER_CONSENT_FIELD}}} = {}, IS_AFTER({{Last Modified Newsletter Consent}}, {}))",
        quote(status),
        quote(&formula_timestamp(since))
    )
}

/// Records whose main email changed after `since` and that have not revoked consent.
pub fn recent_email_formula(since: DateTime<Utc>) -> String {
    format!(
        "AND(NOT({{{NEWSLETTER_CONSENT_FIELD}}} = {}), IS_AFTER({{Last Modified Main Email}}, {}))",
        quote(CONSENT_REVOKED),
        quote(&formula_timestamp(since))
    )
}

/// Records whose email cell contains `email`.
pub fn email_search_formula(email: &str) -> String {
    format!("FIND({}, {{{EMAIL_FIELD}}})", quote(email))
}

/// The record with directory id `record_id`.
pub fn record_id_formula(record_id: &str) -> String {
    format!("RECORD_ID() = {}", quote(record_id))
}

/// Records whose email cell is exactly `email`.
pub fn email_equals_formula(email: &str) -> String {
    format!("{{{EMAIL_FIELD}}} = {}", quote(email))
}

/// Records whose `field` contains a `+`.
pub fn contains_plus_formula(field: &str) -> String {
    format!("FIND('+',{{{field}}})>0")
}

/// Normalized, de-duplicated addresses from the email cells of `records`.
fn collect_emails(records: &[ContactRecord]) -> Vec<String> {
    let mut seen = HashSet::new();
    records
        .iter()
        .filter_map(|r| r.field_str(EMAIL_FIELD))
        .flat_map(split_and_normalize)
        .filter(|e| !e.is_empty() && seen.insert(e.clone()))
        .collect()
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SuppressSummary {
    pub revoked: usize,
    pub added: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResubscribeSummary {
    pub given: usize,
    pub removed: Vec<String>,
    pub upserted: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UpsertSummary {
    pub upserted: usize,
}

/// Pushes directory consent changes to the email platform.
pub struct ConsentSyncService<D, S>
where
    D: ContactDirectory,
    S: SuppressionService,
{
    directory: D,
    suppressions: S,
    group_id: u64,
}

impl<D, S> ConsentSyncService<D, S>
where
    D: ContactDirectory,
    S: SuppressionService,
{
    pub fn new(directory: D, suppressions: S) -> Self {
        Self {
            directory,
            suppressions,
            group_id: NEWSLETTER_GROUP_ID,
        }
    }

    pub fn with_group_id(mut self, group_id: u64) -> Self {
        self.group_id = group_id;
        self
    }

    async fn suppressed(&self) -> Result<HashSet<String>, AppError> {
        let listed = self.suppressions.list_suppressions(self.group_id).await?;
        Ok(listed.iter().map(|e| normalize_email(e)).collect())
    }

    /// Suppress addresses whose consent was revoked within the consent window.
    pub async fn sync_revoked_consent(
        &self,
        now: DateTime<Utc>,
    ) -> Result<SuppressSummary, AppError> {
        let formula = consent_changed_formula(CONSENT_REVOKED, now - TimeDelta::hours(CONSENT_WINDOW_HOURS));
        let revoked = collect_emails(&self.directory.find_records(&formula).await?);
        tracing::info!(count = revoked.len(), "Fetched revoked-consent emails");

        let suppressed = self.suppressed().await?;
        let to_add: Vec<String> = revoked
            .iter()
            .filter(|e| !suppressed.contains(*e))
            .cloned()
            .collect();

        if to_add.is_empty() {
            tracing::info!("No new emails to add to the unsubscribe group");
        } else {
            self.suppressions
                .add_suppressions(self.group_id, &to_add)
                .await?;
            tracing::info!(count = to_add.len(), group = self.group_id, "Added emails to unsubscribe group");
        }

        Ok(SuppressSummary {
            revoked: revoked.len(),
            added: to_add,
        })
    }

    /// Lift suppressions for addresses that gave consent within the consent
    /// window, then upsert all of them as contacts.
    pub async fn sync_given_consent(
        &self,
        now: DateTime<Utc>,
    ) -> Result<ResubscribeSummary, AppError> {
        let formula = consent_changed_formula(CONSENT_GIVEN, now - TimeDelta::hours(CONSENT_WINDOW_HOURS));
        let given = collect_emails(&self.directory.find_records(&formula).await?);
        tracing::info!(count = given.len(), "Fetched given-consent emails");

        let suppressed = self.suppressed().await?;
        let mut removed = Vec::new();
        for email in given.iter().filter(|e| suppressed.contains(*e)) {
            self.suppressions
                .remove_suppression(self.group_id, email)
                .await?;
            tracing::info!(%email, group = self.group_id, "Removed from unsubscribe group");
            removed.push(email.clone());
        }

        if given.is_empty() {
            tracing::info!("No emails to upsert");
        } else {
            self.suppressions.upsert_contacts(&given).await?;
            tracing::info!(count = given.len(), "Upserted contacts");
        }

        Ok(ResubscribeSummary {
            given: given.len(),
            removed,
            upserted: given.len(),
        })
    }

    /// Upsert addresses whose main email changed within a day, unless revoked.
    pub async fn sync_recent_emails(&self, now: DateTime<Utc>) -> Result<UpsertSummary, AppError> {
        let formula = recent_email_formula(now - TimeDelta::days(EMAIL_CHANGE_WINDOW_DAYS));
        let recent = collect_emails(&self.directory.find_records(&formula).await?);

        if recent.is_empty() {
            tracing::info!("No emails to upsert");
        } else {
            self.suppressions.upsert_contacts(&recent).await?;
            tracing::info!(count = recent.len(), "Upserted recently changed emails");
        }

        Ok(UpsertSummary {
            upserted: recent.len(),
        })
    }
}

/// Which suppression group an import mirrors into the directory.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnsubscribeProfile {
    Newsletter,
    Personalized,
}

impl UnsubscribeProfile {
    pub fn default_group_id(&self) -> u64 {
        match self {
            UnsubscribeProfile::Newsletter => NEWSLETTER_GROUP_ID,
            UnsubscribeProfile::Personalized => PERSONALIZED_GROUP_ID,
        }
    }

    pub fn consent_field(&self) -> &'static str {
        match self {
            UnsubscribeProfile::Newsletter => NEWSLETTER_CONSENT_FIELD,
            UnsubscribeProfile::Personalized => INMAILING_CONSENT_FIELD,
        }
    }

    /// Snapshot text for a revocation on `today`.
    ///
    /// Newsletter overwrites the snapshot; Personalized appends to an existing one.
    pub fn snapshot(&self, existing: Option<&str>, today: NaiveDate) -> String {
        let date = today.format("%Y-%m-%d");
        match self {
            UnsubscribeProfile::Newsletter => {
                format!("Newsletter - Consent Revoked - {date} - N/A")
            }
            UnsubscribeProfile::Personalized => {
                let entry =
                    format!("Personalized Mailing - Consent Revoked - {date} - N/A - Link in Mailing");
                match existing.filter(|s| !s.is_empty()) {
                    Some(current) => format!("{current}, {entry}"),
                    None => entry,
                }
            }
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ImportSummary {
    pub missing: usize,
    pub updated: Vec<String>,
    pub unmatched: Vec<String>,
    pub failed: Vec<String>,
}

/// Mirrors a suppression group into the directory and its ledger sheet.
pub struct UnsubscribeImporter<D, S, L>
where
    D: ContactDirectory,
    S: SuppressionService,
    L: UnsubscribeLedger,
{
    directory: D,
    suppressions: S,
    ledger: L,
    profile: UnsubscribeProfile,
    group_id: u64,
}

impl<D, S, L> UnsubscribeImporter<D, S, L>
where
    D: ContactDirectory,
    S: SuppressionService,
    L: UnsubscribeLedger,
{
    pub fn new(directory: D, suppressions: S, ledger: L, profile: UnsubscribeProfile) -> Self {
        Self {
            directory,
            suppressions,
            ledger,
            profile,
            group_id: profile.default_group_id(),
        }
    }

    pub fn with_group_id(mut self, group_id: u64) -> Self {
        self.group_id = group_id;
        self
    }

    /// Import every suppressed address the ledger does not know yet.
    ///
    /// An address lands in the ledger only after its directory record was
    /// patched, so unmatched or failed addresses are retried next run.
    pub async fn run(&self, today: NaiveDate) -> Result<ImportSummary, AppError> {
        let suppressed = self.suppressions.list_suppressions(self.group_id).await?;
        let known: HashSet<String> = self
            .ledger
            .emails()
            .await?
            .iter()
            .map(|e| normalize_email(e))
            .collect();

        let mut seen = HashSet::new();
        let missing: Vec<String> = suppressed
            .iter()
            .map(|e| normalize_email(e))
            .filter(|e| !e.is_empty() && !known.contains(e) && seen.insert(e.clone()))
            .collect();

        let mut summary = ImportSummary {
            missing: missing.len(),
            ..Default::default()
        };
        if missing.is_empty() {
            tracing::info!(group = self.group_id, "All unsubscribed emails are already in the ledger");
            return Ok(summary);
        }

        for email in missing {
            let records = self
                .directory
                .find_records(&email_search_formula(&email))
                .await?;
            let Some(record) = records.into_iter().next() else {
                tracing::info!(%email, "No matching directory record");
                summary.unmatched.push(email);
                continue;
            };

            match self.revoke(&record, today).await {
                Ok(()) => {
                    self.ledger.append(&email).await?;
                    tracing::info!(%email, record_id = %record.id, "Recorded revocation");
                    summary.updated.push(email);
                }
                Err(e) => {
                    tracing::warn!(%email, record_id = %record.id, error = %e, "Failed to update directory record");
                    summary.failed.push(email);
                }
            }
        }

        Ok(summary)
    }

    async fn revoke(&self, record: &ContactRecord, today: NaiveDate) -> Result<(), AppError> {
        let existing = match self.profile {
            UnsubscribeProfile::Newsletter => None,
            UnsubscribeProfile::Personalized => {
                let current = self.directory.get_record(&record.id).await?;
                current.field_str(CONSENT_SNAPSHOT_FIELD).map(str::to_string)
            }
        };

        let mut fields = Map::new();
        fields.insert(
            self.profile.consent_field().to_string(),
            Value::String(CONSENT_REVOKED.to_string()),
        );
        fields.insert(
            CONSENT_SNAPSHOT_FIELD.to_string(),
            Value::String(self.profile.snapshot(existing.as_deref(), today)),
        );
        self.directory.update_fields(&record.id, fields).await
    }
}

/// One directory table whose email column gets standardized.
#[derive(Debug, Clone)]
pub struct StandardizeTarget<D> {
    pub label: String,
    pub directory: D,
    pub email_field: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StandardizeSummary {
    pub found: usize,
    pub updated: usize,
    pub failed_tables: Vec<String>,
}

/// Strip `+alias` parts from the email column of every target table.
///
/// A table that cannot be listed is logged and skipped.
pub async fn standardize_emails<D: ContactDirectory>(
    targets: &[StandardizeTarget<D>],
) -> StandardizeSummary {
    let mut summary = StandardizeSummary::default();

    for target in targets {
        let formula = contains_plus_formula(&target.email_field);
        let records = match target.directory.find_records(&formula).await {
            Ok(records) => records,
            Err(e) => {
                tracing::warn!(table = %target.label, error = %e, "Failed to search table");
                summary.failed_tables.push(target.label.clone());
                continue;
            }
        };
        summary.found += records.len();
        tracing::info!(table = %target.label, found = records.len(), field = %target.email_field, "Found aliased emails");

        for record in &records {
            let Some(email) = record
                .field_str(&target.email_field)
                .filter(|e| e.contains('+'))
            else {
                continue;
            };
            let standardized = match standardize_email(email) {
                Ok(s) => s,
                Err(e) => {
                    tracing::warn!(record_id = %record.id, error = %e, "Cannot standardize email");
                    continue;
                }
            };
            if standardized == email {
                continue;
            }

            let mut fields = Map::new();
            fields.insert(
                target.email_field.clone(),
                Value::String(standardized.clone()),
            );
            match target.directory.update_fields(&record.id, fields).await {
                Ok(()) => {
                    tracing::info!(record_id = %record.id, email = %standardized, "Standardized email");
                    summary.updated += 1;
                }
                Err(e) => {
                    tracing::warn!(record_id = %record.id, error = %e, "Failed to update record");
                }
            }
        }
    }

    summary
}

/// Prefix marking an address as excluded from mailing.
pub const EXMAIL_PREFIX: char = '#';
pub const CHECKED_STATUS: &str = "Checked";

/// Flag column in the checked table for each numbered table.
pub fn exmail_flag_field(index: usize) -> Option<&'static str> {
    match index {
        1 => Some("AI GitHub Table"),
        2 => Some("Web3 External Hacker Table"),
        3 => Some("AI External Hacker Table"),
        4 => Some("Web3 GitHub Table"),
        _ => None,
    }
}

/// A numbered directory table searched by the exmailing run.
#[derive(Debug, Clone)]
pub struct ExmailTable<D> {
    pub index: usize,
    pub label: String,
    pub directory: D,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExmailSummary {
    /// Queue rows marked done.
    pub processed: usize,
    /// Other directory rows that got the prefix.
    pub propagated: usize,
    pub not_found: Vec<String>,
    pub missing_email: Vec<String>,
    /// Record ids whose prefix update failed; their rows stay queued.
    pub failed: Vec<String>,
    /// Addresses the checked table rejected.
    pub unchecked: Vec<String>,
}

/// Works through the exmailing queue: prefixes the queued record's address,
/// propagates the prefix to identical addresses in every table and logs the
/// address in the checked table.
pub struct ExmailProcessor<D, Q> {
    tables: Vec<ExmailTable<D>>,
    checked: D,
    queue: Q,
}

impl<D, Q> ExmailProcessor<D, Q>
where
    D: ContactDirectory,
    Q: ExmailQueue,
{
    pub fn new(tables: Vec<ExmailTable<D>>, checked: D, queue: Q) -> Self {
        Self {
            tables,
            checked,
            queue,
        }
    }

    /// Process every pending queue row.
    ///
    /// Queue read and write failures abort the run. Directory failures are
    /// logged and leave the row queued.
    pub async fn run(&self) -> Result<ExmailSummary, AppError> {
        let pending = self.queue.pending().await?;
        tracing::info!(pending = pending.len(), "Loaded exmailing queue");

        let mut summary = ExmailSummary::default();
        for request in &pending {
            self.process(request, &mut summary).await?;
        }

        tracing::info!(
            processed = summary.processed,
            propagated = summary.propagated,
            not_found = summary.not_found.len(),
            failed = summary.failed.len(),
            "Exmailing run complete"
        );
        Ok(summary)
    }

    async fn process(
        &self,
        request: &ExmailRequest,
        summary: &mut ExmailSummary,
    ) -> Result<(), AppError> {
        let Some((table, record)) = self.locate(&request.record_id).await else {
            tracing::warn!(record_id = %request.record_id, "Record not found in any table");
            summary.not_found.push(request.record_id.clone());
            return Ok(());
        };
        let Some(email) = record
            .field_str(EMAIL_FIELD)
            .filter(|e| !e.is_empty())
            .map(str::to_string)
        else {
            tracing::warn!(record_id = %record.id, "Record has no email");
            summary.missing_email.push(request.record_id.clone());
            return Ok(());
        };

        if let Err(e) = prefix_email(&table.directory, &record.id, &email).await {
            tracing::warn!(record_id = %record.id, error = %e, "Failed to prefix email");
            summary.failed.push(request.record_id.clone());
            return Ok(());
        }

        self.queue.mark_done(request.row).await?;
        summary.processed += 1;
        tracing::info!(record_id = %record.id, row = request.row, "Marked exmailing row done");

        summary.propagated += self.propagate(&email).await;

        let fields = checked_fields(&email, table.index);
        if let Err(e) = self.checked.create_record(fields).await {
            tracing::warn!(email = %email, error = %e, "Failed to add checked row");
            summary.unchecked.push(email);
        }
        Ok(())
    }

    /// First table holding `record_id`. Tables that cannot be searched are skipped.
    async fn locate(&self, record_id: &str) -> Option<(&ExmailTable<D>, ContactRecord)> {
        let formula = record_id_formula(record_id);
        for table in &self.tables {
            match table.directory.find_records(&formula).await {
                Ok(records) => {
                    if let Some(record) = records.into_iter().next() {
                        return Some((table, record));
                    }
                }
                Err(e) => {
                    tracing::warn!(table = %table.label, error = %e, "Failed to search table");
                }
            }
        }
        None
    }

    /// Prefix every other unprefixed row whose address is exactly `email`.
    async fn propagate(&self, email: &str) -> usize {
        let formula = email_equals_formula(email);
        let mut updated = 0;
        for table in &self.tables {
            let records = match table.directory.find_records(&formula).await {
                Ok(records) => records,
                Err(e) => {
                    tracing::warn!(table = %table.label, error = %e, "Failed to search table");
                    continue;
                }
            };
            for record in records
                .iter()
                .filter(|r| r.field_str(EMAIL_FIELD) == Some(email))
            {
                match prefix_email(&table.directory, &record.id, email).await {
                    Ok(true) => updated += 1,
                    Ok(false) => {}
                    Err(e) => {
                        tracing::warn!(table = %table.label, record_id = %record.id, error = %e, "Failed to prefix email");
                    }
                }
            }
        }
        updated
    }
}

/// Write `#email` to the record unless it already carries the prefix.
/// Returns whether an update was sent.
async fn prefix_email<D: ContactDirectory>(
    directory: &D,
    record_id: &str,
    email: &str,
) -> Result<bool, AppError> {
    if email.starts_with(EXMAIL_PREFIX) {
        tracing::debug!(record_id, "Email already prefixed");
        return Ok(false);
    }
    let mut fields = Map::new();
    fields.insert(
        EMAIL_FIELD.to_string(),
        Value::String(format!("{EXMAIL_PREFIX}{email}")),
    );
    directory.update_fields(record_id, fields).await?;
    Ok(true)
}

/// Checked-table row flagging the numbered table the address was found in.
fn checked_fields(email: &str, found_in: usize) -> Map<String, Value> {
    let mut fields = Map::new();
    fields.insert(EMAIL_FIELD.into(), Value::String(email.to_string()));
    fields.insert("Status".into(), Value::String(CHECKED_STATUS.into()));
    fields.insert("Main Base People Table".into(), Value::String("N/A".into()));
    for index in 1..=4 {
        if let Some(flag) = exmail_flag_field(index) {
            let value = if index == found_in { "True" } else { "False" };
            fields.insert(flag.into(), Value::String(value.into()));
        }
    }
    fields
}
