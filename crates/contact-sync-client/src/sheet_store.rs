use contact_sync_core::error::AppError;
use contact_sync_core::models::{ExmailRequest, SourceRecord, StagedBatch};
use contact_sync_core::traits::{ExmailQueue, RecordSource, ResultSink, UnsubscribeLedger};

use crate::sheets::SheetsClient;

pub const USERNAME_HEADER: &str = "Username";
pub const USER_ID_HEADER: &str = "User ID";
pub const PROFILE_URL_HEADER: &str = "Profile URL";
pub const REPO_HEADER: &str = "Repo";
pub const DONE_HEADER: &str = "Done?";

pub const DONE_MARKER: &str = "Yes";
pub const EXMAIL_DONE_MARKER: &str = "Done";

/// Source and target worksheets of an enrichment run.
///
/// The source sheet's first row is a header naming the columns; the
/// enrichment sheet receives `[username, user id, profile url, email, repo]`.
#[derive(Clone)]
pub struct SheetRecordStore {
    sheets: SheetsClient,
    source_sheet: String,
    target_sheet: String,
    done_column: String,
}

struct Columns {
    username: usize,
    user_id: usize,
    profile_url: usize,
    repo: usize,
    done: usize,
}

impl SheetRecordStore {
    pub fn new(sheets: SheetsClient) -> Self {
        Self {
            sheets,
            source_sheet: "Sheet1".into(),
            target_sheet: "Sheet2".into(),
            done_column: "E".into(),
        }
    }

    pub fn with_sheets(mut self, source: &str, target: &str) -> Self {
        self.source_sheet = source.to_string();
        self.target_sheet = target.to_string();
        self
    }

    pub fn with_done_column(mut self, column: &str) -> Self {
        self.done_column = column.to_ascii_uppercase();
        self
    }

    fn columns(&self, header: &[String]) -> Result<Columns, AppError> {
        let find = |name: &str| {
            header
                .iter()
                .position(|h| h.trim() == name)
                .ok_or_else(|| {
                    AppError::InvalidResponse(format!(
                        "Sheet '{}' has no '{name}' column",
                        self.source_sheet
                    ))
                })
        };
        let columns = Columns {
            username: find(USERNAME_HEADER)?,
            user_id: find(USER_ID_HEADER)?,
            profile_url: find(PROFILE_URL_HEADER)?,
            repo: find(REPO_HEADER)?,
            done: find(DONE_HEADER)?,
        };

        let letter = column_letter(columns.done);
        if letter != self.done_column {
            return Err(AppError::ConfigError(format!(
                "'{DONE_HEADER}' is in column {letter}, expected {}",
                self.done_column
            )));
        }
        Ok(columns)
    }
}

fn cell(row: &[String], index: usize) -> String {
    row.get(index).map(|c| c.trim().to_string()).unwrap_or_default()
}

/// Zero-based column index to A1 letters (0 = A, 26 = AA).
pub fn column_letter(index: usize) -> String {
    let mut n = index + 1;
    let mut letters = Vec::new();
    while n > 0 {
        let rem = (n - 1) % 26;
        letters.push(b'A' + rem as u8);
        n = (n - 1) / 26;
    }
    letters.reverse();
    String::from_utf8_lossy(&letters).into_owned()
}

impl RecordSource for SheetRecordStore {
    async fn pending_records(&self) -> Result<Vec<SourceRecord>, AppError> {
        let rows = self.sheets.get_values(&self.source_sheet).await?;
        let Some((header, body)) = rows.split_first() else {
            return Ok(Vec::new());
        };
        let columns = self.columns(header)?;

        let records: Vec<SourceRecord> = body
            .iter()
            .enumerate()
            .map(|(position, row)| SourceRecord {
                row: position + 2,
                reference: cell(row, columns.profile_url),
                username: cell(row, columns.username),
                user_id: cell(row, columns.user_id),
                repo: cell(row, columns.repo),
                done: row.get(columns.done).is_some_and(|c| !c.is_empty()),
            })
            .filter(|r| !r.done)
            .collect();

        tracing::info!(sheet = %self.source_sheet, pending = records.len(), "Loaded pending records");
        Ok(records)
    }
}

impl ResultSink for SheetRecordStore {
    /// Appends the enrichment rows before marking source rows done, so a
    /// failure between the two writes leaves the rows pending for the next run.
    async fn flush(&self, batch: &StagedBatch) -> Result<(), AppError> {
        let rows: Vec<Vec<String>> = batch
            .enrichment_rows
            .iter()
            .cloned()
            .map(|r| r.into_cells())
            .collect();
        self.sheets
            .append_rows(&format!("{}!A:E", self.target_sheet), &rows)
            .await
            .map_err(|e| AppError::SinkError(format!("appending enrichment rows: {e}")))?;

        let marks: Vec<(String, Vec<Vec<String>>)> = batch
            .done_rows
            .iter()
            .map(|row| {
                (
                    format!("{}!{}{row}", self.source_sheet, self.done_column),
                    vec![vec![DONE_MARKER.to_string()]],
                )
            })
            .collect();
        self.sheets
            .batch_update(&marks)
            .await
            .map_err(|e| AppError::SinkError(format!("marking rows done: {e}")))?;

        Ok(())
    }
}

/// One spreadsheet column used as an unsubscribe ledger.
#[derive(Clone)]
pub struct SheetColumnLedger {
    sheets: SheetsClient,
    sheet: String,
    column: String,
}

impl SheetColumnLedger {
    pub fn new(sheets: SheetsClient, sheet: &str) -> Self {
        Self {
            sheets,
            sheet: sheet.to_string(),
            column: "A".into(),
        }
    }
}

impl UnsubscribeLedger for SheetColumnLedger {
    async fn emails(&self) -> Result<Vec<String>, AppError> {
        self.sheets.column_values(&self.sheet, &self.column).await
    }

    async fn append(&self, email: &str) -> Result<(), AppError> {
        let range = format!("{}!{col}:{col}", self.sheet, col = self.column);
        self.sheets
            .append_rows(&range, &[vec![email.to_string()]])
            .await
    }
}

/// Exmailing worksheet: record ids in column A, status in column B.
/// There is no header row.
#[derive(Clone)]
pub struct SheetExmailQueue {
    sheets: SheetsClient,
    sheet: String,
}

impl SheetExmailQueue {
    pub fn new(sheets: SheetsClient, sheet: &str) -> Self {
        Self {
            sheets,
            sheet: sheet.to_string(),
        }
    }
}

impl ExmailQueue for SheetExmailQueue {
    async fn pending(&self) -> Result<Vec<ExmailRequest>, AppError> {
        let rows = self.sheets.get_values(&self.sheet).await?;
        Ok(rows
            .iter()
            .enumerate()
            .filter_map(|(position, row)| {
                let record_id = cell(row, 0);
                let status = cell(row, 1);
                (!record_id.is_empty() && !status.eq_ignore_ascii_case(EXMAIL_DONE_MARKER)).then(
                    || ExmailRequest {
                        row: position + 1,
                        record_id,
                    },
                )
            })
            .collect())
    }

    async fn mark_done(&self, row: usize) -> Result<(), AppError> {
        let update = (
            format!("{}!B{row}", self.sheet),
            vec![vec![EXMAIL_DONE_MARKER.to_string()]],
        );
        self.sheets.batch_update(&[update]).await
    }
}
