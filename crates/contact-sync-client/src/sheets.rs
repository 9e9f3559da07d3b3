use contact_sync_core::error::AppError;
use serde::{Deserialize, Serialize};
use url::Url;

use crate::transport::{RetryingTransport, read_json};

pub const DEFAULT_BASE_URL: &str = "https://sheets.googleapis.com/v4/spreadsheets";

const VALUE_INPUT_OPTION: &str = "USER_ENTERED";

/// Google Sheets v4 values API for one spreadsheet.
///
/// Authenticates with a pre-minted OAuth access token.
#[derive(Clone)]
pub struct SheetsClient {
    transport: RetryingTransport,
    base_url: String,
    token: String,
    spreadsheet_id: String,
}

#[derive(Deserialize)]
struct ValueRange {
    #[serde(default)]
    values: Vec<Vec<String>>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct BatchUpdateRequest<'a> {
    value_input_option: &'a str,
    data: Vec<RangeValues<'a>>,
}

#[derive(Serialize)]
struct RangeValues<'a> {
    range: &'a str,
    values: &'a [Vec<String>],
}

#[derive(Serialize)]
struct AppendRequest<'a> {
    values: &'a [Vec<String>],
}

impl SheetsClient {
    pub fn new(transport: RetryingTransport, token: &str, spreadsheet_id: &str) -> Self {
        Self::with_base_url(transport, token, spreadsheet_id, DEFAULT_BASE_URL)
    }

    pub fn with_base_url(
        transport: RetryingTransport,
        token: &str,
        spreadsheet_id: &str,
        base_url: &str,
    ) -> Self {
        Self {
            transport,
            base_url: base_url.trim_end_matches('/').to_string(),
            token: token.to_string(),
            spreadsheet_id: spreadsheet_id.to_string(),
        }
    }

    fn url(&self, tail: &[&str]) -> Result<Url, AppError> {
        let mut url = Url::parse(&self.base_url)
            .map_err(|e| AppError::ConfigError(format!("Invalid Sheets base URL: {e}")))?;
        {
            let mut segments = url.path_segments_mut().map_err(|_| {
                AppError::ConfigError(format!("Sheets base URL cannot have a path: {}", self.base_url))
            })?;
            segments.pop_if_empty().push(&self.spreadsheet_id);
            segments.extend(tail);
        }
        Ok(url)
    }

    /// Cell values of an A1 range, row-major. Trailing empty cells are omitted.
    pub async fn get_values(&self, range: &str) -> Result<Vec<Vec<String>>, AppError> {
        let url = self.url(&["values", range])?;
        let request = self.transport.client().get(url).bearer_auth(&self.token);
        let body: ValueRange = read_json(self.transport.send(request).await?).await?;
        Ok(body.values)
    }

    /// First-cell values of one column, e.g. `column_values("Unsub", "A")`.
    pub async fn column_values(&self, sheet: &str, column: &str) -> Result<Vec<String>, AppError> {
        let rows = self
            .get_values(&format!("{sheet}!{column}:{column}"))
            .await?;
        Ok(rows
            .into_iter()
            .map(|row| row.into_iter().next().unwrap_or_default())
            .collect())
    }

    /// Write several ranges in one request.
    pub async fn batch_update(&self, updates: &[(String, Vec<Vec<String>>)]) -> Result<(), AppError> {
        if updates.is_empty() {
            return Ok(());
        }
        let url = self.url(&["values:batchUpdate"])?;
        let body = BatchUpdateRequest {
            value_input_option: VALUE_INPUT_OPTION,
            data: updates
                .iter()
                .map(|(range, values)| RangeValues { range, values })
                .collect(),
        };
        let request = self
            .transport
            .client()
            .post(url)
            .bearer_auth(&self.token)
            .json(&body);
        self.transport.send(request).await?;
        Ok(())
    }

    /// Append rows after the last row of the table found in `range`.
    pub async fn append_rows(&self, range: &str, rows: &[Vec<String>]) -> Result<(), AppError> {
        if rows.is_empty() {
            return Ok(());
        }
        let url = self.url(&["values", &format!("{range}:append")])?;
        let request = self
            .transport
            .client()
            .post(url)
            .bearer_auth(&self.token)
            .query(&[
                ("valueInputOption", VALUE_INPUT_OPTION),
                ("insertDataOption", "INSERT_ROWS"),
            ])
            .json(&AppendRequest { values: rows });
        self.transport.send(request).await?;
        Ok(())
    }
}
