use contact_sync_core::error::AppError;
use contact_sync_core::models::ContactRecord;
use contact_sync_core::traits::ContactDirectory;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use url::Url;

use crate::transport::{RetryingTransport, read_json};

pub const DEFAULT_BASE_URL: &str = "https://api.airtable.com/v0";

/// One table inside an Airtable base.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableRef {
    pub base_id: String,
    /// Table name or id.
    pub table: String,
}

impl TableRef {
    pub fn new(base_id: impl Into<String>, table: impl Into<String>) -> Self {
        Self {
            base_id: base_id.into(),
            table: table.into(),
        }
    }

    pub fn label(&self) -> String {
        format!("{}/{}", self.base_id, self.table)
    }
}

/// Airtable REST client with bearer authentication.
#[derive(Clone)]
pub struct AirtableClient {
    transport: RetryingTransport,
    base_url: String,
    api_key: String,
}

#[derive(Deserialize)]
struct ListResponse {
    #[serde(default)]
    records: Vec<ContactRecord>,
    #[serde(default)]
    offset: Option<String>,
}

#[derive(Serialize)]
struct FieldsRequest<'a> {
    fields: &'a Map<String, Value>,
}

impl AirtableClient {
    pub fn new(transport: RetryingTransport, api_key: &str) -> Self {
        Self::with_base_url(transport, api_key, DEFAULT_BASE_URL)
    }

    pub fn with_base_url(transport: RetryingTransport, api_key: &str, base_url: &str) -> Self {
        Self {
            transport,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
        }
    }

    /// Handle bound to one table, usable as a [`ContactDirectory`].
    pub fn table(&self, table: TableRef) -> AirtableTable {
        AirtableTable {
            client: self.clone(),
            table,
        }
    }

    fn table_url(&self, table: &TableRef, record_id: Option<&str>) -> Result<Url, AppError> {
        let mut url = Url::parse(&self.base_url)
            .map_err(|e| AppError::ConfigError(format!("Invalid Airtable base URL: {e}")))?;
        {
            let mut segments = url.path_segments_mut().map_err(|_| {
                AppError::ConfigError(format!("Airtable base URL cannot have a path: {}", self.base_url))
            })?;
            segments.pop_if_empty().push(&table.base_id).push(&table.table);
            if let Some(id) = record_id {
                segments.push(id);
            }
        }
        Ok(url)
    }

    /// All records matching `formula`, following `offset` pagination.
    pub async fn list_records(
        &self,
        table: &TableRef,
        formula: Option<&str>,
    ) -> Result<Vec<ContactRecord>, AppError> {
        let url = self.table_url(table, None)?;
        let mut records = Vec::new();
        let mut offset: Option<String> = None;

        loop {
            let mut query: Vec<(&str, &str)> = Vec::new();
            if let Some(formula) = formula {
                query.push(("filterByFormula", formula));
            }
            if let Some(offset) = offset.as_deref() {
                query.push(("offset", offset));
            }

            let request = self
                .transport
                .client()
                .get(url.clone())
                .bearer_auth(&self.api_key)
                .query(&query);
            let page: ListResponse = read_json(self.transport.send(request).await?).await?;
            records.extend(page.records);

            match page.offset {
                Some(next) => offset = Some(next),
                None => break,
            }
        }

        tracing::debug!(table = %table.label(), count = records.len(), "Listed records");
        Ok(records)
    }

    pub async fn get_record(
        &self,
        table: &TableRef,
        record_id: &str,
    ) -> Result<ContactRecord, AppError> {
        let url = self.table_url(table, Some(record_id))?;
        let request = self
            .transport
            .client()
            .get(url)
            .bearer_auth(&self.api_key);
        read_json(self.transport.send(request).await?).await
    }

    pub async fn update_fields(
        &self,
        table: &TableRef,
        record_id: &str,
        fields: &Map<String, Value>,
    ) -> Result<(), AppError> {
        let url = self.table_url(table, Some(record_id))?;
        let request = self
            .transport
            .client()
            .patch(url)
            .bearer_auth(&self.api_key)
            .json(&FieldsRequest { fields });
        self.transport.send(request).await?;
        Ok(())
    }

    pub async fn create_record(
        &self,
        table: &TableRef,
        fields: &Map<String, Value>,
    ) -> Result<(), AppError> {
        let url = self.table_url(table, None)?;
        let request = self
            .transport
            .client()
            .post(url)
            .bearer_auth(&self.api_key)
            .json(&FieldsRequest { fields });
        self.transport.send(request).await?;
        Ok(())
    }
}

/// An [`AirtableClient`] bound to one table.
#[derive(Clone)]
pub struct AirtableTable {
    client: AirtableClient,
    table: TableRef,
}

impl ContactDirectory for AirtableTable {
    async fn find_records(&self, formula: &str) -> Result<Vec<ContactRecord>, AppError> {
        self.client.list_records(&self.table, Some(formula)).await
    }

    async fn get_record(&self, record_id: &str) -> Result<ContactRecord, AppError> {
        self.client.get_record(&self.table, record_id).await
    }

    async fn update_fields(
        &self,
        record_id: &str,
        fields: Map<String, Value>,
    ) -> Result<(), AppError> {
        self.client
            .update_fields(&self.table, record_id, &fields)
            .await
    }

    async fn create_record(&self, fields: Map<String, Value>) -> Result<(), AppError> {
        self.client.create_record(&self.table, &fields).await
    }
}
