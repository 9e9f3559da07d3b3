use contact_sync_core::error::AppError;
use contact_sync_core::traits::SuppressionService;
use serde::Serialize;
use url::Url;

use crate::transport::{RetryingTransport, read_json};

pub const DEFAULT_BASE_URL: &str = "https://api.sendgrid.com/v3";

/// SendGrid v3 client for suppression groups and marketing contacts.
#[derive(Clone)]
pub struct SendGridClient {
    transport: RetryingTransport,
    base_url: String,
    api_key: String,
}

#[derive(Serialize)]
struct AddSuppressionsRequest<'a> {
    recipient_emails: &'a [String],
}

#[derive(Serialize)]
struct UpsertContactsRequest<'a> {
    contacts: Vec<Contact<'a>>,
}

#[derive(Serialize)]
struct Contact<'a> {
    email: &'a str,
}

impl SendGridClient {
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

    /// Suppression group URL, optionally narrowed to one address.
    fn suppressions_url(&self, group_id: u64, email: Option<&str>) -> Result<Url, AppError> {
        let mut url = Url::parse(&self.base_url)
            .map_err(|e| AppError::ConfigError(format!("Invalid SendGrid base URL: {e}")))?;
        {
            let mut segments = url.path_segments_mut().map_err(|_| {
                AppError::ConfigError(format!("SendGrid base URL cannot have a path: {}", self.base_url))
            })?;
            segments
                .pop_if_empty()
                .extend(["asm", "groups", &group_id.to_string(), "suppressions"]);
            if let Some(email) = email {
                segments.push(email);
            }
        }
        Ok(url)
    }
}

impl SuppressionService for SendGridClient {
    async fn list_suppressions(&self, group_id: u64) -> Result<Vec<String>, AppError> {
        let request = self
            .transport
            .client()
            .get(self.suppressions_url(group_id, None)?)
            .bearer_auth(&self.api_key);
        read_json(self.transport.send(request).await?).await
    }

    async fn add_suppressions(&self, group_id: u64, emails: &[String]) -> Result<(), AppError> {
        let request = self
            .transport
            .client()
            .post(self.suppressions_url(group_id, None)?)
            .bearer_auth(&self.api_key)
            .json(&AddSuppressionsRequest {
                recipient_emails: emails,
            });
        self.transport.send(request).await?;
        Ok(())
    }

    async fn remove_suppression(&self, group_id: u64, email: &str) -> Result<(), AppError> {
        let url = self.suppressions_url(group_id, Some(email))?;
        let request = self
            .transport
            .client()
            .delete(url)
            .bearer_auth(&self.api_key);
        self.transport.send(request).await?;
        Ok(())
    }

    async fn upsert_contacts(&self, emails: &[String]) -> Result<(), AppError> {
        let body = UpsertContactsRequest {
            contacts: emails.iter().map(|email| Contact { email }).collect(),
        };
        let request = self
            .transport
            .client()
            .put(format!("{}/marketing/contacts", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&body);
        self.transport.send(request).await?;
        Ok(())
    }
}
