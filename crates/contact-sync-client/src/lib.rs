pub mod airtable;
pub mod config;
pub mod github;
pub mod sendgrid;
pub mod sheet_store;
pub mod sheets;
pub mod transport;

pub use airtable::{AirtableClient, AirtableTable, TableRef};
pub use config::{AirtableConfig, NumberedTable};
pub use github::GitHubClient;
pub use sendgrid::SendGridClient;
pub use sheet_store::{SheetColumnLedger, SheetExmailQueue, SheetRecordStore};
pub use sheets::SheetsClient;
pub use transport::RetryingTransport;
