use contact_sync_core::AppError;

use crate::airtable::TableRef;

/// Index of the numbered table whose address column is "Main Email".
pub const MAIN_EMAIL_TABLE_INDEX: usize = 5;

/// Highest `AIRTABLE_BASE_ID_<n>` index scanned.
pub const MAX_NUMBERED_TABLES: usize = 20;

/// Configuration for the consent directory table.
#[derive(Debug, Clone)]
pub struct AirtableConfig {
    pub api_key: String,
    pub table: TableRef,
}

impl AirtableConfig {
    /// Read configuration from environment variables.
    ///
    /// - `AIRTABLE_API_KEY` (required)
    /// - `AIRTABLE_BASE_ID` (required)
    /// - `AIRTABLE_TABLE_NAME` (required)
    pub fn from_env() -> Result<Self, AppError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, AppError>
    where
        F: Fn(&str) -> Option<String>,
    {
        Ok(Self {
            api_key: required(&lookup, "AIRTABLE_API_KEY")?,
            table: TableRef::new(
                required(&lookup, "AIRTABLE_BASE_ID")?,
                required(&lookup, "AIRTABLE_TABLE_NAME")?,
            ),
        })
    }
}

/// A numbered table targeted by email standardization.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NumberedTable {
    pub index: usize,
    pub table: TableRef,
    pub email_field: String,
}

/// Read `AIRTABLE_BASE_ID_<n>` / `AIRTABLE_TABLE_ID_<n>` pairs.
///
/// Indices without a base id are skipped. A base id without a table id is an
/// error. The email field defaults to "Email" ("Main Email" for table 5) and
/// can be overridden with `AIRTABLE_EMAIL_FIELD_<n>`.
pub fn numbered_tables_from_env() -> Result<Vec<NumberedTable>, AppError> {
    numbered_tables_from_lookup(|key| std::env::var(key).ok())
}

pub fn numbered_tables_from_lookup<F>(lookup: F) -> Result<Vec<NumberedTable>, AppError>
where
    F: Fn(&str) -> Option<String>,
{
    let mut tables = Vec::new();
    for index in 1..=MAX_NUMBERED_TABLES {
        let Some(base_id) = non_empty(&lookup, &format!("AIRTABLE_BASE_ID_{index}")) else {
            continue;
        };
        let table = required(&lookup, &format!("AIRTABLE_TABLE_ID_{index}"))?;
        let email_field = non_empty(&lookup, &format!("AIRTABLE_EMAIL_FIELD_{index}"))
            .unwrap_or_else(|| {
                if index == MAIN_EMAIL_TABLE_INDEX {
                    "Main Email".to_string()
                } else {
                    "Email".to_string()
                }
            });
        tables.push(NumberedTable {
            index,
            table: TableRef::new(base_id, table),
            email_field,
        });
    }

    if tables.is_empty() {
        return Err(AppError::ConfigError(
            "No AIRTABLE_BASE_ID_<n> set. At least one table is required.".into(),
        ));
    }
    Ok(tables)
}

/// Table receiving checked exmailing rows.
///
/// - `NEW_AIRTABLE_BASE_ID` (required)
/// - `NEW_AIRTABLE_TABLE_NAME` (required)
pub fn checked_table_from_env() -> Result<TableRef, AppError> {
    checked_table_from_lookup(|key| std::env::var(key).ok())
}

pub fn checked_table_from_lookup<F>(lookup: F) -> Result<TableRef, AppError>
where
    F: Fn(&str) -> Option<String>,
{
    Ok(TableRef::new(
        required(&lookup, "NEW_AIRTABLE_BASE_ID")?,
        required(&lookup, "NEW_AIRTABLE_TABLE_NAME")?,
    ))
}

fn non_empty<F>(lookup: &F, key: &str) -> Option<String>
where
    F: Fn(&str) -> Option<String>,
{
    lookup(key)
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn required<F>(lookup: &F, key: &str) -> Result<String, AppError>
where
    F: Fn(&str) -> Option<String>,
{
    non_empty(lookup, key).ok_or_else(|| AppError::ConfigError(format!("{key} not set")))
}
