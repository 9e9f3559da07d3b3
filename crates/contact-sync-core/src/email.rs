//! Email-shaped text matching and address normalization.

use std::sync::LazyLock;

use regex::Regex;

use crate::error::AppError;

/// `local-part@domain.tld`; the character classes are kept verbatim,
/// including the literal `|` in the final label class.
const EMAIL_PATTERN: &str = r"\b[A-Za-z0-9._%+-]+@[A-Za-z0-9.-]+\.[A-Z|a-z]{2,}\b";

const TRIM_CHARS: &[char] = &['"', '<', '>', '[', ']', '(', ')'];

static EMAIL_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(EMAIL_PATTERN).expect("email pattern is a valid regex"));

/// First email-shaped substring of `text`, stripped of surrounding quotes and brackets.
pub fn extract_email(text: &str) -> Option<String> {
    let found = EMAIL_RE.find(text)?;
    let trimmed = found.as_str().trim_matches(TRIM_CHARS);
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

/// Lowercase, drop the `+alias` part of the local part, trim whitespace.
///
/// Removes everything from the first `+` up to the last `@` that follows it.
pub fn normalize_email(email: &str) -> String {
    let mut email = email.to_lowercase();
    if let (Some(plus), Some(at)) = (email.find('+'), email.rfind('@'))
        && plus < at
    {
        email.replace_range(plus..at, "");
    }
    email.trim().to_string()
}

/// Split a comma-separated cell and normalize each address.
pub fn split_and_normalize(cell: &str) -> Vec<String> {
    cell.split(',').map(normalize_email).collect()
}

/// Remove the `+alias` part of an address, keeping its case.
///
/// Addresses without `+` come back unchanged.
pub fn standardize_email(email: &str) -> Result<String, AppError> {
    if !email.contains('+') {
        return Ok(email.to_string());
    }
    let mut parts = email.split('@');
    let (Some(local), Some(domain), None) = (parts.next(), parts.next(), parts.next()) else {
        return Err(AppError::InvalidRecord(format!(
            "'{email}' does not have exactly one '@'"
        )));
    };
    let local = local.split('+').next().unwrap_or(local);
    Ok(format!("{local}@{domain}"))
}
