use url::Url;

use crate::credentials::CredentialRotator;
use crate::email::extract_email;
use crate::error::AppError;
use crate::models::{EnrichmentResult, Provenance};
use crate::traits::ProfileApi;

/// Resolves a contact email for a profile reference.
///
/// Tiers run in order and the first non-empty value wins:
/// 1. structured profile field (authenticated API, quota-checked)
/// 2. email pattern in the profile README
/// 3. email pattern in the public page's bio block, then its data attribute
///
/// A non-success status only ends the current tier. Transport failures
/// (retries exhausted, connection errors) fail the record.
pub struct EnrichmentResolver<P: ProfileApi> {
    api: P,
    rotator: CredentialRotator,
}

impl<P: ProfileApi> EnrichmentResolver<P> {
    pub fn new(api: P, rotator: CredentialRotator) -> Self {
        Self { api, rotator }
    }

    pub fn rotator(&self) -> &CredentialRotator {
        &self.rotator
    }

    pub async fn resolve(&mut self, reference: &str) -> Result<EnrichmentResult, AppError> {
        let username = username_from_reference(reference)?;

        // 1. Structured field
        self.rotator.before_call(&self.api).await;
        let credential = self.rotator.current().to_string();
        match self.api.user_email(&username, &credential).await {
            Ok(Some(email)) if !email.trim().is_empty() => {
                return Ok(EnrichmentResult::found(
                    email.trim(),
                    Provenance::StructuredField,
                ));
            }
            Ok(_) => tracing::debug!(%username, "Profile has no public email"),
            Err(e) => tier_miss(reference, "profile", e)?,
        }

        // 2. README document
        match self.api.readme(&username, &credential).await {
            Ok(text) => {
                if let Some(email) = extract_email(&text) {
                    return Ok(EnrichmentResult::found(email, Provenance::DocumentFallback));
                }
            }
            Err(e) => tier_miss(reference, "readme", e)?,
        }

        // 3. Profile page bio
        match self.api.profile_bio(&username).await {
            Ok(Some(bio)) => {
                let email = extract_email(&bio.text)
                    .or_else(|| bio.data_text.as_deref().and_then(extract_email));
                if let Some(email) = email {
                    return Ok(EnrichmentResult::found(
                        email,
                        Provenance::PageScrapeFallback,
                    ));
                }
            }
            Ok(None) => tracing::debug!(%username, "Profile page has no bio block"),
            Err(e) => tier_miss(reference, "profile page", e)?,
        }

        Ok(EnrichmentResult::empty())
    }
}

/// Log a tier that came back empty-handed, or escalate a transport failure.
fn tier_miss(reference: &str, tier: &str, error: AppError) -> Result<(), AppError> {
    if error.is_transport_failure() {
        return Err(error);
    }
    tracing::info!(%reference, tier, error = %error, "Lookup failed, trying next tier");
    Ok(())
}

/// Username = last non-empty path segment of the profile reference.
pub fn username_from_reference(reference: &str) -> Result<String, AppError> {
    let reference = reference.trim();
    let last = match Url::parse(reference) {
        Ok(url) => url
            .path_segments()
            .and_then(|segments| segments.filter(|s| !s.is_empty()).next_back())
            .map(str::to_string),
        Err(_) => reference
            .split('/')
            .filter(|s| !s.is_empty())
            .next_back()
            .map(str::to_string),
    };
    last.ok_or_else(|| AppError::InvalidRecord(format!("no username in reference '{reference}'")))
}
