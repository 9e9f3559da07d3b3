use contact_sync_core::error::AppError;
use contact_sync_core::traits::{ProfileApi, ProfileBio, QuotaProbe};
use scraper::{Html, Selector};
use serde::Deserialize;

use crate::transport::{RetryingTransport, read_json, read_text};

pub const DEFAULT_API_BASE: &str = "https://api.github.com";
pub const DEFAULT_RAW_BASE: &str = "https://raw.githubusercontent.com";
pub const DEFAULT_WEB_BASE: &str = "https://github.com";

const BIO_SELECTOR: &str = ".user-profile-bio";
const BIO_DATA_ATTR: &str = "data-bio-text";

/// GitHub REST API, raw content host and public profile pages.
#[derive(Clone)]
pub struct GitHubClient {
    transport: RetryingTransport,
    api_base: String,
    raw_base: String,
    web_base: String,
}

impl GitHubClient {
    pub fn new(transport: RetryingTransport) -> Self {
        Self::with_base_urls(transport, DEFAULT_API_BASE, DEFAULT_RAW_BASE, DEFAULT_WEB_BASE)
    }

    pub fn with_base_urls(
        transport: RetryingTransport,
        api_base: &str,
        raw_base: &str,
        web_base: &str,
    ) -> Self {
        Self {
            transport,
            api_base: api_base.trim_end_matches('/').to_string(),
            raw_base: raw_base.trim_end_matches('/').to_string(),
            web_base: web_base.trim_end_matches('/').to_string(),
        }
    }

    async fn get(&self, url: &str, credential: Option<&str>) -> Result<reqwest::Response, AppError> {
        let mut request = self.transport.client().get(url);
        if let Some(key) = credential {
            request = request.header("Authorization", format!("token {key}"));
        }
        self.transport.send(request).await
    }
}

// ---- GitHub API types ----

#[derive(Deserialize)]
struct RateLimitResponse {
    rate: Rate,
}

#[derive(Deserialize)]
struct Rate {
    remaining: u64,
}

#[derive(Deserialize)]
struct UserResponse {
    #[serde(default)]
    email: Option<String>,
}

impl QuotaProbe for GitHubClient {
    async fn remaining_quota(&self, credential: &str) -> Result<u64, AppError> {
        let url = format!("{}/rate_limit", self.api_base);
        let response = self.get(&url, Some(credential)).await?;
        let body: RateLimitResponse = read_json(response).await?;
        Ok(body.rate.remaining)
    }
}

impl ProfileApi for GitHubClient {
    async fn user_email(&self, username: &str, credential: &str) -> Result<Option<String>, AppError> {
        let url = format!("{}/users/{username}", self.api_base);
        let response = self.get(&url, Some(credential)).await?;
        let user: UserResponse = read_json(response).await?;
        Ok(user.email.filter(|e| !e.trim().is_empty()))
    }

    async fn readme(&self, username: &str, credential: &str) -> Result<String, AppError> {
        let url = format!("{}/{username}/{username}/main/README.md", self.raw_base);
        let response = self.get(&url, Some(credential)).await?;
        read_text(response).await
    }

    async fn profile_bio(&self, username: &str) -> Result<Option<ProfileBio>, AppError> {
        let url = format!("{}/{username}", self.web_base);
        let response = self.get(&url, None).await?;
        let html = read_text(response).await?;
        Ok(parse_profile_bio(&html))
    }
}

/// Extract the bio block from a profile page.
pub fn parse_profile_bio(html: &str) -> Option<ProfileBio> {
    let selector = Selector::parse(BIO_SELECTOR).ok()?;
    let document = Html::parse_document(html);
    let element = document.select(&selector).next()?;

    let text = element
        .text()
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .collect::<Vec<_>>()
        .join(" ");
    let data_text = element.value().attr(BIO_DATA_ATTR).map(str::to_string);

    Some(ProfileBio { text, data_text })
}
