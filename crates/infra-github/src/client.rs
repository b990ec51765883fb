//! GitHub releases client
//!
//! Pages `GET /repos/{owner}/{repo}/releases` newest first and stops at the
//! cursor release, so an incremental sync usually costs one request.

use crate::model::GhRelease;
use async_trait::async_trait;
use relsync_core::domain::ProviderRelease;
use relsync_core::error::{AppError, Result};
use relsync_core::port::{Credential, ProviderError, ReleaseProvider};
use reqwest::header::{HeaderMap, ACCEPT, AUTHORIZATION, RETRY_AFTER, USER_AGENT};
use reqwest::StatusCode;
use std::time::Duration;
use tracing::{debug, warn};

pub const DEFAULT_API_URL: &str = "https://api.github.com";

const PER_PAGE: usize = 100;
const DEFAULT_MAX_PAGES: u32 = 10;
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

pub struct GithubReleaseProvider {
    client: reqwest::Client,
    api_url: String,
    max_pages: u32,
}

impl GithubReleaseProvider {
    pub fn new(api_url: impl Into<String>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| AppError::Config(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            api_url: api_url.into().trim_end_matches('/').to_string(),
            max_pages: DEFAULT_MAX_PAGES,
        })
    }

    /// Upper bound on pages fetched for one listing (first sync of a large repo)
    pub fn with_max_pages(mut self, max_pages: u32) -> Self {
        self.max_pages = max_pages.max(1);
        self
    }

    async fn fetch_page(
        &self,
        repo: &str,
        page: u32,
        credential: Option<&Credential>,
    ) -> std::result::Result<Vec<GhRelease>, ProviderError> {
        let url = format!(
            "{}/repos/{}/releases?per_page={}&page={}",
            self.api_url, repo, PER_PAGE, page
        );

        let mut request = self
            .client
            .get(&url)
            .header(ACCEPT, "application/vnd.github+json")
            .header(USER_AGENT, concat!("relsync/", env!("CARGO_PKG_VERSION")))
            .header("X-GitHub-Api-Version", "2022-11-28");
        if let Some(credential) = credential {
            request = request.header(AUTHORIZATION, format!("Bearer {}", credential.token));
        }

        let response = request
            .send()
            .await
            .map_err(|e| ProviderError::Network(e.to_string()))?;

        let status = response.status();
        if let Some(err) = classify_status(status, response.headers(), repo) {
            return Err(err);
        }

        let body = response
            .text()
            .await
            .map_err(|e| ProviderError::Network(e.to_string()))?;
        serde_json::from_str(&body).map_err(|e| ProviderError::MalformedPayload(e.to_string()))
    }
}

#[async_trait]
impl ReleaseProvider for GithubReleaseProvider {
    async fn list_releases(
        &self,
        repo: &str,
        since_cursor: Option<&str>,
        credential: Option<&Credential>,
    ) -> std::result::Result<Vec<ProviderRelease>, ProviderError> {
        if repo.split('/').filter(|part| !part.is_empty()).count() != 2 {
            return Err(ProviderError::NotFound(repo.to_string()));
        }

        let mut releases = Vec::new();
        let mut reached_cursor = false;

        for page in 1..=self.max_pages {
            let batch = self.fetch_page(repo, page, credential).await?;
            let batch_len = batch.len();

            for gh in batch {
                if since_cursor == Some(gh.id.to_string().as_str()) {
                    reached_cursor = true;
                    break;
                }
                if gh.draft {
                    continue;
                }
                let id = gh.id;
                match gh.into_provider_release() {
                    Some(release) => releases.push(release),
                    None => warn!(repo = %repo, release_id = id, "Skipping release without tag or date"),
                }
            }

            if reached_cursor || batch_len < PER_PAGE {
                break;
            }
            if page == self.max_pages {
                warn!(repo = %repo, pages = self.max_pages, "Release listing truncated at page limit");
            }
        }

        debug!(
            repo = %repo,
            count = releases.len(),
            reached_cursor = reached_cursor,
            "Listed releases"
        );
        Ok(releases)
    }
}

/// Map a non-success response to the provider error it stands for
fn classify_status(status: StatusCode, headers: &HeaderMap, repo: &str) -> Option<ProviderError> {
    if status.is_success() {
        return None;
    }

    let header_i64 = |name: &str| {
        headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.trim().parse::<i64>().ok())
    };

    match status {
        StatusCode::UNAUTHORIZED => Some(ProviderError::Unauthorized),
        StatusCode::NOT_FOUND => Some(ProviderError::NotFound(repo.to_string())),
        StatusCode::FORBIDDEN | StatusCode::TOO_MANY_REQUESTS => {
            let exhausted = header_i64("x-ratelimit-remaining") == Some(0);
            let retry_after = header_i64(RETRY_AFTER.as_str());
            if exhausted || retry_after.is_some() || status == StatusCode::TOO_MANY_REQUESTS {
                // x-ratelimit-reset is epoch seconds
                let reset_at = header_i64("x-ratelimit-reset").map(|secs| secs * 1000).or_else(|| {
                    retry_after.map(|secs| chrono::Utc::now().timestamp_millis() + secs * 1000)
                });
                Some(ProviderError::RateLimited { reset_at })
            } else {
                // Plain 403: token lacks access to this repo
                Some(ProviderError::Unauthorized)
            }
        }
        s if s.is_server_error() => Some(ProviderError::Network(format!("server error {}", s))),
        s => Some(ProviderError::MalformedPayload(format!("unexpected status {}", s))),
    }
}
