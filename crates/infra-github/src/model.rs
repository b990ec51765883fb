// GitHub release payloads and their mapping onto provider releases

use chrono::DateTime;
use relsync_core::domain::{ProviderAsset, ProviderRelease};
use serde::Deserialize;

#[derive(Debug, Deserialize)]
pub(crate) struct GhRelease {
    pub id: i64,
    pub tag_name: Option<String>,
    pub name: Option<String>,
    #[serde(default)]
    pub draft: bool,
    pub body: Option<String>,
    pub created_at: Option<String>,
    pub published_at: Option<String>,
    #[serde(default)]
    pub assets: Vec<GhAsset>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct GhAsset {
    pub name: Option<String>,
    pub browser_download_url: Option<String>,
    pub size: Option<i64>,
}

impl GhRelease {
    /// `None` for releases that cannot be identified (no tag, no name, no date)
    pub fn into_provider_release(self) -> Option<ProviderRelease> {
        let version = self
            .tag_name
            .filter(|t| !t.trim().is_empty())
            .or(self.name.filter(|n| !n.trim().is_empty()))?;
        let published_at = self
            .published_at
            .as_deref()
            .or(self.created_at.as_deref())
            .and_then(parse_timestamp)?;

        Some(ProviderRelease {
            external_id: self.id.to_string(),
            version,
            published_at,
            assets: self
                .assets
                .into_iter()
                .map(|a| ProviderAsset {
                    name: a.name,
                    url: a.browser_download_url,
                    size: a.size,
                })
                .collect(),
            changelog: self.body.unwrap_or_default(),
        })
    }
}

fn parse_timestamp(raw: &str) -> Option<i64> {
    DateTime::parse_from_rfc3339(raw)
        .ok()
        .map(|dt| dt.timestamp_millis())
}
