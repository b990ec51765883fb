// Release Domain Model

use crate::domain::error::{DomainError, Result};
use crate::domain::module_sync::ModuleId;
use serde::{Deserialize, Serialize};

/// A downloadable asset attached to a stored release
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReleaseAsset {
    pub name: String,
    pub url: String,
    pub size: i64,
}

/// A release row persisted for a module
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Release {
    pub id: i64,
    pub module_id: ModuleId,
    pub external_id: String,
    pub version: String,
    pub changelog: String,
    pub assets: Vec<ReleaseAsset>,
    pub size: i64,
    pub is_latest: bool,
    pub published_at: i64,
    pub created_at: i64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewRelease {
    pub module_id: ModuleId,
    pub external_id: String,
    pub version: String,
    pub changelog: String,
    pub assets: Vec<ReleaseAsset>,
    pub published_at: i64,
    pub created_at: i64,
}

impl NewRelease {
    pub fn total_size(&self) -> i64 {
        self.assets.iter().map(|a| a.size).sum()
    }
}

/// Asset as reported by the release provider, before validation
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ProviderAsset {
    pub name: Option<String>,
    pub url: Option<String>,
    pub size: Option<i64>,
}

impl ProviderAsset {
    pub fn new(name: &str, url: &str, size: i64) -> Self {
        Self {
            name: Some(name.to_string()),
            url: Some(url.to_string()),
            size: Some(size),
        }
    }

    pub fn parse(&self) -> Result<ReleaseAsset> {
        let name = self
            .name
            .as_deref()
            .filter(|n| !n.trim().is_empty())
            .ok_or_else(|| DomainError::ValidationError("asset without a name".to_string()))?;
        let url = self
            .url
            .as_deref()
            .filter(|u| u.starts_with("http://") || u.starts_with("https://"))
            .ok_or_else(|| {
                DomainError::ValidationError(format!("asset {} has no valid download url", name))
            })?;
        let size = match self.size {
            Some(size) if size >= 0 => size,
            _ => {
                return Err(DomainError::ValidationError(format!(
                    "asset {} has an invalid size",
                    name
                )))
            }
        };
        Ok(ReleaseAsset {
            name: name.to_string(),
            url: url.to_string(),
            size,
        })
    }
}

/// Release as returned by the external provider's listing
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderRelease {
    /// Provider-side identifier, used as the sync cursor
    pub external_id: String,
    pub version: String,
    pub published_at: i64, // epoch ms
    pub assets: Vec<ProviderAsset>,
    pub changelog: String,
}

impl ProviderRelease {
    /// Validate every asset; the first malformed one rejects the release
    pub fn parse_assets(&self) -> Result<Vec<ReleaseAsset>> {
        self.assets.iter().map(ProviderAsset::parse).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_asset_parses() {
        let asset = ProviderAsset::new("mod.zip", "https://example.com/mod.zip", 2048);
        let parsed = asset.parse().unwrap();
        assert_eq!(parsed.size, 2048);
        assert_eq!(parsed.name, "mod.zip");
    }

    #[test]
    fn test_missing_url_rejected() {
        let asset = ProviderAsset {
            name: Some("mod.zip".to_string()),
            url: None,
            size: Some(1),
        };
        assert!(asset.parse().is_err());
    }

    #[test]
    fn test_negative_size_rejected() {
        let asset = ProviderAsset::new("mod.zip", "https://example.com/mod.zip", -1);
        assert!(asset.parse().is_err());
    }

    #[test]
    fn test_one_bad_asset_rejects_release() {
        let release = ProviderRelease {
            external_id: "11".to_string(),
            version: "1.0.0".to_string(),
            published_at: 0,
            changelog: String::new(),
            assets: vec![
                ProviderAsset::new("a.zip", "https://example.com/a.zip", 1),
                ProviderAsset::default(),
            ],
        };
        assert!(release.parse_assets().is_err());
    }
}
