// Module Sync Config - one row per module opted into external release sync

use serde::{Deserialize, Serialize};

pub type ModuleId = i64;

/// A failure recorded by the most recent sync attempt
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncErrorEntry {
    pub error: String,
    pub timestamp: i64, // epoch ms
    pub retry_count: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModuleSyncConfig {
    pub module_id: ModuleId,
    pub github_repo: String,
    pub enabled: bool,
    pub last_sync_at: Option<i64>,
    pub last_release_id: Option<String>,
    pub sync_errors: Vec<SyncErrorEntry>,

    /// Personal access token supplied by the module owner
    #[serde(skip_serializing, default)]
    pub owner_token: Option<String>,
}

impl ModuleSyncConfig {
    pub fn new(module_id: ModuleId, github_repo: impl Into<String>) -> Self {
        Self {
            module_id,
            github_repo: github_repo.into(),
            enabled: true,
            last_sync_at: None,
            last_release_id: None,
            sync_errors: Vec::new(),
            owner_token: None,
        }
    }

    /// Build the error list for a new attempt.
    ///
    /// The list replaces the previous one. An error whose text was already
    /// present on the previous attempt carries its retry count forward + 1.
    pub fn next_sync_errors(&self, errors: &[String], now_millis: i64) -> Vec<SyncErrorEntry> {
        errors
            .iter()
            .map(|error| {
                let retry_count = self
                    .sync_errors
                    .iter()
                    .find(|prev| &prev.error == error)
                    .map(|prev| prev.retry_count + 1)
                    .unwrap_or(0);
                SyncErrorEntry {
                    error: error.clone(),
                    timestamp: now_millis,
                    retry_count,
                }
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sync_errors_replaced_with_retry_counts() {
        let mut cfg = ModuleSyncConfig::new(1, "acme/widget");
        cfg.sync_errors = vec![
            SyncErrorEntry {
                error: "rate limited".to_string(),
                timestamp: 10,
                retry_count: 2,
            },
            SyncErrorEntry {
                error: "stale".to_string(),
                timestamp: 10,
                retry_count: 0,
            },
        ];

        let next = cfg.next_sync_errors(&["rate limited".to_string(), "new".to_string()], 99);
        assert_eq!(next.len(), 2);
        assert_eq!(next[0].retry_count, 3);
        assert_eq!(next[0].timestamp, 99);
        assert_eq!(next[1].retry_count, 0);
        assert!(next.iter().all(|e| e.error != "stale"));
    }

    #[test]
    fn test_owner_token_not_serialized() {
        let mut cfg = ModuleSyncConfig::new(1, "acme/widget");
        cfg.owner_token = Some("secret".to_string());
        let json = serde_json::to_string(&cfg).unwrap();
        assert!(!json.contains("secret"));
    }
}
