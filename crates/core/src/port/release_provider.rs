// Release Provider Port
// Abstraction over the external source-hosting API that lists releases of a repo

use crate::domain::ProviderRelease;
use async_trait::async_trait;
use thiserror::Error;

/// Errors reported by a release provider; each kind is handled differently
/// by the sync service (credential fallback, error recording)
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProviderError {
    /// `reset_at` stays out of the message: recorded sync errors are matched
    /// by text across attempts
    #[error("rate limited by release provider")]
    RateLimited { reset_at: Option<i64> },

    #[error("repository not found: {0}")]
    NotFound(String),

    #[error("credential rejected by release provider")]
    Unauthorized,

    #[error("network error: {0}")]
    Network(String),

    #[error("malformed payload: {0}")]
    MalformedPayload(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CredentialSource {
    /// Token supplied by the module owner
    Personal,
    /// System-wide token from configuration
    Shared,
}

#[derive(Clone, PartialEq, Eq)]
pub struct Credential {
    pub token: String,
    pub source: CredentialSource,
}

impl Credential {
    pub fn personal(token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
            source: CredentialSource::Personal,
        }
    }

    pub fn shared(token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
            source: CredentialSource::Shared,
        }
    }
}

impl std::fmt::Debug for Credential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credential")
            .field("source", &self.source)
            .field("token", &"***")
            .finish()
    }
}

/// Release Provider trait
///
/// Implementations:
/// - GithubReleaseProvider (relsync-infra-github)
/// - mocks::ScriptedReleaseProvider (tests)
#[async_trait]
pub trait ReleaseProvider: Send + Sync {
    /// List releases of `repo` (`owner/name`) published after the release
    /// identified by `since_cursor`; all releases when the cursor is `None`.
    /// Order is unspecified.
    async fn list_releases(
        &self,
        repo: &str,
        since_cursor: Option<&str>,
        credential: Option<&Credential>,
    ) -> Result<Vec<ProviderRelease>, ProviderError>;
}

// ============================================================================
// Mock Implementations for Testing
// ============================================================================

pub mod mocks {
    use super::*;
    use std::collections::{HashMap, HashSet};
    use std::sync::Mutex;

    /// One recorded call to the scripted provider
    #[derive(Debug, Clone, PartialEq, Eq)]
    pub struct ProviderCall {
        pub repo: String,
        pub since_cursor: Option<String>,
        pub token: Option<String>,
    }

    /// Provider answering from a per-repo script
    #[derive(Default)]
    pub struct ScriptedReleaseProvider {
        releases: Mutex<HashMap<String, Vec<ProviderRelease>>>,
        failures: Mutex<HashMap<String, ProviderError>>,
        rejected_tokens: Mutex<HashSet<String>>,
        calls: Mutex<Vec<ProviderCall>>,
    }

    impl ScriptedReleaseProvider {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn with_releases(self, repo: &str, releases: Vec<ProviderRelease>) -> Self {
            self.releases
                .lock()
                .unwrap()
                .insert(repo.to_string(), releases);
            self
        }

        pub fn with_failure(self, repo: &str, error: ProviderError) -> Self {
            self.failures
                .lock()
                .unwrap()
                .insert(repo.to_string(), error);
            self
        }

        pub fn rejecting_token(self, token: &str) -> Self {
            self.rejected_tokens
                .lock()
                .unwrap()
                .insert(token.to_string());
            self
        }

        pub fn calls(&self) -> Vec<ProviderCall> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl ReleaseProvider for ScriptedReleaseProvider {
        async fn list_releases(
            &self,
            repo: &str,
            since_cursor: Option<&str>,
            credential: Option<&Credential>,
        ) -> Result<Vec<ProviderRelease>, ProviderError> {
            self.calls.lock().unwrap().push(ProviderCall {
                repo: repo.to_string(),
                since_cursor: since_cursor.map(str::to_string),
                token: credential.map(|c| c.token.clone()),
            });

            if let Some(cred) = credential {
                if self.rejected_tokens.lock().unwrap().contains(&cred.token) {
                    return Err(ProviderError::Unauthorized);
                }
            }
            if let Some(err) = self.failures.lock().unwrap().get(repo) {
                return Err(err.clone());
            }

            let all = self
                .releases
                .lock()
                .unwrap()
                .get(repo)
                .cloned()
                .ok_or_else(|| ProviderError::NotFound(repo.to_string()))?;

            let cutoff = since_cursor.and_then(|cursor| {
                all.iter()
                    .find(|r| r.external_id == cursor)
                    .map(|r| r.published_at)
            });
            Ok(match cutoff {
                Some(cutoff) => all.into_iter().filter(|r| r.published_at > cutoff).collect(),
                None => all,
            })
        }
    }
}
