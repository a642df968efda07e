//! Loading the hub document with a disk cache to fall back on.
//!
//! A fetch or parse failure never reaches the caller as an error: the loader
//! degrades to the cached copy, or to an empty document plus a notice.

use std::{
    fmt,
    path::{Path, PathBuf},
};

use anyhow::Context;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use shared::{
    error::Notice,
    hub::{CachedHubDocument, HubDocument},
};
use thiserror::Error;
use tracing::{debug, info, warn};
use url::Url;

use crate::{
    bounded::{BoundedError, BoundedExecutor, Operation, OperationRequest, RequestOptions, RetryPolicy},
    http::HttpFetch,
};

const CACHE_FILE: &str = "hub_document.json";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HubSource {
    File(PathBuf),
    Remote(Url),
}

impl HubSource {
    /// `http(s)://` locations are remote, everything else is a file path.
    pub fn parse(location: &str) -> Self {
        let location = location.trim();
        match Url::parse(location) {
            Ok(url) if matches!(url.scheme(), "http" | "https") => Self::Remote(url),
            _ => Self::File(PathBuf::from(location)),
        }
    }
}

impl fmt::Display for HubSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HubSource::File(path) => write!(f, "{}", path.display()),
            HubSource::Remote(url) => write!(f, "{url}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HubFailure {
    #[error(transparent)]
    Fetch(#[from] BoundedError),
    #[error("malformed hub document: {0}")]
    Parse(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HubError {
    #[error("hub document from {origin} unavailable: {cause}")]
    ConfigUnavailable { origin: String, cause: HubFailure },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HubOrigin {
    Fresh,
    Cache { fetched_at: DateTime<Utc> },
    Empty,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HubLoad {
    pub document: HubDocument,
    pub origin: HubOrigin,
    pub error: Option<HubError>,
}

impl HubLoad {
    /// The notice to show, if any. Falling back to the cache is silent.
    pub fn notice(&self) -> Option<Notice> {
        (self.origin == HubOrigin::Empty && self.error.is_some()).then(Notice::hub_unavailable)
    }
}

/// The last good document on disk.
#[derive(Debug, Clone)]
pub struct HubCache {
    path: PathBuf,
}

impl HubCache {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn in_user_cache_dir() -> Option<Self> {
        dirs::cache_dir().map(|base| Self::new(base.join("hubshell").join(CACHE_FILE)))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub async fn read(&self) -> Option<CachedHubDocument> {
        let bytes = match tokio::fs::read(&self.path).await {
            Ok(bytes) => bytes,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return None,
            Err(err) => {
                warn!(path = %self.path.display(), "hub: could not read cache: {err}");
                return None;
            }
        };
        match serde_json::from_slice(&bytes) {
            Ok(cached) => Some(cached),
            Err(err) => {
                warn!(path = %self.path.display(), "hub: ignoring corrupt cache: {err}");
                None
            }
        }
    }

    pub async fn write(&self, cached: &CachedHubDocument) -> anyhow::Result<()> {
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .with_context(|| format!("could not prepare cache directory '{}'", parent.display()))?;
        }
        let serialized = serde_json::to_vec_pretty(cached)?;
        tokio::fs::write(&self.path, serialized)
            .await
            .with_context(|| format!("failed to write {}", self.path.display()))
    }
}

/// Raw bytes of the document, from disk or over HTTP.
struct HubFetch {
    source: HubSource,
    http: HttpFetch,
}

#[async_trait]
impl Operation for HubFetch {
    type Output = Vec<u8>;

    async fn attempt(&self, request: &OperationRequest, attempt: u32) -> anyhow::Result<Vec<u8>> {
        match &self.source {
            HubSource::File(path) => tokio::fs::read(path)
                .await
                .with_context(|| format!("failed to read {}", path.display())),
            HubSource::Remote(_) => Ok(self.http.attempt(request, attempt).await?.body),
        }
    }
}

pub struct HubDocumentLoader {
    executor: BoundedExecutor,
    http: HttpFetch,
    policy: RetryPolicy,
    cache: Option<HubCache>,
}

impl HubDocumentLoader {
    pub fn new(http: HttpFetch) -> Self {
        Self {
            executor: BoundedExecutor::new(),
            http,
            policy: RetryPolicy::hub_document_default(),
            cache: None,
        }
    }

    pub fn with_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_cache(mut self, cache: Option<HubCache>) -> Self {
        self.cache = cache;
        self
    }

    /// Fetches and parses without any fallback.
    pub async fn fetch(&self, source: &HubSource) -> Result<HubDocument, HubError> {
        let unavailable = |cause: HubFailure| HubError::ConfigUnavailable {
            origin: source.to_string(),
            cause,
        };

        let request = OperationRequest::new(source.to_string(), self.policy).with_options(RequestOptions {
            accept: Some("application/json".to_string()),
            ..RequestOptions::default()
        });
        let operation = HubFetch {
            source: source.clone(),
            http: self.http.clone(),
        };
        let bytes = self
            .executor
            .execute(&request, &operation)
            .await
            .map_err(|err| unavailable(err.into()))?;

        HubDocument::from_json_slice(&bytes).map_err(|err| unavailable(HubFailure::Parse(err.to_string())))
    }

    /// Fetches the document, falling back to the cache and then to an empty
    /// document. A fresh document replaces the cache.
    pub async fn load(&self, source: &HubSource) -> HubLoad {
        let error = match self.fetch(source).await {
            Ok(document) => {
                info!(
                    source = %source,
                    categories = document.categories.len(),
                    links = document.link_count(),
                    "hub: document loaded"
                );
                self.remember(source, &document).await;
                return HubLoad {
                    document,
                    origin: HubOrigin::Fresh,
                    error: None,
                };
            }
            Err(err) => err,
        };

        warn!(source = %source, "hub: {error}");
        let cached = match &self.cache {
            Some(cache) => cache.read().await,
            None => None,
        };
        match cached {
            Some(cached) => {
                info!(fetched_at = %cached.fetched_at, "hub: using cached document");
                HubLoad {
                    document: cached.document,
                    origin: HubOrigin::Cache {
                        fetched_at: cached.fetched_at,
                    },
                    error: Some(error),
                }
            }
            None => HubLoad {
                document: HubDocument::default(),
                origin: HubOrigin::Empty,
                error: Some(error),
            },
        }
    }

    pub fn shutdown(&self) {
        self.executor.shutdown();
    }

    async fn remember(&self, source: &HubSource, document: &HubDocument) {
        let Some(cache) = &self.cache else {
            return;
        };
        let cached = CachedHubDocument {
            fetched_at: Utc::now(),
            source: source.to_string(),
            document: document.clone(),
        };
        match cache.write(&cached).await {
            Ok(()) => debug!(path = %cache.path().display(), "hub: cache updated"),
            Err(err) => warn!("hub: could not update cache: {err:#}"),
        }
    }
}

impl fmt::Debug for HubDocumentLoader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HubDocumentLoader")
            .field("policy", &self.policy)
            .field("cache", &self.cache)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
#[path = "tests/hub_document_tests.rs"]
mod tests;
