//! The display surface that renders external content.
//!
//! A surface reports back through a one-use [`SurfaceReply`]: `loaded`,
//! `errored`, or nothing at all when the reply is dropped. Silence is common
//! for cross-origin content, which is why load sessions carry a fallback timer.

use std::{
    fmt,
    sync::{Arc, Mutex, PoisonError, Weak},
};

use reqwest::header::{HeaderMap, CONTENT_SECURITY_POLICY, X_FRAME_OPTIONS};
use shared::domain::SessionToken;
use tracing::{debug, info};
use url::Url;

use crate::{
    bounded::{BoundedExecutor, OperationCanceller, OperationRequest, RequestOptions, RetryPolicy},
    http::HttpFetch,
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NavigationRequest {
    pub token: SessionToken,
    pub address: Url,
    /// Set for hosts on the blacklist; the surface must isolate the content.
    pub sandboxed: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SurfaceSignal {
    Loaded,
    Errored(String),
}

pub(crate) trait SignalSink: Send + Sync {
    fn settle(&self, token: SessionToken, signal: SurfaceSignal);
}

/// One-use answer channel for a single navigation.
pub struct SurfaceReply {
    token: SessionToken,
    sink: Weak<dyn SignalSink>,
}

impl SurfaceReply {
    pub(crate) fn new(token: SessionToken, sink: Weak<dyn SignalSink>) -> Self {
        Self { token, sink }
    }

    pub fn token(&self) -> SessionToken {
        self.token
    }

    pub fn loaded(self) {
        self.send(SurfaceSignal::Loaded);
    }

    pub fn errored(self, reason: impl Into<String>) {
        self.send(SurfaceSignal::Errored(reason.into()));
    }

    fn send(self, signal: SurfaceSignal) {
        if let Some(sink) = self.sink.upgrade() {
            sink.settle(self.token, signal);
        }
    }
}

impl fmt::Debug for SurfaceReply {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SurfaceReply")
            .field("token", &self.token)
            .finish_non_exhaustive()
    }
}

pub trait DisplaySurface: Send + Sync {
    /// Starts showing `request.address`. Must not block.
    fn navigate(&self, request: NavigationRequest, reply: SurfaceReply);
}

/// True when the response forbids being embedded in another page.
pub fn embedding_refused(headers: &HeaderMap) -> bool {
    let frame_options = headers
        .get(X_FRAME_OPTIONS)
        .and_then(|value| value.to_str().ok())
        .map(|value| value.trim().to_ascii_lowercase());
    if matches!(frame_options.as_deref(), Some("deny" | "sameorigin")) {
        return true;
    }

    headers
        .get_all(CONTENT_SECURITY_POLICY)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|policy| policy.split(';'))
        .filter_map(|directive| {
            let mut parts = directive.split_whitespace();
            match parts.next() {
                Some(name) if name.eq_ignore_ascii_case("frame-ancestors") => {
                    Some(parts.collect::<Vec<_>>())
                }
                _ => None,
            }
        })
        .any(|sources| !sources.contains(&"*"))
}

/// Headless surface that probes the address over HTTP.
///
/// 2xx answers count as loaded, network failures and 4xx/5xx as errored.
/// Responses that refuse embedding produce no signal at all, the way a real
/// embedded frame stays silent when the browser blocks it.
pub struct ProbeSurface {
    executor: BoundedExecutor,
    fetch: Arc<HttpFetch>,
    policy: RetryPolicy,
    in_flight: Mutex<Option<OperationCanceller>>,
}

impl ProbeSurface {
    pub fn new(fetch: HttpFetch, policy: RetryPolicy) -> Self {
        Self {
            executor: BoundedExecutor::new(),
            fetch: Arc::new(fetch),
            policy,
            in_flight: Mutex::new(None),
        }
    }

    /// Abandons the probe in flight, if any.
    pub fn shutdown(&self) {
        self.executor.shutdown();
    }
}

impl DisplaySurface for ProbeSurface {
    fn navigate(&self, request: NavigationRequest, reply: SurfaceReply) {
        let operation = OperationRequest::new(request.address.as_str(), self.policy)
            .with_options(RequestOptions {
                accept: Some("text/html,*/*".to_string()),
                ..RequestOptions::default()
            });
        let handle = self.executor.spawn(operation, Arc::clone(&self.fetch));

        let previous = self
            .in_flight
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .replace(handle.canceller());
        if let Some(previous) = previous {
            previous.cancel();
        }

        let token = request.token;
        let sandboxed = request.sandboxed;
        tokio::spawn(async move {
            match handle.outcome().await {
                Ok(response) if embedding_refused(&response.headers) => {
                    info!(%token, "surface: content refuses embedding, staying silent");
                    drop(reply);
                }
                Ok(response) => {
                    debug!(%token, sandboxed, status = response.status.as_u16(), "surface: loaded");
                    reply.loaded();
                }
                Err(err) if err.is_cancelled() => {
                    debug!(%token, "surface: probe superseded");
                }
                Err(err) => reply.errored(err.to_string()),
            }
        });
    }
}

impl fmt::Debug for ProbeSurface {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProbeSurface")
            .field("policy", &self.policy)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
#[path = "tests/surface_tests.rs"]
mod tests;
