use std::{
    sync::{Mutex, PoisonError},
    time::Duration,
};

use quick_xml::{events::Event, Reader};
use thiserror::Error;
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::{
    bounded::{BoundedError, BoundedExecutor, OperationRequest, RequestOptions, RetryPolicy},
    http::HttpFetch,
};

pub const DEFAULT_NEWS_FEED: &str = "https://www.rtp.pt/noticias/rss/mundo";
pub const FEED_CACHE_TTL: Duration = Duration::from_secs(600);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeedItem {
    pub title: String,
    pub link: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FeedError {
    #[error(transparent)]
    Fetch(#[from] BoundedError),
    #[error("malformed feed: {0}")]
    Malformed(String),
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Field {
    Title,
    Link,
}

/// Extracts `<item>` title/link pairs. Items missing either are skipped.
pub fn parse_rss(xml: &str) -> Result<Vec<FeedItem>, FeedError> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);

    let mut items = Vec::new();
    let mut in_item = false;
    let mut field = None;
    let mut title = String::new();
    let mut link = String::new();

    loop {
        match reader.read_event() {
            Ok(Event::Start(start)) => match start.local_name().as_ref() {
                b"item" => {
                    in_item = true;
                    title.clear();
                    link.clear();
                }
                b"title" if in_item => field = Some(Field::Title),
                b"link" if in_item => field = Some(Field::Link),
                _ => {}
            },
            Ok(Event::Text(text)) => {
                let text = text
                    .unescape()
                    .map_err(|err| FeedError::Malformed(err.to_string()))?;
                push_field(field, &text, &mut title, &mut link);
            }
            Ok(Event::CData(data)) => {
                let data = data.into_inner();
                push_field(field, &String::from_utf8_lossy(&data), &mut title, &mut link);
            }
            Ok(Event::End(end)) => match end.local_name().as_ref() {
                b"item" => {
                    in_item = false;
                    field = None;
                    let title = title.trim();
                    let link = link.trim();
                    if !title.is_empty() && !link.is_empty() {
                        items.push(FeedItem {
                            title: title.to_string(),
                            link: link.to_string(),
                        });
                    }
                }
                b"title" | b"link" => field = None,
                _ => {}
            },
            Ok(Event::Eof) => break,
            Err(err) => {
                return Err(FeedError::Malformed(format!(
                    "at byte {}: {err}",
                    reader.buffer_position()
                )))
            }
            Ok(_) => {}
        }
    }
    Ok(items)
}

fn push_field(field: Option<Field>, text: &str, title: &mut String, link: &mut String) {
    match field {
        Some(Field::Title) => title.push_str(text),
        Some(Field::Link) => link.push_str(text),
        None => {}
    }
}

/// Titles joined for a single scrolling line.
pub fn render_ticker(items: &[FeedItem]) -> String {
    items
        .iter()
        .map(|item| item.title.as_str())
        .collect::<Vec<_>>()
        .join(" | ")
}

struct CachedFeed {
    fetched_at: Instant,
    items: Vec<FeedItem>,
}

/// An RSS feed fetched through the bounded executor and cached in memory.
pub struct NewsFeed {
    url: String,
    executor: BoundedExecutor,
    fetch: HttpFetch,
    policy: RetryPolicy,
    ttl: Duration,
    cache: Mutex<Option<CachedFeed>>,
}

impl NewsFeed {
    pub fn new(url: impl Into<String>, fetch: HttpFetch, policy: RetryPolicy) -> Self {
        Self {
            url: url.into(),
            executor: BoundedExecutor::new(),
            fetch,
            policy,
            ttl: FEED_CACHE_TTL,
            cache: Mutex::new(None),
        }
    }

    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// Cached items while they are fresh, otherwise a new fetch.
    pub async fn items(&self) -> Result<Vec<FeedItem>, FeedError> {
        if let Some(items) = self.fresh() {
            debug!(feed = %self.url, "feed: serving cached items");
            return Ok(items);
        }

        let request = OperationRequest::new(self.url.clone(), self.policy).with_options(RequestOptions {
            accept: Some("application/rss+xml, application/xml, text/xml".to_string()),
            ..RequestOptions::default()
        });
        let fetched = self
            .executor
            .execute(&request, &self.fetch)
            .await
            .inspect_err(|err| warn!(feed = %self.url, "feed: fetch failed: {err}"))?;
        let items = parse_rss(&String::from_utf8_lossy(&fetched.body))?;
        debug!(feed = %self.url, items = items.len(), "feed: refreshed");

        *self.cache.lock().unwrap_or_else(PoisonError::into_inner) = Some(CachedFeed {
            fetched_at: Instant::now(),
            items: items.clone(),
        });
        Ok(items)
    }

    pub fn shutdown(&self) {
        self.executor.shutdown();
    }

    fn fresh(&self) -> Option<Vec<FeedItem>> {
        let cache = self.cache.lock().unwrap_or_else(PoisonError::into_inner);
        cache
            .as_ref()
            .filter(|cached| cached.fetched_at.elapsed() < self.ttl)
            .map(|cached| cached.items.clone())
    }
}

impl std::fmt::Debug for NewsFeed {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NewsFeed")
            .field("url", &self.url)
            .field("ttl", &self.ttl)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
#[path = "tests/feed_tests.rs"]
mod tests;
