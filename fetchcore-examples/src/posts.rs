//! A paginated posts endpoint, simulated in memory.
//!
//! Page bodies are stored as raw JSON and decoded on every fetch, so the
//! transport exercises the same failure classes a real HTTP client would:
//! non-success statuses and undecodable bodies.

use fetchcore::{ErrorKind, Transport};
use nutype::nutype;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

/// One post in the feed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Post {
    /// Post identifier.
    pub id: u32,
    /// Post title.
    pub title: String,
}

/// 1-based page of the feed; the loader key.
#[nutype(
    validate(greater_or_equal = 1, less_or_equal = 10_000),
    derive(
        Debug,
        Clone,
        Copy,
        PartialEq,
        Eq,
        Hash,
        PartialOrd,
        Ord,
        Display,
        Into,
        Serialize,
        Deserialize
    )
)]
pub struct PageNumber(u32);

/// Failures of the simulated endpoint.
#[derive(Debug, Error)]
pub enum ApiError {
    /// The server answered with a non-success status.
    #[error("server responded with status {0}")]
    Status(u16),

    /// The body was not a valid list of posts.
    #[error("malformed response body: {0}")]
    Decode(#[from] serde_json::Error),
}

#[derive(Debug, Clone)]
struct Route {
    latency: Duration,
    response: Result<String, u16>,
    outages: Arc<AtomicU32>,
}

impl Route {
    fn new(latency: Duration, response: Result<String, u16>, outages: u32) -> Self {
        Self {
            latency,
            response,
            outages: Arc::new(AtomicU32::new(outages)),
        }
    }

    /// Consumes one outage, if any are left.
    fn take_outage(&self) -> bool {
        self.outages
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |left| left.checked_sub(1))
            .is_ok()
    }
}

/// In-memory posts endpoint with a fixed latency per page.
#[derive(Debug, Clone, Default)]
pub struct PostsApi {
    routes: HashMap<PageNumber, Route>,
}

impl PostsApi {
    /// Creates an endpoint where every page is missing (404).
    pub fn new() -> Self {
        Self::default()
    }

    /// Serves `body` for `page` after `latency`.
    #[must_use]
    pub fn page(mut self, page: PageNumber, latency: Duration, body: impl Into<String>) -> Self {
        let _ = self
            .routes
            .insert(page, Route::new(latency, Ok(body.into()), 0));
        self
    }

    /// Answers `page` with 503 for the first `outages` requests, then serves
    /// `body`.
    #[must_use]
    pub fn recovering(
        mut self,
        page: PageNumber,
        latency: Duration,
        outages: u32,
        body: impl Into<String>,
    ) -> Self {
        let _ = self
            .routes
            .insert(page, Route::new(latency, Ok(body.into()), outages));
        self
    }

    /// Answers `page` with `status` after `latency`.
    #[must_use]
    pub fn status(mut self, page: PageNumber, latency: Duration, status: u16) -> Self {
        let _ = self
            .routes
            .insert(page, Route::new(latency, Err(status), 0));
        self
    }
}

impl Transport<PageNumber, Vec<Post>> for PostsApi {
    type Error = ApiError;

    fn fetch(&self, page: PageNumber) -> impl Future<Output = Result<Vec<Post>, ApiError>> + Send {
        let route = self.routes.get(&page).cloned();

        async move {
            let Some(route) = route else {
                return Err(ApiError::Status(404));
            };

            tokio::time::sleep(route.latency).await;

            if route.take_outage() {
                return Err(ApiError::Status(503));
            }
            let body = route.response.map_err(ApiError::Status)?;
            Ok(serde_json::from_str(&body)?)
        }
    }

    fn classify(&self, error: &ApiError) -> ErrorKind {
        match error {
            ApiError::Status(status) => ErrorKind::Response(*status),
            ApiError::Decode(_) => ErrorKind::Decode,
        }
    }
}

/// Builds a page number, panicking on values outside 1..=10000.
///
/// Only meant for literals in examples and tests.
pub fn page(number: u32) -> PageNumber {
    PageNumber::try_new(number).expect("page literal is within range")
}

/// The endpoint used by the `posts_feed` example.
///
/// Earlier pages answer more slowly than later ones, so flipping through the
/// pages quickly makes responses arrive in reverse order. Page 4 is down for
/// its first request and recovers afterwards; page 6 is always down.
pub fn demo_api() -> PostsApi {
    PostsApi::new()
        .page(page(1), Duration::from_millis(120), r#"[{ "id": 1, "title": "Hi" }]"#)
        .page(
            page(2),
            Duration::from_millis(60),
            r#"[{ "id": 2, "title": "Second" }, { "id": 3, "title": "Third" }]"#,
        )
        .page(page(3), Duration::from_millis(10), r#"[{ "id": 4, "title": "Fourth" }]"#)
        .recovering(
            page(4),
            Duration::from_millis(10),
            1,
            r#"[{ "id": 5, "title": "Back online" }]"#,
        )
        .status(page(6), Duration::from_millis(10), 503)
        .page(page(5), Duration::from_millis(10), r#"{ "id": "not a list" }"#)
}

#[cfg(test)]
mod tests {
    use super::*;
    use fetchcore::{ErrorInfo, ResourceLoader, ResourceState};

    #[tokio::test(start_paused = true)]
    async fn page_body_is_decoded() {
        let posts = demo_api().fetch(page(1)).await.expect("page 1 exists");

        assert_eq!(
            posts,
            vec![Post {
                id: 1,
                title: "Hi".to_string()
            }]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn failures_are_classified() {
        let api = demo_api();

        let unavailable = api.fetch(page(6)).await.expect_err("page 6 fails");
        let malformed = api.fetch(page(5)).await.expect_err("page 5 is malformed");
        let missing = api.fetch(page(9)).await.expect_err("page 9 is missing");

        assert_eq!(api.classify(&unavailable), ErrorKind::Response(503));
        assert_eq!(api.classify(&malformed), ErrorKind::Decode);
        assert_eq!(api.classify(&missing), ErrorKind::Response(404));
    }

    #[tokio::test(start_paused = true)]
    async fn recovering_page_fails_then_serves_its_body() {
        let api = demo_api();

        let outage = api.fetch(page(4)).await.expect_err("first request hits the outage");
        let recovered = api.fetch(page(4)).await.expect("page 4 is back");

        assert_eq!(api.classify(&outage), ErrorKind::Response(503));
        assert_eq!(recovered[0].title, "Back online");
    }

    #[tokio::test(start_paused = true)]
    async fn observing_a_failed_page_again_recovers() {
        let loader = ResourceLoader::new(demo_api());

        let _ = loader.observe(page(4));
        let failed = loader.settled().await.expect("cycle settles");
        let _ = loader.observe(page(4));
        let recovered = loader.settled().await.expect("cycle settles");

        assert_eq!(failed.error().map(ErrorInfo::kind), Some(ErrorKind::Response(503)));
        assert_eq!(recovered.into_data().map(|posts| posts[0].id), Some(5));
    }

    #[tokio::test(start_paused = true)]
    async fn flipping_pages_quickly_shows_the_last_page() {
        let loader = ResourceLoader::new(demo_api());

        for number in 1..=3 {
            let _ = loader.observe(page(number));
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        let settled = loader.settled().await.expect("cycle settles");
        tokio::time::sleep(Duration::from_millis(200)).await;

        assert_eq!(settled.key(), Some(&page(3)));
        assert_eq!(loader.state(), settled);
        assert!(matches!(loader.state(), ResourceState::Success { data, .. } if data[0].id == 4));
    }
}
