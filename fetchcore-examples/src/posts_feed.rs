//! Posts feed example
//!
//! This example demonstrates a paginated feed with:
//! - Page changes issued faster than the API answers
//! - Responses arriving out of order, with only the last page shown
//! - Errors surfaced as state and retried by the consumer until they recover
//! - Two loaders sharing one request through `fetchcore-cache`
//!
//! Run with `RUST_LOG=fetchcore=debug` to see superseded responses being
//! discarded.

use anyhow::Result;
use fetchcore::{
    FetchTimeoutMs, LoaderHook, LoaderMetrics, LoaderName, ResourceKey, ResourceLoader,
    ResourceState, TransportExt,
};
use fetchcore_cache::{CacheConfig, CacheTtlMs, SharedTransport};
use fetchcore_examples::posts::{demo_api, page, PageNumber, Post};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;
use tracing_subscriber::EnvFilter;

/// Prints every published state as one JSON line, tagged with the loader.
struct JsonPrinter {
    label: &'static str,
}

impl<K, T> LoaderHook<K, T> for JsonPrinter
where
    K: ResourceKey + Serialize,
    T: Serialize,
{
    fn on_state_published(&self, state: &ResourceState<K, T>) {
        match serde_json::to_string(state) {
            Ok(json) => println!("{:>8} {json}", self.label),
            Err(error) => eprintln!("{:>8} unserializable state: {error}", self.label),
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    info!("Starting posts feed example");

    let api: SharedTransport<PageNumber, Vec<Post>, _> = SharedTransport::new(
        demo_api().with_timeout(FetchTimeoutMs::try_new(1_000)?),
        CacheConfig::default().with_time_to_live(CacheTtlMs::try_new(30_000)?),
    );
    let metrics = Arc::new(LoaderMetrics::default());

    let feed: ResourceLoader<PageNumber, Vec<Post>, _> = ResourceLoader::builder(api.clone())
        .name(LoaderName::try_new("feed")?)
        .hook(Arc::new(JsonPrinter { label: "feed" }))
        .hook(metrics.clone())
        .build();

    // The reader pages forward before page 1 has answered.
    info!("Flipping through pages 1 to 3");
    for number in 1..=3 {
        let _ = feed.observe(page(number));
        tokio::time::sleep(Duration::from_millis(15)).await;
    }
    let shown = feed.settled().await?;
    info!(page = ?shown.key(), "feed settled");

    // Let the slower, superseded responses arrive; they must not be shown.
    tokio::time::sleep(Duration::from_millis(150)).await;

    // A page hit by a brief outage, then the reader presses "retry".
    info!("Opening page 4, which is briefly unavailable");
    let _ = feed.observe(page(4));
    let failed = feed.settled().await?;
    if let Some(error) = failed.error() {
        info!(kind = %error.kind(), message = error.message(), "page failed");
    }
    let _ = feed.refetch()?;
    let recovered = feed.settled().await?;
    info!(
        posts = recovered.data().map_or(0, Vec::len),
        "page recovered"
    );

    // A second widget showing page 3 reuses the retained response.
    let sidebar: ResourceLoader<PageNumber, Vec<Post>, _> = ResourceLoader::builder(api.clone())
        .name(LoaderName::try_new("sidebar")?)
        .hook(Arc::new(JsonPrinter { label: "sidebar" }))
        .build();
    let _ = sidebar.observe(page(3));
    let _ = sidebar.settled().await?;

    feed.dispose();
    sidebar.dispose();

    info!(metrics = ?metrics.snapshot(), cached = api.cached_len(), "Posts feed example completed");

    Ok(())
}
