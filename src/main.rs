//! # Resource Cache Demo
//!
//! Wires a [`ResourceService`] to an in-memory origin and walks through the
//! main flows:
//! 1.  A first load, with a second `load()` coalescing onto it.
//! 2.  A conditional reload answered with "not modified".
//! 3.  A reload after the origin changed.
//! 4.  A failed load that leaves nothing behind but the error.

use async_trait::async_trait;
use resource_cache::entity::Entity;
use resource_cache::lifecycle::{setup_tracing, ResourceService, ServiceError};
use resource_cache::observer::{Owner, ResourceEvent};
use resource_cache::request::{Outcome, RequestError};
use resource_cache::resource::{CacheConfig, ResourceCache};
use resource_cache::transport::{FetchRequest, Progress, Transport};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tracing::{info, info_span, warn, Instrument};

/// Versioned documents served with an etag per version.
#[derive(Clone, Default)]
struct InMemoryOrigin {
    documents: Arc<Mutex<HashMap<String, (u32, String)>>>,
}

impl InMemoryOrigin {
    fn publish(&self, path: &str, body: &str) {
        let mut documents = self.documents.lock().unwrap_or_else(PoisonError::into_inner);
        let version = documents.get(path).map_or(1, |(version, _)| version + 1);
        documents.insert(path.to_string(), (version, body.to_string()));
    }
}

#[async_trait]
impl Transport<String> for InMemoryOrigin {
    async fn fetch(&self, request: FetchRequest, progress: Progress<String>) -> Outcome<String> {
        tokio::time::sleep(Duration::from_millis(20)).await;
        progress.report(0.5);
        tokio::time::sleep(Duration::from_millis(20)).await;

        let document = self
            .documents
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&request.identity)
            .cloned();
        let Some((version, body)) = document else {
            info!(resource = %request.identity, status = 404, "Origin answered");
            return Outcome::Failure(RequestError::http_status(404));
        };

        let etag = format!("\"v{version}\"");
        if request.etag.as_deref() == Some(etag.as_str()) {
            info!(resource = %request.identity, status = 304, "Origin answered");
            return Outcome::NotModified;
        }
        info!(resource = %request.identity, status = 200, %etag, "Origin answered");
        Outcome::Success(Entity::with_headers(
            [("ETag", etag.as_str()), ("Content-Type", "text/plain; charset=utf-8")],
            body,
        ))
    }
}

fn describe(cache: &ResourceCache<String>, event: &ResourceEvent) {
    match event {
        ResourceEvent::NewData(_) => {
            let body = cache.latest_payload().map(|body| body.to_string()).unwrap_or_default();
            info!(resource = cache.identity(), %event, %body, "Observer notified");
        }
        ResourceEvent::Error => {
            let error = cache.latest_error().map(|e| e.to_string()).unwrap_or_default();
            warn!(resource = cache.identity(), %event, %error, "Observer notified");
        }
        _ => info!(resource = cache.identity(), %event, "Observer notified"),
    }
}

#[tokio::main]
async fn main() -> Result<(), ServiceError> {
    setup_tracing();

    let origin = InMemoryOrigin::default();
    origin.publish("/articles/1", "Hello, cache");

    let service = ResourceService::new(
        Arc::new(origin.clone()),
        CacheConfig::default().with_expiration(Duration::from_secs(60)),
    );
    let view = Owner::new("article-view");

    let article = service.resource("/articles/1");
    article.add_observer(Arc::new(describe), &view);

    let span = info_span!("first_load");
    async {
        let first = article.load();
        let second = article.load();
        info!(coalesced = first == second, "Two loads, one request");
        first.completed().await;
    }
    .instrument(span)
    .await;

    let reload = article.load();
    reload.on_not_modified(|| info!("Origin confirmed the cached copy"));
    reload.completed().await;

    origin.publish("/articles/1", "Hello again, cache");
    article.invalidate();
    if let Some(request) = article.load_if_needed() {
        request.completed().await;
    }

    let missing = service.resource("/articles/404");
    missing.add_observer(Arc::new(describe), &view);
    missing
        .load()
        .on_failure(|error| warn!(status = ?error.http_status_code(), "Load failed as expected"))
        .completed()
        .await;

    article.flush().await?;
    missing.flush().await?;
    drop((article, missing, view));
    info!(flushed = service.flush_unused(), "Released unused caches");

    service.shutdown().await
}
