use resource_cache::entity::Entity;
use resource_cache::observer::{ObserverRegistry, Owner, ResourceEvent, ResourceObserver};
use resource_cache::request::{Outcome, Request, RequestError};
use resource_cache::resource::{CacheConfig, ResourceCache};
use resource_cache::transport::mock::{create_mock_transport, expect_fetch, MockTransport};
use std::sync::{Arc, Mutex};
use std::time::Duration;

type Log = Arc<Mutex<Vec<String>>>;

struct EventLog {
    log: Log,
}

impl ResourceObserver<ResourceCache<String>> for EventLog {
    fn resource_changed(&self, _cache: &ResourceCache<String>, event: &ResourceEvent) {
        self.log.lock().unwrap().push(event.to_string());
    }

    fn stopped_observing_resource(&self, _cache: &ResourceCache<String>) {
        self.log.lock().unwrap().push("stopped".to_string());
    }
}

fn event_log() -> (Arc<EventLog>, Log) {
    let log: Log = Arc::new(Mutex::new(Vec::new()));
    (Arc::new(EventLog { log: log.clone() }), log)
}

/// Content-Type and ETag are picked out of mixed-case raw headers.
#[test]
fn test_entity_from_raw_headers() {
    let entity = Entity::with_headers(
        [("Content-Type", "application/json; charset=utf-8"), ("ETAG", "\"xyz\"")],
        b"{}".to_vec(),
    );

    assert_eq!(entity.mime_type(), "application/json");
    assert_eq!(entity.charset(), Some("utf-8"));
    assert_eq!(entity.etag(), Some("\"xyz\""));
    assert_eq!(entity.header("content-type"), entity.header("CONTENT-TYPE"));
}

/// Full load cycle against a live dispatcher: load, revalidate, fail, recover.
#[tokio::test]
async fn test_full_load_cycle() {
    let mock = MockTransport::<String>::new();
    mock.expect_fetch().return_success(Entity::with_headers([("ETag", "\"1\"")], "one".to_string()));
    mock.expect_fetch().return_not_modified();
    mock.expect_fetch().return_failure(RequestError::http_status(500).with_user_message("Server error"));
    mock.expect_fetch().return_success(Entity::with_headers([("ETag", "\"2\"")], "two".to_string()));

    let (cache, dispatcher) = ResourceCache::spawn("/doc", Arc::new(mock.clone()), CacheConfig::default());
    let owner = Owner::new("screen");
    let (observer, log) = event_log();
    cache.add_observer(observer, &owner);

    for _ in 0..4 {
        cache.load().completed().await.expect("outcome");
    }
    cache.flush().await.unwrap();

    assert_eq!(
        *log.lock().unwrap(),
        vec![
            "ObserverAdded",
            "RequestStarted",
            "NewData(Network)",
            "RequestStarted",
            "NotModified",
            "RequestStarted",
            "Error",
            "RequestStarted",
            "NewData(Network)",
        ]
    );
    let etags: Vec<Option<String>> = mock.requests().into_iter().map(|r| r.etag).collect();
    assert_eq!(
        etags,
        vec![None, Some("\"1\"".to_string()), Some("\"1\"".to_string()), Some("\"1\"".to_string())]
    );
    assert_eq!(cache.latest_payload().as_deref().map(String::as_str), Some("two"));
    assert!(cache.latest_error().is_none());
    mock.verify();

    drop((cache, owner));
    dispatcher.await.unwrap();
}

/// Three concurrent loads share one fetch and one outcome.
#[tokio::test]
async fn test_coalesced_loads_share_outcome() {
    let (transport, mut fetches) = create_mock_transport::<String>(8);
    let (cache, _dispatcher) = ResourceCache::spawn("/shared", Arc::new(transport), CacheConfig::default());

    let requests: Vec<Request<String>> = (0..3).map(|_| cache.load()).collect();
    let waiters: Vec<_> = requests
        .iter()
        .cloned()
        .map(|request| tokio::spawn(async move { request.completed().await }))
        .collect();

    let (_, _, respond_to) = expect_fetch(&mut fetches).await.expect("fetch");
    respond_to.send(Outcome::Success(Entity::new("body".to_string()))).ok();

    for waiter in waiters {
        let outcome = waiter.await.unwrap().expect("outcome");
        assert_eq!(outcome.entity().map(|e| e.payload().as_str()), Some("body"));
    }
    assert!(requests.windows(2).all(|pair| pair[0] == pair[1]));
    assert!(fetches.try_recv().is_err());
}

/// A transport that watches for cancellation gets to report it itself.
#[tokio::test]
async fn test_cancellation_reaches_transport() {
    let (transport, mut fetches) = create_mock_transport::<String>(1);
    let (cache, _dispatcher) = ResourceCache::spawn("/slow", Arc::new(transport), CacheConfig::default());
    let request = cache.load();
    let calls: Log = Arc::new(Mutex::new(Vec::new()));
    let sink = calls.clone();
    request.on_completion(move |outcome| sink.lock().unwrap().push(outcome.label().to_string()));

    let (_, progress, respond_to) = expect_fetch(&mut fetches).await.expect("fetch");
    let transport_side = tokio::spawn(async move {
        progress.cancelled().await;
        progress.is_cancelled()
    });
    cache.cancel_load();

    assert!(tokio::time::timeout(Duration::from_secs(1), transport_side)
        .await
        .expect("transport saw the cancel")
        .unwrap());
    drop(respond_to);
    for _ in 0..1000 {
        if !cache.is_loading() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(1)).await;
    }

    assert!(!cache.is_loading());
    assert!(cache.latest_error().is_some_and(|e| e.is_cancellation()));
    assert!(calls.lock().unwrap().is_empty());
}

/// Releasing an owner drops its observers with exactly one stop each.
#[tokio::test]
async fn test_owner_release_prunes_observers() {
    let (cache, _dispatcher) =
        ResourceCache::spawn("/pruned", Arc::new(MockTransport::<String>::new()), CacheConfig::default());
    let survivor_owner = Owner::new("survivor");
    let (survivor, survivor_log) = event_log();
    let (orphan, orphan_log) = event_log();
    {
        let temporary_owner = Owner::new("temporary");
        cache.add_observer(survivor, &survivor_owner);
        cache.add_observer(orphan, &temporary_owner);
        cache.flush().await.unwrap();
    }

    for body in ["a", "b", "c"] {
        cache.override_local_data(Entity::new(body.to_string()));
    }
    cache.flush().await.unwrap();

    assert_eq!(*orphan_log.lock().unwrap(), vec!["ObserverAdded", "stopped"]);
    assert_eq!(survivor_log.lock().unwrap().len(), 4);
    assert_eq!(cache.observer_count(), 1);
}

/// The registry works on its own, with any resource type.
#[test]
fn test_registry_standalone() {
    let log: Log = Arc::new(Mutex::new(Vec::new()));
    let sink = log.clone();
    let owner = Owner::new("standalone");
    let mut registry: ObserverRegistry<u32> = ObserverRegistry::new();
    registry.add_observer(
        Arc::new(move |resource: &u32, event: &ResourceEvent| {
            sink.lock().unwrap().push(format!("{resource}:{event}"))
        }),
        &owner,
    );

    registry.notify(&7, &ResourceEvent::RequestStarted);
    drop(owner);
    registry.notify(&7, &ResourceEvent::Error);

    assert_eq!(*log.lock().unwrap(), vec!["7:RequestStarted"]);
    assert!(registry.is_empty());
}
