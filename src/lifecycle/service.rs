use crate::resource::{CacheConfig, ResourceCache};
use crate::transport::Transport;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

/// Errors from the cache runtime itself, as opposed to load failures.
#[derive(Debug, thiserror::Error, PartialEq)]
pub enum ServiceError {
    #[error("Dispatcher for {0} stopped")]
    DispatcherStopped(String),
    #[error("Dispatcher task failed: {0}")]
    DispatcherFailed(String),
}

struct Slot<P> {
    cache: ResourceCache<P>,
    dispatcher: JoinHandle<()>,
}

/// Entry point to a family of resources sharing one transport.
///
/// `ResourceService` is responsible for:
/// - **Identity**: one [`ResourceCache`] per resource identity, created on
///   first access and handed out again on every later access
/// - **Lifecycle**: spawning each cache's dispatcher and stopping them all
///   on [`shutdown`](Self::shutdown)
/// - **Memory**: [`flush_unused`](Self::flush_unused) forgets caches nobody
///   uses any more
///
/// # Example
///
/// ```ignore
/// let service = ResourceService::new(Arc::new(HttpTransport::new()), CacheConfig::default());
///
/// let profile = service.resource("/users/1");
/// profile.add_self_owned_observer(&view);
/// profile.load_if_needed();
///
/// service.shutdown().await?;
/// ```
pub struct ResourceService<P> {
    transport: Arc<dyn Transport<P>>,
    config: CacheConfig,
    slots: Mutex<HashMap<String, Slot<P>>>,
    // Dispatchers of flushed caches; they exit on their own.
    retired: Mutex<Vec<JoinHandle<()>>>,
}

impl<P: Send + Sync + 'static> ResourceService<P> {
    pub fn new(transport: Arc<dyn Transport<P>>, config: CacheConfig) -> Self {
        info!(expiration = ?config.expiration(), retry_time = ?config.retry_time(), "Resource service started");
        Self {
            transport,
            config,
            slots: Mutex::new(HashMap::new()),
            retired: Mutex::new(Vec::new()),
        }
    }

    fn lock_slots(&self) -> MutexGuard<'_, HashMap<String, Slot<P>>> {
        self.slots.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    /// The cache for `identity`, created (and its dispatcher spawned) on
    /// first access. Must be called from within a Tokio runtime.
    pub fn resource(&self, identity: impl Into<String>) -> ResourceCache<P> {
        let identity = identity.into();
        let mut slots = self.lock_slots();
        if let Some(slot) = slots.get(&identity) {
            return slot.cache.clone();
        }

        let (cache, dispatcher) =
            ResourceCache::spawn(identity.clone(), Arc::clone(&self.transport), self.config.clone());
        debug!(resource = %identity, size = slots.len() + 1, "Cache created");
        slots.insert(
            identity,
            Slot {
                cache: cache.clone(),
                dispatcher,
            },
        );
        cache
    }

    /// The cache for `identity` if one exists. Never creates.
    pub fn cached(&self, identity: &str) -> Option<ResourceCache<P>> {
        self.lock_slots().get(identity).map(|slot| slot.cache.clone())
    }

    pub fn cache_count(&self) -> usize {
        self.lock_slots().len()
    }

    /// Marks every cache stale.
    pub fn invalidate_all(&self) {
        for slot in self.lock_slots().values() {
            slot.cache.invalidate();
        }
    }

    /// Forgets every cache with no live observers, no load in flight, and no
    /// handle held outside the service. Returns how many were dropped.
    pub fn flush_unused(&self) -> usize {
        let mut slots = self.lock_slots();
        let unused: Vec<String> = slots
            .iter()
            .filter(|(_, slot)| {
                slot.cache.holders() == 1
                    && slot.cache.observer_count() == 0
                    && !slot.cache.is_loading()
            })
            .map(|(identity, _)| identity.clone())
            .collect();

        let mut retired = self.retired.lock().unwrap_or_else(PoisonError::into_inner);
        for identity in &unused {
            if let Some(slot) = slots.remove(identity) {
                retired.push(slot.dispatcher);
            }
        }
        retired.retain(|handle| !handle.is_finished());

        if !unused.is_empty() {
            info!(flushed = unused.len(), size = slots.len(), "Flushed unused caches");
        }
        unused.len()
    }

    /// Stops every dispatcher and waits for them to finish.
    ///
    /// Caches still held elsewhere keep their state but no longer notify
    /// observers, and their `flush()` reports [`ServiceError::DispatcherStopped`].
    pub async fn shutdown(self) -> Result<(), ServiceError> {
        info!("Shutting down resource service...");

        let slots = std::mem::take(&mut *self.lock_slots());
        let mut handles = std::mem::take(&mut *self.retired.lock().unwrap_or_else(PoisonError::into_inner));
        for (_, slot) in slots {
            slot.cache.stop_dispatcher();
            handles.push(slot.dispatcher);
        }

        for handle in handles {
            if let Err(e) = handle.await {
                error!("Dispatcher task failed: {:?}", e);
                return Err(ServiceError::DispatcherFailed(e.to_string()));
            }
        }

        info!("Resource service shutdown complete.");
        Ok(())
    }
}
