//! # Observability & Tracing
//!
//! [`setup_tracing`] installs a compact `tracing-subscriber` formatter driven
//! by `RUST_LOG`.
//!
//! ## What Gets Traced
//!
//! - **Loads**: start, coalescing, outcome, cancellation (`info`/`warn`)
//! - **Dispatchers**: start and stop with the number of deliveries (`info`)
//! - **Observers**: added, removed, pruned (`debug`)
//! - **Requests**: settlement and dropped resolvers (`debug`/`trace`)
//!
//! Every load runs inside a `load` span carrying `resource` and `request_id`,
//! so transport logs line up with the cache that asked for them.
//!
//! ## Usage Examples
//!
//! ```bash
//! # Loads and outcomes only
//! RUST_LOG=info cargo run
//!
//! # Observer bookkeeping as well
//! RUST_LOG=debug cargo run
//!
//! # Every delivered notification
//! RUST_LOG=trace cargo run
//! ```
//!
//! With `RUST_LOG=info` a load that hits a warm cache reads:
//!
//! ```text
//! INFO Load started resource="/articles/1" request_id=3 conditional=true
//! INFO load: Origin answered resource="/articles/1" request_id=3 status=304
//! ```

/// Installs the global subscriber. Later calls are ignored, so tests can call
/// it freely.
pub fn setup_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_target(false)
        .compact()
        .try_init();
}
