//! # Resource Cache
//!
//! > **Observable, self-refreshing local copies of remote resources.**
//!
//! This crate keeps one in-memory cache per remote resource. Consumers ask
//! a cache to load, watch it through observers, and read whatever it last
//! received. Every network round trip is a [`Request`](request::Request)
//! with callbacks; every change of cached state is announced to observers in
//! the order it happened.
//!
//! ## 🏗️ Design Philosophy
//!
//! ### One resource, one owner context
//! Each [`ResourceCache`](resource::ResourceCache) has its own dispatcher
//! task. Transitions are applied under a short lock and their notifications
//! queued right there, so observers always see them in transition order,
//! no matter which task finished the fetch.
//!
//! ### Failures are data
//! A load never panics and never returns `Err`. It resolves with an
//! [`Outcome`](request::Outcome): new data, not modified, or a
//! [`RequestError`](request::RequestError). The last good entity survives
//! every failure.
//!
//! ### Owners, not unsubscribe calls
//! Observers are registered under an owner. Drop the owner and the
//! registration disappears on the next notification.
//!
//! ## 🗺️ Module Tour
//!
//! ### 1. The Data ([`entity`])
//! - **Role**: An immutable payload with its headers, content type and
//!   validator.
//! - **Key items**: [`Entity`](entity::Entity), [`Headers`](entity::Headers).
//!
//! ### 2. The Round Trip ([`request`])
//! - **Role**: A resolve-once, multi-channel callback handle.
//! - **Key items**: [`Request`](request::Request),
//!   [`Resolver`](request::Resolver), [`Outcome`](request::Outcome).
//!
//! ### 3. The Watchers ([`observer`])
//! - **Role**: Owner-scoped observer registry and the events it delivers.
//! - **Key items**: [`ResourceObserver`](observer::ResourceObserver),
//!   [`ObserverRegistry`](observer::ObserverRegistry),
//!   [`Owner`](observer::Owner).
//!
//! ### 4. The Engine ([`resource`])
//! - **Role**: Ties the three together: load, coalesce, apply outcomes,
//!   notify.
//! - **Key items**: [`ResourceCache`](resource::ResourceCache),
//!   [`CacheConfig`](resource::CacheConfig).
//!
//! ### 5. The Wire ([`transport`])
//! - **Role**: The async seam to the network, plus mocks for tests.
//! - **Key items**: [`Transport`](transport::Transport),
//!   [`MockTransport`](transport::mock::MockTransport).
//!
//! ### 6. The Orchestrator ([`lifecycle`])
//! - **Role**: Hands out caches by identity and shuts them down.
//! - **Key items**: [`ResourceService`](lifecycle::ResourceService),
//!   [`setup_tracing`](lifecycle::setup_tracing).
//!
//! ## 🚀 Quick Start
//!
//! ```bash
//! # Run the demo with info logs
//! RUST_LOG=info cargo run
//!
//! # Run the tests
//! cargo test
//! ```

pub mod entity;
pub mod lifecycle;
pub mod observer;
pub mod request;
pub mod resource;
pub mod transport;
