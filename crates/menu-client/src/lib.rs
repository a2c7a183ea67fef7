//! Async client for the digital-menu backend.
//!
//! [`sync::Synchronizer`] keeps menu documents in step with the backend,
//! driven by invalidations from [`channel::PushChannel`].

pub mod api;
pub mod cache;
pub mod channel;
pub mod coalesce;
pub mod config;
pub mod error;
pub mod media;
pub mod session;
pub mod sync;
pub mod telemetry;

pub use api::ApiClient;
pub use cache::BoundedCache;
pub use channel::{ConnectionState, EventStreamTransport, PushChannel, ReconnectPolicy};
pub use config::Settings;
pub use error::{ClientError, ClientResult};
pub use media::{MediaProbe, MediaStatus};
pub use session::{AuthState, FileSessionStore, MemorySessionStore, SessionStore};
pub use sync::{DocumentSnapshot, DocumentStore, HttpDocumentStore, Subscription, Synchronizer};
