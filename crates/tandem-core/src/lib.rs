#![forbid(unsafe_code)]
//! tandem-core library.
//!
//! The sync core of a collaborative task-management client: per-entity
//! mutation stores with an optimistic protocol, the reconciliation
//! algorithm both confirmation paths funnel through, notification
//! aggregation, and the schema-versioned persisted cache.
//!
//! # Conventions
//!
//! - **Errors**: typed `thiserror` enums at protocol boundaries,
//!   `anyhow::Result` with context at I/O boundaries.
//! - **Logging**: Use `tracing` macros (`info!`, `warn!`, `error!`,
//!   `debug!`, `trace!`). The library installs no subscriber.

pub mod config;
pub mod envelope;
pub mod error;
pub mod model;
pub mod notify;
pub mod persist;
pub mod reconcile;
pub mod session;
pub mod store;

pub use envelope::{ChannelEventType, Envelope, EnvelopeError};
pub use error::{FieldViolation, MutationError};
pub use model::{
    ActorId, Comment, CommentPatch, Credential, Entity, EntityId, EntityKind, Patch, Priority,
    Project, ProjectPatch, Revision, Status, Task, TaskPatch, Team, TeamPatch,
};
pub use notify::{Notification, NotificationFeed, NotificationKind};
pub use session::{Dispatchers, SyncSession};
pub use store::{
    ChangeKind, ChangeRecord, CommentStore, EntityRequest, ProjectStore, RequestDispatcher,
    RequestId, RequestOutcome, RequestQueue, Store, TaskStore, TeamStore,
};
