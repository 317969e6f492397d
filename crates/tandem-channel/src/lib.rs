#![forbid(unsafe_code)]
//! tandem-channel library.
//!
//! The push-channel side of the tandem client: one shared authenticated
//! connection per session, reference-counted room membership, reconnect
//! with membership replay, and envelope validation at the boundary.
//!
//! # Conventions
//!
//! - **Errors**: typed `thiserror` enums; transport errors are wrapped,
//!   never unwrapped.
//! - **Logging**: Use `tracing` macros (`info!`, `warn!`, `error!`,
//!   `debug!`, `trace!`). The library installs no subscriber.

pub mod client;
pub mod room;
pub mod transport;

pub use client::{ChannelClient, ChannelError, ReconnectPolicy};
pub use room::RoomId;
pub use transport::ChannelTransport;
