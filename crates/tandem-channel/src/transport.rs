//! Abstraction over the push-channel wire protocol.
//!
//! Implementations shuttle the subscription handshake between the client
//! and the server. The trait is intentionally simple; framing, heartbeats,
//! and authentication renewal are layered on top by the transport. Inbound
//! frames are not part of this trait: the transport hands raw frames to
//! [`crate::ChannelClient::handle_frame`] however its event loop is wired.

use tandem_core::Credential;

use crate::room::RoomId;

/// The wire seam a [`crate::ChannelClient`] is built over.
pub trait ChannelTransport {
    /// Error type for transport operations.
    type Error: std::fmt::Debug + std::fmt::Display;

    /// Open the persistent connection with the session credential.
    ///
    /// # Errors
    ///
    /// Transport-specific failure to establish the connection.
    fn open(&mut self, credential: &Credential) -> Result<(), Self::Error>;

    /// Close the connection. Infallible by design: a close that fails has
    /// nothing useful left to do.
    fn close(&mut self);

    /// Subscribe this connection to a room.
    ///
    /// # Errors
    ///
    /// Transport-specific failure to send the subscribe frame.
    fn send_join(&mut self, room: &RoomId) -> Result<(), Self::Error>;

    /// Unsubscribe this connection from a room.
    ///
    /// # Errors
    ///
    /// Transport-specific failure to send the unsubscribe frame.
    fn send_leave(&mut self, room: &RoomId) -> Result<(), Self::Error>;
}
