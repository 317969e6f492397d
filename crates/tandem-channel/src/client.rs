//! The shared push-channel client.
//!
//! One client per session owns the single persistent subscription and the
//! scoped room memberships on top of it. Membership is reference-counted:
//! independent UI regions join and leave the same room as views come and
//! go, and the wire subscription lives exactly as long as at least one
//! caller still wants the room.
//!
//! On connection loss every wire membership is invalidated but the
//! reference counts survive; [`ChannelClient::reconnect`] re-opens the
//! connection and replays a join for every room still referenced.
//!
//! Inbound frames pass through [`ChannelClient::handle_frame`], the
//! validation boundary: malformed frames are logged and dropped here and
//! never reach the reconciler.

use std::collections::{HashMap, HashSet};
use std::time::Duration;

use tracing::{debug, info, warn};

use tandem_core::config::ChannelConfig;
use tandem_core::{Credential, Envelope};

use crate::room::RoomId;
use crate::transport::ChannelTransport;

// ---------------------------------------------------------------------------
// Errors and policy
// ---------------------------------------------------------------------------

/// Why a channel operation failed.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ChannelError {
    /// The operation needs a connection (or a stored credential) and has
    /// neither.
    #[error("channel is not connected")]
    NotConnected,

    /// The transport reported a failure.
    #[error("channel transport failure: {reason}")]
    Transport {
        /// Transport-level description.
        reason: String,
    },

    /// Reconnection gave up after exhausting the policy.
    #[error("reconnect failed after {attempts} attempt(s)")]
    ReconnectFailed {
        /// Attempts made before giving up.
        attempts: u32,
    },
}

/// Bounds and pacing for reconnection.
#[derive(Debug, Clone, Copy)]
pub struct ReconnectPolicy {
    /// Attempts before [`ChannelError::ReconnectFailed`] surfaces.
    pub max_attempts: u32,
    /// Delay before the first retry; doubles per attempt.
    pub base_delay: Duration,
}

impl ReconnectPolicy {
    /// Advisory pause before the given 1-based attempt, capped at 30s.
    /// The client itself never sleeps; the host loop paces retries.
    #[must_use]
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let factor = 1u32 << attempt.saturating_sub(1).min(16);
        self.base_delay
            .saturating_mul(factor)
            .min(Duration::from_secs(30))
    }
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self::from(&ChannelConfig::default())
    }
}

impl From<&ChannelConfig> for ReconnectPolicy {
    fn from(config: &ChannelConfig) -> Self {
        Self {
            max_attempts: config.reconnect_max_attempts.max(1),
            base_delay: Duration::from_millis(config.reconnect_base_delay_ms),
        }
    }
}

// ---------------------------------------------------------------------------
// Client
// ---------------------------------------------------------------------------

/// The per-session push-channel client.
pub struct ChannelClient<T: ChannelTransport> {
    transport: T,
    policy: ReconnectPolicy,
    credential: Option<Credential>,
    connected: bool,
    /// Live references per room, across all callers.
    refs: HashMap<RoomId, usize>,
    /// Rooms currently subscribed on the wire.
    on_wire: HashSet<RoomId>,
}

impl<T: ChannelTransport> ChannelClient<T> {
    /// Build a client over `transport` with the given reconnect policy.
    pub fn new(transport: T, policy: ReconnectPolicy) -> Self {
        Self {
            transport,
            policy,
            credential: None,
            connected: false,
            refs: HashMap::new(),
            on_wire: HashSet::new(),
        }
    }

    /// Open the shared connection. Idempotent: connecting while connected
    /// is a no-op.
    ///
    /// Rooms joined before connecting are subscribed as part of this call.
    ///
    /// # Errors
    ///
    /// [`ChannelError::Transport`] if the connection cannot be opened.
    pub fn connect(&mut self, credential: Credential) -> Result<(), ChannelError> {
        if self.connected {
            return Ok(());
        }
        self.transport
            .open(&credential)
            .map_err(|e| ChannelError::Transport {
                reason: e.to_string(),
            })?;
        self.credential = Some(credential);
        self.connected = true;
        self.replay_joins()
    }

    /// Deliberately close the connection and forget all membership.
    /// Used at logout; for involuntary drops see
    /// [`Self::handle_connection_lost`].
    pub fn disconnect(&mut self) {
        if self.connected {
            self.transport.close();
        }
        self.connected = false;
        self.credential = None;
        self.refs.clear();
        self.on_wire.clear();
    }

    /// Returns `true` while the connection is up.
    #[must_use]
    pub const fn is_connected(&self) -> bool {
        self.connected
    }

    /// Register interest in a room.
    ///
    /// The subscribe frame goes out only on the 0→1 reference transition;
    /// further joins just bump the count. Joining before connecting is
    /// allowed — the subscription is sent on connect.
    ///
    /// # Errors
    ///
    /// [`ChannelError::Transport`] if the subscribe frame cannot be sent.
    /// The reference is kept regardless: membership intent survives a
    /// dropped connection and is replayed on reconnect.
    pub fn join(&mut self, room: &RoomId) -> Result<(), ChannelError> {
        let count = self.refs.entry(room.clone()).or_insert(0);
        *count += 1;
        if *count > 1 || !self.connected {
            return Ok(());
        }
        self.wire_join(room)
    }

    /// Drop one reference to a room.
    ///
    /// The unsubscribe frame goes out only on the 1→0 transition, so one
    /// caller leaving never evicts another caller still requiring the
    /// room. Leaving an unreferenced room is a no-op.
    ///
    /// # Errors
    ///
    /// [`ChannelError::Transport`] if the unsubscribe frame cannot be
    /// sent. Local membership is released regardless.
    pub fn leave(&mut self, room: &RoomId) -> Result<(), ChannelError> {
        let Some(count) = self.refs.get_mut(room) else {
            return Ok(());
        };
        *count -= 1;
        if *count > 0 {
            return Ok(());
        }
        self.refs.remove(room);
        if self.on_wire.remove(room) && self.connected {
            self.transport
                .send_leave(room)
                .map_err(|e| ChannelError::Transport {
                    reason: e.to_string(),
                })?;
        }
        Ok(())
    }

    /// Current reference count for a room.
    #[must_use]
    pub fn room_refs(&self, room: &RoomId) -> usize {
        self.refs.get(room).copied().unwrap_or(0)
    }

    /// Rooms with at least one live reference.
    pub fn member_rooms(&self) -> impl Iterator<Item = &RoomId> {
        self.refs.keys()
    }

    /// Note an involuntary connection drop: wire memberships are
    /// invalidated, reference counts survive for replay.
    pub fn handle_connection_lost(&mut self) {
        if self.connected {
            info!("channel connection lost; memberships invalidated");
        }
        self.connected = false;
        self.on_wire.clear();
    }

    /// Re-open the connection and replay every referenced room.
    ///
    /// Attempts are bounded by the policy; the host loop is expected to
    /// pace calls using [`ReconnectPolicy::delay_for`]. Returns the number
    /// of attempts used.
    ///
    /// # Errors
    ///
    /// [`ChannelError::NotConnected`] without a stored credential;
    /// [`ChannelError::ReconnectFailed`] after the policy is exhausted —
    /// only then does the failure surface to the user.
    pub fn reconnect(&mut self) -> Result<u32, ChannelError> {
        if self.connected {
            return Ok(0);
        }
        let Some(credential) = self.credential.clone() else {
            return Err(ChannelError::NotConnected);
        };

        for attempt in 1..=self.policy.max_attempts {
            match self.transport.open(&credential) {
                Ok(()) => {
                    self.connected = true;
                    match self.replay_joins() {
                        Ok(()) => {
                            info!(attempt, "channel reconnected; memberships replayed");
                            return Ok(attempt);
                        }
                        Err(err) => {
                            // Replay failing means the new connection is
                            // already bad; tear it down and keep trying.
                            debug!(attempt, error = %err, "membership replay failed");
                            self.transport.close();
                            self.connected = false;
                            self.on_wire.clear();
                        }
                    }
                }
                Err(err) => {
                    debug!(attempt, error = %err, "reconnect attempt failed");
                }
            }
        }
        Err(ChannelError::ReconnectFailed {
            attempts: self.policy.max_attempts,
        })
    }

    /// Validate one inbound frame at the channel boundary.
    ///
    /// Returns the envelope for the application loop to feed into the
    /// session, or `None` for frames that must not propagate: malformed
    /// payloads (logged at `warn`) and events for rooms this client no
    /// longer references (logged at `debug` — routine after a leave).
    pub fn handle_frame(&mut self, frame: &str) -> Option<Envelope> {
        let envelope = match Envelope::parse(frame) {
            Ok(envelope) => envelope,
            Err(err) => {
                warn!(error = %err, "dropping malformed channel frame");
                return None;
            }
        };

        if !envelope.room_scope.is_empty() {
            let room = RoomId::new(envelope.room_scope.clone());
            if !self.refs.contains_key(&room) {
                debug!(room = %room, id = %envelope.entity_id, "dropping event for unjoined room");
                return None;
            }
        }
        Some(envelope)
    }

    fn wire_join(&mut self, room: &RoomId) -> Result<(), ChannelError> {
        self.transport
            .send_join(room)
            .map_err(|e| ChannelError::Transport {
                reason: e.to_string(),
            })?;
        self.on_wire.insert(room.clone());
        Ok(())
    }

    fn replay_joins(&mut self) -> Result<(), ChannelError> {
        let rooms: Vec<RoomId> = self
            .refs
            .iter()
            .filter(|(_, count)| **count > 0)
            .map(|(room, _)| room.clone())
            .collect();
        for room in rooms {
            if !self.on_wire.contains(&room) {
                self.wire_join(&room)?;
            }
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    /// Transport double recording the handshake and optionally failing.
    #[derive(Default)]
    struct MockTransport {
        ops: Vec<String>,
        fail_opens: u32,
    }

    impl ChannelTransport for MockTransport {
        type Error = String;

        fn open(&mut self, credential: &Credential) -> Result<(), String> {
            if self.fail_opens > 0 {
                self.fail_opens -= 1;
                self.ops.push("open!err".to_string());
                return Err("connection refused".to_string());
            }
            self.ops.push(format!("open:{}", credential.expose()));
            Ok(())
        }

        fn close(&mut self) {
            self.ops.push("close".to_string());
        }

        fn send_join(&mut self, room: &RoomId) -> Result<(), String> {
            self.ops.push(format!("join:{room}"));
            Ok(())
        }

        fn send_leave(&mut self, room: &RoomId) -> Result<(), String> {
            self.ops.push(format!("leave:{room}"));
            Ok(())
        }
    }

    fn client() -> ChannelClient<MockTransport> {
        ChannelClient::new(MockTransport::default(), ReconnectPolicy::default())
    }

    fn room(name: &str) -> RoomId {
        RoomId::new(name)
    }

    #[test]
    fn connect_is_idempotent() {
        let mut client = client();
        client.connect(Credential::new("t")).expect("connect");
        client.connect(Credential::new("t")).expect("noop");
        assert_eq!(client.transport.ops, ["open:t"]);
    }

    #[test]
    fn join_sends_subscribe_once_per_room() {
        let mut client = client();
        client.connect(Credential::new("t")).expect("connect");
        client.join(&room("project:p1")).expect("join");
        client.join(&room("project:p1")).expect("second ref");
        assert_eq!(client.room_refs(&room("project:p1")), 2);
        assert_eq!(client.transport.ops, ["open:t", "join:project:p1"]);
    }

    #[test]
    fn leave_unsubscribes_only_at_zero_refs() {
        let mut client = client();
        client.connect(Credential::new("t")).expect("connect");
        client.join(&room("task:42")).expect("ref 1");
        client.join(&room("task:42")).expect("ref 2");

        client.leave(&room("task:42")).expect("ref 1 remains");
        assert!(!client.transport.ops.iter().any(|op| op.starts_with("leave")));

        client.leave(&room("task:42")).expect("last ref");
        assert!(client.transport.ops.contains(&"leave:task:42".to_string()));
        assert_eq!(client.room_refs(&room("task:42")), 0);
    }

    #[test]
    fn surplus_leave_is_noop() {
        let mut client = client();
        client.connect(Credential::new("t")).expect("connect");
        client.leave(&room("task:42")).expect("noop");
        assert_eq!(client.transport.ops, ["open:t"]);
    }

    #[test]
    fn join_before_connect_subscribes_on_connect() {
        let mut client = client();
        client.join(&room("project:p1")).expect("deferred");
        client.connect(Credential::new("t")).expect("connect");
        assert_eq!(client.transport.ops, ["open:t", "join:project:p1"]);
    }

    #[test]
    fn reconnect_replays_referenced_rooms() {
        let mut client = client();
        client.connect(Credential::new("t")).expect("connect");
        client.join(&room("project:p1")).expect("join");
        client.join(&room("task:42")).expect("join");

        client.handle_connection_lost();
        assert!(!client.is_connected());

        let attempts = client.reconnect().expect("reconnect");
        assert_eq!(attempts, 1);
        assert!(client.is_connected());

        let replayed: Vec<_> = client
            .transport
            .ops
            .iter()
            .skip(3)
            .filter(|op| op.starts_with("join:"))
            .collect();
        assert_eq!(replayed.len(), 2);
    }

    #[test]
    fn reconnect_retries_until_policy_exhausted() {
        let mut transport = MockTransport::default();
        transport.fail_opens = 10;
        let mut client = ChannelClient::new(
            transport,
            ReconnectPolicy {
                max_attempts: 3,
                base_delay: Duration::from_millis(1),
            },
        );
        client.credential = Some(Credential::new("t"));

        let err = client.reconnect().unwrap_err();
        assert_eq!(err, ChannelError::ReconnectFailed { attempts: 3 });
        assert!(!client.is_connected());
    }

    #[test]
    fn reconnect_recovers_after_transient_failures() {
        let mut transport = MockTransport::default();
        transport.fail_opens = 2;
        let mut client = ChannelClient::new(
            transport,
            ReconnectPolicy {
                max_attempts: 5,
                base_delay: Duration::from_millis(1),
            },
        );
        client.credential = Some(Credential::new("t"));
        client.join(&room("project:p1")).expect("join ref");

        let attempts = client.reconnect().expect("eventually connects");
        assert_eq!(attempts, 3);
        assert!(client.transport.ops.contains(&"join:project:p1".to_string()));
    }

    #[test]
    fn reconnect_without_credential_is_not_connected() {
        let mut client = client();
        assert_eq!(client.reconnect().unwrap_err(), ChannelError::NotConnected);
    }

    #[test]
    fn disconnect_forgets_membership() {
        let mut client = client();
        client.connect(Credential::new("t")).expect("connect");
        client.join(&room("project:p1")).expect("join");
        client.disconnect();

        assert!(!client.is_connected());
        assert_eq!(client.room_refs(&room("project:p1")), 0);
        assert!(client.transport.ops.contains(&"close".to_string()));
    }

    #[test]
    fn delay_backoff_doubles_and_caps() {
        let policy = ReconnectPolicy {
            max_attempts: 5,
            base_delay: Duration::from_millis(500),
        };
        assert_eq!(policy.delay_for(1), Duration::from_millis(500));
        assert_eq!(policy.delay_for(2), Duration::from_millis(1000));
        assert_eq!(policy.delay_for(3), Duration::from_millis(2000));
        assert_eq!(policy.delay_for(60), Duration::from_secs(30));
    }
}
