//! Scoped room names for push-event delivery.

use serde::{Deserialize, Serialize};
use std::fmt;

use tandem_core::{ActorId, EntityId};

/// A named channel subscription limiting delivery to interested clients.
///
/// Rooms follow a `scope:id` convention: one room per project board, one
/// per open task detail view, and one inbox room per user.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RoomId(String);

impl RoomId {
    /// Wrap a raw room name.
    pub fn new(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    /// The room carrying events for one project and its tasks.
    #[must_use]
    pub fn project(id: &EntityId) -> Self {
        Self(format!("project:{id}"))
    }

    /// The room carrying events for one task (comments, field edits).
    #[must_use]
    pub fn task(id: &EntityId) -> Self {
        Self(format!("task:{id}"))
    }

    /// The room carrying events for one team.
    #[must_use]
    pub fn team(id: &EntityId) -> Self {
        Self(format!("team:{id}"))
    }

    /// The per-user inbox room (assignments, mentions).
    #[must_use]
    pub fn user(actor: &ActorId) -> Self {
        Self(format!("user:{actor}"))
    }

    /// The raw room name.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RoomId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
