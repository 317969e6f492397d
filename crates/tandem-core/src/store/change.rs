//! Change records emitted by stores after reconciliation.
//!
//! Every committed or rolled-back mutation — local or remote — leaves a
//! [`ChangeRecord`] in the store's outbox. The session drains outboxes and
//! feeds the records to the notification aggregator; only non-optimistic,
//! reconciled state ever produces a record.

use crate::model::{ActorId, EntityId, EntityKind, Revision};

/// What happened to an entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeKind {
    /// The record became canonical for the first time.
    Created,
    /// The record's confirmed state advanced.
    Updated,
    /// The record was removed.
    Deleted,
    /// A failed local mutation was reverted to confirmed state.
    RolledBack,
}

impl ChangeKind {
    /// Past-tense verb for notification messages.
    #[must_use]
    pub const fn verb(self) -> &'static str {
        match self {
            Self::Created => "created",
            Self::Updated => "updated",
            Self::Deleted => "deleted",
            Self::RolledBack => "rolled back",
        }
    }
}

/// A single reconciled change, ready for notification synthesis.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangeRecord {
    /// Collection the entity belongs to.
    pub kind: EntityKind,
    /// The entity's id (final, never temporary).
    pub entity_id: EntityId,
    /// What happened.
    pub change: ChangeKind,
    /// Who committed the change (the session's own actor for local ones).
    pub actor: ActorId,
    /// Revision of the state the change produced.
    pub revision: Revision,
}
