//! User-facing notifications derived from reconciled change records.
//!
//! The feed consumes committed (never optimistic) [`ChangeRecord`]s from
//! both reconciliation paths and synthesizes a bounded most-recent-first
//! notification list. Read state is mutated with the same optimistic
//! protocol the entity stores use: flip first, dispatch, restore on
//! failure.
//!
//! The load-bearing invariant, preserved by every operation including
//! rollback:
//!
//! ```text
//! unread_count == notifications.iter().filter(|n| !n.read).count()
//! ```

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use chrono::{DateTime, Utc};
use tracing::warn;

use crate::error::MutationError;
use crate::model::{ActorId, EntityId, EntityKind, Revision};
use crate::store::{ChangeKind, ChangeRecord, RequestId, RequestQueue};

// ---------------------------------------------------------------------------
// Notification record
// ---------------------------------------------------------------------------

/// What a notification is about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NotificationKind {
    Created,
    Updated,
    Deleted,
}

/// A single user-facing notification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
    /// Locally assigned id (`ntf-<n>`).
    pub id: EntityId,
    /// What happened.
    pub kind: NotificationKind,
    /// Collection of the entity the change concerns.
    pub entity_kind: EntityKind,
    /// The entity the change concerns.
    pub entity_id: EntityId,
    /// Who committed the change.
    pub actor: ActorId,
    /// Rendered one-line summary.
    pub message: String,
    /// Revision of the change that produced this notification.
    pub revision: Revision,
    /// When the change was committed, if the revision is representable.
    pub at: Option<DateTime<Utc>>,
    /// Whether the user has seen it.
    pub read: bool,
}

// ---------------------------------------------------------------------------
// Read-state request boundary
// ---------------------------------------------------------------------------

/// Read-state confirmation dispatched to the server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReadStateRequest {
    /// Confirm one notification as read.
    MarkRead {
        /// Target notification.
        id: EntityId,
    },
    /// Confirm the whole feed as read.
    MarkAllRead,
}

/// Completion of a read-state confirmation.
pub type ReadStateOutcome = Result<(), MutationError>;

/// The dispatch seam for read-state confirmations.
pub trait ReadStateDispatcher {
    /// Hand a confirmation to the transport, returning its correlation id.
    fn dispatch(&mut self, request: ReadStateRequest) -> RequestId;
}

impl ReadStateDispatcher for RequestQueue<ReadStateRequest> {
    fn dispatch(&mut self, request: ReadStateRequest) -> RequestId {
        self.push(request)
    }
}

// ---------------------------------------------------------------------------
// Feed
// ---------------------------------------------------------------------------

/// Snapshot taken before an optimistic read-state flip, for rollback.
#[derive(Debug)]
enum ReadOp {
    One { id: EntityId, was_read: bool },
    All { prior: Vec<Notification>, prior_unread: usize },
}

/// The notification aggregator.
pub struct NotificationFeed {
    own_actor: ActorId,
    limit: usize,
    dispatcher: Box<dyn ReadStateDispatcher>,
    /// Most-recent first, bounded to `limit`.
    items: Vec<Notification>,
    unread: usize,
    next_id: u64,
    in_flight: HashMap<RequestId, ReadOp>,
}

impl NotificationFeed {
    /// Construct an empty feed for the session actor.
    ///
    /// `limit` bounds the retained list; the oldest entries fall off.
    pub fn new(own_actor: ActorId, limit: usize, dispatcher: Box<dyn ReadStateDispatcher>) -> Self {
        Self {
            own_actor,
            limit: limit.max(1),
            dispatcher,
            items: Vec::new(),
            unread: 0,
            next_id: 0,
            in_flight: HashMap::new(),
        }
    }

    /// Consume one reconciled change record.
    ///
    /// Changes committed by the session's own actor and rollback notices do
    /// not notify.
    pub fn observe(&mut self, change: &ChangeRecord) {
        let kind = match change.change {
            ChangeKind::Created => NotificationKind::Created,
            ChangeKind::Updated => NotificationKind::Updated,
            ChangeKind::Deleted => NotificationKind::Deleted,
            ChangeKind::RolledBack => return,
        };
        if change.actor == self.own_actor {
            return;
        }

        let id = EntityId::new(format!("ntf-{}", self.next_id));
        self.next_id += 1;
        let message = format!(
            "{} {} {} {}",
            change.actor,
            change.change.verb(),
            change.kind,
            change.entity_id
        );
        self.items.insert(
            0,
            Notification {
                id,
                kind,
                entity_kind: change.kind,
                entity_id: change.entity_id.clone(),
                actor: change.actor.clone(),
                message,
                revision: change.revision,
                at: change.revision.to_datetime(),
                read: false,
            },
        );
        self.unread += 1;
        self.trim();
    }

    /// Optimistically mark one notification read and dispatch confirmation.
    ///
    /// Already-read notifications are a no-op.
    ///
    /// # Errors
    ///
    /// [`MutationError::NotFound`] if the notification is not in the feed.
    pub fn mark_as_read(&mut self, id: &EntityId) -> Result<(), MutationError> {
        let Some(item) = self.items.iter_mut().find(|n| &n.id == id) else {
            return Err(MutationError::NotFound { id: id.clone() });
        };
        if item.read {
            return Ok(());
        }
        item.read = true;
        self.unread -= 1;

        let request = self.dispatcher.dispatch(ReadStateRequest::MarkRead { id: id.clone() });
        self.in_flight.insert(
            request,
            ReadOp::One {
                id: id.clone(),
                was_read: false,
            },
        );
        Ok(())
    }

    /// Optimistically mark everything read and dispatch confirmation.
    ///
    /// A no-op when nothing is unread.
    pub fn mark_all_as_read(&mut self) {
        if self.unread == 0 {
            return;
        }
        let prior = self.items.clone();
        let prior_unread = self.unread;

        for item in &mut self.items {
            item.read = true;
        }
        self.unread = 0;

        let request = self.dispatcher.dispatch(ReadStateRequest::MarkAllRead);
        self.in_flight.insert(
            request,
            ReadOp::All {
                prior,
                prior_unread,
            },
        );
    }

    /// Feed the completion of a read-state confirmation back in.
    ///
    /// # Errors
    ///
    /// Returns the failure for UI-level reporting after the flip has been
    /// restored.
    pub fn resolve(
        &mut self,
        request: RequestId,
        outcome: ReadStateOutcome,
    ) -> Result<(), MutationError> {
        let Some(op) = self.in_flight.remove(&request) else {
            warn!(%request, "read-state completion for unknown request");
            return Ok(());
        };
        match outcome {
            Ok(()) => Ok(()),
            Err(err) => {
                match op {
                    ReadOp::One { id, was_read } => {
                        // Restore only if the entry is still in the bounded
                        // list; trimmed entries no longer count either way.
                        if let Some(item) = self.items.iter_mut().find(|n| n.id == id) {
                            if item.read && !was_read {
                                item.read = false;
                                self.unread += 1;
                            }
                        }
                    }
                    ReadOp::All { prior, prior_unread } => {
                        // Wholesale restore: partial-success ambiguity is
                        // resolved by reverting the entire flip.
                        self.items = prior;
                        self.unread = prior_unread;
                    }
                }
                Err(err)
            }
        }
    }

    /// Notifications, most-recent first.
    #[must_use]
    pub fn items(&self) -> &[Notification] {
        &self.items
    }

    /// Count of unread notifications.
    #[must_use]
    pub fn unread_count(&self) -> usize {
        self.unread
    }

    /// Number of retained notifications.
    #[must_use]
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Returns `true` if the feed is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Replace the feed with records restored from the cache.
    ///
    /// The unread count is recomputed from the restored records, so the
    /// invariant holds regardless of what was persisted.
    pub fn restore_records(&mut self, mut items: Vec<Notification>) {
        items.truncate(self.limit);
        self.unread = items.iter().filter(|n| !n.read).count();
        // Continue local id allocation past anything restored.
        self.next_id = items.len() as u64;
        self.items = items;
    }

    fn trim(&mut self) {
        while self.items.len() > self.limit {
            if let Some(dropped) = self.items.pop() {
                if !dropped.read {
                    self.unread -= 1;
                }
            }
        }
    }

    #[cfg(test)]
    fn invariant_holds(&self) -> bool {
        self.unread == self.items.iter().filter(|n| !n.read).count()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
