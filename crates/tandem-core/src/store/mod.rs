//! Per-entity-kind collections and the optimistic mutation protocol.
//!
//! A [`Store`] owns the single canonical in-memory collection for one
//! entity kind and everything needed to mutate it optimistically:
//!
//! - the **confirmed** map holds the last server-confirmed state per id;
//! - the **pending** map holds unresolved local patches in issuance order;
//! - the **working** map is what the UI reads, and is always
//!   `fold(confirmed, pending patches in issuance order)`;
//! - the **tombstone** set holds ids deleted locally (or by a confirmed
//!   remote delete) so stale events cannot resurrect them.
//!
//! The one recomputation rule above is what realizes the protocol's
//! trickier guarantees. Rollback restores "last confirmed state" because
//! dropping a failed patch and refolding leaves exactly the confirmed base
//! plus the surviving in-flight edits. Field-level merge of remote pushes
//! falls out the same way: the new confirmed base is folded under the
//! still-pending patches, so fields under local edit are preserved until
//! their own responses resolve. And issuance ordering holds because a
//! response for an older issuance carries an older revision and is
//! discarded by the admission kernel in [`crate::reconcile`].
//!
//! Suspension points are explicit: a mutation method dispatches a request
//! and returns immediately; the host loop later feeds the completion to
//! [`Store::resolve`]. Nothing here blocks.

pub mod change;
pub mod request;

pub use change::{ChangeKind, ChangeRecord};
pub use request::{EntityRequest, RequestDispatcher, RequestId, RequestOutcome, RequestQueue};

use std::collections::{HashMap, HashSet};

use tracing::{debug, warn};

use crate::envelope::{ChannelEventType, Envelope};
use crate::error::MutationError;
use crate::model::{ActorId, Comment, Entity, EntityId, Patch as _, Project, Revision, Task, Team};
use crate::reconcile::{self, Admission, Origin};

/// Store over [`Task`] records.
pub type TaskStore = Store<Task>;
/// Store over [`Project`] records.
pub type ProjectStore = Store<Project>;
/// Store over [`Team`] records.
pub type TeamStore = Store<Team>;
/// Store over [`Comment`] records.
pub type CommentStore = Store<Comment>;

// ---------------------------------------------------------------------------
// Issuance sequencing
// ---------------------------------------------------------------------------

/// Monotonic per-store sequence number assigned at optimistic apply.
///
/// Mutation application is ordered by issuance, never by completion order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct IssuanceSeq(u64);

#[derive(Debug, Clone)]
struct PendingPatch<E: Entity> {
    seq: IssuanceSeq,
    patch: E::Patch,
}

#[derive(Debug)]
enum InFlight<E: Entity> {
    Create {
        temp_id: EntityId,
    },
    Update {
        id: EntityId,
        seq: IssuanceSeq,
    },
    Delete {
        id: EntityId,
        snapshot: E,
        position: usize,
    },
    Fetch {
        id: EntityId,
    },
}

impl<E: Entity> InFlight<E> {
    /// Redirect requests issued against a temporary id to the final one.
    fn rekey(&mut self, from: &EntityId, to: &EntityId) {
        match self {
            Self::Update { id, .. } | Self::Delete { id, .. } | Self::Fetch { id } => {
                if id == from {
                    *id = to.clone();
                }
            }
            Self::Create { .. } => {}
        }
    }
}

// ---------------------------------------------------------------------------
// Store
// ---------------------------------------------------------------------------

/// Canonical collection plus optimistic mutation protocol for one entity kind.
pub struct Store<E: Entity> {
    actor: ActorId,
    dispatcher: Box<dyn RequestDispatcher<E>>,
    /// Display order, head = newest. Every visible record's id is here.
    order: Vec<EntityId>,
    /// What the UI reads: confirmed base folded with pending patches.
    working: HashMap<EntityId, E>,
    /// Last server-confirmed state per id.
    confirmed: HashMap<EntityId, E>,
    /// Ids deleted locally or by a confirmed remote delete.
    tombstones: HashSet<EntityId>,
    /// Unresolved local patches per id, in issuance order.
    pending: HashMap<EntityId, Vec<PendingPatch<E>>>,
    /// Dispatched requests awaiting completion.
    in_flight: HashMap<RequestId, InFlight<E>>,
    /// Ids with a conflict-triggered canonical re-fetch in flight.
    refetching: HashSet<EntityId>,
    /// Temporary-id to final-id mapping for confirmed creates.
    temp_map: HashMap<EntityId, EntityId>,
    next_issuance: u64,
    next_temp: u64,
    outbox: Vec<ChangeRecord>,
}

impl<E: Entity> Store<E> {
    /// Construct an empty store for the given session actor.
    pub fn new(actor: ActorId, dispatcher: Box<dyn RequestDispatcher<E>>) -> Self {
        Self {
            actor,
            dispatcher,
            order: Vec::new(),
            working: HashMap::new(),
            confirmed: HashMap::new(),
            tombstones: HashSet::new(),
            pending: HashMap::new(),
            in_flight: HashMap::new(),
            refetching: HashSet::new(),
            temp_map: HashMap::new(),
            next_issuance: 0,
            next_temp: 0,
            outbox: Vec::new(),
        }
    }

    // -- mutations ----------------------------------------------------------

    /// Insert `draft` optimistically under a temporary id and dispatch the
    /// create request. Returns the temporary id; the record is atomically
    /// swapped for the server one when the request resolves.
    pub fn create(&mut self, mut draft: E) -> EntityId {
        let temp_id = EntityId::temporary(self.next_temp);
        self.next_temp += 1;
        draft.set_id(temp_id.clone());

        self.order.insert(0, temp_id.clone());
        self.working.insert(temp_id.clone(), draft.clone());

        let request = self.dispatcher.dispatch(EntityRequest::Create { record: draft });
        self.in_flight.insert(
            request,
            InFlight::Create {
                temp_id: temp_id.clone(),
            },
        );
        temp_id
    }

    /// Apply `patch` optimistically and dispatch the update request.
    ///
    /// # Errors
    ///
    /// [`MutationError::NotFound`] if no visible record has this id.
    pub fn update(&mut self, id: &EntityId, patch: E::Patch) -> Result<(), MutationError> {
        if patch.is_empty() {
            return Ok(());
        }
        let Some(record) = self.working.get_mut(id) else {
            return Err(MutationError::NotFound { id: id.clone() });
        };

        let seq = IssuanceSeq(self.next_issuance);
        self.next_issuance += 1;

        patch.apply(record);
        self.pending.entry(id.clone()).or_default().push(PendingPatch {
            seq,
            patch: patch.clone(),
        });

        let request = self.dispatcher.dispatch(EntityRequest::Update {
            id: id.clone(),
            patch,
        });
        self.in_flight.insert(
            request,
            InFlight::Update {
                id: id.clone(),
                seq,
            },
        );
        Ok(())
    }

    /// Remove the record optimistically, tombstone its id, and dispatch the
    /// delete request.
    ///
    /// # Errors
    ///
    /// [`MutationError::NotFound`] if no visible record has this id.
    pub fn delete(&mut self, id: &EntityId) -> Result<(), MutationError> {
        let Some(position) = self.order.iter().position(|x| x == id) else {
            return Err(MutationError::NotFound { id: id.clone() });
        };
        let Some(snapshot) = self.working.remove(id) else {
            return Err(MutationError::NotFound { id: id.clone() });
        };
        self.order.remove(position);
        self.tombstones.insert(id.clone());

        let request = self.dispatcher.dispatch(EntityRequest::Delete { id: id.clone() });
        self.in_flight.insert(
            request,
            InFlight::Delete {
                id: id.clone(),
                snapshot,
                position,
            },
        );
        Ok(())
    }

    // -- request completion -------------------------------------------------

    /// Feed the completion of a dispatched request back into the store.
    ///
    /// Success routes the canonical record through the reconciler; failure
    /// rolls the affected id back to its last confirmed state first.
    ///
    /// # Errors
    ///
    /// Returns the failure for UI-level reporting after local rollback is
    /// complete. The store is always left consistent.
    pub fn resolve(
        &mut self,
        request: RequestId,
        outcome: RequestOutcome<E>,
    ) -> Result<(), MutationError> {
        let Some(flight) = self.in_flight.remove(&request) else {
            warn!(%request, kind = %E::KIND, "completion for unknown request");
            return Ok(());
        };

        match flight {
            InFlight::Create { temp_id } => match outcome {
                Ok(record) => {
                    self.confirm_create(&temp_id, record);
                    Ok(())
                }
                Err(err) => {
                    // No partial record remains.
                    if let Some(pos) = self.order.iter().position(|x| *x == temp_id) {
                        self.order.remove(pos);
                    }
                    self.working.remove(&temp_id);
                    self.pending.remove(&temp_id);
                    self.tombstones.remove(&temp_id);
                    self.emit(ChangeKind::RolledBack, temp_id, Revision::ZERO);
                    Err(err)
                }
            },

            InFlight::Update { id, seq } => match outcome {
                Ok(record) => {
                    let revision = record.revision();
                    self.retire_pending(&id, seq);
                    if self.admit_confirmed(record, Origin::OwnResponse, None) {
                        self.emit(ChangeKind::Updated, id, revision);
                    } else {
                        // Response was stale (an older issuance confirming
                        // after a newer one) — the pending set still
                        // narrowed, so refresh the visible record.
                        self.recompute_working(&id);
                    }
                    Ok(())
                }
                Err(err) => {
                    self.retire_pending(&id, seq);
                    self.recompute_working(&id);
                    if err.is_conflict() {
                        self.dispatch_refetch(&id);
                    }
                    let revision = self.confirmed.get(&id).map_or(Revision::ZERO, Entity::revision);
                    self.emit(ChangeKind::RolledBack, id, revision);
                    Err(err)
                }
            },

            InFlight::Delete { id, snapshot, position } => match outcome {
                Ok(record) => {
                    // Tombstone stays: it absorbs stale updates until a
                    // later create reuses the id.
                    let had_confirmed = self.confirmed.remove(&id).is_some();
                    self.pending.remove(&id);
                    self.working.remove(&id);
                    if had_confirmed {
                        self.emit(ChangeKind::Deleted, id, record.revision());
                    }
                    Ok(())
                }
                Err(err) => {
                    self.tombstones.remove(&id);
                    let pos = position.min(self.order.len());
                    self.order.insert(pos, id.clone());
                    self.working.insert(id.clone(), snapshot);
                    self.recompute_working(&id);
                    let revision = self.confirmed.get(&id).map_or(Revision::ZERO, Entity::revision);
                    self.emit(ChangeKind::RolledBack, id, revision);
                    Err(err)
                }
            },

            InFlight::Fetch { id } => {
                self.refetching.remove(&id);
                match outcome {
                    Ok(record) => {
                        let revision = record.revision();
                        if self.admit_confirmed(record, Origin::OwnResponse, None) {
                            self.emit(ChangeKind::Updated, id, revision);
                        }
                        Ok(())
                    }
                    Err(err) => {
                        warn!(%id, error = %err, "canonical re-fetch failed");
                        Err(err)
                    }
                }
            }
        }
    }

    // -- remote events ------------------------------------------------------

    /// Apply a validated push-channel event to the collection.
    ///
    /// Malformed payloads are logged and dropped; this method never fails
    /// into the delivery path.
    pub fn apply_remote(&mut self, envelope: &Envelope) {
        if envelope.entity_kind != E::KIND {
            warn!(
                expected = %E::KIND,
                got = %envelope.entity_kind,
                "envelope routed to wrong store"
            );
            return;
        }
        match envelope.event_type {
            ChannelEventType::Deleted => self.apply_remote_delete(envelope),
            ChannelEventType::Created | ChannelEventType::Updated => {
                self.apply_remote_upsert(envelope);
            }
        }
    }

    fn apply_remote_upsert(&mut self, envelope: &Envelope) {
        let record: E = match envelope.decode_payload() {
            Ok(record) => record,
            Err(err) => {
                warn!(
                    id = %envelope.entity_id,
                    event = %envelope.event_type,
                    error = %err,
                    "dropping malformed channel event"
                );
                return;
            }
        };

        let id = record.id().clone();
        let known = self.confirmed.contains_key(&id) || self.order.contains(&id);

        // An update for an id we have never seen: the authoritative record
        // arrives via the `created` event or our own create response (the
        // create/update race). Dropping is safe under at-least-once,
        // per-room-FIFO delivery.
        if envelope.event_type == ChannelEventType::Updated
            && !known
            && !self.tombstones.contains(&id)
        {
            debug!(%id, kind = %E::KIND, "dropping update for unknown id");
            return;
        }

        let revision = record.revision();
        if self.admit_confirmed(record, Origin::RemotePush, None) {
            let change = if known {
                ChangeKind::Updated
            } else {
                ChangeKind::Created
            };
            self.outbox.push(ChangeRecord {
                kind: E::KIND,
                entity_id: id,
                change,
                actor: envelope.actor.clone(),
                revision,
            });
        }
    }

    fn apply_remote_delete(&mut self, envelope: &Envelope) {
        let id = &envelope.entity_id;
        let existed = self.order.contains(id) || self.confirmed.contains_key(id);

        // Confirmed deletes always win, independent of revision; the
        // tombstone absorbs any stale update still in the pipe.
        self.tombstones.insert(id.clone());
        if !existed {
            debug!(%id, kind = %E::KIND, "duplicate or unknown delete event");
            return;
        }

        if let Some(pos) = self.order.iter().position(|x| x == id) {
            self.order.remove(pos);
        }
        self.working.remove(id);
        self.confirmed.remove(id);
        self.pending.remove(id);
        self.outbox.push(ChangeRecord {
            kind: E::KIND,
            entity_id: id.clone(),
            change: ChangeKind::Deleted,
            actor: envelope.actor.clone(),
            revision: envelope.revision,
        });
    }

    // -- reads --------------------------------------------------------------

    /// The visible record for `id`, if any.
    #[must_use]
    pub fn get(&self, id: &EntityId) -> Option<&E> {
        self.working.get(id)
    }

    /// Visible records in display order (head = newest).
    pub fn iter(&self) -> impl Iterator<Item = &E> {
        self.order.iter().filter_map(|id| self.working.get(id))
    }

    /// Number of visible records.
    #[must_use]
    pub fn len(&self) -> usize {
        self.order.len()
    }

    /// Returns `true` if no records are visible.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Returns `true` while an unresolved local mutation covers `id`.
    #[must_use]
    pub fn is_optimistic(&self, id: &EntityId) -> bool {
        if id.is_temporary() && self.working.contains_key(id) {
            return true;
        }
        self.pending.get(id).is_some_and(|p| !p.is_empty())
    }

    /// Returns `true` if `id` is covered by a delete tombstone.
    #[must_use]
    pub fn is_tombstoned(&self, id: &EntityId) -> bool {
        self.tombstones.contains(id)
    }

    /// The last confirmed state for `id`, ignoring optimistic edits.
    #[must_use]
    pub fn confirmed_state(&self, id: &EntityId) -> Option<&E> {
        self.confirmed.get(id)
    }

    /// The server id a confirmed create assigned for `temp_id`.
    #[must_use]
    pub fn final_id_of(&self, temp_id: &EntityId) -> Option<&EntityId> {
        self.temp_map.get(temp_id)
    }

    /// Returns `true` while any request is awaiting completion.
    #[must_use]
    pub fn has_in_flight(&self) -> bool {
        !self.in_flight.is_empty()
    }

    /// Drain change records accumulated since the last call.
    pub fn take_changes(&mut self) -> Vec<ChangeRecord> {
        std::mem::take(&mut self.outbox)
    }

    // -- persistence --------------------------------------------------------

    /// Confirmed records in display order, for the persisted cache.
    /// Optimistic state (temp records, pending patches) is never included.
    #[must_use]
    pub fn confirmed_records(&self) -> Vec<E> {
        self.order
            .iter()
            .filter_map(|id| self.confirmed.get(id))
            .cloned()
            .collect()
    }

    /// Replace the collection with records restored from the cache.
    ///
    /// Intended for session start, before any mutation is dispatched.
    pub fn restore_records(&mut self, records: Vec<E>) {
        debug_assert!(self.in_flight.is_empty(), "restore into an active store");
        self.order.clear();
        self.working.clear();
        self.confirmed.clear();
        for record in records {
            let id = record.id().clone();
            self.order.push(id.clone());
            self.working.insert(id.clone(), record.clone());
            self.confirmed.insert(id, record);
        }
    }

    // -- internals ----------------------------------------------------------

    /// Swap the temporary record for the server-assigned one.
    fn confirm_create(&mut self, temp_id: &EntityId, record: E) {
        let final_id = record.id().clone();
        self.temp_map.insert(temp_id.clone(), final_id.clone());

        // A confirmed create for a previously deleted id clears the old
        // tombstone (rare id reuse).
        self.tombstones.remove(&final_id);

        let temp_pos = self.order.iter().position(|x| x == temp_id);
        if let Some(pos) = temp_pos {
            self.order.remove(pos);
        }
        self.working.remove(temp_id);

        // Redirect state attached to the temporary id: patches issued while
        // the create was in flight, a local delete of the draft, and any
        // requests still waiting on the wire.
        if let Some(mut patches) = self.pending.remove(temp_id) {
            let slot = self.pending.entry(final_id.clone()).or_default();
            slot.append(&mut patches);
            slot.sort_by_key(|p| p.seq);
        }
        if self.tombstones.remove(temp_id) {
            self.tombstones.insert(final_id.clone());
        }
        for flight in self.in_flight.values_mut() {
            flight.rekey(temp_id, &final_id);
        }

        let revision = record.revision();
        if self.admit_confirmed(record, Origin::OwnResponse, temp_pos) {
            self.emit(ChangeKind::Created, final_id, revision);
        }
    }

    /// Route an incoming confirmed record through the admission kernel and
    /// execute the decision. Returns `true` if the record was taken.
    fn admit_confirmed(&mut self, record: E, origin: Origin, insert_pos: Option<usize>) -> bool {
        let id = record.id().clone();
        let confirmed_rev = self.confirmed.get(&id).map(Entity::revision);
        let optimistic = self.pending.get(&id).is_some_and(|p| !p.is_empty());
        let tombstoned = self.tombstones.contains(&id);

        match reconcile::admit(confirmed_rev, optimistic, tombstoned, record.revision(), origin) {
            Admission::Replace | Admission::MergePreservingLocal => {
                self.confirmed.insert(id.clone(), record);
                if !self.order.contains(&id) {
                    let pos = insert_pos.unwrap_or(0).min(self.order.len());
                    self.order.insert(pos, id.clone());
                }
                self.recompute_working(&id);
                true
            }
            Admission::Discard(reason) => {
                debug!(%id, kind = %E::KIND, reason = reason.as_str(), "discarding incoming record");
                false
            }
        }
    }

    /// Rebuild the visible record: confirmed base folded with pending
    /// patches in issuance order.
    fn recompute_working(&mut self, id: &EntityId) {
        if !self.order.contains(id) {
            self.working.remove(id);
            return;
        }
        // Temporary records have no confirmed base; the draft itself is the
        // working state.
        let Some(base) = self.confirmed.get(id) else {
            return;
        };
        let mut record = base.clone();
        if let Some(patches) = self.pending.get(id) {
            for pending in patches {
                pending.patch.apply(&mut record);
            }
        }
        self.working.insert(id.clone(), record);
    }

    fn retire_pending(&mut self, id: &EntityId, seq: IssuanceSeq) {
        if let Some(patches) = self.pending.get_mut(id) {
            patches.retain(|p| p.seq != seq);
            if patches.is_empty() {
                self.pending.remove(id);
            }
        }
    }

    fn dispatch_refetch(&mut self, id: &EntityId) {
        if self.refetching.contains(id) || !self.order.contains(id) {
            return;
        }
        let request = self.dispatcher.dispatch(EntityRequest::Fetch { id: id.clone() });
        self.in_flight.insert(request, InFlight::Fetch { id: id.clone() });
        self.refetching.insert(id.clone());
    }

    fn emit(&mut self, change: ChangeKind, entity_id: EntityId, revision: Revision) {
        self.outbox.push(ChangeRecord {
            kind: E::KIND,
            entity_id,
            change,
            actor: self.actor.clone(),
            revision,
        });
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
