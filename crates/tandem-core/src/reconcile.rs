//! The admission algorithm every inbound record passes through.
//!
//! A store receives confirmed records from two paths: responses to its own
//! requests, and remote push events. Both paths funnel through [`admit`],
//! which decides what happens to the incoming record relative to the local
//! one. The store executes the decision; the decision itself is a pure
//! function of five inputs, which keeps the entire merge policy unit-testable
//! without a store in sight.
//!
//! # Decision chain
//!
//! Given an incoming record for id `X`:
//!
//! 1. **Tombstone**: if `X` was deleted locally (or a confirmed remote
//!    delete was applied), any non-delete record for `X` is discarded —
//!    a confirmed delete outranks every update regardless of revision.
//! 2. **Unknown id**: with no local confirmed state, the incoming record
//!    is taken wholesale.
//! 3. **Newer revision**: the incoming record replaces the confirmed state.
//!    If local mutations are still in flight and the record came from a
//!    remote push, the replacement is flagged as a field-preserving merge:
//!    the caller rebuilds the visible record by reapplying pending patches
//!    over the new confirmed base, so fields under local edit survive.
//! 4. **Older or equal revision**: discarded as duplicate or stale.
//!    Delivery is at-least-once, so this case is routine, not an error.
//!
//! Server responses for the client's own mutations take the same path with
//! [`Origin::OwnResponse`]: a response for an older issuance arrives with an
//! older revision than an already-applied newer response and lands in
//! step 4, which is exactly the "apply in issuance order, not arrival
//! order" rule.

use crate::model::Revision;

// ---------------------------------------------------------------------------
// Inputs and outputs
// ---------------------------------------------------------------------------

/// Where an incoming confirmed record came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Origin {
    /// Response to a request this client dispatched.
    OwnResponse,
    /// Event pushed over the change channel by another client's commit.
    RemotePush,
}

/// What the store should do with an incoming record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    /// Replace the confirmed state wholesale; the record is no longer
    /// optimistic unless other mutations remain in flight.
    Replace,
    /// Replace the confirmed base, then reapply pending local patches in
    /// issuance order so fields under local edit are preserved.
    MergePreservingLocal,
    /// Drop the incoming record.
    Discard(DiscardReason),
}

/// Why an incoming record was dropped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiscardReason {
    /// The id is tombstoned by an unresolved or confirmed delete.
    Tombstoned,
    /// The incoming revision is not newer than the confirmed one.
    Stale,
}

impl DiscardReason {
    /// Short description for boundary logging.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Tombstoned => "id is tombstoned by a local delete",
            Self::Stale => "revision is not newer than confirmed state",
        }
    }
}

// ---------------------------------------------------------------------------
// The decision function
// ---------------------------------------------------------------------------

/// Decide what to do with an incoming confirmed record.
///
/// * `confirmed` — revision of the local confirmed state, if any.
/// * `optimistic` — whether local mutations for this id are still in flight.
/// * `tombstoned` — whether this id is covered by a delete tombstone.
/// * `incoming` — revision of the incoming record.
/// * `origin` — which path delivered the record.
#[must_use]
pub fn admit(
    confirmed: Option<Revision>,
    optimistic: bool,
    tombstoned: bool,
    incoming: Revision,
    origin: Origin,
) -> Admission {
    // Step 1: a confirmed local delete outranks any update.
    if tombstoned {
        return Admission::Discard(DiscardReason::Tombstoned);
    }

    // Step 2: nothing local — take the incoming record wholesale.
    let Some(confirmed) = confirmed else {
        return Admission::Replace;
    };

    // Step 4 (checked before 3 to keep the comparison in one place):
    // at-least-once delivery makes duplicates routine.
    if incoming <= confirmed {
        return Admission::Discard(DiscardReason::Stale);
    }

    // Step 3: strictly newer. Remote pushes must not clobber fields under
    // local edit; own responses resolve those edits and replace directly.
    if optimistic && origin == Origin::RemotePush {
        Admission::MergePreservingLocal
    } else {
        Admission::Replace
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn rev(n: i64) -> Revision {
        Revision::from_micros(n)
    }

    // === Step 1: tombstones ===

    #[test]
    fn tombstone_outranks_newer_update() {
        let decision = admit(Some(rev(3)), false, true, rev(9), Origin::RemotePush);
        assert_eq!(decision, Admission::Discard(DiscardReason::Tombstoned));
    }

    #[test]
    fn tombstone_outranks_own_response() {
        let decision = admit(Some(rev(3)), true, true, rev(9), Origin::OwnResponse);
        assert_eq!(decision, Admission::Discard(DiscardReason::Tombstoned));
    }

    #[test]
    fn tombstone_applies_even_without_local_state() {
        let decision = admit(None, false, true, rev(1), Origin::RemotePush);
        assert_eq!(decision, Admission::Discard(DiscardReason::Tombstoned));
    }

    // === Step 2: unknown id ===

    #[test]
    fn unknown_id_is_replaced() {
        let decision = admit(None, false, false, rev(1), Origin::RemotePush);
        assert_eq!(decision, Admission::Replace);
    }

    #[test]
    fn unknown_id_from_own_response_is_replaced() {
        // First confirmation of a create.
        let decision = admit(None, false, false, rev(1), Origin::OwnResponse);
        assert_eq!(decision, Admission::Replace);
    }

    // === Step 3: strictly newer ===

    #[test]
    fn newer_remote_replaces_when_not_optimistic() {
        let decision = admit(Some(rev(4)), false, false, rev(5), Origin::RemotePush);
        assert_eq!(decision, Admission::Replace);
    }

    #[test]
    fn newer_remote_merges_when_optimistic() {
        let decision = admit(Some(rev(4)), true, false, rev(5), Origin::RemotePush);
        assert_eq!(decision, Admission::MergePreservingLocal);
    }

    #[test]
    fn newer_own_response_replaces_even_when_optimistic() {
        // Another mutation may still be pending; the caller reapplies its
        // patches after replacing the confirmed base.
        let decision = admit(Some(rev(4)), true, false, rev(5), Origin::OwnResponse);
        assert_eq!(decision, Admission::Replace);
    }

    // === Step 4: stale and duplicate ===

    #[test]
    fn equal_revision_is_duplicate() {
        let decision = admit(Some(rev(5)), false, false, rev(5), Origin::RemotePush);
        assert_eq!(decision, Admission::Discard(DiscardReason::Stale));
    }

    #[test]
    fn older_revision_is_stale() {
        let decision = admit(Some(rev(5)), false, false, rev(4), Origin::RemotePush);
        assert_eq!(decision, Admission::Discard(DiscardReason::Stale));
    }

    #[test]
    fn stale_own_response_is_discarded() {
        // A response for an older issuance arriving after a newer one was
        // applied: issuance-order application, not arrival-order.
        let decision = admit(Some(rev(6)), true, false, rev(5), Origin::OwnResponse);
        assert_eq!(decision, Admission::Discard(DiscardReason::Stale));
    }

    #[test]
    fn stale_remote_is_discarded_even_when_optimistic() {
        // Field-merge only applies to genuinely newer remote state;
        // merging stale state would regress untouched fields.
        let decision = admit(Some(rev(5)), true, false, rev(5), Origin::RemotePush);
        assert_eq!(decision, Admission::Discard(DiscardReason::Stale));
    }

    // === Idempotence ===

    #[test]
    fn admitting_same_revision_twice_discards_second() {
        // First delivery replaces.
        assert_eq!(
            admit(Some(rev(4)), false, false, rev(5), Origin::RemotePush),
            Admission::Replace
        );
        // Second, identical delivery is a no-op.
        assert_eq!(
            admit(Some(rev(5)), false, false, rev(5), Origin::RemotePush),
            Admission::Discard(DiscardReason::Stale)
        );
    }
}
