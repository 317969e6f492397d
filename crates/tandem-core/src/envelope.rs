//! Push-channel event envelope.
//!
//! Remote mutations arrive as JSON frames over the shared channel. Frames
//! are parsed and validated here, at the boundary, so that nothing malformed
//! ever reaches the reconciler: a frame either becomes a well-formed
//! [`Envelope`] or is rejected with a typed [`EnvelopeError`] the channel
//! client logs and drops.
//!
//! Validation is two-pass, keyed on the `event_type` discriminant:
//! `created` and `updated` frames must carry a payload object holding the
//! full record; `deleted` frames carry no payload (the id and revision are
//! enough).

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::model::{ActorId, Entity, EntityId, EntityKind, Revision};

// ---------------------------------------------------------------------------
// Event type
// ---------------------------------------------------------------------------

/// The three remote mutation kinds delivered over the channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChannelEventType {
    Created,
    Updated,
    Deleted,
}

impl ChannelEventType {
    /// Canonical lowercase string representation.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Created => "created",
            Self::Updated => "updated",
            Self::Deleted => "deleted",
        }
    }
}

impl fmt::Display for ChannelEventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ChannelEventType {
    type Err = crate::model::ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "created" => Ok(Self::Created),
            "updated" => Ok(Self::Updated),
            "deleted" => Ok(Self::Deleted),
            _ => Err(crate::model::ParseEnumError {
                expected: "event type",
                got: s.to_string(),
            }),
        }
    }
}

// ---------------------------------------------------------------------------
// Envelope
// ---------------------------------------------------------------------------

/// A validated remote mutation event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Envelope {
    /// What happened to the entity.
    pub event_type: ChannelEventType,
    /// Which collection the entity belongs to.
    pub entity_kind: EntityKind,
    /// The entity's stable id.
    pub entity_id: EntityId,
    /// Full record for `created`/`updated`; absent for `deleted`.
    pub payload: Option<serde_json::Value>,
    /// Who committed the change.
    pub actor: ActorId,
    /// The room this event was delivered through.
    pub room_scope: String,
    /// Revision of the committed state.
    pub revision: Revision,
}

/// Why a frame was rejected at the channel boundary.
#[derive(Debug, thiserror::Error)]
pub enum EnvelopeError {
    /// The frame is not valid JSON or misses required structure.
    #[error("malformed frame: {0}")]
    Malformed(#[from] serde_json::Error),

    /// A required field is absent.
    #[error("missing required field '{field}'")]
    MissingField {
        /// Name of the absent field.
        field: &'static str,
    },

    /// The entity id is present but empty.
    #[error("empty entity id")]
    EmptyEntityId,

    /// A `created`/`updated` frame arrived without a payload.
    #[error("{event_type} event for '{entity_id}' carries no payload")]
    MissingPayload {
        /// The offending event type.
        event_type: ChannelEventType,
        /// The target entity.
        entity_id: EntityId,
    },

    /// The payload's embedded id disagrees with the envelope id.
    #[error("payload id '{payload_id}' does not match envelope id '{entity_id}'")]
    IdMismatch {
        /// Id stated by the envelope.
        entity_id: EntityId,
        /// Id found inside the payload.
        payload_id: EntityId,
    },

    /// The payload does not deserialize into the expected record kind.
    #[error("payload is not a valid {kind} record: {reason}")]
    BadPayload {
        /// Expected entity kind.
        kind: EntityKind,
        /// Deserialization failure description.
        reason: String,
    },
}

/// Wire shape before validation. Every field is optional so that absence
/// produces a precise [`EnvelopeError`] instead of an opaque serde error.
#[derive(Deserialize)]
struct RawEnvelope {
    event_type: Option<ChannelEventType>,
    entity_kind: Option<EntityKind>,
    entity_id: Option<EntityId>,
    #[serde(default)]
    payload: Option<serde_json::Value>,
    actor: Option<ActorId>,
    #[serde(default)]
    room_scope: Option<String>,
    revision: Option<Revision>,
}

impl Envelope {
    /// Parse and validate a raw channel frame.
    ///
    /// # Errors
    ///
    /// Returns [`EnvelopeError`] for anything short of a well-formed
    /// envelope. Callers log and drop; rejection never propagates further.
    pub fn parse(frame: &str) -> Result<Self, EnvelopeError> {
        let raw: RawEnvelope = serde_json::from_str(frame)?;

        let event_type = raw
            .event_type
            .ok_or(EnvelopeError::MissingField { field: "event_type" })?;
        let entity_kind = raw
            .entity_kind
            .ok_or(EnvelopeError::MissingField { field: "entity_kind" })?;
        let entity_id = raw
            .entity_id
            .ok_or(EnvelopeError::MissingField { field: "entity_id" })?;
        if entity_id.as_str().is_empty() {
            return Err(EnvelopeError::EmptyEntityId);
        }
        let actor = raw
            .actor
            .ok_or(EnvelopeError::MissingField { field: "actor" })?;
        let revision = raw
            .revision
            .ok_or(EnvelopeError::MissingField { field: "revision" })?;

        let payload = match (event_type, raw.payload) {
            (ChannelEventType::Deleted, _) => None,
            (_, Some(payload)) => Some(payload),
            (_, None) => {
                return Err(EnvelopeError::MissingPayload {
                    event_type,
                    entity_id,
                });
            }
        };

        Ok(Self {
            event_type,
            entity_kind,
            entity_id,
            payload,
            actor,
            room_scope: raw.room_scope.unwrap_or_default(),
            revision,
        })
    }

    /// Deserialize the payload into a typed record of kind `E`.
    ///
    /// # Errors
    ///
    /// Returns [`EnvelopeError`] if the payload is absent, does not
    /// deserialize into `E`, or embeds an id different from the envelope's.
    pub fn decode_payload<E: Entity>(&self) -> Result<E, EnvelopeError> {
        let payload = self
            .payload
            .as_ref()
            .ok_or_else(|| EnvelopeError::MissingPayload {
                event_type: self.event_type,
                entity_id: self.entity_id.clone(),
            })?;

        let record: E =
            serde_json::from_value(payload.clone()).map_err(|e| EnvelopeError::BadPayload {
                kind: E::KIND,
                reason: e.to_string(),
            })?;

        if record.id() != &self.entity_id {
            return Err(EnvelopeError::IdMismatch {
                entity_id: self.entity_id.clone(),
                payload_id: record.id().clone(),
            });
        }
        Ok(record)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
