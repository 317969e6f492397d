//! Structured errors for the mutation protocol.
//!
//! Every failed mutation resolves to exactly one [`MutationError`] variant,
//! and every variant implies a specific local recovery already performed by
//! the store before the error surfaces:
//!
//! | Variant | Local recovery |
//! |---|---|
//! | `Validation` | rolled back to last confirmed state |
//! | `Network` | rolled back; retry is the caller's decision |
//! | `Conflict` | rolled back; a re-fetch of the canonical record is dispatched |
//! | `NotFound` | nothing was applied |

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::model::{EntityId, Revision};

/// A single rejected field in a validation failure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldViolation {
    /// Field name as the server reports it.
    pub field: String,
    /// Human-readable rejection message.
    pub message: String,
}

impl fmt::Display for FieldViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// Why a mutation failed.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MutationError {
    /// The server rejected the mutation; per-field messages attached.
    #[error("validation rejected {} field(s)", violations.len())]
    Validation {
        /// The rejected fields.
        violations: Vec<FieldViolation>,
    },

    /// The request never completed. Transient; the caller decides on retry.
    #[error("network failure: {reason}")]
    Network {
        /// Transport-level description.
        reason: String,
    },

    /// The server holds a newer revision than the one this mutation was
    /// issued against. The store dispatches a forced re-fetch.
    #[error("stale revision: server is at {server_revision}")]
    Conflict {
        /// The revision the server reported.
        server_revision: Revision,
    },

    /// The target record does not exist locally.
    #[error("no record with id '{id}'")]
    NotFound {
        /// The missing id.
        id: EntityId,
    },
}

impl MutationError {
    /// Convenience constructor for a single-field validation failure.
    #[must_use]
    pub fn invalid_field(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Validation {
            violations: vec![FieldViolation {
                field: field.into(),
                message: message.into(),
            }],
        }
    }

    /// Returns `true` for failures that force a canonical re-fetch.
    #[must_use]
    pub const fn is_conflict(&self) -> bool {
        matches!(self, Self::Conflict { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validation_display_counts_fields() {
        let err = MutationError::Validation {
            violations: vec![
                FieldViolation {
                    field: "title".into(),
                    message: "must not be empty".into(),
                },
                FieldViolation {
                    field: "due_date".into(),
                    message: "in the past".into(),
                },
            ],
        };
        assert_eq!(err.to_string(), "validation rejected 2 field(s)");
    }

    #[test]
    fn conflict_is_conflict() {
        let err = MutationError::Conflict {
            server_revision: Revision::from_micros(9),
        };
        assert!(err.is_conflict());
        assert!(
            !MutationError::Network {
                reason: "timeout".into()
            }
            .is_conflict()
        );
    }
}
