//! Shared identity types and the traits every entity kind implements.

pub mod comment;
pub mod project;
pub mod task;
pub mod team;

pub use comment::{Comment, CommentPatch};
pub use project::{Project, ProjectPatch};
pub use task::{Priority, Status, Task, TaskPatch};
pub use team::{Team, TeamPatch};

use serde::{Deserialize, Serialize};
use serde::de::DeserializeOwned;
use std::fmt;
use std::str::FromStr;

/// Prefix reserved for locally assigned ids of unconfirmed creates.
const TEMP_ID_PREFIX: &str = "tmp-";

// ---------------------------------------------------------------------------
// EntityId
// ---------------------------------------------------------------------------

/// Opaque stable identifier for an entity.
///
/// Server-assigned ids are opaque strings. A record created locally carries
/// a temporary `tmp-<n>` id until its create request resolves, at which
/// point the store swaps the whole record for the server-assigned one.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntityId(String);

impl EntityId {
    /// Wrap a raw id string.
    pub fn new(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    /// Allocate the `n`-th temporary id.
    #[must_use]
    pub fn temporary(n: u64) -> Self {
        Self(format!("{TEMP_ID_PREFIX}{n}"))
    }

    /// Returns `true` for locally assigned ids of unconfirmed creates.
    #[must_use]
    pub fn is_temporary(&self) -> bool {
        self.0.starts_with(TEMP_ID_PREFIX)
    }

    /// The raw id string.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for EntityId {
    fn from(raw: &str) -> Self {
        Self::new(raw)
    }
}

// ---------------------------------------------------------------------------
// Revision
// ---------------------------------------------------------------------------

/// Monotonic revision marker derived from the last confirmed update time.
///
/// Encoded as microseconds since the Unix epoch. Incoming records are
/// ordered by comparing revisions; equal revisions mean duplicate delivery
/// of the same confirmed state.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Revision(i64);

impl Revision {
    /// The revision of a record that has never been confirmed.
    pub const ZERO: Self = Self(0);

    /// Build a revision from microseconds since the Unix epoch.
    #[must_use]
    pub const fn from_micros(us: i64) -> Self {
        Self(us)
    }

    /// Microseconds since the Unix epoch.
    #[must_use]
    pub const fn micros(self) -> i64 {
        self.0
    }

    /// The wall-clock instant this revision encodes, if representable.
    #[must_use]
    pub fn to_datetime(self) -> Option<chrono::DateTime<chrono::Utc>> {
        chrono::DateTime::from_timestamp_micros(self.0)
    }
}

impl fmt::Display for Revision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// ActorId / Credential
// ---------------------------------------------------------------------------

/// Identifier of the user (or integration) performing a change.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ActorId(String);

impl ActorId {
    /// Wrap a raw actor id.
    pub fn new(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    /// The raw actor id string.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ActorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Opaque session credential handed to the channel transport.
///
/// `Debug` elides the token so credentials never end up in logs.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Credential(String);

impl Credential {
    /// Wrap a raw credential token.
    pub fn new(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    /// The raw token, for handing to the transport.
    #[must_use]
    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Credential(..)")
    }
}

// ---------------------------------------------------------------------------
// EntityKind
// ---------------------------------------------------------------------------

/// The four entity kinds carried over the push channel.
///
/// Notifications are synthesized locally from change records and are not an
/// envelope kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityKind {
    Task,
    Project,
    Team,
    Comment,
}

/// Error returned when parsing an unknown entity kind string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownEntityKind {
    /// The unrecognised input string.
    pub raw: String,
}

impl fmt::Display for UnknownEntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "unknown entity kind '{}': expected one of task, project, team, comment",
            self.raw
        )
    }
}

impl std::error::Error for UnknownEntityKind {}

impl EntityKind {
    /// All known entity kinds.
    pub const ALL: [Self; 4] = [Self::Task, Self::Project, Self::Team, Self::Comment];

    /// Canonical lowercase string representation.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Task => "task",
            Self::Project => "project",
            Self::Team => "team",
            Self::Comment => "comment",
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EntityKind {
    type Err = UnknownEntityKind;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "task" => Ok(Self::Task),
            "project" => Ok(Self::Project),
            "team" => Ok(Self::Team),
            "comment" => Ok(Self::Comment),
            _ => Err(UnknownEntityKind { raw: s.to_string() }),
        }
    }
}

/// Error returned when parsing a domain enum value from text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseEnumError {
    pub expected: &'static str,
    pub got: String,
}

impl fmt::Display for ParseEnumError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid {}: '{}'", self.expected, self.got)
    }
}

impl std::error::Error for ParseEnumError {}

// ---------------------------------------------------------------------------
// Entity / Patch traits
// ---------------------------------------------------------------------------

/// A record kind managed by a mutation store.
///
/// Every entity carries a stable id and a revision marker; everything else
/// is ordinary domain data. The `optimistic` attribute from the data model
/// is deliberately *not* part of the record: a record is optimistic iff the
/// store holds an unresolved local mutation for its id, which keeps the
/// flag impossible to clear outside reconciliation.
pub trait Entity: Clone + fmt::Debug + Serialize + DeserializeOwned {
    /// The partial-update type for this entity kind.
    type Patch: Patch<Self>;

    /// The kind tag used for envelope routing.
    const KIND: EntityKind;

    /// Stable identifier.
    fn id(&self) -> &EntityId;

    /// Replace the identifier (used for temporary-id assignment).
    fn set_id(&mut self, id: EntityId);

    /// Last confirmed revision.
    fn revision(&self) -> Revision;
}

/// A partial update over an entity record.
///
/// Patches are all-`Option` field structs: `None` leaves a field alone,
/// `Some` overwrites it. Applying the pending patches for an id in issuance
/// order over the last confirmed record reproduces the optimistic view.
pub trait Patch<E>: Clone + fmt::Debug + Default {
    /// Overwrite the fields this patch touches.
    fn apply(&self, record: &mut E);

    /// Returns `true` if the patch touches no fields.
    fn is_empty(&self) -> bool;
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
