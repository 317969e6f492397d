use serde::{Deserialize, Serialize};

use super::{ActorId, Entity, EntityId, EntityKind, Patch, Revision};

/// A team of collaborators.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Team {
    pub id: EntityId,
    pub revision: Revision,
    pub name: String,
    pub member_ids: Vec<ActorId>,
}

impl Team {
    /// A fresh unconfirmed team draft with the given name.
    #[must_use]
    pub fn draft(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }
}

impl Entity for Team {
    type Patch = TeamPatch;

    const KIND: EntityKind = EntityKind::Team;

    fn id(&self) -> &EntityId {
        &self.id
    }

    fn set_id(&mut self, id: EntityId) {
        self.id = id;
    }

    fn revision(&self) -> Revision {
        self.revision
    }
}

/// Partial update for a [`Team`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TeamPatch {
    pub name: Option<String>,
    pub member_ids: Option<Vec<ActorId>>,
}

impl Patch<Team> for TeamPatch {
    fn apply(&self, record: &mut Team) {
        if let Some(name) = &self.name {
            record.name = name.clone();
        }
        if let Some(member_ids) = &self.member_ids {
            record.member_ids = member_ids.clone();
        }
    }

    fn is_empty(&self) -> bool {
        self.name.is_none() && self.member_ids.is_none()
    }
}
