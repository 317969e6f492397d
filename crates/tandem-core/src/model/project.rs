use serde::{Deserialize, Serialize};

use super::{Entity, EntityId, EntityKind, Patch, Revision};

/// A project grouping tasks under a team.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Project {
    pub id: EntityId,
    pub revision: Revision,
    pub name: String,
    pub description: Option<String>,
    pub team_id: Option<EntityId>,
    pub archived: bool,
}

impl Project {
    /// A fresh unconfirmed project draft with the given name.
    #[must_use]
    pub fn draft(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }
}

impl Entity for Project {
    type Patch = ProjectPatch;

    const KIND: EntityKind = EntityKind::Project;

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

/// Partial update for a [`Project`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProjectPatch {
    pub name: Option<String>,
    pub description: Option<Option<String>>,
    pub team_id: Option<Option<EntityId>>,
    pub archived: Option<bool>,
}

impl Patch<Project> for ProjectPatch {
    fn apply(&self, record: &mut Project) {
        if let Some(name) = &self.name {
            record.name = name.clone();
        }
        if let Some(description) = &self.description {
            record.description = description.clone();
        }
        if let Some(team_id) = &self.team_id {
            record.team_id = team_id.clone();
        }
        if let Some(archived) = self.archived {
            record.archived = archived;
        }
    }

    fn is_empty(&self) -> bool {
        self.name.is_none()
            && self.description.is_none()
            && self.team_id.is_none()
            && self.archived.is_none()
    }
}
