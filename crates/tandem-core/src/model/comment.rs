use serde::{Deserialize, Serialize};

use super::{ActorId, Entity, EntityId, EntityKind, Patch, Revision};

/// A comment attached to a task.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Comment {
    pub id: EntityId,
    pub revision: Revision,
    pub task_id: EntityId,
    pub author_id: Option<ActorId>,
    pub body: String,
}

impl Comment {
    /// A fresh unconfirmed comment draft on the given task.
    #[must_use]
    pub fn draft(task_id: EntityId, body: impl Into<String>) -> Self {
        Self {
            task_id,
            body: body.into(),
            ..Self::default()
        }
    }
}

impl Entity for Comment {
    type Patch = CommentPatch;

    const KIND: EntityKind = EntityKind::Comment;

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

/// Partial update for a [`Comment`]. Only the body is editable.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommentPatch {
    pub body: Option<String>,
}

impl Patch<Comment> for CommentPatch {
    fn apply(&self, record: &mut Comment) {
        if let Some(body) = &self.body {
            record.body = body.clone();
        }
    }

    fn is_empty(&self) -> bool {
        self.body.is_none()
    }
}
