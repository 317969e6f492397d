use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr};

use super::{ActorId, Entity, EntityId, EntityKind, ParseEnumError, Patch, Revision};

/// Task workflow status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Status {
    Todo,
    InProgress,
    Done,
}

impl Status {
    const fn as_str(self) -> &'static str {
        match self {
            Self::Todo => "todo",
            Self::InProgress => "in_progress",
            Self::Done => "done",
        }
    }
}

impl Default for Status {
    fn default() -> Self {
        Self::Todo
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Status {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "todo" => Ok(Self::Todo),
            "in_progress" => Ok(Self::InProgress),
            "done" => Ok(Self::Done),
            _ => Err(ParseEnumError {
                expected: "status",
                got: s.to_string(),
            }),
        }
    }
}

/// Human-set priority.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Low,
    Normal,
    High,
}

impl Default for Priority {
    fn default() -> Self {
        Self::Normal
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Low => "low",
            Self::Normal => "normal",
            Self::High => "high",
        };
        f.write_str(s)
    }
}

/// A shared task record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Task {
    pub id: EntityId,
    pub revision: Revision,
    pub title: String,
    pub description: Option<String>,
    pub status: Status,
    pub priority: Priority,
    pub project_id: Option<EntityId>,
    pub assignee_ids: Vec<ActorId>,
    pub due_date: Option<DateTime<Utc>>,
}

impl Task {
    /// A fresh unconfirmed task draft with the given title.
    #[must_use]
    pub fn draft(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            ..Self::default()
        }
    }
}

impl Default for Task {
    fn default() -> Self {
        Self {
            id: EntityId::new(""),
            revision: Revision::ZERO,
            title: String::new(),
            description: None,
            status: Status::Todo,
            priority: Priority::Normal,
            project_id: None,
            assignee_ids: Vec::new(),
            due_date: None,
        }
    }
}

impl Entity for Task {
    type Patch = TaskPatch;

    const KIND: EntityKind = EntityKind::Task;

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

/// Partial update for a [`Task`]. `None` leaves the field alone.
///
/// Nullable fields use a doubled `Option`: the outer level is "touched or
/// not", the inner level is the new value.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TaskPatch {
    pub title: Option<String>,
    pub description: Option<Option<String>>,
    pub status: Option<Status>,
    pub priority: Option<Priority>,
    pub project_id: Option<Option<EntityId>>,
    pub assignee_ids: Option<Vec<ActorId>>,
    pub due_date: Option<Option<DateTime<Utc>>>,
}

impl Patch<Task> for TaskPatch {
    fn apply(&self, record: &mut Task) {
        if let Some(title) = &self.title {
            record.title = title.clone();
        }
        if let Some(description) = &self.description {
            record.description = description.clone();
        }
        if let Some(status) = self.status {
            record.status = status;
        }
        if let Some(priority) = self.priority {
            record.priority = priority;
        }
        if let Some(project_id) = &self.project_id {
            record.project_id = project_id.clone();
        }
        if let Some(assignee_ids) = &self.assignee_ids {
            record.assignee_ids = assignee_ids.clone();
        }
        if let Some(due_date) = &self.due_date {
            record.due_date = *due_date;
        }
    }

    fn is_empty(&self) -> bool {
        self.title.is_none()
            && self.description.is_none()
            && self.status.is_none()
            && self.priority.is_none()
            && self.project_id.is_none()
            && self.assignee_ids.is_none()
            && self.due_date.is_none()
    }
}
