use derive_more::{Display, From, FromStr, Into};
use serde::{Deserialize, Serialize};

use crate::error::Error;

/// Server-assigned task identifier.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, FromStr, From, Into,
)]
#[serde(transparent)]
pub struct TaskId(pub u64);

/// Task type identifier (read-only reference data).
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, FromStr, From, Into,
)]
#[serde(transparent)]
pub struct TaskTypeId(pub u64);

/// Category a task can be filed under, as served by `GET /todo-types/`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskType {
    pub id: TaskTypeId,
    pub name: String,
    #[serde(default)]
    pub description: String,
}

/// A task owned by the backend. The client only ever holds cached copies.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[non_exhaustive]
pub struct Task {
    pub id: TaskId,
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub completed: bool,
    #[serde(default, rename = "todo_type")]
    pub task_type: Option<TaskType>,
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub created_at: Option<time::OffsetDateTime>,
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub updated_at: Option<time::OffsetDateTime>,
}

impl Task {
    /// Create a task with only the fields the client cares about.
    #[must_use]
    pub fn new(id: TaskId, title: impl Into<String>) -> Self {
        Self {
            id,
            title: title.into(),
            description: String::new(),
            completed: false,
            task_type: None,
            created_at: None,
            updated_at: None,
        }
    }

    #[must_use]
    pub fn with_completed(mut self, completed: bool) -> Self {
        self.completed = completed;
        self
    }

    #[must_use]
    pub fn with_task_type(mut self, task_type: TaskType) -> Self {
        self.task_type = Some(task_type);
        self
    }
}

/// Payload for `POST /todos/`.
///
/// Guaranteed to carry a non-blank title by construction. The type reference
/// is serialized as `todo_type_id` only when one was selected.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NewTask {
    title: String,
    #[serde(rename = "todo_type_id", skip_serializing_if = "Option::is_none")]
    task_type_id: Option<TaskTypeId>,
}

impl NewTask {
    /// # Errors
    ///
    /// Returns [`Error::Validation`] if the title is empty or only whitespace.
    pub fn new(title: impl Into<String>) -> Result<Self, Error> {
        let title = title.into();
        if title.trim().is_empty() {
            return Err(Error::Validation("task title must not be empty".into()));
        }
        Ok(Self {
            title,
            task_type_id: None,
        })
    }

    #[must_use]
    pub fn with_task_type(mut self, task_type_id: Option<TaskTypeId>) -> Self {
        self.task_type_id = task_type_id;
        self
    }

    #[must_use]
    pub fn title(&self) -> &str {
        &self.title
    }

    #[must_use]
    pub fn task_type_id(&self) -> Option<TaskTypeId> {
        self.task_type_id
    }
}

/// Payload for `PATCH /todos/{id}/`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct TaskPatch {
    pub completed: bool,
}

/// Identity record reported by the identity provider for the signed-in user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[non_exhaustive]
pub struct UserProfile {
    pub sub: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub picture: Option<String>,
}

impl UserProfile {
    #[must_use]
    pub fn new(sub: impl Into<String>) -> Self {
        Self {
            sub: sub.into(),
            name: None,
            email: None,
            picture: None,
        }
    }

    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    #[must_use]
    pub fn with_email(mut self, email: impl Into<String>) -> Self {
        self.email = Some(email.into());
        self
    }
}
