use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Board column a task sits in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TaskStatus {
    #[serde(rename = "Pending")]
    Pending,
    #[serde(rename = "In Progress")]
    InProgress,
    #[serde(rename = "Under Review")]
    UnderReview,
    #[serde(rename = "Completed")]
    Completed,
}

impl TaskStatus {
    /// Column order, left to right.
    pub const ALL: [TaskStatus; 4] = [
        TaskStatus::Pending,
        TaskStatus::InProgress,
        TaskStatus::UnderReview,
        TaskStatus::Completed,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            TaskStatus::Pending => "Pending",
            TaskStatus::InProgress => "In Progress",
            TaskStatus::UnderReview => "Under Review",
            TaskStatus::Completed => "Completed",
        }
    }

    pub fn column(self) -> usize {
        match self {
            TaskStatus::Pending => 0,
            TaskStatus::InProgress => 1,
            TaskStatus::UnderReview => 2,
            TaskStatus::Completed => 3,
        }
    }

    pub fn from_column(index: usize) -> Option<Self> {
        Self::ALL.get(index).copied()
    }

    /// Neighbouring column, clamped at the board edges.
    pub fn shifted(self, direction: isize) -> Self {
        let idx = (self.column() as isize + direction).clamp(0, Self::ALL.len() as isize - 1);
        Self::ALL[idx as usize]
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct Task {
    #[serde(rename = "_id")]
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub description: String,
    pub status: TaskStatus,
    pub project: String,
    #[serde(rename = "createdAt", default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(rename = "updatedAt", default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
}

impl Task {
    /// Body for create and update requests built from this task.
    pub fn payload(&self) -> TaskPayload {
        TaskPayload {
            title: self.title.clone(),
            description: self.description.clone(),
            status: self.status,
        }
    }

    pub fn apply(&mut self, edit: &TaskPayload) {
        self.title = edit.title.clone();
        self.description = edit.description.clone();
        self.status = edit.status;
    }
}

/// Body of `create-task` and `update-task`.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct TaskPayload {
    pub title: String,
    pub description: String,
    pub status: TaskStatus,
}

impl TaskPayload {
    pub fn new(title: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            description: description.into(),
            status: TaskStatus::Pending,
        }
    }
}
