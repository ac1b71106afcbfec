use std::fmt;
use std::str::FromStr;

use anyhow::anyhow;
use serde::{Deserialize, Serialize};
pub use trellis_wire::TaskId;
use trellis_wire::{TaskCreateBody, TaskPayload, TaskUpdateBody};
use uuid::Uuid;

#[derive(
    Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash, Default,
)]
#[serde(try_from = "u8", into = "u8")]
pub enum Priority {
    #[default]
    Low,
    Medium,
    High,
    Urgent,
}

impl Priority {
    pub const ALL: [Priority; 4] = [
        Priority::Low,
        Priority::Medium,
        Priority::High,
        Priority::Urgent,
    ];

    pub fn label(self) -> &'static str {
        match self {
            Priority::Low => "Low",
            Priority::Medium => "Medium",
            Priority::High => "High",
            Priority::Urgent => "Urgent",
        }
    }
}

impl From<Priority> for u8 {
    fn from(value: Priority) -> Self {
        match value {
            Priority::Low => 0,
            Priority::Medium => 1,
            Priority::High => 2,
            Priority::Urgent => 3,
        }
    }
}

impl TryFrom<u8> for Priority {
    type Error = anyhow::Error;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Priority::Low),
            1 => Ok(Priority::Medium),
            2 => Ok(Priority::High),
            3 => Ok(Priority::Urgent),
            other => Err(anyhow!("invalid priority code: {other}")),
        }
    }
}

impl FromStr for Priority {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "0" | "l" | "low" => Ok(Priority::Low),
            "1" | "m" | "med" | "medium" => Ok(Priority::Medium),
            "2" | "h" | "high" => Ok(Priority::High),
            "3" | "u" | "urgent" => Ok(Priority::Urgent),
            other => Err(anyhow!("unknown priority: {other}")),
        }
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(
    Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash, Default,
)]
#[serde(try_from = "u8", into = "u8")]
pub enum Status {
    #[default]
    Todo,
    InProgress,
    InReview,
    Complete,
}

impl Status {
    pub const ALL: [Status; 4] = [
        Status::Todo,
        Status::InProgress,
        Status::InReview,
        Status::Complete,
    ];

    pub fn label(self) -> &'static str {
        match self {
            Status::Todo => "To Do",
            Status::InProgress => "In Progress",
            Status::InReview => "In Review",
            Status::Complete => "Complete",
        }
    }

    pub fn index(self) -> usize {
        u8::from(self) as usize
    }
}

impl From<Status> for u8 {
    fn from(value: Status) -> Self {
        match value {
            Status::Todo => 0,
            Status::InProgress => 1,
            Status::InReview => 2,
            Status::Complete => 3,
        }
    }
}

impl TryFrom<u8> for Status {
    type Error = anyhow::Error;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Status::Todo),
            1 => Ok(Status::InProgress),
            2 => Ok(Status::InReview),
            3 => Ok(Status::Complete),
            other => Err(anyhow!("invalid status code: {other}")),
        }
    }
}

impl FromStr for Status {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_lowercase().replace(['-', ' '], "_");
        match normalized.as_str() {
            "0" | "todo" | "to_do" => Ok(Status::Todo),
            "1" | "in_progress" | "progress" | "doing" => Ok(Status::InProgress),
            "2" | "in_review" | "review" => Ok(Status::InReview),
            "3" | "complete" | "done" => Ok(Status::Complete),
            other => Err(anyhow!("unknown status: {other}")),
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Task {
    pub id: TaskId,
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub priority: Priority,
    #[serde(default)]
    pub status: Status,
}

impl Task {
    /// A task that has not been seen by the server yet.
    pub fn new_local(title: String, priority: Priority, status: Status) -> Self {
        Self {
            id: TaskId::Local(format!("local-{}", Uuid::new_v4())),
            title,
            description: String::new(),
            priority,
            status,
        }
    }

    pub fn has_title(&self) -> bool {
        !self.title.trim().is_empty()
    }

    pub fn create_body(&self) -> TaskCreateBody {
        TaskCreateBody {
            task: self.title.clone(),
            description: self.description.clone(),
            priority: self.priority.into(),
            status: self.status.into(),
        }
    }

    pub fn update_body(&self) -> TaskUpdateBody {
        TaskUpdateBody {
            title: self.title.clone(),
            description: self.description.clone(),
            priority: self.priority.into(),
            status: self.status.into(),
        }
    }
}

impl TryFrom<TaskPayload> for Task {
    type Error = anyhow::Error;

    fn try_from(payload: TaskPayload) -> Result<Self, Self::Error> {
        Ok(Self {
            id: payload.id,
            title: payload.title,
            description: payload.description,
            priority: Priority::try_from(payload.priority)?,
            status: Status::try_from(payload.status)?,
        })
    }
}
