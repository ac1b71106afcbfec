use std::fmt;

use serde::{
  Deserialize,
  Serialize
};

#[derive(
  Debug,
  Clone,
  Serialize,
  Deserialize,
  PartialEq,
  Eq,
  Hash,
)]
#[serde(untagged)]
pub enum TaskId {
  Remote(u64),
  Local(String)
}

impl TaskId {
  pub fn is_local(&self) -> bool {
    matches!(self, TaskId::Local(_))
  }

  /// Parses a CLI token: digits are
  /// server ids, anything else is a
  /// locally-assigned id.
  pub fn parse(token: &str) -> Self {
    let trimmed = token.trim();
    match trimmed.parse::<u64>() {
      | Ok(id) => TaskId::Remote(id),
      | Err(_) => {
        TaskId::Local(
          trimmed.to_string()
        )
      }
    }
  }
}

impl fmt::Display for TaskId {
  fn fmt(
    &self,
    f: &mut fmt::Formatter<'_>
  ) -> fmt::Result {
    match self {
      | TaskId::Remote(id) => {
        write!(f, "{id}")
      }
      | TaskId::Local(id) => {
        write!(f, "{id}")
      }
    }
  }
}

/// Task object as returned by
/// `GET /api/tasks/` and inside the
/// create/update envelopes.
#[derive(
  Debug,
  Clone,
  Serialize,
  Deserialize,
  PartialEq,
  Eq,
)]
pub struct TaskPayload {
  pub id:          TaskId,
  #[serde(default)]
  pub title:       String,
  #[serde(default)]
  pub description: String,
  #[serde(default)]
  pub priority:    u8,
  #[serde(default)]
  pub status:      u8
}

#[derive(
  Debug,
  Clone,
  Serialize,
  Deserialize,
  PartialEq,
  Eq,
)]
pub struct TaskCreateBody {
  pub task:        String,
  #[serde(default)]
  pub description: String,
  pub priority:    u8,
  pub status:      u8
}

#[derive(
  Debug,
  Clone,
  Serialize,
  Deserialize,
  PartialEq,
  Eq,
)]
pub struct TaskUpdateBody {
  pub title:       String,
  pub description: String,
  pub priority:    u8,
  pub status:      u8
}

#[derive(
  Debug, Clone, Serialize, Deserialize,
)]
pub struct TaskEnvelope {
  #[serde(default)]
  pub message: Option<String>,
  pub task:    TaskPayload
}

#[derive(
  Debug, Clone, Serialize, Deserialize,
)]
pub struct ApiError {
  #[serde(default)]
  pub error:   Option<String>,
  #[serde(default)]
  pub message: Option<String>
}
