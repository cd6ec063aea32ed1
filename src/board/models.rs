use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Store-assigned opaque document id.
pub type TaskId = String;
pub type ProjectId = String;
pub type OwnerId = String;

/// Store-assigned timestamp, millisecond precision.
pub type Timestamp = DateTime<Utc>;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Column {
    Backlog,
    Todo,
    Doing,
    Done,
}

impl Column {
    /// Display order. Not a semantic ordering.
    pub const ALL: [Column; 4] = [Column::Backlog, Column::Todo, Column::Doing, Column::Done];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Backlog => "backlog",
            Self::Todo => "todo",
            Self::Doing => "doing",
            Self::Done => "done",
        }
    }

    pub fn title(&self) -> &'static str {
        match self {
            Self::Backlog => "Backlog",
            Self::Todo => "TODO",
            Self::Doing => "In progress",
            Self::Done => "Complete",
        }
    }
}

impl std::fmt::Display for Column {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Column {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "backlog" => Ok(Self::Backlog),
            "todo" => Ok(Self::Todo),
            "doing" => Ok(Self::Doing),
            "done" => Ok(Self::Done),
            _ => Err(format!("Invalid column: {}", s)),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Project {
    pub id: ProjectId,
    pub name: String,
    pub owner_id: OwnerId,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Task {
    pub id: TaskId,
    pub title: String,
    pub column: Column,
    pub project_id: ProjectId,
    pub owner_id: OwnerId,
    /// Local sort key. Missing values sort as 0.
    pub position: Option<i64>,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

impl Task {
    pub fn sort_key(&self) -> i64 {
        self.position.unwrap_or(0)
    }
}

/// Fields of a task about to be created; id and timestamps come from the store.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NewTask {
    pub title: String,
    pub column: Column,
    pub project_id: ProjectId,
    pub owner_id: OwnerId,
    pub position: Option<i64>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NewProject {
    pub name: String,
    pub owner_id: OwnerId,
}

/// Partial update of a task document. `updated_at` is always set by the store.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct TaskPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub column: Option<Column>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub position: Option<i64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn task(position: Option<i64>) -> Task {
        let now = Utc::now();
        Task {
            id: "t1".to_string(),
            title: "Write docs".to_string(),
            column: Column::Todo,
            project_id: "p1".to_string(),
            owner_id: "u1".to_string(),
            position,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn test_column_parse_accepts_all_variants() {
        for column in Column::ALL {
            assert_eq!(Column::from_str(column.as_str()).unwrap(), column);
        }
    }

    #[test]
    fn test_column_parse_rejects_unknown() {
        let err = Column::from_str("in_review").unwrap_err();
        assert!(err.contains("in_review"));
    }

    #[test]
    fn test_column_serializes_lowercase() {
        let json = serde_json::to_string(&Column::Doing).unwrap();
        assert_eq!(json, "\"doing\"");
    }

    #[test]
    fn test_column_titles() {
        assert_eq!(Column::Backlog.title(), "Backlog");
        assert_eq!(Column::Todo.title(), "TODO");
        assert_eq!(Column::Doing.title(), "In progress");
        assert_eq!(Column::Done.title(), "Complete");
    }

    #[test]
    fn test_missing_position_sorts_as_zero() {
        assert_eq!(task(None).sort_key(), 0);
        assert_eq!(task(Some(17)).sort_key(), 17);
    }

    #[test]
    fn test_patch_skips_absent_fields_in_json() {
        assert_eq!(serde_json::to_string(&TaskPatch::default()).unwrap(), "{}");
        let patch = TaskPatch {
            column: Some(Column::Done),
            position: None,
        };
        assert_eq!(
            serde_json::to_string(&patch).unwrap(),
            r#"{"column":"done"}"#
        );
    }
}
