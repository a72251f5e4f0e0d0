use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    /// Agent-assigned, waiting for the owner to confirm.
    Pending,
    Todo,
    InProgress,
    Done,
}

impl TaskStatus {
    /// Board columns, left to right. `Pending` sits before the lifecycle proper.
    pub const COLUMNS: [TaskStatus; 4] = [
        TaskStatus::Pending,
        TaskStatus::Todo,
        TaskStatus::InProgress,
        TaskStatus::Done,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            TaskStatus::Pending => "pending",
            TaskStatus::Todo => "todo",
            TaskStatus::InProgress => "in_progress",
            TaskStatus::Done => "done",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            TaskStatus::Pending => "PENDING",
            TaskStatus::Todo => "TODO",
            TaskStatus::InProgress => "DOING",
            TaskStatus::Done => "DONE",
        }
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TaskStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "pending" => Ok(TaskStatus::Pending),
            "todo" => Ok(TaskStatus::Todo),
            "in_progress" | "in-progress" | "doing" => Ok(TaskStatus::InProgress),
            "done" => Ok(TaskStatus::Done),
            other => Err(format!(
                "unknown status '{other}' (expected pending, todo, in_progress or done)"
            )),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Assignee {
    Owner,
    Agent,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    High,
    #[default]
    Medium,
    Low,
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Priority::High => "high",
            Priority::Medium => "medium",
            Priority::Low => "low",
        })
    }
}

/// What the intent extractor makes of a line of free text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskDraft {
    pub title: String,
    pub category: String,
    pub priority: Priority,
    pub assignee: Assignee,
    pub due_date: Option<NaiveDate>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", from = "StoredTask")]
pub struct Task {
    pub id: String,
    pub text: String,
    pub status: TaskStatus,
    pub assignee: Option<Assignee>,
    pub category: String,
    pub priority: Priority,
    pub due_date: Option<NaiveDate>,
    pub created_at: DateTime<Utc>,
    pub notes: Option<String>,
}

/// On-disk shape. Older blobs use `title` and a `completed` flag instead of `status`.
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct StoredTask {
    id: String,
    #[serde(alias = "title")]
    text: String,
    #[serde(default)]
    status: Option<TaskStatus>,
    #[serde(default)]
    completed: Option<bool>,
    #[serde(default)]
    assignee: Option<Assignee>,
    #[serde(default = "default_category")]
    category: String,
    #[serde(default)]
    priority: Priority,
    #[serde(default)]
    due_date: Option<NaiveDate>,
    created_at: DateTime<Utc>,
    #[serde(default)]
    notes: Option<String>,
}

fn default_category() -> String {
    "general".to_string()
}

impl From<StoredTask> for Task {
    fn from(raw: StoredTask) -> Self {
        let status = match (raw.status, raw.completed) {
            (Some(status), _) => status,
            (None, Some(true)) => TaskStatus::Done,
            (None, _) => TaskStatus::Todo,
        };
        Task {
            id: raw.id,
            text: raw.text,
            status,
            assignee: raw.assignee,
            category: raw.category,
            priority: raw.priority,
            due_date: raw.due_date,
            created_at: raw.created_at,
            notes: raw.notes,
        }
    }
}
