use chrono::Utc;
use std::collections::BTreeMap;
use tokio::sync::broadcast;
use tracing::debug;
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::task::{Assignee, Task, TaskDraft, TaskStatus};

const CONFIRM_WORDS: &[&str] = &["go", "yes", "proceed"];
const CANCEL_WORDS: &[&str] = &["cancel", "stop", "nevermind"];

/// Knobs for the lifecycle that differ between board variants.
#[derive(Debug, Clone, Copy)]
pub struct BoardRules {
    /// `done -> todo` is allowed (checkbox-style toggle).
    pub allow_reopen: bool,
    /// Agent-assigned tasks start in `pending` and wait for a reply.
    pub confirm_agent_tasks: bool,
}

impl Default for BoardRules {
    fn default() -> Self {
        Self {
            allow_reopen: true,
            confirm_agent_tasks: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BoardEvent {
    Created(String),
    Transitioned {
        id: String,
        from: TaskStatus,
        to: TaskStatus,
    },
    Deleted(String),
    Noted(String),
    Replaced,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    Applied,
    /// Already in the requested status.
    Unchanged,
    /// No such edge in the lifecycle. Nothing changed.
    Rejected,
    UnknownTask,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    Confirmed(String),
    Cancelled(String),
    NothingPending,
    Ignored,
}

#[derive(Debug, Clone, Default)]
pub struct Filter {
    pub status: Option<TaskStatus>,
    pub category: Option<String>,
}

impl Filter {
    fn matches(&self, task: &Task) -> bool {
        self.status.map_or(true, |s| task.status == s)
            && self
                .category
                .as_deref()
                .map_or(true, |c| task.category.eq_ignore_ascii_case(c))
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Stats {
    pub pending: usize,
    pub todo: usize,
    pub in_progress: usize,
    pub done: usize,
}

impl Stats {
    pub fn total(&self) -> usize {
        self.pending + self.todo + self.in_progress + self.done
    }

    /// Everything not finished yet.
    pub fn open(&self) -> usize {
        self.total() - self.done
    }
}

/// The task collection, newest first.
#[derive(Debug)]
pub struct KanbanBoard {
    tasks: Vec<Task>,
    rules: BoardRules,
    events: broadcast::Sender<BoardEvent>,
}

impl Default for KanbanBoard {
    fn default() -> Self {
        Self::new(BoardRules::default())
    }
}

impl KanbanBoard {
    pub fn new(rules: BoardRules) -> Self {
        let (events, _) = broadcast::channel(64);
        Self {
            tasks: Vec::new(),
            rules,
            events,
        }
    }

    pub fn with_tasks(rules: BoardRules, tasks: Vec<Task>) -> Self {
        let mut board = Self::new(rules);
        board.tasks = tasks;
        board
    }

    pub fn subscribe(&self) -> broadcast::Receiver<BoardEvent> {
        self.events.subscribe()
    }

    fn notify(&self, event: BoardEvent) {
        // No subscribers is fine.
        let _ = self.events.send(event);
    }

    pub fn tasks(&self) -> &[Task] {
        &self.tasks
    }

    pub fn get(&self, id: &str) -> Option<&Task> {
        self.tasks.iter().find(|t| t.id == id)
    }

    pub fn create(&mut self, draft: TaskDraft) -> Result<&Task> {
        let text = draft.title.trim();
        if text.is_empty() {
            return Err(Error::EmptyTitle);
        }

        let status = if draft.assignee == Assignee::Agent && self.rules.confirm_agent_tasks {
            TaskStatus::Pending
        } else {
            TaskStatus::Todo
        };

        let task = Task {
            id: Uuid::new_v4().to_string(),
            text: text.to_string(),
            status,
            assignee: Some(draft.assignee),
            category: draft.category,
            priority: draft.priority,
            due_date: draft.due_date,
            created_at: Utc::now(),
            notes: None,
        };

        self.notify(BoardEvent::Created(task.id.clone()));
        self.tasks.insert(0, task);
        Ok(&self.tasks[0])
    }

    fn allows(&self, from: TaskStatus, to: TaskStatus) -> bool {
        use TaskStatus::*;
        match (from, to) {
            (Pending, Todo)
            | (Todo, InProgress)
            | (Todo, Done)
            | (InProgress, Done)
            | (InProgress, Todo) => true,
            (Done, Todo) => self.rules.allow_reopen,
            _ => false,
        }
    }

    pub fn transition(&mut self, id: &str, to: TaskStatus) -> Transition {
        let Some(idx) = self.tasks.iter().position(|t| t.id == id) else {
            return Transition::UnknownTask;
        };

        let from = self.tasks[idx].status;
        if from == to {
            return Transition::Unchanged;
        }
        if !self.allows(from, to) {
            debug!(%id, %from, %to, "transition rejected");
            return Transition::Rejected;
        }

        self.tasks[idx].status = to;
        self.notify(BoardEvent::Transitioned {
            id: id.to_string(),
            from,
            to,
        });
        Transition::Applied
    }

    /// Moves a task one column to the right.
    pub fn advance(&mut self, id: &str) -> Transition {
        let next = match self.get(id).map(|t| t.status) {
            None => return Transition::UnknownTask,
            Some(TaskStatus::Pending) => TaskStatus::Todo,
            Some(TaskStatus::Todo) => TaskStatus::InProgress,
            Some(TaskStatus::InProgress) | Some(TaskStatus::Done) => TaskStatus::Done,
        };
        self.transition(id, next)
    }

    /// Moves a task one column to the left. Never back into `pending`.
    pub fn retreat(&mut self, id: &str) -> Transition {
        let prev = match self.get(id).map(|t| t.status) {
            None => return Transition::UnknownTask,
            Some(TaskStatus::Done) | Some(TaskStatus::InProgress) => TaskStatus::Todo,
            Some(status) => status,
        };
        self.transition(id, prev)
    }

    pub fn delete(&mut self, id: &str) -> bool {
        let before = self.tasks.len();
        self.tasks.retain(|t| t.id != id);
        let removed = self.tasks.len() != before;
        if removed {
            self.notify(BoardEvent::Deleted(id.to_string()));
        }
        removed
    }

    pub fn list(&self, filter: &Filter) -> Vec<&Task> {
        self.tasks.iter().filter(|t| filter.matches(t)).collect()
    }

    pub fn get_tasks_by_status(&self, status: TaskStatus) -> Vec<&Task> {
        self.list(&Filter {
            status: Some(status),
            category: None,
        })
    }

    /// Handles a chat reply aimed at the newest pending task.
    pub fn apply_reply(&mut self, text: &str) -> Reply {
        let lower = text.to_lowercase();
        let words: Vec<&str> = lower
            .split(|c: char| !c.is_alphanumeric())
            .filter(|w| !w.is_empty())
            .collect();
        let confirm = words.iter().any(|w| CONFIRM_WORDS.contains(w));
        let cancel = words.iter().any(|w| CANCEL_WORDS.contains(w));
        if !confirm && !cancel {
            return Reply::Ignored;
        }

        let Some(id) = self
            .tasks
            .iter()
            .find(|t| t.status == TaskStatus::Pending)
            .map(|t| t.id.clone())
        else {
            return Reply::NothingPending;
        };

        if cancel {
            self.delete(&id);
            Reply::Cancelled(id)
        } else {
            self.transition(&id, TaskStatus::Todo);
            Reply::Confirmed(id)
        }
    }

    pub fn append_note(&mut self, id: &str, note: &str) -> Result<()> {
        let task = self
            .tasks
            .iter_mut()
            .find(|t| t.id == id)
            .ok_or_else(|| Error::UnknownTask(id.to_string()))?;
        let note = note.trim();
        task.notes = Some(match task.notes.take() {
            Some(existing) if !existing.is_empty() => format!("{existing}\n{note}"),
            _ => note.to_string(),
        });
        self.notify(BoardEvent::Noted(id.to_string()));
        Ok(())
    }

    pub fn replace_all(&mut self, tasks: Vec<Task>) {
        self.tasks = tasks;
        self.notify(BoardEvent::Replaced);
    }

    pub fn stats(&self) -> Stats {
        self.tasks.iter().fold(Stats::default(), |mut stats, t| {
            match t.status {
                TaskStatus::Pending => stats.pending += 1,
                TaskStatus::Todo => stats.todo += 1,
                TaskStatus::InProgress => stats.in_progress += 1,
                TaskStatus::Done => stats.done += 1,
            }
            stats
        })
    }

    /// Category name (lower-cased) to number of tasks.
    pub fn categories(&self) -> BTreeMap<String, usize> {
        let mut counts = BTreeMap::new();
        for task in &self.tasks {
            *counts.entry(task.category.to_lowercase()).or_insert(0) += 1;
        }
        counts
    }
}
