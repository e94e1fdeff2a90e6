use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use tokio::sync::RwLock;
use tracing::info;

use taskpay_ledger::{Amount, TaskId, UserId};

use crate::error::{EscrowError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TaskStatus {
    Posted,
    Accepted,
    Completed,
    Paid,
    Cancelled,
}

impl TaskStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Paid | Self::Cancelled)
    }

    /// Legal edges of the lifecycle. Transitions are monotonic: no task may
    /// regress, and PAID/CANCELLED are final.
    pub fn can_transition_to(&self, next: TaskStatus) -> bool {
        use TaskStatus::*;
        matches!(
            (self, next),
            (Posted, Accepted)
                | (Posted, Cancelled)
                | (Accepted, Completed)
                | (Accepted, Paid)
                | (Accepted, Cancelled)
                | (Completed, Paid)
                | (Completed, Cancelled)
        )
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Posted => "POSTED",
            Self::Accepted => "ACCEPTED",
            Self::Completed => "COMPLETED",
            Self::Paid => "PAID",
            Self::Cancelled => "CANCELLED",
        };
        write!(f, "{}", s)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    pub id: TaskId,
    pub poster_id: UserId,
    pub doer_id: Option<UserId>,
    pub title: String,
    pub description: String,
    /// Immutable after creation.
    pub fee_amount: Amount,
    pub status: TaskStatus,
    pub created_at: DateTime<Utc>,
    pub accepted_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl Task {
    pub fn new(poster_id: UserId, title: String, description: String, fee_amount: Amount) -> Self {
        Self {
            id: TaskId::new(),
            poster_id,
            doer_id: None,
            title,
            description,
            fee_amount,
            status: TaskStatus::Posted,
            created_at: Utc::now(),
            accepted_at: None,
            completed_at: None,
        }
    }
}

/// Parameters for posting a new task.
#[derive(Debug, Clone, Deserialize)]
pub struct NewTask {
    pub title: String,
    #[serde(default)]
    pub description: String,
    pub fee_amount: Amount,
}

/// Outcome of an atomic conditional update.
#[derive(Debug, Clone)]
pub enum CasOutcome {
    /// The expected prior state held and the update was applied.
    Applied(Task),
    /// The task changed under the caller; carries the current state.
    Stale(Task),
}

/// Task persistence with compare-and-swap transitions.
///
/// The store owns the synchronization: `try_accept` and `try_transition`
/// are single atomic conditional updates keyed on the expected prior
/// status, standing in for `UPDATE ... WHERE status = ...` row semantics.
#[async_trait]
pub trait TaskStore: Send + Sync {
    async fn insert(&self, task: Task) -> Result<()>;
    async fn get(&self, task_id: TaskId) -> Result<Option<Task>>;

    /// Accept if and only if still POSTED and doer unset.
    async fn try_accept(&self, task_id: TaskId, doer: UserId) -> Result<CasOutcome>;

    /// Transition if and only if the status is still `expected`.
    async fn try_transition(
        &self,
        task_id: TaskId,
        expected: TaskStatus,
        next: TaskStatus,
    ) -> Result<CasOutcome>;

    async fn by_poster(&self, poster: UserId) -> Result<Vec<Task>>;
    async fn by_doer(&self, doer: UserId) -> Result<Vec<Task>>;
    async fn open_tasks(&self, limit: usize) -> Result<Vec<Task>>;
}

/// In-memory task store. One lock, one critical section per operation.
pub struct MemoryTaskStore {
    state: RwLock<TaskState>,
}

#[derive(Default)]
struct TaskState {
    tasks: HashMap<TaskId, Task>,
    order: Vec<TaskId>,
}

impl Default for MemoryTaskStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryTaskStore {
    pub fn new() -> Self {
        Self {
            state: RwLock::new(TaskState::default()),
        }
    }
}

#[async_trait]
impl TaskStore for MemoryTaskStore {
    async fn insert(&self, task: Task) -> Result<()> {
        let mut state = self.state.write().await;
        info!(task_id = %task.id, poster = %task.poster_id, fee = %task.fee_amount, "✨ Task posted");
        state.order.push(task.id);
        state.tasks.insert(task.id, task);
        Ok(())
    }

    async fn get(&self, task_id: TaskId) -> Result<Option<Task>> {
        let state = self.state.read().await;
        Ok(state.tasks.get(&task_id).cloned())
    }

    async fn try_accept(&self, task_id: TaskId, doer: UserId) -> Result<CasOutcome> {
        let mut state = self.state.write().await;
        let task = state
            .tasks
            .get_mut(&task_id)
            .ok_or_else(|| EscrowError::NotFound(format!("task {}", task_id)))?;

        if task.status != TaskStatus::Posted || task.doer_id.is_some() {
            return Ok(CasOutcome::Stale(task.clone()));
        }

        task.status = TaskStatus::Accepted;
        task.doer_id = Some(doer);
        task.accepted_at = Some(Utc::now());
        info!(task_id = %task_id, doer = %doer, "📌 Task accepted");
        Ok(CasOutcome::Applied(task.clone()))
    }

    async fn try_transition(
        &self,
        task_id: TaskId,
        expected: TaskStatus,
        next: TaskStatus,
    ) -> Result<CasOutcome> {
        if !expected.can_transition_to(next) {
            return Err(EscrowError::Integrity(format!(
                "illegal task transition {} -> {}",
                expected, next
            )));
        }

        let mut state = self.state.write().await;
        let task = state
            .tasks
            .get_mut(&task_id)
            .ok_or_else(|| EscrowError::NotFound(format!("task {}", task_id)))?;

        if task.status != expected {
            return Ok(CasOutcome::Stale(task.clone()));
        }

        task.status = next;
        if next == TaskStatus::Completed && task.completed_at.is_none() {
            task.completed_at = Some(Utc::now());
        }
        info!(task_id = %task_id, from = %expected, to = %next, "🔄 Task transitioned");
        Ok(CasOutcome::Applied(task.clone()))
    }

    async fn by_poster(&self, poster: UserId) -> Result<Vec<Task>> {
        let state = self.state.read().await;
        Ok(state
            .order
            .iter()
            .rev()
            .filter_map(|id| state.tasks.get(id))
            .filter(|t| t.poster_id == poster)
            .cloned()
            .collect())
    }

    async fn by_doer(&self, doer: UserId) -> Result<Vec<Task>> {
        let state = self.state.read().await;
        Ok(state
            .order
            .iter()
            .rev()
            .filter_map(|id| state.tasks.get(id))
            .filter(|t| t.doer_id == Some(doer))
            .cloned()
            .collect())
    }

    async fn open_tasks(&self, limit: usize) -> Result<Vec<Task>> {
        let state = self.state.read().await;
        Ok(state
            .order
            .iter()
            .rev()
            .filter_map(|id| state.tasks.get(id))
            .filter(|t| t.status == TaskStatus::Posted)
            .take(limit)
            .cloned()
            .collect())
    }
}
