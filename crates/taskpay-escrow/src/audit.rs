use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use taskpay_ledger::{TaskId, UserId};

use crate::task::TaskStatus;

/// Audit record of an admin manual resolution.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdminAction {
    pub admin_id: UserId,
    pub action_type: String,
    pub task_id: TaskId,
    pub resolution: TaskStatus,
    pub reason: String,
    pub recorded_at: DateTime<Utc>,
}

impl AdminAction {
    pub fn task_resolution(
        admin_id: UserId,
        task_id: TaskId,
        resolution: TaskStatus,
        reason: String,
    ) -> Self {
        Self {
            admin_id,
            action_type: "TASK_RESOLUTION".to_string(),
            task_id,
            resolution,
            reason,
            recorded_at: Utc::now(),
        }
    }
}

/// Whether the audit side-channel write landed. Audit failure is a
/// deliberate degraded mode: the resolution itself stands, the caller is
/// told the record is missing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "status", content = "detail")]
pub enum AuditOutcome {
    Recorded,
    Degraded(String),
}

impl AuditOutcome {
    pub fn is_degraded(&self) -> bool {
        matches!(self, Self::Degraded(_))
    }
}

/// Best-effort sink for admin action records.
#[async_trait]
pub trait AuditSink: Send + Sync {
    async fn record(&self, action: AdminAction) -> std::result::Result<(), String>;
}

/// In-memory audit log.
pub struct MemoryAuditLog {
    actions: RwLock<Vec<AdminAction>>,
}

impl Default for MemoryAuditLog {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryAuditLog {
    pub fn new() -> Self {
        Self {
            actions: RwLock::new(Vec::new()),
        }
    }

    pub async fn actions(&self) -> Vec<AdminAction> {
        self.actions.read().await.clone()
    }
}

#[async_trait]
impl AuditSink for MemoryAuditLog {
    async fn record(&self, action: AdminAction) -> std::result::Result<(), String> {
        self.actions.write().await.push(action);
        Ok(())
    }
}
