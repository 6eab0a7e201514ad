//! The `IntegrationRequest` aggregate (§3, §4.6).

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sentinela_common::{EngineError, IntegrationId, SystemError};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum IntegrationType {
    TicketSync,
    UserVerification,
    ClientDataFetch,
    BulkSync,
    StatusUpdate,
}

impl IntegrationType {
    pub fn from_str(s: &str) -> Result<Self, EngineError> {
        match s {
            "ticket_sync" => Ok(Self::TicketSync),
            "user_verification" => Ok(Self::UserVerification),
            "client_data_fetch" => Ok(Self::ClientDataFetch),
            "bulk_sync" => Ok(Self::BulkSync),
            "status_update" => Ok(Self::StatusUpdate),
            _ => Err(EngineError::validation("invalid_sync_type", "tipo de integração inválido")),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::TicketSync => "ticket_sync",
            Self::UserVerification => "user_verification",
            Self::ClientDataFetch => "client_data_fetch",
            Self::BulkSync => "bulk_sync",
            Self::StatusUpdate => "status_update",
        }
    }
}

/// Lower value sorts first out of the queue; `Critical` is highest priority.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Priority {
    Critical,
    High,
    Normal,
    Low,
}

impl Priority {
    pub fn from_str(s: &str) -> Result<Self, EngineError> {
        match s {
            "critical" => Ok(Self::Critical),
            "high" => Ok(Self::High),
            "normal" => Ok(Self::Normal),
            "low" => Ok(Self::Low),
            _ => Err(EngineError::validation("invalid_priority", "prioridade inválida")),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Critical => "critical",
            Self::High => "high",
            Self::Normal => "normal",
            Self::Low => "low",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum IntegrationStatus {
    Pending,
    Scheduled,
    InProgress,
    Completed,
    Failed,
    Cancelled,
}

impl IntegrationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Scheduled => "scheduled",
            Self::InProgress => "in_progress",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Cancelled)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IntegrationAttempt {
    pub attempt_number: u32,
    pub occurred_at: DateTime<Utc>,
    pub error_code: String,
    pub error_message: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IntegrationRequest {
    pub id: IntegrationId,
    pub integration_type: IntegrationType,
    pub priority: Priority,
    pub status: IntegrationStatus,
    pub payload: Value,
    pub metadata: HashMap<String, Value>,
    pub max_retries: u32,
    pub timeout: chrono::Duration,
    pub scheduled_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub response: Option<Value>,
    pub error_code: Option<String>,
    pub error_message: Option<String>,
    pub attempts: Vec<IntegrationAttempt>,
    pub force_retry: bool,
    pub created_at: DateTime<Utc>,
}

impl IntegrationRequest {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        id: IntegrationId,
        integration_type: IntegrationType,
        priority: Priority,
        payload: Value,
        metadata: HashMap<String, Value>,
        max_retries: u32,
        timeout: chrono::Duration,
        scheduled_at: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            integration_type,
            priority,
            status: IntegrationStatus::Pending,
            payload,
            metadata,
            max_retries,
            timeout,
            scheduled_at,
            started_at: None,
            completed_at: None,
            response: None,
            error_code: None,
            error_message: None,
            attempts: Vec::new(),
            force_retry: false,
            created_at: now,
        }
    }

    pub fn attempt_count(&self) -> u32 {
        self.attempts.len() as u32
    }

    pub fn mark_scheduled(&mut self, scheduled_at: DateTime<Utc>) {
        self.status = IntegrationStatus::Scheduled;
        self.scheduled_at = scheduled_at;
    }

    pub fn mark_in_progress(&mut self, now: DateTime<Utc>) {
        self.status = IntegrationStatus::InProgress;
        self.started_at = Some(now);
    }

    pub fn mark_completed(&mut self, response: Value, now: DateTime<Utc>) {
        self.status = IntegrationStatus::Completed;
        self.response = Some(response);
        self.completed_at = Some(now);
    }

    /// Records a failed attempt. Returns `true` if the request was
    /// rescheduled for retry, `false` if it transitioned to `Failed`.
    pub fn record_failure(&mut self, error_code: &str, error_message: &str, now: DateTime<Utc>) -> bool {
        let attempt_number = self.attempt_count() + 1;
        self.attempts.push(IntegrationAttempt {
            attempt_number,
            occurred_at: now,
            error_code: error_code.to_string(),
            error_message: error_message.to_string(),
        });

        if self.attempt_count() < self.max_retries || self.force_retry {
            let delay_secs = 2u64.saturating_pow(self.attempt_count()).min(60);
            self.status = IntegrationStatus::Scheduled;
            self.scheduled_at = now + chrono::Duration::seconds(delay_secs as i64);
            true
        } else {
            self.status = IntegrationStatus::Failed;
            self.error_code = Some(error_code.to_string());
            self.error_message = Some(error_message.to_string());
            self.completed_at = Some(now);
            false
        }
    }

    pub fn cancel(&mut self, now: DateTime<Utc>) -> Result<(), EngineError> {
        if self.status.is_terminal() {
            return Err(EngineError::business_rule("cancel_error", "integração já finalizada"));
        }
        self.status = IntegrationStatus::Cancelled;
        self.completed_at = Some(now);
        Ok(())
    }

    pub fn update_priority(&mut self, priority: Priority) -> Result<(), EngineError> {
        if self.status.is_terminal() {
            return Err(EngineError::business_rule("schedule_error", "não é possível repriorizar integração finalizada"));
        }
        self.priority = priority;
        Ok(())
    }
}

#[async_trait]
pub trait IntegrationRepository: Send + Sync {
    async fn save(&self, request: &IntegrationRequest) -> Result<(), SystemError>;
    async fn find_by_id(&self, id: IntegrationId) -> Result<Option<IntegrationRequest>, SystemError>;
    async fn find_by_status(&self, status: IntegrationStatus, limit: usize) -> Result<Vec<IntegrationRequest>, SystemError>;
    /// Scheduled/Pending requests whose `scheduled_at` is due, ordered by
    /// (priority, created_at) as the dispatcher loop expects.
    async fn find_due(&self, now: DateTime<Utc>, limit: usize) -> Result<Vec<IntegrationRequest>, SystemError>;
    async fn delete(&self, id: IntegrationId) -> Result<bool, SystemError>;
}

#[cfg(any(test, feature = "test-support"))]
pub mod memory {
    use super::*;
    use parking_lot::Mutex;
    use std::collections::HashMap as StdHashMap;

    #[derive(Default)]
    pub struct InMemoryIntegrationRepository {
        rows: Mutex<StdHashMap<IntegrationId, IntegrationRequest>>,
    }

    impl InMemoryIntegrationRepository {
        pub fn new() -> Self {
            Self::default()
        }
    }

    #[async_trait]
    impl IntegrationRepository for InMemoryIntegrationRepository {
        async fn save(&self, request: &IntegrationRequest) -> Result<(), SystemError> {
            self.rows.lock().insert(request.id, request.clone());
            Ok(())
        }

        async fn find_by_id(&self, id: IntegrationId) -> Result<Option<IntegrationRequest>, SystemError> {
            Ok(self.rows.lock().get(&id).cloned())
        }

        async fn find_by_status(&self, status: IntegrationStatus, limit: usize) -> Result<Vec<IntegrationRequest>, SystemError> {
            let mut out: Vec<_> = self.rows.lock().values().filter(|r| r.status == status).cloned().collect();
            out.truncate(limit);
            Ok(out)
        }

        async fn find_due(&self, now: DateTime<Utc>, limit: usize) -> Result<Vec<IntegrationRequest>, SystemError> {
            let mut out: Vec<_> = self
                .rows
                .lock()
                .values()
                .filter(|r| matches!(r.status, IntegrationStatus::Pending | IntegrationStatus::Scheduled) && r.scheduled_at <= now)
                .cloned()
                .collect();
            out.sort_by(|a, b| a.priority.cmp(&b.priority).then(a.created_at.cmp(&b.created_at)));
            out.truncate(limit);
            Ok(out)
        }

        async fn delete(&self, id: IntegrationId) -> Result<bool, SystemError> {
            Ok(self.rows.lock().remove(&id).is_some())
        }
    }
}
