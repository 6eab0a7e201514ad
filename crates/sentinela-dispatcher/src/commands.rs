//! The inbound command surface (§6). These are plain data records — the
//! chat adapter constructs them from whatever it receives and hands them
//! to [`crate::Dispatcher`]; no behavior lives here.

use chrono::{DateTime, Utc};
use serde_json::Value;
use std::collections::HashMap;
use uuid::Uuid;

pub struct StartCpfVerification {
    pub user_id: i64,
    pub username: String,
    pub user_mention: String,
    pub verification_type: String,
    pub source_action: Option<String>,
}

pub struct SubmitCpfForVerification {
    pub user_id: i64,
    pub username: String,
    pub cpf: String,
}

pub struct CancelCpfVerification {
    pub user_id: i64,
    pub reason: String,
}

pub struct ResolveCpfDuplicate {
    pub verification_id: Uuid,
    pub primary_user_id: i64,
    pub duplicate_user_ids: Vec<i64>,
    pub resolution: String,
}

pub struct StartSupportConversation {
    pub user_id: i64,
    pub username: String,
    pub user_mention: String,
}

pub struct SelectCategory {
    pub user_id: i64,
    pub category: String,
}

pub struct SelectGame {
    pub user_id: i64,
    pub game: String,
    pub custom_name: Option<String>,
}

pub struct SelectTiming {
    pub user_id: i64,
    pub timing: String,
}

pub struct SetDescription {
    pub user_id: i64,
    pub description: String,
}

pub struct AddAttachment {
    pub user_id: i64,
    pub file_id: String,
    pub filename: String,
    pub file_path: String,
    pub file_size: i64,
}

pub struct ConfirmAndCreateTicket {
    pub user_id: i64,
    pub username: String,
}

/// `max_retries`/`scheduled_at` fall back to the scheduler's configured
/// defaults when absent. `timeout_seconds` is accepted for parity with the
/// inbound surface but the scheduler does not yet support a per-request
/// override — every job uses the engine's configured default timeout.
pub struct ScheduleHubsoftIntegration {
    pub integration_type: String,
    pub priority: String,
    pub payload: Value,
    pub scheduled_at: Option<DateTime<Utc>>,
    pub metadata: HashMap<String, Value>,
    pub max_retries: Option<u32>,
    pub timeout_seconds: Option<u64>,
}

pub struct SyncTicketToUpstream {
    pub ticket_id: i64,
}

pub struct VerifyUserInUpstream {
    pub user_id: i64,
    pub cpf: String,
}

pub struct FetchClientDataFromUpstream {
    pub cpf: String,
}

pub struct UpdateTicketStatusInUpstream {
    pub ticket_id: i64,
    pub status: String,
    pub resolution_notes: Option<String>,
}

/// `batch_size`/`inter_batch_delay_ms` fall back to the dispatcher's
/// defaults when absent.
pub struct BulkSyncTicketsToUpstream {
    pub ticket_ids: Vec<i64>,
    pub batch_size: Option<usize>,
    pub inter_batch_delay_ms: Option<u64>,
}

pub struct CancelIntegration {
    pub integration_id: Uuid,
}

pub struct UpdateIntegrationPriority {
    pub integration_id: Uuid,
    pub priority: String,
}

pub struct GetIntegrationStatus {
    pub integration_id: Uuid,
}
