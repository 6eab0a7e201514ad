//! Upstream client contract (§4.8).

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Debug, Clone, thiserror::Error)]
#[error("{code}: {message}")]
pub struct UpstreamError {
    pub status_code: Option<u16>,
    pub code: String,
    pub message: String,
    pub retryable: bool,
    pub retry_after: Option<Duration>,
}

impl UpstreamError {
    pub fn connection(message: impl Into<String>) -> Self {
        Self {
            status_code: None,
            code: "upstream_unavailable".to_string(),
            message: message.into(),
            retryable: true,
            retry_after: None,
        }
    }

    pub fn timeout() -> Self {
        Self {
            status_code: None,
            code: "upstream_unavailable".to_string(),
            message: "request timed out".to_string(),
            retryable: true,
            retry_after: None,
        }
    }

    pub fn from_status(status: u16, message: impl Into<String>, retry_after: Option<Duration>) -> Self {
        let (code, retryable) = match status {
            429 => ("upstream_rate_limited", true),
            404 => ("upstream_not_found", false),
            409 => ("upstream_conflict", false),
            s if s >= 500 => ("upstream_unavailable", true),
            _ => ("upstream_unavailable", false),
        };
        Self {
            status_code: Some(status),
            code: code.to_string(),
            message: message.into(),
            retryable,
            retry_after,
        }
    }
}

/// Upstream's view of a customer and their service. `servico_status`
/// is checked case-insensitively for the substring "habilitado" by the
/// verification engine, matching the original field semantics verbatim.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientRecord {
    pub nome_razaosocial: String,
    pub servico_status: String,
    pub servico_nome: Option<String>,
    pub servico_id: Option<String>,
    pub contracts: Vec<Contract>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Contract {
    pub id: String,
    pub status: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TicketPayload {
    pub cpf: String,
    pub category: String,
    pub description: String,
    pub urgency: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TicketSyncResult {
    pub upstream_id: String,
    pub protocol: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TicketPatch {
    pub status: Option<String>,
    pub resolution_notes: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TicketStatusSnapshot {
    pub upstream_id: String,
    pub status: String,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TicketSummary {
    pub upstream_id: String,
    pub protocol: String,
    pub status: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthReport {
    pub healthy: bool,
    pub response_time_ms: u64,
}

/// The capabilities the scheduler and verification engine rely on. Every
/// call may fail with a [`UpstreamError`] carrying its retryability; the
/// scheduler uses that flag to decide whether to retry (§4.6).
#[async_trait]
pub trait UpstreamClient: Send + Sync {
    async fn verify_client_by_cpf(
        &self,
        cpf: &str,
        include_contracts: bool,
    ) -> Result<Option<ClientRecord>, UpstreamError>;

    async fn create_ticket(&self, payload: &TicketPayload) -> Result<TicketSyncResult, UpstreamError>;

    async fn update_ticket(&self, upstream_id: &str, patch: &TicketPatch) -> Result<(), UpstreamError>;

    async fn get_ticket_status(&self, upstream_id: &str) -> Result<TicketStatusSnapshot, UpstreamError>;

    async fn search_tickets_by_cpf(
        &self,
        cpf: &str,
        limit: usize,
    ) -> Result<Vec<TicketSummary>, UpstreamError>;

    async fn get_client_contracts(&self, cpf: &str) -> Result<Vec<Contract>, UpstreamError>;

    async fn check_health(&self) -> Result<HealthReport, UpstreamError>;
}
