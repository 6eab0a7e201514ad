//! The `Ticket` aggregate (§3, §4.4).

use crate::category::{GameTitle, ProblemTiming, TicketCategory};
use crate::protocol::Protocol;
use chrono::{DateTime, Utc};
use sentinela_common::{EngineError, TicketId, UserId};
use serde::{Deserialize, Serialize};

pub const MAX_ATTACHMENTS: usize = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TicketStatus {
    Pending,
    Open,
    InProgress,
    Resolved,
    Closed,
    Cancelled,
}

impl TicketStatus {
    pub fn from_str(s: &str) -> Result<Self, EngineError> {
        match s {
            "pending" => Ok(Self::Pending),
            "open" => Ok(Self::Open),
            "in_progress" => Ok(Self::InProgress),
            "resolved" => Ok(Self::Resolved),
            "closed" => Ok(Self::Closed),
            "cancelled" => Ok(Self::Cancelled),
            _ => Err(EngineError::validation("invalid_transition", "status de ticket inválido")),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Open => "open",
            Self::InProgress => "in_progress",
            Self::Resolved => "resolved",
            Self::Closed => "closed",
            Self::Cancelled => "cancelled",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Closed | Self::Cancelled)
    }

    /// The status transition graph from §3: only these edges are legal.
    fn can_transition_to(&self, next: TicketStatus) -> bool {
        use TicketStatus::*;
        matches!(
            (self, next),
            (Pending, Open) | (Pending, InProgress) | (Pending, Cancelled)
                | (Open, InProgress) | (Open, Resolved) | (Open, Cancelled)
                | (InProgress, Resolved) | (InProgress, Cancelled) | (InProgress, Pending)
                | (Resolved, Closed) | (Resolved, Open)
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum UrgencyLevel {
    Low,
    Normal,
    High,
    Critical,
}

impl UrgencyLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Normal => "normal",
            Self::High => "high",
            Self::Critical => "critical",
        }
    }

    fn elevated(&self) -> Self {
        match self {
            Self::Low => Self::Normal,
            Self::Normal => Self::High,
            Self::High => Self::Critical,
            Self::Critical => Self::Critical,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TicketAttachment {
    pub file_id: String,
    pub filename: String,
    pub file_path: String,
    pub file_size: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TicketMessage {
    pub author: String,
    pub content: String,
    pub timestamp: DateTime<Utc>,
    pub is_internal: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum SyncStatus {
    Pending,
    Synced,
    Failed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Ticket {
    pub id: TicketId,
    pub owner_id: UserId,
    pub owner_username: String,
    pub category: TicketCategory,
    pub affected_game: GameTitle,
    pub problem_timing: ProblemTiming,
    pub description: String,
    pub urgency: UrgencyLevel,
    pub status: TicketStatus,
    pub assignee: Option<String>,
    pub resolution_notes: Option<String>,
    pub upstream_id: Option<String>,
    pub protocol: Option<Protocol>,
    pub sync_status: SyncStatus,
    pub sync_error: Option<String>,
    pub attachments: Vec<TicketAttachment>,
    pub messages: Vec<TicketMessage>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub resolved_at: Option<DateTime<Utc>>,
}

impl Ticket {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        id: TicketId,
        owner_id: UserId,
        owner_username: impl Into<String>,
        category: TicketCategory,
        affected_game: GameTitle,
        problem_timing: ProblemTiming,
        description: String,
        urgency: UrgencyLevel,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            owner_id,
            owner_username: owner_username.into(),
            category,
            affected_game,
            problem_timing,
            description,
            urgency,
            status: TicketStatus::Pending,
            assignee: None,
            resolution_notes: None,
            upstream_id: None,
            protocol: None,
            sync_status: SyncStatus::Pending,
            sync_error: None,
            attachments: Vec::new(),
            messages: Vec::new(),
            created_at: now,
            updated_at: now,
            resolved_at: None,
        }
    }

    pub fn display_protocol(&self) -> String {
        match &self.protocol {
            Some(p) => p.display().to_string(),
            None => Protocol::local(self.id).display().to_string(),
        }
    }

    pub fn assign(&mut self, technician: impl Into<String>, now: DateTime<Utc>) -> Result<(), EngineError> {
        if self.status.is_terminal() || self.status == TicketStatus::Resolved {
            return Err(EngineError::business_rule("invalid_transition", "não é possível atribuir ticket finalizado"));
        }
        self.assignee = Some(technician.into());
        if self.status == TicketStatus::Pending {
            self.change_status(TicketStatus::InProgress, now)?;
        } else {
            self.updated_at = now;
        }
        Ok(())
    }

    pub fn change_status(&mut self, next: TicketStatus, now: DateTime<Utc>) -> Result<(), EngineError> {
        if !self.status.can_transition_to(next) {
            return Err(EngineError::business_rule(
                "invalid_transition",
                format!("transição inválida: {} → {}", self.status.as_str(), next.as_str()),
            ));
        }
        self.status = next;
        if next == TicketStatus::Resolved {
            self.resolved_at = Some(now);
        }
        self.updated_at = now;
        Ok(())
    }

    pub fn add_attachment(&mut self, attachment: TicketAttachment, now: DateTime<Utc>) -> Result<(), EngineError> {
        if self.attachments.len() >= MAX_ATTACHMENTS {
            return Err(EngineError::business_rule("conversation_step_mismatch", "limite de anexos excedido"));
        }
        self.attachments.push(attachment);
        self.updated_at = now;
        Ok(())
    }

    pub fn add_message(&mut self, author: impl Into<String>, content: impl Into<String>, is_internal: bool, now: DateTime<Utc>) {
        self.messages.push(TicketMessage {
            author: author.into(),
            content: content.into(),
            timestamp: now,
            is_internal,
        });
        self.updated_at = now;
    }

    pub fn sync_with_upstream(&mut self, upstream_id: impl Into<String>, protocol: Protocol, now: DateTime<Utc>) {
        self.upstream_id = Some(upstream_id.into());
        self.protocol = Some(protocol);
        self.sync_status = SyncStatus::Synced;
        self.sync_error = None;
        self.updated_at = now;
    }

    pub fn mark_sync_failed(&mut self, error: impl Into<String>, now: DateTime<Utc>) {
        self.sync_status = SyncStatus::Failed;
        self.sync_error = Some(error.into());
        self.updated_at = now;
    }

    pub fn elevate_urgency(&mut self, now: DateTime<Utc>) {
        let next = self.urgency.elevated();
        if next != self.urgency {
            self.urgency = next;
            self.updated_at = now;
        }
    }

    pub fn close_with_resolution(&mut self, notes: impl Into<String>, now: DateTime<Utc>) -> Result<(), EngineError> {
        if self.status != TicketStatus::Resolved {
            return Err(EngineError::business_rule("invalid_transition", "ticket deve estar resolvido antes de fechar"));
        }
        self.resolution_notes = Some(notes.into());
        self.change_status(TicketStatus::Closed, now)
    }

    pub fn cancel(&mut self, reason: impl Into<String>, now: DateTime<Utc>) -> Result<(), EngineError> {
        if matches!(self.status, TicketStatus::Resolved | TicketStatus::Closed | TicketStatus::Cancelled) {
            return Err(EngineError::business_rule("invalid_transition", "não é possível cancelar ticket já finalizado"));
        }
        self.resolution_notes = Some(format!("Cancelado: {}", reason.into()));
        self.change_status(TicketStatus::Cancelled, now)
    }

    pub fn needs_sync(&self) -> bool {
        matches!(self.sync_status, SyncStatus::Pending | SyncStatus::Failed) && self.upstream_id.is_none()
    }
}
