//! Domain event catalogue (§3, §4.5).

use chrono::{DateTime, Utc};
use sentinela_common::{ConversationId, IntegrationId, TicketId, UserId, VerificationId};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Discriminant used for per-type subscriber dispatch. `DomainEvent`
/// itself carries the payload; `EventKind` is what `subscribe` keys on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventKind {
    VerificationStarted,
    VerificationAttemptMade,
    VerificationCompleted,
    VerificationFailed,
    VerificationExpired,
    VerificationCancelled,
    CpfDuplicateDetected,
    CpfRemapped,
    TicketCreated,
    TicketAssigned,
    TicketStatusChanged,
    TicketSyncedWithUpstream,
    TicketClosed,
    TicketReopened,
    TicketUrgencyElevated,
    UserRegistered,
    UserBanned,
    UserUnbanned,
    ConversationStarted,
    ConversationStepCompleted,
    ConversationCompleted,
    ConversationCancelled,
    ConversationTimedOut,
    TechNotificationRequired,
    AdminNotificationRequired,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum DomainEvent {
    VerificationStarted {
        event_id: Uuid,
        occurred_at: DateTime<Utc>,
        verification_id: VerificationId,
        user_id: UserId,
    },
    VerificationAttemptMade {
        event_id: Uuid,
        occurred_at: DateTime<Utc>,
        verification_id: VerificationId,
        success: bool,
        reason: Option<String>,
    },
    VerificationCompleted {
        event_id: Uuid,
        occurred_at: DateTime<Utc>,
        verification_id: VerificationId,
        user_id: UserId,
    },
    VerificationFailed {
        event_id: Uuid,
        occurred_at: DateTime<Utc>,
        verification_id: VerificationId,
        reason: String,
        attempt_count: u32,
    },
    VerificationExpired {
        event_id: Uuid,
        occurred_at: DateTime<Utc>,
        verification_id: VerificationId,
    },
    VerificationCancelled {
        event_id: Uuid,
        occurred_at: DateTime<Utc>,
        verification_id: VerificationId,
        reason: String,
    },
    CpfDuplicateDetected {
        event_id: Uuid,
        occurred_at: DateTime<Utc>,
        verification_id: VerificationId,
        cpf_hash: String,
        duplicate_user_ids: Vec<UserId>,
        risk_level: String,
    },
    CpfRemapped {
        event_id: Uuid,
        occurred_at: DateTime<Utc>,
        primary_user_id: UserId,
        deactivated_user_ids: Vec<UserId>,
    },
    TicketCreated {
        event_id: Uuid,
        occurred_at: DateTime<Utc>,
        ticket_id: TicketId,
        owner_id: UserId,
    },
    TicketAssigned {
        event_id: Uuid,
        occurred_at: DateTime<Utc>,
        ticket_id: TicketId,
        assignee: String,
    },
    TicketStatusChanged {
        event_id: Uuid,
        occurred_at: DateTime<Utc>,
        ticket_id: TicketId,
        from: String,
        to: String,
    },
    TicketSyncedWithUpstream {
        event_id: Uuid,
        occurred_at: DateTime<Utc>,
        ticket_id: TicketId,
        upstream_id: String,
        protocol: String,
    },
    TicketClosed {
        event_id: Uuid,
        occurred_at: DateTime<Utc>,
        ticket_id: TicketId,
    },
    TicketReopened {
        event_id: Uuid,
        occurred_at: DateTime<Utc>,
        ticket_id: TicketId,
    },
    TicketUrgencyElevated {
        event_id: Uuid,
        occurred_at: DateTime<Utc>,
        ticket_id: TicketId,
        from: String,
        to: String,
    },
    UserRegistered {
        event_id: Uuid,
        occurred_at: DateTime<Utc>,
        user_id: UserId,
    },
    UserBanned {
        event_id: Uuid,
        occurred_at: DateTime<Utc>,
        user_id: UserId,
        reason: String,
    },
    UserUnbanned {
        event_id: Uuid,
        occurred_at: DateTime<Utc>,
        user_id: UserId,
    },
    ConversationStarted {
        event_id: Uuid,
        occurred_at: DateTime<Utc>,
        conversation_id: ConversationId,
        user_id: UserId,
    },
    ConversationStepCompleted {
        event_id: Uuid,
        occurred_at: DateTime<Utc>,
        conversation_id: ConversationId,
        step: u8,
    },
    ConversationCompleted {
        event_id: Uuid,
        occurred_at: DateTime<Utc>,
        conversation_id: ConversationId,
        ticket_id: TicketId,
    },
    ConversationCancelled {
        event_id: Uuid,
        occurred_at: DateTime<Utc>,
        conversation_id: ConversationId,
        reason: String,
    },
    ConversationTimedOut {
        event_id: Uuid,
        occurred_at: DateTime<Utc>,
        conversation_id: ConversationId,
    },
    TechNotificationRequired {
        event_id: Uuid,
        occurred_at: DateTime<Utc>,
        message: String,
        context: serde_json::Value,
    },
    AdminNotificationRequired {
        event_id: Uuid,
        occurred_at: DateTime<Utc>,
        message: String,
        context: serde_json::Value,
    },
    // IntegrationRequest lifecycle events, used by the scheduler (§4.6).
    IntegrationCompleted {
        event_id: Uuid,
        occurred_at: DateTime<Utc>,
        integration_id: IntegrationId,
    },
    IntegrationFailed {
        event_id: Uuid,
        occurred_at: DateTime<Utc>,
        integration_id: IntegrationId,
        error_code: String,
    },
}

impl DomainEvent {
    pub fn kind(&self) -> EventKind {
        match self {
            DomainEvent::VerificationStarted { .. } => EventKind::VerificationStarted,
            DomainEvent::VerificationAttemptMade { .. } => EventKind::VerificationAttemptMade,
            DomainEvent::VerificationCompleted { .. } => EventKind::VerificationCompleted,
            DomainEvent::VerificationFailed { .. } => EventKind::VerificationFailed,
            DomainEvent::VerificationExpired { .. } => EventKind::VerificationExpired,
            DomainEvent::VerificationCancelled { .. } => EventKind::VerificationCancelled,
            DomainEvent::CpfDuplicateDetected { .. } => EventKind::CpfDuplicateDetected,
            DomainEvent::CpfRemapped { .. } => EventKind::CpfRemapped,
            DomainEvent::TicketCreated { .. } => EventKind::TicketCreated,
            DomainEvent::TicketAssigned { .. } => EventKind::TicketAssigned,
            DomainEvent::TicketStatusChanged { .. } => EventKind::TicketStatusChanged,
            DomainEvent::TicketSyncedWithUpstream { .. } => EventKind::TicketSyncedWithUpstream,
            DomainEvent::TicketClosed { .. } => EventKind::TicketClosed,
            DomainEvent::TicketReopened { .. } => EventKind::TicketReopened,
            DomainEvent::TicketUrgencyElevated { .. } => EventKind::TicketUrgencyElevated,
            DomainEvent::UserRegistered { .. } => EventKind::UserRegistered,
            DomainEvent::UserBanned { .. } => EventKind::UserBanned,
            DomainEvent::UserUnbanned { .. } => EventKind::UserUnbanned,
            DomainEvent::ConversationStarted { .. } => EventKind::ConversationStarted,
            DomainEvent::ConversationStepCompleted { .. } => EventKind::ConversationStepCompleted,
            DomainEvent::ConversationCompleted { .. } => EventKind::ConversationCompleted,
            DomainEvent::ConversationCancelled { .. } => EventKind::ConversationCancelled,
            DomainEvent::ConversationTimedOut { .. } => EventKind::ConversationTimedOut,
            DomainEvent::TechNotificationRequired { .. } => EventKind::TechNotificationRequired,
            DomainEvent::AdminNotificationRequired { .. } => EventKind::AdminNotificationRequired,
            // Integration lifecycle events reuse the tech-notification kind bucket for
            // generic subscribers; callers that care subscribe to them specifically via
            // their own EventKind entries below.
            DomainEvent::IntegrationCompleted { .. } => EventKind::TechNotificationRequired,
            DomainEvent::IntegrationFailed { .. } => EventKind::TechNotificationRequired,
        }
    }

    pub fn event_id(&self) -> Uuid {
        match self {
            DomainEvent::VerificationStarted { event_id, .. }
            | DomainEvent::VerificationAttemptMade { event_id, .. }
            | DomainEvent::VerificationCompleted { event_id, .. }
            | DomainEvent::VerificationFailed { event_id, .. }
            | DomainEvent::VerificationExpired { event_id, .. }
            | DomainEvent::VerificationCancelled { event_id, .. }
            | DomainEvent::CpfDuplicateDetected { event_id, .. }
            | DomainEvent::CpfRemapped { event_id, .. }
            | DomainEvent::TicketCreated { event_id, .. }
            | DomainEvent::TicketAssigned { event_id, .. }
            | DomainEvent::TicketStatusChanged { event_id, .. }
            | DomainEvent::TicketSyncedWithUpstream { event_id, .. }
            | DomainEvent::TicketClosed { event_id, .. }
            | DomainEvent::TicketReopened { event_id, .. }
            | DomainEvent::TicketUrgencyElevated { event_id, .. }
            | DomainEvent::UserRegistered { event_id, .. }
            | DomainEvent::UserBanned { event_id, .. }
            | DomainEvent::UserUnbanned { event_id, .. }
            | DomainEvent::ConversationStarted { event_id, .. }
            | DomainEvent::ConversationStepCompleted { event_id, .. }
            | DomainEvent::ConversationCompleted { event_id, .. }
            | DomainEvent::ConversationCancelled { event_id, .. }
            | DomainEvent::ConversationTimedOut { event_id, .. }
            | DomainEvent::TechNotificationRequired { event_id, .. }
            | DomainEvent::AdminNotificationRequired { event_id, .. }
            | DomainEvent::IntegrationCompleted { event_id, .. }
            | DomainEvent::IntegrationFailed { event_id, .. } => *event_id,
        }
    }
}
