//! The `SupportConversation` aggregate (§3, §4.4).

use crate::category::{GameTitle, ProblemTiming, TicketCategory};
use crate::ticket::TicketAttachment;
use chrono::{DateTime, Duration, Utc};
use sentinela_common::{ConversationId, EngineError, TicketId, UserId};
use serde::{Deserialize, Serialize};

pub const MAX_ATTACHMENTS: usize = 3;
pub const MIN_DESCRIPTION_LEN: usize = 10;
pub const IDLE_TIMEOUT_MINUTES: i64 = 30;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConversationState {
    CategorySelection,
    GameSelection,
    TimingSelection,
    DescriptionInput,
    AttachmentsOptional,
    Confirmation,
    Completed,
    Cancelled,
}

impl ConversationState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Cancelled)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FormData {
    pub category: Option<TicketCategory>,
    pub game: Option<GameTitle>,
    pub timing: Option<ProblemTiming>,
    pub description: Option<String>,
    pub attachments: Vec<TicketAttachment>,
}

impl FormData {
    fn is_complete(&self) -> bool {
        self.category.is_some() && self.game.is_some() && self.timing.is_some() && self.description.is_some()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SupportConversation {
    pub id: ConversationId,
    pub user_id: UserId,
    pub username: String,
    pub state: ConversationState,
    pub current_step: u8,
    pub form: FormData,
    pub is_active: bool,
    pub ticket_id: Option<TicketId>,
    pub created_at: DateTime<Utc>,
    pub last_activity_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl SupportConversation {
    pub fn new(id: ConversationId, user_id: UserId, username: impl Into<String>, now: DateTime<Utc>) -> Self {
        Self {
            id,
            user_id,
            username: username.into(),
            state: ConversationState::CategorySelection,
            current_step: 1,
            form: FormData::default(),
            is_active: true,
            ticket_id: None,
            created_at: now,
            last_activity_at: now,
            completed_at: None,
        }
    }

    pub fn is_idle(&self, now: DateTime<Utc>) -> bool {
        self.is_active && now - self.last_activity_at > Duration::minutes(IDLE_TIMEOUT_MINUTES)
    }

    fn require_step(&self, step: u8) -> Result<(), EngineError> {
        if self.current_step != step {
            return Err(EngineError::business_rule("conversation_step_mismatch", "passo da conversa fora de ordem"));
        }
        Ok(())
    }

    fn advance(&mut self, step: u8, state: ConversationState, now: DateTime<Utc>) {
        self.current_step = step;
        self.state = state;
        self.last_activity_at = now;
    }

    pub fn select_category(&mut self, category: TicketCategory, now: DateTime<Utc>) -> Result<(), EngineError> {
        self.require_step(1)?;
        self.form.category = Some(category);
        self.advance(2, ConversationState::GameSelection, now);
        Ok(())
    }

    pub fn select_game(&mut self, game: GameTitle, now: DateTime<Utc>) -> Result<(), EngineError> {
        self.require_step(2)?;
        self.form.game = Some(game);
        self.advance(3, ConversationState::TimingSelection, now);
        Ok(())
    }

    pub fn select_timing(&mut self, timing: ProblemTiming, now: DateTime<Utc>) -> Result<(), EngineError> {
        self.require_step(3)?;
        self.form.timing = Some(timing);
        self.advance(4, ConversationState::DescriptionInput, now);
        Ok(())
    }

    pub fn set_description(&mut self, description: &str, now: DateTime<Utc>) -> Result<(), EngineError> {
        self.require_step(4)?;
        let trimmed = description.trim();
        if trimmed.len() < MIN_DESCRIPTION_LEN {
            return Err(EngineError::validation(
                "conversation_step_mismatch",
                format!("descrição deve ter pelo menos {} caracteres", MIN_DESCRIPTION_LEN),
            ));
        }
        self.form.description = Some(trimmed.to_string());
        self.advance(5, ConversationState::AttachmentsOptional, now);
        Ok(())
    }

    pub fn add_attachment(&mut self, attachment: TicketAttachment, now: DateTime<Utc>) -> Result<(), EngineError> {
        self.require_step(5)?;
        if self.form.attachments.len() >= MAX_ATTACHMENTS {
            return Err(EngineError::business_rule("conversation_step_mismatch", "limite de anexos excedido"));
        }
        self.form.attachments.push(attachment);
        self.last_activity_at = now;
        Ok(())
    }

    pub fn skip_attachments(&mut self, now: DateTime<Utc>) -> Result<(), EngineError> {
        self.require_step(5)?;
        self.advance(6, ConversationState::Confirmation, now);
        Ok(())
    }

    pub fn proceed_to_confirmation(&mut self, now: DateTime<Utc>) -> Result<(), EngineError> {
        self.require_step(5)?;
        self.advance(6, ConversationState::Confirmation, now);
        Ok(())
    }

    /// Returns the completed form, leaving the conversation Completed.
    /// The caller (the use case) builds the `Ticket` from the returned
    /// form and records `ticket_id` via `complete`.
    pub fn take_form_for_ticket(&self) -> Result<FormData, EngineError> {
        self.require_step(6)?;
        if !self.form.is_complete() {
            return Err(EngineError::business_rule("conversation_step_mismatch", "formulário incompleto"));
        }
        Ok(self.form.clone())
    }

    pub fn complete(&mut self, ticket_id: TicketId, now: DateTime<Utc>) {
        self.ticket_id = Some(ticket_id);
        self.state = ConversationState::Completed;
        self.is_active = false;
        self.completed_at = Some(now);
    }

    pub fn cancel(&mut self, now: DateTime<Utc>) -> Result<(), EngineError> {
        if !self.is_active {
            return Err(EngineError::business_rule("conversation_step_mismatch", "conversa já foi finalizada"));
        }
        self.state = ConversationState::Cancelled;
        self.is_active = false;
        self.completed_at = Some(now);
        Ok(())
    }
}
