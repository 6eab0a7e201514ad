//! Use-case operations for the conversation/ticket state machine (§4.4).

use crate::category::{derive_urgency, GameTitle, ProblemTiming, TicketCategory};
use crate::conversation::SupportConversation;
use crate::protocol::Protocol;
use crate::repository::{ConversationRepository, TicketRepository};
use crate::ticket::{Ticket, TicketAttachment, TicketStatus};
use sentinela_common::{details, Clock, EngineError, IdGen, ResultEnvelope, TicketId, UserId};
use sentinela_events::{DomainEvent, EventBus};
use std::sync::Arc;

pub struct ConversationEngine {
    conversations: Arc<dyn ConversationRepository>,
    tickets: Arc<dyn TicketRepository>,
    events: Arc<dyn EventBus>,
    clock: Arc<dyn Clock>,
    ids: Arc<dyn IdGen>,
}

pub struct StartConversationCommand {
    pub user_id: UserId,
    pub username: String,
    pub user_mention: String,
}

pub struct AddAttachmentCommand {
    pub user_id: UserId,
    pub attachment: TicketAttachment,
}

impl ConversationEngine {
    pub fn new(
        conversations: Arc<dyn ConversationRepository>,
        tickets: Arc<dyn TicketRepository>,
        events: Arc<dyn EventBus>,
        clock: Arc<dyn Clock>,
        ids: Arc<dyn IdGen>,
    ) -> Self {
        Self { conversations, tickets, events, clock, ids }
    }

    async fn load_active(&self, user_id: UserId) -> Result<SupportConversation, EngineError> {
        self.conversations
            .find_active_by_user(user_id)
            .await?
            .ok_or_else(|| EngineError::business_rule("conversation_step_mismatch", "nenhuma conversa ativa"))
    }

    pub async fn start_conversation(&self, cmd: StartConversationCommand) -> Result<ResultEnvelope, EngineError> {
        if self.conversations.find_active_by_user(cmd.user_id).await?.is_some() {
            return Err(EngineError::business_rule("conversation_already_active", "já existe uma conversa ativa"));
        }
        let now = self.clock.now();
        let conversation = SupportConversation::new(self.ids.new_conversation_id(), cmd.user_id, cmd.username, now);
        self.conversations.save(&conversation).await?;

        self.events
            .publish(DomainEvent::ConversationStarted {
                event_id: uuid::Uuid::new_v4(),
                occurred_at: now,
                conversation_id: conversation.id,
                user_id: cmd.user_id,
            })
            .await;

        Ok(ResultEnvelope::success(
            "conversa iniciada",
            Some(details!("conversation_id" => conversation.id.to_string())),
        ))
    }

    async fn step_ok(&self, conversation: &SupportConversation) -> Result<ResultEnvelope, EngineError> {
        self.conversations.save(conversation).await?;
        self.events
            .publish(DomainEvent::ConversationStepCompleted {
                event_id: uuid::Uuid::new_v4(),
                occurred_at: self.clock.now(),
                conversation_id: conversation.id,
                step: conversation.current_step,
            })
            .await;
        Ok(ResultEnvelope::success("passo concluído", Some(details!("step" => conversation.current_step))))
    }

    pub async fn select_category(&self, user_id: UserId, category_key: &str) -> Result<ResultEnvelope, EngineError> {
        let mut conversation = self.load_active(user_id).await?;
        let category = TicketCategory::from_str(category_key)?;
        conversation.select_category(category, self.clock.now())?;
        self.step_ok(&conversation).await
    }

    pub async fn select_game(&self, user_id: UserId, game_key: &str, custom_name: Option<String>) -> Result<ResultEnvelope, EngineError> {
        let mut conversation = self.load_active(user_id).await?;
        let game = GameTitle::from_str(game_key, custom_name)?;
        conversation.select_game(game, self.clock.now())?;
        self.step_ok(&conversation).await
    }

    pub async fn select_timing(&self, user_id: UserId, timing_key: &str) -> Result<ResultEnvelope, EngineError> {
        let mut conversation = self.load_active(user_id).await?;
        let timing = ProblemTiming::from_str(timing_key)?;
        conversation.select_timing(timing, self.clock.now())?;
        self.step_ok(&conversation).await
    }

    pub async fn set_description(&self, user_id: UserId, description: &str) -> Result<ResultEnvelope, EngineError> {
        let mut conversation = self.load_active(user_id).await?;
        conversation.set_description(description, self.clock.now())?;
        self.step_ok(&conversation).await
    }

    pub async fn add_attachment(&self, cmd: AddAttachmentCommand) -> Result<ResultEnvelope, EngineError> {
        let mut conversation = self.load_active(cmd.user_id).await?;
        conversation.add_attachment(cmd.attachment, self.clock.now())?;
        self.conversations.save(&conversation).await?;
        Ok(ResultEnvelope::success("anexo adicionado", None))
    }

    pub async fn skip_attachments(&self, user_id: UserId) -> Result<ResultEnvelope, EngineError> {
        let mut conversation = self.load_active(user_id).await?;
        conversation.skip_attachments(self.clock.now())?;
        self.step_ok(&conversation).await
    }

    pub async fn proceed_to_confirmation(&self, user_id: UserId) -> Result<ResultEnvelope, EngineError> {
        let mut conversation = self.load_active(user_id).await?;
        conversation.proceed_to_confirmation(self.clock.now())?;
        self.step_ok(&conversation).await
    }

    pub async fn confirm_and_create_ticket(&self, user_id: UserId, username: &str) -> Result<ResultEnvelope, EngineError> {
        let mut conversation = self.load_active(user_id).await?;
        let form = conversation.take_form_for_ticket()?;
        let now = self.clock.now();

        let category = form.category.expect("form complete checked above");
        let game = form.game.expect("form complete checked above");
        let timing = form.timing.expect("form complete checked above");
        let description = form.description.expect("form complete checked above");
        let urgency = derive_urgency(timing, category);

        let mut ticket = Ticket::new(TicketId(0), user_id, username, category, game, timing, description, urgency, now);
        for attachment in form.attachments {
            ticket.add_attachment(attachment, now)?;
        }
        self.tickets.save(&mut ticket).await?;

        conversation.complete(ticket.id, now);
        self.conversations.save(&conversation).await?;

        self.events
            .publish(DomainEvent::TicketCreated {
                event_id: uuid::Uuid::new_v4(),
                occurred_at: now,
                ticket_id: ticket.id,
                owner_id: user_id,
            })
            .await;
        self.events
            .publish(DomainEvent::ConversationCompleted {
                event_id: uuid::Uuid::new_v4(),
                occurred_at: now,
                conversation_id: conversation.id,
                ticket_id: ticket.id,
            })
            .await;

        Ok(ResultEnvelope::success(
            "ticket criado",
            Some(details!("ticket_id" => ticket.id.0, "protocol" => ticket.display_protocol())),
        ))
    }

    pub async fn cancel_conversation(&self, user_id: UserId) -> Result<ResultEnvelope, EngineError> {
        let mut conversation = self.load_active(user_id).await?;
        let now = self.clock.now();
        conversation.cancel(now)?;
        self.conversations.save(&conversation).await?;

        self.events
            .publish(DomainEvent::ConversationCancelled {
                event_id: uuid::Uuid::new_v4(),
                occurred_at: now,
                conversation_id: conversation.id,
                reason: "usuário cancelou".to_string(),
            })
            .await;

        Ok(ResultEnvelope::success("conversa cancelada", None))
    }

    /// Cancels every active conversation idle beyond the configured
    /// threshold. Each item is isolated; failures are collected, not
    /// propagated (mirrors `ExpireSweep`'s partial-failure tolerance).
    pub async fn timeout_sweep(&self) -> Result<ResultEnvelope, EngineError> {
        let now = self.clock.now();
        let idle_before = now - chrono::Duration::minutes(crate::conversation::IDLE_TIMEOUT_MINUTES);
        let idle = self.conversations.find_idle_before(idle_before, 500).await?;

        let mut processed = 0u32;
        let mut errors = Vec::new();
        for mut conversation in idle {
            match conversation.cancel(now) {
                Ok(()) => {
                    if let Err(e) = self.conversations.save(&conversation).await {
                        errors.push(e.to_string());
                        continue;
                    }
                    self.events
                        .publish(DomainEvent::ConversationTimedOut {
                            event_id: uuid::Uuid::new_v4(),
                            occurred_at: now,
                            conversation_id: conversation.id,
                        })
                        .await;
                    processed += 1;
                }
                Err(e) => errors.push(e.message().to_string()),
            }
        }

        Ok(ResultEnvelope::success(
            "varredura de timeout concluída",
            Some(details!("processed" => processed, "errors" => errors)),
        ))
    }

    // --- Ticket operations ---

    async fn load_ticket(&self, ticket_id: TicketId) -> Result<Ticket, EngineError> {
        self.tickets
            .find_by_id(ticket_id)
            .await?
            .ok_or_else(|| EngineError::not_found("ticket_not_found", "ticket não encontrado"))
    }

    pub async fn assign_ticket(&self, ticket_id: TicketId, technician: &str) -> Result<ResultEnvelope, EngineError> {
        let mut ticket = self.load_ticket(ticket_id).await?;
        let now = self.clock.now();
        ticket.assign(technician, now)?;
        self.tickets.save(&mut ticket).await?;

        self.events
            .publish(DomainEvent::TicketAssigned {
                event_id: uuid::Uuid::new_v4(),
                occurred_at: now,
                ticket_id: ticket.id,
                assignee: technician.to_string(),
            })
            .await;
        Ok(ResultEnvelope::success("ticket atribuído", None))
    }

    pub async fn change_ticket_status(&self, ticket_id: TicketId, next: TicketStatus) -> Result<ResultEnvelope, EngineError> {
        let mut ticket = self.load_ticket(ticket_id).await?;
        let now = self.clock.now();
        let from = ticket.status;
        ticket.change_status(next, now)?;
        self.tickets.save(&mut ticket).await?;

        self.events
            .publish(DomainEvent::TicketStatusChanged {
                event_id: uuid::Uuid::new_v4(),
                occurred_at: now,
                ticket_id: ticket.id,
                from: from.as_str().to_string(),
                to: next.as_str().to_string(),
            })
            .await;
        Ok(ResultEnvelope::success("status alterado", None))
    }

    pub async fn elevate_urgency(&self, ticket_id: TicketId) -> Result<ResultEnvelope, EngineError> {
        let mut ticket = self.load_ticket(ticket_id).await?;
        let now = self.clock.now();
        let from = ticket.urgency;
        ticket.elevate_urgency(now);
        self.tickets.save(&mut ticket).await?;

        self.events
            .publish(DomainEvent::TicketUrgencyElevated {
                event_id: uuid::Uuid::new_v4(),
                occurred_at: now,
                ticket_id: ticket.id,
                from: from.as_str().to_string(),
                to: ticket.urgency.as_str().to_string(),
            })
            .await;
        Ok(ResultEnvelope::success("urgência elevada", None))
    }

    pub async fn close_with_resolution(&self, ticket_id: TicketId, notes: &str) -> Result<ResultEnvelope, EngineError> {
        let mut ticket = self.load_ticket(ticket_id).await?;
        let now = self.clock.now();
        ticket.close_with_resolution(notes, now)?;
        self.tickets.save(&mut ticket).await?;

        self.events
            .publish(DomainEvent::TicketClosed {
                event_id: uuid::Uuid::new_v4(),
                occurred_at: now,
                ticket_id: ticket.id,
            })
            .await;
        Ok(ResultEnvelope::success("ticket fechado", None))
    }

    pub async fn cancel_ticket(&self, ticket_id: TicketId, reason: &str) -> Result<ResultEnvelope, EngineError> {
        let mut ticket = self.load_ticket(ticket_id).await?;
        let now = self.clock.now();
        ticket.cancel(reason, now)?;
        self.tickets.save(&mut ticket).await?;
        Ok(ResultEnvelope::success("ticket cancelado", None))
    }

    pub async fn mark_sync_failed(&self, ticket_id: TicketId, error: &str) -> Result<ResultEnvelope, EngineError> {
        let mut ticket = self.load_ticket(ticket_id).await?;
        let now = self.clock.now();
        ticket.mark_sync_failed(error, now);
        self.tickets.save(&mut ticket).await?;
        Ok(ResultEnvelope::success("falha de sincronização registrada", None))
    }

    pub async fn sync_ticket_with_upstream(&self, ticket_id: TicketId, upstream_id: &str, upstream_protocol: &str) -> Result<ResultEnvelope, EngineError> {
        let mut ticket = self.load_ticket(ticket_id).await?;
        let now = self.clock.now();
        let protocol = Protocol::upstream(upstream_protocol);
        ticket.sync_with_upstream(upstream_id, protocol.clone(), now);
        self.tickets.save(&mut ticket).await?;

        self.events
            .publish(DomainEvent::TicketSyncedWithUpstream {
                event_id: uuid::Uuid::new_v4(),
                occurred_at: now,
                ticket_id: ticket.id,
                upstream_id: upstream_id.to_string(),
                protocol: protocol.display().to_string(),
            })
            .await;
        Ok(ResultEnvelope::success("ticket sincronizado", None))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::memory::{InMemoryConversationRepository, InMemoryTicketRepository};
    use sentinela_common::UuidIdGen;
    use sentinela_events::InMemoryEventBus;
    use std::sync::Mutex as StdMutex;
    use std::time::Duration as StdDuration;

    struct TestClock(StdMutex<chrono::DateTime<chrono::Utc>>);

    impl TestClock {
        fn new(now: chrono::DateTime<chrono::Utc>) -> Self {
            Self(StdMutex::new(now))
        }

        fn advance(&self, d: chrono::Duration) {
            let mut guard = self.0.lock().unwrap();
            *guard = *guard + d;
        }
    }

    impl Clock for TestClock {
        fn now(&self) -> chrono::DateTime<chrono::Utc> {
            *self.0.lock().unwrap()
        }
    }

    fn engine(clock: Arc<TestClock>) -> ConversationEngine {
        ConversationEngine::new(
            Arc::new(InMemoryConversationRepository::new()),
            Arc::new(InMemoryTicketRepository::new()),
            Arc::new(InMemoryEventBus::new(10, StdDuration::from_secs(5))),
            clock as Arc<dyn Clock>,
            Arc::new(UuidIdGen),
        )
    }

    #[tokio::test]
    async fn full_form_creates_ticket_with_derived_urgency() {
        let clock = Arc::new(TestClock::new(chrono::Utc::now()));
        let eng = engine(clock);

        eng.start_conversation(StartConversationCommand {
            user_id: UserId(1),
            username: "dan".to_string(),
            user_mention: "@dan".to_string(),
        })
        .await
        .unwrap();

        eng.select_category(UserId(1), "connectivity").await.unwrap();
        eng.select_game(UserId(1), "valorant", None).await.unwrap();
        eng.select_timing(UserId(1), "now").await.unwrap();
        eng.set_description(UserId(1), "conexão caindo toda hora durante partidas").await.unwrap();
        eng.skip_attachments(UserId(1)).await.unwrap();
        eng.proceed_to_confirmation(UserId(1)).await.unwrap();
        let result = eng.confirm_and_create_ticket(UserId(1), "dan").await.unwrap();

        assert!(result.ok);
        assert_eq!(result.data.unwrap().get("ticket_id").unwrap(), &serde_json::json!(1));
    }

    #[tokio::test]
    async fn out_of_order_step_rejected() {
        let clock = Arc::new(TestClock::new(chrono::Utc::now()));
        let eng = engine(clock);

        eng.start_conversation(StartConversationCommand {
            user_id: UserId(2),
            username: "erin".to_string(),
            user_mention: "@erin".to_string(),
        })
        .await
        .unwrap();

        let err = eng.select_game(UserId(2), "valorant", None).await.unwrap_err();
        assert_eq!(err.code(), "conversation_step_mismatch");
    }

    #[tokio::test]
    async fn short_description_rejected() {
        let clock = Arc::new(TestClock::new(chrono::Utc::now()));
        let eng = engine(clock);

        eng.start_conversation(StartConversationCommand {
            user_id: UserId(3),
            username: "frank".to_string(),
            user_mention: "@frank".to_string(),
        })
        .await
        .unwrap();
        eng.select_category(UserId(3), "other").await.unwrap();
        eng.select_game(UserId(3), "lol", None).await.unwrap();
        eng.select_timing(UserId(3), "always").await.unwrap();

        let err = eng.set_description(UserId(3), "curto").await.unwrap_err();
        assert_eq!(err.code(), "conversation_step_mismatch");
    }

    #[tokio::test]
    async fn timeout_sweep_cancels_idle_conversation() {
        let clock = Arc::new(TestClock::new(chrono::Utc::now()));
        let eng = engine(clock.clone());

        eng.start_conversation(StartConversationCommand {
            user_id: UserId(4),
            username: "gina".to_string(),
            user_mention: "@gina".to_string(),
        })
        .await
        .unwrap();

        clock.advance(chrono::Duration::minutes(31));
        let result = eng.timeout_sweep().await.unwrap();
        assert_eq!(result.data.unwrap().get("processed").unwrap(), &serde_json::json!(1));

        let err = eng.select_category(UserId(4), "other").await.unwrap_err();
        assert_eq!(err.code(), "conversation_step_mismatch");
    }
}
