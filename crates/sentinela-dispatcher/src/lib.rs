//! Composes the verification, conversation, and scheduler engines behind
//! the inbound command surface (§6), producing a [`sentinela_common::ResultEnvelope`]
//! for every call. This crate owns none of the state machines' rules —
//! it only parses raw input, builds the engines' typed commands, and
//! assembles integration payloads from stored aggregates where the
//! inbound command doesn't carry them directly.

pub mod callback;
pub mod commands;
pub mod dispatcher;

pub use callback::ConversationSyncCallback;
pub use dispatcher::Dispatcher;

#[cfg(test)]
mod tests {
    use super::*;
    use sentinela_common::{Clock, UuidIdGen};
    use sentinela_conversation::engine::ConversationEngine;
    use sentinela_conversation::repository::memory::{InMemoryConversationRepository, InMemoryTicketRepository};
    use sentinela_events::InMemoryEventBus;
    use sentinela_scheduler::dispatcher::{SchedulerConfig, SchedulerEngine};
    use sentinela_scheduler::request::memory::InMemoryIntegrationRepository;
    use sentinela_upstream::{ClientRecord, InMemoryUpstreamClient};
    use sentinela_verification::duplicate::DefaultDuplicateCpfService;
    use sentinela_verification::engine::{VerificationEngine, VerificationEngineConfig};
    use sentinela_verification::repository::memory::{InMemoryUserRepository, InMemoryVerificationRepository};
    use std::sync::{Arc, Mutex as StdMutex};
    use std::time::Duration as StdDuration;

    struct TestClock(StdMutex<chrono::DateTime<chrono::Utc>>);

    impl Clock for TestClock {
        fn now(&self) -> chrono::DateTime<chrono::Utc> {
            *self.0.lock().unwrap()
        }
    }

    fn dispatcher() -> (Dispatcher, Arc<InMemoryUpstreamClient>) {
        let clock = Arc::new(TestClock(StdMutex::new(chrono::Utc::now())));
        let events = Arc::new(InMemoryEventBus::new(10, StdDuration::from_secs(5)));
        let users = Arc::new(InMemoryUserRepository::new());
        let verifications = Arc::new(InMemoryVerificationRepository::new());
        let tickets = Arc::new(InMemoryTicketRepository::new());
        let conversations = Arc::new(InMemoryConversationRepository::new());
        let integrations = Arc::new(InMemoryIntegrationRepository::new());
        let upstream = Arc::new(InMemoryUpstreamClient::new());
        let duplicates = Arc::new(DefaultDuplicateCpfService::new(users.clone()));

        let verification_engine = VerificationEngine::new(
            verifications,
            users.clone(),
            upstream.clone(),
            events.clone(),
            duplicates,
            clock.clone() as Arc<dyn Clock>,
            Arc::new(UuidIdGen),
            VerificationEngineConfig::default(),
        );
        let conversation_engine = Arc::new(ConversationEngine::new(
            conversations,
            tickets.clone(),
            events.clone(),
            clock.clone() as Arc<dyn Clock>,
            Arc::new(UuidIdGen),
        ));
        let callback = Arc::new(crate::callback::ConversationSyncCallback::new(conversation_engine.clone()));
        let scheduler_engine = SchedulerEngine::new(
            integrations,
            upstream.clone(),
            events,
            clock as Arc<dyn Clock>,
            Arc::new(UuidIdGen),
            callback,
            SchedulerConfig::default(),
        );

        (
            Dispatcher::new(verification_engine, conversation_engine, scheduler_engine, tickets, users),
            upstream,
        )
    }

    #[tokio::test]
    async fn start_cpf_verification_rejects_unknown_type() {
        let (disp, _upstream) = dispatcher();
        let result = disp
            .start_cpf_verification(commands::StartCpfVerification {
                user_id: 1,
                username: "joao".to_string(),
                user_mention: "@joao".to_string(),
                verification_type: "not_a_real_type".to_string(),
                source_action: None,
            })
            .await;
        assert!(!result.ok);
        assert_eq!(result.error_code.as_deref(), Some("invalid_verification_type"));
    }

    #[tokio::test]
    async fn full_verification_then_conversation_flow() {
        let (disp, upstream) = dispatcher();
        upstream.seed_client(
            "52998224725",
            ClientRecord {
                nome_razaosocial: "Alice".to_string(),
                servico_status: "Habilitado".to_string(),
                servico_nome: Some("Fibra 500".to_string()),
                servico_id: None,
                contracts: vec![],
            },
        );

        let start = disp
            .start_cpf_verification(commands::StartCpfVerification {
                user_id: 10,
                username: "alice".to_string(),
                user_mention: "@alice".to_string(),
                verification_type: "auto_checkup".to_string(),
                source_action: None,
            })
            .await;
        assert!(start.ok);

        let submit = disp
            .submit_cpf_for_verification(commands::SubmitCpfForVerification {
                user_id: 10,
                username: "alice".to_string(),
                cpf: "529.982.247-25".to_string(),
            })
            .await;
        assert!(submit.ok);

        let conv = disp
            .start_support_conversation(commands::StartSupportConversation {
                user_id: 10,
                username: "alice".to_string(),
                user_mention: "@alice".to_string(),
            })
            .await;
        assert!(conv.ok);

        assert!(disp.select_category(commands::SelectCategory { user_id: 10, category: "connectivity".to_string() }).await.ok);
        assert!(disp.select_game(commands::SelectGame { user_id: 10, game: "valorant".to_string(), custom_name: None }).await.ok);
        assert!(disp.select_timing(commands::SelectTiming { user_id: 10, timing: "now".to_string() }).await.ok);
        assert!(disp
            .set_description(commands::SetDescription { user_id: 10, description: "conexão caindo durante partidas".to_string() })
            .await
            .ok);
        assert!(disp.skip_attachments(10).await.ok);
        assert!(disp.proceed_to_confirmation(10).await.ok);

        let ticket = disp
            .confirm_and_create_ticket(commands::ConfirmAndCreateTicket { user_id: 10, username: "alice".to_string() })
            .await;
        assert!(ticket.ok);
        let ticket_id = ticket.data.unwrap().get("ticket_id").unwrap().as_i64().unwrap();

        let sync = disp.sync_ticket_to_upstream(commands::SyncTicketToUpstream { ticket_id }).await;
        assert!(sync.ok);
    }

    #[tokio::test]
    async fn bulk_sync_rejects_empty_and_oversized_lists() {
        let (disp, _upstream) = dispatcher();

        let empty = disp
            .bulk_sync_tickets_to_upstream(commands::BulkSyncTicketsToUpstream {
                ticket_ids: vec![],
                batch_size: None,
                inter_batch_delay_ms: None,
            })
            .await;
        assert_eq!(empty.error_code.as_deref(), Some("empty_ticket_list"));

        let oversized = disp
            .bulk_sync_tickets_to_upstream(commands::BulkSyncTicketsToUpstream {
                ticket_ids: (0..201).collect(),
                batch_size: None,
                inter_batch_delay_ms: None,
            })
            .await;
        assert_eq!(oversized.error_code.as_deref(), Some("bulk_limit_exceeded"));
    }

    #[tokio::test]
    async fn bulk_sync_skips_unresolvable_ids_but_rejects_if_none_resolve() {
        let (disp, _upstream) = dispatcher();
        let result = disp
            .bulk_sync_tickets_to_upstream(commands::BulkSyncTicketsToUpstream {
                ticket_ids: vec![999],
                batch_size: None,
                inter_batch_delay_ms: None,
            })
            .await;
        assert_eq!(result.error_code.as_deref(), Some("empty_ticket_list"));
    }

    #[tokio::test]
    async fn update_ticket_status_requires_hubsoft_id() {
        let (disp, _upstream) = dispatcher();
        disp.start_support_conversation(commands::StartSupportConversation {
            user_id: 20,
            username: "bob".to_string(),
            user_mention: "@bob".to_string(),
        })
        .await;
        disp.select_category(commands::SelectCategory { user_id: 20, category: "other".to_string() }).await;
        disp.select_game(commands::SelectGame { user_id: 20, game: "lol".to_string(), custom_name: None }).await;
        disp.select_timing(commands::SelectTiming { user_id: 20, timing: "always".to_string() }).await;
        disp.set_description(commands::SetDescription { user_id: 20, description: "problema antigo de configuração".to_string() })
            .await;
        disp.skip_attachments(20).await;
        disp.proceed_to_confirmation(20).await;
        let ticket = disp
            .confirm_and_create_ticket(commands::ConfirmAndCreateTicket { user_id: 20, username: "bob".to_string() })
            .await;
        let ticket_id = ticket.data.unwrap().get("ticket_id").unwrap().as_i64().unwrap();

        let result = disp
            .update_ticket_status_in_upstream(commands::UpdateTicketStatusInUpstream {
                ticket_id,
                status: "resolved".to_string(),
                resolution_notes: None,
            })
            .await;
        assert_eq!(result.error_code.as_deref(), Some("missing_hubsoft_id"));
    }
}
