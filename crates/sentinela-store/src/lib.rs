//! SQLite-backed implementations of every repository trait defined by the
//! domain/engine crates. Schema is initialized eagerly via [`pool::open`];
//! repositories themselves hold only a `Pool<Sqlite>` (and, where the
//! column depends on configuration, the relevant salt).

pub mod conversation_store;
pub mod integration_store;
pub mod pool;
pub mod schema;
pub mod verification_store;

pub use conversation_store::{SqliteConversationRepository, SqliteTicketRepository};
pub use integration_store::SqliteIntegrationRepository;
pub use verification_store::{SqliteUserRepository, SqliteVerificationRepository};

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use sentinela_common::{Cpf, TicketId, UserId, VerificationId};
    use sentinela_conversation::category::{GameTitle, ProblemTiming, TicketCategory};
    use sentinela_conversation::conversation::SupportConversation;
    use sentinela_conversation::repository::{ConversationRepository, TicketRepository};
    use sentinela_conversation::ticket::{Ticket, UrgencyLevel};
    use sentinela_verification::domain::{User, UserStatus, VerificationRequest, VerificationType};
    use sentinela_verification::repository::{UserRepository, VerificationRepository};
    use uuid::Uuid;

    async fn memory_pool() -> sqlx::Pool<sqlx::Sqlite> {
        pool::open("sqlite::memory:", 1).await.unwrap()
    }

    #[tokio::test]
    async fn user_round_trips_through_sqlite() {
        let db = memory_pool().await;
        let repo = SqliteUserRepository::new(db);
        let now = Utc::now();
        let mut user = User::new_pending(UserId(42), "joaozinho", now);
        let cpf = Cpf::from_raw("529.982.247-25").unwrap();
        user.activate(cpf, "pepper", "Cliente Teste".to_string(), None, now);

        repo.save(&user).await.unwrap();
        let loaded = repo.find_by_id(UserId(42)).await.unwrap().unwrap();
        assert_eq!(loaded.username, "joaozinho");
        assert_eq!(loaded.status, UserStatus::Active);
        assert_eq!(loaded.cpf_hash, user.cpf_hash);

        let by_hash = repo.find_by_cpf_hash(user.cpf_hash.as_ref().unwrap()).await.unwrap();
        assert!(by_hash.is_some());
    }

    #[tokio::test]
    async fn verification_find_by_cpf_hash_uses_consistent_salt() {
        let db = memory_pool().await;
        let repo = SqliteVerificationRepository::new(db, "pepper");
        let now = Utc::now();
        let mut request = VerificationRequest::new(
            VerificationId(Uuid::new_v4()),
            UserId(7),
            "maria",
            "@maria",
            VerificationType::AutoCheckup,
            None,
            now,
            24,
        );
        let cpf = Cpf::from_raw("529.982.247-25").unwrap();
        request.complete_with_success(cpf.clone(), "Cliente".to_string(), None, now).unwrap();
        repo.save(&request).await.unwrap();

        let hash = cpf.hash("pepper");
        let found = repo.find_by_cpf_hash(&hash, "pepper", 10).await.unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].id, request.id);
    }

    #[tokio::test]
    async fn ticket_save_assigns_autoincrement_id() {
        let db = memory_pool().await;
        let repo = SqliteTicketRepository::new(db);
        let now = Utc::now();
        let mut ticket = Ticket::new(
            TicketId(0),
            UserId(1),
            "joaozinho",
            TicketCategory::Connectivity,
            GameTitle::from_str("valorant", None).unwrap(),
            ProblemTiming::Now,
            "Não consigo conectar ao servidor".to_string(),
            UrgencyLevel::High,
            now,
        );

        repo.save(&mut ticket).await.unwrap();
        assert!(ticket.id.0 > 0);

        let loaded = repo.find_by_id(ticket.id).await.unwrap().unwrap();
        assert_eq!(loaded.description, "Não consigo conectar ao servidor");
        assert_eq!(loaded.urgency, UrgencyLevel::High);
    }

    #[tokio::test]
    async fn conversation_round_trips_and_finds_active_by_user() {
        let db = memory_pool().await;
        let repo = SqliteConversationRepository::new(db);
        let now = Utc::now();
        let conversation = SupportConversation::new(
            sentinela_common::ConversationId(Uuid::new_v4()),
            UserId(9),
            "ana",
            now,
        );
        repo.save(&conversation).await.unwrap();

        let found = repo.find_active_by_user(UserId(9)).await.unwrap();
        assert!(found.is_some());
        assert_eq!(found.unwrap().id, conversation.id);
    }
}
