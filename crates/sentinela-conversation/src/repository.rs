//! Repository interfaces this engine depends on. Implementations live in
//! the store crate; in-memory doubles live here for tests.

use crate::conversation::SupportConversation;
use crate::ticket::{Ticket, TicketStatus};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sentinela_common::{ConversationId, SystemError, TicketId, UserId};

#[async_trait]
pub trait TicketRepository: Send + Sync {
    /// Upsert. A `None` id means the store must assign one and return it.
    async fn save(&self, ticket: &mut Ticket) -> Result<(), SystemError>;
    async fn find_by_id(&self, id: TicketId) -> Result<Option<Ticket>, SystemError>;
    async fn find_by_user(&self, user_id: UserId, limit: usize) -> Result<Vec<Ticket>, SystemError>;
    async fn find_by_status(&self, status: TicketStatus, limit: usize) -> Result<Vec<Ticket>, SystemError>;
    async fn find_sync_pending(&self, limit: usize) -> Result<Vec<Ticket>, SystemError>;
    async fn delete(&self, id: TicketId) -> Result<bool, SystemError>;
}

#[async_trait]
pub trait ConversationRepository: Send + Sync {
    async fn save(&self, conversation: &SupportConversation) -> Result<(), SystemError>;
    async fn find_by_id(&self, id: ConversationId) -> Result<Option<SupportConversation>, SystemError>;
    async fn find_active_by_user(&self, user_id: UserId) -> Result<Option<SupportConversation>, SystemError>;
    /// Active conversations whose `last_activity_at` is before `idle_before`.
    async fn find_idle_before(&self, idle_before: DateTime<Utc>, limit: usize) -> Result<Vec<SupportConversation>, SystemError>;
    async fn delete(&self, id: ConversationId) -> Result<bool, SystemError>;
}

#[cfg(any(test, feature = "test-support"))]
pub mod memory {
    use super::*;
    use parking_lot::Mutex;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicI64, Ordering};

    #[derive(Default)]
    pub struct InMemoryTicketRepository {
        rows: Mutex<HashMap<TicketId, Ticket>>,
        next_id: AtomicI64,
    }

    impl InMemoryTicketRepository {
        pub fn new() -> Self {
            Self {
                rows: Mutex::new(HashMap::new()),
                next_id: AtomicI64::new(1),
            }
        }
    }

    #[async_trait]
    impl TicketRepository for InMemoryTicketRepository {
        async fn save(&self, ticket: &mut Ticket) -> Result<(), SystemError> {
            if ticket.id.0 == 0 {
                ticket.id = TicketId(self.next_id.fetch_add(1, Ordering::SeqCst));
            }
            self.rows.lock().insert(ticket.id, ticket.clone());
            Ok(())
        }

        async fn find_by_id(&self, id: TicketId) -> Result<Option<Ticket>, SystemError> {
            Ok(self.rows.lock().get(&id).cloned())
        }

        async fn find_by_user(&self, user_id: UserId, limit: usize) -> Result<Vec<Ticket>, SystemError> {
            let mut out: Vec<_> = self.rows.lock().values().filter(|t| t.owner_id == user_id).cloned().collect();
            out.truncate(limit);
            Ok(out)
        }

        async fn find_by_status(&self, status: TicketStatus, limit: usize) -> Result<Vec<Ticket>, SystemError> {
            let mut out: Vec<_> = self.rows.lock().values().filter(|t| t.status == status).cloned().collect();
            out.truncate(limit);
            Ok(out)
        }

        async fn find_sync_pending(&self, limit: usize) -> Result<Vec<Ticket>, SystemError> {
            let mut out: Vec<_> = self.rows.lock().values().filter(|t| t.needs_sync()).cloned().collect();
            out.truncate(limit);
            Ok(out)
        }

        async fn delete(&self, id: TicketId) -> Result<bool, SystemError> {
            Ok(self.rows.lock().remove(&id).is_some())
        }
    }

    #[derive(Default)]
    pub struct InMemoryConversationRepository {
        rows: Mutex<HashMap<ConversationId, SupportConversation>>,
    }

    impl InMemoryConversationRepository {
        pub fn new() -> Self {
            Self::default()
        }
    }

    #[async_trait]
    impl ConversationRepository for InMemoryConversationRepository {
        async fn save(&self, conversation: &SupportConversation) -> Result<(), SystemError> {
            self.rows.lock().insert(conversation.id, conversation.clone());
            Ok(())
        }

        async fn find_by_id(&self, id: ConversationId) -> Result<Option<SupportConversation>, SystemError> {
            Ok(self.rows.lock().get(&id).cloned())
        }

        async fn find_active_by_user(&self, user_id: UserId) -> Result<Option<SupportConversation>, SystemError> {
            Ok(self.rows.lock().values().find(|c| c.user_id == user_id && c.is_active).cloned())
        }

        async fn find_idle_before(&self, idle_before: DateTime<Utc>, limit: usize) -> Result<Vec<SupportConversation>, SystemError> {
            let mut out: Vec<_> = self
                .rows
                .lock()
                .values()
                .filter(|c| c.is_active && c.last_activity_at < idle_before)
                .cloned()
                .collect();
            out.truncate(limit);
            Ok(out)
        }

        async fn delete(&self, id: ConversationId) -> Result<bool, SystemError> {
            Ok(self.rows.lock().remove(&id).is_some())
        }
    }
}
