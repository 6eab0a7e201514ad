//! Wires the scheduler's [`IntegrationCallback`] back onto the conversation
//! engine, so a completed `TicketSync`/`StatusUpdate` integration actually
//! updates the `Ticket` it was scheduled for (§4.6 step 5). This is the
//! only crate that holds both engines, which is why the callback lives here
//! instead of in `sentinela-scheduler` itself.

use async_trait::async_trait;
use sentinela_common::TicketId;
use sentinela_conversation::engine::ConversationEngine;
use sentinela_conversation::ticket::TicketStatus;
use sentinela_scheduler::IntegrationCallback;
use serde_json::Value;
use std::sync::Arc;
use tracing::warn;

pub struct ConversationSyncCallback {
    conversation: Arc<ConversationEngine>,
}

impl ConversationSyncCallback {
    pub fn new(conversation: Arc<ConversationEngine>) -> Self {
        Self { conversation }
    }
}

#[async_trait]
impl IntegrationCallback for ConversationSyncCallback {
    async fn ticket_synced(&self, ticket_id: TicketId, response: &Value) {
        let upstream_id = response.get("upstream_id").and_then(Value::as_str);
        let protocol = response.get("protocol").and_then(Value::as_str);
        let (Some(upstream_id), Some(protocol)) = (upstream_id, protocol) else {
            warn!(?ticket_id, "ticket sync response missing upstream_id/protocol, skipping callback");
            return;
        };
        if let Err(err) = self.conversation.sync_ticket_with_upstream(ticket_id, upstream_id, protocol).await {
            warn!(?ticket_id, error_code = err.code(), error_message = err.message(), "failed to record ticket sync result");
        }
    }

    async fn ticket_status_synced(&self, ticket_id: TicketId, payload: &Value) {
        let Some(status) = payload.get("status").and_then(Value::as_str) else {
            warn!(?ticket_id, "status update payload missing status, skipping callback");
            return;
        };
        let next = match TicketStatus::from_str(status) {
            Ok(next) => next,
            Err(_) => {
                warn!(?ticket_id, status, "status update payload has an unrecognized status, skipping callback");
                return;
            }
        };
        if let Err(err) = self.conversation.change_ticket_status(ticket_id, next).await {
            warn!(?ticket_id, error_code = err.code(), error_message = err.message(), "failed to record ticket status sync result");
        }
    }
}
