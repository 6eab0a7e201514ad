//! Registered callback the dispatch loop runs when a ticket-related
//! integration completes (§4.6 step 5). The scheduler itself has no
//! notion of a `Ticket` aggregate — the composition root supplies an
//! implementation that knows how to write the result back.

use async_trait::async_trait;
use sentinela_common::TicketId;
use serde_json::Value;

#[async_trait]
pub trait IntegrationCallback: Send + Sync {
    /// A `TicketSync` (or one item of a `BulkSync`) request completed;
    /// `response` is the raw upstream payload (carries `upstream_id`/
    /// `protocol`).
    async fn ticket_synced(&self, ticket_id: TicketId, response: &Value);

    /// A `StatusUpdate` request completed; `payload` is the scheduled
    /// request's own payload, since the upstream response carries nothing
    /// useful back for a patch call.
    async fn ticket_status_synced(&self, ticket_id: TicketId, payload: &Value);
}

/// Used where no callback was configured (tests, standalone scheduler use).
pub struct NoopCallback;

#[async_trait]
impl IntegrationCallback for NoopCallback {
    async fn ticket_synced(&self, _ticket_id: TicketId, _response: &Value) {}
    async fn ticket_status_synced(&self, _ticket_id: TicketId, _payload: &Value) {}
}
