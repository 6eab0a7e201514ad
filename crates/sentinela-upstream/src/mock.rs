//! In-memory upstream test double.
//!
//! Unlike the production client, behavior is entirely scripted: tests
//! seed [`InMemoryUpstreamClient`] with the client records and failures
//! they want to see, rather than this double inventing plausible data.

use crate::client::{
    ClientRecord, Contract, HealthReport, TicketPatch, TicketPayload, TicketStatusSnapshot,
    TicketSummary, TicketSyncResult, UpstreamClient, UpstreamError,
};
use async_trait::async_trait;
use chrono::Utc;
use parking_lot::Mutex;
use std::collections::HashMap;

#[derive(Default)]
pub struct InMemoryUpstreamClient {
    clients: Mutex<HashMap<String, ClientRecord>>,
    /// Queue of failures to return before falling through to success,
    /// keyed by operation name. Lets a test script "the 3rd call to
    /// create_ticket fails, then succeeds".
    scripted_failures: Mutex<HashMap<String, Vec<UpstreamError>>>,
    created_tickets: Mutex<Vec<TicketPayload>>,
    request_count: Mutex<u64>,
    healthy: Mutex<bool>,
}

impl InMemoryUpstreamClient {
    pub fn new() -> Self {
        Self {
            healthy: Mutex::new(true),
            ..Default::default()
        }
    }

    pub fn seed_client(&self, cpf: &str, record: ClientRecord) {
        self.clients.lock().insert(cpf.to_string(), record);
    }

    pub fn script_failure(&self, operation: &str, error: UpstreamError) {
        self.scripted_failures
            .lock()
            .entry(operation.to_string())
            .or_default()
            .push(error);
    }

    pub fn set_healthy(&self, healthy: bool) {
        *self.healthy.lock() = healthy;
    }

    pub fn request_count(&self) -> u64 {
        *self.request_count.lock()
    }

    pub fn created_tickets(&self) -> Vec<TicketPayload> {
        self.created_tickets.lock().clone()
    }

    fn take_scripted_failure(&self, operation: &str) -> Option<UpstreamError> {
        let mut failures = self.scripted_failures.lock();
        let queue = failures.get_mut(operation)?;
        if queue.is_empty() {
            None
        } else {
            Some(queue.remove(0))
        }
    }

    fn record_call(&self) {
        *self.request_count.lock() += 1;
    }
}

#[async_trait]
impl UpstreamClient for InMemoryUpstreamClient {
    async fn verify_client_by_cpf(
        &self,
        cpf: &str,
        _include_contracts: bool,
    ) -> Result<Option<ClientRecord>, UpstreamError> {
        self.record_call();
        if let Some(err) = self.take_scripted_failure("verify_client_by_cpf") {
            return Err(err);
        }
        Ok(self.clients.lock().get(cpf).cloned())
    }

    async fn create_ticket(&self, payload: &TicketPayload) -> Result<TicketSyncResult, UpstreamError> {
        self.record_call();
        if let Some(err) = self.take_scripted_failure("create_ticket") {
            return Err(err);
        }
        self.created_tickets.lock().push(payload.clone());
        let id = format!("HST-{}", self.created_tickets.lock().len());
        Ok(TicketSyncResult {
            upstream_id: id.clone(),
            protocol: id,
        })
    }

    async fn update_ticket(&self, _upstream_id: &str, _patch: &TicketPatch) -> Result<(), UpstreamError> {
        self.record_call();
        if let Some(err) = self.take_scripted_failure("update_ticket") {
            return Err(err);
        }
        Ok(())
    }

    async fn get_ticket_status(&self, upstream_id: &str) -> Result<TicketStatusSnapshot, UpstreamError> {
        self.record_call();
        if let Some(err) = self.take_scripted_failure("get_ticket_status") {
            return Err(err);
        }
        Ok(TicketStatusSnapshot {
            upstream_id: upstream_id.to_string(),
            status: "aberto".to_string(),
            updated_at: Utc::now(),
        })
    }

    async fn search_tickets_by_cpf(
        &self,
        _cpf: &str,
        _limit: usize,
    ) -> Result<Vec<TicketSummary>, UpstreamError> {
        self.record_call();
        if let Some(err) = self.take_scripted_failure("search_tickets_by_cpf") {
            return Err(err);
        }
        Ok(Vec::new())
    }

    async fn get_client_contracts(&self, cpf: &str) -> Result<Vec<Contract>, UpstreamError> {
        self.record_call();
        if let Some(err) = self.take_scripted_failure("get_client_contracts") {
            return Err(err);
        }
        Ok(self
            .clients
            .lock()
            .get(cpf)
            .map(|c| c.contracts.clone())
            .unwrap_or_default())
    }

    async fn check_health(&self) -> Result<HealthReport, UpstreamError> {
        self.record_call();
        Ok(HealthReport {
            healthy: *self.healthy.lock(),
            response_time_ms: 1,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn seeded_client_is_returned() {
        let client = InMemoryUpstreamClient::new();
        client.seed_client(
            "52998224725",
            ClientRecord {
                nome_razaosocial: "Alice".to_string(),
                servico_status: "Habilitado".to_string(),
                servico_nome: Some("Fibra 500".to_string()),
                servico_id: None,
                contracts: vec![],
            },
        );

        let record = client.verify_client_by_cpf("52998224725", false).await.unwrap();
        assert_eq!(record.unwrap().nome_razaosocial, "Alice");
    }

    #[tokio::test]
    async fn scripted_failure_is_consumed_once() {
        let client = InMemoryUpstreamClient::new();
        client.script_failure("create_ticket", UpstreamError::from_status(500, "boom", None));

        let payload = TicketPayload {
            cpf: "52998224725".to_string(),
            category: "connectivity".to_string(),
            description: "no internet".to_string(),
            urgency: "high".to_string(),
        };

        assert!(client.create_ticket(&payload).await.is_err());
        assert!(client.create_ticket(&payload).await.is_ok());
    }
}
