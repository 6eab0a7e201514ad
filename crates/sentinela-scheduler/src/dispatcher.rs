//! Scheduler use-case operations and the dispatcher loop (§4.6).

use crate::cache::TtlCache;
use crate::callback::IntegrationCallback;
use crate::circuit_breaker::CircuitBreaker;
use crate::queue::QueueSignal;
use crate::rate_limiter::RateLimiter;
use crate::request::{IntegrationRepository, IntegrationRequest, IntegrationStatus, IntegrationType, Priority};
use sentinela_common::{details, Clock, EngineError, IdGen, IntegrationId, ResultEnvelope, SystemError, TicketId};
use sentinela_events::{DomainEvent, EventBus};
use sentinela_upstream::{TicketPatch, TicketPayload, UpstreamClient, UpstreamError};
use serde::Deserialize;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration as StdDuration;
use tracing::{info, warn};

pub struct SchedulerConfig {
    pub max_rpm: u32,
    pub breaker_threshold: u32,
    pub breaker_probe_interval: StdDuration,
    pub cache_max_size: usize,
    pub cache_default_ttl: chrono::Duration,
    pub default_max_retries: u32,
    pub default_timeout: chrono::Duration,
    pub poll_interval: StdDuration,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            max_rpm: 30,
            breaker_threshold: 5,
            breaker_probe_interval: StdDuration::from_secs(5),
            cache_max_size: 1000,
            cache_default_ttl: chrono::Duration::seconds(300),
            default_max_retries: 3,
            default_timeout: chrono::Duration::seconds(30),
            poll_interval: StdDuration::from_secs(1),
        }
    }
}

pub struct ScheduleIntegrationCommand {
    pub integration_type: IntegrationType,
    pub priority: Priority,
    pub payload: Value,
    pub metadata: HashMap<String, Value>,
    pub scheduled_at: Option<chrono::DateTime<chrono::Utc>>,
    pub max_retries: Option<u32>,
}

pub struct SchedulerEngine {
    repo: Arc<dyn IntegrationRepository>,
    upstream: Arc<dyn UpstreamClient>,
    events: Arc<dyn EventBus>,
    clock: Arc<dyn Clock>,
    ids: Arc<dyn IdGen>,
    callback: Arc<dyn IntegrationCallback>,
    config: SchedulerConfig,
    rate_limiter: RateLimiter,
    breaker: CircuitBreaker,
    cache: TtlCache,
    signal: QueueSignal,
    running: AtomicBool,
}

impl SchedulerEngine {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        repo: Arc<dyn IntegrationRepository>,
        upstream: Arc<dyn UpstreamClient>,
        events: Arc<dyn EventBus>,
        clock: Arc<dyn Clock>,
        ids: Arc<dyn IdGen>,
        callback: Arc<dyn IntegrationCallback>,
        config: SchedulerConfig,
    ) -> Self {
        let rate_limiter = RateLimiter::new(config.max_rpm);
        let breaker = CircuitBreaker::new(config.breaker_threshold, config.breaker_probe_interval);
        let cache = TtlCache::new(config.cache_max_size, config.cache_default_ttl);
        Self {
            repo,
            upstream,
            events,
            clock,
            ids,
            callback,
            config,
            rate_limiter,
            breaker,
            cache,
            signal: QueueSignal::new(),
            running: AtomicBool::new(false),
        }
    }

    pub fn cache(&self) -> &TtlCache {
        &self.cache
    }

    /// Exposed so the composition root can drive a dedicated health-probe
    /// task against the breaker, independent of the self-healing admission
    /// check `dispatch_once` already does.
    pub fn breaker(&self) -> &CircuitBreaker {
        &self.breaker
    }

    fn ticket_id_from_metadata(&self, request: &IntegrationRequest) -> Option<TicketId> {
        request.metadata.get("ticket_id").and_then(Value::as_i64).map(TicketId)
    }

    pub async fn schedule_integration(&self, cmd: ScheduleIntegrationCommand) -> Result<ResultEnvelope, EngineError> {
        let now = self.clock.now();
        let request = IntegrationRequest::new(
            self.ids.new_integration_id(),
            cmd.integration_type,
            cmd.priority,
            cmd.payload,
            cmd.metadata,
            cmd.max_retries.unwrap_or(self.config.default_max_retries),
            self.config.default_timeout,
            cmd.scheduled_at.unwrap_or(now),
            now,
        );
        self.repo.save(&request).await?;
        self.signal.wake();

        Ok(ResultEnvelope::success(
            "integração agendada",
            Some(details!("integration_id" => request.id.to_string())),
        ))
    }

    pub async fn cancel_integration(&self, id: IntegrationId) -> Result<ResultEnvelope, EngineError> {
        let mut request = self.load(id).await?;
        let now = self.clock.now();
        request.cancel(now)?;
        self.repo.save(&request).await?;
        Ok(ResultEnvelope::success("integração cancelada", None))
    }

    pub async fn update_integration_priority(&self, id: IntegrationId, priority: Priority) -> Result<ResultEnvelope, EngineError> {
        let mut request = self.load(id).await?;
        request.update_priority(priority)?;
        self.repo.save(&request).await?;
        self.signal.wake();
        Ok(ResultEnvelope::success("prioridade atualizada", None))
    }

    pub async fn get_integration_status(&self, id: IntegrationId) -> Result<ResultEnvelope, EngineError> {
        let request = self.load(id).await?;
        Ok(ResultEnvelope::success(
            "status da integração",
            Some(details!(
                "status" => request.status.as_str(),
                "attempts" => request.attempt_count(),
            )),
        ))
    }

    /// Re-enqueues every `Failed` request under `force_retry`, bypassing
    /// the normal `max_retries` gate.
    pub async fn retry_failed_integrations(&self) -> Result<ResultEnvelope, EngineError> {
        let failed = self.repo.find_by_status(IntegrationStatus::Failed, 500).await?;
        let now = self.clock.now();
        let mut retried = 0u32;
        for mut request in failed {
            request.force_retry = true;
            request.status = IntegrationStatus::Scheduled;
            request.scheduled_at = now;
            self.repo.save(&request).await?;
            retried += 1;
        }
        self.signal.wake();
        Ok(ResultEnvelope::success("integrações falhas reagendadas", Some(details!("retried" => retried))))
    }

    async fn load(&self, id: IntegrationId) -> Result<IntegrationRequest, EngineError> {
        self.repo
            .find_by_id(id)
            .await?
            .ok_or_else(|| EngineError::not_found("integration_not_found", "integração não encontrada"))
    }

    /// Pops and processes exactly one due request, if any. Returns `true`
    /// if something was dispatched.
    pub async fn dispatch_once(&self) -> Result<bool, SystemError> {
        let now = self.clock.now();
        let due = self.repo.find_due(now, 1).await?;
        let Some(mut request) = due.into_iter().next() else {
            return Ok(false);
        };

        if !self.breaker.allow_request() {
            request.scheduled_at = now + chrono::Duration::seconds(self.config.breaker_probe_interval.as_secs() as i64);
            self.repo.save(&request).await?;
            return Ok(true);
        }

        self.rate_limiter.wait_for_budget().await;
        self.rate_limiter.record_call();

        request.mark_in_progress(now);
        self.repo.save(&request).await?;

        match self.invoke_upstream(&request).await {
            Ok(response) => {
                self.breaker.record_success();
                self.run_completion_callback(&request, &response).await;
                request.mark_completed(response, self.clock.now());
                self.repo.save(&request).await?;
                self.events
                    .publish(DomainEvent::IntegrationCompleted {
                        event_id: uuid::Uuid::new_v4(),
                        occurred_at: self.clock.now(),
                        integration_id: request.id,
                    })
                    .await;
            }
            Err(err) => {
                self.breaker.record_failure();
                let retried = request.record_failure(&err.code, &err.message, self.clock.now());
                self.repo.save(&request).await?;
                if !retried {
                    self.events
                        .publish(DomainEvent::IntegrationFailed {
                            event_id: uuid::Uuid::new_v4(),
                            occurred_at: self.clock.now(),
                            integration_id: request.id,
                            error_code: err.code,
                        })
                        .await;
                }
            }
        }

        Ok(true)
    }

    /// Runs the registered callback for integration types that affect a
    /// single `Ticket` (§4.6 step 5: "run any registered callback" on
    /// completion). `BulkSync` calls back per item inside
    /// [`Self::invoke_upstream`] instead, since one request covers many
    /// tickets.
    async fn run_completion_callback(&self, request: &IntegrationRequest, response: &Value) {
        match request.integration_type {
            IntegrationType::TicketSync => {
                if let Some(ticket_id) = self.ticket_id_from_metadata(request) {
                    self.callback.ticket_synced(ticket_id, response).await;
                }
            }
            IntegrationType::StatusUpdate => {
                if let Some(ticket_id) = self.ticket_id_from_metadata(request) {
                    self.callback.ticket_status_synced(ticket_id, &request.payload).await;
                }
            }
            IntegrationType::UserVerification | IntegrationType::ClientDataFetch | IntegrationType::BulkSync => {}
        }
    }

    fn cache_key_for_ticket_sync(ticket_id: TicketId) -> String {
        format!("ticket_sync:{}", ticket_id.0)
    }

    async fn invoke_upstream(&self, request: &IntegrationRequest) -> Result<Value, UpstreamError> {
        match request.integration_type {
            IntegrationType::UserVerification | IntegrationType::ClientDataFetch => {
                let cpf = request.payload.get("cpf").and_then(Value::as_str).unwrap_or_default();
                let cache_key = format!("cpf:{cpf}");
                if let Some(cached) = self.cache.get_cached(&cache_key, self.clock.now()) {
                    return Ok(cached);
                }
                let record = self.upstream.verify_client_by_cpf(cpf, true).await?;
                let value = serde_json::to_value(record).expect("ClientRecord serializes");
                self.cache.set(cache_key, value.clone(), self.clock.now());
                Ok(value)
            }
            IntegrationType::TicketSync => {
                let cache_key = self.ticket_id_from_metadata(request).map(Self::cache_key_for_ticket_sync);
                if let Some(key) = &cache_key {
                    if let Some(cached) = self.cache.get_cached(key, self.clock.now()) {
                        return Ok(cached);
                    }
                }
                let payload: TicketPayload = serde_json::from_value(request.payload.clone())
                    .map_err(|e| UpstreamError::connection(format!("payload inválido: {e}")))?;
                let result = self.upstream.create_ticket(&payload).await?;
                let value = serde_json::to_value(result).expect("TicketSyncResult serializes");
                if let Some(key) = cache_key {
                    self.cache.set(key, value.clone(), self.clock.now());
                }
                Ok(value)
            }
            IntegrationType::StatusUpdate => {
                let upstream_id = request.payload.get("upstream_id").and_then(Value::as_str).unwrap_or_default();
                let patch: TicketPatch = serde_json::from_value(request.payload.clone())
                    .map_err(|e| UpstreamError::connection(format!("payload inválido: {e}")))?;
                self.upstream.update_ticket(upstream_id, &patch).await?;
                if let Some(ticket_id) = self.ticket_id_from_metadata(request) {
                    self.cache.invalidate(&Self::cache_key_for_ticket_sync(ticket_id));
                }
                Ok(Value::Null)
            }
            IntegrationType::BulkSync => self.invoke_bulk_sync(request).await,
        }
    }

    /// Iterates a `BulkSync` request's tickets in `batch_size`-sized
    /// chunks, pausing `inter_batch_delay_ms` between chunks, creating each
    /// ticket upstream individually and running the ticket-synced callback
    /// per item as it completes. A single ticket's failure doesn't fail the
    /// whole batch — it's recorded in the per-item result list instead.
    async fn invoke_bulk_sync(&self, request: &IntegrationRequest) -> Result<Value, UpstreamError> {
        #[derive(Deserialize)]
        struct BulkItem {
            ticket_id: i64,
            payload: TicketPayload,
        }
        #[derive(Deserialize)]
        struct BulkSyncPayload {
            items: Vec<BulkItem>,
            batch_size: usize,
            inter_batch_delay_ms: u64,
        }

        let bulk: BulkSyncPayload = serde_json::from_value(request.payload.clone())
            .map_err(|e| UpstreamError::connection(format!("payload inválido: {e}")))?;
        let batch_size = bulk.batch_size.max(1);

        let mut results = Vec::with_capacity(bulk.items.len());
        let chunks: Vec<_> = bulk.items.chunks(batch_size).collect();
        for (i, chunk) in chunks.iter().enumerate() {
            for item in *chunk {
                self.rate_limiter.wait_for_budget().await;
                self.rate_limiter.record_call();
                match self.upstream.create_ticket(&item.payload).await {
                    Ok(result) => {
                        let ticket_id = TicketId(item.ticket_id);
                        let value = serde_json::to_value(&result).expect("TicketSyncResult serializes");
                        self.callback.ticket_synced(ticket_id, &value).await;
                        results.push(serde_json::json!({
                            "ticket_id": item.ticket_id,
                            "ok": true,
                            "upstream_id": result.upstream_id,
                            "protocol": result.protocol,
                        }));
                    }
                    Err(e) => {
                        results.push(serde_json::json!({
                            "ticket_id": item.ticket_id,
                            "ok": false,
                            "error_code": e.code,
                        }));
                    }
                }
            }
            if i + 1 < chunks.len() {
                tokio::time::sleep(StdDuration::from_millis(bulk.inter_batch_delay_ms)).await;
            }
        }

        Ok(serde_json::json!({ "synced": results }))
    }

    /// Runs the dispatch loop until [`SchedulerEngine::stop`] is called.
    pub async fn run(&self) {
        self.running.store(true, Ordering::SeqCst);
        info!("scheduler dispatcher loop started");
        while self.running.load(Ordering::SeqCst) {
            match self.dispatch_once().await {
                Ok(true) => continue,
                Ok(false) => self.signal.wait(self.config.poll_interval).await,
                Err(e) => {
                    warn!(error = %e, "dispatcher iteration failed");
                    self.signal.wait(self.config.poll_interval).await;
                }
            }
        }
    }

    pub fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
        self.signal.wake();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::request::memory::InMemoryIntegrationRepository;
    use sentinela_common::UuidIdGen;
    use sentinela_events::InMemoryEventBus;
    use sentinela_upstream::{ClientRecord, InMemoryUpstreamClient};
    use std::sync::Mutex as StdMutex;

    struct TestClock(StdMutex<chrono::DateTime<chrono::Utc>>);

    impl TestClock {
        fn new(now: chrono::DateTime<chrono::Utc>) -> Self {
            Self(StdMutex::new(now))
        }
    }

    impl Clock for TestClock {
        fn now(&self) -> chrono::DateTime<chrono::Utc> {
            *self.0.lock().unwrap()
        }
    }

    fn engine(upstream: Arc<InMemoryUpstreamClient>) -> SchedulerEngine {
        SchedulerEngine::new(
            Arc::new(InMemoryIntegrationRepository::new()),
            upstream,
            Arc::new(InMemoryEventBus::new(10, StdDuration::from_secs(5))),
            Arc::new(TestClock::new(chrono::Utc::now())),
            Arc::new(UuidIdGen),
            Arc::new(crate::callback::NoopCallback),
            SchedulerConfig::default(),
        )
    }

    #[tokio::test]
    async fn successful_dispatch_marks_completed() {
        let upstream = Arc::new(InMemoryUpstreamClient::new());
        upstream.seed_client(
            "52998224725",
            ClientRecord {
                nome_razaosocial: "Alice".to_string(),
                servico_status: "Habilitado".to_string(),
                servico_nome: None,
                servico_id: None,
                contracts: vec![],
            },
        );
        let eng = engine(upstream);

        let result = eng
            .schedule_integration(ScheduleIntegrationCommand {
                integration_type: IntegrationType::UserVerification,
                priority: Priority::High,
                payload: serde_json::json!({"cpf": "52998224725"}),
                metadata: HashMap::new(),
                scheduled_at: None,
                max_retries: None,
            })
            .await
            .unwrap();

        let id: uuid::Uuid = result.data.unwrap().get("integration_id").unwrap().as_str().unwrap().parse().unwrap();
        let dispatched = eng.dispatch_once().await.unwrap();
        assert!(dispatched);

        let status = eng.get_integration_status(IntegrationId(id)).await.unwrap();
        assert_eq!(status.data.unwrap().get("status").unwrap(), &serde_json::json!("completed"));
    }

    #[tokio::test]
    async fn repeated_failure_exhausts_retries_and_marks_failed() {
        let upstream = Arc::new(InMemoryUpstreamClient::new());
        for _ in 0..5 {
            upstream.script_failure("create_ticket", UpstreamError::from_status(500, "boom", None));
        }
        let eng = engine(upstream);

        let result = eng
            .schedule_integration(ScheduleIntegrationCommand {
                integration_type: IntegrationType::TicketSync,
                priority: Priority::Normal,
                payload: serde_json::json!({"cpf": "1", "category": "other", "description": "x", "urgency": "low"}),
                metadata: HashMap::new(),
                scheduled_at: None,
                max_retries: Some(1),
            })
            .await
            .unwrap();
        let id: uuid::Uuid = result.data.unwrap().get("integration_id").unwrap().as_str().unwrap().parse().unwrap();

        eng.dispatch_once().await.unwrap();
        let status = eng.get_integration_status(IntegrationId(id)).await.unwrap();
        assert_eq!(status.data.unwrap().get("status").unwrap(), &serde_json::json!("failed"));
    }

    #[tokio::test]
    async fn cancel_blocks_further_dispatch() {
        let eng = engine(Arc::new(InMemoryUpstreamClient::new()));
        let result = eng
            .schedule_integration(ScheduleIntegrationCommand {
                integration_type: IntegrationType::ClientDataFetch,
                priority: Priority::Low,
                payload: serde_json::json!({"cpf": "1"}),
                metadata: HashMap::new(),
                scheduled_at: None,
                max_retries: None,
            })
            .await
            .unwrap();
        let id: uuid::Uuid = result.data.unwrap().get("integration_id").unwrap().as_str().unwrap().parse().unwrap();

        eng.cancel_integration(IntegrationId(id)).await.unwrap();
        let err = eng.cancel_integration(IntegrationId(id)).await.unwrap_err();
        assert_eq!(err.code(), "cancel_error");
    }

    #[derive(Default)]
    struct RecordingCallback {
        synced: StdMutex<Vec<i64>>,
        status_synced: StdMutex<Vec<i64>>,
    }

    #[async_trait::async_trait]
    impl IntegrationCallback for RecordingCallback {
        async fn ticket_synced(&self, ticket_id: TicketId, _response: &Value) {
            self.synced.lock().unwrap().push(ticket_id.0);
        }
        async fn ticket_status_synced(&self, ticket_id: TicketId, _payload: &Value) {
            self.status_synced.lock().unwrap().push(ticket_id.0);
        }
    }

    fn engine_with_callback(upstream: Arc<InMemoryUpstreamClient>, callback: Arc<RecordingCallback>) -> SchedulerEngine {
        SchedulerEngine::new(
            Arc::new(InMemoryIntegrationRepository::new()),
            upstream,
            Arc::new(InMemoryEventBus::new(10, StdDuration::from_secs(5))),
            Arc::new(TestClock::new(chrono::Utc::now())),
            Arc::new(UuidIdGen),
            callback,
            SchedulerConfig::default(),
        )
    }

    #[tokio::test]
    async fn ticket_sync_completion_runs_callback_and_populates_cache() {
        let upstream = Arc::new(InMemoryUpstreamClient::new());
        let callback = Arc::new(RecordingCallback::default());
        let eng = engine_with_callback(upstream.clone(), callback.clone());

        let mut metadata = HashMap::new();
        metadata.insert("ticket_id".to_string(), serde_json::json!(42));
        eng.schedule_integration(ScheduleIntegrationCommand {
            integration_type: IntegrationType::TicketSync,
            priority: Priority::Normal,
            payload: serde_json::json!({"cpf": "1", "category": "other", "description": "x", "urgency": "low"}),
            metadata,
            scheduled_at: None,
            max_retries: None,
        })
        .await
        .unwrap();

        eng.dispatch_once().await.unwrap();
        assert_eq!(callback.synced.lock().unwrap().as_slice(), &[42]);
        assert_eq!(upstream.request_count(), 1);

        assert!(eng.cache.get_cached("ticket_sync:42", eng.clock.now()).is_some());
    }

    #[tokio::test]
    async fn bulk_sync_chunks_and_isolates_per_item_failures() {
        let upstream = Arc::new(InMemoryUpstreamClient::new());
        upstream.script_failure("create_ticket", UpstreamError::from_status(500, "boom", None));
        let callback = Arc::new(RecordingCallback::default());
        let eng = engine_with_callback(upstream, callback.clone());

        let payload = serde_json::json!({
            "items": [
                {"ticket_id": 1, "payload": {"cpf": "1", "category": "other", "description": "x", "urgency": "low"}},
                {"ticket_id": 2, "payload": {"cpf": "2", "category": "other", "description": "y", "urgency": "low"}},
                {"ticket_id": 3, "payload": {"cpf": "3", "category": "other", "description": "z", "urgency": "low"}},
            ],
            "batch_size": 2,
            "inter_batch_delay_ms": 0,
        });
        eng.schedule_integration(ScheduleIntegrationCommand {
            integration_type: IntegrationType::BulkSync,
            priority: Priority::Low,
            payload,
            metadata: HashMap::new(),
            scheduled_at: None,
            max_retries: None,
        })
        .await
        .unwrap();

        eng.dispatch_once().await.unwrap();
        // first item's scripted failure is consumed, the other two succeed
        assert_eq!(callback.synced.lock().unwrap().as_slice(), &[2, 3]);
    }
}
