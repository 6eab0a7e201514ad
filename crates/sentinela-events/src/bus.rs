//! In-memory domain event bus (§4.5).
//!
//! Delivery is parallel across subscribers, bounded by a semaphore, and
//! isolates handler failures — a `Publish` awaits every handler but never
//! re-raises an individual handler's error. Handlers are expected to be
//! idempotent; the bus performs no retries or persistence of its own.

use crate::events::{DomainEvent, EventKind};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{RwLock, Semaphore};
use tracing::{debug, warn};

#[async_trait]
pub trait EventHandler: Send + Sync {
    async fn handle(&self, event: &DomainEvent) -> anyhow::Result<()>;

    /// Used only for logging; handler identity for subscribe/unsubscribe
    /// is pointer equality on the registered `Arc`.
    fn name(&self) -> &str;
}

#[async_trait]
pub trait EventBus: Send + Sync {
    async fn publish(&self, event: DomainEvent);
    async fn publish_many(&self, events: Vec<DomainEvent>);
    async fn subscribe(&self, kind: EventKind, handler: Arc<dyn EventHandler>);
    async fn subscribe_to_all(&self, handler: Arc<dyn EventHandler>);
    async fn unsubscribe(&self, kind: EventKind, handler: &Arc<dyn EventHandler>);
    async fn handler_count(&self, kind: Option<EventKind>) -> usize;
}

pub struct InMemoryEventBus {
    handlers: RwLock<HashMap<EventKind, Vec<Arc<dyn EventHandler>>>>,
    global_handlers: RwLock<Vec<Arc<dyn EventHandler>>>,
    fan_out_limit: Arc<Semaphore>,
    handler_timeout: Duration,
}

impl InMemoryEventBus {
    pub fn new(max_concurrent_handlers: usize, handler_timeout: Duration) -> Self {
        Self {
            handlers: RwLock::new(HashMap::new()),
            global_handlers: RwLock::new(Vec::new()),
            fan_out_limit: Arc::new(Semaphore::new(max_concurrent_handlers.max(1))),
            handler_timeout,
        }
    }

    async fn handlers_for(&self, kind: EventKind) -> Vec<Arc<dyn EventHandler>> {
        let mut handlers = self
            .handlers
            .read()
            .await
            .get(&kind)
            .cloned()
            .unwrap_or_default();
        handlers.extend(self.global_handlers.read().await.iter().cloned());
        handlers
    }

    async fn dispatch(&self, event: Arc<DomainEvent>, handlers: Vec<Arc<dyn EventHandler>>) {
        if handlers.is_empty() {
            debug!(kind = ?event.kind(), "no handlers registered for event");
            return;
        }

        let mut tasks = Vec::with_capacity(handlers.len());
        for handler in handlers {
            let event = event.clone();
            let permit = self.fan_out_limit.clone();
            let timeout = self.handler_timeout;
            tasks.push(tokio::spawn(async move {
                let _permit = permit.acquire_owned().await.expect("semaphore closed");
                let handler_name = handler.name().to_string();
                match tokio::time::timeout(timeout, handler.handle(&event)).await {
                    Ok(Ok(())) => {
                        debug!(handler = %handler_name, "event handled successfully");
                    }
                    Ok(Err(e)) => {
                        warn!(handler = %handler_name, error = %e, "event handler failed");
                    }
                    Err(_) => {
                        warn!(handler = %handler_name, "event handler timed out");
                    }
                }
            }));
        }

        for task in tasks {
            // A handler task panicking must not abort sibling handlers or the publisher.
            let _ = task.await;
        }
    }
}

#[async_trait]
impl EventBus for InMemoryEventBus {
    async fn publish(&self, event: DomainEvent) {
        let kind = event.kind();
        let handlers = self.handlers_for(kind).await;
        self.dispatch(Arc::new(event), handlers).await;
    }

    async fn publish_many(&self, events: Vec<DomainEvent>) {
        let futures = events.into_iter().map(|e| self.publish(e));
        futures::future::join_all(futures).await;
    }

    async fn subscribe(&self, kind: EventKind, handler: Arc<dyn EventHandler>) {
        let mut handlers = self.handlers.write().await;
        let entry = handlers.entry(kind).or_default();
        if !entry.iter().any(|h| Arc::ptr_eq(h, &handler)) {
            entry.push(handler);
        }
    }

    async fn subscribe_to_all(&self, handler: Arc<dyn EventHandler>) {
        let mut global = self.global_handlers.write().await;
        if !global.iter().any(|h| Arc::ptr_eq(h, &handler)) {
            global.push(handler);
        }
    }

    async fn unsubscribe(&self, kind: EventKind, handler: &Arc<dyn EventHandler>) {
        let mut handlers = self.handlers.write().await;
        if let Some(list) = handlers.get_mut(&kind) {
            list.retain(|h| !Arc::ptr_eq(h, handler));
        }
    }

    async fn handler_count(&self, kind: Option<EventKind>) -> usize {
        match kind {
            Some(k) => self.handlers.read().await.get(&k).map_or(0, Vec::len),
            None => {
                let per_type: usize = self.handlers.read().await.values().map(Vec::len).sum();
                per_type + self.global_handlers.read().await.len()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use sentinela_common::VerificationId;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use uuid::Uuid;

    struct CountingHandler {
        count: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl EventHandler for CountingHandler {
        async fn handle(&self, _event: &DomainEvent) -> anyhow::Result<()> {
            self.count.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        fn name(&self) -> &str {
            "counting-handler"
        }
    }

    struct FailingHandler;

    #[async_trait]
    impl EventHandler for FailingHandler {
        async fn handle(&self, _event: &DomainEvent) -> anyhow::Result<()> {
            anyhow::bail!("boom")
        }

        fn name(&self) -> &str {
            "failing-handler"
        }
    }

    fn sample_event() -> DomainEvent {
        DomainEvent::VerificationStarted {
            event_id: Uuid::new_v4(),
            occurred_at: Utc::now(),
            verification_id: VerificationId(Uuid::new_v4()),
            user_id: sentinela_common::UserId(1),
        }
    }

    #[tokio::test]
    async fn publish_invokes_both_typed_and_global_handlers() {
        let bus = InMemoryEventBus::new(10, Duration::from_secs(1));
        let count = Arc::new(AtomicUsize::new(0));
        let typed: Arc<dyn EventHandler> = Arc::new(CountingHandler { count: count.clone() });
        let global: Arc<dyn EventHandler> = Arc::new(CountingHandler { count: count.clone() });

        bus.subscribe(EventKind::VerificationStarted, typed).await;
        bus.subscribe_to_all(global).await;

        bus.publish(sample_event()).await;

        assert_eq!(count.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn failing_handler_does_not_block_others() {
        let bus = InMemoryEventBus::new(10, Duration::from_secs(1));
        let count = Arc::new(AtomicUsize::new(0));
        let failing: Arc<dyn EventHandler> = Arc::new(FailingHandler);
        let counting: Arc<dyn EventHandler> = Arc::new(CountingHandler { count: count.clone() });

        bus.subscribe(EventKind::VerificationStarted, failing).await;
        bus.subscribe(EventKind::VerificationStarted, counting).await;

        bus.publish(sample_event()).await;

        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn subscribe_is_idempotent() {
        let bus = InMemoryEventBus::new(10, Duration::from_secs(1));
        let handler: Arc<dyn EventHandler> = Arc::new(FailingHandler);

        bus.subscribe(EventKind::VerificationStarted, handler.clone())
            .await;
        bus.subscribe(EventKind::VerificationStarted, handler.clone())
            .await;

        assert_eq!(
            bus.handler_count(Some(EventKind::VerificationStarted)).await,
            1
        );
    }

    #[tokio::test]
    async fn unsubscribe_removes_handler() {
        let bus = InMemoryEventBus::new(10, Duration::from_secs(1));
        let handler: Arc<dyn EventHandler> = Arc::new(FailingHandler);

        bus.subscribe(EventKind::VerificationStarted, handler.clone())
            .await;
        bus.unsubscribe(EventKind::VerificationStarted, &handler).await;

        assert_eq!(
            bus.handler_count(Some(EventKind::VerificationStarted)).await,
            0
        );
    }
}
