//! Sentinela composition root.
//!
//! Wires the SQLite-backed repositories to the verification, conversation,
//! and scheduler engines, builds the command dispatcher the chat adapter
//! embeds, and runs the background loops that have no caller of their own:
//! the integration dispatcher loop and the periodic expiry/idle sweeps.
//!
//! The HTTP surface here is health/metrics only — the chat front-end and
//! its command routing are external collaborators (see the engine's own
//! documentation for the dispatcher's command surface).
//!
//! ## Environment Variables
//!
//! | Variable | Default | Description |
//! |----------|---------|-------------|
//! | `SENTINELA_CONFIG` | - | Path to a TOML config file |
//! | `SENTINELA_HTTP_PORT` | `8080` | Health/metrics port |
//! | `SENTINELA_DATABASE_PATH` | `./data/sentinela.db` | SQLite database path |
//! | `RUST_LOG` | `info` | Log level |

use axum::{routing::get, Json, Router};
use sentinela_config::AppConfig;
use sentinela_conversation::engine::ConversationEngine;
use sentinela_dispatcher::Dispatcher;
use sentinela_events::InMemoryEventBus;
use sentinela_scheduler::dispatcher::{SchedulerConfig, SchedulerEngine};
use sentinela_store::{
    SqliteConversationRepository, SqliteIntegrationRepository, SqliteTicketRepository,
    SqliteUserRepository, SqliteVerificationRepository,
};
use sentinela_upstream::{HttpUpstreamClient, UpstreamClient};
use sentinela_verification::duplicate::DefaultDuplicateCpfService;
use sentinela_verification::engine::{VerificationEngine, VerificationEngineConfig};
use sentinela_common::{Clock, SystemClock, UuidIdGen};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();
    sentinela_common::logging::init_logging("sentinela-server");

    info!("starting sentinela server");

    let config = AppConfig::load()?;
    info!(
        http_port = config.http.port,
        database_path = %config.store.database_path,
        "configuration loaded",
    );

    let pool = sentinela_store::pool::open(&config.store.database_path, 5).await?;

    let users = Arc::new(SqliteUserRepository::new(pool.clone()));
    let verifications = Arc::new(SqliteVerificationRepository::new(pool.clone(), config.verification.cpf_hash_salt.clone()));
    let tickets = Arc::new(SqliteTicketRepository::new(pool.clone()));
    let conversations = Arc::new(SqliteConversationRepository::new(pool.clone()));
    let integrations = Arc::new(SqliteIntegrationRepository::new(pool.clone()));

    let upstream = Arc::new(HttpUpstreamClient::new(
        config.upstream.base_url.clone(),
        config.upstream.username.clone(),
        config.upstream.password.clone(),
        Duration::from_secs(config.upstream.request_timeout_seconds),
    ));

    let events = Arc::new(InMemoryEventBus::new(
        config.events.max_concurrent_handlers,
        Duration::from_secs(config.events.handler_timeout_seconds),
    ));

    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let ids = Arc::new(UuidIdGen);
    let duplicates = Arc::new(DefaultDuplicateCpfService::new(users.clone()));

    let verification_engine = VerificationEngine::new(
        verifications,
        users.clone(),
        upstream.clone(),
        events.clone(),
        duplicates,
        clock.clone(),
        ids.clone(),
        VerificationEngineConfig {
            expiry_hours: config.verification.expiry_hours,
            per_user_24h_cap: config.verification.per_user_24h_cap,
            cpf_hash_salt: config.verification.cpf_hash_salt.clone(),
        },
    );

    let conversation_engine = Arc::new(ConversationEngine::new(
        conversations,
        tickets.clone(),
        events.clone(),
        clock.clone(),
        ids.clone(),
    ));

    let health_probe_upstream = upstream.clone();
    let breaker_probe_interval = Duration::from_secs(config.scheduler.circuit_breaker_probe_interval_seconds);

    let callback = Arc::new(sentinela_dispatcher::ConversationSyncCallback::new(conversation_engine.clone()));
    let scheduler_engine = SchedulerEngine::new(
        integrations,
        upstream,
        events,
        clock,
        ids,
        callback,
        SchedulerConfig {
            max_rpm: config.upstream.max_requests_per_minute,
            breaker_threshold: config.scheduler.circuit_breaker_threshold,
            breaker_probe_interval,
            cache_max_size: config.cache.max_size,
            cache_default_ttl: chrono::Duration::seconds(config.cache.default_ttl_seconds as i64),
            default_max_retries: config.scheduler.max_retries_default,
            default_timeout: chrono::Duration::seconds(config.upstream.request_timeout_seconds as i64),
            poll_interval: Duration::from_secs(1),
        },
    );

    let dispatcher = Arc::new(Dispatcher::new(
        verification_engine,
        conversation_engine,
        scheduler_engine,
        tickets,
        users,
    ));
    info!("engines wired, dispatcher ready");

    let dispatch_loop = {
        let dispatcher = dispatcher.clone();
        tokio::spawn(async move {
            dispatcher.scheduler().run().await;
        })
    };

    let sweep_loop = tokio::spawn(run_sweeps(dispatcher.clone()));

    let health_probe_loop = {
        let dispatcher = dispatcher.clone();
        tokio::spawn(run_health_probe(dispatcher, health_probe_upstream, breaker_probe_interval))
    };

    let app = Router::new()
        .route("/health", get(health_handler))
        .route("/ready", get(ready_handler))
        .layer(TraceLayer::new_for_http());

    let addr = format!("{}:{}", config.http.host, config.http.port);
    info!(%addr, "health/metrics surface listening");
    let listener = TcpListener::bind(&addr).await?;

    let http_task = tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app).await {
            warn!(error = %e, "http server exited");
        }
    });

    shutdown_signal().await;
    info!("shutdown signal received");

    dispatcher.scheduler().stop();
    dispatch_loop.abort();
    sweep_loop.abort();
    health_probe_loop.abort();
    http_task.abort();

    info!("sentinela server stopped");
    Ok(())
}

/// Runs the periodic housekeeping Dispatcher can't trigger on its own:
/// expiring stale verifications, timing out idle conversations, and
/// re-enqueueing integrations the scheduler gave up on.
async fn run_sweeps(dispatcher: Arc<Dispatcher>) {
    let mut ticker = tokio::time::interval(Duration::from_secs(60));
    loop {
        ticker.tick().await;

        let expired = dispatcher.process_expired_verifications().await;
        if !expired.ok {
            warn!(error_code = ?expired.error_code, "verification expiry sweep failed");
        }

        let timed_out = dispatcher.conversation_timeout_sweep().await;
        if !timed_out.ok {
            warn!(error_code = ?timed_out.error_code, "conversation timeout sweep failed");
        }

        let retried = dispatcher.retry_failed_integrations().await;
        if !retried.ok {
            warn!(error_code = ?retried.error_code, "integration retry sweep failed");
        }

        let expired_cache_entries = dispatcher.scheduler().cache().clear_expired(chrono::Utc::now());
        if expired_cache_entries > 0 {
            info!(expired_cache_entries, "swept expired cache entries");
        }
    }
}

/// Drives the circuit breaker from a dedicated upstream health check on its
/// own `breaker_probe_interval` cadence, independent of the self-healing
/// admission check `dispatch_once` performs on ordinary dispatch. Without
/// this, an idle queue (no pending integrations) would never let the
/// breaker re-close on its own.
async fn run_health_probe(dispatcher: Arc<Dispatcher>, upstream: Arc<HttpUpstreamClient>, interval: Duration) {
    let mut ticker = tokio::time::interval(interval);
    loop {
        ticker.tick().await;
        match upstream.check_health().await {
            Ok(report) if report.healthy => {
                dispatcher.scheduler().breaker().record_success();
            }
            Ok(report) => {
                warn!(response_time_ms = report.response_time_ms, "upstream health probe reported unhealthy");
                dispatcher.scheduler().breaker().record_failure();
            }
            Err(err) => {
                warn!(error = %err, "upstream health probe failed");
                dispatcher.scheduler().breaker().record_failure();
            }
        }
    }
}

async fn health_handler() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": "UP", "version": env!("CARGO_PKG_VERSION") }))
}

async fn ready_handler() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": "READY" }))
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c().await.expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
