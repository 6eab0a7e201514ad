//! Schema initialization, following the `CREATE TABLE IF NOT EXISTS` +
//! `CREATE INDEX IF NOT EXISTS` pattern used throughout this store.

use sentinela_common::SystemError;
use sqlx::{Pool, Sqlite};

pub async fn create_schema(pool: &Pool<Sqlite>) -> Result<(), SystemError> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS users (
            id INTEGER PRIMARY KEY,
            username TEXT NOT NULL,
            cpf TEXT,
            cpf_hash TEXT,
            client_name TEXT,
            service_json TEXT,
            status TEXT NOT NULL,
            is_admin INTEGER NOT NULL,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_users_cpf_hash ON users (cpf_hash)")
        .execute(pool)
        .await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_users_cpf ON users (cpf)")
        .execute(pool)
        .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS verifications (
            id TEXT PRIMARY KEY,
            user_id INTEGER NOT NULL,
            username TEXT NOT NULL,
            user_mention TEXT NOT NULL,
            verification_type TEXT NOT NULL,
            source_action TEXT,
            status TEXT NOT NULL,
            created_at TEXT NOT NULL,
            expires_at TEXT NOT NULL,
            completed_at TEXT,
            attempts_json TEXT NOT NULL,
            verified_cpf TEXT,
            client_snapshot_json TEXT,
            client_name TEXT,
            duplicate_pending_cpf TEXT,
            cpf_hash TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_verifications_user_status ON verifications (user_id, status)")
        .execute(pool)
        .await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_verifications_expires_at ON verifications (expires_at)")
        .execute(pool)
        .await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_verifications_cpf_hash ON verifications (cpf_hash)")
        .execute(pool)
        .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS tickets (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            owner_id INTEGER NOT NULL,
            owner_username TEXT NOT NULL,
            category TEXT NOT NULL,
            affected_game_json TEXT NOT NULL,
            problem_timing TEXT NOT NULL,
            description TEXT NOT NULL,
            urgency TEXT NOT NULL,
            status TEXT NOT NULL,
            assignee TEXT,
            resolution_notes TEXT,
            upstream_id TEXT,
            protocol_json TEXT,
            sync_status TEXT NOT NULL,
            sync_error TEXT,
            attachments_json TEXT NOT NULL,
            messages_json TEXT NOT NULL,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL,
            resolved_at TEXT
        )
        "#,
    )
    .execute(pool)
    .await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_tickets_owner ON tickets (owner_id)")
        .execute(pool)
        .await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_tickets_status ON tickets (status)")
        .execute(pool)
        .await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_tickets_sync_status ON tickets (sync_status)")
        .execute(pool)
        .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS conversations (
            id TEXT PRIMARY KEY,
            user_id INTEGER NOT NULL,
            username TEXT NOT NULL,
            state TEXT NOT NULL,
            current_step INTEGER NOT NULL,
            form_json TEXT NOT NULL,
            is_active INTEGER NOT NULL,
            ticket_id INTEGER,
            created_at TEXT NOT NULL,
            last_activity_at TEXT NOT NULL,
            completed_at TEXT
        )
        "#,
    )
    .execute(pool)
    .await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_conversations_user_active ON conversations (user_id, is_active)")
        .execute(pool)
        .await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_conversations_last_activity ON conversations (last_activity_at)")
        .execute(pool)
        .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS integrations (
            id TEXT PRIMARY KEY,
            integration_type TEXT NOT NULL,
            priority TEXT NOT NULL,
            status TEXT NOT NULL,
            payload_json TEXT NOT NULL,
            metadata_json TEXT NOT NULL,
            max_retries INTEGER NOT NULL,
            timeout_secs INTEGER NOT NULL,
            scheduled_at TEXT NOT NULL,
            started_at TEXT,
            completed_at TEXT,
            response_json TEXT,
            error_code TEXT,
            error_message TEXT,
            attempts_json TEXT NOT NULL,
            force_retry INTEGER NOT NULL,
            created_at TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_integrations_status ON integrations (status)")
        .execute(pool)
        .await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_integrations_priority ON integrations (priority)")
        .execute(pool)
        .await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_integrations_scheduled_at ON integrations (scheduled_at)")
        .execute(pool)
        .await?;

    Ok(())
}
