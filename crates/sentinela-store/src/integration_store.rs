//! SQLite-backed `IntegrationRepository`.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sentinela_common::{IntegrationId, SystemError};
use sentinela_scheduler::request::{IntegrationAttempt, IntegrationRepository, IntegrationRequest, IntegrationStatus, IntegrationType, Priority};
use sqlx::{Pool, Row, Sqlite};
use std::collections::HashMap;
use uuid::Uuid;

fn integration_type_str(t: IntegrationType) -> &'static str {
    t.as_str()
}

fn integration_type_from_str(s: &str) -> Result<IntegrationType, SystemError> {
    match s {
        "ticket_sync" => Ok(IntegrationType::TicketSync),
        "user_verification" => Ok(IntegrationType::UserVerification),
        "client_data_fetch" => Ok(IntegrationType::ClientDataFetch),
        "bulk_sync" => Ok(IntegrationType::BulkSync),
        "status_update" => Ok(IntegrationType::StatusUpdate),
        other => Err(SystemError::Database(format!("unknown integration type {other}"))),
    }
}

fn integration_status_str(s: IntegrationStatus) -> &'static str {
    s.as_str()
}

fn integration_status_from_str(s: &str) -> Result<IntegrationStatus, SystemError> {
    match s {
        "pending" => Ok(IntegrationStatus::Pending),
        "scheduled" => Ok(IntegrationStatus::Scheduled),
        "in_progress" => Ok(IntegrationStatus::InProgress),
        "completed" => Ok(IntegrationStatus::Completed),
        "failed" => Ok(IntegrationStatus::Failed),
        "cancelled" => Ok(IntegrationStatus::Cancelled),
        other => Err(SystemError::Database(format!("unknown integration status {other}"))),
    }
}

pub struct SqliteIntegrationRepository {
    pool: Pool<Sqlite>,
}

impl SqliteIntegrationRepository {
    pub fn new(pool: Pool<Sqlite>) -> Self {
        Self { pool }
    }

    fn row_to_request(row: &sqlx::sqlite::SqliteRow) -> Result<IntegrationRequest, SystemError> {
        let id: String = row.try_get("id")?;
        let payload_json: String = row.try_get("payload_json")?;
        let metadata_json: String = row.try_get("metadata_json")?;
        let response_json: Option<String> = row.try_get("response_json")?;
        let attempts_json: String = row.try_get("attempts_json")?;
        Ok(IntegrationRequest {
            id: IntegrationId(Uuid::parse_str(&id).map_err(|e| SystemError::Database(e.to_string()))?),
            integration_type: integration_type_from_str(&row.try_get::<String, _>("integration_type")?)?,
            priority: Priority::from_str(&row.try_get::<String, _>("priority")?).map_err(|e| SystemError::Database(e.message().to_string()))?,
            status: integration_status_from_str(&row.try_get::<String, _>("status")?)?,
            payload: serde_json::from_str(&payload_json)?,
            metadata: serde_json::from_str::<HashMap<String, serde_json::Value>>(&metadata_json)?,
            max_retries: row.try_get::<i64, _>("max_retries")? as u32,
            timeout: chrono::Duration::seconds(row.try_get::<i64, _>("timeout_secs")?),
            scheduled_at: row.try_get("scheduled_at")?,
            started_at: row.try_get("started_at")?,
            completed_at: row.try_get("completed_at")?,
            response: response_json.map(|j| serde_json::from_str(&j)).transpose()?,
            error_code: row.try_get("error_code")?,
            error_message: row.try_get("error_message")?,
            attempts: serde_json::from_str::<Vec<IntegrationAttempt>>(&attempts_json)?,
            force_retry: row.try_get::<i64, _>("force_retry")? != 0,
            created_at: row.try_get("created_at")?,
        })
    }
}

#[async_trait]
impl IntegrationRepository for SqliteIntegrationRepository {
    async fn save(&self, request: &IntegrationRequest) -> Result<(), SystemError> {
        let payload_json = serde_json::to_string(&request.payload)?;
        let metadata_json = serde_json::to_string(&request.metadata)?;
        let response_json = request.response.as_ref().map(serde_json::to_string).transpose()?;
        let attempts_json = serde_json::to_string(&request.attempts)?;
        sqlx::query(
            r#"
            INSERT INTO integrations (
                id, integration_type, priority, status, payload_json, metadata_json, max_retries,
                timeout_secs, scheduled_at, started_at, completed_at, response_json, error_code,
                error_message, attempts_json, force_retry, created_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(id) DO UPDATE SET
                priority = excluded.priority,
                status = excluded.status,
                scheduled_at = excluded.scheduled_at,
                started_at = excluded.started_at,
                completed_at = excluded.completed_at,
                response_json = excluded.response_json,
                error_code = excluded.error_code,
                error_message = excluded.error_message,
                attempts_json = excluded.attempts_json,
                force_retry = excluded.force_retry
            "#,
        )
        .bind(request.id.0.to_string())
        .bind(integration_type_str(request.integration_type))
        .bind(request.priority.as_str())
        .bind(integration_status_str(request.status))
        .bind(&payload_json)
        .bind(&metadata_json)
        .bind(request.max_retries as i64)
        .bind(request.timeout.num_seconds())
        .bind(request.scheduled_at)
        .bind(request.started_at)
        .bind(request.completed_at)
        .bind(&response_json)
        .bind(&request.error_code)
        .bind(&request.error_message)
        .bind(&attempts_json)
        .bind(request.force_retry as i64)
        .bind(request.created_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn find_by_id(&self, id: IntegrationId) -> Result<Option<IntegrationRequest>, SystemError> {
        let row = sqlx::query("SELECT * FROM integrations WHERE id = ?")
            .bind(id.0.to_string())
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(Self::row_to_request).transpose()
    }

    async fn find_by_status(&self, status: IntegrationStatus, limit: usize) -> Result<Vec<IntegrationRequest>, SystemError> {
        let rows = sqlx::query("SELECT * FROM integrations WHERE status = ? ORDER BY created_at ASC LIMIT ?")
            .bind(integration_status_str(status))
            .bind(limit as i64)
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(Self::row_to_request).collect()
    }

    async fn find_due(&self, now: DateTime<Utc>, limit: usize) -> Result<Vec<IntegrationRequest>, SystemError> {
        let rows = sqlx::query(
            r#"
            SELECT * FROM integrations
            WHERE status IN ('pending', 'scheduled') AND scheduled_at <= ?
            ORDER BY
                CASE priority WHEN 'critical' THEN 0 WHEN 'high' THEN 1 WHEN 'normal' THEN 2 ELSE 3 END ASC,
                created_at ASC
            LIMIT ?
            "#,
        )
        .bind(now)
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(Self::row_to_request).collect()
    }

    async fn delete(&self, id: IntegrationId) -> Result<bool, SystemError> {
        let result = sqlx::query("DELETE FROM integrations WHERE id = ?").bind(id.0.to_string()).execute(&self.pool).await?;
        Ok(result.rows_affected() > 0)
    }
}
