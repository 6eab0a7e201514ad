//! SQLite-backed `UserRepository` and `VerificationRepository`.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sentinela_common::{Cpf, SystemError, UserId, VerificationId};
use sentinela_verification::domain::{
    ServiceDescriptor, User, UserStatus, VerificationAttempt, VerificationRequest, VerificationStatus, VerificationType,
};
use sentinela_verification::repository::{UserRepository, VerificationRepository};
use sqlx::{Pool, Row, Sqlite};
use uuid::Uuid;

fn user_status_str(s: UserStatus) -> &'static str {
    match s {
        UserStatus::PendingVerification => "pending_verification",
        UserStatus::Active => "active",
        UserStatus::Inactive => "inactive",
        UserStatus::Suspended => "suspended",
    }
}

fn user_status_from_str(s: &str) -> Result<UserStatus, SystemError> {
    match s {
        "pending_verification" => Ok(UserStatus::PendingVerification),
        "active" => Ok(UserStatus::Active),
        "inactive" => Ok(UserStatus::Inactive),
        "suspended" => Ok(UserStatus::Suspended),
        other => Err(SystemError::Database(format!("unknown user status {other}"))),
    }
}

fn verification_type_str(t: VerificationType) -> &'static str {
    t.as_str()
}

fn verification_type_from_str(s: &str) -> Result<VerificationType, SystemError> {
    match s {
        "auto_checkup" => Ok(VerificationType::AutoCheckup),
        "support_request" => Ok(VerificationType::SupportRequest),
        "manual_review" => Ok(VerificationType::ManualReview),
        "security_check" => Ok(VerificationType::SecurityCheck),
        other => Err(SystemError::Database(format!("unknown verification type {other}"))),
    }
}

fn verification_status_str(s: VerificationStatus) -> &'static str {
    match s {
        VerificationStatus::Pending => "pending",
        VerificationStatus::InProgress => "in_progress",
        VerificationStatus::Completed => "completed",
        VerificationStatus::Failed => "failed",
        VerificationStatus::Expired => "expired",
        VerificationStatus::Cancelled => "cancelled",
    }
}

fn verification_status_from_str(s: &str) -> Result<VerificationStatus, SystemError> {
    match s {
        "pending" => Ok(VerificationStatus::Pending),
        "in_progress" => Ok(VerificationStatus::InProgress),
        "completed" => Ok(VerificationStatus::Completed),
        "failed" => Ok(VerificationStatus::Failed),
        "expired" => Ok(VerificationStatus::Expired),
        "cancelled" => Ok(VerificationStatus::Cancelled),
        other => Err(SystemError::Database(format!("unknown verification status {other}"))),
    }
}

pub struct SqliteUserRepository {
    pool: Pool<Sqlite>,
}

impl SqliteUserRepository {
    pub fn new(pool: Pool<Sqlite>) -> Self {
        Self { pool }
    }

    fn row_to_user(row: &sqlx::sqlite::SqliteRow) -> Result<User, SystemError> {
        let cpf: Option<String> = row.try_get("cpf")?;
        let service_json: Option<String> = row.try_get("service_json")?;
        Ok(User {
            id: UserId(row.try_get("id")?),
            username: row.try_get("username")?,
            cpf: cpf.map(|c| Cpf::from_raw(&c)).transpose().map_err(|_| SystemError::Database("corrupt cpf column".into()))?,
            cpf_hash: row.try_get("cpf_hash")?,
            client_name: row.try_get("client_name")?,
            service: service_json.map(|j| serde_json::from_str(&j)).transpose()?,
            status: user_status_from_str(&row.try_get::<String, _>("status")?)?,
            is_admin: row.try_get::<i64, _>("is_admin")? != 0,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }
}

#[async_trait]
impl UserRepository for SqliteUserRepository {
    async fn save(&self, user: &User) -> Result<(), SystemError> {
        let service_json = user.service.as_ref().map(serde_json::to_string).transpose()?;
        sqlx::query(
            r#"
            INSERT INTO users (id, username, cpf, cpf_hash, client_name, service_json, status, is_admin, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(id) DO UPDATE SET
                username = excluded.username,
                cpf = excluded.cpf,
                cpf_hash = excluded.cpf_hash,
                client_name = excluded.client_name,
                service_json = excluded.service_json,
                status = excluded.status,
                is_admin = excluded.is_admin,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(user.id.0)
        .bind(&user.username)
        .bind(user.cpf.as_ref().map(|c| c.canonical()))
        .bind(&user.cpf_hash)
        .bind(&user.client_name)
        .bind(&service_json)
        .bind(user_status_str(user.status))
        .bind(user.is_admin as i64)
        .bind(user.created_at)
        .bind(user.updated_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn find_by_id(&self, id: UserId) -> Result<Option<User>, SystemError> {
        let row = sqlx::query("SELECT * FROM users WHERE id = ?").bind(id.0).fetch_optional(&self.pool).await?;
        row.as_ref().map(Self::row_to_user).transpose()
    }

    async fn find_by_cpf_hash(&self, cpf_hash: &str) -> Result<Option<User>, SystemError> {
        let row = sqlx::query("SELECT * FROM users WHERE cpf_hash = ?").bind(cpf_hash).fetch_optional(&self.pool).await?;
        row.as_ref().map(Self::row_to_user).transpose()
    }

    async fn find_active_by_cpf_hash(&self, cpf_hash: &str, excluding: UserId) -> Result<Vec<User>, SystemError> {
        let rows = sqlx::query("SELECT * FROM users WHERE cpf_hash = ? AND status = ? AND id != ?")
            .bind(cpf_hash)
            .bind(user_status_str(UserStatus::Active))
            .bind(excluding.0)
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(Self::row_to_user).collect()
    }

    async fn delete(&self, id: UserId) -> Result<bool, SystemError> {
        let result = sqlx::query("DELETE FROM users WHERE id = ?").bind(id.0).execute(&self.pool).await?;
        Ok(result.rows_affected() > 0)
    }
}

pub struct SqliteVerificationRepository {
    pool: Pool<Sqlite>,
    /// The salt this store precomputes `cpf_hash` with at write time.
    /// Must be the one the verification engine is configured with, or
    /// `find_by_cpf_hash` will silently stop matching.
    salt: String,
}

impl SqliteVerificationRepository {
    pub fn new(pool: Pool<Sqlite>, salt: impl Into<String>) -> Self {
        Self { pool, salt: salt.into() }
    }

    fn row_to_request(row: &sqlx::sqlite::SqliteRow) -> Result<VerificationRequest, SystemError> {
        let id: String = row.try_get("id")?;
        let attempts_json: String = row.try_get("attempts_json")?;
        let verified_cpf: Option<String> = row.try_get("verified_cpf")?;
        let client_snapshot_json: Option<String> = row.try_get("client_snapshot_json")?;
        let duplicate_pending_cpf: Option<String> = row.try_get("duplicate_pending_cpf")?;
        Ok(VerificationRequest {
            id: VerificationId(Uuid::parse_str(&id).map_err(|e| SystemError::Database(e.to_string()))?),
            user_id: UserId(row.try_get("user_id")?),
            username: row.try_get("username")?,
            user_mention: row.try_get("user_mention")?,
            verification_type: verification_type_from_str(&row.try_get::<String, _>("verification_type")?)?,
            source_action: row.try_get("source_action")?,
            status: verification_status_from_str(&row.try_get::<String, _>("status")?)?,
            created_at: row.try_get("created_at")?,
            expires_at: row.try_get("expires_at")?,
            completed_at: row.try_get("completed_at")?,
            attempts: serde_json::from_str::<Vec<VerificationAttempt>>(&attempts_json)?,
            verified_cpf: verified_cpf.map(|c| Cpf::from_raw(&c)).transpose().map_err(|_| SystemError::Database("corrupt cpf column".into()))?,
            client_snapshot: client_snapshot_json.map(|j| serde_json::from_str(&j)).transpose()?,
            client_name: row.try_get("client_name")?,
            duplicate_pending_cpf: duplicate_pending_cpf
                .map(|c| Cpf::from_raw(&c))
                .transpose()
                .map_err(|_| SystemError::Database("corrupt cpf column".into()))?,
        })
    }
}

#[async_trait]
impl VerificationRepository for SqliteVerificationRepository {
    async fn save(&self, request: &VerificationRequest) -> Result<(), SystemError> {
        let attempts_json = serde_json::to_string(&request.attempts)?;
        let client_snapshot_json = request.client_snapshot.as_ref().map(serde_json::to_string).transpose()?;
        let cpf_hash = request.cpf_hash(&self.salt);
        sqlx::query(
            r#"
            INSERT INTO verifications (
                id, user_id, username, user_mention, verification_type, source_action, status,
                created_at, expires_at, completed_at, attempts_json, verified_cpf,
                client_snapshot_json, client_name, duplicate_pending_cpf, cpf_hash
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(id) DO UPDATE SET
                status = excluded.status,
                completed_at = excluded.completed_at,
                attempts_json = excluded.attempts_json,
                verified_cpf = excluded.verified_cpf,
                client_snapshot_json = excluded.client_snapshot_json,
                client_name = excluded.client_name,
                duplicate_pending_cpf = excluded.duplicate_pending_cpf,
                cpf_hash = excluded.cpf_hash
            "#,
        )
        .bind(request.id.0.to_string())
        .bind(request.user_id.0)
        .bind(&request.username)
        .bind(&request.user_mention)
        .bind(verification_type_str(request.verification_type))
        .bind(&request.source_action)
        .bind(verification_status_str(request.status))
        .bind(request.created_at)
        .bind(request.expires_at)
        .bind(request.completed_at)
        .bind(&attempts_json)
        .bind(request.verified_cpf.as_ref().map(|c| c.canonical()))
        .bind(&client_snapshot_json)
        .bind(&request.client_name)
        .bind(request.duplicate_pending_cpf.as_ref().map(|c| c.canonical()))
        .bind(&cpf_hash)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn find_by_id(&self, id: VerificationId) -> Result<Option<VerificationRequest>, SystemError> {
        let row = sqlx::query("SELECT * FROM verifications WHERE id = ?")
            .bind(id.0.to_string())
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(Self::row_to_request).transpose()
    }

    async fn find_pending_by_user(&self, user_id: UserId) -> Result<Option<VerificationRequest>, SystemError> {
        let row = sqlx::query("SELECT * FROM verifications WHERE user_id = ? AND status IN ('pending', 'in_progress') LIMIT 1")
            .bind(user_id.0)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(Self::row_to_request).transpose()
    }

    async fn find_expiring_before(&self, t: DateTime<Utc>, limit: usize) -> Result<Vec<VerificationRequest>, SystemError> {
        let rows = sqlx::query(
            "SELECT * FROM verifications WHERE expires_at < ? AND status IN ('pending', 'in_progress') LIMIT ?",
        )
        .bind(t)
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(Self::row_to_request).collect()
    }

    async fn find_by_cpf_hash(&self, cpf_hash: &str, salt: &str, limit: usize) -> Result<Vec<VerificationRequest>, SystemError> {
        debug_assert_eq!(salt, self.salt, "caller's salt must match the one this store was opened with");
        let rows = sqlx::query("SELECT * FROM verifications WHERE cpf_hash = ? LIMIT ?")
            .bind(cpf_hash)
            .bind(limit as i64)
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(Self::row_to_request).collect()
    }

    async fn count_attempts_since(&self, user_id: UserId, since: DateTime<Utc>) -> Result<usize, SystemError> {
        let rows = sqlx::query("SELECT attempts_json FROM verifications WHERE user_id = ?")
            .bind(user_id.0)
            .fetch_all(&self.pool)
            .await?;
        let mut count = 0usize;
        for row in rows {
            let attempts_json: String = row.try_get("attempts_json")?;
            let attempts: Vec<VerificationAttempt> = serde_json::from_str(&attempts_json)?;
            count += attempts.iter().filter(|a| a.attempted_at >= since).count();
        }
        Ok(count)
    }

    async fn delete(&self, id: VerificationId) -> Result<bool, SystemError> {
        let result = sqlx::query("DELETE FROM verifications WHERE id = ?").bind(id.0.to_string()).execute(&self.pool).await?;
        Ok(result.rows_affected() > 0)
    }
}
