//! SQLite-backed `TicketRepository` and `ConversationRepository`.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sentinela_common::{ConversationId, SystemError, TicketId, UserId};
use sentinela_conversation::category::{GameTitle, ProblemTiming, TicketCategory};
use sentinela_conversation::conversation::{ConversationState, FormData, SupportConversation};
use sentinela_conversation::protocol::Protocol;
use sentinela_conversation::repository::{ConversationRepository, TicketRepository};
use sentinela_conversation::ticket::{SyncStatus, Ticket, TicketAttachment, TicketMessage, TicketStatus, UrgencyLevel};
use sqlx::{Pool, Row, Sqlite};
use uuid::Uuid;

fn ticket_status_str(s: TicketStatus) -> &'static str {
    s.as_str()
}

fn ticket_status_from_str(s: &str) -> Result<TicketStatus, SystemError> {
    match s {
        "pending" => Ok(TicketStatus::Pending),
        "open" => Ok(TicketStatus::Open),
        "in_progress" => Ok(TicketStatus::InProgress),
        "resolved" => Ok(TicketStatus::Resolved),
        "closed" => Ok(TicketStatus::Closed),
        "cancelled" => Ok(TicketStatus::Cancelled),
        other => Err(SystemError::Database(format!("unknown ticket status {other}"))),
    }
}

fn urgency_str(u: UrgencyLevel) -> &'static str {
    u.as_str()
}

fn urgency_from_str(s: &str) -> Result<UrgencyLevel, SystemError> {
    match s {
        "low" => Ok(UrgencyLevel::Low),
        "normal" => Ok(UrgencyLevel::Normal),
        "high" => Ok(UrgencyLevel::High),
        "critical" => Ok(UrgencyLevel::Critical),
        other => Err(SystemError::Database(format!("unknown urgency {other}"))),
    }
}

fn sync_status_str(s: &SyncStatus) -> &'static str {
    match s {
        SyncStatus::Pending => "pending",
        SyncStatus::Synced => "synced",
        SyncStatus::Failed => "failed",
    }
}

fn sync_status_from_str(s: &str) -> Result<SyncStatus, SystemError> {
    match s {
        "pending" => Ok(SyncStatus::Pending),
        "synced" => Ok(SyncStatus::Synced),
        "failed" => Ok(SyncStatus::Failed),
        other => Err(SystemError::Database(format!("unknown sync status {other}"))),
    }
}

fn conversation_state_str(s: ConversationState) -> &'static str {
    match s {
        ConversationState::CategorySelection => "category_selection",
        ConversationState::GameSelection => "game_selection",
        ConversationState::TimingSelection => "timing_selection",
        ConversationState::DescriptionInput => "description_input",
        ConversationState::AttachmentsOptional => "attachments_optional",
        ConversationState::Confirmation => "confirmation",
        ConversationState::Completed => "completed",
        ConversationState::Cancelled => "cancelled",
    }
}

fn conversation_state_from_str(s: &str) -> Result<ConversationState, SystemError> {
    match s {
        "category_selection" => Ok(ConversationState::CategorySelection),
        "game_selection" => Ok(ConversationState::GameSelection),
        "timing_selection" => Ok(ConversationState::TimingSelection),
        "description_input" => Ok(ConversationState::DescriptionInput),
        "attachments_optional" => Ok(ConversationState::AttachmentsOptional),
        "confirmation" => Ok(ConversationState::Confirmation),
        "completed" => Ok(ConversationState::Completed),
        "cancelled" => Ok(ConversationState::Cancelled),
        other => Err(SystemError::Database(format!("unknown conversation state {other}"))),
    }
}

pub struct SqliteTicketRepository {
    pool: Pool<Sqlite>,
}

impl SqliteTicketRepository {
    pub fn new(pool: Pool<Sqlite>) -> Self {
        Self { pool }
    }

    fn row_to_ticket(row: &sqlx::sqlite::SqliteRow) -> Result<Ticket, SystemError> {
        let affected_game_json: String = row.try_get("affected_game_json")?;
        let protocol_json: Option<String> = row.try_get("protocol_json")?;
        let attachments_json: String = row.try_get("attachments_json")?;
        let messages_json: String = row.try_get("messages_json")?;
        Ok(Ticket {
            id: TicketId(row.try_get("id")?),
            owner_id: UserId(row.try_get("owner_id")?),
            owner_username: row.try_get("owner_username")?,
            category: TicketCategory::from_str(&row.try_get::<String, _>("category")?).map_err(|e| SystemError::Database(e.message().to_string()))?,
            affected_game: serde_json::from_str::<GameTitle>(&affected_game_json)?,
            problem_timing: ProblemTiming::from_str(&row.try_get::<String, _>("problem_timing")?).map_err(|e| SystemError::Database(e.message().to_string()))?,
            description: row.try_get("description")?,
            urgency: urgency_from_str(&row.try_get::<String, _>("urgency")?)?,
            status: ticket_status_from_str(&row.try_get::<String, _>("status")?)?,
            assignee: row.try_get("assignee")?,
            resolution_notes: row.try_get("resolution_notes")?,
            upstream_id: row.try_get("upstream_id")?,
            protocol: protocol_json.map(|j| serde_json::from_str(&j)).transpose()?,
            sync_status: sync_status_from_str(&row.try_get::<String, _>("sync_status")?)?,
            sync_error: row.try_get("sync_error")?,
            attachments: serde_json::from_str::<Vec<TicketAttachment>>(&attachments_json)?,
            messages: serde_json::from_str::<Vec<TicketMessage>>(&messages_json)?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
            resolved_at: row.try_get("resolved_at")?,
        })
    }
}

#[async_trait]
impl TicketRepository for SqliteTicketRepository {
    async fn save(&self, ticket: &mut Ticket) -> Result<(), SystemError> {
        let affected_game_json = serde_json::to_string(&ticket.affected_game)?;
        let protocol_json = ticket.protocol.as_ref().map(serde_json::to_string).transpose()?;
        let attachments_json = serde_json::to_string(&ticket.attachments)?;
        let messages_json = serde_json::to_string(&ticket.messages)?;

        if ticket.id.0 == 0 {
            let result = sqlx::query(
                r#"
                INSERT INTO tickets (
                    owner_id, owner_username, category, affected_game_json, problem_timing, description,
                    urgency, status, assignee, resolution_notes, upstream_id, protocol_json, sync_status,
                    sync_error, attachments_json, messages_json, created_at, updated_at, resolved_at
                ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(ticket.owner_id.0)
            .bind(&ticket.owner_username)
            .bind(ticket.category.as_str())
            .bind(&affected_game_json)
            .bind(ticket.problem_timing.as_str())
            .bind(&ticket.description)
            .bind(urgency_str(ticket.urgency))
            .bind(ticket_status_str(ticket.status))
            .bind(&ticket.assignee)
            .bind(&ticket.resolution_notes)
            .bind(&ticket.upstream_id)
            .bind(&protocol_json)
            .bind(sync_status_str(&ticket.sync_status))
            .bind(&ticket.sync_error)
            .bind(&attachments_json)
            .bind(&messages_json)
            .bind(ticket.created_at)
            .bind(ticket.updated_at)
            .bind(ticket.resolved_at)
            .execute(&self.pool)
            .await?;
            ticket.id = TicketId(result.last_insert_rowid());
            return Ok(());
        }

        sqlx::query(
            r#"
            UPDATE tickets SET
                category = ?, affected_game_json = ?, problem_timing = ?, description = ?, urgency = ?,
                status = ?, assignee = ?, resolution_notes = ?, upstream_id = ?, protocol_json = ?,
                sync_status = ?, sync_error = ?, attachments_json = ?, messages_json = ?,
                updated_at = ?, resolved_at = ?
            WHERE id = ?
            "#,
        )
        .bind(ticket.category.as_str())
        .bind(&affected_game_json)
        .bind(ticket.problem_timing.as_str())
        .bind(&ticket.description)
        .bind(urgency_str(ticket.urgency))
        .bind(ticket_status_str(ticket.status))
        .bind(&ticket.assignee)
        .bind(&ticket.resolution_notes)
        .bind(&ticket.upstream_id)
        .bind(&protocol_json)
        .bind(sync_status_str(&ticket.sync_status))
        .bind(&ticket.sync_error)
        .bind(&attachments_json)
        .bind(&messages_json)
        .bind(ticket.updated_at)
        .bind(ticket.resolved_at)
        .bind(ticket.id.0)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn find_by_id(&self, id: TicketId) -> Result<Option<Ticket>, SystemError> {
        let row = sqlx::query("SELECT * FROM tickets WHERE id = ?").bind(id.0).fetch_optional(&self.pool).await?;
        row.as_ref().map(Self::row_to_ticket).transpose()
    }

    async fn find_by_user(&self, user_id: UserId, limit: usize) -> Result<Vec<Ticket>, SystemError> {
        let rows = sqlx::query("SELECT * FROM tickets WHERE owner_id = ? ORDER BY created_at DESC LIMIT ?")
            .bind(user_id.0)
            .bind(limit as i64)
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(Self::row_to_ticket).collect()
    }

    async fn find_by_status(&self, status: TicketStatus, limit: usize) -> Result<Vec<Ticket>, SystemError> {
        let rows = sqlx::query("SELECT * FROM tickets WHERE status = ? ORDER BY created_at ASC LIMIT ?")
            .bind(ticket_status_str(status))
            .bind(limit as i64)
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(Self::row_to_ticket).collect()
    }

    async fn find_sync_pending(&self, limit: usize) -> Result<Vec<Ticket>, SystemError> {
        let rows = sqlx::query(
            "SELECT * FROM tickets WHERE sync_status IN ('pending', 'failed') AND upstream_id IS NULL ORDER BY created_at ASC LIMIT ?",
        )
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(Self::row_to_ticket).collect()
    }

    async fn delete(&self, id: TicketId) -> Result<bool, SystemError> {
        let result = sqlx::query("DELETE FROM tickets WHERE id = ?").bind(id.0).execute(&self.pool).await?;
        Ok(result.rows_affected() > 0)
    }
}

pub struct SqliteConversationRepository {
    pool: Pool<Sqlite>,
}

impl SqliteConversationRepository {
    pub fn new(pool: Pool<Sqlite>) -> Self {
        Self { pool }
    }

    fn row_to_conversation(row: &sqlx::sqlite::SqliteRow) -> Result<SupportConversation, SystemError> {
        let id: String = row.try_get("id")?;
        let form_json: String = row.try_get("form_json")?;
        let ticket_id: Option<i64> = row.try_get("ticket_id")?;
        Ok(SupportConversation {
            id: ConversationId(Uuid::parse_str(&id).map_err(|e| SystemError::Database(e.to_string()))?),
            user_id: UserId(row.try_get("user_id")?),
            username: row.try_get("username")?,
            state: conversation_state_from_str(&row.try_get::<String, _>("state")?)?,
            current_step: row.try_get::<i64, _>("current_step")? as u8,
            form: serde_json::from_str::<FormData>(&form_json)?,
            is_active: row.try_get::<i64, _>("is_active")? != 0,
            ticket_id: ticket_id.map(TicketId),
            created_at: row.try_get("created_at")?,
            last_activity_at: row.try_get("last_activity_at")?,
            completed_at: row.try_get("completed_at")?,
        })
    }
}

#[async_trait]
impl ConversationRepository for SqliteConversationRepository {
    async fn save(&self, conversation: &SupportConversation) -> Result<(), SystemError> {
        let form_json = serde_json::to_string(&conversation.form)?;
        sqlx::query(
            r#"
            INSERT INTO conversations (
                id, user_id, username, state, current_step, form_json, is_active, ticket_id,
                created_at, last_activity_at, completed_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(id) DO UPDATE SET
                state = excluded.state,
                current_step = excluded.current_step,
                form_json = excluded.form_json,
                is_active = excluded.is_active,
                ticket_id = excluded.ticket_id,
                last_activity_at = excluded.last_activity_at,
                completed_at = excluded.completed_at
            "#,
        )
        .bind(conversation.id.0.to_string())
        .bind(conversation.user_id.0)
        .bind(&conversation.username)
        .bind(conversation_state_str(conversation.state))
        .bind(conversation.current_step as i64)
        .bind(&form_json)
        .bind(conversation.is_active as i64)
        .bind(conversation.ticket_id.map(|t| t.0))
        .bind(conversation.created_at)
        .bind(conversation.last_activity_at)
        .bind(conversation.completed_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn find_by_id(&self, id: ConversationId) -> Result<Option<SupportConversation>, SystemError> {
        let row = sqlx::query("SELECT * FROM conversations WHERE id = ?")
            .bind(id.0.to_string())
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(Self::row_to_conversation).transpose()
    }

    async fn find_active_by_user(&self, user_id: UserId) -> Result<Option<SupportConversation>, SystemError> {
        let row = sqlx::query("SELECT * FROM conversations WHERE user_id = ? AND is_active = 1 LIMIT 1")
            .bind(user_id.0)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(Self::row_to_conversation).transpose()
    }

    async fn find_idle_before(&self, idle_before: DateTime<Utc>, limit: usize) -> Result<Vec<SupportConversation>, SystemError> {
        let rows = sqlx::query("SELECT * FROM conversations WHERE is_active = 1 AND last_activity_at < ? LIMIT ?")
            .bind(idle_before)
            .bind(limit as i64)
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(Self::row_to_conversation).collect()
    }

    async fn delete(&self, id: ConversationId) -> Result<bool, SystemError> {
        let result = sqlx::query("DELETE FROM conversations WHERE id = ?").bind(id.0.to_string()).execute(&self.pool).await?;
        Ok(result.rows_affected() > 0)
    }
}
