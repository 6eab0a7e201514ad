//! Maps the inbound command surface (§6) onto the verification,
//! conversation, and scheduler engines, doing the validation that belongs
//! to the boundary itself (parsing raw strings into typed enums, building
//! integration payloads from stored aggregates) before delegating.

use crate::commands::*;
use sentinela_common::{details, Cpf, EngineError, IntegrationId, ResultEnvelope, TicketId, UserId, VerificationId};
use sentinela_conversation::engine::{AddAttachmentCommand, ConversationEngine, StartConversationCommand};
use sentinela_conversation::repository::TicketRepository;
use sentinela_conversation::ticket::{TicketAttachment, TicketStatus, UrgencyLevel};
use sentinela_scheduler::dispatcher::{ScheduleIntegrationCommand, SchedulerEngine};
use sentinela_scheduler::request::{IntegrationType, Priority};
use sentinela_upstream::TicketPayload;
use sentinela_verification::domain::VerificationType;
use sentinela_verification::engine::{
    CancelVerificationCommand, DuplicateResolution, ResolveDuplicateCommand, StartVerificationCommand, SubmitCpfCommand,
    VerificationEngine,
};
use sentinela_verification::repository::UserRepository;
use std::future::Future;
use std::sync::Arc;

/// A bulk-sync request touching more tickets than this is rejected outright
/// rather than silently truncated.
const BULK_SYNC_LIMIT: usize = 200;

/// Default chunk size and pause between chunks for a `BulkSync` request
/// that doesn't specify its own, chosen to stay well under the scheduler's
/// rate limiter budget for a burst of ticket creations.
const BULK_SYNC_DEFAULT_BATCH_SIZE: usize = 10;
const BULK_SYNC_DEFAULT_INTER_BATCH_DELAY_MS: u64 = 1000;

pub struct Dispatcher {
    verification: VerificationEngine,
    conversation: Arc<ConversationEngine>,
    scheduler: SchedulerEngine,
    tickets: Arc<dyn TicketRepository>,
    users: Arc<dyn UserRepository>,
}

async fn envelope<F>(fut: F) -> ResultEnvelope
where
    F: Future<Output = Result<ResultEnvelope, EngineError>>,
{
    fut.await.into()
}

fn priority_for_urgency(urgency: UrgencyLevel) -> Priority {
    match urgency {
        UrgencyLevel::Critical => Priority::Critical,
        UrgencyLevel::High => Priority::High,
        UrgencyLevel::Normal => Priority::Normal,
        UrgencyLevel::Low => Priority::Low,
    }
}

impl Dispatcher {
    pub fn new(
        verification: VerificationEngine,
        conversation: Arc<ConversationEngine>,
        scheduler: SchedulerEngine,
        tickets: Arc<dyn TicketRepository>,
        users: Arc<dyn UserRepository>,
    ) -> Self {
        Self {
            verification,
            conversation,
            scheduler,
            tickets,
            users,
        }
    }

    // --- Verification ---

    pub async fn start_cpf_verification(&self, cmd: StartCpfVerification) -> ResultEnvelope {
        envelope(async {
            let verification_type = VerificationType::from_str(&cmd.verification_type)?;
            self.verification
                .start_verification(StartVerificationCommand {
                    user_id: UserId(cmd.user_id),
                    username: cmd.username,
                    user_mention: cmd.user_mention,
                    verification_type,
                    source_action: cmd.source_action,
                })
                .await
        })
        .await
    }

    pub async fn submit_cpf_for_verification(&self, cmd: SubmitCpfForVerification) -> ResultEnvelope {
        envelope(self.verification.submit_cpf(SubmitCpfCommand {
            user_id: UserId(cmd.user_id),
            username: cmd.username,
            cpf_text: cmd.cpf,
        }))
        .await
    }

    pub async fn cancel_cpf_verification(&self, cmd: CancelCpfVerification) -> ResultEnvelope {
        envelope(self.verification.cancel_verification(CancelVerificationCommand {
            user_id: UserId(cmd.user_id),
            reason: cmd.reason,
        }))
        .await
    }

    pub async fn process_expired_verifications(&self) -> ResultEnvelope {
        envelope(self.verification.expire_sweep()).await
    }

    pub async fn resolve_cpf_duplicate(&self, cmd: ResolveCpfDuplicate) -> ResultEnvelope {
        envelope(async {
            let resolution = match cmd.resolution.as_str() {
                "merge" => DuplicateResolution::Merge,
                "block" => DuplicateResolution::Block,
                "manual_review" => DuplicateResolution::ManualReview,
                _ => return Err(EngineError::validation("invalid_resolution", "resolução de duplicidade inválida")),
            };
            self.verification
                .resolve_duplicate(ResolveDuplicateCommand {
                    verification_id: VerificationId(cmd.verification_id),
                    primary_user_id: UserId(cmd.primary_user_id),
                    duplicate_user_ids: cmd.duplicate_user_ids.into_iter().map(UserId).collect(),
                    resolution,
                })
                .await
        })
        .await
    }

    // --- Conversation ---

    pub async fn start_support_conversation(&self, cmd: StartSupportConversation) -> ResultEnvelope {
        envelope(self.conversation.start_conversation(StartConversationCommand {
            user_id: UserId(cmd.user_id),
            username: cmd.username,
            user_mention: cmd.user_mention,
        }))
        .await
    }

    pub async fn select_category(&self, cmd: SelectCategory) -> ResultEnvelope {
        envelope(self.conversation.select_category(UserId(cmd.user_id), &cmd.category)).await
    }

    pub async fn select_game(&self, cmd: SelectGame) -> ResultEnvelope {
        envelope(self.conversation.select_game(UserId(cmd.user_id), &cmd.game, cmd.custom_name)).await
    }

    pub async fn select_timing(&self, cmd: SelectTiming) -> ResultEnvelope {
        envelope(self.conversation.select_timing(UserId(cmd.user_id), &cmd.timing)).await
    }

    pub async fn set_description(&self, cmd: SetDescription) -> ResultEnvelope {
        envelope(self.conversation.set_description(UserId(cmd.user_id), &cmd.description)).await
    }

    pub async fn add_attachment(&self, cmd: AddAttachment) -> ResultEnvelope {
        envelope(self.conversation.add_attachment(AddAttachmentCommand {
            user_id: UserId(cmd.user_id),
            attachment: TicketAttachment {
                file_id: cmd.file_id,
                filename: cmd.filename,
                file_path: cmd.file_path,
                file_size: cmd.file_size,
            },
        }))
        .await
    }

    pub async fn skip_attachments(&self, user_id: i64) -> ResultEnvelope {
        envelope(self.conversation.skip_attachments(UserId(user_id))).await
    }

    pub async fn proceed_to_confirmation(&self, user_id: i64) -> ResultEnvelope {
        envelope(self.conversation.proceed_to_confirmation(UserId(user_id))).await
    }

    pub async fn confirm_and_create_ticket(&self, cmd: ConfirmAndCreateTicket) -> ResultEnvelope {
        envelope(self.conversation.confirm_and_create_ticket(UserId(cmd.user_id), &cmd.username)).await
    }

    pub async fn cancel_conversation(&self, user_id: i64) -> ResultEnvelope {
        envelope(self.conversation.cancel_conversation(UserId(user_id))).await
    }

    pub async fn conversation_timeout_sweep(&self) -> ResultEnvelope {
        envelope(self.conversation.timeout_sweep()).await
    }

    pub async fn update_ticket_status_in_upstream(&self, cmd: UpdateTicketStatusInUpstream) -> ResultEnvelope {
        envelope(async {
            let status = TicketStatus::from_str(&cmd.status)?;
            let ticket = self
                .tickets
                .find_by_id(TicketId(cmd.ticket_id))
                .await
                .map_err(EngineError::from)?
                .ok_or_else(|| EngineError::not_found("ticket_not_found", "ticket não encontrado"))?;
            let upstream_id = ticket
                .upstream_id
                .clone()
                .ok_or_else(|| EngineError::validation("missing_hubsoft_id", "ticket ainda não sincronizado com o HubSoft"))?;

            self.scheduler
                .schedule_integration(ScheduleIntegrationCommand {
                    integration_type: IntegrationType::StatusUpdate,
                    priority: priority_for_urgency(ticket.urgency),
                    payload: serde_json::json!({
                        "upstream_id": upstream_id,
                        "status": status.as_str(),
                        "resolution_notes": cmd.resolution_notes,
                    }),
                    metadata: details!("ticket_id" => cmd.ticket_id),
                    scheduled_at: None,
                    max_retries: None,
                })
                .await
        })
        .await
    }

    // --- Integration scheduler ---

    pub async fn schedule_hubsoft_integration(&self, cmd: ScheduleHubsoftIntegration) -> ResultEnvelope {
        envelope(async {
            let integration_type = IntegrationType::from_str(&cmd.integration_type)?;
            let priority = Priority::from_str(&cmd.priority)?;
            let _ = cmd.timeout_seconds;
            self.scheduler
                .schedule_integration(ScheduleIntegrationCommand {
                    integration_type,
                    priority,
                    payload: cmd.payload,
                    metadata: cmd.metadata,
                    scheduled_at: cmd.scheduled_at,
                    max_retries: cmd.max_retries,
                })
                .await
        })
        .await
    }

    pub async fn sync_ticket_to_upstream(&self, cmd: SyncTicketToUpstream) -> ResultEnvelope {
        envelope(async {
            let ticket = self
                .tickets
                .find_by_id(TicketId(cmd.ticket_id))
                .await
                .map_err(EngineError::from)?
                .ok_or_else(|| EngineError::not_found("ticket_not_found", "ticket não encontrado"))?;
            let owner = self
                .users
                .find_by_id(ticket.owner_id)
                .await
                .map_err(EngineError::from)?
                .ok_or_else(|| EngineError::not_found("user_not_found", "usuário não encontrado"))?;
            let cpf = owner
                .cpf
                .ok_or_else(|| EngineError::business_rule("user_not_found", "usuário sem CPF verificado"))?;

            let payload = TicketPayload {
                cpf: cpf.canonical().to_string(),
                category: ticket.category.as_str().to_string(),
                description: ticket.description.clone(),
                urgency: ticket.urgency.as_str().to_string(),
            };

            self.scheduler
                .schedule_integration(ScheduleIntegrationCommand {
                    integration_type: IntegrationType::TicketSync,
                    priority: priority_for_urgency(ticket.urgency),
                    payload: serde_json::to_value(payload).expect("TicketPayload serializes"),
                    metadata: details!("ticket_id" => cmd.ticket_id),
                    scheduled_at: None,
                    max_retries: None,
                })
                .await
        })
        .await
    }

    pub async fn verify_user_in_upstream(&self, cmd: VerifyUserInUpstream) -> ResultEnvelope {
        envelope(async {
            let cpf = Cpf::from_raw(&cmd.cpf).map_err(|_| EngineError::validation("invalid_cpf_format", "CPF inválido"))?;
            self.scheduler
                .schedule_integration(ScheduleIntegrationCommand {
                    integration_type: IntegrationType::UserVerification,
                    priority: Priority::Normal,
                    payload: serde_json::json!({ "cpf": cpf.canonical() }),
                    metadata: details!("user_id" => cmd.user_id),
                    scheduled_at: None,
                    max_retries: None,
                })
                .await
        })
        .await
    }

    pub async fn fetch_client_data_from_upstream(&self, cmd: FetchClientDataFromUpstream) -> ResultEnvelope {
        envelope(async {
            let cpf = Cpf::from_raw(&cmd.cpf).map_err(|_| EngineError::validation("invalid_cpf_format", "CPF inválido"))?;
            self.scheduler
                .schedule_integration(ScheduleIntegrationCommand {
                    integration_type: IntegrationType::ClientDataFetch,
                    priority: Priority::Low,
                    payload: serde_json::json!({ "cpf": cpf.canonical() }),
                    metadata: Default::default(),
                    scheduled_at: None,
                    max_retries: None,
                })
                .await
        })
        .await
    }

    /// Resolves a ticket id into the payload `BulkSync` needs upstream.
    /// Returns `None` (rather than an error) for a ticket that's missing or
    /// whose owner has no verified CPF — one bad id in a bulk list skips
    /// that item instead of rejecting the whole batch.
    async fn resolve_ticket_payload_for_bulk(&self, ticket_id: i64) -> Option<TicketPayload> {
        let ticket = self.tickets.find_by_id(TicketId(ticket_id)).await.ok().flatten()?;
        let owner = self.users.find_by_id(ticket.owner_id).await.ok().flatten()?;
        let cpf = owner.cpf?;
        Some(TicketPayload {
            cpf: cpf.canonical().to_string(),
            category: ticket.category.as_str().to_string(),
            description: ticket.description.clone(),
            urgency: ticket.urgency.as_str().to_string(),
        })
    }

    pub async fn bulk_sync_tickets_to_upstream(&self, cmd: BulkSyncTicketsToUpstream) -> ResultEnvelope {
        envelope(async {
            if cmd.ticket_ids.is_empty() {
                return Err(EngineError::validation("empty_ticket_list", "nenhum ticket informado"));
            }
            if cmd.ticket_ids.len() > BULK_SYNC_LIMIT {
                return Err(EngineError::validation(
                    "bulk_limit_exceeded",
                    format!("limite de {BULK_SYNC_LIMIT} tickets por lote excedido"),
                ));
            }

            let mut items = Vec::with_capacity(cmd.ticket_ids.len());
            for ticket_id in &cmd.ticket_ids {
                if let Some(payload) = self.resolve_ticket_payload_for_bulk(*ticket_id).await {
                    items.push(serde_json::json!({ "ticket_id": ticket_id, "payload": payload }));
                }
            }
            if items.is_empty() {
                return Err(EngineError::validation(
                    "empty_ticket_list",
                    "nenhum dos tickets informados pôde ser resolvido",
                ));
            }

            let batch_size = cmd.batch_size.unwrap_or(BULK_SYNC_DEFAULT_BATCH_SIZE);
            let inter_batch_delay_ms = cmd.inter_batch_delay_ms.unwrap_or(BULK_SYNC_DEFAULT_INTER_BATCH_DELAY_MS);

            self.scheduler
                .schedule_integration(ScheduleIntegrationCommand {
                    integration_type: IntegrationType::BulkSync,
                    priority: Priority::Low,
                    payload: serde_json::json!({
                        "items": items,
                        "batch_size": batch_size,
                        "inter_batch_delay_ms": inter_batch_delay_ms,
                    }),
                    metadata: details!("count" => cmd.ticket_ids.len()),
                    scheduled_at: None,
                    max_retries: None,
                })
                .await
        })
        .await
    }

    pub async fn retry_failed_integrations(&self) -> ResultEnvelope {
        envelope(self.scheduler.retry_failed_integrations()).await
    }

    pub async fn cancel_integration(&self, cmd: CancelIntegration) -> ResultEnvelope {
        envelope(self.scheduler.cancel_integration(IntegrationId(cmd.integration_id))).await
    }

    pub async fn update_integration_priority(&self, cmd: UpdateIntegrationPriority) -> ResultEnvelope {
        envelope(async {
            let priority = Priority::from_str(&cmd.priority)?;
            self.scheduler
                .update_integration_priority(IntegrationId(cmd.integration_id), priority)
                .await
        })
        .await
    }

    pub async fn get_integration_status(&self, cmd: GetIntegrationStatus) -> ResultEnvelope {
        envelope(self.scheduler.get_integration_status(IntegrationId(cmd.integration_id))).await
    }

    /// Exposes the underlying scheduler engine so the composition root can
    /// drive its background dispatch loop (`run`/`stop`) and periodic
    /// sweeps without this crate re-wrapping that lifecycle.
    pub fn scheduler(&self) -> &SchedulerEngine {
        &self.scheduler
    }
}
