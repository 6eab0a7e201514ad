//! Use-case operations for the verification state machine (§4.2).

use crate::domain::{ServiceDescriptor, User, VerificationRequest, VerificationType};
use crate::duplicate::DuplicateCpfService;
use crate::repository::{UserRepository, VerificationRepository};
use sentinela_common::{details, Clock, Cpf, EngineError, IdGen, ResultEnvelope, UserId, VerificationId};
use sentinela_events::{DomainEvent, EventBus};
use sentinela_upstream::UpstreamClient;
use serde_json::json;
use std::sync::Arc;

#[derive(Debug, Clone)]
pub struct VerificationEngineConfig {
    pub expiry_hours: i64,
    pub per_user_24h_cap: u32,
    pub cpf_hash_salt: String,
}

impl Default for VerificationEngineConfig {
    fn default() -> Self {
        Self {
            expiry_hours: 24,
            per_user_24h_cap: 5,
            cpf_hash_salt: "sentinela".to_string(),
        }
    }
}

pub struct VerificationEngine {
    verifications: Arc<dyn VerificationRepository>,
    users: Arc<dyn UserRepository>,
    upstream: Arc<dyn UpstreamClient>,
    events: Arc<dyn EventBus>,
    duplicates: Arc<dyn DuplicateCpfService>,
    clock: Arc<dyn Clock>,
    ids: Arc<dyn IdGen>,
    config: VerificationEngineConfig,
}

#[derive(Debug, Clone)]
pub struct StartVerificationCommand {
    pub user_id: UserId,
    pub username: String,
    pub user_mention: String,
    pub verification_type: VerificationType,
    pub source_action: Option<String>,
}

#[derive(Debug, Clone)]
pub struct SubmitCpfCommand {
    pub user_id: UserId,
    pub username: String,
    pub cpf_text: String,
}

#[derive(Debug, Clone)]
pub struct CancelVerificationCommand {
    pub user_id: UserId,
    pub reason: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DuplicateResolution {
    Merge,
    Block,
    ManualReview,
}

#[derive(Debug, Clone)]
pub struct ResolveDuplicateCommand {
    pub verification_id: VerificationId,
    pub primary_user_id: UserId,
    pub duplicate_user_ids: Vec<UserId>,
    pub resolution: DuplicateResolution,
}

impl VerificationEngine {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        verifications: Arc<dyn VerificationRepository>,
        users: Arc<dyn UserRepository>,
        upstream: Arc<dyn UpstreamClient>,
        events: Arc<dyn EventBus>,
        duplicates: Arc<dyn DuplicateCpfService>,
        clock: Arc<dyn Clock>,
        ids: Arc<dyn IdGen>,
        config: VerificationEngineConfig,
    ) -> Self {
        Self {
            verifications,
            users,
            upstream,
            events,
            duplicates,
            clock,
            ids,
            config,
        }
    }

    fn mask_raw(text: &str) -> String {
        let digits: String = text.chars().filter(|c| c.is_ascii_digit()).collect();
        if digits.len() >= 5 {
            format!("{}***{}", &digits[..3], &digits[digits.len() - 2..])
        } else {
            "***".to_string()
        }
    }

    pub async fn start_verification(&self, cmd: StartVerificationCommand) -> Result<ResultEnvelope, EngineError> {
        let now = self.clock.now();

        if self.verifications.find_pending_by_user(cmd.user_id).await?.is_some() {
            return Err(EngineError::business_rule(
                "verification_already_pending",
                "uma verificação já está em andamento para este usuário",
            ));
        }

        let window_start = now - chrono::Duration::hours(24);
        let recent = self.verifications.count_attempts_since(cmd.user_id, window_start).await?;
        if recent as u32 >= self.config.per_user_24h_cap {
            return Err(EngineError::rate_limited(
                "rate_limited",
                "limite de tentativas de verificação excedido, tente novamente mais tarde",
            ));
        }

        let mut request = VerificationRequest::new(
            self.ids.new_verification_id(),
            cmd.user_id,
            cmd.username,
            cmd.user_mention,
            cmd.verification_type,
            cmd.source_action,
            now,
            self.config.expiry_hours,
        );
        request.start(now)?;

        self.verifications.save(&request).await?;
        self.events
            .publish(DomainEvent::VerificationStarted {
                event_id: uuid::Uuid::new_v4(),
                occurred_at: now,
                verification_id: request.id,
                user_id: request.user_id,
            })
            .await;

        Ok(ResultEnvelope::success(
            "verificação iniciada",
            Some(details!("verification_id" => request.id.to_string())),
        ))
    }

    pub async fn submit_cpf(&self, cmd: SubmitCpfCommand) -> Result<ResultEnvelope, EngineError> {
        let now = self.clock.now();
        let mut request = self
            .verifications
            .find_pending_by_user(cmd.user_id)
            .await?
            .ok_or_else(|| EngineError::business_rule("no_pending_verification", "nenhuma verificação pendente"))?;

        request.apply_lazy_expiry(now);
        if !request.can_attempt(now) {
            self.verifications.save(&request).await?;
            return Err(EngineError::business_rule("cannot_attempt", "não é possível tentar novamente"));
        }

        let cpf = match Cpf::from_raw(&cmd.cpf_text) {
            Ok(cpf) => cpf,
            Err(_) => {
                let masked = Self::mask_raw(&cmd.cpf_text);
                let terminal = request.add_failed_attempt(masked, "invalid_cpf_format", now);
                self.verifications.save(&request).await?;
                self.publish_attempt(&request, false, Some("invalid_cpf_format")).await;
                if terminal {
                    self.publish_failed(&request, "too many attempts").await;
                }
                return Err(EngineError::business_rule_with_details(
                    "invalid_cpf_format",
                    "CPF inválido",
                    details!("attempts_left" => request.attempts_left()),
                ));
            }
        };

        let cpf_hash = cpf.hash(&self.config.cpf_hash_salt);
        let dup = self.duplicates.check_for_duplicates(&cpf_hash, cmd.user_id).await?;
        if dup.has_duplicates {
            request.duplicate_pending_cpf = Some(cpf.clone());
            request.add_failed_attempt(cpf.masked(), "cpf_duplicate_conflict", now);
            self.verifications.save(&request).await?;
            self.publish_attempt(&request, false, Some("cpf_duplicate_conflict")).await;
            self.events
                .publish(DomainEvent::CpfDuplicateDetected {
                    event_id: uuid::Uuid::new_v4(),
                    occurred_at: now,
                    verification_id: request.id,
                    cpf_hash: cpf_hash.clone(),
                    duplicate_user_ids: dup.duplicate_user_ids.clone(),
                    risk_level: crate::duplicate::risk_level_str(dup.risk_level).to_string(),
                })
                .await;
            return Err(EngineError::business_rule_with_details(
                "cpf_duplicate",
                "este CPF já está associado a outro usuário",
                details!(
                    "duplicate_user_ids" => dup.duplicate_user_ids.iter().map(|u| u.0).collect::<Vec<_>>(),
                    "risk_level" => crate::duplicate::risk_level_str(dup.risk_level).to_string()
                ),
            ));
        }

        match self.upstream.verify_client_by_cpf(cpf.canonical(), true).await {
            Ok(Some(record)) if record.servico_status.to_lowercase().contains("habilitado") => {
                let snapshot = Some(ServiceDescriptor {
                    name: record.servico_nome.clone(),
                    status: record.servico_status.clone(),
                    service_id: record.servico_id.clone(),
                });
                request.complete_with_success(cpf.clone(), record.nome_razaosocial.clone(), snapshot.clone(), now)?;
                self.verifications.save(&request).await?;
                self.publish_attempt(&request, true, None).await;

                self.upsert_active_user(cmd.user_id, &request.username, cpf, record.nome_razaosocial, snapshot, now)
                    .await?;

                self.events
                    .publish(DomainEvent::VerificationCompleted {
                        event_id: uuid::Uuid::new_v4(),
                        occurred_at: now,
                        verification_id: request.id,
                        user_id: request.user_id,
                    })
                    .await;

                Ok(ResultEnvelope::success(
                    "verificação concluída com sucesso",
                    Some(details!("verified" => true)),
                ))
            }
            Ok(_) => {
                let terminal = request.add_failed_attempt(cpf.masked(), "cpf_not_found_in_hubsoft", now);
                self.verifications.save(&request).await?;
                self.publish_attempt(&request, false, Some("cpf_not_found_in_hubsoft")).await;
                if terminal {
                    self.publish_failed(&request, "too many attempts").await;
                }
                Err(EngineError::business_rule_with_details(
                    "cpf_not_found",
                    "CPF não encontrado ou sem serviço ativo",
                    details!("attempts_left" => request.attempts_left()),
                ))
            }
            Err(e) => Err(EngineError::upstream(e.code.clone(), e.message)),
        }
    }

    async fn upsert_active_user(
        &self,
        user_id: UserId,
        username: &str,
        cpf: Cpf,
        client_name: String,
        service: Option<ServiceDescriptor>,
        now: chrono::DateTime<chrono::Utc>,
    ) -> Result<(), EngineError> {
        let existing = self.users.find_by_id(user_id).await?;
        let is_new = existing.is_none();
        let mut user = existing.unwrap_or_else(|| User::new_pending(user_id, username, now));
        user.activate(cpf, &self.config.cpf_hash_salt, client_name, service, now);
        self.users.save(&user).await?;

        if is_new {
            self.events
                .publish(DomainEvent::UserRegistered {
                    event_id: uuid::Uuid::new_v4(),
                    occurred_at: now,
                    user_id,
                })
                .await;
        }
        Ok(())
    }

    async fn publish_attempt(&self, request: &VerificationRequest, success: bool, reason: Option<&str>) {
        self.events
            .publish(DomainEvent::VerificationAttemptMade {
                event_id: uuid::Uuid::new_v4(),
                occurred_at: self.clock.now(),
                verification_id: request.id,
                success,
                reason: reason.map(|r| r.to_string()),
            })
            .await;
    }

    async fn publish_failed(&self, request: &VerificationRequest, reason: &str) {
        self.events
            .publish(DomainEvent::VerificationFailed {
                event_id: uuid::Uuid::new_v4(),
                occurred_at: self.clock.now(),
                verification_id: request.id,
                reason: reason.to_string(),
                attempt_count: request.attempt_count() as u32,
            })
            .await;
    }

    pub async fn cancel_verification(&self, cmd: CancelVerificationCommand) -> Result<ResultEnvelope, EngineError> {
        let now = self.clock.now();
        let mut request = self
            .verifications
            .find_pending_by_user(cmd.user_id)
            .await?
            .ok_or_else(|| EngineError::business_rule("no_pending_verification", "nenhuma verificação pendente"))?;

        request.cancel(now)?;
        self.verifications.save(&request).await?;
        self.events
            .publish(DomainEvent::VerificationCancelled {
                event_id: uuid::Uuid::new_v4(),
                occurred_at: now,
                verification_id: request.id,
                reason: cmd.reason,
            })
            .await;

        Ok(ResultEnvelope::success("verificação cancelada", None))
    }

    pub async fn expire_sweep(&self) -> Result<ResultEnvelope, EngineError> {
        let now = self.clock.now();
        let candidates = self.verifications.find_expiring_before(now, 500).await?;
        let mut processed = 0u32;
        let mut errors = Vec::new();

        for mut request in candidates {
            request.expire(now);
            match self.verifications.save(&request).await {
                Ok(()) => {
                    processed += 1;
                    self.events
                        .publish(DomainEvent::VerificationExpired {
                            event_id: uuid::Uuid::new_v4(),
                            occurred_at: now,
                            verification_id: request.id,
                        })
                        .await;
                }
                Err(e) => errors.push(json!({ "verification_id": request.id.to_string(), "error": e.to_string() })),
            }
        }

        Ok(ResultEnvelope::success(
            "varredura de expiração concluída",
            Some(details!("processed" => processed, "errors" => errors)),
        ))
    }

    pub async fn resolve_duplicate(&self, cmd: ResolveDuplicateCommand) -> Result<ResultEnvelope, EngineError> {
        let now = self.clock.now();
        let mut request = self
            .verifications
            .find_by_id(cmd.verification_id)
            .await?
            .ok_or_else(|| EngineError::not_found("user_not_found", "verificação não encontrada"))?;

        match cmd.resolution {
            DuplicateResolution::Block | DuplicateResolution::ManualReview => {
                self.events
                    .publish(DomainEvent::AdminNotificationRequired {
                        event_id: uuid::Uuid::new_v4(),
                        occurred_at: now,
                        message: format!(
                            "verification {} flagged for {:?} review",
                            request.id, cmd.resolution
                        ),
                        context: json!({ "verification_id": request.id.to_string(), "resolution": format!("{:?}", cmd.resolution) }),
                    })
                    .await;
                return Ok(ResultEnvelope::success("conflito encaminhado para revisão", None));
            }
            DuplicateResolution::Merge => {}
        }

        let mut duplicate_users = Vec::with_capacity(cmd.duplicate_user_ids.len());
        for id in &cmd.duplicate_user_ids {
            let user = self
                .users
                .find_by_id(*id)
                .await?
                .ok_or_else(|| EngineError::not_found("user_not_found", format!("usuário {} não encontrado", id)))?;
            duplicate_users.push(user);
        }

        for mut user in duplicate_users {
            user.deactivate(now);
            self.users.save(&user).await?;
        }

        let cpf = request
            .duplicate_pending_cpf
            .clone()
            .ok_or_else(|| EngineError::business_rule("cannot_attempt", "nenhum CPF pendente de resolução"))?;

        match self.upstream.verify_client_by_cpf(cpf.canonical(), true).await {
            Ok(Some(record)) if record.servico_status.to_lowercase().contains("habilitado") => {
                let snapshot = Some(ServiceDescriptor {
                    name: record.servico_nome.clone(),
                    status: record.servico_status.clone(),
                    service_id: record.servico_id.clone(),
                });
                request.complete_with_success(cpf.clone(), record.nome_razaosocial.clone(), snapshot.clone(), now)?;
                request.duplicate_pending_cpf = None;
                self.verifications.save(&request).await?;

                self.upsert_active_user(
                    request.user_id,
                    &request.username,
                    cpf,
                    record.nome_razaosocial,
                    snapshot,
                    now,
                )
                .await?;

                self.events
                    .publish(DomainEvent::CpfRemapped {
                        event_id: uuid::Uuid::new_v4(),
                        occurred_at: now,
                        primary_user_id: cmd.primary_user_id,
                        deactivated_user_ids: cmd.duplicate_user_ids.clone(),
                    })
                    .await;
                self.events
                    .publish(DomainEvent::VerificationCompleted {
                        event_id: uuid::Uuid::new_v4(),
                        occurred_at: now,
                        verification_id: request.id,
                        user_id: request.user_id,
                    })
                    .await;

                Ok(ResultEnvelope::success("duplicidade resolvida, verificação concluída", None))
            }
            Ok(_) => Err(EngineError::business_rule("cpf_not_found", "CPF não encontrado ou sem serviço ativo")),
            Err(e) => Err(EngineError::upstream(e.code.clone(), e.message)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::duplicate::DefaultDuplicateCpfService;
    use crate::repository::memory::{InMemoryUserRepository, InMemoryVerificationRepository};
    use parking_lot::Mutex;
    use sentinela_common::UuidIdGen;
    use sentinela_events::InMemoryEventBus;
    use sentinela_upstream::{ClientRecord, InMemoryUpstreamClient};
    use std::time::Duration as StdDuration;

    struct TestClock(Mutex<chrono::DateTime<chrono::Utc>>);

    impl TestClock {
        fn new(t: chrono::DateTime<chrono::Utc>) -> Self {
            Self(Mutex::new(t))
        }

        fn advance(&self, d: chrono::Duration) {
            let mut guard = self.0.lock();
            *guard = *guard + d;
        }
    }

    impl Clock for TestClock {
        fn now(&self) -> chrono::DateTime<chrono::Utc> {
            *self.0.lock()
        }
    }

    fn engine(clock: Arc<TestClock>) -> (VerificationEngine, Arc<InMemoryUpstreamClient>, Arc<InMemoryUserRepository>) {
        let verifications = Arc::new(InMemoryVerificationRepository::new());
        let users = Arc::new(InMemoryUserRepository::new());
        let upstream = Arc::new(InMemoryUpstreamClient::new());
        let events = Arc::new(InMemoryEventBus::new(10, StdDuration::from_secs(5)));
        let duplicates = Arc::new(DefaultDuplicateCpfService::new(users.clone()));

        let eng = VerificationEngine::new(
            verifications,
            users.clone(),
            upstream.clone(),
            events,
            duplicates,
            clock as Arc<dyn Clock>,
            Arc::new(UuidIdGen),
            VerificationEngineConfig::default(),
        );
        (eng, upstream, users)
    }

    #[tokio::test]
    async fn happy_path_verification_completes() {
        let clock = Arc::new(TestClock::new(chrono::Utc::now()));
        let (eng, upstream, _users) = engine(clock);
        upstream.seed_client(
            "52998224725",
            ClientRecord {
                nome_razaosocial: "Alice".to_string(),
                servico_status: "Habilitado".to_string(),
                servico_nome: Some("Fibra 500".to_string()),
                servico_id: None,
                contracts: vec![],
            },
        );

        let start = eng
            .start_verification(StartVerificationCommand {
                user_id: UserId(100),
                username: "alice".to_string(),
                user_mention: "@alice".to_string(),
                verification_type: VerificationType::AutoCheckup,
                source_action: None,
            })
            .await
            .unwrap();
        assert!(start.ok);

        let result = eng
            .submit_cpf(SubmitCpfCommand {
                user_id: UserId(100),
                username: "alice".to_string(),
                cpf_text: "52998224725".to_string(),
            })
            .await
            .unwrap();

        assert!(result.ok);
        assert_eq!(result.data.unwrap().get("verified").unwrap(), &serde_json::json!(true));
    }

    #[tokio::test]
    async fn attempt_exhaustion_fails_verification() {
        let clock = Arc::new(TestClock::new(chrono::Utc::now()));
        let (eng, _upstream, _users) = engine(clock);

        eng.start_verification(StartVerificationCommand {
            user_id: UserId(200),
            username: "bob".to_string(),
            user_mention: "@bob".to_string(),
            verification_type: VerificationType::AutoCheckup,
            source_action: None,
        })
        .await
        .unwrap();

        for i in 0..3 {
            let result = eng
                .submit_cpf(SubmitCpfCommand {
                    user_id: UserId(200),
                    username: "bob".to_string(),
                    cpf_text: "11111111111".to_string(),
                })
                .await;
            let err = result.unwrap_err();
            assert_eq!(err.code(), "invalid_cpf_format");
            if i == 2 {
                assert_eq!(err.details().get("attempts_left").unwrap(), &serde_json::json!(0));
            }
        }

        let fourth = eng
            .submit_cpf(SubmitCpfCommand {
                user_id: UserId(200),
                username: "bob".to_string(),
                cpf_text: "11111111111".to_string(),
            })
            .await;
        assert_eq!(fourth.unwrap_err().code(), "no_pending_verification");
    }

    #[tokio::test]
    async fn duplicate_cpf_blocks_completion() {
        let clock = Arc::new(TestClock::new(chrono::Utc::now()));
        let (eng, _upstream, users) = engine(clock);

        let holder_cpf = Cpf::from_raw("52998224725").unwrap();
        let mut holder = User::new_pending(UserId(200), "existing-holder", chrono::Utc::now());
        holder.activate(holder_cpf, &VerificationEngineConfig::default().cpf_hash_salt, "Alice".to_string(), None, chrono::Utc::now());
        users.save(&holder).await.unwrap();

        eng.start_verification(StartVerificationCommand {
            user_id: UserId(201),
            username: "carol".to_string(),
            user_mention: "@carol".to_string(),
            verification_type: VerificationType::AutoCheckup,
            source_action: None,
        })
        .await
        .unwrap();

        let result = eng
            .submit_cpf(SubmitCpfCommand {
                user_id: UserId(201),
                username: "carol".to_string(),
                cpf_text: "52998224725".to_string(),
            })
            .await;
        let err = result.unwrap_err();
        assert_eq!(err.code(), "cpf_duplicate");
        assert_eq!(err.details().get("risk_level").unwrap(), &serde_json::json!("low"));
    }

    #[tokio::test]
    async fn expire_sweep_moves_pending_verifications_to_expired() {
        let clock = Arc::new(TestClock::new(chrono::Utc::now()));
        let (eng, _upstream, _users) = engine(clock.clone());

        eng.start_verification(StartVerificationCommand {
            user_id: UserId(300),
            username: "dave".to_string(),
            user_mention: "@dave".to_string(),
            verification_type: VerificationType::AutoCheckup,
            source_action: None,
        })
        .await
        .unwrap();

        clock.advance(chrono::Duration::hours(25));

        let result = eng.expire_sweep().await.unwrap();
        let data = result.data.unwrap();
        assert_eq!(data.get("processed").unwrap(), &serde_json::json!(1));
    }

    #[tokio::test]
    async fn cancel_against_no_pending_verification_errors() {
        let clock = Arc::new(TestClock::new(chrono::Utc::now()));
        let (eng, _upstream, _users) = engine(clock);

        let result = eng
            .cancel_verification(CancelVerificationCommand {
                user_id: UserId(400),
                reason: "changed my mind".to_string(),
            })
            .await;
        assert_eq!(result.unwrap_err().code(), "no_pending_verification");
    }
}
