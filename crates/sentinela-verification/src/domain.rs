//! The `User` and `VerificationRequest` aggregates (§3).

use chrono::{DateTime, Duration, Utc};
use sentinela_common::{Cpf, EngineError, UserId, VerificationId};
use serde::{Deserialize, Serialize};

pub const MAX_ATTEMPTS: usize = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum UserStatus {
    PendingVerification,
    Active,
    Inactive,
    Suspended,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceDescriptor {
    pub name: Option<String>,
    pub status: String,
    pub service_id: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: UserId,
    pub username: String,
    pub cpf: Option<Cpf>,
    /// Salted hash of `cpf`, stored alongside it so repositories can index
    /// and compare on lookup without recomputing against a mismatched salt.
    pub cpf_hash: Option<String>,
    pub client_name: Option<String>,
    pub service: Option<ServiceDescriptor>,
    pub status: UserStatus,
    pub is_admin: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl User {
    pub fn new_pending(id: UserId, username: impl Into<String>, now: DateTime<Utc>) -> Self {
        Self {
            id,
            username: username.into(),
            cpf: None,
            cpf_hash: None,
            client_name: None,
            service: None,
            status: UserStatus::PendingVerification,
            is_admin: false,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn activate(
        &mut self,
        cpf: Cpf,
        cpf_hash_salt: &str,
        client_name: String,
        service: Option<ServiceDescriptor>,
        now: DateTime<Utc>,
    ) {
        self.cpf_hash = Some(cpf.hash(cpf_hash_salt));
        self.cpf = Some(cpf);
        self.client_name = Some(client_name);
        self.service = service;
        self.status = UserStatus::Active;
        self.updated_at = now;
    }

    pub fn deactivate(&mut self, now: DateTime<Utc>) {
        self.status = UserStatus::Inactive;
        self.updated_at = now;
    }

    pub fn suspend(&mut self, now: DateTime<Utc>) {
        self.status = UserStatus::Suspended;
        self.updated_at = now;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum VerificationType {
    AutoCheckup,
    SupportRequest,
    ManualReview,
    SecurityCheck,
}

impl VerificationType {
    pub fn from_str(s: &str) -> Result<Self, EngineError> {
        match s {
            "auto_checkup" => Ok(Self::AutoCheckup),
            "support_request" => Ok(Self::SupportRequest),
            "manual_review" => Ok(Self::ManualReview),
            "security_check" => Ok(Self::SecurityCheck),
            _ => Err(EngineError::validation("invalid_verification_type", "tipo de verificação inválido")),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::AutoCheckup => "auto_checkup",
            Self::SupportRequest => "support_request",
            Self::ManualReview => "manual_review",
            Self::SecurityCheck => "security_check",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum VerificationStatus {
    Pending,
    InProgress,
    Completed,
    Failed,
    Expired,
    Cancelled,
}

impl VerificationStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::Completed | Self::Failed | Self::Expired | Self::Cancelled
        )
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VerificationAttempt {
    pub attempted_at: DateTime<Utc>,
    pub cpf_masked: String,
    pub success: bool,
    pub failure_reason: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VerificationRequest {
    pub id: VerificationId,
    pub user_id: UserId,
    pub username: String,
    pub user_mention: String,
    pub verification_type: VerificationType,
    pub source_action: Option<String>,
    pub status: VerificationStatus,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub attempts: Vec<VerificationAttempt>,
    pub verified_cpf: Option<Cpf>,
    pub client_snapshot: Option<ServiceDescriptor>,
    pub client_name: Option<String>,
    /// Set when a duplicate conflict is recorded against a submitted CPF,
    /// so `ResolveDuplicate` can re-drive the success path without asking
    /// the caller to resubmit the number.
    pub duplicate_pending_cpf: Option<Cpf>,
}

impl VerificationRequest {
    pub fn new(
        id: VerificationId,
        user_id: UserId,
        username: impl Into<String>,
        user_mention: impl Into<String>,
        verification_type: VerificationType,
        source_action: Option<String>,
        now: DateTime<Utc>,
        expiry_hours: i64,
    ) -> Self {
        Self {
            id,
            user_id,
            username: username.into(),
            user_mention: user_mention.into(),
            verification_type,
            source_action,
            status: VerificationStatus::Pending,
            created_at: now,
            expires_at: now + Duration::hours(expiry_hours),
            completed_at: None,
            attempts: Vec::new(),
            verified_cpf: None,
            client_snapshot: None,
            client_name: None,
            duplicate_pending_cpf: None,
        }
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now > self.expires_at
    }

    pub fn attempt_count(&self) -> usize {
        self.attempts.len()
    }

    pub fn attempts_left(&self) -> usize {
        MAX_ATTEMPTS.saturating_sub(self.attempt_count())
    }

    pub fn can_attempt(&self, now: DateTime<Utc>) -> bool {
        matches!(self.status, VerificationStatus::Pending | VerificationStatus::InProgress)
            && self.attempt_count() < MAX_ATTEMPTS
            && !self.is_expired(now)
    }

    /// Lazily applies expiry if due. Call before any mutating operation.
    pub fn apply_lazy_expiry(&mut self, now: DateTime<Utc>) {
        if !self.status.is_terminal() && self.is_expired(now) {
            self.expire(now);
        }
    }

    pub fn start(&mut self, now: DateTime<Utc>) -> Result<(), EngineError> {
        if self.status != VerificationStatus::Pending {
            return Err(EngineError::business_rule(
                "verification_already_pending",
                format!("cannot start verification with status {:?}", self.status),
            ));
        }
        if self.is_expired(now) {
            self.expire(now);
            return Err(EngineError::business_rule("cannot_attempt", "verification expired"));
        }
        self.status = VerificationStatus::InProgress;
        Ok(())
    }

    fn push_attempt(&mut self, cpf_masked: String, success: bool, failure_reason: Option<String>, now: DateTime<Utc>) {
        self.attempts.push(VerificationAttempt {
            attempted_at: now,
            cpf_masked,
            success,
            failure_reason,
        });
    }

    /// Appends a failed attempt; if the cap is reached, transitions to Failed.
    /// Returns true if the verification failed terminally as a result.
    pub fn add_failed_attempt(&mut self, cpf_masked: String, reason: impl Into<String>, now: DateTime<Utc>) -> bool {
        self.push_attempt(cpf_masked, false, Some(reason.into()), now);
        if self.attempts_left() == 0 {
            self.status = VerificationStatus::Failed;
            self.completed_at = Some(now);
            true
        } else {
            false
        }
    }

    pub fn complete_with_success(
        &mut self,
        cpf: Cpf,
        client_name: String,
        snapshot: Option<ServiceDescriptor>,
        now: DateTime<Utc>,
    ) -> Result<(), EngineError> {
        if self.status.is_terminal() {
            return Err(EngineError::business_rule(
                "cannot_attempt",
                format!("cannot complete verification with status {:?}", self.status),
            ));
        }
        let masked = cpf.masked();
        self.push_attempt(masked, true, None, now);
        self.status = VerificationStatus::Completed;
        self.completed_at = Some(now);
        self.client_name = Some(client_name);
        self.client_snapshot = snapshot;
        self.verified_cpf = Some(cpf);
        Ok(())
    }

    pub fn cancel(&mut self, now: DateTime<Utc>) -> Result<(), EngineError> {
        if self.status.is_terminal() {
            return Err(EngineError::business_rule("cannot_cancel_terminal", "verification already finalized"));
        }
        self.status = VerificationStatus::Cancelled;
        self.completed_at = Some(now);
        Ok(())
    }

    pub fn expire(&mut self, now: DateTime<Utc>) {
        if self.status.is_terminal() {
            return;
        }
        self.status = VerificationStatus::Expired;
        self.completed_at = Some(now);
    }

    /// Hash used for store indexing. Before a CPF is verified, a
    /// placeholder keyed on the user id stands in so the row still has a
    /// stable, non-plaintext lookup key.
    pub fn cpf_hash(&self, salt: &str) -> String {
        match &self.verified_cpf {
            Some(cpf) => cpf.hash(salt),
            None => {
                use sha2::{Digest, Sha256};
                let mut hasher = Sha256::new();
                hasher.update(salt.as_bytes());
                hasher.update(format!("pending_{}", self.user_id.0).as_bytes());
                hex::encode(hasher.finalize())
            }
        }
    }
}
