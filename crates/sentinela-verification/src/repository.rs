//! Repository interfaces this engine depends on. Implementations live in
//! the store crate; an in-memory double lives here for tests.

use crate::domain::{User, VerificationRequest};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sentinela_common::{SystemError, UserId, VerificationId};

#[async_trait]
pub trait VerificationRepository: Send + Sync {
    async fn save(&self, request: &VerificationRequest) -> Result<(), SystemError>;
    async fn find_by_id(&self, id: VerificationId) -> Result<Option<VerificationRequest>, SystemError>;
    /// The single Pending or InProgress verification for a user, if any.
    async fn find_pending_by_user(&self, user_id: UserId) -> Result<Option<VerificationRequest>, SystemError>;
    async fn find_expiring_before(&self, t: DateTime<Utc>, limit: usize) -> Result<Vec<VerificationRequest>, SystemError>;
    /// `salt` must be the same salt the caller used to compute `cpf_hash`,
    /// since this trait has no column precomputed at write time the way
    /// `User::cpf_hash` does.
    async fn find_by_cpf_hash(&self, cpf_hash: &str, salt: &str, limit: usize) -> Result<Vec<VerificationRequest>, SystemError>;
    /// Count of attempts recorded for this user across all of their
    /// verifications since `since`, backing the per-user rolling rate limit.
    async fn count_attempts_since(&self, user_id: UserId, since: DateTime<Utc>) -> Result<usize, SystemError>;
    async fn delete(&self, id: VerificationId) -> Result<bool, SystemError>;
}

#[async_trait]
pub trait UserRepository: Send + Sync {
    async fn save(&self, user: &User) -> Result<(), SystemError>;
    async fn find_by_id(&self, id: UserId) -> Result<Option<User>, SystemError>;
    async fn find_by_cpf_hash(&self, cpf_hash: &str) -> Result<Option<User>, SystemError>;
    /// Active users holding the given CPF hash, excluding `excluding`.
    async fn find_active_by_cpf_hash(&self, cpf_hash: &str, excluding: UserId) -> Result<Vec<User>, SystemError>;
    async fn delete(&self, id: UserId) -> Result<bool, SystemError>;
}

#[cfg(any(test, feature = "test-support"))]
pub mod memory {
    use super::*;
    use parking_lot::Mutex;
    use std::collections::HashMap;

    #[derive(Default)]
    pub struct InMemoryVerificationRepository {
        rows: Mutex<HashMap<VerificationId, VerificationRequest>>,
    }

    impl InMemoryVerificationRepository {
        pub fn new() -> Self {
            Self::default()
        }
    }

    #[async_trait]
    impl VerificationRepository for InMemoryVerificationRepository {
        async fn save(&self, request: &VerificationRequest) -> Result<(), SystemError> {
            self.rows.lock().insert(request.id, request.clone());
            Ok(())
        }

        async fn find_by_id(&self, id: VerificationId) -> Result<Option<VerificationRequest>, SystemError> {
            Ok(self.rows.lock().get(&id).cloned())
        }

        async fn find_pending_by_user(&self, user_id: UserId) -> Result<Option<VerificationRequest>, SystemError> {
            Ok(self
                .rows
                .lock()
                .values()
                .find(|v| {
                    v.user_id == user_id
                        && matches!(
                            v.status,
                            crate::domain::VerificationStatus::Pending | crate::domain::VerificationStatus::InProgress
                        )
                })
                .cloned())
        }

        async fn find_expiring_before(&self, t: DateTime<Utc>, limit: usize) -> Result<Vec<VerificationRequest>, SystemError> {
            let mut out: Vec<_> = self
                .rows
                .lock()
                .values()
                .filter(|v| {
                    v.expires_at < t
                        && matches!(
                            v.status,
                            crate::domain::VerificationStatus::Pending | crate::domain::VerificationStatus::InProgress
                        )
                })
                .cloned()
                .collect();
            out.truncate(limit);
            Ok(out)
        }

        async fn find_by_cpf_hash(&self, cpf_hash: &str, salt: &str, limit: usize) -> Result<Vec<VerificationRequest>, SystemError> {
            let mut out: Vec<_> = self
                .rows
                .lock()
                .values()
                .filter(|v| v.cpf_hash(salt) == cpf_hash)
                .cloned()
                .collect();
            out.truncate(limit);
            Ok(out)
        }

        async fn count_attempts_since(&self, user_id: UserId, since: DateTime<Utc>) -> Result<usize, SystemError> {
            Ok(self
                .rows
                .lock()
                .values()
                .filter(|v| v.user_id == user_id)
                .flat_map(|v| v.attempts.iter())
                .filter(|a| a.attempted_at >= since)
                .count())
        }

        async fn delete(&self, id: VerificationId) -> Result<bool, SystemError> {
            Ok(self.rows.lock().remove(&id).is_some())
        }
    }

    #[derive(Default)]
    pub struct InMemoryUserRepository {
        rows: Mutex<HashMap<UserId, User>>,
    }

    impl InMemoryUserRepository {
        pub fn new() -> Self {
            Self::default()
        }
    }

    #[async_trait]
    impl UserRepository for InMemoryUserRepository {
        async fn save(&self, user: &User) -> Result<(), SystemError> {
            self.rows.lock().insert(user.id, user.clone());
            Ok(())
        }

        async fn find_by_id(&self, id: UserId) -> Result<Option<User>, SystemError> {
            Ok(self.rows.lock().get(&id).cloned())
        }

        async fn find_by_cpf_hash(&self, cpf_hash: &str) -> Result<Option<User>, SystemError> {
            Ok(self
                .rows
                .lock()
                .values()
                .find(|u| u.cpf_hash.as_deref() == Some(cpf_hash))
                .cloned())
        }

        async fn find_active_by_cpf_hash(&self, cpf_hash: &str, excluding: UserId) -> Result<Vec<User>, SystemError> {
            Ok(self
                .rows
                .lock()
                .values()
                .filter(|u| {
                    u.id != excluding
                        && u.status == crate::domain::UserStatus::Active
                        && u.cpf_hash.as_deref() == Some(cpf_hash)
                })
                .cloned()
                .collect())
        }

        async fn delete(&self, id: UserId) -> Result<bool, SystemError> {
            Ok(self.rows.lock().remove(&id).is_some())
        }
    }
}
