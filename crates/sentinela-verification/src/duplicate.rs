//! Duplicate CPF detection and resolution (§4.3).

use crate::domain::UserStatus;
use crate::repository::UserRepository;
use async_trait::async_trait;
use sentinela_common::{SystemError, UserId};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RiskLevel {
    Low,
    Medium,
    High,
}

impl RiskLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
        }
    }
}

/// Renders an optional risk level the way the duplicate-conflict events
/// and error details expect: `"none"` when no duplicates were found.
pub fn risk_level_str(risk: Option<RiskLevel>) -> &'static str {
    risk.map(|r| r.as_str()).unwrap_or("none")
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DuplicateCheckResult {
    pub has_duplicates: bool,
    pub duplicate_user_ids: Vec<UserId>,
    pub risk_level: Option<RiskLevel>,
}

#[async_trait]
pub trait DuplicateCpfService: Send + Sync {
    async fn check_for_duplicates(&self, cpf_hash: &str, excluding: UserId) -> Result<DuplicateCheckResult, SystemError>;
}

pub struct DefaultDuplicateCpfService {
    users: Arc<dyn UserRepository>,
}

impl DefaultDuplicateCpfService {
    pub fn new(users: Arc<dyn UserRepository>) -> Self {
        Self { users }
    }

    fn classify(count: usize) -> Option<RiskLevel> {
        match count {
            0 => None,
            1 => Some(RiskLevel::Low),
            2..=3 => Some(RiskLevel::Medium),
            _ => Some(RiskLevel::High),
        }
    }
}

#[async_trait]
impl DuplicateCpfService for DefaultDuplicateCpfService {
    async fn check_for_duplicates(&self, cpf_hash: &str, excluding: UserId) -> Result<DuplicateCheckResult, SystemError> {
        let duplicates = self.users.find_active_by_cpf_hash(cpf_hash, excluding).await?;
        let ids: Vec<UserId> = duplicates.iter().filter(|u| u.status == UserStatus::Active).map(|u| u.id).collect();
        let risk_level = Self::classify(ids.len());
        Ok(DuplicateCheckResult {
            has_duplicates: !ids.is_empty(),
            duplicate_user_ids: ids,
            risk_level,
        })
    }
}
