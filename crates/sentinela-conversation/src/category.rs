//! Form value objects collected during a support conversation (§3).

use sentinela_common::EngineError;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TicketCategory {
    Connectivity,
    Performance,
    Configuration,
    Equipment,
    Other,
}

impl TicketCategory {
    pub fn from_str(s: &str) -> Result<Self, EngineError> {
        match s {
            "connectivity" => Ok(Self::Connectivity),
            "performance" => Ok(Self::Performance),
            "configuration" => Ok(Self::Configuration),
            "equipment" => Ok(Self::Equipment),
            "other" => Ok(Self::Other),
            _ => Err(EngineError::validation("conversation_step_mismatch", "categoria inválida")),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Connectivity => "connectivity",
            Self::Performance => "performance",
            Self::Configuration => "configuration",
            Self::Equipment => "equipment",
            Self::Other => "other",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GameTitle {
    pub key: String,
    pub custom_name: Option<String>,
}

impl GameTitle {
    const KNOWN: &'static [&'static str] = &[
        "valorant",
        "cs2",
        "lol",
        "fortnite",
        "apex",
        "overwatch",
        "mobile_legends",
        "dota2",
        "all_games",
        "other_game",
    ];

    pub fn from_str(key: &str, custom_name: Option<String>) -> Result<Self, EngineError> {
        if !Self::KNOWN.contains(&key) {
            return Err(EngineError::validation("conversation_step_mismatch", "jogo inválido"));
        }
        Ok(Self {
            key: key.to_string(),
            custom_name: if key == "other_game" { custom_name } else { None },
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProblemTiming {
    Now,
    Yesterday,
    ThisWeek,
    LastWeek,
    LongTime,
    Always,
}

impl ProblemTiming {
    pub fn from_str(s: &str) -> Result<Self, EngineError> {
        match s {
            "now" => Ok(Self::Now),
            "yesterday" => Ok(Self::Yesterday),
            "this_week" => Ok(Self::ThisWeek),
            "last_week" => Ok(Self::LastWeek),
            "long_time" => Ok(Self::LongTime),
            "always" => Ok(Self::Always),
            _ => Err(EngineError::validation("conversation_step_mismatch", "timing inválido")),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Now => "now",
            Self::Yesterday => "yesterday",
            Self::ThisWeek => "this_week",
            Self::LastWeek => "last_week",
            Self::LongTime => "long_time",
            Self::Always => "always",
        }
    }

    fn is_recent(&self) -> bool {
        matches!(self, Self::Now | Self::Yesterday)
    }

    fn is_old(&self) -> bool {
        matches!(self, Self::LongTime | Self::Always)
    }
}

/// Urgency derivation rule from §4.4: recent connectivity problems are
/// High, stale problems are Low, everything else Normal.
pub fn derive_urgency(timing: ProblemTiming, category: TicketCategory) -> crate::ticket::UrgencyLevel {
    use crate::ticket::UrgencyLevel;
    if timing.is_recent() {
        if matches!(category, TicketCategory::Connectivity) {
            return UrgencyLevel::High;
        }
        return UrgencyLevel::Normal;
    }
    if timing.is_old() {
        return UrgencyLevel::Low;
    }
    UrgencyLevel::Normal
}
