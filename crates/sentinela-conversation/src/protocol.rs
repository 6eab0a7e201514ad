//! Human-facing ticket identifiers (§B, ported from `identifiers.py`).

use sentinela_common::TicketId;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Protocol {
    Local(String),
    Upstream(String),
}

impl Protocol {
    pub fn local(ticket_id: TicketId) -> Self {
        Self::Local(format!("LOC{:06}", ticket_id.0))
    }

    pub fn upstream(raw: impl Into<String>) -> Self {
        Self::Upstream(raw.into())
    }

    pub fn display(&self) -> &str {
        match self {
            Self::Local(s) | Self::Upstream(s) => s,
        }
    }

    pub fn is_local(&self) -> bool {
        matches!(self, Self::Local(_))
    }
}
