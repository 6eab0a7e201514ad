//! Typed identifiers. Every repository lookup takes one of these, never a
//! bare integer or string — resolves the raw-int-vs-wrapped-id ambiguity
//! present in the system this was modeled on.

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

macro_rules! uuid_id {
    ($name:ident) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        pub struct $name(pub Uuid);

        impl $name {
            pub fn new(id: Uuid) -> Self {
                Self(id)
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

uuid_id!(VerificationId);
uuid_id!(ConversationId);
uuid_id!(IntegrationId);

/// Users are keyed by the chat platform's numeric id, not a UUID.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct UserId(pub i64);

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Tickets are keyed by an auto-incrementing store id; a [`TicketId`]
/// before the store assigns one is represented by `Option<TicketId>` at
/// the call site, never by a sentinel value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TicketId(pub i64);

impl fmt::Display for TicketId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Produces fresh identifiers. Injected so tests can supply a
/// deterministic sequence instead of real randomness/clock reads.
pub trait IdGen: Send + Sync {
    fn new_verification_id(&self) -> VerificationId;
    fn new_conversation_id(&self) -> ConversationId;
    fn new_integration_id(&self) -> IntegrationId;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct UuidIdGen;

impl IdGen for UuidIdGen {
    fn new_verification_id(&self) -> VerificationId {
        VerificationId(Uuid::new_v4())
    }

    fn new_conversation_id(&self) -> ConversationId {
        ConversationId(Uuid::new_v4())
    }

    fn new_integration_id(&self) -> IntegrationId {
        IntegrationId(Uuid::new_v4())
    }
}

/// Injected clock, so verification expiry / conversation timeout logic is
/// deterministically testable.
pub trait Clock: Send + Sync {
    fn now(&self) -> chrono::DateTime<chrono::Utc>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> chrono::DateTime<chrono::Utc> {
        chrono::Utc::now()
    }
}
