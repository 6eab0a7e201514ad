//! Support-conversation state machine and the Ticket aggregate.

pub mod category;
pub mod conversation;
pub mod engine;
pub mod protocol;
pub mod repository;
pub mod ticket;

pub use category::{derive_urgency, GameTitle, ProblemTiming, TicketCategory};
pub use conversation::{ConversationState, FormData, SupportConversation};
pub use engine::{AddAttachmentCommand, ConversationEngine, StartConversationCommand};
pub use protocol::Protocol;
pub use repository::{ConversationRepository, TicketRepository};
pub use ticket::{SyncStatus, Ticket, TicketAttachment, TicketMessage, TicketStatus, UrgencyLevel};
