pub mod cpf;
pub mod error;
pub mod ids;
pub mod logging;

pub use cpf::{Cpf, CpfError};
pub use error::{EngineError, ResultEnvelope, SystemError};
pub use ids::{Clock, ConversationId, IdGen, IntegrationId, SystemClock, TicketId, UserId, UuidIdGen, VerificationId};
