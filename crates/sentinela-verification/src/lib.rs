pub mod domain;
pub mod duplicate;
pub mod engine;
pub mod repository;

pub use domain::{
    ServiceDescriptor, User, UserStatus, VerificationAttempt, VerificationRequest, VerificationStatus, VerificationType,
    MAX_ATTEMPTS,
};
pub use duplicate::{DefaultDuplicateCpfService, DuplicateCheckResult, DuplicateCpfService, RiskLevel};
pub use engine::{
    CancelVerificationCommand, DuplicateResolution, ResolveDuplicateCommand, StartVerificationCommand, SubmitCpfCommand,
    VerificationEngine, VerificationEngineConfig,
};
pub use repository::{UserRepository, VerificationRepository};
