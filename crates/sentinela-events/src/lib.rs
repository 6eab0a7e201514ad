pub mod bus;
pub mod events;

pub use bus::{EventBus, EventHandler, InMemoryEventBus};
pub use events::{DomainEvent, EventKind};
