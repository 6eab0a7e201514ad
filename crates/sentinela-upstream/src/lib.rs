pub mod client;
pub mod http;
pub mod mock;

pub use client::{
    ClientRecord, Contract, HealthReport, TicketPatch, TicketPayload, TicketStatusSnapshot,
    TicketSummary, TicketSyncResult, UpstreamClient, UpstreamError,
};
pub use http::HttpUpstreamClient;
pub use mock::InMemoryUpstreamClient;
