//! Structured logging configuration.
//!
//! - JSON output for production (`LOG_FORMAT=json`)
//! - Human-readable output for development (default)
//!
//! # Usage
//!
//! ```rust,ignore
//! use sentinela_common::logging::init_logging;
//!
//! fn main() {
//!     init_logging("sentinela-server");
//!     tracing::info!(user_id = %id, "verification started");
//! }
//! ```
//!
//! `RUST_LOG` controls the level filter (default: info). CPF values must
//! never be passed to a tracing field in raw form — only `Cpf::masked()`
//! or `Cpf::hash()`.

use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Initialize logging with the given service name.
pub fn init_logging(_service_name: &str) {
    let log_format = std::env::var("LOG_FORMAT").unwrap_or_default();

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    if log_format.eq_ignore_ascii_case("json") {
        init_json_logging(env_filter);
    } else {
        init_text_logging(env_filter);
    }
}

fn init_json_logging(env_filter: EnvFilter) {
    tracing_subscriber::registry()
        .with(env_filter)
        .with(
            fmt::layer()
                .json()
                .with_current_span(true)
                .with_span_list(true)
                .with_file(true)
                .with_line_number(true)
                .with_target(true)
                .flatten_event(true),
        )
        .init();
}

fn init_text_logging(env_filter: EnvFilter) {
    tracing_subscriber::registry()
        .with(env_filter)
        .with(
            fmt::layer()
                .with_target(true)
                .with_thread_ids(false)
                .with_file(false)
                .with_line_number(false)
                .with_ansi(true),
        )
        .init();
}

pub fn init_default_logging() {
    init_logging("sentinela");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn env_filter_parses() {
        let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
        drop(filter);
    }
}
