//! Domain-level error taxonomy and the outward-facing result envelope.
//!
//! Mirrors the split used across the integration layer this crate was
//! adapted from: infrastructure failures propagate as [`SystemError`]
//! with `?`, while business-rule outcomes are represented as
//! [`EngineError`] and converted into a [`ResultEnvelope`] at the
//! handler boundary — they are never raised as exceptions.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

/// Infrastructure-level failures (db, io, serialization). These propagate
/// with `?` through repositories and the upstream client, and are only
/// ever turned into `EngineError::System` at the outermost handler.
#[derive(Debug, thiserror::Error)]
pub enum SystemError {
    #[error("database error: {0}")]
    Database(String),

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("io error: {0}")]
    Io(String),

    #[error("upstream transport error: {0}")]
    UpstreamTransport(String),
}

impl From<sqlx::Error> for SystemError {
    fn from(e: sqlx::Error) -> Self {
        SystemError::Database(e.to_string())
    }
}

impl From<serde_json::Error> for SystemError {
    fn from(e: serde_json::Error) -> Self {
        SystemError::Serialization(e.to_string())
    }
}

/// Stable error codes from the domain's error taxonomy. Every variant's
/// `code()` is the exact string callers branch on.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind")]
pub enum EngineError {
    Validation {
        code: String,
        message: String,
        #[serde(default, skip_serializing_if = "HashMap::is_empty")]
        details: HashMap<String, Value>,
    },
    BusinessRule {
        code: String,
        message: String,
        #[serde(default, skip_serializing_if = "HashMap::is_empty")]
        details: HashMap<String, Value>,
    },
    RateLimited {
        code: String,
        message: String,
        #[serde(default, skip_serializing_if = "HashMap::is_empty")]
        details: HashMap<String, Value>,
    },
    Upstream {
        code: String,
        message: String,
        #[serde(default, skip_serializing_if = "HashMap::is_empty")]
        details: HashMap<String, Value>,
    },
    NotFound {
        code: String,
        message: String,
        #[serde(default, skip_serializing_if = "HashMap::is_empty")]
        details: HashMap<String, Value>,
    },
    System {
        code: String,
        message: String,
        #[serde(default, skip_serializing_if = "HashMap::is_empty")]
        details: HashMap<String, Value>,
    },
}

impl EngineError {
    pub fn validation(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Validation {
            code: code.into(),
            message: message.into(),
            details: HashMap::new(),
        }
    }

    pub fn business_rule(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self::BusinessRule {
            code: code.into(),
            message: message.into(),
            details: HashMap::new(),
        }
    }

    pub fn business_rule_with_details(
        code: impl Into<String>,
        message: impl Into<String>,
        details: HashMap<String, Value>,
    ) -> Self {
        Self::BusinessRule {
            code: code.into(),
            message: message.into(),
            details,
        }
    }

    pub fn rate_limited(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self::RateLimited {
            code: code.into(),
            message: message.into(),
            details: HashMap::new(),
        }
    }

    pub fn upstream(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Upstream {
            code: code.into(),
            message: message.into(),
            details: HashMap::new(),
        }
    }

    pub fn not_found(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self::NotFound {
            code: code.into(),
            message: message.into(),
            details: HashMap::new(),
        }
    }

    pub fn system(message: impl Into<String>) -> Self {
        Self::System {
            code: "system_error".to_string(),
            message: message.into(),
            details: HashMap::new(),
        }
    }

    pub fn code(&self) -> &str {
        match self {
            EngineError::Validation { code, .. }
            | EngineError::BusinessRule { code, .. }
            | EngineError::RateLimited { code, .. }
            | EngineError::Upstream { code, .. }
            | EngineError::NotFound { code, .. }
            | EngineError::System { code, .. } => code,
        }
    }

    pub fn message(&self) -> &str {
        match self {
            EngineError::Validation { message, .. }
            | EngineError::BusinessRule { message, .. }
            | EngineError::RateLimited { message, .. }
            | EngineError::Upstream { message, .. }
            | EngineError::NotFound { message, .. }
            | EngineError::System { message, .. } => message,
        }
    }

    pub fn details(&self) -> &HashMap<String, Value> {
        match self {
            EngineError::Validation { details, .. }
            | EngineError::BusinessRule { details, .. }
            | EngineError::RateLimited { details, .. }
            | EngineError::Upstream { details, .. }
            | EngineError::NotFound { details, .. }
            | EngineError::System { details, .. } => details,
        }
    }
}

impl From<SystemError> for EngineError {
    fn from(e: SystemError) -> Self {
        EngineError::system(e.to_string())
    }
}

/// Uniform success/failure envelope returned by every command/query
/// handler (§4.1). Both branches are normal returns — only programmer
/// errors ever propagate past a handler.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResultEnvelope {
    pub ok: bool,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<HashMap<String, Value>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_code: Option<String>,
}

impl ResultEnvelope {
    pub fn success(message: impl Into<String>, data: Option<HashMap<String, Value>>) -> Self {
        Self {
            ok: true,
            message: message.into(),
            data,
            error_code: None,
        }
    }

    pub fn failure(error: &EngineError) -> Self {
        Self {
            ok: false,
            message: error.message().to_string(),
            data: if error.details().is_empty() {
                None
            } else {
                Some(error.details().clone())
            },
            error_code: Some(error.code().to_string()),
        }
    }
}

impl From<Result<ResultEnvelope, EngineError>> for ResultEnvelope {
    fn from(r: Result<ResultEnvelope, EngineError>) -> Self {
        match r {
            Ok(envelope) => envelope,
            Err(e) => ResultEnvelope::failure(&e),
        }
    }
}

/// Builds a `HashMap<String, serde_json::Value>` from key/value pairs,
/// mirroring the teacher's `details!` macro used to attach structured
/// context to an error without hand-writing `HashMap::from`.
#[macro_export]
macro_rules! details {
    ($($key:expr => $value:expr),* $(,)?) => {{
        let mut map = std::collections::HashMap::new();
        $(map.insert($key.to_string(), serde_json::json!($value));)*
        map
    }};
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn failure_envelope_carries_code_and_message() {
        let err = EngineError::business_rule("no_pending_verification", "no pending verification");
        let env = ResultEnvelope::failure(&err);
        assert!(!env.ok);
        assert_eq!(env.error_code.as_deref(), Some("no_pending_verification"));
        assert_eq!(env.message, "no pending verification");
    }

    #[test]
    fn details_macro_builds_map() {
        let d = details!("attempts_left" => 2, "cpf" => "529.982.***-**");
        assert_eq!(d.get("attempts_left").unwrap(), &Value::from(2));
    }
}
