//! Error taxonomy for the generation pipeline.
//!
//! Codec and operation errors are local: the validator absorbs them into
//! its accepted/rejected split. Provider errors drive the fallback chain
//! and only surface once every provider has failed.

use thiserror::Error;

/// A single property value failed to decode for its declared type.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum CodecError {
    #[error("invalid {ty} value '{value}': {reason}")]
    InvalidPropertyValue {
        ty: String,
        value: String,
        reason: String,
    },
}

impl CodecError {
    pub(crate) fn invalid(ty: &str, value: &str, reason: impl Into<String>) -> Self {
        Self::InvalidPropertyValue {
            ty: ty.to_string(),
            value: value.to_string(),
            reason: reason.into(),
        }
    }
}

/// Why a single operation was dropped by the validator.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum OperationError {
    #[error("operation is not an object")]
    NotAnObject,

    #[error("unknown operation type")]
    UnknownType(String),

    #[error("path must be a non-empty list of names")]
    EmptyPath,

    #[error("{action} edit requires '{field}'")]
    MissingField { action: String, field: &'static str },

    #[error("edit has invalid action '{0}'")]
    InvalidAction(String),

    #[error("lineNumber must be an integer >= 1")]
    InvalidLineNumber,

    #[error("edit_script requires at least one edit")]
    NoEdits,

    #[error("no valid properties remain")]
    NoValidProperties,

    #[error("missing required field '{0}'")]
    MissingRequired(&'static str),
}

/// Failure of one provider attempt. Always recoverable by fallback.
#[derive(Debug, Clone, Error)]
pub enum ProviderError {
    #[error("{provider} timed out after {ms}ms")]
    Timeout { provider: String, ms: u128 },

    #[error("{provider} returned HTTP {status}: {message}")]
    Http {
        provider: String,
        status: u16,
        message: String,
    },

    #[error("{provider} returned a malformed response: {message}")]
    MalformedResponse { provider: String, message: String },

    #[error("{provider} request failed: {message}")]
    Transport { provider: String, message: String },

    #[error("no credential for {provider} (set {env_var})")]
    MissingCredential { provider: String, env_var: String },
}

/// Errors that end a request (or a provider switch).
#[derive(Debug, Error)]
pub enum GenerationError {
    #[error("Validation failed")]
    Validation(Vec<String>),

    #[error("All AI providers failed. Last error: {last_error}")]
    AllProvidersExhausted { attempts: usize, last_error: String },

    #[error("Provider {provider} is unavailable: set {env_var}")]
    ProviderUnavailable { provider: String, env_var: String },

    #[error("Unknown provider: {0}")]
    UnknownProvider(String),

    #[error("No AI provider API key found. Please set one of: {}", env_vars.join(", "))]
    NoProvidersConfigured { env_vars: Vec<String> },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exhausted_message_carries_last_error() {
        let err = GenerationError::AllProvidersExhausted {
            attempts: 3,
            last_error: "Google Gemini returned HTTP 500: boom".into(),
        };
        assert!(err.to_string().contains("HTTP 500: boom"));
    }

    #[test]
    fn unknown_type_reason_is_stable() {
        let err = OperationError::UnknownType("explode".into());
        assert_eq!(err.to_string(), "unknown operation type");
    }

    #[test]
    fn sub_second_timeout_is_reported_in_millis() {
        let err = ProviderError::Timeout {
            provider: "OpenAI".into(),
            ms: std::time::Duration::from_millis(50).as_millis(),
        };
        assert_eq!(err.to_string(), "OpenAI timed out after 50ms");
    }

    #[test]
    fn no_providers_lists_env_vars() {
        let err = GenerationError::NoProvidersConfigured {
            env_vars: vec!["A_KEY".into(), "B_KEY".into()],
        };
        assert!(err.to_string().ends_with("A_KEY, B_KEY"));
    }
}
