use crate::error::*;
use std::fmt::Display;
use std::time::Duration;
use tracing::{error, warn};

/// Classification and logging helpers shared by every error type.
pub trait ErrorExt: Display {
    /// Stable machine-readable code.
    fn error_code(&self) -> &'static str;

    fn is_retryable(&self) -> bool;

    fn user_friendly_message(&self) -> String;

    /// How long the failing side asked us to wait, if it said.
    fn retry_after(&self) -> Option<Duration> {
        None
    }

    fn log_error(&self) -> &Self {
        error!(code = self.error_code(), "{}", self);
        self
    }

    fn log_warn(&self) -> &Self {
        warn!(code = self.error_code(), "{}", self);
        self
    }
}

impl ErrorExt for CoreError {
    fn error_code(&self) -> &'static str {
        match self {
            CoreError::Store(_) => "STORE",
            CoreError::Classifier(_) => "CLASSIFIER",
            CoreError::Config(_) => "CONFIG",
            CoreError::Io(_) => "IO",
            CoreError::Serialization(_) => "SERIALIZATION",
            CoreError::Network(_) => "NETWORK",
            CoreError::InvalidInput { .. } => "INVALID_INPUT",
            CoreError::Internal { .. } => "INTERNAL",
            CoreError::RateLimited { .. } => "RATE_LIMITED",
        }
    }

    fn is_retryable(&self) -> bool {
        match self {
            CoreError::Store(inner) => inner.is_retryable(),
            CoreError::Classifier(inner) => inner.is_retryable(),
            CoreError::Config(inner) => inner.is_retryable(),
            // An unparsable body counts as a transient failure.
            CoreError::Serialization(_) | CoreError::Network(_) | CoreError::RateLimited { .. } => {
                true
            }
            CoreError::Io(_)
            | CoreError::InvalidInput { .. }
            | CoreError::Internal { .. } => false,
        }
    }

    fn user_friendly_message(&self) -> String {
        match self {
            CoreError::Store(inner) => inner.user_friendly_message(),
            CoreError::Classifier(inner) => inner.user_friendly_message(),
            CoreError::Config(inner) => inner.user_friendly_message(),
            CoreError::Io(e) => format!("Could not read or write a file: {}", e),
            CoreError::Network(_) => "Could not reach the classification service.".to_string(),
            CoreError::InvalidInput { message } => format!("Invalid input: {}", message),
            CoreError::RateLimited { retry_after, .. } => match retry_after {
                Some(wait) => format!("Too many requests, retry in {}s.", wait.as_secs()),
                None => "Too many requests, retry shortly.".to_string(),
            },
            CoreError::Serialization(_) | CoreError::Internal { .. } => {
                "Something unexpected went wrong.".to_string()
            }
        }
    }

    fn retry_after(&self) -> Option<Duration> {
        match self {
            CoreError::RateLimited { retry_after, .. } => *retry_after,
            _ => None,
        }
    }
}

impl ErrorExt for StoreError {
    fn error_code(&self) -> &'static str {
        match self {
            StoreError::Unavailable { .. } => "STORE_UNAVAILABLE",
            StoreError::MalformedValue { .. } => "STORE_MALFORMED_VALUE",
            StoreError::MigrationFailed { .. } => "STORE_MIGRATION_FAILED",
            StoreError::Sql(_) => "STORE_SQL",
        }
    }

    fn is_retryable(&self) -> bool {
        matches!(self, StoreError::Unavailable { .. } | StoreError::Sql(_))
    }

    fn user_friendly_message(&self) -> String {
        match self {
            StoreError::MalformedValue { key, .. } => {
                format!("The stored value for '{}' is unreadable and was ignored.", key)
            }
            StoreError::MigrationFailed { .. } => {
                "The settings database could not be upgraded.".to_string()
            }
            StoreError::Unavailable { .. } | StoreError::Sql(_) => {
                "Settings storage is unavailable right now.".to_string()
            }
        }
    }
}

impl ErrorExt for ClassifierError {
    fn error_code(&self) -> &'static str {
        match self {
            ClassifierError::MissingCredential { .. } => "CLASSIFIER_MISSING_CREDENTIAL",
            ClassifierError::BadRequest { .. } => "CLASSIFIER_BAD_REQUEST",
            ClassifierError::HttpStatus { .. } => "CLASSIFIER_HTTP_STATUS",
            ClassifierError::InvalidResponseFormat { .. } => "CLASSIFIER_INVALID_RESPONSE",
            ClassifierError::EmptyChoices { .. } => "CLASSIFIER_EMPTY_CHOICES",
        }
    }

    /// Everything but a missing key may go away on the next attempt.
    fn is_retryable(&self) -> bool {
        !matches!(self, ClassifierError::MissingCredential { .. })
    }

    fn user_friendly_message(&self) -> String {
        match self {
            ClassifierError::MissingCredential { provider } => format!(
                "No API key configured for {}. Run `feedguard credential set`.",
                provider
            ),
            ClassifierError::BadRequest { provider } => {
                format!("{} rejected the classification request.", provider)
            }
            ClassifierError::HttpStatus {
                provider,
                status_code,
            } => format!("{} answered with HTTP {}.", provider, status_code),
            ClassifierError::InvalidResponseFormat { provider, .. }
            | ClassifierError::EmptyChoices { provider } => {
                format!("{} returned an answer that could not be read.", provider)
            }
        }
    }
}

impl ErrorExt for ConfigError {
    fn error_code(&self) -> &'static str {
        match self {
            ConfigError::FileNotFound { .. } => "CONFIG_FILE_NOT_FOUND",
            ConfigError::InvalidValue { .. } => "CONFIG_INVALID_VALUE",
            ConfigError::ValidationFailed { .. } => "CONFIG_VALIDATION_FAILED",
            ConfigError::Parse(_) => "CONFIG_PARSE",
        }
    }

    fn is_retryable(&self) -> bool {
        false
    }

    fn user_friendly_message(&self) -> String {
        match self {
            ConfigError::FileNotFound { path } => format!("Cannot read '{}'.", path),
            ConfigError::InvalidValue { field, value } => {
                format!("'{}' is not a valid value for {}.", value, field)
            }
            ConfigError::ValidationFailed { reason } => format!("Invalid configuration: {}", reason),
            ConfigError::Parse(e) => format!("The configuration file is not valid TOML: {}", e),
        }
    }
}
