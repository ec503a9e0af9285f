use crate::category::ErrorCategory;
use crate::failure::Failure;
use thiserror::Error;

/// Why a recovery attempt did not produce a value.
///
/// Every variant keeps the failure that started recovery reachable through
/// [`RecoveryError::original`], so nothing about the first diagnostic is lost
/// when strategies wrap or replace the message.
#[derive(Debug, Clone, Error)]
pub enum RecoveryError {
    #[error("{0}")]
    Failed(Failure),

    #[error("{last} (gave up after {attempts} attempts)")]
    Exhausted {
        attempts: u32,
        last: Failure,
        original: Failure,
    },

    #[error("{message}")]
    Aborted {
        message: String,
        exit_code: Option<i32>,
        original: Failure,
    },

    #[error("{original}; fallback also failed: {fallback}")]
    FallbackFailed { original: Failure, fallback: Failure },

    #[error("{target}: {inner}")]
    Target {
        target: String,
        category: ErrorCategory,
        inner: Box<RecoveryError>,
    },
}

impl RecoveryError {
    /// The failure that was handed to the first strategy.
    pub fn original(&self) -> &Failure {
        match self {
            RecoveryError::Failed(f) => f,
            RecoveryError::Exhausted { original, .. }
            | RecoveryError::Aborted { original, .. }
            | RecoveryError::FallbackFailed { original, .. } => original,
            RecoveryError::Target { inner, .. } => inner.original(),
        }
    }

    pub fn exit_code(&self) -> Option<i32> {
        match self {
            RecoveryError::Aborted { exit_code, .. } => *exit_code,
            RecoveryError::Target { inner, .. } => inner.exit_code(),
            _ => None,
        }
    }

    pub fn target(&self) -> Option<&str> {
        match self {
            RecoveryError::Target { target, .. } => Some(target),
            _ => None,
        }
    }

    pub fn category(&self) -> Option<ErrorCategory> {
        match self {
            RecoveryError::Target { category, .. } => Some(*category),
            _ => None,
        }
    }
}

/// Result of handing a failure to a recovery strategy.
///
/// A recovered outcome carries only a value and an unrecovered one carries
/// only an error; there is no state with both or neither.
#[derive(Debug)]
pub enum RecoveryOutcome<T> {
    Recovered(T),
    Unrecovered(RecoveryError),
}

impl<T> RecoveryOutcome<T> {
    pub fn failed(failure: &Failure) -> Self {
        RecoveryOutcome::Unrecovered(RecoveryError::Failed(failure.clone()))
    }

    pub fn is_recovered(&self) -> bool {
        matches!(self, RecoveryOutcome::Recovered(_))
    }

    pub fn result(&self) -> Option<&T> {
        match self {
            RecoveryOutcome::Recovered(v) => Some(v),
            RecoveryOutcome::Unrecovered(_) => None,
        }
    }

    pub fn error(&self) -> Option<&RecoveryError> {
        match self {
            RecoveryOutcome::Recovered(_) => None,
            RecoveryOutcome::Unrecovered(e) => Some(e),
        }
    }

    pub fn into_result(self) -> Result<T, RecoveryError> {
        match self {
            RecoveryOutcome::Recovered(v) => Ok(v),
            RecoveryOutcome::Unrecovered(e) => Err(e),
        }
    }
}
