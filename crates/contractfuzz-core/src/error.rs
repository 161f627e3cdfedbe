//! Contract-level errors raised by generation and derivation

use crate::report::FailureReport;
use crate::result::Failure;

/// Raised when a schema cannot yield data; ordinary data mismatches are never errors.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ContractError {
    /// Aggregated failures, rendered as a report.
    #[error("{}", FailureReport::from_failure(.0).to_text())]
    Failed(Failure),

    #[error("Failed to parse value \"{value}\". It should have matched one of {}.", .expected.join(", "))]
    Parse { value: String, expected: Vec<String> },

    /// A named pattern re-entered itself with no nullable escape.
    #[error("Invalid pattern cycle: {}", .stack.join(" -> "))]
    Cycle { stack: Vec<String> },

    #[error("Type {0} is not defined")]
    UnknownType(String),

    /// Contradictory or otherwise unusable schema.
    #[error("{0}")]
    Invalid(String),
}

impl ContractError {
    /// Aggregate failures under a headline message.
    pub fn aggregate(message: impl Into<String>, failures: Vec<Failure>) -> Self {
        let message = message.into();
        if failures.is_empty() {
            return Self::Failed(Failure::new(message));
        }
        Self::Failed(Failure {
            message,
            breadcrumbs: Vec::new(),
            causes: failures,
        })
    }

    #[must_use]
    pub const fn is_cycle(&self) -> bool {
        matches!(self, Self::Cycle { .. })
    }

    /// This error as a failure, for reporting next to match failures.
    pub fn failure(&self) -> Failure {
        match self {
            Self::Failed(failure) => failure.clone(),
            other => Failure::new(other.to_string()),
        }
    }

    /// Re-root under `segment`. Cycle errors keep their identity so a nullable guard can absorb them.
    #[must_use]
    pub fn breadcrumb(self, segment: &str) -> Self {
        match self {
            Self::Cycle { .. } => self,
            other => Self::Failed(other.failure().breadcrumb(segment)),
        }
    }
}
