// Query Validator
// Parser-only validation against the host engine. The validator never
// executes a search; it orchestrates the engine's parse path and shields
// callers from engine faults.

use std::sync::Arc;
use tracing::warn;

use crate::contracts::{AuthenticatedUser, QueryEngine};

/// Message reported for blank candidates, which are rejected before the
/// engine is ever consulted.
pub const BLANK_QUERY_MESSAGE: &str = "Query cannot be empty";

/// Validation verdict for a candidate query string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Validation {
    pub valid: bool,
    pub errors: Vec<String>,
}

impl Validation {
    pub fn valid() -> Self {
        Self {
            valid: true,
            errors: Vec::new(),
        }
    }

    pub fn invalid(errors: Vec<String>) -> Self {
        Self {
            valid: false,
            errors,
        }
    }

    /// All error messages joined for single-string contexts (envelope
    /// details, `SettingsError::InvalidQuery`).
    pub fn detail(&self) -> String {
        self.errors.join("; ")
    }
}

/// Validates candidate queries through the engine's parse-only path.
#[derive(Clone)]
pub struct QueryValidator {
    engine: Arc<dyn QueryEngine>,
}

impl QueryValidator {
    pub fn new(engine: Arc<dyn QueryEngine>) -> Self {
        Self { engine }
    }

    /// Validate a candidate query for the acting user.
    ///
    /// Blank input is invalid with a fixed message and is not forwarded to
    /// the engine. An engine fault is converted into an invalid verdict
    /// carrying the fault message; it never propagates as an error.
    pub async fn validate(&self, user: &AuthenticatedUser, candidate: &str) -> Validation {
        let trimmed = candidate.trim();
        if trimmed.is_empty() {
            return Validation::invalid(vec![BLANK_QUERY_MESSAGE.to_string()]);
        }

        match self.engine.parse(user, trimmed).await {
            Ok(outcome) if outcome.valid => Validation::valid(),
            Ok(outcome) => Validation::invalid(outcome.errors),
            Err(e) => {
                warn!(user = %user.key, error = %e, "Query parser failed, reporting invalid");
                Validation::invalid(vec![format!("Query validation failed: {e}")])
            }
        }
    }
}
