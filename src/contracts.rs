// Host Capability Contracts
// This module defines the port traits between the portal service and the
// host platform it runs inside. Everything the host owns (authentication,
// query parsing and search, key-value persistence, template rendering) is
// consumed through these traits and never reimplemented here.

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::types::ScopeKey;

/// The user the host has already authenticated for the current request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthenticatedUser {
    /// Stable user key, used in diagnostics.
    pub key: String,
    /// Display name, used when rendering the admin page.
    pub display_name: String,
}

impl AuthenticatedUser {
    pub fn new(key: impl Into<String>, display_name: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            display_name: display_name.into(),
        }
    }
}

/// Outcome of the engine's parse-only validation path.
///
/// # Invariants
/// - `valid == true` implies `errors` is empty
/// - error strings are host-supplied and surfaced to callers verbatim
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseOutcome {
    pub valid: bool,
    pub errors: Vec<String>,
}

impl ParseOutcome {
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
}

/// A raw issue as returned by the host search engine. Optional fields are
/// genuinely optional in the host data model; the portal applies its own
/// fallbacks when mapping to the wire shape.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IssueRecord {
    pub key: String,
    pub summary: String,
    pub reporter: Option<String>,
    pub created: Option<DateTime<Utc>>,
    pub status: Option<String>,
    pub status_category: Option<String>,
}

/// Ambient authentication context plus the project-admin permission check.
///
/// # Postconditions
/// - `current_user` returns `None` when nobody is logged in; it never errors
///   (an unreachable auth backend reads as "no user")
/// - `is_project_admin` may fail when the permission backend is unreachable;
///   callers surface that as an unexpected fault
#[async_trait]
pub trait Authenticator: Send + Sync {
    async fn current_user(&self) -> Option<AuthenticatedUser>;

    async fn is_project_admin(&self, user: &AuthenticatedUser, scope: &ScopeKey) -> Result<bool>;
}

/// The host's query parsing and search capability.
#[async_trait]
pub trait QueryEngine: Send + Sync {
    /// Parse a candidate query without executing it.
    ///
    /// # Preconditions
    /// - `query` is non-blank (the validator short-circuits blank input)
    ///
    /// # Postconditions
    /// - Structural problems are reported through `ParseOutcome`, not `Err`
    /// - `Err` means the parser itself failed; callers must convert that
    ///   into an invalid outcome rather than a transport error
    async fn parse(&self, user: &AuthenticatedUser, query: &str) -> Result<ParseOutcome>;

    /// Execute a search bounded to `limit` results, ordered however the
    /// query specifies.
    ///
    /// # Preconditions
    /// - `query` has passed `parse` for the same user
    ///
    /// # Postconditions
    /// - At most `limit` records are returned
    /// - Visibility restrictions are applied by the host, not here
    async fn search(
        &self,
        user: &AuthenticatedUser,
        query: &str,
        limit: usize,
    ) -> Result<Vec<IssueRecord>>;
}

/// Process-wide string-to-string settings persistence.
///
/// # Postconditions
/// - Every call is a direct store round trip; there is no caching layer
/// - Concurrent writers interleave last-write-wins per key
#[async_trait]
pub trait KVStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>>;

    async fn put(&self, key: &str, value: &str) -> Result<()>;
}

/// Host template rendering. The portal only names a template and passes a
/// context; markup production stays on the host side.
pub trait Renderer: Send + Sync {
    fn render(&self, template: &str, context: &serde_json::Value) -> Result<String>;
}
