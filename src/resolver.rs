// Configuration Resolver
// Computes the effective query and button/link configuration for a scope,
// and owns the save/merge path. Resolution is read-only and always yields a
// usable query; saves validate before anything is written.

use std::sync::Arc;
use tracing::debug;

use crate::contracts::{AuthenticatedUser, KVStore, QueryEngine};
use crate::settings::{PortalConfig, PortalConfigPatch, SettingsError, SettingsStore};
use crate::types::{validate_button_slots, ButtonSlot, ScopeKey};
use crate::validator::QueryValidator;

/// Project token substituted into the generated default for the global scope.
pub const FALLBACK_PROJECT_KEY: &str = "DESK";

/// Generated default query for a scope: the scope's own identifier is the
/// project token unless the scope is global.
pub fn default_query(scope: &ScopeKey) -> String {
    let project = if scope.is_global() {
        FALLBACK_PROJECT_KEY
    } else {
        scope.as_str()
    };
    format!("project = {project} ORDER BY created DESC")
}

/// Convert a raw button payload into typed slots, mapping shape failures to
/// the settings taxonomy. Nothing is persisted when this fails.
pub fn validated_buttons<L, U>(entries: &[(L, U)]) -> Result<Vec<ButtonSlot>, SettingsError>
where
    L: AsRef<str>,
    U: AsRef<str>,
{
    validate_button_slots(entries).map_err(|e| SettingsError::InvalidButtonEntry(e.to_string()))
}

/// Resolves and persists per-scope portal configuration.
#[derive(Clone)]
pub struct ConfigResolver {
    store: SettingsStore,
    validator: QueryValidator,
}

impl ConfigResolver {
    pub fn new(kv: Arc<dyn KVStore>, engine: Arc<dyn QueryEngine>) -> Self {
        Self {
            store: SettingsStore::new(kv),
            validator: QueryValidator::new(engine),
        }
    }

    /// Current stored configuration for a scope, defaults when nothing is
    /// stored or the store is unreachable. Never fails.
    pub async fn resolve(&self, scope: &ScopeKey) -> PortalConfig {
        self.store.load(scope).await
    }

    /// The query a request for this scope will actually run: the trimmed
    /// stored custom query when custom mode is on and the query is
    /// non-blank, otherwise the generated default.
    pub async fn effective_query(&self, scope: &ScopeKey) -> String {
        let config = self.resolve(scope).await;
        effective_query_of(scope, &config)
    }

    /// Apply a partial update to a scope's configuration.
    ///
    /// When the patch turns custom mode on or supplies a non-blank query,
    /// the merged query is validated first; an invalid query rejects the
    /// whole save with nothing written. The merged record is persisted in a
    /// single store write.
    pub async fn save(
        &self,
        user: &AuthenticatedUser,
        scope: &ScopeKey,
        patch: PortalConfigPatch,
    ) -> Result<(), SettingsError> {
        let needs_validation = patch.touches_custom_query();
        let current = self.store.load(scope).await;
        let merged = current.merged(patch);

        if needs_validation {
            let candidate = merged.query.as_deref().unwrap_or("");
            let verdict = self.validator.validate(user, candidate).await;
            if !verdict.valid {
                return Err(SettingsError::InvalidQuery(verdict.detail()));
            }
        }

        debug!(scope = %scope, user = %user.key, "Persisting settings record");
        self.store.save(scope, &merged).await
    }
}

/// Pure override/default rule, split out for direct testing.
pub fn effective_query_of(scope: &ScopeKey, config: &PortalConfig) -> String {
    if config.use_custom_query {
        if let Some(query) = config.query.as_deref() {
            let trimmed = query.trim();
            if !trimmed.is_empty() {
                return trimmed.to_string();
            }
        }
    }
    default_query(scope)
}
