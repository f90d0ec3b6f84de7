// Scoped Settings Records
// One JSON record per configuration scope, persisted through the KVStore
// port, with an explicit patch type for partial updates. Fields omitted from
// a patch are untouched by construction, so the merge invariant is carried
// by the type system rather than by key-handling convention.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::contracts::KVStore;
use crate::types::{ButtonSlot, ScopeKey};

/// Key prefix for scope records in the host settings store.
pub const SETTINGS_KEY_PREFIX: &str = "portal.settings.";

/// Failures surfaced by the settings write path. Read failures never appear
/// here; reads degrade to defaults instead.
#[derive(Debug, thiserror::Error)]
pub enum SettingsError {
    #[error("Invalid query: {0}")]
    InvalidQuery(String),

    #[error("Invalid button configuration: {0}")]
    InvalidButtonEntry(String),

    #[error("Failed to save settings: {0}")]
    StoreWriteFailure(#[source] anyhow::Error),
}

impl SettingsError {
    /// Taxonomy name used in the `errorType` diagnostic field.
    pub fn kind(&self) -> &'static str {
        match self {
            SettingsError::InvalidQuery(_) => "InvalidQuery",
            SettingsError::InvalidButtonEntry(_) => "InvalidButtonEntry",
            SettingsError::StoreWriteFailure(_) => "StoreWriteFailure",
        }
    }
}

/// Stored configuration for one scope.
///
/// # Invariants
/// - `use_custom_query == true` requires a non-blank `query` (enforced on
///   the save path); when false, the generated default applies and any
///   stored `query` is retained but ignored, so switching custom mode back
///   on reactivates the previous query
/// - `buttons` holds at most five slots, in display order
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PortalConfig {
    pub query: Option<String>,
    pub use_custom_query: bool,
    pub buttons: Vec<ButtonSlot>,
    pub linked_spaces: BTreeSet<String>,
}

impl PortalConfig {
    /// Apply a partial update. Only the fields present in the patch change.
    pub fn merged(mut self, patch: PortalConfigPatch) -> Self {
        if let Some(query) = patch.query {
            self.query = Some(query.trim().to_string());
        }
        if let Some(use_custom) = patch.use_custom_query {
            self.use_custom_query = use_custom;
        }
        if let Some(buttons) = patch.buttons {
            self.buttons = buttons;
        }
        if let Some(spaces) = patch.linked_spaces {
            self.linked_spaces = spaces;
        }
        self
    }
}

/// Partial update for a scope's configuration. Every field is optional;
/// `None` means "leave the stored value alone". Buttons arrive here already
/// validated into typed slots.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PortalConfigPatch {
    pub query: Option<String>,
    pub use_custom_query: Option<bool>,
    pub buttons: Option<Vec<ButtonSlot>>,
    pub linked_spaces: Option<BTreeSet<String>>,
}

impl PortalConfigPatch {
    /// True when this patch turns custom-query mode on or supplies a
    /// non-blank query, which obligates validation before persisting.
    pub fn touches_custom_query(&self) -> bool {
        self.use_custom_query == Some(true)
            || self
                .query
                .as_deref()
                .is_some_and(|q| !q.trim().is_empty())
    }
}

/// Settings persistence for scope records over the KVStore port.
#[derive(Clone)]
pub struct SettingsStore {
    kv: Arc<dyn KVStore>,
}

impl SettingsStore {
    pub fn new(kv: Arc<dyn KVStore>) -> Self {
        Self { kv }
    }

    fn record_key(scope: &ScopeKey) -> String {
        format!("{SETTINGS_KEY_PREFIX}{scope}")
    }

    /// Load the stored configuration for a scope.
    ///
    /// Store failures and unreadable records degrade to the default
    /// configuration; the read path always gets something usable.
    pub async fn load(&self, scope: &ScopeKey) -> PortalConfig {
        let key = Self::record_key(scope);
        match self.kv.get(&key).await {
            Ok(Some(raw)) => match serde_json::from_str(&raw) {
                Ok(config) => config,
                Err(e) => {
                    warn!(scope = %scope, error = %e, "Unreadable settings record, using defaults");
                    PortalConfig::default()
                }
            },
            Ok(None) => {
                debug!(scope = %scope, "No stored settings, using defaults");
                PortalConfig::default()
            }
            Err(e) => {
                warn!(scope = %scope, error = %e, "Settings read failed, using defaults");
                PortalConfig::default()
            }
        }
    }

    /// Persist the full record for a scope in one write. Write failures are
    /// surfaced to the caller; there is no retry.
    pub async fn save(
        &self,
        scope: &ScopeKey,
        config: &PortalConfig,
    ) -> Result<(), SettingsError> {
        let key = Self::record_key(scope);
        let raw = serde_json::to_string(config)
            .map_err(|e| SettingsError::StoreWriteFailure(e.into()))?;
        self.kv
            .put(&key, &raw)
            .await
            .map_err(SettingsError::StoreWriteFailure)?;
        crate::observability::record_settings_write();
        Ok(())
    }
}
