// Validated Types
// Strongly-typed wrappers for the configuration domain. These types cannot
// be constructed with invalid data, so the resolver and save path never have
// to re-check shape invariants.

use anyhow::{ensure, Result};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Maximum number of portal button slots per scope.
pub const MAX_BUTTON_SLOTS: usize = 5;

/// A configuration scope: `"global"` or a project identifier.
///
/// # Invariants
/// - Never blank: empty or whitespace-only input normalizes to `"global"`
/// - Surrounding whitespace is trimmed
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ScopeKey {
    inner: String,
}

impl ScopeKey {
    pub const GLOBAL: &'static str = "global";

    pub fn new(scope: impl AsRef<str>) -> Self {
        let trimmed = scope.as_ref().trim();
        let inner = if trimmed.is_empty() {
            Self::GLOBAL.to_string()
        } else {
            trimmed.to_string()
        };
        Self { inner }
    }

    pub fn global() -> Self {
        Self {
            inner: Self::GLOBAL.to_string(),
        }
    }

    /// Normalize an optional request parameter: absent and blank both mean
    /// the global scope.
    pub fn from_param(param: Option<&str>) -> Self {
        match param {
            Some(value) => Self::new(value),
            None => Self::global(),
        }
    }

    pub fn is_global(&self) -> bool {
        self.inner == Self::GLOBAL
    }

    pub fn as_str(&self) -> &str {
        &self.inner
    }
}

impl fmt::Display for ScopeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.inner)
    }
}

/// One portal button slot: a label plus a target URL.
///
/// # Invariants
/// - Either both sides are set (a configured button) or both are empty
///   (a cleared slot); half-filled entries cannot be constructed
/// - Label and URL are stored trimmed
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ButtonSlot {
    label: String,
    url: String,
}

impl ButtonSlot {
    pub fn new(label: impl AsRef<str>, url: impl AsRef<str>) -> Result<Self> {
        let label = label.as_ref().trim();
        let url = url.as_ref().trim();

        ensure!(
            label.is_empty() == url.is_empty(),
            "button entry must set both label and url, or neither (label: {:?}, url: {:?})",
            label,
            url
        );

        Ok(Self {
            label: label.to_string(),
            url: url.to_string(),
        })
    }

    /// An unconfigured slot.
    pub fn empty() -> Self {
        Self::default()
    }

    /// True when the slot has been cleared (neither side set).
    pub fn is_empty(&self) -> bool {
        self.label.is_empty()
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

/// Validate a full button payload: at most [`MAX_BUTTON_SLOTS`] entries,
/// every entry either configured or cleared. The first malformed entry
/// fails the whole payload.
pub fn validate_button_slots<L, U>(entries: &[(L, U)]) -> Result<Vec<ButtonSlot>>
where
    L: AsRef<str>,
    U: AsRef<str>,
{
    ensure!(
        entries.len() <= MAX_BUTTON_SLOTS,
        "at most {} button slots are supported, got {}",
        MAX_BUTTON_SLOTS,
        entries.len()
    );

    entries
        .iter()
        .map(|(label, url)| ButtonSlot::new(label, url))
        .collect()
}
