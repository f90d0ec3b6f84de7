// Deskportal - Service-Desk Portal Requests and Settings Service
// Root library module

pub mod observability;
pub mod contracts;
pub mod types;
pub mod settings;
pub mod validator;
pub mod resolver;
pub mod envelope;
pub mod wrappers;
pub mod memory_kv;
pub mod catalog_engine;
pub mod local_host;
pub mod http_server;

// Re-export key types
pub use observability::{
    init_logging,
    init_logging_with_level,
    metrics_snapshot,
    with_request_id,
    RequestContext,
};

pub use contracts::{
    AuthenticatedUser,
    Authenticator,
    IssueRecord,
    KVStore,
    ParseOutcome,
    QueryEngine,
    Renderer,
};

// Re-export the configuration domain
pub use types::{ButtonSlot, ScopeKey, MAX_BUTTON_SLOTS};

pub use settings::{PortalConfig, PortalConfigPatch, SettingsError, SettingsStore};

pub use resolver::{default_query, effective_query_of, ConfigResolver, FALLBACK_PROJECT_KEY};

pub use validator::{QueryValidator, Validation, BLANK_QUERY_MESSAGE};

pub use envelope::{Diagnostics, ErrorEnvelope};

// Re-export bundled adapters
pub use catalog_engine::CatalogQueryEngine;
pub use local_host::{PlainRenderer, StaticAuthenticator};
pub use memory_kv::{create_memory_kv_store, MemoryKVStore};
pub use wrappers::TracedKVStore;

// Re-export the HTTP surface
pub use http_server::{create_server, start_server, ServiceDeskRequest};
