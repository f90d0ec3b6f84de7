// Response Envelopes
// The uniform success/error JSON shapes returned by every endpoint, plus
// the per-request diagnostics block. Pure data; the HTTP layer decides
// status codes.

use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::observability::RequestContext;

/// Diagnostics attached to every successful read-path response.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Diagnostics {
    pub request_id: String,
    /// Wall-clock time the diagnostics were built, RFC 3339.
    pub timestamp: String,
    /// Elapsed milliseconds since the request started.
    pub duration: u64,
    /// Authenticated user key.
    pub user: String,
    /// The exact query string that was executed.
    pub jql: String,
    pub result_count: usize,
    pub version: String,
}

impl Diagnostics {
    pub fn build(ctx: &RequestContext, user: &str, query: &str, result_count: usize) -> Self {
        Self {
            request_id: ctx.request_id.clone(),
            timestamp: Utc::now().to_rfc3339(),
            duration: ctx.elapsed_ms(),
            user: user.to_string(),
            jql: query.to_string(),
            result_count,
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}

/// Error envelope. Optional fields are omitted from the JSON entirely when
/// absent, so minimal errors stay minimal.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorEnvelope {
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_type: Option<String>,
}

impl ErrorEnvelope {
    /// Bare envelope: message only.
    pub fn message(error: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            request_id: None,
            duration: None,
            error_type: None,
        }
    }

    /// Envelope carrying request diagnostics and the error's taxonomy name.
    pub fn diagnostic(
        error: impl Into<String>,
        ctx: &RequestContext,
        error_type: impl Into<String>,
    ) -> Self {
        Self {
            error: error.into(),
            request_id: Some(ctx.request_id.clone()),
            duration: Some(ctx.elapsed_ms()),
            error_type: Some(error_type.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn diagnostics_serialize_with_wire_field_names() {
        let ctx = RequestContext::new("get_recent");
        let diag = Diagnostics::build(&ctx, "agent", "project = DESK", 3);

        let value = serde_json::to_value(&diag).expect("serialize");
        assert_eq!(value["requestId"], ctx.request_id);
        assert_eq!(value["user"], "agent");
        assert_eq!(value["jql"], "project = DESK");
        assert_eq!(value["resultCount"], 3);
        assert!(value["duration"].is_u64());
        assert!(value["timestamp"].is_string());
    }

    #[test]
    fn minimal_error_envelope_has_only_the_error_field() {
        let body = serde_json::to_value(ErrorEnvelope::message("Authentication required"))
            .expect("serialize");
        assert_eq!(
            body,
            serde_json::json!({"error": "Authentication required"})
        );
    }

    #[test]
    fn diagnostic_envelope_carries_type_and_duration() {
        let ctx = RequestContext::new("save_settings");
        let body = serde_json::to_value(ErrorEnvelope::diagnostic(
            "Failed to save settings",
            &ctx,
            "StoreWriteFailure",
        ))
        .expect("serialize");

        assert_eq!(body["errorType"], "StoreWriteFailure");
        assert_eq!(body["requestId"], ctx.request_id);
        assert!(body["duration"].is_u64());
    }
}
