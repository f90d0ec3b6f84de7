// HTTP REST API Server Implementation
// Portal endpoints: the bounded "recent requests" read path, the settings
// read/save surface, parse-only query validation, and the admin page.

use anyhow::Result;
use axum::{
    extract::{rejection::JsonRejection, Query as AxumQuery, State},
    http::StatusCode,
    response::{Html, IntoResponse, Json, Response},
    routing::{get, post},
    Router,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Instant;
use tokio::net::TcpListener;
use tower::ServiceBuilder;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{error, info, warn};

use crate::{
    contracts::{Authenticator, IssueRecord, KVStore, QueryEngine, Renderer},
    envelope::{Diagnostics, ErrorEnvelope},
    observability::{record_error, record_search, RequestContext},
    resolver::{default_query, validated_buttons, ConfigResolver},
    settings::{PortalConfigPatch, SettingsError},
    types::{ButtonSlot, ScopeKey},
    validator::QueryValidator,
};

/// Hard cap on the read path; callers cannot change it.
const RECENT_RESULT_LIMIT: usize = 10;

// Global server start time for uptime tracking
static SERVER_START_TIME: once_cell::sync::Lazy<Instant> = once_cell::sync::Lazy::new(Instant::now);

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    auth: Arc<dyn Authenticator>,
    engine: Arc<dyn QueryEngine>,
    resolver: Arc<ConfigResolver>,
    validator: Arc<QueryValidator>,
    renderer: Arc<dyn Renderer>,
}

/// One row of the portal's recent-requests table.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ServiceDeskRequest {
    pub key: String,
    pub summary: String,
    pub reporter: String,
    pub created: String,
    pub status: String,
    pub status_category: String,
}

impl TryFrom<IssueRecord> for ServiceDeskRequest {
    type Error = anyhow::Error;

    fn try_from(issue: IssueRecord) -> Result<Self> {
        anyhow::ensure!(
            !issue.key.trim().is_empty(),
            "issue has no key and cannot be displayed"
        );

        Ok(Self {
            key: issue.key,
            summary: issue.summary,
            reporter: issue.reporter.unwrap_or_else(|| "Unknown".to_string()),
            created: issue
                .created
                .map(|ts| ts.to_rfc3339())
                .unwrap_or_default(),
            status: issue.status.unwrap_or_else(|| "Unknown".to_string()),
            status_category: issue
                .status_category
                .unwrap_or_else(|| "unknown".to_string()),
        })
    }
}

/// Response for the recent-requests read path
#[derive(Debug, Serialize, Deserialize)]
pub struct RecentResponse {
    pub data: Vec<ServiceDeskRequest>,
    pub diagnostics: Diagnostics,
}

/// Query parameters accepted by scope-aware endpoints
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScopeParams {
    pub project_key: Option<String>,
}

/// Current settings for a scope, including the computed default query
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SettingsResponse {
    pub project_key: String,
    pub jql: String,
    pub use_custom_jql: bool,
    pub buttons: Vec<ButtonEntry>,
    pub linked_spaces: Vec<String>,
    pub default_jql: String,
}

/// Raw button entry as sent by the settings UI. Shape is checked before
/// anything is persisted.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ButtonEntry {
    #[serde(default)]
    pub label: Option<String>,
    #[serde(default)]
    pub url: Option<String>,
}

impl From<&ButtonSlot> for ButtonEntry {
    fn from(slot: &ButtonSlot) -> Self {
        Self {
            label: Some(slot.label().to_string()),
            url: Some(slot.url().to_string()),
        }
    }
}

/// Partial settings update payload
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SaveSettingsRequest {
    pub project_key: Option<String>,
    pub jql: Option<String>,
    pub use_custom_jql: Option<bool>,
    pub buttons: Option<Vec<ButtonEntry>>,
    pub linked_spaces: Option<Vec<String>>,
}

/// Buttons-only update payload
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SaveButtonsRequest {
    pub project_key: Option<String>,
    pub buttons: Vec<ButtonEntry>,
}

/// Response for successful settings writes
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SaveResponse {
    pub success: bool,
    pub message: String,
    pub project_key: String,
}

/// Body for parse-only query validation
#[derive(Debug, Deserialize)]
pub struct ValidateJqlRequest {
    #[serde(default)]
    pub jql: Option<String>,
}

/// One selectable Confluence space
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpaceOption {
    pub value: String,
    pub label: String,
}

/// Health check response
#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub uptime_seconds: u64,
}

/// Create HTTP server with all routes configured
pub fn create_server(
    auth: Arc<dyn Authenticator>,
    engine: Arc<dyn QueryEngine>,
    kv: Arc<dyn KVStore>,
    renderer: Arc<dyn Renderer>,
) -> Router {
    let state = AppState {
        auth,
        engine: engine.clone(),
        resolver: Arc::new(ConfigResolver::new(kv, engine.clone())),
        validator: Arc::new(QueryValidator::new(engine)),
        renderer,
    };

    Router::new()
        .route("/health", get(health_check))
        .route("/recent", get(get_recent))
        .route("/settings", get(get_settings))
        .route("/settings", post(save_settings))
        .route("/settings/buttons", post(save_buttons))
        .route("/settings/validate-jql", post(validate_jql))
        .route("/settings/confluence-spaces", get(confluence_spaces))
        .route("/settings/page", get(settings_page))
        .with_state(state)
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(CorsLayer::permissive()),
        )
}

/// Start the HTTP server on the specified port
pub async fn start_server(
    auth: Arc<dyn Authenticator>,
    engine: Arc<dyn QueryEngine>,
    kv: Arc<dyn KVStore>,
    renderer: Arc<dyn Renderer>,
    port: u16,
) -> Result<()> {
    let app = create_server(auth, engine, kv, renderer);
    let listener = TcpListener::bind(&format!("0.0.0.0:{port}")).await?;

    info!("deskportal HTTP server starting on port {}", port);

    axum::serve(listener, app).await?;

    Ok(())
}

fn error_body(status: StatusCode, envelope: ErrorEnvelope) -> Response {
    record_error();
    (status, Json(envelope)).into_response()
}

fn unauthenticated(ctx: Option<&RequestContext>) -> Response {
    let envelope = match ctx {
        Some(ctx) => ErrorEnvelope {
            error: "Authentication required".to_string(),
            request_id: Some(ctx.request_id.clone()),
            duration: None,
            error_type: None,
        },
        None => ErrorEnvelope::message("Authentication required"),
    };
    error_body(StatusCode::UNAUTHORIZED, envelope)
}

fn settings_error_response(err: SettingsError, ctx: &RequestContext) -> Response {
    let status = match &err {
        SettingsError::InvalidQuery(_) | SettingsError::InvalidButtonEntry(_) => {
            StatusCode::BAD_REQUEST
        }
        SettingsError::StoreWriteFailure(_) => StatusCode::INTERNAL_SERVER_ERROR,
    };
    error_body(
        status,
        ErrorEnvelope::diagnostic(err.to_string(), ctx, err.kind()),
    )
}

/// Health check endpoint
async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_seconds: SERVER_START_TIME.elapsed().as_secs(),
    })
}

/// Recent requests for the portal footer. Bounded to ten results; falls
/// back to the generated default query when the configured one does not
/// parse, and rejects only when the default fails too.
async fn get_recent(
    State(state): State<AppState>,
    AxumQuery(params): AxumQuery<ScopeParams>,
) -> Response {
    let ctx = RequestContext::new("get_recent");
    let scope = ScopeKey::from_param(params.project_key.as_deref());

    let Some(user) = state.auth.current_user().await else {
        warn!(request_id = %ctx.request_id, "Recent requests rejected: no user");
        return unauthenticated(Some(&ctx));
    };

    let mut query = state.resolver.effective_query(&scope).await;
    let mut verdict = state.validator.validate(&user, &query).await;

    if !verdict.valid {
        warn!(
            request_id = %ctx.request_id,
            scope = %scope,
            "Configured query invalid, trying generated default"
        );
        query = default_query(&scope);
        verdict = state.validator.validate(&user, &query).await;
    }

    if !verdict.valid {
        error!(
            request_id = %ctx.request_id,
            scope = %scope,
            detail = %verdict.detail(),
            "Both configured and default queries invalid"
        );
        return error_body(
            StatusCode::BAD_REQUEST,
            ErrorEnvelope::diagnostic(
                format!("Invalid query: {}", verdict.detail()),
                &ctx,
                "InvalidQuery",
            ),
        );
    }

    match state.engine.search(&user, &query, RECENT_RESULT_LIMIT).await {
        Ok(issues) => {
            record_search();
            let data: Vec<ServiceDeskRequest> = issues
                .into_iter()
                .filter_map(|issue| {
                    let issue_key = issue.key.clone();
                    match ServiceDeskRequest::try_from(issue) {
                        Ok(request) => Some(request),
                        Err(e) => {
                            warn!(
                                request_id = %ctx.request_id,
                                issue = %issue_key,
                                error = %e,
                                "Skipping unmappable issue"
                            );
                            None
                        }
                    }
                })
                .collect();

            let diagnostics = Diagnostics::build(&ctx, &user.key, &query, data.len());
            (StatusCode::OK, Json(RecentResponse { data, diagnostics })).into_response()
        }
        Err(e) => {
            error!(request_id = %ctx.request_id, error = %e, "Search execution failed");
            error_body(
                StatusCode::INTERNAL_SERVER_ERROR,
                ErrorEnvelope::diagnostic(
                    format!("Failed to fetch portal requests: {e}"),
                    &ctx,
                    "Unexpected",
                ),
            )
        }
    }
}

/// Current settings for the resolved scope, including the default query the
/// scope would fall back to.
async fn get_settings(
    State(state): State<AppState>,
    AxumQuery(params): AxumQuery<ScopeParams>,
) -> Response {
    let scope = ScopeKey::from_param(params.project_key.as_deref());

    if state.auth.current_user().await.is_none() {
        return unauthenticated(None);
    }

    let config = state.resolver.resolve(&scope).await;
    let fallback = default_query(&scope);

    let response = SettingsResponse {
        project_key: scope.to_string(),
        jql: config.query.clone().unwrap_or_else(|| fallback.clone()),
        use_custom_jql: config.use_custom_query,
        buttons: config.buttons.iter().map(ButtonEntry::from).collect(),
        linked_spaces: config.linked_spaces.iter().cloned().collect(),
        default_jql: fallback,
    };

    (StatusCode::OK, Json(response)).into_response()
}

/// Persist a partial settings update for a scope.
async fn save_settings(
    State(state): State<AppState>,
    payload: Result<Json<SaveSettingsRequest>, JsonRejection>,
) -> Response {
    let ctx = RequestContext::new("save_settings");

    let Some(user) = state.auth.current_user().await else {
        return unauthenticated(None);
    };

    let Json(body) = match payload {
        Ok(json) => json,
        Err(rejection) => {
            return error_body(
                StatusCode::BAD_REQUEST,
                ErrorEnvelope::diagnostic(
                    format!("Invalid JSON format: {rejection}"),
                    &ctx,
                    "InvalidInput",
                ),
            );
        }
    };

    let scope = ScopeKey::from_param(body.project_key.as_deref());

    let buttons = match body.buttons {
        Some(entries) => match typed_buttons(&entries) {
            Ok(slots) => Some(slots),
            Err(e) => return settings_error_response(e, &ctx),
        },
        None => None,
    };

    let patch = PortalConfigPatch {
        query: body.jql,
        use_custom_query: body.use_custom_jql,
        buttons,
        linked_spaces: body
            .linked_spaces
            .map(|spaces| spaces.into_iter().collect::<BTreeSet<_>>()),
    };

    match state.resolver.save(&user, &scope, patch).await {
        Ok(()) => {
            info!(request_id = %ctx.request_id, scope = %scope, "Settings saved");
            (
                StatusCode::OK,
                Json(SaveResponse {
                    success: true,
                    message: "Settings saved successfully".to_string(),
                    project_key: scope.to_string(),
                }),
            )
                .into_response()
        }
        Err(e) => settings_error_response(e, &ctx),
    }
}

/// Persist only the button slots for a scope.
async fn save_buttons(
    State(state): State<AppState>,
    payload: Result<Json<SaveButtonsRequest>, JsonRejection>,
) -> Response {
    let ctx = RequestContext::new("save_buttons");

    let Some(user) = state.auth.current_user().await else {
        return unauthenticated(None);
    };

    let Json(body) = match payload {
        Ok(json) => json,
        Err(rejection) => {
            return error_body(
                StatusCode::BAD_REQUEST,
                ErrorEnvelope::diagnostic(
                    format!("Invalid JSON format: {rejection}"),
                    &ctx,
                    "InvalidInput",
                ),
            );
        }
    };

    let scope = ScopeKey::from_param(body.project_key.as_deref());

    let slots = match typed_buttons(&body.buttons) {
        Ok(slots) => slots,
        Err(e) => return settings_error_response(e, &ctx),
    };

    let patch = PortalConfigPatch {
        buttons: Some(slots),
        ..Default::default()
    };

    match state.resolver.save(&user, &scope, patch).await {
        Ok(()) => (
            StatusCode::OK,
            Json(SaveResponse {
                success: true,
                message: "Buttons saved successfully".to_string(),
                project_key: scope.to_string(),
            }),
        )
            .into_response(),
        Err(e) => settings_error_response(e, &ctx),
    }
}

fn typed_buttons(entries: &[ButtonEntry]) -> Result<Vec<ButtonSlot>, SettingsError> {
    let pairs: Vec<(&str, &str)> = entries
        .iter()
        .map(|entry| {
            (
                entry.label.as_deref().unwrap_or(""),
                entry.url.as_deref().unwrap_or(""),
            )
        })
        .collect();
    validated_buttons(&pairs)
}

/// Parse-only validation. Always answers 200; validity lives in the body.
async fn validate_jql(
    State(state): State<AppState>,
    payload: Result<Json<ValidateJqlRequest>, JsonRejection>,
) -> Response {
    let Some(user) = state.auth.current_user().await else {
        return unauthenticated(None);
    };

    let candidate = match payload {
        Ok(Json(body)) => body.jql.unwrap_or_default(),
        Err(_) => String::new(),
    };

    let verdict = state.validator.validate(&user, &candidate).await;
    let body = if verdict.valid {
        serde_json::json!({"valid": true, "message": "Query is valid"})
    } else {
        serde_json::json!({"valid": false, "errors": verdict.errors})
    };

    (StatusCode::OK, Json(body)).into_response()
}

/// Catalog of linkable Confluence spaces. Placeholder collaborator data
/// until the space directory integration lands.
async fn confluence_spaces(State(state): State<AppState>) -> Response {
    if state.auth.current_user().await.is_none() {
        return unauthenticated(None);
    }

    let catalog = vec![
        SpaceOption {
            value: "DOCS".to_string(),
            label: "Documentation".to_string(),
        },
        SpaceOption {
            value: "KB".to_string(),
            label: "Knowledge Base".to_string(),
        },
        SpaceOption {
            value: "ITOPS".to_string(),
            label: "IT Operations".to_string(),
        },
        SpaceOption {
            value: "HR".to_string(),
            label: "People Team".to_string(),
        },
    ];

    (StatusCode::OK, Json(catalog)).into_response()
}

/// Admin settings page, rendered through the host template port. Requires
/// a concrete project scope and project-admin rights.
async fn settings_page(
    State(state): State<AppState>,
    AxumQuery(params): AxumQuery<ScopeParams>,
) -> Response {
    let ctx = RequestContext::new("settings_page");

    let Some(user) = state.auth.current_user().await else {
        return unauthenticated(None);
    };

    let Some(project_key) = params
        .project_key
        .as_deref()
        .map(str::trim)
        .filter(|key| !key.is_empty())
    else {
        return error_body(
            StatusCode::BAD_REQUEST,
            ErrorEnvelope::message("Project key is required"),
        );
    };
    let scope = ScopeKey::new(project_key);

    match state.auth.is_project_admin(&user, &scope).await {
        Ok(true) => {}
        Ok(false) => {
            return error_body(
                StatusCode::FORBIDDEN,
                ErrorEnvelope::message(
                    "Access denied. Project administrator privileges required.",
                ),
            );
        }
        Err(e) => {
            error!(request_id = %ctx.request_id, error = %e, "Permission check failed");
            return error_body(
                StatusCode::INTERNAL_SERVER_ERROR,
                ErrorEnvelope::diagnostic("Failed to check permissions", &ctx, "Unexpected"),
            );
        }
    }

    let config = state.resolver.resolve(&scope).await;
    let context = serde_json::json!({
        "user": user.display_name,
        "projectKey": scope.as_str(),
        "useCustomJql": config.use_custom_query,
        "defaultJql": default_query(&scope),
    });

    match state.renderer.render("settings-page", &context) {
        Ok(html) => Html(html).into_response(),
        Err(e) => {
            error!(request_id = %ctx.request_id, error = %e, "Template rendering failed");
            error_body(
                StatusCode::INTERNAL_SERVER_ERROR,
                ErrorEnvelope::diagnostic("Failed to render settings page", &ctx, "Unexpected"),
            )
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog_engine::CatalogQueryEngine;
    use crate::contracts::{AuthenticatedUser, ParseOutcome};
    use crate::local_host::{PlainRenderer, StaticAuthenticator};
    use crate::memory_kv::MemoryKVStore;
    use crate::settings::PortalConfig;
    use async_trait::async_trait;
    use axum::body::Body;
    use axum::http::Request;
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use tower::util::ServiceExt;

    /// Engine that rejects any query containing a marker string. Search
    /// returns nothing.
    struct MarkerRejectingEngine {
        marker: &'static str,
    }

    #[async_trait]
    impl QueryEngine for MarkerRejectingEngine {
        async fn parse(&self, _user: &AuthenticatedUser, query: &str) -> Result<ParseOutcome> {
            if query.contains(self.marker) {
                Ok(ParseOutcome::invalid(vec![format!(
                    "Unknown token: {}",
                    self.marker
                )]))
            } else {
                Ok(ParseOutcome::valid())
            }
        }

        async fn search(
            &self,
            _user: &AuthenticatedUser,
            _query: &str,
            _limit: usize,
        ) -> Result<Vec<IssueRecord>> {
            Ok(Vec::new())
        }
    }

    /// Engine that rejects every query.
    struct RejectAllEngine;

    #[async_trait]
    impl QueryEngine for RejectAllEngine {
        async fn parse(&self, _user: &AuthenticatedUser, _query: &str) -> Result<ParseOutcome> {
            Ok(ParseOutcome::invalid(vec!["Nothing parses".to_string()]))
        }

        async fn search(
            &self,
            _user: &AuthenticatedUser,
            _query: &str,
            _limit: usize,
        ) -> Result<Vec<IssueRecord>> {
            Ok(Vec::new())
        }
    }

    fn admin_user() -> AuthenticatedUser {
        AuthenticatedUser::new("admin", "Portal Admin")
    }

    fn signed_in_app(engine: Arc<dyn QueryEngine>) -> (Router, Arc<MemoryKVStore>) {
        let kv = Arc::new(MemoryKVStore::new());
        let app = create_server(
            Arc::new(StaticAuthenticator::signed_in(admin_user(), true)),
            engine,
            kv.clone(),
            Arc::new(PlainRenderer),
        );
        (app, kv)
    }

    fn anonymous_app() -> Router {
        create_server(
            Arc::new(StaticAuthenticator::anonymous()),
            Arc::new(CatalogQueryEngine::with_demo_data()),
            Arc::new(MemoryKVStore::new()),
            Arc::new(PlainRenderer),
        )
    }

    async fn json_body(response: Response) -> serde_json::Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("read body");
        serde_json::from_slice(&bytes).expect("valid JSON body")
    }

    fn get(uri: &str) -> Request<Body> {
        Request::builder()
            .uri(uri)
            .body(Body::empty())
            .expect("request")
    }

    fn post_json(uri: &str, body: serde_json::Value) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .expect("request")
    }

    #[tokio::test]
    async fn test_health_check() -> Result<()> {
        let (app, _kv) = signed_in_app(Arc::new(CatalogQueryEngine::with_demo_data()));
        let response = app.oneshot(get("/health")).await?;
        assert_eq!(response.status(), StatusCode::OK);
        Ok(())
    }

    #[tokio::test]
    async fn recent_requires_authentication() -> Result<()> {
        let response = anonymous_app().oneshot(get("/recent")).await?;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        let body = json_body(response).await;
        assert_eq!(body["error"], "Authentication required");
        assert!(body["requestId"].is_string());
        Ok(())
    }

    #[tokio::test]
    async fn recent_returns_bounded_mapped_data_with_diagnostics() -> Result<()> {
        let (app, _kv) = signed_in_app(Arc::new(CatalogQueryEngine::with_demo_data()));
        let response = app.oneshot(get("/recent?projectKey=DESK")).await?;
        assert_eq!(response.status(), StatusCode::OK);

        let body = json_body(response).await;
        let data = body["data"].as_array().expect("data array");
        assert!(data.len() <= RECENT_RESULT_LIMIT);
        assert!(data.iter().all(|row| row["key"]
            .as_str()
            .is_some_and(|key| key.starts_with("DESK-"))));

        let diagnostics = &body["diagnostics"];
        assert_eq!(diagnostics["resultCount"].as_u64().unwrap() as usize, data.len());
        assert_eq!(diagnostics["user"], "admin");
        assert_eq!(diagnostics["jql"], "project = DESK ORDER BY created DESC");
        assert!(diagnostics["requestId"].is_string());
        assert!(diagnostics["duration"].is_u64());
        assert!(diagnostics["timestamp"].is_string());
        Ok(())
    }

    #[tokio::test]
    async fn recent_maps_missing_issue_fields_to_fallbacks() -> Result<()> {
        let engine = CatalogQueryEngine::with_issues(vec![IssueRecord {
            key: "DESK-9".to_string(),
            summary: "Bare issue".to_string(),
            reporter: None,
            created: None,
            status: None,
            status_category: None,
        }]);
        let (app, _kv) = signed_in_app(Arc::new(engine));

        let response = app.oneshot(get("/recent?projectKey=DESK")).await?;
        let body = json_body(response).await;
        let row = &body["data"][0];
        assert_eq!(row["reporter"], "Unknown");
        assert_eq!(row["created"], "");
        assert_eq!(row["status"], "Unknown");
        assert_eq!(row["statusCategory"], "unknown");
        Ok(())
    }

    #[tokio::test]
    async fn recent_skips_unmappable_issues_without_failing() -> Result<()> {
        let engine = CatalogQueryEngine::with_issues(vec![
            IssueRecord {
                key: "DESK-1".to_string(),
                summary: "Good".to_string(),
                reporter: None,
                created: None,
                status: None,
                status_category: None,
            },
            IssueRecord {
                key: "   ".to_string(),
                summary: "No key".to_string(),
                reporter: None,
                created: None,
                status: None,
                status_category: None,
            },
        ]);
        let (app, _kv) = signed_in_app(Arc::new(engine));

        let response = app.oneshot(get("/recent?projectKey=DESK")).await?;
        assert_eq!(response.status(), StatusCode::OK);
        let body = json_body(response).await;
        assert_eq!(body["data"].as_array().unwrap().len(), 1);
        assert_eq!(body["diagnostics"]["resultCount"], 1);
        Ok(())
    }

    #[tokio::test]
    async fn recent_falls_back_to_default_when_stored_query_is_invalid() -> Result<()> {
        let (app, kv) = signed_in_app(Arc::new(MarkerRejectingEngine { marker: "BROKEN" }));

        // Seed a stored record directly; the save path would refuse it
        let config = PortalConfig {
            query: Some("BROKEN = yes".to_string()),
            use_custom_query: true,
            ..Default::default()
        };
        kv.put(
            "portal.settings.DESK",
            &serde_json::to_string(&config).unwrap(),
        )
        .await?;

        let response = app.oneshot(get("/recent?projectKey=DESK")).await?;
        assert_eq!(response.status(), StatusCode::OK);
        let body = json_body(response).await;
        assert_eq!(
            body["diagnostics"]["jql"],
            "project = DESK ORDER BY created DESC"
        );
        Ok(())
    }

    #[tokio::test]
    async fn recent_rejects_with_400_when_default_is_invalid_too() -> Result<()> {
        let (app, _kv) = signed_in_app(Arc::new(RejectAllEngine));
        let response = app.oneshot(get("/recent?projectKey=DESK")).await?;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let body = json_body(response).await;
        let message = body["error"].as_str().unwrap();
        assert!(message.starts_with("Invalid query"));
        assert!(message.contains("Nothing parses"), "parser detail is forwarded");
        assert_eq!(body["errorType"], "InvalidQuery");
        Ok(())
    }

    #[tokio::test]
    async fn saved_custom_query_drives_the_recent_search() -> Result<()> {
        let (app, _kv) = signed_in_app(Arc::new(CatalogQueryEngine::with_demo_data()));

        let save = app
            .clone()
            .oneshot(post_json(
                "/settings",
                json!({
                    "projectKey": "HELP",
                    "jql": "project = HELP ORDER BY created DESC",
                    "useCustomJql": true
                }),
            ))
            .await?;
        assert_eq!(save.status(), StatusCode::OK);

        let response = app.oneshot(get("/recent?projectKey=HELP")).await?;
        assert_eq!(response.status(), StatusCode::OK);
        let body = json_body(response).await;
        assert_eq!(
            body["diagnostics"]["jql"],
            "project = HELP ORDER BY created DESC"
        );
        let data = body["data"].as_array().unwrap();
        assert_eq!(body["diagnostics"]["resultCount"].as_u64().unwrap() as usize, data.len());
        assert!(data.len() <= RECENT_RESULT_LIMIT);
        Ok(())
    }

    #[tokio::test]
    async fn get_settings_returns_defaults_for_unconfigured_scope() -> Result<()> {
        let (app, _kv) = signed_in_app(Arc::new(CatalogQueryEngine::with_demo_data()));
        let response = app.oneshot(get("/settings?projectKey=HELP")).await?;
        assert_eq!(response.status(), StatusCode::OK);

        let body = json_body(response).await;
        assert_eq!(body["projectKey"], "HELP");
        assert_eq!(body["useCustomJql"], false);
        assert_eq!(body["jql"], "project = HELP ORDER BY created DESC");
        assert_eq!(body["defaultJql"], "project = HELP ORDER BY created DESC");
        assert_eq!(body["buttons"].as_array().unwrap().len(), 0);
        Ok(())
    }

    #[tokio::test]
    async fn blank_project_key_resolves_to_global_scope() -> Result<()> {
        let (app, _kv) = signed_in_app(Arc::new(CatalogQueryEngine::with_demo_data()));
        let response = app.oneshot(get("/settings")).await?;
        let body = json_body(response).await;
        assert_eq!(body["projectKey"], "global");
        assert_eq!(body["defaultJql"], "project = DESK ORDER BY created DESC");
        Ok(())
    }

    #[tokio::test]
    async fn partial_save_leaves_omitted_fields_untouched() -> Result<()> {
        let (app, _kv) = signed_in_app(Arc::new(CatalogQueryEngine::with_demo_data()));

        let first = app
            .clone()
            .oneshot(post_json(
                "/settings",
                json!({
                    "projectKey": "HELP",
                    "jql": "project = HELP",
                    "useCustomJql": true
                }),
            ))
            .await?;
        assert_eq!(first.status(), StatusCode::OK);

        // Patch only the linked spaces
        let second = app
            .clone()
            .oneshot(post_json(
                "/settings",
                json!({"projectKey": "HELP", "linkedSpaces": ["DOCS", "KB"]}),
            ))
            .await?;
        assert_eq!(second.status(), StatusCode::OK);

        let body = json_body(app.oneshot(get("/settings?projectKey=HELP")).await?).await;
        assert_eq!(body["jql"], "project = HELP");
        assert_eq!(body["useCustomJql"], true);
        assert_eq!(body["linkedSpaces"], json!(["DOCS", "KB"]));
        Ok(())
    }

    #[tokio::test]
    async fn save_rejects_invalid_query_with_400() -> Result<()> {
        let (app, kv) = signed_in_app(Arc::new(MarkerRejectingEngine { marker: "BROKEN" }));

        let response = app
            .oneshot(post_json(
                "/settings",
                json!({
                    "projectKey": "HELP",
                    "jql": "BROKEN = yes",
                    "useCustomJql": true
                }),
            ))
            .await?;

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = json_body(response).await;
        assert_eq!(body["errorType"], "InvalidQuery");
        assert!(body["error"].as_str().unwrap().contains("Unknown token"));
        assert!(kv.is_empty(), "rejected save must write nothing");
        Ok(())
    }

    #[tokio::test]
    async fn malformed_button_entry_rejects_the_whole_save() -> Result<()> {
        let (app, kv) = signed_in_app(Arc::new(CatalogQueryEngine::with_demo_data()));

        let response = app
            .oneshot(post_json(
                "/settings",
                json!({
                    "projectKey": "HELP",
                    "buttons": [
                        {"label": "Raise ticket", "url": "https://desk.example/new"},
                        {"label": "x"}
                    ]
                }),
            ))
            .await?;

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = json_body(response).await;
        assert_eq!(body["errorType"], "InvalidButtonEntry");
        assert_eq!(kv.keys().len(), 0, "zero store keys changed");
        Ok(())
    }

    #[tokio::test]
    async fn buttons_endpoint_saves_up_to_five_slots() -> Result<()> {
        let (app, _kv) = signed_in_app(Arc::new(CatalogQueryEngine::with_demo_data()));

        let response = app
            .clone()
            .oneshot(post_json(
                "/settings/buttons",
                json!({
                    "projectKey": "HELP",
                    "buttons": [
                        {"label": "Raise ticket", "url": "https://desk.example/new"},
                        {"label": "", "url": ""},
                        {"label": "Status", "url": "https://status.example"}
                    ]
                }),
            ))
            .await?;
        assert_eq!(response.status(), StatusCode::OK);
        let body = json_body(response).await;
        assert_eq!(body["success"], true);
        assert_eq!(body["projectKey"], "HELP");

        let settings = json_body(app.oneshot(get("/settings?projectKey=HELP")).await?).await;
        let buttons = settings["buttons"].as_array().unwrap();
        assert_eq!(buttons.len(), 3);
        assert_eq!(buttons[0]["label"], "Raise ticket");
        assert_eq!(buttons[1]["label"], "");
        Ok(())
    }

    #[tokio::test]
    async fn buttons_endpoint_rejects_six_slots() -> Result<()> {
        let (app, _kv) = signed_in_app(Arc::new(CatalogQueryEngine::with_demo_data()));
        let entries: Vec<_> = (0..6)
            .map(|i| json!({"label": format!("b{i}"), "url": "https://x"}))
            .collect();

        let response = app
            .oneshot(post_json(
                "/settings/buttons",
                json!({"projectKey": "HELP", "buttons": entries}),
            ))
            .await?;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        Ok(())
    }

    #[tokio::test]
    async fn malformed_json_is_a_400_not_a_500() -> Result<()> {
        let (app, _kv) = signed_in_app(Arc::new(CatalogQueryEngine::with_demo_data()));
        let request = Request::builder()
            .method("POST")
            .uri("/settings")
            .header("content-type", "application/json")
            .body(Body::from("{not json"))?;

        let response = app.oneshot(request).await?;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = json_body(response).await;
        assert_eq!(body["errorType"], "InvalidInput");
        Ok(())
    }

    #[tokio::test]
    async fn validate_jql_always_answers_200() -> Result<()> {
        let (app, _kv) = signed_in_app(Arc::new(MarkerRejectingEngine { marker: "BROKEN" }));

        let ok = app
            .clone()
            .oneshot(post_json("/settings/validate-jql", json!({"jql": "project = X"})))
            .await?;
        assert_eq!(ok.status(), StatusCode::OK);
        let body = json_body(ok).await;
        assert_eq!(body["valid"], true);
        assert_eq!(body["message"], "Query is valid");

        let bad = app
            .clone()
            .oneshot(post_json("/settings/validate-jql", json!({"jql": "BROKEN"})))
            .await?;
        assert_eq!(bad.status(), StatusCode::OK);
        let body = json_body(bad).await;
        assert_eq!(body["valid"], false);
        assert!(body["errors"].as_array().is_some());

        let blank = app
            .oneshot(post_json("/settings/validate-jql", json!({"jql": ""})))
            .await?;
        assert_eq!(blank.status(), StatusCode::OK);
        let body = json_body(blank).await;
        assert_eq!(body["valid"], false);
        Ok(())
    }

    #[tokio::test]
    async fn confluence_spaces_lists_the_static_catalog() -> Result<()> {
        let (app, _kv) = signed_in_app(Arc::new(CatalogQueryEngine::with_demo_data()));
        let response = app.oneshot(get("/settings/confluence-spaces")).await?;
        assert_eq!(response.status(), StatusCode::OK);

        let body = json_body(response).await;
        let catalog = body.as_array().expect("catalog array");
        assert!(!catalog.is_empty());
        assert!(catalog
            .iter()
            .all(|space| space["value"].is_string() && space["label"].is_string()));
        Ok(())
    }

    #[tokio::test]
    async fn settings_page_renders_for_project_admins() -> Result<()> {
        let (app, _kv) = signed_in_app(Arc::new(CatalogQueryEngine::with_demo_data()));
        let response = app.oneshot(get("/settings/page?projectKey=HELP")).await?;
        assert_eq!(response.status(), StatusCode::OK);

        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await?;
        let html = String::from_utf8(bytes.to_vec())?;
        assert!(html.contains("HELP"));
        assert!(html.contains("settings-page"));
        Ok(())
    }

    #[tokio::test]
    async fn settings_page_requires_admin_rights() -> Result<()> {
        let kv = Arc::new(MemoryKVStore::new());
        let app = create_server(
            Arc::new(StaticAuthenticator::signed_in(admin_user(), false)),
            Arc::new(CatalogQueryEngine::with_demo_data()),
            kv,
            Arc::new(PlainRenderer),
        );

        let response = app.oneshot(get("/settings/page?projectKey=HELP")).await?;
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
        Ok(())
    }

    #[tokio::test]
    async fn settings_page_requires_a_project_key() -> Result<()> {
        let (app, _kv) = signed_in_app(Arc::new(CatalogQueryEngine::with_demo_data()));
        let response = app.oneshot(get("/settings/page")).await?;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        Ok(())
    }

    #[tokio::test]
    async fn settings_endpoints_require_authentication() -> Result<()> {
        let app = anonymous_app();
        for request in [
            get("/settings"),
            get("/settings/confluence-spaces"),
            post_json("/settings", json!({"projectKey": "X"})),
            post_json("/settings/buttons", json!({"buttons": []})),
            post_json("/settings/validate-jql", json!({"jql": "project = X"})),
        ] {
            let response = app.clone().oneshot(request).await?;
            assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        }
        Ok(())
    }
}
