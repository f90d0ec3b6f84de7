// Local Host Capabilities
// Fixed-identity authentication and a minimal renderer for standalone runs.
// Real deployments replace these with adapters over the host platform.

use anyhow::Result;
use async_trait::async_trait;

use crate::contracts::{AuthenticatedUser, Authenticator, Renderer};
use crate::types::ScopeKey;

/// Authenticator that always reports the same signed-in user, optionally
/// with admin rights everywhere. Anonymous mode reports no user at all.
pub struct StaticAuthenticator {
    user: Option<AuthenticatedUser>,
    admin: bool,
}

impl StaticAuthenticator {
    pub fn signed_in(user: AuthenticatedUser, admin: bool) -> Self {
        Self {
            user: Some(user),
            admin,
        }
    }

    pub fn anonymous() -> Self {
        Self {
            user: None,
            admin: false,
        }
    }
}

#[async_trait]
impl Authenticator for StaticAuthenticator {
    async fn current_user(&self) -> Option<AuthenticatedUser> {
        self.user.clone()
    }

    async fn is_project_admin(
        &self,
        _user: &AuthenticatedUser,
        _scope: &ScopeKey,
    ) -> Result<bool> {
        Ok(self.admin)
    }
}

/// Renderer producing a bare HTML shell with the context inlined as JSON.
/// Stands in for the host's template engine, whose internals are not ours.
pub struct PlainRenderer;

impl Renderer for PlainRenderer {
    fn render(&self, template: &str, context: &serde_json::Value) -> Result<String> {
        let payload = serde_json::to_string(context)?;
        Ok(format!(
            "<!DOCTYPE html>\n<html><head><title>{template}</title></head>\
             <body><div id=\"{template}\" data-context='{payload}'></div></body></html>"
        ))
    }
}
