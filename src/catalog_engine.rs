// Catalog Query Engine
// Bundled QueryEngine over an in-memory issue catalog, used for standalone
// runs and tests. Parsing applies light structural checks only; this is a
// stand-in for the host engine, not a query language implementation.

use anyhow::Result;
use async_trait::async_trait;
use chrono::{Duration, Utc};
use parking_lot::RwLock;

use crate::contracts::{AuthenticatedUser, IssueRecord, ParseOutcome, QueryEngine};

const MAX_QUERY_LENGTH: usize = 1024;

/// In-memory issue catalog answering parse and search calls.
#[derive(Default)]
pub struct CatalogQueryEngine {
    issues: RwLock<Vec<IssueRecord>>,
}

impl CatalogQueryEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_issues(issues: Vec<IssueRecord>) -> Self {
        Self {
            issues: RwLock::new(issues),
        }
    }

    /// A small demo catalog so `deskportal serve` answers with data out of
    /// the box.
    pub fn with_demo_data() -> Self {
        let now = Utc::now();
        let mk = |n: u32, project: &str, summary: &str, status: &str, category: &str| IssueRecord {
            key: format!("{project}-{n}"),
            summary: summary.to_string(),
            reporter: Some("Demo Reporter".to_string()),
            created: Some(now - Duration::hours(i64::from(n))),
            status: Some(status.to_string()),
            status_category: Some(category.to_string()),
        };

        Self::with_issues(vec![
            mk(1, "DESK", "Cannot log in to the portal", "Open", "new"),
            mk(2, "DESK", "Printer out of toner", "In Progress", "indeterminate"),
            mk(3, "DESK", "Request new laptop", "Waiting for approval", "indeterminate"),
            mk(4, "DESK", "VPN drops every hour", "Open", "new"),
            mk(5, "HELP", "Password reset", "Done", "done"),
            mk(6, "HELP", "Email not syncing", "Open", "new"),
        ])
    }

    /// Structural checks on a candidate query. Anything that would choke a
    /// real parser up front (unbalanced quoting, control characters,
    /// oversized input) is reported; field semantics are not our business.
    fn check_structure(query: &str) -> ParseOutcome {
        let mut errors = Vec::new();

        if query.len() > MAX_QUERY_LENGTH {
            errors.push(format!(
                "Query exceeds maximum length of {MAX_QUERY_LENGTH} characters"
            ));
        }
        if query.chars().any(|c| c.is_control()) {
            errors.push("Query contains control characters".to_string());
        }
        if query.matches('"').count() % 2 != 0 {
            errors.push("Unbalanced double quotes".to_string());
        }
        if query.matches('\'').count() % 2 != 0 {
            errors.push("Unbalanced single quotes".to_string());
        }

        let mut depth: i64 = 0;
        for c in query.chars() {
            match c {
                '(' => depth += 1,
                ')' => depth -= 1,
                _ => {}
            }
            if depth < 0 {
                break;
            }
        }
        if depth != 0 {
            errors.push("Unbalanced parentheses".to_string());
        }

        if errors.is_empty() {
            ParseOutcome::valid()
        } else {
            ParseOutcome::invalid(errors)
        }
    }

    /// Extract the project token from a `project = <KEY>` clause, if any.
    fn project_clause(query: &str) -> Option<String> {
        let lowered = query.to_lowercase();
        let idx = lowered.find("project")?;
        let rest = query[idx + "project".len()..].trim_start();
        let rest = rest.strip_prefix('=')?.trim_start();
        let token: String = rest
            .chars()
            .take_while(|c| c.is_alphanumeric() || *c == '_' || *c == '-')
            .collect();
        if token.is_empty() {
            None
        } else {
            Some(token)
        }
    }
}

#[async_trait]
impl QueryEngine for CatalogQueryEngine {
    async fn parse(&self, _user: &AuthenticatedUser, query: &str) -> Result<ParseOutcome> {
        if query.trim().is_empty() {
            return Ok(ParseOutcome::invalid(vec!["Empty query".to_string()]));
        }
        Ok(Self::check_structure(query))
    }

    async fn search(
        &self,
        _user: &AuthenticatedUser,
        query: &str,
        limit: usize,
    ) -> Result<Vec<IssueRecord>> {
        let project = Self::project_clause(query);

        let mut matches: Vec<IssueRecord> = self
            .issues
            .read()
            .iter()
            .filter(|issue| match &project {
                Some(token) => issue
                    .key
                    .split('-')
                    .next()
                    .is_some_and(|prefix| prefix.eq_ignore_ascii_case(token)),
                None => true,
            })
            .cloned()
            .collect();

        // Newest first, the only ordering the portal's defaults ask for
        matches.sort_by(|a, b| b.created.cmp(&a.created));
        matches.truncate(limit);
        Ok(matches)
    }
}
