//! Ticketing backend.
//!
//! Tools talk to an [`IssueTracker`] rather than to Jira directly, so the
//! orchestration core and its tests never need a live instance.

mod client;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use client::JiraClient;

#[derive(Debug, Error)]
pub enum JiraError {
    #[error("Jira request failed: {0}")]
    Transport(String),

    #[error("Jira returned HTTP {status}: {message}")]
    Api { status: u16, message: String },

    #[error("Issue {0} does not exist or you do not have permission to see it")]
    IssueNotFound(String),

    #[error("Unexpected Jira response: {0}")]
    InvalidResponse(String),

    #[error("Project key is required. Set JIRA_PROJECT_KEY or pass a project key.")]
    NoProjectScope,

    #[error("{0}")]
    CreateRejected(String),
}

impl From<reqwest::Error> for JiraError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            JiraError::InvalidResponse(err.to_string())
        } else {
            JiraError::Transport(err.to_string())
        }
    }
}

/// Flattened view of an issue as returned by search.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Issue {
    pub key: String,
    pub summary: String,
    pub status: String,
    pub assignee: String,
    pub reporter: String,
    pub created: String,
    pub updated: String,
    pub priority: String,
    pub issue_type: String,
    #[serde(default)]
    pub labels: Vec<String>,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub components: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Comment {
    pub author: String,
    pub created: String,
    pub body: String,
}

/// Single issue with its comment thread.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IssueDetails {
    #[serde(flatten)]
    pub issue: Issue,
    pub comments: Vec<Comment>,
    pub comment_count: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProjectInfo {
    pub key: String,
    pub name: String,
    pub project_type: String,
    pub lead: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProjectMetadata {
    pub project_key: String,
    pub project_name: String,
    pub project_type: String,
    pub available_issue_types: Vec<String>,
    pub available_priorities: Vec<String>,
    pub lead: String,
}

/// Fields accepted when creating an issue.
#[derive(Debug, Clone, PartialEq)]
pub struct NewIssue {
    pub summary: String,
    pub description: String,
    pub issue_type: String,
    pub priority: String,
    pub assignee: Option<String>,
    pub labels: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreatedIssue {
    pub key: String,
    pub id: String,
    pub summary: String,
    pub description: String,
    pub issue_type: String,
    pub priority: String,
    pub project: String,
    pub assignee: Option<String>,
    pub labels: Vec<String>,
    pub status: String,
    pub url: String,
}

/// Read/query/create operations the Jira tools rely on.
#[async_trait]
pub trait IssueTracker: Send + Sync {
    /// Project every query is restricted to, if any.
    fn project_scope(&self) -> Option<&str>;

    /// Run a JQL query (project scope applied by the implementation).
    async fn search(&self, jql: &str, limit: u32) -> Result<Vec<Issue>, JiraError>;

    async fn issue(&self, key: &str) -> Result<IssueDetails, JiraError>;

    async fn projects(&self) -> Result<Vec<ProjectInfo>, JiraError>;

    async fn project_metadata(&self, project_key: &str) -> Result<ProjectMetadata, JiraError>;

    async fn create_issue(&self, issue: NewIssue) -> Result<CreatedIssue, JiraError>;
}

/// Restrict a JQL query to `project_key`, keeping any `ORDER BY` clause last.
pub fn scope_jql(base_jql: &str, project_key: Option<&str>) -> String {
    let Some(project) = project_key else {
        return base_jql.to_string();
    };

    let base = base_jql.trim();
    let filter = format!("project = \"{}\"", project);

    if base.is_empty() {
        return filter;
    }
    if base.starts_with("ORDER BY") {
        return format!("{} {}", filter, base);
    }
    if let Some((conditions, ordering)) = base.split_once("ORDER BY") {
        return format!(
            "{} AND ({}) ORDER BY {}",
            filter,
            conditions.trim(),
            ordering.trim()
        );
    }
    format!("{} AND ({})", filter, base)
}

/// Quote a user-supplied value for use inside a JQL string literal.
pub fn jql_quote(value: &str) -> String {
    format!("\"{}\"", value.replace('\\', "\\\\").replace('"', "\\\""))
}
