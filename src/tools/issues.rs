//! Issue retrieval tools: by status, label, priority, JQL, or key.

use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;
use serde_json::json;

use super::{IssueLimits, ParamSpec, Tool, ToolArgs, TypeHint, PRIORITIES};
use crate::jira::{jql_quote, Issue, IssueTracker};

/// Upper bound on `max_results` regardless of configuration.
const HARD_LIMIT: u32 = 500;

fn max_results_param() -> ParamSpec {
    ParamSpec::optional(
        "max_results",
        TypeHint::Integer,
        "Maximum number of issues to return",
    )
}

/// Compact row used in issue listings.
#[derive(Serialize)]
struct IssueRow<'a> {
    key: &'a str,
    summary: &'a str,
    status: &'a str,
    assignee: &'a str,
    priority: &'a str,
    issue_type: &'a str,
    created: &'a str,
}

impl<'a> From<&'a Issue> for IssueRow<'a> {
    fn from(issue: &'a Issue) -> Self {
        Self {
            key: &issue.key,
            summary: &issue.summary,
            status: &issue.status,
            assignee: &issue.assignee,
            priority: &issue.priority,
            issue_type: &issue.issue_type,
            created: &issue.created,
        }
    }
}

/// Render an issue list with a filter description, or a "no issues" sentence.
fn render_listing(
    filter_key: &str,
    filter_value: Option<&str>,
    issues: &[Issue],
    empty_message: String,
) -> anyhow::Result<String> {
    if issues.is_empty() {
        return Ok(empty_message);
    }
    let rows: Vec<IssueRow<'_>> = issues.iter().map(IssueRow::from).collect();
    let mut body = json!({
        "total_issues": rows.len(),
        "issues": rows,
    });
    if let Some(value) = filter_value {
        body[filter_key] = json!(value);
    }
    Ok(serde_json::to_string_pretty(&body)?)
}

/// Issues in a given workflow status.
pub struct GetIssuesByStatus {
    tracker: Arc<dyn IssueTracker>,
    limits: IssueLimits,
}

impl GetIssuesByStatus {
    pub fn new(tracker: Arc<dyn IssueTracker>, limits: IssueLimits) -> Self {
        Self { tracker, limits }
    }
}

#[async_trait]
impl Tool for GetIssuesByStatus {
    fn name(&self) -> &str {
        "get_issues_by_status"
    }

    fn description(&self) -> &str {
        "Retrieve Jira issues filtered by status (e.g. 'To Do', 'In Progress', 'Done'), newest first."
    }

    fn parameters(&self) -> Vec<ParamSpec> {
        vec![
            ParamSpec::required("status", TypeHint::String, "Status name to filter by"),
            max_results_param(),
        ]
    }

    async fn execute(&self, args: &ToolArgs) -> anyhow::Result<String> {
        let status = args.require("status")?;
        let limit = args.limit("max_results", self.limits.default, HARD_LIMIT)?;
        let jql = format!("status = {} ORDER BY created DESC", jql_quote(status));
        let issues = self.tracker.search(&jql, limit).await?;
        render_listing(
            "status_filter",
            Some(status),
            &issues,
            format!("No issues found with status: {}", status),
        )
    }
}

/// Every accessible issue, newest first.
pub struct GetAllIssues {
    tracker: Arc<dyn IssueTracker>,
    limits: IssueLimits,
}

impl GetAllIssues {
    pub fn new(tracker: Arc<dyn IssueTracker>, limits: IssueLimits) -> Self {
        Self { tracker, limits }
    }
}

#[async_trait]
impl Tool for GetAllIssues {
    fn name(&self) -> &str {
        "get_all_issues"
    }

    fn description(&self) -> &str {
        "Retrieve all accessible Jira issues without any filter, newest first."
    }

    fn parameters(&self) -> Vec<ParamSpec> {
        vec![max_results_param()]
    }

    async fn execute(&self, args: &ToolArgs) -> anyhow::Result<String> {
        let limit = args.limit("max_results", self.limits.default, HARD_LIMIT)?;
        let issues = self.tracker.search("ORDER BY created DESC", limit).await?;
        render_listing("", None, &issues, "No issues found.".to_string())
    }
}

/// Free-form JQL search.
pub struct SearchIssuesByJql {
    tracker: Arc<dyn IssueTracker>,
    limits: IssueLimits,
}

impl SearchIssuesByJql {
    pub fn new(tracker: Arc<dyn IssueTracker>, limits: IssueLimits) -> Self {
        Self { tracker, limits }
    }
}

#[async_trait]
impl Tool for SearchIssuesByJql {
    fn name(&self) -> &str {
        "search_issues_by_jql"
    }

    fn description(&self) -> &str {
        "Search Jira issues with a JQL (Jira Query Language) query, e.g. assignee, text or date conditions."
    }

    fn parameters(&self) -> Vec<ParamSpec> {
        vec![
            ParamSpec::required("jql_query", TypeHint::String, "JQL query string"),
            max_results_param(),
        ]
    }

    async fn execute(&self, args: &ToolArgs) -> anyhow::Result<String> {
        let jql = args.require("jql_query")?;
        let limit = args.limit("max_results", self.limits.search, HARD_LIMIT)?;
        let issues = self.tracker.search(jql, limit).await?;
        render_listing(
            "jql_query",
            Some(jql),
            &issues,
            format!("No issues found for JQL query: {}", jql),
        )
    }
}

/// Issues carrying a specific label.
pub struct GetIssuesByLabel {
    tracker: Arc<dyn IssueTracker>,
    limits: IssueLimits,
}

impl GetIssuesByLabel {
    pub fn new(tracker: Arc<dyn IssueTracker>, limits: IssueLimits) -> Self {
        Self { tracker, limits }
    }
}

#[async_trait]
impl Tool for GetIssuesByLabel {
    fn name(&self) -> &str {
        "get_issues_by_label"
    }

    fn description(&self) -> &str {
        "Retrieve Jira issues that carry an exact label name (e.g. 'frontend', 'bug', '2025')."
    }

    fn parameters(&self) -> Vec<ParamSpec> {
        vec![
            ParamSpec::required("label", TypeHint::String, "Label to filter by"),
            max_results_param(),
        ]
    }

    async fn execute(&self, args: &ToolArgs) -> anyhow::Result<String> {
        let label = args.require("label")?;
        let limit = args.limit("max_results", self.limits.search, HARD_LIMIT)?;
        let jql = format!("labels = {} ORDER BY created DESC", jql_quote(label));
        let issues = self.tracker.search(&jql, limit).await?;
        render_listing(
            "label_filter",
            Some(label),
            &issues,
            format!("No issues found with label: {}", label),
        )
    }
}

/// Issues at a given priority.
pub struct GetIssuesByPriority {
    tracker: Arc<dyn IssueTracker>,
    limits: IssueLimits,
}

impl GetIssuesByPriority {
    pub fn new(tracker: Arc<dyn IssueTracker>, limits: IssueLimits) -> Self {
        Self { tracker, limits }
    }
}

#[async_trait]
impl Tool for GetIssuesByPriority {
    fn name(&self) -> &str {
        "get_issues_by_priority"
    }

    fn description(&self) -> &str {
        "Retrieve Jira issues filtered by priority/severity."
    }

    fn parameters(&self) -> Vec<ParamSpec> {
        vec![
            ParamSpec::required("priority", TypeHint::one_of(&PRIORITIES), "Priority name"),
            max_results_param(),
        ]
    }

    async fn execute(&self, args: &ToolArgs) -> anyhow::Result<String> {
        let priority = args.require("priority")?;
        let limit = args.limit("max_results", self.limits.search, HARD_LIMIT)?;
        let jql = format!("priority = {} ORDER BY created DESC", jql_quote(priority));
        let issues = self.tracker.search(&jql, limit).await?;
        render_listing(
            "priority_filter",
            Some(priority),
            &issues,
            format!("No issues found with priority: {}", priority),
        )
    }
}

/// Full details and comments for one issue.
pub struct GetIssueDetails {
    tracker: Arc<dyn IssueTracker>,
}

impl GetIssueDetails {
    pub fn new(tracker: Arc<dyn IssueTracker>) -> Self {
        Self { tracker }
    }
}

#[async_trait]
impl Tool for GetIssueDetails {
    fn name(&self) -> &str {
        "get_issue_details"
    }

    fn description(&self) -> &str {
        "Get detailed information, including comments, about one Jira issue by key."
    }

    fn parameters(&self) -> Vec<ParamSpec> {
        vec![ParamSpec::required(
            "issue_key",
            TypeHint::String,
            "Issue key such as 'PROJ-123'",
        )]
    }

    async fn execute(&self, args: &ToolArgs) -> anyhow::Result<String> {
        let key = args.require("issue_key")?.trim().to_uppercase();
        let details = self.tracker.issue(&key).await?;
        Ok(serde_json::to_string_pretty(&details)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::testing::{issue, FakeTracker};
    use std::collections::BTreeMap;

    const LIMITS: IssueLimits = IssueLimits {
        default: 100,
        analysis: 200,
        search: 50,
    };

    fn args(pairs: &[(&str, &str)]) -> ToolArgs {
        ToolArgs::new(
            pairs
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect::<BTreeMap<_, _>>(),
        )
    }

    #[tokio::test]
    async fn status_query_is_quoted_and_limited() {
        let tracker = Arc::new(FakeTracker::with_issues(vec![issue(
            "OPS-1", "To Do", "High", "Ana", "2024-05-01",
        )]));
        let tool = GetIssuesByStatus::new(tracker.clone(), LIMITS);

        let out = tool
            .execute(&args(&[("status", "To Do"), ("max_results", "5")]))
            .await
            .expect("execute");

        assert_eq!(
            tracker.last_query(),
            Some(("status = \"To Do\" ORDER BY created DESC".to_string(), 5))
        );
        let body: serde_json::Value = serde_json::from_str(&out).expect("json");
        assert_eq!(body["status_filter"], "To Do");
        assert_eq!(body["total_issues"], 1);
        assert_eq!(body["issues"][0]["key"], "OPS-1");
    }

    #[tokio::test]
    async fn empty_results_read_as_sentence() {
        let tracker = Arc::new(FakeTracker::default());
        let tool = GetIssuesByLabel::new(tracker.clone(), LIMITS);
        let out = tool
            .execute(&args(&[("label", "frontend")]))
            .await
            .expect("execute");
        assert_eq!(out, "No issues found with label: frontend");
        assert_eq!(tracker.last_query().map(|(_, n)| n), Some(50));
    }

    #[tokio::test]
    async fn all_issues_uses_default_limit() {
        let tracker = Arc::new(FakeTracker::default());
        let tool = GetAllIssues::new(tracker.clone(), LIMITS);
        let out = tool.execute(&ToolArgs::default()).await.expect("execute");
        assert_eq!(out, "No issues found.");
        assert_eq!(
            tracker.last_query(),
            Some(("ORDER BY created DESC".to_string(), 100))
        );
    }

    #[tokio::test]
    async fn details_for_unknown_key_is_an_error() {
        let tool = GetIssueDetails::new(Arc::new(FakeTracker::default()));
        let err = tool
            .execute(&args(&[("issue_key", "ops-9")]))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("OPS-9"));
    }

    #[tokio::test]
    async fn details_include_comment_count() {
        let tracker = Arc::new(FakeTracker::with_issues(vec![issue(
            "OPS-2", "Done", "Low", "Ben", "2024-01-01",
        )]));
        let tool = GetIssueDetails::new(tracker);
        let out = tool
            .execute(&args(&[("issue_key", "OPS-2")]))
            .await
            .expect("execute");
        let body: serde_json::Value = serde_json::from_str(&out).expect("json");
        assert_eq!(body["key"], "OPS-2");
        assert_eq!(body["comment_count"], 0);
    }
}
