//! Project-level tools and issue creation.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::json;

use super::{ParamSpec, Tool, ToolArgs, TypeHint, PRIORITIES};
use crate::jira::{IssueTracker, NewIssue};

/// Accessible projects with their leads.
pub struct GetProjectSummary {
    tracker: Arc<dyn IssueTracker>,
}

impl GetProjectSummary {
    pub fn new(tracker: Arc<dyn IssueTracker>) -> Self {
        Self { tracker }
    }
}

#[async_trait]
impl Tool for GetProjectSummary {
    fn name(&self) -> &str {
        "get_project_summary"
    }

    fn description(&self) -> &str {
        "Get summary information about the accessible Jira projects."
    }

    fn parameters(&self) -> Vec<ParamSpec> {
        Vec::new()
    }

    async fn execute(&self, _args: &ToolArgs) -> anyhow::Result<String> {
        let projects = self.tracker.projects().await?;
        Ok(serde_json::to_string_pretty(&json!({
            "total_projects": projects.len(),
            "projects": projects,
        }))?)
    }
}

/// Issue types and priorities a project accepts.
pub struct GetProjectMetadata {
    tracker: Arc<dyn IssueTracker>,
}

impl GetProjectMetadata {
    pub fn new(tracker: Arc<dyn IssueTracker>) -> Self {
        Self { tracker }
    }
}

#[async_trait]
impl Tool for GetProjectMetadata {
    fn name(&self) -> &str {
        "get_project_metadata"
    }

    fn description(&self) -> &str {
        "Get the issue types and priorities available in a project. Call this before creating an issue."
    }

    fn parameters(&self) -> Vec<ParamSpec> {
        vec![ParamSpec::optional(
            "project_key",
            TypeHint::String,
            "Project key; defaults to the configured project",
        )]
    }

    async fn execute(&self, args: &ToolArgs) -> anyhow::Result<String> {
        let project = match args.get("project_key").map(str::trim) {
            Some(key) if !key.is_empty() => key.to_uppercase(),
            _ => self
                .tracker
                .project_scope()
                .map(str::to_string)
                .ok_or_else(|| {
                    anyhow::anyhow!("No project key given and no default project is configured")
                })?,
        };
        let metadata = self.tracker.project_metadata(&project).await?;
        Ok(serde_json::to_string_pretty(&metadata)?)
    }
}

/// Create an issue in the configured project.
pub struct CreateIssue {
    tracker: Arc<dyn IssueTracker>,
}

impl CreateIssue {
    pub fn new(tracker: Arc<dyn IssueTracker>) -> Self {
        Self { tracker }
    }
}

fn split_labels(raw: Option<&str>) -> Vec<String> {
    raw.map(|s| {
        s.split(',')
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .map(str::to_string)
            .collect()
    })
    .unwrap_or_default()
}

#[async_trait]
impl Tool for CreateIssue {
    fn name(&self) -> &str {
        "create_issue"
    }

    fn description(&self) -> &str {
        "Create a new Jira issue in the configured project. Only use when the user explicitly asks to create one."
    }

    fn parameters(&self) -> Vec<ParamSpec> {
        vec![
            ParamSpec::required("summary", TypeHint::String, "Issue title"),
            ParamSpec::optional("description", TypeHint::String, "Issue description"),
            ParamSpec::optional(
                "issue_type",
                TypeHint::String,
                "Issue type such as Task, Bug or Story (default Task)",
            ),
            ParamSpec::optional(
                "priority",
                TypeHint::one_of(&PRIORITIES),
                "Priority (default Medium)",
            ),
            ParamSpec::optional("assignee", TypeHint::String, "Username or email of the assignee"),
            ParamSpec::optional("labels", TypeHint::String, "Comma-separated labels"),
        ]
    }

    async fn execute(&self, args: &ToolArgs) -> anyhow::Result<String> {
        let summary = args.require("summary")?.trim();
        if summary.is_empty() {
            anyhow::bail!("'summary' must not be empty");
        }

        let issue = NewIssue {
            summary: summary.to_string(),
            description: args.get("description").unwrap_or_default().to_string(),
            issue_type: args
                .get("issue_type")
                .filter(|t| !t.trim().is_empty())
                .unwrap_or("Task")
                .to_string(),
            priority: args.get("priority").unwrap_or("Medium").to_string(),
            assignee: args
                .get("assignee")
                .map(str::trim)
                .filter(|a| !a.is_empty())
                .map(str::to_string),
            labels: split_labels(args.get("labels")),
        };

        let created = self.tracker.create_issue(issue).await?;
        tracing::info!(key = %created.key, "Created Jira issue");
        Ok(serde_json::to_string_pretty(&json!({
            "success": true,
            "message": format!("Created issue {}", created.key),
            "issue": created,
        }))?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::testing::FakeTracker;
    use std::collections::BTreeMap;

    fn args(pairs: &[(&str, &str)]) -> ToolArgs {
        ToolArgs::new(
            pairs
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect::<BTreeMap<_, _>>(),
        )
    }

    fn scoped() -> Arc<FakeTracker> {
        Arc::new(FakeTracker {
            scope: Some("OPS".to_string()),
            ..FakeTracker::default()
        })
    }

    #[tokio::test]
    async fn create_applies_defaults_and_splits_labels() {
        let tracker = scoped();
        let tool = CreateIssue::new(tracker.clone());
        let out = tool
            .execute(&args(&[("summary", "Fix login"), ("labels", "auth, ui,,")]))
            .await
            .expect("execute");

        let created = tracker.created.lock().expect("lock");
        assert_eq!(created.len(), 1);
        assert_eq!(created[0].issue_type, "Task");
        assert_eq!(created[0].priority, "Medium");
        assert_eq!(created[0].labels, vec!["auth", "ui"]);
        assert!(created[0].assignee.is_none());

        let body: serde_json::Value = serde_json::from_str(&out).expect("json");
        assert_eq!(body["issue"]["key"], "OPS-1");
    }

    #[tokio::test]
    async fn create_without_scope_fails() {
        let tool = CreateIssue::new(Arc::new(FakeTracker::default()));
        let err = tool
            .execute(&args(&[("summary", "Anything")]))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("Project key is required"));
    }

    #[tokio::test]
    async fn blank_summary_is_rejected() {
        let tool = CreateIssue::new(scoped());
        assert!(tool.execute(&args(&[("summary", "  ")])).await.is_err());
    }

    #[tokio::test]
    async fn metadata_defaults_to_scope() {
        let tool = GetProjectMetadata::new(scoped());
        let out = tool.execute(&ToolArgs::default()).await.expect("execute");
        let body: serde_json::Value = serde_json::from_str(&out).expect("json");
        assert_eq!(body["project_key"], "OPS");

        let unscoped = GetProjectMetadata::new(Arc::new(FakeTracker::default()));
        assert!(unscoped.execute(&ToolArgs::default()).await.is_err());
    }

    #[tokio::test]
    async fn project_summary_counts_projects() {
        let tool = GetProjectSummary::new(Arc::new(FakeTracker::default()));
        let out = tool.execute(&ToolArgs::default()).await.expect("execute");
        let body: serde_json::Value = serde_json::from_str(&out).expect("json");
        assert_eq!(body["total_projects"], 1);
        assert_eq!(body["projects"][0]["key"], "OPS");
    }
}
