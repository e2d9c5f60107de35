//! Aggregate statistics over the accessible issue set.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;
use serde_json::{json, Map, Value};

use super::{IssueLimits, ParamSpec, Tool, ToolArgs};
use crate::jira::{Issue, IssueTracker};

const TOP_N: usize = 10;

/// Occurrence counts that remember first-seen order, so ties are stable.
#[derive(Default)]
struct Tally {
    order: Vec<String>,
    counts: HashMap<String, usize>,
}

impl Tally {
    fn add(&mut self, value: &str) {
        match self.counts.get_mut(value) {
            Some(n) => *n += 1,
            None => {
                self.order.push(value.to_string());
                self.counts.insert(value.to_string(), 1);
            }
        }
    }

    fn ranked(&self) -> Vec<(&str, usize)> {
        let mut ranked: Vec<(&str, usize)> = self
            .order
            .iter()
            .map(|k| (k.as_str(), self.counts.get(k).copied().unwrap_or(0)))
            .collect();
        // sort_by is stable: equal counts keep first-seen order
        ranked.sort_by(|a, b| b.1.cmp(&a.1));
        ranked
    }

    fn most_common(&self) -> Option<&str> {
        self.ranked().first().map(|(k, _)| *k)
    }

    fn to_json(&self, limit: Option<usize>) -> Value {
        let ranked = self.ranked();
        let take = limit.unwrap_or(ranked.len());
        let map: Map<String, Value> = ranked
            .into_iter()
            .take(take)
            .map(|(k, n)| (k.to_string(), json!(n)))
            .collect();
        Value::Object(map)
    }

    fn len(&self) -> usize {
        self.order.len()
    }
}

#[derive(Serialize)]
struct RecentIssue<'a> {
    key: &'a str,
    summary: &'a str,
    status: &'a str,
    assignee: &'a str,
    created: &'a str,
}

fn analyze(issues: &[Issue]) -> Value {
    let mut status = Tally::default();
    let mut priority = Tally::default();
    let mut assignee = Tally::default();
    let mut issue_type = Tally::default();
    let mut labels = Tally::default();

    for issue in issues {
        status.add(&issue.status);
        priority.add(&issue.priority);
        assignee.add(&issue.assignee);
        issue_type.add(&issue.issue_type);
        for label in &issue.labels {
            labels.add(label);
        }
    }

    let mut by_created: Vec<&Issue> = issues.iter().collect();
    // Jira timestamps are ISO 8601, so lexical order is chronological.
    by_created.sort_by(|a, b| b.created.cmp(&a.created));
    let recent: Vec<RecentIssue<'_>> = by_created
        .into_iter()
        .take(TOP_N)
        .map(|i| RecentIssue {
            key: &i.key,
            summary: &i.summary,
            status: &i.status,
            assignee: &i.assignee,
            created: &i.created,
        })
        .collect();

    json!({
        "total_issues": issues.len(),
        "summary_statistics": {
            "status_distribution": status.to_json(None),
            "priority_distribution": priority.to_json(None),
            "assignee_distribution": assignee.to_json(Some(TOP_N)),
            "issue_type_distribution": issue_type.to_json(None),
            "top_labels": labels.to_json(Some(TOP_N)),
        },
        "recent_issues": recent,
        "insights": {
            "most_common_status": status.most_common(),
            "most_common_priority": priority.most_common(),
            "most_active_assignee": assignee.most_common(),
            "total_labels_used": labels.len(),
        },
    })
}

/// `get_all_issues_for_analysis`: distributions, recent activity and insights.
pub struct AnalyzeIssues {
    tracker: Arc<dyn IssueTracker>,
    limits: IssueLimits,
}

impl AnalyzeIssues {
    pub fn new(tracker: Arc<dyn IssueTracker>, limits: IssueLimits) -> Self {
        Self { tracker, limits }
    }
}

#[async_trait]
impl Tool for AnalyzeIssues {
    fn name(&self) -> &str {
        "get_all_issues_for_analysis"
    }

    fn description(&self) -> &str {
        "Retrieve issues with summary statistics (status, priority, assignee, type and label distributions) \
         for analysis, trends and team workload questions."
    }

    fn parameters(&self) -> Vec<ParamSpec> {
        Vec::new()
    }

    async fn execute(&self, _args: &ToolArgs) -> anyhow::Result<String> {
        let issues = self
            .tracker
            .search("ORDER BY created DESC", self.limits.analysis)
            .await?;
        if issues.is_empty() {
            return Ok("No issues found for analysis.".to_string());
        }
        tracing::debug!(count = issues.len(), "Analyzing issues");
        Ok(serde_json::to_string_pretty(&analyze(&issues))?)
    }
}
