//! Jira REST API v2 client (basic auth with username + API token).

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Map, Value};

use super::{
    scope_jql, Comment, CreatedIssue, Issue, IssueDetails, IssueTracker, JiraError, NewIssue,
    ProjectInfo, ProjectMetadata,
};
use crate::config::JiraConfig;

const DEFAULT_ISSUE_TYPES: [&str; 4] = ["Task", "Bug", "Story", "Epic"];
const DEFAULT_PRIORITIES: [&str; 4] = ["Low", "Medium", "High", "Critical"];

pub struct JiraClient {
    http: reqwest::Client,
    server_url: String,
    username: String,
    api_token: String,
    project_key: Option<String>,
}

// Raw API shapes. Everything optional: Jira omits empty fields freely.

#[derive(Deserialize)]
struct SearchResponse {
    #[serde(default)]
    issues: Vec<RawIssue>,
}

#[derive(Deserialize)]
struct RawIssue {
    #[serde(default)]
    key: String,
    #[serde(default)]
    fields: RawFields,
}

#[derive(Deserialize, Default)]
struct RawFields {
    summary: Option<String>,
    description: Option<String>,
    status: Option<Named>,
    assignee: Option<Person>,
    reporter: Option<Person>,
    priority: Option<Named>,
    issuetype: Option<Named>,
    created: Option<String>,
    updated: Option<String>,
    #[serde(default)]
    labels: Vec<String>,
    #[serde(default)]
    components: Vec<Named>,
    comment: Option<CommentPage>,
}

#[derive(Deserialize)]
struct Named {
    #[serde(default)]
    name: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct Person {
    display_name: Option<String>,
    account_id: Option<String>,
}

#[derive(Deserialize)]
struct CommentPage {
    #[serde(default)]
    comments: Vec<RawComment>,
}

#[derive(Deserialize)]
struct RawComment {
    author: Option<Person>,
    #[serde(default)]
    created: String,
    #[serde(default)]
    body: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawProject {
    key: String,
    name: String,
    project_type_key: Option<String>,
    lead: Option<Person>,
}

#[derive(Deserialize)]
struct CreateMeta {
    #[serde(default)]
    projects: Vec<CreateMetaProject>,
}

#[derive(Deserialize)]
struct CreateMetaProject {
    key: String,
    #[serde(default)]
    issuetypes: Vec<Named>,
}

#[derive(Deserialize)]
struct CreateResponse {
    key: String,
    id: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ErrorBody {
    #[serde(default)]
    error_messages: Vec<String>,
    #[serde(default)]
    errors: Map<String, Value>,
}

impl RawIssue {
    fn into_issue(self) -> (Issue, Vec<Comment>) {
        let f = self.fields;
        let comments = f
            .comment
            .map(|page| {
                page.comments
                    .into_iter()
                    .map(|c| Comment {
                        author: display_name(c.author, "Unknown"),
                        created: c.created,
                        body: c.body,
                    })
                    .collect()
            })
            .unwrap_or_default();

        let issue = Issue {
            key: self.key,
            summary: f.summary.unwrap_or_default(),
            status: f.status.map(|s| s.name).unwrap_or_default(),
            assignee: display_name(f.assignee, "Unassigned"),
            reporter: display_name(f.reporter, "Unknown"),
            created: f.created.unwrap_or_default(),
            updated: f.updated.unwrap_or_default(),
            priority: f.priority.map(|p| p.name).unwrap_or_else(|| "None".to_string()),
            issue_type: f.issuetype.map(|t| t.name).unwrap_or_default(),
            labels: f.labels,
            description: f.description.unwrap_or_default(),
            components: f.components.into_iter().map(|c| c.name).collect(),
        };
        (issue, comments)
    }
}

fn display_name(person: Option<Person>, fallback: &str) -> String {
    person
        .and_then(|p| p.display_name)
        .unwrap_or_else(|| fallback.to_string())
}

/// Flatten Jira's `errorMessages` + `errors` into one line.
fn error_message(body: &str) -> String {
    match serde_json::from_str::<ErrorBody>(body) {
        Ok(parsed) => {
            let mut parts = parsed.error_messages;
            parts.extend(parsed.errors.into_iter().map(|(field, msg)| match msg {
                Value::String(s) => format!("{}: {}", field, s),
                other => format!("{}: {}", field, other),
            }));
            if parts.is_empty() {
                body.to_string()
            } else {
                parts.join("; ")
            }
        }
        Err(_) => body.to_string(),
    }
}

/// Turn a raw create failure into something the model can act on.
fn explain_create_error(message: &str, project: &str, issue: &NewIssue) -> String {
    let lower = message.to_lowercase();
    if lower.contains("valid project is required") {
        format!(
            "Project '{}' is not valid or accessible. Check the project key and your permission to create issues in it",
            project
        )
    } else if lower.contains("assignee") {
        format!(
            "Invalid assignee '{}'. Check the user exists and has access to the project",
            issue.assignee.as_deref().unwrap_or("")
        )
    } else if lower.contains("issuetype") || lower.contains("issue type") {
        format!(
            "Issue type '{}' is not valid for project '{}'. Try 'Task', 'Bug', or 'Epic'",
            issue.issue_type, project
        )
    } else if lower.contains("priority") {
        format!(
            "Priority '{}' is not valid. Try 'Low', 'Medium', 'High', or 'Critical'",
            issue.priority
        )
    } else {
        format!("Failed to create issue: {}", message)
    }
}

impl JiraClient {
    pub fn new(config: &JiraConfig) -> Result<Self, JiraError> {
        let http = reqwest::Client::builder()
            .user_agent(concat!("jira-assistant/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| JiraError::Transport(e.to_string()))?;

        match &config.project_key {
            Some(key) => tracing::info!("Jira client initialized with project scope: {}", key),
            None => tracing::info!("Jira client initialized (all projects)"),
        }

        Ok(Self {
            http,
            server_url: config.server_url.trim_end_matches('/').to_string(),
            username: config.username.clone(),
            api_token: config.api_token.clone(),
            project_key: config.project_key.clone(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/rest/api/2/{}", self.server_url, path)
    }

    async fn get<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, String)],
    ) -> Result<T, JiraError> {
        tracing::debug!("GET {} {:?}", self.url(path), query);
        let response = self
            .http
            .get(self.url(path))
            .basic_auth(&self.username, Some(&self.api_token))
            .query(query)
            .send()
            .await?;
        Self::decode(response).await
    }

    async fn post<T: DeserializeOwned>(&self, path: &str, body: &Value) -> Result<T, JiraError> {
        tracing::debug!("POST {}", self.url(path));
        let response = self
            .http
            .post(self.url(path))
            .basic_auth(&self.username, Some(&self.api_token))
            .json(body)
            .send()
            .await?;
        Self::decode(response).await
    }

    async fn decode<T: DeserializeOwned>(response: reqwest::Response) -> Result<T, JiraError> {
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(JiraError::Api {
                status: status.as_u16(),
                message: error_message(&body),
            });
        }
        Ok(response.json().await?)
    }

    /// Resolve an assignee to the field value Jira expects.
    ///
    /// Cloud instances want an `accountId`; server instances accept `name`.
    async fn assignee_field(&self, assignee: &str) -> Value {
        let users: Result<Vec<Person>, JiraError> = self
            .get("user/search", &[("query", assignee.to_string())])
            .await;
        match users {
            Ok(users) => match users.into_iter().next().and_then(|u| u.account_id) {
                Some(account_id) => {
                    tracing::debug!("Found assignee '{}' with accountId {}", assignee, account_id);
                    json!({ "accountId": account_id })
                }
                None => {
                    tracing::warn!("User '{}' not found, using name format", assignee);
                    json!({ "name": assignee })
                }
            },
            Err(e) => {
                tracing::warn!("Could not search for user '{}': {}, using name format", assignee, e);
                json!({ "name": assignee })
            }
        }
    }
}

#[async_trait]
impl IssueTracker for JiraClient {
    fn project_scope(&self) -> Option<&str> {
        self.project_key.as_deref()
    }

    async fn search(&self, jql: &str, limit: u32) -> Result<Vec<Issue>, JiraError> {
        let scoped = scope_jql(jql, self.project_scope());
        tracing::debug!("JQL: {}", scoped);

        let fields = "summary,status,assignee,reporter,created,updated,priority,issuetype,labels,description,components";
        let response: SearchResponse = self
            .get(
                "search",
                &[
                    ("jql", scoped),
                    ("maxResults", limit.to_string()),
                    ("fields", fields.to_string()),
                ],
            )
            .await?;

        let issues: Vec<Issue> = response
            .issues
            .into_iter()
            .map(|raw| raw.into_issue().0)
            .collect();
        tracing::info!("Retrieved {} issues for JQL: {}", issues.len(), jql);
        Ok(issues)
    }

    async fn issue(&self, key: &str) -> Result<IssueDetails, JiraError> {
        let raw: RawIssue = self
            .get(&format!("issue/{}", key), &[])
            .await
            .map_err(|e| match e {
                JiraError::Api { status: 404, .. } => JiraError::IssueNotFound(key.to_string()),
                other => other,
            })?;
        let (issue, comments) = raw.into_issue();
        tracing::info!("Retrieved details for issue: {}", key);
        Ok(IssueDetails {
            issue,
            comment_count: comments.len(),
            comments,
        })
    }

    async fn projects(&self) -> Result<Vec<ProjectInfo>, JiraError> {
        let raw: Vec<RawProject> = self.get("project", &[("expand", "lead".to_string())]).await?;
        let projects: Vec<ProjectInfo> = raw
            .into_iter()
            .map(|p| ProjectInfo {
                key: p.key,
                name: p.name,
                project_type: p.project_type_key.unwrap_or_else(|| "Unknown".to_string()),
                lead: display_name(p.lead, "Unknown"),
            })
            .collect();
        tracing::info!("Retrieved information for {} projects", projects.len());
        Ok(projects)
    }

    async fn project_metadata(&self, project_key: &str) -> Result<ProjectMetadata, JiraError> {
        let project: RawProject = self.get(&format!("project/{}", project_key), &[]).await?;

        let issue_types = match self
            .get::<CreateMeta>("issue/createmeta", &[("projectKeys", project_key.to_string())])
            .await
        {
            Ok(meta) => meta
                .projects
                .into_iter()
                .find(|p| p.key == project_key)
                .map(|p| p.issuetypes.into_iter().map(|t| t.name).collect())
                .unwrap_or_default(),
            Err(e) => {
                tracing::warn!("Could not get create metadata: {}", e);
                Vec::new()
            }
        };

        let priorities = match self.get::<Vec<Named>>("priority", &[]).await {
            Ok(list) => list.into_iter().map(|p| p.name).collect(),
            Err(e) => {
                tracing::warn!("Could not get priorities: {}", e);
                DEFAULT_PRIORITIES.iter().map(|s| s.to_string()).collect()
            }
        };

        let available_issue_types = if issue_types.is_empty() {
            DEFAULT_ISSUE_TYPES.iter().map(|s| s.to_string()).collect()
        } else {
            issue_types
        };

        Ok(ProjectMetadata {
            project_key: project.key,
            project_name: project.name,
            project_type: project.project_type_key.unwrap_or_else(|| "Unknown".to_string()),
            available_issue_types,
            available_priorities: priorities,
            lead: display_name(project.lead, "Unknown"),
        })
    }

    async fn create_issue(&self, issue: NewIssue) -> Result<CreatedIssue, JiraError> {
        let project = self
            .project_key
            .clone()
            .ok_or(JiraError::NoProjectScope)?;

        let mut fields = json!({
            "project": { "key": project },
            "summary": issue.summary,
            "description": issue.description,
            "issuetype": { "name": issue.issue_type },
            "priority": { "name": issue.priority },
        });
        if !issue.labels.is_empty() {
            fields["labels"] = json!(issue.labels);
        }
        if let Some(assignee) = &issue.assignee {
            fields["assignee"] = self.assignee_field(assignee).await;
        }

        let created: CreateResponse = self
            .post("issue", &json!({ "fields": fields }))
            .await
            .map_err(|e| match e {
                JiraError::Api { message, .. } => {
                    let detailed = explain_create_error(&message, &project, &issue);
                    tracing::error!("Error creating issue: {}", detailed);
                    JiraError::CreateRejected(detailed)
                }
                other => other,
            })?;

        tracing::info!("Created issue {}", created.key);
        Ok(CreatedIssue {
            url: format!("{}/browse/{}", self.server_url, created.key),
            key: created.key,
            id: created.id,
            summary: issue.summary,
            description: issue.description,
            issue_type: issue.issue_type,
            priority: issue.priority,
            project,
            assignee: issue.assignee,
            labels: issue.labels,
            status: "To Do".to_string(),
        })
    }
}
