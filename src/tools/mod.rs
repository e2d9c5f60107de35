//! Tool registry and the Jira tools the assistant can call.
//!
//! A tool declares its parameters as a flat, ordered list of typed string
//! arguments. That matches what the invocation syntax can express:
//! `name(key="value", ...)`.

mod analysis;
mod issues;
mod projects;

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;

use crate::config::JiraConfig;
use crate::jira::IssueTracker;

pub use analysis::AnalyzeIssues;
pub use issues::{
    GetAllIssues, GetIssueDetails, GetIssuesByLabel, GetIssuesByPriority, GetIssuesByStatus,
    SearchIssuesByJql,
};
pub use projects::{CreateIssue, GetProjectMetadata, GetProjectSummary};

/// Priority names accepted by the priority-typed parameters.
pub const PRIORITIES: [&str; 10] = [
    "Blocker", "Critical", "Highest", "High", "Medium", "Low", "Lowest", "Major", "Minor",
    "Trivial",
];

/// Declared type of a parameter value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TypeHint {
    String,
    Integer,
    /// One of a fixed set of literals (matched case-insensitively).
    Enum(Vec<String>),
}

impl TypeHint {
    pub fn one_of(literals: &[&str]) -> Self {
        TypeHint::Enum(literals.iter().map(|s| s.to_string()).collect())
    }

    /// Check a raw value, returning its canonical form.
    ///
    /// Enum values are normalised to the declared spelling so tools can
    /// compare them directly.
    pub fn check(&self, raw: &str) -> Result<String, String> {
        match self {
            TypeHint::String => Ok(raw.to_string()),
            TypeHint::Integer => raw
                .trim()
                .parse::<i64>()
                .map(|n| n.to_string())
                .map_err(|_| format!("expected an integer, got \"{}\"", raw)),
            TypeHint::Enum(literals) => literals
                .iter()
                .find(|l| l.eq_ignore_ascii_case(raw.trim()))
                .cloned()
                .ok_or_else(|| {
                    format!("expected one of [{}], got \"{}\"", literals.join(", "), raw)
                }),
        }
    }
}

impl fmt::Display for TypeHint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TypeHint::String => write!(f, "string"),
            TypeHint::Integer => write!(f, "integer"),
            TypeHint::Enum(literals) => {
                let quoted: Vec<String> = literals.iter().map(|l| format!("\"{}\"", l)).collect();
                write!(f, "one of {}", quoted.join(" | "))
            }
        }
    }
}

/// One declared parameter of a tool.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParamSpec {
    pub name: String,
    pub hint: TypeHint,
    pub required: bool,
    pub description: String,
}

impl ParamSpec {
    pub fn required(name: &str, hint: TypeHint, description: &str) -> Self {
        Self {
            name: name.to_string(),
            hint,
            required: true,
            description: description.to_string(),
        }
    }

    pub fn optional(name: &str, hint: TypeHint, description: &str) -> Self {
        Self {
            required: false,
            ..Self::required(name, hint, description)
        }
    }
}

/// Immutable description of a registered tool.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolSpec {
    pub name: String,
    pub parameters: Vec<ParamSpec>,
    pub description: String,
}

impl ToolSpec {
    pub fn param(&self, name: &str) -> Option<&ParamSpec> {
        self.parameters.iter().find(|p| p.name == name)
    }

    /// `name(a: string, b?: integer)`
    pub fn signature(&self) -> String {
        let params: Vec<String> = self
            .parameters
            .iter()
            .map(|p| {
                format!(
                    "{}{}: {}",
                    p.name,
                    if p.required { "" } else { "?" },
                    p.hint
                )
            })
            .collect();
        format!("{}({})", self.name, params.join(", "))
    }
}

/// Validated arguments handed to a tool.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ToolArgs {
    values: BTreeMap<String, String>,
}

impl ToolArgs {
    pub fn new(values: BTreeMap<String, String>) -> Self {
        Self { values }
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.values.get(name).map(String::as_str)
    }

    pub fn require(&self, name: &str) -> anyhow::Result<&str> {
        self.get(name)
            .ok_or_else(|| anyhow::anyhow!("Missing '{}' argument", name))
    }

    pub fn int(&self, name: &str) -> anyhow::Result<Option<i64>> {
        self.get(name)
            .map(|v| {
                v.trim()
                    .parse::<i64>()
                    .map_err(|e| anyhow::anyhow!("'{}' is not an integer: {}", name, e))
            })
            .transpose()
    }

    /// Positive limit argument, clamped to `max`.
    pub fn limit(&self, name: &str, default: u32, max: u32) -> anyhow::Result<u32> {
        let value = match self.int(name)? {
            Some(n) if n < 1 => anyhow::bail!("'{}' must be at least 1", name),
            Some(n) => u32::try_from(n).unwrap_or(u32::MAX),
            None => default,
        };
        Ok(value.min(max))
    }
}

/// A callable tool.
#[async_trait]
pub trait Tool: Send + Sync {
    fn name(&self) -> &str;

    fn description(&self) -> &str;

    fn parameters(&self) -> Vec<ParamSpec>;

    async fn execute(&self, args: &ToolArgs) -> anyhow::Result<String>;
}

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("tool '{0}' is already registered")]
    Duplicate(String),
}

struct Entry {
    spec: ToolSpec,
    tool: Arc<dyn Tool>,
}

/// Name-indexed set of tools, in registration order. Read-only once built.
#[derive(Default)]
pub struct ToolRegistry {
    entries: Vec<Entry>,
    index: HashMap<String, usize>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<T: Tool + 'static>(&mut self, tool: T) -> Result<&mut Self, RegistryError> {
        let tool: Arc<dyn Tool> = Arc::new(tool);
        let spec = ToolSpec {
            name: tool.name().to_string(),
            parameters: tool.parameters(),
            description: tool.description().to_string(),
        };
        if self.index.contains_key(&spec.name) {
            return Err(RegistryError::Duplicate(spec.name));
        }
        self.index.insert(spec.name.clone(), self.entries.len());
        self.entries.push(Entry { spec, tool });
        Ok(self)
    }

    pub fn spec(&self, name: &str) -> Option<&ToolSpec> {
        self.index.get(name).map(|&i| &self.entries[i].spec)
    }

    pub fn get(&self, name: &str) -> Option<(&ToolSpec, Arc<dyn Tool>)> {
        self.index
            .get(name)
            .map(|&i| (&self.entries[i].spec, Arc::clone(&self.entries[i].tool)))
    }

    pub fn specs(&self) -> impl Iterator<Item = &ToolSpec> {
        self.entries.iter().map(|e| &e.spec)
    }

    pub fn names(&self) -> Vec<String> {
        self.specs().map(|s| s.name.clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Result-size limits the Jira tools apply.
#[derive(Debug, Clone, Copy)]
pub struct IssueLimits {
    pub default: u32,
    pub analysis: u32,
    pub search: u32,
}

impl From<&JiraConfig> for IssueLimits {
    fn from(config: &JiraConfig) -> Self {
        Self {
            default: config.default_issue_limit,
            analysis: config.analysis_issue_limit,
            search: config.search_limit,
        }
    }
}

/// Registry with every Jira tool bound to `tracker`.
pub fn jira_registry(
    tracker: Arc<dyn IssueTracker>,
    limits: IssueLimits,
) -> Result<ToolRegistry, RegistryError> {
    let mut registry = ToolRegistry::new();
    registry
        .register(GetIssuesByStatus::new(tracker.clone(), limits))?
        .register(GetIssueDetails::new(tracker.clone()))?
        .register(GetAllIssues::new(tracker.clone(), limits))?
        .register(AnalyzeIssues::new(tracker.clone(), limits))?
        .register(SearchIssuesByJql::new(tracker.clone(), limits))?
        .register(GetIssuesByLabel::new(tracker.clone(), limits))?
        .register(GetIssuesByPriority::new(tracker.clone(), limits))?
        .register(GetProjectSummary::new(tracker.clone()))?
        .register(GetProjectMetadata::new(tracker.clone()))?
        .register(CreateIssue::new(tracker))?;
    Ok(registry)
}
