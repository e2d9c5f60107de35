//! Validates parsed invocations against the registry and runs the tool.
//!
//! Every failure is folded into a [`ToolResult`]; nothing here aborts the
//! orchestration loop.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use futures::FutureExt;
use thiserror::Error;

use super::parser::ParsedInvocation;
use crate::tools::{ToolArgs, ToolRegistry, ToolSpec};

/// Why a single invocation failed. The display form is what the model sees.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum DispatchError {
    #[error("UnknownTool:{0}")]
    UnknownTool(String),

    #[error("InvalidArgument:{param}: {detail}")]
    InvalidArgument { param: String, detail: String },

    #[error("ToolTimeout:{name} after {timeout:?}")]
    ToolTimeout { name: String, timeout: Duration },

    #[error("ToolExecutionError:{0}")]
    ToolExecution(String),
}

/// What one invocation produced, already truncated to the output limit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ToolOutcome {
    /// Tool payload
    Success(String),
    /// A [`DispatchError`] rendered for the model
    Failure(String),
}

/// An invocation paired with its outcome. Becomes one tool turn.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolResult {
    pub invocation: ParsedInvocation,
    pub outcome: ToolOutcome,
}

impl ToolResult {
    pub fn is_success(&self) -> bool {
        matches!(self.outcome, ToolOutcome::Success(_))
    }

    /// Text of the tool turn fed back to the model.
    pub fn to_turn_content(&self) -> String {
        match &self.outcome {
            ToolOutcome::Success(payload) => {
                format!("Tool result from {}: {}", self.invocation.tool_name, payload)
            }
            ToolOutcome::Failure(reason) => {
                format!("Tool error from {}: {}", self.invocation.tool_name, reason)
            }
        }
    }
}

/// Runs parsed invocations against a registry.
///
/// Each call is bounded by `timeout`, and its output (or failure reason) is
/// cut to `output_limit` characters.
pub struct Dispatcher {
    registry: Arc<ToolRegistry>,
    timeout: Duration,
    output_limit: usize,
}

impl Dispatcher {
    pub fn new(registry: Arc<ToolRegistry>, timeout: Duration, output_limit: usize) -> Self {
        Self {
            registry,
            timeout,
            output_limit,
        }
    }

    pub fn registry(&self) -> &Arc<ToolRegistry> {
        &self.registry
    }

    /// Validate and run one invocation. Never fails; errors become
    /// [`ToolOutcome::Failure`].
    pub async fn dispatch(&self, invocation: &ParsedInvocation) -> ToolResult {
        let outcome = match self.run(invocation).await {
            Ok(payload) => ToolOutcome::Success(truncate(&payload, self.output_limit)),
            Err(err) => {
                tracing::warn!(tool = %invocation.tool_name, "Tool call failed: {}", err);
                ToolOutcome::Failure(truncate(&err.to_string(), self.output_limit))
            }
        };
        ToolResult {
            invocation: invocation.clone(),
            outcome,
        }
    }

    async fn run(&self, invocation: &ParsedInvocation) -> Result<String, DispatchError> {
        let (spec, tool) = self
            .registry
            .get(&invocation.tool_name)
            .ok_or_else(|| DispatchError::UnknownTool(invocation.tool_name.clone()))?;
        let args = validate(spec, invocation)?;

        tracing::info!(tool = %spec.name, args = ?invocation.arguments, "Executing tool");
        let call = AssertUnwindSafe(tool.execute(&args)).catch_unwind();
        match tokio::time::timeout(self.timeout, call).await {
            Err(_) => Err(DispatchError::ToolTimeout {
                name: spec.name.clone(),
                timeout: self.timeout,
            }),
            Ok(Err(panic)) => Err(DispatchError::ToolExecution(panic_message(panic.as_ref()))),
            Ok(Ok(Err(err))) => Err(DispatchError::ToolExecution(format!("{:#}", err))),
            Ok(Ok(Ok(payload))) => Ok(payload),
        }
    }
}

/// Check arguments against the declared parameters, normalising typed values.
fn validate(spec: &ToolSpec, invocation: &ParsedInvocation) -> Result<ToolArgs, DispatchError> {
    let invalid = |param: &str, detail: String| DispatchError::InvalidArgument {
        param: param.to_string(),
        detail,
    };

    if let Some(unknown) = invocation
        .arguments
        .keys()
        .find(|name| spec.param(name).is_none())
    {
        return Err(invalid(
            unknown,
            format!("not a parameter of {}", spec.name),
        ));
    }

    let mut values = std::collections::BTreeMap::new();
    for param in &spec.parameters {
        match invocation.arguments.get(&param.name) {
            Some(raw) => {
                let value = param.hint.check(raw).map_err(|e| invalid(&param.name, e))?;
                values.insert(param.name.clone(), value);
            }
            None if param.required => {
                return Err(invalid(&param.name, "missing required argument".to_string()));
            }
            None => {}
        }
    }
    Ok(ToolArgs::new(values))
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        format!("tool panicked: {}", s)
    } else if let Some(s) = panic.downcast_ref::<String>() {
        format!("tool panicked: {}", s)
    } else {
        "tool panicked".to_string()
    }
}

/// Cut `text` to at most `limit` characters, marking the cut.
pub fn truncate(text: &str, limit: usize) -> String {
    match text.char_indices().nth(limit) {
        Some((idx, _)) => format!("{}... [truncated]", &text[..idx]),
        None => text.to_string(),
    }
}
