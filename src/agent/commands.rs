//! Chat commands answered locally, without a model round trip.

use crate::tools::ToolRegistry;

pub const CLEARED_MESSAGE: &str = "Chat history has been cleared. Starting fresh!";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SystemCommand {
    Help,
    ClearHistory,
    Status,
}

impl SystemCommand {
    /// Recognise a command; anything else is a normal chat message.
    pub fn parse(input: &str) -> Option<Self> {
        let normalized = input.trim().to_lowercase();
        match normalized.trim_end_matches('?') {
            "help" | "what can you do" | "commands" => Some(SystemCommand::Help),
            "clear history" | "clear chat" | "reset" => Some(SystemCommand::ClearHistory),
            "status" | "system status" | "health check" => Some(SystemCommand::Status),
            _ => None,
        }
    }
}

pub fn help_text(tools: &ToolRegistry) -> String {
    let mut text = String::from(
        "**Jira Assistant Help**\n\n\
         Ask about your Jira issues in plain language, for example:\n\
         - \"Show me all To Do issues\"\n\
         - \"Tell me about issue PROJ-123\"\n\
         - \"Analyze all tickets\" or \"Who has the most open issues?\"\n\
         - \"Find high priority bugs created this week\"\n\
         - \"What projects do I have access to?\"\n\
         - \"Create a task to update the release notes\"\n\n\
         I remember the conversation, so follow-up questions work.\n\n\
         **Tools I can use:**\n",
    );
    for spec in tools.specs() {
        text.push_str(&format!("- `{}`: {}\n", spec.name, spec.description));
    }
    text.push_str(
        "\n**System commands:**\n\
         - \"help\" or \"what can you do?\": show this message\n\
         - \"clear history\": start a fresh conversation\n\
         - \"system status\": check the Jira connection",
    );
    text
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::{jira_registry, testing::FakeTracker, IssueLimits};
    use std::sync::Arc;

    #[test]
    fn recognises_commands_case_insensitively() {
        assert_eq!(SystemCommand::parse("  HELP "), Some(SystemCommand::Help));
        assert_eq!(
            SystemCommand::parse("What can you do?"),
            Some(SystemCommand::Help)
        );
        assert_eq!(
            SystemCommand::parse("Clear Chat"),
            Some(SystemCommand::ClearHistory)
        );
        assert_eq!(
            SystemCommand::parse("health check"),
            Some(SystemCommand::Status)
        );
        assert_eq!(SystemCommand::parse("show status of OPS-1"), None);
    }

    #[test]
    fn help_lists_registered_tools() {
        let limits = IssueLimits {
            default: 10,
            analysis: 10,
            search: 10,
        };
        let registry = jira_registry(Arc::new(FakeTracker::default()), limits).expect("registry");
        let text = help_text(&registry);
        assert!(text.contains("- `get_all_issues`: "));
        assert!(text.contains("- `create_issue`: "));
        assert!(text.ends_with("check the Jira connection"));
    }
}
