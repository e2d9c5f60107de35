//! System prompt and message compilation for the model.

use super::conversation::{Conversation, TurnRole};
use super::parser::MARKER;
use crate::llm::ChatMessage;
use crate::tools::ToolRegistry;

/// Build the system prompt describing every registered tool and the
/// invocation syntax the parser accepts.
pub fn build_system_prompt(tools: &ToolRegistry) -> String {
    let tool_descriptions = tools
        .specs()
        .map(|spec| {
            let mut entry = format!("- {}\n  {}", spec.signature(), spec.description);
            for param in &spec.parameters {
                if !param.description.is_empty() {
                    entry.push_str(&format!("\n  * {}: {}", param.name, param.description));
                }
            }
            entry
        })
        .collect::<Vec<_>>()
        .join("\n");

    format!(
        r#"You are a Jira AI assistant that helps users find, analyze and create Jira issues.

## Available Tools

{tool_descriptions}

## Calling a Tool

You cannot query Jira yourself. To use a tool, write a line of the form:

{marker} tool_name(param1="value1", param2="value2")

Rules:
1. Every value is a double-quoted string, including numbers: max_results="10".
2. Inside a value, write a double quote as \" and a backslash as \\.
3. Parameters marked with ? are optional; omit them rather than passing empty values.
4. You may call several tools in one reply. Each call starts with {marker}.
5. After the calls you will receive messages starting with "Tool result from" or "Tool error from". Use them to answer, or call more tools if needed.
6. When you can answer without tools, reply in plain text and do not write {marker} at all.
7. Never invent issue data. Only report what the tools returned.
8. Only call create_issue when the user explicitly asks to create an issue.

## Examples

- User: "Show me all To Do issues" -> {marker} get_issues_by_status(status="To Do")
- User: "Tell me about PROJ-123" -> {marker} get_issue_details(issue_key="PROJ-123")
- User: "Issues mentioning \"login\"" -> {marker} search_issues_by_jql(jql_query="text ~ \"login\"")
- User: "Hello" -> a direct answer, no tool call

Be conversational and concise. Summarize large result sets instead of repeating them verbatim."#,
        tool_descriptions = tool_descriptions,
        marker = MARKER,
    )
}

/// Render the conversation into the message list sent to the model.
///
/// Chat endpoints only know system, user and assistant roles, so tool turns
/// go out as user messages carrying the tool result text.
pub fn compile(conversation: &Conversation) -> Vec<ChatMessage> {
    conversation
        .iter()
        .map(|turn| match turn.role {
            TurnRole::System => ChatMessage::system(turn.content.clone()),
            TurnRole::User | TurnRole::Tool => ChatMessage::user(turn.content.clone()),
            TurnRole::Assistant => ChatMessage::assistant(turn.content.clone()),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::conversation::ConversationTurn;
    use crate::llm::Role;
    use crate::tools::{jira_registry, testing::FakeTracker, IssueLimits};
    use std::sync::Arc;

    #[test]
    fn system_prompt_lists_tools_and_marker() {
        let limits = IssueLimits {
            default: 100,
            analysis: 200,
            search: 50,
        };
        let registry = jira_registry(Arc::new(FakeTracker::default()), limits).expect("registry");
        let prompt = build_system_prompt(&registry);

        assert!(prompt.contains("- get_issues_by_status(status: string, max_results?: integer)"));
        assert!(prompt.contains("create_issue(summary: string"));
        assert!(prompt.contains(r#"TOOL_CALL: get_issues_by_status(status="To Do")"#));
        assert!(prompt.contains(r#"write a double quote as \""#));
    }

    #[test]
    fn tool_turns_are_sent_as_user_messages() {
        let mut conversation = Conversation::new("sys", 10);
        conversation.push(ConversationTurn::user("q"));
        conversation.push(ConversationTurn::assistant("TOOL_CALL: x()"));
        conversation.push(ConversationTurn::tool("Tool result from x: 1"));

        let messages = compile(&conversation);
        let roles: Vec<Role> = messages.iter().map(|m| m.role).collect();
        assert_eq!(
            roles,
            vec![Role::System, Role::User, Role::Assistant, Role::User]
        );
        assert_eq!(messages[3].content, "Tool result from x: 1");
    }
}
