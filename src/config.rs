//! Configuration management for the Jira assistant.
//!
//! Configuration is read from environment variables (a `.env` file is loaded
//! by the binary before this runs):
//! - `LLM_PROVIDER` - Optional. `openai`, `ollama` or `farm`. Defaults to `openai`.
//! - `LLM_API_URL` - Endpoint URL. Required for `farm`, defaulted for the others.
//! - `LLM_API_KEY` - Required for `openai` (falls back to `OPENAI_API_KEY`) and `farm`.
//! - `LLM_MODEL` - Optional. Model identifier, defaulted per provider.
//! - `LLM_MAX_TOKENS` - Optional. Defaults to `2048`.
//! - `LLM_TEMPERATURE` - Optional. Defaults to `0.1`.
//! - `LLM_VERIFY_SSL` - Optional. Defaults to `true`.
//! - `LLM_AUTH_HEADER` - Optional. Key header used by the `farm` provider. Defaults to `KeyId`.
//! - `LLM_TIMEOUT_SECS` - Optional. Per-call LLM timeout. Defaults to `60`.
//! - `JIRA_SERVER_URL`, `JIRA_USERNAME`, `JIRA_API_TOKEN` - Required.
//! - `JIRA_PROJECT_KEY` - Optional. Scopes every query to one project.
//! - `DEFAULT_ISSUE_LIMIT`, `ANALYSIS_ISSUE_LIMIT`, `SEARCH_LIMIT` - Optional. `100`, `200`, `50`.
//! - `MAX_TOOL_ITERATIONS` - Optional. Tool rounds per user turn. Defaults to `5`.
//! - `TOOL_TIMEOUT_SECS` - Optional. Per-tool timeout. Defaults to `30`.
//! - `MAX_CHAT_HISTORY` - Optional. Conversation cap, at least `2`. Defaults to `20`.
//! - `TOOL_OUTPUT_LIMIT` - Optional. Characters of tool output kept. Defaults to `8000`.
//! - `SESSION_IDLE_SECS` - Optional. Idle chat sessions are dropped after this, `0` keeps them. Defaults to `3600`.
//! - `HOST` / `PORT` - Optional. Server address. Defaults to `127.0.0.1:3000`.
//! - `DEBUG` - Optional. Enables debug logging. Defaults to `false`.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid value for {0}: {1}")]
    InvalidValue(String, String),
}

/// Which LLM backend the assistant talks to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LlmProvider {
    /// OpenAI or any OpenAI-compatible endpoint, bearer token auth.
    OpenAi,
    /// Local Ollama server, no auth.
    Ollama,
    /// OpenAI-shaped "LLM farm" endpoint with a custom key header.
    Farm,
}

impl LlmProvider {
    fn default_url(self) -> Option<&'static str> {
        match self {
            LlmProvider::OpenAi => Some("https://api.openai.com/v1/chat/completions"),
            LlmProvider::Ollama => Some("http://localhost:11434"),
            LlmProvider::Farm => None,
        }
    }

    fn default_model(self) -> &'static str {
        match self {
            LlmProvider::OpenAi => "gpt-4o-mini",
            LlmProvider::Ollama => "llama3",
            LlmProvider::Farm => "meta-llama/Meta-Llama-3-70B-Instruct",
        }
    }

    fn requires_api_key(self) -> bool {
        !matches!(self, LlmProvider::Ollama)
    }
}

impl FromStr for LlmProvider {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "openai" | "openai-compatible" => Ok(LlmProvider::OpenAi),
            "ollama" | "local" => Ok(LlmProvider::Ollama),
            "farm" | "llm-farm" | "custom" => Ok(LlmProvider::Farm),
            other => Err(format!("expected openai, ollama or farm, got: {}", other)),
        }
    }
}

impl fmt::Display for LlmProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LlmProvider::OpenAi => write!(f, "openai"),
            LlmProvider::Ollama => write!(f, "ollama"),
            LlmProvider::Farm => write!(f, "farm"),
        }
    }
}

/// LLM client configuration.
#[derive(Clone)]
pub struct LlmConfig {
    pub provider: LlmProvider,

    /// Full endpoint URL (OpenAI/farm) or server base URL (Ollama)
    pub api_url: String,

    pub api_key: Option<String>,

    pub model: String,

    pub max_tokens: u32,

    pub temperature: f32,

    /// Disable only for farms behind self-signed certificates
    pub verify_ssl: bool,

    /// Header carrying the key for the farm provider
    pub auth_header_name: String,

    pub timeout: Duration,
}

impl fmt::Debug for LlmConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LlmConfig")
            .field("provider", &self.provider)
            .field("api_url", &self.api_url)
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .field("model", &self.model)
            .field("max_tokens", &self.max_tokens)
            .field("temperature", &self.temperature)
            .field("verify_ssl", &self.verify_ssl)
            .field("auth_header_name", &self.auth_header_name)
            .field("timeout", &self.timeout)
            .finish()
    }
}

/// Jira connection settings.
#[derive(Clone)]
pub struct JiraConfig {
    pub server_url: String,
    pub username: String,
    pub api_token: String,

    /// Restricts every JQL query to this project when set
    pub project_key: Option<String>,

    pub default_issue_limit: u32,
    pub analysis_issue_limit: u32,
    pub search_limit: u32,
}

impl fmt::Debug for JiraConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JiraConfig")
            .field("server_url", &self.server_url)
            .field("username", &self.username)
            .field("api_token", &"<redacted>")
            .field("project_key", &self.project_key)
            .field("default_issue_limit", &self.default_issue_limit)
            .field("analysis_issue_limit", &self.analysis_issue_limit)
            .field("search_limit", &self.search_limit)
            .finish()
    }
}

/// Knobs for the tool orchestration loop.
#[derive(Debug, Clone)]
pub struct AgentConfig {
    /// Tool-calling rounds allowed per user turn before aborting
    pub max_tool_iterations: usize,

    pub tool_timeout: Duration,

    /// Maximum non-system turns kept in a conversation
    pub max_chat_history: usize,

    /// Characters of tool output fed back to the model
    pub tool_output_limit: usize,

    /// Upper bound on one model call, enforced by the loop
    pub llm_timeout: Duration,
}

/// Smallest history that still holds a user turn and its answer.
pub const MIN_CHAT_HISTORY: usize = 2;

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            max_tool_iterations: 5,
            tool_timeout: Duration::from_secs(30),
            max_chat_history: 20,
            tool_output_limit: 8000,
            llm_timeout: Duration::from_secs(60),
        }
    }
}

/// Application configuration.
#[derive(Debug, Clone)]
pub struct Config {
    pub llm: LlmConfig,

    pub jira: JiraConfig,

    pub agent: AgentConfig,

    /// Chat sessions unused for this long are dropped
    pub session_idle_timeout: Duration,

    /// Server host
    pub host: String,

    /// Server port
    pub port: u16,

    /// Verbose logging
    pub debug: bool,
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::MissingEnvVar` if a required variable is unset or
    /// still holds a `your-...` placeholder, and `ConfigError::InvalidValue`
    /// if a numeric or boolean variable cannot be parsed.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration from an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| is_configured(v));
        let require =
            |key: &str| get(key).ok_or_else(|| ConfigError::MissingEnvVar(key.to_string()));

        let provider = parse_or(&get, "LLM_PROVIDER", LlmProvider::OpenAi)?;

        let api_url = match get("LLM_API_URL") {
            Some(url) => url,
            None => provider
                .default_url()
                .map(str::to_string)
                .ok_or_else(|| ConfigError::MissingEnvVar("LLM_API_URL".to_string()))?,
        };
        url::Url::parse(&api_url)
            .map_err(|e| ConfigError::InvalidValue("LLM_API_URL".to_string(), e.to_string()))?;

        let api_key = get("LLM_API_KEY").or_else(|| match provider {
            LlmProvider::OpenAi => get("OPENAI_API_KEY"),
            _ => None,
        });
        if provider.requires_api_key() && api_key.is_none() {
            return Err(ConfigError::MissingEnvVar("LLM_API_KEY".to_string()));
        }

        let llm = LlmConfig {
            provider,
            api_url,
            api_key,
            model: get("LLM_MODEL").unwrap_or_else(|| provider.default_model().to_string()),
            max_tokens: parse_or(&get, "LLM_MAX_TOKENS", 2048)?,
            temperature: parse_or(&get, "LLM_TEMPERATURE", 0.1)?,
            verify_ssl: bool_or(&get, "LLM_VERIFY_SSL", true)?,
            auth_header_name: get("LLM_AUTH_HEADER").unwrap_or_else(|| "KeyId".to_string()),
            timeout: Duration::from_secs(parse_or(&get, "LLM_TIMEOUT_SECS", 60)?),
        };

        let server_url = require("JIRA_SERVER_URL")?;
        url::Url::parse(&server_url)
            .map_err(|e| ConfigError::InvalidValue("JIRA_SERVER_URL".to_string(), e.to_string()))?;

        let jira = JiraConfig {
            server_url: server_url.trim_end_matches('/').to_string(),
            username: require("JIRA_USERNAME")?,
            api_token: require("JIRA_API_TOKEN")?,
            project_key: get("JIRA_PROJECT_KEY"),
            default_issue_limit: parse_or(&get, "DEFAULT_ISSUE_LIMIT", 100)?,
            analysis_issue_limit: parse_or(&get, "ANALYSIS_ISSUE_LIMIT", 200)?,
            search_limit: parse_or(&get, "SEARCH_LIMIT", 50)?,
        };

        let defaults = AgentConfig::default();
        let agent = AgentConfig {
            max_tool_iterations: parse_or(
                &get,
                "MAX_TOOL_ITERATIONS",
                defaults.max_tool_iterations,
            )?,
            tool_timeout: Duration::from_secs(parse_or(&get, "TOOL_TIMEOUT_SECS", 30)?),
            max_chat_history: parse_or(&get, "MAX_CHAT_HISTORY", defaults.max_chat_history)?,
            tool_output_limit: parse_or(&get, "TOOL_OUTPUT_LIMIT", defaults.tool_output_limit)?,
            llm_timeout: llm.timeout,
        };
        if agent.max_chat_history < MIN_CHAT_HISTORY {
            return Err(ConfigError::InvalidValue(
                "MAX_CHAT_HISTORY".to_string(),
                format!("must be at least {}", MIN_CHAT_HISTORY),
            ));
        }
        let session_idle_timeout = Duration::from_secs(parse_or(&get, "SESSION_IDLE_SECS", 3600)?);

        let host = get("HOST").unwrap_or_else(|| "127.0.0.1".to_string());
        let port = parse_or(&get, "PORT", 3000)?;
        let debug = bool_or(&get, "DEBUG", false)?;

        Ok(Self {
            llm,
            jira,
            agent,
            session_idle_timeout,
            host,
            port,
            debug,
        })
    }
}

/// Template placeholders like `your-api-token` count as unset.
fn is_configured(value: &str) -> bool {
    let value = value.trim();
    !value.is_empty() && !value.starts_with("your-")
}

fn parse_or<T, G>(get: &G, key: &str, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: fmt::Display,
    G: Fn(&str) -> Option<String>,
{
    match get(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|e| ConfigError::InvalidValue(key.to_string(), format!("{}", e))),
        None => Ok(default),
    }
}

fn bool_or<G>(get: &G, key: &str, default: bool) -> Result<bool, ConfigError>
where
    G: Fn(&str) -> Option<String>,
{
    get(key)
        .map(|v| parse_bool(&v).map_err(|e| ConfigError::InvalidValue(key.to_string(), e)))
        .transpose()
        .map(|v| v.unwrap_or(default))
}

fn parse_bool(value: &str) -> Result<bool, String> {
    match value.trim().to_lowercase().as_str() {
        "1" | "true" | "t" | "yes" | "y" | "on" => Ok(true),
        "0" | "false" | "f" | "no" | "n" | "off" => Ok(false),
        other => Err(format!("expected boolean-like value, got: {}", other)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    const JIRA: [(&str, &str); 3] = [
        ("JIRA_SERVER_URL", "https://example.atlassian.net/"),
        ("JIRA_USERNAME", "bot@example.com"),
        ("JIRA_API_TOKEN", "secret"),
    ];

    #[test]
    fn openai_defaults() {
        let mut vars = JIRA.to_vec();
        vars.push(("OPENAI_API_KEY", "sk-test"));
        let config = Config::from_lookup(lookup(&vars)).expect("config");

        assert_eq!(config.llm.provider, LlmProvider::OpenAi);
        assert_eq!(config.llm.api_key.as_deref(), Some("sk-test"));
        assert_eq!(config.llm.model, "gpt-4o-mini");
        assert_eq!(config.jira.server_url, "https://example.atlassian.net");
        assert_eq!(config.agent.max_tool_iterations, 5);
        assert_eq!(config.agent.max_chat_history, 20);
        assert_eq!(config.port, 3000);
        assert!(!config.debug);
    }

    #[test]
    fn farm_requires_url() {
        let mut vars = JIRA.to_vec();
        vars.push(("LLM_PROVIDER", "farm"));
        vars.push(("LLM_API_KEY", "k"));
        let err = Config::from_lookup(lookup(&vars)).unwrap_err();
        assert!(matches!(err, ConfigError::MissingEnvVar(ref v) if v == "LLM_API_URL"));
    }

    #[test]
    fn farm_uses_custom_header() {
        let mut vars = JIRA.to_vec();
        vars.extend([
            ("LLM_PROVIDER", "farm"),
            ("LLM_API_KEY", "k"),
            ("LLM_API_URL", "https://farm.internal/v1/chat/completions"),
            ("LLM_VERIFY_SSL", "no"),
            ("LLM_AUTH_HEADER", "X-Farm-Key"),
        ]);
        let config = Config::from_lookup(lookup(&vars)).expect("config");
        assert_eq!(config.llm.provider, LlmProvider::Farm);
        assert!(!config.llm.verify_ssl);
        assert_eq!(config.llm.auth_header_name, "X-Farm-Key");
    }

    #[test]
    fn ollama_needs_no_key() {
        let mut vars = JIRA.to_vec();
        vars.push(("LLM_PROVIDER", "ollama"));
        let config = Config::from_lookup(lookup(&vars)).expect("config");
        assert_eq!(config.llm.api_url, "http://localhost:11434");
        assert!(config.llm.api_key.is_none());
    }

    #[test]
    fn placeholder_values_count_as_missing() {
        let vars = [
            ("JIRA_SERVER_URL", "https://example.atlassian.net"),
            ("JIRA_USERNAME", "bot"),
            ("JIRA_API_TOKEN", "your-api-token"),
            ("OPENAI_API_KEY", "sk"),
        ];
        let err = Config::from_lookup(lookup(&vars)).unwrap_err();
        assert!(matches!(err, ConfigError::MissingEnvVar(ref v) if v == "JIRA_API_TOKEN"));
    }

    #[test]
    fn invalid_numbers_are_reported() {
        let mut vars = JIRA.to_vec();
        vars.push(("OPENAI_API_KEY", "sk"));
        vars.push(("MAX_TOOL_ITERATIONS", "many"));
        let err = Config::from_lookup(lookup(&vars)).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue(ref v, _) if v == "MAX_TOOL_ITERATIONS"));
    }

    #[test]
    fn chat_history_has_a_floor() {
        for cap in ["0", "1"] {
            let mut vars = JIRA.to_vec();
            vars.push(("OPENAI_API_KEY", "sk"));
            vars.push(("MAX_CHAT_HISTORY", cap));
            let err = Config::from_lookup(lookup(&vars)).unwrap_err();
            assert!(matches!(err, ConfigError::InvalidValue(ref v, _) if v == "MAX_CHAT_HISTORY"));
        }

        let mut vars = JIRA.to_vec();
        vars.push(("OPENAI_API_KEY", "sk"));
        vars.push(("MAX_CHAT_HISTORY", "2"));
        vars.push(("LLM_TIMEOUT_SECS", "7"));
        let config = Config::from_lookup(lookup(&vars)).expect("config");
        assert_eq!(config.agent.max_chat_history, 2);
        assert_eq!(config.agent.llm_timeout, Duration::from_secs(7));
        assert_eq!(config.session_idle_timeout, Duration::from_secs(3600));
    }

    #[test]
    fn api_key_is_redacted_in_debug_output() {
        let mut vars = JIRA.to_vec();
        vars.push(("OPENAI_API_KEY", "sk-very-secret"));
        let config = Config::from_lookup(lookup(&vars)).expect("config");
        let rendered = format!("{:?}", config);
        assert!(!rendered.contains("sk-very-secret"));
        assert!(!rendered.contains("\"secret\""));
    }

    #[test]
    fn parse_bool_accepts_common_spellings() {
        assert_eq!(parse_bool("Yes"), Ok(true));
        assert_eq!(parse_bool(" off "), Ok(false));
        assert!(parse_bool("maybe").is_err());
    }
}
