use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::QuillError;
use crate::types::Action;

/// Top-level configuration loaded from `.quill.toml`.
///
/// Supports layered resolution: CLI flags > local config > env vars > defaults.
/// Secrets left out of the file are looked up in the environment.
///
/// # Examples
///
/// ```
/// use quill_core::{Action, QuillConfig};
///
/// let config = QuillConfig::default();
/// assert!(config.is_enabled(Action::Summary));
/// assert_eq!(config.diff.max_chars, 60_000);
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct QuillConfig {
    /// Which actions the pipeline runs.
    #[serde(default)]
    pub pipeline: PipelineConfig,
    /// Diff filtering and size budget.
    #[serde(default)]
    pub diff: DiffConfig,
    /// Ticket tracker integration.
    #[serde(default)]
    pub ticket: TicketConfig,
    /// LLM provider settings.
    #[serde(default)]
    pub llm: LlmConfig,
    /// GitHub settings.
    #[serde(default)]
    pub github: GitHubConfig,
}

impl QuillConfig {
    /// Load configuration from a TOML file at `path`.
    ///
    /// # Errors
    ///
    /// Returns [`QuillError::FileNotFound`] if the file does not exist,
    /// [`QuillError::Io`] if it cannot be read, or [`QuillError::Toml`]
    /// if the content is not valid TOML.
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use quill_core::QuillConfig;
    /// use std::path::Path;
    ///
    /// let config = QuillConfig::from_file(Path::new(".quill.toml")).unwrap();
    /// ```
    pub fn from_file(path: &Path) -> Result<Self, QuillError> {
        if !path.exists() {
            return Err(QuillError::FileNotFound(path.to_path_buf()));
        }
        let content = std::fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    /// Parse configuration from a TOML string.
    ///
    /// # Errors
    ///
    /// Returns [`QuillError::Toml`] if parsing fails.
    ///
    /// # Examples
    ///
    /// ```
    /// use quill_core::QuillConfig;
    ///
    /// let toml = r#"
    /// [diff]
    /// max_chars = 1000
    /// "#;
    /// let config = QuillConfig::from_toml(toml).unwrap();
    /// assert_eq!(config.diff.max_chars, 1000);
    /// ```
    pub fn from_toml(content: &str) -> Result<Self, QuillError> {
        let config: Self = toml::from_str(content)?;
        Ok(config)
    }

    /// Returns `true` if `action` is in the enabled set.
    pub fn is_enabled(&self, action: Action) -> bool {
        self.pipeline.actions.contains(&action)
    }

    /// Check every option the pipeline depends on.
    ///
    /// Called before any stage runs; a run never starts with a configuration
    /// that would fail halfway through.
    ///
    /// # Errors
    ///
    /// Returns [`QuillError::Config`] describing the first invalid option.
    ///
    /// # Examples
    ///
    /// ```
    /// use quill_core::QuillConfig;
    ///
    /// let mut config = QuillConfig::default();
    /// assert!(config.validate().is_ok());
    ///
    /// config.diff.max_chars = 0;
    /// assert!(config.validate().is_err());
    /// ```
    pub fn validate(&self) -> Result<(), QuillError> {
        if self.diff.max_chars == 0 {
            return Err(QuillError::Config(
                "diff.max_chars must be greater than zero".into(),
            ));
        }
        for pat in &self.diff.ignore_patterns {
            glob::Pattern::new(pat).map_err(|e| {
                QuillError::Config(format!("invalid ignore pattern '{pat}': {e}"))
            })?;
        }
        if !(0.0..=2.0).contains(&self.llm.temperature) {
            return Err(QuillError::Config(format!(
                "llm.temperature must be between 0 and 2, got {}",
                self.llm.temperature
            )));
        }
        if self.ticket.enabled {
            self.ticket.branch_regex()?;
            let base_url = self.ticket.base_url.as_deref().unwrap_or_default();
            if base_url.trim().is_empty() {
                return Err(QuillError::Config(
                    "ticket.base_url is required when ticket integration is enabled".into(),
                ));
            }
        }
        Ok(())
    }
}

/// Which pipeline actions run.
///
/// # Examples
///
/// ```
/// use quill_core::{Action, PipelineConfig};
///
/// let config = PipelineConfig::default();
/// assert_eq!(config.actions, vec![Action::Summary, Action::Review]);
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Enabled actions (default: summary and review).
    #[serde(default = "default_actions")]
    pub actions: Vec<Action>,
}

fn default_actions() -> Vec<Action> {
    vec![Action::Summary, Action::Review]
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            actions: default_actions(),
        }
    }
}

/// Diff filtering and truncation settings.
///
/// # Examples
///
/// ```
/// use quill_core::DiffConfig;
///
/// let config = DiffConfig::default();
/// assert!(config.ignore_patterns.iter().any(|p| p == "Cargo.lock"));
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiffConfig {
    /// Glob patterns; file sections whose path matches any are dropped.
    #[serde(default = "default_ignore_patterns")]
    pub ignore_patterns: Vec<String>,
    /// Character budget for the diff handed to the model (default: 60000).
    #[serde(default = "default_max_chars")]
    pub max_chars: usize,
}

fn default_ignore_patterns() -> Vec<String> {
    [
        "package-lock.json",
        "yarn.lock",
        "Cargo.lock",
        "pnpm-lock.yaml",
        "poetry.lock",
        "Gemfile.lock",
        "composer.lock",
        "go.sum",
        "*.min.js",
        "*.min.css",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

fn default_max_chars() -> usize {
    60_000
}

impl Default for DiffConfig {
    fn default() -> Self {
        Self {
            ignore_patterns: default_ignore_patterns(),
            max_chars: default_max_chars(),
        }
    }
}

/// Ticket tracker (Jira) integration settings.
///
/// # Examples
///
/// ```
/// use quill_core::TicketConfig;
///
/// let config = TicketConfig::default();
/// assert!(!config.enabled);
/// let re = config.branch_regex().unwrap();
/// let caps = re.captures("feature/PAY-42-refunds").unwrap();
/// assert_eq!(&caps[1], "PAY-42");
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TicketConfig {
    /// Whether ticket context is fetched at all (default: false).
    #[serde(default)]
    pub enabled: bool,
    /// Regex applied to the branch name; capture group 1 is the ticket id.
    #[serde(default = "default_branch_pattern")]
    pub branch_pattern: String,
    /// Tracker base URL, e.g. `https://example.atlassian.net`.
    pub base_url: Option<String>,
    /// Account email for basic auth.
    pub email: Option<String>,
    /// API token; falls back to `JIRA_API_TOKEN`.
    pub api_token: Option<String>,
}

fn default_branch_pattern() -> String {
    r"([A-Z][A-Z0-9]+-\d+)".into()
}

impl Default for TicketConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            branch_pattern: default_branch_pattern(),
            base_url: None,
            email: None,
            api_token: None,
        }
    }
}

impl TicketConfig {
    /// Compile the branch pattern.
    ///
    /// # Errors
    ///
    /// Returns [`QuillError::Config`] if the pattern is not a valid regex or
    /// has no capture group to extract the ticket id from.
    pub fn branch_regex(&self) -> Result<regex::Regex, QuillError> {
        let re = regex::Regex::new(&self.branch_pattern).map_err(|e| {
            QuillError::Config(format!(
                "invalid ticket.branch_pattern '{}': {e}",
                self.branch_pattern
            ))
        })?;
        if re.captures_len() < 2 {
            return Err(QuillError::Config(format!(
                "ticket.branch_pattern '{}' needs a capture group for the ticket id",
                self.branch_pattern
            )));
        }
        Ok(re)
    }

    /// API token from config or the `JIRA_API_TOKEN` environment variable.
    pub fn resolved_api_token(&self) -> Option<String> {
        self.api_token
            .clone()
            .or_else(|| std::env::var("JIRA_API_TOKEN").ok())
    }
}

/// LLM provider configuration.
///
/// # Examples
///
/// ```
/// use quill_core::LlmConfig;
///
/// let config = LlmConfig::default();
/// assert_eq!(config.model, "gpt-4o");
/// assert_eq!(config.temperature, 0.2);
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    /// Provider name (e.g. `"openai"`, `"anthropic"`, `"ollama"`).
    #[serde(default = "default_provider")]
    pub provider: String,
    /// Model identifier.
    #[serde(default = "default_model")]
    pub model: String,
    /// API key for the provider.
    pub api_key: Option<String>,
    /// Custom base URL for API requests.
    pub base_url: Option<String>,
    /// Sampling temperature for generation (default: 0.2).
    #[serde(default = "default_temperature")]
    pub temperature: f32,
}

fn default_provider() -> String {
    "openai".into()
}

fn default_model() -> String {
    "gpt-4o".into()
}

fn default_temperature() -> f32 {
    0.2
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            model: default_model(),
            api_key: None,
            base_url: None,
            temperature: default_temperature(),
        }
    }
}

impl LlmConfig {
    /// Environment variable consulted when `api_key` is not set.
    ///
    /// # Examples
    ///
    /// ```
    /// use quill_core::LlmConfig;
    ///
    /// let config = LlmConfig { provider: "anthropic".into(), ..LlmConfig::default() };
    /// assert_eq!(config.api_key_env_var(), "ANTHROPIC_API_KEY");
    /// ```
    pub fn api_key_env_var(&self) -> &'static str {
        match self.provider.as_str() {
            "anthropic" => "ANTHROPIC_API_KEY",
            "gemini" => "GEMINI_API_KEY",
            _ => "OPENAI_API_KEY",
        }
    }

    /// API key from config or the provider's environment variable.
    pub fn resolved_api_key(&self) -> Option<String> {
        self.api_key
            .clone()
            .or_else(|| std::env::var(self.api_key_env_var()).ok())
    }
}

/// GitHub settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GitHubConfig {
    /// Token; falls back to `GITHUB_TOKEN`, then `GH_TOKEN`.
    pub token: Option<String>,
    /// Login the token acts as. Required for app and Actions tokens,
    /// which cannot call `GET /user` (e.g. `"github-actions[bot]"`).
    pub login: Option<String>,
    /// REST API root; defaults to `https://api.github.com`.
    pub api_url: Option<String>,
}

const GITHUB_API_URL: &str = "https://api.github.com";

impl GitHubConfig {
    /// API root with any trailing slash removed.
    ///
    /// # Examples
    ///
    /// ```
    /// use quill_core::GitHubConfig;
    ///
    /// assert_eq!(GitHubConfig::default().api_url(), "https://api.github.com");
    /// let enterprise = GitHubConfig {
    ///     api_url: Some("https://ghe.example.com/api/v3/".into()),
    ///     ..GitHubConfig::default()
    /// };
    /// assert_eq!(enterprise.api_url(), "https://ghe.example.com/api/v3");
    /// ```
    pub fn api_url(&self) -> &str {
        self.api_url
            .as_deref()
            .map(|u| u.trim_end_matches('/'))
            .filter(|u| !u.is_empty())
            .unwrap_or(GITHUB_API_URL)
    }


    /// Token from config or environment.
    pub fn resolved_token(&self) -> Option<String> {
        self.token
            .clone()
            .or_else(|| std::env::var("GITHUB_TOKEN").ok())
            .or_else(|| std::env::var("GH_TOKEN").ok())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_has_expected_values() {
        let config = QuillConfig::default();
        assert_eq!(config.pipeline.actions, vec![Action::Summary, Action::Review]);
        assert_eq!(config.diff.max_chars, 60_000);
        assert!(config.diff.ignore_patterns.contains(&"go.sum".to_string()));
        assert!(!config.ticket.enabled);
        assert_eq!(config.llm.provider, "openai");
        assert_eq!(config.llm.model, "gpt-4o");
        assert!(config.github.token.is_none());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn parse_minimal_toml() {
        let toml = r#"
[pipeline]
actions = ["review"]
"#;
        let config = QuillConfig::from_toml(toml).unwrap();
        assert!(config.is_enabled(Action::Review));
        assert!(!config.is_enabled(Action::Summary));
        assert_eq!(config.diff.max_chars, 60_000);
    }

    #[test]
    fn parse_full_toml() {
        let toml = r#"
[pipeline]
actions = ["summary", "review"]

[diff]
ignore_patterns = ["*.json", "docs/**"]
max_chars = 12000

[ticket]
enabled = true
branch_pattern = "^(?:feature|fix)/([A-Z]+-[0-9]+)"
base_url = "https://example.atlassian.net"
email = "bot@example.com"

[llm]
provider = "anthropic"
model = "claude-sonnet-4-20250514"
base_url = "https://api.anthropic.com"
temperature = 0.0

[github]
token = "ghp_test"
login = "github-actions[bot]"
"#;
        let config = QuillConfig::from_toml(toml).unwrap();
        assert_eq!(config.diff.ignore_patterns, vec!["*.json", "docs/**"]);
        assert_eq!(config.diff.max_chars, 12000);
        assert!(config.ticket.enabled);
        assert_eq!(config.llm.provider, "anthropic");
        assert_eq!(config.llm.temperature, 0.0);
        assert_eq!(config.github.resolved_token().as_deref(), Some("ghp_test"));
        assert_eq!(config.github.login.as_deref(), Some("github-actions[bot]"));
        assert_eq!(config.github.api_url(), "https://api.github.com");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn unknown_action_rejected() {
        let toml = r#"
[pipeline]
actions = ["lint"]
"#;
        assert!(QuillConfig::from_toml(toml).is_err());
    }

    #[test]
    fn validate_rejects_bad_glob() {
        let mut config = QuillConfig::default();
        config.diff.ignore_patterns.push("[unclosed".into());
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("[unclosed"));
    }

    #[test]
    fn validate_rejects_out_of_range_temperature() {
        let mut config = QuillConfig::default();
        config.llm.temperature = 3.5;
        assert!(matches!(config.validate(), Err(QuillError::Config(_))));
    }

    #[test]
    fn validate_ticket_requires_base_url() {
        let mut config = QuillConfig::default();
        config.ticket.enabled = true;
        assert!(config.validate().is_err());
        config.ticket.base_url = Some("https://example.atlassian.net".into());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn branch_pattern_needs_capture_group() {
        let config = TicketConfig {
            branch_pattern: r"[A-Z]+-\d+".into(),
            ..TicketConfig::default()
        };
        assert!(config.branch_regex().is_err());

        let config = TicketConfig {
            branch_pattern: "(".into(),
            ..TicketConfig::default()
        };
        assert!(config.branch_regex().is_err());
    }

    #[test]
    fn ticket_checks_skipped_when_disabled() {
        let mut config = QuillConfig::default();
        config.ticket.branch_pattern = "no-group".into();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn explicit_api_key_wins() {
        let config = LlmConfig {
            api_key: Some("sk-config".into()),
            ..LlmConfig::default()
        };
        assert_eq!(config.resolved_api_key().as_deref(), Some("sk-config"));
    }
}
