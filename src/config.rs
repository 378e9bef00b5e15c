use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// How the argument remainder of a command is handed to the executable.
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum ArgMode {
    /// `[command, word, word, ...]`: remainder split on whitespace.
    #[default]
    Split,
    /// `[command, remainder]`: remainder passed verbatim as one argument.
    Raw,
}

impl std::fmt::Display for ArgMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ArgMode::Split => write!(f, "split"),
            ArgMode::Raw => write!(f, "raw"),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub mattermost: MattermostConfig,
    #[serde(default)]
    pub command: CommandConfig,
    #[serde(default)]
    pub output: OutputConfig,
    #[serde(default)]
    pub issues: IssuesConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct MattermostConfig {
    /// Server base URL, e.g. `https://chat.example.com`
    pub url: String,
    /// Personal access token of the bot account
    pub token: String,
    pub team: String,
    /// Name of the channel commands are accepted on
    pub channel: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct CommandConfig {
    #[serde(default = "default_executable")]
    pub executable: PathBuf,
    /// Directory the executable runs in; defaults to the bot's own
    #[serde(default)]
    pub working_dir: Option<PathBuf>,
    #[serde(default = "default_trigger")]
    pub trigger: String,
    #[serde(default)]
    pub args: ArgMode,
}

impl Default for CommandConfig {
    fn default() -> Self {
        Self {
            executable: default_executable(),
            working_dir: None,
            trigger: default_trigger(),
            args: ArgMode::default(),
        }
    }
}

/// Decoration applied to relayed output lines.
#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct OutputConfig {
    #[serde(default = "default_stdout_prefix")]
    pub stdout_prefix: String,
    #[serde(default = "default_stderr_prefix")]
    pub stderr_prefix: String,
    #[serde(default)]
    pub stdout_emphasis: String,
    #[serde(default = "default_stderr_emphasis")]
    pub stderr_emphasis: String,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            stdout_prefix: default_stdout_prefix(),
            stderr_prefix: default_stderr_prefix(),
            stdout_emphasis: String::new(),
            stderr_emphasis: default_stderr_emphasis(),
        }
    }
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct IssuesConfig {
    /// Link template; every `%s` is replaced with the issue number. Empty disables links.
    #[serde(default)]
    pub link_template: String,
}

fn default_executable() -> PathBuf {
    PathBuf::from("./runbot.sh")
}

fn default_trigger() -> String {
    "=".to_string()
}

fn default_stdout_prefix() -> String {
    "OUT>".to_string()
}

fn default_stderr_prefix() -> String {
    "ERR>".to_string()
}

fn default_stderr_emphasis() -> String {
    ":exclamation: ".to_string()
}

impl Config {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        Self::parse(&content)
    }

    pub fn parse(content: &str) -> Result<Self> {
        let config: Config = toml::from_str(content).context("Failed to parse config file")?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        let url = &self.mattermost.url;
        if !(url.starts_with("http://") || url.starts_with("https://")) {
            anyhow::bail!("mattermost.url must start with http:// or https://, got '{}'", url);
        }
        if self.command.trigger.is_empty() {
            anyhow::bail!("command.trigger must not be empty");
        }
        if self.command.executable.as_os_str().is_empty() {
            anyhow::bail!("command.executable must not be empty");
        }
        Ok(())
    }

    /// Websocket endpoint derived from the server URL (`http` -> `ws`, `https` -> `wss`).
    pub fn websocket_url(&self) -> String {
        let base = self.mattermost.url.trim_end_matches('/');
        let ws = base.replacen("http", "ws", 1);
        format!("{}/api/v4/websocket", ws)
    }
}
