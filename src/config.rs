use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::auth::Token;
use crate::error::GitLabError;
use crate::gitlab::wait::WaitOptions;

pub const TOKEN_ENV: &str = "GITLAB_TOKEN";
pub const BASE_URL_ENVS: [&str; 2] = ["GITLAB_BASE_URL", "GITLAB_URL"];
pub const REPO_PATH_ENV: &str = "GITLAB_REPO_PATH";

const CONFIG_DIR_NAME: &str = "gitlab-context";

/// Configuration file structure.
///
/// Values are layered: file defaults, then environment variables, then
/// whatever the command line overrides explicitly.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct Config {
    #[serde(default)]
    pub gitlab: GitLabConfig,

    #[serde(default)]
    pub wait: WaitConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct GitLabConfig {
    /// GitLab personal access token
    pub token: Option<String>,

    /// GitLab instance base URL
    #[serde(default = "default_gitlab_base_url")]
    pub base_url: String,

    /// Repository path used when the caller supplies no workspace roots
    pub repo_path: Option<PathBuf>,

    /// Probe `/version` when the client is built
    #[serde(default = "default_true")]
    pub validate: bool,

    #[serde(default = "default_request_timeout")]
    pub request_timeout_seconds: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct WaitConfig {
    #[serde(default = "default_wait_timeout")]
    pub timeout_seconds: u64,

    #[serde(default = "default_check_interval")]
    pub check_interval_seconds: u64,

    #[serde(default = "default_true")]
    pub include_failed_logs: bool,
}

/// Validated connection settings handed to the HTTP client.
#[derive(Debug, Clone)]
pub struct GitLabSettings {
    /// Base URL without a trailing slash, e.g. `https://gitlab.com`
    pub base_url: String,
    pub token: Token,
    pub request_timeout: Duration,
    pub validate: bool,
}

impl Default for GitLabConfig {
    fn default() -> Self {
        Self {
            token: None,
            base_url: default_gitlab_base_url(),
            repo_path: None,
            validate: true,
            request_timeout_seconds: default_request_timeout(),
        }
    }
}

impl Default for WaitConfig {
    fn default() -> Self {
        Self {
            timeout_seconds: default_wait_timeout(),
            check_interval_seconds: default_check_interval(),
            include_failed_logs: true,
        }
    }
}

fn default_gitlab_base_url() -> String {
    "https://gitlab.com".to_string()
}

fn default_true() -> bool {
    true
}

fn default_request_timeout() -> u64 {
    30
}

fn default_wait_timeout() -> u64 {
    3600
}

fn default_check_interval() -> u64 {
    10
}

impl Config {
    /// Load configuration from a file.
    ///
    /// Searches for configuration files in this order:
    /// 1. Specified path
    /// 2. ./gitlab-context.{toml,json,yaml,yml}
    /// 3. `<config dir>/gitlab-context/config.toml`
    ///
    /// Returns default configuration if no file is found.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        if let Some(path) = path {
            return Self::load_from_path(path);
        }

        let candidates = [
            "gitlab-context.toml",
            "gitlab-context.json",
            "gitlab-context.yaml",
            "gitlab-context.yml",
        ];

        for candidate in &candidates {
            let path = Path::new(candidate);
            if path.exists() {
                return Self::load_from_path(path);
            }
        }

        if let Some(path) = dirs::config_dir().map(|d| d.join(CONFIG_DIR_NAME).join("config.toml")) {
            if path.exists() {
                return Self::load_from_path(&path);
            }
        }

        Ok(Self::default())
    }

    fn load_from_path(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let extension = path.extension().and_then(|ext| ext.to_str()).unwrap_or("");

        match extension {
            "toml" => toml::from_str(&contents)
                .with_context(|| format!("Failed to parse TOML config: {}", path.display())),
            "json" => serde_json::from_str(&contents)
                .with_context(|| format!("Failed to parse JSON config: {}", path.display())),
            "yaml" | "yml" => serde_yaml::from_str(&contents)
                .with_context(|| format!("Failed to parse YAML config: {}", path.display())),
            _ => toml::from_str(&contents)
                .or_else(|_| serde_json::from_str(&contents))
                .or_else(|_| serde_yaml::from_str(&contents))
                .with_context(|| format!("Failed to parse config file: {}", path.display())),
        }
    }

    /// Overlay values from the process environment.
    pub fn apply_env(&mut self) {
        self.apply_env_with(|key| std::env::var(key).ok());
    }

    fn apply_env_with(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(token) = non_empty(TOKEN_ENV) {
            self.gitlab.token = Some(token);
        }
        if let Some(url) = BASE_URL_ENVS.iter().find_map(|key| non_empty(key)) {
            self.gitlab.base_url = url;
        }
        if let Some(path) = non_empty(REPO_PATH_ENV) {
            self.gitlab.repo_path = Some(PathBuf::from(path));
        }
    }
}

impl GitLabConfig {
    /// Validate token and URL, producing settings for the HTTP client.
    pub fn settings(&self) -> crate::error::Result<GitLabSettings> {
        let token = self
            .token
            .as_deref()
            .map(Token::from)
            .filter(|t| !t.is_empty())
            .ok_or_else(|| {
                GitLabError::Configuration(format!(
                    "{TOKEN_ENV} is required. Set it in your environment or config file."
                ))
            })?;

        let base_url = self.base_url.trim().trim_end_matches('/').to_string();
        if !(base_url.starts_with("http://") || base_url.starts_with("https://")) {
            return Err(GitLabError::Configuration(format!(
                "GitLab URL must start with http:// or https://, got: {base_url}"
            )));
        }

        Ok(GitLabSettings {
            base_url,
            token,
            request_timeout: Duration::from_secs(self.request_timeout_seconds),
            validate: self.validate,
        })
    }
}

impl WaitConfig {
    /// A zero `check-interval-seconds` is raised to one second.
    pub fn options(&self) -> WaitOptions {
        WaitOptions {
            timeout: Duration::from_secs(self.timeout_seconds),
            check_interval: Duration::from_secs(self.check_interval_seconds.max(1)),
            include_failed_logs: self.include_failed_logs,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.gitlab.base_url, "https://gitlab.com");
        assert!(config.gitlab.validate);
        assert_eq!(config.gitlab.request_timeout_seconds, 30);
        assert_eq!(config.wait.timeout_seconds, 3600);
        assert_eq!(config.wait.check_interval_seconds, 10);
        assert!(config.wait.include_failed_logs);
    }

    #[test]
    fn test_load_toml_config() {
        let mut temp_file = NamedTempFile::with_suffix(".toml").unwrap();
        let toml_content = r#"
[gitlab]
token = "glpat-test-token"
base-url = "https://gitlab.example.com"
repo-path = "/work/project"
validate = false

[wait]
timeout-seconds = 600
check-interval-seconds = 5
include-failed-logs = false
"#;
        write!(temp_file, "{toml_content}").unwrap();

        let config = Config::load_from_path(temp_file.path()).unwrap();
        assert_eq!(config.gitlab.token.as_deref(), Some("glpat-test-token"));
        assert_eq!(config.gitlab.base_url, "https://gitlab.example.com");
        assert_eq!(config.gitlab.repo_path, Some(PathBuf::from("/work/project")));
        assert!(!config.gitlab.validate);

        let options = config.wait.options();
        assert_eq!(options.timeout, Duration::from_secs(600));
        assert_eq!(options.check_interval, Duration::from_secs(5));
        assert!(!options.include_failed_logs);
    }

    #[test]
    fn test_zero_check_interval_is_raised() {
        let wait = WaitConfig {
            check_interval_seconds: 0,
            ..WaitConfig::default()
        };
        assert_eq!(wait.options().check_interval, Duration::from_secs(1));
    }

    #[test]
    fn test_load_yaml_config() {
        let mut temp_file = NamedTempFile::with_suffix(".yaml").unwrap();
        write!(
            temp_file,
            "gitlab:\n  base-url: https://gitlab.yaml.com\nwait:\n  timeout-seconds: 60\n"
        )
        .unwrap();

        let config = Config::load_from_path(temp_file.path()).unwrap();
        assert_eq!(config.gitlab.base_url, "https://gitlab.yaml.com");
        assert_eq!(config.wait.timeout_seconds, 60);
        assert_eq!(config.wait.check_interval_seconds, 10);
    }

    #[test]
    fn test_load_missing_explicit_path_fails() {
        let result = Config::load(Some(Path::new("definitely-missing-config.toml")));
        assert!(result.is_err());
    }

    #[test]
    fn test_env_overrides_file_values() {
        let env: HashMap<&str, &str> = HashMap::from([
            ("GITLAB_TOKEN", "env-token"),
            ("GITLAB_URL", "https://fallback.example.com"),
            ("GITLAB_BASE_URL", "https://primary.example.com"),
            ("GITLAB_REPO_PATH", "/repos/app"),
        ]);

        let mut config = Config::default();
        config.gitlab.token = Some("file-token".to_string());
        config.apply_env_with(|key| env.get(key).map(ToString::to_string));

        assert_eq!(config.gitlab.token.as_deref(), Some("env-token"));
        assert_eq!(config.gitlab.base_url, "https://primary.example.com");
        assert_eq!(config.gitlab.repo_path, Some(PathBuf::from("/repos/app")));
    }

    #[test]
    fn test_empty_env_values_are_ignored() {
        let mut config = Config::default();
        config.gitlab.token = Some("file-token".to_string());
        config.apply_env_with(|key| (key == "GITLAB_TOKEN").then(String::new));
        assert_eq!(config.gitlab.token.as_deref(), Some("file-token"));
    }

    #[test]
    fn test_settings_require_token() {
        let config = GitLabConfig::default();
        let err = config.settings().unwrap_err();
        assert!(matches!(err, GitLabError::Configuration(ref msg) if msg.contains("GITLAB_TOKEN")));
    }

    #[test]
    fn test_settings_reject_url_without_scheme() {
        let config = GitLabConfig {
            token: Some("t".to_string()),
            base_url: "invalid-url".to_string(),
            ..GitLabConfig::default()
        };
        let err = config.settings().unwrap_err();
        assert!(err.to_string().contains("must start with http"));
    }

    #[test]
    fn test_settings_strip_trailing_slash() {
        let config = GitLabConfig {
            token: Some("t".to_string()),
            base_url: "https://gitlab.com/".to_string(),
            ..GitLabConfig::default()
        };
        let settings = config.settings().unwrap();
        assert_eq!(settings.base_url, "https://gitlab.com");
        assert_eq!(settings.request_timeout, Duration::from_secs(30));
    }
}
