//! Configuration for pagewright.
//!
//! Configuration sources (highest priority first):
//! 1. Environment variables (PAGEWRIGHT_HOME, GITHUB_USER, PROJECT_SECRET,
//!    GIT_AUTHOR_NAME, GIT_AUTHOR_EMAIL, PAGES_POLL_TIMEOUT, PAGES_POLL_INTERVAL)
//! 2. Config file (.pagewright/config.yaml)
//! 3. Defaults (~/.pagewright)
//!
//! Config file discovery:
//! - Searches current directory and parents for .pagewright/config.yaml
//! - `paths.home` is relative to the .pagewright/ directory

use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::Deserialize;

use crate::adapters::GitHubConfig;
use crate::core::{BackoffPolicy, PollSettings};

/// Global cached configuration (stores Result to handle init errors)
static CONFIG: OnceLock<Result<ResolvedConfig, String>> = OnceLock::new();

/// Raw config file schema (matches YAML structure)
#[derive(Debug, Clone, Deserialize)]
pub struct ConfigFile {
    pub version: String,
    #[serde(default)]
    pub paths: PathsConfig,
    #[serde(default)]
    pub github: Option<GitHubSection>,
    #[serde(default)]
    pub poll: Option<PollSection>,
    #[serde(default)]
    pub notify: Option<NotifySection>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct PathsConfig {
    /// State directory (relative to .pagewright/)
    pub home: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GitHubSection {
    pub user: Option<String>,
    pub author_name: Option<String>,
    pub author_email: Option<String>,
    pub command_timeout_seconds: Option<u64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PollSection {
    pub interval_seconds: Option<u64>,
    pub timeout_seconds: Option<u64>,
    pub check_timeout_seconds: Option<u64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NotifySection {
    pub base_delay_ms: Option<u64>,
    pub max_delay_ms: Option<u64>,
    pub max_attempts: Option<u32>,
    pub max_jitter_ms: Option<u64>,
    pub request_timeout_seconds: Option<u64>,
}

/// Resolved configuration with absolute paths
#[derive(Debug, Clone)]
pub struct ResolvedConfig {
    /// Absolute path to the state directory
    pub home: PathBuf,
    /// Path to config file (if found)
    pub config_file: Option<PathBuf>,
    /// Account that owns published repositories
    pub github_user: Option<String>,
    /// Shared secret submissions must carry
    pub project_secret: Option<String>,
    pub author_name: Option<String>,
    pub author_email: Option<String>,
    /// Upper bound for one gh/git command
    pub command_timeout: Duration,
    pub poll: PollSettings,
    pub backoff: BackoffPolicy,
    /// Upper bound for one notification request
    pub request_timeout: Duration,
}

impl ResolvedConfig {
    /// Path of the deployment records log
    pub fn records_path(&self) -> PathBuf {
        self.home.join("records.jsonl")
    }

    /// Settings for the GitHub provider (requires a configured user)
    pub fn github_config(&self) -> Result<GitHubConfig> {
        let owner = self
            .github_user
            .clone()
            .context("GITHUB_USER is not set (env or github.user in config)")?;

        Ok(GitHubConfig {
            owner,
            author_name: self.author_name.clone(),
            author_email: self.author_email.clone(),
            command_timeout: self.command_timeout,
        })
    }
}

/// Find config file by searching current directory and parents
fn find_config_file() -> Option<PathBuf> {
    let mut current = std::env::current_dir().ok()?;

    loop {
        let config_path = current.join(".pagewright").join("config.yaml");
        if config_path.exists() {
            return Some(config_path);
        }

        if !current.pop() {
            break;
        }
    }

    None
}

/// Load and parse config file
fn load_config_file(path: &Path) -> Result<ConfigFile> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    serde_yaml::from_str(&content)
        .with_context(|| format!("Failed to parse config file: {}", path.display()))
}

/// Resolve a path that may be relative to the config file's parent
fn resolve_path(base: &Path, path_str: &str) -> PathBuf {
    let path = PathBuf::from(path_str);
    if path.is_absolute() {
        path
    } else {
        base.join(path)
            .canonicalize()
            .unwrap_or_else(|_| base.join(path_str))
    }
}

/// Parse a numeric environment override
fn env_number<T: std::str::FromStr>(env: &dyn Fn(&str) -> Option<String>, name: &str) -> Result<Option<T>> {
    match env(name) {
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|_| anyhow::anyhow!("{} must be a number, got '{}'", name, raw)),
        None => Ok(None),
    }
}

/// Merge defaults, an optional config file, and environment overrides
fn resolve(
    default_home: PathBuf,
    file: Option<(PathBuf, ConfigFile)>,
    env: &dyn Fn(&str) -> Option<String>,
) -> Result<ResolvedConfig> {
    let (config_file, config) = match file {
        Some((path, config)) => (Some(path), Some(config)),
        None => (None, None),
    };

    let home = if let Some(env_home) = env("PAGEWRIGHT_HOME") {
        PathBuf::from(env_home)
    } else if let (Some(path), Some(home)) = (
        config_file.as_ref(),
        config.as_ref().and_then(|c| c.paths.home.as_ref()),
    ) {
        let dir = path.parent().unwrap_or(Path::new("."));
        resolve_path(dir, home)
    } else {
        default_home
    };

    let github = config.as_ref().and_then(|c| c.github.clone());
    let poll = config.as_ref().and_then(|c| c.poll.clone());
    let notify = config.as_ref().and_then(|c| c.notify.clone());

    let poll_defaults = PollSettings::default();
    let poll = PollSettings {
        interval: env_number::<u64>(env, "PAGES_POLL_INTERVAL")?
            .or(poll.as_ref().and_then(|p| p.interval_seconds))
            .map(Duration::from_secs)
            .unwrap_or(poll_defaults.interval),
        timeout: env_number::<u64>(env, "PAGES_POLL_TIMEOUT")?
            .or(poll.as_ref().and_then(|p| p.timeout_seconds))
            .map(Duration::from_secs)
            .unwrap_or(poll_defaults.timeout),
        check_timeout: poll
            .as_ref()
            .and_then(|p| p.check_timeout_seconds)
            .map(Duration::from_secs)
            .unwrap_or(poll_defaults.check_timeout),
    };

    if poll.interval.is_zero() || poll.timeout.is_zero() {
        anyhow::bail!("Poll interval and timeout must be positive");
    }

    let backoff_defaults = BackoffPolicy::default();
    let backoff = BackoffPolicy {
        base_delay: notify
            .as_ref()
            .and_then(|n| n.base_delay_ms)
            .map(Duration::from_millis)
            .unwrap_or(backoff_defaults.base_delay),
        max_delay: notify
            .as_ref()
            .and_then(|n| n.max_delay_ms)
            .map(Duration::from_millis)
            .unwrap_or(backoff_defaults.max_delay),
        max_attempts: notify
            .as_ref()
            .and_then(|n| n.max_attempts)
            .unwrap_or(backoff_defaults.max_attempts),
        max_jitter: notify
            .as_ref()
            .and_then(|n| n.max_jitter_ms)
            .map(Duration::from_millis)
            .unwrap_or(backoff_defaults.max_jitter),
    };

    if backoff.max_attempts == 0 {
        anyhow::bail!("notify.max_attempts must be at least 1");
    }

    let request_timeout = Duration::from_secs(
        notify
            .as_ref()
            .and_then(|n| n.request_timeout_seconds)
            .unwrap_or(10),
    );

    let github_user = env("GITHUB_USER").or_else(|| github.as_ref().and_then(|g| g.user.clone()));

    Ok(ResolvedConfig {
        home,
        config_file,
        author_name: env("GIT_AUTHOR_NAME")
            .or_else(|| github.as_ref().and_then(|g| g.author_name.clone())),
        author_email: env("GIT_AUTHOR_EMAIL")
            .or_else(|| github.as_ref().and_then(|g| g.author_email.clone())),
        github_user,
        project_secret: env("PROJECT_SECRET"),
        command_timeout: Duration::from_secs(
            github
                .as_ref()
                .and_then(|g| g.command_timeout_seconds)
                .unwrap_or(120),
        ),
        poll,
        backoff,
        request_timeout,
    })
}

/// Load configuration from all sources
fn load_config() -> Result<ResolvedConfig> {
    let default_home = dirs::home_dir()
        .context("Failed to determine home directory")?
        .join(".pagewright");

    let file = match find_config_file() {
        Some(path) => {
            let config = load_config_file(&path)?;
            Some((path, config))
        }
        None => None,
    };

    let env = |name: &str| std::env::var(name).ok().filter(|v| !v.is_empty());
    resolve(default_home, file, &env)
}

/// Get the global configuration (loads once, then cached)
pub fn config() -> Result<&'static ResolvedConfig> {
    let result = CONFIG.get_or_init(|| load_config().map_err(|e| format!("{:#}", e)));

    match result {
        Ok(config) => Ok(config),
        Err(e) => anyhow::bail!("{}", e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;
    use tempfile::TempDir;

    fn env_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name: &str| map.get(name).cloned()
    }

    #[test]
    fn test_defaults_without_file_or_env() {
        let config = resolve(PathBuf::from("/tmp/pw"), None, &env_from(&[])).unwrap();

        assert_eq!(config.home, PathBuf::from("/tmp/pw"));
        assert_eq!(config.records_path(), PathBuf::from("/tmp/pw/records.jsonl"));
        assert_eq!(config.poll, PollSettings::default());
        assert_eq!(config.backoff, BackoffPolicy::default());
        assert_eq!(config.request_timeout, Duration::from_secs(10));
        assert!(config.github_user.is_none());
        assert!(config.github_config().is_err());
    }

    #[test]
    fn test_config_file_parsing() {
        let temp = TempDir::new().unwrap();
        let dir = temp.path().join(".pagewright");
        std::fs::create_dir_all(&dir).unwrap();

        let config_path = dir.join("config.yaml");
        let mut file = std::fs::File::create(&config_path).unwrap();
        writeln!(
            file,
            r#"
version: "1.0"
paths:
  home: ./state
github:
  user: octocat
  command_timeout_seconds: 30
poll:
  interval_seconds: 5
  timeout_seconds: 60
notify:
  max_attempts: 3
  base_delay_ms: 250
"#
        )
        .unwrap();

        let parsed = load_config_file(&config_path).unwrap();
        assert_eq!(parsed.version, "1.0");

        let config = resolve(
            PathBuf::from("/unused"),
            Some((config_path, parsed)),
            &env_from(&[]),
        )
        .unwrap();

        assert_eq!(config.home, dir.join("state"));
        assert_eq!(config.github_user.as_deref(), Some("octocat"));
        assert_eq!(config.command_timeout, Duration::from_secs(30));
        assert_eq!(config.poll.interval, Duration::from_secs(5));
        assert_eq!(config.poll.timeout, Duration::from_secs(60));
        assert_eq!(config.backoff.max_attempts, 3);
        assert_eq!(config.backoff.base_delay, Duration::from_millis(250));
        assert_eq!(config.backoff.max_delay, Duration::from_secs(30));
    }

    #[test]
    fn test_env_overrides() {
        let config = resolve(
            PathBuf::from("/tmp/pw"),
            None,
            &env_from(&[
                ("PAGEWRIGHT_HOME", "/srv/pw"),
                ("GITHUB_USER", "someone"),
                ("PROJECT_SECRET", "s3cret"),
                ("PAGES_POLL_TIMEOUT", "30"),
                ("PAGES_POLL_INTERVAL", "1"),
            ]),
        )
        .unwrap();

        assert_eq!(config.home, PathBuf::from("/srv/pw"));
        assert_eq!(config.project_secret.as_deref(), Some("s3cret"));
        assert_eq!(config.poll.timeout, Duration::from_secs(30));
        assert_eq!(config.poll.interval, Duration::from_secs(1));
        assert_eq!(config.github_config().unwrap().owner, "someone");
    }

    #[test]
    fn test_invalid_numbers_are_rejected() {
        let result = resolve(
            PathBuf::from("/tmp/pw"),
            None,
            &env_from(&[("PAGES_POLL_TIMEOUT", "soon")]),
        );
        assert!(result.is_err());

        let result = resolve(
            PathBuf::from("/tmp/pw"),
            None,
            &env_from(&[("PAGES_POLL_INTERVAL", "0")]),
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_resolve_relative_path() {
        let base = PathBuf::from("/home/user/project");

        assert_eq!(
            resolve_path(&base, "../sibling"),
            PathBuf::from("/home/user/project/../sibling")
        );
        assert_eq!(
            resolve_path(&base, "/absolute/path"),
            PathBuf::from("/absolute/path")
        );
    }
}
