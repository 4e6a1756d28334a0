//! `~/.hicloud.toml`: one table per project plus an optional `[console]` table.
//!
//! ```toml
//! [console]
//! history_max_lines = 1000
//!
//! [default]
//! api_token = "..."
//! project_name = "default"
//! ```
//!
//! The file holds API tokens, so on Unix it is only read when its mode is
//! exactly 0600.

use serde::Deserialize;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

pub const CONFIG_FILE_NAME: &str = ".hicloud.toml";
pub const CONSOLE_TABLE: &str = "console";

pub const SAMPLE_CONFIG: &str = r#"# hicloud configuration. Keep this file private: chmod 600.

# Optional console settings.
# [console]
# history_file = "~/.tmp/hicloud/history"
# history_max_lines = 1000
# completion_cache_secs = 10
# api_base_url = "https://api.hetzner.cloud/v1"
# request_timeout_secs = 30

[default]
api_token = "your_api_token_here"
project_name = "default"

[project1]
api_token = "project1_api_token"
project_name = "Production"

[project2]
api_token = "project2_api_token"
project_name = "Development"
"#;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("configuration file not found: {}", .0.display())]
    NotFound(PathBuf),
    #[error("failed to access {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to parse {origin}: {message}")]
    Parse { origin: String, message: String },
    #[error(
        "insecure permissions {mode:#o} on {shown}; run `chmod 600 {shown}`",
        shown = .path.display()
    )]
    Permissions { path: PathBuf, mode: u32 },
    #[error("[{project}] {reason}")]
    InvalidProject { project: String, reason: String },
    #[error("refusing to overwrite existing file {}", .0.display())]
    AlreadyExists(PathBuf),
    #[error("no projects configured")]
    NoProjects,
    #[error("unknown project `{key}`; configured projects: {known}")]
    UnknownProject { key: String, known: String },
}

// ============================================================================
// Schema
// ============================================================================

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ConsoleSettings {
    pub history_file: Option<PathBuf>,
    /// `0` keeps everything.
    pub history_max_lines: usize,
    pub completion_cache_secs: u64,
    pub api_base_url: String,
    pub request_timeout_secs: u64,
}

impl Default for ConsoleSettings {
    fn default() -> Self {
        Self {
            history_file: None,
            history_max_lines: hicloud_console::DEFAULT_HISTORY_MAX_LINES,
            completion_cache_secs: 10,
            api_base_url: hicloud_api::DEFAULT_BASE_URL.to_string(),
            request_timeout_secs: 30,
        }
    }
}

impl ConsoleSettings {
    pub fn history_bound(&self) -> Option<usize> {
        (self.history_max_lines > 0).then_some(self.history_max_lines)
    }

    /// Configured history file with `~` expanded, else the default location.
    pub fn history_path(&self) -> Option<PathBuf> {
        match &self.history_file {
            Some(p) => Some(expand_home(p)),
            None => default_history_path(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ProjectConfig {
    pub api_token: String,
    #[serde(default)]
    pub project_name: Option<String>,
}

impl ProjectConfig {
    pub fn display_name<'a>(&'a self, key: &'a str) -> &'a str {
        self.project_name.as_deref().filter(|n| !n.is_empty()).unwrap_or(key)
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Config {
    pub console: ConsoleSettings,
    /// In file order.
    pub projects: Vec<(String, ProjectConfig)>,
}

impl Config {
    pub fn parse(text: &str, origin: &str) -> Result<Self, ConfigError> {
        let table: toml::Table = toml::from_str(text).map_err(|e| ConfigError::Parse {
            origin: origin.to_string(),
            message: e.to_string(),
        })?;

        let mut config = Config::default();
        for (key, value) in table {
            if key == CONSOLE_TABLE {
                config.console = value.try_into().map_err(|e: toml::de::Error| ConfigError::Parse {
                    origin: format!("{origin} [{CONSOLE_TABLE}]"),
                    message: e.to_string(),
                })?;
                continue;
            }
            if !value.is_table() {
                return Err(ConfigError::InvalidProject {
                    project: key,
                    reason: "is not a table".to_string(),
                });
            }
            let project: ProjectConfig =
                value.try_into().map_err(|e: toml::de::Error| ConfigError::InvalidProject {
                    project: key.clone(),
                    reason: e.message().to_string(),
                })?;
            config.projects.push((key, project));
        }
        Ok(config)
    }

    /// Read `path`, refusing files that other users could read.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Err(ConfigError::NotFound(path.to_path_buf()));
        }
        if let Some(mode) = file_mode(path) {
            if mode != 0o600 {
                return Err(ConfigError::Permissions {
                    path: path.to_path_buf(),
                    mode,
                });
            }
        }
        let text = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let config = Self::parse(&text, &path.display().to_string())?;
        tracing::debug!(path = %path.display(), projects = config.projects.len(), "configuration loaded");
        Ok(config)
    }

    pub fn project(&self, key: &str) -> Option<&ProjectConfig> {
        self.projects.iter().find(|(k, _)| k == key).map(|(_, p)| p)
    }

    /// `key` if given, else `default`, else the first project in the file.
    pub fn select(&self, key: Option<&str>) -> Result<(&str, &ProjectConfig), ConfigError> {
        if self.projects.is_empty() {
            return Err(ConfigError::NoProjects);
        }
        let wanted = key.unwrap_or("default");
        if let Some((k, p)) = self.projects.iter().find(|(k, _)| k == wanted) {
            return Ok((k.as_str(), p));
        }
        match (key, self.projects.first()) {
            (None, Some((k, p))) => Ok((k.as_str(), p)),
            _ => Err(ConfigError::UnknownProject {
                key: wanted.to_string(),
                known: self
                    .projects
                    .iter()
                    .map(|(k, _)| k.as_str())
                    .collect::<Vec<_>>()
                    .join(", "),
            }),
        }
    }
}

/// Write the sample configuration with mode 0600. Never overwrites.
pub fn write_sample(path: &Path) -> Result<(), ConfigError> {
    if path.exists() {
        return Err(ConfigError::AlreadyExists(path.to_path_buf()));
    }
    let io_err = |source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    };
    if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
        fs::create_dir_all(dir).map_err(io_err)?;
    }
    fs::write(path, SAMPLE_CONFIG).map_err(io_err)?;
    restrict_permissions(path).map_err(io_err)?;
    Ok(())
}

// ============================================================================
// Validation
// ============================================================================

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ValidationReport {
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
}

impl ValidationReport {
    pub fn passed(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn summary(&self) -> String {
        if self.passed() {
            format!("Result: OK ({} warning(s))", self.warnings.len())
        } else {
            format!(
                "Result: FAILED ({} error(s), {} warning(s))",
                self.errors.len(),
                self.warnings.len()
            )
        }
    }
}

/// Check a configuration file without loading it: existence, permissions,
/// syntax, required fields and token shape.
pub fn validate(path: &Path) -> ValidationReport {
    let mut report = ValidationReport::default();

    if !path.exists() {
        report
            .errors
            .push(format!("Config file not found: {}", path.display()));
        return report;
    }
    if let Some(mode) = file_mode(path) {
        if mode != 0o600 {
            report.warnings.push(format!(
                "Insecure file permissions {mode:#o}, expected 0o600. Run: chmod 600 {}",
                path.display()
            ));
        }
    }

    let table: toml::Table = match fs::read_to_string(path)
        .map_err(|e| e.to_string())
        .and_then(|text| toml::from_str(&text).map_err(|e: toml::de::Error| e.to_string()))
    {
        Ok(t) => t,
        Err(e) => {
            report.errors.push(format!("TOML parse error: {e}"));
            return report;
        }
    };

    if table.is_empty() {
        report
            .warnings
            .push("Config file is empty, no project sections defined".to_string());
        return report;
    }

    for (name, section) in &table {
        let Some(section) = section.as_table() else {
            report.errors.push(format!("[{name}] is not a table"));
            continue;
        };
        if name == CONSOLE_TABLE {
            if let Err(e) = toml::Value::Table(section.clone()).try_into::<ConsoleSettings>() {
                report.errors.push(format!("[{name}] {}", e.message()));
            }
            continue;
        }
        match section.get("api_token") {
            None => report
                .errors
                .push(format!("[{name}] missing required field: api_token")),
            Some(token) => {
                if !token.as_str().is_some_and(is_plausible_token) {
                    report.warnings.push(format!(
                        "[{name}] api_token format looks suspicious (expected 32-128 characters of [A-Za-z0-9_-])"
                    ));
                }
            }
        }
        if !section.contains_key("project_name") {
            report
                .errors
                .push(format!("[{name}] missing required field: project_name"));
        }
    }
    report
}

pub fn is_plausible_token(token: &str) -> bool {
    (32..=128).contains(&token.len())
        && token
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
}

// ============================================================================
// Paths and permissions
// ============================================================================

pub fn default_config_path() -> Option<PathBuf> {
    dirs::home_dir().map(|h| h.join(CONFIG_FILE_NAME))
}

pub fn default_history_path() -> Option<PathBuf> {
    dirs::home_dir().map(|h| h.join(".tmp").join("hicloud").join("history"))
}

fn expand_home(path: &Path) -> PathBuf {
    match path.strip_prefix("~") {
        Ok(rest) => dirs::home_dir().map_or_else(|| path.to_path_buf(), |h| h.join(rest)),
        Err(_) => path.to_path_buf(),
    }
}

/// Permission bits of `path`; `None` where the platform has none.
pub fn file_mode(path: &Path) -> Option<u32> {
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        fs::metadata(path).ok().map(|m| m.permissions().mode() & 0o777)
    }
    #[cfg(not(unix))]
    {
        let _ = path;
        None
    }
}

fn restrict_permissions(path: &Path) -> io::Result<()> {
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        fs::set_permissions(path, fs::Permissions::from_mode(0o600))
    }
    #[cfg(not(unix))]
    {
        let _ = path;
        Ok(())
    }
}
