//! Application configuration: TOML file, environment overlay, validation.

use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result, bail};
use arxiv_crawler::api::{DEFAULT_BASE_URL, MAX_RESULTS_PER_REQUEST, default_user_agent};
use arxiv_crawler::download::DEFAULT_FILENAME_PATTERN;
use arxiv_crawler::download::naming::unknown_placeholders;
use serde::{Deserialize, Serialize};

const CONFIG_DIR_NAME: &str = "arxiv-crawler";

/// `[api]` section.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ApiSection {
    pub base_url: String,
    /// Page size for API requests.
    pub max_results_per_query: u32,
    /// Seconds between API requests.
    pub request_delay: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_agent: Option<String>,
    /// Request timeout in seconds.
    pub timeout: u64,
}

impl Default for ApiSection {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            max_results_per_query: 100,
            request_delay: 3.0,
            user_agent: None,
            timeout: 30,
        }
    }
}

/// `[download]` section.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DownloadSection {
    pub output_directory: PathBuf,
    pub max_concurrent_downloads: usize,
    /// Retries after the first attempt.
    pub retry_attempts: u32,
    /// Per-attempt timeout in seconds.
    pub timeout: u64,
    pub filename_pattern: String,
    pub create_category_folders: bool,
}

impl Default for DownloadSection {
    fn default() -> Self {
        Self {
            output_directory: PathBuf::from("./downloaded_papers"),
            max_concurrent_downloads: 5,
            retry_attempts: 3,
            timeout: 60,
            filename_pattern: DEFAULT_FILENAME_PATTERN.to_string(),
            create_category_folders: true,
        }
    }
}

/// `[storage]` section.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct StorageSection {
    pub database_path: PathBuf,
}

impl Default for StorageSection {
    fn default() -> Self {
        Self {
            database_path: PathBuf::from("./arxiv_papers.db"),
        }
    }
}

/// `[logging]` section.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LoggingSection {
    /// One of DEBUG, INFO, WARNING, ERROR (case-insensitive).
    pub level: String,
}

impl Default for LoggingSection {
    fn default() -> Self {
        Self {
            level: "INFO".to_string(),
        }
    }
}

/// Complete configuration; every field has a default.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FileConfig {
    pub api: ApiSection,
    pub download: DownloadSection,
    pub storage: StorageSection,
    pub logging: LoggingSection,
}

impl FileConfig {
    /// Validates config values against runtime constraints.
    pub fn validate(&self) -> Result<()> {
        if !matches!(self.api.base_url.split_once("://"), Some(("http" | "https", rest)) if !rest.is_empty())
        {
            bail!(
                "Invalid config value for `api.base_url`: '{}'. Expected an http(s) URL",
                self.api.base_url
            );
        }
        if !(1..=MAX_RESULTS_PER_REQUEST).contains(&self.api.max_results_per_query) {
            bail!(
                "Invalid config value for `api.max_results_per_query`: {}. Expected range: 1..={MAX_RESULTS_PER_REQUEST}",
                self.api.max_results_per_query
            );
        }
        if !self.api.request_delay.is_finite() || !(0.0..=60.0).contains(&self.api.request_delay)
        {
            bail!(
                "Invalid config value for `api.request_delay`: {}. Expected range: 0..=60 seconds",
                self.api.request_delay
            );
        }
        validate_timeout_secs("api.timeout", self.api.timeout)?;

        if !(1..=100).contains(&self.download.max_concurrent_downloads) {
            bail!(
                "Invalid config value for `download.max_concurrent_downloads`: {}. Expected range: 1..=100",
                self.download.max_concurrent_downloads
            );
        }
        if self.download.retry_attempts > 10 {
            bail!(
                "Invalid config value for `download.retry_attempts`: {}. Expected range: 0..=10",
                self.download.retry_attempts
            );
        }
        validate_timeout_secs("download.timeout", self.download.timeout)?;
        let unknown = unknown_placeholders(&self.download.filename_pattern);
        if !unknown.is_empty() {
            bail!(
                "Invalid config value for `download.filename_pattern`: unknown placeholder(s) {}. Expected: {{year}}, {{first_author}}, {{title}}, {{arxiv_id}}",
                unknown.join(", ")
            );
        }

        if self.storage.database_path.as_os_str().is_empty() {
            bail!("Invalid config value for `storage.database_path`: must not be empty");
        }

        parse_log_level(&self.logging.level)?;
        Ok(())
    }

    /// Applies `ARXIV_*` overrides read through `lookup`.
    pub fn apply_env_overrides<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &str| lookup(name).filter(|value| !value.trim().is_empty());

        if let Some(value) = get("ARXIV_API_BASE_URL") {
            self.api.base_url = value;
        }
        if let Some(value) = get("ARXIV_API_MAX_RESULTS") {
            self.api.max_results_per_query = parse_env("ARXIV_API_MAX_RESULTS", &value)?;
        }
        if let Some(value) = get("ARXIV_API_DELAY") {
            self.api.request_delay = parse_env("ARXIV_API_DELAY", &value)?;
        }
        if let Some(value) = get("ARXIV_API_USER_AGENT") {
            self.api.user_agent = Some(value);
        }
        if let Some(value) = get("ARXIV_API_TIMEOUT") {
            self.api.timeout = parse_env("ARXIV_API_TIMEOUT", &value)?;
        }
        if let Some(value) = get("ARXIV_DOWNLOAD_DIR") {
            self.download.output_directory = PathBuf::from(value);
        }
        if let Some(value) = get("ARXIV_DOWNLOAD_THREADS") {
            self.download.max_concurrent_downloads = parse_env("ARXIV_DOWNLOAD_THREADS", &value)?;
        }
        if let Some(value) = get("ARXIV_DOWNLOAD_RETRIES") {
            self.download.retry_attempts = parse_env("ARXIV_DOWNLOAD_RETRIES", &value)?;
        }
        if let Some(value) = get("ARXIV_DOWNLOAD_TIMEOUT") {
            self.download.timeout = parse_env("ARXIV_DOWNLOAD_TIMEOUT", &value)?;
        }
        if let Some(value) = get("ARXIV_FILENAME_PATTERN") {
            self.download.filename_pattern = value;
        }
        if let Some(value) = get("ARXIV_DATABASE_PATH") {
            self.storage.database_path = PathBuf::from(value);
        }
        if let Some(value) = get("ARXIV_LOG_LEVEL") {
            self.logging.level = value;
        }
        Ok(())
    }

    #[must_use]
    pub fn request_delay(&self) -> Duration {
        Duration::from_secs_f64(self.api.request_delay.max(0.0))
    }

    #[must_use]
    pub fn user_agent(&self) -> String {
        self.api
            .user_agent
            .clone()
            .unwrap_or_else(default_user_agent)
    }

    /// `tracing` directive for the configured level.
    #[must_use]
    pub fn log_directive(&self) -> &'static str {
        parse_log_level(&self.logging.level).unwrap_or("info")
    }

    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).context("Failed to render configuration as TOML")
    }
}

fn validate_timeout_secs(field: &str, value: u64) -> Result<()> {
    if !(1..=3600).contains(&value) {
        bail!("Invalid config value for `{field}`: {value}. Expected range: 1..=3600");
    }
    Ok(())
}

fn parse_log_level(level: &str) -> Result<&'static str> {
    match level.trim().to_ascii_uppercase().as_str() {
        "DEBUG" => Ok("debug"),
        "INFO" => Ok("info"),
        "WARNING" | "WARN" => Ok("warn"),
        "ERROR" => Ok("error"),
        _ => bail!(
            "Invalid config value for `logging.level`: '{level}'. Expected one of: DEBUG, INFO, WARNING, ERROR"
        ),
    }
}

fn parse_env<T>(name: &str, value: &str) -> Result<T>
where
    T: std::str::FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    value
        .trim()
        .parse()
        .with_context(|| format!("Invalid value '{value}' for environment variable {name}"))
}

/// Loaded config metadata.
#[derive(Debug, Clone)]
pub struct LoadedConfig {
    /// Config path consulted, if one could be resolved.
    pub path: Option<PathBuf>,
    pub config: FileConfig,
    pub loaded_from_file: bool,
}

/// Resolves default config path.
///
/// Priority:
/// 1. `$XDG_CONFIG_HOME/arxiv-crawler/config.toml`
/// 2. `$HOME/.config/arxiv-crawler/config.toml`
#[must_use]
pub fn resolve_default_config_path() -> Option<PathBuf> {
    if let Some(xdg_config_home) = env_var_non_empty_os("XDG_CONFIG_HOME") {
        return Some(
            PathBuf::from(xdg_config_home)
                .join(CONFIG_DIR_NAME)
                .join("config.toml"),
        );
    }

    let home = env_var_non_empty_os("HOME")?;
    Some(
        PathBuf::from(home)
            .join(".config")
            .join(CONFIG_DIR_NAME)
            .join("config.toml"),
    )
}

fn env_var_non_empty_os(name: &str) -> Option<std::ffi::OsString> {
    let value = env::var_os(name)?;
    if value.is_empty() { None } else { Some(value) }
}

/// Loads the effective configuration.
///
/// An explicit path must exist; the default path is optional. Environment
/// overrides are applied on top of the file, then the result is validated.
pub fn load_config(explicit: Option<&Path>) -> Result<LoadedConfig> {
    let (path, required) = match explicit {
        Some(path) => (Some(path.to_path_buf()), true),
        None => (resolve_default_config_path(), false),
    };

    let (mut config, loaded_from_file) = match path.as_deref() {
        Some(path_ref) if required || path_ref.exists() => (load_file_config(path_ref)?, true),
        _ => (FileConfig::default(), false),
    };

    config.apply_env_overrides(|name| env::var(name).ok())?;
    config.validate()?;

    Ok(LoadedConfig {
        path,
        config,
        loaded_from_file,
    })
}

fn load_file_config(path: &Path) -> Result<FileConfig> {
    let raw = fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file '{}'", path.display()))?;
    parse_config_str(&raw)
        .with_context(|| format!("Failed to parse config file '{}'", path.display()))
}

pub fn parse_config_str(raw: &str) -> Result<FileConfig> {
    let config: FileConfig = toml::from_str(raw)?;
    Ok(config)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = FileConfig::default();
        config.validate().unwrap();
        assert_eq!(config.api.base_url, "http://export.arxiv.org/api/query");
        assert_eq!(config.download.max_concurrent_downloads, 5);
        assert_eq!(config.log_directive(), "info");
        assert_eq!(config.request_delay(), Duration::from_secs(3));
    }

    #[test]
    fn test_parse_config_partial_sections() {
        let config = parse_config_str(
            r#"
            [download]
            output_directory = "/data/papers"
            create_category_folders = false

            [logging]
            level = "DEBUG"
            "#,
        )
        .unwrap();
        assert_eq!(config.download.output_directory, PathBuf::from("/data/papers"));
        assert!(!config.download.create_category_folders);
        assert_eq!(config.download.retry_attempts, 3);
        assert_eq!(config.log_directive(), "debug");
    }

    #[test]
    fn test_parse_config_rejects_unknown_key() {
        let err = parse_config_str("[api]\nbogus = 1\n").unwrap_err();
        assert!(err.to_string().contains("bogus"), "got: {err}");
    }

    #[test]
    fn test_env_overrides_applied_and_typed() {
        let env: HashMap<&str, &str> = [
            ("ARXIV_API_DELAY", "0.5"),
            ("ARXIV_DOWNLOAD_THREADS", "12"),
            ("ARXIV_DATABASE_PATH", "/tmp/papers.db"),
            ("ARXIV_LOG_LEVEL", "warning"),
        ]
        .into_iter()
        .collect();

        let mut config = FileConfig::default();
        config
            .apply_env_overrides(|name| env.get(name).map(ToString::to_string))
            .unwrap();

        assert_eq!(config.request_delay(), Duration::from_millis(500));
        assert_eq!(config.download.max_concurrent_downloads, 12);
        assert_eq!(config.storage.database_path, PathBuf::from("/tmp/papers.db"));
        assert_eq!(config.log_directive(), "warn");
    }

    #[test]
    fn test_env_override_with_bad_number_names_variable() {
        let mut config = FileConfig::default();
        let err = config
            .apply_env_overrides(|name| (name == "ARXIV_DOWNLOAD_RETRIES").then(|| "many".to_string()))
            .unwrap_err();
        assert!(err.to_string().contains("ARXIV_DOWNLOAD_RETRIES"));
    }

    #[test]
    fn test_validate_rejects_out_of_range_values() {
        let mut config = FileConfig::default();
        config.download.max_concurrent_downloads = 0;
        assert!(config.validate().is_err());

        let mut config = FileConfig::default();
        config.api.max_results_per_query = 5000;
        assert!(config.validate().is_err());

        let mut config = FileConfig::default();
        config.download.filename_pattern = "{venue}".to_string();
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("venue"));

        let mut config = FileConfig::default();
        config.logging.level = "LOUD".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_render_round_trips_through_toml() {
        let rendered = FileConfig::default().to_toml().unwrap();
        assert!(rendered.contains("[download]"));
        assert_eq!(parse_config_str(&rendered).unwrap(), FileConfig::default());
    }
}
