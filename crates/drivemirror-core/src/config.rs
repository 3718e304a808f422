//! Configuration module for DriveMirror.
//!
//! Provides typed configuration structs that map to the YAML configuration file,
//! with loading, validation, defaults, and a builder pattern for programmatic use.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// Scope granting read-only access to the user's Drive
pub const DRIVE_READONLY_SCOPE: &str = "https://www.googleapis.com/auth/drive.readonly";

// ---------------------------------------------------------------------------
// Config struct with sub-sections
// ---------------------------------------------------------------------------

/// Top-level configuration for DriveMirror.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub sync: SyncConfig,
    pub retry: RetryConfig,
    pub network: NetworkConfig,
    pub rate_limiting: RateLimitingConfig,
    pub auth: AuthConfig,
    pub drive: DriveConfig,
    pub logging: LoggingConfig,
}

/// Mirror destination and worker pool settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Directory that holds mirrored trees; cleanup never leaves it.
    pub data_dir: PathBuf,
    /// Number of concurrent fetch workers.
    pub concurrency: usize,
    /// Append `_{YYYYmmdd_HHMMSS}` to named mirror folders.
    pub timestamped_folders: bool,
}

/// Backoff applied to listing, fetch, and token refresh calls.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Total attempts including the first one.
    pub max_attempts: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
}

/// HTTP deadlines.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    pub request_timeout_secs: u64,
    pub connect_timeout_secs: u64,
    pub refresh_timeout_secs: u64,
}

/// Provider rate-limiting settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RateLimitingConfig {
    pub list_requests_per_minute: u32,
    pub download_requests_per_minute: u32,
    pub export_requests_per_minute: u32,
}

/// Authentication / OAuth settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    /// Where the credential record is persisted.
    pub credentials_path: PathBuf,
    /// OAuth client ID. `None` until configured for `drivemirror auth login`.
    pub client_id: Option<String>,
    pub client_secret: Option<String>,
    /// Port of the local redirect listener used during login.
    pub redirect_port: u16,
    pub scopes: Vec<String>,
    /// Refresh the access token when it expires within this many seconds.
    pub refresh_margin_secs: u64,
}

/// Provider-specific listing options.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct DriveConfig {
    /// Restrict listings to one shared drive.
    pub shared_drive_id: Option<String>,
}

/// Logging / tracing settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level: `trace`, `debug`, `info`, `warn`, or `error`.
    pub level: String,
    /// Output format: `pretty` or `json`.
    pub format: String,
}

// ---------------------------------------------------------------------------
// Config::load()
// ---------------------------------------------------------------------------

impl Config {
    /// Load configuration from a YAML file at `path`.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = serde_yaml::from_str(&content)?;
        Ok(config)
    }

    /// Try to load from `path`; fall back to [`Config::default`] on any error.
    pub fn load_or_default(path: &Path) -> Self {
        Self::load(path).unwrap_or_default()
    }

    /// Platform-appropriate default path for the configuration file.
    ///
    /// Typically `$XDG_CONFIG_HOME/drivemirror/config.yaml` on Linux.
    pub fn default_path() -> PathBuf {
        config_dir().join("config.yaml")
    }

    /// Write the configuration as YAML, creating parent directories.
    pub fn save(&self, path: &Path) -> anyhow::Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let yaml = serde_yaml::to_string(self)?;
        std::fs::write(path, yaml)?;
        Ok(())
    }
}

fn config_dir() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("~/.config"))
        .join("drivemirror")
}

// ---------------------------------------------------------------------------
// Defaults
// ---------------------------------------------------------------------------

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            data_dir: dirs::data_local_dir()
                .unwrap_or_else(|| PathBuf::from("~/.local/share"))
                .join("drivemirror")
                .join("downloads"),
            concurrency: 4,
            timestamped_folders: false,
        }
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            base_delay_ms: 1_000,
            max_delay_ms: 30_000,
        }
    }
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            request_timeout_secs: 60,
            connect_timeout_secs: 10,
            refresh_timeout_secs: 30,
        }
    }
}

impl Default for RateLimitingConfig {
    fn default() -> Self {
        Self {
            list_requests_per_minute: 600,
            download_requests_per_minute: 600,
            export_requests_per_minute: 120,
        }
    }
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            credentials_path: config_dir().join("credentials.json"),
            client_id: None,
            client_secret: None,
            redirect_port: 8400,
            scopes: vec![DRIVE_READONLY_SCOPE.to_string()],
            refresh_margin_secs: 300,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "pretty".to_string(),
        }
    }
}

// ---------------------------------------------------------------------------
// Config::validate()
// ---------------------------------------------------------------------------

/// A single validation error found in the configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    /// Dotted path to the offending field, e.g. `"sync.concurrency"`.
    pub field: String,
    /// Human-readable explanation.
    pub message: String,
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// Valid values for `logging.level`.
const VALID_LOG_LEVELS: &[&str] = &["trace", "debug", "info", "warn", "error"];

/// Valid values for `logging.format`.
const VALID_LOG_FORMATS: &[&str] = &["pretty", "json"];

/// Upper bound for `sync.concurrency`.
const MAX_CONCURRENCY: usize = 32;

/// Upper bound for `auth.refresh_margin_secs`; tokens live one hour.
const MAX_REFRESH_MARGIN_SECS: u64 = 3600;

fn positive(errors: &mut Vec<ValidationError>, field: &str, value: u64) {
    if value == 0 {
        errors.push(ValidationError {
            field: field.into(),
            message: "must be greater than 0".into(),
        });
    }
}

impl Config {
    /// Validate the configuration and return all errors found.
    ///
    /// An empty vector means the configuration is valid.
    pub fn validate(&self) -> Vec<ValidationError> {
        let mut errors = Vec::new();

        // --- sync ---
        if self.sync.concurrency == 0 || self.sync.concurrency > MAX_CONCURRENCY {
            errors.push(ValidationError {
                field: "sync.concurrency".into(),
                message: format!("must be in range 1..={MAX_CONCURRENCY}"),
            });
        }

        // --- retry ---
        positive(&mut errors, "retry.max_attempts", self.retry.max_attempts.into());
        positive(&mut errors, "retry.base_delay_ms", self.retry.base_delay_ms);
        positive(&mut errors, "retry.max_delay_ms", self.retry.max_delay_ms);
        if self.retry.base_delay_ms > self.retry.max_delay_ms {
            errors.push(ValidationError {
                field: "retry.base_delay_ms".into(),
                message: format!(
                    "base_delay_ms ({}) must not exceed max_delay_ms ({})",
                    self.retry.base_delay_ms, self.retry.max_delay_ms
                ),
            });
        }

        // --- network ---
        positive(
            &mut errors,
            "network.request_timeout_secs",
            self.network.request_timeout_secs,
        );
        positive(
            &mut errors,
            "network.connect_timeout_secs",
            self.network.connect_timeout_secs,
        );
        positive(
            &mut errors,
            "network.refresh_timeout_secs",
            self.network.refresh_timeout_secs,
        );

        // --- rate_limiting ---
        positive(
            &mut errors,
            "rate_limiting.list_requests_per_minute",
            self.rate_limiting.list_requests_per_minute.into(),
        );
        positive(
            &mut errors,
            "rate_limiting.download_requests_per_minute",
            self.rate_limiting.download_requests_per_minute.into(),
        );
        positive(
            &mut errors,
            "rate_limiting.export_requests_per_minute",
            self.rate_limiting.export_requests_per_minute.into(),
        );

        // --- auth ---
        positive(&mut errors, "auth.redirect_port", self.auth.redirect_port.into());
        if self.auth.scopes.is_empty() {
            errors.push(ValidationError {
                field: "auth.scopes".into(),
                message: "at least one scope is required".into(),
            });
        }
        if self.auth.refresh_margin_secs >= MAX_REFRESH_MARGIN_SECS {
            errors.push(ValidationError {
                field: "auth.refresh_margin_secs".into(),
                message: format!("must be less than {MAX_REFRESH_MARGIN_SECS}"),
            });
        }

        // --- drive ---
        if let Some(id) = &self.drive.shared_drive_id {
            if id.trim().is_empty() {
                errors.push(ValidationError {
                    field: "drive.shared_drive_id".into(),
                    message: "must not be blank when set".into(),
                });
            }
        }

        // --- logging ---
        if !VALID_LOG_LEVELS.contains(&self.logging.level.as_str()) {
            errors.push(ValidationError {
                field: "logging.level".into(),
                message: format!(
                    "invalid level '{}'; valid options: {}",
                    self.logging.level,
                    VALID_LOG_LEVELS.join(", ")
                ),
            });
        }
        if !VALID_LOG_FORMATS.contains(&self.logging.format.as_str()) {
            errors.push(ValidationError {
                field: "logging.format".into(),
                message: format!(
                    "invalid format '{}'; valid options: {}",
                    self.logging.format,
                    VALID_LOG_FORMATS.join(", ")
                ),
            });
        }

        errors
    }
}

// ---------------------------------------------------------------------------
// ConfigBuilder
// ---------------------------------------------------------------------------

/// Builder for constructing a [`Config`] programmatically.
///
/// Starts from [`Config::default`] and allows selective overrides.
///
/// # Example
///
/// ```rust,no_run
/// use drivemirror_core::config::ConfigBuilder;
/// use std::path::PathBuf;
///
/// let config = ConfigBuilder::new()
///     .sync_data_dir(PathBuf::from("/srv/mirror"))
///     .sync_concurrency(8)
///     .logging_level("debug")
///     .build();
/// ```
#[derive(Debug, Clone)]
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    /// Create a new builder initialised with [`Config::default`] values.
    pub fn new() -> Self {
        Self {
            config: Config::default(),
        }
    }

    // --- sync ---

    pub fn sync_data_dir(mut self, dir: PathBuf) -> Self {
        self.config.sync.data_dir = dir;
        self
    }

    pub fn sync_concurrency(mut self, n: usize) -> Self {
        self.config.sync.concurrency = n;
        self
    }

    pub fn sync_timestamped_folders(mut self, enabled: bool) -> Self {
        self.config.sync.timestamped_folders = enabled;
        self
    }

    // --- retry ---

    pub fn retry_max_attempts(mut self, n: u32) -> Self {
        self.config.retry.max_attempts = n;
        self
    }

    pub fn retry_base_delay_ms(mut self, ms: u64) -> Self {
        self.config.retry.base_delay_ms = ms;
        self
    }

    pub fn retry_max_delay_ms(mut self, ms: u64) -> Self {
        self.config.retry.max_delay_ms = ms;
        self
    }

    // --- network ---

    pub fn network_request_timeout_secs(mut self, secs: u64) -> Self {
        self.config.network.request_timeout_secs = secs;
        self
    }

    pub fn network_refresh_timeout_secs(mut self, secs: u64) -> Self {
        self.config.network.refresh_timeout_secs = secs;
        self
    }

    // --- rate_limiting ---

    pub fn rate_limiting_list_requests_per_minute(mut self, n: u32) -> Self {
        self.config.rate_limiting.list_requests_per_minute = n;
        self
    }

    pub fn rate_limiting_download_requests_per_minute(mut self, n: u32) -> Self {
        self.config.rate_limiting.download_requests_per_minute = n;
        self
    }

    pub fn rate_limiting_export_requests_per_minute(mut self, n: u32) -> Self {
        self.config.rate_limiting.export_requests_per_minute = n;
        self
    }

    // --- auth ---

    pub fn auth_credentials_path(mut self, path: PathBuf) -> Self {
        self.config.auth.credentials_path = path;
        self
    }

    pub fn auth_client(
        mut self,
        client_id: impl Into<String>,
        client_secret: Option<String>,
    ) -> Self {
        self.config.auth.client_id = Some(client_id.into());
        self.config.auth.client_secret = client_secret;
        self
    }

    pub fn auth_redirect_port(mut self, port: u16) -> Self {
        self.config.auth.redirect_port = port;
        self
    }

    pub fn auth_refresh_margin_secs(mut self, secs: u64) -> Self {
        self.config.auth.refresh_margin_secs = secs;
        self
    }

    // --- drive ---

    pub fn drive_shared_drive_id(mut self, id: impl Into<String>) -> Self {
        self.config.drive.shared_drive_id = Some(id.into());
        self
    }

    // --- logging ---

    pub fn logging_level(mut self, level: impl Into<String>) -> Self {
        self.config.logging.level = level.into();
        self
    }

    pub fn logging_format(mut self, format: impl Into<String>) -> Self {
        self.config.logging.format = format.into();
        self
    }

    // --- build ---

    /// Consume the builder and return the finished [`Config`].
    pub fn build(self) -> Config {
        self.config
    }

    /// Build and validate in one step. Returns `Err` with the list of
    /// validation errors if the configuration is invalid.
    pub fn build_validated(self) -> Result<Config, Vec<ValidationError>> {
        let config = self.build();
        let errors = config.validate();
        if errors.is_empty() {
            Ok(config)
        } else {
            Err(errors)
        }
    }
}

impl Default for ConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}
