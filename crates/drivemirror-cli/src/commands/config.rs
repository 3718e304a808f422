//! Config command - View and manage DriveMirror configuration
//!
//! Provides the `drivemirror config` CLI command which:
//! 1. Shows the current configuration (YAML or JSON)
//! 2. Sets individual configuration values via dot-notation keys
//! 3. Validates the configuration file and reports errors
//! 4. Prints the configuration file path

use std::path::PathBuf;
use std::str::FromStr;

use anyhow::{Context, Result};
use clap::Subcommand;
use drivemirror_core::config::Config;
use tracing::info;

use super::CommandContext;
use crate::output::OutputFormatter;

#[derive(Debug, Subcommand)]
pub enum ConfigCommand {
    /// Display current configuration
    Show,
    /// Set a configuration value
    Set {
        /// Configuration key (e.g., "sync.concurrency")
        key: String,
        /// New value
        value: String,
    },
    /// Validate configuration file
    Validate,
    /// Print the configuration file path
    Path,
}

const SUPPORTED_KEYS: &[(&str, &str)] = &[
    ("sync.data_dir", "Default mirror destination"),
    ("sync.concurrency", "Concurrent transfers (1-32)"),
    ("sync.timestamped_folders", "true|false"),
    ("retry.max_attempts", "Attempts per request"),
    ("retry.base_delay_ms", "First backoff delay"),
    ("retry.max_delay_ms", "Backoff ceiling"),
    ("network.request_timeout_secs", ""),
    ("network.connect_timeout_secs", ""),
    ("network.refresh_timeout_secs", ""),
    ("rate_limiting.list_requests_per_minute", ""),
    ("rate_limiting.download_requests_per_minute", ""),
    ("rate_limiting.export_requests_per_minute", ""),
    ("auth.credentials_path", "Credential file location"),
    ("auth.client_id", "OAuth client id (none to unset)"),
    ("auth.client_secret", "OAuth client secret (none to unset)"),
    ("auth.redirect_port", "Loopback port for login"),
    ("auth.scopes", "Comma-separated OAuth scopes"),
    ("auth.refresh_margin_secs", "Refresh this long before expiry"),
    ("drive.shared_drive_id", "Shared drive to list (none to unset)"),
    ("logging.level", "trace|debug|info|warn|error"),
    ("logging.format", "pretty|json"),
];

impl ConfigCommand {
    pub async fn execute(&self, ctx: &CommandContext) -> Result<()> {
        let fmt = ctx.formatter();
        match self {
            ConfigCommand::Show => self.execute_show(ctx, &*fmt),
            ConfigCommand::Set { key, value } => self.execute_set(ctx, key, value, &*fmt),
            ConfigCommand::Validate => self.execute_validate(ctx, &*fmt),
            ConfigCommand::Path => {
                if ctx.is_json() {
                    fmt.print_json(&serde_json::json!({
                        "config_path": ctx.config_path.display().to_string(),
                        "exists": ctx.config_path.exists(),
                    }));
                } else {
                    println!("{}", ctx.config_path.display());
                }
                Ok(())
            }
        }
    }

    fn execute_show(&self, ctx: &CommandContext, fmt: &dyn OutputFormatter) -> Result<()> {
        info!(config_path = %ctx.config_path.display(), "Showing configuration");

        if ctx.is_json() {
            let json = serde_json::to_value(&ctx.config)
                .context("Failed to serialize configuration to JSON")?;
            fmt.print_json(&json);
        } else {
            fmt.success(&format!("Configuration ({})", ctx.config_path.display()));
            fmt.info("");
            let yaml = serde_yaml::to_string(&ctx.config)
                .context("Failed to serialize configuration to YAML")?;
            for line in yaml.lines() {
                fmt.info(line);
            }
        }
        Ok(())
    }

    fn execute_set(
        &self,
        ctx: &CommandContext,
        key: &str,
        value: &str,
        fmt: &dyn OutputFormatter,
    ) -> Result<()> {
        let mut config = Config::load_or_default(&ctx.config_path);
        info!(key = %key, value = %value, "Setting configuration value");

        if let Err(e) = apply_config_value(&mut config, key, value) {
            if ctx.is_json() {
                fmt.print_json(&serde_json::json!({
                    "success": false,
                    "key": key,
                    "value": value,
                    "error": e.to_string(),
                }));
            } else {
                fmt.error(&format!("Failed to set '{}': {}", key, e));
                fmt.info("");
                fmt.info("Supported keys:");
                for (name, help) in SUPPORTED_KEYS {
                    if help.is_empty() {
                        fmt.info(&format!("  {}", name));
                    } else {
                        fmt.info(&format!("  {:<45} - {}", name, help));
                    }
                }
            }
            return Ok(());
        }

        let errors: Vec<String> = config.validate().iter().map(|e| e.to_string()).collect();
        if !errors.is_empty() {
            if ctx.is_json() {
                fmt.print_json(&serde_json::json!({
                    "success": false,
                    "key": key,
                    "value": value,
                    "errors": errors,
                }));
            } else {
                fmt.error(&format!("Invalid value for '{}': {}", key, errors.join("; ")));
            }
            return Ok(());
        }

        config
            .save(&ctx.config_path)
            .context("Failed to write configuration file")?;

        if ctx.is_json() {
            fmt.print_json(&serde_json::json!({
                "success": true,
                "key": key,
                "value": value,
                "config_path": ctx.config_path.display().to_string(),
            }));
        } else {
            fmt.success(&format!("Set {} = {}", key, value));
            fmt.info(&format!("Saved to {}", ctx.config_path.display()));
        }
        Ok(())
    }

    fn execute_validate(&self, ctx: &CommandContext, fmt: &dyn OutputFormatter) -> Result<()> {
        let config_path = &ctx.config_path;

        let config = match Config::load(config_path) {
            Ok(cfg) => cfg,
            Err(e) => {
                if !config_path.exists() {
                    if ctx.is_json() {
                        fmt.print_json(&serde_json::json!({
                            "valid": false,
                            "config_path": config_path.display().to_string(),
                            "errors": ["Configuration file not found. Using defaults."],
                        }));
                    } else {
                        fmt.info(&format!(
                            "Configuration file not found at {}",
                            config_path.display()
                        ));
                        fmt.info("Using default configuration. Run 'drivemirror config set <key> <value>' to create one.");
                    }
                    return Ok(());
                }

                if ctx.is_json() {
                    fmt.print_json(&serde_json::json!({
                        "valid": false,
                        "config_path": config_path.display().to_string(),
                        "errors": [format!("Failed to parse configuration: {}", e)],
                    }));
                } else {
                    fmt.error(&format!("Failed to parse configuration: {}", e));
                    fmt.info(&format!("File: {}", config_path.display()));
                }
                return Ok(());
            }
        };

        info!(config_path = %config_path.display(), "Validating configuration");
        let errors = config.validate();

        if ctx.is_json() {
            let error_strings: Vec<String> = errors.iter().map(|e| e.to_string()).collect();
            fmt.print_json(&serde_json::json!({
                "valid": errors.is_empty(),
                "config_path": config_path.display().to_string(),
                "errors": error_strings,
            }));
        } else if errors.is_empty() {
            fmt.success("Configuration is valid");
            fmt.info(&format!("File: {}", config_path.display()));
        } else {
            fmt.error(&format!(
                "Configuration has {} error{}:",
                errors.len(),
                if errors.len() == 1 { "" } else { "s" }
            ));
            fmt.info(&format!("File: {}", config_path.display()));
            fmt.info("");
            for error in &errors {
                fmt.info(&format!("  {} - {}", error.field, error.message));
            }
        }
        Ok(())
    }
}

fn parse<T: FromStr>(key: &str, value: &str) -> Result<T>
where
    T::Err: std::error::Error + Send + Sync + 'static,
{
    value
        .parse::<T>()
        .with_context(|| format!("Invalid value '{}' for {}", value, key))
}

/// `none` or an empty string clears an optional value.
fn optional(value: &str) -> Option<String> {
    if value.is_empty() || value == "none" {
        None
    } else {
        Some(value.to_string())
    }
}

/// Apply a dot-notation key/value pair to a Config struct
fn apply_config_value(config: &mut Config, key: &str, value: &str) -> Result<()> {
    match key {
        // --- sync ---
        "sync.data_dir" => config.sync.data_dir = PathBuf::from(value),
        "sync.concurrency" => config.sync.concurrency = parse(key, value)?,
        "sync.timestamped_folders" => config.sync.timestamped_folders = parse(key, value)?,

        // --- retry ---
        "retry.max_attempts" => config.retry.max_attempts = parse(key, value)?,
        "retry.base_delay_ms" => config.retry.base_delay_ms = parse(key, value)?,
        "retry.max_delay_ms" => config.retry.max_delay_ms = parse(key, value)?,

        // --- network ---
        "network.request_timeout_secs" => config.network.request_timeout_secs = parse(key, value)?,
        "network.connect_timeout_secs" => config.network.connect_timeout_secs = parse(key, value)?,
        "network.refresh_timeout_secs" => config.network.refresh_timeout_secs = parse(key, value)?,

        // --- rate_limiting ---
        "rate_limiting.list_requests_per_minute" => {
            config.rate_limiting.list_requests_per_minute = parse(key, value)?
        }
        "rate_limiting.download_requests_per_minute" => {
            config.rate_limiting.download_requests_per_minute = parse(key, value)?
        }
        "rate_limiting.export_requests_per_minute" => {
            config.rate_limiting.export_requests_per_minute = parse(key, value)?
        }

        // --- auth ---
        "auth.credentials_path" => config.auth.credentials_path = PathBuf::from(value),
        "auth.client_id" => config.auth.client_id = optional(value),
        "auth.client_secret" => config.auth.client_secret = optional(value),
        "auth.redirect_port" => config.auth.redirect_port = parse(key, value)?,
        "auth.scopes" => {
            config.auth.scopes = value
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(String::from)
                .collect()
        }
        "auth.refresh_margin_secs" => config.auth.refresh_margin_secs = parse(key, value)?,

        // --- drive ---
        "drive.shared_drive_id" => config.drive.shared_drive_id = optional(value),

        // --- logging ---
        "logging.level" => config.logging.level = value.to_string(),
        "logging.format" => config.logging.format = value.to_string(),

        _ => anyhow::bail!("Unknown configuration key: '{}'", key),
    }
    Ok(())
}
