//! Auth commands - Login, Logout, and Status for Google Drive authentication
//!
//! Provides the `drivemirror auth` CLI subcommands which:
//! 1. `login`  - Runs the OAuth2 PKCE flow and stores the credential file.
//! 2. `logout` - Deletes the stored credential.
//! 3. `status` - Shows whether a credential exists and when it expires.

use anyhow::{Context, Result};
use chrono::Utc;
use clap::Subcommand;
use drivemirror_drive::auth::{DriveAuthenticator, OAuth2Config};
use tracing::info;

use super::CommandContext;
use crate::output::OutputFormatter;

#[derive(Debug, Subcommand)]
pub enum AuthCommand {
    /// Authenticate with Google Drive via OAuth2
    Login {
        /// OAuth client id (overrides auth.client_id)
        #[arg(long)]
        client_id: Option<String>,
        /// OAuth client secret (overrides auth.client_secret)
        #[arg(long)]
        client_secret: Option<String>,
        /// Loopback port for the redirect (overrides auth.redirect_port)
        #[arg(long)]
        port: Option<u16>,
    },
    /// Remove stored credentials
    Logout,
    /// Check authentication status
    Status,
}

impl AuthCommand {
    pub async fn execute(&self, ctx: &CommandContext) -> Result<()> {
        let fmt = ctx.formatter();
        match self {
            AuthCommand::Login {
                client_id,
                client_secret,
                port,
            } => {
                self.execute_login(
                    ctx,
                    client_id.as_deref(),
                    client_secret.as_deref(),
                    *port,
                    &*fmt,
                )
                .await
            }
            AuthCommand::Logout => self.execute_logout(ctx, &*fmt).await,
            AuthCommand::Status => self.execute_status(ctx, &*fmt).await,
        }
    }

    async fn execute_login(
        &self,
        ctx: &CommandContext,
        client_id: Option<&str>,
        client_secret: Option<&str>,
        port: Option<u16>,
        fmt: &dyn OutputFormatter,
    ) -> Result<()> {
        let mut settings = ctx.config.auth.clone();
        if let Some(id) = client_id {
            settings.client_id = Some(id.to_string());
        }

        let mut oauth = OAuth2Config::from_settings(&settings)
            .context("Use --client-id or set auth.client_id in the config file")?;
        if let Some(secret) = client_secret {
            oauth = oauth.with_client_secret(secret);
        }
        if let Some(port) = port {
            oauth = oauth.with_redirect_port(port);
        }

        info!(client_id = %oauth.client_id, port = oauth.redirect_port, "Starting OAuth2 login");

        fmt.info("Opening browser for Google sign-in...");
        let credential = DriveAuthenticator::new(oauth)
            .login(|url| {
                fmt.info("If the browser does not open, visit:");
                fmt.info(url);
            })
            .await
            .context("OAuth2 login failed")?;

        let credentials = ctx.credentials()?;
        credentials
            .replace(credential.clone())
            .await
            .context("Failed to store credential")?;

        if ctx.is_json() {
            fmt.print_json(&serde_json::json!({
                "success": true,
                "credentials_path": ctx.config.auth.credentials_path.display().to_string(),
                "expiry": credential.expiry,
                "scopes": credential.scopes,
            }));
        } else {
            fmt.success("Authenticated with Google Drive");
            fmt.info(&format!(
                "Credential saved to {}",
                ctx.config.auth.credentials_path.display()
            ));
        }
        Ok(())
    }

    async fn execute_logout(&self, ctx: &CommandContext, fmt: &dyn OutputFormatter) -> Result<()> {
        let credentials = ctx.credentials()?;
        let status = credentials.status().await?;
        if !status.present {
            fmt.info("No credential stored. Nothing to log out.");
            return Ok(());
        }

        info!(path = %ctx.config.auth.credentials_path.display(), "Logging out");
        credentials
            .clear()
            .await
            .context("Failed to remove stored credential")?;

        fmt.success("Logged out");
        Ok(())
    }

    async fn execute_status(&self, ctx: &CommandContext, fmt: &dyn OutputFormatter) -> Result<()> {
        let status = ctx.credentials()?.status().await?;

        if ctx.is_json() {
            fmt.print_json(&serde_json::to_value(&status)?);
            return Ok(());
        }

        if !status.present {
            fmt.warn("Not authenticated. Run 'drivemirror auth login'.");
            return Ok(());
        }

        if status.expired && !status.refreshable {
            fmt.warn("Credential expired and cannot be refreshed. Run 'drivemirror auth login'.");
        } else {
            fmt.success("Authenticated");
        }

        if let Some(client_id) = &status.client_id {
            fmt.info(&format!("Client:  {}", client_id));
        }
        if let Some(expiry) = status.expiry {
            let remaining = expiry - Utc::now();
            let state = if status.expired {
                "expired".to_string()
            } else {
                format!("in {} min", remaining.num_minutes())
            };
            fmt.info(&format!("Expires: {} ({})", expiry.to_rfc3339(), state));
        }
        fmt.info(&format!(
            "Refresh: {}",
            if status.refreshable { "available" } else { "none" }
        ));
        if !status.scopes.is_empty() {
            fmt.info(&format!("Scopes:  {}", status.scopes.join(" ")));
        }
        Ok(())
    }
}
