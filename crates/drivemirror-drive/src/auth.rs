//! OAuth2 login and token refresh for Google Drive
//!
//! Implements the Authorization Code flow with PKCE (RFC 7636) for an
//! installed application, plus the refresh-token grant used by the sync
//! engine to keep access tokens fresh.
//!
//! ## Components
//!
//! - [`OAuth2Config`] - Client registration and endpoints
//! - [`AuthorizationFlow`] - PKCE challenge generation and code exchange
//! - [`LocalCallbackServer`] - Minimal HTTP listener for the OAuth redirect
//! - [`DriveAuthenticator`] - Orchestrates the interactive login
//! - [`OAuth2TokenRefresher`] - `ITokenRefresher` over the token endpoint
//!
//! Google only issues a refresh token when the authorization request carries
//! `access_type=offline`, and only re-issues one on repeated consent when it
//! also carries `prompt=consent`. Both are always sent.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::Utc;
use drivemirror_core::config::{AuthConfig, NetworkConfig};
use drivemirror_core::domain::Credential;
use drivemirror_core::ports::{ITokenRefresher, RefreshError, RefreshedToken};
use oauth2::basic::{BasicClient, BasicErrorResponse, BasicErrorResponseType};
use oauth2::{
    AuthType, AuthUrl, AuthorizationCode, ClientId, ClientSecret, CsrfToken, EndpointNotSet,
    EndpointSet, PkceCodeChallenge, PkceCodeVerifier, RedirectUrl, RefreshToken,
    RequestTokenError, Scope, TokenResponse, TokenUrl,
};
use thiserror::Error;
use tokio::net::TcpListener;
use tracing::{debug, info, warn};

/// Google OAuth2 authorization endpoint
pub const GOOGLE_AUTH_URL: &str = "https://accounts.google.com/o/oauth2/auth";

/// Google OAuth2 token endpoint
pub const GOOGLE_TOKEN_URL: &str = "https://oauth2.googleapis.com/token";

/// Path the browser is redirected to after consent
const CALLBACK_PATH: &str = "/callback";

/// Client with authorization and token endpoints configured
type AuthClient =
    BasicClient<EndpointSet, EndpointNotSet, EndpointNotSet, EndpointNotSet, EndpointSet>;

/// Login failures that are not transport errors
#[derive(Debug, Error, PartialEq, Eq)]
pub enum LoginError {
    #[error("no OAuth client id configured (set auth.client_id in the config file)")]
    MissingClientId,

    #[error("authorization denied: {0}")]
    Denied(String),

    #[error("callback state does not match the authorization request")]
    StateMismatch,
}

// ============================================================================
// OAuth2Config
// ============================================================================

/// Configuration for the OAuth2 PKCE authentication flow
#[derive(Debug, Clone)]
pub struct OAuth2Config {
    pub client_id: String,
    /// Google desktop clients are issued a secret that is not confidential
    pub client_secret: Option<String>,
    pub redirect_port: u16,
    pub scopes: Vec<String>,
    pub auth_url: String,
    pub token_url: String,
}

impl OAuth2Config {
    /// Creates a config for `client_id` against Google's endpoints
    pub fn new(client_id: impl Into<String>) -> Self {
        let defaults = AuthConfig::default();
        Self {
            client_id: client_id.into(),
            client_secret: None,
            redirect_port: defaults.redirect_port,
            scopes: defaults.scopes,
            auth_url: GOOGLE_AUTH_URL.to_string(),
            token_url: GOOGLE_TOKEN_URL.to_string(),
        }
    }

    /// Builds the config from the `auth` settings section.
    pub fn from_settings(settings: &AuthConfig) -> Result<Self, LoginError> {
        let client_id = settings
            .client_id
            .as_deref()
            .filter(|id| !id.trim().is_empty())
            .ok_or(LoginError::MissingClientId)?;

        Ok(Self {
            client_secret: settings.client_secret.clone(),
            redirect_port: settings.redirect_port,
            scopes: settings.scopes.clone(),
            ..Self::new(client_id)
        })
    }

    pub fn with_client_secret(mut self, secret: impl Into<String>) -> Self {
        self.client_secret = Some(secret.into());
        self
    }

    pub fn with_scopes(mut self, scopes: Vec<String>) -> Self {
        self.scopes = scopes;
        self
    }

    pub fn with_redirect_port(mut self, port: u16) -> Self {
        self.redirect_port = port;
        self
    }

    pub fn with_token_url(mut self, url: impl Into<String>) -> Self {
        self.token_url = url.into();
        self
    }

    /// Loopback redirect URI registered with the authorization request
    pub fn redirect_uri(&self) -> String {
        format!("http://127.0.0.1:{}{}", self.redirect_port, CALLBACK_PATH)
    }
}

// ============================================================================
// AuthorizationFlow
// ============================================================================

/// PKCE challenge generation and authorization code exchange
pub struct AuthorizationFlow {
    client: AuthClient,
    config: OAuth2Config,
}

impl AuthorizationFlow {
    pub fn new(config: &OAuth2Config) -> Result<Self> {
        let mut client = BasicClient::new(ClientId::new(config.client_id.clone()))
            .set_auth_uri(AuthUrl::new(config.auth_url.clone()).context("Invalid authorization URL")?)
            .set_token_uri(TokenUrl::new(config.token_url.clone()).context("Invalid token URL")?)
            .set_redirect_uri(
                RedirectUrl::new(config.redirect_uri()).context("Invalid redirect URI")?,
            )
            .set_auth_type(AuthType::RequestBody);
        if let Some(secret) = &config.client_secret {
            client = client.set_client_secret(ClientSecret::new(secret.clone()));
        }

        Ok(Self {
            client,
            config: config.clone(),
        })
    }

    /// Generates an authorization URL with a PKCE challenge
    ///
    /// Returns `(authorization_url, csrf_token, pkce_verifier)`. The verifier
    /// must be kept until the code exchange.
    pub fn generate_auth_url(&self) -> (String, CsrfToken, PkceCodeVerifier) {
        let (pkce_challenge, pkce_verifier) = PkceCodeChallenge::new_random_sha256();

        let mut auth_request = self
            .client
            .authorize_url(CsrfToken::new_random)
            .add_extra_param("access_type", "offline")
            .add_extra_param("prompt", "consent");

        for scope in &self.config.scopes {
            auth_request = auth_request.add_scope(Scope::new(scope.clone()));
        }

        let (auth_url, csrf_token) = auth_request.set_pkce_challenge(pkce_challenge).url();

        debug!("Generated authorization URL");
        (auth_url.to_string(), csrf_token, pkce_verifier)
    }

    /// Exchanges an authorization code for a complete credential record.
    pub async fn exchange_code(
        &self,
        code: String,
        pkce_verifier: PkceCodeVerifier,
    ) -> Result<Credential> {
        info!("Exchanging authorization code for tokens");

        let http_client = token_http_client(None)?;
        let token_result = self
            .client
            .exchange_code(AuthorizationCode::new(code))
            .set_pkce_verifier(pkce_verifier)
            .request_async(&http_client)
            .await
            .context("Failed to exchange authorization code")?;

        let scopes = match token_result.scopes() {
            Some(granted) => granted.iter().map(|s| s.as_str().to_string()).collect(),
            None => self.config.scopes.iter().cloned().collect(),
        };

        let template = Credential {
            access_token: String::new(),
            refresh_token: None,
            token_uri: self.config.token_url.clone(),
            client_id: self.config.client_id.clone(),
            client_secret: self.config.client_secret.clone(),
            scopes,
            expiry: Utc::now(),
        };
        let credential = template.with_refreshed(
            token_result.access_token().secret().to_string(),
            token_result.expires_in(),
            token_result.refresh_token().map(|t| t.secret().to_string()),
            Utc::now(),
        );

        if credential.usable_refresh_token().is_none() {
            warn!("Token endpoint did not return a refresh token; the login will expire");
        }

        info!("Successfully obtained OAuth tokens");
        Ok(credential)
    }
}

/// HTTP client for the token endpoint. Redirects are disabled to avoid
/// forwarding credentials to another host.
fn token_http_client(timeout: Option<Duration>) -> Result<reqwest::Client> {
    let mut builder = reqwest::Client::builder().redirect(reqwest::redirect::Policy::none());
    if let Some(timeout) = timeout {
        builder = builder.timeout(timeout);
    }
    builder.build().context("Failed to build token endpoint client")
}

// ============================================================================
// LocalCallbackServer
// ============================================================================

/// Parameters extracted from a successful OAuth2 callback
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallbackParams {
    pub code: String,
    pub state: String,
}

/// What the provider sent back to the redirect URI
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CallbackResult {
    Authorized(CallbackParams),
    /// The user declined consent or the provider refused the request
    Denied(String),
}

/// Minimal HTTP server that waits on the loopback interface for the OAuth2
/// redirect.
///
/// Requests to any other path (browsers ask for `/favicon.ico`) get a 404 and
/// the server keeps waiting.
pub struct LocalCallbackServer {
    listener: TcpListener,
}

impl LocalCallbackServer {
    /// Binds `127.0.0.1:{port}`. Bind before opening the browser so the
    /// redirect cannot race the listener.
    pub async fn bind(port: u16) -> Result<Self> {
        let listener = TcpListener::bind(("127.0.0.1", port))
            .await
            .with_context(|| format!("Failed to bind callback server to 127.0.0.1:{}", port))?;
        Ok(Self { listener })
    }

    pub fn from_listener(listener: TcpListener) -> Self {
        Self { listener }
    }

    pub fn local_port(&self) -> Result<u16> {
        Ok(self.listener.local_addr()?.port())
    }

    /// Serves connections until a callback carrying a code or an error arrives.
    pub async fn wait(self) -> Result<CallbackResult> {
        use http_body_util::Full;
        use hyper::body::Bytes;
        use hyper::header::{HeaderValue, CONTENT_TYPE};
        use hyper::server::conn::http1;
        use hyper::service::service_fn;
        use hyper::{Request, Response, StatusCode};
        use hyper_util::rt::TokioIo;
        use tokio::sync::{oneshot, Mutex};

        let (tx, mut rx) = oneshot::channel::<CallbackResult>();
        let tx = Arc::new(Mutex::new(Some(tx)));

        loop {
            tokio::select! {
                received = &mut rx => {
                    let result = received
                        .context("Callback server channel closed without receiving parameters")?;
                    info!("Received OAuth callback");
                    return Ok(result);
                }
                accepted = self.listener.accept() => {
                    let (stream, _addr) = accepted
                        .context("Failed to accept connection on callback server")?;
                    let io = TokioIo::new(stream);
                    let tx = tx.clone();

                    let service = service_fn(move |req: Request<hyper::body::Incoming>| {
                        let tx = tx.clone();
                        async move {
                            debug!(path = req.uri().path(), "Callback server received request");

                            let (status, html) = if req.uri().path() != CALLBACK_PATH {
                                (StatusCode::NOT_FOUND, error_html("Not found"))
                            } else {
                                match parse_callback(req.uri().query().unwrap_or_default()) {
                                    Some(result) => {
                                        let page = match &result {
                                            CallbackResult::Authorized(_) => {
                                                (StatusCode::OK, success_html())
                                            }
                                            CallbackResult::Denied(reason) => {
                                                (StatusCode::OK, error_html(reason))
                                            }
                                        };
                                        if let Some(sender) = tx.lock().await.take() {
                                            let _ = sender.send(result);
                                        }
                                        page
                                    }
                                    None => (
                                        StatusCode::BAD_REQUEST,
                                        error_html("Missing authorization code in callback"),
                                    ),
                                }
                            };

                            let mut response = Response::new(Full::new(Bytes::from(html)));
                            *response.status_mut() = status;
                            response.headers_mut().insert(
                                CONTENT_TYPE,
                                HeaderValue::from_static("text/html; charset=utf-8"),
                            );
                            Ok::<_, hyper::Error>(response)
                        }
                    });

                    tokio::spawn(async move {
                        if let Err(e) = http1::Builder::new().serve_connection(io, service).await {
                            warn!("Callback server connection error: {}", e);
                        }
                    });
                }
            }
        }
    }
}

/// Parses the query string of a callback request.
fn parse_callback(query: &str) -> Option<CallbackResult> {
    let mut code = None;
    let mut state = None;
    let mut error = None;

    for (key, value) in url::form_urlencoded::parse(query.as_bytes()) {
        match key.as_ref() {
            "code" => code = Some(value.into_owned()),
            "state" => state = Some(value.into_owned()),
            "error" => error = Some(value.into_owned()),
            _ => {}
        }
    }

    if let Some(error) = error {
        return Some(CallbackResult::Denied(error));
    }

    Some(CallbackResult::Authorized(CallbackParams {
        code: code?,
        state: state.unwrap_or_default(),
    }))
}

fn success_html() -> String {
    r#"<!DOCTYPE html>
<html>
<head><title>drivemirror - Authentication Successful</title></head>
<body style="font-family: sans-serif; text-align: center; padding-top: 50px;">
    <h1>Authentication Successful</h1>
    <p>drivemirror can now read your Google Drive.</p>
    <p>You can close this window and return to the terminal.</p>
</body>
</html>"#
        .to_string()
}

fn error_html(message: &str) -> String {
    format!(
        r#"<!DOCTYPE html>
<html>
<head><title>drivemirror - Authentication Error</title></head>
<body style="font-family: sans-serif; text-align: center; padding-top: 50px;">
    <h1>Authentication Error</h1>
    <p>{}</p>
    <p>Please close this window and try again.</p>
</body>
</html>"#,
        message
    )
}

// ============================================================================
// DriveAuthenticator
// ============================================================================

/// Interactive login:
///
/// 1. Binds the loopback callback listener
/// 2. Opens the browser on the consent page (the URL is also handed to the caller)
/// 3. Waits for the redirect and checks the CSRF state
/// 4. Exchanges the code for a credential
pub struct DriveAuthenticator {
    config: OAuth2Config,
}

impl DriveAuthenticator {
    pub fn new(config: OAuth2Config) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &OAuth2Config {
        &self.config
    }

    /// Runs the login. `announce` receives the authorization URL so the caller
    /// can print it for headless sessions.
    pub async fn login(&self, announce: impl FnOnce(&str)) -> Result<Credential> {
        info!("Starting OAuth2 PKCE login flow");

        let flow = AuthorizationFlow::new(&self.config)?;
        let server = LocalCallbackServer::bind(self.config.redirect_port).await?;
        let (auth_url, csrf_token, pkce_verifier) = flow.generate_auth_url();

        announce(&auth_url);
        if let Err(e) = webbrowser::open(&auth_url) {
            warn!(error = %e, "Could not open a browser; open the URL manually");
        }

        match server.wait().await? {
            CallbackResult::Denied(reason) => Err(LoginError::Denied(reason).into()),
            CallbackResult::Authorized(params) => {
                if params.state != *csrf_token.secret() {
                    return Err(LoginError::StateMismatch.into());
                }
                let credential = flow.exchange_code(params.code, pkce_verifier).await?;
                info!("OAuth2 PKCE login completed successfully");
                Ok(credential)
            }
        }
    }
}

// ============================================================================
// OAuth2TokenRefresher
// ============================================================================

/// Refresh-token grant against the endpoint recorded in the credential
pub struct OAuth2TokenRefresher {
    http: reqwest::Client,
}

impl OAuth2TokenRefresher {
    pub fn new(timeout: Duration) -> Result<Self> {
        Ok(Self {
            http: token_http_client(Some(timeout))?,
        })
    }

    pub fn from_config(network: &NetworkConfig) -> Result<Self> {
        Self::new(Duration::from_secs(network.refresh_timeout_secs))
    }
}

#[async_trait::async_trait]
impl ITokenRefresher for OAuth2TokenRefresher {
    async fn refresh(&self, credential: &Credential) -> Result<RefreshedToken, RefreshError> {
        let refresh_token = credential
            .usable_refresh_token()
            .ok_or_else(|| RefreshError::Rejected("credential has no refresh token".into()))?;
        let token_url = TokenUrl::new(credential.token_uri.clone())
            .map_err(|e| RefreshError::Rejected(format!("invalid token endpoint: {}", e)))?;

        let mut client = BasicClient::new(ClientId::new(credential.client_id.clone()))
            .set_token_uri(token_url)
            .set_auth_type(AuthType::RequestBody);
        if let Some(secret) = &credential.client_secret {
            client = client.set_client_secret(ClientSecret::new(secret.clone()));
        }

        debug!(token_uri = %credential.token_uri, "Requesting token refresh");

        let response = client
            .exchange_refresh_token(&RefreshToken::new(refresh_token.to_string()))
            .request_async(&self.http)
            .await
            .map_err(classify_refresh_error)?;

        Ok(RefreshedToken {
            access_token: response.access_token().secret().to_string(),
            expires_in: response.expires_in(),
            refresh_token: response.refresh_token().map(|t| t.secret().to_string()),
        })
    }
}

/// OAuth error responses are rejections, except `temporarily_unavailable`.
/// Everything else (transport failures, unparseable or empty error bodies)
/// is treated as the endpoint being unavailable.
fn classify_refresh_error<RE>(err: RequestTokenError<RE, BasicErrorResponse>) -> RefreshError
where
    RE: std::error::Error + 'static,
{
    match err {
        RequestTokenError::ServerResponse(response) => match response.error() {
            BasicErrorResponseType::Extension(code) if code == "temporarily_unavailable" => {
                RefreshError::Transient(response.to_string())
            }
            _ => RefreshError::Rejected(response.to_string()),
        },
        RequestTokenError::Request(e) => RefreshError::Transient(e.to_string()),
        RequestTokenError::Parse(e, _) => {
            RefreshError::Transient(format!("unparseable token response: {}", e))
        }
        RequestTokenError::Other(message) => RefreshError::Transient(message),
    }
}
