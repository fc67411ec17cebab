//! Configuration management for entra-sso
//!
//! This module handles loading, parsing, validating, and managing
//! configuration from files, environment variables, and CLI overrides.
//! The resulting [`Config`] is built once at startup and handed to each
//! component by value or reference; nothing reads configuration from
//! process-wide state afterwards.

use crate::error::{Result, SsoError};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use url::Url;

/// Environment variable holding the confidential client secret.
pub const CLIENT_SECRET_ENV: &str = "AZURE_CLIENT_SECRET";

/// Main configuration structure for entra-sso
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Application registration and authority settings
    #[serde(default)]
    pub client: ClientConfig,
    /// Local callback listener settings
    #[serde(default)]
    pub listener: ListenerConfig,
    /// Flow timing and behavior
    #[serde(default)]
    pub flow: FlowConfig,
    /// Expected token claims
    #[serde(default)]
    pub validation: ValidationConfig,
}

/// Confidential client secret.
///
/// The value is never printed: both `Debug` and `Display` emit a redaction
/// marker, and the raw string is only reachable through [`Self::expose`].
#[derive(Clone, PartialEq, Eq)]
pub struct ClientSecret(String);

impl ClientSecret {
    /// Wraps a raw secret value.
    pub fn new(secret: impl Into<String>) -> Self {
        Self(secret.into())
    }

    /// Returns the raw secret for inclusion in the token request body.
    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for ClientSecret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ClientSecret(<redacted>)")
    }
}

impl fmt::Display for ClientSecret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("<redacted>")
    }
}

/// Entra ID application registration settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientConfig {
    /// Directory (tenant) identifier
    #[serde(default)]
    pub tenant_id: String,

    /// Application (client) identifier
    #[serde(default)]
    pub client_id: String,

    /// Loaded from `AZURE_CLIENT_SECRET` only; never read from or written
    /// to the configuration file.
    #[serde(skip)]
    pub client_secret: Option<ClientSecret>,

    /// Redirect URI registered for the application
    #[serde(default = "default_redirect_uri")]
    pub redirect_uri: String,

    /// Authority base URL, without the tenant segment
    #[serde(default = "default_authority")]
    pub authority: String,

    /// Standard OIDC scopes requested on both the authorization and token
    /// requests
    #[serde(default = "default_scopes")]
    pub scopes: Vec<String>,

    /// API scope for the downstream resource.
    ///
    /// A bare name such as `access_as_user` expands to
    /// `api://{client_id}/access_as_user`; a full `api://...` value is used
    /// as-is. `None` requests no API scope.
    #[serde(default = "default_api_scope")]
    pub api_scope: Option<String>,
}

fn default_redirect_uri() -> String {
    "http://localhost:5000/callback".to_string()
}

fn default_authority() -> String {
    "https://login.microsoftonline.com".to_string()
}

fn default_scopes() -> Vec<String> {
    vec![
        "openid".to_string(),
        "profile".to_string(),
        "offline_access".to_string(),
    ]
}

fn default_api_scope() -> Option<String> {
    Some("access_as_user".to_string())
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            tenant_id: String::new(),
            client_id: String::new(),
            client_secret: None,
            redirect_uri: default_redirect_uri(),
            authority: default_authority(),
            scopes: default_scopes(),
            api_scope: default_api_scope(),
        }
    }
}

impl ClientConfig {
    /// Tenant-scoped authority, e.g. `https://login.microsoftonline.com/{tenant}`
    pub fn authority_url(&self) -> String {
        format!("{}/{}", self.authority.trim_end_matches('/'), self.tenant_id)
    }

    /// OAuth2 v2.0 authorization endpoint for the tenant
    pub fn authorize_endpoint(&self) -> String {
        format!("{}/oauth2/v2.0/authorize", self.authority_url())
    }

    /// OAuth2 v2.0 token endpoint for the tenant
    pub fn token_endpoint(&self) -> String {
        format!("{}/oauth2/v2.0/token", self.authority_url())
    }

    /// The full scope list sent to the provider, API scope last.
    pub fn requested_scopes(&self) -> Vec<String> {
        let mut scopes = self.scopes.clone();
        if let Some(api_scope) = self.api_scope.as_deref().filter(|s| !s.is_empty()) {
            if api_scope.contains("://") {
                scopes.push(api_scope.to_string());
            } else {
                scopes.push(format!("api://{}/{}", self.client_id, api_scope));
            }
        }
        scopes
    }

    /// Space-joined form of [`Self::requested_scopes`]
    pub fn scope_string(&self) -> String {
        self.requested_scopes().join(" ")
    }

    /// Path component of the redirect URI, served by the callback listener.
    ///
    /// # Errors
    ///
    /// Returns [`SsoError::Config`] when the redirect URI does not parse.
    pub fn callback_path(&self) -> Result<String> {
        let url = Url::parse(&self.redirect_uri).map_err(|e| {
            SsoError::Config(format!("Invalid redirect_uri '{}': {}", self.redirect_uri, e))
        })?;
        Ok(url.path().to_string())
    }
}

/// Local callback listener configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ListenerConfig {
    /// Socket address the listener binds to
    #[serde(default = "default_listen_address")]
    pub address: String,
}

fn default_listen_address() -> String {
    "127.0.0.1:5000".to_string()
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            address: default_listen_address(),
        }
    }
}

/// Flow timing and behavior
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FlowConfig {
    /// How long to wait for the browser redirect (seconds)
    #[serde(default = "default_callback_timeout")]
    pub callback_timeout_seconds: u64,

    /// Timeout for the token endpoint request (seconds)
    #[serde(default = "default_http_timeout")]
    pub http_timeout_seconds: u64,

    /// Reject callbacks whose `state` does not match the generated value
    #[serde(default = "default_true")]
    pub verify_state: bool,

    /// Try to open the authorization URL in the system browser
    #[serde(default = "default_true")]
    pub open_browser: bool,
}

fn default_callback_timeout() -> u64 {
    300
}

fn default_http_timeout() -> u64 {
    30
}

fn default_true() -> bool {
    true
}

impl Default for FlowConfig {
    fn default() -> Self {
        Self {
            callback_timeout_seconds: default_callback_timeout(),
            http_timeout_seconds: default_http_timeout(),
            verify_state: true,
            open_browser: true,
        }
    }
}

/// Expected token claims; derived from the client settings when unset
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ValidationConfig {
    /// Expected `iss` claim
    #[serde(default)]
    pub issuer: Option<String>,

    /// Expected member of the `aud` claim
    #[serde(default)]
    pub audience: Option<String>,
}

impl Config {
    /// Load configuration from file with environment and CLI overrides
    ///
    /// A missing file is not an error: defaults are used and the
    /// environment and CLI layers are still applied.
    ///
    /// # Arguments
    ///
    /// * `path` - Path to configuration file
    /// * `cli` - CLI arguments for overrides
    ///
    /// # Errors
    ///
    /// Returns error if the file exists but cannot be read or parsed
    pub fn load(path: &str, cli: &crate::cli::Cli) -> Result<Self> {
        let mut config = if Path::new(path).exists() {
            Self::from_file(path)?
        } else {
            tracing::warn!("Config file not found at {}, using defaults", path);
            Self::default()
        };

        config.apply_env_vars();
        config.apply_cli_overrides(cli);

        Ok(config)
    }

    fn from_file(path: &str) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| SsoError::Config(format!("Failed to read config file: {}", e)))?;
        serde_yaml::from_str(&contents)
            .map_err(|e| SsoError::Config(format!("Failed to parse config: {}", e)).into())
    }

    fn apply_env_vars(&mut self) {
        if let Ok(secret) = std::env::var(CLIENT_SECRET_ENV) {
            if secret.is_empty() {
                tracing::warn!("{} is set but empty", CLIENT_SECRET_ENV);
            } else {
                self.client.client_secret = Some(ClientSecret::new(secret));
                tracing::debug!("Client secret loaded from {}", CLIENT_SECRET_ENV);
            }
        }

        if let Ok(tenant_id) = std::env::var("ENTRA_TENANT_ID") {
            tracing::debug!(tenant_id = %tenant_id, "Env override: ENTRA_TENANT_ID");
            self.client.tenant_id = tenant_id;
        }

        if let Ok(client_id) = std::env::var("ENTRA_CLIENT_ID") {
            tracing::debug!(client_id = %client_id, "Env override: ENTRA_CLIENT_ID");
            self.client.client_id = client_id;
        }

        if let Ok(redirect_uri) = std::env::var("ENTRA_REDIRECT_URI") {
            tracing::debug!(redirect_uri = %redirect_uri, "Env override: ENTRA_REDIRECT_URI");
            self.client.redirect_uri = redirect_uri;
        }

        if let Ok(authority) = std::env::var("ENTRA_AUTHORITY") {
            tracing::debug!(authority = %authority, "Env override: ENTRA_AUTHORITY");
            self.client.authority = authority;
        }

        if let Ok(address) = std::env::var("ENTRA_LISTEN_ADDRESS") {
            tracing::debug!(address = %address, "Env override: ENTRA_LISTEN_ADDRESS");
            self.listener.address = address;
        }

        if let Ok(timeout) = std::env::var("ENTRA_CALLBACK_TIMEOUT_SECONDS") {
            if let Ok(value) = timeout.parse() {
                self.flow.callback_timeout_seconds = value;
            } else {
                tracing::warn!("Invalid ENTRA_CALLBACK_TIMEOUT_SECONDS: {}", timeout);
            }
        }

        if let Ok(timeout) = std::env::var("ENTRA_HTTP_TIMEOUT_SECONDS") {
            if let Ok(value) = timeout.parse() {
                self.flow.http_timeout_seconds = value;
            } else {
                tracing::warn!("Invalid ENTRA_HTTP_TIMEOUT_SECONDS: {}", timeout);
            }
        }

        if let Ok(verify_state) = std::env::var("ENTRA_VERIFY_STATE") {
            match verify_state.parse::<bool>() {
                Ok(v) => {
                    self.flow.verify_state = v;
                    tracing::debug!(verify_state = v, "Env override: ENTRA_VERIFY_STATE");
                }
                Err(_) => {
                    tracing::warn!("Invalid value for ENTRA_VERIFY_STATE: {}", verify_state);
                }
            }
        }
    }

    fn apply_cli_overrides(&mut self, cli: &crate::cli::Cli) {
        if let Some(tenant_id) = &cli.tenant_id {
            self.client.tenant_id = tenant_id.clone();
        }
        if let Some(client_id) = &cli.client_id {
            self.client.client_id = client_id.clone();
        }
        if let Some(redirect_uri) = &cli.redirect_uri {
            self.client.redirect_uri = redirect_uri.clone();
        }
        if cli.verbose {
            tracing::debug!("Verbose mode enabled");
        }
    }

    /// Issuer the validator expects in the `iss` claim.
    ///
    /// Defaults to the v1 token issuer `https://sts.windows.net/{tenant}/`.
    pub fn expected_issuer(&self) -> String {
        self.validation
            .issuer
            .clone()
            .unwrap_or_else(|| format!("https://sts.windows.net/{}/", self.client.tenant_id))
    }

    /// Audience the validator expects among the `aud` claim values.
    ///
    /// Defaults to the application ID URI `api://{client_id}`.
    pub fn expected_audience(&self) -> String {
        self.validation
            .audience
            .clone()
            .unwrap_or_else(|| format!("api://{}", self.client.client_id))
    }

    /// Validate configuration
    ///
    /// The client secret is deliberately not checked here: its absence is
    /// reported by the token exchange, so that `url` and `validate` work
    /// without one.
    ///
    /// # Errors
    ///
    /// Returns [`SsoError::Config`] describing the first invalid setting
    pub fn validate(&self) -> Result<()> {
        check_identifier("client.tenant_id", &self.client.tenant_id)?;
        check_identifier("client.client_id", &self.client.client_id)?;

        let redirect = Url::parse(&self.client.redirect_uri).map_err(|e| {
            SsoError::Config(format!(
                "client.redirect_uri '{}' is not a valid URL: {}",
                self.client.redirect_uri, e
            ))
        })?;
        if redirect.scheme() != "http" && redirect.scheme() != "https" {
            return Err(SsoError::Config(format!(
                "client.redirect_uri must use http or https, got '{}'",
                redirect.scheme()
            ))
            .into());
        }

        let authority = Url::parse(&self.client.authority).map_err(|e| {
            SsoError::Config(format!(
                "client.authority '{}' is not a valid URL: {}",
                self.client.authority, e
            ))
        })?;
        if authority.scheme() != "https" && authority.scheme() != "http" {
            return Err(SsoError::Config(format!(
                "client.authority must use http or https, got '{}'",
                authority.scheme()
            ))
            .into());
        }

        if self.client.requested_scopes().is_empty() {
            return Err(SsoError::Config("at least one scope must be requested".to_string()).into());
        }

        let listen_port = self
            .listener
            .address
            .rsplit_once(':')
            .filter(|(host, _)| !host.is_empty())
            .and_then(|(_, port)| port.parse::<u16>().ok())
            .ok_or_else(|| {
                SsoError::Config(format!(
                    "listener.address '{}' must be host:port",
                    self.listener.address
                ))
            })?;

        // A loopback redirect goes straight to the listener; anything else may
        // be forwarded by a proxy on another port.
        let redirect_port = redirect.port_or_known_default();
        if redirect_port != Some(listen_port) && listen_port != 0 {
            let loopback = matches!(
                redirect.host_str(),
                Some("localhost") | Some("127.0.0.1") | Some("[::1]")
            );
            if loopback {
                return Err(SsoError::Config(format!(
                    "client.redirect_uri port {} does not match listener.address port {}",
                    redirect_port.map_or_else(|| "<none>".to_string(), |p| p.to_string()),
                    listen_port
                ))
                .into());
            }
            tracing::warn!(
                redirect_uri = %self.client.redirect_uri,
                listen_address = %self.listener.address,
                "Redirect URI port differs from the listener port"
            );
        }

        if self.flow.callback_timeout_seconds == 0 {
            return Err(SsoError::Config(
                "flow.callback_timeout_seconds must be greater than 0".to_string(),
            )
            .into());
        }

        if self.flow.http_timeout_seconds == 0 {
            return Err(SsoError::Config(
                "flow.http_timeout_seconds must be greater than 0".to_string(),
            )
            .into());
        }

        Ok(())
    }
}

/// Rejects empty ids and unreplaced `{tenantId}`-style placeholders.
fn check_identifier(name: &str, value: &str) -> Result<()> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(SsoError::Config(format!("{} must be set", name)).into());
    }
    if trimmed.starts_with('{') && trimmed.ends_with('}') {
        return Err(
            SsoError::Config(format!("{} is still a placeholder: {}", name, trimmed)).into(),
        );
    }
    Ok(())
}
