//! Authorization code exchange
//!
//! Trades the single-use authorization code for tokens at the tenant's
//! OAuth2 v2.0 token endpoint, authenticating as a confidential client.
//! Every failure is returned as an [`ExchangeError`] value; nothing is
//! retried, because a code that has been presented once cannot be
//! presented again.

use async_trait::async_trait;
use serde::Deserialize;
use std::fmt;
use std::time::Duration;

use crate::config::ClientConfig;
use crate::error::{ExchangeError, Result, SsoError};

// ---------------------------------------------------------------------------
// TokenResponse
// ---------------------------------------------------------------------------

/// Successful token endpoint response.
///
/// `Debug` redacts token material so the value can be traced safely.
#[derive(Clone, Deserialize)]
pub struct TokenResponse {
    /// The access token, a JWT for Entra ID resources
    pub access_token: String,

    /// Token type, normally `Bearer`
    #[serde(default = "default_token_type")]
    pub token_type: String,

    /// Lifetime of the access token in seconds
    #[serde(default)]
    pub expires_in: Option<u64>,

    /// Refresh token, present when `offline_access` was granted
    #[serde(default)]
    pub refresh_token: Option<String>,

    /// OIDC ID token, present when `openid` was granted
    #[serde(default)]
    pub id_token: Option<String>,

    /// Space-separated scopes actually granted
    #[serde(default)]
    pub scope: Option<String>,
}

fn default_token_type() -> String {
    "Bearer".to_string()
}

impl fmt::Debug for TokenResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenResponse")
            .field("access_token", &"<redacted>")
            .field("token_type", &self.token_type)
            .field("expires_in", &self.expires_in)
            .field("refresh_token", &self.refresh_token.as_ref().map(|_| "<redacted>"))
            .field("id_token", &self.id_token.as_ref().map(|_| "<redacted>"))
            .field("scope", &self.scope)
            .finish()
    }
}

/// OAuth error body returned by the token endpoint.
#[derive(Debug, Deserialize)]
struct ProviderErrorBody {
    error: String,
    #[serde(default)]
    error_description: Option<String>,
}

// ---------------------------------------------------------------------------
// CodeExchanger
// ---------------------------------------------------------------------------

/// Exchanges an authorization code for tokens.
///
/// This is the seam between the callback flow and the network; the flow is
/// tested against mocks of this trait.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait CodeExchanger: Send + Sync {
    /// Presents `code` to the token endpoint once.
    async fn exchange(&self, code: &str) -> std::result::Result<TokenResponse, ExchangeError>;
}

// ---------------------------------------------------------------------------
// TokenExchanger
// ---------------------------------------------------------------------------

/// reqwest-backed [`CodeExchanger`] for an Entra ID confidential client.
///
/// # Examples
///
/// ```no_run
/// use std::time::Duration;
/// use entra_sso::auth::exchange::{CodeExchanger, TokenExchanger};
/// use entra_sso::config::ClientConfig;
///
/// # async fn example() -> entra_sso::error::Result<()> {
/// let client = ClientConfig {
///     tenant_id: "contoso".to_string(),
///     client_id: "app-id".to_string(),
///     ..ClientConfig::default()
/// };
/// let exchanger = TokenExchanger::new(client, Duration::from_secs(30))?;
/// let tokens = exchanger.exchange("code-from-callback").await?;
/// println!("granted: {:?}", tokens.scope);
/// # Ok(())
/// # }
/// ```
pub struct TokenExchanger {
    http: reqwest::Client,
    client: ClientConfig,
}

impl TokenExchanger {
    /// Creates an exchanger whose requests time out after `timeout`.
    ///
    /// # Errors
    ///
    /// Returns [`SsoError::Http`] if the HTTP client cannot be built.
    pub fn new(client: ClientConfig, timeout: Duration) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(SsoError::from)?;
        Ok(Self::with_http(http, client))
    }

    /// Creates an exchanger around an existing HTTP client.
    pub fn with_http(http: reqwest::Client, client: ClientConfig) -> Self {
        Self { http, client }
    }
}

#[async_trait]
impl CodeExchanger for TokenExchanger {
    async fn exchange(&self, code: &str) -> std::result::Result<TokenResponse, ExchangeError> {
        let secret = self
            .client
            .client_secret
            .as_ref()
            .ok_or(ExchangeError::MissingClientSecret)?;

        let scope = self.client.scope_string();
        let params = [
            ("grant_type", "authorization_code"),
            ("code", code),
            ("client_id", self.client.client_id.as_str()),
            ("client_secret", secret.expose()),
            ("redirect_uri", self.client.redirect_uri.as_str()),
            ("scope", scope.as_str()),
        ];

        let endpoint = self.client.token_endpoint();
        tracing::debug!(%endpoint, "Exchanging authorization code");

        let resp = self
            .http
            .post(&endpoint)
            .form(&params)
            .send()
            .await
            .map_err(classify_transport)?;

        let status = resp.status();
        let body = resp.text().await.map_err(classify_transport)?;

        if !status.is_success() {
            return Err(provider_error(status.as_u16(), &body));
        }

        let token: TokenResponse = serde_json::from_str(&body)
            .map_err(|e| ExchangeError::MalformedResponse(e.to_string()))?;

        if token.access_token.trim().is_empty() {
            return Err(ExchangeError::EmptyToken);
        }

        tracing::debug!(
            token_type = %token.token_type,
            expires_in = ?token.expires_in,
            scope = ?token.scope,
            "Token endpoint returned an access token"
        );
        Ok(token)
    }
}

fn classify_transport(err: reqwest::Error) -> ExchangeError {
    if err.is_timeout() {
        ExchangeError::Timeout
    } else {
        ExchangeError::Transport(err.to_string())
    }
}

/// Maps a non-2xx token endpoint answer to [`ExchangeError::Provider`].
///
/// Bodies that are not OAuth error objects are reported verbatim, truncated.
fn provider_error(status: u16, body: &str) -> ExchangeError {
    match serde_json::from_str::<ProviderErrorBody>(body) {
        Ok(parsed) => ExchangeError::Provider {
            status,
            code: parsed.error,
            description: parsed.error_description.unwrap_or_default(),
        },
        Err(_) => ExchangeError::Provider {
            status,
            code: format!("http_{status}"),
            description: body.chars().take(200).collect(),
        },
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
