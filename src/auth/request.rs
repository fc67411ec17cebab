//! Authorization request construction
//!
//! Builds the URL the operator opens to sign in with Entra ID. Query values
//! are serialized with `url`'s form encoder, so reserved characters in the
//! redirect URI or scopes can never corrupt the provider's redirect-URI
//! match.

use base64::Engine as _;
use std::fmt;
use url::Url;

use crate::config::ClientConfig;
use crate::error::{Result, SsoError};

// ---------------------------------------------------------------------------
// AuthorizationRequest
// ---------------------------------------------------------------------------

/// A formatted authorization URL and the `state` value embedded in it.
///
/// # Examples
///
/// ```
/// use entra_sso::auth::request::AuthorizationRequestBuilder;
/// use entra_sso::config::ClientConfig;
///
/// let client = ClientConfig {
///     tenant_id: "contoso".to_string(),
///     client_id: "app-id".to_string(),
///     ..ClientConfig::default()
/// };
/// let request = AuthorizationRequestBuilder::new(&client)
///     .build("fixed-state")
///     .unwrap();
///
/// assert_eq!(request.state(), "fixed-state");
/// assert!(request.as_str().starts_with(
///     "https://login.microsoftonline.com/contoso/oauth2/v2.0/authorize?"
/// ));
/// ```
#[derive(Debug, Clone)]
pub struct AuthorizationRequest {
    url: Url,
    state: String,
}

impl AuthorizationRequest {
    /// The full authorization URL.
    pub fn as_str(&self) -> &str {
        self.url.as_str()
    }

    /// The parsed authorization URL.
    pub fn url(&self) -> &Url {
        &self.url
    }

    /// The anti-CSRF correlation value carried in the `state` parameter.
    pub fn state(&self) -> &str {
        &self.state
    }
}

impl fmt::Display for AuthorizationRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.url.as_str())
    }
}

// ---------------------------------------------------------------------------
// AuthorizationRequestBuilder
// ---------------------------------------------------------------------------

/// Builds the provider-bound authorization URL from a [`ClientConfig`].
///
/// The builder has no side effects; presenting the URL to the operator is
/// left to the caller.
#[derive(Debug, Clone)]
pub struct AuthorizationRequestBuilder<'a> {
    client: &'a ClientConfig,
    prompt: Option<String>,
    login_hint: Option<String>,
}

impl<'a> AuthorizationRequestBuilder<'a> {
    /// Creates a builder for the given client registration.
    pub fn new(client: &'a ClientConfig) -> Self {
        Self {
            client,
            prompt: None,
            login_hint: None,
        }
    }

    /// Adds the OIDC `prompt` parameter (`login`, `consent`, `select_account`, ...).
    pub fn prompt(mut self, prompt: impl Into<String>) -> Self {
        self.prompt = Some(prompt.into());
        self
    }

    /// Adds the `login_hint` parameter to pre-fill the sign-in name.
    pub fn login_hint(mut self, login_hint: impl Into<String>) -> Self {
        self.login_hint = Some(login_hint.into());
        self
    }

    /// Builds the authorization URL carrying the given `state`.
    ///
    /// Parameters: `client_id`, `response_type=code`, `redirect_uri`,
    /// `scope` (space-joined), `state`, then the optional `prompt` and
    /// `login_hint`.
    ///
    /// # Errors
    ///
    /// Returns [`SsoError::Config`] if the authority does not form a valid
    /// URL.
    pub fn build(&self, state: &str) -> Result<AuthorizationRequest> {
        let endpoint = self.client.authorize_endpoint();
        let mut url = Url::parse(&endpoint).map_err(|e| {
            SsoError::Config(format!("invalid authorization endpoint '{endpoint}': {e}"))
        })?;

        {
            let mut query = url.query_pairs_mut();
            query.append_pair("client_id", &self.client.client_id);
            query.append_pair("response_type", "code");
            query.append_pair("redirect_uri", &self.client.redirect_uri);
            query.append_pair("scope", &self.client.scope_string());
            query.append_pair("state", state);
            if let Some(prompt) = &self.prompt {
                query.append_pair("prompt", prompt);
            }
            if let Some(hint) = &self.login_hint {
                query.append_pair("login_hint", hint);
            }
        }

        Ok(AuthorizationRequest {
            url,
            state: state.to_string(),
        })
    }

    /// Builds the authorization URL with a freshly generated `state`.
    ///
    /// # Errors
    ///
    /// See [`Self::build`].
    pub fn build_with_random_state(&self) -> Result<AuthorizationRequest> {
        self.build(&generate_state())
    }
}

/// Generates a random `state` value.
///
/// 16 random bytes encoded as base64url without padding.
pub fn generate_state() -> String {
    use rand::RngCore as _;
    let mut bytes = [0u8; 16];
    rand::rng().fill_bytes(&mut bytes);
    base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(bytes)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
