//! Error types for entra-sso
//!
//! This module defines the error taxonomy of the login flow using
//! `thiserror`. Plumbing code propagates [`SsoError`] through the
//! `anyhow`-based [`Result`] alias, while the protocol boundaries
//! (token exchange, token validation) return explicit values so that a
//! failure is always reported rather than raised.

use thiserror::Error;

/// Main error type for entra-sso operations
///
/// Each variant maps to one failure class of the login flow: configuration
/// problems are fatal before anything starts, callback and exchange failures
/// end the current attempt, and validation failures reject the token.
#[derive(Error, Debug)]
pub enum SsoError {
    /// Missing or malformed configuration (tenant, client id, secret, ...)
    #[error("Configuration error: {0}")]
    Config(String),

    /// The redirect callback did not produce a usable authorization code
    #[error("Callback error: {0}")]
    Callback(String),

    /// The authorization code could not be exchanged for a token
    #[error("Token exchange error: {0}")]
    Exchange(#[from] ExchangeError),

    /// The access token failed claims validation
    #[error("Token validation error: {0}")]
    Validation(String),

    /// The local callback listener could not be started or stopped
    #[error("Listener error: {0}")]
    Listener(String),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization errors
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// YAML parsing errors
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// HTTP client construction errors
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

/// Failure of a single authorization-code exchange.
///
/// None of these are retried: an authorization code is single-use, so the
/// only recovery is a fresh login.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ExchangeError {
    /// No client secret was configured; raised before any network call
    #[error("client secret is not configured (set AZURE_CLIENT_SECRET)")]
    MissingClientSecret,

    /// The token endpoint answered with an OAuth error body
    #[error("provider rejected the code (HTTP {status}): {code}: {description}")]
    Provider {
        /// HTTP status returned by the token endpoint
        status: u16,
        /// OAuth error code, e.g. `invalid_grant`
        code: String,
        /// Human-readable description supplied by the provider
        description: String,
    },

    /// The token endpoint did not answer within the configured timeout
    #[error("timeout")]
    Timeout,

    /// Network-level failure talking to the token endpoint
    #[error("transport error: {0}")]
    Transport(String),

    /// The token endpoint answered 2xx but the body was not a token response
    #[error("malformed token response: {0}")]
    MalformedResponse(String),

    /// The token response carried an empty `access_token`
    #[error("token response did not contain an access token")]
    EmptyToken,
}

impl ExchangeError {
    /// Returns `true` when the failure is a local configuration problem
    /// rather than a protocol or transport failure.
    pub fn is_configuration(&self) -> bool {
        matches!(self, Self::MissingClientSecret)
    }
}

/// Result type alias for entra-sso operations
///
/// This is a convenience alias that uses `anyhow::Error` as the error type,
/// allowing for rich error context and easy error propagation.
pub type Result<T> = anyhow::Result<T>;
