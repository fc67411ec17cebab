//! Claims-only access token validation
//!
//! [`TokenValidator`] checks that an access token is a readable JWT issued
//! by the expected tenant, addressed to the expected audience and not yet
//! expired. It does NOT verify the token signature and never fetches the
//! provider's signing keys: a token that passes here has only been checked
//! for structure and asserted claims. Do not base production trust
//! decisions on this verdict.
//!
//! # Algorithm
//!
//! Checks run in order and stop at the first failure:
//!
//! 1. empty token
//! 2. JWT structure (`header.payload.signature`) and decodable claims
//! 3. `iss` equals the expected issuer
//! 4. the expected audience appears in `aud` (string or list)
//! 5. `exp`, when present and numeric, is not in the past; an absent or
//!    unparseable `exp` only produces a warning

use chrono::{DateTime, Utc};
use jsonwebtoken::{DecodingKey, Validation};
use serde::Deserialize;
use std::collections::HashSet;
use std::fmt;
use std::sync::Once;
use thiserror::Error;

use crate::config::Config;

// ---------------------------------------------------------------------------
// Verdict types
// ---------------------------------------------------------------------------

/// Why a token was rejected.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum InvalidReason {
    /// Nothing to validate
    #[error("empty token")]
    EmptyToken,

    /// Not a three-part JWT, or the header could not be read
    #[error("not a JWT: {0}")]
    NotAJwt(String),

    /// The claims segment is not a decodable JSON object
    #[error("parse failure: {0}")]
    ParseFailure(String),

    /// `iss` does not match the configured tenant
    #[error("issuer mismatch: expected '{expected}', got '{}'", .actual.as_deref().unwrap_or("<missing>"))]
    IssuerMismatch {
        /// Issuer derived from configuration
        expected: String,
        /// Issuer found in the token, if any
        actual: Option<String>,
    },

    /// The expected audience is not among the token's audiences
    #[error("audience mismatch: expected '{expected}', not found in [{}]", .actual.join(", "))]
    AudienceMismatch {
        /// Audience derived from configuration
        expected: String,
        /// Audiences found in the token
        actual: Vec<String>,
    },

    /// `exp` lies strictly before the validation time
    #[error("expired: token expired at {expired_at}, current time {now}")]
    Expired {
        /// Expiry asserted by the token
        expired_at: DateTime<Utc>,
        /// Time the check was made
        now: DateTime<Utc>,
    },
}

/// Outcome of validating one token.
///
/// An invalid verdict always carries the [`InvalidReason`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationVerdict {
    /// All checks passed; the claims are returned for narration
    Valid(TokenClaims),
    /// The first failing check
    Invalid(InvalidReason),
}

impl ValidationVerdict {
    /// Returns `true` for [`ValidationVerdict::Valid`].
    pub fn is_valid(&self) -> bool {
        matches!(self, Self::Valid(_))
    }

    /// The rejection reason, if any.
    pub fn reason(&self) -> Option<&InvalidReason> {
        match self {
            Self::Valid(_) => None,
            Self::Invalid(reason) => Some(reason),
        }
    }

    /// The validated claims, if any.
    pub fn claims(&self) -> Option<&TokenClaims> {
        match self {
            Self::Valid(claims) => Some(claims),
            Self::Invalid(_) => None,
        }
    }
}

impl fmt::Display for ValidationVerdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Valid(_) => f.write_str("valid"),
            Self::Invalid(reason) => write!(f, "invalid ({reason})"),
        }
    }
}

/// Claims surfaced from a validated token.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TokenClaims {
    /// `iss`
    pub issuer: String,
    /// `aud`, normalized to a list
    pub audiences: Vec<String>,
    /// `sub`
    pub subject: Option<String>,
    /// `name`
    pub name: Option<String>,
    /// `preferred_username`, falling back to `upn`
    pub username: Option<String>,
    /// `oid`
    pub object_id: Option<String>,
    /// `tid`
    pub tenant_id: Option<String>,
    /// `scp`, split on spaces
    pub scopes: Vec<String>,
    /// `roles`
    pub roles: Vec<String>,
    /// `exp`, when present and parseable
    pub expires_at: Option<DateTime<Utc>>,
}

// ---------------------------------------------------------------------------
// Raw claims
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum Audience {
    One(String),
    Many(Vec<String>),
}

impl Audience {
    fn into_vec(self) -> Vec<String> {
        match self {
            Self::One(aud) => vec![aud],
            Self::Many(auds) => auds,
        }
    }
}

#[derive(Debug, Deserialize)]
struct RawClaims {
    iss: Option<String>,
    aud: Option<Audience>,
    exp: Option<serde_json::Value>,
    sub: Option<String>,
    name: Option<String>,
    preferred_username: Option<String>,
    upn: Option<String>,
    oid: Option<String>,
    tid: Option<String>,
    scp: Option<String>,
    #[serde(default)]
    roles: Vec<String>,
}

/// Interprets `exp` as Unix seconds: a JSON number or a numeric string.
fn parse_exp(value: &serde_json::Value) -> Option<i64> {
    match value {
        serde_json::Value::Number(n) => n
            .as_i64()
            .or_else(|| n.as_f64().filter(|f| f.is_finite()).map(|f| f as i64)),
        serde_json::Value::String(s) => s.trim().parse::<i64>().ok(),
        _ => None,
    }
}

/// Unix seconds as a timestamp, clamped to chrono's representable range.
fn exp_to_datetime(secs: i64) -> DateTime<Utc> {
    DateTime::<Utc>::from_timestamp(secs, 0).unwrap_or(if secs < 0 {
        DateTime::<Utc>::MIN_UTC
    } else {
        DateTime::<Utc>::MAX_UTC
    })
}

// ---------------------------------------------------------------------------
// TokenValidator
// ---------------------------------------------------------------------------

/// Validates access tokens against an expected issuer and audience.
///
/// # Examples
///
/// ```
/// use entra_sso::auth::validate::{InvalidReason, TokenValidator};
///
/// let validator = TokenValidator::new(
///     "https://sts.windows.net/contoso/",
///     "api://app-id",
/// );
///
/// let verdict = validator.validate("");
/// assert_eq!(verdict.reason(), Some(&InvalidReason::EmptyToken));
/// ```
#[derive(Debug, Clone)]
pub struct TokenValidator {
    expected_issuer: String,
    expected_audience: String,
}

static CLAIMS_ONLY_WARNING: Once = Once::new();

impl TokenValidator {
    /// Creates a validator for explicit expected values.
    pub fn new(expected_issuer: impl Into<String>, expected_audience: impl Into<String>) -> Self {
        Self {
            expected_issuer: expected_issuer.into(),
            expected_audience: expected_audience.into(),
        }
    }

    /// Creates a validator whose expectations derive from the configuration.
    pub fn from_config(config: &Config) -> Self {
        Self::new(config.expected_issuer(), config.expected_audience())
    }

    /// Expected `iss` value.
    pub fn expected_issuer(&self) -> &str {
        &self.expected_issuer
    }

    /// Expected `aud` member.
    pub fn expected_audience(&self) -> &str {
        &self.expected_audience
    }

    /// Validates `token` against the current UTC time.
    pub fn validate(&self, token: &str) -> ValidationVerdict {
        self.validate_at(token, Utc::now())
    }

    /// Validates `token` as of `now`.
    pub fn validate_at(&self, token: &str, now: DateTime<Utc>) -> ValidationVerdict {
        CLAIMS_ONLY_WARNING.call_once(|| {
            tracing::warn!(
                "Token validation is claims-only: the signature is NOT verified against the provider's keys"
            );
        });

        match self.check(token, now) {
            Ok(claims) => {
                tracing::debug!(issuer = %claims.issuer, "Access token passed claims validation");
                ValidationVerdict::Valid(claims)
            }
            Err(reason) => {
                tracing::warn!(%reason, "Access token rejected");
                ValidationVerdict::Invalid(reason)
            }
        }
    }

    fn check(&self, token: &str, now: DateTime<Utc>) -> Result<TokenClaims, InvalidReason> {
        let token = token.trim();
        if token.is_empty() {
            return Err(InvalidReason::EmptyToken);
        }

        let raw = decode_unverified(token)?;

        let issuer = raw.iss;
        if issuer.as_deref() != Some(self.expected_issuer.as_str()) {
            return Err(InvalidReason::IssuerMismatch {
                expected: self.expected_issuer.clone(),
                actual: issuer,
            });
        }

        let audiences = raw.aud.map(Audience::into_vec).unwrap_or_default();
        if !audiences.iter().any(|aud| aud == &self.expected_audience) {
            return Err(InvalidReason::AudienceMismatch {
                expected: self.expected_audience.clone(),
                actual: audiences,
            });
        }

        let exp_secs = raw.exp.as_ref().and_then(parse_exp);
        let expires_at = exp_secs.map(exp_to_datetime);
        match exp_secs {
            Some(secs) if secs < now.timestamp() => {
                return Err(InvalidReason::Expired {
                    expired_at: exp_to_datetime(secs),
                    now,
                });
            }
            Some(_) => {}
            None => {
                tracing::warn!("'exp' claim not found or not parsable in token; accepting without expiry check");
            }
        }

        Ok(TokenClaims {
            issuer: issuer.unwrap_or_default(),
            audiences,
            subject: raw.sub,
            name: raw.name,
            username: raw.preferred_username.or(raw.upn),
            object_id: raw.oid,
            tenant_id: raw.tid,
            scopes: raw
                .scp
                .map(|s| s.split_whitespace().map(str::to_string).collect())
                .unwrap_or_default(),
            roles: raw.roles,
            expires_at,
        })
    }
}

/// Reads the header and claims without checking the signature.
fn decode_unverified(token: &str) -> Result<RawClaims, InvalidReason> {
    let segments: Vec<&str> = token.split('.').collect();
    if segments.len() != 3 || segments[..2].iter().any(|s| s.is_empty()) {
        return Err(InvalidReason::NotAJwt(format!(
            "expected three dot-separated segments, found {}",
            segments.len()
        )));
    }

    jsonwebtoken::decode_header(token).map_err(|e| InvalidReason::NotAJwt(e.to_string()))?;

    let mut validation = Validation::default();
    validation.insecure_disable_signature_validation();
    validation.validate_exp = false;
    validation.validate_nbf = false;
    validation.validate_aud = false;
    validation.required_spec_claims = HashSet::new();

    jsonwebtoken::decode::<RawClaims>(token, &DecodingKey::from_secret(&[]), &validation)
        .map(|data| data.claims)
        .map_err(|e| InvalidReason::ParseFailure(e.to_string()))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
