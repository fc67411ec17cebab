//! `validate` command: claims-only check of a token supplied by the operator.

use std::io::Read;

use colored::Colorize;

use crate::auth::validate::{TokenValidator, ValidationVerdict};
use crate::config::Config;
use crate::error::{Result, SsoError};

/// Validates `token`, or a token read from stdin when `None`, and prints
/// the verdict.
///
/// # Errors
///
/// Returns [`SsoError::Io`] if stdin cannot be read. An invalid token is
/// not an error here; inspect the returned verdict.
pub fn validate_token(config: &Config, token: Option<String>) -> Result<ValidationVerdict> {
    let token = match token {
        Some(token) => token,
        None => {
            let mut buf = String::new();
            std::io::stdin()
                .read_to_string(&mut buf)
                .map_err(SsoError::from)?;
            buf
        }
    };

    let verdict = check(config, &token);
    match &verdict {
        ValidationVerdict::Valid(claims) => {
            println!("{} (claims only, signature NOT verified)", "Token is valid".green().bold());
            println!("  issuer:   {}", claims.issuer);
            println!("  audience: {}", claims.audiences.join(", "));
            if let Some(expires_at) = claims.expires_at {
                println!("  expires:  {}", expires_at.to_rfc3339());
            }
        }
        ValidationVerdict::Invalid(reason) => {
            eprintln!("{} {}", "Token is INVALID:".red().bold(), reason);
        }
    }
    Ok(verdict)
}

fn check(config: &Config, token: &str) -> ValidationVerdict {
    TokenValidator::from_config(config).validate(token)
}
