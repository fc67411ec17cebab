//! Session handling after a successful login
//!
//! Once a token has passed validation the flow hands it to a
//! [`SessionHandler`]. The shipped [`ConsoleSession`] only reports who
//! signed in; tokens are never written to disk.

use async_trait::async_trait;
use colored::Colorize;

use crate::auth::exchange::TokenResponse;
use crate::auth::validate::TokenClaims;
use crate::error::Result;

/// Receives the validated token at the end of a successful flow.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait SessionHandler: Send + Sync {
    /// Starts the application session for the signed-in user.
    async fn start(&self, token: &TokenResponse, claims: &TokenClaims) -> Result<()>;
}

/// Prints a summary of the signed-in identity to stdout.
#[derive(Debug, Clone, Default)]
pub struct ConsoleSession {
    show_token: bool,
}

impl ConsoleSession {
    /// `show_token` prints the raw access token as well.
    pub fn new(show_token: bool) -> Self {
        Self { show_token }
    }

    /// Renders the lines printed by [`SessionHandler::start`].
    pub fn summary(&self, token: &TokenResponse, claims: &TokenClaims) -> Vec<String> {
        let mut lines = Vec::new();
        let who = claims
            .name
            .as_deref()
            .or(claims.username.as_deref())
            .or(claims.subject.as_deref())
            .unwrap_or("unknown user");
        lines.push(format!("Signed in as {}", who));
        if let Some(username) = &claims.username {
            lines.push(format!("  username:  {}", username));
        }
        if let Some(oid) = &claims.object_id {
            lines.push(format!("  object id: {}", oid));
        }
        if !claims.scopes.is_empty() {
            lines.push(format!("  scopes:    {}", claims.scopes.join(" ")));
        }
        if !claims.roles.is_empty() {
            lines.push(format!("  roles:     {}", claims.roles.join(", ")));
        }
        match claims.expires_at {
            Some(expires_at) => lines.push(format!("  expires:   {}", expires_at.to_rfc3339())),
            None => lines.push("  expires:   unknown".to_string()),
        }
        if token.refresh_token.is_some() {
            lines.push("  refresh token issued (not stored)".to_string());
        }
        if self.show_token {
            lines.push(format!("Access token: {}", token.access_token));
        }
        lines
    }
}

#[async_trait]
impl SessionHandler for ConsoleSession {
    async fn start(&self, token: &TokenResponse, claims: &TokenClaims) -> Result<()> {
        let mut lines = self.summary(token, claims).into_iter();
        if let Some(first) = lines.next() {
            println!("{}", first.green().bold());
        }
        for line in lines {
            println!("{}", line);
        }
        tracing::info!(subject = ?claims.subject, "Session started");
        Ok(())
    }
}
