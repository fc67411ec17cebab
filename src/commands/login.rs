//! Interactive login command
//!
//! Wires the pieces together for one login attempt: build the
//! authorization request, bind and start the callback listener, show the
//! URL, wait for the redirect (or timeout / Ctrl-C), run the flow and shut
//! the listener down again.

use std::net::SocketAddr;
use std::time::Duration;

use colored::Colorize;

use crate::auth::exchange::TokenExchanger;
use crate::auth::flow::{CallbackFlow, FailureReason, FlowOutcome};
use crate::auth::listener::CallbackListener;
use crate::auth::request::{AuthorizationRequest, AuthorizationRequestBuilder};
use crate::auth::validate::TokenValidator;
use crate::config::{Config, CLIENT_SECRET_ENV};
use crate::error::Result;
use crate::session::ConsoleSession;

/// Per-invocation options from the `login` subcommand.
#[derive(Debug, Clone, Default)]
pub struct LoginOptions {
    /// Suppress the attempt to open the system browser
    pub no_browser: bool,
    /// Print the raw access token on success
    pub show_token: bool,
    /// Overrides `flow.callback_timeout_seconds`
    pub callback_timeout: Option<Duration>,
    /// `prompt` authorization parameter
    pub prompt: Option<String>,
    /// `login_hint` authorization parameter
    pub login_hint: Option<String>,
}

/// One prepared login attempt.
///
/// The authorization request (and its `state`) is fixed at construction;
/// nothing is presented to the operator until [`LoginSession::run`] has the
/// listener serving.
pub struct LoginSession {
    config: Config,
    options: LoginOptions,
    request: AuthorizationRequest,
}

impl LoginSession {
    /// Prepares a login attempt with a fresh `state`.
    ///
    /// # Errors
    ///
    /// Returns a configuration error if the authorization URL cannot be built.
    pub fn new(config: Config, options: LoginOptions) -> Result<Self> {
        let mut builder = AuthorizationRequestBuilder::new(&config.client);
        if let Some(prompt) = &options.prompt {
            builder = builder.prompt(prompt.clone());
        }
        if let Some(hint) = &options.login_hint {
            builder = builder.login_hint(hint.clone());
        }
        let request = builder.build_with_random_state()?;
        Ok(Self {
            config,
            options,
            request,
        })
    }

    /// The authorization request the operator will be sent to.
    pub fn authorization_request(&self) -> &AuthorizationRequest {
        &self.request
    }

    fn callback_timeout(&self) -> Duration {
        self.options
            .callback_timeout
            .unwrap_or_else(|| Duration::from_secs(self.config.flow.callback_timeout_seconds))
    }

    /// Serves `listener`, presents the URL and runs the flow to completion.
    ///
    /// # Errors
    ///
    /// Returns an error only for plumbing failures (HTTP client, listener);
    /// login failures are reported through the returned [`FlowOutcome`].
    pub async fn run(self, listener: CallbackListener) -> Result<FlowOutcome> {
        if self.config.client.client_secret.is_none() {
            tracing::warn!(
                "{} is not set; the token exchange will fail after sign-in",
                CLIENT_SECRET_ENV
            );
        }

        let exchanger = TokenExchanger::new(
            self.config.client.clone(),
            Duration::from_secs(self.config.flow.http_timeout_seconds),
        )?;
        let validator = TokenValidator::from_config(&self.config);
        let session = ConsoleSession::new(self.options.show_token);

        let mut flow = CallbackFlow::new(exchanger, validator, session);
        if self.config.flow.verify_state {
            flow = flow.expect_state(self.request.state());
        } else {
            tracing::warn!("Callback state verification is disabled; CSRF protection is off");
        }

        let (running, deliveries) = listener.spawn()?;
        print_instructions(&self.request, running.local_addr());
        if self.config.flow.open_browser && !self.options.no_browser {
            try_open_browser(self.request.as_str());
        }

        let timeout = self.callback_timeout();
        let finished = tokio::select! {
            outcome = flow.run(deliveries, timeout) => Some(outcome),
            _ = tokio::signal::ctrl_c() => None,
        };
        let outcome = match finished {
            Some(outcome) => outcome,
            None => flow.abort(FailureReason::Cancelled),
        };

        print_outcome(&outcome);

        if let Err(e) = running.shutdown().await {
            tracing::warn!(error = %e, "Callback listener did not shut down cleanly");
        }
        println!("Application shutting down.");

        Ok(outcome)
    }
}

/// Runs the `login` command against the configured listen address.
///
/// # Errors
///
/// Returns an error if the listener cannot be bound or the configuration
/// is unusable.
pub async fn run_login(config: Config, options: LoginOptions) -> Result<FlowOutcome> {
    let callback_path = config.client.callback_path()?;
    let listener = CallbackListener::bind(&config.listener.address, &callback_path).await?;
    LoginSession::new(config, options)?.run(listener).await
}

fn print_instructions(request: &AuthorizationRequest, listening_on: SocketAddr) {
    println!("Callback listener ready on http://{}", listening_on);
    println!(
        "Please visit the following URL to log in:\n{}",
        request.as_str().cyan().underline()
    );
    println!("After logging in, the browser will redirect and the authorization code will be captured.");
    println!("Press Ctrl-C to abort.");
}

fn print_outcome(outcome: &FlowOutcome) {
    match outcome {
        FlowOutcome::Succeeded => println!("{}", "Login succeeded.".green().bold()),
        FlowOutcome::Failed(reason) => {
            eprintln!("{} {}", "Login failed:".red().bold(), reason)
        }
        FlowOutcome::Ignored => {}
    }
}

/// Attempts to open the authorization URL in the user's default browser.
///
/// Errors are ignored; the URL has already been printed.
fn try_open_browser(url: &str) {
    #[cfg(target_os = "macos")]
    {
        let _ = std::process::Command::new("open").arg(url).spawn();
    }
    #[cfg(target_os = "linux")]
    {
        let _ = std::process::Command::new("xdg-open").arg(url).spawn();
    }
    #[cfg(target_os = "windows")]
    {
        let _ = std::process::Command::new("cmd")
            .args(["/C", "start", "", url])
            .spawn();
    }
    #[cfg(not(any(target_os = "macos", target_os = "linux", target_os = "windows")))]
    {
        let _ = url;
    }
}
