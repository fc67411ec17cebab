//! entra-sso - single-shot Entra ID login CLI
//!
#![doc = "entra-sso - single-shot Entra ID login CLI"]
#![doc = "Main entry point for the entra-sso application."]

use std::time::Duration;

use anyhow::Result;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use entra_sso::auth::flow::{FailureReason, FlowOutcome};
use entra_sso::cli::{Cli, Commands};
use entra_sso::commands;
use entra_sso::commands::login::LoginOptions;
use entra_sso::config::Config;
use entra_sso::error::SsoError;

#[tokio::main]
async fn main() -> Result<()> {
    // Parse command line arguments
    let cli = Cli::parse_args();

    // Initialize tracing
    init_tracing(cli.verbose, cli.json_logs);

    // Load configuration
    let config_path = cli.config.as_deref().unwrap_or("config/config.yaml");
    let config = Config::load(config_path, &cli)?;

    // Validate configuration
    config.validate()?;

    // Execute command
    match cli.command {
        Commands::Login {
            no_browser,
            show_token,
            timeout,
            prompt,
            login_hint,
        } => {
            tracing::info!("Starting interactive login");
            let options = LoginOptions {
                no_browser,
                show_token,
                callback_timeout: timeout.map(Duration::from_secs),
                prompt,
                login_hint,
            };
            let outcome = commands::login::run_login(config, options).await?;
            outcome_to_result(outcome)
        }
        Commands::Url => {
            commands::url::print_authorization_url(&config)?;
            Ok(())
        }
        Commands::Validate { token } => {
            tracing::info!("Validating supplied token");
            let verdict = commands::validate::validate_token(&config, token)?;
            match verdict.reason() {
                None => Ok(()),
                Some(reason) => Err(SsoError::Validation(reason.to_string()).into()),
            }
        }
    }
}

fn outcome_to_result(outcome: FlowOutcome) -> Result<()> {
    match outcome {
        FlowOutcome::Succeeded => Ok(()),
        FlowOutcome::Failed(FailureReason::TokenExchangeFailed(err)) => {
            Err(SsoError::Exchange(err).into())
        }
        FlowOutcome::Failed(FailureReason::TokenInvalid(reason)) => {
            Err(SsoError::Validation(reason.to_string()).into())
        }
        FlowOutcome::Failed(reason) => Err(SsoError::Callback(reason.to_string()).into()),
        FlowOutcome::Ignored => Err(SsoError::Callback("login did not complete".to_string()).into()),
    }
}

/// Initialize tracing subscriber with environment filter
///
/// Logs go to stderr so that command output on stdout stays clean.
fn init_tracing(verbose: bool, json: bool) {
    let default_directive = if verbose {
        "entra_sso=debug"
    } else {
        "entra_sso=info"
    };
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_directive));

    let registry = tracing_subscriber::registry().with(env_filter);
    if json {
        registry
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_writer(std::io::stderr),
            )
            .init();
    } else {
        registry
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .init();
    }
}
