//! Command-line interface definition for entra-sso
//!
//! This module defines the CLI structure using clap's derive API,
//! providing commands for the interactive login, printing an
//! authorization URL, and validating a token offline.

use clap::{Parser, Subcommand};

/// entra-sso - single-shot Entra ID login
///
/// Runs one OAuth2 authorization code login against Microsoft Entra ID,
/// captures the redirect on a local listener, exchanges the code and
/// checks the returned access token's claims.
#[derive(Parser, Debug, Clone)]
#[command(name = "entra-sso")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value = "config/config.yaml")]
    pub config: Option<String>,

    /// Enable verbose logging
    #[arg(short, long)]
    pub verbose: bool,

    /// Emit logs as JSON lines
    #[arg(long)]
    pub json_logs: bool,

    /// Override the directory (tenant) id
    #[arg(long, global = true)]
    pub tenant_id: Option<String>,

    /// Override the application (client) id
    #[arg(long, global = true)]
    pub client_id: Option<String>,

    /// Override the redirect URI
    #[arg(long, global = true)]
    pub redirect_uri: Option<String>,

    /// Command to execute
    #[command(subcommand)]
    pub command: Commands,
}

/// Available commands for entra-sso
#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// Run the interactive login and validate the resulting token
    Login {
        /// Do not try to open the system browser
        #[arg(long)]
        no_browser: bool,

        /// Print the raw access token after a successful login
        #[arg(long)]
        show_token: bool,

        /// Seconds to wait for the browser redirect (overrides config)
        #[arg(short, long)]
        timeout: Option<u64>,

        /// `prompt` parameter for the authorization request (login, consent, select_account)
        #[arg(long)]
        prompt: Option<String>,

        /// Pre-fill the sign-in name on the provider's login page
        #[arg(long)]
        login_hint: Option<String>,
    },

    /// Print an authorization URL without starting the listener
    Url,

    /// Validate an access token's claims without contacting the provider
    Validate {
        /// Token to validate; read from stdin when omitted
        #[arg(short, long)]
        token: Option<String>,
    },
}

impl Cli {
    /// Parse command line arguments
    ///
    /// # Returns
    ///
    /// Returns the parsed CLI structure
    pub fn parse_args() -> Self {
        Self::parse()
    }
}

impl Default for Cli {
    fn default() -> Self {
        Self {
            config: Some("config/config.yaml".to_string()),
            verbose: false,
            json_logs: false,
            tenant_id: None,
            client_id: None,
            redirect_uri: None,
            command: Commands::Url,
        }
    }
}
