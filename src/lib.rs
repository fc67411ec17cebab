//! entra-sso - single-shot Entra ID login library
//!
//! This library runs one OAuth2 authorization code login against
//! Microsoft Entra ID: it builds the authorization URL, receives the
//! browser redirect on a local listener, exchanges the code for tokens and
//! checks the access token's claims before handing it to a session handler.
//!
//! # Architecture
//!
//! The library is organized into the following modules:
//!
//! - `auth`: Authorization request, callback listener, flow state machine,
//!   token exchange and claims validation
//! - `session`: What happens with a validated token
//! - `commands`: Handlers behind each CLI subcommand
//! - `config`: Configuration management and validation
//! - `error`: Error types and result aliases
//! - `cli`: Command-line interface definition
//!
//! # Example
//!
//! ```no_run
//! use entra_sso::{Config, TokenValidator};
//!
//! fn main() -> anyhow::Result<()> {
//!     let config = Config::load("config/config.yaml", &Default::default())?;
//!     config.validate()?;
//!
//!     let verdict = TokenValidator::from_config(&config).validate("eyJ...");
//!     println!("{}", verdict);
//!     Ok(())
//! }
//! ```

pub mod auth;
pub mod cli;
pub mod commands;
pub mod config;
pub mod error;
pub mod session;

// Re-export commonly used types
pub use auth::flow::{CallbackFlow, FailureReason, FlowOutcome, FlowState};
pub use auth::validate::{TokenClaims, TokenValidator, ValidationVerdict};
pub use config::Config;
pub use error::{ExchangeError, Result, SsoError};
