/*!
Command handlers for the CLI

This module provides command handlers invoked by the CLI entrypoint.

It exposes three top-level command modules:

- `login`: Interactive authorization code login
- `url`: Print an authorization URL
- `validate`: Claims-only validation of a supplied token
*/

pub mod login;
pub mod url;
pub mod validate;
