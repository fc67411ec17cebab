//! Entra ID authorization code login
//!
//! # Module Layout
//!
//! - [`request`]  -- authorization URL and `state` generation
//! - [`listener`] -- local axum endpoint receiving the redirect
//! - [`flow`]     -- single-shot state machine from callback to outcome
//! - [`exchange`] -- code-for-token exchange at the token endpoint
//! - [`validate`] -- claims-only access token validation

pub mod exchange;
pub mod flow;
pub mod listener;
pub mod request;
pub mod validate;
