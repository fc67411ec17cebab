//! `url` command: print an authorization URL without starting a listener.

use crate::auth::request::{AuthorizationRequest, AuthorizationRequestBuilder};
use crate::config::Config;
use crate::error::Result;

/// Builds an authorization URL with a fresh `state` and prints it.
///
/// A callback produced from this URL is not awaited by anything; the
/// command is meant for checking the app registration and redirect URI.
///
/// # Errors
///
/// Returns a configuration error if the URL cannot be built.
pub fn print_authorization_url(config: &Config) -> Result<AuthorizationRequest> {
    let request = AuthorizationRequestBuilder::new(&config.client).build_with_random_state()?;
    tracing::debug!(state = %request.state(), "Generated authorization request");
    println!("{}", request);
    Ok(request)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_print_authorization_url_returns_request() {
        let mut config = Config::default();
        config.client.tenant_id = "contoso".to_string();
        config.client.client_id = "app-id".to_string();

        let request = print_authorization_url(&config).unwrap();
        assert!(request.as_str().contains("client_id=app-id"));
        assert!(!request.state().is_empty());
    }
}
