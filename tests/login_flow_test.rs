//! End-to-end login tests
//!
//! Each test binds a real callback listener on an ephemeral port, points
//! the token endpoint at wiremock and plays the browser's part by issuing
//! the redirect GET itself.

use std::time::Duration;

use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use entra_sso::auth::flow::{FailureReason, FlowOutcome};
use entra_sso::auth::listener::CallbackListener;
use entra_sso::auth::validate::InvalidReason;
use entra_sso::commands::login::{LoginOptions, LoginSession};
use entra_sso::config::Config;
use entra_sso::error::ExchangeError;

mod common;

async fn mount_token(server: &MockServer, access_token: String) {
    Mock::given(method("POST"))
        .and(path(common::token_path()))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "access_token": access_token,
            "token_type": "Bearer",
            "expires_in": 3599
        })))
        .mount(server)
        .await;
}

/// Starts a login on an ephemeral port, issues `query` against the callback
/// path and returns the browser body together with the flow outcome.
async fn login_with_callback(
    config: Config,
    query: impl FnOnce(&str) -> String,
) -> (String, FlowOutcome) {
    let listener = CallbackListener::bind("127.0.0.1:0", "/callback")
        .await
        .expect("bind");
    let addr = listener.local_addr().expect("local addr");

    let options = LoginOptions {
        no_browser: true,
        callback_timeout: Some(Duration::from_secs(10)),
        ..LoginOptions::default()
    };
    let session = LoginSession::new(config, options).expect("session");
    let state = session.authorization_request().state().to_string();

    let flow = tokio::spawn(session.run(listener));

    let url = format!("http://{}/callback?{}", addr, query(&state));
    let body = reqwest::get(&url)
        .await
        .expect("callback request")
        .text()
        .await
        .expect("callback body");

    let outcome = flow.await.expect("join").expect("login run");
    (body, outcome)
}

#[tokio::test]
async fn test_login_succeeds_with_matching_state_and_valid_token() {
    let server = MockServer::start().await;
    mount_token(&server, common::mint_jwt(&common::valid_claims())).await;

    let (body, outcome) = login_with_callback(common::test_config(&server.uri()), |state| {
        format!("code=auth-code&state={state}")
    })
    .await;

    assert_eq!(outcome, FlowOutcome::Succeeded);
    assert!(body.contains("Authorization code processed"));
}

#[tokio::test]
async fn test_login_rejects_wrong_state_without_exchanging() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(common::token_path()))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let (body, outcome) = login_with_callback(common::test_config(&server.uri()), |_| {
        "code=auth-code&state=forged".to_string()
    })
    .await;

    assert_eq!(outcome, FlowOutcome::Failed(FailureReason::StateMismatch));
    assert!(body.starts_with("Error:"));
}

#[tokio::test]
async fn test_login_accepts_any_state_when_verification_disabled() {
    let server = MockServer::start().await;
    mount_token(&server, common::mint_jwt(&common::valid_claims())).await;

    let mut config = common::test_config(&server.uri());
    config.flow.verify_state = false;

    let (_, outcome) =
        login_with_callback(config, |_| "code=auth-code&state=whatever".to_string()).await;

    assert_eq!(outcome, FlowOutcome::Succeeded);
}

#[tokio::test]
async fn test_login_reports_missing_code() {
    let server = MockServer::start().await;

    let (body, outcome) = login_with_callback(common::test_config(&server.uri()), |_| {
        "error=access_denied&error_description=user+cancelled".to_string()
    })
    .await;

    assert_eq!(
        outcome,
        FlowOutcome::Failed(FailureReason::NoAuthorizationCode {
            provider_error: Some("access_denied: user cancelled".to_string()),
        })
    );
    assert_eq!(body, "Error: Authorization code not found in callback.");
}

#[tokio::test]
async fn test_login_fails_when_token_has_foreign_audience() {
    let server = MockServer::start().await;
    let mut claims = common::valid_claims();
    claims["aud"] = serde_json::json!("api://some-other-app");
    mount_token(&server, common::mint_jwt(&claims)).await;

    let (_, outcome) = login_with_callback(common::test_config(&server.uri()), |state| {
        format!("code=auth-code&state={state}")
    })
    .await;

    match outcome {
        FlowOutcome::Failed(FailureReason::TokenInvalid(InvalidReason::AudienceMismatch {
            actual,
            ..
        })) => assert_eq!(actual, vec!["api://some-other-app".to_string()]),
        other => panic!("unexpected outcome: {other:?}"),
    }
}

#[tokio::test]
async fn test_login_fails_when_provider_rejects_code() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(common::token_path()))
        .respond_with(ResponseTemplate::new(400).set_body_json(serde_json::json!({
            "error": "invalid_grant",
            "error_description": "code already redeemed"
        })))
        .mount(&server)
        .await;

    let (_, outcome) = login_with_callback(common::test_config(&server.uri()), |state| {
        format!("code=auth-code&state={state}")
    })
    .await;

    assert!(matches!(
        outcome,
        FlowOutcome::Failed(FailureReason::TokenExchangeFailed(ExchangeError::Provider { .. }))
    ));
}
