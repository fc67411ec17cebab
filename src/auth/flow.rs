//! Single-shot callback flow
//!
//! [`CallbackFlow`] owns the login sequence once the operator has been sent
//! to the provider:
//!
//! ```text
//! AwaitingCallback -> ExchangingCode -> ValidatingToken -> Succeeded
//!        |                  |                  |
//!        +------------------+------------------+---------> Failed(reason)
//! ```
//!
//! Exactly one path is taken per run and nothing is retried. After reaching
//! a terminal state the flow ignores further callbacks.

use std::collections::HashMap;
use std::fmt;
use std::time::Duration;

use tokio::sync::oneshot;

use crate::auth::exchange::CodeExchanger;
use crate::auth::validate::{InvalidReason, TokenValidator, ValidationVerdict};
use crate::error::ExchangeError;
use crate::session::SessionHandler;

// ---------------------------------------------------------------------------
// Callback values
// ---------------------------------------------------------------------------

/// Outcome of one inbound redirect.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CallbackResult {
    /// The redirect carried a non-empty authorization code
    Code {
        /// The authorization code
        code: String,
        /// The `state` echoed by the provider, if any
        state: Option<String>,
    },
    /// No usable code; `error` holds the provider's redirect error if it sent one
    Missing {
        /// `error` / `error_description` from the redirect
        error: Option<String>,
    },
}

impl CallbackResult {
    /// Interprets decoded redirect query parameters.
    ///
    /// An empty `code` counts as missing.
    pub fn from_query(params: &HashMap<String, String>) -> Self {
        match params.get("code").filter(|c| !c.is_empty()) {
            Some(code) => Self::Code {
                code: code.clone(),
                state: params.get("state").cloned(),
            },
            None => {
                let error = params.get("error").map(|error| {
                    match params.get("error_description").filter(|d| !d.is_empty()) {
                        Some(description) => format!("{error}: {description}"),
                        None => error.clone(),
                    }
                });
                Self::Missing { error }
            }
        }
    }
}

/// A callback handed from the listener to the flow, with a channel for the
/// text the browser should display.
#[derive(Debug)]
pub struct CallbackDelivery {
    /// What the redirect carried
    pub result: CallbackResult,
    /// Receives the browser-facing message once the flow has finished
    pub reply: oneshot::Sender<String>,
}

// ---------------------------------------------------------------------------
// States and outcomes
// ---------------------------------------------------------------------------

/// Why a flow ended in [`FlowState::Failed`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FailureReason {
    /// The redirect carried no code
    NoAuthorizationCode {
        /// Provider-supplied redirect error, if any
        provider_error: Option<String>,
    },
    /// The echoed `state` did not match the generated one
    StateMismatch,
    /// The code could not be exchanged
    TokenExchangeFailed(ExchangeError),
    /// The returned token failed claims validation
    TokenInvalid(InvalidReason),
    /// The session handler rejected the token
    SessionFailed(String),
    /// No callback arrived in time
    CallbackTimedOut(Duration),
    /// The listener went away before delivering a callback
    ListenerClosed,
    /// The operator interrupted the wait
    Cancelled,
}

impl fmt::Display for FailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NoAuthorizationCode {
                provider_error: None,
            } => f.write_str("no authorization code"),
            Self::NoAuthorizationCode {
                provider_error: Some(error),
            } => write!(f, "no authorization code ({error})"),
            Self::StateMismatch => f.write_str("state mismatch"),
            Self::TokenExchangeFailed(err) => write!(f, "token exchange failed: {err}"),
            Self::TokenInvalid(reason) => write!(f, "token invalid: {reason}"),
            Self::SessionFailed(err) => write!(f, "session handling failed: {err}"),
            Self::CallbackTimedOut(after) => {
                write!(f, "callback timed out after {}s", after.as_secs())
            }
            Self::ListenerClosed => f.write_str("callback listener stopped"),
            Self::Cancelled => f.write_str("cancelled by operator"),
        }
    }
}

/// Position of the flow in its state machine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FlowState {
    /// Waiting for the redirect
    AwaitingCallback,
    /// Presenting the code to the token endpoint
    ExchangingCode,
    /// Checking the returned token
    ValidatingToken,
    /// Token validated and handed to the session handler
    Succeeded,
    /// Terminal failure
    Failed(FailureReason),
}

impl FlowState {
    /// `true` for [`FlowState::Succeeded`] and [`FlowState::Failed`].
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed(_))
    }
}

/// What handling one callback achieved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FlowOutcome {
    /// The login completed
    Succeeded,
    /// The login ended with the given reason
    Failed(FailureReason),
    /// The callback arrived after the flow had already finished
    Ignored,
}

impl FlowOutcome {
    /// `true` only for [`FlowOutcome::Succeeded`].
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Succeeded)
    }

    /// Plain-text body shown in the browser tab.
    pub fn browser_message(&self) -> String {
        match self {
            Self::Succeeded => "Authorization code processed. Check console for details. You can close this browser tab.".to_string(),
            Self::Failed(FailureReason::NoAuthorizationCode { .. }) => {
                "Error: Authorization code not found in callback.".to_string()
            }
            Self::Failed(reason) => format!(
                "Error: sign-in failed ({reason}). Check console for details. You can close this browser tab."
            ),
            Self::Ignored => "This sign-in has already been processed. You can close this browser tab.".to_string(),
        }
    }
}

impl fmt::Display for FlowOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Succeeded => f.write_str("succeeded"),
            Self::Failed(reason) => write!(f, "failed: {reason}"),
            Self::Ignored => f.write_str("ignored"),
        }
    }
}

// ---------------------------------------------------------------------------
// CallbackFlow
// ---------------------------------------------------------------------------

/// Drives one login attempt from callback to outcome.
pub struct CallbackFlow<E, S> {
    exchanger: E,
    validator: TokenValidator,
    session: S,
    expected_state: Option<String>,
    state: FlowState,
}

impl<E, S> CallbackFlow<E, S>
where
    E: CodeExchanger,
    S: SessionHandler,
{
    /// Creates a flow in [`FlowState::AwaitingCallback`] that accepts any
    /// callback `state`.
    pub fn new(exchanger: E, validator: TokenValidator, session: S) -> Self {
        Self {
            exchanger,
            validator,
            session,
            expected_state: None,
            state: FlowState::AwaitingCallback,
        }
    }

    /// Requires the callback to echo `state` exactly.
    pub fn expect_state(mut self, state: impl Into<String>) -> Self {
        self.expected_state = Some(state.into());
        self
    }

    /// Current state.
    pub fn state(&self) -> &FlowState {
        &self.state
    }

    /// Handles one callback.
    ///
    /// Returns [`FlowOutcome::Ignored`] without side effects when the flow
    /// has already reached a terminal state.
    pub async fn handle(&mut self, callback: CallbackResult) -> FlowOutcome {
        if self.state.is_terminal() {
            tracing::debug!(state = ?self.state, "Ignoring callback after flow completion");
            return FlowOutcome::Ignored;
        }

        let code = match callback {
            CallbackResult::Missing { error } => {
                tracing::warn!(provider_error = ?error, "Callback received, but no authorization code found");
                return self.fail(FailureReason::NoAuthorizationCode {
                    provider_error: error,
                });
            }
            CallbackResult::Code { code, state } => {
                if let Some(expected) = &self.expected_state {
                    if state.as_deref() != Some(expected.as_str()) {
                        tracing::warn!("Callback state does not match the authorization request");
                        return self.fail(FailureReason::StateMismatch);
                    }
                }
                code
            }
        };

        tracing::info!(code_len = code.len(), "Received authorization code");
        self.transition(FlowState::ExchangingCode);

        let token = match self.exchanger.exchange(&code).await {
            Ok(token) => token,
            Err(err) => {
                tracing::error!(error = %err, "Failed to acquire access token");
                return self.fail(FailureReason::TokenExchangeFailed(err));
            }
        };

        self.transition(FlowState::ValidatingToken);

        let claims = match self.validator.validate(&token.access_token) {
            ValidationVerdict::Valid(claims) => claims,
            ValidationVerdict::Invalid(reason) => {
                tracing::error!(%reason, "Access token is INVALID. Aborting session.");
                return self.fail(FailureReason::TokenInvalid(reason));
            }
        };
        tracing::info!("Access token is valid");

        if let Err(err) = self.session.start(&token, &claims).await {
            tracing::error!(error = %err, "Session handling failed");
            return self.fail(FailureReason::SessionFailed(err.to_string()));
        }

        self.transition(FlowState::Succeeded);
        tracing::info!("Access token acquired successfully");
        FlowOutcome::Succeeded
    }

    /// Waits up to `timeout` for one delivery, handles it and answers the
    /// listener with the browser message.
    pub async fn run(
        &mut self,
        deliveries: oneshot::Receiver<CallbackDelivery>,
        timeout: Duration,
    ) -> FlowOutcome {
        if self.state.is_terminal() {
            return FlowOutcome::Ignored;
        }

        tracing::info!(timeout_secs = timeout.as_secs(), "Awaiting callback");
        match tokio::time::timeout(timeout, deliveries).await {
            Ok(Ok(delivery)) => {
                let outcome = self.handle(delivery.result).await;
                if delivery.reply.send(outcome.browser_message()).is_err() {
                    tracing::debug!("Browser disconnected before the outcome was sent");
                }
                outcome
            }
            Ok(Err(_)) => self.fail(FailureReason::ListenerClosed),
            Err(_) => self.fail(FailureReason::CallbackTimedOut(timeout)),
        }
    }

    /// Ends the flow from outside, e.g. on operator interrupt.
    pub fn abort(&mut self, reason: FailureReason) -> FlowOutcome {
        if self.state.is_terminal() {
            return FlowOutcome::Ignored;
        }
        self.fail(reason)
    }

    fn transition(&mut self, next: FlowState) {
        tracing::debug!(from = ?self.state, to = ?next, "Flow transition");
        self.state = next;
    }

    fn fail(&mut self, reason: FailureReason) -> FlowOutcome {
        tracing::warn!(%reason, "Login flow failed");
        self.transition(FlowState::Failed(reason.clone()));
        FlowOutcome::Failed(reason)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::exchange::{MockCodeExchanger, TokenResponse};
    use crate::session::MockSessionHandler;
    use chrono::{Duration as ChronoDuration, Utc};
    use jsonwebtoken::{encode, EncodingKey, Header};
    use serde_json::json;

    const ISSUER: &str = "https://sts.windows.net/tenant-B/";
    const AUDIENCE: &str = "api://app-id";

    fn validator() -> TokenValidator {
        TokenValidator::new(ISSUER, AUDIENCE)
    }

    fn token_response(access_token: String) -> TokenResponse {
        serde_json::from_value(json!({ "access_token": access_token, "token_type": "Bearer" }))
            .unwrap()
    }

    fn good_jwt() -> String {
        let exp = (Utc::now() + ChronoDuration::hours(1)).timestamp();
        encode(
            &Header::default(),
            &json!({ "iss": ISSUER, "aud": AUDIENCE, "exp": exp, "name": "Alice" }),
            &EncodingKey::from_secret(b"k"),
        )
        .unwrap()
    }

    fn code(code: &str, state: Option<&str>) -> CallbackResult {
        CallbackResult::Code {
            code: code.to_string(),
            state: state.map(str::to_string),
        }
    }

    fn accepting_session() -> MockSessionHandler {
        let mut session = MockSessionHandler::new();
        session.expect_start().times(1).returning(|_, _| Ok(()));
        session
    }

    fn unused_session() -> MockSessionHandler {
        let mut session = MockSessionHandler::new();
        session.expect_start().never();
        session
    }

    #[test]
    fn test_callback_result_from_query() {
        let mut params = HashMap::new();
        params.insert("code".to_string(), "abc".to_string());
        params.insert("state".to_string(), "xyz".to_string());
        assert_eq!(CallbackResult::from_query(&params), code("abc", Some("xyz")));
    }

    #[test]
    fn test_callback_result_empty_code_is_missing() {
        let mut params = HashMap::new();
        params.insert("code".to_string(), String::new());
        assert_eq!(
            CallbackResult::from_query(&params),
            CallbackResult::Missing { error: None }
        );
    }

    #[test]
    fn test_callback_result_carries_provider_error() {
        let mut params = HashMap::new();
        params.insert("error".to_string(), "access_denied".to_string());
        params.insert(
            "error_description".to_string(),
            "AADSTS65004: User declined to consent".to_string(),
        );
        assert_eq!(
            CallbackResult::from_query(&params),
            CallbackResult::Missing {
                error: Some("access_denied: AADSTS65004: User declined to consent".to_string())
            }
        );
    }

    #[tokio::test]
    async fn test_missing_code_fails_without_exchange() {
        let mut exchanger = MockCodeExchanger::new();
        exchanger.expect_exchange().never();
        let mut flow = CallbackFlow::new(exchanger, validator(), unused_session());

        let outcome = flow.handle(CallbackResult::Missing { error: None }).await;

        let expected = FailureReason::NoAuthorizationCode {
            provider_error: None,
        };
        assert_eq!(outcome, FlowOutcome::Failed(expected.clone()));
        assert_eq!(flow.state(), &FlowState::Failed(expected.clone()));
        assert_eq!(expected.to_string(), "no authorization code");
    }

    #[tokio::test]
    async fn test_successful_flow() {
        let jwt = good_jwt();
        let mut exchanger = MockCodeExchanger::new();
        exchanger.expect_exchange().times(1).returning(move |code| {
            assert_eq!(code, "auth-code");
            Ok(token_response(jwt.clone()))
        });
        let mut flow = CallbackFlow::new(exchanger, validator(), accepting_session())
            .expect_state("state-1");

        let outcome = flow.handle(code("auth-code", Some("state-1"))).await;

        assert_eq!(outcome, FlowOutcome::Succeeded);
        assert_eq!(flow.state(), &FlowState::Succeeded);
        assert!(outcome.is_success());
    }

    #[tokio::test]
    async fn test_state_mismatch_fails_without_exchange() {
        let mut exchanger = MockCodeExchanger::new();
        exchanger.expect_exchange().never();
        let mut flow = CallbackFlow::new(exchanger, validator(), unused_session())
            .expect_state("expected");

        let outcome = flow.handle(code("auth-code", Some("forged"))).await;
        assert_eq!(outcome, FlowOutcome::Failed(FailureReason::StateMismatch));
    }

    #[tokio::test]
    async fn test_absent_state_fails_when_expected() {
        let mut exchanger = MockCodeExchanger::new();
        exchanger.expect_exchange().never();
        let mut flow = CallbackFlow::new(exchanger, validator(), unused_session())
            .expect_state("expected");

        let outcome = flow.handle(code("auth-code", None)).await;
        assert_eq!(outcome, FlowOutcome::Failed(FailureReason::StateMismatch));
    }

    #[tokio::test]
    async fn test_state_is_not_checked_when_not_expected() {
        let jwt = good_jwt();
        let mut exchanger = MockCodeExchanger::new();
        exchanger
            .expect_exchange()
            .times(1)
            .returning(move |_| Ok(token_response(jwt.clone())));
        let mut flow = CallbackFlow::new(exchanger, validator(), accepting_session());

        let outcome = flow.handle(code("auth-code", Some("anything"))).await;
        assert_eq!(outcome, FlowOutcome::Succeeded);
    }

    #[tokio::test]
    async fn test_exchange_failure_is_terminal() {
        let mut exchanger = MockCodeExchanger::new();
        exchanger.expect_exchange().times(1).returning(|_| {
            Err(ExchangeError::Provider {
                status: 400,
                code: "invalid_grant".to_string(),
                description: "code expired".to_string(),
            })
        });
        let mut flow = CallbackFlow::new(exchanger, validator(), unused_session());

        let outcome = flow.handle(code("auth-code", None)).await;
        match &outcome {
            FlowOutcome::Failed(reason @ FailureReason::TokenExchangeFailed(_)) => {
                assert!(reason.to_string().starts_with("token exchange failed"));
                assert!(reason.to_string().contains("invalid_grant"));
            }
            other => panic!("unexpected outcome: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_invalid_token_is_terminal() {
        let mut exchanger = MockCodeExchanger::new();
        exchanger
            .expect_exchange()
            .times(1)
            .returning(|_| Ok(token_response("opaque-token".to_string())));
        let mut flow = CallbackFlow::new(exchanger, validator(), unused_session());

        let outcome = flow.handle(code("auth-code", None)).await;
        match outcome {
            FlowOutcome::Failed(FailureReason::TokenInvalid(InvalidReason::NotAJwt(_))) => {}
            other => panic!("unexpected outcome: {other:?}"),
        }
        assert!(flow.state().is_terminal());
    }

    #[tokio::test]
    async fn test_session_failure_is_reported() {
        let jwt = good_jwt();
        let mut exchanger = MockCodeExchanger::new();
        exchanger
            .expect_exchange()
            .times(1)
            .returning(move |_| Ok(token_response(jwt.clone())));
        let mut session = MockSessionHandler::new();
        session
            .expect_start()
            .times(1)
            .returning(|_, _| Err(anyhow::anyhow!("session store unavailable")));
        let mut flow = CallbackFlow::new(exchanger, validator(), session);

        let outcome = flow.handle(code("auth-code", None)).await;
        assert_eq!(
            outcome,
            FlowOutcome::Failed(FailureReason::SessionFailed(
                "session store unavailable".to_string()
            ))
        );
    }

    #[tokio::test]
    async fn test_second_callback_is_ignored() {
        let jwt = good_jwt();
        let mut exchanger = MockCodeExchanger::new();
        exchanger
            .expect_exchange()
            .times(1)
            .returning(move |_| Ok(token_response(jwt.clone())));
        let mut flow = CallbackFlow::new(exchanger, validator(), accepting_session());

        assert_eq!(flow.handle(code("first", None)).await, FlowOutcome::Succeeded);
        assert_eq!(flow.handle(code("second", None)).await, FlowOutcome::Ignored);
        assert_eq!(
            flow.handle(CallbackResult::Missing { error: None }).await,
            FlowOutcome::Ignored
        );
        assert_eq!(flow.state(), &FlowState::Succeeded);
    }

    #[tokio::test]
    async fn test_callback_after_failure_is_ignored() {
        let mut exchanger = MockCodeExchanger::new();
        exchanger.expect_exchange().never();
        let mut flow = CallbackFlow::new(exchanger, validator(), unused_session());

        flow.handle(CallbackResult::Missing { error: None }).await;
        assert_eq!(flow.handle(code("late", None)).await, FlowOutcome::Ignored);
    }

    #[tokio::test]
    async fn test_run_replies_to_listener() {
        let mut exchanger = MockCodeExchanger::new();
        exchanger.expect_exchange().never();
        let mut flow = CallbackFlow::new(exchanger, validator(), unused_session());

        let (tx, rx) = oneshot::channel();
        let (reply_tx, reply_rx) = oneshot::channel();
        tx.send(CallbackDelivery {
            result: CallbackResult::Missing { error: None },
            reply: reply_tx,
        })
        .unwrap();

        let outcome = flow.run(rx, Duration::from_secs(5)).await;
        assert!(!outcome.is_success());
        assert_eq!(
            reply_rx.await.unwrap(),
            "Error: Authorization code not found in callback."
        );
    }

    #[tokio::test]
    async fn test_run_times_out() {
        let mut exchanger = MockCodeExchanger::new();
        exchanger.expect_exchange().never();
        let mut flow = CallbackFlow::new(exchanger, validator(), unused_session());

        let (_tx, rx) = oneshot::channel::<CallbackDelivery>();
        let outcome = flow.run(rx, Duration::from_millis(20)).await;
        assert!(matches!(
            outcome,
            FlowOutcome::Failed(FailureReason::CallbackTimedOut(_))
        ));
    }

    #[tokio::test]
    async fn test_run_reports_closed_listener() {
        let mut exchanger = MockCodeExchanger::new();
        exchanger.expect_exchange().never();
        let mut flow = CallbackFlow::new(exchanger, validator(), unused_session());

        let (tx, rx) = oneshot::channel::<CallbackDelivery>();
        drop(tx);
        assert_eq!(
            flow.run(rx, Duration::from_secs(5)).await,
            FlowOutcome::Failed(FailureReason::ListenerClosed)
        );
    }

    #[tokio::test]
    async fn test_abort_after_terminal_is_ignored() {
        let mut exchanger = MockCodeExchanger::new();
        exchanger.expect_exchange().never();
        let mut flow = CallbackFlow::new(exchanger, validator(), unused_session());

        assert_eq!(
            flow.abort(FailureReason::Cancelled),
            FlowOutcome::Failed(FailureReason::Cancelled)
        );
        assert_eq!(flow.abort(FailureReason::Cancelled), FlowOutcome::Ignored);
    }

    #[test]
    fn test_browser_messages() {
        assert!(FlowOutcome::Succeeded
            .browser_message()
            .contains("You can close this browser tab"));
        assert!(FlowOutcome::Failed(FailureReason::StateMismatch)
            .browser_message()
            .contains("state mismatch"));
        assert!(FlowOutcome::Ignored
            .browser_message()
            .contains("already been processed"));
    }
}
