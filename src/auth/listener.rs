//! Local redirect listener
//!
//! A minimal axum server that receives the provider's redirect on the
//! callback path and forwards it to the [`CallbackFlow`](super::flow::CallbackFlow)
//! through a one-shot channel. Only the first callback is forwarded; the
//! sender is taken out of its slot on use, so later requests are answered
//! without ever reaching the flow.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::routing::get;
use axum::Router;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

use crate::auth::flow::{CallbackDelivery, CallbackResult};
use crate::error::{Result, SsoError};

/// Body served on every path other than the callback path.
pub const WAITING_MESSAGE: &str =
    "SSO application running. Waiting for Entra ID authentication callback...";

/// Body served to callbacks that arrive after the first one.
pub const ALREADY_PROCESSED_MESSAGE: &str =
    "This sign-in has already been processed. You can close this browser tab.";

const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

type DeliverySlot = Arc<Mutex<Option<oneshot::Sender<CallbackDelivery>>>>;

#[derive(Clone)]
struct ListenerState {
    slot: DeliverySlot,
}

impl ListenerState {
    fn take_sender(&self) -> Option<oneshot::Sender<CallbackDelivery>> {
        match self.slot.lock() {
            Ok(mut guard) => guard.take(),
            Err(poisoned) => poisoned.into_inner().take(),
        }
    }
}

/// Builds the router serving `callback_path`, together with the receiver
/// on which the first callback is delivered.
pub fn router(callback_path: &str) -> (Router, oneshot::Receiver<CallbackDelivery>) {
    let (tx, rx) = oneshot::channel();
    let state = ListenerState {
        slot: Arc::new(Mutex::new(Some(tx))),
    };
    let router = Router::new()
        .route(callback_path, get(handle_callback))
        .fallback(waiting)
        .with_state(state);
    (router, rx)
}

async fn handle_callback(
    State(state): State<ListenerState>,
    Query(params): Query<HashMap<String, String>>,
) -> (StatusCode, String) {
    tracing::info!("Received request at callback endpoint");
    let result = CallbackResult::from_query(&params);

    let Some(sender) = state.take_sender() else {
        tracing::debug!("Duplicate callback ignored");
        return (StatusCode::OK, ALREADY_PROCESSED_MESSAGE.to_string());
    };

    let (reply_tx, reply_rx) = oneshot::channel();
    if sender
        .send(CallbackDelivery {
            result,
            reply: reply_tx,
        })
        .is_err()
    {
        tracing::warn!("Callback arrived after the login flow stopped waiting");
        return (
            StatusCode::SERVICE_UNAVAILABLE,
            "The login flow is no longer waiting for a callback.".to_string(),
        );
    }

    match reply_rx.await {
        Ok(message) => (StatusCode::OK, message),
        Err(_) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            "The login flow ended without reporting an outcome. Check console for details."
                .to_string(),
        ),
    }
}

async fn waiting() -> &'static str {
    WAITING_MESSAGE
}

// ---------------------------------------------------------------------------
// CallbackListener
// ---------------------------------------------------------------------------

/// A bound, not yet serving, callback listener.
///
/// Binding happens before the authorization URL is shown so the redirect
/// can never race the socket.
pub struct CallbackListener {
    listener: tokio::net::TcpListener,
    callback_path: String,
}

impl CallbackListener {
    /// Binds `address` for serving `callback_path`.
    ///
    /// # Errors
    ///
    /// Returns [`SsoError::Listener`] if the address cannot be bound.
    pub async fn bind(address: &str, callback_path: &str) -> Result<Self> {
        let listener = tokio::net::TcpListener::bind(address)
            .await
            .map_err(|e| SsoError::Listener(format!("failed to bind {address}: {e}")))?;
        Ok(Self {
            listener,
            callback_path: callback_path.to_string(),
        })
    }

    /// Address actually bound (useful with port `0`).
    ///
    /// # Errors
    ///
    /// Returns [`SsoError::Listener`] if the socket address is unavailable.
    pub fn local_addr(&self) -> Result<SocketAddr> {
        self.listener
            .local_addr()
            .map_err(|e| SsoError::Listener(format!("failed to get local address: {e}")).into())
    }

    /// Starts serving in a background task.
    ///
    /// # Errors
    ///
    /// Returns [`SsoError::Listener`] if the socket address is unavailable.
    pub fn spawn(self) -> Result<(RunningListener, oneshot::Receiver<CallbackDelivery>)> {
        let addr = self.local_addr()?;
        let Self {
            listener,
            callback_path,
        } = self;
        let (router, deliveries) = router(&callback_path);
        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();

        let task = tokio::spawn(async move {
            axum::serve(listener, router)
                .with_graceful_shutdown(async {
                    let _ = shutdown_rx.await;
                })
                .await
        });

        tracing::info!(%addr, path = %callback_path, "Callback listener running");
        Ok((
            RunningListener {
                addr,
                shutdown: shutdown_tx,
                task,
            },
            deliveries,
        ))
    }
}

/// Handle to a serving listener.
pub struct RunningListener {
    addr: SocketAddr,
    shutdown: oneshot::Sender<()>,
    task: JoinHandle<std::io::Result<()>>,
}

impl RunningListener {
    /// Address the listener is serving on.
    pub fn local_addr(&self) -> SocketAddr {
        self.addr
    }

    /// Stops accepting connections and waits briefly for in-flight
    /// responses; the server task is aborted if it does not finish in time.
    ///
    /// # Errors
    ///
    /// Returns [`SsoError::Listener`] if the server task failed.
    pub async fn shutdown(self) -> Result<()> {
        let _ = self.shutdown.send(());
        let mut task = self.task;
        match tokio::time::timeout(SHUTDOWN_GRACE, &mut task).await {
            Ok(Ok(Ok(()))) => {
                tracing::debug!("Callback listener stopped");
                Ok(())
            }
            Ok(Ok(Err(e))) => Err(SsoError::Listener(format!("listener failed: {e}")).into()),
            Ok(Err(e)) => Err(SsoError::Listener(format!("listener task failed: {e}")).into()),
            Err(_) => {
                tracing::warn!("Callback listener did not stop in time; aborting");
                task.abort();
                Ok(())
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
