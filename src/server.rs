use std::sync::Arc;
use std::time::Duration;

use axum::{
    Router,
    extract::{Query, State},
    http::StatusCode,
    response::{Html, IntoResponse, Response},
    routing::get,
};
use serde::Deserialize;
use tokio::sync::{Mutex, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::client::CodeExchanger;
use crate::{OAuthToken, Result, WizardError};

const SUCCESS_HTML: &str = r#"<!DOCTYPE html>
<html>
<head>
    <title>Authorization Successful</title>
    <style>
        body { font-family: Arial, sans-serif; text-align: center; padding: 50px; }
        .success { color: green; font-size: 24px; margin-bottom: 20px; }
        .info { color: #666; }
    </style>
</head>
<body>
    <div class="success">✅ Authorization Successful!</div>
    <div class="info">You can close this window and return to the terminal.</div>
</body>
</html>"#;

/// Upper bound on waiting for in-flight callback responses during shutdown
const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

/// How one handshake ended
#[derive(Debug)]
pub enum HandshakeOutcome {
    Token(OAuthToken),
    Error(WizardError),
    Timeout,
}

impl HandshakeOutcome {
    /// Collapse into a result, reporting a timeout against `deadline`
    pub fn into_token(self, deadline: Duration) -> Result<OAuthToken> {
        match self {
            Self::Token(token) => Ok(token),
            Self::Error(e) => Err(e),
            Self::Timeout => Err(WizardError::Timeout(deadline)),
        }
    }
}

#[derive(Debug, Deserialize)]
struct CallbackQuery {
    code: Option<String>,
    error: Option<String>,
}

/// One-shot result slots; taking them marks the handshake as decided
struct Signals {
    token: oneshot::Sender<OAuthToken>,
    error: oneshot::Sender<WizardError>,
}

struct CallbackState {
    signals: Mutex<Option<Signals>>,
    exchanger: Arc<dyn CodeExchanger>,
}

impl CallbackState {
    /// Take the result slots; only the first caller gets them
    async fn claim(&self) -> Option<Signals> {
        self.signals.lock().await.take()
    }

    async fn send_error(&self, error: WizardError) {
        if let Some(signals) = self.signals.lock().await.take() {
            let _ = signals.error.send(error);
        }
    }
}

/// A running callback listener; consumed by [`ServerHandle::shutdown`]
struct ServerHandle {
    shutdown_tx: oneshot::Sender<()>,
    task: JoinHandle<()>,
}

impl ServerHandle {
    async fn shutdown(self) {
        let _ = self.shutdown_tx.send(());
        match tokio::time::timeout(SHUTDOWN_GRACE, self.task).await {
            Ok(Ok(())) => debug!("OAuth callback server stopped"),
            Ok(Err(e)) => warn!("OAuth callback server task failed: {}", e),
            Err(_) => warn!("OAuth callback server did not stop within {:?}", SHUTDOWN_GRACE),
        }
    }
}

/// Runs one authorization-code handshake over a temporary loopback listener
///
/// The coordinator binds the callback port, sends the user to the consent
/// screen and then waits for whichever comes first: a token, a callback
/// error, or the deadline. The listener is shut down before returning on
/// every path.
///
/// # Example
///
/// ```no_run
/// use std::sync::Arc;
/// use std::time::Duration;
/// use google_auth_wizard::{CallbackCoordinator, CodeExchanger, OAuthToken, Result};
///
/// struct Exchanger;
///
/// #[async_trait::async_trait]
/// impl CodeExchanger for Exchanger {
///     async fn exchange(&self, code: &str) -> Result<OAuthToken> {
///         unimplemented!("redeem {code} at the token endpoint")
///     }
/// }
///
/// # async fn run() -> Result<()> {
/// let coordinator = CallbackCoordinator::new("/callback", Duration::from_secs(300));
/// let outcome = coordinator
///     .run(8080, "https://accounts.google.com/o/oauth2/auth?...", Arc::new(Exchanger), |url| {
///         println!("Visit: {url}");
///         Ok(())
///     })
///     .await?;
/// let token = outcome.into_token(coordinator.deadline())?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct CallbackCoordinator {
    callback_path: String,
    deadline: Duration,
}

impl CallbackCoordinator {
    pub fn new(callback_path: impl Into<String>, deadline: Duration) -> Self {
        Self {
            callback_path: callback_path.into(),
            deadline,
        }
    }

    pub fn deadline(&self) -> Duration {
        self.deadline
    }

    pub fn callback_path(&self) -> &str {
        &self.callback_path
    }

    /// Run the handshake on `port`
    ///
    /// # Arguments
    ///
    /// * `port` - Loopback port the redirect URL points at
    /// * `authorization_url` - Provider consent URL handed to `launch`
    /// * `exchanger` - Redeems the code received on the callback
    /// * `launch` - Opens the browser; a failure only degrades to printing the URL
    ///
    /// # Errors
    ///
    /// Returns [`WizardError::ServerBind`] if the listener cannot start. Every
    /// other failure is reported through the returned [`HandshakeOutcome`].
    pub async fn run<F>(
        &self,
        port: u16,
        authorization_url: &str,
        exchanger: Arc<dyn CodeExchanger>,
        launch: F,
    ) -> Result<HandshakeOutcome>
    where
        F: FnOnce(&str) -> Result<()>,
    {
        let (token_tx, token_rx) = oneshot::channel();
        let (error_tx, error_rx) = oneshot::channel();
        let state = Arc::new(CallbackState {
            signals: Mutex::new(Some(Signals {
                token: token_tx,
                error: error_tx,
            })),
            exchanger,
        });

        let server = self.start_server(port, state).await?;

        info!("Opening browser to: {}", authorization_url);
        if let Err(e) = launch(authorization_url) {
            warn!(
                "Unable to open browser automatically ({}). Please open manually: {}",
                e, authorization_url
            );
            println!(
                "Please open the following URL in your browser:\n{}",
                authorization_url
            );
        }

        let outcome = tokio::select! {
            Ok(token) = token_rx => {
                info!("Authorization successful!");
                HandshakeOutcome::Token(token)
            }
            Ok(error) = error_rx => {
                debug!("Authorization error: {}", error);
                HandshakeOutcome::Error(error)
            }
            _ = tokio::time::sleep(self.deadline) => {
                debug!("No callback received within {:?}", self.deadline);
                HandshakeOutcome::Timeout
            }
        };

        server.shutdown().await;
        Ok(outcome)
    }

    async fn start_server(&self, port: u16, state: Arc<CallbackState>) -> Result<ServerHandle> {
        let app = Router::new()
            .route(&self.callback_path, get(handle_callback))
            .with_state(state.clone());

        let addr = format!("127.0.0.1:{}", port);
        let listener = tokio::net::TcpListener::bind(&addr)
            .await
            .map_err(|e| WizardError::ServerBind(format!("Failed to bind to {}: {}", addr, e)))?;
        debug!("Starting OAuth callback server on port {}...", port);

        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
        let task = tokio::spawn(async move {
            let server = axum::serve(listener, app).with_graceful_shutdown(async move {
                let _ = shutdown_rx.await;
            });
            if let Err(e) = server.await {
                state
                    .send_error(WizardError::ServerBind(format!("server error: {e}")))
                    .await;
            }
        });

        Ok(ServerHandle { shutdown_tx, task })
    }
}

async fn handle_callback(
    State(state): State<Arc<CallbackState>>,
    Query(params): Query<CallbackQuery>,
) -> Response {
    let Some(signals) = state.claim().await else {
        debug!("Ignoring callback received after the handshake was claimed");
        return (StatusCode::CONFLICT, "Authorization already handled").into_response();
    };

    let Some(code) = params.code.filter(|code| !code.is_empty()) else {
        if let Some(error) = params.error {
            debug!("Provider returned error: {}", error);
        }
        let _ = signals.error.send(WizardError::MissingAuthorizationCode);
        return (StatusCode::BAD_REQUEST, "Missing authorization code").into_response();
    };

    match state.exchanger.exchange(&code).await {
        Ok(token) => {
            let _ = signals.token.send(token);
            (
                [(axum::http::header::CONTENT_TYPE, "text/html; charset=utf-8")],
                Html(SUCCESS_HTML),
            )
                .into_response()
        }
        Err(e) => {
            let _ = signals.error.send(WizardError::CodeExchange(e.to_string()));
            (StatusCode::INTERNAL_SERVER_ERROR, "Code exchange failed").into_response()
        }
    }
}
