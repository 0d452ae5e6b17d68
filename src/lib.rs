//! # google-auth-wizard
//!
//! Interactive Google OAuth 2.0 token wizard: pick the scopes you need in a
//! terminal UI, authorize them in the browser and keep the token cached for
//! the next run.
//!
//! ## Features
//!
//! - **Scope Catalog**: Fetches every Google API scope from the OAuth Playground
//! - **Scope Selector**: Services → scopes → confirmation, with filtering
//! - **Callback Server**: Temporary loopback server racing callback, error and timeout
//! - **PKCE Support**: SHA-256 code challenge on every authorization request
//! - **Token Cache**: Reuses a cached token when it still covers the requested scopes
//! - **Token Refresh**: Redeems the refresh token of a near-expiry cached token
//! - **Browser Integration**: Auto-open browser for authorization (default)
//!
//! ## Quick Start
//!
//! ```no_run
//! use google_auth_wizard::{
//!     ClientConfig, Config, LocalServerAuthorizer, OAuthClient, ScopeClient, Session,
//!     SessionOutcome, TerminalSelector, TokenStorage,
//! };
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = Config::load_with_defaults("config.yaml");
//!     let client = OAuthClient::new(ClientConfig::load("client_secret.json")?);
//!
//!     let session = Session::new(
//!         ScopeClient::new(),
//!         TerminalSelector::new(),
//!         LocalServerAuthorizer::new(client, &config),
//!         TokenStorage::new(TokenStorage::default_path()),
//!     );
//!
//!     if let SessionOutcome::Authorized(auth) = session.run().await? {
//!         println!("{}", auth.report(false));
//!     }
//!     Ok(())
//! }
//! ```

mod catalog;
mod client;
mod config;
mod error;
mod port;
pub mod selector;
mod server;
mod session;
mod storage;
mod types;

#[cfg(feature = "browser")]
mod browser;

// Public API exports
pub use catalog::{
    DEFAULT_PLAYGROUND_URL, DEFAULT_SCOPE_ENDPOINT, ScopeCatalog, ScopeClient, ScopeEntry,
};
pub use client::{AuthorizationFlow, CodeExchanger, OAuthClient};
pub use config::{
    Config, ENV_PREFIX, OAuthSection, ServerConfig, TerminalConfig, format_duration,
    parse_duration,
};
pub use error::{Result, WizardError};
pub use port::find_available_port;
pub use selector::{SelectionItem, SelectionResult, TerminalSelector};
pub use server::{CallbackCoordinator, HandshakeOutcome};
pub use session::{
    Authorization, Authorizer, LocalServerAuthorizer, ScopePicker, ScopeSource, Session,
    SessionOutcome, TokenOrigin,
};
pub use storage::{StoredToken, TokenStorage};
pub use types::{AuthorizationRequest, ClientConfig, DEFAULT_STATE_TOKEN, OAuthToken, PkcePair};

#[cfg(feature = "browser")]
pub use browser::open_browser;
