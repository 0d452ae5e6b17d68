use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

/// Error types for the Google auth wizard
#[derive(Error, Debug)]
pub enum WizardError {
    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Invalid client credentials: {0}")]
    Credentials(String),

    #[error("Failed to fetch Google scopes: {0}")]
    ScopeFetch(String),

    #[error("HTTP error: {status}: {body}")]
    Http { status: u16, body: String },

    #[error("No available port found in range {start}-{end}")]
    NoPortAvailable { start: u16, end: u16 },

    #[error("Callback server error: {0}")]
    ServerBind(String),

    #[error("Missing authorization code")]
    MissingAuthorizationCode,

    #[error("Code exchange failed: {0}")]
    CodeExchange(String),

    #[error("Timeout: authorization not received within {0:?}")]
    Timeout(Duration),

    #[error("Token refresh failed: {0}")]
    TokenRefresh(String),

    #[error("Token file not found: {}", .0.display())]
    TokenNotFound(PathBuf),

    #[error("Failed to parse token file: {0}")]
    TokenParse(String),

    #[error("Failed to write token file: {0}")]
    TokenWrite(String),

    #[error("Failed to delete token file: {0}")]
    TokenDelete(String),

    #[error("Terminal error: {0}")]
    Terminal(String),

    #[error(
        "No OAuth scopes selected. Please run the application again and select at least one scope to proceed with authentication"
    )]
    NoScopesSelected,

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("URL parse error: {0}")]
    UrlParse(#[from] url::ParseError),

    #[cfg(feature = "browser")]
    #[error("Failed to open browser: {0}")]
    BrowserLaunch(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl WizardError {
    /// True for failures of the local-redirect handshake itself.
    ///
    /// These are fatal to the handshake but never touch a previously cached token.
    pub fn is_handshake_error(&self) -> bool {
        matches!(
            self,
            Self::MissingAuthorizationCode
                | Self::CodeExchange(_)
                | Self::Timeout(_)
                | Self::ServerBind(_)
                | Self::NoPortAvailable { .. }
        )
    }

    /// True for token cache failures, which the session absorbs.
    pub fn is_cache_error(&self) -> bool {
        matches!(
            self,
            Self::TokenNotFound(_)
                | Self::TokenParse(_)
                | Self::TokenWrite(_)
                | Self::TokenDelete(_)
        )
    }
}

/// Result type alias for wizard operations
pub type Result<T> = std::result::Result<T, WizardError>;
