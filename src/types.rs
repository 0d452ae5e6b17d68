use std::path::Path;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::{Result, WizardError};

/// Anti-forgery state sent with every authorization request
pub const DEFAULT_STATE_TOKEN: &str = "state-token";

/// OAuth client credentials read from a Google client-secret file
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ClientConfig {
    /// OAuth client ID (`<id>.apps.googleusercontent.com`)
    pub client_id: String,
    /// OAuth client secret
    #[serde(default)]
    pub client_secret: String,
    /// Authorization endpoint URL
    #[serde(rename = "auth_uri", default = "default_auth_url")]
    pub auth_url: String,
    /// Token exchange endpoint URL
    #[serde(rename = "token_uri", default = "default_token_url")]
    pub token_url: String,
}

fn default_auth_url() -> String {
    "https://accounts.google.com/o/oauth2/auth".to_string()
}

fn default_token_url() -> String {
    "https://oauth2.googleapis.com/token".to_string()
}

#[derive(Deserialize)]
struct CredentialsFile {
    installed: Option<ClientConfig>,
    web: Option<ClientConfig>,
}

impl ClientConfig {
    /// Parse a client-secret JSON document.
    ///
    /// Both the `installed` (desktop) and `web` application shapes are accepted.
    ///
    /// # Errors
    ///
    /// Returns [`WizardError::Credentials`] if the document is not valid JSON or
    /// contains neither section.
    pub fn from_json(bytes: &[u8]) -> Result<Self> {
        let file: CredentialsFile = serde_json::from_slice(bytes)
            .map_err(|e| WizardError::Credentials(format!("invalid client secret JSON: {e}")))?;

        let config = file.installed.or(file.web).ok_or_else(|| {
            WizardError::Credentials("missing \"installed\" or \"web\" section".to_string())
        })?;

        if config.client_id.is_empty() {
            return Err(WizardError::Credentials("empty client_id".to_string()));
        }
        Ok(config)
    }

    /// Read and parse a client-secret file from disk
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let bytes = std::fs::read(path).map_err(|e| {
            WizardError::Credentials(format!(
                "unable to read client secret file {}: {e}",
                path.display()
            ))
        })?;
        Self::from_json(&bytes)
    }
}

/// OAuth token pair issued by the provider
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OAuthToken {
    /// The access token used to authenticate API requests
    pub access_token: String,
    /// Token type, usually `Bearer`
    #[serde(default = "default_token_type")]
    pub token_type: String,
    /// The refresh token used to obtain new access tokens
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    /// When the access token expires; `None` means no known expiry
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expiry: Option<DateTime<Utc>>,
    /// OpenID Connect ID token, when the scopes asked for one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id_token: Option<String>,
}

fn default_token_type() -> String {
    "Bearer".to_string()
}

impl OAuthToken {
    /// Check if the token expires within `margin` of now
    ///
    /// A token without an expiry never expires.
    pub fn expires_within(&self, margin: Duration) -> bool {
        match self.expiry {
            Some(expiry) => Utc::now() + margin >= expiry,
            None => false,
        }
    }

    /// Get the `Authorization` header value
    pub fn authorization_header(&self) -> String {
        format!("{} {}", self.token_type, self.access_token)
    }

    /// First ten characters of the access token, for display
    pub fn access_token_preview(&self) -> String {
        let prefix: String = self.access_token.chars().take(10).collect();
        format!("{prefix}...")
    }
}

/// Token response from the provider's token endpoint
#[derive(Debug, Deserialize)]
pub(crate) struct TokenResponse {
    pub access_token: String,
    pub token_type: Option<String>,
    pub refresh_token: Option<String>,
    pub expires_in: Option<i64>,
    pub id_token: Option<String>,
}

impl From<TokenResponse> for OAuthToken {
    fn from(response: TokenResponse) -> Self {
        let expiry = response
            .expires_in
            .filter(|secs| *secs > 0)
            .map(|secs| Utc::now() + Duration::seconds(secs));

        OAuthToken {
            access_token: response.access_token,
            token_type: response.token_type.unwrap_or_else(default_token_type),
            refresh_token: response.refresh_token,
            expiry,
            id_token: response.id_token,
        }
    }
}

/// Everything needed to run one authorization-code handshake
#[derive(Debug, Clone)]
pub struct AuthorizationRequest {
    pub client: ClientConfig,
    /// Requested scope URLs, in selection order
    pub scopes: Vec<String>,
    /// Loopback redirect URL; empty until a port has been allocated
    pub redirect_url: String,
}

impl AuthorizationRequest {
    pub fn new(client: ClientConfig, scopes: Vec<String>) -> Self {
        Self {
            client,
            scopes,
            redirect_url: String::new(),
        }
    }

    /// Point the redirect at `http://localhost:<port><callback_path>`
    pub fn with_loopback_redirect(mut self, port: u16, callback_path: &str) -> Self {
        self.redirect_url = format!("http://localhost:{port}{callback_path}");
        self
    }
}

/// PKCE verifier/challenge pair (S256)
#[derive(Debug, Clone)]
pub struct PkcePair {
    pub verifier: String,
    pub challenge: String,
}

impl PkcePair {
    pub fn generate() -> Self {
        use base64::{Engine as _, engine::general_purpose};
        use rand::RngCore;

        let mut bytes = [0u8; 32];
        rand::thread_rng().fill_bytes(&mut bytes);
        let verifier = general_purpose::URL_SAFE_NO_PAD.encode(bytes);
        let digest = Sha256::digest(verifier.as_bytes());
        let challenge = general_purpose::URL_SAFE_NO_PAD.encode(digest);
        Self {
            verifier,
            challenge,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const INSTALLED: &str = r#"{
        "installed": {
            "client_id": "test-client-id.apps.googleusercontent.com",
            "project_id": "test-project",
            "auth_uri": "https://accounts.google.com/o/oauth2/auth",
            "token_uri": "https://oauth2.googleapis.com/token",
            "client_secret": "test-client-secret",
            "redirect_uris": ["urn:ietf:wg:oauth:2.0:oob", "http://localhost"]
        }
    }"#;

    #[test]
    fn test_client_config_installed() {
        let config = ClientConfig::from_json(INSTALLED.as_bytes()).unwrap();
        assert_eq!(config.client_id, "test-client-id.apps.googleusercontent.com");
        assert_eq!(config.client_secret, "test-client-secret");
        assert_eq!(config.token_url, "https://oauth2.googleapis.com/token");
    }

    #[test]
    fn test_client_config_web_section() {
        let json = r#"{"web": {"client_id": "web-id", "client_secret": "s"}}"#;
        let config = ClientConfig::from_json(json.as_bytes()).unwrap();
        assert_eq!(config.client_id, "web-id");
        assert_eq!(config.auth_url, default_auth_url());
    }

    #[test]
    fn test_client_config_invalid() {
        assert!(matches!(
            ClientConfig::from_json(b"invalid json"),
            Err(WizardError::Credentials(_))
        ));
        assert!(matches!(
            ClientConfig::from_json(br#"{"other": {}}"#),
            Err(WizardError::Credentials(_))
        ));
    }

    #[test]
    fn test_token_response_conversion() {
        let response = TokenResponse {
            access_token: "ya29.token".to_string(),
            token_type: None,
            refresh_token: Some("1//refresh".to_string()),
            expires_in: Some(3599),
            id_token: None,
        };
        let token = OAuthToken::from(response);
        assert_eq!(token.token_type, "Bearer");
        assert!(token.expiry.is_some());
        assert!(!token.expires_within(Duration::minutes(5)));
        assert_eq!(token.authorization_header(), "Bearer ya29.token");
    }

    #[test]
    fn test_token_without_expiry_never_expires() {
        let token = OAuthToken {
            access_token: "abc".to_string(),
            token_type: "Bearer".to_string(),
            refresh_token: None,
            expiry: None,
            id_token: None,
        };
        assert!(!token.expires_within(Duration::days(365)));
        assert_eq!(token.access_token_preview(), "abc...");
    }

    #[test]
    fn test_loopback_redirect() {
        let client = ClientConfig::from_json(INSTALLED.as_bytes()).unwrap();
        let request = AuthorizationRequest::new(client, vec![])
            .with_loopback_redirect(8081, "/callback");
        assert_eq!(request.redirect_url, "http://localhost:8081/callback");
    }

    #[test]
    fn test_pkce_pair_shape() {
        let pair = PkcePair::generate();
        assert_eq!(pair.verifier.len(), 43);
        assert_eq!(pair.challenge.len(), 43);
        assert_ne!(pair.verifier, pair.challenge);
    }
}
