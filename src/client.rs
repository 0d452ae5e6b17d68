use async_trait::async_trait;
use tracing::debug;
use url::Url;

use crate::types::{DEFAULT_STATE_TOKEN, PkcePair, TokenResponse};
use crate::{AuthorizationRequest, ClientConfig, OAuthToken, Result, WizardError};

/// Authorization URL plus the PKCE verifier needed to redeem the code
#[derive(Debug, Clone)]
pub struct AuthorizationFlow {
    /// The URL the user should visit to authorize the application
    pub authorization_url: String,
    /// The PKCE verifier used to exchange the authorization code for tokens
    pub pkce_verifier: String,
}

/// Something that can redeem an authorization code for a token.
///
/// The callback server calls this from its request handler, so implementations
/// must be shareable across tasks.
#[async_trait]
pub trait CodeExchanger: Send + Sync {
    async fn exchange(&self, code: &str) -> Result<OAuthToken>;
}

/// Google OAuth client for the authorization-code grant
///
/// # Example
///
/// ```no_run
/// use google_auth_wizard::{AuthorizationRequest, ClientConfig, OAuthClient};
///
/// # async fn run() -> google_auth_wizard::Result<()> {
/// let client = OAuthClient::new(ClientConfig::load("client_secret.json")?);
/// let request = AuthorizationRequest::new(
///     client.config().clone(),
///     vec!["https://www.googleapis.com/auth/gmail.readonly".to_string()],
/// )
/// .with_loopback_redirect(8080, "/callback");
///
/// let flow = client.start_flow(&request)?;
/// println!("Visit: {}", flow.authorization_url);
///
/// let token = client
///     .exchange_code("code", &request.redirect_url, &flow.pkce_verifier)
///     .await?;
/// println!("Got token of type {}", token.token_type);
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct OAuthClient {
    config: ClientConfig,
    http: reqwest::Client,
}

impl OAuthClient {
    /// Create a new OAuth client for the given credentials
    pub fn new(config: ClientConfig) -> Self {
        Self {
            config,
            http: reqwest::Client::new(),
        }
    }

    /// Use a preconfigured HTTP client
    pub fn with_http_client(mut self, http: reqwest::Client) -> Self {
        self.http = http;
        self
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Start the OAuth authorization flow
    ///
    /// Builds the provider authorization URL for `request`: requested scopes
    /// space-joined, the fixed anti-forgery state, offline access (so a refresh
    /// token is issued) and a fresh PKCE challenge.
    ///
    /// # Errors
    ///
    /// Returns an error if the configured authorization endpoint is not a valid URL
    pub fn start_flow(&self, request: &AuthorizationRequest) -> Result<AuthorizationFlow> {
        let pkce = PkcePair::generate();

        let mut url = Url::parse(&self.config.auth_url)?;
        url.query_pairs_mut()
            .append_pair("response_type", "code")
            .append_pair("client_id", &self.config.client_id)
            .append_pair("redirect_uri", &request.redirect_url)
            .append_pair("scope", &request.scopes.join(" "))
            .append_pair("state", DEFAULT_STATE_TOKEN)
            .append_pair("access_type", "offline")
            .append_pair("code_challenge", &pkce.challenge)
            .append_pair("code_challenge_method", "S256");

        Ok(AuthorizationFlow {
            authorization_url: url.to_string(),
            pkce_verifier: pkce.verifier,
        })
    }

    /// Exchange an authorization code for access and refresh tokens
    ///
    /// # Arguments
    ///
    /// * `code` - The authorization code from the OAuth callback
    /// * `redirect_url` - The redirect URL used when starting the flow
    /// * `verifier` - The PKCE verifier from the original flow
    ///
    /// # Errors
    ///
    /// Returns [`WizardError::Http`] if the token endpoint rejects the code, or a
    /// network/serialization error.
    pub async fn exchange_code(
        &self,
        code: &str,
        redirect_url: &str,
        verifier: &str,
    ) -> Result<OAuthToken> {
        let params = [
            ("grant_type", "authorization_code"),
            ("client_id", self.config.client_id.as_str()),
            ("client_secret", self.config.client_secret.as_str()),
            ("code", code),
            ("code_verifier", verifier),
            ("redirect_uri", redirect_url),
        ];

        debug!("Exchanging authorization code at {}", self.config.token_url);
        self.post_token_request(&params).await
    }

    /// Redeem a refresh token for a new access token
    ///
    /// Google usually omits the refresh token from refresh responses; the
    /// returned token then carries over the one that was redeemed.
    ///
    /// # Errors
    ///
    /// Returns [`WizardError::TokenRefresh`] if the provider rejects the refresh token
    pub async fn refresh_token(&self, refresh_token: &str) -> Result<OAuthToken> {
        let params = [
            ("grant_type", "refresh_token"),
            ("refresh_token", refresh_token),
            ("client_id", self.config.client_id.as_str()),
            ("client_secret", self.config.client_secret.as_str()),
        ];

        debug!("Refreshing access token at {}", self.config.token_url);
        let mut token = self.post_token_request(&params).await.map_err(|e| match e {
            WizardError::Http { status, body } => {
                WizardError::TokenRefresh(format!("{status}: {body}"))
            }
            other => other,
        })?;

        if token.refresh_token.is_none() {
            token.refresh_token = Some(refresh_token.to_string());
        }
        Ok(token)
    }

    async fn post_token_request(&self, params: &[(&str, &str)]) -> Result<OAuthToken> {
        let response = self
            .http
            .post(&self.config.token_url)
            .header("Content-Type", "application/x-www-form-urlencoded")
            .form(params)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(WizardError::Http { status, body });
        }

        let token_response: TokenResponse = response.json().await?;
        Ok(OAuthToken::from(token_response))
    }
}

/// Binds an [`OAuthClient`] to one flow's redirect URL and PKCE verifier
pub(crate) struct FlowExchanger {
    pub client: OAuthClient,
    pub redirect_url: String,
    pub verifier: String,
}

#[async_trait]
impl CodeExchanger for FlowExchanger {
    async fn exchange(&self, code: &str) -> Result<OAuthToken> {
        self.client
            .exchange_code(code, &self.redirect_url, &self.verifier)
            .await
    }
}
