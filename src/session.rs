//! Session orchestration
//!
//! A [`Session`] sequences one run of the wizard: fetch the scope catalog, let
//! the user pick scopes, then either reuse the cached token or obtain a new one
//! and cache it. The catalog source, the picker and the handshake are traits so
//! the sequencing can run without a terminal or network.

use std::fmt::Write as _;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, info, warn};

use crate::client::FlowExchanger;
use crate::config::Config;
use crate::selector::{SelectionItem, SelectionResult, TerminalSelector};
use crate::{
    AuthorizationRequest, CallbackCoordinator, OAuthClient, OAuthToken, Result, ScopeCatalog,
    ScopeClient, TokenStorage, WizardError, find_available_port,
};

const DEFAULT_TITLE: &str = "Google OAuth Scopes";

/// Where the scope catalog comes from
#[async_trait]
pub trait ScopeSource: Send + Sync {
    async fn fetch_scopes(&self) -> Result<ScopeCatalog>;
}

#[async_trait]
impl ScopeSource for ScopeClient {
    async fn fetch_scopes(&self) -> Result<ScopeCatalog> {
        ScopeClient::fetch_scopes(self).await
    }
}

/// Lets the user choose scopes from the catalog
pub trait ScopePicker {
    fn pick(&self, title: &str, items: Vec<SelectionItem>) -> Result<SelectionResult>;
}

impl ScopePicker for TerminalSelector {
    fn pick(&self, title: &str, items: Vec<SelectionItem>) -> Result<SelectionResult> {
        self.run(title, items)
    }
}

/// Obtains tokens from the provider
#[async_trait]
pub trait Authorizer: Send + Sync {
    /// Run a full authorization-code handshake for `scopes`
    async fn authorize(&self, scopes: &[String]) -> Result<OAuthToken>;

    /// Redeem a refresh token for a new access token
    async fn refresh(&self, refresh_token: &str) -> Result<OAuthToken>;
}

/// Handshake over a loopback redirect, with the browser as the user agent
#[derive(Debug, Clone)]
pub struct LocalServerAuthorizer {
    client: OAuthClient,
    start_port: u16,
    max_port_tries: u16,
    coordinator: CallbackCoordinator,
}

impl LocalServerAuthorizer {
    pub fn new(client: OAuthClient, config: &Config) -> Self {
        Self {
            client,
            start_port: config.server.default_port,
            max_port_tries: config.server.max_port_tries,
            coordinator: CallbackCoordinator::new(
                config.oauth.callback_path.clone(),
                config.server.server_timeout,
            ),
        }
    }
}

#[async_trait]
impl Authorizer for LocalServerAuthorizer {
    async fn authorize(&self, scopes: &[String]) -> Result<OAuthToken> {
        let port = find_available_port(self.start_port, self.max_port_tries)?;
        info!("Using port {} for the OAuth callback", port);

        let request = AuthorizationRequest::new(self.client.config().clone(), scopes.to_vec())
            .with_loopback_redirect(port, self.coordinator.callback_path());
        let flow = self.client.start_flow(&request)?;

        let exchanger = Arc::new(FlowExchanger {
            client: self.client.clone(),
            redirect_url: request.redirect_url.clone(),
            verifier: flow.pkce_verifier,
        });

        self.coordinator
            .run(port, &flow.authorization_url, exchanger, launch_browser)
            .await?
            .into_token(self.coordinator.deadline())
    }

    async fn refresh(&self, refresh_token: &str) -> Result<OAuthToken> {
        self.client.refresh_token(refresh_token).await
    }
}

#[cfg(feature = "browser")]
fn launch_browser(url: &str) -> Result<()> {
    crate::open_browser(url)
}

#[cfg(not(feature = "browser"))]
fn launch_browser(url: &str) -> Result<()> {
    println!("Please open the following URL in your browser:\n{url}");
    Ok(())
}

/// How the returned token was obtained
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenOrigin {
    Cache,
    Refreshed,
    Handshake,
}

/// A token usable for the requested scopes
#[derive(Debug, Clone)]
pub struct Authorization {
    pub token: OAuthToken,
    pub scopes: Vec<String>,
    pub origin: TokenOrigin,
}

impl Authorization {
    /// Human-readable result for the terminal
    ///
    /// With `show_token` the full token is printed as JSON; otherwise only the
    /// first characters of the access token are shown.
    pub fn report(&self, show_token: bool) -> String {
        let mut out = String::from("Selected scopes:\n");
        for scope in &self.scopes {
            let _ = writeln!(out, "- {scope}");
        }
        out.push('\n');

        if show_token {
            match serde_json::to_string_pretty(&self.token) {
                Ok(json) => {
                    let _ = writeln!(out, "Token:\n{json}");
                }
                Err(e) => {
                    debug!("Failed to serialize token for display: {}", e);
                    let _ = writeln!(out, "Token: {:?}", self.token);
                }
            }
        } else {
            let _ = writeln!(
                out,
                "Access token obtained: {}",
                self.token.access_token_preview()
            );
        }
        out
    }
}

#[derive(Debug, Clone)]
pub enum SessionOutcome {
    /// The user left the selector without confirming
    Cancelled,
    Authorized(Authorization),
}

/// One wizard run
pub struct Session<S, P, A> {
    source: S,
    picker: P,
    authorizer: A,
    storage: TokenStorage,
    force_new: bool,
    title: String,
}

impl<S, P, A> Session<S, P, A>
where
    S: ScopeSource,
    P: ScopePicker,
    A: Authorizer,
{
    pub fn new(source: S, picker: P, authorizer: A, storage: TokenStorage) -> Self {
        Self {
            source,
            picker,
            authorizer,
            storage,
            force_new: false,
            title: DEFAULT_TITLE.to_string(),
        }
    }

    /// Skip the cached token and always run a handshake
    pub fn with_force_new(mut self, force_new: bool) -> Self {
        self.force_new = force_new;
        self
    }

    /// Root label of the selector breadcrumb
    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = title.into();
        self
    }

    pub fn storage(&self) -> &TokenStorage {
        &self.storage
    }

    /// Run the whole wizard
    ///
    /// # Errors
    ///
    /// Returns [`WizardError::ScopeFetch`] if the catalog is unavailable or
    /// empty, [`WizardError::Terminal`] if the selector fails,
    /// [`WizardError::NoScopesSelected`] if the user confirmed nothing, and any
    /// handshake error from [`Session::authorize`].
    pub async fn run(&self) -> Result<SessionOutcome> {
        let catalog = self.source.fetch_scopes().await?;
        if catalog.is_empty() {
            return Err(WizardError::ScopeFetch("no scopes available".to_string()));
        }
        info!(
            "Loaded {} scopes across {} services",
            catalog.total_scope_count(),
            catalog.service_count()
        );

        let selection = self.picker.pick(&self.title, catalog.to_selection_items())?;
        if !selection.validated {
            info!("Scope selection cancelled");
            return Ok(SessionOutcome::Cancelled);
        }
        if selection.scopes.is_empty() {
            return Err(WizardError::NoScopesSelected);
        }

        let authorization = self.authorize(selection.scopes).await?;
        Ok(SessionOutcome::Authorized(authorization))
    }

    /// Get a token covering `scopes`
    ///
    /// A cached token is reused when it is still valid and covers every
    /// requested scope. A cached token that covers the scopes but is about to
    /// expire is refreshed when it carries a refresh token. Otherwise a full
    /// handshake runs and its token replaces the cache.
    ///
    /// # Errors
    ///
    /// Returns the handshake error when a new token is needed and cannot be
    /// obtained. The existing cache is left untouched in that case.
    pub async fn authorize(&self, scopes: Vec<String>) -> Result<Authorization> {
        if self.force_new {
            info!("Forcing new token");
        } else if let Some(authorization) = self.reuse_cached(&scopes).await {
            return Ok(authorization);
        }

        let token = self.authorizer.authorize(&scopes).await?;
        self.persist(&token, &scopes);
        Ok(Authorization {
            token,
            scopes,
            origin: TokenOrigin::Handshake,
        })
    }

    async fn reuse_cached(&self, scopes: &[String]) -> Option<Authorization> {
        let stored = match self.storage.load() {
            Ok(stored) => stored,
            Err(e) => {
                debug!("No usable cached token: {}", e);
                return None;
            }
        };
        debug!("{}", stored.summary());

        if !stored.has_scopes(scopes) {
            info!("Cached token does not cover the requested scopes");
            return None;
        }

        if stored.is_valid() {
            let token = stored.token?;
            info!("Using cached token");
            return Some(Authorization {
                token,
                scopes: scopes.to_vec(),
                origin: TokenOrigin::Cache,
            });
        }

        let refresh_token = stored
            .token
            .as_ref()
            .and_then(|token| token.refresh_token.clone())
            .filter(|_| stored.can_refresh())?;

        info!("Cached token expired, refreshing");
        match self.authorizer.refresh(&refresh_token).await {
            Ok(token) => {
                self.persist(&token, &stored.scopes);
                Some(Authorization {
                    token,
                    scopes: scopes.to_vec(),
                    origin: TokenOrigin::Refreshed,
                })
            }
            Err(e) => {
                debug!("Token refresh failed, falling back to a new handshake: {}", e);
                None
            }
        }
    }

    fn persist(&self, token: &OAuthToken, scopes: &[String]) {
        match self.storage.save(token, scopes) {
            Ok(()) => info!("Token saved to {}", self.storage.path().display()),
            Err(e) => warn!("Failed to save token: {}", e),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use chrono::Utc;
    use tempfile::TempDir;

    use super::*;
    use crate::ScopeEntry;

    const GMAIL: &str = "https://www.googleapis.com/auth/gmail.readonly";
    const DRIVE: &str = "https://www.googleapis.com/auth/drive";

    fn token(access: &str, expires_in_minutes: i64, refresh: Option<&str>) -> OAuthToken {
        OAuthToken {
            access_token: access.to_string(),
            token_type: "Bearer".to_string(),
            refresh_token: refresh.map(str::to_string),
            expiry: Some(Utc::now() + chrono::Duration::minutes(expires_in_minutes)),
            id_token: None,
        }
    }

    struct FakeSource(ScopeCatalog);

    #[async_trait]
    impl ScopeSource for FakeSource {
        async fn fetch_scopes(&self) -> Result<ScopeCatalog> {
            Ok(self.0.clone())
        }
    }

    fn catalog() -> FakeSource {
        FakeSource(ScopeCatalog::new([
            ("Gmail".to_string(), vec![ScopeEntry::new(GMAIL, "Read")]),
            ("Drive".to_string(), vec![ScopeEntry::new(DRIVE, "Full access")]),
        ]))
    }

    struct FakePicker(SelectionResult);

    impl ScopePicker for FakePicker {
        fn pick(&self, title: &str, items: Vec<SelectionItem>) -> Result<SelectionResult> {
            assert_eq!(title, DEFAULT_TITLE);
            assert_eq!(items.len(), 2);
            Ok(self.0.clone())
        }
    }

    fn picked(scopes: &[&str]) -> FakePicker {
        FakePicker(SelectionResult {
            scopes: scopes.iter().map(|s| s.to_string()).collect(),
            validated: true,
        })
    }

    #[derive(Default)]
    struct FakeAuthorizer {
        handshake: Option<OAuthToken>,
        refreshed: Option<OAuthToken>,
        handshakes: AtomicUsize,
        refreshes: AtomicUsize,
    }

    #[async_trait]
    impl Authorizer for FakeAuthorizer {
        async fn authorize(&self, _scopes: &[String]) -> Result<OAuthToken> {
            self.handshakes.fetch_add(1, Ordering::SeqCst);
            self.handshake
                .clone()
                .ok_or(WizardError::Timeout(Duration::from_secs(1)))
        }

        async fn refresh(&self, _refresh_token: &str) -> Result<OAuthToken> {
            self.refreshes.fetch_add(1, Ordering::SeqCst);
            self.refreshed
                .clone()
                .ok_or_else(|| WizardError::TokenRefresh("invalid_grant".to_string()))
        }
    }

    fn issuing(access: &str) -> FakeAuthorizer {
        FakeAuthorizer {
            handshake: Some(token(access, 60, Some("1//new"))),
            ..Default::default()
        }
    }

    fn storage(dir: &TempDir) -> TokenStorage {
        TokenStorage::new(dir.path().join("token.json"))
    }

    fn scopes(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[tokio::test]
    async fn test_valid_cached_token_is_reused() {
        let dir = TempDir::new().unwrap();
        let storage = storage(&dir);
        let cached = token("ya29.cached", 60, None);
        storage.save(&cached, &scopes(&[GMAIL, DRIVE])).unwrap();

        let session = Session::new(catalog(), picked(&[]), issuing("ya29.new"), storage);
        let auth = session.authorize(scopes(&[GMAIL])).await.unwrap();

        assert_eq!(auth.origin, TokenOrigin::Cache);
        assert_eq!(auth.token, cached);
        assert_eq!(session.authorizer.handshakes.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_force_new_skips_cache() {
        let dir = TempDir::new().unwrap();
        let storage = storage(&dir);
        storage
            .save(&token("ya29.cached", 60, None), &scopes(&[GMAIL]))
            .unwrap();

        let session = Session::new(catalog(), picked(&[]), issuing("ya29.new"), storage)
            .with_force_new(true);
        let auth = session.authorize(scopes(&[GMAIL])).await.unwrap();

        assert_eq!(auth.origin, TokenOrigin::Handshake);
        assert_eq!(session.authorizer.handshakes.load(Ordering::SeqCst), 1);
        let stored = session.storage().load().unwrap();
        assert_eq!(stored.token.unwrap().access_token, "ya29.new");
    }

    #[tokio::test]
    async fn test_missing_scope_runs_handshake() {
        let dir = TempDir::new().unwrap();
        let storage = storage(&dir);
        storage
            .save(&token("ya29.cached", 60, None), &scopes(&[GMAIL]))
            .unwrap();

        let session = Session::new(catalog(), picked(&[]), issuing("ya29.new"), storage);
        let auth = session.authorize(scopes(&[GMAIL, DRIVE])).await.unwrap();

        assert_eq!(auth.origin, TokenOrigin::Handshake);
        let stored = session.storage().load().unwrap();
        assert!(stored.has_scopes(&[GMAIL, DRIVE]));
    }

    #[tokio::test]
    async fn test_expiring_token_is_refreshed() {
        let dir = TempDir::new().unwrap();
        let storage = storage(&dir);
        storage
            .save(&token("ya29.old", 2, Some("1//old")), &scopes(&[GMAIL, DRIVE]))
            .unwrap();

        let authorizer = FakeAuthorizer {
            refreshed: Some(token("ya29.refreshed", 60, Some("1//old"))),
            ..Default::default()
        };
        let session = Session::new(catalog(), picked(&[]), authorizer, storage);
        let auth = session.authorize(scopes(&[GMAIL])).await.unwrap();

        assert_eq!(auth.origin, TokenOrigin::Refreshed);
        assert_eq!(session.authorizer.refreshes.load(Ordering::SeqCst), 1);
        assert_eq!(session.authorizer.handshakes.load(Ordering::SeqCst), 0);

        let stored = session.storage().load().unwrap();
        assert_eq!(stored.token.unwrap().access_token, "ya29.refreshed");
        assert_eq!(stored.scopes, scopes(&[GMAIL, DRIVE]));
    }

    #[tokio::test]
    async fn test_failed_refresh_falls_back_to_handshake() {
        let dir = TempDir::new().unwrap();
        let storage = storage(&dir);
        storage
            .save(&token("ya29.old", -10, Some("1//old")), &scopes(&[GMAIL]))
            .unwrap();

        let session = Session::new(catalog(), picked(&[]), issuing("ya29.new"), storage);
        let auth = session.authorize(scopes(&[GMAIL])).await.unwrap();

        assert_eq!(auth.origin, TokenOrigin::Handshake);
        assert_eq!(session.authorizer.refreshes.load(Ordering::SeqCst), 1);
        assert_eq!(session.authorizer.handshakes.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_handshake_failure_keeps_cache() {
        let dir = TempDir::new().unwrap();
        let storage = storage(&dir);
        let cached = token("ya29.cached", 60, None);
        storage.save(&cached, &scopes(&[GMAIL])).unwrap();

        let session = Session::new(catalog(), picked(&[]), FakeAuthorizer::default(), storage);
        let err = session.authorize(scopes(&[DRIVE])).await.unwrap_err();

        assert!(err.is_handshake_error());
        let stored = session.storage().load().unwrap();
        assert_eq!(stored.token, Some(cached));
    }

    #[tokio::test]
    async fn test_save_failure_still_returns_token() {
        let dir = TempDir::new().unwrap();
        let blocker = dir.path().join("not-a-dir");
        std::fs::write(&blocker, b"file").unwrap();
        let storage = TokenStorage::new(blocker.join("token.json"));

        let session = Session::new(catalog(), picked(&[]), issuing("ya29.new"), storage);
        let auth = session.authorize(scopes(&[GMAIL])).await.unwrap();

        assert_eq!(auth.token.access_token, "ya29.new");
        assert!(!session.storage().exists());
    }

    #[tokio::test]
    async fn test_run_cancelled_selection() {
        let dir = TempDir::new().unwrap();
        let session = Session::new(
            catalog(),
            FakePicker(SelectionResult::default()),
            issuing("ya29.new"),
            storage(&dir),
        );

        let outcome = session.run().await.unwrap();
        assert!(matches!(outcome, SessionOutcome::Cancelled));
        assert_eq!(session.authorizer.handshakes.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_run_validated_without_scopes() {
        let dir = TempDir::new().unwrap();
        let picker = FakePicker(SelectionResult {
            scopes: Vec::new(),
            validated: true,
        });
        let session = Session::new(catalog(), picker, issuing("ya29.new"), storage(&dir));

        let err = session.run().await.unwrap_err();
        assert!(matches!(err, WizardError::NoScopesSelected));
    }

    #[tokio::test]
    async fn test_run_empty_catalog_fails() {
        let dir = TempDir::new().unwrap();
        let source = FakeSource(ScopeCatalog::default());
        let session = Session::new(source, picked(&[GMAIL]), issuing("ya29.new"), storage(&dir));

        let err = session.run().await.unwrap_err();
        assert!(matches!(err, WizardError::ScopeFetch(_)));
    }

    #[tokio::test]
    async fn test_run_authorizes_selection() {
        let dir = TempDir::new().unwrap();
        let session = Session::new(
            catalog(),
            picked(&[GMAIL]),
            issuing("ya29.new"),
            storage(&dir),
        );

        let SessionOutcome::Authorized(auth) = session.run().await.unwrap() else {
            panic!("expected an authorization");
        };
        assert_eq!(auth.scopes, scopes(&[GMAIL]));
        assert_eq!(auth.origin, TokenOrigin::Handshake);
        assert!(session.storage().load().unwrap().has_scopes(&[GMAIL]));
    }

    #[test]
    fn test_report_hides_token_by_default() {
        let auth = Authorization {
            token: token("ya29.abcdefghijklmnop", 60, None),
            scopes: scopes(&[GMAIL]),
            origin: TokenOrigin::Handshake,
        };

        let short = auth.report(false);
        assert!(short.contains(&format!("- {GMAIL}")));
        assert!(short.contains("Access token obtained: ya29.abcde..."));
        assert!(!short.contains("ya29.abcdefghijklmnop"));

        let full = auth.report(true);
        assert!(full.contains("\"access_token\": \"ya29.abcdefghijklmnop\""));
    }
}
