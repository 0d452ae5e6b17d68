//! Catalog of Google APIs and their OAuth scopes
//!
//! The catalog is fetched from the OAuth Playground's scope listing and
//! reorganised into a `service -> scopes` mapping.

use std::collections::{BTreeMap, HashMap};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::selector::SelectionItem;
use crate::{Result, WizardError};

pub const DEFAULT_PLAYGROUND_URL: &str = "https://developers.google.com/oauthplayground";
pub const DEFAULT_SCOPE_ENDPOINT: &str = "getScopes";
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// One OAuth scope offered by a service
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScopeEntry {
    pub url: String,
    pub description: String,
}

impl ScopeEntry {
    pub fn new(url: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            description: description.into(),
        }
    }
}

/// Mapping from service name to its scopes, each list sorted by url
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ScopeCatalog {
    services: BTreeMap<String, Vec<ScopeEntry>>,
}

impl ScopeCatalog {
    /// Build a catalog, sorting every service's scopes by url
    pub fn new(services: impl IntoIterator<Item = (String, Vec<ScopeEntry>)>) -> Self {
        let services = services
            .into_iter()
            .map(|(name, mut scopes)| {
                scopes.sort_by(|a, b| a.url.cmp(&b.url));
                (name, scopes)
            })
            .collect();
        Self { services }
    }

    pub fn scopes_for(&self, service: &str) -> Option<&[ScopeEntry]> {
        self.services.get(service).map(Vec::as_slice)
    }

    /// Service names in sorted order
    pub fn service_names(&self) -> Vec<&str> {
        self.services.keys().map(String::as_str).collect()
    }

    pub fn service_count(&self) -> usize {
        self.services.len()
    }

    pub fn total_scope_count(&self) -> usize {
        self.services.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.services.is_empty()
    }

    pub fn has_service(&self, service: &str) -> bool {
        self.services.contains_key(service)
    }

    /// Every service offering exactly `url`
    pub fn find_by_url(&self, url: &str) -> BTreeMap<&str, Vec<&ScopeEntry>> {
        self.find(|scope| scope.url == url)
    }

    /// Case-insensitive substring search over scope descriptions
    pub fn find_by_description(&self, term: &str) -> BTreeMap<&str, Vec<&ScopeEntry>> {
        let needle = term.to_lowercase();
        self.find(|scope| scope.description.to_lowercase().contains(&needle))
    }

    /// First scope with this url, with the service that offers it
    pub fn scope_by_url(&self, url: &str) -> Option<(&ScopeEntry, &str)> {
        self.services.iter().find_map(|(service, scopes)| {
            scopes
                .iter()
                .find(|scope| scope.url == url)
                .map(|scope| (scope, service.as_str()))
        })
    }

    fn find(&self, pred: impl Fn(&ScopeEntry) -> bool) -> BTreeMap<&str, Vec<&ScopeEntry>> {
        let mut results: BTreeMap<&str, Vec<&ScopeEntry>> = BTreeMap::new();
        for (service, scopes) in &self.services {
            for scope in scopes.iter().filter(|s| pred(s)) {
                results.entry(service.as_str()).or_default().push(scope);
            }
        }
        results
    }

    /// Header items for the selector, one per service that has scopes
    pub fn to_selection_items(&self) -> Vec<SelectionItem> {
        // BTreeMap iteration already yields services sorted by name.
        self.services
            .iter()
            .filter(|(_, scopes)| !scopes.is_empty())
            .map(|(name, scopes)| SelectionItem::header(name.clone(), scopes.clone()))
            .collect()
    }
}

#[derive(Debug, Deserialize)]
struct ScopeDescription {
    #[serde(default)]
    description: String,
}

#[derive(Debug, Deserialize)]
struct ApiInfo {
    #[serde(rename = "iconUrl", default)]
    _icon_url: Option<String>,
    #[serde(default)]
    scopes: Vec<HashMap<String, ScopeDescription>>,
}

#[derive(Debug, Deserialize)]
struct GetScopesResponse {
    success: bool,
    #[serde(default)]
    apis: HashMap<String, ApiInfo>,
}

impl From<HashMap<String, ApiInfo>> for ScopeCatalog {
    fn from(apis: HashMap<String, ApiInfo>) -> Self {
        ScopeCatalog::new(apis.into_iter().map(|(name, info)| {
            let scopes = info
                .scopes
                .into_iter()
                .flat_map(|entry| entry.into_iter())
                .map(|(url, scope)| ScopeEntry::new(url, scope.description))
                .collect();
            (name, scopes)
        }))
    }
}

/// HTTP client for the OAuth Playground scope listing
#[derive(Debug, Clone)]
pub struct ScopeClient {
    http: reqwest::Client,
    timeout: Duration,
    base_url: String,
    scope_endpoint: String,
}

impl Default for ScopeClient {
    fn default() -> Self {
        Self::new()
    }
}

impl ScopeClient {
    pub fn new() -> Self {
        Self {
            http: reqwest::Client::new(),
            timeout: DEFAULT_TIMEOUT,
            base_url: DEFAULT_PLAYGROUND_URL.to_string(),
            scope_endpoint: DEFAULT_SCOPE_ENDPOINT.to_string(),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub fn with_scope_endpoint(mut self, scope_endpoint: impl Into<String>) -> Self {
        self.scope_endpoint = scope_endpoint.into();
        self
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn endpoint_url(&self) -> String {
        format!(
            "{}/{}",
            self.base_url.trim_end_matches('/'),
            self.scope_endpoint.trim_start_matches('/')
        )
    }

    /// Fetch the scope listing and reorganise it into a [`ScopeCatalog`]
    ///
    /// # Errors
    ///
    /// Returns [`WizardError::ScopeFetch`] on transport failure, a non-200
    /// status, malformed JSON, or a response with `success: false`.
    pub async fn fetch_scopes(&self) -> Result<ScopeCatalog> {
        let url = self.endpoint_url();
        debug!("Fetching Google scopes from {}", url);

        let response = self
            .http
            .get(&url)
            .header("Accept", "application/json")
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| WizardError::ScopeFetch(format!("error making GET request: {e}")))?;

        let status = response.status();
        if status != reqwest::StatusCode::OK {
            return Err(WizardError::ScopeFetch(format!("HTTP error: {status}")));
        }

        let body: GetScopesResponse = response
            .json()
            .await
            .map_err(|e| WizardError::ScopeFetch(format!("error parsing JSON: {e}")))?;

        if !body.success {
            return Err(WizardError::ScopeFetch(
                "API returned success=false".to_string(),
            ));
        }

        let catalog = ScopeCatalog::from(body.apis);
        debug!(
            "Fetched {} Google services with {} total scopes",
            catalog.service_count(),
            catalog.total_scope_count()
        );
        Ok(catalog)
    }
}
