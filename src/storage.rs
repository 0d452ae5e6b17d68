//! On-disk token cache
//!
//! One JSON file per user holds the last token obtained, the scopes it was
//! granted for and when it was saved. Every successful handshake overwrites it.

use std::collections::HashSet;
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::{OAuthToken, Result, WizardError};

const TOKEN_DIR: &str = ".google-auth-wizard";
const TOKEN_FILE: &str = "token.json";
const FALLBACK_TOKEN_FILE: &str = ".google-auth-wizard-token.json";
const EXPIRY_MARGIN_MINUTES: i64 = 5;

/// A cached token together with the scopes it covers
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredToken {
    pub token: Option<OAuthToken>,
    #[serde(default)]
    pub scopes: Vec<String>,
    pub saved_at: DateTime<Utc>,
    #[serde(default)]
    pub expires_at: Option<DateTime<Utc>>,
}

impl StoredToken {
    /// Whether the token can still be used
    ///
    /// A token expiring within the next five minutes counts as invalid; a
    /// token without an expiry is always valid.
    pub fn is_valid(&self) -> bool {
        match &self.token {
            Some(token) => !token.expires_within(Duration::minutes(EXPIRY_MARGIN_MINUTES)),
            None => false,
        }
    }

    /// Whether every requested scope was granted (exact string match)
    pub fn has_scopes<S: AsRef<str>>(&self, requested: &[S]) -> bool {
        if requested.is_empty() {
            return true;
        }
        let granted: HashSet<&str> = self.scopes.iter().map(String::as_str).collect();
        requested.iter().all(|scope| granted.contains(scope.as_ref()))
    }

    /// Whether a near-expiry token could be redeemed for a fresh one
    pub fn can_refresh(&self) -> bool {
        self.token
            .as_ref()
            .and_then(|token| token.refresh_token.as_deref())
            .is_some_and(|refresh| !refresh.is_empty())
    }

    pub fn summary(&self) -> String {
        if self.token.is_none() {
            return "Invalid token".to_string();
        }

        let status = if self.is_valid() { "Valid" } else { "Expired" };
        let expires = self
            .expires_at
            .map(|at| at.format("%Y-%m-%d %H:%M:%S").to_string())
            .unwrap_or_else(|| "never".to_string());
        format!(
            "Token saved: {} | Status: {} | Scopes: {} | Expires: {}",
            self.saved_at.format("%Y-%m-%d %H:%M:%S"),
            status,
            self.scopes.len(),
            expires
        )
    }
}

/// File-backed token cache
#[derive(Debug, Clone)]
pub struct TokenStorage {
    path: PathBuf,
}

impl TokenStorage {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// `~/.google-auth-wizard/token.json`, or a file in the working directory
    /// when there is no home directory
    pub fn default_path() -> PathBuf {
        match dirs::home_dir() {
            Some(home) => home.join(TOKEN_DIR).join(TOKEN_FILE),
            None => PathBuf::from(FALLBACK_TOKEN_FILE),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Persist `token` as granted for `scopes`, replacing any previous cache
    ///
    /// The parent directory is created owner-only and the file is written
    /// owner read/write.
    ///
    /// # Errors
    ///
    /// Returns [`WizardError::TokenWrite`] if the directory or file cannot be written
    pub fn save(&self, token: &OAuthToken, scopes: &[String]) -> Result<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            create_private_dir(parent).map_err(|e| {
                WizardError::TokenWrite(format!(
                    "failed to create directory {}: {e}",
                    parent.display()
                ))
            })?;
        }

        let stored = StoredToken {
            token: Some(token.clone()),
            scopes: scopes.to_vec(),
            saved_at: Utc::now(),
            expires_at: token.expiry,
        };
        let data = serde_json::to_string_pretty(&stored)
            .map_err(|e| WizardError::TokenWrite(format!("failed to marshal token: {e}")))?;

        write_private_file(&self.path, data.as_bytes())
            .map_err(|e| WizardError::TokenWrite(e.to_string()))?;
        debug!("Token written to {}", self.path.display());
        Ok(())
    }

    /// Read the cached token
    ///
    /// # Errors
    ///
    /// Returns [`WizardError::TokenNotFound`] when there is no cache file and
    /// [`WizardError::TokenParse`] when it cannot be read or decoded.
    pub fn load(&self) -> Result<StoredToken> {
        let data = match std::fs::read(&self.path) {
            Ok(data) => data,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(WizardError::TokenNotFound(self.path.clone()));
            }
            Err(e) => {
                return Err(WizardError::TokenParse(format!(
                    "failed to read token file: {e}"
                )));
            }
        };

        serde_json::from_slice(&data).map_err(|e| WizardError::TokenParse(e.to_string()))
    }

    pub fn exists(&self) -> bool {
        self.path.exists()
    }

    /// Remove the cache file; a missing file is not an error
    pub fn delete(&self) -> Result<()> {
        match std::fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(WizardError::TokenDelete(e.to_string())),
        }
    }
}

fn create_private_dir(dir: &Path) -> std::io::Result<()> {
    std::fs::create_dir_all(dir)?;
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(dir, std::fs::Permissions::from_mode(0o700))?;
    }
    Ok(())
}

fn write_private_file(path: &Path, data: &[u8]) -> std::io::Result<()> {
    let mut options = std::fs::OpenOptions::new();
    options.create(true).truncate(true).write(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(0o600);
    }
    let mut file = options.open(path)?;
    file.write_all(data)?;
    file.flush()?;
    // An existing file keeps its old mode on open, so tighten it explicitly.
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn token_expiring_in(minutes: Option<i64>) -> OAuthToken {
        OAuthToken {
            access_token: "ya29.access".to_string(),
            token_type: "Bearer".to_string(),
            refresh_token: Some("1//refresh".to_string()),
            expiry: minutes.map(|m| Utc::now() + Duration::minutes(m)),
            id_token: None,
        }
    }

    fn stored(token: Option<OAuthToken>, scopes: &[&str]) -> StoredToken {
        StoredToken {
            expires_at: token.as_ref().and_then(|t| t.expiry),
            token,
            scopes: scopes.iter().map(|s| s.to_string()).collect(),
            saved_at: Utc::now(),
        }
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let storage = TokenStorage::new(dir.path().join("nested").join("token.json"));
        let token = token_expiring_in(Some(60));
        let scopes = vec![
            "https://www.googleapis.com/auth/drive".to_string(),
            "https://www.googleapis.com/auth/gmail.readonly".to_string(),
        ];

        assert!(!storage.exists());
        storage.save(&token, &scopes).unwrap();
        assert!(storage.exists());

        let loaded = storage.load().unwrap();
        let mut loaded_scopes = loaded.scopes.clone();
        loaded_scopes.sort();
        assert_eq!(loaded_scopes, scopes);
        assert_eq!(loaded.expires_at, token.expiry);
        assert_eq!(loaded.token, Some(token));
        assert!(loaded.is_valid());
    }

    #[cfg(unix)]
    #[test]
    fn test_save_uses_private_permissions() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let token_dir = dir.path().join(".google-auth-wizard");
        let storage = TokenStorage::new(token_dir.join("token.json"));
        storage.save(&token_expiring_in(None), &[]).unwrap();

        let file_mode = std::fs::metadata(storage.path()).unwrap().permissions().mode();
        let dir_mode = std::fs::metadata(&token_dir).unwrap().permissions().mode();
        assert_eq!(file_mode & 0o777, 0o600);
        assert_eq!(dir_mode & 0o777, 0o700);
    }

    #[test]
    fn test_save_overwrites() {
        let dir = tempfile::tempdir().unwrap();
        let storage = TokenStorage::new(dir.path().join("token.json"));
        storage
            .save(&token_expiring_in(Some(60)), &["a".to_string(), "b".to_string()])
            .unwrap();
        storage.save(&token_expiring_in(None), &["c".to_string()]).unwrap();

        let loaded = storage.load().unwrap();
        assert_eq!(loaded.scopes, vec!["c"]);
        assert_eq!(loaded.expires_at, None);
    }

    #[test]
    fn test_cache_file_layout() {
        let dir = tempfile::tempdir().unwrap();
        let storage = TokenStorage::new(dir.path().join("token.json"));
        storage
            .save(&token_expiring_in(Some(60)), &["scope".to_string()])
            .unwrap();

        let raw: serde_json::Value =
            serde_json::from_slice(&std::fs::read(storage.path()).unwrap()).unwrap();
        assert_eq!(raw["token"]["access_token"], "ya29.access");
        assert_eq!(raw["scopes"][0], "scope");
        assert!(
            DateTime::parse_from_rfc3339(raw["saved_at"].as_str().unwrap()).is_ok(),
            "saved_at should be RFC3339"
        );
        assert!(DateTime::parse_from_rfc3339(raw["expires_at"].as_str().unwrap()).is_ok());
    }

    #[test]
    fn test_load_missing_and_corrupt() {
        let dir = tempfile::tempdir().unwrap();
        let storage = TokenStorage::new(dir.path().join("token.json"));
        assert!(matches!(storage.load(), Err(WizardError::TokenNotFound(_))));

        std::fs::write(storage.path(), "{not json").unwrap();
        assert!(matches!(storage.load(), Err(WizardError::TokenParse(_))));
    }

    #[test]
    fn test_delete() {
        let dir = tempfile::tempdir().unwrap();
        let storage = TokenStorage::new(dir.path().join("token.json"));
        storage.delete().unwrap();

        storage.save(&token_expiring_in(None), &[]).unwrap();
        storage.delete().unwrap();
        assert!(!storage.exists());
    }

    #[test]
    fn test_is_valid() {
        assert!(stored(Some(token_expiring_in(Some(60))), &[]).is_valid());
        assert!(stored(Some(token_expiring_in(None)), &[]).is_valid());
        assert!(!stored(Some(token_expiring_in(Some(4))), &[]).is_valid());
        assert!(!stored(Some(token_expiring_in(Some(-10))), &[]).is_valid());
        assert!(!stored(None, &[]).is_valid());
    }

    #[test]
    fn test_has_scopes() {
        let cached = stored(Some(token_expiring_in(None)), &["a", "b", "c"]);
        let none: [&str; 0] = [];
        assert!(cached.has_scopes(&none));
        assert!(cached.has_scopes(&["c", "a"]));
        assert!(!cached.has_scopes(&["a", "d"]));
        // No prefix semantics.
        assert!(!cached.has_scopes(&["a/readonly"]));
        assert!(stored(None, &[]).has_scopes(&none));
    }

    #[test]
    fn test_summary() {
        assert_eq!(stored(None, &[]).summary(), "Invalid token");
        let summary = stored(Some(token_expiring_in(Some(60))), &["a"]).summary();
        assert!(summary.contains("Status: Valid"));
        assert!(summary.contains("Scopes: 1"));
        let expired = stored(Some(token_expiring_in(Some(-1))), &[]).summary();
        assert!(expired.contains("Status: Expired"));
    }

    #[test]
    fn test_can_refresh() {
        assert!(stored(Some(token_expiring_in(Some(-1))), &[]).can_refresh());
        let mut token = token_expiring_in(Some(-1));
        token.refresh_token = None;
        assert!(!stored(Some(token), &[]).can_refresh());
    }
}
