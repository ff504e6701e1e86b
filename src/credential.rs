//! Durable, renewable OAuth credential.
//!
//! [`CredentialStore`] is the only owner of the access credential and the
//! gatekeeper for every external call. [`CredentialStore::obtain`] follows a
//! fixed policy:
//!
//! ```text
//! cached/loaded valid ──────────────────────────────▶ return
//! expired + refresh token ── refresh ok ── persist ─▶ return
//!            │ (absent or refresh failed)
//!            ▼
//! client secret present? ── no ─▶ AuthError::MissingClientSecret
//!            │ yes
//!            ▼
//! consent flow ── persist ─────────────────────────▶ return
//! ```
//!
//! The whole policy runs under an async mutex, so concurrent callers never
//! refresh the same credential twice.

use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::error::AuthError;

/// Treat a credential as expired this long before its real expiry.
const EXPIRY_SKEW_SECS: i64 = 60;

const DEFAULT_TOKEN_URI: &str = "https://oauth2.googleapis.com/token";

/// Access credential in authorized-user form.
///
/// Carries the client id/secret and token URI so a refresh does not need the
/// client secret file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credential {
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default = "default_token_type")]
    pub token_type: String,
    #[serde(default)]
    pub expiry: Option<DateTime<Utc>>,
    #[serde(default)]
    pub scopes: Vec<String>,
    pub client_id: String,
    #[serde(default)]
    pub client_secret: Option<String>,
    #[serde(default = "default_token_uri")]
    pub token_uri: String,
}

fn default_token_type() -> String {
    "Bearer".to_string()
}

fn default_token_uri() -> String {
    DEFAULT_TOKEN_URI.to_string()
}

impl Credential {
    /// True when the token is present and not within the expiry skew.
    /// A credential without expiry never expires.
    pub fn is_valid(&self) -> bool {
        self.is_valid_at(Utc::now())
    }

    pub fn is_valid_at(&self, now: DateTime<Utc>) -> bool {
        if self.access_token.is_empty() {
            return false;
        }
        match self.expiry {
            Some(exp) => now + Duration::seconds(EXPIRY_SKEW_SECS) < exp,
            None => true,
        }
    }

    /// `Authorization` header value.
    pub fn authorization_header(&self) -> String {
        format!("{} {}", self.token_type, self.access_token)
    }

    /// Apply a refresh grant. Keeps the old refresh token when the grant
    /// does not rotate it.
    pub fn refreshed(&self, grant: TokenGrant) -> Self {
        let mut next = self.clone();
        next.access_token = grant.access_token;
        if let Some(token_type) = grant.token_type {
            next.token_type = token_type;
        }
        next.expiry = grant.expiry;
        if let Some(rt) = grant.refresh_token {
            next.refresh_token = Some(rt);
        }
        if !grant.scopes.is_empty() {
            next.scopes = grant.scopes;
        }
        next
    }
}

/// Token endpoint response, already converted to absolute expiry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenGrant {
    pub access_token: String,
    pub token_type: Option<String>,
    pub expiry: Option<DateTime<Utc>>,
    pub refresh_token: Option<String>,
    pub scopes: Vec<String>,
}

/// OAuth client registration read from the client secret file.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ClientSecret {
    pub client_id: String,
    pub client_secret: String,
    #[serde(default = "default_auth_uri")]
    pub auth_uri: String,
    #[serde(default = "default_token_uri")]
    pub token_uri: String,
}

fn default_auth_uri() -> String {
    "https://accounts.google.com/o/oauth2/auth".to_string()
}

#[derive(Deserialize)]
struct ClientSecretFile {
    installed: Option<ClientSecret>,
    web: Option<ClientSecret>,
}

impl ClientSecret {
    /// Load an `installed` (or `web`) client secret file.
    pub fn load(path: &Path) -> Result<Self, AuthError> {
        if !path.exists() {
            return Err(AuthError::MissingClientSecret(path.to_path_buf()));
        }
        let content = std::fs::read_to_string(path).map_err(|e| AuthError::InvalidClientSecret {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
        Self::parse(&content).map_err(|reason| AuthError::InvalidClientSecret {
            path: path.to_path_buf(),
            reason,
        })
    }

    fn parse(content: &str) -> Result<Self, String> {
        let file: ClientSecretFile = serde_json::from_str(content).map_err(|e| e.to_string())?;
        file.installed
            .or(file.web)
            .ok_or_else(|| "expected an \"installed\" or \"web\" client section".to_string())
    }
}

/// Exchanges a refresh token for a new access token.
#[async_trait]
pub trait TokenRefresher: Send + Sync {
    async fn refresh(&self, credential: &Credential) -> anyhow::Result<TokenGrant>;
}

/// Mints a brand-new credential through user consent.
#[async_trait]
pub trait ConsentFlow: Send + Sync {
    async fn authorize(&self, secret: &ClientSecret, scopes: &[String])
        -> anyhow::Result<Credential>;
}

pub struct CredentialStore {
    token_path: PathBuf,
    client_secret_path: PathBuf,
    scopes: Vec<String>,
    refresher: Arc<dyn TokenRefresher>,
    consent: Arc<dyn ConsentFlow>,
    current: Mutex<Option<Credential>>,
}

impl CredentialStore {
    pub fn new(
        token_path: impl Into<PathBuf>,
        client_secret_path: impl Into<PathBuf>,
        scopes: Vec<String>,
        refresher: Arc<dyn TokenRefresher>,
        consent: Arc<dyn ConsentFlow>,
    ) -> Self {
        Self {
            token_path: token_path.into(),
            client_secret_path: client_secret_path.into(),
            scopes,
            refresher,
            consent,
            current: Mutex::new(None),
        }
    }

    pub fn token_path(&self) -> &Path {
        &self.token_path
    }

    pub fn client_secret_path(&self) -> &Path {
        &self.client_secret_path
    }

    /// Return a valid credential, refreshing or re-minting as needed.
    pub async fn obtain(&self) -> Result<Credential, AuthError> {
        let mut current = self.current.lock().await;

        let existing = match current.take() {
            Some(c) => Some(c),
            None => self.load()?,
        };

        let mut refresh_failure = None;
        if let Some(cred) = existing {
            if cred.is_valid() {
                *current = Some(cred.clone());
                return Ok(cred);
            }
            if cred.refresh_token.is_some() {
                debug!(path = %self.token_path.display(), "credential expired, refreshing");
                match self.refresher.refresh(&cred).await {
                    Ok(grant) => {
                        let refreshed = cred.refreshed(grant);
                        self.persist(&refreshed)?;
                        info!(expiry = ?refreshed.expiry, "credential refreshed");
                        *current = Some(refreshed.clone());
                        return Ok(refreshed);
                    }
                    Err(e) => {
                        warn!(error = %e, "token refresh failed, falling back to consent");
                        refresh_failure = Some(format!("{:#}", e));
                    }
                }
            }
        }

        let secret = ClientSecret::load(&self.client_secret_path)?;
        let minted = match self.consent.authorize(&secret, &self.scopes).await {
            Ok(c) => c,
            Err(e) => {
                let consent = format!("{:#}", e);
                return Err(match refresh_failure {
                    Some(refresh) => AuthError::RefreshFailed { refresh, consent },
                    None => AuthError::ConsentFailed(consent),
                });
            }
        };
        self.persist(&minted)?;
        info!(path = %self.token_path.display(), "new credential stored");
        *current = Some(minted.clone());
        Ok(minted)
    }

    fn load(&self) -> Result<Option<Credential>, AuthError> {
        if !self.token_path.exists() {
            return Ok(None);
        }
        let content = std::fs::read_to_string(&self.token_path).map_err(|e| self.storage(e))?;
        match serde_json::from_str::<Credential>(&content) {
            Ok(c) => Ok(Some(c)),
            Err(e) => {
                // An unreadable token file is replaced on the next mint.
                warn!(path = %self.token_path.display(), error = %e, "ignoring malformed token file");
                Ok(None)
            }
        }
    }

    /// Write the credential to a fresh owner-only temp file in the same
    /// directory, then rename it over the token file.
    fn persist(&self, credential: &Credential) -> Result<(), AuthError> {
        let dir = match self.token_path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };
        std::fs::create_dir_all(&dir).map_err(|e| self.storage(e))?;
        let json = serde_json::to_string_pretty(credential).map_err(|e| self.storage(e))?;

        let mut file = NamedTempFile::new_in(&dir).map_err(|e| self.storage(e))?;
        restrict_permissions(file.as_file()).map_err(|e| self.storage(e))?;
        file.write_all(json.as_bytes()).map_err(|e| self.storage(e))?;
        file.as_file().sync_all().map_err(|e| self.storage(e))?;
        file.persist(&self.token_path).map_err(|e| self.storage(e.error))?;
        Ok(())
    }

    fn storage(&self, e: impl std::fmt::Display) -> AuthError {
        AuthError::Storage {
            path: self.token_path.clone(),
            reason: e.to_string(),
        }
    }
}

#[cfg(unix)]
fn restrict_permissions(file: &File) -> std::io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    file.set_permissions(std::fs::Permissions::from_mode(0o600))
}

#[cfg(not(unix))]
fn restrict_permissions(_file: &File) -> std::io::Result<()> {
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tempfile::TempDir;

    fn credential(expiry: Option<DateTime<Utc>>, refresh: Option<&str>) -> Credential {
        Credential {
            access_token: "old-token".to_string(),
            refresh_token: refresh.map(String::from),
            token_type: "Bearer".to_string(),
            expiry,
            scopes: vec!["docs".to_string()],
            client_id: "client".to_string(),
            client_secret: Some("secret".to_string()),
            token_uri: DEFAULT_TOKEN_URI.to_string(),
        }
    }

    struct CountingRefresher {
        calls: AtomicUsize,
        fail: bool,
    }

    #[async_trait]
    impl TokenRefresher for CountingRefresher {
        async fn refresh(&self, _credential: &Credential) -> anyhow::Result<TokenGrant> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                anyhow::bail!("invalid_grant");
            }
            Ok(TokenGrant {
                access_token: "fresh-token".to_string(),
                token_type: None,
                expiry: Some(Utc::now() + Duration::hours(1)),
                refresh_token: None,
                scopes: vec![],
            })
        }
    }

    struct CountingConsent {
        calls: AtomicUsize,
        fail: bool,
    }

    #[async_trait]
    impl ConsentFlow for CountingConsent {
        async fn authorize(
            &self,
            secret: &ClientSecret,
            scopes: &[String],
        ) -> anyhow::Result<Credential> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                anyhow::bail!("user denied access");
            }
            Ok(Credential {
                access_token: "minted-token".to_string(),
                refresh_token: Some("minted-refresh".to_string()),
                token_type: "Bearer".to_string(),
                expiry: Some(Utc::now() + Duration::hours(1)),
                scopes: scopes.to_vec(),
                client_id: secret.client_id.clone(),
                client_secret: Some(secret.client_secret.clone()),
                token_uri: secret.token_uri.clone(),
            })
        }
    }

    struct Harness {
        _tmp: TempDir,
        store: CredentialStore,
        refresher: Arc<CountingRefresher>,
        consent: Arc<CountingConsent>,
        token_path: PathBuf,
        secret_path: PathBuf,
    }

    fn harness(refresh_fails: bool, consent_fails: bool) -> Harness {
        let tmp = TempDir::new().unwrap();
        let token_path = tmp.path().join("token.json");
        let secret_path = tmp.path().join("credentials.json");
        let refresher = Arc::new(CountingRefresher {
            calls: AtomicUsize::new(0),
            fail: refresh_fails,
        });
        let consent = Arc::new(CountingConsent {
            calls: AtomicUsize::new(0),
            fail: consent_fails,
        });
        let store = CredentialStore::new(
            &token_path,
            &secret_path,
            vec!["docs".to_string()],
            refresher.clone(),
            consent.clone(),
        );
        Harness {
            _tmp: tmp,
            store,
            refresher,
            consent,
            token_path,
            secret_path,
        }
    }

    fn write_token(path: &Path, cred: &Credential) {
        std::fs::write(path, serde_json::to_string(cred).unwrap()).unwrap();
    }

    fn write_secret(path: &Path) {
        std::fs::write(
            path,
            r#"{"installed":{"client_id":"cid","client_secret":"csecret","auth_uri":"https://auth.example/auth","token_uri":"https://auth.example/token"}}"#,
        )
        .unwrap();
    }

    #[test]
    fn test_validity_window() {
        let now = Utc::now();
        assert!(credential(None, None).is_valid_at(now));
        assert!(credential(Some(now + Duration::hours(1)), None).is_valid_at(now));
        assert!(!credential(Some(now + Duration::seconds(30)), None).is_valid_at(now));
        assert!(!credential(Some(now - Duration::hours(1)), None).is_valid_at(now));

        let mut empty = credential(None, None);
        empty.access_token.clear();
        assert!(!empty.is_valid_at(now));
    }

    #[test]
    fn test_refreshed_keeps_refresh_token_when_not_rotated() {
        let cred = credential(None, Some("rt-1"));
        let next = cred.refreshed(TokenGrant {
            access_token: "new".to_string(),
            token_type: None,
            expiry: None,
            refresh_token: None,
            scopes: vec![],
        });
        assert_eq!(next.access_token, "new");
        assert_eq!(next.refresh_token.as_deref(), Some("rt-1"));
        assert_eq!(next.scopes, vec!["docs"]);
    }

    #[test]
    fn test_client_secret_web_section() {
        let secret =
            ClientSecret::parse(r#"{"web":{"client_id":"a","client_secret":"b"}}"#).unwrap();
        assert_eq!(secret.client_id, "a");
        assert_eq!(secret.token_uri, DEFAULT_TOKEN_URI);
    }

    #[test]
    fn test_client_secret_invalid_json() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("credentials.json");
        std::fs::write(&path, "not json").unwrap();
        let err = ClientSecret::load(&path).unwrap_err();
        assert!(matches!(err, AuthError::InvalidClientSecret { .. }));
    }

    #[tokio::test]
    async fn test_valid_token_returned_unchanged() {
        let h = harness(false, false);
        let cred = credential(Some(Utc::now() + Duration::hours(1)), Some("rt"));
        write_token(&h.token_path, &cred);

        let got = h.store.obtain().await.unwrap();
        assert_eq!(got, cred);
        assert_eq!(h.refresher.calls.load(Ordering::SeqCst), 0);
        assert_eq!(h.consent.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_expired_token_refreshed_and_persisted() {
        let h = harness(false, false);
        write_token(
            &h.token_path,
            &credential(Some(Utc::now() - Duration::hours(1)), Some("rt")),
        );

        let got = h.store.obtain().await.unwrap();
        assert_eq!(got.access_token, "fresh-token");
        assert_eq!(got.refresh_token.as_deref(), Some("rt"));
        assert_eq!(h.consent.calls.load(Ordering::SeqCst), 0);

        let on_disk: Credential =
            serde_json::from_str(&std::fs::read_to_string(&h.token_path).unwrap()).unwrap();
        assert_eq!(on_disk.access_token, "fresh-token");
        assert!(on_disk.expiry.unwrap() > Utc::now());
    }

    #[tokio::test]
    async fn test_cached_credential_avoids_second_refresh() {
        let h = harness(false, false);
        write_token(
            &h.token_path,
            &credential(Some(Utc::now() - Duration::hours(1)), Some("rt")),
        );
        h.store.obtain().await.unwrap();
        h.store.obtain().await.unwrap();
        assert_eq!(h.refresher.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_missing_everything_is_missing_client_secret() {
        let h = harness(false, false);
        let err = h.store.obtain().await.unwrap_err();
        assert!(matches!(err, AuthError::MissingClientSecret(_)));
        assert_eq!(h.consent.calls.load(Ordering::SeqCst), 0);
        assert!(!h.token_path.exists());
    }

    #[tokio::test]
    async fn test_refresh_failure_without_secret_is_missing_client_secret() {
        let h = harness(true, false);
        write_token(
            &h.token_path,
            &credential(Some(Utc::now() - Duration::hours(1)), Some("rt")),
        );
        let err = h.store.obtain().await.unwrap_err();
        assert!(matches!(err, AuthError::MissingClientSecret(_)));
        assert_eq!(h.refresher.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_refresh_failure_falls_back_to_consent() {
        let h = harness(true, false);
        write_secret(&h.secret_path);
        write_token(
            &h.token_path,
            &credential(Some(Utc::now() - Duration::hours(1)), Some("rt")),
        );

        let got = h.store.obtain().await.unwrap();
        assert_eq!(got.access_token, "minted-token");
        assert_eq!(got.client_id, "cid");
        assert_eq!(h.consent.calls.load(Ordering::SeqCst), 1);

        let on_disk: Credential =
            serde_json::from_str(&std::fs::read_to_string(&h.token_path).unwrap()).unwrap();
        assert_eq!(on_disk.access_token, "minted-token");
    }

    #[tokio::test]
    async fn test_refresh_and_consent_failure_is_refresh_failed() {
        let h = harness(true, true);
        write_secret(&h.secret_path);
        write_token(
            &h.token_path,
            &credential(Some(Utc::now() - Duration::hours(1)), Some("rt")),
        );
        let err = h.store.obtain().await.unwrap_err();
        match err {
            AuthError::RefreshFailed { refresh, consent } => {
                assert!(refresh.contains("invalid_grant"));
                assert!(consent.contains("user denied"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_expired_without_refresh_token_goes_to_consent() {
        let h = harness(false, false);
        write_secret(&h.secret_path);
        write_token(
            &h.token_path,
            &credential(Some(Utc::now() - Duration::hours(1)), None),
        );
        let got = h.store.obtain().await.unwrap();
        assert_eq!(got.access_token, "minted-token");
        assert_eq!(h.refresher.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_malformed_token_file_triggers_consent() {
        let h = harness(false, false);
        write_secret(&h.secret_path);
        std::fs::write(&h.token_path, "{broken").unwrap();
        let got = h.store.obtain().await.unwrap();
        assert_eq!(got.access_token, "minted-token");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_token_file_is_owner_only() {
        use std::os::unix::fs::PermissionsExt;
        let h = harness(false, false);
        write_secret(&h.secret_path);
        h.store.obtain().await.unwrap();
        let mode = std::fs::metadata(&h.token_path).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_refresh_replaces_world_readable_token_file() {
        use std::os::unix::fs::PermissionsExt;
        let h = harness(false, false);
        write_token(
            &h.token_path,
            &credential(Some(Utc::now() - Duration::hours(1)), Some("rt")),
        );
        std::fs::set_permissions(&h.token_path, std::fs::Permissions::from_mode(0o644)).unwrap();

        h.store.obtain().await.unwrap();

        let mode = std::fs::metadata(&h.token_path).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
        let mut names: Vec<String> = std::fs::read_dir(h._tmp.path())
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        names.sort();
        assert_eq!(names, vec!["token.json"]);
    }
}
