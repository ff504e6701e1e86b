//! Google OAuth 2.0 flows.
//!
//! [`GoogleOAuth`] implements both credential seams:
//!
//! - [`TokenRefresher`]: `refresh_token` grant against the credential's
//!   `token_uri`.
//! - [`ConsentFlow`]: installed-app loopback flow. A small `axum` server is
//!   bound on `127.0.0.1`, the authorization URL is presented to the user,
//!   the first redirect carrying `code` (or `error`) is handed back, and the
//!   code is exchanged with a PKCE (S256) verifier. Offline access is
//!   requested so the minted credential carries a refresh token.

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::routing::get;
use axum::Router;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::{DateTime, Utc};
use reqwest::{Client, Url};
use serde::Deserialize;
use sha2::{Digest, Sha256};
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tracing::{info, warn};
use uuid::Uuid;

use crate::credential::{ClientSecret, ConsentFlow, Credential, TokenGrant, TokenRefresher};

const CALLBACK_PAGE: &str = "The ByteBrief authorization flow has completed. You may close this window.";

type UrlSink = Box<dyn Fn(&str) + Send + Sync>;

pub struct GoogleOAuth {
    client: Client,
    redirect_port: u16,
    consent_timeout: Duration,
    present_url: UrlSink,
}

impl GoogleOAuth {
    pub fn new(timeout: Duration, redirect_port: u16, consent_timeout: Duration) -> Result<Self> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            redirect_port,
            consent_timeout,
            present_url: Box::new(|url| {
                eprintln!("Please visit this URL to authorize ByteBrief:\n\n    {}\n", url);
            }),
        })
    }

    /// Replace how the authorization URL is shown to the user.
    pub fn with_url_sink(mut self, sink: impl Fn(&str) + Send + Sync + 'static) -> Self {
        self.present_url = Box::new(sink);
        self
    }

    async fn token_request(&self, token_uri: &str, params: &[(&str, &str)]) -> Result<TokenGrant> {
        let resp = self
            .client
            .post(token_uri)
            .form(params)
            .send()
            .await
            .with_context(|| format!("token request to {} failed", token_uri))?;

        if !resp.status().is_success() {
            let status = resp.status();
            let detail = match resp.json::<TokenErrorResponse>().await {
                Ok(err) => format!(
                    "{}: {}",
                    err.error,
                    err.error_description.unwrap_or_default()
                ),
                Err(_) => "unknown_error".to_string(),
            };
            bail!("token endpoint returned HTTP {} ({})", status, detail);
        }

        let token: TokenResponse = resp
            .json()
            .await
            .context("token endpoint returned an invalid response")?;
        Ok(token.into_grant(Utc::now()))
    }

    async fn exchange_code(
        &self,
        secret: &ClientSecret,
        code: &str,
        redirect_uri: &str,
        verifier: &str,
    ) -> Result<TokenGrant> {
        self.token_request(
            &secret.token_uri,
            &[
                ("grant_type", "authorization_code"),
                ("code", code),
                ("client_id", secret.client_id.as_str()),
                ("client_secret", secret.client_secret.as_str()),
                ("redirect_uri", redirect_uri),
                ("code_verifier", verifier),
            ],
        )
        .await
    }
}

#[async_trait]
impl TokenRefresher for GoogleOAuth {
    async fn refresh(&self, credential: &Credential) -> Result<TokenGrant> {
        let refresh_token = credential
            .refresh_token
            .as_deref()
            .ok_or_else(|| anyhow!("credential has no refresh token"))?;
        let mut params = vec![
            ("grant_type", "refresh_token"),
            ("refresh_token", refresh_token),
            ("client_id", credential.client_id.as_str()),
        ];
        if let Some(secret) = &credential.client_secret {
            params.push(("client_secret", secret.as_str()));
        }
        self.token_request(&credential.token_uri, &params).await
    }
}

#[async_trait]
impl ConsentFlow for GoogleOAuth {
    async fn authorize(&self, secret: &ClientSecret, scopes: &[String]) -> Result<Credential> {
        let listener = TcpListener::bind(("127.0.0.1", self.redirect_port))
            .await
            .with_context(|| format!("failed to bind loopback port {}", self.redirect_port))?;
        let port = listener.local_addr()?.port();
        let redirect_uri = format!("http://127.0.0.1:{}/", port);
        let state = Uuid::new_v4().simple().to_string();
        let pkce = Pkce::generate();

        let (callback_tx, callback_rx) = oneshot::channel();
        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
        let app = callback_router(callback_tx);
        tokio::spawn(async move {
            let server = axum::serve(listener, app).with_graceful_shutdown(async move {
                let _ = shutdown_rx.await;
            });
            if let Err(e) = server.await {
                warn!(error = %e, "redirect listener failed");
            }
        });

        let url = authorization_url(secret, scopes, &redirect_uri, &state, &pkce.challenge)?;
        (self.present_url)(url.as_str());
        info!(port, "waiting for authorization redirect");

        let received = tokio::time::timeout(self.consent_timeout, callback_rx).await;
        let _ = shutdown_tx.send(());
        let callback = received
            .map_err(|_| {
                anyhow!(
                    "no authorization received within {}s",
                    self.consent_timeout.as_secs()
                )
            })?
            .map_err(|_| anyhow!("redirect listener stopped before authorization"))?;

        if let Some(error) = callback.error {
            bail!("authorization was denied: {}", error);
        }
        if callback.state.as_deref() != Some(state.as_str()) {
            bail!("authorization state mismatch");
        }
        let code = callback
            .code
            .ok_or_else(|| anyhow!("redirect did not carry an authorization code"))?;

        let grant = self
            .exchange_code(secret, &code, &redirect_uri, &pkce.verifier)
            .await?;
        let scopes = if grant.scopes.is_empty() {
            scopes.to_vec()
        } else {
            grant.scopes
        };
        Ok(Credential {
            access_token: grant.access_token,
            refresh_token: grant.refresh_token,
            token_type: grant.token_type.unwrap_or_else(|| "Bearer".to_string()),
            expiry: grant.expiry,
            scopes,
            client_id: secret.client_id.clone(),
            client_secret: Some(secret.client_secret.clone()),
            token_uri: secret.token_uri.clone(),
        })
    }
}

/// Build the consent URL.
pub fn authorization_url(
    secret: &ClientSecret,
    scopes: &[String],
    redirect_uri: &str,
    state: &str,
    challenge: &str,
) -> Result<Url> {
    let scope = scopes.join(" ");
    Url::parse_with_params(
        &secret.auth_uri,
        &[
            ("response_type", "code"),
            ("client_id", secret.client_id.as_str()),
            ("redirect_uri", redirect_uri),
            ("scope", scope.as_str()),
            ("state", state),
            ("code_challenge", challenge),
            ("code_challenge_method", "S256"),
            ("access_type", "offline"),
            ("prompt", "consent"),
        ],
    )
    .with_context(|| format!("invalid auth_uri: {}", secret.auth_uri))
}

/// PKCE verifier and its S256 challenge.
struct Pkce {
    verifier: String,
    challenge: String,
}

impl Pkce {
    fn generate() -> Self {
        let verifier = format!(
            "{}{}",
            Uuid::new_v4().simple(),
            Uuid::new_v4().simple()
        );
        let challenge = s256_challenge(&verifier);
        Self {
            verifier,
            challenge,
        }
    }
}

fn s256_challenge(verifier: &str) -> String {
    URL_SAFE_NO_PAD.encode(Sha256::digest(verifier.as_bytes()))
}

/// Query parameters of the redirect request.
#[derive(Debug, Default, PartialEq, Eq, Deserialize)]
struct Callback {
    code: Option<String>,
    state: Option<String>,
    error: Option<String>,
}

/// Sender for the first usable redirect; emptied once it fires.
type CallbackSlot = Arc<Mutex<Option<oneshot::Sender<Callback>>>>;

fn callback_router(sender: oneshot::Sender<Callback>) -> Router {
    let slot: CallbackSlot = Arc::new(Mutex::new(Some(sender)));
    Router::new()
        .route("/", get(receive_callback))
        .with_state(slot)
}

async fn receive_callback(
    State(slot): State<CallbackSlot>,
    Query(callback): Query<Callback>,
) -> (StatusCode, &'static str) {
    if callback.code.is_none() && callback.error.is_none() {
        return (StatusCode::BAD_REQUEST, "Missing authorization code.");
    }
    let sender = slot.lock().unwrap_or_else(PoisonError::into_inner).take();
    match sender {
        Some(tx) => {
            let _ = tx.send(callback);
            (StatusCode::OK, CALLBACK_PAGE)
        }
        None => (StatusCode::CONFLICT, "Authorization was already received."),
    }
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    token_type: Option<String>,
    #[serde(default)]
    expires_in: Option<i64>,
    #[serde(default)]
    refresh_token: Option<String>,
    #[serde(default)]
    scope: Option<String>,
}

impl TokenResponse {
    fn into_grant(self, now: DateTime<Utc>) -> TokenGrant {
        TokenGrant {
            access_token: self.access_token,
            token_type: self.token_type,
            expiry: self
                .expires_in
                .map(|secs| now + chrono::Duration::seconds(secs)),
            refresh_token: self.refresh_token,
            scopes: self
                .scope
                .map(|s| s.split_whitespace().map(String::from).collect())
                .unwrap_or_default(),
        }
    }
}

#[derive(Deserialize)]
struct TokenErrorResponse {
    error: String,
    #[serde(default)]
    error_description: Option<String>,
}
