//! ============================================================================
//! Api Client - Request exchange with transparent token renewal
//! ============================================================================
//! Protected calls carry the current access token as a bearer credential. On
//! a 401, exactly one refresh call runs regardless of how many concurrent
//! calls triggered it; the others enqueue as pending waiters and all settle
//! together with the refresh outcome. Each call is replayed at most once —
//! a second 401 after replay terminates with `ApiError::SessionExpired`.
//! ============================================================================

use std::sync::Arc;
use std::time::Duration;

use reqwest::{Method, StatusCode};
use serde::de::DeserializeOwned;
use serde_json::Value;
use tokio::sync::{oneshot, Mutex};
use tracing::{debug, info, warn};

use super::paths;
use super::types::{
    AcceptanceStatus, LoginResponse, PaymentSession, RefreshResponse, SaleItem, SubscriptionInfo,
    TermsDocument, UserProfile,
};
use crate::access::SubscriptionTier;
use crate::error::ApiError;
use crate::session::{RefreshOutcome, Session, SessionSnapshot};
use crate::token_store::{TokenPair, TokenStore};

/// Fixed upper bound on every HTTP call.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(15);

/// Request client configuration.
#[derive(Debug, Clone)]
pub struct ApiConfig {
    /// Base URL of the remote API, e.g. `https://api.example.com/api`.
    pub base_url: String,
    /// Per-request timeout.
    pub timeout: Duration,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8080/api".to_string(),
            timeout: REQUEST_TIMEOUT,
        }
    }
}

impl ApiConfig {
    /// Create config from environment (`SIGNALS_API_URL`).
    pub fn from_env() -> Self {
        Self {
            base_url: std::env::var("SIGNALS_API_URL")
                .unwrap_or_else(|_| "http://localhost:8080/api".to_string()),
            timeout: REQUEST_TIMEOUT,
        }
    }
}

/// Authenticated request client. Owns the session and the token store; the
/// presentation layer never touches either directly. Create one at app start
/// and tear it down at logout.
pub struct ApiClient {
    http: reqwest::Client,
    config: ApiConfig,
    store: Arc<dyn TokenStore>,
    session: Arc<Mutex<Session>>,
}

impl ApiClient {
    /// Create a client, restoring any persisted session from the token store.
    /// The store read completes before the client is usable.
    pub fn new(config: ApiConfig, store: Arc<dyn TokenStore>) -> Result<Self, ApiError> {
        let http = reqwest::Client::builder().timeout(config.timeout).build()?;

        let mut session = Session::default();
        if let Some(pair) = store.load()? {
            debug!("restored persisted session tokens");
            session.set_tokens(&pair);
        }

        Ok(Self {
            http,
            config,
            store,
            session: Arc::new(Mutex::new(session)),
        })
    }

    // ========================================================================
    // Request lifecycle
    // ========================================================================

    /// Perform a request against the API, keeping the caller authenticated.
    ///
    /// Public paths pass through unmodified. Protected paths carry the
    /// current access token and are replayed at most once after a refresh.
    pub async fn request(
        &self,
        method: Method,
        path: &str,
        body: Option<&Value>,
    ) -> Result<Value, ApiError> {
        if paths::is_public(path) {
            let resp = self.send(method, path, body, None).await?;
            return Self::decode_value(resp).await;
        }

        let token = { self.session.lock().await.access_token.clone() };
        let resp = self
            .send(method.clone(), path, body, token.as_deref())
            .await?;
        if resp.status() != StatusCode::UNAUTHORIZED {
            return Self::decode_value(resp).await;
        }

        // 401 on a protected call: run (or join) the single-flight refresh,
        // then replay exactly once with the new token.
        debug!(%path, "unauthorized, entering refresh protocol");
        let new_token = self.refresh_access_token().await?;
        let resp = self.send(method, path, body, Some(&new_token)).await?;
        if resp.status() == StatusCode::UNAUTHORIZED {
            warn!(%path, "replayed call rejected again, session expired");
            return Err(ApiError::SessionExpired);
        }
        Self::decode_value(resp).await
    }

    async fn send(
        &self,
        method: Method,
        path: &str,
        body: Option<&Value>,
        bearer: Option<&str>,
    ) -> Result<reqwest::Response, ApiError> {
        let url = format!(
            "{}/{}",
            self.config.base_url.trim_end_matches('/'),
            path.trim_start_matches('/')
        );

        let mut request = self.http.request(method, url);
        if let Some(token) = bearer {
            request = request.bearer_auth(token);
        }
        if let Some(body) = body {
            request = request.json(body);
        }
        Ok(request.send().await?)
    }

    async fn decode_value(resp: reqwest::Response) -> Result<Value, ApiError> {
        let status = resp.status();
        let bytes = resp.bytes().await?;

        if status.is_success() {
            if bytes.is_empty() {
                return Ok(Value::Null);
            }
            return serde_json::from_slice(&bytes).map_err(|e| ApiError::Decode(e.to_string()));
        }

        let message = String::from_utf8_lossy(&bytes).into_owned();
        if status.is_server_error() {
            Err(ApiError::Server {
                status: status.as_u16(),
                message,
            })
        } else {
            Err(ApiError::Validation {
                status: status.as_u16(),
                message,
            })
        }
    }

    async fn execute<T: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        body: Option<&Value>,
    ) -> Result<T, ApiError> {
        let value = self.request(method, path, body).await?;
        serde_json::from_value(value).map_err(|e| ApiError::Decode(e.to_string()))
    }

    // ========================================================================
    // Refresh protocol (single-flight)
    // ========================================================================

    /// Obtain a fresh access token. The first caller to arrive owns the
    /// refresh cycle; everyone else enqueues and settles with its outcome.
    async fn refresh_access_token(&self) -> Result<String, ApiError> {
        let waiter = {
            let mut session = self.session.lock().await;
            if session.refresh_in_flight {
                let (tx, rx) = oneshot::channel();
                session.waiters.push(tx);
                Some(rx)
            } else {
                session.refresh_in_flight = true;
                None
            }
        };

        if let Some(rx) = waiter {
            debug!("refresh already in flight, queued as pending request");
            return match rx.await {
                Ok(RefreshOutcome::Refreshed(token)) => Ok(token),
                _ => Err(ApiError::SessionExpired),
            };
        }

        // We own this refresh cycle.
        let outcome = self.run_refresh().await;

        let mut session = self.session.lock().await;
        session.refresh_in_flight = false;
        let waiters = std::mem::take(&mut session.waiters);

        match outcome {
            Ok(pair) => {
                session.set_tokens(&pair);
                info!(
                    pending = waiters.len(),
                    "access token refreshed, releasing pending requests"
                );
                for tx in waiters {
                    let _ = tx.send(RefreshOutcome::Refreshed(pair.access_token.clone()));
                }
                Ok(pair.access_token)
            }
            Err(e) => {
                warn!("refresh failed, session cleared: {}", e);
                session.clear_tokens();
                for tx in waiters {
                    let _ = tx.send(RefreshOutcome::Expired);
                }
                Err(ApiError::SessionExpired)
            }
        }
    }

    /// One refresh cycle: read the refresh token from the store, exchange it
    /// unauthenticated, persist the rotated pair before returning. Any
    /// failure clears both tokens from the store.
    async fn run_refresh(&self) -> Result<TokenPair, ApiError> {
        let Some(persisted) = self.store.load()? else {
            // No refresh token: fail immediately, no network call.
            self.store.clear()?;
            return Err(ApiError::SessionExpired);
        };

        let body = serde_json::json!({ "refreshToken": persisted.refresh_token.clone() });
        let result = async {
            let resp = self
                .send(Method::POST, paths::TOKEN_REFRESH, Some(&body), None)
                .await?;
            let status = resp.status();
            if !status.is_success() {
                let message = resp.text().await.unwrap_or_default();
                return Err(ApiError::Validation {
                    status: status.as_u16(),
                    message,
                });
            }
            let rotated: RefreshResponse = resp
                .json()
                .await
                .map_err(|e| ApiError::Decode(e.to_string()))?;
            Ok(TokenPair {
                access_token: rotated.access_token,
                // Keep the old refresh token when the server does not rotate.
                refresh_token: rotated
                    .refresh_token
                    .unwrap_or(persisted.refresh_token),
            })
        }
        .await;

        match result {
            Ok(pair) => {
                self.store.save(&pair)?;
                Ok(pair)
            }
            Err(e) => {
                self.store.clear()?;
                Err(e)
            }
        }
    }

    // ========================================================================
    // Session management
    // ========================================================================

    /// Current access token, if authenticated. Used to address the stream.
    pub async fn access_token(&self) -> Option<String> {
        self.session.lock().await.access_token.clone()
    }

    /// Diagnostics view of the session. Never exposes token values.
    pub async fn session_snapshot(&self) -> SessionSnapshot {
        self.session.lock().await.snapshot()
    }

    /// Clear the session and the token store. In-flight calls are not
    /// cancelled; subsequent protected calls fail fast.
    pub async fn logout(&self) -> Result<(), ApiError> {
        self.session.lock().await.clear_tokens();
        self.store.clear()?;
        info!("logged out, session cleared");
        Ok(())
    }

    // ========================================================================
    // Typed endpoints
    // ========================================================================

    /// `POST auth/login`: authenticate and persist the issued token pair.
    pub async fn login(&self, email: &str, password: &str) -> Result<(), ApiError> {
        let body = serde_json::json!({ "email": email, "password": password });
        let tokens: LoginResponse = self
            .execute(Method::POST, paths::LOGIN, Some(&body))
            .await?;
        let pair = TokenPair {
            access_token: tokens.access_token,
            refresh_token: tokens.refresh_token,
        };
        self.store.save(&pair)?;
        self.session.lock().await.set_tokens(&pair);
        info!("login succeeded");
        Ok(())
    }

    /// `POST auth/register`.
    pub async fn register(
        &self,
        email: &str,
        password: &str,
        name: Option<&str>,
    ) -> Result<(), ApiError> {
        let body = serde_json::json!({ "email": email, "password": password, "name": name });
        self.request(Method::POST, paths::REGISTER, Some(&body))
            .await?;
        Ok(())
    }

    /// `POST auth/activate` with an emailed activation code.
    pub async fn activate(&self, code: &str) -> Result<(), ApiError> {
        let body = serde_json::json!({ "code": code });
        self.request(Method::POST, paths::ACTIVATE, Some(&body))
            .await?;
        Ok(())
    }

    /// `POST auth/password-reset-request`.
    pub async fn request_password_reset(&self, email: &str) -> Result<(), ApiError> {
        let body = serde_json::json!({ "email": email });
        self.request(Method::POST, paths::PASSWORD_RESET_REQUEST, Some(&body))
            .await?;
        Ok(())
    }

    /// `GET auth/me`.
    pub async fn me(&self) -> Result<UserProfile, ApiError> {
        self.execute(Method::GET, paths::ME, None).await
    }

    /// `GET users/subscription`.
    pub async fn subscription(&self) -> Result<SubscriptionInfo, ApiError> {
        self.execute(Method::GET, paths::SUBSCRIPTION, None).await
    }

    /// Pull the current subscription tier. The caller decides when to
    /// refresh and where to cache it; nothing here is render-triggered.
    pub async fn fetch_subscription_tier(&self) -> Result<SubscriptionTier, ApiError> {
        Ok(self.subscription().await?.tier)
    }

    /// `GET acceptance/has-accepted-latest`.
    pub async fn has_accepted_latest(&self) -> Result<bool, ApiError> {
        let status: AcceptanceStatus = self
            .execute(Method::GET, paths::HAS_ACCEPTED_LATEST, None)
            .await?;
        Ok(status.has_accepted_latest)
    }

    /// `POST acceptance/accept-latest`.
    pub async fn accept_latest(&self) -> Result<(), ApiError> {
        self.request(Method::POST, paths::ACCEPT_LATEST, None)
            .await?;
        Ok(())
    }

    /// `GET terms/latest`.
    pub async fn latest_terms(&self) -> Result<TermsDocument, ApiError> {
        self.execute(Method::GET, paths::LATEST_TERMS, None).await
    }

    /// `POST payment/create`: returns the opaque checkout redirect URL.
    pub async fn create_payment(&self, plan: &str) -> Result<PaymentSession, ApiError> {
        let body = serde_json::json!({ "plan": plan });
        self.execute(Method::POST, paths::PAYMENT_CREATE, Some(&body))
            .await
    }

    /// `GET sale`.
    pub async fn sales(&self) -> Result<Vec<SaleItem>, ApiError> {
        self.execute(Method::GET, paths::SALE, None).await
    }
}
