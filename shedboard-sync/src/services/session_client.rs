//! Upstream session client
//!
//! Owns the authenticated session against the booking site. Callers never
//! manage sessions themselves: they ask for one with
//! [`SessionClient::ensure_session`] and issue requests through
//! [`SessionClient::request`], which re-authenticates once on rejection.
//!
//! # Login sequence
//! 1. `GET /login`, pick up cookies and a CSRF token
//! 2. `POST /login` with credentials, token, `Referer` and `Origin`
//! 3. `GET /bookings` and look for the logged-in marker
//!
//! The login POST is known to answer with a server-error status even when
//! it succeeded, so its status is only used to short-circuit on explicit
//! rejections. Step 3 is what decides success.

use crate::settings::{AuthSettings, Credentials, SyncSettings};
use crate::utils::html::{contains_ci, opening_tags};
use crate::utils::retry_with_backoff;
use chrono::{DateTime, Utc};
use reqwest::header::{ORIGIN, REFERER};
use reqwest::{Method, StatusCode, Url};
use shedboard_common::time;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info, warn};

pub const LOGIN_PATH: &str = "/login";
pub const VERIFY_PATH: &str = "/bookings";

const CSRF_FIELD: &str = "_token";
const USERNAME_FIELD: &str = "email";
const PASSWORD_FIELD: &str = "password";

/// Login failures
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum AuthError {
    #[error("Network error during login: {0}")]
    Network(String),

    #[error("Login rejected with status {0}")]
    Rejected(u16),

    #[error("Login verification failed: logged-in marker not found")]
    VerificationFailed,

    #[error("HTTP client setup failed: {0}")]
    Client(String),
}

impl AuthError {
    fn is_retryable(&self) -> bool {
        matches!(self, AuthError::Network(_) | AuthError::VerificationFailed)
    }
}

/// Failures of a session-carrying request
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RequestError {
    #[error("Session rejected by upstream after re-authentication")]
    NeedsReauth,

    #[error("Request timed out: {0}")]
    Timeout(String),

    #[error("Network error: {0}")]
    Transport(String),

    #[error(transparent)]
    Auth(#[from] AuthError),
}

/// Where a CSRF token was found on the login page
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CsrfSource {
    /// `<input name="_token" value="...">`
    InputField,
    /// `<meta name="csrf-token" content="...">`
    MetaCsrfToken,
    /// `<meta name="_token" content="...">`
    MetaToken,
}

/// Extract a CSRF token from the login page, trying each known location in turn
pub fn extract_csrf_token(html: &str) -> Option<(String, CsrfSource)> {
    let strategies: [(CsrfSource, &str, &str, &str); 3] = [
        (CsrfSource::InputField, "input", CSRF_FIELD, "value"),
        (CsrfSource::MetaCsrfToken, "meta", "csrf-token", "content"),
        (CsrfSource::MetaToken, "meta", CSRF_FIELD, "content"),
    ];

    strategies.iter().find_map(|(source, tag_name, name, value_attr)| {
        opening_tags(html)
            .filter(|tag| tag.name == *tag_name)
            .filter(|tag| tag.attr("name") == Some(*name))
            .filter_map(|tag| tag.attr(value_attr).map(str::to_string))
            .find(|value| !value.is_empty())
            .map(|value| (value, *source))
    })
}

/// An authenticated context: cookie jar plus CSRF token
#[derive(Debug)]
pub struct Session {
    client: reqwest::Client,
    csrf_token: Option<String>,
    generation: u64,
    established_at: DateTime<Utc>,
}

impl Session {
    pub fn csrf_token(&self) -> Option<&str> {
        self.csrf_token.as_deref()
    }

    /// Monotonic login counter; a re-login always yields a higher value
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn established_at(&self) -> DateTime<Utc> {
        self.established_at
    }
}

/// Response body with the bits callers care about
#[derive(Debug, Clone)]
pub struct UpstreamResponse {
    pub status: StatusCode,
    /// URL after redirects
    pub final_url: Url,
    pub body: String,
}

/// Session client
pub struct SessionClient {
    base_url: String,
    credentials: Credentials,
    auth: AuthSettings,
    request_timeout: Duration,
    user_agent: String,
    current: RwLock<Option<Arc<Session>>>,
    login_lock: Mutex<()>,
    generation: AtomicU64,
}

impl SessionClient {
    pub fn new(settings: &SyncSettings) -> Self {
        Self {
            base_url: settings.base_url.clone(),
            credentials: settings.credentials.clone(),
            auth: settings.auth.clone(),
            request_timeout: settings.request_timeout,
            user_agent: settings.user_agent.clone(),
            current: RwLock::new(None),
            login_lock: Mutex::new(()),
            generation: AtomicU64::new(0),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Return the current session, logging in first if there is none
    pub async fn ensure_session(&self) -> Result<Arc<Session>, AuthError> {
        if let Some(session) = self.current.read().await.as_ref() {
            return Ok(Arc::clone(session));
        }
        self.reauthenticate(None).await
    }

    /// Log in again unless someone already replaced `stale_generation`
    ///
    /// Serialised by the login lock, so concurrent rejections produce a
    /// single login.
    async fn reauthenticate(&self, stale_generation: Option<u64>) -> Result<Arc<Session>, AuthError> {
        let _guard = self.login_lock.lock().await;

        if let Some(session) = self.current.read().await.as_ref() {
            let superseded = match stale_generation {
                None => true,
                Some(stale) => session.generation != stale,
            };
            if superseded {
                debug!(generation = session.generation, "Reusing session established by another caller");
                return Ok(Arc::clone(session));
            }
        }

        let session = Arc::new(
            retry_with_backoff("upstream login", &self.auth.retry, AuthError::is_retryable, |attempt| {
                self.login(attempt)
            })
            .await?,
        );

        *self.current.write().await = Some(Arc::clone(&session));
        Ok(session)
    }

    async fn login(&self, attempt: u32) -> Result<Session, AuthError> {
        let client = reqwest::Client::builder()
            .cookie_store(true)
            .user_agent(self.user_agent.as_str())
            .timeout(self.request_timeout)
            .build()
            .map_err(|e| AuthError::Client(e.to_string()))?;

        let login_url = self.url(LOGIN_PATH);
        debug!(attempt, url = %login_url, "Fetching login page");

        let login_page = client
            .get(&login_url)
            .header(REFERER, format!("{}/", self.base_url))
            .send()
            .await
            .map_err(|e| AuthError::Network(e.to_string()))?;
        if !login_page.status().is_success() {
            return Err(AuthError::Network(format!(
                "login page returned status {}",
                login_page.status().as_u16()
            )));
        }
        let login_html = login_page
            .text()
            .await
            .map_err(|e| AuthError::Network(e.to_string()))?;

        let csrf_token = match extract_csrf_token(&login_html) {
            Some((token, source)) => {
                debug!(?source, "CSRF token found");
                Some(token)
            }
            None => {
                debug!("No CSRF token on login page, submitting without one");
                None
            }
        };

        let form = [
            (CSRF_FIELD, csrf_token.as_deref().unwrap_or("")),
            (USERNAME_FIELD, self.credentials.username.as_str()),
            (PASSWORD_FIELD, self.credentials.password.as_str()),
        ];

        let submit = client
            .post(&login_url)
            .header(REFERER, login_url.as_str())
            .header(ORIGIN, self.base_url.as_str())
            .form(&form)
            .send()
            .await
            .map_err(|e| AuthError::Network(e.to_string()))?;

        let status = submit.status();
        if !self.login_status_acceptable(status) {
            warn!(status = status.as_u16(), "Login submission rejected");
            return Err(AuthError::Rejected(status.as_u16()));
        }
        if !(status.is_success() || status.is_redirection()) {
            debug!(
                status = status.as_u16(),
                "Login returned tolerated error status, verifying session"
            );
        }

        let verify = client
            .get(self.url(VERIFY_PATH))
            .header(REFERER, login_url.as_str())
            .send()
            .await
            .map_err(|e| AuthError::Network(e.to_string()))?;
        let verify_html = verify
            .text()
            .await
            .map_err(|e| AuthError::Network(e.to_string()))?;

        if !contains_ci(&verify_html, &self.auth.logged_in_marker) {
            warn!(attempt, "Logged-in marker missing after login");
            return Err(AuthError::VerificationFailed);
        }

        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        info!(generation, "Upstream session established");

        Ok(Session {
            client,
            csrf_token,
            generation,
            established_at: time::now(),
        })
    }

    fn login_status_acceptable(&self, status: StatusCode) -> bool {
        status.is_success()
            || status.is_redirection()
            || self.auth.tolerated_login_statuses.contains(&status.as_u16())
    }

    /// Issue a session-carrying request
    ///
    /// Goes out on the newest session even if the caller holds an older
    /// one. A rejected session triggers one re-authentication and one retry;
    /// a second rejection is returned as [`RequestError::NeedsReauth`].
    pub async fn request(
        &self,
        session: &Arc<Session>,
        method: Method,
        path: &str,
        query: &[(&str, String)],
    ) -> Result<UpstreamResponse, RequestError> {
        let session = self.latest(session).await;
        let response = self.send(&session, method.clone(), path, query).await?;
        if !is_unauthorized(&response) {
            return Ok(response);
        }

        warn!(
            path,
            status = response.status.as_u16(),
            generation = session.generation,
            "Upstream rejected session, re-authenticating"
        );
        let fresh = self.reauthenticate(Some(session.generation)).await?;

        let retried = self.send(&fresh, method, path, query).await?;
        if is_unauthorized(&retried) {
            return Err(RequestError::NeedsReauth);
        }
        Ok(retried)
    }

    /// The current session if a re-login has replaced `session`
    async fn latest(&self, session: &Arc<Session>) -> Arc<Session> {
        match self.current.read().await.as_ref() {
            Some(current) if current.generation > session.generation => {
                debug!(
                    held = session.generation,
                    current = current.generation,
                    "Upgrading to newer session"
                );
                Arc::clone(current)
            }
            _ => Arc::clone(session),
        }
    }

    async fn send(
        &self,
        session: &Session,
        method: Method,
        path: &str,
        query: &[(&str, String)],
    ) -> Result<UpstreamResponse, RequestError> {
        let response = session
            .client
            .request(method, self.url(path))
            .query(query)
            .send()
            .await
            .map_err(map_transport_error)?;

        let status = response.status();
        let final_url = response.url().clone();
        let body = response.text().await.map_err(map_transport_error)?;

        Ok(UpstreamResponse {
            status,
            final_url,
            body,
        })
    }
}

fn map_transport_error(err: reqwest::Error) -> RequestError {
    if err.is_timeout() {
        RequestError::Timeout(err.to_string())
    } else {
        RequestError::Transport(err.to_string())
    }
}

/// Rejected outright, or bounced back to the login page
fn is_unauthorized(response: &UpstreamResponse) -> bool {
    matches!(response.status.as_u16(), 401 | 403 | 419)
        || response.final_url.path().trim_end_matches('/') == LOGIN_PATH
}
