//! In-process fake of the upstream booking site
//!
//! Mimics the parts of the real site the pipeline depends on: a login page
//! with a CSRF token, a login POST that answers 500 even on success, cookie
//! sessions, the boat listing and per-boat calendar JSON. Every endpoint
//! counts its hits so tests can assert exactly how much traffic a cycle made.

use axum::extract::{Form, Path, Query, State};
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{Html, IntoResponse, Redirect, Response};
use axum::routing::get;
use axum::Router;
use serde_json::json;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

pub const TOKEN: &str = "tok-123";
pub const USERNAME: &str = "captain@example.org";
pub const PASSWORD: &str = "oars-up";

const SESSION_COOKIE: &str = "fake_session";

/// Where the login page puts its CSRF token
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CsrfStyle {
    InputField,
    MetaCsrfToken,
    MetaUnderscore,
    /// No token on the page and none required
    Absent,
}

/// Behaviour knobs, adjustable while the server runs
#[derive(Debug, Clone)]
pub struct FakeConfig {
    pub csrf_style: CsrfStyle,
    /// Status the login POST answers with on success
    pub login_success_status: u16,
    /// Answer every login POST with 422
    pub reject_logins: bool,
    /// Answer login POSTs with the success status but never issue a session
    pub withhold_session: bool,
    pub boats: Vec<(u64, String)>,
    pub listing_delay: Duration,
    /// Boats whose calendar request hangs longer than any test timeout
    pub hanging_calendars: HashSet<u64>,
    /// Boats whose calendar answers 403 whatever the session
    pub forbidden_calendars: HashSet<u64>,
    /// Boats whose calendar answers 503
    pub unavailable_calendars: HashSet<u64>,
    pub calendar_delay: Duration,
}

impl Default for FakeConfig {
    fn default() -> Self {
        Self {
            csrf_style: CsrfStyle::InputField,
            login_success_status: 500,
            reject_logins: false,
            withhold_session: false,
            boats: default_boats(),
            listing_delay: Duration::ZERO,
            hanging_calendars: HashSet::new(),
            forbidden_calendars: HashSet::new(),
            unavailable_calendars: HashSet::new(),
            calendar_delay: Duration::ZERO,
        }
    }
}

pub fn default_boats() -> Vec<(u64, String)> {
    vec![
        (11, "1X Empacher 75kg".to_string()),
        (12, "2X/- RACER - Swift double/pair 70 KG (Ian Krix)".to_string()),
        (13, "4X+ Hybrid Osprey".to_string()),
        (14, "Coastal trainer".to_string()),
    ]
}

/// Counters and state shared by all handlers
#[derive(Default)]
pub struct FakeUpstream {
    pub login_page_gets: AtomicUsize,
    pub login_posts: AtomicUsize,
    pub verify_gets: AtomicUsize,
    pub listing_gets: AtomicUsize,
    pub calendar_gets: AtomicUsize,
    /// Calendar requests turned away for lack of a live session
    pub calendar_rejections: AtomicUsize,
    calendar_in_flight: AtomicUsize,
    pub calendar_max_in_flight: AtomicUsize,
    pub last_calendar_query: Mutex<Option<HashMap<String, String>>>,
    config: Mutex<FakeConfig>,
    sessions: Mutex<HashSet<String>>,
    next_session: AtomicUsize,
}

impl FakeUpstream {
    pub fn configure<F: FnOnce(&mut FakeConfig)>(&self, f: F) {
        f(&mut self.config.lock().unwrap());
    }

    fn config(&self) -> FakeConfig {
        self.config.lock().unwrap().clone()
    }

    /// Forget every issued session, as if they all timed out upstream
    pub fn expire_sessions(&self) {
        self.sessions.lock().unwrap().clear();
    }

    pub fn count(counter: &AtomicUsize) -> usize {
        counter.load(Ordering::SeqCst)
    }

    fn authenticated(&self, headers: &HeaderMap) -> bool {
        let Some(cookie_header) = headers.get(header::COOKIE).and_then(|v| v.to_str().ok()) else {
            return false;
        };
        let sessions = self.sessions.lock().unwrap();
        cookie_header
            .split(';')
            .filter_map(|pair| pair.trim().split_once('='))
            .any(|(name, value)| name == SESSION_COOKIE && sessions.contains(value))
    }
}

/// Start the fake on an ephemeral port, returning its base URL
pub async fn spawn(config: FakeConfig) -> (String, Arc<FakeUpstream>) {
    let state = Arc::new(FakeUpstream::default());
    state.configure(|c| *c = config);

    let app = Router::new()
        .route("/login", get(login_page).post(login_submit))
        .route("/bookings", get(bookings_page))
        .route("/bookings/retrieve-calendar/:id", get(calendar))
        .with_state(Arc::clone(&state));

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    (format!("http://{}", addr), state)
}

async fn login_page(State(state): State<Arc<FakeUpstream>>) -> Html<String> {
    state.login_page_gets.fetch_add(1, Ordering::SeqCst);

    let (head, field) = match state.config().csrf_style {
        CsrfStyle::InputField => (
            String::new(),
            format!(r#"<input type="hidden" name="_token" value="{}">"#, TOKEN),
        ),
        CsrfStyle::MetaCsrfToken => (
            format!(r#"<meta name="csrf-token" content="{}">"#, TOKEN),
            String::new(),
        ),
        CsrfStyle::MetaUnderscore => (
            format!(r#"<meta content="{}" name="_token">"#, TOKEN),
            String::new(),
        ),
        CsrfStyle::Absent => (String::new(), String::new()),
    };

    Html(format!(
        r#"<!DOCTYPE html><html><head><title>Sign in</title>{head}</head><body>
        <form method="POST" action="/login">{field}
          <input type="email" name="email"><input type="password" name="password">
          <button type="submit">Log in</button>
        </form></body></html>"#
    ))
}

async fn login_submit(
    State(state): State<Arc<FakeUpstream>>,
    headers: HeaderMap,
    Form(form): Form<HashMap<String, String>>,
) -> Response {
    state.login_posts.fetch_add(1, Ordering::SeqCst);
    let config = state.config();

    let header_str = |name: header::HeaderName| headers.get(name).and_then(|v| v.to_str().ok()).unwrap_or("");
    let referer_ok = header_str(header::REFERER).ends_with("/login");
    let origin_ok = header_str(header::ORIGIN).starts_with("http://127.0.0.1");
    let token_ok = match config.csrf_style {
        CsrfStyle::Absent => form.get("_token").map(String::as_str) == Some(""),
        _ => form.get("_token").map(String::as_str) == Some(TOKEN),
    };
    if !(referer_ok && origin_ok && token_ok) {
        // Laravel's "page expired"
        return StatusCode::from_u16(419).unwrap().into_response();
    }

    let credentials_ok = form.get("email").map(String::as_str) == Some(USERNAME)
        && form.get("password").map(String::as_str) == Some(PASSWORD);
    if config.reject_logins || !credentials_ok {
        return (StatusCode::UNPROCESSABLE_ENTITY, "These credentials do not match our records.")
            .into_response();
    }

    let status = StatusCode::from_u16(config.login_success_status).unwrap();
    if config.withhold_session {
        return (status, "Server Error").into_response();
    }

    let session_id = format!("s{}", state.next_session.fetch_add(1, Ordering::SeqCst) + 1);
    state.sessions.lock().unwrap().insert(session_id.clone());

    (
        status,
        [(
            header::SET_COOKIE,
            format!("{}={}; Path=/; HttpOnly", SESSION_COOKIE, session_id),
        )],
        "Server Error",
    )
        .into_response()
}

async fn bookings_page(State(state): State<Arc<FakeUpstream>>, headers: HeaderMap) -> Response {
    if !state.authenticated(&headers) {
        return Redirect::to("/login").into_response();
    }

    let is_verify = headers
        .get(header::REFERER)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|r| r.ends_with("/login"));
    if is_verify {
        state.verify_gets.fetch_add(1, Ordering::SeqCst);
    } else {
        state.listing_gets.fetch_add(1, Ordering::SeqCst);
    }

    let config = state.config();
    if !is_verify && !config.listing_delay.is_zero() {
        tokio::time::sleep(config.listing_delay).await;
    }

    let boats: String = config
        .boats
        .iter()
        .map(|(id, name)| {
            format!(
                r#"<div class="boat" data-boat-id="{}" data-boat-name="{}"><a href="/bookings/calendar/{}">Book</a></div>"#,
                id,
                name.replace('&', "&amp;").replace('"', "&quot;"),
                id
            )
        })
        .collect();

    Html(format!(
        r#"<html><body><nav><a href="/logout">Logout</a></nav><div class="boats">{}</div></body></html>"#,
        boats
    ))
    .into_response()
}

async fn calendar(
    State(state): State<Arc<FakeUpstream>>,
    Path(id): Path<u64>,
    Query(query): Query<HashMap<String, String>>,
    headers: HeaderMap,
) -> Response {
    if !state.authenticated(&headers) {
        state.calendar_rejections.fetch_add(1, Ordering::SeqCst);
        return StatusCode::UNAUTHORIZED.into_response();
    }

    state.calendar_gets.fetch_add(1, Ordering::SeqCst);
    *state.last_calendar_query.lock().unwrap() = Some(query.clone());

    let config = state.config();
    if config.forbidden_calendars.contains(&id) {
        return StatusCode::FORBIDDEN.into_response();
    }
    if config.unavailable_calendars.contains(&id) {
        return (StatusCode::SERVICE_UNAVAILABLE, "Too Many Attempts.").into_response();
    }

    let in_flight = state.calendar_in_flight.fetch_add(1, Ordering::SeqCst) + 1;
    state.calendar_max_in_flight.fetch_max(in_flight, Ordering::SeqCst);

    if config.hanging_calendars.contains(&id) {
        tokio::time::sleep(Duration::from_secs(5)).await;
    } else if !config.calendar_delay.is_zero() {
        tokio::time::sleep(config.calendar_delay).await;
    }
    state.calendar_in_flight.fetch_sub(1, Ordering::SeqCst);

    let day = query
        .get("start")
        .map(|s| s.chars().take(10).collect::<String>())
        .unwrap_or_default();

    axum::Json(json!([
        {
            "title": "ignored",
            "start": format!("{day}T06:00:00"),
            "end": format!("{day}T07:30:00"),
            "extendedProps": { "member_name": format!("Member {id}") }
        },
        {
            "title": format!("Evening {id}"),
            "start": format!("{day}T18:00:00"),
            "end": format!("{day}T19:00:00")
        },
        { "title": "broken", "start": "not a time", "end": format!("{day}T19:00:00") }
    ]))
    .into_response()
}
