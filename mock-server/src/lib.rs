//! In-memory stand-in for a wiki's `api.php`.
//!
//! Serves the login handshake, token retrieval, logout and
//! `meta=userinfo` over GET query strings and form-encoded POST bodies.
//! Sessions are tracked with a cookie, so a client that drops cookies
//! cannot finish the login handshake.
//!
//! `/api.php` is the old entry point: it answers with a permanent redirect
//! to `/w/api.php` and sets [`MOVED_COOKIE`] on the way.

use std::{collections::HashMap, sync::Arc};

use axum::{
    extract::{Form, Query, State},
    http::{header, HeaderMap, StatusCode},
    response::{AppendHeaders, IntoResponse, Response},
    routing::{any, get},
    Json, Router,
};
use serde_json::{json, Value};
use tokio::{net::TcpListener, sync::RwLock};
use uuid::Uuid;

pub const SESSION_COOKIE: &str = "wikisession";
pub const USER_COOKIE: &str = "wikiUserName";
pub const MOVED_COOKIE: &str = "wikiMoved";
/// Edit token handed to anonymous sessions.
pub const ANON_TOKEN: &str = "+\\";

const TOKEN_TYPES: &[&str] = &["edit", "watch"];

#[derive(Debug, Clone, Default)]
pub struct Session {
    pub user: Option<String>,
    pub login_token: Option<String>,
    pub csrf_token: String,
}

impl Session {
    fn new() -> Self {
        Self {
            csrf_token: fresh_token(),
            ..Self::default()
        }
    }
}

#[derive(Debug, Default)]
pub struct Wiki {
    pub users: HashMap<String, String>,
    pub sessions: HashMap<String, Session>,
    /// Number of API requests served, for tests.
    pub requests: usize,
}

pub type Db = Arc<RwLock<Wiki>>;

/// Router with a single account, `Alice` / `secret`.
pub fn app() -> Router {
    app_with_db(new_db([("Alice", "secret")]))
}

pub fn new_db<'a>(users: impl IntoIterator<Item = (&'a str, &'a str)>) -> Db {
    let users = users
        .into_iter()
        .map(|(name, pass)| (name.to_string(), pass.to_string()))
        .collect();
    Arc::new(RwLock::new(Wiki {
        users,
        ..Wiki::default()
    }))
}

pub fn app_with_db(db: Db) -> Router {
    Router::new()
        .route("/w/api.php", get(api_get).post(api_post))
        .route("/api.php", any(moved))
        .with_state(db)
}

pub async fn run(listener: TcpListener) -> Result<(), std::io::Error> {
    axum::serve(listener, app()).await
}

/// Serve a caller-provided `Db`, so tests can inspect server state.
pub async fn run_with_db(listener: TcpListener, db: Db) -> Result<(), std::io::Error> {
    axum::serve(listener, app_with_db(db)).await
}

async fn moved() -> Response {
    (
        StatusCode::MOVED_PERMANENTLY,
        [
            (header::LOCATION, "/w/api.php".to_string()),
            (header::SET_COOKIE, format!("{MOVED_COOKIE}=1; Path=/")),
        ],
    )
        .into_response()
}

async fn api_get(
    State(db): State<Db>,
    headers: HeaderMap,
    Query(params): Query<HashMap<String, String>>,
) -> Response {
    dispatch(&db, &headers, params).await
}

async fn api_post(
    State(db): State<Db>,
    headers: HeaderMap,
    Form(params): Form<HashMap<String, String>>,
) -> Response {
    dispatch(&db, &headers, params).await
}

async fn dispatch(db: &Db, headers: &HeaderMap, params: HashMap<String, String>) -> Response {
    let mut wiki = db.write().await;
    wiki.requests += 1;

    let action = params.get("action").map(String::as_str).unwrap_or_default();
    tracing::debug!(action, "handling API request");

    let mut set_cookies = Vec::new();
    let session_id = match session_cookie(headers).filter(|id| wiki.sessions.contains_key(id)) {
        Some(id) => id,
        None => {
            let id = fresh_token();
            wiki.sessions.insert(id.clone(), Session::new());
            set_cookies.push((
                header::SET_COOKIE,
                format!("{SESSION_COOKIE}={id}; Path=/; HttpOnly"),
            ));
            id
        }
    };

    let body = if params.get("format").map(String::as_str) != Some("json") {
        api_error("unknownformat", "Unrecognized value for parameter 'format'")
    } else {
        match action {
            "login" => login(&mut wiki, &session_id, &params, &mut set_cookies),
            "logout" => logout(&mut wiki, &session_id, &mut set_cookies),
            "tokens" => tokens(&wiki, &session_id, &params),
            "query" => query(&wiki, &session_id, &params),
            other => api_error(
                "unknown_action",
                &format!("Unrecognized value for parameter 'action': {other}"),
            ),
        }
    };

    (AppendHeaders(set_cookies), Json(body)).into_response()
}

fn login(
    wiki: &mut Wiki,
    session_id: &str,
    params: &HashMap<String, String>,
    set_cookies: &mut Vec<(header::HeaderName, String)>,
) -> Value {
    let Wiki {
        users, sessions, ..
    } = wiki;
    let Some(session) = sessions.get_mut(session_id) else {
        return api_error("nosession", "Session lost");
    };

    let offered = params.get("lgtoken");
    if offered.is_none() || offered != session.login_token.as_ref() {
        let token = fresh_token();
        session.login_token = Some(token.clone());
        return json!({
            "login": {
                "result": "NeedToken",
                "token": token,
                "cookieprefix": "wiki",
                "sessionid": session_id,
            }
        });
    }
    session.login_token = None;

    let name = params.get("lgname").map(String::as_str).unwrap_or_default();
    let password = params.get("lgpassword").map(String::as_str).unwrap_or_default();
    let result = match users.get(name) {
        _ if name.is_empty() => "NoName",
        None => "NotExists",
        Some(expected) if expected != password => "WrongPass",
        Some(_) => "Success",
    };
    if result != "Success" {
        return json!({ "login": { "result": result } });
    }

    session.user = Some(name.to_string());
    session.csrf_token = fresh_token();
    set_cookies.push((header::SET_COOKIE, format!("{USER_COOKIE}={name}; Path=/")));
    json!({
        "login": {
            "result": "Success",
            "lgusername": name,
            "cookieprefix": "wiki",
            "sessionid": session_id,
        }
    })
}

fn logout(
    wiki: &mut Wiki,
    session_id: &str,
    set_cookies: &mut Vec<(header::HeaderName, String)>,
) -> Value {
    if let Some(session) = wiki.sessions.get_mut(session_id) {
        *session = Session::new();
    }
    set_cookies.push((
        header::SET_COOKIE,
        format!("{USER_COOKIE}=deleted; Path=/; Max-Age=0"),
    ));
    json!({})
}

fn tokens(wiki: &Wiki, session_id: &str, params: &HashMap<String, String>) -> Value {
    let session = wiki.sessions.get(session_id);
    let logged_in = session.is_some_and(|s| s.user.is_some());
    let requested = params.get("type").map(String::as_str).unwrap_or("edit");

    let mut tokens = serde_json::Map::new();
    let mut unknown = Vec::new();
    for kind in requested.split('|') {
        if !TOKEN_TYPES.contains(&kind) {
            unknown.push(kind);
            continue;
        }
        let token = match session {
            Some(s) if logged_in => format!("{}{ANON_TOKEN}", s.csrf_token),
            _ => ANON_TOKEN.to_string(),
        };
        tokens.insert(format!("{kind}token"), Value::String(token));
    }

    let mut body = serde_json::Map::new();
    if !unknown.is_empty() {
        body.insert(
            "warnings".to_string(),
            json!({ "tokens": { "*": format!("Unrecognized value for parameter 'type': {}", unknown.join(", ")) } }),
        );
    }
    let tokens = if tokens.is_empty() {
        json!([])
    } else {
        Value::Object(tokens)
    };
    body.insert("tokens".to_string(), tokens);
    Value::Object(body)
}

fn query(wiki: &Wiki, session_id: &str, params: &HashMap<String, String>) -> Value {
    if params.get("meta").map(String::as_str) != Some("userinfo") {
        return json!({ "batchcomplete": "" });
    }
    let user = wiki.sessions.get(session_id).and_then(|s| s.user.as_deref());
    let userinfo = match user {
        Some(name) => json!({ "id": 1, "name": name }),
        None => json!({ "id": 0, "name": "127.0.0.1", "anon": "" }),
    };
    json!({ "batchcomplete": "", "query": { "userinfo": userinfo } })
}

fn api_error(code: &str, info: &str) -> Value {
    json!({ "error": { "code": code, "info": info } })
}

fn session_cookie(headers: &HeaderMap) -> Option<String> {
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(name, _)| *name == SESSION_COOKIE)
        .map(|(_, value)| value.to_string())
}

fn fresh_token() -> String {
    Uuid::new_v4().simple().to_string()
}
