//! Session-holding client for a wiki's `api.php`.
//!
//! # Design
//! `WikiClient` owns everything a session needs: endpoint, user agent,
//! cookie jar and token cache. Every call goes through `call`, which builds
//! a plain `HttpRequest` (`build_request`), sends it through the
//! `Transport`, merges response cookies and decodes the body. API-level
//! `error`/`warnings` are left in the document; the `*_checked` variants
//! add the coarse `ok` flag from `error_check`.
//!
//! The client is not internally synchronized. Share it across threads by
//! wrapping it in a `Mutex`.

use std::collections::HashMap;

use serde_json::Value;
use tracing::{debug, info, warn};
use url::Url;

use crate::config::{ClientConfig, DEFAULT_USER_AGENT, FORMAT};
use crate::cookies::CookieJar;
use crate::document::{decode, error_check, ApiStatus, Document};
use crate::error::ClientError;
use crate::http::{HttpMethod, HttpRequest, Transport, UreqTransport};
use crate::params::Params;

/// Progress of a login handshake. `Retry` is entered at most once.
#[derive(Debug)]
enum LoginState {
    Start,
    Retry { token: String },
}

/// Synchronous client bound to one API endpoint and one session.
#[derive(Debug)]
pub struct WikiClient<T = UreqTransport> {
    transport: T,
    endpoint: Url,
    user_agent: String,
    cookies: CookieJar,
    tokens: HashMap<String, String>,
}

impl WikiClient<UreqTransport> {
    /// Client using the default `ureq` transport.
    pub fn new(endpoint: &str) -> Result<Self, ClientError> {
        Self::with_transport(endpoint, UreqTransport::new())
    }

    pub fn from_config(config: &ClientConfig) -> Result<Self, ClientError> {
        Ok(Self::new(&config.endpoint)?.with_user_agent(config.user_agent.clone()))
    }
}

impl<T: Transport> WikiClient<T> {
    /// Client sending requests through `transport`.
    ///
    /// Fails with `InvalidEndpoint` unless `endpoint` is an absolute
    /// `http`/`https` URL.
    pub fn with_transport(endpoint: &str, transport: T) -> Result<Self, ClientError> {
        let invalid = |reason: String| ClientError::InvalidEndpoint {
            endpoint: endpoint.to_string(),
            reason,
        };
        let url = Url::parse(endpoint).map_err(|e| invalid(e.to_string()))?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(invalid(format!("unsupported scheme {:?}", url.scheme())));
        }
        if url.host_str().is_none() {
            return Err(invalid("missing host".to_string()));
        }

        Ok(Self {
            transport,
            endpoint: url,
            user_agent: DEFAULT_USER_AGENT.to_string(),
            cookies: CookieJar::new(),
            tokens: HashMap::new(),
        })
    }

    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = user_agent.into();
        self
    }

    pub fn set_user_agent(&mut self, user_agent: impl Into<String>) {
        self.user_agent = user_agent.into();
    }

    pub fn user_agent(&self) -> &str {
        &self.user_agent
    }

    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }

    pub fn format(&self) -> &'static str {
        FORMAT
    }

    pub fn cookies(&self) -> &CookieJar {
        &self.cookies
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    /// Build the request `call` would send, without sending it.
    ///
    /// `format` is always overwritten with the session's format. For GET the
    /// encoded parameters replace the endpoint's query string.
    pub fn build_request(&self, method: HttpMethod, params: &Params) -> HttpRequest {
        let mut params = params.clone();
        params.set("format", FORMAT);
        let encoded = params.encode();

        let mut headers = vec![("User-Agent".to_string(), self.user_agent.clone())];
        if let Some(cookie) = self.cookies.cookie_header(&self.endpoint) {
            headers.push(("Cookie".to_string(), cookie));
        }

        match method {
            HttpMethod::Get => {
                let mut url = self.endpoint.clone();
                url.set_query(Some(&encoded));
                HttpRequest {
                    method,
                    url: url.to_string(),
                    headers,
                    body: None,
                }
            }
            HttpMethod::Post => {
                headers.push((
                    "Content-Type".to_string(),
                    "application/x-www-form-urlencoded".to_string(),
                ));
                HttpRequest {
                    method,
                    url: self.endpoint.to_string(),
                    headers,
                    body: Some(encoded),
                }
            }
        }
    }

    /// Send one request and decode its body. No retries.
    ///
    /// Response cookies are merged into the jar whatever the HTTP status.
    pub fn call(&mut self, method: HttpMethod, params: &Params) -> Result<Document, ClientError> {
        let request = self.build_request(method, params);
        debug!(
            %method,
            action = params.get("action").unwrap_or_default(),
            "sending API request"
        );

        let response = self.transport.send(&request).map_err(|e| {
            warn!(%method, error = %e, "API request failed");
            ClientError::Transport(e)
        })?;

        self.cookies
            .store_response_cookies(&self.endpoint, response.header_values("set-cookie"));

        decode(&response.body).inspect_err(|e| {
            warn!(status = response.status, error = %e, "undecodable API response");
        })
    }

    pub fn get(&mut self, params: impl Into<Params>) -> Result<Document, ClientError> {
        self.call(HttpMethod::Get, &params.into())
    }

    pub fn post(&mut self, params: impl Into<Params>) -> Result<Document, ClientError> {
        self.call(HttpMethod::Post, &params.into())
    }

    /// `get` plus the API success flag from `error_check`.
    pub fn get_checked(
        &mut self,
        params: impl Into<Params>,
    ) -> (Result<Document, ClientError>, bool) {
        error_check(self.get(params))
    }

    /// `post` plus the API success flag from `error_check`.
    pub fn post_checked(
        &mut self,
        params: impl Into<Params>,
    ) -> (Result<Document, ClientError>, bool) {
        error_check(self.post(params))
    }

    /// Log in with the credential/token handshake.
    ///
    /// The first round is sent without a token. A `NeedToken` answer is
    /// followed by exactly one resubmission carrying the returned token; any
    /// other result than `Success` becomes `LoginFailed` with that result.
    pub fn login(&mut self, username: &str, password: &str) -> Result<(), ClientError> {
        let mut state = LoginState::Start;
        loop {
            let mut params = Params::from([
                ("action", "login"),
                ("lgname", username),
                ("lgpassword", password),
            ]);
            if let LoginState::Retry { token } = &state {
                params.set("lgtoken", token.as_str());
            }

            let doc = self.post(params)?;
            let result = doc.str_at(&["login", "result"])?;

            state = match result {
                "Success" => {
                    info!(username, "logged in");
                    return Ok(());
                }
                "NeedToken" if matches!(state, LoginState::Start) => {
                    let token = doc.str_at(&["login", "token"])?.to_string();
                    LoginState::Retry { token }
                }
                other => {
                    warn!(username, result = other, "login rejected");
                    return Err(ClientError::LoginFailed(other.to_string()));
                }
            };
        }
    }

    /// Send `action=logout`. Failures are logged and otherwise ignored:
    /// logging out is meaningful whether or not a session exists.
    pub fn logout(&mut self) {
        if let Err(e) = self.get([("action", "logout")]) {
            warn!(error = %e, "logout request failed");
        }
    }

    /// Token of `kind` (e.g. `"edit"`, not `"edittoken"`).
    ///
    /// Served from the cache when present; otherwise fetched with
    /// `action=tokens` and cached. Rejected tokens must be dropped with
    /// `invalidate_token`.
    pub fn get_token(&mut self, kind: &str) -> Result<String, ClientError> {
        if let Some(token) = self.tokens.get(kind) {
            debug!(kind, "token served from cache");
            return Ok(token.clone());
        }

        let (result, ok) = error_check(self.get([("action", "tokens"), ("type", kind)]));
        let doc = result?;
        if !ok {
            match doc.status() {
                ApiStatus::Error { code, info } => return Err(ClientError::Api { code, info }),
                ApiStatus::Warnings(warnings) => {
                    let text = warnings
                        .get("tokens")
                        .and_then(|t| t.get("*"))
                        .and_then(Value::as_str)
                        .map(str::to_string)
                        .unwrap_or_else(|| warnings.to_string());
                    return Err(ClientError::Warning(text));
                }
                ApiStatus::Ok => {}
            }
        }

        let key = format!("{kind}token");
        let token = doc.str_at(&["tokens", key.as_str()])?.to_string();
        self.tokens.insert(kind.to_string(), token.clone());
        Ok(token)
    }

    pub fn tokens(&self) -> &HashMap<String, String> {
        &self.tokens
    }

    pub fn cached_token(&self, kind: &str) -> Option<&str> {
        self.tokens.get(kind).map(String::as_str)
    }

    /// Drop a cached token, e.g. after the API answered `badtoken`.
    pub fn invalidate_token(&mut self, kind: &str) -> Option<String> {
        self.tokens.remove(kind)
    }

    pub fn clear_tokens(&mut self) {
        self.tokens.clear();
    }
}
