//! Session lifecycle against the live mock server.
//!
//! # Design
//! Starts the mock server on a random port, then drives `WikiClient` through
//! the default `UreqTransport` over real HTTP: anonymous session cookie,
//! login handshake, token caching, logout.

use wiki_core::{ClientError, HttpMethod, Params, Transport, WikiClient};

fn start_server() -> (String, mock_server::Db) {
    let std_listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = std_listener.local_addr().unwrap();
    std_listener.set_nonblocking(true).unwrap();

    let db = mock_server::new_db([("Alice", "secret")]);
    let server_db = db.clone();
    std::thread::spawn(move || {
        let rt = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap();
        rt.block_on(async {
            let listener = tokio::net::TcpListener::from_std(std_listener).unwrap();
            mock_server::run_with_db(listener, server_db).await
        })
        .unwrap();
    });

    (format!("http://{addr}/w/api.php"), db)
}

fn requests_served(db: &mock_server::Db) -> usize {
    db.blocking_read().requests
}

fn userinfo_name(client: &mut WikiClient) -> String {
    let doc = client
        .get([("action", "query"), ("meta", "userinfo")])
        .unwrap();
    doc.str_at(&["query", "userinfo", "name"]).unwrap().to_string()
}

#[test]
fn session_lifecycle() {
    let (endpoint, db) = start_server();
    let mut client = WikiClient::new(&endpoint).unwrap().with_user_agent("IntegrationTest/1.0");

    // Step 1: anonymous request establishes a session cookie.
    assert_eq!(userinfo_name(&mut client), "127.0.0.1");
    assert!(client.cookies().get(mock_server::SESSION_COOKIE).is_some());

    // Step 2: anonymous token is fetched once, then cached.
    assert_eq!(client.get_token("edit").unwrap(), mock_server::ANON_TOKEN);
    let before = requests_served(&db);
    assert_eq!(client.get_token("edit").unwrap(), mock_server::ANON_TOKEN);
    assert_eq!(requests_served(&db), before, "cached token must not hit the server");

    // Step 3: login takes exactly two rounds.
    let before = requests_served(&db);
    client.login("Alice", "secret").unwrap();
    assert_eq!(requests_served(&db) - before, 2);
    assert_eq!(client.cookies().get(mock_server::USER_COOKIE), Some("Alice"));
    assert_eq!(userinfo_name(&mut client), "Alice");

    // Step 4: the cached anonymous token is stale until invalidated.
    assert_eq!(client.get_token("edit").unwrap(), mock_server::ANON_TOKEN);
    client.invalidate_token("edit");
    let token = client.get_token("edit").unwrap();
    assert_ne!(token, mock_server::ANON_TOKEN);
    assert_eq!(client.cached_token("edit"), Some(token.as_str()));

    // Step 5: logout ends the session and expires the user cookie.
    let before = requests_served(&db);
    client.logout();
    assert_eq!(requests_served(&db) - before, 1);
    assert_eq!(client.cookies().get(mock_server::USER_COOKIE), None);
    assert_eq!(userinfo_name(&mut client), "127.0.0.1");
}

#[test]
fn wrong_password_is_reported_verbatim() {
    let (endpoint, _db) = start_server();
    let mut client = WikiClient::new(&endpoint).unwrap();

    let err = client.login("Alice", "hunter2").unwrap_err();
    assert_eq!(err.to_string(), "WrongPass");

    let err = client.login("Mallory", "secret").unwrap_err();
    assert_eq!(err.login_result(), Some("NotExists"));
}

#[test]
fn unknown_token_type_is_escalated() {
    let (endpoint, _db) = start_server();
    let mut client = WikiClient::new(&endpoint).unwrap();

    let err = client.get_token("bogus").unwrap_err();
    assert!(matches!(err, ClientError::Warning(ref m) if m.contains("bogus")));
    assert!(client.tokens().is_empty());
}

#[test]
fn checked_calls_flag_api_errors() {
    let (endpoint, _db) = start_server();
    let mut client = WikiClient::new(&endpoint).unwrap();

    let (doc, ok) = client.post_checked([("action", "frobnicate")]);
    assert!(!ok);
    assert_eq!(doc.unwrap().str_at(&["error", "code"]).unwrap(), "unknown_action");

    let mut params = Params::new();
    params.set("action", "query").set("format", "xml");
    let (doc, ok) = client.get_checked(params);
    assert!(ok, "format must be forced to json: {doc:?}");
}

#[test]
fn redirect_is_returned_not_followed() {
    let (endpoint, _db) = start_server();
    let old = endpoint.replace("/w/api.php", "/api.php");
    let mut client = WikiClient::new(&old).unwrap();

    let request = client.build_request(HttpMethod::Get, &Params::from([("action", "query")]));
    let response = client.transport_mut().send(&request).unwrap();
    assert_eq!(response.status, 301);
    assert_eq!(response.header("location"), Some("/w/api.php"));

    // The redirect body is not JSON, but its cookie still lands in the jar.
    let err = client.get([("action", "query")]).unwrap_err();
    assert!(matches!(err, ClientError::Decode(_)), "{err:?}");
    assert_eq!(client.cookies().get(mock_server::MOVED_COOKIE), Some("1"));
}

#[test]
fn unreachable_server_is_a_transport_error() {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let mut client = WikiClient::new(&format!("http://{addr}/w/api.php")).unwrap();
    let err = client.get([("action", "query")]).unwrap_err();
    assert!(matches!(err, ClientError::Transport(_)));
}
