#![allow(clippy::unwrap_used)]
// Integration tests for the legacy session lifecycle using wiremock.

use std::sync::Arc;
use std::time::Duration;

use secrecy::SecretString;
use url::Url;
use wiremock::matchers::{body_string_contains, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use nasmon_api::{
    Error, HostEndpoint, HostSession, LegacyClient, LegacyCredentials, SessionStore,
    TransportConfig,
};

const TIMEOUT: Duration = Duration::from_secs(5);

// ── Helpers ─────────────────────────────────────────────────────────

fn host(server: &MockServer) -> HostEndpoint {
    HostEndpoint::new("tower", Url::parse(&server.uri()).unwrap())
}

fn credentials() -> LegacyCredentials {
    LegacyCredentials::new("root", SecretString::from("hunter2".to_string()))
}

fn session(server: &MockServer, credentials: Option<LegacyCredentials>) -> HostSession {
    let client = LegacyClient::new(host(server), &TransportConfig::default()).unwrap();
    HostSession::new(client, credentials)
}

fn login_ok(cookie: &str) -> ResponseTemplate {
    ResponseTemplate::new(302)
        .insert_header("set-cookie", format!("{cookie}; path=/; HttpOnly").as_str())
        .insert_header("location", "/Main")
}

// ── Login ───────────────────────────────────────────────────────────

#[tokio::test]
async fn login_posts_form_and_caches_cookie() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/login"))
        .and(body_string_contains("username=root"))
        .respond_with(login_ok("unraid_abc=s3ss10n"))
        .expect(1)
        .mount(&server)
        .await;

    let session = session(&server, Some(credentials()));
    let first = session.get_session().await.unwrap();
    let second = session.get_session().await.unwrap();

    assert_eq!(first.cookie_header(), "unraid_abc=s3ss10n");
    assert_eq!(first.generation(), second.generation());
}

#[tokio::test]
async fn login_without_cookie_is_rejected() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/login"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<form>login</form>"))
        .mount(&server)
        .await;

    let result = session(&server, Some(credentials())).get_session().await;
    assert!(
        matches!(result, Err(Error::Authentication { .. })),
        "expected Authentication error, got: {result:?}"
    );
}

#[tokio::test]
async fn login_redirect_back_to_login_is_rejected() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/login"))
        .respond_with(
            ResponseTemplate::new(302)
                .insert_header("set-cookie", "unraid_abc=x; path=/")
                .insert_header("location", "/login?error=1"),
        )
        .mount(&server)
        .await;

    let result = session(&server, Some(credentials())).get_session().await;
    assert!(matches!(result, Err(Error::Authentication { .. })));
}

#[tokio::test]
async fn missing_credentials_never_touch_the_wire() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/login"))
        .respond_with(login_ok("unraid_abc=1"))
        .expect(0)
        .mount(&server)
        .await;

    let result = session(&server, None).get_session().await;
    assert!(matches!(result, Err(Error::MissingCredentials { .. })));
}

// ── Single-flight ───────────────────────────────────────────────────

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_callers_share_one_login() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/login"))
        .respond_with(login_ok("unraid_abc=shared").set_delay(Duration::from_millis(200)))
        .expect(1)
        .mount(&server)
        .await;

    let session = Arc::new(session(&server, Some(credentials())));
    let handles: Vec<_> = (0..8)
        .map(|_| {
            let session = Arc::clone(&session);
            tokio::spawn(async move { session.get_session().await })
        })
        .collect();

    for handle in handles {
        let token = handle.await.unwrap().unwrap();
        assert_eq!(token.cookie_header(), "unraid_abc=shared");
        assert_eq!(token.generation(), 1);
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_callers_share_one_failed_login() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/login"))
        .respond_with(ResponseTemplate::new(403).set_delay(Duration::from_millis(200)))
        .expect(1)
        .mount(&server)
        .await;

    let session = Arc::new(session(&server, Some(credentials())));
    let handles: Vec<_> = (0..5)
        .map(|_| {
            let session = Arc::clone(&session);
            tokio::spawn(async move { session.get_session().await })
        })
        .collect();

    for handle in handles {
        let result = handle.await.unwrap();
        assert!(matches!(result, Err(Error::Authentication { .. })));
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn late_caller_joins_failing_login_in_flight() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/login"))
        .respond_with(ResponseTemplate::new(403).set_delay(Duration::from_millis(300)))
        .expect(1)
        .mount(&server)
        .await;

    let session = Arc::new(session(&server, Some(credentials())));
    let first = {
        let session = Arc::clone(&session);
        tokio::spawn(async move { session.get_session().await })
    };
    tokio::time::sleep(Duration::from_millis(100)).await;
    let second = {
        let session = Arc::clone(&session);
        tokio::spawn(async move { session.get_session().await })
    };

    assert!(matches!(first.await.unwrap(), Err(Error::Authentication { .. })));
    assert!(matches!(second.await.unwrap(), Err(Error::Authentication { .. })));
}

#[tokio::test]
async fn failed_login_is_retried_by_the_next_caller() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/login"))
        .respond_with(ResponseTemplate::new(403))
        .up_to_n_times(1)
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/login"))
        .respond_with(login_ok("sess=ok"))
        .expect(1)
        .mount(&server)
        .await;

    let session = session(&server, Some(credentials()));
    assert!(matches!(
        session.get_session().await,
        Err(Error::Authentication { .. })
    ));
    assert!(session.get_session().await.is_ok());
}

// ── Invalidation & retry ────────────────────────────────────────────

#[tokio::test]
async fn rejected_session_is_renewed_and_retried_once() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/login"))
        .respond_with(login_ok("sess=1"))
        .up_to_n_times(1)
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/login"))
        .respond_with(login_ok("sess=2"))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/state/memory_status.json"))
        .and(header("cookie", "sess=1"))
        .respond_with(ResponseTemplate::new(302).insert_header("location", "/login"))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/state/memory_status.json"))
        .and(header("cookie", "sess=2"))
        .respond_with(ResponseTemplate::new(200).set_body_string(r#"{"memory":{}}"#))
        .mount(&server)
        .await;

    let session = session(&server, Some(credentials()));
    let resp = session
        .http_get("/state/memory_status.json", &[], TIMEOUT)
        .await
        .unwrap();

    assert!(resp.is_success());
    assert_eq!(session.get_session().await.unwrap().generation(), 2);
}

#[tokio::test]
async fn second_rejection_is_returned() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/login"))
        .respond_with(login_ok("sess=1"))
        .expect(2)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/Dashboard"))
        .respond_with(ResponseTemplate::new(401))
        .expect(2)
        .mount(&server)
        .await;

    let result = session(&server, Some(credentials()))
        .http_get("/Dashboard", &[], TIMEOUT)
        .await;
    assert!(matches!(result, Err(Error::Authentication { .. })));
}

#[tokio::test]
async fn not_found_is_an_answer_not_an_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/login"))
        .respond_with(login_ok("sess=1"))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/plugins/coral/coral_status.php"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let resp = session(&server, Some(credentials()))
        .http_get("/plugins/coral/coral_status.php", &[], TIMEOUT)
        .await
        .unwrap();
    assert!(resp.is_not_found());
}

#[tokio::test]
async fn query_params_are_forwarded() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/login"))
        .respond_with(login_ok("sess=1"))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/plugins/gpustat/gpustatusmulti.php"))
        .and(query_param("gpus", r#"{"0":{}}"#))
        .respond_with(ResponseTemplate::new(200).set_body_string("{}"))
        .expect(1)
        .mount(&server)
        .await;

    let resp = session(&server, Some(credentials()))
        .http_get(
            "/plugins/gpustat/gpustatusmulti.php",
            &[("gpus", r#"{"0":{}}"#.to_string())],
            TIMEOUT,
        )
        .await
        .unwrap();
    assert!(resp.is_success());
}

// ── Store ───────────────────────────────────────────────────────────

#[tokio::test]
async fn store_routes_by_host_and_closes_sessions() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/login"))
        .respond_with(login_ok("sess=1"))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/logout"))
        .and(header("cookie", "sess=1"))
        .respond_with(ResponseTemplate::new(302).insert_header("location", "/login"))
        .expect(1)
        .mount(&server)
        .await;

    let store = SessionStore::new();
    store.register(session(&server, Some(credentials())));

    let token = store.get_session("tower").await.unwrap();
    assert_eq!(token.cookie_header(), "sess=1");
    assert!(matches!(
        store.get_session("unknown").await,
        Err(Error::MissingCredentials { .. })
    ));

    store.close_all().await;
    assert!(store.get("tower").is_none());
}
