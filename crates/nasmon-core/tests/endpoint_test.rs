#![allow(clippy::unwrap_used)]
// Endpoint discovery and legacy-backed collectors against a mock host.

use std::sync::Arc;
use std::time::Duration;

use pretty_assertions::assert_eq;
use secrecy::SecretString;
use serde_json::json;
use url::Url;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use nasmon_api::{HostEndpoint, HostSession, LegacyClient, LegacyCredentials, TransportConfig};
use nasmon_core::collector::coral_tpu::CoralTpuCollector;
use nasmon_core::collector::memory::{self, MemoryCollector};
use nasmon_core::{BindingState, Collector, CoreError, EndpointBinding, EntityState, LegacyAccess};

const CANDIDATES: &[&str] = &["/a", "/b", "/c"];

// ── Helpers ─────────────────────────────────────────────────────────

fn session(server: &MockServer, with_credentials: bool) -> Arc<HostSession> {
    let host = HostEndpoint::new("tower", Url::parse(&server.uri()).unwrap());
    let client = LegacyClient::new(host, &TransportConfig::default()).unwrap();
    let credentials = with_credentials
        .then(|| LegacyCredentials::new("root", SecretString::from("hunter2".to_string())));
    Arc::new(HostSession::new(client, credentials))
}

fn access(server: &MockServer) -> LegacyAccess {
    LegacyAccess::new(session(server, true), "test")
}

async fn mount_login(server: &MockServer) {
    Mock::given(method("POST"))
        .and(path("/login"))
        .respond_with(
            ResponseTemplate::new(302)
                .insert_header("set-cookie", "unraid_abc=s3ss10n; path=/")
                .insert_header("location", "/Main"),
        )
        .mount(server)
        .await;
}

async fn mount_get(server: &MockServer, at: &str, response: ResponseTemplate, times: u64) {
    Mock::given(method("GET"))
        .and(path(at))
        .respond_with(response)
        .expect(times)
        .mount(server)
        .await;
}

// ── Resolution ──────────────────────────────────────────────────────

#[tokio::test]
async fn first_qualifying_candidate_is_bound_once() {
    let server = MockServer::start().await;
    mount_login(&server).await;
    mount_get(&server, "/a", ResponseTemplate::new(404), 1).await;
    mount_get(&server, "/b", ResponseTemplate::new(200).set_body_json(json!({"ok": true})), 1).await;
    mount_get(&server, "/c", ResponseTemplate::new(200).set_body_json(json!({})), 0).await;

    let legacy = access(&server);
    let binding = EndpointBinding::new(CANDIDATES);
    assert_eq!(binding.state(), BindingState::Unresolved);

    assert_eq!(binding.resolve(&legacy).await.unwrap(), Some("/b"));
    assert_eq!(binding.resolve(&legacy).await.unwrap(), Some("/b"));
    assert_eq!(binding.state(), BindingState::Resolved("/b"));
}

#[tokio::test]
async fn wrong_shape_and_html_are_skipped() {
    let server = MockServer::start().await;
    mount_login(&server).await;
    mount_get(
        &server,
        "/a",
        ResponseTemplate::new(200).set_body_raw("<html>Login</html>", "text/html"),
        1,
    )
    .await;
    mount_get(&server, "/b", ResponseTemplate::new(200).set_body_json(json!([1, 2])), 1).await;
    mount_get(&server, "/c", ResponseTemplate::new(200).set_body_json(json!({"pcie": []})), 1).await;

    let binding = EndpointBinding::new(CANDIDATES);
    assert_eq!(binding.resolve(&access(&server)).await.unwrap(), Some("/c"));
}

#[tokio::test]
async fn exhaustion_is_permanent() {
    let server = MockServer::start().await;
    mount_login(&server).await;
    for candidate in CANDIDATES {
        mount_get(&server, candidate, ResponseTemplate::new(404), 1).await;
    }

    let legacy = access(&server);
    let binding = EndpointBinding::new(CANDIDATES);
    assert_eq!(binding.resolve(&legacy).await.unwrap(), None);
    assert_eq!(binding.resolve(&legacy).await.unwrap(), None);
    assert_eq!(binding.state(), BindingState::Exhausted);
}

#[tokio::test]
async fn auth_failure_leaves_binding_unresolved() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/login"))
        .respond_with(ResponseTemplate::new(403))
        .expect(2)
        .mount(&server)
        .await;

    let legacy = access(&server);
    let binding = EndpointBinding::new(CANDIDATES);
    let err = binding.resolve(&legacy).await.unwrap_err();
    assert!(matches!(err, CoreError::Authentication { .. }));
    assert_eq!(binding.state(), BindingState::Unresolved);

    // Next tick tries again.
    assert!(binding.resolve(&legacy).await.is_err());
}

// ── Legacy-backed collectors ────────────────────────────────────────

#[tokio::test]
async fn memory_collector_discovers_and_reports() {
    let server = MockServer::start().await;
    mount_login(&server).await;
    mount_get(&server, memory::CANDIDATES[0], ResponseTemplate::new(404), 1).await;
    mount_get(
        &server,
        memory::CANDIDATES[1],
        ResponseTemplate::new(200).set_body_json(json!({
            "memory": {"total": 17_179_869_184_u64, "used": 8_589_934_592_u64}
        })),
        3,
    )
    .await;

    let collector = MemoryCollector::new(
        LegacyAccess::new(session(&server, true), "memory"),
        Duration::from_secs(30),
    );
    collector.fetch().await.unwrap();
    let raw = collector.fetch().await.unwrap();
    let updates = collector.parse(&raw);

    assert_eq!(collector.endpoint().state(), BindingState::Resolved(memory::CANDIDATES[1]));
    let states: Vec<_> = updates
        .iter()
        .map(|u| (u.descriptor.name.as_str(), u.state.clone()))
        .collect();
    assert_eq!(
        states,
        [("Memory Total", EntityState::Float(16.0)), ("Memory Used", EntityState::Float(8.0))]
    );
}

#[tokio::test]
async fn legacy_collector_without_credentials_stays_idle() {
    let server = MockServer::start().await;
    Mock::given(method("POST")).respond_with(ResponseTemplate::new(302)).expect(0).mount(&server).await;
    Mock::given(method("GET")).respond_with(ResponseTemplate::new(200)).expect(0).mount(&server).await;

    let collector = CoralTpuCollector::new(
        LegacyAccess::new(session(&server, false), "coral_tpu"),
        Duration::from_secs(30),
    );
    for _ in 0..3 {
        let raw = collector.fetch().await.unwrap();
        assert!(collector.parse(&raw).is_empty());
    }
}

#[tokio::test]
async fn coral_collector_counts_devices_from_bound_endpoint() {
    let server = MockServer::start().await;
    mount_login(&server).await;
    // One candidate request, then one fetch.
    mount_get(
        &server,
        "/plugins/coral/coral_status.php",
        ResponseTemplate::new(200).set_body_json(json!({"pcie": [], "usb": [{"initialized": true}]})),
        2,
    )
    .await;

    let collector = CoralTpuCollector::new(
        LegacyAccess::new(session(&server, true), "coral_tpu"),
        Duration::from_secs(30),
    );
    let raw = collector.fetch().await.unwrap();
    let updates = collector.parse(&raw);

    let suffixes: Vec<_> = updates.iter().map(|u| u.unique_id_suffix.as_str()).collect();
    assert_eq!(
        suffixes,
        ["coral_usb_0_presence", "coral_usb_0_initialized", "coral_tpu_count"]
    );
    assert_eq!(updates[2].state, EntityState::Integer(1));
}
