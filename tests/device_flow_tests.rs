mod auth_support;

use std::time::Duration;

use chrono::Utc;
use rdu::auth::{
    AuthError, DeviceAuthorizationSession, OidcClient, PollPolicy, TokenPair, TokenPoller,
    DEFAULT_POLL_INTERVAL,
};
use reqwest::Url;
use serde_json::json;
use tokio_util::sync::CancellationToken;
use wiremock::matchers::{body_string_contains, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use auth_support::{
    mount_discovery, oauth_error, token_response, DEVICE_PATH, DISCOVERY_PATH, TOKEN_PATH,
};

fn client(server: &MockServer) -> OidcClient {
    let issuer = Url::parse(&format!("{}/auth/realms/Renku", server.uri())).unwrap();
    OidcClient::new(reqwest::Client::new(), issuer, "renku-cli", "offline_access")
}

async fn token_requests(server: &MockServer) -> usize {
    server
        .received_requests()
        .await
        .unwrap()
        .iter()
        .filter(|r| r.url.path() == TOKEN_PATH)
        .count()
}

fn session(lifetime: Duration, interval: Duration) -> DeviceAuthorizationSession {
    DeviceAuthorizationSession {
        device_code: "device-code-1".to_string(),
        user_code: "ABCD-EFGH".to_string(),
        verification_uri: "https://id.example/device".to_string(),
        verification_uri_complete: "https://id.example/device?user_code=ABCD-EFGH".to_string(),
        expires_at: Utc::now() + chrono::Duration::from_std(lifetime).unwrap(),
        poll_interval: interval,
    }
}

#[tokio::test]
async fn start_device_authorization_defaults_zero_interval() {
    let server = MockServer::start().await;
    mount_discovery(&server).await;
    Mock::given(method("POST"))
        .and(path(DEVICE_PATH))
        .and(body_string_contains("client_id=renku-cli"))
        .and(body_string_contains("scope=offline_access"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "device_code": "device-123",
            "user_code": "WXYZ-1234",
            "verification_uri": "https://id.example/device",
            "verification_uri_complete": "https://id.example/device?user_code=WXYZ-1234",
            "expires_in": 600,
            "interval": 0
        })))
        .expect(1)
        .mount(&server)
        .await;

    let session = client(&server)
        .start_device_authorization(&CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(session.device_code, "device-123");
    assert_eq!(session.user_code, "WXYZ-1234");
    assert_eq!(
        session.verification_uri_complete,
        "https://id.example/device?user_code=WXYZ-1234"
    );
    assert_eq!(session.poll_interval, DEFAULT_POLL_INTERVAL);
    let remaining = session.remaining();
    assert!(remaining > Duration::from_secs(590) && remaining <= Duration::from_secs(600));
}

#[tokio::test]
async fn discovery_is_fetched_once_per_client() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(DISCOVERY_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "device_authorization_endpoint": format!("{}{DEVICE_PATH}", server.uri()),
            "token_endpoint": format!("{}{TOKEN_PATH}", server.uri()),
        })))
        .expect(1)
        .mount(&server)
        .await;
    auth_support::mount_device_authorization(&server, 600, 5).await;

    let client = client(&server);
    let cancel = CancellationToken::new();
    assert!(client.discovery().cached().is_none());
    client.start_device_authorization(&cancel).await.unwrap();
    client.start_device_authorization(&cancel).await.unwrap();
    let endpoints = client.discovery().cached().unwrap();
    assert_eq!(endpoints.token_endpoint.path(), TOKEN_PATH);
}

#[tokio::test]
async fn discovery_rejects_non_json_content_type() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(DISCOVERY_PATH))
        .respond_with(
            ResponseTemplate::new(200).set_body_raw("<html>login</html>", "text/html"),
        )
        .mount(&server)
        .await;

    let err = client(&server)
        .endpoints(&CancellationToken::new())
        .await
        .unwrap_err();
    match err {
        AuthError::Discovery(msg) => assert!(msg.contains("text/html"), "{msg}"),
        other => panic!("expected Discovery error, got {other:?}"),
    }
}

#[tokio::test]
async fn discovery_requires_both_endpoints() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(DISCOVERY_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "token_endpoint": format!("{}{TOKEN_PATH}", server.uri()),
        })))
        .mount(&server)
        .await;

    let err = client(&server)
        .endpoints(&CancellationToken::new())
        .await
        .unwrap_err();
    assert!(matches!(err, AuthError::Discovery(_)), "{err:?}");
}

#[tokio::test]
async fn device_authorization_without_device_code_fails() {
    let server = MockServer::start().await;
    mount_discovery(&server).await;
    Mock::given(method("POST"))
        .and(path(DEVICE_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "user_code": "ABCD-EFGH",
            "verification_uri_complete": "https://id.example/device?user_code=ABCD-EFGH",
            "expires_in": 600
        })))
        .mount(&server)
        .await;

    let err = client(&server)
        .start_device_authorization(&CancellationToken::new())
        .await
        .unwrap_err();
    assert!(matches!(err, AuthError::DeviceAuthorization(_)), "{err:?}");
}

#[tokio::test]
async fn device_authorization_server_error_is_reported() {
    let server = MockServer::start().await;
    mount_discovery(&server).await;
    Mock::given(method("POST"))
        .and(path(DEVICE_PATH))
        .respond_with(oauth_error("unauthorized_client"))
        .mount(&server)
        .await;

    let err = client(&server)
        .start_device_authorization(&CancellationToken::new())
        .await
        .unwrap_err();
    match err {
        AuthError::DeviceAuthorization(msg) => assert!(msg.contains("unauthorized_client")),
        other => panic!("expected DeviceAuthorization error, got {other:?}"),
    }
}

#[tokio::test]
async fn device_authorization_rejects_unrepresentable_lifetime() {
    for expires_in in [10_000_000_000_000_000, u64::MAX] {
        let server = MockServer::start().await;
        mount_discovery(&server).await;
        auth_support::mount_device_authorization(&server, expires_in, 5).await;

        let err = client(&server)
            .start_device_authorization(&CancellationToken::new())
            .await
            .unwrap_err();
        match err {
            AuthError::DeviceAuthorization(msg) => {
                assert!(msg.contains("expires_in out of range"), "{msg}")
            }
            other => panic!("expected DeviceAuthorization error, got {other:?}"),
        }
    }
}

#[tokio::test]
async fn poller_retries_pending_until_approved() {
    let server = MockServer::start().await;
    mount_discovery(&server).await;
    Mock::given(method("POST"))
        .and(path(TOKEN_PATH))
        .and(body_string_contains("device_code=device-code-1"))
        .respond_with(oauth_error("authorization_pending"))
        .up_to_n_times(2)
        .expect(2)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path(TOKEN_PATH))
        .respond_with(token_response("access-1", "refresh-1"))
        .expect(1)
        .mount(&server)
        .await;

    let client = client(&server);
    let pair = TokenPoller::new(&client, PollPolicy::RetryUntilDeadline)
        .poll(
            &session(Duration::from_secs(30), Duration::from_millis(50)),
            &CancellationToken::new(),
        )
        .await
        .unwrap();
    assert_eq!(pair, TokenPair::new("access-1", "refresh-1"));
}

#[tokio::test]
async fn poller_times_out_after_code_lifetime() {
    let server = MockServer::start().await;
    mount_discovery(&server).await;
    Mock::given(method("POST"))
        .and(path(TOKEN_PATH))
        .respond_with(oauth_error("authorization_pending"))
        .mount(&server)
        .await;

    let client = client(&server);
    let err = TokenPoller::new(&client, PollPolicy::RetryUntilDeadline)
        .poll(
            &session(Duration::from_millis(300), Duration::from_millis(50)),
            &CancellationToken::new(),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, AuthError::PollTimeout), "{err:?}");
    let attempts = token_requests(&server).await;
    assert!(attempts >= 1, "expected at least one exchange, got {attempts}");
}

#[tokio::test]
async fn poller_cancelled_before_first_tick_makes_no_request() {
    let server = MockServer::start().await;
    mount_discovery(&server).await;
    Mock::given(method("POST"))
        .and(path(TOKEN_PATH))
        .respond_with(token_response("access-1", "refresh-1"))
        .expect(0)
        .mount(&server)
        .await;

    let cancel = CancellationToken::new();
    cancel.cancel();
    let client = client(&server);
    let err = TokenPoller::new(&client, PollPolicy::RetryUntilDeadline)
        .poll(
            &session(Duration::from_secs(30), Duration::from_millis(50)),
            &cancel,
        )
        .await
        .unwrap_err();
    assert!(matches!(err, AuthError::PollCancelled), "{err:?}");
}

#[tokio::test]
async fn poller_stops_when_cancelled_mid_flow() {
    let server = MockServer::start().await;
    mount_discovery(&server).await;
    Mock::given(method("POST"))
        .and(path(TOKEN_PATH))
        .respond_with(oauth_error("authorization_pending"))
        .mount(&server)
        .await;

    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(150)).await;
        trigger.cancel();
    });

    let client = client(&server);
    let started = std::time::Instant::now();
    let err = TokenPoller::new(&client, PollPolicy::RetryUntilDeadline)
        .poll(
            &session(Duration::from_secs(30), Duration::from_millis(50)),
            &cancel,
        )
        .await
        .unwrap_err();
    assert!(matches!(err, AuthError::PollCancelled), "{err:?}");
    assert!(started.elapsed() < Duration::from_secs(5));
}

#[tokio::test]
async fn retry_policy_keeps_polling_through_denials() {
    let server = MockServer::start().await;
    mount_discovery(&server).await;
    Mock::given(method("POST"))
        .and(path(TOKEN_PATH))
        .respond_with(oauth_error("access_denied"))
        .up_to_n_times(1)
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path(TOKEN_PATH))
        .respond_with(token_response("access-2", "refresh-2"))
        .mount(&server)
        .await;

    let client = client(&server);
    let pair = TokenPoller::new(&client, PollPolicy::RetryUntilDeadline)
        .poll(
            &session(Duration::from_secs(30), Duration::from_millis(50)),
            &CancellationToken::new(),
        )
        .await
        .unwrap();
    assert_eq!(pair.access_token, "access-2");
}

#[tokio::test]
async fn rfc8628_policy_stops_on_access_denied() {
    let server = MockServer::start().await;
    mount_discovery(&server).await;
    Mock::given(method("POST"))
        .and(path(TOKEN_PATH))
        .respond_with(oauth_error("access_denied"))
        .expect(1)
        .mount(&server)
        .await;

    let client = client(&server);
    let err = TokenPoller::new(&client, PollPolicy::Rfc8628)
        .poll(
            &session(Duration::from_secs(30), Duration::from_millis(50)),
            &CancellationToken::new(),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, AuthError::AccessDenied), "{err:?}");
}

#[tokio::test]
async fn rfc8628_policy_stops_on_expired_token() {
    let server = MockServer::start().await;
    mount_discovery(&server).await;
    Mock::given(method("POST"))
        .and(path(TOKEN_PATH))
        .respond_with(oauth_error("authorization_pending"))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path(TOKEN_PATH))
        .respond_with(oauth_error("expired_token"))
        .expect(1)
        .mount(&server)
        .await;

    let client = client(&server);
    let err = TokenPoller::new(&client, PollPolicy::Rfc8628)
        .poll(
            &session(Duration::from_secs(30), Duration::from_millis(50)),
            &CancellationToken::new(),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, AuthError::DeviceCodeExpired), "{err:?}");
}

#[tokio::test]
async fn rfc8628_slow_down_pushes_next_attempt_past_deadline() {
    let server = MockServer::start().await;
    mount_discovery(&server).await;
    Mock::given(method("POST"))
        .and(path(TOKEN_PATH))
        .respond_with(oauth_error("slow_down"))
        .mount(&server)
        .await;

    let client = client(&server);
    let started = std::time::Instant::now();
    let err = TokenPoller::new(&client, PollPolicy::Rfc8628)
        .poll(
            &session(Duration::from_millis(300), Duration::from_millis(50)),
            &CancellationToken::new(),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, AuthError::PollTimeout), "{err:?}");
    // One exchange, then the 5 s back-off outlasts the 350 ms budget.
    assert_eq!(token_requests(&server).await, 1);
    assert!(started.elapsed() < Duration::from_secs(3));
}

#[tokio::test]
async fn retry_policy_ignores_slow_down() {
    let server = MockServer::start().await;
    mount_discovery(&server).await;
    Mock::given(method("POST"))
        .and(path(TOKEN_PATH))
        .respond_with(oauth_error("slow_down"))
        .mount(&server)
        .await;

    let client = client(&server);
    let err = TokenPoller::new(&client, PollPolicy::RetryUntilDeadline)
        .poll(
            &session(Duration::from_millis(300), Duration::from_millis(50)),
            &CancellationToken::new(),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, AuthError::PollTimeout), "{err:?}");
    let attempts = token_requests(&server).await;
    assert!(attempts > 1, "expected repeated exchanges, got {attempts}");
}

#[tokio::test]
async fn zero_interval_session_waits_the_default_interval() {
    let server = MockServer::start().await;
    mount_discovery(&server).await;
    Mock::given(method("POST"))
        .and(path(TOKEN_PATH))
        .respond_with(oauth_error("authorization_pending"))
        .mount(&server)
        .await;

    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(300)).await;
        trigger.cancel();
    });

    let client = client(&server);
    let err = TokenPoller::new(&client, PollPolicy::RetryUntilDeadline)
        .poll(&session(Duration::from_secs(30), Duration::ZERO), &cancel)
        .await
        .unwrap_err();
    assert!(matches!(err, AuthError::PollCancelled), "{err:?}");
    assert_eq!(token_requests(&server).await, 0);
}

#[tokio::test]
async fn refresh_keeps_refresh_token_when_not_rotated() {
    let server = MockServer::start().await;
    mount_discovery(&server).await;
    Mock::given(method("POST"))
        .and(path(TOKEN_PATH))
        .and(body_string_contains("grant_type=refresh_token"))
        .and(body_string_contains("refresh_token=refresh-old"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "access_token": "access-new",
            "expires_in": 300
        })))
        .expect(1)
        .mount(&server)
        .await;

    let pair = client(&server)
        .refresh("refresh-old", &CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(pair, TokenPair::new("access-new", "refresh-old"));
}

#[tokio::test]
async fn refresh_rejection_is_a_refresh_error() {
    let server = MockServer::start().await;
    mount_discovery(&server).await;
    Mock::given(method("POST"))
        .and(path(TOKEN_PATH))
        .respond_with(oauth_error("invalid_grant"))
        .mount(&server)
        .await;

    let err = client(&server)
        .refresh("refresh-old", &CancellationToken::new())
        .await
        .unwrap_err();
    assert!(err.requires_login());
    match err {
        AuthError::Refresh(msg) => assert!(msg.contains("invalid_grant")),
        other => panic!("expected Refresh error, got {other:?}"),
    }
}
