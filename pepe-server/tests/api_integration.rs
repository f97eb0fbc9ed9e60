//! API integration tests for pepe-server.
//!
//! These tests drive the router in-process through `tower::ServiceExt`,
//! covering the echo harness, the proxy relay, the replay relay ticket
//! lifecycle and the test issuer routes.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use axum::{
    body::Body,
    http::{
        header::{CONTENT_TYPE, TRANSFER_ENCODING},
        HeaderValue, Request, StatusCode,
    },
    response::Response,
    Router,
};
use pepe_core::{
    challenge, IssuanceExecutor, IssuerTransport, MockTransport, PepeError, ProxyRelay,
    RelayRequest, RelayResponse, ReplayConfig, ReplayPoller, TestIssuer, TokenType, Transport,
    TriggerOutcome,
};
use pepe_server::{create_router, create_router_with_state, AppState, Config};
use serde_json::Value;
use tower::ServiceExt;
use url::Url;

const CHALLENGE: &str = "PrivateToken challenge=AAIAAA, token-key=AQID";
const AUTHORIZATION: &str = "PrivateToken token=AAIB";

fn app_with(state: AppState) -> Router {
    create_router_with_state(&Config::default(), state)
}

fn echo_only() -> Router {
    app_with(AppState::new(Arc::new(MockTransport::new()), false))
}

async fn body_bytes(response: Response) -> Vec<u8> {
    axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap()
        .to_vec()
}

async fn body_json(response: Response) -> Value {
    serde_json::from_slice(&body_bytes(response).await).unwrap()
}

fn echo_request(headers: &[(&str, &str)]) -> Request<Body> {
    let mut builder = Request::builder().method("POST").uri("/echo");
    for (name, value) in headers {
        builder = builder.header(*name, *value);
    }
    builder.body(Body::empty()).unwrap()
}

/// Carries core relay requests into the router, as an HTTP client would.
struct RouterTransport(Router);

#[async_trait]
impl Transport for RouterTransport {
    async fn send(&self, request: RelayRequest) -> pepe_core::Result<RelayResponse> {
        let url = Url::parse(&request.url).map_err(|e| PepeError::Network(e.to_string()))?;
        let path = match url.query() {
            Some(query) => format!("{}?{}", url.path(), query),
            None => url.path().to_string(),
        };

        let mut http_request = Request::builder()
            .method(request.method.clone())
            .uri(path)
            .body(Body::from(request.body))
            .map_err(|e| PepeError::Network(e.to_string()))?;
        *http_request.headers_mut() = request.headers;

        let response = self.0.clone().oneshot(http_request).await.unwrap();
        let mut relayed = RelayResponse::new(response.status().as_u16());
        relayed.headers = response.headers().clone();
        Ok(relayed.body(body_bytes(response).await))
    }
}

// ============================================================================
// Health & Readiness Tests
// ============================================================================

#[tokio::test]
async fn test_health_endpoint() {
    let response = create_router()
        .unwrap()
        .oneshot(Request::get("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert_eq!(json["status"], "healthy");
    assert_eq!(json["service"], "pepe-server");
    assert_eq!(json["open_tickets"], 0);
}

#[tokio::test]
async fn test_ready_endpoint() {
    let response = echo_only()
        .oneshot(Request::get("/ready").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await["ready"], true);
}

// ============================================================================
// Echo Harness Tests
// ============================================================================

#[tokio::test]
async fn test_echo_reflects_challenge_with_401() {
    let response = echo_only()
        .oneshot(echo_request(&[
            ("WWW-Authenticate", CHALLENGE),
            ("Host", "localhost:8787"),
            ("X-Debug", "1"),
        ]))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    let headers = response.headers();
    assert_eq!(headers.get("www-authenticate").unwrap(), CHALLENGE);
    assert_eq!(headers.get("x-debug").unwrap(), "1");
    assert!(headers.get("host").is_none());
    assert!(headers.get("relay-ticket").is_none());
}

#[tokio::test]
async fn test_echo_returns_authorization_with_200() {
    let response = echo_only()
        .oneshot(echo_request(&[
            ("WWW-Authenticate", CHALLENGE),
            ("Authorization", AUTHORIZATION),
        ]))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers().get("authorization").unwrap(), AUTHORIZATION);
    assert_eq!(body_bytes(response).await, AUTHORIZATION.as_bytes());
}

#[tokio::test]
async fn test_echo_reflects_probe_header() {
    let app = echo_only();
    let available = pepe_core::probe_echo(&RouterTransport(app), "http://localhost/echo").await;
    assert!(available);
}

// ============================================================================
// Proxy Relay Tests
// ============================================================================

#[tokio::test]
async fn test_proxy_without_target_is_bad_request() {
    let response = echo_only()
        .oneshot(
            Request::post("/proxy")
                .body(Body::from("payload"))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let json = body_json(response).await;
    assert_eq!(json["code"], "INVALID_INPUT");
}

#[tokio::test]
async fn test_proxy_strips_headers_and_returns_upstream_response() {
    let mock = Arc::new(MockTransport::new());
    mock.push_response(
        RelayResponse::new(200)
            .header(
                CONTENT_TYPE,
                HeaderValue::from_static("application/private-token-response"),
            )
            .header(TRANSFER_ENCODING, HeaderValue::from_static("chunked"))
            .body(vec![7u8; 4]),
    );
    let app = app_with(AppState::new(mock.clone(), false));

    let response = app
        .oneshot(
            Request::post("/proxy?target=https%3A%2F%2Fissuer.example%2Ftoken-request")
                .header("Host", "localhost:8787")
                .header("Origin", "http://localhost:8787")
                .header("Content-Length", "3")
                .header("Content-Type", "application/private-token-request")
                .body(Body::from(vec![1u8, 2, 3]))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers().get("content-type").unwrap(),
        "application/private-token-response"
    );
    assert!(response.headers().get("transfer-encoding").is_none());
    assert_eq!(body_bytes(response).await, vec![7u8; 4]);

    let requests = mock.requests();
    assert_eq!(requests.len(), 1);
    let forwarded = &requests[0];
    assert_eq!(forwarded.method, axum::http::Method::POST);
    assert_eq!(forwarded.url, "https://issuer.example/token-request");
    assert_eq!(forwarded.body, vec![1u8, 2, 3]);
    assert_eq!(
        forwarded.header_value("content-type"),
        Some("application/private-token-request")
    );
    for stripped in ["host", "origin", "content-length"] {
        assert!(forwarded.header_value(stripped).is_none(), "{stripped} forwarded");
    }
}

#[tokio::test]
async fn test_proxy_upstream_failure_is_bad_gateway() {
    let mock = Arc::new(MockTransport::new());
    mock.push_error(PepeError::Network("connection refused".into()));
    let app = app_with(AppState::new(mock, false));

    let response = app
        .oneshot(
            Request::get("/proxy?target=https://issuer.example/")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
    assert_eq!(body_json(response).await["code"], "UPSTREAM_ERROR");
}

// ============================================================================
// Replay Relay Tests
// ============================================================================

#[tokio::test]
async fn test_relay_ticket_lifecycle() {
    let app = app_with(AppState::new(Arc::new(MockTransport::new()), true));

    // Unanswered challenge opens a ticket
    let response = app
        .clone()
        .oneshot(echo_request(&[("WWW-Authenticate", CHALLENGE)]))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    let ticket = response
        .headers()
        .get("relay-ticket")
        .unwrap()
        .to_str()
        .unwrap()
        .to_string();

    let status = app
        .clone()
        .oneshot(Request::get(format!("/relay/{ticket}")).body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(status.status(), StatusCode::OK);
    let json = body_json(status).await;
    assert_eq!(json["ticket"], ticket.as_str());
    assert_eq!(json["state"], "pending");
    assert_eq!(json["challenge"], CHALLENGE);

    // Presenting a pending ticket is still unauthorized
    let response = app
        .clone()
        .oneshot(echo_request(&[("Relay-Ticket", &ticket)]))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let resolved = app
        .clone()
        .oneshot(
            Request::post(format!("/relay/{ticket}"))
                .header("Authorization", AUTHORIZATION)
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(body_json(resolved).await["state"], "resolved");

    // The resolved ticket yields the stored authorization once
    let response = app
        .clone()
        .oneshot(echo_request(&[
            ("WWW-Authenticate", CHALLENGE),
            ("Relay-Ticket", &ticket),
        ]))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_bytes(response).await, AUTHORIZATION.as_bytes());

    let gone = app
        .oneshot(Request::get(format!("/relay/{ticket}")).body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(gone.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_unknown_ticket_is_not_found() {
    let app = app_with(AppState::new(Arc::new(MockTransport::new()), true));

    let response = app
        .clone()
        .oneshot(Request::get("/relay/missing").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let response = app
        .oneshot(
            Request::post("/relay/missing")
                .header("Authorization", AUTHORIZATION)
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_expired_ticket_is_not_found() {
    let state = AppState::new(Arc::new(MockTransport::new()), true).with_ticket_ttl(Duration::ZERO);
    let app = app_with(state);

    let response = app
        .clone()
        .oneshot(echo_request(&[("WWW-Authenticate", CHALLENGE)]))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    let ticket = response.headers()["relay-ticket"].to_str().unwrap().to_string();

    let status = app
        .clone()
        .oneshot(Request::get(format!("/relay/{ticket}")).body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(status.status(), StatusCode::NOT_FOUND);

    let response = app
        .oneshot(echo_request(&[("Relay-Ticket", &ticket)]))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_unanswered_challenges_do_not_accumulate() {
    let state = AppState::new(Arc::new(MockTransport::new()), true).with_ticket_ttl(Duration::ZERO);
    let tickets = state.tickets.clone();
    let app = app_with(state);

    for _ in 0..50 {
        let response = app
            .clone()
            .oneshot(echo_request(&[("WWW-Authenticate", CHALLENGE)]))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    assert_eq!(tickets.len(), 0);
    let health = app
        .oneshot(Request::get("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(body_json(health).await["open_tickets"], 0);
}

#[tokio::test]
async fn test_resolve_without_authorization_is_bad_request() {
    let state = AppState::new(Arc::new(MockTransport::new()), true);
    let app = app_with(state);

    let response = app
        .clone()
        .oneshot(echo_request(&[("WWW-Authenticate", CHALLENGE)]))
        .await
        .unwrap();
    let ticket = response.headers()["relay-ticket"].to_str().unwrap().to_string();

    let response = app
        .oneshot(
            Request::post(format!("/relay/{ticket}"))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_replay_poller_against_server() {
    let state = AppState::new(Arc::new(MockTransport::new()), true);
    let tickets = state.tickets.clone();
    let app = app_with(state);

    // Answer the ticket from another task once it shows up
    let resolver = {
        let app = app.clone();
        tokio::spawn(async move {
            let ticket = loop {
                if let Some(ticket) = tickets.ids().pop() {
                    break ticket;
                }
                tokio::time::sleep(Duration::from_millis(5)).await;
            };
            app.oneshot(
                Request::post(format!("/relay/{ticket}"))
                    .header("Authorization", AUTHORIZATION)
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap()
        })
    };

    let poller = ReplayPoller::new(
        RouterTransport(app),
        "http://localhost:8787/echo",
        "http://localhost:8787",
        ReplayConfig {
            interval: Duration::from_millis(5),
            max_polls: Some(400),
        },
    );
    let outcome = poller.trigger(CHALLENGE).await.unwrap();

    assert_eq!(outcome, TriggerOutcome::Authorized(AUTHORIZATION.into()));
    assert_eq!(resolver.await.unwrap().status(), StatusCode::OK);
}

// ============================================================================
// Test Issuer Tests
// ============================================================================

fn issuer_app() -> (&'static TestIssuer, Router) {
    let issuer = TestIssuer::shared().unwrap();
    let state = AppState::new(Arc::new(IssuerTransport::new(issuer)), false).with_test_issuer(issuer);
    (issuer, app_with(state))
}

#[tokio::test]
async fn test_issuer_routes_absent_by_default() {
    let response = echo_only()
        .oneshot(
            Request::get("/.well-known/private-token-issuer-directory")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_issuer_directory_route() {
    let (_, app) = issuer_app();
    let report = pepe_core::fetch_directory(
        &RouterTransport(app),
        "http://localhost:8787/.well-known/private-token-issuer-directory",
        &pepe_core::ClientConfig::default(),
    )
    .await
    .unwrap();

    assert!(report.content_type_matched);
    assert_eq!(report.keys.len(), 2);
    assert_eq!(
        report.keys[0].request_url(),
        "https://localhost:8787/token-request"
    );
}

#[tokio::test]
async fn test_token_request_with_unknown_media_type() {
    let (_, app) = issuer_app();
    let response = app
        .oneshot(
            Request::post("/token-request")
                .header("Content-Type", "application/octet-stream")
                .body(Body::from(vec![0u8; 8]))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNSUPPORTED_MEDIA_TYPE);
}

#[tokio::test]
async fn test_issuance_through_proxy_relay() {
    let (issuer, app) = issuer_app();
    let key = issuer.token_key(TokenType::Public, "https://issuer.example/token-request");
    let header = challenge::create_challenge_header(
        TokenType::Public,
        &[(key.raw_key.clone(), issuer.name().to_string())],
        &["localhost".to_string()],
    )
    .unwrap();

    // Issuer traffic goes through /proxy; the server forwards to the issuer
    let transport = ProxyRelay::new("http://localhost:8787", RouterTransport(app)).unwrap();
    let executor = IssuanceExecutor::new(transport);
    let report = executor.run(&header, &key, None).await.unwrap();

    assert_eq!(report.primary.to_string(), "Current Valid: true");
    assert_eq!(
        report.legacy.map(|v| v.to_string()).as_deref(),
        Some("Legacy Valid: true")
    );
}
