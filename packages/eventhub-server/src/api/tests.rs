//! Router-level tests over an in-memory database with trusted headers.

use std::sync::Arc;

use axum::{
    body::Body,
    http::{header, Method, Request, StatusCode},
    Router,
};
use http_body_util::BodyExt;
use serde_json::{json, Value};
use tower::ServiceExt;

use eventhub_core::generation::MemoryQueue;
use eventhub_core::mailer::MemoryMailer;
use eventhub_core::storage::Database;

use crate::auth::TrustedHeaders;
use crate::config::{IntegrationConfig, ServerConfig};
use crate::state::{AppState, LumaInbox};

const ADMIN: (&str, &str) = ("admin_1", "admin@eventhub.test");
const ANA: (&str, &str) = ("user_ana", "ana@eventhub.test");
const BEN: (&str, &str) = ("user_ben", "ben@eventhub.test");
const PHOTO: &str = "https://utfs.io/f/photo.png";
const CALLBACK_SECRET: &str = "worker-secret";

struct TestApp {
    state: AppState,
    mailer: Arc<MemoryMailer>,
    queue: Arc<MemoryQueue>,
    _inbox: LumaInbox,
}

impl TestApp {
    fn new() -> Self {
        Self::with_integrations(IntegrationConfig::default())
    }

    fn with_integrations(integrations: IntegrationConfig) -> Self {
        let config = ServerConfig {
            admin_emails: ADMIN.1.to_string(),
            public_base_url: "https://eventhub.test".to_string(),
            ..Default::default()
        };
        let mailer = Arc::new(MemoryMailer::new());
        let queue = Arc::new(MemoryQueue::new());
        let (state, inbox) = AppState::new(
            config,
            integrations,
            Database::open(None).unwrap(),
            Arc::new(TrustedHeaders),
            queue.clone(),
            mailer.clone(),
            reqwest::Client::new(),
        );
        Self {
            state,
            mailer,
            queue,
            _inbox: inbox,
        }
    }

    fn router(&self) -> Router {
        super::router(self.state.clone())
    }

    async fn send(&self, request: Request<Body>) -> (StatusCode, axum::http::HeaderMap, Value) {
        let response = self.router().oneshot(request).await.unwrap();
        let status = response.status();
        let headers = response.headers().clone();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let body = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap_or(Value::Null)
        };
        (status, headers, body)
    }

    async fn call(&self, method: Method, uri: &str, user: Option<(&str, &str)>, body: Option<Value>) -> (StatusCode, Value) {
        let (status, _, body) = self.send(request(method, uri, user, body)).await;
        (status, body)
    }

    async fn create_org(&self, owner: (&str, &str), name: &str) -> String {
        let (status, org) = self
            .call(Method::POST, "/api/organizations", Some(owner), Some(json!({ "name": name })))
            .await;
        assert_eq!(status, StatusCode::CREATED, "{}", org);
        org["id"].as_str().unwrap().to_string()
    }
}

fn request(method: Method, uri: &str, user: Option<(&str, &str)>, body: Option<Value>) -> Request<Body> {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some((id, email)) = user {
        builder = builder
            .header(TrustedHeaders::USER_ID, id)
            .header(TrustedHeaders::EMAIL, email)
            .header(TrustedHeaders::EMAIL_VERIFIED, "true");
    }
    match body {
        Some(body) => builder
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    }
}

fn event_body(title: &str) -> Value {
    let starts_at = eventhub_core::time::now_timestamp() + 7 * 86_400;
    json!({
        "title": title,
        "eventType": "meetup",
        "city": "Lima",
        "startsAt": starts_at,
        "endsAt": starts_at + 3 * 3600,
    })
}

fn location(headers: &axum::http::HeaderMap) -> &str {
    headers
        .get(header::LOCATION)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
}

#[tokio::test]
async fn test_health() {
    let app = TestApp::new();
    let (status, _) = app.call(Method::GET, "/health", None, None).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn test_badge_generation_requires_sign_in() {
    let app = TestApp::new();
    let body = json!({ "communityId": "org_1", "photoUrl": PHOTO });
    let (status, body) = app.call(Method::POST, "/api/badge/generate", None, Some(body)).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert!(body["error"].is_string());
    assert!(app.queue.jobs().is_empty());
}

#[tokio::test]
async fn test_outsider_cannot_manage_event() {
    let app = TestApp::new();
    let org = app.create_org(ANA, "Lima Rust").await;
    let mut input = event_body("Rust Lima Meetup");
    input["organizationId"] = json!(org);
    let (status, event) = app.call(Method::POST, "/api/events", Some(ANA), Some(input)).await;
    assert_eq!(status, StatusCode::CREATED, "{}", event);
    let id = event["id"].as_str().unwrap();
    let uri = format!("/api/events/{}/permissions", id);

    let (_, owner) = app.call(Method::GET, &uri, Some(ANA), None).await;
    assert_eq!(owner["canManage"], json!(true));

    let (status, outsider) = app.call(Method::GET, &uri, Some(BEN), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(outsider["canManage"], json!(false));

    let (status, anonymous) = app.call(Method::GET, &uri, None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(anonymous["canManage"], json!(false));
}

#[tokio::test]
async fn test_god_mode_event_is_approved_and_listed() {
    let app = TestApp::new();
    let (status, event) = app
        .call(Method::POST, "/api/events", Some(ADMIN), Some(event_body("Lima Tech Week")))
        .await;
    assert_eq!(status, StatusCode::CREATED, "{}", event);
    assert_eq!(event["approvalStatus"], json!("approved"));
    assert_eq!(event["isApproved"], json!(true));

    let slug = event["slug"].as_str().unwrap();
    let (status, public) = app.call(Method::GET, &format!("/api/events/{}", slug), None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(public["id"], event["id"]);

    let (_, feed) = app.call(Method::GET, "/api/feed", None, None).await;
    let ids: Vec<_> = feed["events"].as_array().unwrap().iter().map(|e| e["id"].clone()).collect();
    assert!(ids.contains(&event["id"]));
}

#[tokio::test]
async fn test_member_event_starts_pending() {
    let app = TestApp::new();
    let (status, event) = app
        .call(Method::POST, "/api/events", Some(ANA), Some(event_body("Unvetted Meetup")))
        .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(event["approvalStatus"], json!("pending"));

    let (_, feed) = app.call(Method::GET, "/api/feed", None, None).await;
    assert!(feed["events"].as_array().unwrap().is_empty());

    let id = event["id"].as_str().unwrap();
    let (status, _) = app
        .call(Method::POST, &format!("/api/admin/events/{}/approve", id), Some(BEN), None)
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    let (status, approved) = app
        .call(Method::POST, &format!("/api/admin/events/{}/approve", id), Some(ADMIN), None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(approved["approvalStatus"], json!("approved"));
}

#[tokio::test]
async fn test_following_feed_requires_sign_in() {
    let app = TestApp::new();
    let (status, _) = app.call(Method::GET, "/api/feed?scope=following", None, None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    let (status, _) = app.call(Method::GET, "/api/feed?scope=following", Some(ANA), None).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn test_unsubscribe_is_idempotent() {
    let app = TestApp::new();
    let (status, body) = app
        .call(Method::POST, "/api/subscribe", None, Some(json!({ "email": "Reader@Example.com" })))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["outcome"], json!("created"));

    let verify = app.mailer.last_token_for("reader@example.com").unwrap();
    let (status, headers, _) = app
        .send(request(Method::GET, &format!("/api/verify?token={}", verify), None, None))
        .await;
    assert_eq!(status, StatusCode::SEE_OTHER);
    assert_eq!(location(&headers), "https://eventhub.test/subscribe/success");

    let token = app
        .state
        .db
        .get_subscription_by_email("reader@example.com")
        .unwrap()
        .unwrap()
        .unsubscribe_token;
    let uri = format!("/api/unsubscribe?token={}", token);

    let (status, headers, _) = app.send(request(Method::GET, &uri, None, None)).await;
    assert_eq!(status, StatusCode::SEE_OTHER);
    assert_eq!(location(&headers), "https://eventhub.test/unsubscribe/success");

    let (_, headers, _) = app.send(request(Method::GET, &uri, None, None)).await;
    assert_eq!(location(&headers), "https://eventhub.test/unsubscribe/success?already=true");
}

#[tokio::test]
async fn test_token_redirect_errors() {
    let app = TestApp::new();
    let (_, headers, _) = app.send(request(Method::GET, "/api/verify", None, None)).await;
    assert_eq!(location(&headers), "https://eventhub.test/subscribe/error?reason=missing");

    let (_, headers, _) = app
        .send(request(Method::GET, "/api/unsubscribe?token=nope", None, None))
        .await;
    assert_eq!(location(&headers), "https://eventhub.test/unsubscribe/error?reason=invalid");

    let (_, headers, _) = app
        .send(request(Method::GET, "/api/verify-host?token=nope", None, None))
        .await;
    assert_eq!(location(&headers), "https://eventhub.test/verify-host/error?reason=invalid");
}

#[tokio::test]
async fn test_badge_generation_checks() {
    let app = TestApp::new();
    let org = app.create_org(ANA, "Lima Rust").await;

    let bad_host = json!({ "communityId": org, "photoUrl": "https://evil.example/p.png" });
    let (status, _) = app.call(Method::POST, "/api/badge/generate", Some(ANA), Some(bad_host)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let request_body = json!({ "communityId": org, "photoUrl": PHOTO, "memberName": "Ana" });
    let (status, _) = app
        .call(Method::POST, "/api/badge/generate", Some(BEN), Some(request_body.clone()))
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, headers, ticket) = app
        .send(request(Method::POST, "/api/badge/generate", Some(ANA), Some(request_body.clone())))
        .await;
    assert_eq!(status, StatusCode::OK, "{}", ticket);
    assert_eq!(ticket["badgeNumber"], json!(1));
    assert_eq!(headers.get("x-ratelimit-remaining").unwrap(), "0");
    assert_eq!(app.queue.jobs().len(), 1);

    let token = ticket["token"].as_str().unwrap();
    let (status, view) = app
        .call(Method::GET, &format!("/api/badge/status/{}", token), None, None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(view["status"], json!("pending"));
    assert_eq!(view["communityName"], json!("Lima Rust"));

    let (status, headers, _) = app
        .send(request(Method::POST, "/api/badge/generate", Some(ANA), Some(request_body)))
        .await;
    assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
    assert!(headers.contains_key(header::RETRY_AFTER));
    assert_eq!(app.queue.jobs().len(), 1);
}

#[tokio::test]
async fn test_rejected_generation_keeps_rate_limit_slot() {
    let app = TestApp::new();
    let org = app.create_org(ANA, "Lima Rust").await;

    let blank_name = json!({ "communityId": org, "photoUrl": PHOTO, "memberName": "   " });
    let (status, body) = app
        .call(Method::POST, "/api/badge/generate", Some(ANA), Some(blank_name))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], json!("Member name is required"));

    let valid = json!({ "communityId": org, "photoUrl": PHOTO, "memberName": "Ana" });
    let (status, body) = app.call(Method::POST, "/api/badge/generate", Some(ANA), Some(valid)).await;
    assert_eq!(status, StatusCode::OK, "{}", body);

    for _ in 0..3 {
        let bad_style = json!({ "recipientName": "Mia", "style": "Not A Slug!", "photoUrl": PHOTO });
        let (status, _) = app.call(Method::POST, "/api/gift/generate", Some(BEN), Some(bad_style)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }
    let valid = json!({ "recipientName": "Mia", "style": "birthday", "photoUrl": PHOTO });
    let (status, body) = app.call(Method::POST, "/api/gift/generate", Some(BEN), Some(valid)).await;
    assert_eq!(status, StatusCode::OK, "{}", body);
}

#[tokio::test]
async fn test_gift_card_generation() {
    let app = TestApp::new();
    let body = json!({ "recipientName": "Mia", "style": "birthday", "photoUrl": PHOTO });
    let (status, ticket) = app.call(Method::POST, "/api/gift/generate", Some(BEN), Some(body)).await;
    assert_eq!(status, StatusCode::OK, "{}", ticket);

    let token = ticket["token"].as_str().unwrap();
    let (status, view) = app.call(Method::GET, &format!("/api/gift/status/{}", token), None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(view["recipientName"], json!("Mia"));

    let (status, _) = app.call(Method::GET, "/api/gift/status/unknown", None, None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_callback_secret() {
    let unconfigured = TestApp::new();
    let report = json!({ "kind": "gift_card", "token": "t", "status": "generating" });
    let (status, _) = unconfigured
        .call(Method::POST, "/api/jobs/callback", None, Some(report))
        .await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);

    let app = TestApp::with_integrations(IntegrationConfig {
        job_callback_secret: Some(CALLBACK_SECRET.to_string()),
        ..Default::default()
    });
    let body = json!({ "recipientName": "Mia", "style": "thanks", "photoUrl": PHOTO });
    let (_, ticket) = app.call(Method::POST, "/api/gift/generate", Some(BEN), Some(body)).await;
    let token = ticket["token"].as_str().unwrap().to_string();

    let report = json!({
        "kind": "gift_card",
        "token": token,
        "status": "completed",
        "imageUrl": "https://utfs.io/f/card.png",
    });
    let (status, _) = app
        .call(Method::POST, "/api/jobs/callback", None, Some(report.clone()))
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let mut signed = request(Method::POST, "/api/jobs/callback", None, Some(report));
    signed
        .headers_mut()
        .insert(super::generation::CALLBACK_SECRET_HEADER, CALLBACK_SECRET.parse().unwrap());
    let (status, _, body) = app.send(signed).await;
    assert_eq!(status, StatusCode::OK, "{}", body);
    assert_eq!(body["status"], json!("completed"));

    let (_, view) = app.call(Method::GET, &format!("/api/gift/status/{}", token), None, None).await;
    assert_eq!(view["status"], json!("completed"));
    assert_eq!(view["generatedImageUrl"], json!("https://utfs.io/f/card.png"));
}

#[tokio::test]
async fn test_luma_webhook() {
    let app = TestApp::new();
    let (status, body) = app.call(Method::GET, "/api/webhooks/luma", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["received"], json!(true));

    let malformed = Request::builder()
        .method(Method::POST)
        .uri("/api/webhooks/luma")
        .body(Body::from("not json"))
        .unwrap();
    let (status, _, _) = app.send(malformed).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, body) = app
        .call(Method::POST, "/api/webhooks/luma", None, Some(json!({ "type": "event.deleted" })))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["received"], json!(true));
}

#[tokio::test]
async fn test_fonts_without_key() {
    let app = TestApp::new();
    let (status, _) = app.call(Method::GET, "/api/fonts/search?q=roboto", None, None).await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
}

#[tokio::test]
async fn test_me_reports_god_mode() {
    let app = TestApp::new();
    let (status, _) = app.call(Method::GET, "/api/me", None, None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (_, admin) = app.call(Method::GET, "/api/me", Some(ADMIN), None).await;
    assert_eq!(admin["isGod"], json!(true));
    let (_, ana) = app.call(Method::GET, "/api/me", Some(ANA), None).await;
    assert_eq!(ana["isGod"], json!(false));
}
