use std::sync::Arc;
use std::time::Duration;

use axum::{
    Router,
    body::Body,
    http::{Request, StatusCode, header},
};
use serde_json::{Value, json};
use tower::ServiceExt;

use smsdesk_api::auth::create_token;
use smsdesk_api::{AppStateInner, router};
use smsdesk_core::{AuthUser, Portal, StoredBlacklist};
use smsdesk_db::{RecordStore, keys};
use smsdesk_gateway::EventBus;
use smsdesk_types::models::UserStatus;

const SECRET: &str = "test-secret";

struct Harness {
    app: Router,
    portal: Portal,
}

fn harness() -> Harness {
    let store = Arc::new(RecordStore::open_in_memory().unwrap());
    let blacklist = Arc::new(StoredBlacklist::new(store.clone()));
    let portal = Portal::new(store, EventBus::new(), blacklist, Duration::ZERO);
    let state = Arc::new(AppStateInner::new(
        portal.clone(),
        SECRET.to_string(),
        vec!["Admin".to_string()],
    ));
    Harness {
        app: router(state),
        portal,
    }
}

impl Harness {
    fn token_for(&self, username: &str) -> String {
        let user = self
            .portal
            .ledger
            .register(username, &format!("{}@example.com", username), "secret123")
            .unwrap();
        let auth = AuthUser {
            id: user.id,
            username: username.to_string(),
            email: user.email,
        };
        create_token(SECRET, &auth).unwrap()
    }

    async fn call(&self, method: &str, uri: &str, token: Option<&str>, body: Option<Value>) -> (StatusCode, Value) {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
        }
        let request = match body {
            Some(body) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };

        let response = self.app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let value = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, value)
    }
}

#[tokio::test]
async fn register_then_login_issues_tokens() {
    let h = harness();

    let (status, body) = h
        .call(
            "POST",
            "/auth/register",
            None,
            Some(json!({ "username": "erin", "email": "erin@example.com", "password": "secret123" })),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["username"], "erin");
    assert!(body["token"].as_str().is_some());

    let (status, body) = h
        .call("POST", "/auth/login", None, Some(json!({ "login": "ERIN@example.com", "password": "secret123" })))
        .await;
    assert_eq!(status, StatusCode::OK);
    let token = body["token"].as_str().unwrap().to_string();

    let (status, body) = h.call("GET", "/me", Some(&token), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["email"], "erin@example.com");
    assert_eq!(body["data"]["balance"], "0");
}

#[tokio::test]
async fn bad_credentials_are_unauthorized() {
    let h = harness();
    h.token_for("frank");

    let (status, body) = h
        .call("POST", "/auth/login", None, Some(json!({ "login": "frank", "password": "nope-nope" })))
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["success"], false);
}

#[tokio::test]
async fn sms_routes_require_token() {
    let h = harness();

    let (status, _) = h.call("GET", "/sms/history", None, None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _) = h.call("GET", "/sms/history", Some("garbage"), None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn send_then_list_threads() {
    let h = harness();
    let token = h.token_for("grace");

    let (status, body) = h
        .call(
            "POST",
            "/sms/send",
            Some(&token),
            Some(json!({ "recipients": ["+1000"], "message": "hello" })),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["message"], "Message sent");
    let id = body["data"][0]["id"].as_str().unwrap().to_string();

    let (_, body) = h.call("GET", "/sms/threads?search=HELLO", Some(&token), None).await;
    assert_eq!(body["data"][0]["recipient"], "+1000");
    assert_eq!(body["data"][0]["messages"][0]["status"], "sent");

    let (status, body) = h.call("DELETE", &format!("/sms/messages/{}", id), Some(&token), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"], true);

    let (_, body) = h.call("GET", "/sms/history", Some(&token), None).await;
    assert_eq!(body["data"], json!([]));
}

#[tokio::test]
async fn blacklisted_send_is_bad_request() {
    let h = harness();
    assert!(h.portal.store.set(keys::BLACKLIST, &json!(["+9999"])));
    let token = h.token_for("heidi");

    let (status, body) = h
        .call(
            "POST",
            "/sms/send",
            Some(&token),
            Some(json!({ "recipients": ["+9999"], "message": "promo" })),
        )
        .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["success"], false);
    assert_eq!(body["message"], "The following numbers are blacklisted: +9999");
    assert!(h.portal.sms.log().all().is_empty());
}

#[tokio::test]
async fn admin_routes_need_listed_user() {
    let h = harness();
    let token = h.token_for("ivan");

    let (status, _) = h.call("GET", "/admin/users", Some(&token), None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn admin_updates_balance_and_status() {
    let h = harness();
    let admin = h.token_for("admin");
    h.token_for("judy");
    let judy = h
        .portal
        .ledger
        .users()
        .into_iter()
        .find(|u| u.email == "judy@example.com")
        .unwrap();

    let uri = format!("/admin/users/{}/balance", judy.id);
    let (status, body) = h.call("PUT", &uri, Some(&admin), Some(json!({ "balance": "12.50" }))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["balance"], "12.50");
    assert_eq!(body["data"]["totalRecharge"], "12.50");

    let (status, _) = h.call("PUT", &uri, Some(&admin), Some(json!({ "balance": "lots" }))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = h
        .call("PUT", "/admin/users/nobody/balance", Some(&admin), Some(json!({ "balance": "1" })))
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let uri = format!("/admin/users/{}/status", judy.id);
    let (status, body) = h.call("PUT", &uri, Some(&admin), Some(json!({ "status": "banned" }))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["status"], "banned");

    let (status, _) = h
        .call("POST", "/auth/login", None, Some(json!({ "login": "judy", "password": "secret123" })))
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn ban_revokes_existing_token() {
    let h = harness();
    let token = h.token_for("mallory");
    let (status, _) = h.call("GET", "/sms/history", Some(&token), None).await;
    assert_eq!(status, StatusCode::OK);

    let mallory = h.portal.ledger.users().pop().unwrap();
    assert!(h.portal.ledger.update_status(&mallory.id, UserStatus::Banned));

    let (status, _) = h
        .call(
            "POST",
            "/sms/send",
            Some(&token),
            Some(json!({ "recipients": ["+1000"], "message": "still here" })),
        )
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert!(h.portal.sms.log().all().is_empty());
}

#[tokio::test]
async fn token_for_unknown_account_is_unauthorized() {
    let h = harness();
    let ghost = AuthUser {
        id: "ghost".into(),
        username: "ghost".into(),
        email: "ghost@example.com".into(),
    };
    let token = create_token(SECRET, &ghost).unwrap();

    let (status, _) = h.call("GET", "/me", Some(&token), None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}
