//! Router smoke tests through `tower::ServiceExt::oneshot`.

use std::{sync::Arc, time::SystemTime};

use axum::{
    Router,
    body::{Body, to_bytes},
    http::{Request, StatusCode, header::CONTENT_TYPE},
};
use serde_json::{Value, json};
use tower::ServiceExt;

use raffle_back::{
    config::AppConfig,
    dao::raffle_store::memory::MemoryRaffleStore,
    gateway::{
        fake::FakeGateway,
        signature::{self, SIGNATURE_HEADER},
    },
    routes,
    state::{AppState, sale::Money},
};

const ADMIN_TOKEN: &str = "admin-secret";
const WEBHOOK_SECRET: &str = "whsec_http";

async fn app() -> Router {
    let config = AppConfig {
        admin_token: Some(ADMIN_TOKEN.into()),
        webhook_secret: Some(WEBHOOK_SECRET.into()),
        ..AppConfig::default()
    };
    let state = AppState::new(config, Arc::new(FakeGateway::new()));
    state.set_store(Arc::new(MemoryRaffleStore::new())).await;
    routes::router(state)
}

fn json_request(method: &str, uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header(CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

async fn body_json(response: axum::response::Response) -> Value {
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn healthcheck_reports_ok() {
    let response = app()
        .await
        .oneshot(Request::get("/healthcheck").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await["status"], "ok");
}

#[tokio::test]
async fn purchase_then_webhook_then_admin_totals() {
    let app = app().await;

    let response = app
        .clone()
        .oneshot(json_request(
            "POST",
            "/purchases",
            json!({ "entry_type": "raffle", "quantity": 3, "name": "Sam Buyer", "email": "sam@example.org" }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let receipt = body_json(response).await;
    let intent_id = receipt["intent_id"].as_str().unwrap().to_owned();
    assert!(receipt["client_secret"].as_str().unwrap().starts_with(&intent_id));
    assert!(receipt.get("ticket_number").is_none());

    let payload = FakeGateway::succeeded_event(&intent_id, Money::from_cents(3120));
    let header = signature::sign(&payload, WEBHOOK_SECRET, SystemTime::now()).unwrap();
    let response = app
        .clone()
        .oneshot(
            Request::post("/webhooks/payments")
                .header(SIGNATURE_HEADER, header)
                .body(Body::from(payload))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await["outcome"], "processed");

    let response = app
        .clone()
        .oneshot(
            Request::get("/admin/totals")
                .header("x-admin-token", ADMIN_TOKEN)
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let totals = body_json(response).await;
    assert_eq!(totals["totals"]["raffle"]["tickets"], 3);
    assert_eq!(totals["totals"]["raffle"]["amount"], "30.00");
}

#[tokio::test]
async fn invalid_purchase_is_rejected() {
    let response = app()
        .await
        .oneshot(json_request(
            "POST",
            "/purchases",
            json!({ "entry_type": "raffle", "quantity": 1, "name": "Sam", "email": "not-an-email" }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn unsigned_webhook_is_a_client_error() {
    let payload = FakeGateway::succeeded_event("pi_fake_0001", Money::from_cents(100));
    let response = app()
        .await
        .oneshot(Request::post("/webhooks/payments").body(Body::from(payload)).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(body_json(response).await["kind"], "invalid-argument");
}

#[tokio::test]
async fn admin_routes_require_the_token() {
    let app = app().await;
    let missing = app
        .clone()
        .oneshot(Request::get("/admin/referrers").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(missing.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(body_json(missing).await["kind"], "permission-denied");

    let wrong = app
        .clone()
        .oneshot(
            Request::get("/admin/referrers")
                .header("x-admin-token", "guess")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(wrong.status(), StatusCode::UNAUTHORIZED);

    let created = app
        .clone()
        .oneshot({
            let mut request = json_request("POST", "/admin/referrers", json!({ "name": "Jane Doe" }));
            request
                .headers_mut()
                .insert("x-admin-token", ADMIN_TOKEN.parse().unwrap());
            request
        })
        .await
        .unwrap();
    assert_eq!(created.status(), StatusCode::CREATED);
    assert_eq!(body_json(created).await["referral_code"], "JaneD");

    let click = app
        .oneshot(Request::post("/referrals/JaneD/click").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(click.status(), StatusCode::OK);
}

fn admin_json_request(method: &str, uri: &str, body: Value) -> Request<Body> {
    let mut request = json_request(method, uri, body);
    request
        .headers_mut()
        .insert("x-admin-token", ADMIN_TOKEN.parse().unwrap());
    request
}

#[tokio::test]
async fn hyphenated_referrer_code_is_usable_at_checkout() {
    let app = app().await;
    let created = app
        .clone()
        .oneshot(admin_json_request(
            "POST",
            "/admin/referrers",
            json!({ "name": "Anne-Marie Smith" }),
        ))
        .await
        .unwrap();
    assert_eq!(created.status(), StatusCode::CREATED);
    let code = body_json(created).await["referral_code"]
        .as_str()
        .unwrap()
        .to_owned();
    assert_eq!(code, "AnneMarieS");

    let response = app
        .oneshot(json_request(
            "POST",
            "/purchases",
            json!({
                "entry_type": "raffle",
                "quantity": 2,
                "referral_code": code,
                "name": "Sam Buyer",
                "email": "sam@example.org"
            }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn oversized_amounts_are_bad_requests() {
    let app = app().await;
    let donation = app
        .clone()
        .oneshot(json_request(
            "POST",
            "/purchases",
            json!({
                "entry_type": "donation",
                "amount": "79228162514264337593543950335",
                "name": "Sam Buyer",
                "email": "sam@example.org"
            }),
        ))
        .await
        .unwrap();
    assert_eq!(donation.status(), StatusCode::BAD_REQUEST);

    let manual = app
        .oneshot(admin_json_request(
            "POST",
            "/admin/entries",
            json!({
                "ticket_count": 1,
                "amount": "79228162514264337593543950335",
                "name": "Cash Buyer",
                "email": "cash@example.org"
            }),
        ))
        .await
        .unwrap();
    assert_eq!(manual.status(), StatusCode::BAD_REQUEST);
}
