//! Integration tests for the USSD router.
//!
//! Drives full dialogs through the HTTP surface with Africa's Talking style
//! form callbacks.

use axum::{
    body::Body,
    http::{header, Method, Request, StatusCode},
};
use std::sync::Arc;
use std::time::Duration;
use test_case::test_case;
use tower::ServiceExt;
use ussd_router::routes::MAX_BODY_BYTES;
use ussd_router::{
    build_router, demo, AfricasTalkingAdapter, Engine, EngineBuilder, InputMode, MenuOption,
    UssdRequest,
};

const PHONE: &str = "+265888000111";

fn demo_engine() -> Arc<Engine> {
    let engine = EngineBuilder::new(Arc::new(AfricasTalkingAdapter::new()))
        .menu(demo::menu().unwrap())
        .templates(demo::templates().unwrap())
        .build()
        .unwrap();
    Arc::new(engine)
}

fn app(engine: &Arc<Engine>) -> axum::Router {
    build_router(Arc::clone(engine), "/ussd")
}

fn form_body(session_id: &str, text: &str) -> String {
    url::form_urlencoded::Serializer::new(String::new())
        .append_pair("sessionId", session_id)
        .append_pair("serviceCode", "*384*1#")
        .append_pair("phoneNumber", PHONE)
        .append_pair("networkCode", "65001")
        .append_pair("text", text)
        .finish()
}

/// POST one callback and return the status and reply body.
async fn callback(app: &axum::Router, session_id: &str, text: &str) -> (StatusCode, String) {
    let request = Request::builder()
        .method(Method::POST)
        .uri("/ussd")
        .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
        .body(Body::from(form_body(session_id, text)))
        .unwrap();

    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let body = axum::body::to_bytes(response.into_body(), 64 * 1024)
        .await
        .unwrap();
    (status, String::from_utf8(body.to_vec()).unwrap())
}

async fn reply(app: &axum::Router, session_id: &str, text: &str) -> String {
    callback(app, session_id, text).await.1
}

// ─────────────────────────────────────────────────────────────────────────────
// Health
// ─────────────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_health_check() {
    let engine = demo_engine();
    let request = Request::builder()
        .uri("/health")
        .body(Body::empty())
        .unwrap();

    let response = app(&engine).oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = axum::body::to_bytes(response.into_body(), 1024).await.unwrap();
    let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(json["status"], "healthy");
    assert_eq!(json["service"], "ussd-router");
    assert_eq!(json["adapter"], "africastalking");
}

// ─────────────────────────────────────────────────────────────────────────────
// Menu navigation
// ─────────────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_first_contact_shows_welcome() {
    let engine = demo_engine();
    let app = app(&engine);

    let (status, body) = callback(&app, "ATUid_1", "").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, format!("CON Welcome {PHONE}\n1. My account\n#. Exit\n"));
    assert_eq!(engine.states().get("ATUid_1").as_deref(), Some("welcome"));
}

#[tokio::test]
async fn test_reply_is_plain_text() {
    let engine = demo_engine();
    let request = Request::builder()
        .method(Method::POST)
        .uri("/ussd")
        .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
        .body(Body::from(form_body("s", "")))
        .unwrap();

    let response = app(&engine).oneshot(request).await.unwrap();
    let content_type = response.headers().get(header::CONTENT_TYPE).unwrap();
    assert!(content_type.to_str().unwrap().starts_with("text/plain"));
}

#[tokio::test]
async fn test_get_callback_with_query_string() {
    let engine = demo_engine();
    let uri = format!("/ussd?{}", form_body("q1", ""));
    let request = Request::builder().uri(uri).body(Body::empty()).unwrap();

    let response = app(&engine).oneshot(request).await.unwrap();
    let body = axum::body::to_bytes(response.into_body(), 1024).await.unwrap();
    assert!(String::from_utf8_lossy(&body).starts_with("CON Welcome"));
}

#[tokio::test]
async fn test_navigate_to_balance_and_back() {
    let engine = demo_engine();
    let app = app(&engine);

    reply(&app, "s1", "").await;
    let account = reply(&app, "s1", "1").await;
    assert!(account.starts_with(&format!("CON Account {PHONE}\n1. Balance")));
    assert_eq!(engine.states().get("s1").as_deref(), Some("account"));

    let balance = reply(&app, "s1", "1*1").await;
    assert_eq!(balance, format!("CON Balance for {PHONE}: MWK 12,500.00\n#. Back\n"));
    assert_eq!(engine.states().get("s1").as_deref(), Some("balance"));

    let back = reply(&app, "s1", "1*1*#").await;
    assert_eq!(back, account);
    assert_eq!(engine.states().get("s1").as_deref(), Some("account"));

    let home = reply(&app, "s1", "1*1*#*#").await;
    assert!(home.starts_with("CON Welcome"));
    assert_eq!(engine.states().get("s1").as_deref(), Some("welcome"));
}

#[tokio::test]
async fn test_exit_ends_dialog() {
    let engine = demo_engine();
    let app = app(&engine);

    reply(&app, "s1", "").await;
    assert_eq!(
        reply(&app, "s1", "#").await,
        format!("END Thank you {PHONE}. Please come again!\n")
    );
}

#[test_case("9" ; "unknown code")]
#[test_case("2" ; "code only valid on another screen")]
#[tokio::test]
async fn test_invalid_option(text: &str) {
    let engine = demo_engine();
    let app = app(&engine);

    reply(&app, "s1", "").await;
    assert_eq!(reply(&app, "s1", text).await, "END Invalid option\n");
    assert_eq!(engine.states().get("s1").as_deref(), Some("welcome"));
}

#[tokio::test]
async fn test_unknown_session_is_closed() {
    let engine = demo_engine();
    let app = app(&engine);

    let (status, body) = callback(&app, "never-started", "1").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, "END Session closed\n");
}

#[tokio::test]
async fn test_missing_fields_are_closed() {
    let engine = demo_engine();
    let request = Request::builder()
        .method(Method::POST)
        .uri("/ussd")
        .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
        .body(Body::from("sessionId=s1"))
        .unwrap();

    let response = app(&engine).oneshot(request).await.unwrap();
    let body = axum::body::to_bytes(response.into_body(), 1024).await.unwrap();
    assert_eq!(&body[..], b"END Session closed\n");
}

#[tokio::test]
async fn test_oversized_callback_is_closed() {
    let engine = demo_engine();
    let app = app(&engine);
    reply(&app, "big", "").await;

    let body = format!("{}&pad={}", form_body("big", "1"), "x".repeat(20_000));
    assert!(body.len() > MAX_BODY_BYTES);
    let request = Request::builder()
        .method(Method::POST)
        .uri("/ussd")
        .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
        .header(header::CONTENT_LENGTH, body.len())
        .body(Body::from(body))
        .unwrap();

    let response = app.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let reply_body = axum::body::to_bytes(response.into_body(), 1024).await.unwrap();
    assert_eq!(&reply_body[..], b"END Session closed\n");
    assert_eq!(engine.states().get("big").as_deref(), Some("welcome"));
}

// ─────────────────────────────────────────────────────────────────────────────
// Free-form input
// ─────────────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_transfer_dialog() {
    let engine = demo_engine();
    let app = app(&engine);

    reply(&app, "t1", "").await;
    reply(&app, "t1", "1").await;

    assert_eq!(reply(&app, "t1", "1*3").await, "CON Enter recipient account number\n");
    assert_eq!(engine.states().get("t1").as_deref(), Some("account"));
    let session = engine.store().get("t1").unwrap();
    assert_eq!(session.mode(), InputMode::ExpectInput);

    assert_eq!(reply(&app, "t1", "1*3*0999123456").await, "CON Enter amount to transfer\n");
    assert_eq!(
        reply(&app, "t1", "1*3*0999123456*2500").await,
        "CON Send MWK 2500 to 0999123456?\n1. Confirm\n#. Cancel\n"
    );
    assert_eq!(
        reply(&app, "t1", "1*3*0999123456*2500*1").await,
        "END You transferred MWK 2500 to 0999123456.\n"
    );
    assert!(!session.contains("transferAccount"));
    assert_eq!(engine.states().get("t1").as_deref(), Some("account"));
}

#[tokio::test]
async fn test_transfer_cancelled() {
    let engine = demo_engine();
    let app = app(&engine);

    for text in ["", "1", "1*3", "1*3*0888", "1*3*0888*10"] {
        reply(&app, "t2", text).await;
    }
    assert_eq!(
        reply(&app, "t2", "1*3*0888*10*#").await,
        "END Transfer cancelled. Thank you. Come again\n"
    );
}

// ─────────────────────────────────────────────────────────────────────────────
// Fault handling
// ─────────────────────────────────────────────────────────────────────────────

fn custom_engine(root: MenuOption) -> Arc<Engine> {
    let engine = EngineBuilder::new(Arc::new(AfricasTalkingAdapter::new()))
        .menu([root])
        .build()
        .unwrap();
    Arc::new(engine)
}

fn home(request: &mut UssdRequest<'_>) -> bool {
    request.continue_with("1. Explode\n2. Nothing\n3. Missing template");
    false
}

fn faulty_engine() -> Arc<Engine> {
    custom_engine(
        MenuOption::new("", "home", home)
            .unwrap()
            .child(MenuOption::new("1", "explode", |_| panic!("core banking timeout")).unwrap())
            .child(MenuOption::new("2", "nothing", |_| true).unwrap())
            .child(
                MenuOption::new("3", "missing", |request| {
                    request.end_with_template("nope.tmpl", Default::default());
                    false
                })
                .unwrap(),
            ),
    )
}

#[tokio::test]
async fn test_panicking_handler_does_not_take_down_server() {
    let engine = faulty_engine();
    let app = app(&engine);

    reply(&app, "p1", "").await;
    let (status, body) = callback(&app, "p1", "1").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, "END Session terminated due to internal error\n");

    assert_eq!(reply(&app, "p2", "").await, "CON 1. Explode\n2. Nothing\n3. Missing template\n");
}

#[tokio::test]
async fn test_silent_handler_gets_fallback() {
    let engine = faulty_engine();
    let app = app(&engine);

    reply(&app, "n1", "").await;
    assert_eq!(reply(&app, "n1", "2").await, "END Unexpected end of session\n");
}

#[tokio::test]
async fn test_missing_template_is_internal_error() {
    let engine = faulty_engine();
    let app = app(&engine);

    reply(&app, "m1", "").await;
    assert_eq!(
        reply(&app, "m1", "3").await,
        "END Session terminated due to internal error\n"
    );
}

#[tokio::test]
async fn test_concurrent_sessions_are_independent() {
    let engine = demo_engine();
    let app = app(&engine);

    let mut tasks = Vec::new();
    for i in 0..16 {
        let app = app.clone();
        tasks.push(tokio::spawn(async move {
            let id = format!("c{i}");
            reply(&app, &id, "").await;
            reply(&app, &id, "1").await
        }));
    }
    for task in tasks {
        assert!(task.await.unwrap().starts_with("CON Account"));
    }
    assert_eq!(engine.store().len(), 16);
}

// ─────────────────────────────────────────────────────────────────────────────
// Eviction
// ─────────────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_expired_session_is_closed() {
    let engine = Arc::new(
        EngineBuilder::new(Arc::new(AfricasTalkingAdapter::new()))
            .menu(demo::menu().unwrap())
            .templates(demo::templates().unwrap())
            .session_times(Duration::from_millis(20), Duration::from_millis(30))
            .state_times(Duration::from_millis(20), Duration::from_millis(30))
            .build()
            .unwrap(),
    );
    let app = app(&engine);
    let mut sweepers = engine.start_sweepers();

    reply(&app, "e1", "").await;
    tokio::time::sleep(Duration::from_millis(200)).await;

    assert!(engine.states().get("e1").is_none());
    assert_eq!(reply(&app, "e1", "1").await, "END Session closed\n");

    sweepers.shutdown().await;
    assert!(!sweepers.is_running());
}
