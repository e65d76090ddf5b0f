mod common;

use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use common::{push_body, TestApp};
use validation_service::dtos::SessionResponse;
use validation_service::models::{HookRegistration, HookState, RepositoryHooks, ValidatorKind};
use wiremock::matchers::{body_partial_json, header as header_matcher, method, path};
use wiremock::{Mock, ResponseTemplate};

/// Log `alice` in against the mocked host and return the session cookie pair.
async fn login(app: &TestApp) -> String {
    Mock::given(method("GET"))
        .and(path("/api/v1/users/alice/tokens"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([])))
        .mount(&app.remote)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/v1/users/alice/tokens"))
        .respond_with(
            ResponseTemplate::new(201)
                .set_body_json(serde_json::json!({"name": "gin-valid", "sha1": "tok123"})),
        )
        .mount(&app.remote)
        .await;

    let request = Request::builder()
        .method("POST")
        .uri("/login")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(
            serde_json::json!({"username": "alice", "password": "secret"}).to_string(),
        ))
        .unwrap();
    let (status, headers, body) = app.send(request).await;
    assert_eq!(status, StatusCode::OK);

    let session: SessionResponse = serde_json::from_slice(&body).unwrap();
    assert_eq!(session.username, "alice");

    let set_cookie = headers[header::SET_COOKIE].to_str().unwrap();
    assert!(set_cookie.starts_with("gin-valid-session="));
    assert!(set_cookie.contains("HttpOnly"));
    set_cookie.split(';').next().unwrap().to_string()
}

fn with_cookie(method: &str, uri: &str, cookie: &str) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header(header::COOKIE, cookie)
        .body(Body::empty())
        .unwrap()
}

#[tokio::test]
async fn hook_routes_require_a_session() {
    let app = TestApp::spawn().await;

    let (status, _, _) = app.get("/repos/alice/ds001/hooks").await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _, _) = app.get("/repos").await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _, _) = app
        .send(with_cookie(
            "POST",
            "/repos/alice/ds001/bids/enable",
            "gin-valid-session=unknown",
        ))
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn login_with_rejected_password_is_unauthorized() {
    let app = TestApp::spawn().await;
    Mock::given(method("GET"))
        .and(path("/api/v1/users/alice/tokens"))
        .respond_with(ResponseTemplate::new(401))
        .mount(&app.remote)
        .await;

    let request = Request::builder()
        .method("POST")
        .uri("/login")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(
            serde_json::json!({"username": "alice", "password": "wrong"}).to_string(),
        ))
        .unwrap();
    let (status, headers, _) = app.send(request).await;

    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert!(headers.get(header::SET_COOKIE).is_none());
}

#[tokio::test]
async fn enable_binds_repository_and_disable_unbinds_it() {
    let app = TestApp::spawn().await;
    let cookie = login(&app).await;

    Mock::given(method("POST"))
        .and(path("/api/v1/repos/alice/ds001/hooks"))
        .and(header_matcher("Authorization", "token tok123"))
        .and(body_partial_json(serde_json::json!({
            "type": "gogs",
            "config": {
                "url": "http://validation.test/validate/bids/alice/ds001",
                "content_type": "json"
            },
            "events": ["push"],
            "active": true
        })))
        .respond_with(ResponseTemplate::new(201).set_body_json(serde_json::json!({
            "id": 7,
            "config": {
                "url": "http://validation.test/validate/bids/alice/ds001",
                "content_type": "json"
            },
            "events": ["push"],
            "active": true
        })))
        .expect(1)
        .mount(&app.remote)
        .await;

    let (status, _, body) = app
        .send(with_cookie("POST", "/repos/alice/ds001/bids/enable", &cookie))
        .await;
    assert_eq!(status, StatusCode::CREATED);
    let registration: HookRegistration = serde_json::from_slice(&body).unwrap();
    assert_eq!(registration.validator, ValidatorKind::Bids);
    assert_eq!(registration.hook_id, Some(7));
    assert_eq!(registration.state, HookState::Enabled);

    // A push is now accepted with the bound credential.
    let (status, _) = app
        .signed_push("/validate/bids/alice/ds001", &push_body("abc123"))
        .await;
    assert_eq!(status, StatusCode::OK);
    app.wait_for_terminal(ValidatorKind::Bids, "alice", "ds001", "abc123")
        .await;

    Mock::given(method("DELETE"))
        .and(path("/api/v1/repos/alice/ds001/hooks/7"))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&app.remote)
        .await;

    let (status, _, _) = app
        .send(with_cookie("POST", "/repos/alice/ds001/hooks/7/disable", &cookie))
        .await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (status, _) = app
        .signed_push("/validate/bids/alice/ds001", &push_body("def456"))
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn listing_reports_state_per_validator() {
    let app = TestApp::spawn().await;
    let cookie = login(&app).await;

    Mock::given(method("GET"))
        .and(path("/api/v1/repos/alice/ds001/hooks"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([
            {
                "id": 3,
                "config": {"url": "http://validation.test/validate/nix/alice/ds001", "content_type": "json"},
                "events": ["push"],
                "active": false
            },
            {
                "id": 4,
                "config": {"url": "http://validation.test/validate/bids/alice/ds001", "content_type": "json"},
                "events": ["push"],
                "active": true
            },
            {
                "id": 5,
                "config": {"url": "https://ci.example/build", "content_type": "json"},
                "events": ["push"],
                "active": true
            }
        ])))
        .mount(&app.remote)
        .await;

    let (status, _, body) = app
        .send(with_cookie("GET", "/repos/alice/ds001/hooks", &cookie))
        .await;

    assert_eq!(status, StatusCode::OK);
    let hooks: Vec<HookRegistration> = serde_json::from_slice(&body).unwrap();
    assert_eq!(hooks.len(), ValidatorKind::ALL.len());

    let state_of = |kind: ValidatorKind| hooks.iter().find(|h| h.validator == kind).unwrap();
    assert_eq!(state_of(ValidatorKind::Bids).state, HookState::Enabled);
    assert_eq!(state_of(ValidatorKind::Bids).hook_id, Some(4));
    assert_eq!(state_of(ValidatorKind::Nix).state, HookState::Disabled);
    assert_eq!(state_of(ValidatorKind::Odml).state, HookState::None);
}

#[tokio::test]
async fn repository_listing_carries_hook_states() {
    let app = TestApp::spawn().await;
    let cookie = login(&app).await;

    Mock::given(method("GET"))
        .and(path("/api/v1/user/repos"))
        .and(header_matcher("Authorization", "token tok123"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([
            {"id": 1, "full_name": "alice/ds001", "private": false},
            {"id": 2, "full_name": "alice/notes", "private": true}
        ])))
        .mount(&app.remote)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/v1/repos/alice/ds001/hooks"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([
            {
                "id": 9,
                "config": {"url": "http://validation.test/validate/odml/alice/ds001", "content_type": "json"},
                "events": ["push"],
                "active": true
            }
        ])))
        .mount(&app.remote)
        .await;
    // Hooks of the second repository are unreadable; it is still listed.
    Mock::given(method("GET"))
        .and(path("/api/v1/repos/alice/notes/hooks"))
        .respond_with(ResponseTemplate::new(403))
        .mount(&app.remote)
        .await;

    let (status, _, body) = app.send(with_cookie("GET", "/repos", &cookie)).await;

    assert_eq!(status, StatusCode::OK);
    let listing: Vec<RepositoryHooks> = serde_json::from_slice(&body).unwrap();
    assert_eq!(listing.len(), 2);

    let ds001 = &listing[0];
    assert_eq!(ds001.repository.to_string(), "alice/ds001");
    assert!(!ds001.private);
    let odml = ds001
        .hooks
        .iter()
        .find(|h| h.validator == ValidatorKind::Odml)
        .unwrap();
    assert_eq!(odml.state, HookState::Enabled);
    assert_eq!(odml.hook_id, Some(9));

    let notes = &listing[1];
    assert!(notes.private);
    assert!(notes.hooks.iter().all(|h| h.state == HookState::None));
}

#[tokio::test]
async fn logout_ends_the_session() {
    let app = TestApp::spawn().await;
    let cookie = login(&app).await;

    let (status, headers, _) = app.send(with_cookie("POST", "/logout", &cookie)).await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    assert!(headers.get(header::SET_COOKIE).is_some());

    let (status, _, _) = app
        .send(with_cookie("GET", "/repos/alice/ds001/hooks", &cookie))
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}
