//! Integration tests for the session pipeline against a mock backend

use serde_json::json;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use veridia_client::store::{ACCESS_TOKEN_KEY, REFRESH_TOKEN_KEY, USER_KEY};
use veridia_client::{
    ApiClient, ApiRequest, ApplicationStatus, ApplicationSubmission, ClientError, Credentials,
    FileBackend, FileUpload, FormPart, KeyValueBackend, KeyValueSessionStore, MemoryBackend,
    Navigator, RetryContext, Route, SessionStore, StatusUpdate, TokenPair, UserType,
};
use wiremock::matchers::{body_json, body_string_contains, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

type Store = KeyValueSessionStore<MemoryBackend>;

#[derive(Default)]
struct RecordingNavigator {
    routes: Mutex<Vec<Route>>,
}

impl RecordingNavigator {
    fn routes(&self) -> Vec<Route> {
        self.routes.lock().unwrap().clone()
    }
}

impl Navigator for RecordingNavigator {
    fn navigate(&self, route: Route) {
        self.routes.lock().unwrap().push(route);
    }
}

struct Harness {
    client: ApiClient,
    store: Arc<Store>,
    navigator: Arc<RecordingNavigator>,
}

fn harness(server: &MockServer) -> Harness {
    let store = Arc::new(KeyValueSessionStore::new(MemoryBackend::new()));
    let navigator = Arc::new(RecordingNavigator::default());
    let client = ApiClient::builder()
        .base_url(server.uri())
        .store(store.clone())
        .navigator(navigator.clone())
        .build()
        .unwrap();

    Harness {
        client,
        store,
        navigator,
    }
}

fn harness_with_session(server: &MockServer, access: &str, refresh: &str) -> Harness {
    let harness = harness(server);
    let user = serde_json::from_value(json!({
        "id": 7,
        "email": "e@x.com",
        "first_name": "Eve",
        "last_name": "Example",
        "user_type": "applicant"
    }))
    .unwrap();
    harness
        .store
        .save(&TokenPair::new(access, refresh), &user)
        .unwrap();
    harness
}

fn stored_tokens(store: &Store) -> Option<TokenPair> {
    store.read().map(|session| session.tokens)
}

#[tokio::test]
async fn test_stored_token_is_sent_as_bearer() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/profile/"))
        .and(header("authorization", "Bearer A1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "success": true,
            "data": {"id": 7, "email": "e@x.com"}
        })))
        .expect(1)
        .mount(&server)
        .await;

    let h = harness_with_session(&server, "A1", "R1");
    let envelope = h.client.profile().await.unwrap();
    assert!(envelope.success);
}

#[tokio::test]
async fn test_no_token_means_no_authorization_header() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/departments/"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "success": true,
            "data": [{"id": 1, "name": "Engineering"}]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let h = harness(&server);
    h.client.departments().await.unwrap();

    let requests = server.received_requests().await.unwrap();
    assert_eq!(requests.len(), 1);
    assert!(requests[0].headers.get("authorization").is_none());
}

#[tokio::test]
async fn test_expired_token_is_refreshed_and_request_replayed() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/applicant/applications/"))
        .and(header("authorization", "Bearer A1"))
        .respond_with(ResponseTemplate::new(401).set_body_json(json!({
            "detail": "Given token not valid for any token type"
        })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/applicant/applications/"))
        .and(header("authorization", "Bearer A2"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "success": true,
            "results": [{"id": 1, "status": "under-review"}]
        })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/auth/token/refresh/"))
        .and(body_json(json!({"refresh_token": "R1"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "success": true,
            "access_token": "A2"
        })))
        .expect(1)
        .mount(&server)
        .await;

    let h = harness_with_session(&server, "A1", "R1");
    let envelope = h
        .client
        .applicant_applications(&Default::default())
        .await
        .unwrap();

    assert!(envelope.success);
    assert_eq!(envelope.payload().unwrap()[0]["id"], 1);
    assert_eq!(stored_tokens(&h.store), Some(TokenPair::new("A2", "R1")));
    assert!(h.navigator.routes().is_empty());
}

#[tokio::test]
async fn test_retried_request_is_not_refreshed_again() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/admin/analytics/"))
        .respond_with(ResponseTemplate::new(401))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/auth/token/refresh/"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"access_token": "A2"})))
        .expect(0)
        .mount(&server)
        .await;

    let h = harness_with_session(&server, "A1", "R1");
    let response = h
        .client
        .send_with_context(
            &ApiRequest::get("/admin/analytics/"),
            RetryContext::already_retried(),
        )
        .await
        .unwrap();

    assert_eq!(response.status().as_u16(), 401);
    assert_eq!(stored_tokens(&h.store), Some(TokenPair::new("A1", "R1")));
}

#[tokio::test]
async fn test_replay_rejected_again_propagates_401() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/admin/analytics/"))
        .respond_with(ResponseTemplate::new(401).set_body_string("still no"))
        .expect(2)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/auth/token/refresh/"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"access_token": "A2"})))
        .expect(1)
        .mount(&server)
        .await;

    let h = harness_with_session(&server, "A1", "R1");
    let result = h.client.analytics().await;

    assert!(matches!(result, Err(ClientError::AuthenticationFailed(_))));
    // The refreshed token stays; only a failed refresh ends the session
    assert_eq!(stored_tokens(&h.store), Some(TokenPair::new("A2", "R1")));
}

#[tokio::test]
async fn test_failed_refresh_clears_session_and_redirects() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/admin/dashboard/stats/"))
        .respond_with(ResponseTemplate::new(401))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/auth/token/refresh/"))
        .respond_with(ResponseTemplate::new(401).set_body_json(json!({
            "success": false,
            "error": {"code": "INVALID_TOKEN", "message": "Invalid or expired refresh token"}
        })))
        .expect(1)
        .mount(&server)
        .await;

    let h = harness_with_session(&server, "A1", "R1");
    let result = h.client.admin_dashboard_stats().await;

    assert!(matches!(result, Err(ClientError::SessionExpired(_))));
    for key in [ACCESS_TOKEN_KEY, REFRESH_TOKEN_KEY, USER_KEY] {
        assert!(h.store.backend().get(key).is_none(), "{key} should be cleared");
    }
    assert_eq!(h.navigator.routes(), vec![Route::Login]);
    assert!(!h.client.session().is_authenticated());
}

#[tokio::test]
async fn test_refresh_response_without_token_is_a_failure() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/positions/"))
        .respond_with(ResponseTemplate::new(401))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/auth/token/refresh/"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"success": true})))
        .expect(1)
        .mount(&server)
        .await;

    let h = harness_with_session(&server, "A1", "R1");
    let result = h.client.positions().await;

    assert!(matches!(result, Err(ClientError::SessionExpired(_))));
    assert!(h.store.backend().is_empty());
    assert_eq!(h.navigator.routes(), vec![Route::Login]);
}

#[tokio::test]
async fn test_anonymous_401_passes_through() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/profile/"))
        .respond_with(ResponseTemplate::new(401))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/auth/token/refresh/"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let h = harness(&server);
    let result = h.client.profile().await;

    assert!(matches!(result, Err(ClientError::AuthenticationFailed(_))));
    assert!(h.navigator.routes().is_empty());
}

#[tokio::test]
async fn test_concurrent_401s_share_one_refresh() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/admin/activity/"))
        .and(header("authorization", "Bearer A1"))
        .respond_with(ResponseTemplate::new(401))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/admin/activity/"))
        .and(header("authorization", "Bearer A2"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "success": true,
            "data": []
        })))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/auth/token/refresh/"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({"access_token": "A2"}))
                .set_delay(Duration::from_millis(200)),
        )
        .expect(1)
        .mount(&server)
        .await;

    let h = harness_with_session(&server, "A1", "R1");
    let (first, second, third) = futures::join!(
        h.client.recent_activity(Some(5)),
        h.client.recent_activity(Some(10)),
        h.client.recent_activity(None),
    );

    assert!(first.unwrap().success);
    assert!(second.unwrap().success);
    assert!(third.unwrap().success);
    assert_eq!(stored_tokens(&h.store), Some(TokenPair::new("A2", "R1")));
}

#[tokio::test]
async fn test_bad_login_returns_envelope_and_keeps_store_empty() {
    let server = MockServer::start().await;
    let rejection = json!({
        "success": false,
        "error": {"message": "Invalid credentials"}
    });
    Mock::given(method("POST"))
        .and(path("/auth/login/"))
        .and(body_json(json!({"email": "e@x.com", "password": "bad"})))
        .respond_with(ResponseTemplate::new(401).set_body_json(&rejection))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/auth/token/refresh/"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let h = harness(&server);
    let envelope = h
        .client
        .login(&Credentials::new("e@x.com", "bad"))
        .await
        .unwrap();

    assert!(!envelope.success);
    assert_eq!(envelope.error_message(), Some("Invalid credentials"));
    assert_eq!(serde_json::to_value(&envelope).unwrap(), rejection);
    assert!(h.store.backend().is_empty());
}

#[tokio::test]
async fn test_login_persists_session() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/auth/login/"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "success": true,
            "message": "Login successful",
            "data": {
                "access_token": "A1",
                "refresh_token": "R1",
                "user": {
                    "id": 1,
                    "email": "admin@x.com",
                    "first_name": "Ada",
                    "last_name": "Admin",
                    "user_type": "admin",
                    "permissions": ["view_applications"]
                }
            }
        })))
        .mount(&server)
        .await;

    let h = harness(&server);
    let envelope = h
        .client
        .login(&Credentials::new("admin@x.com", "secret123"))
        .await
        .unwrap();
    assert!(envelope.success);

    let state = h.client.session();
    assert_eq!(state.role(), Some(UserType::Admin));
    assert_eq!(state.entry_route(), Route::AdminDashboard);
    let user = state.user().unwrap();
    assert_eq!(user.full_name(), "Ada Admin");
    assert_eq!(user.extra["permissions"][0], "view_applications");
    assert_eq!(stored_tokens(&h.store), Some(TokenPair::new("A1", "R1")));
}

#[tokio::test]
async fn test_logout_clears_session_even_when_backend_fails() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/auth/logout/"))
        .and(header("authorization", "Bearer A1"))
        .and(body_json(json!({"refresh_token": "R1"})))
        .respond_with(ResponseTemplate::new(500))
        .expect(1)
        .mount(&server)
        .await;

    let h = harness_with_session(&server, "A1", "R1");
    h.client.logout().await;

    assert!(h.store.backend().is_empty());
    assert!(!h.client.session().is_authenticated());
}

#[tokio::test]
async fn test_profile_fetch_updates_cached_user() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/profile/"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "success": true,
            "data": {
                "id": 7,
                "email": "e@x.com",
                "first_name": "Evelyn",
                "last_name": "Example",
                "phone": "+15550100"
            }
        })))
        .mount(&server)
        .await;

    let h = harness_with_session(&server, "A1", "R1");
    h.client.profile().await.unwrap();

    let user = h.store.read().unwrap().user;
    assert_eq!(user.first_name, "Evelyn");
    assert_eq!(user.user_type, UserType::Applicant);
    assert_eq!(user.extra["phone"], "+15550100");
}

#[tokio::test]
async fn test_domain_error_is_propagated_with_envelope() {
    let server = MockServer::start().await;
    Mock::given(method("PATCH"))
        .and(path("/admin/applications/42/status/"))
        .and(body_json(json!({"status": "interview-scheduled", "comment": "Round 1"})))
        .respond_with(ResponseTemplate::new(400).set_body_json(json!({
            "success": false,
            "error": {
                "code": "VALIDATION_ERROR",
                "message": "Interview date is required",
                "details": {"interview_date": ["This field is required."]}
            }
        })))
        .expect(1)
        .mount(&server)
        .await;

    let h = harness_with_session(&server, "A1", "R1");
    let mut update = StatusUpdate::new(ApplicationStatus::InterviewScheduled);
    update.comment = Some("Round 1".into());
    let err = h
        .client
        .update_application_status(42, &update)
        .await
        .unwrap_err();

    assert!(matches!(err, ClientError::BadRequest(_)));
    assert_eq!(err.user_message(), "Interview date is required");
    let envelope = err.error_envelope().unwrap();
    assert_eq!(
        envelope.error.unwrap().details.unwrap()["interview_date"][0],
        "This field is required."
    );
}

#[tokio::test]
async fn test_multipart_submission_is_replayed_after_refresh() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/applicant/applications/"))
        .and(header("authorization", "Bearer A1"))
        .respond_with(ResponseTemplate::new(401))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/applicant/applications/"))
        .and(header("authorization", "Bearer A2"))
        .and(body_string_contains("filename=\"cv.pdf\""))
        .and(body_string_contains("Backend Engineer"))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({
            "success": true,
            "data": {"id": 99, "status": "under-review"}
        })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/auth/token/refresh/"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"access_token": "A2"})))
        .expect(1)
        .mount(&server)
        .await;

    let h = harness_with_session(&server, "A1", "R1");
    let submission = ApplicationSubmission {
        position: "Backend Engineer".into(),
        department: "Engineering".into(),
        fields: [("experience".to_string(), "3-5".to_string())].into(),
        resume: FileUpload {
            file_name: "cv.pdf".into(),
            content_type: Some("application/pdf".into()),
            bytes: b"%PDF-1.4".to_vec(),
        },
    };

    let envelope = h.client.submit_application(&submission).await.unwrap();
    assert_eq!(envelope.payload().unwrap()["id"], 99);
}

#[tokio::test]
async fn test_withdraw_with_no_content_is_success() {
    let server = MockServer::start().await;
    Mock::given(method("DELETE"))
        .and(path("/applicant/applications/5/"))
        .and(header("authorization", "Bearer A1"))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("DELETE"))
        .and(path("/admin/applications/6/"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    let h = harness_with_session(&server, "A1", "R1");

    let envelope = h.client.withdraw_application(5).await.unwrap();
    assert!(envelope.success);
    assert!(envelope.payload().is_none());

    let envelope = h.client.delete_application(6).await.unwrap();
    assert!(envelope.success);
}

#[tokio::test]
async fn test_login_fails_when_session_cannot_be_stored() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/auth/login/"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "success": true,
            "data": {
                "access_token": "A1",
                "refresh_token": "R1",
                "user": {"id": 7, "email": "e@x.com", "user_type": "applicant"}
            }
        })))
        .mount(&server)
        .await;

    let dir = tempfile::TempDir::new().unwrap();
    let occupied = dir.path().join("state");
    std::fs::write(&occupied, "").unwrap();
    let store = Arc::new(KeyValueSessionStore::new(FileBackend::in_dir(&occupied)));
    let client = ApiClient::builder()
        .base_url(server.uri())
        .store(store.clone())
        .build()
        .unwrap();

    let result = client.login(&Credentials::new("e@x.com", "secret123")).await;

    assert!(matches!(result, Err(ClientError::Storage(_))));
    assert!(store.read().is_none());
}

#[tokio::test]
async fn test_admin_application_update_sends_json_patch() {
    let server = MockServer::start().await;
    Mock::given(method("PATCH"))
        .and(path("/admin/applications/12/"))
        .and(header("authorization", "Bearer A1"))
        .and(body_json(json!({"notes": "Strong portfolio"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "success": true,
            "data": {"id": 12, "notes": "Strong portfolio"}
        })))
        .expect(1)
        .mount(&server)
        .await;

    let h = harness_with_session(&server, "A1", "R1");
    let envelope = h
        .client
        .update_application(12, &json!({"notes": "Strong portfolio"}))
        .await
        .unwrap();

    assert_eq!(envelope.payload().unwrap()["notes"], "Strong portfolio");
}

#[tokio::test]
async fn test_profile_update_sends_json_patch() {
    let server = MockServer::start().await;
    Mock::given(method("PATCH"))
        .and(path("/profile/"))
        .and(header("authorization", "Bearer A1"))
        .and(body_json(json!({"phone": "+15550100"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "success": true,
            "data": {"phone": "+15550100"}
        })))
        .expect(1)
        .mount(&server)
        .await;

    let h = harness_with_session(&server, "A1", "R1");
    let envelope = h
        .client
        .update_profile(&json!({"phone": "+15550100"}))
        .await
        .unwrap();

    assert!(envelope.success);
}

#[tokio::test]
async fn test_profile_picture_update_sends_multipart_patch() {
    let server = MockServer::start().await;
    Mock::given(method("PATCH"))
        .and(path("/profile/"))
        .and(header("authorization", "Bearer A1"))
        .and(body_string_contains("name=\"first_name\""))
        .and(body_string_contains("filename=\"me.png\""))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"success": true})))
        .expect(1)
        .mount(&server)
        .await;

    let h = harness_with_session(&server, "A1", "R1");
    let parts = vec![
        FormPart::text("first_name", "Eve"),
        FormPart::file(
            "profile_picture",
            FileUpload {
                file_name: "me.png".into(),
                content_type: Some("image/png".into()),
                bytes: b"PNG-DATA".to_vec(),
            },
        ),
    ];

    let envelope = h.client.update_profile_multipart(parts).await.unwrap();
    assert!(envelope.success);

    let requests = server.received_requests().await.unwrap();
    let content_type = requests[0].headers.get("content-type").unwrap();
    assert!(
        content_type
            .to_str()
            .unwrap()
            .starts_with("multipart/form-data")
    );
}
