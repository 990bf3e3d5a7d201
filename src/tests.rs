//! Integration tests for the candidate tracker backend.

use std::sync::Arc;
use std::time::Duration;

use reqwest::{Client, Method, RequestBuilder};
use serde_json::{json, Value};
use tempfile::TempDir;

use crate::auth::{Actor, USER_ID_HEADER};
use crate::config::{Backend, Config, LogFormat};
use crate::db::{init_database, RelationalStore};
use crate::models::Role;
use crate::search::SearchIndex;
use crate::store::InMemoryFileStore;
use crate::{build_state, create_router, AppState};

const ADMIN_PASSWORD: &str = "admin-password";

fn test_config(psk: Option<String>, temp_dir: &TempDir) -> Config {
    Config {
        api_psk: psk,
        db_path: temp_dir.path().join("test.sqlite"),
        index_path: temp_dir.path().join("index"),
        bind_addr: "127.0.0.1:0".parse().unwrap(),
        log_level: "warn".to_string(),
        log_format: LogFormat::Pretty,
        github: None,
        primary_backend: Backend::GitHub,
        fallback_enabled: true,
        audit_reader_role: Role::SuperAdmin,
        audit_retention: 1_000,
        cache_ttl: Duration::from_secs(300),
        poll_interval: Duration::from_secs(30),
        reminder_interval: Duration::from_secs(300),
        bootstrap_admin_password: None,
    }
}

/// Test fixture for integration tests.
struct TestFixture {
    client: Client,
    base_url: String,
    state: AppState,
    admin_id: String,
    _temp_dir: TempDir,
}

impl TestFixture {
    async fn new() -> Self {
        Self::with_psk(Some("test-api-key".to_string())).await
    }

    async fn with_psk(psk: Option<String>) -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let config = test_config(psk.clone(), &temp_dir);

        let pool = init_database(&config.db_path)
            .await
            .expect("Failed to init DB");
        let relational = Arc::new(RelationalStore::new(pool));
        let search =
            Arc::new(SearchIndex::open(&config.index_path).expect("Failed to init search"));
        let state = build_state(
            config,
            Arc::new(InMemoryFileStore::new()),
            relational,
            search,
        );

        state
            .users
            .ensure_bootstrap_admin(ADMIN_PASSWORD)
            .await
            .expect("Failed to bootstrap admin");
        let admin_id = state
            .users
            .list(&Actor::system())
            .await
            .unwrap()
            .into_iter()
            .find(|u| u.username == "admin")
            .expect("admin exists")
            .id;

        let app = create_router(state.clone());

        // Bind to random port
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("Failed to bind");
        let addr = listener.local_addr().expect("Failed to get addr");
        let base_url = format!("http://{}", addr);

        // Spawn server
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        // Wait for server to start
        tokio::time::sleep(tokio::time::Duration::from_millis(100)).await;

        let mut client_builder = Client::builder();
        if let Some(key) = psk {
            let mut headers = reqwest::header::HeaderMap::new();
            headers.insert("x-api-key", key.parse().unwrap());
            client_builder = client_builder.default_headers(headers);
        }

        TestFixture {
            client: client_builder.build().unwrap(),
            base_url,
            state,
            admin_id,
            _temp_dir: temp_dir,
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// A request on behalf of `user_id`.
    fn as_user(&self, method: Method, path: &str, user_id: &str) -> RequestBuilder {
        self.client
            .request(method, self.url(path))
            .header(USER_ID_HEADER, user_id)
    }

    fn as_admin(&self, method: Method, path: &str) -> RequestBuilder {
        self.as_user(method, path, &self.admin_id)
    }

    async fn create_user(&self, username: &str, role: &str) -> String {
        let resp = self
            .as_admin(Method::POST, "/api/users")
            .json(&json!({
                "username": username,
                "email": format!("{}@example.com", username),
                "fullName": username,
                "role": role,
                "password": "long-enough-password"
            }))
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), 201);
        let body: Value = resp.json().await.unwrap();
        body["data"]["id"].as_str().unwrap().to_string()
    }

    async fn create_candidate(&self, body: Value) -> Value {
        let resp = self
            .as_admin(Method::POST, "/api/candidates")
            .json(&body)
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), 201);
        let body: Value = resp.json().await.unwrap();
        body["data"].clone()
    }
}

#[tokio::test]
async fn test_health_check() {
    let fixture = TestFixture::new().await;

    let resp = fixture
        .client
        .get(fixture.url("/health"))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    assert_eq!(resp.text().await.unwrap(), "OK");
}

#[tokio::test]
async fn test_auth_missing_psk() {
    let fixture = TestFixture::with_psk(Some("secret-key".to_string())).await;

    // Request without API key
    let resp = Client::new()
        .get(fixture.url("/api/pipeline"))
        .send()
        .await
        .unwrap();

    assert_eq!(resp.status(), 401);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["success"], false);
    assert_eq!(body["error"]["code"], "UNAUTHORIZED");
}

#[tokio::test]
async fn test_auth_invalid_psk() {
    let fixture = TestFixture::with_psk(Some("correct-key".to_string())).await;

    let resp = Client::new()
        .get(fixture.url("/api/pipeline"))
        .header("x-api-key", "wrong-key")
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 401);

    let resp = Client::new()
        .get(fixture.url("/api/pipeline"))
        .bearer_auth("correct-key")
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
}

#[tokio::test]
async fn test_mutation_requires_known_user() {
    let fixture = TestFixture::new().await;

    let resp = fixture
        .client
        .post(fixture.url("/api/candidates"))
        .json(&json!({ "fullName": "Ana Ruiz" }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 401);

    let resp = fixture
        .as_user(Method::POST, "/api/candidates", "nobody")
        .json(&json!({ "fullName": "Ana Ruiz" }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 401);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["error"]["code"], "UNAUTHORIZED");
}

#[tokio::test]
async fn test_pipeline() {
    let fixture = TestFixture::new().await;

    let resp = fixture
        .client
        .get(fixture.url("/api/pipeline"))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);

    let body: Value = resp.json().await.unwrap();
    let stages = body["data"].as_array().unwrap();
    assert_eq!(stages.len(), 10);
    assert_eq!(stages[0]["status"], "received");
    assert_eq!(stages[6]["status"], "probation");
    assert_eq!(stages[6]["tracksStartDate"], true);
    assert_eq!(stages[9]["status"], "rejected");
}

#[tokio::test]
async fn test_candidate_crud() {
    let fixture = TestFixture::new().await;

    // Create candidate
    let created = fixture
        .create_candidate(json!({
            "fullName": "Ana Ruiz",
            "email": "ana@example.com",
            "position": "Backend Engineer"
        }))
        .await;
    let id = created["id"].as_str().unwrap().to_string();
    assert_eq!(created["status"], "received");
    assert_eq!(created["updatedBy"], "admin");
    assert_eq!(created["comments"], json!([]));

    // Get candidate
    let resp = fixture
        .client
        .get(fixture.url(&format!("/api/candidates/{}", id)))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["data"]["fullName"], "Ana Ruiz");

    // Update candidate
    let resp = fixture
        .as_admin(Method::PUT, &format!("/api/candidates/{}", id))
        .json(&json!({ "notes": "Strong Rust background", "location": "Madrid" }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["data"]["notes"], "Strong Rust background");
    assert_eq!(body["data"]["location"], "Madrid");
    assert_eq!(body["data"]["email"], "ana@example.com");

    // List with filter
    fixture
        .create_candidate(json!({ "fullName": "Jonas Berg", "position": "Designer" }))
        .await;
    let resp = fixture
        .client
        .get(fixture.url("/api/candidates?position=backend%20engineer"))
        .send()
        .await
        .unwrap();
    let body: Value = resp.json().await.unwrap();
    let listed = body["data"].as_array().unwrap();
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0]["id"], id.as_str());

    // Delete candidate
    let resp = fixture
        .as_admin(Method::DELETE, &format!("/api/candidates/{}", id))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);

    // Verify deleted
    let resp = fixture
        .client
        .get(fixture.url(&format!("/api/candidates/{}", id)))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 404);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["error"]["code"], "NOT_FOUND");
}

#[tokio::test]
async fn test_create_candidate_validation() {
    let fixture = TestFixture::new().await;

    let resp = fixture
        .as_admin(Method::POST, "/api/candidates")
        .json(&json!({ "fullName": "   " }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 400);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["error"]["code"], "VALIDATION_ERROR");
}

#[tokio::test]
async fn test_status_change_is_commented_and_audited() {
    let fixture = TestFixture::new().await;
    let candidate = fixture
        .create_candidate(json!({ "fullName": "Ana Ruiz" }))
        .await;
    let id = candidate["id"].as_str().unwrap();

    let resp = fixture
        .as_admin(Method::PUT, &format!("/api/candidates/{}/status", id))
        .json(&json!({
            "status": "probation",
            "startDate": "2024-04-17",
            "reason": "Passed both exams"
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);

    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["data"]["status"], "probation");
    assert_eq!(body["data"]["startDate"], "2024-04-17");
    let comments = body["data"]["comments"].as_array().unwrap();
    assert_eq!(comments.len(), 1);
    assert_eq!(comments[0]["type"], "status_change");
    assert_eq!(comments[0]["text"], "Passed both exams");

    let resp = fixture
        .as_admin(Method::GET, "/api/audit-logs?action=status_changed")
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    let body: Value = resp.json().await.unwrap();
    let entries = body["data"].as_array().unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0]["before"]["status"], "received");
    assert_eq!(entries[0]["after"]["status"], "probation");
    assert_eq!(entries[0]["actorName"], "admin");
}

#[tokio::test]
async fn test_comment_mentions() {
    let fixture = TestFixture::new().await;
    let jonas_id = fixture.create_user("jonas", "recruiter").await;
    let candidate = fixture
        .create_candidate(json!({ "fullName": "Ana Ruiz" }))
        .await;
    let id = candidate["id"].as_str().unwrap();

    let resp = fixture
        .as_admin(Method::POST, &format!("/api/candidates/{}/comments", id))
        .json(&json!({ "text": "@jonas can you call her? cc @admin" }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 201);
    let body: Value = resp.json().await.unwrap();
    let comment_id = body["data"]["id"].as_str().unwrap().to_string();
    assert_eq!(body["data"]["author"], "admin");

    // Edit the comment
    let resp = fixture
        .as_admin(
            Method::PUT,
            &format!("/api/candidates/{}/comments/{}", id, comment_id),
        )
        .json(&json!({ "text": "@jonas can you call her today?" }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    let body: Value = resp.json().await.unwrap();
    assert!(body["data"]["editedAt"].is_string());

    // The author does not mention themselves
    let resp = fixture
        .as_admin(Method::GET, "/api/mentions")
        .send()
        .await
        .unwrap();
    let body: Value = resp.json().await.unwrap();
    assert!(body["data"].as_array().unwrap().is_empty());

    let resp = fixture
        .as_user(Method::GET, "/api/mentions?unreadOnly=true", &jonas_id)
        .send()
        .await
        .unwrap();
    let body: Value = resp.json().await.unwrap();
    let mentions = body["data"].as_array().unwrap();
    assert_eq!(mentions.len(), 1);
    assert_eq!(mentions[0]["commentId"], comment_id.as_str());
    assert_eq!(mentions[0]["mentionedBy"], "admin");
    let mention_id = mentions[0]["id"].as_str().unwrap().to_string();

    // Only the mentioned user may mark it read
    let resp = fixture
        .as_admin(Method::PUT, &format!("/api/mentions/{}/read", mention_id))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 403);

    let resp = fixture
        .as_user(
            Method::PUT,
            &format!("/api/mentions/{}/read", mention_id),
            &jonas_id,
        )
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["data"]["read"], true);

    // Delete the comment
    let resp = fixture
        .as_admin(
            Method::DELETE,
            &format!("/api/candidates/{}/comments/{}", id, comment_id),
        )
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    let candidate = fixture.state.candidates.get(id).await.unwrap();
    assert!(candidate.comments.is_empty());
}

#[tokio::test]
async fn test_reminders_and_due_alerts() {
    let fixture = TestFixture::new().await;
    let candidate = fixture
        .create_candidate(json!({ "fullName": "Ana Ruiz" }))
        .await;
    let id = candidate["id"].as_str().unwrap();

    let resp = fixture
        .as_admin(Method::POST, &format!("/api/candidates/{}/reminders", id))
        .json(&json!({
            "title": "Send contract",
            "dueDate": "2024-01-15",
            "priority": "high"
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 201);
    let body: Value = resp.json().await.unwrap();
    let reminder_id = body["data"]["id"].as_str().unwrap().to_string();
    assert_eq!(body["data"]["completed"], false);

    let resp = fixture
        .client
        .get(fixture.url("/api/reminders/due"))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    let body: Value = resp.json().await.unwrap();
    let due = body["data"].as_array().unwrap();
    assert_eq!(due.len(), 1);
    assert_eq!(due[0]["candidateId"], id);
    assert_eq!(due[0]["candidateName"], "Ana Ruiz");
    assert_eq!(due[0]["title"], "Send contract");

    // Completed reminders are no longer due
    let resp = fixture
        .as_admin(
            Method::PUT,
            &format!("/api/candidates/{}/reminders/{}", id, reminder_id),
        )
        .json(&json!({ "completed": true }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);

    let resp = fixture
        .client
        .get(fixture.url("/api/reminders/due"))
        .send()
        .await
        .unwrap();
    let body: Value = resp.json().await.unwrap();
    assert!(body["data"].as_array().unwrap().is_empty());

    let resp = fixture
        .client
        .get(fixture.url("/api/reminders"))
        .send()
        .await
        .unwrap();
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["data"].as_array().unwrap().len(), 1);

    let resp = fixture
        .as_admin(
            Method::DELETE,
            &format!("/api/candidates/{}/reminders/{}", id, reminder_id),
        )
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
}

#[tokio::test]
async fn test_audit_log_is_gated_by_role() {
    let fixture = TestFixture::new().await;
    let recruiter_id = fixture.create_user("maria", "recruiter").await;
    let admin_id = fixture.create_user("boss", "admin").await;

    for user_id in [&recruiter_id, &admin_id] {
        let resp = fixture
            .as_user(Method::GET, "/api/audit-logs", user_id)
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), 403);
        let body: Value = resp.json().await.unwrap();
        assert_eq!(body["error"]["code"], "ACCESS_DENIED");
    }

    let resp = fixture
        .as_admin(Method::GET, "/api/audit-logs?action=user_created")
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    let body: Value = resp.json().await.unwrap();
    // Bootstrap admin plus the two created here.
    assert_eq!(body["data"].as_array().unwrap().len(), 3);
}

#[tokio::test]
async fn test_user_administration() {
    let fixture = TestFixture::new().await;
    let recruiter_id = fixture.create_user("maria", "recruiter").await;

    // Recruiters may not manage users
    let resp = fixture
        .as_user(Method::POST, "/api/users", &recruiter_id)
        .json(&json!({
            "username": "sneaky",
            "role": "admin",
            "password": "long-enough-password"
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 403);

    // Duplicate username
    let resp = fixture
        .as_admin(Method::POST, "/api/users")
        .json(&json!({
            "username": "MARIA",
            "role": "viewer",
            "password": "long-enough-password"
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 400);

    // Only user managers see the roster
    let resp = fixture
        .as_user(Method::GET, "/api/users", &recruiter_id)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 403);

    // Admins cannot change the super admin account
    let lead_id = fixture.create_user("lead", "admin").await;
    let resp = fixture
        .as_user(Method::PUT, &format!("/api/users/{}", fixture.admin_id), &lead_id)
        .json(&json!({ "password": "taken-over-password", "role": "viewer" }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 403);
    let resp = fixture
        .as_user(Method::DELETE, &format!("/api/users/{}", fixture.admin_id), &lead_id)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 403);

    // Profiles never carry the hash
    let resp = fixture
        .as_admin(Method::GET, &format!("/api/users/{}", recruiter_id))
        .send()
        .await
        .unwrap();
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["data"]["username"], "maria");
    assert!(body["data"].get("passwordHash").is_none());

    // Deactivate, after which the user can no longer act
    let resp = fixture
        .as_admin(Method::PUT, &format!("/api/users/{}", recruiter_id))
        .json(&json!({ "active": false }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);

    let resp = fixture
        .as_user(Method::GET, "/api/users", &recruiter_id)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 401);

    let resp = fixture
        .as_admin(Method::DELETE, &format!("/api/users/{}", recruiter_id))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);

    let resp = fixture
        .as_admin(Method::GET, "/api/users")
        .send()
        .await
        .unwrap();
    let body: Value = resp.json().await.unwrap();
    // The bootstrap admin and the team lead remain.
    assert_eq!(body["data"].as_array().unwrap().len(), 2);
}

#[tokio::test]
async fn test_login() {
    let fixture = TestFixture::new().await;

    let resp = fixture
        .client
        .post(fixture.url("/api/auth/login"))
        .json(&json!({ "login": "admin", "password": ADMIN_PASSWORD }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["data"]["id"], fixture.admin_id.as_str());
    assert_eq!(body["data"]["role"], "super_admin");
    assert!(body["data"]["lastLogin"].is_string());
    assert!(body["data"].get("passwordHash").is_none());

    let resp = fixture
        .client
        .post(fixture.url("/api/auth/login"))
        .json(&json!({ "login": "admin", "password": "wrong-password" }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 401);

    let resp = fixture
        .as_admin(Method::GET, "/api/audit-logs?action=login_failed")
        .send()
        .await
        .unwrap();
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["data"].as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn test_search_candidates() {
    let fixture = TestFixture::new().await;
    let ana = fixture
        .create_candidate(json!({
            "fullName": "Ana Ruiz",
            "position": "Backend Engineer",
            "notes": "Knows tokio well"
        }))
        .await;
    fixture
        .create_candidate(json!({ "fullName": "Jonas Berg", "position": "Designer" }))
        .await;

    let resp = fixture
        .client
        .get(fixture.url("/api/search?q=tokio"))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["data"]["total"], 1);
    assert_eq!(body["data"]["results"][0]["candidate"]["id"], ana["id"]);

    // Total counts every match, not just the returned page
    let resp = fixture
        .client
        .get(fixture.url("/api/search?q=ana%20jonas&limit=1"))
        .send()
        .await
        .unwrap();
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["data"]["results"].as_array().unwrap().len(), 1);
    assert_eq!(body["data"]["total"], 2);
    assert_eq!(body["data"]["limit"], 1);

    let resp = fixture
        .client
        .get(fixture.url("/api/search?q=nobody"))
        .send()
        .await
        .unwrap();
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["data"]["total"], 0);
}

#[tokio::test]
async fn test_export_is_audited() {
    let fixture = TestFixture::new().await;
    fixture
        .create_candidate(json!({ "fullName": "Ana Ruiz" }))
        .await;
    fixture
        .create_candidate(json!({ "fullName": "Jonas Berg" }))
        .await;

    let resp = fixture
        .as_admin(Method::GET, "/api/export")
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["data"].as_array().unwrap().len(), 2);

    let resp = fixture
        .as_admin(Method::GET, "/api/audit-logs?action=data_exported")
        .send()
        .await
        .unwrap();
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["data"].as_array().unwrap().len(), 1);
}
