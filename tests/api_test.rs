use axum::{
    body::Body,
    http::{header, Method, Request, StatusCode},
    Router,
};
use http_body_util::BodyExt;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::Arc;
use tempfile::TempDir;
use tower::ServiceExt;

use quodo::core::config::BootstrapAdmin;
use quodo::core::shared::utils::{create_conn, run_migrations};
use quodo::directory::check_and_bootstrap_admin;
use quodo::security::jwt::JwtManager;
use quodo::security::password::{Argon2Config, PasswordConfig, PasswordService};
use quodo::{build_router, AppConfig, AppState};

const ROOT_PASSWORD: &str = "firstrun2024";
const USER_PASSWORD: &str = "office2024x";

struct TestApp {
    router: Router,
    _dir: TempDir,
}

impl TestApp {
    fn new() -> Self {
        let dir = tempfile::tempdir().expect("temp dir");
        let mut config = AppConfig::from_map(&HashMap::new()).expect("config");
        config.database.url = dir.path().join("api.db").to_string_lossy().into_owned();
        config.database.min_connections = 1;
        config.database.max_connections = 4;

        let pool = create_conn(&config.database).expect("pool");
        run_migrations(&pool).expect("migrations");

        let passwords =
            PasswordService::new(Argon2Config::low_memory(), PasswordConfig::default()).expect("passwords");
        let root = BootstrapAdmin {
            username: "root".into(),
            email: "root@quodo.example".into(),
            password: ROOT_PASSWORD.into(),
        };
        check_and_bootstrap_admin(&pool, Some(&root), &passwords)
            .expect("bootstrap")
            .expect("root account");

        let jwt = JwtManager::from_settings(&config.jwt).expect("jwt");
        let state = Arc::new(AppState::with_services(config, pool, jwt, passwords));
        Self {
            router: build_router(state),
            _dir: dir,
        }
    }

    async fn call(&self, method: Method, uri: &str, token: Option<&str>, body: Option<Value>) -> (StatusCode, Value) {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
        }
        let request = match body {
            Some(body) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string())),
            None => builder.body(Body::empty()),
        }
        .expect("request");

        let response = self.router.clone().oneshot(request).await.expect("response");
        let status = response.status();
        let bytes = response.into_body().collect().await.expect("body").to_bytes();
        let value = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap_or_else(|_| Value::String(String::from_utf8_lossy(&bytes).into_owned()))
        };
        (status, value)
    }

    async fn login(&self, login: &str, password: &str) -> String {
        let (status, body) = self
            .call(
                Method::POST,
                "/api/auth/login",
                None,
                Some(json!({ "login": login, "password": password })),
            )
            .await;
        assert_eq!(status, StatusCode::OK, "login {login}: {body}");
        body["access_token"].as_str().expect("access token").to_string()
    }

    /// Creates an account as `token` and returns `(user id, access token)`.
    async fn create_user(&self, token: &str, username: &str, role: &str, office: &str) -> (String, String) {
        let (status, body) = self
            .call(
                Method::POST,
                "/api/users",
                Some(token),
                Some(json!({
                    "username": username,
                    "email": format!("{username}@quodo.example"),
                    "password": USER_PASSWORD,
                    "full_name": username,
                    "role": role,
                    "office": office,
                })),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED, "create {username}: {body}");
        let id = body["id"].as_str().expect("id").to_string();
        (id, self.login(username, USER_PASSWORD).await)
    }
}

#[tokio::test]
async fn test_health_is_public() {
    let app = TestApp::new();
    let (status, body) = app.call(Method::GET, "/health", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["database"], true);
}

#[tokio::test]
async fn test_requests_without_token_are_rejected() {
    let app = TestApp::new();
    let (status, _) = app.call(Method::GET, "/api/tasks", None, None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _) = app.call(Method::GET, "/api/tasks", Some("not-a-jwt"), None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_login_failures_share_one_message() {
    let app = TestApp::new();
    let (wrong_status, wrong) = app
        .call(
            Method::POST,
            "/api/auth/login",
            None,
            Some(json!({ "login": "root", "password": "nope12345" })),
        )
        .await;
    let (unknown_status, unknown) = app
        .call(
            Method::POST,
            "/api/auth/login",
            None,
            Some(json!({ "login": "ghost", "password": "nope12345" })),
        )
        .await;
    assert_eq!(wrong_status, StatusCode::UNAUTHORIZED);
    assert_eq!(unknown_status, StatusCode::UNAUTHORIZED);
    assert_eq!(wrong["message"], unknown["message"]);
}

#[tokio::test]
async fn test_logout_revokes_access_token() {
    let app = TestApp::new();
    let token = app.login("root", ROOT_PASSWORD).await;

    let (status, me) = app.call(Method::GET, "/api/auth/me", Some(&token), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(me["role"], "SystemAdmin");
    assert!(me.get("password_hash").is_none());

    let (status, _) = app.call(Method::POST, "/api/auth/logout", Some(&token), None).await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (status, _) = app.call(Method::GET, "/api/auth/me", Some(&token), None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_agents_only_see_their_own_tasks() {
    let app = TestApp::new();
    let root = app.login("root", ROOT_PASSWORD).await;
    let (ada_id, ada) = app.create_user(&root, "ada", "Agent", "Lagos").await;
    let (_, bola) = app.create_user(&root, "bola", "Agent", "Lagos").await;
    let (_, sade) = app.create_user(&root, "sade", "Supervisor", "Lagos").await;

    let (status, ada_task) = app
        .call(
            Method::POST,
            "/api/tasks",
            Some(&ada),
            Some(json!({ "task_date": "2024-06-03", "description": "Filed VAT return", "duration_minutes": 45 })),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED, "{ada_task}");
    assert_eq!(ada_task["office"], "Lagos");

    let (status, bola_task) = app
        .call(
            Method::POST,
            "/api/tasks",
            Some(&bola),
            Some(json!({ "task_date": "2024-06-03", "description": "Payroll run" })),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);

    let (status, listed) = app.call(Method::GET, "/api/tasks", Some(&ada), None).await;
    assert_eq!(status, StatusCode::OK);
    let listed = listed.as_array().expect("array");
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0]["user_id"], ada_id.as_str());

    let uri = format!("/api/tasks/{}", bola_task["id"].as_str().expect("id"));
    let (status, _) = app.call(Method::GET, &uri, Some(&ada), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, listed) = app.call(Method::GET, "/api/tasks", Some(&sade), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(listed.as_array().expect("array").len(), 2);

    // Agents cannot hand tasks to colleagues
    let (status, _) = app
        .call(
            Method::PUT,
            &format!("/api/tasks/{}", ada_task["id"].as_str().expect("id")),
            Some(&ada),
            Some(json!({ "user_id": bola_task["user_id"] })),
        )
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_leave_review_workflow() {
    let app = TestApp::new();
    let root = app.login("root", ROOT_PASSWORD).await;
    let (_, ada) = app.create_user(&root, "ada", "Agent", "Lagos").await;
    let (_, sade) = app.create_user(&root, "sade", "Supervisor", "Lagos").await;

    let request = json!({
        "leave_type": "Annual",
        "start_date": "2030-03-04",
        "end_date": "2030-03-10",
        "reason": "Family visit"
    });
    let (status, leave) = app.call(Method::POST, "/api/leaves", Some(&ada), Some(request)).await;
    assert_eq!(status, StatusCode::CREATED, "{leave}");
    assert_eq!(leave["days"], 7);
    assert_eq!(leave["working_days"], 5);

    let overlap = json!({ "leave_type": "Sick", "start_date": "2030-03-08", "end_date": "2030-03-12" });
    let (status, _) = app.call(Method::POST, "/api/leaves", Some(&ada), Some(overlap)).await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (_, inbox) = app.call(Method::GET, "/api/notifications", Some(&sade), None).await;
    assert_eq!(inbox["unread_count"], 1);
    assert_eq!(inbox["notifications"][0]["kind"], "leave_requested");

    let approve = format!("/api/leaves/{}/approve", leave["id"].as_str().expect("id"));
    let (status, _) = app.call(Method::PUT, &approve, Some(&ada), None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, approved) = app
        .call(Method::PUT, &approve, Some(&sade), Some(json!({ "comment": "Enjoy" })))
        .await;
    assert_eq!(status, StatusCode::OK, "{approved}");
    assert_eq!(approved["status"], "Approved");
    assert_eq!(approved["review_comment"], "Enjoy");

    let (status, _) = app.call(Method::PUT, &approve, Some(&sade), None).await;
    assert_eq!(status, StatusCode::CONFLICT);

    // Reviewers never decide on their own requests
    let own = json!({ "leave_type": "Casual", "start_date": "2030-05-06", "end_date": "2030-05-06" });
    let (_, own) = app.call(Method::POST, "/api/leaves", Some(&sade), Some(own)).await;
    let own_approve = format!("/api/leaves/{}/approve", own["id"].as_str().expect("id"));
    let (status, _) = app.call(Method::PUT, &own_approve, Some(&sade), None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (_, inbox) = app.call(Method::GET, "/api/notifications", Some(&ada), None).await;
    assert_eq!(inbox["notifications"][0]["kind"], "leave_approved");

    let cancel = format!("/api/leaves/{}/cancel", leave["id"].as_str().expect("id"));
    let (status, cancelled) = app.call(Method::PUT, &cancel, Some(&ada), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(cancelled["status"], "Cancelled");
}

#[tokio::test]
async fn test_duplicate_dropdown_is_conflict() {
    let app = TestApp::new();
    let root = app.login("root", ROOT_PASSWORD).await;
    let entry = json!({ "dropdown_type": "Category", "value": "Tax" });

    let (status, _) = app.call(Method::POST, "/api/dropdowns", Some(&root), Some(entry.clone())).await;
    assert_eq!(status, StatusCode::CREATED);
    let (status, _) = app.call(Method::POST, "/api/dropdowns", Some(&root), Some(entry)).await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (_, agent) = app.create_user(&root, "ada", "Agent", "Lagos").await;
    let (status, _) = app
        .call(
            Method::POST,
            "/api/dropdowns",
            Some(&agent),
            Some(json!({ "dropdown_type": "Source", "value": "Walk-in" })),
        )
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_meeting_ics_export() {
    let app = TestApp::new();
    let root = app.login("root", ROOT_PASSWORD).await;
    let (ada_id, ada) = app.create_user(&root, "ada", "Admin", "Lagos").await;
    let (bola_id, bola) = app.create_user(&root, "bola", "Agent", "Lagos").await;

    let (status, meeting) = app
        .call(
            Method::POST,
            "/api/meetings",
            Some(&ada),
            Some(json!({
                "subject": "Month-end close",
                "platform": "Teams",
                "start_time": "2030-01-31T09:00:00",
                "end_time": "2030-01-31T10:00:00",
                "participant_ids": [bola_id]
            })),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED, "{meeting}");
    let participants = meeting["participant_ids"].as_array().expect("participants");
    assert!(participants.iter().any(|p| p == ada_id.as_str()));

    let uri = format!("/api/meetings/{}/ics", meeting["id"].as_str().expect("id"));
    let (status, body) = app.call(Method::GET, &uri, Some(&bola), None).await;
    assert_eq!(status, StatusCode::OK);
    let ics = body.as_str().expect("ics text");
    assert!(ics.contains("BEGIN:VEVENT"));
    assert!(ics.contains("SUMMARY:Month-end close"));
    assert_eq!(ics.matches("PRODID:").count(), 1);

    let (status, _) = app
        .call(Method::DELETE, &format!("/api/meetings/{}", meeting["id"].as_str().expect("id")), Some(&bola), None)
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_meeting_rejects_participants_from_other_offices() {
    let app = TestApp::new();
    let root = app.login("root", ROOT_PASSWORD).await;
    let (_, ada) = app.create_user(&root, "ada", "Admin", "Lagos").await;
    let (chidi_id, _) = app.create_user(&root, "chidi", "Agent", "Abuja").await;

    let meeting = json!({
        "subject": "Branch handover",
        "platform": "Zoom",
        "start_time": "2030-02-04T14:00:00",
        "end_time": "2030-02-04T15:00:00",
        "participant_ids": [chidi_id]
    });
    let (status, _) = app.call(Method::POST, "/api/meetings", Some(&ada), Some(meeting.clone())).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, created) = app.call(Method::POST, "/api/meetings", Some(&root), Some(meeting)).await;
    assert_eq!(status, StatusCode::CREATED, "{created}");
}

#[tokio::test]
async fn test_soft_delete_disables_account() {
    let app = TestApp::new();
    let root = app.login("root", ROOT_PASSWORD).await;
    let (_, tunde) = app.create_user(&root, "tunde", "Admin", "Lagos").await;
    let (ada_id, ada) = app.create_user(&root, "ada", "Agent", "Lagos").await;

    let (status, me) = app.call(Method::GET, "/api/auth/me", Some(&tunde), None).await;
    assert_eq!(status, StatusCode::OK);
    let tunde_id = me["id"].as_str().expect("id").to_string();
    let (status, _) = app
        .call(Method::DELETE, &format!("/api/users/{tunde_id}"), Some(&tunde), None)
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = app
        .call(Method::DELETE, &format!("/api/users/{ada_id}"), Some(&tunde), None)
        .await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (status, _) = app.call(Method::GET, "/api/tasks", Some(&ada), None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, _) = app
        .call(
            Method::POST,
            "/api/auth/login",
            None,
            Some(json!({ "login": "ada", "password": USER_PASSWORD })),
        )
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    // The row is kept, only deactivated
    let (status, profile) = app
        .call(Method::GET, &format!("/api/users/{ada_id}"), Some(&root), None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(profile["is_active"], false);
}

#[tokio::test]
async fn test_dropdown_with_children_cannot_be_deleted() {
    let app = TestApp::new();
    let root = app.login("root", ROOT_PASSWORD).await;

    let (_, tax) = app
        .call(
            Method::POST,
            "/api/dropdowns",
            Some(&root),
            Some(json!({ "dropdown_type": "Category", "value": "Tax" })),
        )
        .await;
    let tax_id = tax["id"].as_str().expect("id").to_string();
    let (status, vat) = app
        .call(
            Method::POST,
            "/api/dropdowns",
            Some(&root),
            Some(json!({ "dropdown_type": "SubCategory", "value": "VAT", "parent_id": tax_id })),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED, "{vat}");

    let (status, _) = app
        .call(Method::DELETE, &format!("/api/dropdowns/{tax_id}"), Some(&root), None)
        .await;
    assert_eq!(status, StatusCode::CONFLICT);

    let vat_id = vat["id"].as_str().expect("id");
    let (status, _) = app
        .call(Method::DELETE, &format!("/api/dropdowns/{vat_id}"), Some(&root), None)
        .await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    let (status, _) = app
        .call(Method::DELETE, &format!("/api/dropdowns/{tax_id}"), Some(&root), None)
        .await;
    assert_eq!(status, StatusCode::NO_CONTENT);
}

#[tokio::test]
async fn test_retired_category_does_not_block_task_updates() {
    let app = TestApp::new();
    let root = app.login("root", ROOT_PASSWORD).await;
    let (_, ada) = app.create_user(&root, "ada", "Agent", "Lagos").await;

    let (_, tax) = app
        .call(
            Method::POST,
            "/api/dropdowns",
            Some(&root),
            Some(json!({ "dropdown_type": "Category", "value": "Tax" })),
        )
        .await;
    let (status, task) = app
        .call(
            Method::POST,
            "/api/tasks",
            Some(&ada),
            Some(json!({ "task_date": "2024-06-03", "category": "Tax", "description": "Filed VAT return" })),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED, "{task}");

    let (status, _) = app
        .call(
            Method::PUT,
            &format!("/api/dropdowns/{}", tax["id"].as_str().expect("id")),
            Some(&root),
            Some(json!({ "is_active": false })),
        )
        .await;
    assert_eq!(status, StatusCode::OK);

    let uri = format!("/api/tasks/{}", task["id"].as_str().expect("id"));
    let (status, updated) = app
        .call(Method::PUT, &uri, Some(&ada), Some(json!({ "status": "Completed" })))
        .await;
    assert_eq!(status, StatusCode::OK, "{updated}");
    assert_eq!(updated["status"], "Completed");
    assert_eq!(updated["category"], "Tax");

    // Choosing the retired value again is still rejected
    let (status, _) = app
        .call(Method::PUT, &uri, Some(&ada), Some(json!({ "category": "Tax" })))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_notifications_belong_to_their_recipient() {
    let app = TestApp::new();
    let root = app.login("root", ROOT_PASSWORD).await;
    let (_, ada) = app.create_user(&root, "ada", "Agent", "Lagos").await;
    let (_, sade) = app.create_user(&root, "sade", "Supervisor", "Lagos").await;

    let request = json!({ "leave_type": "Annual", "start_date": "2030-04-01", "end_date": "2030-04-02" });
    let (status, _) = app.call(Method::POST, "/api/leaves", Some(&ada), Some(request)).await;
    assert_eq!(status, StatusCode::CREATED);

    let (_, inbox) = app.call(Method::GET, "/api/notifications", Some(&sade), None).await;
    let id = inbox["notifications"][0]["id"].as_str().expect("id").to_string();

    let (_, other) = app.call(Method::GET, "/api/notifications", Some(&ada), None).await;
    assert_eq!(other["unread_count"], 0);
    assert!(other["notifications"].as_array().expect("array").is_empty());

    let read = format!("/api/notifications/{id}/read");
    let (status, _) = app.call(Method::PUT, &read, Some(&ada), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    let (status, _) = app
        .call(Method::DELETE, &format!("/api/notifications/{id}"), Some(&ada), None)
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, marked) = app.call(Method::PUT, &read, Some(&sade), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(marked["is_read"], true);
    let (status, _) = app
        .call(Method::DELETE, &format!("/api/notifications/{id}"), Some(&sade), None)
        .await;
    assert_eq!(status, StatusCode::NO_CONTENT);
}

#[tokio::test]
async fn test_refresh_token_is_single_use() {
    let app = TestApp::new();
    let (status, session) = app
        .call(
            Method::POST,
            "/api/auth/login",
            None,
            Some(json!({ "login": "root", "password": ROOT_PASSWORD })),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    let refresh = json!({ "refresh_token": session["refresh_token"] });

    let (status, renewed) = app
        .call(Method::POST, "/api/auth/refresh", None, Some(refresh.clone()))
        .await;
    assert_eq!(status, StatusCode::OK, "{renewed}");
    let token = renewed["access_token"].as_str().expect("access token");
    let (status, _) = app.call(Method::GET, "/api/auth/me", Some(token), None).await;
    assert_eq!(status, StatusCode::OK);

    let (status, _) = app.call(Method::POST, "/api/auth/refresh", None, Some(refresh)).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_client_errors_name_the_reporter_when_signed_in() {
    let app = TestApp::new();
    let root = app.login("root", ROOT_PASSWORD).await;
    let report = json!({ "errors": [{ "type": "TypeError", "message": "x is undefined", "url": "/tasks" }] });

    let (status, anonymous) = app.call(Method::POST, "/api/logs", None, Some(report.clone())).await;
    assert_eq!(status, StatusCode::ACCEPTED);
    assert_eq!(anonymous["reporter"], Value::Null);

    let (status, signed_in) = app.call(Method::POST, "/api/logs", Some(&root), Some(report)).await;
    assert_eq!(status, StatusCode::ACCEPTED);
    assert_eq!(signed_in["reporter"], "root");
}

#[tokio::test]
async fn test_leave_longer_than_a_year_is_rejected() {
    let app = TestApp::new();
    let root = app.login("root", ROOT_PASSWORD).await;
    let (_, ada) = app.create_user(&root, "ada", "Agent", "Lagos").await;

    let request = json!({ "leave_type": "Unpaid", "start_date": "2030-01-01", "end_date": "2031-06-30" });
    let (status, body) = app.call(Method::POST, "/api/leaves", Some(&ada), Some(request)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST, "{body}");
}
