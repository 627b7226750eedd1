/// HTTP tests for the ShellHacks API
///
/// These tests drive the real router with `tower::ServiceExt::oneshot` over
/// in-memory collaborators:
/// - Registration, confirmation and login
/// - Password reset
/// - Application submission (multipart)
/// - Admin listing, acceptance, attendance, check-in and reminders
/// - Envelope shape and status code mapping
mod common;

use axum::http::{header, Method, StatusCode};
use common::{complete_form, TestApp, DASHBOARD_PASSWORD, PASSWORD, RESUME};
use serde_json::json;
use shellhacks_shared::outbox::NotificationTemplate;

#[tokio::test]
async fn test_health_reports_store_state() {
    let app = TestApp::new();

    let healthy = app.json(Method::GET, "/health", None, None).await;
    assert_eq!(healthy.status, StatusCode::OK);
    assert_eq!(healthy.body["success"], true);
    assert_eq!(healthy.data()["database"], "connected");
    assert_eq!(healthy.headers.get("x-frame-options").unwrap(), "DENY");

    app.store.set_unavailable(true);
    let degraded = app.json(Method::GET, "/health", None, None).await;
    assert_eq!(degraded.status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(degraded.data()["status"], "degraded");
}

#[tokio::test]
async fn test_register_returns_public_record() {
    let app = TestApp::new();

    let ada = app.register("Ada", "Lovelace", "ADA@x.com").await;

    assert_eq!(ada["email"], "ada@x.com");
    assert_eq!(ada["applicationStatus"], "not applied");
    assert_eq!(ada["emailConfirmed"], false);
    assert!(ada["shellID"].as_str().unwrap().len() >= 5);
    assert!(ada.get("passwordHash").is_none());
    assert!(ada.get("emailConfirmationToken").is_none());

    let mailed = app.mailed_token(NotificationTemplate::Verification, "ada@x.com").await;
    assert!(!mailed.is_empty());
}

#[tokio::test]
async fn test_duplicate_email_is_conflict() {
    let app = TestApp::new();
    app.register("Ada", "Lovelace", "ADA@x.com").await;

    let response = app
        .post(
            "/v1/applicants/register",
            json!({
                "firstName": "Ada",
                "lastName": "Again",
                "email": "ada@x.com",
                "password": PASSWORD,
            }),
        )
        .await;

    assert_eq!(response.status, StatusCode::CONFLICT);
    assert_eq!(response.body["success"], false);
    assert_eq!(response.body["error"], "conflict");
}

#[tokio::test]
async fn test_invalid_registration_lists_every_reason() {
    let app = TestApp::new();

    let response = app
        .post(
            "/v1/applicants/register",
            json!({ "firstName": "", "lastName": "", "email": "nope", "password": "1" }),
        )
        .await;

    assert_eq!(response.status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(response.body["error"], "validation_error");
    assert!(response.body["details"].as_array().unwrap().len() >= 3);
}

#[tokio::test]
async fn test_malformed_json_uses_envelope() {
    let app = TestApp::new();

    let request = axum::http::Request::builder()
        .method(Method::POST)
        .uri("/v1/applicants/login")
        .header(header::CONTENT_TYPE, "application/json")
        .body(axum::body::Body::from("{not json"))
        .unwrap();
    let response = app.send(request).await;

    assert_eq!(response.status, StatusCode::BAD_REQUEST);
    assert_eq!(response.body["success"], false);
    assert_eq!(response.body["error"], "bad_request");
}

#[tokio::test]
async fn test_confirm_email_flow() {
    let app = TestApp::new();
    app.register("Ada", "Lovelace", "ada@x.com").await;
    let token = app.mailed_token(NotificationTemplate::Verification, "ada@x.com").await;

    let wrong = app
        .post(
            "/v1/applicants/confirm-email",
            json!({ "email": "ada@x.com", "emailConfirmationToken": "deadbeef" }),
        )
        .await;
    assert_eq!(wrong.status, StatusCode::NOT_FOUND);

    for _ in 0..2 {
        let response = app
            .post(
                "/v1/applicants/confirm-email",
                json!({ "email": "ada@x.com", "emailConfirmationToken": token }),
            )
            .await;
        assert_eq!(response.status, StatusCode::OK, "{}", response.body);
        assert!(response.data().is_null());
    }

    let session = app.session("ada@x.com").await;
    let me = app
        .json(Method::GET, "/v1/applicants/me", Some(&session), None)
        .await;
    assert_eq!(me.data()["emailConfirmed"], true);
    assert_eq!(
        app.effects
            .notifications(NotificationTemplate::AccountConfirmation)
            .await
            .len(),
        1
    );
}

#[tokio::test]
async fn test_resend_confirmation_is_throttled() {
    let app = TestApp::new();
    app.register("Ada", "Lovelace", "ada@x.com").await;

    for _ in 0..3 {
        let response = app
            .post("/v1/applicants/resend-confirmation", json!({ "email": "ada@x.com" }))
            .await;
        assert_eq!(response.status, StatusCode::OK);
    }

    let limited = app
        .post("/v1/applicants/resend-confirmation", json!({ "email": "ada@x.com" }))
        .await;
    assert_eq!(limited.status, StatusCode::TOO_MANY_REQUESTS);
    assert!(limited.headers.get(header::RETRY_AFTER).is_some());
    assert_eq!(limited.body["error"], "rate_limit_exceeded");
}

#[tokio::test]
async fn test_login_failures_are_indistinguishable() {
    let app = TestApp::new();
    app.register("Ada", "Lovelace", "ada@x.com").await;

    let wrong_password = app.login("ada@x.com", "wrong").await;
    let unknown_email = app.login("ghost@x.com", PASSWORD).await;

    assert_eq!(wrong_password.status, StatusCode::UNAUTHORIZED);
    assert_eq!(unknown_email.status, StatusCode::UNAUTHORIZED);
    assert_eq!(wrong_password.body, unknown_email.body);

    let ok = app.login("Ada@X.com", PASSWORD).await;
    assert_eq!(ok.status, StatusCode::OK);
    assert!(ok.data()["expiresAt"].is_string());
}

#[tokio::test]
async fn test_password_reset_flow() {
    let app = TestApp::new();
    app.register("Ada", "Lovelace", "ada@x.com").await;

    let unknown = app
        .post("/v1/applicants/forgot-password", json!({ "email": "ghost@x.com" }))
        .await;
    let requested = app
        .post("/v1/applicants/forgot-password", json!({ "email": "ada@x.com" }))
        .await;
    assert_eq!(requested.status, StatusCode::OK);
    assert_eq!(unknown.status, requested.status);
    assert_eq!(unknown.body, requested.body);
    assert!(app
        .effects
        .notifications(NotificationTemplate::ForgotPassword)
        .await
        .iter()
        .all(|(to, _)| to == "ada@x.com"));
    let token = app.mailed_token(NotificationTemplate::ForgotPassword, "ada@x.com").await;

    let bad_token = app
        .post(
            "/v1/applicants/reset-password",
            json!({ "email": "ada@x.com", "newPassword": "newpw1", "token": "000000" }),
        )
        .await;
    assert_eq!(bad_token.status, StatusCode::BAD_REQUEST);

    let reset = app
        .post(
            "/v1/applicants/reset-password",
            json!({ "email": "ada@x.com", "newPassword": "newpw1", "token": token }),
        )
        .await;
    assert_eq!(reset.status, StatusCode::OK, "{}", reset.body);

    assert_eq!(app.login("ada@x.com", PASSWORD).await.status, StatusCode::UNAUTHORIZED);
    assert_eq!(app.login("ada@x.com", "newpw1").await.status, StatusCode::OK);

    let reused = app
        .post(
            "/v1/applicants/reset-password",
            json!({ "email": "ada@x.com", "newPassword": "other1", "token": token }),
        )
        .await;
    assert_eq!(reused.status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_session_routes_require_token() {
    let app = TestApp::new();

    let missing = app.json(Method::GET, "/v1/applicants/me", None, None).await;
    assert_eq!(missing.status, StatusCode::UNAUTHORIZED);

    let forged = app
        .json(Method::GET, "/v1/applicants/me", Some("not.a.jwt"), None)
        .await;
    assert_eq!(forged.status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_apply_submits_application() {
    let app = TestApp::new();
    app.register("Ada", "Lovelace", "ada@x.com").await;
    let session = app.session("ada@x.com").await;

    let mut fields = complete_form();
    fields.push(("email", "ADA@x.com"));
    let response = app.apply(&session, &fields, Some(RESUME)).await;

    assert_eq!(response.status, StatusCode::OK, "{}", response.body);
    let data = response.data();
    assert_eq!(data["applicationStatus"], "applied");
    assert_eq!(data["schoolName"], "FIU");
    assert_eq!(data["graduationYear"], 2027);
    assert_eq!(data["likeAMentor"], true);
    assert_eq!(data["resume"], "N/A");
    assert!(data["timeApplied"].is_string());

    assert_eq!(
        app.effects.notifications(NotificationTemplate::Applied).await,
        vec![("ada@x.com".to_string(), None)]
    );
}

#[tokio::test]
async fn test_apply_uploads_resume_when_enabled() {
    let app = TestApp::with_env(&[
        ("DRIVE_UPLOAD_ENABLED", "true"),
        ("GOOGLE_FOLDER_ID", "resumes"),
    ]);
    app.register("Ada", "Lovelace", "ada@x.com").await;
    let session = app.session("ada@x.com").await;

    let response = app.apply(&session, &complete_form(), Some(RESUME)).await;

    assert_eq!(response.status, StatusCode::OK, "{}", response.body);
    assert_eq!(response.data()["resume"], "memory://resumes/ada");
    assert_eq!(app.storage.uploads().await.len(), 1);
}

#[tokio::test]
async fn test_apply_rejections() {
    let app = TestApp::new();
    app.register("Ada", "Lovelace", "ada@x.com").await;
    app.register("Grace", "Hopper", "grace@x.com").await;
    let session = app.session("ada@x.com").await;

    let no_resume = app.apply(&session, &complete_form(), None).await;
    assert_eq!(no_resume.status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(no_resume.body["details"], json!(["resume required"]));

    let bad_year = app
        .apply(&session, &[("graduationYear", "soon")], Some(RESUME))
        .await;
    assert_eq!(bad_year.status, StatusCode::UNPROCESSABLE_ENTITY);

    let mut someone_else = complete_form();
    someone_else.push(("email", "grace@x.com"));
    let forbidden = app.apply(&session, &someone_else, Some(RESUME)).await;
    assert_eq!(forbidden.status, StatusCode::FORBIDDEN);

    let incomplete = app
        .apply(&session, &[("schoolName", "FIU")], Some(RESUME))
        .await;
    assert_eq!(incomplete.status, StatusCode::UNPROCESSABLE_ENTITY);
}

#[tokio::test]
async fn test_admin_requires_dashboard_password() {
    let app = TestApp::new();

    let missing = app
        .json(Method::GET, "/v1/admin/applicants", None, None)
        .await;
    assert_eq!(missing.status, StatusCode::UNAUTHORIZED);

    let wrong = app
        .json(Method::GET, "/v1/admin/applicants", Some("guess"), None)
        .await;
    assert_eq!(wrong.status, StatusCode::UNAUTHORIZED);

    let ok = app
        .json(Method::GET, "/v1/admin/applicants", Some(DASHBOARD_PASSWORD), None)
        .await;
    assert_eq!(ok.status, StatusCode::OK);
}

#[tokio::test]
async fn test_admin_listing_and_lookup() {
    let app = TestApp::new();
    let ada = app.register("Ada", "Lovelace", "ada@x.com").await;
    app.register("Grace", "Hopper", "grace@x.com").await;

    let search = app.admin_get("/v1/admin/applicants?q=lovel&page=0&limit=30").await;
    assert_eq!(search.status, StatusCode::OK);
    assert_eq!(search.data()["totalCount"], 1);
    assert_eq!(search.data()["items"][0]["email"], "ada@x.com");
    assert_eq!(search.data()["pageInfo"]["pageSize"], 30);

    let filtered = app.admin_get("/v1/admin/applicants?filter=applied").await;
    assert_eq!(filtered.data()["totalCount"], 0);

    let bad_filter = app.admin_get("/v1/admin/applicants?filter=maybe").await;
    assert_eq!(bad_filter.status, StatusCode::BAD_REQUEST);

    let shell_id = ada["shellID"].as_str().unwrap();
    let one = app
        .admin_get(&format!("/v1/admin/applicants/{}", shell_id))
        .await;
    assert_eq!(one.data()["firstName"], "Ada");

    let missing = app.admin_get("/v1/admin/applicants/ZZZZZ").await;
    assert_eq!(missing.status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_acceptance_and_attendance_round_trip() {
    let app = TestApp::new();
    let ada = app.register("Ada", "Lovelace", "ada@x.com").await;
    let grace = app.register("Grace", "Hopper", "grace@x.com").await;
    let ada_id = ada["shellID"].as_str().unwrap().to_string();
    let grace_id = grace["shellID"].as_str().unwrap().to_string();

    let session = app.session("ada@x.com").await;
    let applied = app.apply(&session, &complete_form(), Some(RESUME)).await;
    assert_eq!(applied.status, StatusCode::OK);

    // confirming before acceptance is not on the lifecycle graph
    let early = app
        .admin_post("/v1/admin/confirm", json!({ "email": "ada@x.com" }))
        .await;
    assert_eq!(early.status, StatusCode::CONFLICT);

    let outcomes = app
        .admin_post(
            "/v1/admin/accept",
            json!({ "shellIDs": [ada_id, grace_id, "NOPE1", ada_id] }),
        )
        .await;
    assert_eq!(outcomes.status, StatusCode::OK);
    assert_eq!(
        outcomes.data(),
        &json!([
            { "shellID": ada_id, "outcome": "accepted" },
            { "shellID": grace_id, "outcome": "skipped", "status": "not applied" },
            { "shellID": "NOPE1", "outcome": "not_found" },
        ])
    );

    let confirm = app
        .admin_post("/v1/admin/confirm", json!({ "email": "ada@x.com" }))
        .await;
    assert_eq!(confirm.status, StatusCode::OK);

    let unconfirm = app
        .admin_post("/v1/admin/unconfirm", json!({ "email": "ada@x.com" }))
        .await;
    assert_eq!(unconfirm.status, StatusCode::OK);

    let me = app
        .json(Method::GET, "/v1/applicants/me", Some(&session), None)
        .await;
    assert_eq!(me.data()["applicationStatus"], "accepted");
}

#[tokio::test]
async fn test_empty_accept_batch_is_rejected() {
    let app = TestApp::new();

    let response = app
        .admin_post("/v1/admin/accept", json!({ "shellIDs": [] }))
        .await;
    assert_eq!(response.status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(response.body["details"], json!(["shellIDs must not be empty"]));
}

#[tokio::test]
async fn test_check_in_counts() {
    let app = TestApp::new();
    let ada = app.register("Ada", "Lovelace", "ada@x.com").await;
    app.register("Grace", "Hopper", "grace@x.com").await;

    let checked = app
        .admin_post("/v1/admin/check-in", json!({ "shellID": ada["shellID"] }))
        .await;
    assert_eq!(checked.status, StatusCode::OK);
    assert_eq!(checked.data()["checkIn"], true);

    let listing = app.admin_get("/v1/admin/applicants").await;
    assert_eq!(listing.data()["totalCount"], 2);
    assert_eq!(listing.data()["checkedInCount"], 1);

    let unknown = app
        .admin_post("/v1/admin/check-in", json!({ "shellID": "NOPE1" }))
        .await;
    assert_eq!(unknown.status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_reminders_target_status() {
    let app = TestApp::new();
    app.register("Ada", "Lovelace", "ada@x.com").await;
    app.register("Grace", "Hopper", "grace@x.com").await;

    let apply = app.admin_post("/v1/admin/remind/apply", json!({})).await;
    assert_eq!(apply.status, StatusCode::OK);
    assert_eq!(apply.data()["queued"], 2);

    let confirm = app.admin_post("/v1/admin/remind/confirm", json!({})).await;
    assert_eq!(confirm.data()["queued"], 0);
    assert_eq!(
        app.effects
            .notifications(NotificationTemplate::RemindApply)
            .await
            .len(),
        2
    );
}
