//! Guard outcomes (401/403/429) and resource rules on the assembled router.

mod common;

use axum::http::{Method, StatusCode};
use common::{json_body, TestApp, PASSWORD};
use postbox_backend::{middleware::RateLimitConfig, state::Limiters};
use serde_json::json;

#[tokio::test]
async fn test_user_directory_needs_permission() {
    let app = TestApp::new().await;
    let (_, user) = app.register("ada").await;
    let (_, admin) = app.register_admin("root").await;

    let denied = app.send(Method::GET, "/api/v1/users", Some(&user), None).await;
    assert_eq!(denied.status(), StatusCode::FORBIDDEN);
    assert_eq!(json_body(denied).await["message"], "Insufficient permissions");

    let anonymous = app.send(Method::GET, "/api/v1/users", None, None).await;
    assert_eq!(anonymous.status(), StatusCode::UNAUTHORIZED);

    let listed = app
        .send(Method::GET, "/api/v1/users?per_page=1&sort=username", Some(&admin), None)
        .await;
    assert_eq!(listed.status(), StatusCode::OK);
    let body = json_body(listed).await;
    assert_eq!(body["data"].as_array().unwrap().len(), 1);
    assert_eq!(body["data"][0]["username"], "ada");
    assert_eq!(body["pagination"]["total"], 2);
    assert_eq!(body["pagination"]["has_next"], true);
}

#[tokio::test]
async fn test_profile_owner_or_admin() {
    let app = TestApp::new().await;
    let (ada_id, ada) = app.register("ada").await;
    let (bob_id, bob) = app.register("bob").await;
    let (_, admin) = app.register_admin("root").await;

    let own = app
        .send(Method::GET, &format!("/api/v1/users/{ada_id}"), Some(&ada), None)
        .await;
    assert_eq!(own.status(), StatusCode::OK);

    let other = app
        .send(Method::GET, &format!("/api/v1/users/{ada_id}"), Some(&bob), None)
        .await;
    assert_eq!(other.status(), StatusCode::FORBIDDEN);

    let by_admin = app
        .send(Method::GET, &format!("/api/v1/users/{bob_id}"), Some(&admin), None)
        .await;
    assert_eq!(by_admin.status(), StatusCode::OK);

    let renamed = app
        .send(
            Method::PUT,
            &format!("/api/v1/users/{ada_id}"),
            Some(&ada),
            Some(json!({ "first_name": "Ada" })),
        )
        .await;
    assert_eq!(renamed.status(), StatusCode::OK);
    assert_eq!(json_body(renamed).await["first_name"], "Ada");

    let self_reactivate = app
        .send(
            Method::PUT,
            &format!("/api/v1/users/{ada_id}"),
            Some(&ada),
            Some(json!({ "is_active": true })),
        )
        .await;
    assert_eq!(self_reactivate.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_user_profile_record() {
    let app = TestApp::new().await;
    let (ada_id, ada) = app.register("ada").await;
    let (_, bob) = app.register("bob").await;
    let (_, admin) = app.register_admin("root").await;
    let uri = format!("/api/v1/users/{ada_id}/profile");

    let missing = app.send(Method::GET, &uri, Some(&ada), None).await;
    assert_eq!(missing.status(), StatusCode::NOT_FOUND);

    let saved = app
        .send(
            Method::PUT,
            &uri,
            Some(&ada),
            Some(json!({ "bio": "Analyst", "website": "https://ada.dev" })),
        )
        .await;
    assert_eq!(saved.status(), StatusCode::OK);
    let body = json_body(saved).await;
    assert_eq!(body["user_id"], ada_id);
    assert_eq!(body["website"], "https://ada.dev");

    let bad_site = app
        .send(
            Method::PUT,
            &uri,
            Some(&ada),
            Some(json!({ "website": "ftp://ada.dev" })),
        )
        .await;
    assert_eq!(bad_site.status(), StatusCode::BAD_REQUEST);
    assert_eq!(json_body(bad_site).await["details"][0]["code"], "INVALID_URL");

    let foreign = app
        .send(Method::PUT, &uri, Some(&bob), Some(json!({ "bio": "mine now" })))
        .await;
    assert_eq!(foreign.status(), StatusCode::FORBIDDEN);

    let by_admin = app.send(Method::GET, &uri, Some(&admin), None).await;
    assert_eq!(by_admin.status(), StatusCode::OK);
    assert_eq!(json_body(by_admin).await["bio"], "Analyst");
}

#[tokio::test]
async fn test_role_management_is_admin_only() {
    let app = TestApp::new().await;
    let (ada_id, ada) = app.register("ada").await;
    let (_, admin) = app.register_admin("root").await;

    let uri = format!("/api/v1/users/{ada_id}/roles");
    let denied = app
        .send(Method::POST, &uri, Some(&ada), Some(json!({ "role": "admin" })))
        .await;
    assert_eq!(denied.status(), StatusCode::FORBIDDEN);

    let granted = app
        .send(Method::POST, &uri, Some(&admin), Some(json!({ "role": "admin" })))
        .await;
    assert!(granted.status().is_success());

    let roles = app.send(Method::GET, &uri, Some(&ada), None).await;
    assert_eq!(roles.status(), StatusCode::OK);
    assert_eq!(json_body(roles).await["roles"], json!(["admin", "user"]));

    let revoked = app
        .send(Method::DELETE, &format!("{uri}/admin"), Some(&admin), None)
        .await;
    assert!(revoked.status().is_success());

    let denied_again = app.send(Method::GET, "/api/v1/users", Some(&ada), None).await;
    assert_eq!(denied_again.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_draft_posts_hidden_from_others() {
    let app = TestApp::new().await;
    let (_, ada) = app.register("ada").await;
    let (_, bob) = app.register("bob").await;
    let (_, admin) = app.register_admin("root").await;

    let created = app
        .send(
            Method::POST,
            "/api/v1/posts",
            Some(&ada),
            Some(json!({ "title": "Notes", "content": "first draft" })),
        )
        .await;
    assert_eq!(created.status(), StatusCode::CREATED);
    let post = json_body(created).await;
    assert_eq!(post["status"], "draft");
    let uri = format!("/api/v1/posts/{}", post["id"]);

    for (token, expected) in [
        (None, StatusCode::NOT_FOUND),
        (Some(bob.as_str()), StatusCode::NOT_FOUND),
        (Some(ada.as_str()), StatusCode::OK),
        (Some(admin.as_str()), StatusCode::OK),
    ] {
        let response = app.send(Method::GET, &uri, token, None).await;
        assert_eq!(response.status(), expected);
    }

    let public_list = json_body(app.send(Method::GET, "/api/v1/posts", None, None).await).await;
    assert_eq!(public_list["pagination"]["total"], 0);

    let own_list =
        json_body(app.send(Method::GET, "/api/v1/posts", Some(&ada), None).await).await;
    assert_eq!(own_list["pagination"]["total"], 1);
}

#[tokio::test]
async fn test_post_edits_need_ownership() {
    let app = TestApp::new().await;
    let (_, ada) = app.register("ada").await;
    let (_, bob) = app.register("bob").await;

    let post = json_body(
        app.send(
            Method::POST,
            "/api/v1/posts",
            Some(&ada),
            Some(json!({ "title": "Hello", "content": "world", "status": "published" })),
        )
        .await,
    )
    .await;
    let uri = format!("/api/v1/posts/{}", post["id"]);

    let anonymous = app.send(Method::GET, &uri, None, None).await;
    assert_eq!(anonymous.status(), StatusCode::OK);

    let hijack = app
        .send(Method::PUT, &uri, Some(&bob), Some(json!({ "title": "Mine now" })))
        .await;
    assert_eq!(hijack.status(), StatusCode::FORBIDDEN);

    let edit = app
        .send(Method::PUT, &uri, Some(&ada), Some(json!({ "title": "Hello again" })))
        .await;
    assert_eq!(edit.status(), StatusCode::OK);
    assert_eq!(json_body(edit).await["title"], "Hello again");

    let bad_status = app
        .send(Method::PUT, &uri, Some(&ada), Some(json!({ "status": "pinned" })))
        .await;
    assert_eq!(bad_status.status(), StatusCode::BAD_REQUEST);

    let removed = app.send(Method::DELETE, &uri, Some(&ada), None).await;
    assert_eq!(removed.status(), StatusCode::NO_CONTENT);
    let gone = app.send(Method::GET, &uri, None, None).await;
    assert_eq!(gone.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_comment_lifecycle() {
    let app = TestApp::new().await;
    let (_, ada) = app.register("ada").await;
    let (_, bob) = app.register("bob").await;

    let post = json_body(
        app.send(
            Method::POST,
            "/api/v1/posts",
            Some(&ada),
            Some(json!({ "title": "Hello", "content": "world", "status": "published" })),
        )
        .await,
    )
    .await;
    let comments_uri = format!("/api/v1/posts/{}/comments", post["id"]);

    let anonymous = app
        .send(Method::POST, &comments_uri, None, Some(json!({ "content": "hi" })))
        .await;
    assert_eq!(anonymous.status(), StatusCode::UNAUTHORIZED);

    let created = app
        .send(Method::POST, &comments_uri, Some(&bob), Some(json!({ "content": "nice" })))
        .await;
    assert_eq!(created.status(), StatusCode::CREATED);
    let comment = json_body(created).await;

    let listed = json_body(app.send(Method::GET, &comments_uri, None, None).await).await;
    assert_eq!(listed["data"][0]["content"], "nice");

    let comment_uri = format!("/api/v1/comments/{}", comment["id"]);
    let not_yours = app.send(Method::DELETE, &comment_uri, Some(&ada), None).await;
    assert_eq!(not_yours.status(), StatusCode::FORBIDDEN);

    let removed = app.send(Method::DELETE, &comment_uri, Some(&bob), None).await;
    assert_eq!(removed.status(), StatusCode::NO_CONTENT);

    let missing_post = app
        .send(
            Method::POST,
            "/api/v1/posts/9999/comments",
            Some(&bob),
            Some(json!({ "content": "hello?" })),
        )
        .await;
    assert_eq!(missing_post.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_datastore_crud_is_admin_only() {
    let app = TestApp::new().await;
    let (_, user) = app.register("ada").await;
    let (_, admin) = app.register_admin("root").await;

    let denied = app
        .send(Method::GET, "/api/v1/datastore/data", Some(&user), None)
        .await;
    assert_eq!(denied.status(), StatusCode::FORBIDDEN);

    let vm = json!({
        "hostname": "build-01",
        "host_user": "ops",
        "host_ip": "10.0.0.5",
        "host_pwd": "hunter2",
        "message": "ci runner",
    });
    let created = app
        .send(Method::POST, "/api/v1/datastore/data", Some(&admin), Some(vm))
        .await;
    assert_eq!(created.status(), StatusCode::CREATED);
    let record = json_body(created).await;
    assert!(record.get("host_pwd").is_none());
    let uri = format!("/api/v1/datastore/data/{}", record["id"]);

    let bad_ip = app
        .send(
            Method::POST,
            "/api/v1/datastore/data",
            Some(&admin),
            Some(json!({ "hostname": "x", "host_ip": "999.1.1.1" })),
        )
        .await;
    assert_eq!(bad_ip.status(), StatusCode::BAD_REQUEST);

    let updated = app
        .send(
            Method::PUT,
            &uri,
            Some(&admin),
            Some(json!({ "hostname": "build-02", "host_ip": "10.0.0.6" })),
        )
        .await;
    assert_eq!(updated.status(), StatusCode::OK);
    assert_eq!(json_body(updated).await["hostname"], "build-02");

    let listed = json_body(
        app.send(Method::GET, "/api/v1/datastore/data", Some(&admin), None)
            .await,
    )
    .await;
    assert_eq!(listed["count"], 1);

    let removed = app.send(Method::DELETE, &uri, Some(&admin), None).await;
    assert_eq!(removed.status(), StatusCode::NO_CONTENT);
    let gone = app.send(Method::GET, &uri, Some(&admin), None).await;
    assert_eq!(gone.status(), StatusCode::NOT_FOUND);
    let twice = app.send(Method::DELETE, &uri, Some(&admin), None).await;
    assert_eq!(twice.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_login_limit_returns_429_with_headers() {
    let app = TestApp::with_limiters(Limiters::new(
        RateLimitConfig::per_minute(100),
        RateLimitConfig::per_minute(2),
        RateLimitConfig::per_minute(10),
    ))
    .await;

    let attempt = || {
        app.send(
            Method::POST,
            "/api/v1/auth/login",
            None,
            Some(json!({ "email": "ghost@example.com", "password": PASSWORD })),
        )
    };

    let first = attempt().await;
    assert_eq!(first.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(first.headers()["x-ratelimit-limit"], "2");
    assert_eq!(first.headers()["x-ratelimit-remaining"], "1");

    assert_eq!(attempt().await.status(), StatusCode::UNAUTHORIZED);

    let limited = attempt().await;
    assert_eq!(limited.status(), StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(limited.headers()["x-ratelimit-remaining"], "0");
    let body = json_body(limited).await;
    assert_eq!(body["error"], "rate_limit_exceeded");
    let retry_after = body["retry_after"].as_i64().unwrap();
    assert!(retry_after > 0 && retry_after <= 60);
    assert!(body["request_id"].is_string());
}

#[tokio::test]
async fn test_unauthenticated_requests_do_not_spend_budget() {
    let app = TestApp::with_limiters(Limiters::new(
        RateLimitConfig::per_minute(2),
        RateLimitConfig::per_minute(100),
        RateLimitConfig::per_minute(10),
    ))
    .await;
    let (_, token) = app.register("ada").await;

    for _ in 0..5 {
        let response = app.send(Method::GET, "/api/v1/auth/me", None, None).await;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    for _ in 0..2 {
        let response = app.send(Method::GET, "/api/v1/auth/me", Some(&token), None).await;
        assert_eq!(response.status(), StatusCode::OK);
    }
    let limited = app.send(Method::GET, "/api/v1/auth/me", Some(&token), None).await;
    assert_eq!(limited.status(), StatusCode::TOO_MANY_REQUESTS);
}

#[tokio::test]
async fn test_health_and_request_ids() {
    let app = TestApp::new().await;

    let health = app.send(Method::GET, "/health", None, None).await;
    assert_eq!(health.status(), StatusCode::OK);
    assert_eq!(json_body(health).await["status"], "healthy");

    let live = app.send(Method::GET, "/health/live", None, None).await;
    assert_eq!(live.status(), StatusCode::OK);

    let response = app.send(Method::GET, "/api/v1/posts", None, None).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert!(response.headers().contains_key("x-request-id"));
}
