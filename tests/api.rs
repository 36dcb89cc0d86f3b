//! End-to-end tests of the admin and portal routers

use std::sync::Arc;

use axum::http::{header, HeaderValue, StatusCode};
use axum_test::{TestResponse, TestServer};
use serde_json::{json, Value};
use tempfile::TempDir;

use heritage::{
    api::{build_router, AppState},
    cache::create_cache,
    config::{Config, SeedConfig},
    db::{
        create_test_pool,
        migrations::run_migrations,
        repositories::{
            SqlxFavoriteRepository, SqlxFlagRepository, SqlxImageRepository,
            SqlxModificationRepository, SqlxReviewRepository, SqlxRoleRepository,
            SqlxSessionRepository, SqlxSiteRepository, SqlxTagRepository, SqlxUserRepository,
        },
        seeds::run_seeds,
    },
    services::{
        FlagService, GoogleAuthService, ImageService, ReviewService, SiteService, TagService,
        TokenService, UserService,
    },
    storage::LocalStorage,
    views::Views,
};

const ADMIN_EMAIL: &str = "admin@example.com";
const ADMIN_PASSWORD: &str = "supersecret";

struct TestApp {
    server: TestServer,
    _uploads: TempDir,
}

async fn setup() -> TestApp {
    let uploads = TempDir::new().unwrap();

    let mut config = Config::default();
    config.storage.path = uploads.path().to_path_buf();
    config.seed = SeedConfig {
        admin_email: Some(ADMIN_EMAIL.to_string()),
        admin_password: Some(ADMIN_PASSWORD.to_string()),
    };

    let pool = create_test_pool().await.unwrap();
    run_migrations(&pool).await.unwrap();
    run_seeds(&pool, &config.seed).await.unwrap();
    let cache = create_cache(&config.cache).await.unwrap();

    let site_repo = SqlxSiteRepository::boxed(pool.clone());
    let tag_repo = SqlxTagRepository::boxed(pool.clone());
    let image_repo = SqlxImageRepository::boxed(pool.clone());
    let review_repo = SqlxReviewRepository::boxed(pool.clone());

    let state = AppState {
        user_service: Arc::new(UserService::new(
            SqlxUserRepository::boxed(pool.clone()),
            SqlxRoleRepository::boxed(pool.clone()),
            SqlxSessionRepository::boxed(pool.clone()),
        )),
        site_service: Arc::new(
            SiteService::new(
                site_repo.clone(),
                tag_repo.clone(),
                image_repo.clone(),
                review_repo.clone(),
                SqlxModificationRepository::boxed(pool.clone()),
                SqlxFavoriteRepository::boxed(pool.clone()),
            )
            .with_cache(cache.clone()),
        ),
        tag_service: Arc::new(TagService::new(tag_repo).with_cache(cache.clone())),
        flag_service: Arc::new(FlagService::new(
            SqlxFlagRepository::boxed(pool.clone()),
            cache,
        )),
        image_service: Arc::new(ImageService::new(
            image_repo,
            site_repo.clone(),
            LocalStorage::boxed(&config.storage),
            config.storage.clone(),
        )),
        review_service: Arc::new(ReviewService::new(review_repo, site_repo)),
        tokens: Arc::new(TokenService::from_config(&config.auth)),
        google: Arc::new(GoogleAuthService::new(config.google.clone()).unwrap()),
        views: Arc::new(Views::new().unwrap()),
        config: Arc::new(config),
    };

    let server = TestServer::new(build_router(state).unwrap()).unwrap();
    TestApp {
        server,
        _uploads: uploads,
    }
}

/// Value of the cookie `name` set by `response`
fn response_cookie(response: &TestResponse, name: &str) -> Option<String> {
    let prefix = format!("{}=", name);
    response
        .headers()
        .get_all(header::SET_COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .find_map(|value| {
            value
                .strip_prefix(&prefix)
                .map(|rest| rest.split(';').next().unwrap_or_default().to_string())
        })
}

fn cookie_header(name: &str, value: &str) -> HeaderValue {
    HeaderValue::from_str(&format!("{}={}", name, value)).unwrap()
}

async fn admin_session(app: &TestApp, email: &str, password: &str) -> HeaderValue {
    let response = app
        .server
        .post("/admin/auth/login")
        .json(&json!({ "email": email, "password": password }))
        .await;
    assert_eq!(response.status_code(), StatusCode::OK);
    let session = response_cookie(&response, "session").expect("session cookie");
    cookie_header("session", &session)
}

async fn portal_token(app: &TestApp, email: &str, password: &str) -> HeaderValue {
    let response = app
        .server
        .post("/api/auth")
        .json(&json!({ "email": email, "password": password }))
        .await;
    assert_eq!(response.status_code(), StatusCode::CREATED);
    let token = response_cookie(&response, "access_token_cookie").expect("jwt cookie");
    cookie_header("access_token_cookie", &token)
}

/// Create an editor through the admin API and return its session
async fn editor_session(app: &TestApp, admin: &HeaderValue) -> HeaderValue {
    let roles: Value = app
        .server
        .get("/admin/roles")
        .add_header(header::COOKIE, admin.clone())
        .await
        .json();
    let editor_role = roles
        .as_array()
        .unwrap()
        .iter()
        .find(|role| role["name"] == "editor")
        .unwrap()["id"]
        .clone();

    let response = app
        .server
        .post("/admin/users")
        .add_header(header::COOKIE, admin.clone())
        .json(&json!({
            "email": "editor@example.com",
            "name": "Eda",
            "last_name": "Editor",
            "password": "editor-pass",
            "role_id": editor_role,
        }))
        .await;
    assert_eq!(response.status_code(), StatusCode::CREATED);

    admin_session(app, "editor@example.com", "editor-pass").await
}

async fn set_flag(app: &TestApp, admin: &HeaderValue, name: &str, enabled: bool, message: Option<&str>) {
    let flags: Value = app
        .server
        .get("/admin/feature-flags")
        .add_header(header::COOKIE, admin.clone())
        .await
        .json();
    let flag_id = flags
        .as_array()
        .unwrap()
        .iter()
        .find(|flag| flag["name"] == name)
        .unwrap()["id"]
        .as_i64()
        .unwrap();

    let response = app
        .server
        .put(&format!("/admin/feature-flags/{}", flag_id))
        .add_header(header::COOKIE, admin.clone())
        .json(&json!({ "enabled": enabled, "maintenance_message": message }))
        .await;
    assert_eq!(response.status_code(), StatusCode::OK);
}

#[tokio::test]
async fn test_make_coffee() {
    let app = setup().await;

    let response = app.server.get("/api/make_coffee").await;
    assert_eq!(response.status_code(), StatusCode::IM_A_TEAPOT);
    let body: Value = response.json();
    assert_eq!(body["error"]["code"], "im_a_teapot");
}

#[tokio::test]
async fn test_empty_site_collection() {
    let app = setup().await;

    let response = app.server.get("/api/sites").await;
    assert_eq!(response.status_code(), StatusCode::OK);

    let body: Value = response.json();
    assert_eq!(body["data"], json!([]));
    assert_eq!(body["_meta"]["page"], 1);
    assert_eq!(body["_meta"]["per_page"], 10);
    assert_eq!(body["_meta"]["total_items"], 0);
    assert_eq!(body["_links"]["self"], "/api/sites?page=1&per_page=10");
    assert!(body["_links"]["next"].is_null());
    assert!(body["_links"]["prev"].is_null());
}

#[tokio::test]
async fn test_invalid_site_query() {
    let app = setup().await;

    let response = app.server.get("/api/sites?lat=north&page=0").await;
    assert_eq!(response.status_code(), StatusCode::BAD_REQUEST);

    let body: Value = response.json();
    assert_eq!(body["error"]["code"], "invalid_query");
    assert_eq!(body["error"]["message"], "Parameter validation failed");
    assert!(body["error"]["details"]["lat"].is_array());
    assert!(body["error"]["details"]["page"].is_array());
}

#[tokio::test]
async fn test_unknown_route_is_json_404() {
    let app = setup().await;

    let response = app.server.get("/api/nowhere").await;
    assert_eq!(response.status_code(), StatusCode::NOT_FOUND);
    let body: Value = response.json();
    assert_eq!(body["error"]["code"], "not_found");
}

#[tokio::test]
async fn test_portal_login() {
    let app = setup().await;

    let response = app
        .server
        .post("/api/auth")
        .json(&json!({ "email": ADMIN_EMAIL, "password": "wrong-password" }))
        .await;
    assert_eq!(response.status_code(), StatusCode::UNAUTHORIZED);
    let body: Value = response.json();
    assert_eq!(body["error"]["code"], "invalid_credentials");

    let response = app
        .server
        .post("/api/auth")
        .json(&json!({ "email": ADMIN_EMAIL, "password": ADMIN_PASSWORD }))
        .await;
    assert_eq!(response.status_code(), StatusCode::CREATED);
    let token = response_cookie(&response, "access_token_cookie").expect("jwt cookie");
    assert!(!token.is_empty());

    let response = app
        .server
        .get("/api/me")
        .add_header(header::COOKIE, cookie_header("access_token_cookie", &token))
        .await;
    assert_eq!(response.status_code(), StatusCode::OK);
    let body: Value = response.json();
    assert_eq!(body["email"], ADMIN_EMAIL);
}

#[tokio::test]
async fn test_profile_requires_token() {
    let app = setup().await;

    let response = app.server.get("/api/me").await;
    assert_eq!(response.status_code(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_admin_login_and_me() {
    let app = setup().await;

    let response = app
        .server
        .post("/admin/auth/login")
        .json(&json!({ "email": ADMIN_EMAIL, "password": "nope-nope" }))
        .await;
    assert_eq!(response.status_code(), StatusCode::UNAUTHORIZED);

    let session = admin_session(&app, ADMIN_EMAIL, ADMIN_PASSWORD).await;
    let response = app
        .server
        .get("/admin/auth/me")
        .add_header(header::COOKIE, session.clone())
        .await;
    assert_eq!(response.status_code(), StatusCode::OK);
    let body: Value = response.json();
    assert_eq!(body["user"]["email"], ADMIN_EMAIL);
    assert!(body["permissions"]
        .as_array()
        .unwrap()
        .contains(&json!("delete_site")));

    let response = app
        .server
        .post("/admin/auth/logout")
        .add_header(header::COOKIE, session.clone())
        .await;
    assert_eq!(response.status_code(), StatusCode::OK);

    let response = app
        .server
        .get("/admin/auth/me")
        .add_header(header::COOKIE, session)
        .await;
    assert_eq!(response.status_code(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_editor_cannot_delete_sites() {
    let app = setup().await;
    let admin = admin_session(&app, ADMIN_EMAIL, ADMIN_PASSWORD).await;
    let editor = editor_session(&app, &admin).await;

    let response = app
        .server
        .delete("/admin/sites/1")
        .add_header(header::COOKIE, editor.clone())
        .await;
    assert_eq!(response.status_code(), StatusCode::FORBIDDEN);
    let body: Value = response.json();
    assert_eq!(body["error"]["code"], "forbidden");

    // listing is part of the editor role
    let response = app
        .server
        .get("/admin/sites")
        .add_header(header::COOKIE, editor)
        .await;
    assert_eq!(response.status_code(), StatusCode::OK);
}

#[tokio::test]
async fn test_create_site_validation() {
    let app = setup().await;
    let admin = admin_session(&app, ADMIN_EMAIL, ADMIN_PASSWORD).await;

    let response = app
        .server
        .post("/admin/sites")
        .add_header(header::COOKIE, admin)
        .json(&json!({ "name": "" }))
        .await;
    assert_eq!(response.status_code(), StatusCode::BAD_REQUEST);
    let body: Value = response.json();
    assert_eq!(body["error"]["code"], "invalid_data");
    assert!(body["error"]["details"]["name"].is_array());
}

#[tokio::test]
async fn test_portal_maintenance() {
    let app = setup().await;
    let admin = admin_session(&app, ADMIN_EMAIL, ADMIN_PASSWORD).await;

    set_flag(&app, &admin, "portal_maintenance_mode", true, Some("Back soon")).await;
    let flags: Value = app
        .server
        .get("/admin/feature-flags")
        .add_header(header::COOKIE, admin)
        .await
        .json();
    let flag = flags
        .as_array()
        .unwrap()
        .iter()
        .find(|flag| flag["name"] == "portal_maintenance_mode")
        .unwrap();
    assert_eq!(flag["enabled"], true);
    assert_eq!(flag["modified_by"], ADMIN_EMAIL);

    let response = app.server.get("/api/sites").await;
    assert_eq!(response.status_code(), StatusCode::SERVICE_UNAVAILABLE);
    let body: Value = response.json();
    assert_eq!(body["error"]["message"], "Back soon");

    // the portal can still read the flags to show the banner
    let response = app.server.get("/api/flags").await;
    assert_eq!(response.status_code(), StatusCode::OK);
    let body: Value = response.json();
    assert_eq!(body["portal_maintenance"], true);
    assert_eq!(body["portal_maintenance_message"], "Back soon");
}

#[tokio::test]
async fn test_default_portal_flags() {
    let app = setup().await;

    let response = app.server.get("/api/flags").await;
    assert_eq!(response.status_code(), StatusCode::OK);
    let body: Value = response.json();
    assert_eq!(body["portal_maintenance"], false);
}

#[tokio::test]
async fn test_admin_maintenance() {
    let app = setup().await;
    let admin = admin_session(&app, ADMIN_EMAIL, ADMIN_PASSWORD).await;
    let editor = editor_session(&app, &admin).await;

    set_flag(&app, &admin, "admin_maintenance_mode", true, Some("Upgrading the panel")).await;

    let response = app
        .server
        .get("/admin/users")
        .add_header(header::COOKIE, editor.clone())
        .await;
    assert_eq!(response.status_code(), StatusCode::SERVICE_UNAVAILABLE);
    let body: Value = response.json();
    assert_eq!(body["error"]["code"], "maintenance");
    assert_eq!(body["error"]["message"], "Upgrading the panel");

    // flags stay reachable for system administrators only
    let response = app
        .server
        .get("/admin/feature-flags")
        .add_header(header::COOKIE, admin.clone())
        .await;
    assert_eq!(response.status_code(), StatusCode::OK);
    let response = app
        .server
        .get("/admin/feature-flags")
        .add_header(header::COOKIE, editor.clone())
        .await;
    assert_eq!(response.status_code(), StatusCode::SERVICE_UNAVAILABLE);

    // login keeps working
    admin_session(&app, "editor@example.com", "editor-pass").await;

    let response = app
        .server
        .get("/admin/users")
        .add_header(header::COOKIE, editor)
        .add_header(header::ACCEPT, HeaderValue::from_static("text/html"))
        .await;
    assert_eq!(response.status_code(), StatusCode::SERVICE_UNAVAILABLE);
    let content_type = response.headers().get(header::CONTENT_TYPE).unwrap();
    assert!(content_type.to_str().unwrap().starts_with("text/html"));
    assert!(response.text().contains("Upgrading the panel"));

    set_flag(&app, &admin, "admin_maintenance_mode", false, None).await;
    let response = app
        .server
        .get("/admin/users")
        .add_header(header::COOKIE, admin)
        .await;
    assert_eq!(response.status_code(), StatusCode::OK);
}

#[tokio::test]
async fn test_reviews_gate() {
    let app = setup().await;
    let admin = admin_session(&app, ADMIN_EMAIL, ADMIN_PASSWORD).await;
    let token = portal_token(&app, ADMIN_EMAIL, ADMIN_PASSWORD).await;
    let review = json!({ "rating": 5, "comment": "Una visita guiada excelente y muy completa" });

    // reviews start disabled
    let response = app
        .server
        .post("/api/sites/1/reviews")
        .add_header(header::COOKIE, token.clone())
        .json(&review)
        .await;
    assert_eq!(response.status_code(), StatusCode::SERVICE_UNAVAILABLE);
    let body: Value = response.json();
    assert_eq!(body["error"]["code"], "service_unavailable");
    assert_eq!(body["error"]["message"], "The reviews are temporarily disabled");

    let response = app
        .server
        .delete("/api/sites/1/reviews/1")
        .add_header(header::COOKIE, token.clone())
        .await;
    assert_eq!(response.status_code(), StatusCode::SERVICE_UNAVAILABLE);
    let body: Value = response.json();
    assert_eq!(body["error"]["code"], "service_unavailable");

    set_flag(&app, &admin, "reviews_enabled", true, None).await;

    let response = app
        .server
        .post("/api/sites/1/reviews")
        .add_header(header::COOKIE, token.clone())
        .json(&review)
        .await;
    assert_eq!(response.status_code(), StatusCode::NOT_FOUND);

    let response = app
        .server
        .delete("/api/sites/1/reviews/1")
        .add_header(header::COOKIE, token)
        .await;
    assert_eq!(response.status_code(), StatusCode::NOT_FOUND);
}
