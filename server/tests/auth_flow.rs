//! End-to-end checks that drive the application router with in-memory
//! requests: token sources, role tiers, login/registration and rate limits.

use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;

use bytes::Bytes;
use http_body_util::BodyExt;
use hyper::{Method, Request, StatusCode, header};
use serde_json::Value;
use tempfile::TempDir;

use server::AppState;
use server::database::utils::{get_timestamp, hash_password};
use server::database::{SqliteUserDirectory, UserDirectory};
use server::handlers::http::utils::json_response::HttpResponse;
use server::handlers::http::{Router, build_router};
use shared::types::claims::{Claims, Role};
use shared::types::server_config::{AppConfig, AppEnv, SeedUser};

const SECRET: &str = "integration-test-secret-0123456789abcdef";
const ADMIN_PASSWORD: &str = "admin-pass-123";

struct Harness {
    router: Router,
    state: AppState,
    config: AppConfig,
    _dir: TempDir,
}

impl Harness {
    async fn new() -> Self {
        Self::with_trusted_proxies(&[]).await
    }

    async fn with_trusted_proxies(proxies: &[&str]) -> Self {
        let dir = TempDir::new().unwrap();

        let mut config = AppConfig::default();
        config.auth.jwt_secret = Some(SECRET.to_string());
        config.rate_limit.store_path = dir.path().join("rate_limits.json");
        config.database.path = dir.path().join("users.db");
        config.server.trusted_proxies = proxies.iter().map(|p| p.parse().unwrap()).collect();

        let hash = hash_password(ADMIN_PASSWORD).unwrap();
        config.auth.seed_users = [
            (1, "admin@example.com", Role::Admin),
            (2, "mod@example.com", Role::Moderator),
            (3, "user@example.com", Role::User),
        ]
        .into_iter()
        .map(|(id, email, role)| SeedUser {
            id,
            email: email.to_string(),
            password_hash: hash.clone(),
            role,
        })
        .collect();

        let users = SqliteUserDirectory::open(&config.database.path).await.unwrap();
        users.seed(&config.auth.seed_users).await.unwrap();

        let state =
            AppState::from_parts(config.clone(), Arc::new(users), AppEnv::Production).unwrap();

        Self {
            router: build_router(),
            state,
            config,
            _dir: dir,
        }
    }

    async fn send(&self, req: Request<Bytes>) -> (StatusCode, http::HeaderMap, Value) {
        send_to(&self.router, &self.state, req).await
    }

    fn token(&self, user_id: i64, role: Role, exp_offset: i64) -> String {
        self.state
            .signer
            .issue(&Claims::new(user_id, None, role, get_timestamp() + exp_offset))
            .unwrap()
    }
}

async fn send_to(
    router: &Router,
    state: &AppState,
    req: Request<Bytes>,
) -> (StatusCode, http::HeaderMap, Value) {
    let res: HttpResponse = router.route(req, state.clone()).await.unwrap();
    let status = res.status();
    let headers = res.headers().clone();
    let bytes = res.into_body().collect().await.unwrap().to_bytes();
    let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, headers, body)
}

/// Socket address the connection loop would attach for a client at `ip`.
fn peer(ip: &str) -> SocketAddr {
    SocketAddr::new(ip.parse::<IpAddr>().unwrap(), 40_000)
}

fn get(path: &str) -> http::request::Builder {
    Request::builder()
        .method(Method::GET)
        .uri(path)
        .extension(peer("203.0.113.7"))
}

fn post_json(path: &str, body: Value, ip: &str) -> Request<Bytes> {
    Request::builder()
        .method(Method::POST)
        .uri(path)
        .header("content-type", "application/json")
        .extension(peer(ip))
        .body(Bytes::from(body.to_string()))
        .unwrap()
}

fn forwarded_login(password: &str, peer_ip: &str, forwarded_for: &str) -> Request<Bytes> {
    Request::builder()
        .method(Method::POST)
        .uri("/api/auth/login")
        .header("content-type", "application/json")
        .header("x-forwarded-for", forwarded_for)
        .extension(peer(peer_ip))
        .body(Bytes::from(
            login_body("admin@example.com", password).to_string(),
        ))
        .unwrap()
}

fn login_body(email: &str, password: &str) -> Value {
    serde_json::json!({ "email": email, "password": password })
}

#[tokio::test]
async fn health_is_open() {
    let h = Harness::new().await;
    let (status, _, body) = h.send(get("/health").body(Bytes::new()).unwrap()).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
}

#[tokio::test]
async fn unknown_route_is_404() {
    let h = Harness::new().await;
    let (status, _, body) = h.send(get("/api/nope").body(Bytes::new()).unwrap()).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["success"], false);
    assert_eq!(body["message"], "Endpoint not found");
}

#[tokio::test]
async fn no_credentials_is_401_authentication_required() {
    let h = Harness::new().await;
    let (status, headers, body) = h.send(get("/api/auth/me").body(Bytes::new()).unwrap()).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(headers[header::CONTENT_TYPE], "application/json");
    assert_eq!(body, serde_json::json!({"success": false, "message": "Authentication required"}));
}

#[tokio::test]
async fn bad_or_expired_token_is_401_invalid() {
    let h = Harness::new().await;

    let req = get("/api/auth/me")
        .header("authorization", "Bearer garbage")
        .body(Bytes::new())
        .unwrap();
    let (status, _, body) = h.send(req).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["message"], "Invalid or expired token");

    let expired = h.token(1, Role::Admin, -1);
    let req = get("/api/auth/me")
        .header("authorization", format!("Bearer {}", expired))
        .body(Bytes::new())
        .unwrap();
    let (status, _, body) = h.send(req).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["message"], "Invalid or expired token");
}

#[tokio::test]
async fn login_then_me_with_bearer_and_cookies() {
    let h = Harness::new().await;

    let (status, headers, body) = h
        .send(post_json(
            "/api/auth/login",
            login_body("Admin@Example.com", ADMIN_PASSWORD),
            "198.51.100.1",
        ))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);
    assert_eq!(body["user"]["role"], "admin");
    assert_eq!(body["expires_in"], 3600);

    let token = body["token"].as_str().unwrap().to_string();
    let cookie = headers[header::SET_COOKIE].to_str().unwrap();
    assert!(cookie.starts_with(&format!("auth_token={}", token)));
    assert!(cookie.contains("HttpOnly"));

    for (name, value) in [
        ("authorization", format!("Bearer {}", token)),
        ("cookie", format!("auth_token={}", token)),
        ("cookie", format!("jwt={}", token)),
    ] {
        let req = get("/api/auth/me").header(name, value).body(Bytes::new()).unwrap();
        let (status, _, me) = h.send(req).await;
        assert_eq!(status, StatusCode::OK, "via {}", name);
        assert_eq!(me["user"]["user_id"], 1);
        assert_eq!(me["user"]["email"], "admin@example.com");
        assert_eq!(me["user"]["role"], "admin");
    }
}

#[tokio::test]
async fn wrong_password_and_unknown_user_look_the_same() {
    let h = Harness::new().await;

    let (status, _, wrong) = h
        .send(post_json(
            "/api/auth/login",
            login_body("admin@example.com", "not-it-123"),
            "198.51.100.2",
        ))
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _, unknown) = h
        .send(post_json(
            "/api/auth/login",
            login_body("ghost@example.com", "not-it-123"),
            "198.51.100.2",
        ))
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(wrong, unknown);
    assert_eq!(wrong["success"], false);
}

#[tokio::test]
async fn form_login_is_accepted() {
    let h = Harness::new().await;
    let req = Request::builder()
        .method(Method::POST)
        .uri("/api/auth/login")
        .header("content-type", "application/x-www-form-urlencoded")
        .extension(peer("198.51.100.3"))
        .body(Bytes::from(format!(
            "email=mod%40example.com&password={}&remember_me=on",
            ADMIN_PASSWORD
        )))
        .unwrap();
    let (status, headers, body) = h.send(req).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["user"]["role"], "moderator");
    assert!(headers[header::SET_COOKIE].to_str().unwrap().contains("Max-Age=3600"));
}

#[tokio::test]
async fn role_tiers_gate_admin_routes() {
    let h = Harness::new().await;

    let cases = [
        ("/api/admin/stats", Role::User, StatusCode::FORBIDDEN, Some("Administrator rights required")),
        ("/api/admin/stats", Role::Moderator, StatusCode::OK, None),
        ("/api/admin/stats", Role::Admin, StatusCode::OK, None),
        ("/api/admin/users", Role::User, StatusCode::FORBIDDEN, Some("Administrators only")),
        ("/api/admin/users", Role::Moderator, StatusCode::FORBIDDEN, Some("Administrators only")),
        ("/api/admin/users", Role::Admin, StatusCode::OK, None),
        ("/api/auth/me", Role::User, StatusCode::OK, None),
    ];

    for (path, role, expected, message) in cases {
        let req = get(path)
            .header("authorization", format!("Bearer {}", h.token(9, role, 600)))
            .body(Bytes::new())
            .unwrap();
        let (status, _, body) = h.send(req).await;
        assert_eq!(status, expected, "{} as {}", path, role);
        if let Some(message) = message {
            assert_eq!(body["success"], false);
            assert_eq!(body["message"], message);
        }
    }
}

#[tokio::test]
async fn admin_user_listing_hides_hashes() {
    let h = Harness::new().await;
    let req = get("/api/admin/users")
        .header("authorization", format!("Bearer {}", h.token(1, Role::Admin, 600)))
        .body(Bytes::new())
        .unwrap();
    let (status, _, body) = h.send(req).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["users"].as_array().unwrap().len(), 3);
    assert!(!body.to_string().contains("argon2"));
}

#[tokio::test]
async fn admin_stats_counts_roles() {
    let h = Harness::new().await;
    let req = get("/api/admin/stats")
        .header("authorization", format!("Bearer {}", h.token(2, Role::Moderator, 600)))
        .body(Bytes::new())
        .unwrap();
    let (_, _, body) = h.send(req).await;
    assert_eq!(body["data"]["users"]["total"], 3);
    assert_eq!(body["data"]["users"]["admins"], 1);
    assert_eq!(body["data"]["rate_limit"]["max_attempts"], 5);
}

#[tokio::test]
async fn sixth_login_from_same_origin_is_429() {
    let h = Harness::new().await;
    let ip = "192.0.2.50";

    for _ in 0..5 {
        let (status, _, _) = h
            .send(post_json("/api/auth/login", login_body("admin@example.com", "wrong-123"), ip))
            .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    let (status, headers, body) = h
        .send(post_json(
            "/api/auth/login",
            login_body("admin@example.com", ADMIN_PASSWORD),
            ip,
        ))
        .await;
    assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
    assert!(headers.contains_key(header::RETRY_AFTER));
    assert_eq!(body["message"], "Too many attempts, please try again later");

    // Another origin and another action are unaffected.
    let (status, _, _) = h
        .send(post_json(
            "/api/auth/login",
            login_body("admin@example.com", ADMIN_PASSWORD),
            "192.0.2.51",
        ))
        .await;
    assert_eq!(status, StatusCode::OK);

    let (status, _, _) = h
        .send(post_json(
            "/api/auth/password-reset",
            serde_json::json!({"email": "admin@example.com"}),
            ip,
        ))
        .await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn register_creates_user_role_account() {
    let h = Harness::new().await;

    let (status, headers, body) = h
        .send(post_json(
            "/api/auth/register",
            serde_json::json!({"email": "New@Example.com", "password": "password123"}),
            "192.0.2.60",
        ))
        .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["user"]["role"], "user");
    assert_eq!(body["user"]["email"], "new@example.com");
    assert!(headers.contains_key(header::SET_COOKIE));

    let token = body["token"].as_str().unwrap();
    let req = get("/api/auth/me")
        .header("authorization", format!("Bearer {}", token))
        .body(Bytes::new())
        .unwrap();
    let (status, _, me) = h.send(req).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(me["user"]["role"], "user");
    assert!(
        h.state
            .users
            .find_user_by_email("new@example.com")
            .await
            .unwrap()
            .is_some()
    );

    let (status, _, body) = h
        .send(post_json(
            "/api/auth/register",
            serde_json::json!({"email": "new@example.com", "password": "password123"}),
            "192.0.2.60",
        ))
        .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["success"], false);
}

#[tokio::test]
async fn register_rejects_weak_password() {
    let h = Harness::new().await;
    let (status, _, body) = h
        .send(post_json(
            "/api/auth/register",
            serde_json::json!({"email": "x@example.com", "password": "short"}),
            "192.0.2.61",
        ))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["success"], false);
}

#[tokio::test]
async fn logout_expires_both_cookies() {
    let h = Harness::new().await;
    let (status, headers, _) = h
        .send(post_json("/api/auth/logout", Value::Null, "192.0.2.70"))
        .await;
    assert_eq!(status, StatusCode::OK);

    let cookies: Vec<&str> = headers
        .get_all(header::SET_COOKIE)
        .iter()
        .map(|v| v.to_str().unwrap())
        .collect();
    assert_eq!(cookies.len(), 2);
    assert!(cookies.iter().any(|c| c.starts_with("auth_token=; Max-Age=0")));
    assert!(cookies.iter().any(|c| c.starts_with("jwt=; Max-Age=0")));
}

#[tokio::test]
async fn password_reset_reply_is_generic() {
    let h = Harness::new().await;

    let (_, _, known) = h
        .send(post_json(
            "/api/auth/password-reset",
            serde_json::json!({"email": "user@example.com"}),
            "192.0.2.80",
        ))
        .await;
    let (status, _, unknown) = h
        .send(post_json(
            "/api/auth/password-reset",
            serde_json::json!({"email": "ghost@example.com"}),
            "192.0.2.80",
        ))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(known, unknown);
}

#[tokio::test]
async fn test_header_is_inert_without_bypass() {
    let h = Harness::new().await;
    let req = get("/api/auth/me")
        .header("x-test-user-id", "1")
        .body(Bytes::new())
        .unwrap();
    let (status, _, _) = h.send(req).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn rotating_forwarded_for_does_not_reset_login_limit() {
    let h = Harness::new().await;

    for i in 0..5 {
        let req = forwarded_login("wrong-123", "198.51.100.9", &format!("10.9.9.{}", i));
        let (status, _, _) = h.send(req).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED, "attempt {}", i + 1);
    }

    let req = forwarded_login(ADMIN_PASSWORD, "198.51.100.9", "10.9.9.250");
    let (status, headers, _) = h.send(req).await;
    assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
    assert!(headers.contains_key(header::RETRY_AFTER));
}

#[tokio::test]
async fn trusted_proxy_forwards_client_origin() {
    let h = Harness::with_trusted_proxies(&["127.0.0.1"]).await;

    for _ in 0..5 {
        let (status, _, _) = h
            .send(forwarded_login("wrong-123", "127.0.0.1", "192.0.2.90"))
            .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }
    let (status, _, _) = h
        .send(forwarded_login(ADMIN_PASSWORD, "127.0.0.1", "192.0.2.90"))
        .await;
    assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);

    // A different client behind the same proxy has its own window.
    let (status, _, _) = h
        .send(forwarded_login(ADMIN_PASSWORD, "127.0.0.1", "192.0.2.91"))
        .await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn registered_account_survives_restart() {
    let h = Harness::new().await;

    let (status, _, _) = h
        .send(post_json(
            "/api/auth/register",
            serde_json::json!({"email": "keep@example.com", "password": "password123"}),
            "192.0.2.100",
        ))
        .await;
    assert_eq!(status, StatusCode::CREATED);

    // Fresh state over the same database file, as after a process restart.
    let restarted = AppState::from_config(h.config.clone()).await.unwrap();
    let router = build_router();

    let (status, _, body) = send_to(
        &router,
        &restarted,
        post_json(
            "/api/auth/login",
            login_body("keep@example.com", "password123"),
            "192.0.2.101",
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["user"]["role"], "user");

    let users = restarted.users.list_users().await.unwrap();
    assert_eq!(users.len(), 4);
}
