use std::future::Future;
use std::pin::Pin;

use anyhow::{Context, Result};
use bytes::Bytes;
use hyper::{Method, Request, StatusCode};
use serde_json::json;
use tracing::debug;

use crate::AppState;
use crate::auth::{IdentityContext, RequestMeta, RolePolicy};
use crate::handlers::http::utils::json_response::{
    HttpResponse, deliver_error_json, deliver_serialized_json,
};
use crate::handlers::http::{admin, auth};

// ---------------------------------------------------------------------------
// Handler type aliases
// ---------------------------------------------------------------------------
//
// Two tiers:
//
//   RouteHandler:   no auth. Receives (req, state).
//                     Use for: /health, login, register, logout, password reset.
//
//   GuardedHandler: token verified and role policy checked by the router.
//                     Receives (req, state, identity).

type HandlerFuture = Pin<Box<dyn Future<Output = Result<HttpResponse>> + Send>>;

type RouteHandler = Box<dyn Fn(Request<Bytes>, AppState) -> HandlerFuture + Send + Sync>;

type GuardedHandler =
    Box<dyn Fn(Request<Bytes>, AppState, IdentityContext) -> HandlerFuture + Send + Sync>;

enum RouteKind {
    Open(RouteHandler),
    Guarded(RolePolicy, GuardedHandler),
}

struct Route {
    method: Method,
    path: String,
    kind: RouteKind,
}

pub struct Router {
    routes: Vec<Route>,
}

impl std::fmt::Debug for Router {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Router")
            .field("routes_count", &self.routes.len())
            .finish()
    }
}

impl Default for Router {
    fn default() -> Self {
        Self::new()
    }
}

impl Router {
    pub fn new() -> Self {
        Self { routes: Vec::new() }
    }

    fn open<F, Fut>(mut self, method: Method, path: &str, handler: F) -> Self
    where
        F: Fn(Request<Bytes>, AppState) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<HttpResponse>> + Send + 'static,
    {
        self.routes.push(Route {
            method,
            path: path.to_string(),
            kind: RouteKind::Open(Box::new(move |req, state| Box::pin(handler(req, state)))),
        });
        self
    }

    fn guarded<F, Fut>(mut self, method: Method, path: &str, policy: RolePolicy, handler: F) -> Self
    where
        F: Fn(Request<Bytes>, AppState, IdentityContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<HttpResponse>> + Send + 'static,
    {
        self.routes.push(Route {
            method,
            path: path.to_string(),
            kind: RouteKind::Guarded(
                policy,
                Box::new(move |req, state, ctx| Box::pin(handler(req, state, ctx))),
            ),
        });
        self
    }

    /// GET with no authentication.
    pub fn get<F, Fut>(self, path: &str, handler: F) -> Self
    where
        F: Fn(Request<Bytes>, AppState) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<HttpResponse>> + Send + 'static,
    {
        self.open(Method::GET, path, handler)
    }

    /// POST with no authentication. Abuse-prone endpoints rate limit themselves.
    pub fn post<F, Fut>(self, path: &str, handler: F) -> Self
    where
        F: Fn(Request<Bytes>, AppState) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<HttpResponse>> + Send + 'static,
    {
        self.open(Method::POST, path, handler)
    }

    /// GET behind token verification and `policy`.
    pub fn get_guarded<F, Fut>(self, path: &str, policy: RolePolicy, handler: F) -> Self
    where
        F: Fn(Request<Bytes>, AppState, IdentityContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<HttpResponse>> + Send + 'static,
    {
        self.guarded(Method::GET, path, policy, handler)
    }

    // ── Dispatch ──────────────────────────────────────────────────────────────

    pub async fn route(&self, req: Request<Bytes>, state: AppState) -> Result<HttpResponse> {
        let method = req.method().clone();
        let path = req.uri().path().to_string();

        let Some(route) = self
            .routes
            .iter()
            .find(|r| r.method == method && Self::path_matches(&r.path, &path))
        else {
            debug!("No route for {} {}", method, path);
            return deliver_error_json("Endpoint not found", StatusCode::NOT_FOUND)
                .context("Failed to deliver 404 response");
        };

        match &route.kind {
            RouteKind::Open(h) => h(req, state).await,

            RouteKind::Guarded(policy, h) => {
                let meta = RequestMeta::new(state.client_ip(&req), path.as_str());

                let ctx = match state.authenticator.authenticate(req.headers(), &meta).await {
                    Ok(ctx) => ctx,
                    Err(rejection) => {
                        return rejection
                            .to_response()
                            .context("Failed to deliver auth rejection");
                    }
                };

                if let Err(rejection) = policy.check(Some(&ctx), &path) {
                    return rejection
                        .to_response()
                        .context("Failed to deliver role rejection");
                }

                h(req, state, ctx).await
            }
        }
    }

    // ── Path matching ─────────────────────────────────────────────────────────

    pub fn path_matches(route_path: &str, request_path: &str) -> bool {
        // Strip query string from incoming request path before comparing.
        let clean = request_path.split('?').next().unwrap_or(request_path);
        let clean = match clean.trim_end_matches('/') {
            "" => "/",
            trimmed => trimmed,
        };

        if route_path == clean {
            return true;
        }

        // Segment-by-segment matching for `:param` wildcards.
        let route_segs: Vec<&str> = route_path.split('/').collect();
        let path_segs: Vec<&str> = clean.split('/').collect();

        if route_segs.len() != path_segs.len() {
            return false;
        }

        route_segs
            .iter()
            .zip(path_segs.iter())
            .all(|(r, p)| (r.starts_with(':') && !p.is_empty()) || r == p)
    }
}

// ---------------------------------------------------------------------------
// Application router
//
// Auth tier is enforced here at the routing level. Handlers behind a guard
// receive the verified identity and MUST NOT repeat the check.
// ---------------------------------------------------------------------------

pub fn build_router() -> Router {
    Router::new()
        .get("/health", |_req, _state| async move {
            deliver_serialized_json(&json!({"success": true, "status": "ok"}), StatusCode::OK)
        })
        // ── Public: rate limited inside the handler ──────────────────────────
        .post("/api/auth/login", |req, state| async move {
            auth::handle_login(req, state).await.context("Login failed")
        })
        .post("/api/auth/register", |req, state| async move {
            auth::handle_register(req, state)
                .await
                .context("Registration failed")
        })
        .post("/api/auth/password-reset", |req, state| async move {
            auth::handle_password_reset(req, state)
                .await
                .context("Password reset failed")
        })
        .post("/api/auth/logout", |req, state| async move {
            auth::handle_logout(req, state).await.context("Logout failed")
        })
        // ── Guarded ──────────────────────────────────────────────────────────
        .get_guarded(
            "/api/auth/me",
            RolePolicy::Authenticated,
            |req, state, ctx| async move { auth::handle_me(req, state, ctx).await },
        )
        .get_guarded(
            "/api/admin/stats",
            RolePolicy::AdminOrModerator,
            |req, state, ctx| async move {
                admin::handle_stats(req, state, ctx)
                    .await
                    .context("Admin stats failed")
            },
        )
        .get_guarded(
            "/api/admin/users",
            RolePolicy::AdminOnly,
            |req, state, ctx| async move {
                admin::handle_list_users(req, state, ctx)
                    .await
                    .context("Admin user listing failed")
            },
        )
}
