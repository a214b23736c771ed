//! HTTP server implementation using Axum.

use axum::extract::{DefaultBodyLimit, Request, State};
use axum::http::HeaderMap;
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use axum::{
    Router,
    routing::{get, post, put},
};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use workplanner_core::config::GatewayConfig;
use workplanner_core::{Identity, Role};
use workplanner_engine::{
    BroadcastPublisher, EventPublisher, FeedbackBox, Leaderboard, MotivationBoard, NullPublisher,
    PlannerDb, PollEngine, ScheduleManager,
};

use crate::api::ApiError;

pub const HEADER_USER_ID: &str = "x-user-id";
pub const HEADER_USER_ROLE: &str = "x-user-role";
pub const HEADER_USER_DEPARTMENT: &str = "x-user-department";
pub const HEADER_USER_NAME: &str = "x-user-name";
pub const HEADER_USER_EMAIL: &str = "x-user-email";

/// Shared state for the gateway server.
pub struct AppState {
    pub config: GatewayConfig,
    pub db: Arc<PlannerDb>,
    pub schedules: ScheduleManager,
    pub polls: PollEngine,
    pub motivation: MotivationBoard,
    pub feedback: FeedbackBox,
    pub leaderboard: Leaderboard,
    /// `None` when the realtime channel is disabled.
    pub realtime: Option<Arc<BroadcastPublisher>>,
    pub start_time: std::time::Instant,
}

impl AppState {
    pub fn new(
        config: GatewayConfig,
        db: Arc<PlannerDb>,
        realtime: Option<Arc<BroadcastPublisher>>,
    ) -> Self {
        let publisher: Arc<dyn EventPublisher> = match &realtime {
            Some(broadcast) => broadcast.clone() as Arc<dyn EventPublisher>,
            None => Arc::new(NullPublisher),
        };
        Self {
            config,
            schedules: ScheduleManager::new(db.clone()),
            polls: PollEngine::new(db.clone(), publisher),
            motivation: MotivationBoard::new(db.clone()),
            feedback: FeedbackBox::new(db.clone()),
            leaderboard: Leaderboard::new(db.clone()),
            db,
            realtime,
            start_time: std::time::Instant::now(),
        }
    }
}

fn header<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
}

/// Build the caller identity from the headers set by the upstream auth proxy.
pub fn identity_from_headers(headers: &HeaderMap) -> Result<Identity, ApiError> {
    let user_id = header(headers, HEADER_USER_ID)
        .ok_or_else(|| ApiError::Unauthorized("Not authorized, no user identity".into()))?;
    let role = match header(headers, HEADER_USER_ROLE) {
        Some(raw) => raw.parse::<Role>().map_err(ApiError::Unauthorized)?,
        None => Role::Worker,
    };
    let department = header(headers, HEADER_USER_DEPARTMENT).unwrap_or_default();
    let mut identity = Identity::new(user_id, department, role);
    if let Some(name) = header(headers, HEADER_USER_NAME) {
        identity.name = name.to_string();
    }
    if let Some(email) = header(headers, HEADER_USER_EMAIL) {
        identity.email = email.to_string();
    }
    Ok(identity)
}

/// Identity middleware: resolves the caller, records them in the user
/// directory and hands the [`Identity`] to the handler as an extension.
async fn require_identity(State(state): State<Arc<AppState>>, mut req: Request, next: Next) -> Response {
    let identity = match identity_from_headers(req.headers()) {
        Ok(identity) => identity,
        Err(e) => return e.into_response(),
    };
    if let Err(e) = state.db.upsert_user(&identity) {
        return ApiError::from(e).into_response();
    }
    req.extensions_mut().insert(identity);
    next.run(req).await
}

/// Build the Axum router with all routes.
pub fn build_router(state: AppState) -> Router {
    build_router_from_arc(Arc::new(state))
}

pub fn build_router_from_arc(shared: Arc<AppState>) -> Router {
    use crate::routes;

    let protected = Router::new()
        .route("/api/auth/me", get(routes::auth_me))
        // Schedules
        .route(
            "/api/schedules",
            get(routes::list_schedules).post(routes::upsert_schedule),
        )
        .route("/api/schedules/team", get(routes::team_schedules))
        .route("/api/schedules/current-week", get(routes::current_week))
        .route("/api/schedules/cycle", post(routes::cycle_day))
        .route("/api/schedules/{id}/submit", put(routes::submit_schedule))
        .route("/api/schedules/{id}/approve", put(routes::decide_schedule))
        .route("/api/schedules/{id}/lock", put(routes::lock_schedule))
        // Polls
        .route("/api/polls", get(routes::list_polls).post(routes::create_poll))
        .route("/api/polls/{id}", axum::routing::delete(routes::delete_poll))
        .route("/api/polls/{id}/vote", post(routes::vote_poll))
        .route("/api/polls/{id}/close", put(routes::close_poll))
        // Motivation board
        .route(
            "/api/motivation",
            get(routes::list_posts).post(routes::create_post),
        )
        .route("/api/motivation/{id}/like", post(routes::like_post))
        .route("/api/motivation/{id}/comments", post(routes::comment_post))
        .route("/api/motivation/{id}/pin", put(routes::pin_post))
        // Feedback & analytics
        .route(
            "/api/feedback",
            get(routes::list_feedback).post(routes::submit_feedback),
        )
        .route("/api/analytics/leaderboard", get(routes::leaderboard))
        .route("/ws", get(crate::ws::ws_handler))
        .route_layer(axum::middleware::from_fn_with_state(
            shared.clone(),
            require_identity,
        ));

    // Public routes, no identity required
    let public = Router::new().route("/health", get(routes::health_check));

    protected
        .merge(public)
        .layer({
            let cors = CorsLayer::new()
                .allow_methods([
                    axum::http::Method::GET,
                    axum::http::Method::POST,
                    axum::http::Method::PUT,
                    axum::http::Method::DELETE,
                    axum::http::Method::OPTIONS,
                ])
                .allow_headers(Any)
                .max_age(std::time::Duration::from_secs(3600));

            if shared.config.cors_origins.is_empty() {
                cors.allow_origin(Any)
            } else {
                let origins: Vec<_> = shared
                    .config
                    .cors_origins
                    .iter()
                    .filter_map(|s| s.trim().parse::<axum::http::HeaderValue>().ok())
                    .collect();
                cors.allow_origin(origins)
            }
        })
        .layer(DefaultBodyLimit::max(shared.config.max_body_bytes))
        .layer(TraceLayer::new_for_http())
        .with_state(shared)
}

/// Start the HTTP server.
pub async fn start(
    config: &GatewayConfig,
    db: Arc<PlannerDb>,
    realtime: Option<Arc<BroadcastPublisher>>,
) -> anyhow::Result<()> {
    let state = AppState::new(config.clone(), db, realtime);
    let app = build_router(state);

    let addr = format!("{}:{}", config.host, config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;

    tracing::info!("🌐 WorkPlanner gateway listening on http://{}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    tracing::info!("Gateway stopped");
    Ok(())
}

async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};
        match (signal(SignalKind::terminate()), signal(SignalKind::interrupt())) {
            (Ok(mut sigterm), Ok(mut sigint)) => {
                tokio::select! {
                    _ = sigterm.recv() => {}
                    _ = sigint.recv() => {}
                }
            }
            _ => {
                let _ = tokio::signal::ctrl_c().await;
            }
        }
    }
    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
    tracing::info!("Shutdown signal received, draining connections");
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn headers(pairs: &[(&'static str, &str)]) -> HeaderMap {
        let mut map = HeaderMap::new();
        for (name, value) in pairs {
            map.insert(*name, HeaderValue::from_str(value).unwrap());
        }
        map
    }

    #[test]
    fn test_identity_defaults() {
        let identity = identity_from_headers(&headers(&[(HEADER_USER_ID, "u1")])).unwrap();
        assert_eq!(identity.user_id, "u1");
        assert_eq!(identity.name, "u1");
        assert_eq!(identity.role, Role::Worker);
        assert_eq!(identity.department, "");
    }

    #[test]
    fn test_identity_full_headers() {
        let identity = identity_from_headers(&headers(&[
            (HEADER_USER_ID, "m1"),
            (HEADER_USER_ROLE, "HR"),
            (HEADER_USER_DEPARTMENT, "eng"),
            (HEADER_USER_NAME, "Mia"),
            (HEADER_USER_EMAIL, "mia@example.com"),
        ]))
        .unwrap();
        assert_eq!(identity.role, Role::Admin);
        assert_eq!(identity.department, "eng");
        assert_eq!(identity.name, "Mia");
        assert_eq!(identity.email, "mia@example.com");
    }

    #[test]
    fn test_identity_rejections() {
        assert!(matches!(
            identity_from_headers(&HeaderMap::new()),
            Err(ApiError::Unauthorized(_))
        ));
        assert!(matches!(
            identity_from_headers(&headers(&[(HEADER_USER_ID, "   ")])),
            Err(ApiError::Unauthorized(_))
        ));
        assert!(matches!(
            identity_from_headers(&headers(&[(HEADER_USER_ID, "u1"), (HEADER_USER_ROLE, "ceo")])),
            Err(ApiError::Unauthorized(_))
        ));
    }
}
