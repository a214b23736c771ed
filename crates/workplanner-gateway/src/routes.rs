//! API route handlers for the gateway.

use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::{
    Extension, Json,
    extract::{Path, Query, State},
};
use chrono::Utc;
use serde::Deserialize;
use std::sync::Arc;
use workplanner_core::{Identity, PlannerError, WeekKey};
use workplanner_engine::{
    CurrentWeek, Decision, Feedback, LeaderboardEntry, NewFeedback, NewPoll, NewPost, PollFilter, PollView,
    PostView, ScheduleFilter, ScheduleView, TeamFilter, UpsertSchedule, Weekday,
};

use crate::api::{ApiResponse, ApiResult};
use crate::server::AppState;

type Body<T> = Result<Json<T>, JsonRejection>;
type Params<T> = Result<Query<T>, QueryRejection>;

/// Health check endpoint.
pub async fn health_check(State(state): State<Arc<AppState>>) -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "ok",
        "service": "workplanner-gateway",
        "version": env!("CARGO_PKG_VERSION"),
        "uptime_secs": state.start_time.elapsed().as_secs(),
        "realtime_clients": state.realtime.as_ref().map(|r| r.subscriber_count()),
    }))
}

/// The resolved caller.
pub async fn auth_me(Extension(me): Extension<Identity>) -> ApiResult<Identity> {
    Ok(ApiResponse::ok(me))
}

// ---- Schedules ----

pub async fn list_schedules(
    State(state): State<Arc<AppState>>,
    Extension(me): Extension<Identity>,
    query: Params<ScheduleFilter>,
) -> ApiResult<Vec<ScheduleView>> {
    let Query(filter) = query?;
    Ok(ApiResponse::ok(state.schedules.list_for_user(&me, &filter).await?))
}

pub async fn upsert_schedule(
    State(state): State<Arc<AppState>>,
    Extension(me): Extension<Identity>,
    body: Body<UpsertSchedule>,
) -> ApiResult<ScheduleView> {
    let Json(input) = body?;
    let (view, created) = state.schedules.upsert(&me, input).await?;
    Ok(if created {
        ApiResponse::created(view).with_message("Schedule created successfully")
    } else {
        ApiResponse::ok(view).with_message("Schedule updated successfully")
    })
}

pub async fn team_schedules(
    State(state): State<Arc<AppState>>,
    Extension(me): Extension<Identity>,
    query: Params<TeamFilter>,
) -> ApiResult<Vec<ScheduleView>> {
    let Query(filter) = query?;
    Ok(ApiResponse::ok(state.schedules.list_for_team(&me, &filter).await?))
}

pub async fn current_week() -> ApiResult<CurrentWeek> {
    Ok(ApiResponse::ok(CurrentWeek::at(Utc::now())))
}

#[derive(Debug, Deserialize)]
pub struct CycleRequest {
    pub week: String,
    pub day: Weekday,
}

pub async fn cycle_day(
    State(state): State<Arc<AppState>>,
    Extension(me): Extension<Identity>,
    body: Body<CycleRequest>,
) -> ApiResult<ScheduleView> {
    let Json(req) = body?;
    let week = WeekKey::parse(&req.week)?;
    Ok(ApiResponse::ok(state.schedules.cycle_day(&me, week, req.day).await?))
}

pub async fn submit_schedule(
    State(state): State<Arc<AppState>>,
    Extension(me): Extension<Identity>,
    Path(id): Path<String>,
) -> ApiResult<ScheduleView> {
    let view = state.schedules.submit(&me, &id).await?;
    Ok(ApiResponse::ok(view).with_message("Schedule submitted for approval"))
}

#[derive(Debug, Deserialize)]
pub struct DecisionRequest {
    pub status: Decision,
    #[serde(default)]
    pub feedback: Option<String>,
}

pub async fn decide_schedule(
    State(state): State<Arc<AppState>>,
    Extension(me): Extension<Identity>,
    Path(id): Path<String>,
    body: Body<DecisionRequest>,
) -> ApiResult<ScheduleView> {
    let Json(req) = body?;
    let view = state.schedules.decide(&me, &id, req.status, req.feedback).await?;
    let message = format!("Schedule {} successfully", view.status.as_str());
    Ok(ApiResponse::ok(view).with_message(message))
}

#[derive(Debug, Deserialize)]
pub struct LockRequest {
    pub locked: bool,
}

pub async fn lock_schedule(
    State(state): State<Arc<AppState>>,
    Extension(me): Extension<Identity>,
    Path(id): Path<String>,
    body: Body<LockRequest>,
) -> ApiResult<ScheduleView> {
    let Json(req) = body?;
    let view = state.schedules.set_lock(&me, &id, req.locked).await?;
    let message = if req.locked { "Schedule locked" } else { "Schedule unlocked" };
    Ok(ApiResponse::ok(view).with_message(message))
}

// ---- Polls ----

pub async fn list_polls(
    State(state): State<Arc<AppState>>,
    Extension(me): Extension<Identity>,
    query: Params<PollFilter>,
) -> ApiResult<Vec<PollView>> {
    let Query(filter) = query?;
    Ok(ApiResponse::ok(state.polls.list(&me, &filter).await?))
}

pub async fn create_poll(
    State(state): State<Arc<AppState>>,
    Extension(me): Extension<Identity>,
    body: Body<NewPoll>,
) -> ApiResult<PollView> {
    let Json(input) = body?;
    let view = state.polls.create(&me, input).await?;
    Ok(ApiResponse::created(view).with_message("Poll created successfully"))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VoteRequest {
    pub option_index: i64,
}

pub async fn vote_poll(
    State(state): State<Arc<AppState>>,
    Extension(me): Extension<Identity>,
    Path(id): Path<String>,
    body: Body<VoteRequest>,
) -> ApiResult<PollView> {
    let Json(req) = body?;
    let index = usize::try_from(req.option_index).map_err(|_| {
        PlannerError::invalid("optionIndex", "Option index must be a non-negative integer")
    })?;
    let view = state.polls.vote(&me, &id, index).await?;
    Ok(ApiResponse::ok(view).with_message("Vote recorded successfully"))
}

pub async fn close_poll(
    State(state): State<Arc<AppState>>,
    Extension(me): Extension<Identity>,
    Path(id): Path<String>,
) -> ApiResult<PollView> {
    let view = state.polls.close(&me, &id).await?;
    Ok(ApiResponse::ok(view).with_message("Poll closed successfully"))
}

pub async fn delete_poll(
    State(state): State<Arc<AppState>>,
    Extension(me): Extension<Identity>,
    Path(id): Path<String>,
) -> ApiResult<()> {
    state.polls.delete(&me, &id).await?;
    Ok(ApiResponse::message("Poll deleted successfully"))
}

// ---- Motivation board ----

pub async fn list_posts(
    State(state): State<Arc<AppState>>,
    Extension(me): Extension<Identity>,
) -> ApiResult<Vec<PostView>> {
    Ok(ApiResponse::ok(state.motivation.list(&me).await?))
}

pub async fn create_post(
    State(state): State<Arc<AppState>>,
    Extension(me): Extension<Identity>,
    body: Body<NewPost>,
) -> ApiResult<PostView> {
    let Json(input) = body?;
    let view = state.motivation.create(&me, input).await?;
    Ok(ApiResponse::created(view).with_message("Post created successfully"))
}

pub async fn like_post(
    State(state): State<Arc<AppState>>,
    Extension(me): Extension<Identity>,
    Path(id): Path<String>,
) -> ApiResult<PostView> {
    Ok(ApiResponse::ok(state.motivation.toggle_like(&me, &id).await?))
}

#[derive(Debug, Deserialize)]
pub struct CommentRequest {
    pub content: String,
}

pub async fn comment_post(
    State(state): State<Arc<AppState>>,
    Extension(me): Extension<Identity>,
    Path(id): Path<String>,
    body: Body<CommentRequest>,
) -> ApiResult<PostView> {
    let Json(req) = body?;
    let view = state.motivation.add_comment(&me, &id, &req.content).await?;
    Ok(ApiResponse::created(view).with_message("Comment added"))
}

#[derive(Debug, Deserialize)]
pub struct PinRequest {
    #[serde(default = "pin_default")]
    pub pinned: bool,
}

fn pin_default() -> bool {
    true
}

pub async fn pin_post(
    State(state): State<Arc<AppState>>,
    Extension(me): Extension<Identity>,
    Path(id): Path<String>,
    body: Body<PinRequest>,
) -> ApiResult<PostView> {
    let Json(req) = body?;
    Ok(ApiResponse::ok(state.motivation.set_pinned(&me, &id, req.pinned).await?))
}

// ---- Feedback & analytics ----

pub async fn submit_feedback(
    State(state): State<Arc<AppState>>,
    Extension(me): Extension<Identity>,
    body: Body<NewFeedback>,
) -> ApiResult<()> {
    let Json(input) = body?;
    state.feedback.submit(&me, input).await?;
    Ok(ApiResponse::message("Feedback submitted anonymously. Thank you!")
        .with_status(axum::http::StatusCode::CREATED))
}

pub async fn list_feedback(
    State(state): State<Arc<AppState>>,
    Extension(me): Extension<Identity>,
) -> ApiResult<Vec<Feedback>> {
    Ok(ApiResponse::ok(state.feedback.list(&me).await?))
}

pub async fn leaderboard(
    State(state): State<Arc<AppState>>,
    Extension(me): Extension<Identity>,
) -> ApiResult<Vec<LeaderboardEntry>> {
    Ok(ApiResponse::ok(state.leaderboard.for_department(&me).await?))
}

#[cfg(test)]
mod tests {
    use crate::server::{AppState, build_router};
    use axum::Router;
    use axum::body::Body;
    use axum::http::{Method, Request, StatusCode};
    use serde_json::{Value, json};
    use std::sync::Arc;
    use tower::ServiceExt;
    use workplanner_core::config::GatewayConfig;
    use workplanner_engine::{BroadcastPublisher, PlannerDb};

    fn test_app() -> (Router, Arc<BroadcastPublisher>) {
        let db = Arc::new(PlannerDb::open_in_memory().unwrap());
        let realtime = Arc::new(BroadcastPublisher::new(16));
        let state = AppState::new(GatewayConfig::default(), db, Some(realtime.clone()));
        (build_router(state), realtime)
    }

    /// (user id, role, department)
    type Caller<'a> = (&'a str, &'a str, &'a str);

    const WORKER: Caller<'static> = ("w1", "worker", "eng");
    const MANAGER: Caller<'static> = ("m1", "manager", "eng");

    async fn call(
        app: &Router,
        method: Method,
        uri: &str,
        caller: Option<Caller<'_>>,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some((id, role, department)) = caller {
            builder = builder
                .header("x-user-id", id)
                .header("x-user-role", role)
                .header("x-user-department", department);
        }
        let request = match body {
            Some(json) => builder
                .header("content-type", "application/json")
                .body(Body::from(json.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };
        let response = app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let json = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, json)
    }

    fn poll_body() -> Value {
        json!({
            "title": "Team lunch",
            "description": "Where should we go on Friday?",
            "options": ["Pizza", "Sushi", "Tacos"],
            "expiresAt": (chrono::Utc::now() + chrono::Duration::days(2)).to_rfc3339(),
        })
    }

    #[tokio::test]
    async fn test_health_check_is_public() {
        let (app, realtime) = test_app();
        let (status, json) = call(&app, Method::GET, "/health", None, None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["status"], "ok");
        assert_eq!(json["service"], "workplanner-gateway");
        assert!(json["uptime_secs"].is_u64());
        assert_eq!(json["realtime_clients"], 0);

        let _listener = realtime.subscribe();
        let (_, json) = call(&app, Method::GET, "/health", None, None).await;
        assert_eq!(json["realtime_clients"], 1);
    }

    #[tokio::test]
    async fn test_missing_identity_is_unauthorized() {
        let (app, _) = test_app();
        let (status, json) = call(&app, Method::GET, "/api/polls", None, None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(json["success"], false);
    }

    #[tokio::test]
    async fn test_auth_me_echoes_identity() {
        let (app, _) = test_app();
        let (status, json) = call(&app, Method::GET, "/api/auth/me", Some(MANAGER), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["data"]["id"], "m1");
        assert_eq!(json["data"]["role"], "manager");
        assert_eq!(json["data"]["department"], "eng");
    }

    #[tokio::test]
    async fn test_schedule_workflow() {
        let (app, _) = test_app();
        let body = json!({"week": "2024-49", "schedule": {"monday": "wfo"}, "notes": "Client visit"});
        let (status, json) = call(&app, Method::POST, "/api/schedules", Some(WORKER), Some(body.clone())).await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(json["message"], "Schedule created successfully");
        assert_eq!(json["data"]["status"], "draft");
        assert_eq!(json["data"]["schedule"]["monday"], "wfo");
        let id = json["data"]["id"].as_str().unwrap().to_string();

        let (status, json) = call(&app, Method::POST, "/api/schedules", Some(WORKER), Some(body)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["message"], "Schedule updated successfully");

        let (status, json) = call(
            &app,
            Method::POST,
            "/api/schedules/cycle",
            Some(WORKER),
            Some(json!({"week": "2024-49", "day": "monday"})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["data"]["schedule"]["monday"], "wfh");

        let uri = format!("/api/schedules/{id}/submit");
        let (status, json) = call(&app, Method::PUT, &uri, Some(WORKER), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["data"]["status"], "submitted");

        let uri = format!("/api/schedules/{id}/approve");
        let verdict = json!({"status": "approved", "feedback": "Looks good"});
        let (status, _) = call(&app, Method::PUT, &uri, Some(WORKER), Some(verdict.clone())).await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        let (status, json) = call(&app, Method::PUT, &uri, Some(MANAGER), Some(verdict)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["message"], "Schedule approved successfully");
        assert_eq!(json["data"]["approvedBy"]["id"], "m1");

        let (status, json) = call(&app, Method::GET, "/api/schedules?week=2024-49", Some(WORKER), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["data"].as_array().unwrap().len(), 1);

        let (status, json) = call(&app, Method::GET, "/api/schedules/team", Some(MANAGER), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["data"][0]["user"]["id"], "w1");
    }

    #[tokio::test]
    async fn test_locked_schedule_rejects_edits() {
        let (app, _) = test_app();
        let (_, json) = call(
            &app,
            Method::POST,
            "/api/schedules",
            Some(WORKER),
            Some(json!({"week": "2024-50"})),
        )
        .await;
        let id = json["data"]["id"].as_str().unwrap().to_string();

        let uri = format!("/api/schedules/{id}/lock");
        let (status, json) = call(&app, Method::PUT, &uri, Some(MANAGER), Some(json!({"locked": true}))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["data"]["isLocked"], true);

        let (status, json) = call(
            &app,
            Method::POST,
            "/api/schedules/cycle",
            Some(WORKER),
            Some(json!({"week": "2024-50", "day": "friday"})),
        )
        .await;
        assert_eq!(status, StatusCode::LOCKED);
        assert_eq!(json["success"], false);
    }

    #[tokio::test]
    async fn test_bad_week_is_validation_error() {
        let (app, _) = test_app();
        let (status, json) = call(
            &app,
            Method::POST,
            "/api/schedules",
            Some(WORKER),
            Some(json!({"week": "2024-99"})),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(json["message"], "Validation errors");
        assert_eq!(json["errors"][0]["field"], "week");

        let (status, json) = call(
            &app,
            Method::POST,
            "/api/schedules/cycle",
            Some(WORKER),
            Some(json!({"week": "2024/49", "day": "monday"})),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(json["errors"][0]["field"], "week");

        let (status, json) = call(&app, Method::GET, "/api/schedules?week=49", Some(WORKER), None).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(json["errors"][0]["field"], "week");

        let (status, json) = call(
            &app,
            Method::POST,
            "/api/schedules/cycle",
            Some(WORKER),
            Some(json!({"week": "2024-49", "day": "someday"})),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(json["errors"][0]["field"], "day");
    }

    #[tokio::test]
    async fn test_current_week() {
        let (app, _) = test_app();
        let (status, json) = call(&app, Method::GET, "/api/schedules/current-week", Some(WORKER), None).await;
        assert_eq!(status, StatusCode::OK);
        assert!(json["data"]["weekNumber"].as_u64().unwrap() >= 1);
        assert!(json["data"]["week"].is_string());
    }

    #[tokio::test]
    async fn test_poll_lifecycle_and_events() {
        let (app, realtime) = test_app();
        let mut events = realtime.subscribe();

        let (status, _) = call(&app, Method::POST, "/api/polls", Some(WORKER), Some(poll_body())).await;
        assert_eq!(status, StatusCode::FORBIDDEN);

        let (status, json) = call(&app, Method::POST, "/api/polls", Some(MANAGER), Some(poll_body())).await;
        assert_eq!(status, StatusCode::CREATED);
        let id = json["data"]["id"].as_str().unwrap().to_string();
        assert_eq!(events.recv().await.unwrap().event, "new-poll");

        let uri = format!("/api/polls/{id}/vote");
        let (status, json) = call(&app, Method::POST, &uri, Some(WORKER), Some(json!({"optionIndex": 1}))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["data"]["totalVotes"], 1);
        assert_eq!(json["data"]["hasVoted"], true);
        assert_eq!(events.recv().await.unwrap().event, "poll-updated");

        let (status, _) = call(&app, Method::POST, &uri, Some(WORKER), Some(json!({"optionIndex": 0}))).await;
        assert_eq!(status, StatusCode::CONFLICT);

        let (status, json) = call(&app, Method::POST, &uri, Some(MANAGER), Some(json!({"optionIndex": -1}))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(json["errors"][0]["field"], "optionIndex");

        let (status, json) = call(&app, Method::POST, &uri, Some(MANAGER), Some(json!({"optionIndex": 9}))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(json["errors"][0]["field"], "optionIndex");

        let (status, json) = call(&app, Method::GET, "/api/polls?active=true", Some(WORKER), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["data"].as_array().unwrap().len(), 1);

        let close = format!("/api/polls/{id}/close");
        let (status, json) = call(&app, Method::PUT, &close, Some(MANAGER), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["data"]["isActive"], false);

        let (status, _) = call(&app, Method::POST, &uri, Some(MANAGER), Some(json!({"optionIndex": 0}))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let delete = format!("/api/polls/{id}");
        let (status, json) = call(&app, Method::DELETE, &delete, Some(MANAGER), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["message"], "Poll deleted successfully");
        assert!(json.get("data").is_none());

        let (status, json) = call(&app, Method::DELETE, &delete, Some(MANAGER), None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(json["message"], "Poll not found");
    }

    #[tokio::test]
    async fn test_poll_validation_collects_fields() {
        let (app, _) = test_app();
        let body = json!({
            "title": "",
            "description": "",
            "options": ["Only one"],
            "expiresAt": "2001-01-01T00:00:00Z",
        });
        let (status, json) = call(&app, Method::POST, "/api/polls", Some(MANAGER), Some(body)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(json["errors"].as_array().unwrap().len() >= 3);
    }

    #[tokio::test]
    async fn test_motivation_feedback_and_leaderboard() {
        let (app, _) = test_app();
        let post = json!({"type": "shoutout", "title": "Great demo", "content": "Thanks for the launch work"});
        let (status, json) = call(&app, Method::POST, "/api/motivation", Some(WORKER), Some(post)).await;
        assert_eq!(status, StatusCode::CREATED);
        let id = json["data"]["id"].as_str().unwrap().to_string();

        let like = format!("/api/motivation/{id}/like");
        let (_, json) = call(&app, Method::POST, &like, Some(MANAGER), None).await;
        assert_eq!(json["data"]["likeCount"], 1);
        assert_eq!(json["data"]["likedByMe"], true);

        let comments = format!("/api/motivation/{id}/comments");
        let (status, json) = call(&app, Method::POST, &comments, Some(MANAGER), Some(json!({"content": "Agreed!"}))).await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(json["data"]["comments"].as_array().unwrap().len(), 1);

        let pin = format!("/api/motivation/{id}/pin");
        let (status, _) = call(&app, Method::PUT, &pin, Some(WORKER), Some(json!({"pinned": true}))).await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        let (status, json) = call(&app, Method::PUT, &pin, Some(MANAGER), Some(json!({}))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["data"]["isPinned"], true);

        let feedback = json!({"message": "More plants in the office please", "category": "suggestion"});
        let (status, json) = call(&app, Method::POST, "/api/feedback", Some(WORKER), Some(feedback)).await;
        assert_eq!(status, StatusCode::CREATED);
        assert!(json.get("data").is_none());

        let (status, _) = call(&app, Method::GET, "/api/feedback", Some(WORKER), None).await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        let (status, json) = call(&app, Method::GET, "/api/feedback", Some(MANAGER), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["data"][0]["category"], "suggestion");

        let (status, json) = call(&app, Method::GET, "/api/analytics/leaderboard", Some(WORKER), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["data"].as_array().unwrap().len(), 2);
        assert_eq!(json["data"][0]["rank"], 1);
    }
}
