//! Response envelope and error mapping shared by every handler.
//!
//! Every body has the shape `{success, data?, message?, errors?}`.

use axum::Json;
use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use workplanner_core::{FieldError, PlannerError};

#[derive(Debug, Serialize)]
pub struct Envelope<T> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub errors: Option<Vec<FieldError>>,
}

/// Successful response with an optional payload.
#[derive(Debug)]
pub struct ApiResponse<T> {
    status: StatusCode,
    body: Envelope<T>,
}

impl<T: Serialize> ApiResponse<T> {
    pub fn ok(data: T) -> Self {
        Self {
            status: StatusCode::OK,
            body: Envelope {
                success: true,
                data: Some(data),
                message: None,
                errors: None,
            },
        }
    }

    pub fn created(data: T) -> Self {
        Self {
            status: StatusCode::CREATED,
            ..Self::ok(data)
        }
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.body.message = Some(message.into());
        self
    }

    pub fn with_status(mut self, status: StatusCode) -> Self {
        self.status = status;
        self
    }
}

impl ApiResponse<()> {
    /// Success with a message and no `data` field.
    pub fn message(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::OK,
            body: Envelope {
                success: true,
                data: None,
                message: Some(message.into()),
                errors: None,
            },
        }
    }
}

impl<T: Serialize> IntoResponse for ApiResponse<T> {
    fn into_response(self) -> Response {
        (self.status, Json(self.body)).into_response()
    }
}

/// Failure surfaced to the client.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// Missing or malformed identity headers.
    #[error("unauthorized: {0}")]
    Unauthorized(String),
    #[error(transparent)]
    Planner(#[from] PlannerError),
}

pub type ApiResult<T> = Result<ApiResponse<T>, ApiError>;

/// Field named by a deserialization failure such as
/// `...target type: day: unknown variant` or `...: missing field `week``.
fn rejected_field(text: &str) -> Option<String> {
    let (_, detail) = text.split_once(": ")?;
    if let Some(rest) = detail.strip_prefix("missing field `") {
        return rest.split('`').next().map(str::to_string);
    }
    let (path, _) = detail.split_once(": ")?;
    let is_path = !path.is_empty()
        && path
            .chars()
            .all(|c| c.is_alphanumeric() || matches!(c, '_' | '.' | '[' | ']'));
    is_path.then(|| path.to_string())
}

fn rejection_error(fallback: &str, text: String) -> ApiError {
    let field = rejected_field(&text).unwrap_or_else(|| fallback.to_string());
    ApiError::Planner(PlannerError::invalid(field, text))
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        rejection_error("body", rejection.body_text())
    }
}

impl From<QueryRejection> for ApiError {
    fn from(rejection: QueryRejection) -> Self {
        rejection_error("query", rejection.body_text())
    }
}

fn failure(status: StatusCode, message: String, errors: Option<Vec<FieldError>>) -> Response {
    let body: Envelope<()> = Envelope {
        success: false,
        data: None,
        message: Some(message),
        errors,
    };
    (status, Json(body)).into_response()
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let e = match self {
            ApiError::Unauthorized(message) => {
                return failure(StatusCode::UNAUTHORIZED, message, None);
            }
            ApiError::Planner(e) => e,
        };
        if !e.is_client_error() {
            tracing::error!("request failed: {e}");
            return failure(StatusCode::INTERNAL_SERVER_ERROR, "Server error".into(), None);
        }
        match e {
            PlannerError::Validation(errors) => failure(
                StatusCode::BAD_REQUEST,
                "Validation errors".into(),
                Some(errors),
            ),
            PlannerError::InvalidState(m) => failure(StatusCode::BAD_REQUEST, m, None),
            PlannerError::Forbidden(m) => failure(StatusCode::FORBIDDEN, m, None),
            not_found @ PlannerError::NotFound(_) => {
                failure(StatusCode::NOT_FOUND, not_found.to_string(), None)
            }
            PlannerError::Conflict(m) => failure(StatusCode::CONFLICT, m, None),
            PlannerError::Locked(m) => failure(StatusCode::LOCKED, m, None),
            other => failure(StatusCode::BAD_REQUEST, other.to_string(), None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn body_json(response: Response) -> serde_json::Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_ok_envelope_omits_empty_fields() {
        let response = ApiResponse::ok(vec![1, 2]).into_response();
        assert_eq!(response.status(), StatusCode::OK);
        let json = body_json(response).await;
        assert_eq!(json["success"], true);
        assert_eq!(json["data"], serde_json::json!([1, 2]));
        assert!(json.get("message").is_none());
        assert!(json.get("errors").is_none());
    }

    #[tokio::test]
    async fn test_created_with_message() {
        let response = ApiResponse::created("x")
            .with_message("Poll created successfully")
            .into_response();
        assert_eq!(response.status(), StatusCode::CREATED);
        let json = body_json(response).await;
        assert_eq!(json["message"], "Poll created successfully");
    }

    #[tokio::test]
    async fn test_error_status_mapping() {
        let cases = [
            (PlannerError::invalid("title", "Title is required"), StatusCode::BAD_REQUEST),
            (PlannerError::InvalidState("Poll is no longer active".into()), StatusCode::BAD_REQUEST),
            (PlannerError::Forbidden("no".into()), StatusCode::FORBIDDEN),
            (PlannerError::NotFound("Poll".into()), StatusCode::NOT_FOUND),
            (PlannerError::Conflict("dup".into()), StatusCode::CONFLICT),
            (PlannerError::Locked("locked".into()), StatusCode::LOCKED),
            (PlannerError::Storage("disk".into()), StatusCode::INTERNAL_SERVER_ERROR),
            (PlannerError::Config("bad toml".into()), StatusCode::INTERNAL_SERVER_ERROR),
            (
                PlannerError::Io(std::io::Error::other("disk gone")),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
        ];
        for (err, status) in cases {
            assert_eq!(ApiError::from(err).into_response().status(), status);
        }
    }

    #[tokio::test]
    async fn test_error_bodies() {
        let json = body_json(ApiError::from(PlannerError::NotFound("Poll".into())).into_response()).await;
        assert_eq!(json["success"], false);
        assert_eq!(json["message"], "Poll not found");

        let json = body_json(ApiError::from(PlannerError::invalid("title", "Title is required")).into_response()).await;
        assert_eq!(json["message"], "Validation errors");
        assert_eq!(json["errors"][0]["field"], "title");

        let json = body_json(ApiError::from(PlannerError::Storage("disk full".into())).into_response()).await;
        assert_eq!(json["message"], "Server error");
    }

    #[test]
    fn test_rejected_field_names() {
        let data = "Failed to deserialize the JSON body into the target type: \
                    day: unknown variant `someday`, expected one of `monday` at line 1 column 40";
        assert_eq!(rejected_field(data).as_deref(), Some("day"));

        let missing = "Failed to deserialize the JSON body into the target type: \
                       missing field `week` at line 1 column 2";
        assert_eq!(rejected_field(missing).as_deref(), Some("week"));

        let query = "Failed to deserialize query string: year: invalid digit found in string";
        assert_eq!(rejected_field(query).as_deref(), Some("year"));

        let syntax = "Failed to parse the request body as JSON: expected value at line 1 column 1";
        assert_eq!(rejected_field(syntax), None);
    }
}
