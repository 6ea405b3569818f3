use axum::extract::rejection::JsonRejection;
use axum::extract::{FromRequest, FromRequestParts, Request};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::lifecycle::LifecycleError;

// ============================================================================
// JSend envelopes
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JSendStatus {
    Error,
    Fail,
    Success,
}

/// `{"status": "success", "data": ...}`
#[derive(Debug, Serialize, Deserialize)]
pub struct JSend<T: Serialize> {
    pub data: T,
    pub status: JSendStatus,
}

impl<T: Serialize> JSend<T> {
    pub fn success(data: T) -> Json<JSend<T>> {
        Json(JSend {
            data,
            status: JSendStatus::Success,
        })
    }
}

/// `{"status": "fail", "data": {"message": ...}}`, used for 4xx.
#[derive(Debug, Serialize, Deserialize)]
pub struct JSendFail {
    pub data: FailData,
    pub status: JSendStatus,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct FailData {
    pub message: String,
}

/// `{"status": "error", "message": ...}`, used for 5xx.
#[derive(Debug, Serialize, Deserialize)]
pub struct JSendError {
    pub message: String,
    pub status: JSendStatus,
}

// ============================================================================
// Handler error
// ============================================================================

/// Error returned by handlers and extractors. Server errors render as a
/// JSend `error`, everything else as a JSend `fail`.
#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub message: String,
}

impl ApiError {
    fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, message)
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::new(StatusCode::UNAUTHORIZED, message)
    }

    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::new(StatusCode::FORBIDDEN, message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, message)
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        Self::new(StatusCode::CONFLICT, message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, message)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        if self.status.is_server_error() {
            let body = JSendError {
                message: self.message,
                status: JSendStatus::Error,
            };
            (self.status, Json(body)).into_response()
        } else {
            let body = JSendFail {
                data: FailData {
                    message: self.message,
                },
                status: JSendStatus::Fail,
            };
            (self.status, Json(body)).into_response()
        }
    }
}

impl From<LifecycleError> for ApiError {
    fn from(e: LifecycleError) -> Self {
        match e {
            LifecycleError::InvalidInput(msg) => ApiError::bad_request(msg),
            LifecycleError::Forbidden => ApiError::forbidden("You do not have access to this file"),
            LifecycleError::NotFound(_) => ApiError::not_found("File not found"),
            LifecycleError::InvalidTransition { .. }
            | LifecycleError::ConflictingResult { .. }
            | LifecycleError::StaleUpdate { .. }
            | LifecycleError::AlreadyFinalized { .. } => ApiError::conflict(e.to_string()),
            LifecycleError::StorageFailure(msg) => {
                tracing::error!(error = %msg, "Storage failure");
                ApiError::internal("Storage is unavailable")
            }
        }
    }
}

// ============================================================================
// Extractors that reject with JSend bodies
// ============================================================================

/// `axum::Json` whose rejection is a JSend `fail`.
pub struct AppJson<T>(pub T);

#[axum::async_trait]
impl<S, T> FromRequest<S> for AppJson<T>
where
    axum::Json<T>: FromRequest<S, Rejection = JsonRejection>,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request(req: Request, state: &S) -> Result<Self, ApiError> {
        let Json(value) = axum::Json::<T>::from_request(req, state)
            .await
            .map_err(|rejection| ApiError::bad_request(json_rejection_message(rejection)))?;
        Ok(AppJson(value))
    }
}

fn json_rejection_message(rejection: JsonRejection) -> String {
    match rejection {
        JsonRejection::JsonDataError(err) => format!("Invalid request body: {}", err.body_text()),
        JsonRejection::JsonSyntaxError(_) => "Malformed JSON in request body".to_string(),
        JsonRejection::MissingJsonContentType(_) => {
            "Missing Content-Type: application/json header".to_string()
        }
        _ => "Failed to read request body".to_string(),
    }
}

/// Query-string extractor backed by `serde_qs`.
pub struct AppQuery<T>(pub T);

#[axum::async_trait]
impl<S, T> FromRequestParts<S> for AppQuery<T>
where
    T: DeserializeOwned + Send,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut axum::http::request::Parts,
        _state: &S,
    ) -> Result<Self, ApiError> {
        let query = parts.uri.query().unwrap_or_default();
        serde_qs::from_str(query)
            .map(AppQuery)
            .map_err(|e| ApiError::bad_request(format!("Invalid query parameter: {e}")))
    }
}
