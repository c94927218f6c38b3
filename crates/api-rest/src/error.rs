//! Mapping from core errors to HTTP responses, and the caller-identity extractor.

use api_shared::dto::ErrorRes;
use api_shared::{actor_from_parts, AuthError, ACTOR_ID_HEADER, ACTOR_ROLE_HEADER};
use axum::async_trait;
use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use ipd_core::{ActorContext, EpisodeError};

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error(transparent)]
    Unauthenticated(#[from] AuthError),
    /// Path id that cannot name any episode.
    #[error("no such episode")]
    UnknownEpisodeId,
    /// Request body that is not valid JSON for the endpoint.
    #[error("malformed request body: {message}")]
    MalformedBody {
        field: Option<String>,
        message: String,
    },
    #[error(transparent)]
    Episode(#[from] EpisodeError),
}

fn body(status: StatusCode, code: &str, message: impl Into<String>) -> Response {
    (
        status,
        Json(ErrorRes {
            code: code.into(),
            message: message.into(),
            field: None,
        }),
    )
        .into_response()
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self {
            ApiError::Unauthenticated(e) => {
                body(StatusCode::UNAUTHORIZED, "unauthenticated", e.to_string())
            }
            ApiError::UnknownEpisodeId => {
                body(StatusCode::NOT_FOUND, "not_found", "episode not found")
            }
            ApiError::MalformedBody { field, message } => (
                StatusCode::BAD_REQUEST,
                Json(ErrorRes {
                    code: "invalid_body".into(),
                    message,
                    field,
                }),
            )
                .into_response(),
            ApiError::Episode(e) => match e {
                EpisodeError::Validation { field, message } => (
                    StatusCode::BAD_REQUEST,
                    Json(ErrorRes {
                        code: "validation".into(),
                        message,
                        field: Some(field),
                    }),
                )
                    .into_response(),
                EpisodeError::InvalidInput(message) => {
                    body(StatusCode::BAD_REQUEST, "invalid_input", message)
                }
                EpisodeError::Forbidden => body(StatusCode::FORBIDDEN, "forbidden", "forbidden"),
                EpisodeError::NotFound => {
                    body(StatusCode::NOT_FOUND, "not_found", "episode not found")
                }
                EpisodeError::EpisodeClosed => body(
                    StatusCode::CONFLICT,
                    "episode_closed",
                    "episode is discharged and accepts no further changes",
                ),
                e @ EpisodeError::Conflict { .. } => {
                    body(StatusCode::CONFLICT, "conflict", e.to_string())
                }
                other => {
                    tracing::error!(error = ?other, "request failed");
                    body(StatusCode::INTERNAL_SERVER_ERROR, "internal", "internal error")
                }
            },
        }
    }
}

/// The authenticated caller, taken from the gateway headers.
#[derive(Debug, Clone)]
pub struct Actor(pub ActorContext);

#[async_trait]
impl<S> FromRequestParts<S> for Actor
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let header = |name: &str| parts.headers.get(name).and_then(|v| v.to_str().ok());
        let actor = actor_from_parts(header(ACTOR_ID_HEADER), header(ACTOR_ROLE_HEADER))?;
        Ok(Actor(actor))
    }
}
