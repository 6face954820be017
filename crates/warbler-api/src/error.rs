use axum::{
    http::StatusCode,
    response::{Html, IntoResponse, Response},
};
use thiserror::Error;
use tracing::{error, warn};

use warbler_db::{DbError, SignupError};

use crate::pages::{self, NotFoundPage};

pub const UNAUTHORIZED_NOTICE: &str = "Access unauthorized.";

/// Response extension left by a guard denial. [`crate::flash::carry_denials`]
/// turns it into a notice on top of whatever the request already queued.
#[derive(Debug, Clone, Copy)]
pub struct Denied;

#[derive(Debug, Error)]
pub enum ApiError {
    /// The guard refused the operation. Rendered as a redirect home with a
    /// flash notice, never as an error status.
    #[error("access unauthorized")]
    Unauthorized,

    #[error("not found")]
    NotFound,

    #[error(transparent)]
    Database(#[from] DbError),

    #[error(transparent)]
    Signup(#[from] SignupError),

    #[error(transparent)]
    Template(#[from] askama::Error),

    #[error("session token: {0}")]
    Session(#[from] jsonwebtoken::errors::Error),

    #[error("spawn_blocking join error: {0}")]
    Join(#[from] tokio::task::JoinError),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self {
            Self::Unauthorized => {
                let mut resp = pages::found("/");
                resp.extensions_mut().insert(Denied);
                resp
            }
            Self::NotFound => match askama::Template::render(&NotFoundPage) {
                Ok(body) => (StatusCode::NOT_FOUND, Html(body)).into_response(),
                Err(e) => {
                    warn!("Failed to render 404 page: {}", e);
                    StatusCode::NOT_FOUND.into_response()
                }
            },
            other => {
                error!("Request failed: {}", other);
                StatusCode::INTERNAL_SERVER_ERROR.into_response()
            }
        }
    }
}
