use axum::{extract::State, response::Response};
use tracing::{info, warn};

use warbler_db::Checked;
use warbler_types::models::MessageId;

use crate::auth::{AppState, blocking};
use crate::error::ApiError;
use crate::extract::PathParam;
use crate::guard::require_login;
use crate::pages::found;
use crate::session::CurrentUser;

/// POST /users/add_like/{message_id}: Like, or unlike if already liked.
/// Authors cannot like their own messages.
pub async fn toggle_like(
    State(state): State<AppState>,
    current: CurrentUser,
    PathParam(message_id): PathParam<MessageId>,
) -> Result<Response, ApiError> {
    let me = require_login(&current)?.id;

    let outcome = blocking(&state, move |s| {
        Ok(s.db.toggle_like_if(me, message_id, |author| author != me)?)
    })
    .await?;

    let liked = match outcome {
        Checked::Done(liked) => liked,
        Checked::Missing => return Err(ApiError::NotFound),
        Checked::Refused => {
            warn!("User #{} tried to like their own message {}", me, message_id);
            return Err(ApiError::Unauthorized);
        }
    };

    info!(
        "User #{} {} message {}",
        me,
        if liked { "liked" } else { "unliked" },
        message_id
    );
    Ok(found("/"))
}
