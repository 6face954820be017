use std::collections::HashSet;

use axum::{
    Form,
    extract::State,
    response::Response,
};
use axum_extra::extract::CookieJar;
use tracing::info;

use warbler_db::{Checked, NewMessage};
use warbler_types::api::MessageForm;
use warbler_types::models::{MAX_MESSAGE_LEN, MessageId};

use crate::auth::{AppState, blocking};
use crate::error::ApiError;
use crate::extract::PathParam;
use crate::flash;
use crate::guard::{require_login, require_owner};
use crate::pages::{Layout, MessagePage, MessageView, NewMessagePage, found, render};
use crate::session::CurrentUser;

/// GET /messages/new
pub async fn new_message_form(current: CurrentUser, jar: CookieJar) -> Result<Response, ApiError> {
    require_login(&current)?;
    let (jar, layout) = Layout::take(current, jar);
    render(jar, NewMessagePage { layout })
}

/// POST /messages/new: The new message belongs to whoever is logged in.
pub async fn create_message(
    State(state): State<AppState>,
    current: CurrentUser,
    jar: CookieJar,
    Form(form): Form<MessageForm>,
) -> Result<Response, ApiError> {
    let me = require_login(&current)?.id;

    let text = form.text.trim().to_string();
    if text.is_empty() || text.chars().count() > MAX_MESSAGE_LEN {
        let (jar, mut layout) = Layout::take(current, jar);
        layout.flash(
            flash::DANGER,
            format!("Messages must be between 1 and {MAX_MESSAGE_LEN} characters."),
        );
        return render(jar, NewMessagePage { layout });
    }

    let message = blocking(&state, move |s| {
        Ok(s.db.insert_message(&NewMessage::new(me, text))?)
    })
    .await?;

    info!("User #{} posted message {}", me, message.id);
    Ok(found(format!("/users/{me}")))
}

/// GET /messages/{id}
pub async fn show_message(
    State(state): State<AppState>,
    current: CurrentUser,
    jar: CookieJar,
    PathParam(message_id): PathParam<MessageId>,
) -> Result<Response, ApiError> {
    let viewer = current.id();
    let (message, liked) = blocking(&state, move |s| {
        let message = s.db.get_message(message_id)?.ok_or(ApiError::NotFound)?;
        let liked: HashSet<MessageId> = match viewer {
            Some(v) => s.db.liked_message_ids(v)?.into_iter().collect(),
            None => HashSet::new(),
        };
        Ok((message, liked))
    })
    .await?;

    let (jar, layout) = Layout::take(current, jar);
    render(
        jar,
        MessagePage {
            layout,
            message: MessageView::new(message, viewer, &liked),
        },
    )
}

/// POST /messages/{id}/delete: Only the author may delete.
pub async fn delete_message(
    State(state): State<AppState>,
    current: CurrentUser,
    PathParam(message_id): PathParam<MessageId>,
) -> Result<Response, ApiError> {
    let me = require_login(&current)?.id;

    let outcome = blocking(&state, move |s| {
        Ok(s.db.delete_message_if(message_id, |author| {
            require_owner(&current, author).is_ok()
        })?)
    })
    .await?;

    match outcome {
        Checked::Done(()) => {
            info!("User #{} deleted message {}", me, message_id);
            Ok(found(format!("/users/{me}")))
        }
        Checked::Missing => Err(ApiError::NotFound),
        Checked::Refused => Err(ApiError::Unauthorized),
    }
}
