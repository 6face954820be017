use std::collections::HashSet;

use axum::{
    Form,
    extract::{Query, State},
    response::{IntoResponse, Response},
};
use axum_extra::extract::CookieJar;
use tracing::{info, warn};

use warbler_db::ProfileUpdate;
use warbler_types::api::{ProfileForm, SearchQuery};
use warbler_types::models::{MessageId, User, UserId, UserStats};

use crate::auth::{AppState, blocking};
use crate::error::ApiError;
use crate::extract::PathParam;
use crate::flash;
use crate::guard::require_login;
use crate::pages::{
    EditProfilePage, FollowsPage, Layout, MessageView, PAGE_SIZE, ProfilePage, UserCard,
    UsersPage, found, render,
};
use crate::session::{self, CurrentUser};

/// Everything a profile header needs, loaded in one blocking call.
struct Profile {
    user: User,
    stats: UserStats,
    viewer_follows: bool,
}

/// GET /users: All users, or those matching `?q=`.
pub async fn list_users(
    State(state): State<AppState>,
    current: CurrentUser,
    jar: CookieJar,
    Query(query): Query<SearchQuery>,
) -> Result<Response, ApiError> {
    let viewer = current.id();
    let q = query.q.unwrap_or_default();

    let search = q.clone();
    let (users, followed) = blocking(&state, move |s| {
        let users = s.db.search_users(Some(search.as_str()))?;
        Ok((users, following_ids(s, viewer)?))
    })
    .await?;

    let (jar, layout) = Layout::take(current, jar);
    render(
        jar,
        UsersPage {
            layout,
            q,
            users: UserCard::list(users, viewer, &followed),
        },
    )
}

/// GET /users/{id}: Profile with the account's own messages.
pub async fn show_user(
    State(state): State<AppState>,
    current: CurrentUser,
    jar: CookieJar,
    PathParam(user_id): PathParam<UserId>,
) -> Result<Response, ApiError> {
    let viewer = current.id();
    let (profile, messages, liked) = blocking(&state, move |s| {
        let profile = load_profile(s, user_id, viewer)?;
        let messages = s.db.messages_by_user(user_id, PAGE_SIZE)?;
        Ok((profile, messages, liked_ids(s, viewer)?))
    })
    .await?;

    let (jar, layout) = Layout::take(current, jar);
    render(
        jar,
        ProfilePage {
            layout,
            user: profile_card(profile.user, viewer, profile.viewer_follows),
            stats: profile.stats,
            heading: "Messages",
            messages: MessageView::list(messages, viewer, &liked),
        },
    )
}

/// GET /users/{id}/likes: Messages the account has liked.
pub async fn show_likes(
    State(state): State<AppState>,
    current: CurrentUser,
    jar: CookieJar,
    PathParam(user_id): PathParam<UserId>,
) -> Result<Response, ApiError> {
    let viewer = require_login(&current)?.id;
    let (profile, messages, liked) = blocking(&state, move |s| {
        let profile = load_profile(s, user_id, Some(viewer))?;
        let messages = s.db.liked_messages(user_id, PAGE_SIZE)?;
        Ok((profile, messages, liked_ids(s, Some(viewer))?))
    })
    .await?;

    let (jar, layout) = Layout::take(current, jar);
    render(
        jar,
        ProfilePage {
            layout,
            user: profile_card(profile.user, Some(viewer), profile.viewer_follows),
            stats: profile.stats,
            heading: "Liked messages",
            messages: MessageView::list(messages, Some(viewer), &liked),
        },
    )
}

/// GET /users/{id}/following
pub async fn show_following(
    state: State<AppState>,
    current: CurrentUser,
    jar: CookieJar,
    PathParam(user_id): PathParam<UserId>,
) -> Result<Response, ApiError> {
    show_follows(state, current, jar, user_id, Direction::Following).await
}

/// GET /users/{id}/followers
pub async fn show_followers(
    state: State<AppState>,
    current: CurrentUser,
    jar: CookieJar,
    PathParam(user_id): PathParam<UserId>,
) -> Result<Response, ApiError> {
    show_follows(state, current, jar, user_id, Direction::Followers).await
}

#[derive(Clone, Copy)]
enum Direction {
    Following,
    Followers,
}

async fn show_follows(
    State(state): State<AppState>,
    current: CurrentUser,
    jar: CookieJar,
    user_id: UserId,
    direction: Direction,
) -> Result<Response, ApiError> {
    let viewer = require_login(&current)?.id;
    let (profile, users, followed) = blocking(&state, move |s| {
        let profile = load_profile(s, user_id, Some(viewer))?;
        let users = match direction {
            Direction::Following => s.db.following(user_id)?,
            Direction::Followers => s.db.followers(user_id)?,
        };
        Ok((profile, users, following_ids(s, Some(viewer))?))
    })
    .await?;

    let heading = match direction {
        Direction::Following => "Following",
        Direction::Followers => "Followers",
    };

    let (jar, layout) = Layout::take(current, jar);
    render(
        jar,
        FollowsPage {
            layout,
            user: profile_card(profile.user, Some(viewer), profile.viewer_follows),
            stats: profile.stats,
            heading,
            users: UserCard::list(users, Some(viewer), &followed),
        },
    )
}

/// POST /users/follow/{id}
pub async fn follow(
    State(state): State<AppState>,
    current: CurrentUser,
    PathParam(followed_id): PathParam<UserId>,
) -> Result<Response, ApiError> {
    let me = require_login(&current)?.id;

    blocking(&state, move |s| {
        if s.db.get_user(followed_id)?.is_none() {
            return Err(ApiError::NotFound);
        }
        s.db.follow(me, followed_id)?;
        Ok(())
    })
    .await?;

    info!("User #{} followed #{}", me, followed_id);
    Ok(found(format!("/users/{me}/following")))
}

/// POST /users/stop-following/{id}
pub async fn stop_following(
    State(state): State<AppState>,
    current: CurrentUser,
    PathParam(followed_id): PathParam<UserId>,
) -> Result<Response, ApiError> {
    let me = require_login(&current)?.id;

    let removed = blocking(&state, move |s| Ok(s.db.unfollow(me, followed_id)?)).await?;
    if removed {
        info!("User #{} unfollowed #{}", me, followed_id);
    }

    Ok(found(format!("/users/{me}/following")))
}

/// GET /users/profile
pub async fn edit_profile_form(current: CurrentUser, jar: CookieJar) -> Result<Response, ApiError> {
    let user = require_login(&current)?.clone();
    let (jar, layout) = Layout::take(current, jar);

    let email = user.email.clone();
    render(
        jar,
        EditProfilePage {
            user: UserCard::new(user, layout.current_id(), &HashSet::new()),
            email,
            layout,
        },
    )
}

/// POST /users/profile: Changes apply only after the password checks out.
pub async fn edit_profile(
    State(state): State<AppState>,
    current: CurrentUser,
    jar: CookieJar,
    Form(form): Form<ProfileForm>,
) -> Result<Response, ApiError> {
    let me = require_login(&current)?.clone();

    let username = me.username.clone();
    let update = ProfileUpdate {
        username: form.username.trim().to_string(),
        email: form.email.trim().to_string(),
        image_url: Some(form.image_url),
        header_image_url: Some(form.header_image_url),
        bio: Some(form.bio),
        location: Some(form.location),
    };
    let password = form.password;

    if update.username.is_empty() || update.email.is_empty() {
        return edit_page_with_error(current, jar, me, "Username and email are required.");
    }

    let outcome = blocking(&state, move |s| {
        if s.db.authenticate(&s.credentials, &username, &password)?.is_none() {
            return Ok(Edit::WrongPassword);
        }
        match s.db.update_profile(me.id, &update) {
            Ok(Some(user)) => Ok(Edit::Saved(user)),
            Ok(None) => Err(ApiError::Unauthorized),
            Err(e) if e.is_integrity() => Ok(Edit::Taken),
            Err(e) => Err(e.into()),
        }
    })
    .await?;

    match outcome {
        Edit::Saved(user) => {
            info!("User #{} updated their profile", user.id);
            Ok(found(format!("/users/{}", user.id)))
        }
        Edit::WrongPassword => {
            warn!("Profile edit for #{} refused: wrong password", me.id);
            let jar = flash::push(jar, flash::DANGER, "Wrong password, please try again.");
            Ok((jar, found("/")).into_response())
        }
        Edit::Taken => edit_page_with_error(current, jar, me, "Username or email already taken."),
    }
}

/// Re-render the edit form, unchanged, with a danger notice.
fn edit_page_with_error(
    current: CurrentUser,
    jar: CookieJar,
    me: User,
    message: &str,
) -> Result<Response, ApiError> {
    let (jar, mut layout) = Layout::take(current, jar);
    layout.flash(flash::DANGER, message);
    render(
        jar,
        EditProfilePage {
            email: me.email.clone(),
            user: UserCard::new(me, layout.current_id(), &HashSet::new()),
            layout,
        },
    )
}

enum Edit {
    Saved(User),
    WrongPassword,
    Taken,
}

/// POST /users/delete: Removes the account and everything it owns.
pub async fn delete_user(
    State(state): State<AppState>,
    current: CurrentUser,
    jar: CookieJar,
) -> Result<Response, ApiError> {
    let me = require_login(&current)?.id;

    blocking(&state, move |s| Ok(s.db.delete_user(me)?)).await?;
    info!("User #{} deleted their account", me);

    let jar = session::logout(jar);
    Ok((jar, found("/signup")).into_response())
}

fn load_profile(
    s: &crate::AppStateInner,
    user_id: UserId,
    viewer: Option<UserId>,
) -> Result<Profile, ApiError> {
    let user = s.db.get_user(user_id)?.ok_or(ApiError::NotFound)?;
    let stats = s.db.user_stats(user_id)?;
    let viewer_follows = match viewer {
        Some(v) if v != user_id => s.db.is_following(v, user_id)?,
        _ => false,
    };

    Ok(Profile {
        user,
        stats,
        viewer_follows,
    })
}

fn profile_card(user: User, viewer: Option<UserId>, viewer_follows: bool) -> UserCard {
    let followed: HashSet<UserId> = if viewer_follows {
        HashSet::from([user.id])
    } else {
        HashSet::new()
    };
    UserCard::new(user, viewer, &followed)
}

fn following_ids(s: &crate::AppStateInner, viewer: Option<UserId>) -> Result<HashSet<UserId>, ApiError> {
    let Some(viewer) = viewer else {
        return Ok(HashSet::new());
    };
    Ok(s.db.following(viewer)?.into_iter().map(|u| u.id).collect())
}

fn liked_ids(s: &crate::AppStateInner, viewer: Option<UserId>) -> Result<HashSet<MessageId>, ApiError> {
    let Some(viewer) = viewer else {
        return Ok(HashSet::new());
    };
    Ok(s.db.liked_message_ids(viewer)?.into_iter().collect())
}
