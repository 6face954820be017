use axum::{
    Router, middleware,
    routing::{get, post},
};

use crate::auth::{self, AppState};
use crate::{flash, likes, messages, pages, users};

/// Every page and form action. Access control lives in the handlers, which
/// consult the guard with the request's `CurrentUser`.
pub fn router(state: AppState) -> Router {
    let account_routes = Router::new()
        .route("/signup", get(auth::signup_form).post(auth::signup))
        .route("/login", get(auth::login_form).post(auth::login))
        .route("/logout", get(auth::logout));

    let user_routes = Router::new()
        .route("/users", get(users::list_users))
        .route(
            "/users/profile",
            get(users::edit_profile_form).post(users::edit_profile),
        )
        .route("/users/delete", post(users::delete_user))
        .route("/users/follow/{id}", post(users::follow))
        .route("/users/stop-following/{id}", post(users::stop_following))
        .route("/users/add_like/{message_id}", post(likes::toggle_like))
        .route("/users/{id}", get(users::show_user))
        .route("/users/{id}/following", get(users::show_following))
        .route("/users/{id}/followers", get(users::show_followers))
        .route("/users/{id}/likes", get(users::show_likes));

    let message_routes = Router::new()
        .route(
            "/messages/new",
            get(messages::new_message_form).post(messages::create_message),
        )
        .route("/messages/{id}", get(messages::show_message))
        .route("/messages/{id}/delete", post(messages::delete_message));

    Router::new()
        .route("/", get(pages::homepage))
        .merge(account_routes)
        .merge(user_routes)
        .merge(message_routes)
        .fallback(pages::not_found)
        .layer(middleware::from_fn(flash::carry_denials))
        .with_state(state)
}
