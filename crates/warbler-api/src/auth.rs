use std::sync::Arc;

use axum::{
    Form,
    extract::State,
    response::{IntoResponse, Response},
};
use axum_extra::extract::CookieJar;
use tracing::{info, warn};

use warbler_crypto::Credentials;
use warbler_db::{Database, NewUser, SignupError};
use warbler_types::api::{LoginForm, SignupForm};

use crate::error::ApiError;
use crate::flash;
use crate::pages::{Layout, LoginPage, SignupPage, found, render};
use crate::session::{self, CurrentUser};

pub type AppState = Arc<AppStateInner>;

pub struct AppStateInner {
    pub db: Database,
    pub credentials: Credentials,
    pub session_secret: String,
    pub session_days: i64,
}

/// Run blocking work (SQLite, Argon2) off the async runtime.
pub async fn blocking<F, T>(state: &AppState, f: F) -> Result<T, ApiError>
where
    F: FnOnce(&AppStateInner) -> Result<T, ApiError> + Send + 'static,
    T: Send + 'static,
{
    let state = Arc::clone(state);
    tokio::task::spawn_blocking(move || f(&state)).await?
}

pub async fn signup_form(current: CurrentUser, jar: CookieJar) -> Result<Response, ApiError> {
    let (jar, layout) = Layout::take(current, jar);
    render(jar, SignupPage { layout })
}

pub async fn signup(
    State(state): State<AppState>,
    current: CurrentUser,
    jar: CookieJar,
    Form(form): Form<SignupForm>,
) -> Result<Response, ApiError> {
    let outcome = if is_blank(&form.username) || is_blank(&form.email) {
        Err("Username and email are required.".to_string())
    } else {
        blocking(&state, move |s| {
            let staged = match NewUser::signup(
                &s.credentials,
                form.username.as_deref().map(str::trim),
                form.email.as_deref().map(str::trim),
                form.password.as_deref(),
                form.image_url.as_deref(),
            ) {
                Ok(staged) => staged,
                Err(SignupError::Validation(msg)) => return Ok(Err(msg.to_string())),
                Err(e) => return Err(e.into()),
            };

            match s.db.commit_user(&staged) {
                Ok(user) => Ok(Ok(user)),
                Err(e) if e.is_integrity() => Ok(Err("Username or email already taken.".to_string())),
                Err(e) => Err(e.into()),
            }
        })
        .await?
    };

    match outcome {
        Ok(user) => {
            info!("New account #{} ({})", user.id, user.username);
            let jar = session::login(jar, &state, user.id)?;
            Ok((jar, found("/")).into_response())
        }
        Err(msg) => {
            let (jar, mut layout) = Layout::take(current, jar);
            layout.flash(flash::DANGER, msg);
            render(jar, SignupPage { layout })
        }
    }
}

pub async fn login_form(current: CurrentUser, jar: CookieJar) -> Result<Response, ApiError> {
    let (jar, layout) = Layout::take(current, jar);
    render(jar, LoginPage { layout })
}

pub async fn login(
    State(state): State<AppState>,
    current: CurrentUser,
    jar: CookieJar,
    Form(req): Form<LoginForm>,
) -> Result<Response, ApiError> {
    let username = req.username.clone();
    let user = blocking(&state, move |s| {
        Ok(s.db.authenticate(&s.credentials, &req.username, &req.password)?)
    })
    .await?;

    let Some(user) = user else {
        warn!("Failed login for '{}'", username);
        let (jar, mut layout) = Layout::take(current, jar);
        layout.flash(flash::DANGER, "Invalid credentials.");
        return render(jar, LoginPage { layout });
    };

    let jar = session::login(jar, &state, user.id)?;
    let jar = flash::push(jar, flash::SUCCESS, format!("Hello, {}!", user.username));
    Ok((jar, found("/")).into_response())
}

pub async fn logout(jar: CookieJar) -> impl IntoResponse {
    let jar = session::logout(jar);
    let jar = flash::push(jar, flash::SUCCESS, "You have successfully logged out.");
    (jar, found("/login"))
}

fn is_blank(value: &Option<String>) -> bool {
    value.as_deref().is_none_or(|v| v.trim().is_empty())
}
