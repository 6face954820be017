use std::collections::HashSet;

use askama::Template;
use axum::{
    extract::State,
    http::{StatusCode, header},
    response::{Html, IntoResponse, Response},
};
use axum_extra::extract::CookieJar;

use warbler_types::models::{Message, MessageId, User, UserId, UserStats};

use crate::auth::{AppState, blocking};
use crate::error::ApiError;
use crate::flash::{self, Flash};
use crate::session::CurrentUser;

/// Feed and profile pages show at most this many messages.
pub const PAGE_SIZE: u32 = 100;

// ── Response helpers ────────────────────────────────────────────────────

/// `302 Found`, which is what form posts answer with on success.
pub fn found(location: impl Into<String>) -> Response {
    (StatusCode::FOUND, [(header::LOCATION, location.into())]).into_response()
}

pub fn render<T: Template>(jar: CookieJar, page: T) -> Result<Response, ApiError> {
    Ok((jar, Html(page.render()?)).into_response())
}

/// Everything `base.html` needs: who is logged in and pending notices.
pub struct Layout {
    pub current: Option<User>,
    pub flashes: Vec<Flash>,
}

impl Layout {
    /// Consumes queued flashes from the cookie jar.
    pub fn take(current: CurrentUser, jar: CookieJar) -> (CookieJar, Self) {
        let (jar, flashes) = flash::take(jar);
        (
            jar,
            Self {
                current: current.0,
                flashes,
            },
        )
    }

    /// Add a notice to the page being rendered right now.
    pub fn flash(&mut self, category: &str, message: impl Into<String>) {
        self.flashes.push(Flash {
            category: category.to_string(),
            message: message.into(),
        });
    }

    pub fn current_id(&self) -> Option<UserId> {
        self.current.as_ref().map(|u| u.id)
    }
}

// ── View models ─────────────────────────────────────────────────────────

pub struct MessageView {
    pub id: MessageId,
    pub text: String,
    pub timestamp: String,
    pub user_id: UserId,
    pub username: String,
    pub image_url: String,
    /// The viewer wrote it.
    pub own: bool,
    /// The viewer has liked it.
    pub liked: bool,
    /// A like button makes sense: logged in and not the author.
    pub can_like: bool,
}

impl MessageView {
    pub fn new(message: Message, viewer: Option<UserId>, liked: &HashSet<MessageId>) -> Self {
        let own = viewer == Some(message.user_id);
        Self {
            id: message.id,
            timestamp: message.timestamp.format("%d %B %Y").to_string(),
            liked: liked.contains(&message.id),
            can_like: viewer.is_some() && !own,
            own,
            user_id: message.user_id,
            username: message.author_username,
            image_url: message.author_image_url,
            text: message.text,
        }
    }

    pub fn list(messages: Vec<Message>, viewer: Option<UserId>, liked: &HashSet<MessageId>) -> Vec<Self> {
        messages
            .into_iter()
            .map(|m| Self::new(m, viewer, liked))
            .collect()
    }
}

pub struct UserCard {
    pub id: UserId,
    pub username: String,
    pub image_url: String,
    pub header_image_url: String,
    pub bio: String,
    pub location: String,
    /// The viewer follows this account.
    pub followed: bool,
    /// A follow button makes sense: logged in and not this account.
    pub can_follow: bool,
}

impl UserCard {
    pub fn new(user: User, viewer: Option<UserId>, followed: &HashSet<UserId>) -> Self {
        Self {
            followed: followed.contains(&user.id),
            can_follow: viewer.is_some_and(|v| v != user.id),
            id: user.id,
            username: user.username,
            image_url: user.image_url,
            header_image_url: user.header_image_url,
            bio: user.bio.unwrap_or_default(),
            location: user.location.unwrap_or_default(),
        }
    }

    pub fn list(users: Vec<User>, viewer: Option<UserId>, followed: &HashSet<UserId>) -> Vec<Self> {
        users
            .into_iter()
            .map(|u| Self::new(u, viewer, followed))
            .collect()
    }
}

// ── Templates ───────────────────────────────────────────────────────────

#[derive(Template)]
#[template(path = "home.html")]
pub struct HomePage {
    pub layout: Layout,
    pub user: UserCard,
    pub stats: UserStats,
    pub messages: Vec<MessageView>,
}

#[derive(Template)]
#[template(path = "home_anon.html")]
pub struct AnonHomePage {
    pub layout: Layout,
}

#[derive(Template)]
#[template(path = "signup.html")]
pub struct SignupPage {
    pub layout: Layout,
}

#[derive(Template)]
#[template(path = "login.html")]
pub struct LoginPage {
    pub layout: Layout,
}

#[derive(Template)]
#[template(path = "users/index.html")]
pub struct UsersPage {
    pub layout: Layout,
    pub q: String,
    pub users: Vec<UserCard>,
}

/// Profile header plus either the account's own messages or the ones it liked.
#[derive(Template)]
#[template(path = "users/show.html")]
pub struct ProfilePage {
    pub layout: Layout,
    pub user: UserCard,
    pub stats: UserStats,
    pub heading: &'static str,
    pub messages: Vec<MessageView>,
}

#[derive(Template)]
#[template(path = "users/follows.html")]
pub struct FollowsPage {
    pub layout: Layout,
    pub user: UserCard,
    pub stats: UserStats,
    pub heading: &'static str,
    pub users: Vec<UserCard>,
}

#[derive(Template)]
#[template(path = "users/edit.html")]
pub struct EditProfilePage {
    pub layout: Layout,
    pub user: UserCard,
    pub email: String,
}

#[derive(Template)]
#[template(path = "messages/new.html")]
pub struct NewMessagePage {
    pub layout: Layout,
}

#[derive(Template)]
#[template(path = "messages/show.html")]
pub struct MessagePage {
    pub layout: Layout,
    pub message: MessageView,
}

#[derive(Template)]
#[template(path = "404.html")]
pub struct NotFoundPage;

// ── Handlers ────────────────────────────────────────────────────────────

/// GET /: The feed for a logged-in user, the landing page otherwise.
pub async fn homepage(
    State(state): State<AppState>,
    current: CurrentUser,
    jar: CookieJar,
) -> Result<Response, ApiError> {
    let (jar, layout) = Layout::take(current, jar);
    let Some(user) = layout.current.clone() else {
        return render(jar, AnonHomePage { layout });
    };

    let user_id = user.id;
    let (messages, liked, stats) = blocking(&state, move |s| {
        let messages = s.db.home_feed(user_id, PAGE_SIZE)?;
        let liked: HashSet<MessageId> = s.db.liked_message_ids(user_id)?.into_iter().collect();
        let stats = s.db.user_stats(user_id)?;
        Ok((messages, liked, stats))
    })
    .await?;

    let page = HomePage {
        messages: MessageView::list(messages, Some(user_id), &liked),
        user: UserCard::new(user, Some(user_id), &HashSet::new()),
        stats,
        layout,
    };
    render(jar, page)
}

pub async fn not_found() -> ApiError {
    ApiError::NotFound
}
