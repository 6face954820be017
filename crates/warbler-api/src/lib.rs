pub mod auth;
pub mod error;
pub mod extract;
pub mod flash;
pub mod guard;
pub mod likes;
pub mod messages;
pub mod pages;
pub mod routes;
pub mod session;
pub mod users;

pub use auth::{AppState, AppStateInner};
pub use error::ApiError;
pub use routes::router;
