use serde::{Deserialize, Serialize};

use crate::models::UserId;

// -- Session --

/// Claims carried in the signed session cookie.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionClaims {
    pub sub: UserId,
    pub exp: usize,
}

// -- Auth --

/// Every field is optional so an omitted field reaches the account layer
/// and fails there, the same way a blank one does.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SignupForm {
    pub username: Option<String>,
    pub email: Option<String>,
    pub password: Option<String>,
    pub image_url: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LoginForm {
    pub username: String,
    pub password: String,
}

// -- Users --

#[derive(Debug, Default, Deserialize)]
pub struct SearchQuery {
    pub q: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ProfileForm {
    pub username: String,
    pub email: String,
    #[serde(default)]
    pub image_url: String,
    #[serde(default)]
    pub header_image_url: String,
    #[serde(default)]
    pub bio: String,
    #[serde(default)]
    pub location: String,
    pub password: String,
}

// -- Messages --

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MessageForm {
    pub text: String,
}
