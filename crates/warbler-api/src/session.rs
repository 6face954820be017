use axum::{extract::FromRequestParts, http::request::Parts};
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use jsonwebtoken::{DecodingKey, EncodingKey, Header, Validation, decode, encode};
use tracing::debug;

use warbler_types::api::SessionClaims;
use warbler_types::models::{User, UserId};

use crate::auth::{AppState, blocking};
use crate::error::ApiError;

pub const SESSION_COOKIE: &str = "curr_user";

/// The account acting on this request, resolved from the session cookie.
///
/// `None` covers every anonymous case: no cookie, a bad or expired token,
/// and a token naming an account that no longer exists.
#[derive(Debug, Clone)]
pub struct CurrentUser(pub Option<User>);

impl CurrentUser {
    pub fn id(&self) -> Option<UserId> {
        self.0.as_ref().map(|u| u.id)
    }
}

impl FromRequestParts<AppState> for CurrentUser {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let jar = CookieJar::from_headers(&parts.headers);
        let Some(user_id) = jar
            .get(SESSION_COOKIE)
            .and_then(|c| decode_token(&state.session_secret, c.value()))
        else {
            return Ok(Self(None));
        };

        let user = blocking(state, move |s| Ok(s.db.get_user(user_id)?)).await?;
        if user.is_none() {
            debug!("Session names unknown user #{}", user_id);
        }

        Ok(Self(user))
    }
}

pub fn issue_token(secret: &str, user_id: UserId, days: i64) -> Result<String, ApiError> {
    let claims = SessionClaims {
        sub: user_id,
        exp: (chrono::Utc::now() + chrono::Duration::days(days)).timestamp() as usize,
    };

    let token = encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )?;

    Ok(token)
}

pub fn decode_token(secret: &str, token: &str) -> Option<UserId> {
    decode::<SessionClaims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &Validation::default(),
    )
    .map(|data| data.claims.sub)
    .map_err(|e| debug!("Rejected session token: {}", e))
    .ok()
}

/// Attach a fresh session for `user_id`.
pub fn login(jar: CookieJar, state: &AppState, user_id: UserId) -> Result<CookieJar, ApiError> {
    let token = issue_token(&state.session_secret, user_id, state.session_days)?;

    Ok(jar.add(
        Cookie::build((SESSION_COOKIE, token))
            .path("/")
            .http_only(true)
            .same_site(SameSite::Lax),
    ))
}

pub fn logout(jar: CookieJar) -> CookieJar {
    jar.remove(Cookie::build(SESSION_COOKIE).path("/"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn token_roundtrip() {
        let token = issue_token("secret", 1111, 1).unwrap();
        assert_eq!(decode_token("secret", &token), Some(1111));
    }

    #[test]
    fn token_signed_with_other_secret_is_anonymous() {
        let token = issue_token("secret", 1111, 1).unwrap();
        assert_eq!(decode_token("another-secret", &token), None);
    }

    #[test]
    fn expired_token_is_anonymous() {
        let token = issue_token("secret", 1111, -2).unwrap();
        assert_eq!(decode_token("secret", &token), None);
    }

    #[test]
    fn garbage_token_is_anonymous() {
        assert_eq!(decode_token("secret", "not-a-jwt"), None);
    }
}
