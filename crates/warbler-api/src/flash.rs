//! One-shot notices carried to the next rendered page in a cookie.

use axum::{
    extract::Request,
    middleware::Next,
    response::{IntoResponse, Response},
};
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD as B64;
use serde::{Deserialize, Serialize};

use crate::error::{Denied, UNAUTHORIZED_NOTICE};

pub const FLASH_COOKIE: &str = "flash";

pub const SUCCESS: &str = "success";
pub const DANGER: &str = "danger";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Flash {
    pub category: String,
    pub message: String,
}

/// Queue a notice for the next page the client renders.
pub fn push(jar: CookieJar, category: &str, message: impl Into<String>) -> CookieJar {
    let mut flashes = read(&jar);
    flashes.push(Flash {
        category: category.to_string(),
        message: message.into(),
    });

    // Vec<Flash> always serializes.
    let encoded = B64.encode(serde_json::to_vec(&flashes).unwrap_or_default());
    jar.add(
        Cookie::build((FLASH_COOKIE, encoded))
            .path("/")
            .http_only(true)
            .same_site(SameSite::Lax),
    )
}

/// Drain queued notices. The cookie is cleared only when there was one.
pub fn take(jar: CookieJar) -> (CookieJar, Vec<Flash>) {
    let flashes = read(&jar);
    if jar.get(FLASH_COOKIE).is_none() {
        return (jar, flashes);
    }

    (jar.remove(Cookie::build(FLASH_COOKIE).path("/")), flashes)
}

/// Middleware: a denied request gets the unauthorized notice appended to the
/// flashes it arrived with, so nothing queued earlier is lost.
pub async fn carry_denials(jar: CookieJar, req: Request, next: Next) -> Response {
    let resp = next.run(req).await;
    if resp.extensions().get::<Denied>().is_none() {
        return resp;
    }

    (push(jar, DANGER, UNAUTHORIZED_NOTICE), resp).into_response()
}

/// A cookie that fails to decode is dropped silently.
fn read(jar: &CookieJar) -> Vec<Flash> {
    jar.get(FLASH_COOKIE)
        .and_then(|c| B64.decode(c.value()).ok())
        .and_then(|bytes| serde_json::from_slice(&bytes).ok())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn push_then_take() {
        let jar = push(CookieJar::new(), DANGER, "Access unauthorized.");
        let jar = push(jar, SUCCESS, "Hello, user1!");

        let (jar, flashes) = take(jar);
        assert_eq!(flashes.len(), 2);
        assert_eq!(flashes[0].message, "Access unauthorized.");
        assert_eq!(flashes[1].category, SUCCESS);

        let (_, again) = take(jar);
        assert!(again.is_empty());
    }

    #[test]
    fn garbage_cookie_is_ignored() {
        let jar = CookieJar::new().add(Cookie::new(FLASH_COOKIE, "%%%not-base64"));
        let (_, flashes) = take(jar);
        assert!(flashes.is_empty());
    }
}
