//! Authorization checks run before every mutation.

use tracing::warn;

use warbler_types::models::{User, UserId};

use crate::error::ApiError;
use crate::session::CurrentUser;

/// Permit iff an identity is present and it owns the resource.
pub fn permits(identity: Option<UserId>, owner: UserId) -> bool {
    identity.is_some_and(|id| id == owner)
}

pub fn require_login(current: &CurrentUser) -> Result<&User, ApiError> {
    current.0.as_ref().ok_or_else(|| {
        warn!("Anonymous request refused");
        ApiError::Unauthorized
    })
}

pub fn require_owner(current: &CurrentUser, owner: UserId) -> Result<&User, ApiError> {
    let user = require_login(current)?;
    if !permits(Some(user.id), owner) {
        warn!("User #{} refused on resource owned by #{}", user.id, owner);
        return Err(ApiError::Unauthorized);
    }
    Ok(user)
}

#[cfg(test)]
mod tests {
    use super::*;
    use warbler_types::models::{DEFAULT_HEADER_IMAGE_URL, DEFAULT_IMAGE_URL};

    fn acting(id: UserId) -> CurrentUser {
        CurrentUser(Some(User {
            id,
            username: format!("user{id}"),
            email: format!("user{id}@gmail.com"),
            image_url: DEFAULT_IMAGE_URL.into(),
            header_image_url: DEFAULT_HEADER_IMAGE_URL.into(),
            bio: None,
            location: None,
        }))
    }

    #[test]
    fn permits_only_the_owner() {
        assert!(permits(Some(1111), 1111));
        assert!(!permits(Some(2222), 1111));
        assert!(!permits(None, 1111));
    }

    #[test]
    fn anonymous_is_refused() {
        let anon = CurrentUser(None);
        assert!(matches!(require_login(&anon), Err(ApiError::Unauthorized)));
        assert!(matches!(require_owner(&anon, 1111), Err(ApiError::Unauthorized)));
    }

    #[test]
    fn owner_check() {
        assert_eq!(require_owner(&acting(1111), 1111).unwrap().id, 1111);
        assert!(matches!(require_owner(&acting(2222), 1111), Err(ApiError::Unauthorized)));
    }
}
