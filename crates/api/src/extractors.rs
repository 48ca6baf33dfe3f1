//! Request extractors.

use axum::{extract::FromRequestParts, http::request::Parts};
use souk_common::AppError;
use souk_db::entities::user;

/// Authenticated user extractor.
///
/// Rejects with [`AppError::Unauthorized`] so a handler reached without the
/// auth middleware still answers in the standard error envelope.
#[derive(Debug, Clone)]
pub struct AuthUser(pub user::Model);

impl<S> FromRequestParts<S> for AuthUser
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        // Set by the auth middleware
        parts
            .extensions
            .get::<user::Model>()
            .cloned()
            .map(AuthUser)
            .ok_or(AppError::Unauthorized)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use axum::http::Request;
    use chrono::Utc;

    fn request_parts() -> Parts {
        let (parts, ()) = Request::builder().body(()).unwrap().into_parts();
        parts
    }

    #[tokio::test]
    async fn missing_user_extension_rejects_with_app_error() {
        let mut parts = request_parts();

        let rejection = AuthUser::from_request_parts(&mut parts, &())
            .await
            .unwrap_err();
        assert!(matches!(rejection, AppError::Unauthorized));
    }

    #[tokio::test]
    async fn user_extension_is_extracted() {
        let mut parts = request_parts();
        parts.extensions.insert(user::Model {
            id: "u1".to_string(),
            username: "buyer".to_string(),
            token: Some("tok".to_string()),
            is_admin: false,
            created_at: Utc::now().into(),
        });

        let AuthUser(user) = AuthUser::from_request_parts(&mut parts, &())
            .await
            .unwrap();
        assert_eq!(user.id, "u1");
    }
}
