//! API middleware.

use axum::{body::Body, extract::State, http::Request, middleware::Next, response::Response};
use souk_core::{ConversationService, NotificationService};
use souk_db::repositories::UserRepository;

use crate::streaming::StreamingState;

/// Application state.
#[derive(Clone)]
pub struct AppState {
    pub conversation_service: ConversationService,
    pub notification_service: NotificationService,
    pub user_repo: UserRepository,
    pub streaming: StreamingState,
}

/// Authentication middleware.
///
/// Resolves a bearer token to a user and stores it in request extensions;
/// handlers decide via [`crate::extractors::AuthUser`] whether auth is
/// mandatory. Expired or unknown tokens simply resolve to no user, which
/// surfaces as a 401 from the extractor.
pub async fn auth_middleware(
    State(state): State<AppState>,
    mut req: Request<Body>,
    next: Next,
) -> Response {
    if let Some(auth_header) = req.headers().get("Authorization")
        && let Ok(auth_str) = auth_header.to_str()
        && let Some(token) = auth_str.strip_prefix("Bearer ")
        && let Ok(Some(user)) = state.user_repo.find_by_token(token).await
    {
        req.extensions_mut().insert(user);
    }

    next.run(req).await
}
