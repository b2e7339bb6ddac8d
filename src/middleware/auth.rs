use axum::{
    extract::{Request, State},
    http::{header::AUTHORIZATION, HeaderMap},
    middleware::Next,
    response::Response,
};
use tracing::debug;

use crate::auth::{AuthUser, Authenticator};
use crate::error::ApiError;

/// Session resolved for the current request, injected by `session_middleware`
#[derive(Clone, Debug, Default)]
pub struct SessionContext {
    pub user: Option<AuthUser>,
}

/// Session middleware that resolves the Authorization token and injects the
/// user context. Missing or unknown tokens leave the request anonymous; only
/// a failing session store ends it.
pub async fn session_middleware(
    State(auth): State<Authenticator>,
    mut request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let header = authorization_header(request.headers());
    let user = auth.resolve(header.as_deref()).await?;

    match &user {
        Some(user) => debug!("Request authenticated as user {}", user.id),
        None => debug!("Anonymous request"),
    }
    request.extensions_mut().insert(SessionContext { user });

    Ok(next.run(request).await)
}

/// Raw Authorization header, if present and valid ASCII
pub fn authorization_header(headers: &HeaderMap) -> Option<String> {
    headers
        .get(AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .map(str::to_string)
}
