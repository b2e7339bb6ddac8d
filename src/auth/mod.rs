pub mod session_store;
pub mod user;

pub use session_store::{MemorySessionStore, PgSessionStore, SessionError, SessionStore};
pub use user::{AuthUser, EntityUserLookup, UserLookup};

use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::database::storage::StorageError;
use crate::services::RequestContext;

#[derive(Debug, Error)]
pub enum AuthError {
    #[error(transparent)]
    Session(#[from] SessionError),

    #[error(transparent)]
    Storage(#[from] StorageError),
}

/// Issues, stores, resolves and invalidates session tokens.
///
/// A request is anonymous until its `Authorization: <scheme> <token>` header
/// resolves through the session store to an existing user. Missing,
/// malformed and unknown tokens all leave it anonymous.
#[derive(Clone)]
pub struct Authenticator {
    store: Arc<dyn SessionStore>,
    users: Arc<dyn UserLookup>,
}

impl Authenticator {
    pub fn new(store: Arc<dyn SessionStore>, users: Arc<dyn UserLookup>) -> Self {
        Self { store, users }
    }

    /// Reuse the caller's token if the header carries one, else mint a new
    /// 128-bit hex token. Nothing is persisted.
    pub fn issue_token(&self, authorization: Option<&str>) -> String {
        parse_authorization(authorization)
            .map(str::to_string)
            .unwrap_or_else(|| Uuid::new_v4().simple().to_string())
    }

    /// Bind `token` to the user. The stored value is the user's primary key.
    pub async fn login(&self, user: &AuthUser, token: &str) -> Result<String, AuthError> {
        self.store.set(token, &user.id.to_string()).await?;
        debug!("Session opened for user {}", user.id);
        Ok(token.to_string())
    }

    /// Resolve the header to a user, or `None` for an anonymous request.
    pub async fn resolve(&self, authorization: Option<&str>) -> Result<Option<AuthUser>, AuthError> {
        let Some(token) = parse_authorization(authorization) else {
            return Ok(None);
        };
        let Some(stored) = self.store.get(token).await? else {
            debug!("Unknown session token, treating request as anonymous");
            return Ok(None);
        };
        let Ok(user_id) = stored.parse::<i64>() else {
            warn!("Session entry holds a non-numeric user id, ignoring it");
            return Ok(None);
        };
        let user = self.users.find_by_id(user_id).await?;
        if user.is_none() {
            debug!("Session points at missing user {}", user_id);
        }
        Ok(user)
    }

    /// Delete the current token's session entry, returning what it held.
    pub async fn logout(&self, authorization: Option<&str>) -> Result<Option<String>, AuthError> {
        let Some(token) = parse_authorization(authorization) else {
            return Ok(None);
        };
        let stored = self.store.get(token).await?;
        self.store.delete(token).await?;
        Ok(stored)
    }

    /// Resolve the request's user once; later calls reuse the result.
    pub async fn authenticate(&self, ctx: &mut RequestContext) -> Result<Option<AuthUser>, AuthError> {
        if !ctx.session_resolved {
            ctx.user = self.resolve(ctx.authorization.as_deref()).await?;
            ctx.session_resolved = true;
        }
        Ok(ctx.user.clone())
    }
}

/// Token part of `<scheme> <token>`; anything else yields `None`.
pub fn parse_authorization(header: Option<&str>) -> Option<&str> {
    let mut parts = header?.split_whitespace();
    let (_scheme, token) = (parts.next()?, parts.next()?);
    if parts.next().is_some() {
        return None;
    }
    Some(token)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Method;
    use async_trait::async_trait;

    struct FixedUsers;

    #[async_trait]
    impl UserLookup for FixedUsers {
        async fn find_by_id(&self, id: i64) -> Result<Option<AuthUser>, StorageError> {
            Ok((id == 1).then(|| AuthUser::new(1, Some("alice".to_string()))))
        }
    }

    fn authenticator() -> Authenticator {
        Authenticator::new(Arc::new(MemorySessionStore::new()), Arc::new(FixedUsers))
    }

    #[test]
    fn parses_scheme_and_token() {
        assert_eq!(parse_authorization(Some("Token abc123")), Some("abc123"));
        assert_eq!(parse_authorization(Some("Bearer  abc123 ")), Some("abc123"));
        assert_eq!(parse_authorization(Some("abc123")), None);
        assert_eq!(parse_authorization(Some("Token a b")), None);
        assert_eq!(parse_authorization(None), None);
    }

    #[test]
    fn issues_fresh_hex_tokens_or_reuses_header() {
        let auth = authenticator();
        let token = auth.issue_token(None);
        assert_eq!(token.len(), 32);
        assert!(token.chars().all(|c| c.is_ascii_hexdigit()));
        assert_ne!(token, auth.issue_token(None));
        assert_eq!(auth.issue_token(Some("Token keepme")), "keepme");
    }

    #[tokio::test]
    async fn login_then_resolve_then_logout() {
        let auth = authenticator();
        let user = AuthUser::new(1, Some("alice".to_string()));
        let token = auth.login(&user, "t0k3n").await.unwrap();
        let header = format!("Token {}", token);

        assert_eq!(auth.resolve(Some(&header)).await.unwrap(), Some(user));
        assert_eq!(auth.logout(Some(&header)).await.unwrap(), Some("1".to_string()));
        assert_eq!(auth.resolve(Some(&header)).await.unwrap(), None);
        assert_eq!(auth.logout(Some(&header)).await.unwrap(), None);
    }

    #[tokio::test]
    async fn unknown_or_dangling_tokens_are_anonymous() {
        let auth = authenticator();
        assert_eq!(auth.resolve(Some("Token nope")).await.unwrap(), None);
        assert_eq!(auth.resolve(Some("garbage")).await.unwrap(), None);

        auth.login(&AuthUser::new(2, None), "ghost").await.unwrap();
        assert_eq!(auth.resolve(Some("Token ghost")).await.unwrap(), None);
    }

    #[tokio::test]
    async fn authenticate_resolves_once() {
        let auth = authenticator();
        auth.login(&AuthUser::new(1, None), "t").await.unwrap();
        let mut ctx = RequestContext::new(Method::Get).with_authorization("Token t");
        assert_eq!(auth.authenticate(&mut ctx).await.unwrap().map(|u| u.id), Some(1));
        assert!(ctx.session_resolved);

        auth.logout(Some("Token t")).await.unwrap();
        assert_eq!(auth.authenticate(&mut ctx).await.unwrap().map(|u| u.id), Some(1));
    }
}
