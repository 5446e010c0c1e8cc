use axum::{
    async_trait,
    extract::{FromRef, FromRequestParts},
    http::{header::AUTHORIZATION, request::Parts, HeaderMap},
};
use tracing::warn;

use super::jwt::TokenCodec;
use crate::{error::AppError, state::AppState, users::repo::UserStore};

/// Turns a bearer token into the caller's email.
pub struct IdentityResolver<'a> {
    tokens: &'a TokenCodec,
}

impl<'a> IdentityResolver<'a> {
    pub fn new(tokens: &'a TokenCodec) -> Self {
        Self { tokens }
    }

    /// With a store, the account must still exist; deleting it revokes its tokens.
    pub async fn resolve(
        &self,
        headers: &HeaderMap,
        store: Option<&dyn UserStore>,
    ) -> Result<String, AppError> {
        let token = bearer_token(headers)?;

        let email = self.tokens.verify(token).map_err(|e| {
            warn!(error = %e, "token rejected");
            AppError::unauthenticated("invalid or expired token")
        })?;

        if let Some(store) = store {
            if store.find_by_email(&email).await?.is_none() {
                warn!(email = %email, "token for unknown account");
                return Err(AppError::unauthenticated("invalid or expired token"));
            }
        }

        Ok(email)
    }
}

fn bearer_token(headers: &HeaderMap) -> Result<&str, AppError> {
    let auth = headers
        .get(AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .ok_or_else(|| AppError::unauthenticated("missing Authorization header"))?;

    auth.strip_prefix("Bearer ")
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .ok_or_else(|| AppError::unauthenticated("invalid auth scheme"))
}

/// Caller whose token verifies and whose account still exists.
pub struct AuthUser(pub String);

#[async_trait]
impl FromRequestParts<AppState> for AuthUser {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let email = IdentityResolver::new(&state.tokens)
            .resolve(&parts.headers, Some(state.users.as_ref()))
            .await?;
        Ok(AuthUser(email))
    }
}

/// Signature-only variant: no store lookup.
pub struct BearerIdentity(pub String);

#[async_trait]
impl<S> FromRequestParts<S> for BearerIdentity
where
    S: Send + Sync,
    TokenCodec: FromRef<S>,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let tokens = TokenCodec::from_ref(state);
        let email = IdentityResolver::new(&tokens)
            .resolve(&parts.headers, None)
            .await?;
        Ok(BearerIdentity(email))
    }
}
