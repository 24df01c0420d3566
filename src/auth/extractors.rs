use axum::{
    async_trait,
    extract::{FromRef, FromRequestParts},
    http::{header, request::Parts, StatusCode},
};
use tracing::warn;
use uuid::Uuid;

use crate::auth::tokens::{SessionKeys, TokenKind};

pub const SESSION_COOKIE: &str = "session";

/// Guard for routes that require a logged-in caller. Rejects with 401 when
/// no valid session token is presented.
pub struct AuthUser(pub Uuid);

/// Infallible variant: resolves to `None` for anonymous callers instead of
/// rejecting. Used by routes that only change behavior when logged in.
pub struct MaybeUser(pub Option<Uuid>);

fn bearer_token(parts: &Parts) -> Option<&str> {
    parts
        .headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer ").or_else(|| v.strip_prefix("bearer ")))
}

fn cookie_token<'a>(parts: &'a Parts, name: &str) -> Option<&'a str> {
    let cookies = parts.headers.get(header::COOKIE)?.to_str().ok()?;
    cookies.split(';').find_map(|pair| {
        let (k, v) = pair.trim().split_once('=')?;
        (k == name).then_some(v)
    })
}

fn session_user(parts: &Parts, keys: &SessionKeys) -> Option<Uuid> {
    let token = bearer_token(parts).or_else(|| cookie_token(parts, SESSION_COOKIE))?;
    match keys.verify(token) {
        Ok(claims) if claims.kind == TokenKind::Session => Some(claims.sub),
        Ok(_) => None,
        Err(_) => None,
    }
}

#[async_trait]
impl<S> FromRequestParts<S> for AuthUser
where
    S: Send + Sync,
    SessionKeys: FromRef<S>,
{
    type Rejection = (StatusCode, String);

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let keys = SessionKeys::from_ref(state);
        match session_user(parts, &keys) {
            Some(user_id) => Ok(AuthUser(user_id)),
            None => {
                warn!("missing or invalid session token");
                Err((StatusCode::UNAUTHORIZED, "Login required".to_string()))
            }
        }
    }
}

#[async_trait]
impl<S> FromRequestParts<S> for MaybeUser
where
    S: Send + Sync,
    SessionKeys: FromRef<S>,
{
    type Rejection = std::convert::Infallible;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let keys = SessionKeys::from_ref(state);
        Ok(MaybeUser(session_user(parts, &keys)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::Request;

    fn parts_with(header_name: header::HeaderName, value: &str) -> Parts {
        let req = Request::builder()
            .header(header_name, value)
            .body(())
            .unwrap();
        req.into_parts().0
    }

    #[test]
    fn bearer_header_is_read() {
        let parts = parts_with(header::AUTHORIZATION, "Bearer tok-123");
        assert_eq!(bearer_token(&parts), Some("tok-123"));
    }

    #[test]
    fn session_cookie_is_read_among_others() {
        let parts = parts_with(header::COOKIE, "theme=dark; session=tok-456; lang=en");
        assert_eq!(cookie_token(&parts, SESSION_COOKIE), Some("tok-456"));
    }

    #[test]
    fn missing_credentials_yield_none() {
        let req = Request::builder().body(()).unwrap();
        let parts = req.into_parts().0;
        assert_eq!(bearer_token(&parts), None);
        assert_eq!(cookie_token(&parts, SESSION_COOKIE), None);
    }
}
