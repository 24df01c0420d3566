use std::time::Duration;

use axum::extract::FromRef;
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use time::{Duration as TimeDuration, OffsetDateTime};
use tracing::debug;
use uuid::Uuid;

use crate::{config::TokenConfig, state::AppState};

/// What a signed token is good for: a login session or a one-shot
/// password reset.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum TokenKind {
    Session,
    Reset,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    pub sub: Uuid,
    pub exp: usize,
    pub iat: usize,
    pub iss: String,
    pub aud: String,
    pub kind: TokenKind,
}

/// Signing and verification keys derived from the server-wide secret.
#[derive(Clone)]
pub struct SessionKeys {
    pub encoding: EncodingKey,
    pub decoding: DecodingKey,
    pub issuer: String,
    pub audience: String,
    pub session_ttl: Duration,
    pub remember_ttl: Duration,
    pub reset_ttl: Duration,
}

impl FromRef<AppState> for SessionKeys {
    fn from_ref(state: &AppState) -> Self {
        let TokenConfig {
            secret,
            issuer,
            audience,
            session_ttl_minutes,
            remember_ttl_minutes,
            reset_ttl_seconds,
        } = state.config.tokens.clone();
        Self {
            encoding: EncodingKey::from_secret(secret.as_bytes()),
            decoding: DecodingKey::from_secret(secret.as_bytes()),
            issuer,
            audience,
            session_ttl: Duration::from_secs((session_ttl_minutes as u64) * 60),
            remember_ttl: Duration::from_secs((remember_ttl_minutes as u64) * 60),
            reset_ttl: Duration::from_secs(reset_ttl_seconds as u64),
        }
    }
}

impl SessionKeys {
    fn sign_with_ttl(&self, user_id: Uuid, kind: TokenKind, ttl: Duration) -> anyhow::Result<String> {
        let now = OffsetDateTime::now_utc();
        let exp = now + TimeDuration::seconds(ttl.as_secs() as i64);
        let claims = Claims {
            sub: user_id,
            iat: now.unix_timestamp() as usize,
            exp: exp.unix_timestamp() as usize,
            iss: self.issuer.clone(),
            aud: self.audience.clone(),
            kind,
        };
        let token = encode(&Header::default(), &claims, &self.encoding)?;
        debug!(user_id = %user_id, kind = ?kind, "token signed");
        Ok(token)
    }

    /// A `remember` session outlives the browser-session default.
    pub fn sign_session(&self, user_id: Uuid, remember: bool) -> anyhow::Result<String> {
        let ttl = if remember {
            self.remember_ttl
        } else {
            self.session_ttl
        };
        self.sign_with_ttl(user_id, TokenKind::Session, ttl)
    }

    pub fn sign_reset(&self, user_id: Uuid) -> anyhow::Result<String> {
        self.sign_with_ttl(user_id, TokenKind::Reset, self.reset_ttl)
    }

    pub fn verify(&self, token: &str) -> anyhow::Result<Claims> {
        let mut validation = Validation::default();
        validation.set_audience(std::slice::from_ref(&self.audience));
        validation.set_issuer(std::slice::from_ref(&self.issuer));
        let data = decode::<Claims>(token, &self.decoding, &validation)?;
        Ok(data.claims)
    }

    /// Resolves a reset token to the user id it was issued for. Bad
    /// signature, malformed payload, expiry and wrong token kind all
    /// collapse into `None` so callers cannot tell the cases apart.
    pub fn verify_reset(&self, token: &str) -> Option<Uuid> {
        match self.verify(token) {
            Ok(claims) if claims.kind == TokenKind::Reset => Some(claims.sub),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::AppState;

    fn make_keys() -> SessionKeys {
        SessionKeys::from_ref(&AppState::fake())
    }

    #[tokio::test]
    async fn session_roundtrip() {
        let keys = make_keys();
        let user_id = Uuid::new_v4();
        let token = keys.sign_session(user_id, false).expect("sign");
        let claims = keys.verify(&token).expect("verify");
        assert_eq!(claims.sub, user_id);
        assert_eq!(claims.kind, TokenKind::Session);
    }

    #[tokio::test]
    async fn remember_extends_expiry() {
        let keys = make_keys();
        let user_id = Uuid::new_v4();
        let short = keys.sign_session(user_id, false).unwrap();
        let long = keys.sign_session(user_id, true).unwrap();
        let short_exp = keys.verify(&short).unwrap().exp;
        let long_exp = keys.verify(&long).unwrap().exp;
        assert!(long_exp > short_exp);
    }

    #[tokio::test]
    async fn reset_roundtrip() {
        let keys = make_keys();
        let user_id = Uuid::new_v4();
        let token = keys.sign_reset(user_id).expect("sign reset");
        assert_eq!(keys.verify_reset(&token), Some(user_id));
    }

    #[tokio::test]
    async fn tampered_reset_token_resolves_to_none() {
        let keys = make_keys();
        let token = keys.sign_reset(Uuid::new_v4()).unwrap();
        // Flip one character of the signature segment.
        let mut bytes = token.into_bytes();
        let last = bytes.len() - 1;
        bytes[last] = if bytes[last] == b'A' { b'B' } else { b'A' };
        let tampered = String::from_utf8(bytes).unwrap();
        assert_eq!(keys.verify_reset(&tampered), None);
    }

    #[tokio::test]
    async fn expired_reset_token_resolves_to_none() {
        let keys = make_keys();
        // Sign claims whose expiry is already well past the decoder's leeway.
        let now = OffsetDateTime::now_utc().unix_timestamp();
        let claims = Claims {
            sub: Uuid::new_v4(),
            iat: (now - 3600) as usize,
            exp: (now - 1800) as usize,
            iss: keys.issuer.clone(),
            aud: keys.audience.clone(),
            kind: TokenKind::Reset,
        };
        let token = encode(&Header::default(), &claims, &keys.encoding).unwrap();
        assert_eq!(keys.verify_reset(&token), None);
    }

    #[tokio::test]
    async fn session_token_is_not_a_reset_token() {
        let keys = make_keys();
        let token = keys.sign_session(Uuid::new_v4(), false).unwrap();
        assert_eq!(keys.verify_reset(&token), None);
    }

    #[tokio::test]
    async fn garbage_token_resolves_to_none() {
        let keys = make_keys();
        assert_eq!(keys.verify_reset("not.a.token"), None);
        assert_eq!(keys.verify_reset(""), None);
    }
}
