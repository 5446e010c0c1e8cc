use std::time::Duration;

use axum::extract::FromRef;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use time::{Duration as TimeDuration, OffsetDateTime};
use tracing::debug;

use super::claims::Claims;
use crate::{config::JwtConfig, state::AppState};

/// Longer lifetimes are clamped to this.
pub const MAX_TTL: Duration = Duration::from_secs(365 * 24 * 60 * 60);

const HMAC_ALGORITHMS: [Algorithm; 3] = [Algorithm::HS256, Algorithm::HS384, Algorithm::HS512];

#[derive(Debug, thiserror::Error)]
pub enum TokenError {
    #[error("token signing secret is not configured")]
    MissingSecret,
    #[error("failed to sign token")]
    Signing(#[source] jsonwebtoken::errors::Error),
    #[error("token lifetime out of range")]
    LifetimeOutOfRange,
    #[error("invalid token: {0}")]
    Invalid(String),
}

fn expiry_after(ttl: Duration) -> Option<u64> {
    let secs = i64::try_from(ttl.as_secs()).ok()?;
    let at = OffsetDateTime::now_utc().checked_add(TimeDuration::seconds(secs))?;
    u64::try_from(at.unix_timestamp()).ok()
}

#[derive(Clone)]
struct Keys {
    encoding: EncodingKey,
    decoding: DecodingKey,
}

/// Signs and verifies bearer tokens with a secret fixed at construction.
#[derive(Clone)]
pub struct TokenCodec {
    keys: Option<Keys>,
    ttl: Option<Duration>,
}

impl FromRef<AppState> for TokenCodec {
    fn from_ref(state: &AppState) -> Self {
        state.tokens.clone()
    }
}

impl TokenCodec {
    pub fn new(secret: Option<&str>, ttl: Option<Duration>) -> Self {
        let keys = secret.filter(|s| !s.is_empty()).map(|s| Keys {
            encoding: EncodingKey::from_secret(s.as_bytes()),
            decoding: DecodingKey::from_secret(s.as_bytes()),
        });
        Self {
            keys,
            ttl: ttl.map(|t| t.min(MAX_TTL)),
        }
    }

    pub fn from_config(cfg: &JwtConfig) -> Self {
        let ttl = cfg
            .ttl_minutes
            .and_then(|m| u64::try_from(m).ok())
            .map(|m| Duration::from_secs(m.saturating_mul(60)));
        Self::new(cfg.secret.as_deref(), ttl)
    }

    pub fn is_configured(&self) -> bool {
        self.keys.is_some()
    }

    pub fn issue(&self, email: &str) -> Result<String, TokenError> {
        let keys = self.keys.as_ref().ok_or(TokenError::MissingSecret)?;
        let exp = match self.ttl {
            Some(ttl) => Some(expiry_after(ttl).ok_or(TokenError::LifetimeOutOfRange)?),
            None => None,
        };
        let claims = Claims {
            email: email.to_string(),
            exp,
        };
        let token = encode(&Header::new(Algorithm::HS256), &claims, &keys.encoding)
            .map_err(TokenError::Signing)?;
        debug!(email = %email, "jwt signed");
        Ok(token)
    }

    /// Returns the `email` claim of a token signed with our secret.
    pub fn verify(&self, token: &str) -> Result<String, TokenError> {
        let keys = self.keys.as_ref().ok_or(TokenError::MissingSecret)?;

        let mut validation = Validation::new(Algorithm::HS256);
        validation.algorithms = HMAC_ALGORITHMS.to_vec();
        validation.required_spec_claims.clear();
        validation.validate_exp = self.ttl.is_some();
        if self.ttl.is_some() {
            validation.required_spec_claims.insert("exp".to_string());
        }

        let data = decode::<Claims>(token, &keys.decoding, &validation)
            .map_err(|e| TokenError::Invalid(e.to_string()))?;
        debug!(email = %data.claims.email, "jwt verified");
        Ok(data.claims.email)
    }
}
