use std::time::Duration;

use jsonwebtoken::{decode, encode, errors::ErrorKind, DecodingKey, EncodingKey, Header, Validation};
use thiserror::Error;
use time::{Duration as TimeDuration, OffsetDateTime};
use tracing::debug;
use uuid::Uuid;

use crate::{auth::claims::Claims, auth::repo_types::Role, config::JwtConfig, error::AppError};

/// Why a bearer credential was refused.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum TokenError {
    #[error("No auth header found")]
    Missing,
    #[error("Invalid token")]
    Invalid,
    #[error("Token expired")]
    Expired,
}

impl From<TokenError> for AppError {
    fn from(err: TokenError) -> Self {
        AppError::Unauthorized(err.to_string())
    }
}

/// Holds JWT signing and verification keys with config data.
#[derive(Clone)]
pub struct JwtKeys {
    encoding: EncodingKey,
    decoding: DecodingKey,
    issuer: String,
    audience: String,
    ttl: Duration,
}

impl JwtKeys {
    pub fn new(config: &JwtConfig) -> Self {
        Self {
            encoding: EncodingKey::from_secret(config.secret.as_bytes()),
            decoding: DecodingKey::from_secret(config.secret.as_bytes()),
            issuer: config.issuer.clone(),
            audience: config.audience.clone(),
            ttl: Duration::from_secs((config.ttl_minutes.max(0) as u64) * 60),
        }
    }

    pub fn sign(&self, user_id: Uuid, role: Role) -> anyhow::Result<String> {
        let now = OffsetDateTime::now_utc();
        let exp = now + TimeDuration::seconds(self.ttl.as_secs() as i64);
        let claims = Claims {
            sub: user_id,
            role,
            iat: now.unix_timestamp() as usize,
            exp: exp.unix_timestamp() as usize,
            iss: self.issuer.clone(),
            aud: self.audience.clone(),
        };
        let token = encode(&Header::default(), &claims, &self.encoding)?;
        debug!(user_id = %user_id, role = %role, "jwt signed");
        Ok(token)
    }

    pub fn verify(&self, token: &str) -> Result<Claims, TokenError> {
        let mut validation = Validation::default();
        validation.set_audience(std::slice::from_ref(&self.audience));
        validation.set_issuer(std::slice::from_ref(&self.issuer));
        let data = decode::<Claims>(token, &self.decoding, &validation).map_err(|e| {
            match e.kind() {
                ErrorKind::ExpiredSignature => TokenError::Expired,
                _ => TokenError::Invalid,
            }
        })?;
        debug!(user_id = %data.claims.sub, role = %data.claims.role, "jwt verified");
        Ok(data.claims)
    }

    /// Verifies the value of an `Authorization` header, which must use the
    /// `Bearer` scheme.
    pub fn verify_header(&self, header: Option<&str>) -> Result<Claims, TokenError> {
        let token = header
            .and_then(|value| value.strip_prefix("Bearer "))
            .ok_or(TokenError::Missing)?;
        self.verify(token)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(secret: &str, issuer: &str) -> JwtConfig {
        JwtConfig {
            secret: secret.into(),
            issuer: issuer.into(),
            audience: "test-aud".into(),
            ttl_minutes: 60 * 24,
        }
    }

    fn make_keys() -> JwtKeys {
        JwtKeys::new(&config("dev-secret", "test-issuer"))
    }

    #[test]
    fn sign_and_verify_carries_id_and_role() {
        let keys = make_keys();
        let user_id = Uuid::new_v4();
        let token = keys.sign(user_id, Role::Admin).expect("sign");
        let claims = keys.verify(&token).expect("verify token");
        assert_eq!(claims.sub, user_id);
        assert_eq!(claims.role, Role::Admin);
        assert_eq!(claims.iss, "test-issuer");
        assert_eq!(claims.aud, "test-aud");
    }

    #[test]
    fn expiry_is_one_day_after_issuance() {
        let keys = make_keys();
        let token = keys.sign(Uuid::new_v4(), Role::Regular).expect("sign");
        let claims = keys.verify(&token).expect("verify");
        assert_eq!(claims.exp - claims.iat, 24 * 60 * 60);
    }

    #[test]
    fn wrong_secret_is_invalid() {
        let token = make_keys().sign(Uuid::new_v4(), Role::Regular).unwrap();
        let other = JwtKeys::new(&config("other-secret", "test-issuer"));
        assert_eq!(other.verify(&token).unwrap_err(), TokenError::Invalid);
    }

    #[test]
    fn wrong_issuer_is_invalid() {
        let token = make_keys().sign(Uuid::new_v4(), Role::Regular).unwrap();
        let other = JwtKeys::new(&config("dev-secret", "someone-else"));
        assert_eq!(other.verify(&token).unwrap_err(), TokenError::Invalid);
    }

    #[test]
    fn garbage_is_invalid() {
        assert_eq!(
            make_keys().verify("not.a.token").unwrap_err(),
            TokenError::Invalid
        );
    }

    #[test]
    fn past_expiry_is_expired() {
        let now = OffsetDateTime::now_utc().unix_timestamp() as usize;
        let claims = Claims {
            sub: Uuid::new_v4(),
            role: Role::Regular,
            iat: now - 2 * 86_400,
            exp: now - 86_400,
            iss: "test-issuer".into(),
            aud: "test-aud".into(),
        };
        let token = encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(b"dev-secret"),
        )
        .unwrap();
        assert_eq!(make_keys().verify(&token).unwrap_err(), TokenError::Expired);
    }

    #[test]
    fn header_requires_bearer_scheme() {
        let keys = make_keys();
        let token = keys.sign(Uuid::new_v4(), Role::Regular).unwrap();

        assert_eq!(keys.verify_header(None).unwrap_err(), TokenError::Missing);
        assert_eq!(
            keys.verify_header(Some(&format!("Token {}", token))).unwrap_err(),
            TokenError::Missing
        );
        assert!(keys.verify_header(Some(&format!("Bearer {}", token))).is_ok());
    }
}
