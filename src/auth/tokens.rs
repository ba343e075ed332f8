use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::config::SecurityConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenKind {
    Access,
    Refresh,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// User id (login name)
    pub sub: String,
    pub kind: TokenKind,
    /// Token id; refresh tokens are tracked in the store under this name
    pub jti: String,
    pub iss: String,
    pub exp: i64,
    pub iat: i64,
}

#[derive(Debug, Clone)]
pub struct IssuedToken {
    pub token: String,
    pub claims: Claims,
    pub expires_in: i64,
}

#[derive(Debug, Error)]
pub enum TokenError {
    #[error("JWT secret not configured")]
    MissingSecret,

    #[error("Invalid token: {0}")]
    Invalid(#[from] jsonwebtoken::errors::Error),

    #[error("Expected a {0:?} token")]
    WrongKind(TokenKind),
}

/// Issues and verifies HS256 access and refresh tokens.
#[derive(Clone)]
pub struct TokenService {
    secret: String,
    issuer: String,
    access_ttl: Duration,
    refresh_ttl: Duration,
}

impl TokenService {
    pub fn new(security: &SecurityConfig) -> Self {
        Self {
            secret: security.jwt_secret.clone(),
            issuer: security.jwt_issuer.clone(),
            access_ttl: Duration::minutes(security.access_token_expiry_minutes),
            refresh_ttl: Duration::hours(security.refresh_token_expiry_hours),
        }
    }

    pub fn issue(&self, user: &str, kind: TokenKind) -> Result<IssuedToken, TokenError> {
        if self.secret.is_empty() {
            return Err(TokenError::MissingSecret);
        }

        let ttl = match kind {
            TokenKind::Access => self.access_ttl,
            TokenKind::Refresh => self.refresh_ttl,
        };
        let now = Utc::now();
        let claims = Claims {
            sub: user.to_string(),
            kind,
            jti: Uuid::new_v4().simple().to_string(),
            iss: self.issuer.clone(),
            exp: (now + ttl).timestamp(),
            iat: now.timestamp(),
        };

        let token = encode(
            &Header::new(Algorithm::HS256),
            &claims,
            &EncodingKey::from_secret(self.secret.as_bytes()),
        )?;

        Ok(IssuedToken {
            token,
            claims,
            expires_in: ttl.num_seconds(),
        })
    }

    /// Verify signature, issuer, expiry and kind.
    pub fn verify(&self, token: &str, kind: TokenKind) -> Result<Claims, TokenError> {
        self.decode(token, kind, true)
    }

    /// Like [`TokenService::verify`] but accepts expired tokens, for revocation.
    pub fn verify_allow_expired(&self, token: &str, kind: TokenKind) -> Result<Claims, TokenError> {
        self.decode(token, kind, false)
    }

    fn decode(&self, token: &str, kind: TokenKind, validate_exp: bool) -> Result<Claims, TokenError> {
        if self.secret.is_empty() {
            return Err(TokenError::MissingSecret);
        }

        let mut validation = Validation::new(Algorithm::HS256);
        validation.validate_exp = validate_exp;
        validation.set_issuer(&[self.issuer.as_str()]);

        let data = decode::<Claims>(token, &DecodingKey::from_secret(self.secret.as_bytes()), &validation)?;
        if data.claims.kind != kind {
            return Err(TokenError::WrongKind(kind));
        }
        Ok(data.claims)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AppConfig;

    fn service() -> TokenService {
        TokenService::new(&AppConfig::development().security)
    }

    #[test]
    fn issued_tokens_verify() {
        let tokens = service();
        let issued = tokens.issue("a@example.com", TokenKind::Access).unwrap();
        let claims = tokens.verify(&issued.token, TokenKind::Access).unwrap();
        assert_eq!(claims.sub, "a@example.com");
        assert_eq!(claims.jti, issued.claims.jti);
        assert!(issued.expires_in > 0);
    }

    #[test]
    fn kind_is_enforced() {
        let tokens = service();
        let refresh = tokens.issue("a@example.com", TokenKind::Refresh).unwrap();
        assert!(matches!(
            tokens.verify(&refresh.token, TokenKind::Access),
            Err(TokenError::WrongKind(TokenKind::Access))
        ));
    }

    #[test]
    fn foreign_signature_is_rejected() {
        let mut other = AppConfig::development().security;
        other.jwt_secret = "someone-else".to_string();
        let forged = TokenService::new(&other).issue("a@example.com", TokenKind::Access).unwrap();
        assert!(matches!(
            service().verify(&forged.token, TokenKind::Access),
            Err(TokenError::Invalid(_))
        ));
    }

    #[test]
    fn missing_secret_is_reported() {
        let mut security = AppConfig::development().security;
        security.jwt_secret.clear();
        assert!(matches!(
            TokenService::new(&security).issue("a@example.com", TokenKind::Access),
            Err(TokenError::MissingSecret)
        ));
    }
}
