//! Bearer-token issuance and verification for the admin plane. Tokens are
//! HS256 JWTs signed with a secret configured at daemon startup; the only
//! credential Gordon itself manages is the admin password, compared as a
//! SHA-256 digest so the plaintext never sits in memory a moment longer
//! than the request that carries it.

use sha2::{Digest, Sha256};

use crate::domain::auth::{Claims, Scope, Token};
use crate::domain::errors::AdminError;

const DEFAULT_TOKEN_TTL_SECS: i64 = 24 * 60 * 60;

pub struct AdminAuthenticator {
    encoding_key: jsonwebtoken::EncodingKey,
    decoding_key: jsonwebtoken::DecodingKey,
    password_sha256: String,
}

impl AdminAuthenticator {
    pub fn new(jwt_secret: &[u8], password_sha256: impl Into<String>) -> Self {
        AdminAuthenticator {
            encoding_key: jsonwebtoken::EncodingKey::from_secret(jwt_secret),
            decoding_key: jsonwebtoken::DecodingKey::from_secret(jwt_secret),
            password_sha256: password_sha256.into(),
        }
    }

    pub fn hash_password(password: &str) -> String {
        let digest = Sha256::digest(password.as_bytes());
        hex::encode(digest)
    }

    pub fn verify_password(&self, password: &str) -> bool {
        Self::hash_password(password) == self.password_sha256
    }

    /// Issue a token for `subject` carrying `scopes`, valid for
    /// [`DEFAULT_TOKEN_TTL_SECS`] from `issued_at` (a caller-supplied Unix
    /// timestamp, since this module never reads the system clock itself —
    /// callers own time so tests can control it).
    pub fn issue(&self, subject: &str, scopes: Vec<Scope>, issued_at: i64) -> Result<Token, AdminError> {
        let claims = Claims {
            sub: subject.to_string(),
            scopes,
            exp: issued_at + DEFAULT_TOKEN_TTL_SECS,
        };
        let header = jsonwebtoken::Header::new(jsonwebtoken::Algorithm::HS256);
        let encoded = jsonwebtoken::encode(&header, &claims, &self.encoding_key)
            .map_err(|e| AdminError::Config(crate::domain::errors::ConfigError::ConfigParse(e.to_string())))?;
        Ok(Token(encoded))
    }

    pub fn verify(&self, token: &str) -> Result<Claims, AdminError> {
        let mut validation = jsonwebtoken::Validation::new(jsonwebtoken::Algorithm::HS256);
        validation.validate_exp = true;
        let data = jsonwebtoken::decode::<Claims>(token, &self.decoding_key, &validation).map_err(|e| {
            use jsonwebtoken::errors::ErrorKind;
            match e.kind() {
                ErrorKind::ExpiredSignature => AdminError::TokenExpired,
                _ => AdminError::Unauthenticated,
            }
        })?;
        Ok(data.claims)
    }

    pub fn require_scope(claims: &Claims, required: Scope) -> Result<(), AdminError> {
        if claims.has_scope(required) {
            Ok(())
        } else {
            Err(AdminError::InsufficientScope(format!("{required:?}")))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn issues_and_verifies_round_trip() {
        let auth = AdminAuthenticator::new(b"test-secret", AdminAuthenticator::hash_password("hunter2"));
        let token = auth.issue("operator", vec![Scope::Admin], 1_700_000_000).unwrap();
        let claims = auth.verify(&token.0).unwrap();
        assert_eq!(claims.sub, "operator");
        assert!(claims.has_scope(Scope::Admin));
    }

    #[test]
    fn expired_token_is_rejected() {
        let auth = AdminAuthenticator::new(b"test-secret", AdminAuthenticator::hash_password("hunter2"));
        let token = auth.issue("operator", vec![Scope::ReadOnly], 0).unwrap();
        let result = auth.verify(&token.0);
        assert!(matches!(result, Err(AdminError::TokenExpired)));
    }

    #[test]
    fn wrong_password_is_rejected() {
        let auth = AdminAuthenticator::new(b"test-secret", AdminAuthenticator::hash_password("hunter2"));
        assert!(!auth.verify_password("wrong"));
        assert!(auth.verify_password("hunter2"));
    }

    #[test]
    fn insufficient_scope_is_rejected() {
        let claims = Claims {
            sub: "viewer".into(),
            scopes: vec![Scope::ReadOnly],
            exp: 9_999_999_999,
        };
        assert!(AdminAuthenticator::require_scope(&claims, Scope::ReadOnly).is_ok());
        assert!(AdminAuthenticator::require_scope(&claims, Scope::Deploy).is_err());
    }
}
