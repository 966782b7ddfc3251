//! Bearer token handling
//!
//! Tokens are HS256 JWTs whose `id` claim names a stored person. Issuing
//! tokens is left to operators and tests; the service only verifies them.

use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use std::time::{SystemTime, UNIX_EPOCH};

use crate::types::KindredError;

/// Payload stored in a token
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    /// Person identifier
    pub id: String,
    /// Issued at (Unix timestamp)
    pub iat: u64,
    /// Expiration time (Unix timestamp)
    pub exp: u64,
}

/// Result of token validation
#[derive(Debug)]
pub struct TokenValidationResult {
    pub valid: bool,
    pub claims: Option<Claims>,
    pub error: Option<String>,
}

impl TokenValidationResult {
    pub fn valid(claims: Claims) -> Self {
        Self {
            valid: true,
            claims: Some(claims),
            error: None,
        }
    }

    pub fn invalid(error: impl Into<String>) -> Self {
        Self {
            valid: false,
            claims: None,
            error: Some(error.into()),
        }
    }
}

#[derive(Clone)]
pub struct JwtValidator {
    secret: String,
    expiry_seconds: u64,
}

impl JwtValidator {
    /// Returns an error if the secret is empty or shorter than 32 characters
    pub fn new(secret: String, expiry_seconds: u64) -> Result<Self, KindredError> {
        if secret.is_empty() {
            return Err(KindredError::Config(
                "JWT_SECRET is required in production mode".into(),
            ));
        }

        if secret.len() < 32 {
            return Err(KindredError::Config(
                "JWT_SECRET must be at least 32 characters".into(),
            ));
        }

        Ok(Self {
            secret,
            expiry_seconds,
        })
    }

    /// Validator with a fixed, public secret for dev mode
    pub fn new_dev() -> Self {
        Self {
            secret: "kindred-dev-mode-secret-not-for-production".into(),
            expiry_seconds: 3600,
        }
    }

    pub fn generate_token(&self, person_id: &str) -> Result<String, KindredError> {
        let now = unix_now()?;
        let claims = Claims {
            id: person_id.to_string(),
            iat: now,
            exp: now + self.expiry_seconds,
        };

        encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(self.secret.as_bytes()),
        )
        .map_err(|e| KindredError::Auth(format!("Failed to generate token: {}", e)))
    }

    pub fn verify_token(&self, token: &str) -> TokenValidationResult {
        match decode::<Claims>(
            token,
            &DecodingKey::from_secret(self.secret.as_bytes()),
            &Validation::default(),
        ) {
            Ok(token_data) => TokenValidationResult::valid(token_data.claims),
            Err(err) => {
                use jsonwebtoken::errors::ErrorKind;
                let error_msg = match err.kind() {
                    ErrorKind::ExpiredSignature => "Token expired",
                    ErrorKind::InvalidToken => "Invalid token",
                    ErrorKind::InvalidSignature => "Invalid signature",
                    _ => "Token validation failed",
                };
                TokenValidationResult::invalid(error_msg)
            }
        }
    }
}

fn unix_now() -> Result<u64, KindredError> {
    Ok(SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_err(|e| KindredError::Auth(format!("System time error: {}", e)))?
        .as_secs())
}

/// Extract a token from an Authorization header.
/// Supports "Bearer <token>" and raw tokens.
pub fn extract_token_from_header(auth_header: Option<&str>) -> Option<&str> {
    let header = auth_header?;

    if let Some(token) = header.strip_prefix("Bearer ") {
        let token = token.trim();
        return (!token.is_empty()).then_some(token);
    }

    let header = header.trim();
    if !header.is_empty() && !header.contains(' ') {
        return Some(header);
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_short_secret_rejected() {
        assert!(JwtValidator::new(String::new(), 60).is_err());
        assert!(JwtValidator::new("too-short".into(), 60).is_err());
        assert!(JwtValidator::new("x".repeat(32), 60).is_ok());
    }

    #[test]
    fn test_generate_and_verify() {
        let jwt = JwtValidator::new("k".repeat(40), 3600).unwrap();
        let token = jwt.generate_token("64b7f0c2a1b2c3d4e5f60718").unwrap();

        let result = jwt.verify_token(&token);
        assert!(result.valid);
        assert_eq!(result.claims.unwrap().id, "64b7f0c2a1b2c3d4e5f60718");
    }

    #[test]
    fn test_wrong_secret_rejected() {
        let issuer = JwtValidator::new("a".repeat(40), 3600).unwrap();
        let verifier = JwtValidator::new("b".repeat(40), 3600).unwrap();
        let token = issuer.generate_token("p1").unwrap();

        let result = verifier.verify_token(&token);
        assert!(!result.valid);
        assert_eq!(result.error.as_deref(), Some("Invalid signature"));
    }

    #[test]
    fn test_garbage_token() {
        let result = JwtValidator::new_dev().verify_token("not.a.jwt");
        assert!(!result.valid);
        assert!(result.claims.is_none());
    }

    #[test]
    fn test_extract_token() {
        assert_eq!(extract_token_from_header(Some("Bearer abc")), Some("abc"));
        assert_eq!(extract_token_from_header(Some("abc")), Some("abc"));
        assert_eq!(extract_token_from_header(Some("Bearer ")), None);
        assert_eq!(extract_token_from_header(Some("Basic a b")), None);
        assert_eq!(extract_token_from_header(None), None);
    }
}
