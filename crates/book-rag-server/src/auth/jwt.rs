use anyhow::Result;
use axum::http::HeaderMap;
use jsonwebtoken::{decode, DecodingKey, Validation};
use serde::{Deserialize, Serialize};
use tracing::debug;

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Claims {
    pub sub: String, // User ID (Subject)
    pub exp: usize,  // Expiration
}

/// Validates bearer tokens issued by the auth frontend. Tokens are
/// optional: anonymous requests simply get no user id.
pub struct JwtManager {
    decoding_key: DecodingKey,
}

impl JwtManager {
    pub fn new(secret: &str) -> Self {
        Self {
            decoding_key: DecodingKey::from_secret(secret.as_bytes()),
        }
    }

    pub fn validate_token(&self, token: &str) -> Result<Claims> {
        let token_data = decode::<Claims>(token, &self.decoding_key, &Validation::default())?;
        Ok(token_data.claims)
    }

    /// User id from the Authorization header, if a valid token is present.
    /// Malformed or expired tokens degrade to anonymous.
    pub fn user_id_from_headers(&self, headers: &HeaderMap) -> Option<String> {
        let header = headers.get("Authorization")?.to_str().ok()?;
        let token = header.strip_prefix("Bearer ")?;

        match self.validate_token(token) {
            Ok(claims) => Some(claims.sub),
            Err(e) => {
                debug!("Ignoring invalid bearer token: {}", e);
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;
    use jsonwebtoken::{encode, EncodingKey, Header};
    use std::time::{SystemTime, UNIX_EPOCH};

    fn token(secret: &str, sub: &str, expires_in: i64) -> String {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap()
            .as_secs() as i64;
        let claims = Claims {
            sub: sub.to_string(),
            exp: (now + expires_in) as usize,
        };
        encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(secret.as_bytes()),
        )
        .unwrap()
    }

    fn headers_with(value: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert("Authorization", HeaderValue::from_str(value).unwrap());
        headers
    }

    #[test]
    fn test_valid_token_yields_user_id() {
        let manager = JwtManager::new("secret");
        let headers = headers_with(&format!("Bearer {}", token("secret", "user-42", 3600)));
        assert_eq!(manager.user_id_from_headers(&headers).as_deref(), Some("user-42"));
    }

    #[test]
    fn test_wrong_secret_is_anonymous() {
        let manager = JwtManager::new("secret");
        let headers = headers_with(&format!("Bearer {}", token("other", "user-42", 3600)));
        assert!(manager.user_id_from_headers(&headers).is_none());
    }

    #[test]
    fn test_missing_or_malformed_header_is_anonymous() {
        let manager = JwtManager::new("secret");
        assert!(manager.user_id_from_headers(&HeaderMap::new()).is_none());
        assert!(manager
            .user_id_from_headers(&headers_with("Token abc"))
            .is_none());
    }

    #[test]
    fn test_expired_token_is_anonymous() {
        let manager = JwtManager::new("secret");
        let headers = headers_with(&format!("Bearer {}", token("secret", "user-42", -3600)));
        assert!(manager.user_id_from_headers(&headers).is_none());
    }
}
