//! Token minting and verification helpers.
//!
//! Tokens are HS256-signed with a configured shared secret and carry the
//! caller's user and tenant identity plus an expiry.
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub user_id: String,
    pub tenant_id: String,
    pub exp: i64,
}

#[derive(Debug, thiserror::Error)]
#[error("token error: {0}")]
pub struct TokenError(#[from] jsonwebtoken::errors::Error);

#[derive(Clone)]
pub struct TokenIssuer {
    secret: Vec<u8>,
    ttl: Duration,
}

impl TokenIssuer {
    pub fn new(secret: &str, ttl: Duration) -> Self {
        Self {
            secret: secret.as_bytes().to_vec(),
            ttl,
        }
    }

    pub fn mint(&self, user_id: &str, tenant_id: &str) -> Result<String, TokenError> {
        let claims = Claims {
            user_id: user_id.to_string(),
            tenant_id: tenant_id.to_string(),
            exp: now_epoch_seconds() + self.ttl.as_secs() as i64,
        };
        let token = jsonwebtoken::encode(
            &Header::new(Algorithm::HS256),
            &claims,
            &EncodingKey::from_secret(&self.secret),
        )?;
        Ok(token)
    }

    pub fn verify(&self, token: &str) -> Result<Claims, TokenError> {
        let validation = Validation::new(Algorithm::HS256);
        let data = jsonwebtoken::decode::<Claims>(
            token,
            &DecodingKey::from_secret(&self.secret),
            &validation,
        )?;
        Ok(data.claims)
    }
}

fn now_epoch_seconds() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_else(|_| Duration::from_secs(0))
        .as_secs() as i64
}

#[cfg(test)]
mod tests {
    use super::*;

    fn issuer() -> TokenIssuer {
        TokenIssuer::new("test-secret", Duration::from_secs(900))
    }

    #[test]
    fn mint_round_trip_preserves_identity() {
        let issuer = issuer();
        let token = issuer.mint("user-1", "tenant-1").expect("mint");
        let claims = issuer.verify(&token).expect("verify");
        assert_eq!(claims.user_id, "user-1");
        assert_eq!(claims.tenant_id, "tenant-1");
    }

    #[test]
    fn rejects_wrong_secret() {
        let token = issuer().mint("user-1", "tenant-1").expect("mint");
        let other = TokenIssuer::new("other-secret", Duration::from_secs(900));
        assert!(other.verify(&token).is_err());
    }

    #[test]
    fn rejects_expired_token() {
        let issuer = issuer();
        // Expired well beyond the default validation leeway.
        let claims = Claims {
            user_id: "user-1".to_string(),
            tenant_id: "tenant-1".to_string(),
            exp: now_epoch_seconds() - 600,
        };
        let token = jsonwebtoken::encode(
            &Header::new(Algorithm::HS256),
            &claims,
            &EncodingKey::from_secret(b"test-secret"),
        )
        .expect("encode");
        assert!(issuer.verify(&token).is_err());
    }

    #[test]
    fn rejects_garbage() {
        assert!(issuer().verify("not-a-token").is_err());
    }
}
