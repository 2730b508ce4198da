//! Stateless session token codec.
//!
//! Wire form: `base64url(claims_json) "." base64url(hmac_sha256(secret, first_segment))`,
//! both segments unpadded. The MAC covers the encoded claims exactly as sent,
//! so verification never re-serializes anything.

use base64::Engine;
use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use thiserror::Error;

use crate::storage::{AccountId, Role};

type HmacSha256 = Hmac<Sha256>;

const B64: base64::engine::GeneralPurpose = base64::engine::general_purpose::URL_SAFE_NO_PAD;

/// Shortest signing secret accepted, in bytes.
pub const MIN_SECRET_LEN: usize = 32;

#[derive(Debug, Clone, Copy, Error, PartialEq, Eq)]
pub enum TokenError {
    #[error("token expired")]
    Expired,
    #[error("token signature mismatch")]
    InvalidSignature,
    #[error("token malformed")]
    Malformed,
}

/// Signed claims. Times are unix seconds.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Claims {
    pub sub: AccountId,
    pub role: Role,
    pub iat: i64,
    pub exp: i64,
}

#[derive(Clone)]
pub struct TokenCodec {
    mac: HmacSha256,
}

impl std::fmt::Debug for TokenCodec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("TokenCodec { .. }")
    }
}

impl TokenCodec {
    pub fn new(secret: &[u8]) -> anyhow::Result<Self> {
        if secret.len() < MIN_SECRET_LEN {
            anyhow::bail!("token secret must be at least {} bytes, got {}", MIN_SECRET_LEN, secret.len());
        }
        let mac = HmacSha256::new_from_slice(secret).map_err(|e| anyhow::anyhow!(e.to_string()))?;
        Ok(Self { mac })
    }

    pub fn sign(&self, claims: &Claims) -> String {
        // Claims hold only ids, an enum and integers; serialization cannot fail.
        let json = serde_json::to_vec(claims).unwrap_or_default();
        let payload = B64.encode(json);
        let mut mac = self.mac.clone();
        mac.update(payload.as_bytes());
        let sig = B64.encode(mac.finalize().into_bytes());
        format!("{}.{}", payload, sig)
    }

    /// Sign `identity` with the given expiry, issued now.
    pub fn sign_for(&self, identity: AccountId, role: Role, expiry: DateTime<Utc>) -> String {
        self.sign(&Claims { sub: identity, role, iat: Utc::now().timestamp(), exp: expiry.timestamp() })
    }

    pub fn verify(&self, token: &str) -> Result<Claims, TokenError> {
        self.verify_at(token, Utc::now())
    }

    /// Verify integrity first, then decode, then check expiry against `now`.
    pub fn verify_at(&self, token: &str, now: DateTime<Utc>) -> Result<Claims, TokenError> {
        let (payload, sig) = token.split_once('.').ok_or(TokenError::Malformed)?;
        if payload.is_empty() || sig.is_empty() || sig.contains('.') {
            return Err(TokenError::Malformed);
        }
        let sig = B64.decode(sig).map_err(|_| TokenError::Malformed)?;
        let mut mac = self.mac.clone();
        mac.update(payload.as_bytes());
        mac.verify_slice(&sig).map_err(|_| TokenError::InvalidSignature)?;

        let json = B64.decode(payload).map_err(|_| TokenError::Malformed)?;
        let claims: Claims = serde_json::from_slice(&json).map_err(|_| TokenError::Malformed)?;
        if now.timestamp() > claims.exp {
            return Err(TokenError::Expired);
        }
        Ok(claims)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    const SECRET: &[u8] = b"0123456789abcdef0123456789abcdef";

    fn codec() -> TokenCodec { TokenCodec::new(SECRET).unwrap() }

    #[test]
    fn round_trip_future_expiry() {
        let id = uuid::Uuid::new_v4();
        let token = codec().sign_for(id, Role::Member, Utc::now() + Duration::hours(1));
        let claims = codec().verify(&token).unwrap();
        assert_eq!(claims.sub, id);
        assert_eq!(claims.role, Role::Member);
    }

    #[test]
    fn past_expiry_is_expired() {
        let token = codec().sign_for(uuid::Uuid::new_v4(), Role::Member, Utc::now() - Duration::seconds(5));
        assert_eq!(codec().verify(&token), Err(TokenError::Expired));
    }

    #[test]
    fn expiry_boundary_is_inclusive() {
        let exp = Utc::now() + Duration::minutes(10);
        let token = codec().sign_for(uuid::Uuid::new_v4(), Role::Admin, exp);
        assert!(codec().verify_at(&token, exp).is_ok());
        assert_eq!(codec().verify_at(&token, exp + Duration::seconds(1)), Err(TokenError::Expired));
    }

    #[test]
    fn other_secret_fails_signature() {
        let other = TokenCodec::new(b"ffffffffffffffffffffffffffffffff").unwrap();
        let token = other.sign_for(uuid::Uuid::new_v4(), Role::Member, Utc::now() + Duration::hours(1));
        assert_eq!(codec().verify(&token), Err(TokenError::InvalidSignature));
    }

    #[test]
    fn tampered_claims_fail_signature() {
        let c = codec();
        let token = c.sign_for(uuid::Uuid::new_v4(), Role::Member, Utc::now() + Duration::hours(1));
        let (_, sig) = token.split_once('.').unwrap();
        let forged_claims = Claims { sub: uuid::Uuid::new_v4(), role: Role::Admin, iat: 0, exp: i64::MAX };
        let forged_payload = B64.encode(serde_json::to_vec(&forged_claims).unwrap());
        let forged = format!("{}.{}", forged_payload, sig);
        assert_eq!(c.verify(&forged), Err(TokenError::InvalidSignature));
    }

    #[test]
    fn flipped_signature_char_is_signature_failure() {
        let c = codec();
        let token = c.sign_for(uuid::Uuid::new_v4(), Role::Member, Utc::now() + Duration::hours(1));
        let dot = token.find('.').unwrap();
        let at = dot + 1 + (token.len() - dot - 1) / 2;
        let mut bytes = token.into_bytes();
        bytes[at] = if bytes[at] == b'A' { b'B' } else { b'A' };
        let forged = String::from_utf8(bytes).unwrap();
        assert_eq!(c.verify(&forged), Err(TokenError::InvalidSignature));
    }

    #[test]
    fn garbage_is_malformed() {
        let c = codec();
        assert_eq!(c.verify("abc123"), Err(TokenError::Malformed));
        assert_eq!(c.verify("a.b.c"), Err(TokenError::Malformed));
        assert_eq!(c.verify(".sig"), Err(TokenError::Malformed));
        assert_eq!(c.verify("payload.!!!"), Err(TokenError::Malformed));
    }

    #[test]
    fn signed_garbage_payload_is_malformed() {
        let c = codec();
        let payload = B64.encode(b"not json");
        let mut mac = c.mac.clone();
        mac.update(payload.as_bytes());
        let sig = B64.encode(mac.finalize().into_bytes());
        assert_eq!(c.verify(&format!("{}.{}", payload, sig)), Err(TokenError::Malformed));
    }

    #[test]
    fn short_secret_rejected() {
        assert!(TokenCodec::new(b"short").is_err());
    }
}
