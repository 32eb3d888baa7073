// Copyright (c) 2024-2025 Jesse Morgan / Morgan Forge
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Bearer token claim decoding.
//!
//! The backend issues a signed JWT whose payload carries the user id and the
//! role(s) under URI-style claim keys, plus the usual `iat`/`exp` timestamps.
//! The client only needs the claims to decide what to show, so the signature is
//! NOT verified here: every API call is re-authorized server-side.
//!
//! ```json
//! {
//!   "http://schemas.xmlsoap.org/ws/2005/05/identity/claims/nameidentifier": "42",
//!   "http://schemas.microsoft.com/ws/2008/06/identity/claims/role": ["admin"],
//!   "exp": 1767225600
//! }
//! ```

use chrono::{DateTime, Utc};
use jsonwebtoken::{Algorithm, DecodingKey, Validation};
use serde::{Deserialize, Deserializer, Serialize};

use super::roles::RoleSet;
use crate::error::{AuthError, AuthResult};

/// Claim key carrying the user id.
pub const USER_ID_CLAIM: &str = "http://schemas.xmlsoap.org/ws/2005/05/identity/claims/nameidentifier";

/// Claim key carrying one role string or an array of them.
pub const ROLE_CLAIM: &str = "http://schemas.microsoft.com/ws/2008/06/identity/claims/role";

/// Claims embedded in the session token.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Claims {
    #[serde(
        rename = "http://schemas.xmlsoap.org/ws/2005/05/identity/claims/nameidentifier",
        default,
        deserialize_with = "deserialize_id",
        skip_serializing_if = "Option::is_none"
    )]
    pub name_identifier: Option<String>,

    /// Standard subject, used when the URI-style id claim is absent.
    #[serde(default, deserialize_with = "deserialize_id", skip_serializing_if = "Option::is_none")]
    pub sub: Option<String>,

    #[serde(
        rename = "http://schemas.microsoft.com/ws/2008/06/identity/claims/role",
        default,
        deserialize_with = "deserialize_roles"
    )]
    pub roles: RoleSet,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub iat: Option<i64>,

    /// Absolute expiry, seconds since the Unix epoch.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exp: Option<i64>,
}

impl Claims {
    pub fn user_id(&self) -> Option<&str> {
        self.name_identifier.as_deref().or(self.sub.as_deref())
    }

    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        self.exp.and_then(|exp| DateTime::from_timestamp(exp, 0))
    }

    pub fn issued_at(&self) -> Option<DateTime<Utc>> {
        self.iat.and_then(|iat| DateTime::from_timestamp(iat, 0))
    }

    /// True once `now_secs` has reached `exp`. Tokens without `exp` never expire here.
    pub fn is_expired_at(&self, now_secs: i64) -> bool {
        self.exp.is_some_and(|exp| now_secs >= exp)
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum IdValue {
    Text(String),
    Number(i64),
}

fn deserialize_id<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<String>, D::Error> {
    let value = Option::<IdValue>::deserialize(deserializer)?;
    Ok(value.map(|v| match v {
        IdValue::Text(s) => s,
        IdValue::Number(n) => n.to_string(),
    }))
}

#[derive(Deserialize)]
#[serde(untagged)]
enum OneOrMany {
    One(String),
    Many(Vec<String>),
}

fn deserialize_roles<'de, D: Deserializer<'de>>(deserializer: D) -> Result<RoleSet, D::Error> {
    let value = Option::<OneOrMany>::deserialize(deserializer)?;
    Ok(match value {
        Some(OneOrMany::One(role)) => [role].into_iter().collect(),
        Some(OneOrMany::Many(roles)) => roles.into_iter().collect(),
        None => RoleSet::new(),
    })
}

fn claims_validation() -> Validation {
    let mut validation = Validation::new(Algorithm::HS256);
    validation.insecure_disable_signature_validation();
    validation.validate_exp = false;
    validation.validate_aud = false;
    validation.required_spec_claims.clear();
    validation
}

/// Decode the claims of a raw bearer token.
///
/// Accepts the token with or without a `Bearer ` prefix. Any structural
/// problem (wrong segment count, bad base64, non-JSON payload, wrong claim
/// types) yields [`AuthError::MalformedToken`]; callers must then treat the
/// token as absent and clear it.
pub fn decode_claims(raw: &str) -> AuthResult<Claims> {
    let raw = raw.trim();
    let raw = raw.strip_prefix("Bearer ").unwrap_or(raw).trim();
    if raw.is_empty() {
        return Err(AuthError::MalformedToken("empty token".to_string()));
    }

    jsonwebtoken::decode::<Claims>(raw, &DecodingKey::from_secret(&[]), &claims_validation())
        .map(|data| data.claims)
        .map_err(|e| AuthError::MalformedToken(e.to_string()))
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use jsonwebtoken::{EncodingKey, Header};
    use serde_json::{json, Value};

    /// Mint a signed token the way the backend would.
    pub(crate) fn mint(payload: Value) -> String {
        jsonwebtoken::encode(&Header::default(), &payload, &EncodingKey::from_secret(b"backend-secret"))
            .unwrap()
    }

    /// Token for `user_id` with `roles` that expires far in the future.
    pub(crate) fn mint_for(user_id: &str, roles: &[&str]) -> String {
        mint(json!({
            USER_ID_CLAIM: user_id,
            ROLE_CLAIM: roles,
            "iat": 1_700_000_000,
            "exp": 4_102_444_800i64,
        }))
    }

    #[test]
    fn test_decode_role_array() {
        let token = mint_for("42", &["admin", "SiteManager"]);
        let claims = decode_claims(&token).unwrap();

        assert_eq!(claims.user_id(), Some("42"));
        assert!(claims.roles.has_role("admin"));
        assert!(claims.roles.has_role("sitemanager"));
        assert_eq!(claims.exp, Some(4_102_444_800));
    }

    #[test]
    fn test_decode_single_role_string_and_numeric_id() {
        let token = mint(json!({ USER_ID_CLAIM: 7, ROLE_CLAIM: "siteengineer", "exp": 10 }));
        let claims = decode_claims(&token).unwrap();

        assert_eq!(claims.user_id(), Some("7"));
        assert_eq!(claims.roles.iter().collect::<Vec<_>>(), vec!["siteengineer"]);
    }

    #[test]
    fn test_decode_falls_back_to_sub_and_empty_roles() {
        let token = mint(json!({ "sub": "user-9" }));
        let claims = decode_claims(&token).unwrap();

        assert_eq!(claims.user_id(), Some("user-9"));
        assert!(claims.roles.is_empty());
        assert!(claims.exp.is_none());
        assert!(!claims.is_expired_at(i64::MAX));
    }

    #[test]
    fn test_decode_accepts_bearer_prefix() {
        let token = mint_for("1", &["admin"]);
        assert!(decode_claims(&format!("Bearer {}", token)).is_ok());
    }

    #[test]
    fn test_decode_ignores_signature() {
        let token = mint_for("1", &["admin"]);
        let (unsigned, _signature) = token.rsplit_once('.').unwrap();
        let forged = format!("{}.c2lnbmF0dXJl", unsigned);

        assert!(decode_claims(&forged).is_ok());
    }

    #[test]
    fn test_malformed_tokens_rejected() {
        for raw in ["not-a-token", "", "   ", "a.b.c", "Bearer "] {
            match decode_claims(raw) {
                Err(AuthError::MalformedToken(_)) => {}
                other => panic!("expected MalformedToken for {:?}, got {:?}", raw, other),
            }
        }
    }

    #[test]
    fn test_wrong_claim_type_is_malformed() {
        let token = mint(json!({ ROLE_CLAIM: 5 }));
        assert!(matches!(decode_claims(&token), Err(AuthError::MalformedToken(_))));
    }

    #[test]
    fn test_expiry_helpers() {
        let token = mint(json!({ "exp": 1_000, "iat": 900 }));
        let claims = decode_claims(&token).unwrap();

        assert!(!claims.is_expired_at(999));
        assert!(claims.is_expired_at(1_000));
        assert_eq!(claims.expires_at().map(|t| t.timestamp()), Some(1_000));
        assert_eq!(claims.issued_at().map(|t| t.timestamp()), Some(900));
    }
}
