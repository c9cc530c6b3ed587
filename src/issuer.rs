// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Stratus Platform

//! Token issuance.
//!
//! Signs access, refresh and service tokens with the platform RS256 key.
//! Every token carries the full required claim set (`sub`, `iat`, `exp`,
//! `iss`, `aud`, `jti`, `roles`, `token_type`) and the signing key id in its
//! header, so any service's verifier can resolve the key from the JWKS.

use std::sync::Arc;

use jsonwebtoken::{encode, EncodingKey, Header};
use serde::Serialize;

use crate::claims::TokenType;
use crate::clock::Clock;
use crate::config::{AuthConfig, ConfigError};
use crate::error::AuthError;
use crate::verifier::ALLOWED_ALGORITHM;

/// An access/refresh token pair as returned by `authenticate`.
#[derive(Debug, Clone, Serialize)]
pub struct TokenPair {
    /// Short-lived token for API requests.
    pub access_token: String,
    /// Token exchangeable for the next pair.
    pub refresh_token: String,
    /// Access token lifetime in seconds.
    pub expires_in: i64,
}

#[derive(Serialize)]
struct IssuedClaims<'a> {
    sub: &'a str,
    iat: i64,
    exp: i64,
    iss: &'a str,
    aud: &'a str,
    jti: String,
    roles: &'a [String],
    token_type: &'static str,
}

/// Signs platform tokens with the configured RS256 private key.
pub struct TokenIssuer {
    encoding_key: EncodingKey,
    key_id: String,
    issuer: String,
    audience: String,
    access_ttl_secs: i64,
    refresh_ttl_secs: i64,
    clock: Arc<dyn Clock>,
}

impl TokenIssuer {
    /// Build an issuer from config. Fails when the signing key is absent or
    /// not a parseable RSA private key.
    pub fn from_config(config: &AuthConfig, clock: Arc<dyn Clock>) -> Result<Self, ConfigError> {
        let pem = config
            .signing_key_pem
            .as_deref()
            .ok_or(ConfigError::MissingSigningKey)?;
        let key_id = config
            .signing_key_id
            .clone()
            .ok_or(ConfigError::MissingSigningKey)?;
        let encoding_key =
            EncodingKey::from_rsa_pem(pem.as_bytes()).map_err(|_| ConfigError::InvalidSigningKey)?;

        Ok(Self {
            encoding_key,
            key_id,
            issuer: config.issuer.clone(),
            audience: config.audience.clone(),
            access_ttl_secs: config.access_token_ttl.as_secs() as i64,
            refresh_ttl_secs: config.refresh_token_ttl.as_secs() as i64,
            clock,
        })
    }

    /// Issue an access/refresh pair for an authenticated subject.
    pub fn issue_pair(&self, subject: &str, roles: &[String]) -> Result<TokenPair, AuthError> {
        let access_token = self.issue(subject, roles, TokenType::Access, self.access_ttl_secs)?;
        let refresh_token = self.issue(subject, roles, TokenType::Refresh, self.refresh_ttl_secs)?;
        Ok(TokenPair {
            access_token,
            refresh_token,
            expires_in: self.access_ttl_secs,
        })
    }

    /// Issue a service identity token for service-to-service calls.
    pub fn issue_service_token(&self, service_name: &str) -> Result<String, AuthError> {
        let roles = vec!["service".to_string()];
        self.issue(service_name, &roles, TokenType::Service, self.access_ttl_secs)
    }

    fn issue(
        &self,
        subject: &str,
        roles: &[String],
        token_type: TokenType,
        ttl_secs: i64,
    ) -> Result<String, AuthError> {
        let now = self.clock.now_unix();
        let claims = IssuedClaims {
            sub: subject,
            iat: now,
            exp: now + ttl_secs,
            iss: &self.issuer,
            aud: &self.audience,
            jti: uuid::Uuid::new_v4().to_string(),
            roles,
            token_type: token_type.as_str(),
        };

        let mut header = Header::new(ALLOWED_ALGORITHM);
        header.kid = Some(self.key_id.clone());

        encode(&header, &claims, &self.encoding_key).map_err(|e| {
            tracing::error!(error = %e, "token signing failed");
            AuthError::AuthenticationFailed
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Value;

    use crate::clock::ManualClock;

    const KEY_A_PEM: &str = include_str!("../tests/keys/key_a.pem");
    const NOW: i64 = 1_700_000_000;

    fn issuer() -> TokenIssuer {
        let config = AuthConfig::new(
            "https://id.stratus.example/jwks.json",
            "https://id.stratus.example",
            "stratus-api",
        )
        .with_signing_key(KEY_A_PEM, "key-a");
        TokenIssuer::from_config(&config, Arc::new(ManualClock::new(NOW))).unwrap()
    }

    fn decode_unverified(token: &str) -> Value {
        jsonwebtoken::dangerous::insecure_decode::<Value>(token)
            .unwrap()
            .claims
    }

    #[test]
    fn missing_signing_key_is_a_config_error() {
        let config = AuthConfig::new("u", "i", "a");
        let err = TokenIssuer::from_config(&config, Arc::new(ManualClock::new(NOW)))
            .err()
            .unwrap();
        assert!(matches!(err, ConfigError::MissingSigningKey));
    }

    #[test]
    fn bad_pem_is_a_config_error() {
        let config = AuthConfig::new("u", "i", "a").with_signing_key("not a pem", "key-a");
        let err = TokenIssuer::from_config(&config, Arc::new(ManualClock::new(NOW)))
            .err()
            .unwrap();
        assert!(matches!(err, ConfigError::InvalidSigningKey));
    }

    #[test]
    fn pair_carries_required_claims_and_types() {
        let pair = issuer()
            .issue_pair("user_42", &["user".to_string()])
            .unwrap();

        let access = decode_unverified(&pair.access_token);
        assert_eq!(access["sub"], "user_42");
        assert_eq!(access["iss"], "https://id.stratus.example");
        assert_eq!(access["aud"], "stratus-api");
        assert_eq!(access["token_type"], "access");
        assert_eq!(access["iat"], NOW);
        assert_eq!(access["exp"], NOW + 900);
        assert_eq!(access["roles"][0], "user");
        assert!(access["jti"].is_string());

        let refresh = decode_unverified(&pair.refresh_token);
        assert_eq!(refresh["token_type"], "refresh");
        assert_eq!(refresh["exp"], NOW + 604_800);
    }

    #[test]
    fn token_ids_are_unique_per_token() {
        let pair = issuer().issue_pair("user_42", &[]).unwrap();
        let access = decode_unverified(&pair.access_token);
        let refresh = decode_unverified(&pair.refresh_token);
        assert_ne!(access["jti"], refresh["jti"]);
    }

    #[test]
    fn service_token_carries_service_role_and_type() {
        let token = issuer().issue_service_token("messaging").unwrap();
        let claims = decode_unverified(&token);
        assert_eq!(claims["sub"], "messaging");
        assert_eq!(claims["token_type"], "service");
        assert_eq!(claims["roles"][0], "service");
    }

    #[test]
    fn header_names_the_signing_key() {
        let pair = issuer().issue_pair("user_42", &[]).unwrap();
        let header = jsonwebtoken::decode_header(&pair.access_token).unwrap();
        assert_eq!(header.kid.as_deref(), Some("key-a"));
        assert_eq!(header.alg, ALLOWED_ALGORITHM);
    }
}
