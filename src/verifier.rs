// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Stratus Platform

//! Token verification.
//!
//! ## Check order
//!
//! The checks run in a fixed order and short-circuit on the first failure:
//!
//! 1. parse the header without trusting anything in it
//! 2. reject any algorithm other than RS256 *before* touching the key
//!    resolver; a token must never pick its own verification algorithm
//!    (algorithm confusion: an HS256 token "signed" with the public key as
//!    the HMAC secret must die here, not at the signature check)
//! 3. resolve the signing key by the header's `kid`
//! 4. verify the signature
//! 5. claims: `sub`/`exp`/`iat`/`iss`/`aud`/`jti`/`token_type` must be
//!    present; issuer and audience must equal the configured values exactly
//!    (an audience *list* is rejected even if it contains the right value)
//! 6. `exp` must be in the future and `iat` must not be, with zero leeway
//!
//! The caller only ever sees [`AuthError::AuthenticationFailed`] (or
//! [`AuthError::KeySourceUnavailable`] when the JWKS source is down); the
//! failing step is logged, not returned.

use std::sync::Arc;

use jsonwebtoken::{decode, decode_header, Algorithm, Validation};
use serde::Deserialize;
use thiserror::Error;

use crate::claims::{ClaimSet, TokenType};
use crate::clock::Clock;
use crate::error::AuthError;
use crate::jwks::{KeyError, KeyResolver};

/// The single algorithm this platform accepts.
pub const ALLOWED_ALGORITHM: Algorithm = Algorithm::RS256;

/// Internal rejection reasons. Logged, never surfaced.
#[derive(Debug, Error)]
pub(crate) enum VerifyFailure {
    #[error("malformed token")]
    Malformed,
    #[error("disallowed algorithm {0:?}")]
    DisallowedAlgorithm(Algorithm),
    #[error("missing kid header")]
    MissingKid,
    #[error("invalid signature")]
    BadSignature,
    #[error("issuer mismatch")]
    WrongIssuer,
    #[error("audience mismatch")]
    WrongAudience,
    #[error("token expired")]
    Expired,
    #[error("token not yet valid")]
    NotYetValid,
    #[error("unrecognized token type {0:?}")]
    UnknownTokenType(String),
    #[error(transparent)]
    Key(#[from] KeyError),
}

/// Raw claim layout. Every field is required; a token missing any of them
/// fails deserialization and is rejected as malformed.
#[derive(Debug, Deserialize)]
struct RawClaims {
    sub: String,
    exp: i64,
    iat: i64,
    iss: String,
    aud: serde_json::Value,
    jti: String,
    #[serde(default)]
    roles: Vec<String>,
    token_type: String,
}

/// Stateless token verifier. Shares only the key resolver's snapshot cache;
/// any number of verifications may run concurrently.
pub struct TokenVerifier {
    keys: Arc<KeyResolver>,
    issuer: String,
    audience: String,
    clock: Arc<dyn Clock>,
}

impl TokenVerifier {
    /// Create a verifier for the configured issuer/audience pair.
    pub fn new(
        keys: Arc<KeyResolver>,
        issuer: impl Into<String>,
        audience: impl Into<String>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            keys,
            issuer: issuer.into(),
            audience: audience.into(),
            clock,
        }
    }

    /// Verify a raw bearer token and return its claims.
    pub async fn verify(&self, raw_token: &str) -> Result<ClaimSet, AuthError> {
        match self.verify_inner(raw_token).await {
            Ok(claims) => Ok(claims),
            Err(VerifyFailure::Key(KeyError::SourceUnavailable)) => {
                tracing::warn!("token rejected: key source unavailable");
                Err(AuthError::KeySourceUnavailable)
            }
            Err(reason) => {
                tracing::debug!(%reason, "token rejected");
                Err(AuthError::AuthenticationFailed)
            }
        }
    }

    async fn verify_inner(&self, raw_token: &str) -> Result<ClaimSet, VerifyFailure> {
        // Header is attacker-controlled until the signature has verified.
        let header = decode_header(raw_token).map_err(|_| VerifyFailure::Malformed)?;
        if header.alg != ALLOWED_ALGORITHM {
            return Err(VerifyFailure::DisallowedAlgorithm(header.alg));
        }
        let kid = header.kid.ok_or(VerifyFailure::MissingKid)?;

        let key = self.keys.resolve(&kid).await?;

        // jsonwebtoken handles signature and structure; temporal and
        // issuer/audience checks are done by hand below against the injected
        // clock with exact equality and zero leeway.
        let mut validation = Validation::new(ALLOWED_ALGORITHM);
        validation.validate_exp = false;
        validation.validate_aud = false;
        validation.required_spec_claims.clear();

        let data = decode::<RawClaims>(raw_token, &key, &validation).map_err(|e| {
            match e.kind() {
                jsonwebtoken::errors::ErrorKind::InvalidSignature => VerifyFailure::BadSignature,
                _ => VerifyFailure::Malformed,
            }
        })?;
        let claims = data.claims;

        if claims.iss != self.issuer {
            return Err(VerifyFailure::WrongIssuer);
        }
        // Exact string equality only. A JSON array is rejected outright,
        // even when it contains the configured audience.
        match &claims.aud {
            serde_json::Value::String(aud) if *aud == self.audience => {}
            _ => return Err(VerifyFailure::WrongAudience),
        }

        let now = self.clock.now_unix();
        if claims.exp <= now {
            return Err(VerifyFailure::Expired);
        }
        if claims.iat > now {
            return Err(VerifyFailure::NotYetValid);
        }

        let token_type = TokenType::parse(&claims.token_type)
            .ok_or_else(|| VerifyFailure::UnknownTokenType(claims.token_type.clone()))?;

        Ok(ClaimSet {
            subject: claims.sub,
            roles: claims.roles,
            token_type,
            token_id: claims.jti,
            issued_at: claims.iat,
            expires_at: claims.exp,
        })
    }
}
