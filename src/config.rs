// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Stratus Platform

//! # Runtime Configuration
//!
//! Every Stratus service embedding this crate loads one [`AuthConfig`] at
//! startup, from the environment. Configuration is read once; nothing here
//! is mutable at runtime.
//!
//! ## Environment Variables
//!
//! | Variable | Description | Default |
//! |----------|-------------|---------|
//! | `AUTH_JWKS_URL` | JWKS endpoint for token verification | Required |
//! | `AUTH_ISSUER` | Expected `iss` claim, compared exactly | Required |
//! | `AUTH_AUDIENCE` | Expected `aud` claim, compared exactly | Required |
//! | `AUTH_SIGNING_KEY_PEM` | RSA private key (PEM) for token issuance | Optional (verify-only services omit it) |
//! | `AUTH_SIGNING_KEY_ID` | `kid` placed in issued token headers | Optional |
//! | `AUTH_SERVICE_TOKEN_URL` | Service token issuance endpoint | Optional |
//! | `AUTH_JWKS_CACHE_TTL_SECS` | JWKS snapshot freshness window | `3600` |
//! | `AUTH_LOCKOUT_THRESHOLD` | Consecutive failures before lock | `5` |
//! | `AUTH_LOCKOUT_DURATION_SECS` | Lock duration once tripped | `1800` |
//! | `AUTH_ACCESS_TOKEN_TTL_SECS` | Access token lifetime | `900` |
//! | `AUTH_REFRESH_TOKEN_TTL_SECS` | Refresh token lifetime | `604800` |

use std::env;
use std::time::Duration;

use thiserror::Error;

/// Environment variable name for the JWKS endpoint URL.
pub const JWKS_URL_ENV: &str = "AUTH_JWKS_URL";
/// Environment variable name for the expected issuer claim.
pub const ISSUER_ENV: &str = "AUTH_ISSUER";
/// Environment variable name for the expected audience claim.
pub const AUDIENCE_ENV: &str = "AUTH_AUDIENCE";
/// Environment variable name for the PEM-encoded RSA signing key.
pub const SIGNING_KEY_PEM_ENV: &str = "AUTH_SIGNING_KEY_PEM";
/// Environment variable name for the signing key id (`kid`).
pub const SIGNING_KEY_ID_ENV: &str = "AUTH_SIGNING_KEY_ID";
/// Environment variable name for the service token issuance endpoint.
pub const SERVICE_TOKEN_URL_ENV: &str = "AUTH_SERVICE_TOKEN_URL";
/// Environment variable name for the JWKS cache TTL (seconds).
pub const JWKS_CACHE_TTL_ENV: &str = "AUTH_JWKS_CACHE_TTL_SECS";
/// Environment variable name for the lockout threshold.
pub const LOCKOUT_THRESHOLD_ENV: &str = "AUTH_LOCKOUT_THRESHOLD";
/// Environment variable name for the lockout duration (seconds).
pub const LOCKOUT_DURATION_ENV: &str = "AUTH_LOCKOUT_DURATION_SECS";
/// Environment variable name for the access token TTL (seconds).
pub const ACCESS_TOKEN_TTL_ENV: &str = "AUTH_ACCESS_TOKEN_TTL_SECS";
/// Environment variable name for the refresh token TTL (seconds).
pub const REFRESH_TOKEN_TTL_ENV: &str = "AUTH_REFRESH_TOKEN_TTL_SECS";

/// Default JWKS snapshot freshness window (1 hour).
pub const DEFAULT_JWKS_CACHE_TTL: Duration = Duration::from_secs(3600);
/// Default consecutive-failure threshold before an account locks.
pub const DEFAULT_LOCKOUT_THRESHOLD: u32 = 5;
/// Default lock duration (30 minutes).
pub const DEFAULT_LOCKOUT_DURATION: Duration = Duration::from_secs(1800);
/// Default access token lifetime (15 minutes).
pub const DEFAULT_ACCESS_TOKEN_TTL: Duration = Duration::from_secs(900);
/// Default refresh token lifetime (7 days).
pub const DEFAULT_REFRESH_TOKEN_TTL: Duration = Duration::from_secs(604_800);

/// Configuration loading errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A required environment variable is missing.
    #[error("missing required environment variable {0}")]
    MissingVar(&'static str),
    /// A numeric variable could not be parsed.
    #[error("invalid value for {var}: {value}")]
    InvalidValue {
        /// Variable name.
        var: &'static str,
        /// The offending value.
        value: String,
    },
    /// Token issuance requested but no signing key is configured.
    #[error("signing key not configured")]
    MissingSigningKey,
    /// The configured signing key PEM could not be parsed.
    #[error("signing key PEM could not be parsed")]
    InvalidSigningKey,
}

/// Auth core configuration, loaded once at service startup.
#[derive(Debug, Clone)]
pub struct AuthConfig {
    /// JWKS endpoint the key resolver fetches from.
    pub jwks_url: String,
    /// Expected `iss` claim. Compared with exact string equality.
    pub issuer: String,
    /// Expected `aud` claim. Compared with exact string equality; audience
    /// lists are never accepted.
    pub audience: String,
    /// RSA private key PEM for token issuance. Verify-only services leave
    /// this unset.
    pub signing_key_pem: Option<String>,
    /// `kid` stamped into issued token headers.
    pub signing_key_id: Option<String>,
    /// Endpoint for service-to-service token issuance.
    pub service_token_url: Option<String>,
    /// JWKS snapshot freshness window.
    pub jwks_cache_ttl: Duration,
    /// Consecutive failures before an account locks.
    pub lockout_threshold: u32,
    /// How long a tripped lock lasts.
    pub lockout_duration: Duration,
    /// Access token lifetime.
    pub access_token_ttl: Duration,
    /// Refresh token lifetime.
    pub refresh_token_ttl: Duration,
}

impl AuthConfig {
    /// Build a config with defaults for everything optional.
    pub fn new(
        jwks_url: impl Into<String>,
        issuer: impl Into<String>,
        audience: impl Into<String>,
    ) -> Self {
        Self {
            jwks_url: jwks_url.into(),
            issuer: issuer.into(),
            audience: audience.into(),
            signing_key_pem: None,
            signing_key_id: None,
            service_token_url: None,
            jwks_cache_ttl: DEFAULT_JWKS_CACHE_TTL,
            lockout_threshold: DEFAULT_LOCKOUT_THRESHOLD,
            lockout_duration: DEFAULT_LOCKOUT_DURATION,
            access_token_ttl: DEFAULT_ACCESS_TOKEN_TTL,
            refresh_token_ttl: DEFAULT_REFRESH_TOKEN_TTL,
        }
    }

    /// Load from the environment. See the module docs for the variable table.
    pub fn from_env() -> Result<Self, ConfigError> {
        let jwks_url = require(JWKS_URL_ENV)?;
        let issuer = require(ISSUER_ENV)?;
        let audience = require(AUDIENCE_ENV)?;

        let mut config = Self::new(jwks_url, issuer, audience);
        config.signing_key_pem = env::var(SIGNING_KEY_PEM_ENV).ok();
        config.signing_key_id = env::var(SIGNING_KEY_ID_ENV).ok();
        config.service_token_url = env::var(SERVICE_TOKEN_URL_ENV).ok();

        if let Some(secs) = parse_u64(JWKS_CACHE_TTL_ENV)? {
            config.jwks_cache_ttl = Duration::from_secs(secs);
        }
        if let Some(n) = parse_u64(LOCKOUT_THRESHOLD_ENV)? {
            config.lockout_threshold = n as u32;
        }
        if let Some(secs) = parse_u64(LOCKOUT_DURATION_ENV)? {
            config.lockout_duration = Duration::from_secs(secs);
        }
        if let Some(secs) = parse_u64(ACCESS_TOKEN_TTL_ENV)? {
            config.access_token_ttl = Duration::from_secs(secs);
        }
        if let Some(secs) = parse_u64(REFRESH_TOKEN_TTL_ENV)? {
            config.refresh_token_ttl = Duration::from_secs(secs);
        }

        Ok(config)
    }

    /// Set the signing key material (builder style).
    pub fn with_signing_key(
        mut self,
        pem: impl Into<String>,
        kid: impl Into<String>,
    ) -> Self {
        self.signing_key_pem = Some(pem.into());
        self.signing_key_id = Some(kid.into());
        self
    }
}

fn require(var: &'static str) -> Result<String, ConfigError> {
    env::var(var).map_err(|_| ConfigError::MissingVar(var))
}

fn parse_u64(var: &'static str) -> Result<Option<u64>, ConfigError> {
    match env::var(var) {
        Ok(raw) => raw
            .parse::<u64>()
            .map(Some)
            .map_err(|_| ConfigError::InvalidValue { var, value: raw }),
        Err(_) => Ok(None),
    }
}
