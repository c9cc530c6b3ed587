// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Stratus Platform

//! Shared fixtures for the integration scenarios: a fully wired
//! [`AuthService`] over in-memory fakes, RSA test keys, and a swappable
//! JWKS fetcher for rotation scenarios.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use jsonwebtoken::jwk::JwkSet;

use stratus_auth::audit::MemoryAuditSink;
use stratus_auth::clock::ManualClock;
use stratus_auth::jwks::{KeyError, KeyFetcher, KeyResolver};
use stratus_auth::service::MemoryUserStore;
use stratus_auth::{
    AuthConfig, AuthService, Clock, Credentials, LockoutTracker, RolePermissionMatrix,
    TokenIssuer, TokenVerifier,
};

pub const JWKS_JSON: &str = include_str!("../keys/jwks.json");
pub const KEY_A_PEM: &str = include_str!("../keys/key_a.pem");
pub const KEY_B_PEM: &str = include_str!("../keys/key_b.pem");

pub const NOW: i64 = 1_700_000_000;
pub const ISSUER: &str = "https://id.stratus.example";
pub const AUDIENCE: &str = "stratus-api";

pub const USER_EMAIL: &str = "user@example.com";
pub const USER_PASSWORD: &str = "correct-password";
pub const ADMIN_EMAIL: &str = "admin@example.com";
pub const ADMIN_PASSWORD: &str = "admin-password";

/// JWKS fetcher whose key set can be replaced mid-test and whose fetch
/// count is observable.
pub struct SwappableFetcher {
    jwks: Mutex<JwkSet>,
    calls: AtomicUsize,
}

impl SwappableFetcher {
    pub fn new(jwks_json: &str) -> Self {
        Self {
            jwks: Mutex::new(serde_json::from_str(jwks_json).unwrap()),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn swap(&self, jwks_json: &str) {
        *self.jwks.lock().unwrap() = serde_json::from_str(jwks_json).unwrap();
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl KeyFetcher for SwappableFetcher {
    async fn fetch_keys(&self) -> Result<JwkSet, KeyError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.jwks.lock().unwrap().clone())
    }
}

pub struct TestEnv {
    pub service: AuthService,
    pub audit: Arc<MemoryAuditSink>,
    pub clock: ManualClock,
    pub fetcher: Arc<SwappableFetcher>,
}

/// Wire an auth service over in-memory fakes, seeded with one regular user
/// and one admin.
pub fn test_env() -> TestEnv {
    test_env_with_jwks(JWKS_JSON)
}

pub fn test_env_with_jwks(jwks_json: &str) -> TestEnv {
    // Surface internal rejection reasons when a scenario fails.
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("stratus_auth=debug")),
        )
        .with_test_writer()
        .try_init();

    let clock = ManualClock::new(NOW);
    let shared_clock: Arc<dyn Clock> = Arc::new(clock.clone());
    let audit = Arc::new(MemoryAuditSink::new());
    let fetcher = Arc::new(SwappableFetcher::new(jwks_json));

    let store = MemoryUserStore::new();
    store.add_user(USER_EMAIL, USER_PASSWORD, vec!["user".to_string()]);
    store.add_user(ADMIN_EMAIL, ADMIN_PASSWORD, vec!["admin".to_string()]);

    let resolver = Arc::new(KeyResolver::new(
        fetcher.clone() as Arc<dyn KeyFetcher>,
        Duration::from_secs(3600),
    ));
    let verifier = TokenVerifier::new(resolver, ISSUER, AUDIENCE, Arc::clone(&shared_clock));

    let config = AuthConfig::new("unused-in-tests", ISSUER, AUDIENCE)
        .with_signing_key(KEY_A_PEM, "key-a");
    let issuer = TokenIssuer::from_config(&config, Arc::clone(&shared_clock)).unwrap();
    let lockouts = LockoutTracker::new(5, 1800, Arc::clone(&shared_clock));

    TestEnv {
        service: AuthService::new(
            Arc::new(store),
            verifier,
            issuer,
            lockouts,
            RolePermissionMatrix::platform_default(),
            audit.clone(),
            shared_clock,
        ),
        audit,
        clock,
        fetcher,
    }
}

pub fn user_credentials(secret: &str) -> Credentials {
    Credentials {
        identifier: USER_EMAIL.to_string(),
        secret: secret.to_string(),
    }
}
