// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Stratus Platform

//! The auth service: login, token refresh and request authorization.
//!
//! Composes the key resolver, token verifier, lockout tracker, permission
//! matrix and token issuer. This is the only type embedding services talk
//! to; the components underneath are wired once at startup.
//!
//! ## Anti-enumeration
//!
//! `authenticate` behaves identically whether the account is unknown or the
//! password is wrong: same error, same lockout bookkeeping, and a dummy
//! hash verification for unknown accounts so response timing does not
//! betray existence. `authorize` likewise never tells the caller *why*
//! access was denied.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, RwLock as StdRwLock};

use argon2::password_hash::rand_core::OsRng;
use argon2::password_hash::SaltString;
use argon2::{Argon2, PasswordHash, PasswordHasher, PasswordVerifier};
use async_trait::async_trait;
use serde_json::json;
use tokio::sync::RwLock;

use crate::audit::{AuditEvent, AuditEventType, AuditSink};
use crate::claims::{ClaimSet, TokenType};
use crate::clock::{Clock, SystemClock};
use crate::config::{AuthConfig, ConfigError};
use crate::error::AuthError;
use crate::issuer::{TokenIssuer, TokenPair};
use crate::jwks::{HttpKeyFetcher, KeyResolver};
use crate::lockout::{LockoutStatus, LockoutTracker};
use crate::permissions::RolePermissionMatrix;
use crate::verifier::TokenVerifier;

/// Login credentials as presented by a client.
#[derive(Debug, Clone)]
pub struct Credentials {
    /// Account identifier (email for users, service id for services).
    pub identifier: String,
    /// The secret. Never stored, never logged.
    pub secret: String,
}

/// A stored account as the auth core needs to see it.
#[derive(Debug, Clone)]
pub struct UserRecord {
    /// Canonical subject id, becomes the token `sub`.
    pub user_id: String,
    /// Login identifier.
    pub identifier: String,
    /// Argon2 PHC-string hash of the account secret.
    pub password_hash: String,
    /// Role names carried into issued tokens.
    pub roles: Vec<String>,
}

/// Account lookup seam. Each service backs this with its own user storage.
#[async_trait]
pub trait UserStore: Send + Sync {
    /// Look up an account by its login identifier.
    ///
    /// Infrastructure failures should be logged by the implementation and
    /// surfaced as `AuthenticationFailed`; the caller never learns more.
    async fn find_by_identifier(&self, identifier: &str) -> Result<Option<UserRecord>, AuthError>;
}

/// In-memory [`UserStore`] for tests and local development.
#[derive(Default)]
pub struct MemoryUserStore {
    users: StdRwLock<HashMap<String, UserRecord>>,
}

impl MemoryUserStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an account, hashing the password with Argon2. Returns the
    /// generated user id.
    pub fn add_user(
        &self,
        identifier: impl Into<String>,
        password: &str,
        roles: Vec<String>,
    ) -> String {
        let identifier = identifier.into();
        let user_id = uuid::Uuid::new_v4().to_string();
        let salt = SaltString::generate(&mut OsRng);
        let password_hash = Argon2::default()
            .hash_password(password.as_bytes(), &salt)
            .expect("Failed to hash password")
            .to_string();
        self.users.write().expect("user store poisoned").insert(
            identifier.clone(),
            UserRecord {
                user_id: user_id.clone(),
                identifier,
                password_hash,
                roles,
            },
        );
        user_id
    }
}

#[async_trait]
impl UserStore for MemoryUserStore {
    async fn find_by_identifier(&self, identifier: &str) -> Result<Option<UserRecord>, AuthError> {
        Ok(self
            .users
            .read()
            .expect("user store poisoned")
            .get(identifier)
            .cloned())
    }
}

/// The result of a successful authorization check.
#[derive(Debug, Clone)]
pub struct AuthorizedContext {
    /// The verified claims.
    pub claims: ClaimSet,
    /// Every permission the token's roles grant, already resolved.
    pub permissions: HashSet<String>,
}

/// Orchestrates authentication and authorization for one service.
pub struct AuthService {
    users: Arc<dyn UserStore>,
    verifier: TokenVerifier,
    issuer: TokenIssuer,
    lockouts: LockoutTracker,
    matrix: RolePermissionMatrix,
    audit: Arc<dyn AuditSink>,
    clock: Arc<dyn Clock>,
    // jti -> token expiry; entries past expiry are reclaimable via
    // `prune_expired`.
    revoked: RwLock<HashMap<String, i64>>,
    dummy_hash: String,
}

impl AuthService {
    /// Assemble a service from its components.
    pub fn new(
        users: Arc<dyn UserStore>,
        verifier: TokenVerifier,
        issuer: TokenIssuer,
        lockouts: LockoutTracker,
        matrix: RolePermissionMatrix,
        audit: Arc<dyn AuditSink>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        // Verified against when an account does not exist, so the miss path
        // costs the same as a real comparison.
        let salt = SaltString::generate(&mut OsRng);
        let dummy_hash = Argon2::default()
            .hash_password(b"stratus-dummy-credential", &salt)
            .expect("Failed to hash dummy credential")
            .to_string();

        Self {
            users,
            verifier,
            issuer,
            lockouts,
            matrix,
            audit,
            clock,
            revoked: RwLock::new(HashMap::new()),
            dummy_hash,
        }
    }

    /// Wire a production service from config: HTTPS JWKS fetching, system
    /// clock, platform default permission matrix.
    pub fn from_config(
        config: &AuthConfig,
        users: Arc<dyn UserStore>,
        audit: Arc<dyn AuditSink>,
    ) -> Result<Self, ConfigError> {
        let clock: Arc<dyn Clock> = Arc::new(SystemClock);
        let resolver = Arc::new(KeyResolver::new(
            Arc::new(HttpKeyFetcher::new(config.jwks_url.as_str())),
            config.jwks_cache_ttl,
        ));
        let verifier = TokenVerifier::new(
            resolver,
            config.issuer.clone(),
            config.audience.clone(),
            Arc::clone(&clock),
        );
        let issuer = TokenIssuer::from_config(config, Arc::clone(&clock))?;
        let lockouts = LockoutTracker::new(
            config.lockout_threshold,
            config.lockout_duration.as_secs() as i64,
            Arc::clone(&clock),
        );

        Ok(Self::new(
            users,
            verifier,
            issuer,
            lockouts,
            RolePermissionMatrix::platform_default(),
            audit,
            clock,
        ))
    }

    /// Authenticate credentials and issue a token pair.
    ///
    /// Lockout state is checked first so a locked account is rejected
    /// before any credential work. Failures are indistinguishable to the
    /// caller whether the account exists or not.
    pub async fn authenticate(&self, credentials: &Credentials) -> Result<TokenPair, AuthError> {
        self.lockouts.check(&credentials.identifier)?;

        let record = self
            .users
            .find_by_identifier(&credentials.identifier)
            .await?;

        let record = match record {
            Some(record) => record,
            None => {
                let _ = self.verify_secret(&credentials.secret, &self.dummy_hash);
                return Err(self.failed_attempt(&credentials.identifier));
            }
        };

        if !self.verify_secret(&credentials.secret, &record.password_hash) {
            return Err(self.failed_attempt(&credentials.identifier));
        }

        let previous = self.lockouts.record_success(&credentials.identifier);
        if previous != (LockoutStatus::Unlocked { failures: 0 }) {
            self.audit.publish(
                AuditEvent::new(AuditEventType::LockoutCleared)
                    .with_account(&credentials.identifier),
            );
        }
        self.audit.publish(
            AuditEvent::new(AuditEventType::LoginSucceeded).with_account(&record.user_id),
        );

        self.issuer.issue_pair(&record.user_id, &record.roles)
    }

    /// Verify a bearer token and check it grants `required_permission`.
    ///
    /// Verification failures surface as `AuthenticationFailed` (the 401
    /// case); a valid identity without the permission surfaces as
    /// `AuthorizationDenied` (the 403 case) with no further detail.
    pub async fn authorize(
        &self,
        raw_token: &str,
        required_permission: &str,
    ) -> Result<AuthorizedContext, AuthError> {
        let claims = self.verifier.verify(raw_token).await?;

        // Refresh tokens exchange for pairs; they never authorize requests.
        if claims.token_type == TokenType::Refresh {
            tracing::debug!(subject = %claims.subject, "refresh token presented as bearer");
            return Err(AuthError::AuthenticationFailed);
        }
        if self.is_revoked(&claims.token_id).await {
            tracing::debug!(subject = %claims.subject, "revoked token presented");
            return Err(AuthError::AuthenticationFailed);
        }

        let permissions = self.matrix.resolve(claims.roles.iter().map(String::as_str));
        if !permissions.contains(required_permission) {
            self.audit.publish(
                AuditEvent::new(AuditEventType::PermissionDenied)
                    .with_account(&claims.subject)
                    .with_details(json!({ "permission": required_permission })),
            );
            return Err(AuthError::AuthorizationDenied);
        }

        Ok(AuthorizedContext {
            claims,
            permissions,
        })
    }

    /// Exchange a refresh token for a new pair, spending the old one.
    pub async fn refresh(&self, refresh_token: &str) -> Result<TokenPair, AuthError> {
        let claims = self.verifier.verify(refresh_token).await?;

        if claims.token_type != TokenType::Refresh {
            tracing::debug!(subject = %claims.subject, "non-refresh token presented for refresh");
            return Err(AuthError::AuthenticationFailed);
        }
        // Rotation: spend the presented token before the new pair exists.
        // Check-and-insert under one write lock, so two racing exchanges of
        // the same token cannot both win.
        if self
            .revoked
            .write()
            .await
            .insert(claims.token_id.clone(), claims.expires_at)
            .is_some()
        {
            tracing::debug!(subject = %claims.subject, "spent refresh token replayed");
            return Err(AuthError::AuthenticationFailed);
        }

        let pair = self.issuer.issue_pair(&claims.subject, &claims.roles)?;
        self.audit.publish(
            AuditEvent::new(AuditEventType::TokenRefreshed).with_account(&claims.subject),
        );
        Ok(pair)
    }

    /// Add a token id to the revocation list.
    ///
    /// `expires_at_unix` is the token's own expiry (from its verified
    /// claims); the entry only has to outlive the token.
    pub async fn revoke(&self, token_id: &str, expires_at_unix: i64) {
        self.revoked
            .write()
            .await
            .insert(token_id.to_string(), expires_at_unix);
        self.audit.publish(
            AuditEvent::new(AuditEventType::TokenRevoked)
                .with_details(json!({ "jti": token_id })),
        );
    }

    /// Reclaim bookkeeping for tokens and accounts that no longer matter:
    /// revocation entries whose token has expired anyway, and lockout
    /// entries with no failures or active lock. Long-lived embedders call
    /// this periodically.
    pub async fn prune_expired(&self) {
        let now = self.clock.now_unix();
        self.revoked.write().await.retain(|_, expiry| *expiry > now);
        self.lockouts.prune();
    }

    async fn is_revoked(&self, token_id: &str) -> bool {
        self.revoked.read().await.contains_key(token_id)
    }

    fn failed_attempt(&self, identifier: &str) -> AuthError {
        let status = self.lockouts.record_failure(identifier);
        self.audit
            .publish(AuditEvent::new(AuditEventType::LoginFailed).with_account(identifier));
        if let LockoutStatus::Locked { until_unix } = status {
            self.audit.publish(
                AuditEvent::new(AuditEventType::AccountLocked)
                    .with_account(identifier)
                    .with_details(json!({ "until_unix": until_unix })),
            );
        }
        AuthError::AuthenticationFailed
    }

    fn verify_secret(&self, secret: &str, phc_hash: &str) -> bool {
        let parsed = match PasswordHash::new(phc_hash) {
            Ok(parsed) => parsed,
            Err(e) => {
                tracing::error!(error = %e, "stored credential hash unparseable");
                return false;
            }
        };
        Argon2::default()
            .verify_password(secret.as_bytes(), &parsed)
            .is_ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use async_trait::async_trait;
    use jsonwebtoken::jwk::JwkSet;

    use crate::audit::MemoryAuditSink;
    use crate::clock::ManualClock;
    use crate::config::AuthConfig;
    use crate::jwks::{KeyError, KeyFetcher, KeyResolver};

    const JWKS_JSON: &str = include_str!("../tests/keys/jwks.json");
    const KEY_A_PEM: &str = include_str!("../tests/keys/key_a.pem");
    const NOW: i64 = 1_700_000_000;
    const ISSUER: &str = "https://id.stratus.example";
    const AUDIENCE: &str = "stratus-api";

    struct StaticFetcher;

    #[async_trait]
    impl KeyFetcher for StaticFetcher {
        async fn fetch_keys(&self) -> Result<JwkSet, KeyError> {
            Ok(serde_json::from_str(JWKS_JSON).unwrap())
        }
    }

    struct FailingStore;

    #[async_trait]
    impl UserStore for FailingStore {
        async fn find_by_identifier(&self, _: &str) -> Result<Option<UserRecord>, AuthError> {
            Err(AuthError::AuthenticationFailed)
        }
    }

    struct TestEnv {
        service: AuthService,
        audit: Arc<MemoryAuditSink>,
        clock: ManualClock,
    }

    fn env_with_store(users: Arc<dyn UserStore>) -> TestEnv {
        let clock = ManualClock::new(NOW);
        let shared_clock: Arc<dyn crate::clock::Clock> = Arc::new(clock.clone());
        let audit = Arc::new(MemoryAuditSink::new());

        let resolver = Arc::new(KeyResolver::new(
            Arc::new(StaticFetcher),
            Duration::from_secs(3600),
        ));
        let verifier =
            TokenVerifier::new(resolver, ISSUER, AUDIENCE, Arc::clone(&shared_clock));
        let config = AuthConfig::new("unused", ISSUER, AUDIENCE)
            .with_signing_key(KEY_A_PEM, "key-a");
        let issuer = TokenIssuer::from_config(&config, Arc::clone(&shared_clock)).unwrap();
        let lockouts = LockoutTracker::new(5, 1800, Arc::clone(&shared_clock));

        TestEnv {
            service: AuthService::new(
                users,
                verifier,
                issuer,
                lockouts,
                RolePermissionMatrix::platform_default(),
                audit.clone(),
                shared_clock,
            ),
            audit,
            clock,
        }
    }

    fn env() -> TestEnv {
        let store = MemoryUserStore::new();
        store.add_user("user@example.com", "correct horse", vec!["user".to_string()]);
        env_with_store(Arc::new(store))
    }

    fn creds(secret: &str) -> Credentials {
        Credentials {
            identifier: "user@example.com".to_string(),
            secret: secret.to_string(),
        }
    }

    #[tokio::test]
    async fn login_then_authorize_granted_permission() {
        let env = env();
        let pair = env.service.authenticate(&creds("correct horse")).await.unwrap();

        let ctx = env
            .service
            .authorize(&pair.access_token, "messages:send")
            .await
            .unwrap();
        assert_eq!(ctx.claims.roles, vec!["user".to_string()]);
        assert!(ctx.permissions.contains("profiles:read"));
        assert_eq!(
            env.audit.event_types(),
            vec![AuditEventType::LoginSucceeded]
        );
    }

    #[tokio::test]
    async fn missing_permission_is_denied_without_detail() {
        let env = env();
        let pair = env.service.authenticate(&creds("correct horse")).await.unwrap();

        let err = env
            .service
            .authorize(&pair.access_token, "admin:users:write")
            .await
            .unwrap_err();
        assert_eq!(err, AuthError::AuthorizationDenied);
        assert!(env
            .audit
            .event_types()
            .contains(&AuditEventType::PermissionDenied));
    }

    #[tokio::test]
    async fn wrong_password_and_unknown_account_are_indistinguishable() {
        let env = env();

        let wrong_password = env
            .service
            .authenticate(&creds("wrong"))
            .await
            .unwrap_err();
        let unknown_account = env
            .service
            .authenticate(&Credentials {
                identifier: "nobody@example.com".to_string(),
                secret: "wrong".to_string(),
            })
            .await
            .unwrap_err();

        assert_eq!(wrong_password, AuthError::AuthenticationFailed);
        assert_eq!(unknown_account, AuthError::AuthenticationFailed);
        assert_eq!(wrong_password.to_string(), unknown_account.to_string());
    }

    #[tokio::test]
    async fn store_failure_fails_closed_with_uniform_error() {
        let env = env_with_store(Arc::new(FailingStore));
        let err = env.service.authenticate(&creds("any")).await.unwrap_err();
        assert_eq!(err, AuthError::AuthenticationFailed);
    }

    #[tokio::test]
    async fn refresh_rotates_and_spends_the_old_token() {
        let env = env();
        let pair = env.service.authenticate(&creds("correct horse")).await.unwrap();

        let next = env.service.refresh(&pair.refresh_token).await.unwrap();
        assert_ne!(next.refresh_token, pair.refresh_token);

        // Replaying the spent token fails like any bad token.
        let err = env.service.refresh(&pair.refresh_token).await.unwrap_err();
        assert_eq!(err, AuthError::AuthenticationFailed);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn racing_refreshes_of_one_token_yield_exactly_one_pair() {
        let env = env();
        let service = Arc::new(env.service);
        let pair = service.authenticate(&creds("correct horse")).await.unwrap();

        let tasks: Vec<_> = (0..8)
            .map(|_| {
                let service = Arc::clone(&service);
                let token = pair.refresh_token.clone();
                tokio::spawn(async move { service.refresh(&token).await })
            })
            .collect();

        let mut wins = 0;
        for task in tasks {
            if task.await.unwrap().is_ok() {
                wins += 1;
            }
        }
        assert_eq!(wins, 1);
    }

    #[tokio::test]
    async fn access_token_cannot_be_used_for_refresh() {
        let env = env();
        let pair = env.service.authenticate(&creds("correct horse")).await.unwrap();

        let err = env.service.refresh(&pair.access_token).await.unwrap_err();
        assert_eq!(err, AuthError::AuthenticationFailed);
    }

    #[tokio::test]
    async fn refresh_token_cannot_authorize_requests() {
        let env = env();
        let pair = env.service.authenticate(&creds("correct horse")).await.unwrap();

        let err = env
            .service
            .authorize(&pair.refresh_token, "messages:send")
            .await
            .unwrap_err();
        assert_eq!(err, AuthError::AuthenticationFailed);
    }

    #[tokio::test]
    async fn revoked_access_token_is_rejected() {
        let env = env();
        let pair = env.service.authenticate(&creds("correct horse")).await.unwrap();
        let ctx = env
            .service
            .authorize(&pair.access_token, "messages:send")
            .await
            .unwrap();

        env.service
            .revoke(&ctx.claims.token_id, ctx.claims.expires_at)
            .await;

        let err = env
            .service
            .authorize(&pair.access_token, "messages:send")
            .await
            .unwrap_err();
        assert_eq!(err, AuthError::AuthenticationFailed);
        assert!(env
            .audit
            .event_types()
            .contains(&AuditEventType::TokenRevoked));
    }

    #[tokio::test]
    async fn prune_drops_only_expired_revocations() {
        let env = env();
        let pair = env.service.authenticate(&creds("correct horse")).await.unwrap();
        let ctx = env
            .service
            .authorize(&pair.access_token, "messages:send")
            .await
            .unwrap();

        env.service
            .revoke(&ctx.claims.token_id, ctx.claims.expires_at)
            .await;
        env.service.revoke("long-lived-jti", NOW + 100_000).await;

        // The access token is still live; its entry must survive a sweep.
        env.service.prune_expired().await;
        assert!(env.service.is_revoked(&ctx.claims.token_id).await);

        // Past the token's own expiry the entry no longer matters.
        env.clock.advance(901);
        env.service.prune_expired().await;
        assert!(!env.service.is_revoked(&ctx.claims.token_id).await);
        assert!(env.service.is_revoked("long-lived-jti").await);
    }
}
