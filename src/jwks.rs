// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Stratus Platform

//! JWKS (JSON Web Key Set) fetching and caching.
//!
//! ## Security
//!
//! - JWKS is fetched via HTTPS only, with a bounded timeout
//! - Keys are cached as an immutable snapshot with a configurable TTL
//! - A stale snapshot is never served: if a refresh fails, resolution
//!   fails closed with [`KeyError::SourceUnavailable`]
//!
//! ## Refresh discipline
//!
//! An unknown `kid` or an expired snapshot triggers exactly one forced
//! refresh. Concurrent resolvers share it: refreshes serialize on a mutex
//! and each snapshot carries a generation number, so a resolver that waited
//! out someone else's refresh sees the advanced generation and skips its own
//! fetch. The fetch itself runs in a spawned task, so a caller that gives up
//! waiting does not abort cache population for everyone behind it.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use jsonwebtoken::jwk::{AlgorithmParameters, JwkSet};
use jsonwebtoken::DecodingKey;
use thiserror::Error;
use tokio::sync::{Mutex, RwLock};

use crate::error::AuthError;

/// Timeout for a single JWKS fetch.
const FETCH_TIMEOUT: Duration = Duration::from_secs(10);

/// Key resolution errors.
#[derive(Debug, Error)]
pub enum KeyError {
    /// No key with the requested id, even after a forced refresh.
    #[error("no signing key with id {kid}")]
    NotFound {
        /// The key id that could not be resolved.
        kid: String,
    },
    /// The key source could not be reached or returned garbage.
    #[error("key source unavailable")]
    SourceUnavailable,
}

impl From<KeyError> for AuthError {
    fn from(err: KeyError) -> Self {
        match err {
            // An unknown kid means the token cannot be trusted; callers see
            // the same generic failure as any other bad token.
            KeyError::NotFound { .. } => AuthError::AuthenticationFailed,
            KeyError::SourceUnavailable => AuthError::KeySourceUnavailable,
        }
    }
}

/// Source of the remote key set.
///
/// Production uses [`HttpKeyFetcher`]; tests substitute a fake to observe
/// fetch counts and inject failures.
#[async_trait]
pub trait KeyFetcher: Send + Sync {
    /// Fetch the full key set.
    async fn fetch_keys(&self) -> Result<JwkSet, KeyError>;
}

/// Fetches the JWKS document over HTTPS.
pub struct HttpKeyFetcher {
    jwks_url: String,
    client: reqwest::Client,
}

impl HttpKeyFetcher {
    /// Create a fetcher for the given JWKS endpoint URL.
    pub fn new(jwks_url: impl Into<String>) -> Self {
        Self {
            jwks_url: jwks_url.into(),
            client: reqwest::Client::builder()
                .timeout(FETCH_TIMEOUT)
                .build()
                .expect("Failed to create HTTP client"),
        }
    }
}

#[async_trait]
impl KeyFetcher for HttpKeyFetcher {
    async fn fetch_keys(&self) -> Result<JwkSet, KeyError> {
        let response = self
            .client
            .get(&self.jwks_url)
            .send()
            .await
            .map_err(|e| {
                tracing::warn!(url = %self.jwks_url, error = %e, "JWKS fetch failed");
                KeyError::SourceUnavailable
            })?;

        if !response.status().is_success() {
            tracing::warn!(
                url = %self.jwks_url,
                status = %response.status(),
                "JWKS endpoint returned non-success status"
            );
            return Err(KeyError::SourceUnavailable);
        }

        response.json::<JwkSet>().await.map_err(|e| {
            tracing::warn!(url = %self.jwks_url, error = %e, "JWKS response was not a valid key set");
            KeyError::SourceUnavailable
        })
    }
}

/// One immutable view of the key set. Readers hold an `Arc` to it; a refresh
/// installs a whole new snapshot, never edits one in place.
struct KeySnapshot {
    keys: HashMap<String, DecodingKey>,
    fetched_at: Instant,
    generation: u64,
}

impl KeySnapshot {
    /// Index the RSA keys of a JWKS by kid. Non-RSA entries and entries
    /// without a kid are skipped: RS256 is the only algorithm this platform
    /// accepts, and kid-less keys can never match a token header.
    fn from_jwks(jwks: &JwkSet, generation: u64) -> Self {
        let mut keys = HashMap::new();
        for jwk in &jwks.keys {
            let Some(kid) = jwk.common.key_id.clone() else {
                tracing::debug!("skipping JWKS entry without kid");
                continue;
            };
            match &jwk.algorithm {
                AlgorithmParameters::RSA(rsa) => {
                    match DecodingKey::from_rsa_components(&rsa.n, &rsa.e) {
                        Ok(key) => {
                            keys.insert(kid, key);
                        }
                        Err(e) => {
                            tracing::warn!(kid = %kid, error = %e, "unusable RSA key in JWKS")
                        }
                    }
                }
                _ => tracing::debug!(kid = %kid, "skipping non-RSA JWKS entry"),
            }
        }
        Self {
            keys,
            fetched_at: Instant::now(),
            generation,
        }
    }
}

/// Resolves signing keys by id against a cached, TTL'd JWKS snapshot.
pub struct KeyResolver {
    fetcher: Arc<dyn KeyFetcher>,
    cache_ttl: Duration,
    snapshot: Arc<RwLock<Option<Arc<KeySnapshot>>>>,
    refresh_lock: Mutex<()>,
}

impl KeyResolver {
    /// Create a resolver over the given fetcher.
    pub fn new(fetcher: Arc<dyn KeyFetcher>, cache_ttl: Duration) -> Self {
        Self {
            fetcher,
            cache_ttl,
            snapshot: Arc::new(RwLock::new(None)),
            refresh_lock: Mutex::new(()),
        }
    }

    /// Resolve the signing key for `kid`.
    ///
    /// Serves from the snapshot when it is fresh and contains the key;
    /// otherwise performs exactly one forced refresh before failing with
    /// [`KeyError::NotFound`]. Never serves from a stale snapshot.
    pub async fn resolve(&self, kid: &str) -> Result<DecodingKey, KeyError> {
        let gen_before = {
            let snapshot = self.snapshot.read().await;
            match snapshot.as_ref() {
                Some(s) => {
                    if s.fetched_at.elapsed() < self.cache_ttl {
                        if let Some(key) = s.keys.get(kid) {
                            return Ok(key.clone());
                        }
                    }
                    s.generation
                }
                None => 0,
            }
        };

        let refreshed = self.refresh_shared(gen_before).await?;
        refreshed
            .keys
            .get(kid)
            .cloned()
            .ok_or_else(|| KeyError::NotFound {
                kid: kid.to_string(),
            })
    }

    /// Force a refresh regardless of snapshot freshness.
    ///
    /// Used at service startup to warm the cache and fail fast on
    /// misconfiguration.
    pub async fn refresh(&self) -> Result<(), KeyError> {
        let current = {
            let snapshot = self.snapshot.read().await;
            snapshot.as_ref().map(|s| s.generation).unwrap_or(0)
        };
        self.refresh_shared(current).await.map(|_| ())
    }

    /// Whether a fresh snapshot is currently installed.
    pub async fn is_cached(&self) -> bool {
        let snapshot = self.snapshot.read().await;
        snapshot
            .as_ref()
            .is_some_and(|s| s.fetched_at.elapsed() < self.cache_ttl)
    }

    /// Refresh with single-flight semantics: whoever holds the refresh lock
    /// fetches; everyone queued behind reuses the snapshot that fetch
    /// installed (visible as an advanced generation).
    async fn refresh_shared(&self, gen_before: u64) -> Result<Arc<KeySnapshot>, KeyError> {
        let _guard = self.refresh_lock.lock().await;

        let next_generation = {
            let snapshot = self.snapshot.read().await;
            if let Some(s) = snapshot.as_ref() {
                if s.generation > gen_before && s.fetched_at.elapsed() < self.cache_ttl {
                    return Ok(Arc::clone(s));
                }
                s.generation + 1
            } else {
                1
            }
        };

        let fetcher = Arc::clone(&self.fetcher);
        let slot = Arc::clone(&self.snapshot);
        // Detached task: if the awaiting caller is cancelled, the fetch still
        // completes and populates the cache for subsequent resolvers.
        let task = tokio::spawn(async move {
            let jwks = fetcher.fetch_keys().await?;
            let snapshot = Arc::new(KeySnapshot::from_jwks(&jwks, next_generation));
            *slot.write().await = Some(Arc::clone(&snapshot));
            Ok::<_, KeyError>(snapshot)
        });

        match task.await {
            Ok(result) => result,
            Err(e) => {
                tracing::error!(error = %e, "JWKS refresh task failed");
                Err(KeyError::SourceUnavailable)
            }
        }
    }
}
