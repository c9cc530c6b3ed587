// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Stratus Platform

//! Service-to-service token acquisition.
//!
//! Platform services calling each other authenticate with service tokens
//! obtained from the central issuance endpoint. [`ServiceTokenClient`]
//! exchanges the service's id/secret for a token and caches it, swapping in
//! a fresh one shortly before expiry so callers never present a dead token.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use crate::clock::Clock;
use crate::error::AuthError;

/// How long before expiry a cached token is considered due for renewal.
const RENEWAL_SKEW_SECS: i64 = 60;

/// Timeout for a single exchange request.
const EXCHANGE_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Serialize)]
struct ExchangeRequest<'a> {
    service_id: &'a str,
    service_secret: &'a str,
}

/// Response shape of the issuance endpoint.
#[derive(Debug, Deserialize)]
pub struct IssuedServiceToken {
    /// The signed service token.
    pub token: String,
    /// Lifetime in seconds.
    pub expires_in: i64,
}

/// Exchanges service credentials for a service token.
///
/// Production uses [`HttpServiceTokenExchanger`]; tests substitute a fake.
#[async_trait]
pub trait ServiceTokenExchanger: Send + Sync {
    /// Perform one credential exchange.
    async fn exchange(&self, service_id: &str, service_secret: &str)
        -> Result<IssuedServiceToken, AuthError>;
}

/// Talks to the platform's service token issuance endpoint.
pub struct HttpServiceTokenExchanger {
    endpoint: String,
    client: reqwest::Client,
}

impl HttpServiceTokenExchanger {
    /// Create an exchanger for the given issuance endpoint URL.
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            client: reqwest::Client::builder()
                .timeout(EXCHANGE_TIMEOUT)
                .build()
                .expect("Failed to create HTTP client"),
        }
    }
}

#[async_trait]
impl ServiceTokenExchanger for HttpServiceTokenExchanger {
    async fn exchange(
        &self,
        service_id: &str,
        service_secret: &str,
    ) -> Result<IssuedServiceToken, AuthError> {
        let response = self
            .client
            .post(&self.endpoint)
            .json(&ExchangeRequest {
                service_id,
                service_secret,
            })
            .send()
            .await
            .map_err(|e| {
                tracing::warn!(endpoint = %self.endpoint, error = %e, "service token exchange failed");
                AuthError::KeySourceUnavailable
            })?;

        if !response.status().is_success() {
            tracing::warn!(
                endpoint = %self.endpoint,
                status = %response.status(),
                "service token endpoint returned non-success status"
            );
            return Err(AuthError::AuthenticationFailed);
        }

        response.json::<IssuedServiceToken>().await.map_err(|e| {
            tracing::warn!(endpoint = %self.endpoint, error = %e, "service token response malformed");
            AuthError::KeySourceUnavailable
        })
    }
}

struct CachedToken {
    token: String,
    expires_at_unix: i64,
}

/// Caching wrapper around a [`ServiceTokenExchanger`].
pub struct ServiceTokenClient {
    exchanger: Arc<dyn ServiceTokenExchanger>,
    service_id: String,
    service_secret: String,
    clock: Arc<dyn Clock>,
    cache: RwLock<Option<CachedToken>>,
}

impl ServiceTokenClient {
    /// Create a client for the given service identity.
    pub fn new(
        exchanger: Arc<dyn ServiceTokenExchanger>,
        service_id: impl Into<String>,
        service_secret: impl Into<String>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            exchanger,
            service_id: service_id.into(),
            service_secret: service_secret.into(),
            clock,
            cache: RwLock::new(None),
        }
    }

    /// Current service token, exchanging for a fresh one when the cached
    /// token is absent or within the renewal window.
    pub async fn token(&self) -> Result<String, AuthError> {
        let now = self.clock.now_unix();
        {
            let cache = self.cache.read().await;
            if let Some(cached) = cache.as_ref() {
                if cached.expires_at_unix - RENEWAL_SKEW_SECS > now {
                    return Ok(cached.token.clone());
                }
            }
        }

        let mut cache = self.cache.write().await;
        // Another caller may have renewed while we waited for the write lock.
        if let Some(cached) = cache.as_ref() {
            if cached.expires_at_unix - RENEWAL_SKEW_SECS > now {
                return Ok(cached.token.clone());
            }
        }

        let issued = self
            .exchanger
            .exchange(&self.service_id, &self.service_secret)
            .await?;
        tracing::debug!(service_id = %self.service_id, "service token renewed");
        let token = issued.token.clone();
        *cache = Some(CachedToken {
            token: issued.token,
            expires_at_unix: now + issued.expires_in,
        });
        Ok(token)
    }
}
