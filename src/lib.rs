// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Stratus Platform

//! Stratus Auth - Shared Authentication & Authorization Core
//!
//! Every Stratus platform service (identity, profiles, projects, messaging,
//! admin) embeds this crate so token validation, account lockout and
//! permission resolution behave identically everywhere.
//!
//! ## Modules
//!
//! - `jwks` - Signing key resolution (JWKS fetching and snapshot caching)
//! - `verifier` - RS256 token verification
//! - `lockout` - Per-account failed-attempt tracking and timed locks
//! - `permissions` - Explicit role-to-permission matrix
//! - `service` - The orchestrating auth service (login, refresh, authorize)
//! - `issuer` - RS256 token issuance
//! - `service_tokens` - Service-to-service token acquisition
//! - `audit` - Audit events and sinks
//! - `config` - Environment-driven configuration
//!
//! ## Flow
//!
//! 1. A request arrives with `Authorization: Bearer <token>`
//! 2. [`service::AuthService::authorize`] hands the token to the verifier
//! 3. The verifier resolves the signing key by `kid` through the JWKS cache
//! 4. Verified roles resolve through the permission matrix
//! 5. The caller gets an allowed context or a detail-free denial

pub mod audit;
pub mod claims;
pub mod clock;
pub mod config;
pub mod error;
pub mod issuer;
pub mod jwks;
pub mod lockout;
pub mod permissions;
pub mod service;
pub mod service_tokens;
pub mod verifier;

pub use audit::{AuditEvent, AuditEventType, AuditSink, TracingAuditSink};
pub use claims::{ClaimSet, TokenType};
pub use clock::{Clock, SystemClock};
pub use config::{AuthConfig, ConfigError};
pub use error::AuthError;
pub use issuer::{TokenIssuer, TokenPair};
pub use jwks::{HttpKeyFetcher, KeyError, KeyFetcher, KeyResolver};
pub use lockout::{LockoutStatus, LockoutTracker};
pub use permissions::RolePermissionMatrix;
pub use service::{AuthService, AuthorizedContext, Credentials, UserRecord, UserStore};
pub use service_tokens::{ServiceTokenClient, ServiceTokenExchanger};
pub use verifier::TokenVerifier;
