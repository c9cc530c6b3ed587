// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Stratus Platform

//! Verified claim sets and token types.

use serde::{Deserialize, Serialize};

/// The kind of token a claim set was issued as.
///
/// Carried in the `token_type` claim of every Stratus token. Access tokens
/// authorize requests, refresh tokens may only be exchanged for new pairs,
/// and service tokens identify one platform service to another.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenType {
    /// Short-lived token presented on API requests.
    Access,
    /// Longer-lived token exchangeable for a fresh pair.
    Refresh,
    /// Service-to-service identity token.
    Service,
}

impl TokenType {
    /// Wire representation used in the `token_type` claim.
    pub fn as_str(&self) -> &'static str {
        match self {
            TokenType::Access => "access",
            TokenType::Refresh => "refresh",
            TokenType::Service => "service",
        }
    }

    /// Parse the wire representation. Unknown strings are rejected.
    pub fn parse(s: &str) -> Option<TokenType> {
        match s {
            "access" => Some(TokenType::Access),
            "refresh" => Some(TokenType::Refresh),
            "service" => Some(TokenType::Service),
            _ => None,
        }
    }
}

impl std::fmt::Display for TokenType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Claims extracted from a successfully verified token.
///
/// This is the only representation of a token the rest of the crate (and
/// embedding services) ever see; the raw JWT never travels past the
/// verifier.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClaimSet {
    /// Canonical subject id (`sub` claim).
    pub subject: String,
    /// Role names carried by the token. May name roles the permission
    /// matrix does not know; those resolve to no permissions.
    pub roles: Vec<String>,
    /// What kind of token this is.
    pub token_type: TokenType,
    /// Unique token id (`jti`), the handle for revocation.
    pub token_id: String,
    /// Issued-at, Unix seconds.
    pub issued_at: i64,
    /// Expiry, Unix seconds.
    pub expires_at: i64,
}
