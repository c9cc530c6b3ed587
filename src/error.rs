// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Stratus Platform

//! Caller-visible error taxonomy.
//!
//! ## Anti-enumeration
//!
//! Every internal authentication failure (unknown account, wrong password,
//! bad signature, expired token, wrong issuer or audience, disallowed
//! algorithm) collapses into the single [`AuthError::AuthenticationFailed`]
//! variant before it leaves this crate. The precise reason is recorded with
//! `tracing` for operators and never surfaced to the caller, so responses
//! cannot be used to probe which accounts exist or which check failed.
//!
//! [`AuthError::AccountLocked`] is the one variant that carries a number
//! (seconds until the lock expires): clients need it to back off, and it
//! reveals nothing an attacker could not learn by counting attempts.

use thiserror::Error;

/// Errors visible to consumers of the auth core.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum AuthError {
    /// Credentials or token rejected. Intentionally carries no detail.
    #[error("authentication failed")]
    AuthenticationFailed,

    /// The account is temporarily locked after repeated failures.
    #[error("account locked, retry in {retry_after_secs}s")]
    AccountLocked {
        /// Seconds until the lock expires.
        retry_after_secs: i64,
    },

    /// Identity is valid but lacks the required permission.
    ///
    /// Deliberately indistinguishable from "resource does not exist" at the
    /// API layer: callers map this to the same response either way.
    #[error("authorization denied")]
    AuthorizationDenied,

    /// The upstream key set could not be fetched; verification fails closed.
    #[error("signing key source unavailable")]
    KeySourceUnavailable,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn messages_are_generic() {
        // The Display strings are part of the contract: they must not leak
        // which check failed.
        assert_eq!(
            AuthError::AuthenticationFailed.to_string(),
            "authentication failed"
        );
        assert_eq!(
            AuthError::AuthorizationDenied.to_string(),
            "authorization denied"
        );
    }

    #[test]
    fn account_locked_reports_remaining_seconds() {
        let err = AuthError::AccountLocked {
            retry_after_secs: 42,
        };
        assert_eq!(err.to_string(), "account locked, retry in 42s");
    }
}
