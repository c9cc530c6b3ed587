// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Stratus Platform

//! Per-account failed-attempt tracking and timed lockout.
//!
//! ## State machine
//!
//! Each account is either `Unlocked(failures)` or `Locked(until)`:
//!
//! - failure while unlocked increments the counter; hitting the threshold
//!   locks the account for the configured duration
//! - success while unlocked resets the counter to zero
//! - any attempt while locked is rejected with the remaining seconds and
//!   leaves the counter untouched
//! - once `now >= until` the account is reset to `Unlocked(0)` before the
//!   new attempt is evaluated
//!
//! ## Concurrency
//!
//! State lives in a keyed map with one mutex per account, so two
//! simultaneous failures for the same account serialize and both count.
//! Unrelated accounts never contend on each other's lock; the outer map
//! lock is held only long enough to clone the per-account handle.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, RwLock};

use crate::clock::Clock;
use crate::error::AuthError;

/// Externally observable lockout state of one account.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockoutStatus {
    /// Account accepts attempts; `failures` consecutive failures so far.
    Unlocked {
        /// Consecutive failed attempts since the last reset.
        failures: u32,
    },
    /// Account rejects attempts until the given Unix timestamp.
    Locked {
        /// When the lock expires, Unix seconds.
        until_unix: i64,
    },
}

#[derive(Debug, Default)]
struct AccountState {
    failures: u32,
    locked_until: Option<i64>,
}

impl AccountState {
    fn status(&self) -> LockoutStatus {
        match self.locked_until {
            Some(until) => LockoutStatus::Locked { until_unix: until },
            None => LockoutStatus::Unlocked {
                failures: self.failures,
            },
        }
    }

    /// Clear an expired lock before evaluating anything else.
    fn expire(&mut self, now: i64) {
        if let Some(until) = self.locked_until {
            if now >= until {
                self.locked_until = None;
                self.failures = 0;
            }
        }
    }
}

/// Tracks consecutive authentication failures per account.
pub struct LockoutTracker {
    threshold: u32,
    lock_secs: i64,
    clock: Arc<dyn Clock>,
    accounts: RwLock<HashMap<String, Arc<Mutex<AccountState>>>>,
}

impl LockoutTracker {
    /// Create a tracker.
    ///
    /// `threshold` is the number of consecutive failures that trips a lock;
    /// `lock_secs` is how long the lock lasts.
    pub fn new(threshold: u32, lock_secs: i64, clock: Arc<dyn Clock>) -> Self {
        Self {
            threshold,
            lock_secs,
            clock,
            accounts: RwLock::new(HashMap::new()),
        }
    }

    fn entry(&self, account: &str) -> Arc<Mutex<AccountState>> {
        if let Some(state) = self
            .accounts
            .read()
            .expect("lockout map poisoned")
            .get(account)
        {
            return Arc::clone(state);
        }
        let mut map = self.accounts.write().expect("lockout map poisoned");
        Arc::clone(map.entry(account.to_string()).or_default())
    }

    /// Gate an authentication attempt.
    ///
    /// Returns `Err(AccountLocked)` with the remaining seconds while the
    /// account is locked; otherwise the attempt may proceed. An expired lock
    /// is cleared here, so the attempt is evaluated as if freshly unlocked.
    pub fn check(&self, account: &str) -> Result<(), AuthError> {
        let entry = self.entry(account);
        let mut state = entry.lock().expect("account state poisoned");
        let now = self.clock.now_unix();
        state.expire(now);
        match state.locked_until {
            Some(until) => Err(AuthError::AccountLocked {
                retry_after_secs: until - now,
            }),
            None => Ok(()),
        }
    }

    /// Record a failed attempt; returns the resulting state.
    ///
    /// Locks the account once the threshold is reached. A still-active lock
    /// is left untouched (attempts during a lock never advance the counter).
    pub fn record_failure(&self, account: &str) -> LockoutStatus {
        let entry = self.entry(account);
        let mut state = entry.lock().expect("account state poisoned");
        let now = self.clock.now_unix();
        state.expire(now);
        if state.locked_until.is_some() {
            return state.status();
        }
        state.failures += 1;
        if state.failures >= self.threshold {
            state.locked_until = Some(now + self.lock_secs);
        }
        state.status()
    }

    /// Record a successful attempt; resets to `Unlocked(0)`.
    ///
    /// Returns the state *before* the reset so the caller can tell whether
    /// a lock or a failure streak was cleared.
    pub fn record_success(&self, account: &str) -> LockoutStatus {
        let entry = self.entry(account);
        let mut state = entry.lock().expect("account state poisoned");
        state.expire(self.clock.now_unix());
        let previous = state.status();
        state.failures = 0;
        state.locked_until = None;
        previous
    }

    /// Drop accounts with nothing left to track.
    ///
    /// An entry survives only while it carries failures or an active lock;
    /// everything else is reconstructed on demand, so removal is safe.
    /// Long-lived embedders call this periodically to keep the map bounded.
    pub fn prune(&self) {
        let now = self.clock.now_unix();
        let mut map = self.accounts.write().expect("lockout map poisoned");
        map.retain(|_, entry| {
            let mut state = entry.lock().expect("account state poisoned");
            state.expire(now);
            state.failures > 0 || state.locked_until.is_some()
        });
    }

    /// Current state of an account without evaluating an attempt.
    pub fn status(&self, account: &str) -> LockoutStatus {
        let entry = self.entry(account);
        let mut state = entry.lock().expect("account state poisoned");
        state.expire(self.clock.now_unix());
        state.status()
    }
}
