// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Stratus Platform

//! Time source seam.
//!
//! Lockout windows and token lifetimes are all unix-second arithmetic, so the
//! only thing the rest of the crate ever asks for is "now" as an `i64`.
//! Production code holds an `Arc<dyn Clock>` pointing at [`SystemClock`];
//! tests swap in [`ManualClock`] and move time explicitly instead of
//! sleeping.

use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;

/// Unix-seconds time source.
pub trait Clock: Send + Sync {
    fn now_unix(&self) -> i64;
}

/// Wall clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_unix(&self) -> i64 {
        chrono::Utc::now().timestamp()
    }
}

/// Hand-driven clock for tests. Clones share the same underlying instant, so
/// advancing one handle is visible to every component holding the clock.
#[derive(Debug, Clone)]
pub struct ManualClock {
    now: Arc<AtomicI64>,
}

impl ManualClock {
    pub fn new(now_unix: i64) -> Self {
        Self {
            now: Arc::new(AtomicI64::new(now_unix)),
        }
    }

    /// Move time forward by `secs`.
    pub fn advance(&self, secs: i64) {
        self.now.fetch_add(secs, Ordering::SeqCst);
    }

    /// Jump to an absolute unix timestamp.
    pub fn set(&self, now_unix: i64) {
        self.now.store(now_unix, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now_unix(&self) -> i64 {
        self.now.load(Ordering::SeqCst)
    }
}
