// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Stratus Platform

//! Audit events for security-sensitive transitions.
//!
//! The auth service publishes an event for every login outcome, lockout
//! transition, permission denial and token lifecycle change. Delivery is the
//! embedding service's concern: it supplies an [`AuditSink`] wired to the
//! platform's observability pipeline. The default sink emits structured
//! `tracing` records under the `audit` target.

use std::sync::Mutex;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Types of auditable auth events.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AuditEventType {
    /// Credentials accepted, token pair issued.
    LoginSucceeded,
    /// Credentials rejected (reason stays internal).
    LoginFailed,
    /// Consecutive failures tripped the lockout threshold.
    AccountLocked,
    /// A lock was cleared (expiry or successful authentication).
    LockoutCleared,
    /// A valid identity lacked the required permission.
    PermissionDenied,
    /// A refresh token was exchanged for a new pair.
    TokenRefreshed,
    /// A token id was added to the revocation list.
    TokenRevoked,
}

/// A single audit record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEvent {
    /// Unique event id.
    pub event_id: String,
    /// When the event occurred.
    pub timestamp: DateTime<Utc>,
    /// What happened.
    pub event_type: AuditEventType,
    /// Account or subject the event concerns, when known.
    pub account: Option<String>,
    /// Additional structured detail (lock duration, permission name, ...).
    pub details: Option<serde_json::Value>,
}

impl AuditEvent {
    /// Create a new event of the given type.
    pub fn new(event_type: AuditEventType) -> Self {
        Self {
            event_id: uuid::Uuid::new_v4().to_string(),
            timestamp: Utc::now(),
            event_type,
            account: None,
            details: None,
        }
    }

    /// Set the account/subject.
    pub fn with_account(mut self, account: impl Into<String>) -> Self {
        self.account = Some(account.into());
        self
    }

    /// Attach structured detail.
    pub fn with_details(mut self, details: serde_json::Value) -> Self {
        self.details = Some(details);
        self
    }
}

/// Destination for audit events.
///
/// Implementations must not block: publication happens on the request path.
pub trait AuditSink: Send + Sync {
    /// Deliver one event.
    fn publish(&self, event: AuditEvent);
}

/// Default sink: structured `tracing` records under the `audit` target.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingAuditSink;

impl AuditSink for TracingAuditSink {
    fn publish(&self, event: AuditEvent) {
        tracing::info!(
            target: "audit",
            event_id = %event.event_id,
            event_type = ?event.event_type,
            account = event.account.as_deref().unwrap_or("-"),
            details = %event
                .details
                .as_ref()
                .map(|d| d.to_string())
                .unwrap_or_default(),
            "audit event"
        );
    }
}

/// In-memory sink for tests and local development.
#[derive(Debug, Default)]
pub struct MemoryAuditSink {
    events: Mutex<Vec<AuditEvent>>,
}

impl MemoryAuditSink {
    /// Create an empty sink.
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of everything published so far.
    pub fn events(&self) -> Vec<AuditEvent> {
        self.events.lock().expect("audit sink poisoned").clone()
    }

    /// Event types in publication order, for compact assertions.
    pub fn event_types(&self) -> Vec<AuditEventType> {
        self.events().iter().map(|e| e.event_type).collect()
    }
}

impl AuditSink for MemoryAuditSink {
    fn publish(&self, event: AuditEvent) {
        self.events.lock().expect("audit sink poisoned").push(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn builder_sets_fields() {
        let event = AuditEvent::new(AuditEventType::AccountLocked)
            .with_account("user@example.com")
            .with_details(json!({ "lock_secs": 1800 }));

        assert_eq!(event.event_type, AuditEventType::AccountLocked);
        assert_eq!(event.account.as_deref(), Some("user@example.com"));
        assert_eq!(event.details, Some(json!({ "lock_secs": 1800 })));
    }

    #[test]
    fn event_ids_are_unique() {
        let a = AuditEvent::new(AuditEventType::LoginFailed);
        let b = AuditEvent::new(AuditEventType::LoginFailed);
        assert_ne!(a.event_id, b.event_id);
    }

    #[test]
    fn memory_sink_records_in_order() {
        let sink = MemoryAuditSink::new();
        sink.publish(AuditEvent::new(AuditEventType::LoginFailed));
        sink.publish(AuditEvent::new(AuditEventType::AccountLocked));

        assert_eq!(
            sink.event_types(),
            vec![AuditEventType::LoginFailed, AuditEventType::AccountLocked]
        );
    }
}
