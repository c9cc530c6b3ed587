// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Stratus Platform

//! Role to permission resolution.
//!
//! The matrix is fully explicit: every role enumerates every permission it
//! grants, and no role ever "contains" another. Even `super_admin` lists out
//! everything it can do, so edits to the matrix stay auditable and a role can
//! never pick up permissions by accident when a neighbouring role changes.
//!
//! Resolution is a pure set union. Unknown role names resolve to nothing
//! rather than failing the request: a token minted with a role this service
//! has never heard of should not break resolution of its valid roles.

use std::collections::{BTreeMap, HashSet};

use serde::{Deserialize, Serialize};

/// Static mapping from role name to the permissions it grants.
///
/// Built once at startup and read-only afterwards.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RolePermissionMatrix {
    grants: BTreeMap<String, HashSet<String>>,
}

impl RolePermissionMatrix {
    /// Create an empty matrix.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a role with its full permission list (builder style).
    ///
    /// Calling `grant` twice for the same role replaces the earlier listing.
    pub fn grant<I, S>(mut self, role: impl Into<String>, permissions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.grants.insert(
            role.into(),
            permissions.into_iter().map(Into::into).collect(),
        );
        self
    }

    /// The permission matrix documented for the Stratus platform services.
    ///
    /// Note `super_admin` repeats every `admin` grant explicitly; there is
    /// no inheritance shortcut.
    pub fn platform_default() -> Self {
        Self::new()
            .grant(
                "user",
                [
                    "profiles:read",
                    "profiles:write:own",
                    "projects:read",
                    "projects:write:own",
                    "messages:read",
                    "messages:send",
                ],
            )
            .grant(
                "moderator",
                [
                    "profiles:read",
                    "projects:read",
                    "messages:read",
                    "messages:moderate",
                ],
            )
            .grant(
                "admin",
                [
                    "profiles:read",
                    "profiles:write",
                    "projects:read",
                    "projects:write",
                    "projects:delete",
                    "messages:read",
                    "messages:moderate",
                    "admin:users:read",
                    "admin:users:write",
                ],
            )
            .grant(
                "super_admin",
                [
                    "profiles:read",
                    "profiles:write",
                    "projects:read",
                    "projects:write",
                    "projects:delete",
                    "messages:read",
                    "messages:moderate",
                    "admin:users:read",
                    "admin:users:write",
                    "admin:roles:write",
                    "admin:audit:read",
                ],
            )
            .grant("service", ["internal:invoke"])
    }

    /// Resolve a set of role names to the union of their granted permissions.
    ///
    /// Unknown roles are skipped. Order-independent and idempotent.
    pub fn resolve<'a, I>(&self, roles: I) -> HashSet<String>
    where
        I: IntoIterator<Item = &'a str>,
    {
        let mut permissions = HashSet::new();
        for role in roles {
            if let Some(granted) = self.grants.get(role) {
                permissions.extend(granted.iter().cloned());
            }
        }
        permissions
    }

    /// Whether the given roles collectively grant a permission.
    pub fn allows<'a, I>(&self, roles: I, permission: &str) -> bool
    where
        I: IntoIterator<Item = &'a str>,
    {
        roles.into_iter().any(|role| {
            self.grants
                .get(role)
                .is_some_and(|granted| granted.contains(permission))
        })
    }

    /// Role names the matrix knows about.
    pub fn roles(&self) -> impl Iterator<Item = &str> {
        self.grants.keys().map(String::as_str)
    }
}
