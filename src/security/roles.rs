// Copyright (c) 2024-2025 Jesse Morgan / Morgan Forge
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Role sets derived from the session token.
//!
//! Roles are plain strings issued by the backend. The dashboard knows three of
//! them (`admin`, `sitemanager`, `siteengineer`) but any string is accepted so a
//! newly issued role never breaks decoding.
//!
//! Roles are lower-cased when a [`RoleSet`] is built and every lookup lower-cases
//! its probe, so `"Admin"` and `"admin"` are the same grant.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Full access to every screen.
pub const ADMIN: &str = "admin";

/// Manages one or more sites: stock, requests, transfers.
pub const SITE_MANAGER: &str = "sitemanager";

/// Raises material requests and records consumption on site.
pub const SITE_ENGINEER: &str = "siteengineer";

/// Roles the dashboard has screens for.
pub const KNOWN_ROLES: [&str; 3] = [ADMIN, SITE_MANAGER, SITE_ENGINEER];

/// Ordered set of role strings.
///
/// Insertion order is kept (it is the order the token listed them in) and
/// duplicates are dropped. An empty set is valid: a token may carry no role.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "Vec<String>", into = "Vec<String>")]
pub struct RoleSet {
    roles: Vec<String>,
}

fn normalize(role: &str) -> String {
    role.trim().to_lowercase()
}

impl RoleSet {
    /// Empty role set (no grants, or "unrestricted" when used as an allow-list).
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a role, ignoring blanks and duplicates.
    pub fn insert(&mut self, role: &str) {
        let role = normalize(role);
        if role.is_empty() || self.roles.contains(&role) {
            return;
        }
        self.roles.push(role);
    }

    pub fn is_empty(&self) -> bool {
        self.roles.is_empty()
    }

    pub fn len(&self) -> usize {
        self.roles.len()
    }

    /// True if `role` is granted by this set.
    pub fn has_role(&self, role: &str) -> bool {
        let probe = normalize(role);
        self.roles.iter().any(|r| *r == probe)
    }

    /// True if at least one role appears in both sets.
    pub fn intersects(&self, other: &RoleSet) -> bool {
        self.roles.iter().any(|r| other.has_role(r))
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.roles.iter().map(String::as_str)
    }
}

impl<S: AsRef<str>> FromIterator<S> for RoleSet {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        let mut set = RoleSet::new();
        for role in iter {
            set.insert(role.as_ref());
        }
        set
    }
}

impl From<Vec<String>> for RoleSet {
    fn from(roles: Vec<String>) -> Self {
        roles.into_iter().collect()
    }
}

impl From<RoleSet> for Vec<String> {
    fn from(set: RoleSet) -> Self {
        set.roles
    }
}

impl fmt::Display for RoleSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.roles.is_empty() {
            return write!(f, "(none)");
        }
        write!(f, "{}", self.roles.join(", "))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_role_set_normalizes_and_dedups() {
        let roles: RoleSet = ["Admin", "admin", " SiteManager ", ""].into_iter().collect();

        assert_eq!(roles.len(), 2);
        assert_eq!(roles.iter().collect::<Vec<_>>(), vec!["admin", "sitemanager"]);
    }

    #[test]
    fn test_has_role_is_case_insensitive() {
        let roles: RoleSet = [SITE_ENGINEER].into_iter().collect();

        assert!(roles.has_role("siteengineer"));
        assert!(roles.has_role("SiteEngineer"));
        assert!(!roles.has_role(ADMIN));
    }

    #[test]
    fn test_intersects() {
        let current: RoleSet = [SITE_MANAGER].into_iter().collect();
        let allowed: RoleSet = [ADMIN, SITE_MANAGER].into_iter().collect();
        let other: RoleSet = [SITE_ENGINEER].into_iter().collect();

        assert!(current.intersects(&allowed));
        assert!(!other.intersects(&allowed));
        assert!(!RoleSet::new().intersects(&allowed));
    }

    #[test]
    fn test_serde_as_plain_list() {
        let roles: RoleSet = serde_json::from_str(r#"["ADMIN","siteengineer"]"#).unwrap();
        assert_eq!(serde_json::to_string(&roles).unwrap(), r#"["admin","siteengineer"]"#);
    }

    #[test]
    fn test_display() {
        assert_eq!(RoleSet::new().to_string(), "(none)");
        let roles: RoleSet = [ADMIN, SITE_ENGINEER].into_iter().collect();
        assert_eq!(roles.to_string(), "admin, siteengineer");
    }
}
