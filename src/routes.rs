// Copyright (c) 2024-2025 Jesse Morgan / Morgan Forge
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Screens of the materials dashboard and who may open them.
//!
//! Each route carries an allow-list checked by the authorization gate on
//! navigation, and by the visibility filter when building the menu.

use serde::{Deserialize, Serialize};

use crate::security::gate::GateConfig;
use crate::security::roles::{RoleSet, ADMIN, SITE_ENGINEER, SITE_MANAGER};
use crate::security::visibility::{filter_visible, RoleRestricted};

/// Unauthenticated entry point.
pub const LOGIN_ROUTE: &str = "/login";

/// Shown when the user lacks the role for a screen.
pub const FORBIDDEN_ROUTE: &str = "/unauthorized";

/// Landing screen after login.
pub const DASHBOARD_ROUTE: &str = "/dashboard";

/// One guarded screen.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Route {
    pub path: String,
    pub title: String,
    /// Empty means any authenticated user.
    #[serde(default)]
    pub allowed_roles: RoleSet,
    #[serde(default = "default_show_in_menu")]
    pub show_in_menu: bool,
}

fn default_show_in_menu() -> bool {
    true
}

impl Route {
    pub fn new(path: &str, title: &str, allowed: &[&str]) -> Self {
        Self {
            path: path.to_string(),
            title: title.to_string(),
            allowed_roles: allowed.iter().collect(),
            show_in_menu: true,
        }
    }

    fn hidden(mut self) -> Self {
        self.show_in_menu = false;
        self
    }
}

impl RoleRestricted for Route {
    fn allowed_roles(&self) -> &RoleSet {
        &self.allowed_roles
    }
}

/// Ordered list of routes; menu order follows table order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RouteTable {
    routes: Vec<Route>,
}

impl Default for RouteTable {
    fn default() -> Self {
        let routes = vec![
            Route::new(DASHBOARD_ROUTE, "Dashboard", &[]),
            Route::new("/sites", "Sites", &[ADMIN]),
            Route::new("/users", "Users", &[ADMIN]),
            Route::new("/suppliers", "Suppliers", &[ADMIN, SITE_MANAGER]),
            Route::new("/units", "Units", &[ADMIN]),
            Route::new("/materials", "Materials", &[ADMIN, SITE_MANAGER]),
            Route::new("/stock", "Stock", &[ADMIN, SITE_MANAGER, SITE_ENGINEER]),
            Route::new("/material-requests", "Material Requests", &[ADMIN, SITE_MANAGER, SITE_ENGINEER]),
            Route::new("/issuances", "Issuances", &[ADMIN, SITE_MANAGER]),
            Route::new("/transfers", "Transfers", &[ADMIN, SITE_MANAGER]),
            Route::new("/consumption", "Consumption", &[SITE_MANAGER, SITE_ENGINEER]),
            Route::new("/vouchers", "Vouchers", &[ADMIN, SITE_MANAGER]).hidden(),
        ];
        Self { routes }
    }
}

fn normalize_path(path: &str) -> &str {
    let trimmed = path.trim();
    match trimmed.trim_end_matches('/') {
        "" => "/",
        p => p,
    }
}

impl RouteTable {
    pub fn new(routes: Vec<Route>) -> Self {
        Self { routes }
    }

    pub fn routes(&self) -> &[Route] {
        &self.routes
    }

    /// Resolve a path; a trailing slash is ignored.
    pub fn find(&self, path: &str) -> Option<&Route> {
        let path = normalize_path(path);
        self.routes.iter().find(|r| normalize_path(&r.path) == path)
    }

    /// Menu entries the role set may see.
    pub fn navigation_menu(&self, current: &RoleSet) -> Vec<&Route> {
        filter_visible(self.routes.iter().filter(|r| r.show_in_menu), current)
    }
}

/// Copy shown on the forbidden route.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ForbiddenPage {
    pub title: &'static str,
    pub message: String,
    pub actions: [ForbiddenAction; 2],
    pub dashboard_route: String,
    pub login_route: String,
}

/// Ways out of the forbidden page.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ForbiddenAction {
    ReturnToDashboard,
    LogOut,
}

impl ForbiddenAction {
    pub fn label(&self) -> &'static str {
        match self {
            ForbiddenAction::ReturnToDashboard => "Return to dashboard",
            ForbiddenAction::LogOut => "Log out",
        }
    }
}

impl ForbiddenPage {
    /// Page explaining why `route` was refused for `current`.
    pub fn for_route(route: &Route, current: &RoleSet, config: &GateConfig) -> Self {
        Self {
            title: "Access denied",
            message: format!(
                "{} requires one of: {}. Your roles: {}.",
                route.title, route.allowed_roles, current
            ),
            actions: [ForbiddenAction::ReturnToDashboard, ForbiddenAction::LogOut],
            dashboard_route: config.dashboard_route.clone(),
            login_route: config.login_route.clone(),
        }
    }

    /// Route an action leads to.
    pub fn target(&self, action: ForbiddenAction) -> &str {
        match action {
            ForbiddenAction::ReturnToDashboard => &self.dashboard_route,
            ForbiddenAction::LogOut => &self.login_route,
        }
    }
}
