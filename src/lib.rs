// Copyright (c) 2024-2025 Jesse Morgan / Morgan Forge
// SPDX-License-Identifier: AGPL-3.0-or-later

//! stockgate - session lifecycle and role gate for the materials dashboard
//!
//! Decides whether a screen of the construction-materials inventory dashboard
//! may be shown, and ends the session after a period of inactivity.
//!
//! **Token** -> **Authorization gate** -> **Protected view + session clock**
//!
//! # Core Modules
//!
//! - [`security`] - Token store, session clock, authorization gate, visibility filter
//! - [`routes`] - Dashboard screens and their allowed roles
//! - [`runtime`] - Async driver running a protected view's timers
//! - [`activity`] - Terminal input mapped to session activity
//! - [`ui`] - Terminal presenter and navigator
//! - [`config`] - `~/.stockgate/config.json`
//! - [`logging`] - tracing subscriber setup
//! - [`error`] - Error types and CLI error formatting
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use stockgate::{AuthorizationGate, Decision, FileTokenStore, GateConfig, RouteTable};
//!
//! let store = Arc::new(FileTokenStore::new("/tmp/stockgate/token"));
//! let gate = AuthorizationGate::new(store, GateConfig::default());
//! let routes = RouteTable::default();
//!
//! if let Some(route) = routes.find("/stock") {
//!     match gate.authorize(&route.allowed_roles) {
//!         Decision::Render => println!("showing {}", route.title),
//!         other => println!("{}", other),
//!     }
//! }
//! ```

pub mod activity;
pub mod config;
pub mod error;
pub mod logging;
pub mod routes;
pub mod runtime;
pub mod security;
pub mod ui;
pub mod utils;

pub use error::{format_error, AuthError, AuthResult};
pub use routes::{ForbiddenPage, Route, RouteTable, DASHBOARD_ROUTE, FORBIDDEN_ROUTE, LOGIN_ROUTE};
pub use runtime::{SessionCommand, SessionDriver, SessionOutcome};
pub use security::{
    decode_claims, is_visible, ActivityKind, AuthorizationGate, Claims, Decision, ExpiryReason,
    FileTokenStore, GateConfig, Guarded, MemoryTokenStore, NavigationMode, Navigator,
    ProtectedView, RoleSet, SessionClock, SessionEvent, SessionPhase, SessionPresenter,
    TokenStore,
};
