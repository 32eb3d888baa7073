// Copyright (c) 2024-2025 Jesse Morgan / Morgan Forge
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Session lifecycle and role authorization.
//!
//! ## Components
//!
//! - **Token store** ([`token_store`]): the persisted bearer token and claim reads.
//! - **Session clock** ([`session_clock`]): inactivity timer with warning countdown.
//! - **Authorization gate** ([`gate`]): render vs. redirect for protected views.
//! - **Visibility filter** ([`visibility`]): hide fragments by role.
//!
//! ## Usage
//!
//! ```no_run
//! use std::sync::Arc;
//! use stockgate::security::{AuthorizationGate, Decision, GateConfig, MemoryTokenStore, RoleSet};
//!
//! let store = Arc::new(MemoryTokenStore::new());
//! let gate = AuthorizationGate::new(store, GateConfig::default());
//!
//! let admin_only: RoleSet = ["admin"].into_iter().collect();
//! if gate.authorize(&admin_only) == Decision::RedirectToLogin {
//!     // show the login screen
//! }
//! ```

pub mod claims;
pub mod gate;
pub mod locks;
pub mod roles;
pub mod session_clock;
pub mod token_store;
pub mod visibility;

pub use claims::{decode_claims, Claims, ROLE_CLAIM, USER_ID_CLAIM};
pub use gate::{
    AuthorizationGate, Decision, GateConfig, Guarded, NavigationMode, Navigator, ProtectedView,
    SessionPresenter,
};
pub use roles::{RoleSet, ADMIN, KNOWN_ROLES, SITE_ENGINEER, SITE_MANAGER};
pub use session_clock::{
    ActivityKind, ExpiryReason, SessionClock, SessionClockConfig, SessionEvent, SessionPhase,
    TimerHandle, TimerKind, COUNTDOWN_TICK, QUALIFYING_ACTIVITY, SESSION_TIMEOUT, WARNING_WINDOW,
};
pub use token_store::{FileTokenStore, MemoryTokenStore, TokenStore, TOKEN_KEY};
pub use visibility::{filter_visible, is_visible, RoleRestricted};
