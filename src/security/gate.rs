// Copyright (c) 2024-2025 Jesse Morgan / Morgan Forge
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Role authorization gate for protected views.
//!
//! [`AuthorizationGate::authorize`] decides, on every navigation, whether a
//! guarded view renders or the user is sent to the login or forbidden route.
//! Nothing is cached between navigations: the token is re-read each time.
//!
//! [`AuthorizationGate::guard`] additionally mounts a [`ProtectedView`]: the
//! guarded content plus exactly one [`SessionClock`]. The view turns clock
//! events into presentation calls and, on expiry, purges the token and
//! replaces the current route with the login route.

use chrono::Utc;
use std::fmt;
use std::sync::Arc;
use std::time::Instant;

use super::claims::Claims;
use super::roles::RoleSet;
use super::session_clock::{
    ActivityKind, ExpiryReason, SessionClock, SessionClockConfig, SessionEvent, SessionPhase,
};
use super::token_store::TokenStore;
use super::visibility::is_visible;
use crate::error::AuthError;
use crate::routes::{DASHBOARD_ROUTE, FORBIDDEN_ROUTE, LOGIN_ROUTE};

/// Outcome of an authorization check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Render,
    RedirectToLogin,
    RedirectToForbidden,
}

impl fmt::Display for Decision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Decision::Render => write!(f, "render"),
            Decision::RedirectToLogin => write!(f, "redirect-to-login"),
            Decision::RedirectToForbidden => write!(f, "redirect-to-forbidden"),
        }
    }
}

/// How a redirect affects history.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NavigationMode {
    Push,
    /// Replace the current entry; "back" cannot return to the guarded view.
    Replace,
}

/// Navigation primitive.
pub trait Navigator: Send + Sync {
    fn redirect(&self, route: &str, mode: NavigationMode);
}

/// Presentation of the clock's phases: a blocking warning with a sticky
/// countdown notification, and the end of the session.
pub trait SessionPresenter: Send + Sync {
    fn show_warning(&self, remaining_secs: u64);
    fn update_countdown(&self, remaining_secs: u64);
    /// Remove the warning without comment. Also called on expiry and unmount.
    fn dismiss_warning(&self);
    /// The user chose to continue from the warning.
    fn session_continued(&self);
    fn session_expired(&self, reason: ExpiryReason);
}

/// Gate settings.
#[derive(Debug, Clone)]
pub struct GateConfig {
    pub login_route: String,
    pub forbidden_route: String,
    /// Where "Return to dashboard" on the forbidden page leads.
    pub dashboard_route: String,
    pub clock: SessionClockConfig,
    /// Treat tokens past their `exp` claim as absent.
    pub reject_expired_tokens: bool,
}

impl Default for GateConfig {
    fn default() -> Self {
        Self {
            login_route: LOGIN_ROUTE.to_string(),
            forbidden_route: FORBIDDEN_ROUTE.to_string(),
            dashboard_route: DASHBOARD_ROUTE.to_string(),
            clock: SessionClockConfig::default(),
            reject_expired_tokens: true,
        }
    }
}

/// Result of guarding a view.
pub enum Guarded {
    /// Authorized; the view is mounted with its session clock running.
    Render(ProtectedView),
    /// Not authorized; the navigator has already been told where to go.
    Redirected(Decision),
}

/// Decides render vs. redirect from the stored token.
pub struct AuthorizationGate {
    store: Arc<dyn TokenStore>,
    config: GateConfig,
}

impl AuthorizationGate {
    pub fn new(store: Arc<dyn TokenStore>, config: GateConfig) -> Self {
        Self { store, config }
    }

    pub fn store(&self) -> &Arc<dyn TokenStore> {
        &self.store
    }

    pub fn config(&self) -> &GateConfig {
        &self.config
    }

    /// Authorize a view restricted to `required` (empty = any authenticated user).
    pub fn authorize(&self, required: &RoleSet) -> Decision {
        self.authorize_at(required, Utc::now().timestamp())
    }

    /// [`authorize`](Self::authorize) with an explicit wall-clock time in epoch seconds.
    pub fn authorize_at(&self, required: &RoleSet, now_secs: i64) -> Decision {
        match self.admit(required, now_secs) {
            Ok(_) => Decision::Render,
            Err(decision) => decision,
        }
    }

    /// Claims of the current user when they may see a view restricted to
    /// `required`, otherwise the redirect decision.
    fn admit(&self, required: &RoleSet, now_secs: i64) -> Result<Claims, Decision> {
        let Some(claims) = self.current_claims(now_secs) else {
            return Err(Decision::RedirectToLogin);
        };

        if is_visible(&claims.roles, required) {
            Ok(claims)
        } else {
            tracing::info!(
                "ACCESS_DENIED | user={} roles=[{}] required=[{}]",
                claims.user_id().unwrap_or("-"),
                claims.roles,
                required
            );
            Err(Decision::RedirectToForbidden)
        }
    }

    /// Route a redirect decision leads to.
    pub fn redirect_route(&self, decision: Decision) -> Option<&str> {
        match decision {
            Decision::Render => None,
            Decision::RedirectToLogin => Some(&self.config.login_route),
            Decision::RedirectToForbidden => Some(&self.config.forbidden_route),
        }
    }

    /// Authorize and, if allowed, mount the protected view with its session clock.
    pub fn guard(
        &self,
        required: &RoleSet,
        presenter: Arc<dyn SessionPresenter>,
        navigator: Arc<dyn Navigator>,
        now: Instant,
    ) -> Guarded {
        let claims = match self.admit(required, Utc::now().timestamp()) {
            Ok(claims) => claims,
            Err(decision) => {
                if let Some(route) = self.redirect_route(decision) {
                    navigator.redirect(route, NavigationMode::Replace);
                }
                return Guarded::Redirected(decision);
            }
        };

        Guarded::Render(ProtectedView {
            clock: SessionClock::mount(self.config.clock, now),
            user_id: claims.user_id().map(str::to_string),
            roles: claims.roles,
            store: Arc::clone(&self.store),
            presenter,
            navigator,
            login_route: self.config.login_route.clone(),
            redirected: false,
        })
    }

    /// Claims of a usable token. Undecodable or expired tokens are purged.
    fn current_claims(&self, now_secs: i64) -> Option<Claims> {
        match self.store.claims() {
            Ok(claims) if self.config.reject_expired_tokens && claims.is_expired_at(now_secs) => {
                tracing::info!(
                    "TOKEN_EXPIRED | user={} exp={}",
                    claims.user_id().unwrap_or("-"),
                    claims.exp.unwrap_or_default()
                );
                self.purge();
                None
            }
            Ok(claims) => Some(claims),
            Err(AuthError::MissingToken) => None,
            Err(e) => {
                tracing::warn!("TOKEN_PURGED | error={}", e);
                self.purge();
                None
            }
        }
    }

    fn purge(&self) {
        if let Err(e) = self.store.clear_token() {
            tracing::error!("TOKEN_CLEAR_FAILED | error={}", e);
        }
    }
}

/// A mounted, authorized view and its session clock.
///
/// Dropping the view unmounts the clock, cancelling every pending timer.
pub struct ProtectedView {
    store: Arc<dyn TokenStore>,
    clock: SessionClock,
    presenter: Arc<dyn SessionPresenter>,
    navigator: Arc<dyn Navigator>,
    login_route: String,
    roles: RoleSet,
    user_id: Option<String>,
    redirected: bool,
}

impl ProtectedView {
    pub fn clock(&self) -> &SessionClock {
        &self.clock
    }

    pub fn phase(&self) -> SessionPhase {
        self.clock.phase()
    }

    /// Roles of the user the view was mounted for.
    pub fn roles(&self) -> &RoleSet {
        &self.roles
    }

    pub fn user_id(&self) -> Option<&str> {
        self.user_id.as_deref()
    }

    /// Whether a fragment restricted to `allowed` is shown in this view.
    pub fn is_visible(&self, allowed: &RoleSet) -> bool {
        is_visible(&self.roles, allowed)
    }

    pub fn record_activity(&mut self, kind: ActivityKind, now: Instant) -> bool {
        self.clock.record_activity(kind, now)
    }

    /// Fire due timers and present the resulting events.
    pub fn advance(&mut self, now: Instant) -> Vec<SessionEvent> {
        let events = self.clock.advance(now);
        self.present(&events);
        events
    }

    pub fn continue_session(&mut self, now: Instant) -> Option<SessionEvent> {
        let event = self.clock.continue_session(now);
        self.present(event.as_slice());
        event
    }

    pub fn logout_now(&mut self, now: Instant) -> Option<SessionEvent> {
        let event = self.clock.logout_now(now);
        self.present(event.as_slice());
        event
    }

    /// Leave the view without ending the session.
    pub fn unmount(&mut self) {
        if self.clock.is_mounted() && self.clock.phase() == SessionPhase::Warning {
            self.presenter.dismiss_warning();
        }
        self.clock.unmount();
    }

    fn present(&mut self, events: &[SessionEvent]) {
        for event in events {
            match event {
                SessionEvent::WarningStarted { remaining_secs, .. } => {
                    self.presenter.show_warning(*remaining_secs)
                }
                SessionEvent::CountdownTick { remaining_secs, .. } => {
                    self.presenter.update_countdown(*remaining_secs)
                }
                SessionEvent::Continued { .. } => {
                    self.presenter.dismiss_warning();
                    self.presenter.session_continued();
                }
                SessionEvent::Expired { reason, .. } => self.end_session(*reason),
            }
        }
    }

    fn end_session(&mut self, reason: ExpiryReason) {
        self.presenter.dismiss_warning();
        if let Err(e) = self.store.clear_token() {
            tracing::error!("TOKEN_CLEAR_FAILED | session={} error={}", self.clock.id(), e);
        }
        self.clock.unmount();
        self.presenter.session_expired(reason);

        if !self.redirected {
            self.redirected = true;
            self.navigator.redirect(&self.login_route, NavigationMode::Replace);
        }
    }
}

impl Drop for ProtectedView {
    fn drop(&mut self) {
        self.clock.unmount();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::security::claims::tests::{mint, mint_for};
    use crate::security::claims::{ROLE_CLAIM, USER_ID_CLAIM};
    use crate::security::roles::{ADMIN, SITE_ENGINEER, SITE_MANAGER};
    use crate::security::session_clock::{SESSION_TIMEOUT, WARNING_WINDOW};
    use crate::security::token_store::MemoryTokenStore;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use std::time::Duration;

    #[derive(Default)]
    struct Recorder {
        calls: Mutex<Vec<String>>,
    }

    impl Recorder {
        fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }

        fn push(&self, call: String) {
            self.calls.lock().unwrap().push(call);
        }
    }

    impl SessionPresenter for Recorder {
        fn show_warning(&self, remaining_secs: u64) {
            self.push(format!("show:{}", remaining_secs));
        }
        fn update_countdown(&self, remaining_secs: u64) {
            self.push(format!("tick:{}", remaining_secs));
        }
        fn dismiss_warning(&self) {
            self.push("dismiss".to_string());
        }
        fn session_continued(&self) {
            self.push("continued".to_string());
        }
        fn session_expired(&self, reason: ExpiryReason) {
            self.push(format!("expired:{}", reason));
        }
    }

    impl Navigator for Recorder {
        fn redirect(&self, route: &str, mode: NavigationMode) {
            self.push(format!("{:?}:{}", mode, route));
        }
    }

    fn roles(names: &[&str]) -> RoleSet {
        names.iter().collect()
    }

    fn gate_with(token: Option<&str>) -> (AuthorizationGate, MemoryTokenStore) {
        let store = token.map(MemoryTokenStore::with_token).unwrap_or_default();
        let gate = AuthorizationGate::new(Arc::new(store.clone()), GateConfig::default());
        (gate, store)
    }

    fn mount(gate: &AuthorizationGate, required: &[&str], now: Instant) -> (ProtectedView, Arc<Recorder>, Arc<Recorder>) {
        let presenter = Arc::new(Recorder::default());
        let navigator = Arc::new(Recorder::default());
        match gate.guard(&roles(required), presenter.clone(), navigator.clone(), now) {
            Guarded::Render(view) => (view, presenter, navigator),
            Guarded::Redirected(d) => panic!("expected render, got {}", d),
        }
    }

    #[test]
    fn test_missing_token_redirects_to_login() {
        let (gate, _) = gate_with(None);

        assert_eq!(gate.authorize(&roles(&[ADMIN])), Decision::RedirectToLogin);
        assert_eq!(gate.authorize(&roles(&[])), Decision::RedirectToLogin);
        assert_eq!(gate.authorize(&roles(&[ADMIN, SITE_MANAGER, SITE_ENGINEER])), Decision::RedirectToLogin);
    }

    #[test]
    fn test_role_mismatch_is_forbidden() {
        let (gate, store) = gate_with(Some(&mint_for("3", &[SITE_ENGINEER])));

        assert_eq!(gate.authorize(&roles(&[ADMIN])), Decision::RedirectToForbidden);
        // Forbidden never touches the token.
        assert!(store.get_token().is_some());
    }

    #[test]
    fn test_unrestricted_view_renders_for_any_token() {
        for granted in [&[ADMIN][..], &[SITE_ENGINEER][..], &[][..]] {
            let (gate, _) = gate_with(Some(&mint_for("1", granted)));
            assert_eq!(gate.authorize(&RoleSet::new()), Decision::Render);
        }
    }

    #[test]
    fn test_any_shared_role_renders() {
        let (gate, _) = gate_with(Some(&mint_for("1", &["SiteManager"])));
        assert_eq!(gate.authorize(&roles(&[ADMIN, SITE_MANAGER])), Decision::Render);
    }

    #[test]
    fn test_malformed_token_is_purged() {
        let (gate, store) = gate_with(Some("not-a-token"));

        assert_eq!(gate.authorize(&RoleSet::new()), Decision::RedirectToLogin);
        assert!(store.get_token().is_none());
    }

    #[test]
    fn test_expired_token_is_purged() {
        let token = mint(json!({ USER_ID_CLAIM: "1", ROLE_CLAIM: [ADMIN], "exp": 1_000 }));
        let (gate, store) = gate_with(Some(&token));

        assert_eq!(gate.authorize_at(&RoleSet::new(), 999), Decision::Render);
        assert_eq!(gate.authorize_at(&RoleSet::new(), 1_000), Decision::RedirectToLogin);
        assert!(store.get_token().is_none());
    }

    #[test]
    fn test_expired_token_kept_when_not_enforced() {
        let token = mint(json!({ ROLE_CLAIM: [ADMIN], "exp": 1_000 }));
        let store = MemoryTokenStore::with_token(&token);
        let config = GateConfig { reject_expired_tokens: false, ..GateConfig::default() };
        let gate = AuthorizationGate::new(Arc::new(store), config);

        assert_eq!(gate.authorize_at(&roles(&[ADMIN]), 5_000), Decision::Render);
    }

    #[test]
    fn test_decision_is_not_cached() {
        let (gate, store) = gate_with(None);
        let required = roles(&[ADMIN]);

        assert_eq!(gate.authorize(&required), Decision::RedirectToLogin);
        store.set_token(&mint_for("1", &[ADMIN])).unwrap();
        assert_eq!(gate.authorize(&required), Decision::Render);
        store.set_token(&mint_for("2", &[SITE_ENGINEER])).unwrap();
        assert_eq!(gate.authorize(&required), Decision::RedirectToForbidden);
    }

    #[test]
    fn test_guard_redirects_with_replace() {
        let (gate, _) = gate_with(Some(&mint_for("3", &[SITE_ENGINEER])));
        let presenter = Arc::new(Recorder::default());
        let navigator = Arc::new(Recorder::default());

        let guarded = gate.guard(&roles(&[ADMIN]), presenter, navigator.clone(), Instant::now());
        assert!(matches!(guarded, Guarded::Redirected(Decision::RedirectToForbidden)));
        assert_eq!(navigator.calls(), vec!["Replace:/unauthorized".to_string()]);
    }

    #[test]
    fn test_guard_mounts_one_clock_with_user_roles() {
        let (gate, _) = gate_with(Some(&mint_for("8", &[SITE_MANAGER])));
        let (view, _, _) = mount(&gate, &[SITE_MANAGER], Instant::now());

        assert_eq!(view.phase(), SessionPhase::Active);
        assert!(view.clock().is_mounted());
        assert_eq!(view.user_id(), Some("8"));
        assert!(view.is_visible(&roles(&[ADMIN, SITE_MANAGER])));
        assert!(!view.is_visible(&roles(&[ADMIN])));
    }

    /// Hands out its first token once, then a different one.
    struct SwappingStore {
        first: String,
        later: String,
        reads: AtomicUsize,
    }

    impl TokenStore for SwappingStore {
        fn get_token(&self) -> Option<String> {
            match self.reads.fetch_add(1, Ordering::SeqCst) {
                0 => Some(self.first.clone()),
                _ => Some(self.later.clone()),
            }
        }
        fn set_token(&self, _raw: &str) -> std::io::Result<()> {
            Ok(())
        }
        fn clear_token(&self) -> std::io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_guard_mounts_the_authorized_claims() {
        let store = Arc::new(SwappingStore {
            first: mint_for("1", &[ADMIN]),
            later: mint_for("2", &[SITE_ENGINEER]),
            reads: AtomicUsize::new(0),
        });
        let gate = AuthorizationGate::new(store.clone(), GateConfig::default());
        let (view, _, _) = mount(&gate, &[ADMIN], Instant::now());

        assert_eq!(store.reads.load(Ordering::SeqCst), 1);
        assert_eq!(view.user_id(), Some("1"));
        assert!(view.roles().has_role(ADMIN));
        assert!(!view.roles().has_role(SITE_ENGINEER));
    }

    #[test]
    fn test_expiry_purges_token_and_redirects_once() {
        let (gate, store) = gate_with(Some(&mint_for("1", &[ADMIN])));
        let t0 = Instant::now();
        let (mut view, presenter, navigator) = mount(&gate, &[], t0);

        view.advance(t0 + SESSION_TIMEOUT - WARNING_WINDOW);
        view.advance(t0 + SESSION_TIMEOUT - WARNING_WINDOW + Duration::from_secs(1));
        let events = view.advance(t0 + SESSION_TIMEOUT);

        // The overdue countdown tick fires before the expiry timer.
        assert!(matches!(
            events.as_slice(),
            [SessionEvent::CountdownTick { .. }, SessionEvent::Expired { .. }]
        ));
        assert_eq!(view.phase(), SessionPhase::Expired);
        assert!(store.get_token().is_none());
        assert_eq!(
            presenter.calls(),
            vec!["show:9", "tick:8", "tick:7", "dismiss", "expired:timeout"]
        );
        assert_eq!(navigator.calls(), vec!["Replace:/login".to_string()]);

        // Nothing further happens on this mount.
        assert!(view.advance(t0 + SESSION_TIMEOUT * 3).is_empty());
        assert!(view.logout_now(t0 + SESSION_TIMEOUT * 3).is_none());
        assert_eq!(navigator.calls().len(), 1);
    }

    #[test]
    fn test_logout_now_purges_token() {
        let (gate, store) = gate_with(Some(&mint_for("1", &[ADMIN])));
        let t0 = Instant::now();
        let (mut view, presenter, navigator) = mount(&gate, &[ADMIN], t0);

        view.advance(t0 + SESSION_TIMEOUT - WARNING_WINDOW);
        assert!(view.logout_now(t0 + SESSION_TIMEOUT - Duration::from_secs(2)).is_some());

        assert!(store.get_token().is_none());
        assert_eq!(presenter.calls().last().map(String::as_str), Some("expired:logout"));
        assert_eq!(navigator.calls(), vec!["Replace:/login".to_string()]);
    }

    #[test]
    fn test_continue_dismisses_warning_and_keeps_token() {
        let (gate, store) = gate_with(Some(&mint_for("1", &[ADMIN])));
        let t0 = Instant::now();
        let (mut view, presenter, navigator) = mount(&gate, &[], t0);

        view.advance(t0 + SESSION_TIMEOUT - WARNING_WINDOW);
        let resumed_at = t0 + SESSION_TIMEOUT - Duration::from_secs(1);
        assert!(view.continue_session(resumed_at).is_some());

        assert!(view.advance(t0 + SESSION_TIMEOUT).is_empty());
        assert_eq!(view.phase(), SessionPhase::Active);
        assert!(store.get_token().is_some());
        assert_eq!(presenter.calls(), vec!["show:9", "dismiss", "continued"]);
        assert!(navigator.calls().is_empty());
    }

    #[test]
    fn test_unmount_silences_late_timers() {
        let (gate, store) = gate_with(Some(&mint_for("1", &[ADMIN])));
        let t0 = Instant::now();
        let (mut view, presenter, navigator) = mount(&gate, &[], t0);

        view.advance(t0 + SESSION_TIMEOUT - WARNING_WINDOW);
        view.unmount();

        assert!(view.advance(t0 + SESSION_TIMEOUT).is_empty());
        assert!(store.get_token().is_some());
        assert_eq!(presenter.calls(), vec!["show:9", "dismiss"]);
        assert!(navigator.calls().is_empty());
    }
}
