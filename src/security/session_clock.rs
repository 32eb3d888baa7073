// Copyright (c) 2024-2025 Jesse Morgan / Morgan Forge
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Inactivity session clock.
//!
//! One clock exists per mounted protected view. It is a pure state machine:
//! it owns a small table of pending timers, callers tell it what time it is,
//! and it answers with [`SessionEvent`]s. Rendering the warning, purging the
//! token and navigating away are left to whoever consumes the events.
//!
//! ## Phases
//!
//! ```text
//!            activity (reset all timers)
//!              +-----+
//!              v     |
//!  mount --> ACTIVE -+--(timeout - window)--> WARNING --(timeout)--> EXPIRED
//!              ^                               |  |                    ^
//!              +------- continue_session ------+  +---- logout_now ----+
//! ```
//!
//! - Activity only counts while ACTIVE. Once the warning is up, only an
//!   explicit continue or logout changes anything.
//! - The warning countdown is display-only. Expiry is driven by its own
//!   absolute timer, never by the countdown reaching zero.
//! - Every reset cancels all pending timers before scheduling new ones, so a
//!   warning scheduled before the reset can never fire after it.
//! - Late timers (suspended process) fire late. Nothing corrects for drift.

use chrono::{DateTime, Utc};
use rand::RngCore;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::{Duration, Instant};

/// Inactivity allowed before the session expires: 45 minutes.
pub const SESSION_TIMEOUT: Duration = Duration::from_secs(45 * 60);

/// How long before expiry the warning is raised: 9 seconds.
///
/// Unusually short for a 45 minute session; kept as the default and exposed
/// through configuration rather than silently widened.
pub const WARNING_WINDOW: Duration = Duration::from_secs(9);

/// Countdown display refresh interval.
pub const COUNTDOWN_TICK: Duration = Duration::from_secs(1);

/// Session clock phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SessionPhase {
    /// User is active; activity resets the timers.
    Active,
    /// Expiry is imminent; a blocking warning is shown.
    Warning,
    /// Terminal for this mount; token purged, redirect in flight.
    Expired,
}

impl fmt::Display for SessionPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionPhase::Active => write!(f, "ACTIVE"),
            SessionPhase::Warning => write!(f, "WARNING"),
            SessionPhase::Expired => write!(f, "EXPIRED"),
        }
    }
}

/// User input that counts as activity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ActivityKind {
    MouseMove,
    KeyDown,
    TouchStart,
    Scroll,
}

/// Every kind of input the activity listeners subscribe to.
pub const QUALIFYING_ACTIVITY: [ActivityKind; 4] = [
    ActivityKind::MouseMove,
    ActivityKind::KeyDown,
    ActivityKind::TouchStart,
    ActivityKind::Scroll,
];

impl fmt::Display for ActivityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ActivityKind::MouseMove => write!(f, "mousemove"),
            ActivityKind::KeyDown => write!(f, "keydown"),
            ActivityKind::TouchStart => write!(f, "touchstart"),
            ActivityKind::Scroll => write!(f, "scroll"),
        }
    }
}

/// Why a session ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExpiryReason {
    /// The absolute inactivity timer fired.
    Timeout,
    /// The user chose to log out.
    Logout,
}

impl fmt::Display for ExpiryReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExpiryReason::Timeout => write!(f, "timeout"),
            ExpiryReason::Logout => write!(f, "logout"),
        }
    }
}

/// Phase changes emitted by the clock.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum SessionEvent {
    /// Entered the warning phase.
    WarningStarted {
        session_id: String,
        timestamp: DateTime<Utc>,
        remaining_secs: u64,
    },
    /// Countdown display decremented.
    CountdownTick {
        session_id: String,
        remaining_secs: u64,
    },
    /// User chose to continue; back to active.
    Continued {
        session_id: String,
        timestamp: DateTime<Utc>,
    },
    /// Session is over.
    Expired {
        session_id: String,
        timestamp: DateTime<Utc>,
        reason: ExpiryReason,
        session_duration_secs: u64,
    },
}

impl SessionEvent {
    /// Phase the clock is in after this event.
    pub fn phase(&self) -> SessionPhase {
        match self {
            SessionEvent::WarningStarted { .. } | SessionEvent::CountdownTick { .. } => {
                SessionPhase::Warning
            }
            SessionEvent::Continued { .. } => SessionPhase::Active,
            SessionEvent::Expired { .. } => SessionPhase::Expired,
        }
    }

    /// Format event for the audit log.
    pub fn to_audit_string(&self) -> String {
        match self {
            SessionEvent::WarningStarted { session_id, timestamp, remaining_secs } => format!(
                "{} | SESSION_WARNING | session={} expires_in={}s",
                timestamp.format("%Y-%m-%d %H:%M:%S UTC"),
                session_id,
                remaining_secs
            ),
            SessionEvent::CountdownTick { session_id, remaining_secs } => format!(
                "SESSION_COUNTDOWN | session={} remaining={}s",
                session_id, remaining_secs
            ),
            SessionEvent::Continued { session_id, timestamp } => format!(
                "{} | SESSION_CONTINUED | session={}",
                timestamp.format("%Y-%m-%d %H:%M:%S UTC"),
                session_id
            ),
            SessionEvent::Expired { session_id, timestamp, reason, session_duration_secs } => format!(
                "{} | SESSION_EXPIRED | session={} reason={} duration={}s",
                timestamp.format("%Y-%m-%d %H:%M:%S UTC"),
                session_id,
                reason,
                session_duration_secs
            ),
        }
    }
}

/// Clock timing configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionClockConfig {
    /// Inactivity allowed before expiry.
    pub session_timeout: Duration,
    /// Lead time of the warning before expiry.
    pub warning_window: Duration,
}

impl Default for SessionClockConfig {
    fn default() -> Self {
        Self {
            session_timeout: SESSION_TIMEOUT,
            warning_window: WARNING_WINDOW,
        }
    }
}

impl SessionClockConfig {
    /// Build a configuration from seconds.
    ///
    /// The timeout is at least 2 seconds and the warning window always leaves
    /// at least one second of active phase.
    pub fn custom(timeout_secs: u64, warning_secs: u64) -> Self {
        let timeout_secs = timeout_secs.max(2);
        let clamped_warning = warning_secs.min(timeout_secs - 1);

        if clamped_warning != warning_secs {
            tracing::warn!(
                "SESSION_CONFIG: warning window {}s does not fit a {}s timeout. Clamped to {}s.",
                warning_secs,
                timeout_secs,
                clamped_warning
            );
        }

        Self {
            session_timeout: Duration::from_secs(timeout_secs),
            warning_window: Duration::from_secs(clamped_warning),
        }
    }

    /// Inactivity after which the warning is raised.
    pub fn warning_delay(&self) -> Duration {
        self.session_timeout.saturating_sub(self.warning_window)
    }
}

/// What a pending timer does when it fires.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TimerKind {
    /// Move from ACTIVE to WARNING.
    Warning,
    /// Absolute expiry.
    Expiry,
    /// Decrement the warning countdown.
    CountdownTick,
}

/// A scheduled timer. Handles of cancelled timers are stale and firing them is a no-op.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimerHandle {
    id: u64,
    pub kind: TimerKind,
    pub deadline: Instant,
}

/// Inactivity state machine for one mounted protected view.
#[derive(Debug)]
pub struct SessionClock {
    id: String,
    config: SessionClockConfig,
    phase: SessionPhase,
    mounted_at: Instant,
    last_activity_at: Instant,
    remaining_warning_secs: u64,
    timers: Vec<TimerHandle>,
    next_timer_id: u64,
    mounted: bool,
}

impl SessionClock {
    /// Mount a new clock in the ACTIVE phase with its timers scheduled from `now`.
    pub fn mount(config: SessionClockConfig, now: Instant) -> Self {
        let mut clock = Self {
            id: generate_session_id(),
            config,
            phase: SessionPhase::Active,
            mounted_at: now,
            last_activity_at: now,
            remaining_warning_secs: 0,
            timers: Vec::new(),
            next_timer_id: 1,
            mounted: true,
        };
        clock.restart(now);

        tracing::info!(
            "SESSION_MOUNTED | session={} timeout={}s warning={}s timestamp={}",
            clock.id,
            config.session_timeout.as_secs(),
            config.warning_window.as_secs(),
            Utc::now().format("%Y-%m-%d %H:%M:%S UTC")
        );
        clock
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn config(&self) -> &SessionClockConfig {
        &self.config
    }

    pub fn phase(&self) -> SessionPhase {
        self.phase
    }

    pub fn last_activity_at(&self) -> Instant {
        self.last_activity_at
    }

    /// Seconds shown on the warning countdown; 0 outside the warning phase.
    pub fn remaining_warning_secs(&self) -> u64 {
        self.remaining_warning_secs
    }

    pub fn is_mounted(&self) -> bool {
        self.mounted
    }

    pub fn pending_timers(&self) -> &[TimerHandle] {
        &self.timers
    }

    /// Earliest pending deadline, if any timer is scheduled.
    pub fn next_deadline(&self) -> Option<Instant> {
        self.timers.iter().map(|t| t.deadline).min()
    }

    /// Time left before absolute expiry.
    pub fn time_remaining(&self, now: Instant) -> Duration {
        if self.phase == SessionPhase::Expired {
            return Duration::ZERO;
        }
        (self.last_activity_at + self.config.session_timeout).saturating_duration_since(now)
    }

    /// Record user activity. Returns true if the timers were reset.
    ///
    /// Ignored outside the ACTIVE phase and after unmount.
    pub fn record_activity(&mut self, kind: ActivityKind, now: Instant) -> bool {
        if !self.mounted || self.phase != SessionPhase::Active {
            return false;
        }

        self.restart(now);
        tracing::trace!("SESSION_ACTIVITY | session={} kind={}", self.id, kind);
        true
    }

    /// Explicitly continue from the warning phase. No-op in any other phase.
    pub fn continue_session(&mut self, now: Instant) -> Option<SessionEvent> {
        if !self.mounted || self.phase != SessionPhase::Warning {
            return None;
        }

        self.phase = SessionPhase::Active;
        self.remaining_warning_secs = 0;
        self.restart(now);

        let event = SessionEvent::Continued {
            session_id: self.id.clone(),
            timestamp: Utc::now(),
        };
        tracing::info!("{}", event.to_audit_string());
        Some(event)
    }

    /// End the session immediately at the user's request.
    pub fn logout_now(&mut self, now: Instant) -> Option<SessionEvent> {
        if !self.mounted || self.phase == SessionPhase::Expired {
            return None;
        }
        Some(self.expire(now, ExpiryReason::Logout))
    }

    /// Fire one timer. Stale handles and timers that no longer apply to the
    /// current phase produce nothing.
    pub fn fire(&mut self, handle: TimerHandle, now: Instant) -> Option<SessionEvent> {
        if !self.mounted {
            return None;
        }
        let position = self.timers.iter().position(|t| t.id == handle.id)?;
        self.timers.remove(position);

        match handle.kind {
            TimerKind::Warning if self.phase == SessionPhase::Active => {
                self.phase = SessionPhase::Warning;
                self.remaining_warning_secs = self.config.warning_window.as_secs();
                self.schedule(TimerKind::CountdownTick, now + COUNTDOWN_TICK);

                let event = SessionEvent::WarningStarted {
                    session_id: self.id.clone(),
                    timestamp: Utc::now(),
                    remaining_secs: self.remaining_warning_secs,
                };
                tracing::info!("{}", event.to_audit_string());
                Some(event)
            }
            TimerKind::CountdownTick if self.phase == SessionPhase::Warning => {
                self.remaining_warning_secs = self.remaining_warning_secs.saturating_sub(1);
                self.schedule(TimerKind::CountdownTick, now + COUNTDOWN_TICK);

                let event = SessionEvent::CountdownTick {
                    session_id: self.id.clone(),
                    remaining_secs: self.remaining_warning_secs,
                };
                tracing::debug!("{}", event.to_audit_string());
                Some(event)
            }
            TimerKind::Expiry if self.phase != SessionPhase::Expired => {
                Some(self.expire(now, ExpiryReason::Timeout))
            }
            _ => None,
        }
    }

    /// Fire every timer due at `now`, earliest first (ties in scheduling order).
    pub fn advance(&mut self, now: Instant) -> Vec<SessionEvent> {
        let mut events = Vec::new();
        while let Some(handle) = self
            .timers
            .iter()
            .filter(|t| t.deadline <= now)
            .min_by_key(|t| (t.deadline, t.id))
            .copied()
        {
            events.extend(self.fire(handle, now));
        }
        events
    }

    /// Cancel every pending timer and stop reacting to input.
    ///
    /// Anything delivered afterwards (late timers, activity) is ignored.
    pub fn unmount(&mut self) {
        if !self.mounted {
            return;
        }
        self.timers.clear();
        self.mounted = false;

        tracing::info!(
            "SESSION_UNMOUNTED | session={} phase={} timestamp={}",
            self.id,
            self.phase,
            Utc::now().format("%Y-%m-%d %H:%M:%S UTC")
        );
    }

    fn schedule(&mut self, kind: TimerKind, deadline: Instant) -> TimerHandle {
        let handle = TimerHandle {
            id: self.next_timer_id,
            kind,
            deadline,
        };
        self.next_timer_id += 1;
        self.timers.push(handle);
        handle
    }

    /// Cancel-and-restart from `now`.
    fn restart(&mut self, now: Instant) {
        self.timers.clear();
        self.last_activity_at = now;
        self.schedule(TimerKind::Warning, now + self.config.warning_delay());
        self.schedule(TimerKind::Expiry, now + self.config.session_timeout);
    }

    fn expire(&mut self, now: Instant, reason: ExpiryReason) -> SessionEvent {
        self.timers.clear();
        self.phase = SessionPhase::Expired;
        self.remaining_warning_secs = 0;

        let event = SessionEvent::Expired {
            session_id: self.id.clone(),
            timestamp: Utc::now(),
            reason,
            session_duration_secs: now.saturating_duration_since(self.mounted_at).as_secs(),
        };
        tracing::info!("{}", event.to_audit_string());
        event
    }
}

fn generate_session_id() -> String {
    let mut bytes = [0u8; 8];
    rand::rngs::OsRng.fill_bytes(&mut bytes);
    let random_hex: String = bytes.iter().map(|b| format!("{:02x}", b)).collect();
    format!("gate_sess_{}_{}", Utc::now().timestamp_millis(), random_hex)
}
