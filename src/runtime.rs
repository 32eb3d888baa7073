// Copyright (c) 2024-2025 Jesse Morgan / Morgan Forge
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Async driver for a mounted [`ProtectedView`].
//!
//! The view's clock is a pure state machine with a timer table. The driver
//! sleeps until the earliest pending deadline, fires what is due, and applies
//! user commands (activity, continue, logout) as they arrive.
//!
//! Time is read from [`tokio::time::Instant`] so a paused runtime drives the
//! clock deterministically in tests.

use std::future;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{self, Instant};

use crate::security::gate::ProtectedView;
use crate::security::session_clock::{ActivityKind, ExpiryReason, SessionEvent, SessionPhase};

/// Input delivered to a running session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionCommand {
    /// Qualifying user activity.
    Activity(ActivityKind),
    /// "Continue session" on the warning modal.
    Continue,
    /// "Log out now".
    Logout,
    /// Leave the protected view; the session stays valid. Ignored while the
    /// expiry warning is up.
    Unmount,
}

/// How a driven session ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionOutcome {
    Expired(ExpiryReason),
    Unmounted,
}

fn now() -> std::time::Instant {
    Instant::now().into_std()
}

/// Current time in the clock's terms, usable when mounting a view that will be driven.
pub fn clock_now() -> std::time::Instant {
    now()
}

fn expiry_in(events: &[SessionEvent]) -> Option<ExpiryReason> {
    events.iter().find_map(|event| match event {
        SessionEvent::Expired { reason, .. } => Some(*reason),
        _ => None,
    })
}

/// Drive `view` until it expires or is unmounted.
///
/// Once the warning is showing only continue, logout or expiry end it. A closed
/// command channel still counts as leaving the view.
pub async fn run(
    mut view: ProtectedView,
    mut commands: mpsc::UnboundedReceiver<SessionCommand>,
) -> SessionOutcome {
    loop {
        if !view.clock().is_mounted() {
            return SessionOutcome::Unmounted;
        }

        let deadline = view.clock().next_deadline();
        let sleep = async move {
            match deadline {
                Some(at) => time::sleep_until(Instant::from_std(at)).await,
                None => future::pending::<()>().await,
            }
        };

        tokio::select! {
            cmd = commands.recv() => match cmd {
                Some(SessionCommand::Activity(kind)) => {
                    view.record_activity(kind, now());
                }
                Some(SessionCommand::Continue) => {
                    view.continue_session(now());
                }
                Some(SessionCommand::Logout) => {
                    if let Some(reason) = expiry_in(view.logout_now(now()).as_slice()) {
                        return SessionOutcome::Expired(reason);
                    }
                }
                Some(SessionCommand::Unmount) if view.phase() == SessionPhase::Warning => {
                    tracing::debug!("UNMOUNT_IGNORED | session={} phase=WARNING", view.clock().id());
                }
                Some(SessionCommand::Unmount) | None => {
                    view.unmount();
                    return SessionOutcome::Unmounted;
                }
            },
            _ = sleep => {
                if let Some(reason) = expiry_in(&view.advance(now())) {
                    return SessionOutcome::Expired(reason);
                }
            }
        }
    }
}

/// Handle to a session running on its own task.
pub struct SessionDriver {
    commands: mpsc::UnboundedSender<SessionCommand>,
    task: JoinHandle<SessionOutcome>,
}

impl SessionDriver {
    /// Spawn [`run`] for `view` on the current runtime.
    pub fn spawn(view: ProtectedView) -> Self {
        let (commands, rx) = mpsc::unbounded_channel();
        let task = tokio::spawn(run(view, rx));
        Self { commands, task }
    }

    /// Deliver a command. Returns false once the session has ended.
    pub fn send(&self, command: SessionCommand) -> bool {
        self.commands.send(command).is_ok()
    }

    /// A sender usable from other tasks or threads.
    pub fn sender(&self) -> mpsc::UnboundedSender<SessionCommand> {
        self.commands.clone()
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Wait for the session to end.
    pub async fn join(self) -> SessionOutcome {
        drop(self.commands);
        match self.task.await {
            Ok(outcome) => outcome,
            Err(e) => {
                tracing::error!("SESSION_TASK_FAILED | error={}", e);
                SessionOutcome::Unmounted
            }
        }
    }

    /// Wait for the session to end without releasing the command channel.
    ///
    /// Unlike [`join`](Self::join) the session keeps running until it expires
    /// or another sender unmounts it.
    pub async fn wait(&mut self) -> SessionOutcome {
        match (&mut self.task).await {
            Ok(outcome) => outcome,
            Err(e) => {
                tracing::error!("SESSION_TASK_FAILED | error={}", e);
                SessionOutcome::Unmounted
            }
        }
    }
}
