// Copyright (c) 2024-2025 Jesse Morgan / Morgan Forge
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Terminal input as session activity.
//!
//! Keyboard and mouse events are read with crossterm on a blocking thread and
//! forwarded to the session driver as [`SessionCommand`]s.
//!
//! | Input                         | Command(s)                  |
//! |-------------------------------|-----------------------------|
//! | any key                       | `Activity(KeyDown)`         |
//! | `c`                           | `Activity(KeyDown)`, `Continue` |
//! | `l`                           | `Logout`                    |
//! | `q`, `Esc`, `Ctrl+C`          | `Unmount`                   |
//! | mouse move / drag             | `Activity(MouseMove)`       |
//! | mouse button down             | `Activity(TouchStart)`      |
//! | wheel                         | `Activity(Scroll)`          |

use crossterm::event::{
    self, DisableMouseCapture, EnableMouseCapture, Event, KeyCode, KeyEvent, KeyEventKind,
    KeyModifiers, MouseEventKind,
};
use crossterm::terminal;
use crossterm::ExecutableCommand;
use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use tokio::sync::mpsc::UnboundedSender;

use crate::runtime::SessionCommand;
use crate::security::session_clock::ActivityKind;

/// How often the pump checks its stop flag.
const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Commands produced by one terminal event, in delivery order.
pub fn commands_for(event: &Event) -> Vec<SessionCommand> {
    match event {
        Event::Key(key) => commands_for_key(key),
        Event::Mouse(mouse) => match mouse.kind {
            MouseEventKind::Moved | MouseEventKind::Drag(_) => {
                vec![SessionCommand::Activity(ActivityKind::MouseMove)]
            }
            MouseEventKind::Down(_) => vec![SessionCommand::Activity(ActivityKind::TouchStart)],
            MouseEventKind::ScrollUp | MouseEventKind::ScrollDown => {
                vec![SessionCommand::Activity(ActivityKind::Scroll)]
            }
            _ => Vec::new(),
        },
        _ => Vec::new(),
    }
}

fn commands_for_key(key: &KeyEvent) -> Vec<SessionCommand> {
    if key.kind == KeyEventKind::Release {
        return Vec::new();
    }

    let ctrl = key.modifiers.contains(KeyModifiers::CONTROL);
    match key.code {
        KeyCode::Char('c') if ctrl => vec![SessionCommand::Unmount],
        KeyCode::Char('q') | KeyCode::Esc => vec![SessionCommand::Unmount],
        KeyCode::Char('l') | KeyCode::Char('L') => vec![SessionCommand::Logout],
        // Continue is a no-op while active, activity is ignored while warning.
        KeyCode::Char('c') | KeyCode::Char('C') => vec![
            SessionCommand::Activity(ActivityKind::KeyDown),
            SessionCommand::Continue,
        ],
        _ => vec![SessionCommand::Activity(ActivityKind::KeyDown)],
    }
}

/// Raw mode plus mouse capture for as long as the guard lives.
pub struct TerminalCapture {
    mouse: bool,
}

impl TerminalCapture {
    pub fn enable() -> io::Result<Self> {
        terminal::enable_raw_mode()?;
        let mouse = io::stdout().execute(EnableMouseCapture).is_ok();
        if !mouse {
            tracing::debug!("Mouse capture unavailable; keyboard activity only");
        }
        Ok(Self { mouse })
    }
}

impl Drop for TerminalCapture {
    fn drop(&mut self) {
        if self.mouse {
            let _ = io::stdout().execute(DisableMouseCapture);
        }
        if let Err(e) = terminal::disable_raw_mode() {
            tracing::warn!("Failed to restore terminal mode: {}", e);
        }
    }
}

/// Background reader forwarding terminal events to a session.
pub struct InputPump {
    stop: Arc<AtomicBool>,
    handle: Option<thread::JoinHandle<io::Result<()>>>,
}

impl InputPump {
    /// Start reading events on a dedicated thread.
    ///
    /// The thread ends on its own once the session stops accepting commands.
    pub fn start(commands: UnboundedSender<SessionCommand>) -> io::Result<Self> {
        let stop = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&stop);

        let handle = thread::Builder::new()
            .name("stockgate-input".to_string())
            .spawn(move || pump(commands, flag))?;

        Ok(Self { stop, handle: Some(handle) })
    }

    /// Stop the reader and wait for it.
    pub fn stop(mut self) -> io::Result<()> {
        self.shutdown()
    }

    fn shutdown(&mut self) -> io::Result<()> {
        self.stop.store(true, Ordering::SeqCst);
        match self.handle.take() {
            Some(handle) => handle
                .join()
                .unwrap_or_else(|_| Err(io::Error::new(io::ErrorKind::Other, "input thread panicked"))),
            None => Ok(()),
        }
    }
}

impl Drop for InputPump {
    fn drop(&mut self) {
        if let Err(e) = self.shutdown() {
            tracing::warn!("Input reader ended with error: {}", e);
        }
    }
}

fn pump(commands: UnboundedSender<SessionCommand>, stop: Arc<AtomicBool>) -> io::Result<()> {
    while !stop.load(Ordering::SeqCst) {
        if commands.is_closed() {
            break;
        }
        if !event::poll(POLL_INTERVAL)? {
            continue;
        }

        let event = event::read()?;
        for command in commands_for(&event) {
            if commands.send(command).is_err() {
                return Ok(());
            }
        }
    }
    Ok(())
}
