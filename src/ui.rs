// Copyright (c) 2024-2025 Jesse Morgan / Morgan Forge
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Terminal rendering for stockgate.
//!
//! [`TerminalPresenter`] shows the session warning as a blocking box plus a
//! spinner line acting as the sticky countdown notification.
//! [`TerminalNavigator`] tracks the current route and prints redirects.
//!
//! Output is written with `\r\n` line endings because the interactive view
//! runs in raw mode.

use colored::Colorize;
use indicatif::{ProgressBar, ProgressStyle};
use std::io::{self, Write};
use std::sync::{Mutex, RwLock};
use std::time::Duration;

use crate::routes::{ForbiddenPage, Route};
use crate::security::gate::{Decision, NavigationMode, Navigator, SessionPresenter};
use crate::security::locks::{resilient_read, resilient_write};
use crate::security::session_clock::ExpiryReason;

/// Width of the warning box, including borders.
const BOX_WIDTH: usize = 52;

fn write_lines(out: &mut dyn Write, text: &str) {
    for line in text.lines() {
        let _ = write!(out, "{}\r\n", line);
    }
    let _ = out.flush();
}

fn emit(text: &str) {
    write_lines(&mut io::stdout(), text);
}

fn countdown_message(remaining_secs: u64) -> String {
    format!(
        "Session expires in {}s  {} continue  {} log out",
        remaining_secs,
        "[c]".bold(),
        "[l]".bold()
    )
}

/// Text of the blocking warning box.
pub fn warning_box(remaining_secs: u64) -> String {
    let inner = BOX_WIDTH - 2;
    let rows = [
        "Session about to expire".to_string(),
        String::new(),
        format!("You will be logged out in {} seconds", remaining_secs),
        "due to inactivity.".to_string(),
        String::new(),
        "[c] Continue session    [l] Log out now".to_string(),
    ];

    let mut out = format!("+{}+\n", "-".repeat(inner));
    for row in rows {
        out.push_str(&format!("| {:<width$} |\n", row, width = inner - 2));
    }
    out.push_str(&format!("+{}+\n", "-".repeat(inner)));
    out
}

/// Presents session phases on the terminal.
pub struct TerminalPresenter {
    notification: RwLock<Option<ProgressBar>>,
    out: Mutex<Box<dyn Write + Send>>,
}

impl Default for TerminalPresenter {
    fn default() -> Self {
        Self::new()
    }
}

impl TerminalPresenter {
    /// Presenter writing to stdout.
    pub fn new() -> Self {
        Self::with_writer(Box::new(io::stdout()))
    }

    /// Presenter writing its messages to `out`. The countdown spinner still
    /// draws on the terminal.
    pub fn with_writer(out: Box<dyn Write + Send>) -> Self {
        Self {
            notification: RwLock::new(None),
            out: Mutex::new(out),
        }
    }

    /// Whether the countdown notification is on screen.
    pub fn notification_visible(&self) -> bool {
        resilient_read(&self.notification).is_some()
    }

    fn print(&self, text: &str) {
        let mut out = self.out.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        write_lines(&mut **out, text);
    }

    fn spinner(message: String) -> ProgressBar {
        let spinner = ProgressBar::new_spinner();
        if let Ok(style) = ProgressStyle::default_spinner()
            .tick_chars("\u{28FB}\u{28F9}\u{28FC}\u{28F8}\u{28FE}\u{28F6}\u{28F7}\u{28E7}\u{28CF}\u{28DF} ")
            .template("{spinner:.yellow} {msg}")
        {
            spinner.set_style(style);
        }
        spinner.set_message(message);
        spinner.enable_steady_tick(Duration::from_millis(80));
        spinner
    }
}

impl SessionPresenter for TerminalPresenter {
    fn show_warning(&self, remaining_secs: u64) {
        self.print(&warning_box(remaining_secs).yellow().to_string());

        let mut slot = resilient_write(&self.notification);
        if let Some(previous) = slot.take() {
            previous.finish_and_clear();
        }
        *slot = Some(Self::spinner(countdown_message(remaining_secs)));
    }

    fn update_countdown(&self, remaining_secs: u64) {
        if let Some(spinner) = resilient_read(&self.notification).as_ref() {
            spinner.set_message(countdown_message(remaining_secs));
        }
    }

    fn dismiss_warning(&self) {
        if let Some(spinner) = resilient_write(&self.notification).take() {
            spinner.finish_and_clear();
        }
    }

    fn session_continued(&self) {
        self.print(&format!("{} Session continued", "[OK]".green()));
    }

    fn session_expired(&self, reason: ExpiryReason) {
        let message = match reason {
            ExpiryReason::Timeout => format!("{} Session expired due to inactivity", "[X]".red()),
            ExpiryReason::Logout => format!("{} Logged out", "[OK]".green()),
        };
        self.print(&message);
    }
}

/// Navigator for the CLI: remembers the current route and prints each redirect.
pub struct TerminalNavigator {
    current: RwLock<String>,
}

impl TerminalNavigator {
    pub fn new(initial_route: &str) -> Self {
        Self {
            current: RwLock::new(initial_route.to_string()),
        }
    }

    pub fn current_route(&self) -> String {
        resilient_read(&self.current).clone()
    }
}

impl Navigator for TerminalNavigator {
    fn redirect(&self, route: &str, mode: NavigationMode) {
        let mut current = resilient_write(&self.current);
        tracing::debug!("NAVIGATE | from={} to={} mode={:?}", current, route, mode);
        *current = route.to_string();
        emit(&format!("{} {}", "->".dimmed(), route.cyan()));
    }
}

/// Navigation menu listing.
pub fn render_menu(entries: &[&Route]) -> String {
    if entries.is_empty() {
        return "No screens available for your roles.\n".to_string();
    }

    let width = entries.iter().map(|r| r.path.len()).max().unwrap_or(0);
    entries
        .iter()
        .map(|r| format!("  {:<width$}  {}\n", r.path, r.title, width = width))
        .collect()
}

/// The forbidden page with its two actions.
pub fn render_forbidden(page: &ForbiddenPage) -> String {
    let mut out = format!("{} {}\n\n{}\n\n", "[!]".yellow(), page.title.bold(), page.message);
    for (i, action) in page.actions.iter().enumerate() {
        out.push_str(&format!(
            "  {}. {} {}\n",
            i + 1,
            action.label(),
            format!("({})", page.target(*action)).dimmed()
        ));
    }
    out
}

/// One-line result of an authorization check.
pub fn render_decision(path: &str, decision: Decision, redirect: Option<&str>) -> String {
    match (decision, redirect) {
        (Decision::Render, _) => format!("{} {} renders", "[OK]".green(), path),
        (_, Some(route)) => format!("{} {} -> {} ({})", "[X]".red(), path, route, decision),
        (_, None) => format!("{} {} ({})", "[X]".red(), path, decision),
    }
}
