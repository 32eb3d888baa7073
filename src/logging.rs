// Copyright (c) 2024-2025 Jesse Morgan / Morgan Forge
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Logging initialization.
//!
//! Session and authorization events are emitted through `tracing` as audit
//! strings (`SESSION_WARNING | session=...`). Output goes to stderr so it never
//! mixes with command output, and `RUST_LOG` overrides the configured level.

use std::io::IsTerminal;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Verbosity requested on the command line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Verbosity {
    /// Errors only.
    Quiet,
    #[default]
    Normal,
    /// Everything down to debug.
    Verbose,
}

impl Verbosity {
    pub fn from_flags(quiet: bool, verbose: bool) -> Self {
        match (quiet, verbose) {
            (true, _) => Verbosity::Quiet,
            (false, true) => Verbosity::Verbose,
            (false, false) => Verbosity::Normal,
        }
    }
}

/// Filter directive for a configured level and CLI verbosity.
pub fn effective_level(configured: &str, verbosity: Verbosity) -> String {
    match verbosity {
        Verbosity::Quiet => "error".to_string(),
        Verbosity::Verbose => "debug".to_string(),
        Verbosity::Normal => match configured.trim().to_lowercase().as_str() {
            "" => "warn".to_string(),
            "warning" => "warn".to_string(),
            other => other.to_string(),
        },
    }
}

/// Install the global subscriber.
///
/// Calling this twice is harmless; the second call is ignored.
pub fn init_logging(configured: &str, verbosity: Verbosity) {
    let level = effective_level(configured, verbosity);
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::try_new(&level).unwrap_or_else(|_| EnvFilter::new("warn"))
    });

    let result = tracing_subscriber::registry()
        .with(filter)
        .with(
            fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(false)
                .with_thread_names(false)
                .with_ansi(std::io::stderr().is_terminal()),
        )
        .try_init();

    if result.is_err() {
        tracing::debug!("Logging already initialized");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flags_to_verbosity() {
        assert_eq!(Verbosity::from_flags(false, false), Verbosity::Normal);
        assert_eq!(Verbosity::from_flags(false, true), Verbosity::Verbose);
        assert_eq!(Verbosity::from_flags(true, true), Verbosity::Quiet);
    }

    #[test]
    fn test_effective_level() {
        assert_eq!(effective_level("info", Verbosity::Normal), "info");
        assert_eq!(effective_level(" WARNING ", Verbosity::Normal), "warn");
        assert_eq!(effective_level("", Verbosity::Normal), "warn");
        assert_eq!(effective_level("info", Verbosity::Quiet), "error");
        assert_eq!(effective_level("error", Verbosity::Verbose), "debug");
    }

    #[test]
    fn test_init_twice_is_harmless() {
        init_logging("warn", Verbosity::Normal);
        init_logging("debug", Verbosity::Verbose);
    }
}
