// Copyright (c) 2024-2025 Jesse Morgan / Morgan Forge
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Error types and CLI error formatting for stockgate.
//!
//! Authentication errors never reach the user as dialogs. A missing or
//! undecodable token ends in a redirect to the login route; the error value
//! only exists so callers can log what happened.
//!
//! Timer drift (a suspended process delaying the clock) is deliberately not an
//! error: late timers fire late and nothing is reported.

use std::fmt;

/// Errors raised while reading the session token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthError {
    /// No token is stored; the user is unauthenticated.
    MissingToken,
    /// A token is stored but cannot be decoded. Treated exactly like
    /// [`AuthError::MissingToken`] once the token has been purged.
    MalformedToken(String),
}

impl fmt::Display for AuthError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MissingToken => write!(f, "No session token found"),
            Self::MalformedToken(reason) => write!(f, "Session token is malformed: {}", reason),
        }
    }
}

impl std::error::Error for AuthError {}

pub type AuthResult<T> = std::result::Result<T, AuthError>;

/// Formats an error message with title, possible causes and suggested fixes.
///
/// # Example
///
/// ```
/// use stockgate::error::format_error;
///
/// let error = format_error(
///     "Token could not be decoded",
///     &["The value was truncated when pasting"],
///     &["Log in again: stockgate login"],
/// );
/// assert!(error.starts_with("[✗] Token could not be decoded"));
/// ```
pub fn format_error(title: &str, causes: &[&str], fixes: &[&str]) -> String {
    let mut output = format!("[✗] {}\n", title);

    if !causes.is_empty() {
        output.push_str("\nPossible causes:\n");
        for cause in causes {
            output.push_str(&format!("  - {}\n", cause));
        }
    }

    if !fixes.is_empty() {
        output.push_str("\nTry these fixes:\n");
        for (i, fix) in fixes.iter().enumerate() {
            output.push_str(&format!("  {}. {}\n", i + 1, fix));
        }
    }

    output
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_auth_error_display() {
        assert_eq!(AuthError::MissingToken.to_string(), "No session token found");
        assert_eq!(
            AuthError::MalformedToken("InvalidToken".to_string()).to_string(),
            "Session token is malformed: InvalidToken"
        );
    }

    #[test]
    fn test_format_error_full() {
        let error = format_error("Title", &["Cause 1", "Cause 2"], &["Fix 1", "Fix 2"]);

        assert!(error.contains("[✗] Title"));
        assert!(error.contains("Possible causes:"));
        assert!(error.contains("  - Cause 1"));
        assert!(error.contains("  1. Fix 1"));
        assert!(error.contains("  2. Fix 2"));
    }

    #[test]
    fn test_format_error_title_only() {
        let error = format_error("Only a title", &[], &[]);

        assert_eq!(error, "[✗] Only a title\n");
    }
}
