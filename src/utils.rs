// Copyright (c) 2024-2025 Jesse Morgan / Morgan Forge
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Utility functions for stockgate.

/// Characters of a token kept visible in logs and CLI output.
pub const TOKEN_VISIBLE_PREFIX: usize = 10;

/// Mask a bearer token for logging.
///
/// Shows at most [`TOKEN_VISIBLE_PREFIX`] characters and never more than a
/// third of the token, so short values stay mostly hidden. The "..." suffix is
/// always added.
///
/// # Examples
///
/// ```
/// use stockgate::utils::mask_token;
///
/// assert_eq!(mask_token("eyJhbGciOiJIUzI1NiJ9.payload.sig"), "eyJhbGciOi...");
/// ```
pub fn mask_token(token: &str) -> String {
    let token = token.trim();
    let visible = (token.chars().count() / 3).min(TOKEN_VISIBLE_PREFIX);
    let prefix: String = token.chars().take(visible).collect();
    format!("{}...", prefix)
}
