// Copyright (c) 2024-2025 Jesse Morgan / Morgan Forge
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Session token storage.
//!
//! The token is the single source of truth for "who is logged in". Nothing
//! decoded from it is cached: every read goes back to storage so a logout in
//! another process (or another tab of the dashboard) is seen on the next check.
//!
//! Two stores are provided:
//!
//! - [`MemoryTokenStore`]: a shared in-process slot, used for tests and for
//!   embedding the gate in a longer-running process.
//! - [`FileTokenStore`]: a file named `token` under the stockgate config
//!   directory, surviving restarts the way browser storage survives reloads.

use fs2::FileExt;
use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};

use super::claims::{decode_claims, Claims};
use super::locks::{resilient_read, resilient_write};
use super::roles::RoleSet;
use crate::error::{AuthError, AuthResult};
use crate::utils::mask_token;

/// Name the token is persisted under.
pub const TOKEN_KEY: &str = "token";

/// Persisted bearer token plus claim reads built on top of it.
pub trait TokenStore: Send + Sync {
    /// Current raw token, or `None` when unauthenticated.
    fn get_token(&self) -> Option<String>;

    /// Overwrite the stored token.
    fn set_token(&self, raw: &str) -> io::Result<()>;

    /// Remove the stored token. Removing an absent token is not an error.
    fn clear_token(&self) -> io::Result<()>;

    /// Decode the stored token's claims.
    fn claims(&self) -> AuthResult<Claims> {
        let raw = self.get_token().ok_or(AuthError::MissingToken)?;
        decode_claims(&raw)
    }

    /// User id from the stored token. Decode failures are logged and read as `None`.
    fn user_id(&self) -> Option<String> {
        claims_or_log(self.claims(), "user_id").and_then(|c| c.user_id().map(str::to_string))
    }

    /// Roles from the stored token. Decode failures are logged and read as empty.
    fn roles(&self) -> RoleSet {
        claims_or_log(self.claims(), "roles")
            .map(|c| c.roles)
            .unwrap_or_default()
    }
}

fn claims_or_log(result: AuthResult<Claims>, read: &str) -> Option<Claims> {
    match result {
        Ok(claims) => Some(claims),
        Err(AuthError::MissingToken) => None,
        Err(e) => {
            tracing::warn!("TOKEN_DECODE_FAILED | read={} error={}", read, e);
            None
        }
    }
}

fn non_blank(raw: &str) -> Option<String> {
    let raw = raw.trim();
    (!raw.is_empty()).then(|| raw.to_string())
}

// =============================================================================
// In-memory store
// =============================================================================

/// Token slot shared between clones.
#[derive(Debug, Clone, Default)]
pub struct MemoryTokenStore {
    slot: Arc<RwLock<Option<String>>>,
}

impl MemoryTokenStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store pre-loaded with `raw`.
    pub fn with_token(raw: &str) -> Self {
        let store = Self::new();
        *resilient_write(&store.slot) = non_blank(raw);
        store
    }
}

impl TokenStore for MemoryTokenStore {
    fn get_token(&self) -> Option<String> {
        resilient_read(&self.slot).clone()
    }

    fn set_token(&self, raw: &str) -> io::Result<()> {
        *resilient_write(&self.slot) = non_blank(raw);
        tracing::debug!("TOKEN_STORED | store=memory token={}", mask_token(raw));
        Ok(())
    }

    fn clear_token(&self) -> io::Result<()> {
        resilient_write(&self.slot).take();
        tracing::debug!("TOKEN_CLEARED | store=memory");
        Ok(())
    }
}

// =============================================================================
// File store
// =============================================================================

/// Token persisted to a file.
///
/// Writes go to a sibling temp file and are renamed into place under an
/// exclusive lock on `<path>.lock`, so readers never see a half-written token
/// and need no lock of their own.
#[derive(Debug, Clone)]
pub struct FileTokenStore {
    path: PathBuf,
}

impl FileTokenStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn lock_path(&self) -> PathBuf {
        self.path.with_extension("lock")
    }

    /// Run `op` while holding the exclusive write lock.
    fn with_write_lock<T>(&self, op: impl FnOnce() -> io::Result<T>) -> io::Result<T> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }

        let lock_file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(self.lock_path())?;
        lock_file.lock_exclusive()?;

        let result = op();
        let _ = lock_file.unlock();
        result
    }
}

impl TokenStore for FileTokenStore {
    fn get_token(&self) -> Option<String> {
        match fs::read_to_string(&self.path) {
            Ok(content) => non_blank(&content),
            Err(e) if e.kind() == io::ErrorKind::NotFound => None,
            Err(e) => {
                tracing::warn!(
                    "TOKEN_READ_FAILED | path={} error={}",
                    self.path.display(),
                    e
                );
                None
            }
        }
    }

    fn set_token(&self, raw: &str) -> io::Result<()> {
        self.with_write_lock(|| {
            let tmp_path = self.path.with_extension("tmp");
            let mut file = OpenOptions::new()
                .write(true)
                .create(true)
                .truncate(true)
                .open(&tmp_path)?;
            file.write_all(raw.trim().as_bytes())?;
            file.sync_all()?;

            #[cfg(unix)]
            {
                use std::os::unix::fs::PermissionsExt;
                fs::set_permissions(&tmp_path, fs::Permissions::from_mode(0o600))?;
            }

            fs::rename(&tmp_path, &self.path)
        })?;

        tracing::info!(
            "TOKEN_STORED | store=file path={} token={}",
            self.path.display(),
            mask_token(raw)
        );
        Ok(())
    }

    fn clear_token(&self) -> io::Result<()> {
        self.with_write_lock(|| match fs::remove_file(&self.path) {
            Err(e) if e.kind() != io::ErrorKind::NotFound => Err(e),
            _ => Ok(()),
        })?;

        tracing::info!("TOKEN_CLEARED | store=file path={}", self.path.display());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::security::claims::tests::mint_for;
    use tempfile::TempDir;

    #[test]
    fn test_memory_store_set_get_clear() {
        let store = MemoryTokenStore::new();
        assert!(store.get_token().is_none());

        store.set_token("abc.def.ghi").unwrap();
        assert_eq!(store.get_token().as_deref(), Some("abc.def.ghi"));

        store.clear_token().unwrap();
        assert!(store.get_token().is_none());
    }

    #[test]
    fn test_memory_store_clones_share_slot() {
        let store = MemoryTokenStore::new();
        let other_tab = store.clone();

        store.set_token("shared").unwrap();
        assert_eq!(other_tab.get_token().as_deref(), Some("shared"));

        other_tab.clear_token().unwrap();
        assert!(store.get_token().is_none());
    }

    #[test]
    fn test_blank_token_reads_as_absent() {
        let store = MemoryTokenStore::with_token("   ");
        assert!(store.get_token().is_none());
        assert_eq!(store.claims(), Err(AuthError::MissingToken));
    }

    #[test]
    fn test_claim_reads_follow_storage() {
        let store = MemoryTokenStore::with_token(&mint_for("17", &["sitemanager"]));

        assert_eq!(store.user_id().as_deref(), Some("17"));
        assert!(store.roles().has_role("sitemanager"));

        // Re-read after a login as someone else; nothing is cached.
        store.set_token(&mint_for("18", &["admin"])).unwrap();
        assert_eq!(store.user_id().as_deref(), Some("18"));
        assert!(!store.roles().has_role("sitemanager"));
    }

    #[test]
    fn test_malformed_token_reads_as_absent() {
        let store = MemoryTokenStore::with_token("not-a-token");

        assert!(matches!(store.claims(), Err(AuthError::MalformedToken(_))));
        assert!(store.user_id().is_none());
        assert!(store.roles().is_empty());
    }

    #[test]
    fn test_file_store_round_trip() {
        let dir = TempDir::new().unwrap();
        let store = FileTokenStore::new(dir.path().join("nested").join(TOKEN_KEY));

        assert!(store.get_token().is_none());
        store.set_token(" token-value\n").unwrap();
        assert_eq!(store.get_token().as_deref(), Some("token-value"));
        assert!(!store.path().with_extension("tmp").exists());

        store.clear_token().unwrap();
        assert!(store.get_token().is_none());
        assert!(!store.path().exists());
    }

    #[test]
    fn test_file_store_survives_reopen() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join(TOKEN_KEY);
        let token = mint_for("5", &["siteengineer"]);

        FileTokenStore::new(&path).set_token(&token).unwrap();

        let reopened = FileTokenStore::new(&path);
        assert_eq!(reopened.user_id().as_deref(), Some("5"));
        assert!(reopened.roles().has_role("siteengineer"));
    }

    #[test]
    fn test_file_store_clear_when_absent() {
        let dir = TempDir::new().unwrap();
        let store = FileTokenStore::new(dir.path().join(TOKEN_KEY));

        assert!(store.clear_token().is_ok());
    }

    #[cfg(unix)]
    #[test]
    fn test_file_store_is_owner_only() {
        use std::os::unix::fs::PermissionsExt;

        let dir = TempDir::new().unwrap();
        let store = FileTokenStore::new(dir.path().join(TOKEN_KEY));
        store.set_token("secret").unwrap();

        let mode = fs::metadata(store.path()).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
    }
}
