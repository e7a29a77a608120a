//! Share registry: the set of names a client can TREE_CONNECT to, and the
//! filesystem each one exports.
//!
//! A server instance is generic over one [`Filesystem`] implementation, the
//! same way `NFSTcpListener` is generic over one `NFSFileSystem` - every
//! share it exports is a named root within that single backend, plus the
//! always-present `IPC$` administrative share.

use std::collections::HashMap;
use std::sync::Arc;

use crate::protocol::consts::{CachingMode, ShareType};
use crate::vfs::Filesystem;

#[derive(Clone)]
pub struct ShareOptions {
    pub name: String,
    pub share_type: ShareType,
    pub read_only: bool,
    pub allow_guest: bool,
    /// Authenticated usernames allowed on this share; empty means every
    /// authenticated user is allowed.
    pub allowed_users: Vec<String>,
    /// An optional local credential map scoped to this share, distinct from
    /// the server-wide [`crate::server::ntlm::CredentialStore`].
    pub users: Option<HashMap<String, String>>,
    pub comment: String,
    pub hidden: bool,
    pub caching_mode: CachingMode,
}

impl ShareOptions {
    pub fn disk(name: impl Into<String>) -> Self {
        ShareOptions {
            name: name.into(),
            share_type: ShareType::Disk,
            read_only: false,
            allow_guest: false,
            allowed_users: Vec::new(),
            users: None,
            comment: String::new(),
            hidden: false,
            caching_mode: CachingMode::default(),
        }
    }

    fn ipc() -> Self {
        ShareOptions {
            name: "IPC$".to_string(),
            share_type: ShareType::Pipe,
            read_only: true,
            allow_guest: true,
            allowed_users: Vec::new(),
            users: None,
            comment: "Remote IPC".to_string(),
            hidden: true,
            caching_mode: CachingMode::None,
        }
    }

    /// `CheckUserAccess` (spec §4.G): a guest request is admitted only when
    /// this share allows guests; an authenticated request is admitted when
    /// `allowed_users` is empty (allow all authenticated users) or contains
    /// `username`, case-insensitively.
    pub fn check_user_access(&self, username: &str, is_guest: bool) -> bool {
        if is_guest {
            return self.allow_guest;
        }
        self.allowed_users.is_empty() || self.allowed_users.iter().any(|u| u.eq_ignore_ascii_case(username))
    }

    /// The `MaximalAccess` a TREE_CONNECT response advertises: read-ish
    /// rights only for a read-only share, full file/directory rights
    /// (including `DELETE` and `WRITE_DAC`) for a read-write one.
    pub fn maximal_access(&self) -> crate::protocol::consts::AccessMask {
        use crate::protocol::consts::AccessMask;
        if self.read_only {
            AccessMask::FILE_READ_DATA
                | AccessMask::FILE_READ_EA
                | AccessMask::FILE_READ_ATTRIBUTES
                | AccessMask::FILE_EXECUTE
                | AccessMask::READ_CONTROL
                | AccessMask::SYNCHRONIZE
        } else {
            AccessMask::FILE_READ_DATA
                | AccessMask::FILE_WRITE_DATA
                | AccessMask::FILE_APPEND_DATA
                | AccessMask::FILE_READ_EA
                | AccessMask::FILE_WRITE_EA
                | AccessMask::FILE_EXECUTE
                | AccessMask::FILE_DELETE_CHILD
                | AccessMask::FILE_READ_ATTRIBUTES
                | AccessMask::FILE_WRITE_ATTRIBUTES
                | AccessMask::DELETE
                | AccessMask::READ_CONTROL
                | AccessMask::WRITE_DAC
                | AccessMask::SYNCHRONIZE
        }
    }
}

/// One registered share: its options, and the filesystem path prefix it
/// maps to within the server's single backend. `root` is prepended to every
/// path the dispatcher resolves against this share.
#[derive(Clone)]
pub struct Share {
    pub options: ShareOptions,
    pub root: String,
}

pub const IPC_SHARE_NAME: &str = "IPC$";

/// The set of shares a server instance exports.
pub struct ShareRegistry {
    shares: HashMap<String, Share>,
}

impl ShareRegistry {
    pub fn new() -> Self {
        let mut shares = HashMap::new();
        shares.insert(
            IPC_SHARE_NAME.to_ascii_uppercase(),
            Share { options: ShareOptions::ipc(), root: String::new() },
        );
        ShareRegistry { shares }
    }

    /// Registers a disk share rooted at `root` (a path within the backing
    /// [`Filesystem`], '/' relative, empty for the backend's own root).
    pub fn add(&mut self, options: ShareOptions, root: impl Into<String>) {
        let key = options.name.to_ascii_uppercase();
        self.shares.insert(key, Share { options, root: root.into() });
    }

    pub fn get(&self, name: &str) -> Option<&Share> {
        self.shares.get(&name.to_ascii_uppercase())
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.shares.values().map(|s| s.options.name.as_str())
    }
}

impl Default for ShareRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Joins a share's root with a client-supplied path and normalizes it:
/// backslashes become slashes, `.`/empty segments are dropped, and `..`
/// segments are rejected rather than resolved, so a client can never escape
/// the share root.
pub fn resolve_path(share: &Share, client_path: &str) -> std::io::Result<String> {
    let mut segments: Vec<&str> = Vec::new();
    for raw in client_path.split(['\\', '/']) {
        match raw {
            "" | "." => continue,
            ".." => {
                return Err(std::io::Error::new(
                    std::io::ErrorKind::InvalidInput,
                    "path escapes the share root",
                ))
            }
            seg => segments.push(seg),
        }
    }
    let mut full = share.root.trim_matches('/').to_string();
    for seg in segments {
        if !full.is_empty() {
            full.push('/');
        }
        full.push_str(seg);
    }
    Ok(full)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vfs::Filesystem as _;

    #[test]
    fn new_registry_auto_registers_ipc_share() {
        let reg = ShareRegistry::new();
        assert!(reg.get("ipc$").is_some());
        assert!(reg.get("IPC$").is_some());
    }

    #[test]
    fn share_lookup_is_case_insensitive() {
        let mut reg = ShareRegistry::new();
        reg.add(ShareOptions::disk("Data"), "export");
        assert!(reg.get("data").is_some());
        assert!(reg.get("DATA").is_some());
        assert!(reg.get("missing").is_none());
    }

    #[test]
    fn resolve_path_joins_root_and_normalizes_separators() {
        let share = Share { options: ShareOptions::disk("data"), root: "export".into() };
        assert_eq!(resolve_path(&share, "a\\b\\c.txt").unwrap(), "export/a/b/c.txt");
        assert_eq!(resolve_path(&share, "").unwrap(), "export");
    }

    #[test]
    fn resolve_path_rejects_dotdot_escape() {
        let share = Share { options: ShareOptions::disk("data"), root: "export".into() };
        assert!(resolve_path(&share, "..\\..\\etc\\passwd").is_err());
    }

    #[allow(dead_code)]
    fn _assert_filesystem_object_safety_not_required<F: Filesystem>(_f: F) {}
}
