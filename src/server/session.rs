//! Session and tree-connection lifecycle: the registries a connection
//! consults on every request, plus idle-session reaping.
//!
//! Ownership only ever flows downward through integer IDs - a session owns
//! its tree connections by ID, a tree connection owns its opens by ID - so
//! tearing one down (logoff, tree disconnect, or the idle sweep) cleanly
//! cascades to everything beneath it without any cross-referencing pointers
//! to untangle.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use uuid::Uuid;

use crate::crypto::SigningKey;
use crate::protocol::consts::Dialect;
use crate::server::open::OpenTable;
use crate::server::share::Share;

/// One TREE_CONNECT's state: the share it's attached to and the opens made
/// against it.
pub struct TreeConnection<H> {
    pub tree_id: u32,
    pub share: Share,
    pub opens: OpenTable<H>,
}

impl<H> TreeConnection<H> {
    pub fn new(tree_id: u32, share: Share) -> Self {
        TreeConnection { tree_id, share, opens: OpenTable::new() }
    }
}

/// One authenticated (or guest) session.
pub struct Session<H> {
    pub session_id: u64,
    pub account_name: String,
    pub domain: String,
    pub is_guest: bool,
    pub dialect: Dialect,
    /// The owning connection's NEGOTIATE client GUID, used to recognize a
    /// later reconnect attempt against this session's id.
    pub client_guid: Uuid,
    /// `None` for anonymous/guest sessions created with signing disabled.
    pub signing_key: Option<SigningKey>,
    trees: Mutex<HashMap<u32, Arc<TreeConnection<H>>>>,
    next_tree_id: AtomicU32,
    last_activity: Mutex<Instant>,
}

impl<H> Session<H> {
    #[allow(clippy::too_many_arguments)]
    fn new(
        session_id: u64,
        account_name: String,
        domain: String,
        is_guest: bool,
        dialect: Dialect,
        client_guid: Uuid,
        signing_key: Option<SigningKey>,
    ) -> Self {
        debug_assert!(!is_guest || signing_key.is_none(), "guest sessions never carry a signing key");
        Session {
            session_id,
            account_name,
            domain,
            is_guest,
            dialect,
            client_guid,
            signing_key,
            trees: Mutex::new(HashMap::new()),
            next_tree_id: AtomicU32::new(1),
            last_activity: Mutex::new(Instant::now()),
        }
    }

    pub fn touch(&self) {
        *self.last_activity.lock().unwrap() = Instant::now();
    }

    pub fn idle_for(&self) -> Duration {
        self.last_activity.lock().unwrap().elapsed()
    }

    pub fn connect_tree(&self, share: Share) -> Arc<TreeConnection<H>> {
        let tree_id = self.next_tree_id.fetch_add(1, Ordering::Relaxed);
        let tree = Arc::new(TreeConnection::new(tree_id, share));
        self.trees.lock().unwrap().insert(tree_id, tree.clone());
        tree
    }

    pub fn tree(&self, tree_id: u32) -> Option<Arc<TreeConnection<H>>> {
        self.trees.lock().unwrap().get(&tree_id).cloned()
    }

    pub fn disconnect_tree(&self, tree_id: u32) -> Option<Arc<TreeConnection<H>>> {
        self.trees.lock().unwrap().remove(&tree_id)
    }

    pub fn tree_count(&self) -> usize {
        self.trees.lock().unwrap().len()
    }
}

/// Registry of live sessions for one connection, with periodic reaping of
/// sessions that have been idle past `idle_timeout`.
pub struct SessionManager<H> {
    sessions: Mutex<HashMap<u64, Arc<Session<H>>>>,
    next_session_id: AtomicU64,
    idle_timeout: Duration,
}

impl<H> SessionManager<H> {
    pub fn new(idle_timeout: Duration) -> Self {
        SessionManager { sessions: Mutex::new(HashMap::new()), next_session_id: AtomicU64::new(1), idle_timeout }
    }

    /// Creates a session under `session_id`. The ID is supplied by the
    /// caller rather than generated here: SESSION_SETUP's first leg already
    /// hands the client a session ID before authentication completes, and
    /// the finalized session must keep that same ID.
    #[allow(clippy::too_many_arguments)]
    pub fn create_session(
        &self,
        session_id: u64,
        account_name: String,
        domain: String,
        is_guest: bool,
        dialect: Dialect,
        client_guid: Uuid,
        signing_key: Option<SigningKey>,
    ) -> Arc<Session<H>> {
        let session =
            Arc::new(Session::new(session_id, account_name, domain, is_guest, dialect, client_guid, signing_key));
        self.sessions.lock().unwrap().insert(session_id, session.clone());
        session
    }

    /// Allocates a fresh session ID without creating a session yet, for
    /// SESSION_SETUP's first leg.
    pub fn allocate_session_id(&self) -> u64 {
        self.next_session_id.fetch_add(1, Ordering::Relaxed)
    }

    pub fn get(&self, session_id: u64) -> Option<Arc<Session<H>>> {
        self.sessions.lock().unwrap().get(&session_id).cloned()
    }

    pub fn remove(&self, session_id: u64) -> Option<Arc<Session<H>>> {
        self.sessions.lock().unwrap().remove(&session_id)
    }

    pub fn len(&self) -> usize {
        self.sessions.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drops every session that has been idle longer than `idle_timeout`.
    /// Call periodically from the connection's housekeeping loop.
    pub fn reap_idle(&self) {
        self.sessions.lock().unwrap().retain(|_, session| session.idle_for() < self.idle_timeout);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::server::share::ShareOptions;
    use std::thread::sleep;

    #[test]
    fn create_and_lookup_session() {
        let mgr: SessionManager<u64> = SessionManager::new(Duration::from_secs(60));
        let id = mgr.allocate_session_id();
        let session = mgr.create_session(id, "alice".into(), "CORP".into(), false, Dialect::Smb311, Uuid::nil(), None);
        assert!(mgr.get(session.session_id).is_some());
    }

    #[test]
    fn tree_connect_and_disconnect_cascades() {
        let mgr: SessionManager<u64> = SessionManager::new(Duration::from_secs(60));
        let id = mgr.allocate_session_id();
        let session = mgr.create_session(id, "bob".into(), "".into(), false, Dialect::Smb302, Uuid::nil(), None);
        let share = Share { options: ShareOptions::disk("data"), root: "".into() };
        let tree = session.connect_tree(share);
        assert_eq!(session.tree_count(), 1);
        assert!(session.tree(tree.tree_id).is_some());
        session.disconnect_tree(tree.tree_id);
        assert_eq!(session.tree_count(), 0);
    }

    #[test]
    fn reap_idle_drops_sessions_past_the_timeout() {
        let mgr: SessionManager<u64> = SessionManager::new(Duration::from_millis(10));
        let id = mgr.allocate_session_id();
        let session = mgr.create_session(id, "carol".into(), "".into(), true, Dialect::Smb210, Uuid::nil(), None);
        sleep(Duration::from_millis(30));
        mgr.reap_idle();
        assert!(mgr.get(session.session_id).is_none());
    }
}
