//! Open-file tracking: file IDs, the share-access compatibility check, and
//! per-open directory-enumeration cursors.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use rand::RngCore;

use crate::protocol::consts::{AccessMask, CreateOptions, ShareAccess};
use crate::vfs::{DirEntry, Metadata};

/// A 128-bit SMB2 `FileId`: a random persistent half plus a monotonically
/// increasing volatile half, so a stale handle from a previous server
/// instance is never mistaken for a live one after a restart.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FileId {
    pub persistent: u64,
    pub volatile: u64,
}

impl FileId {
    pub const INVALID: FileId = FileId { persistent: u64::MAX, volatile: u64::MAX };
}

/// Allocates [`FileId`]s for one connection: a random persistent component
/// drawn once per open, and a process-wide monotonic volatile counter.
pub struct FileIdAllocator {
    next_volatile: AtomicU64,
}

impl FileIdAllocator {
    pub fn new() -> Self {
        FileIdAllocator { next_volatile: AtomicU64::new(1) }
    }

    pub fn allocate(&self) -> FileId {
        let mut persistent_bytes = [0u8; 8];
        rand::thread_rng().fill_bytes(&mut persistent_bytes);
        FileId {
            persistent: u64::from_le_bytes(persistent_bytes),
            volatile: self.next_volatile.fetch_add(1, Ordering::Relaxed),
        }
    }
}

impl Default for FileIdAllocator {
    fn default() -> Self {
        Self::new()
    }
}

/// Cursor state for an in-progress QUERY_DIRECTORY enumeration on one open.
///
/// The backing directory is read in full and pattern-filtered once, into
/// `entries`, on the first request (or any restart); every later request on
/// the same enumeration pages through that cached snapshot rather than
/// re-querying the backend.
#[derive(Debug, Clone, Default)]
pub struct DirEnumState {
    /// Index into `entries` of the next entry to emit.
    pub cookie: u64,
    pub end_of_directory: bool,
    /// Set once the first QUERY_DIRECTORY has been answered; a later request
    /// without `SMB2_REOPEN` restarts the scan instead of resuming.
    pub started: bool,
    pub entries: Vec<DirEntry>,
    /// The search pattern `entries` was filtered against. A later request
    /// carrying a different pattern invalidates the snapshot even without
    /// `SMB2_RESTART_SCANS`.
    pub pattern: String,
}

/// One open file or directory, owned by a tree connection.
pub struct OpenFile<H> {
    pub id: FileId,
    pub path: String,
    pub handle: H,
    pub granted_access: AccessMask,
    pub share_access: ShareAccess,
    pub delete_on_close: bool,
    pub is_directory: bool,
    pub dir_enum: Mutex<DirEnumState>,
}

impl<H> OpenFile<H> {
    pub fn new(
        id: FileId,
        path: String,
        handle: H,
        granted_access: AccessMask,
        share_access: ShareAccess,
        options: CreateOptions,
        metadata: &Metadata,
    ) -> Self {
        OpenFile {
            id,
            path,
            handle,
            granted_access,
            share_access,
            delete_on_close: options.contains(CreateOptions::DELETE_ON_CLOSE),
            is_directory: metadata.is_directory(),
            dir_enum: Mutex::new(DirEnumState::default()),
        }
    }
}

/// Checks whether a new open, requesting `access`/`share_access`, is
/// compatible with every open already granted against the same path
/// (`[MS-FSCC]` share-access semantics): a new open's requested access must
/// be allowed by every existing open's share-access bits, and vice versa.
pub fn share_access_conflicts(
    existing_access: AccessMask,
    existing_share_access: ShareAccess,
    requested_access: AccessMask,
    requested_share_access: ShareAccess,
) -> bool {
    let existing_denies_new_read =
        requested_access.contains(AccessMask::FILE_READ_DATA) && !existing_share_access.contains(ShareAccess::READ);
    let existing_denies_new_write =
        requested_access.contains(AccessMask::FILE_WRITE_DATA) && !existing_share_access.contains(ShareAccess::WRITE);
    let existing_denies_new_delete =
        requested_access.contains(AccessMask::DELETE) && !existing_share_access.contains(ShareAccess::DELETE);

    let new_denies_existing_read =
        existing_access.contains(AccessMask::FILE_READ_DATA) && !requested_share_access.contains(ShareAccess::READ);
    let new_denies_existing_write =
        existing_access.contains(AccessMask::FILE_WRITE_DATA) && !requested_share_access.contains(ShareAccess::WRITE);
    let new_denies_existing_delete =
        existing_access.contains(AccessMask::DELETE) && !requested_share_access.contains(ShareAccess::DELETE);

    existing_denies_new_read
        || existing_denies_new_write
        || existing_denies_new_delete
        || new_denies_existing_read
        || new_denies_existing_write
        || new_denies_existing_delete
}

/// All opens belonging to one tree connection, keyed by volatile file ID.
pub struct OpenTable<H> {
    opens: Mutex<HashMap<u64, OpenFile<H>>>,
    allocator: FileIdAllocator,
}

impl<H> OpenTable<H> {
    pub fn new() -> Self {
        OpenTable { opens: Mutex::new(HashMap::new()), allocator: FileIdAllocator::new() }
    }

    pub fn allocate_id(&self) -> FileId {
        self.allocator.allocate()
    }

    /// Returns every open currently held against `path`, for the
    /// share-access check a new CREATE must pass.
    pub fn opens_for_path(&self, path: &str) -> Vec<(AccessMask, ShareAccess)> {
        self.opens
            .lock()
            .unwrap()
            .values()
            .filter(|o| o.path == path)
            .map(|o| (o.granted_access, o.share_access))
            .collect()
    }

    pub fn insert(&self, open: OpenFile<H>) {
        self.opens.lock().unwrap().insert(open.id.volatile, open);
    }

    pub fn remove(&self, id: FileId) -> Option<OpenFile<H>> {
        self.opens.lock().unwrap().remove(&id.volatile)
    }

    pub fn contains(&self, id: FileId) -> bool {
        self.opens.lock().unwrap().contains_key(&id.volatile)
    }

    pub fn len(&self) -> usize {
        self.opens.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn with_open<R>(&self, id: FileId, f: impl FnOnce(&OpenFile<H>) -> R) -> Option<R> {
        self.opens.lock().unwrap().get(&id.volatile).map(f)
    }

    /// Flips `delete_on_close` on an existing open (`FileDispositionInformation`).
    pub fn set_delete_on_close(&self, id: FileId, delete_on_close: bool) -> bool {
        match self.opens.lock().unwrap().get_mut(&id.volatile) {
            Some(open) => {
                open.delete_on_close = delete_on_close;
                true
            }
            None => false,
        }
    }

    /// Updates the path an existing open refers to (`RenameInformation`), so
    /// a later CLOSE or directory op on the same handle sees the renamed path
    /// rather than the one it was opened under.
    pub fn set_path(&self, id: FileId, path: String) -> bool {
        match self.opens.lock().unwrap().get_mut(&id.volatile) {
            Some(open) => {
                open.path = path;
                true
            }
            None => false,
        }
    }
}

impl<H> Default for OpenTable<H> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn allocator_issues_increasing_volatile_ids() {
        let alloc = FileIdAllocator::new();
        let a = alloc.allocate();
        let b = alloc.allocate();
        assert!(b.volatile > a.volatile);
    }

    #[test]
    fn exclusive_open_conflicts_with_a_second_reader() {
        let existing_access = AccessMask::FILE_READ_DATA;
        let existing_share = ShareAccess::empty();
        let requested_access = AccessMask::FILE_READ_DATA;
        let requested_share = ShareAccess::READ;
        assert!(share_access_conflicts(existing_access, existing_share, requested_access, requested_share));
    }

    #[test]
    fn shared_read_opens_do_not_conflict() {
        let access = AccessMask::FILE_READ_DATA;
        let share = ShareAccess::READ;
        assert!(!share_access_conflicts(access, share, access, share));
    }

    #[test]
    fn open_table_round_trips_an_insert_and_remove() {
        let table: OpenTable<u64> = OpenTable::new();
        let id = table.allocate_id();
        let metadata = Metadata {
            file_type: crate::vfs::FileType::File,
            size: 0,
            attributes: crate::protocol::consts::FileAttributes::NORMAL,
            creation_time: crate::protocol::wire::FileTime::ZERO,
            last_access_time: crate::protocol::wire::FileTime::ZERO,
            last_write_time: crate::protocol::wire::FileTime::ZERO,
            change_time: crate::protocol::wire::FileTime::ZERO,
        };
        let open = OpenFile::new(
            id,
            "a/b.txt".into(),
            42u64,
            AccessMask::FILE_READ_DATA,
            ShareAccess::READ,
            CreateOptions::empty(),
            &metadata,
        );
        table.insert(open);
        assert!(table.contains(id));
        assert_eq!(table.len(), 1);
        assert!(table.remove(id).is_some());
        assert!(table.is_empty());
    }
}
