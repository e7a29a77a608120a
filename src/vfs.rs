//! The abstract filesystem a server backend must implement.
//!
//! [`Filesystem`] plays the same role for this SMB2 server that
//! `NFSFileSystem` plays in an NFS server: it is the seam between the wire
//! protocol and actual storage, so the same dispatcher and session/open
//! bookkeeping can run against an in-memory filesystem in tests, a real
//! local directory tree, or any other backend a caller plugs in.
//!
//! Paths are always '/'-separated and relative to the share root; the
//! dispatcher in [`crate::server::dispatch`] is responsible for translating
//! SMB2's '\'-separated path names before calling through this trait.

use async_trait::async_trait;
use std::io;

use crate::protocol::consts::FileAttributes;
use crate::protocol::wire::FileTime;

/// What kind of object a path or handle refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileType {
    File,
    Directory,
}

/// Metadata the dispatcher needs to answer CREATE, QUERY_INFO and
/// QUERY_DIRECTORY requests.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Metadata {
    pub file_type: FileType,
    pub size: u64,
    pub attributes: FileAttributes,
    pub creation_time: FileTime,
    pub last_access_time: FileTime,
    pub last_write_time: FileTime,
    pub change_time: FileTime,
}

impl Metadata {
    pub fn is_directory(&self) -> bool {
        self.file_type == FileType::Directory
    }
}

/// One entry returned from [`Filesystem::read_dir`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirEntry {
    pub name: String,
    pub metadata: Metadata,
}

/// A page of directory entries plus a resume cookie for the next page.
///
/// `end_of_directory` mirrors the `STATUS_NO_MORE_FILES` boundary: once set,
/// the dispatcher stops issuing further QUERY_DIRECTORY requests for that
/// enumeration.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ReadDirResult {
    pub entries: Vec<DirEntry>,
    pub end_of_directory: bool,
}

/// What a backend supports, advertised so the dispatcher can reject
/// operations up front rather than relying on every call to fail cleanly.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Capabilities {
    pub read_only: bool,
}

impl Default for Capabilities {
    fn default() -> Self {
        Capabilities { read_only: false }
    }
}

/// The pluggable filesystem a share exports.
///
/// `Handle` is whatever a backend wants to use to identify an open object -
/// a path, an inode number, a file descriptor wrapper - the open-file
/// registry in [`crate::server::open`] only ever clones and compares it, it
/// never interprets it.
#[async_trait]
pub trait Filesystem: Send + Sync + 'static {
    type Handle: Clone + Send + Sync + 'static;

    fn capabilities(&self) -> Capabilities {
        Capabilities::default()
    }

    /// Returns metadata for `path`, or `NotFound` if it doesn't exist.
    async fn stat(&self, path: &str) -> io::Result<Metadata>;

    /// Opens (or creates, depending on the backend's interpretation of the
    /// path) an existing file and returns a handle plus its metadata. The
    /// dispatcher has already resolved create disposition semantics before
    /// calling this; `create` only ever opens what's already there.
    async fn open(&self, path: &str) -> io::Result<(Self::Handle, Metadata)>;

    /// Creates a new regular file at `path` and opens it.
    async fn create_file(&self, path: &str) -> io::Result<(Self::Handle, Metadata)>;

    /// Creates a new directory at `path`.
    async fn create_dir(&self, path: &str) -> io::Result<Metadata>;

    async fn read(&self, handle: &Self::Handle, offset: u64, len: u32) -> io::Result<Vec<u8>>;

    async fn write(&self, handle: &Self::Handle, offset: u64, data: &[u8]) -> io::Result<u32>;

    async fn set_len(&self, handle: &Self::Handle, len: u64) -> io::Result<()>;

    async fn close(&self, handle: Self::Handle) -> io::Result<()>;

    /// Lists the children of the directory at `path`, resuming after
    /// `cookie` (0 to start from the beginning) and returning at most
    /// `max_entries` entries.
    async fn read_dir(&self, path: &str, cookie: u64, max_entries: usize) -> io::Result<ReadDirResult>;

    async fn remove(&self, path: &str) -> io::Result<()>;

    async fn rename(&self, from: &str, to: &str, replace_if_exists: bool) -> io::Result<()>;

    async fn set_attributes(&self, path: &str, attributes: FileAttributes) -> io::Result<()>;

    async fn set_times(
        &self,
        path: &str,
        creation: Option<FileTime>,
        last_access: Option<FileTime>,
        last_write: Option<FileTime>,
    ) -> io::Result<()>;
}
