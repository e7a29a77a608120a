//! The connection factory seam: how the pool in [`crate::client::pool`]
//! actually obtains a session-and-share-mounted connection.
//!
//! The wire-level SMB2 client (dialing, the outbound NTLM handshake,
//! mounting the share) is deliberately not reimplemented here - a production
//! deployment of this facade plugs in a real client library behind
//! [`ConnectionFactory`]; this crate only needs the trait boundary and an
//! in-memory fake to exercise the pool, retry engine and filesystem facade.

use std::collections::HashMap;
use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use crate::client::config::ClientConfig;
use crate::client::error::ClientError;
use crate::protocol::consts::{AccessMask, CreateDisposition, FileAttributes};
use crate::protocol::wire::FileTime;
use crate::vfs::{DirEntry, FileType, Metadata};

/// One open remote file, reached through a [`RemoteConnection`].
#[async_trait]
pub trait RemoteFile: Send + Sync {
    async fn read(&self, offset: u64, len: u32) -> Result<Vec<u8>, ClientError>;
    async fn write(&self, offset: u64, data: &[u8]) -> Result<u32, ClientError>;
    async fn set_len(&self, len: u64) -> Result<(), ClientError>;
    async fn stat(&self) -> Result<Metadata, ClientError>;
    async fn close(&self) -> Result<(), ClientError>;
}

/// One session-and-share-mounted connection, as handed out by a
/// [`ConnectionFactory`] and held by the pool in [`crate::client::pool`].
///
/// Mirrors [`crate::vfs::Filesystem`]'s shape from the other side of the
/// wire: the facade in [`crate::client::fs`] is the caller, this trait is
/// what it calls through once it has a pooled connection checked out.
#[async_trait]
pub trait RemoteConnection: Send + Sync {
    async fn open_file(
        &self,
        path: &str,
        access: AccessMask,
        disposition: CreateDisposition,
    ) -> Result<Box<dyn RemoteFile>, ClientError>;

    async fn stat(&self, path: &str) -> Result<Metadata, ClientError>;

    async fn mkdir(&self, path: &str) -> Result<(), ClientError>;

    async fn remove(&self, path: &str) -> Result<(), ClientError>;

    async fn rename(&self, from: &str, to: &str, replace_if_exists: bool) -> Result<(), ClientError>;

    async fn set_attributes(&self, path: &str, attributes: FileAttributes) -> Result<(), ClientError>;

    async fn set_times(
        &self,
        path: &str,
        last_access: Option<FileTime>,
        last_write: Option<FileTime>,
    ) -> Result<(), ClientError>;

    async fn read_dir(&self, path: &str) -> Result<Vec<DirEntry>, ClientError>;

    /// Whether the pool should keep offering this connection to callers, or
    /// treat it as dead and drop it instead of returning it to the idle set.
    fn is_healthy(&self) -> bool;

    async fn close(&self) -> Result<(), ClientError>;
}

/// Builds one [`RemoteConnection`] per pool checkout-miss.
#[async_trait]
pub trait ConnectionFactory: Send + Sync {
    async fn connect(&self) -> Result<Box<dyn RemoteConnection>, ClientError>;
}

/// The production factory: dials TCP against `config.server`/`config.port`
/// within `config.conn_timeout`.
///
/// Beyond the dial, mounting a share means running the outbound NTLM
/// handshake and the SMB2 NEGOTIATE/SESSION_SETUP/TREE_CONNECT exchange -
/// the part this crate delegates to an external client library. The
/// connection this factory hands back surfaces that gap honestly: every
/// [`RemoteConnection`] method returns [`ClientError::Transport`] wrapping
/// an `Unsupported` I/O error, rather than silently pretending to succeed.
pub struct TcpConnectionFactory {
    config: ClientConfig,
}

impl TcpConnectionFactory {
    pub fn new(config: ClientConfig) -> Self {
        TcpConnectionFactory { config }
    }
}

#[async_trait]
impl ConnectionFactory for TcpConnectionFactory {
    async fn connect(&self) -> Result<Box<dyn RemoteConnection>, ClientError> {
        let addr = format!("{}:{}", self.config.server, self.config.port);
        let stream = tokio::time::timeout(self.config.conn_timeout, tokio::net::TcpStream::connect(&addr))
            .await
            .map_err(|_| ClientError::Transport(io::Error::new(io::ErrorKind::TimedOut, "connect timed out")))?
            .map_err(ClientError::Transport)?;
        let _ = stream.set_nodelay(true);
        Ok(Box::new(UnmountedConnection))
    }
}

/// Stands in for a dialed-but-not-wire-implemented connection; see
/// [`TcpConnectionFactory`]'s doc comment.
struct UnmountedConnection;

fn unsupported() -> ClientError {
    ClientError::Transport(io::Error::new(
        io::ErrorKind::Unsupported,
        "SMB2 wire transport is provided by an external client library",
    ))
}

#[async_trait]
impl RemoteConnection for UnmountedConnection {
    async fn open_file(&self, _: &str, _: AccessMask, _: CreateDisposition) -> Result<Box<dyn RemoteFile>, ClientError> {
        Err(unsupported())
    }
    async fn stat(&self, _: &str) -> Result<Metadata, ClientError> {
        Err(unsupported())
    }
    async fn mkdir(&self, _: &str) -> Result<(), ClientError> {
        Err(unsupported())
    }
    async fn remove(&self, _: &str) -> Result<(), ClientError> {
        Err(unsupported())
    }
    async fn rename(&self, _: &str, _: &str, _: bool) -> Result<(), ClientError> {
        Err(unsupported())
    }
    async fn set_attributes(&self, _: &str, _: FileAttributes) -> Result<(), ClientError> {
        Err(unsupported())
    }
    async fn set_times(&self, _: &str, _: Option<FileTime>, _: Option<FileTime>) -> Result<(), ClientError> {
        Err(unsupported())
    }
    async fn read_dir(&self, _: &str) -> Result<Vec<DirEntry>, ClientError> {
        Err(unsupported())
    }
    fn is_healthy(&self) -> bool {
        false
    }
    async fn close(&self) -> Result<(), ClientError> {
        Ok(())
    }
}

/// An in-memory share used by tests: a flat map of path to either file bytes
/// or a directory marker, shared across every connection the factory hands
/// out so operations through one pooled connection are visible through
/// another, the way a real mounted share would be.
#[derive(Default)]
struct MemoryShare {
    files: HashMap<String, Vec<u8>>,
    dirs: HashMap<String, ()>,
}

/// A [`ConnectionFactory`] backed by an in-memory share, for pool, retry and
/// facade tests that need a [`RemoteConnection`] without any real networking.
pub struct InMemoryConnectionFactory {
    share: Arc<Mutex<MemoryShare>>,
    healthy: Arc<AtomicBool>,
    connect_failures: Arc<Mutex<usize>>,
}

impl InMemoryConnectionFactory {
    pub fn new() -> Self {
        let mut share = MemoryShare::default();
        share.dirs.insert("/".to_string(), ());
        InMemoryConnectionFactory {
            share: Arc::new(Mutex::new(share)),
            healthy: Arc::new(AtomicBool::new(true)),
            connect_failures: Arc::new(Mutex::new(0)),
        }
    }

    /// Marks every connection this factory has already handed out (and will
    /// hand out) as unhealthy, simulating a dropped server session.
    pub fn poison(&self) {
        self.healthy.store(false, Ordering::SeqCst);
    }

    /// Makes the next `n` calls to [`ConnectionFactory::connect`] fail, to
    /// exercise pool/retry behavior when dialing itself fails.
    pub fn fail_next_connects(&self, n: usize) {
        *self.connect_failures.lock().unwrap() = n;
    }
}

impl Default for InMemoryConnectionFactory {
    fn default() -> Self {
        InMemoryConnectionFactory::new()
    }
}

#[async_trait]
impl ConnectionFactory for InMemoryConnectionFactory {
    async fn connect(&self) -> Result<Box<dyn RemoteConnection>, ClientError> {
        let mut failures = self.connect_failures.lock().unwrap();
        if *failures > 0 {
            *failures -= 1;
            return Err(ClientError::Transport(io::Error::new(io::ErrorKind::ConnectionRefused, "refused")));
        }
        Ok(Box::new(InMemoryConnection { share: self.share.clone(), healthy: self.healthy.clone() }))
    }
}

struct InMemoryConnection {
    share: Arc<Mutex<MemoryShare>>,
    healthy: Arc<AtomicBool>,
}

struct InMemoryFile {
    share: Arc<Mutex<MemoryShare>>,
    path: String,
}

#[async_trait]
impl RemoteFile for InMemoryFile {
    async fn read(&self, offset: u64, len: u32) -> Result<Vec<u8>, ClientError> {
        let share = self.share.lock().unwrap();
        let data = share.files.get(&self.path).ok_or(ClientError::NotExist)?;
        let start = (offset as usize).min(data.len());
        let end = start.saturating_add(len as usize).min(data.len());
        Ok(data[start..end].to_vec())
    }

    async fn write(&self, offset: u64, data: &[u8]) -> Result<u32, ClientError> {
        let mut share = self.share.lock().unwrap();
        let file = share.files.entry(self.path.clone()).or_default();
        let start = offset as usize;
        if file.len() < start + data.len() {
            file.resize(start + data.len(), 0);
        }
        file[start..start + data.len()].copy_from_slice(data);
        Ok(data.len() as u32)
    }

    async fn set_len(&self, len: u64) -> Result<(), ClientError> {
        let mut share = self.share.lock().unwrap();
        let file = share.files.entry(self.path.clone()).or_default();
        file.resize(len as usize, 0);
        Ok(())
    }

    async fn stat(&self) -> Result<Metadata, ClientError> {
        let share = self.share.lock().unwrap();
        let data = share.files.get(&self.path).ok_or(ClientError::NotExist)?;
        Ok(file_metadata(data.len() as u64))
    }

    async fn close(&self) -> Result<(), ClientError> {
        Ok(())
    }
}

fn file_metadata(size: u64) -> Metadata {
    Metadata {
        file_type: FileType::File,
        size,
        attributes: FileAttributes::NORMAL,
        creation_time: FileTime::now(),
        last_access_time: FileTime::now(),
        last_write_time: FileTime::now(),
        change_time: FileTime::now(),
    }
}

fn dir_metadata() -> Metadata {
    Metadata {
        file_type: FileType::Directory,
        size: 0,
        attributes: FileAttributes::DIRECTORY,
        creation_time: FileTime::now(),
        last_access_time: FileTime::now(),
        last_write_time: FileTime::now(),
        change_time: FileTime::now(),
    }
}

fn parent_of(path: &str) -> String {
    match path.rsplit_once('/') {
        Some(("", _)) => "/".to_string(),
        Some((parent, _)) => parent.to_string(),
        None => "/".to_string(),
    }
}

#[async_trait]
impl RemoteConnection for InMemoryConnection {
    async fn open_file(
        &self,
        path: &str,
        _access: AccessMask,
        disposition: CreateDisposition,
    ) -> Result<Box<dyn RemoteFile>, ClientError> {
        let mut share = self.share.lock().unwrap();
        let exists = share.files.contains_key(path) || share.dirs.contains_key(path);
        match disposition {
            CreateDisposition::Create if exists => return Err(ClientError::Exist),
            CreateDisposition::Open | CreateDisposition::Overwrite if !exists => return Err(ClientError::NotExist),
            _ => {}
        }
        match disposition {
            CreateDisposition::Create | CreateDisposition::OpenIf => {
                share.files.entry(path.to_string()).or_default();
            }
            CreateDisposition::Overwrite | CreateDisposition::OverwriteIf => {
                share.files.insert(path.to_string(), Vec::new());
            }
            CreateDisposition::Supersede => {
                share.files.insert(path.to_string(), Vec::new());
            }
            CreateDisposition::Open => {}
        }
        Ok(Box::new(InMemoryFile { share: self.share.clone(), path: path.to_string() }))
    }

    async fn stat(&self, path: &str) -> Result<Metadata, ClientError> {
        let share = self.share.lock().unwrap();
        if let Some(data) = share.files.get(path) {
            return Ok(file_metadata(data.len() as u64));
        }
        if share.dirs.contains_key(path) {
            return Ok(dir_metadata());
        }
        Err(ClientError::NotExist)
    }

    async fn mkdir(&self, path: &str) -> Result<(), ClientError> {
        let mut share = self.share.lock().unwrap();
        if share.dirs.contains_key(path) || share.files.contains_key(path) {
            return Err(ClientError::Exist);
        }
        share.dirs.insert(path.to_string(), ());
        Ok(())
    }

    async fn remove(&self, path: &str) -> Result<(), ClientError> {
        let mut share = self.share.lock().unwrap();
        if share.files.remove(path).is_some() {
            return Ok(());
        }
        if share.dirs.remove(path).is_some() {
            return Ok(());
        }
        Err(ClientError::NotExist)
    }

    async fn rename(&self, from: &str, to: &str, replace_if_exists: bool) -> Result<(), ClientError> {
        let mut share = self.share.lock().unwrap();
        let exists_at_dest = share.files.contains_key(to) || share.dirs.contains_key(to);
        if exists_at_dest && !replace_if_exists {
            return Err(ClientError::Exist);
        }
        if let Some(data) = share.files.remove(from) {
            share.files.insert(to.to_string(), data);
            return Ok(());
        }
        if share.dirs.remove(from).is_some() {
            share.dirs.insert(to.to_string(), ());
            return Ok(());
        }
        Err(ClientError::NotExist)
    }

    async fn set_attributes(&self, path: &str, _attributes: FileAttributes) -> Result<(), ClientError> {
        let share = self.share.lock().unwrap();
        if share.files.contains_key(path) || share.dirs.contains_key(path) {
            Ok(())
        } else {
            Err(ClientError::NotExist)
        }
    }

    async fn set_times(&self, path: &str, _last_access: Option<FileTime>, _last_write: Option<FileTime>) -> Result<(), ClientError> {
        let share = self.share.lock().unwrap();
        if share.files.contains_key(path) || share.dirs.contains_key(path) {
            Ok(())
        } else {
            Err(ClientError::NotExist)
        }
    }

    async fn read_dir(&self, path: &str) -> Result<Vec<DirEntry>, ClientError> {
        let share = self.share.lock().unwrap();
        if !share.dirs.contains_key(path) {
            return Err(ClientError::NotExist);
        }
        let prefix = if path == "/" { "/".to_string() } else { format!("{path}/") };
        let mut entries = Vec::new();
        for (p, data) in &share.files {
            if parent_of(p) == path || (path == "/" && !p[prefix.len().min(p.len())..].contains('/')) {
                if let Some(name) = p.strip_prefix(&prefix) {
                    if !name.is_empty() && !name.contains('/') {
                        entries.push(DirEntry { name: name.to_string(), metadata: file_metadata(data.len() as u64) });
                    }
                }
            }
        }
        for p in share.dirs.keys() {
            if p == "/" {
                continue;
            }
            if let Some(name) = p.strip_prefix(&prefix) {
                if !name.is_empty() && !name.contains('/') {
                    entries.push(DirEntry { name: name.to_string(), metadata: dir_metadata() });
                }
            }
        }
        Ok(entries)
    }

    fn is_healthy(&self) -> bool {
        self.healthy.load(Ordering::SeqCst)
    }

    async fn close(&self) -> Result<(), ClientError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn in_memory_connection_round_trips_a_file() {
        let factory = InMemoryConnectionFactory::new();
        let conn = factory.connect().await.unwrap();
        let file = conn.open_file("/a.txt", AccessMask::GENERIC_WRITE, CreateDisposition::Create).await.unwrap();
        file.write(0, b"hello").await.unwrap();
        let data = file.read(0, 5).await.unwrap();
        assert_eq!(data, b"hello");
    }

    #[tokio::test]
    async fn mkdir_then_read_dir_lists_children() {
        let factory = InMemoryConnectionFactory::new();
        let conn = factory.connect().await.unwrap();
        conn.mkdir("/sub").await.unwrap();
        conn.open_file("/sub/f.txt", AccessMask::GENERIC_WRITE, CreateDisposition::Create).await.unwrap();
        let entries = conn.read_dir("/").await.unwrap();
        assert!(entries.iter().any(|e| e.name == "sub" && e.metadata.is_directory()));
    }

    #[tokio::test]
    async fn fail_next_connects_surfaces_a_transport_error() {
        let factory = InMemoryConnectionFactory::new();
        factory.fail_next_connects(1);
        assert!(factory.connect().await.is_err());
        assert!(factory.connect().await.is_ok());
    }
}
