//! The POSIX-like client filesystem facade: path validation, cache
//! consultation, pool checkout, and retry, wrapped around one
//! [`RemoteConnection`] call per operation, per `[4.K]`.

use std::sync::Arc;

use crate::client::cache::MetadataCache;
use crate::client::config::ClientConfig;
use crate::client::error::ClientError;
use crate::client::pool::ConnectionPool;
use crate::client::retry::retry;
use crate::client::transport::{ConnectionFactory, RemoteFile as TransportFile};
use crate::protocol::consts::{AccessMask, CreateDisposition, FileAttributes};
use crate::protocol::wire::FileTime;
use crate::vfs::{DirEntry, Metadata};

bitflags::bitflags! {
    /// POSIX-style open flags, mapped onto an [`AccessMask`] /
    /// [`CreateDisposition`] pair per `[4.K]`'s flag table.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct OpenFlags: u32 {
        const RDONLY = 0;
        const WRONLY = 0b0001;
        const RDWR   = 0b0010;
        const CREATE = 0b0100;
        const EXCL   = 0b1000;
        const TRUNC  = 0b1_0000;
    }
}

/// Maps a [`OpenFlags`] word onto the access mask and create disposition a
/// CREATE request carries, per the documented table.
fn map_open_flags(flags: OpenFlags) -> Result<(AccessMask, CreateDisposition), ClientError> {
    let access = if flags.contains(OpenFlags::RDWR) {
        AccessMask::GENERIC_READ | AccessMask::GENERIC_WRITE
    } else if flags.contains(OpenFlags::WRONLY) {
        AccessMask::GENERIC_WRITE
    } else {
        AccessMask::GENERIC_READ
    };

    let disposition = if flags.contains(OpenFlags::CREATE) && flags.contains(OpenFlags::EXCL) {
        CreateDisposition::Create
    } else if flags.contains(OpenFlags::CREATE) && flags.contains(OpenFlags::TRUNC) {
        CreateDisposition::OverwriteIf
    } else if flags.contains(OpenFlags::CREATE) {
        CreateDisposition::OpenIf
    } else if flags.contains(OpenFlags::TRUNC) {
        CreateDisposition::Overwrite
    } else {
        CreateDisposition::Open
    };

    Ok((access, disposition))
}

/// Normalizes a client-supplied path: backslashes become slashes, `.`
/// segments collapse, and the result always starts with `/`. Rejects empty
/// paths, embedded NUL bytes, and any `..` that would climb above the share
/// root.
fn normalize_path(path: &str) -> Result<String, ClientError> {
    if path.is_empty() {
        return Err(ClientError::InvalidPath("empty path".to_string()));
    }
    if path.as_bytes().contains(&0) {
        return Err(ClientError::InvalidPath("embedded NUL byte".to_string()));
    }

    let mut components: Vec<&str> = Vec::new();
    for part in path.replace('\\', "/").split('/') {
        match part {
            "" | "." => continue,
            ".." => {
                if components.pop().is_none() {
                    return Err(ClientError::InvalidPath(format!("path escapes root: {path}")));
                }
            }
            other => components.push(other),
        }
    }
    Ok(format!("/{}", components.join("/")))
}

fn parent_of(path: &str) -> String {
    match path.rsplit_once('/') {
        Some(("", _)) => "/".to_string(),
        Some((parent, _)) => parent.to_string(),
        None => "/".to_string(),
    }
}

/// An open remote file: a pooled connection plus the transport-level file
/// handle it was opened through. `close` is idempotent; anything called
/// after close returns [`ClientError::Closed`].
pub struct File {
    inner: std::sync::Mutex<Option<Box<dyn TransportFile>>>,
}

impl File {
    fn new(file: Box<dyn TransportFile>) -> Self {
        File { inner: std::sync::Mutex::new(Some(file)) }
    }

    pub async fn read(&self, offset: u64, len: u32) -> Result<Vec<u8>, ClientError> {
        let guard = self.inner.lock().unwrap();
        match guard.as_deref() {
            Some(file) => file.read(offset, len).await,
            None => Err(ClientError::Closed),
        }
    }

    pub async fn write(&self, offset: u64, data: &[u8]) -> Result<u32, ClientError> {
        let guard = self.inner.lock().unwrap();
        match guard.as_deref() {
            Some(file) => file.write(offset, data).await,
            None => Err(ClientError::Closed),
        }
    }

    pub async fn set_len(&self, len: u64) -> Result<(), ClientError> {
        let guard = self.inner.lock().unwrap();
        match guard.as_deref() {
            Some(file) => file.set_len(len).await,
            None => Err(ClientError::Closed),
        }
    }

    pub async fn stat(&self) -> Result<Metadata, ClientError> {
        let guard = self.inner.lock().unwrap();
        match guard.as_deref() {
            Some(file) => file.stat().await,
            None => Err(ClientError::Closed),
        }
    }

    /// Closes the file. Calling this more than once is a no-op on every
    /// call after the first.
    pub async fn close(&self) -> Result<(), ClientError> {
        let file = self.inner.lock().unwrap().take();
        match file {
            Some(file) => file.close().await,
            None => Ok(()),
        }
    }
}

/// The client's entry point: one mounted share, with a connection pool, an
/// optional metadata cache, and the retry engine wrapping every call.
pub struct ClientFs {
    pool: Arc<ConnectionPool>,
    cache: Option<MetadataCache>,
    retry_policy: crate::client::config::RetryPolicy,
}

impl ClientFs {
    pub fn new(config: ClientConfig, factory: Box<dyn ConnectionFactory>) -> Arc<Self> {
        let pool = ConnectionPool::new(factory, config.max_open, config.max_idle, config.idle_timeout, config.conn_timeout);
        pool.spawn_idle_sweep();
        let cache = if config.cache.enable_cache {
            Some(MetadataCache::new(config.cache.stat_cache_ttl, config.cache.dir_cache_ttl, config.cache.max_cache_entries))
        } else {
            None
        };
        Arc::new(ClientFs { pool, cache, retry_policy: config.retry_policy })
    }

    async fn retrying<T, F, Fut>(&self, op: F) -> Result<T, ClientError>
    where
        F: FnMut() -> Fut,
        Fut: std::future::Future<Output = Result<T, ClientError>>,
    {
        retry(&self.retry_policy, op).await
    }

    fn invalidate(&self, path: &str) {
        if let Some(cache) = &self.cache {
            cache.invalidate(path);
            cache.invalidate(&parent_of(path));
        }
    }

    pub async fn open(&self, path: &str) -> Result<File, ClientError> {
        self.openfile(path, OpenFlags::RDONLY).await
    }

    pub async fn openfile(&self, path: &str, flags: OpenFlags) -> Result<File, ClientError> {
        let path = normalize_path(path).map_err(|e| e.at_path("open", path))?;
        let (access, disposition) = map_open_flags(flags)?;
        let file = self
            .retrying(|| {
                let path = path.clone();
                async move {
                    let conn = self.pool.get().await?;
                    conn.connection().open_file(&path, access, disposition).await
                }
            })
            .await
            .map_err(|e| e.at_path("open", &path))?;
        if flags.intersects(OpenFlags::WRONLY | OpenFlags::RDWR | OpenFlags::CREATE | OpenFlags::TRUNC) {
            self.invalidate(&path);
        }
        Ok(File::new(file))
    }

    pub async fn create(&self, path: &str) -> Result<File, ClientError> {
        self.openfile(path, OpenFlags::RDWR | OpenFlags::CREATE | OpenFlags::TRUNC).await
    }

    pub async fn stat(&self, path: &str) -> Result<Metadata, ClientError> {
        let path = normalize_path(path).map_err(|e| e.at_path("stat", path))?;
        if let Some(cache) = &self.cache {
            if let Some(cached) = cache.get_stat(&path) {
                return Ok(cached);
            }
        }
        let metadata = self
            .retrying(|| {
                let path = path.clone();
                async move {
                    let conn = self.pool.get().await?;
                    conn.connection().stat(&path).await
                }
            })
            .await
            .map_err(|e| e.at_path("stat", &path))?;
        if let Some(cache) = &self.cache {
            cache.put_stat(&path, metadata.clone());
        }
        Ok(metadata)
    }

    /// Identical to [`ClientFs::stat`]: this facade has no notion of
    /// symbolic links distinct from their targets, so `lstat` is `stat`.
    pub async fn lstat(&self, path: &str) -> Result<Metadata, ClientError> {
        self.stat(path).await
    }

    pub async fn mkdir(&self, path: &str) -> Result<(), ClientError> {
        let path = normalize_path(path).map_err(|e| e.at_path("mkdir", path))?;
        self.retrying(|| {
            let path = path.clone();
            async move {
                let conn = self.pool.get().await?;
                conn.connection().mkdir(&path).await
            }
        })
        .await
        .map_err(|e| e.at_path("mkdir", &path))?;
        self.invalidate(&path);
        Ok(())
    }

    /// Creates every missing directory component of `path`, tolerating an
    /// already-existing leaf the way `os.MkdirAll` does.
    pub async fn mkdir_all(&self, path: &str) -> Result<(), ClientError> {
        let path = normalize_path(path).map_err(|e| e.at_path("mkdirall", path))?;
        let mut built = String::new();
        for component in path.trim_start_matches('/').split('/').filter(|c| !c.is_empty()) {
            built.push('/');
            built.push_str(component);
            match self.mkdir(&built).await {
                Ok(()) => {}
                Err(err) if err.is_exist() => {}
                Err(err) => return Err(err),
            }
        }
        Ok(())
    }

    pub async fn remove(&self, path: &str) -> Result<(), ClientError> {
        let path = normalize_path(path).map_err(|e| e.at_path("remove", path))?;
        self.retrying(|| {
            let path = path.clone();
            async move {
                let conn = self.pool.get().await?;
                conn.connection().remove(&path).await
            }
        })
        .await
        .map_err(|e| e.at_path("remove", &path))?;
        self.invalidate(&path);
        Ok(())
    }

    /// Recursively removes `path`: directories are walked and emptied
    /// bottom-up before their own removal, tolerating an already-absent
    /// path the way `os.RemoveAll` does.
    pub async fn remove_all(&self, path: &str) -> Result<(), ClientError> {
        let path = normalize_path(path).map_err(|e| e.at_path("removeall", path))?;
        match self.stat(&path).await {
            Err(err) if err.is_not_exist() => return Ok(()),
            Err(err) => return Err(err),
            Ok(metadata) if metadata.is_directory() => {
                let entries = self.readdir(&path).await?;
                for entry in entries {
                    let child = if path == "/" { format!("/{}", entry.name) } else { format!("{path}/{}", entry.name) };
                    self.remove_all(&child).await?;
                }
            }
            Ok(_) => {}
        }
        self.remove(&path).await
    }

    pub async fn rename(&self, from: &str, to: &str) -> Result<(), ClientError> {
        let from = normalize_path(from).map_err(|e| e.at_path("rename", from))?;
        let to = normalize_path(to).map_err(|e| e.at_path("rename", to))?;
        self.retrying(|| {
            let from = from.clone();
            let to = to.clone();
            async move {
                let conn = self.pool.get().await?;
                conn.connection().rename(&from, &to, false).await
            }
        })
        .await
        .map_err(|e| e.at_path("rename", &from))?;
        self.invalidate(&from);
        self.invalidate(&to);
        Ok(())
    }

    pub async fn chmod(&self, path: &str, mode: u32) -> Result<(), ClientError> {
        let path = normalize_path(path).map_err(|e| e.at_path("chmod", path))?;
        let attributes = unix_mode_to_attributes(mode);
        self.retrying(|| {
            let path = path.clone();
            async move {
                let conn = self.pool.get().await?;
                conn.connection().set_attributes(&path, attributes).await
            }
        })
        .await
        .map_err(|e| e.at_path("chmod", &path))?;
        self.invalidate(&path);
        Ok(())
    }

    pub async fn chtimes(&self, path: &str, atime: FileTime, mtime: FileTime) -> Result<(), ClientError> {
        let path = normalize_path(path).map_err(|e| e.at_path("chtimes", path))?;
        self.retrying(|| {
            let path = path.clone();
            async move {
                let conn = self.pool.get().await?;
                conn.connection().set_times(&path, Some(atime), Some(mtime)).await
            }
        })
        .await
        .map_err(|e| e.at_path("chtimes", &path))?;
        self.invalidate(&path);
        Ok(())
    }

    pub async fn readdir(&self, path: &str) -> Result<Vec<DirEntry>, ClientError> {
        let path = normalize_path(path).map_err(|e| e.at_path("readdir", path))?;
        if let Some(cache) = &self.cache {
            if let Some(cached) = cache.get_dir(&path) {
                return Ok(cached);
            }
        }
        let entries = self
            .retrying(|| {
                let path = path.clone();
                async move {
                    let conn = self.pool.get().await?;
                    conn.connection().read_dir(&path).await
                }
            })
            .await
            .map_err(|e| e.at_path("readdir", &path))?;
        if let Some(cache) = &self.cache {
            cache.put_dir(&path, entries.clone());
        }
        Ok(entries)
    }

    /// Convenience wrapper over open+read-to-end+close, for callers that
    /// just want a whole small file's bytes.
    pub async fn readfile(&self, path: &str) -> Result<Vec<u8>, ClientError> {
        let file = self.open(path).await?;
        let metadata = file.stat().await.map_err(|e| e.at_path("readfile", path))?;
        let mut data = Vec::with_capacity(metadata.size as usize);
        let mut offset = 0u64;
        const CHUNK: u32 = 64 * 1024;
        loop {
            let chunk = file.read(offset, CHUNK).await.map_err(|e| e.at_path("readfile", path))?;
            if chunk.is_empty() {
                break;
            }
            offset += chunk.len() as u64;
            data.extend_from_slice(&chunk);
            if chunk.len() < CHUNK as usize {
                break;
            }
        }
        let _ = file.close().await;
        Ok(data)
    }
}

fn unix_mode_to_attributes(mode: u32) -> FileAttributes {
    // Only the write-bit maps onto anything SMB2 tracks; execute/group/other
    // bits have no FAT/NTFS attribute counterpart.
    if mode & 0o200 == 0 {
        FileAttributes::READONLY
    } else {
        FileAttributes::NORMAL
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_collapses_dot_and_backslash_segments() {
        assert_eq!(normalize_path("a\\b\\.\\c").unwrap(), "/a/b/c");
        assert_eq!(normalize_path("/a/b/").unwrap(), "/a/b");
    }

    #[test]
    fn normalize_rejects_escaping_dotdot() {
        assert!(normalize_path("a/../../b").is_err());
    }

    #[test]
    fn normalize_rejects_empty_and_nul_paths() {
        assert!(normalize_path("").is_err());
        assert!(normalize_path("a\0b").is_err());
    }

    #[test]
    fn flag_mapping_matches_the_documented_table() {
        assert_eq!(map_open_flags(OpenFlags::RDONLY).unwrap(), (AccessMask::GENERIC_READ, CreateDisposition::Open));
        assert_eq!(map_open_flags(OpenFlags::WRONLY).unwrap(), (AccessMask::GENERIC_WRITE, CreateDisposition::Open));
        assert_eq!(
            map_open_flags(OpenFlags::RDWR).unwrap(),
            (AccessMask::GENERIC_READ | AccessMask::GENERIC_WRITE, CreateDisposition::Open)
        );
        assert_eq!(
            map_open_flags(OpenFlags::RDWR | OpenFlags::CREATE | OpenFlags::EXCL).unwrap().1,
            CreateDisposition::Create
        );
        assert_eq!(
            map_open_flags(OpenFlags::RDWR | OpenFlags::CREATE | OpenFlags::TRUNC).unwrap().1,
            CreateDisposition::OverwriteIf
        );
        assert_eq!(map_open_flags(OpenFlags::RDWR | OpenFlags::CREATE).unwrap().1, CreateDisposition::OpenIf);
        assert_eq!(map_open_flags(OpenFlags::RDWR | OpenFlags::TRUNC).unwrap().1, CreateDisposition::Overwrite);
    }
}
