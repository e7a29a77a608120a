//! Shared test fixtures for the integration tests in this directory.

use std::collections::BTreeMap;
use std::io;
use std::sync::Mutex;

use async_trait::async_trait;

use smbd_rs::protocol::consts::FileAttributes;
use smbd_rs::protocol::wire::FileTime;
use smbd_rs::vfs::{Capabilities, DirEntry, FileType, Filesystem, Metadata, ReadDirResult};

/// An in-memory filesystem backend, the same role `DemoFS`/`WriteCaptureFS`
/// play for the NFS dispatcher's own integration tests: just enough storage
/// to exercise the dispatcher without any real I/O.
#[derive(Default)]
pub struct MemFs {
    files: Mutex<BTreeMap<String, Vec<u8>>>,
    dirs: Mutex<BTreeMap<String, ()>>,
}

impl MemFs {
    pub fn new() -> Self {
        let mut dirs = BTreeMap::new();
        dirs.insert(String::new(), ());
        MemFs { files: Mutex::new(BTreeMap::new()), dirs: Mutex::new(dirs) }
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
}

fn not_found() -> io::Error {
    io::Error::new(io::ErrorKind::NotFound, "no such file or directory")
}

#[async_trait]
impl Filesystem for MemFs {
    type Handle = String;

    fn capabilities(&self) -> Capabilities {
        Capabilities { read_only: false }
    }

    async fn stat(&self, path: &str) -> io::Result<Metadata> {
        if let Some(data) = self.files.lock().unwrap().get(path) {
            return Ok(Self::file_metadata(data.len() as u64));
        }
        if self.dirs.lock().unwrap().contains_key(path) {
            return Ok(Self::dir_metadata());
        }
        Err(not_found())
    }

    async fn open(&self, path: &str) -> io::Result<(Self::Handle, Metadata)> {
        let metadata = self.stat(path).await?;
        Ok((path.to_string(), metadata))
    }

    async fn create_file(&self, path: &str) -> io::Result<(Self::Handle, Metadata)> {
        self.files.lock().unwrap().entry(path.to_string()).or_default();
        Ok((path.to_string(), Self::file_metadata(0)))
    }

    async fn create_dir(&self, path: &str) -> io::Result<Metadata> {
        self.dirs.lock().unwrap().insert(path.to_string(), ());
        Ok(Self::dir_metadata())
    }

    async fn read(&self, handle: &Self::Handle, offset: u64, len: u32) -> io::Result<Vec<u8>> {
        let files = self.files.lock().unwrap();
        let data = files.get(handle).ok_or_else(not_found)?;
        let start = (offset as usize).min(data.len());
        let end = start.saturating_add(len as usize).min(data.len());
        Ok(data[start..end].to_vec())
    }

    async fn write(&self, handle: &Self::Handle, offset: u64, data: &[u8]) -> io::Result<u32> {
        let mut files = self.files.lock().unwrap();
        let file = files.entry(handle.clone()).or_default();
        let start = offset as usize;
        if file.len() < start + data.len() {
            file.resize(start + data.len(), 0);
        }
        file[start..start + data.len()].copy_from_slice(data);
        Ok(data.len() as u32)
    }

    async fn set_len(&self, handle: &Self::Handle, len: u64) -> io::Result<()> {
        let mut files = self.files.lock().unwrap();
        let file = files.entry(handle.clone()).or_default();
        file.resize(len as usize, 0);
        Ok(())
    }

    async fn close(&self, _handle: Self::Handle) -> io::Result<()> {
        Ok(())
    }

    async fn read_dir(&self, path: &str, cookie: u64, max_entries: usize) -> io::Result<ReadDirResult> {
        if !self.dirs.lock().unwrap().contains_key(path) {
            return Err(not_found());
        }
        let prefix = if path.is_empty() { String::new() } else { format!("{path}/") };
        let mut names: Vec<String> = Vec::new();
        for p in self.files.lock().unwrap().keys() {
            if let Some(name) = p.strip_prefix(&prefix) {
                if !name.is_empty() && !name.contains('/') {
                    names.push(name.to_string());
                }
            }
        }
        for p in self.dirs.lock().unwrap().keys() {
            if p == path || p.is_empty() {
                continue;
            }
            if let Some(name) = p.strip_prefix(&prefix) {
                if !name.is_empty() && !name.contains('/') {
                    names.push(name.to_string());
                }
            }
        }
        names.sort();
        let start = cookie as usize;
        let page: Vec<String> = names.into_iter().skip(start).take(max_entries).collect();
        let end_of_directory = start + page.len() >= count_children(self, path).await;
        let mut entries = Vec::with_capacity(page.len());
        for name in page {
            let full = format!("{prefix}{name}");
            let metadata = self.stat(&full).await?;
            entries.push(DirEntry { name, metadata });
        }
        Ok(ReadDirResult { entries, end_of_directory })
    }

    async fn remove(&self, path: &str) -> io::Result<()> {
        if self.files.lock().unwrap().remove(path).is_some() {
            return Ok(());
        }
        if self.dirs.lock().unwrap().remove(path).is_some() {
            return Ok(());
        }
        Err(not_found())
    }

    async fn rename(&self, from: &str, to: &str, replace_if_exists: bool) -> io::Result<()> {
        let exists_at_dest = self.files.lock().unwrap().contains_key(to) || self.dirs.lock().unwrap().contains_key(to);
        if exists_at_dest && !replace_if_exists {
            return Err(io::Error::new(io::ErrorKind::AlreadyExists, "destination exists"));
        }
        if let Some(data) = self.files.lock().unwrap().remove(from) {
            self.files.lock().unwrap().insert(to.to_string(), data);
            return Ok(());
        }
        if self.dirs.lock().unwrap().remove(from).is_some() {
            self.dirs.lock().unwrap().insert(to.to_string(), ());
            return Ok(());
        }
        Err(not_found())
    }

    async fn set_attributes(&self, path: &str, _attributes: FileAttributes) -> io::Result<()> {
        self.stat(path).await.map(|_| ())
    }

    async fn set_times(
        &self,
        path: &str,
        _creation: Option<FileTime>,
        _last_access: Option<FileTime>,
        _last_write: Option<FileTime>,
    ) -> io::Result<()> {
        self.stat(path).await.map(|_| ())
    }
}

async fn count_children(fs: &MemFs, path: &str) -> usize {
    let prefix = if path.is_empty() { String::new() } else { format!("{path}/") };
    let file_count = fs.files.lock().unwrap().keys().filter(|p| {
        p.strip_prefix(&prefix).map(|n| !n.is_empty() && !n.contains('/')).unwrap_or(false)
    }).count();
    let dir_count = fs.dirs.lock().unwrap().keys().filter(|p| {
        *p != path && !p.is_empty() && p.strip_prefix(&prefix).map(|n| !n.is_empty() && !n.contains('/')).unwrap_or(false)
    }).count();
    file_count + dir_count
}
