//! Storage locations the vault reads from and writes to.
//!
//! A [`Storage`] backend exposes the small contract the chunked transform
//! needs: open a readable + seekable stream, open a writable stream, and query
//! size, existence and deletion by name. [`Disks`] maps disk names to
//! backends so a [`Vault`](crate::vault::Vault) can switch between them.
//!
//! ## Backends
//!
//! - [`LocalStorage`]: files under a root directory
//! - [`MemoryStorage`]: shared in-memory map, handy for tests and embedding

use crate::error::{Result, VaultError};
use crate::streaming::{ByteSink, ByteSource};
use std::collections::HashMap;
use std::future::Future;
use std::io::{self, Cursor};
use std::path::{Component, Path, PathBuf};
use std::pin::Pin;
use std::sync::{Arc, Mutex, MutexGuard};
use std::task::{Context, Poll};
use tokio::fs;
use tokio::io::AsyncWrite;
use tracing::debug;

/// Named-object store consumed by the vault.
pub trait Storage: Send + Sync {
    type Reader: ByteSource;
    type Writer: ByteSink;

    /// Opens `name` for reading. Fails with `StreamOpen` when it cannot be opened.
    fn open_read(&self, name: &str) -> impl Future<Output = Result<Self::Reader>> + Send;

    /// Opens `name` for writing, replacing any existing content.
    fn open_write(&self, name: &str) -> impl Future<Output = Result<Self::Writer>> + Send;

    fn size(&self, name: &str) -> impl Future<Output = Result<u64>> + Send;

    fn exists(&self, name: &str) -> impl Future<Output = Result<bool>> + Send;

    fn delete(&self, name: &str) -> impl Future<Output = Result<()>> + Send;

    /// Whether two names refer to the same stored object.
    fn same_object(&self, a: &str, b: &str) -> bool {
        a == b
    }
}

/// Files stored beneath a root directory.
#[derive(Debug, Clone)]
pub struct LocalStorage {
    root: PathBuf,
}

impl LocalStorage {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Maps a storage name to a path under the root.
    /// Leading separators are ignored; `..` and absolute components are rejected.
    pub fn resolve(&self, name: &str) -> Result<PathBuf> {
        let relative = Path::new(name.trim_start_matches(|c| c == '/' || c == '\\'));
        let mut path = self.root.clone();
        let mut depth = 0usize;

        for component in relative.components() {
            match component {
                Component::Normal(part) => {
                    path.push(part);
                    depth += 1;
                }
                Component::CurDir => {}
                Component::ParentDir | Component::RootDir | Component::Prefix(_) => {
                    return Err(VaultError::storage(format!(
                        "{name:?} resolves outside of {}",
                        self.root.display()
                    )));
                }
            }
        }

        if depth == 0 {
            return Err(VaultError::storage(format!("{name:?} does not name a file")));
        }
        Ok(path)
    }
}

impl Storage for LocalStorage {
    type Reader = fs::File;
    type Writer = fs::File;

    fn same_object(&self, a: &str, b: &str) -> bool {
        match (self.resolve(a), self.resolve(b)) {
            (Ok(a), Ok(b)) => a == b,
            _ => a == b,
        }
    }

    async fn open_read(&self, name: &str) -> Result<fs::File> {
        let path = self.resolve(name)?;
        debug!(path = %path.display(), "opening local file for reading");
        fs::File::open(&path)
            .await
            .map_err(|e| VaultError::open(path.display().to_string(), e))
    }

    async fn open_write(&self, name: &str) -> Result<fs::File> {
        let path = self.resolve(name)?;
        debug!(path = %path.display(), "opening local file for writing");
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .await
                .map_err(|e| VaultError::open(parent.display().to_string(), e))?;
        }
        fs::File::create(&path)
            .await
            .map_err(|e| VaultError::open(path.display().to_string(), e))
    }

    async fn size(&self, name: &str) -> Result<u64> {
        let path = self.resolve(name)?;
        let meta = fs::metadata(&path)
            .await
            .map_err(|e| VaultError::storage(format!("reading size of {}: {e}", path.display())))?;
        Ok(meta.len())
    }

    async fn exists(&self, name: &str) -> Result<bool> {
        let path = self.resolve(name)?;
        fs::try_exists(&path)
            .await
            .map_err(|e| VaultError::storage(format!("checking {}: {e}", path.display())))
    }

    async fn delete(&self, name: &str) -> Result<()> {
        let path = self.resolve(name)?;
        debug!(path = %path.display(), "deleting local file");
        fs::remove_file(&path)
            .await
            .map_err(|e| VaultError::storage(format!("deleting {}: {e}", path.display())))
    }
}

type Files = Arc<Mutex<HashMap<String, Vec<u8>>>>;

/// In-memory storage. Clones share the same files.
#[derive(Debug, Clone, Default)]
pub struct MemoryStorage {
    files: Files,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn put(&self, name: &str, data: impl Into<Vec<u8>>) -> Result<()> {
        self.lock()?.insert(name.to_string(), data.into());
        Ok(())
    }

    pub fn get(&self, name: &str) -> Result<Option<Vec<u8>>> {
        Ok(self.lock()?.get(name).cloned())
    }

    fn lock(&self) -> Result<MutexGuard<'_, HashMap<String, Vec<u8>>>> {
        self.files
            .lock()
            .map_err(|_| VaultError::storage("memory storage lock poisoned"))
    }
}

/// Appends into a [`MemoryStorage`] entry as bytes are written.
#[derive(Debug)]
pub struct MemoryWriter {
    files: Files,
    name: String,
}

impl AsyncWrite for MemoryWriter {
    fn poll_write(
        self: Pin<&mut Self>,
        _cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        let mut files = self
            .files
            .lock()
            .map_err(|_| io::Error::other("memory storage lock poisoned"))?;
        files
            .entry(self.name.clone())
            .or_default()
            .extend_from_slice(buf);
        Poll::Ready(Ok(buf.len()))
    }

    fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Poll::Ready(Ok(()))
    }

    fn poll_shutdown(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Poll::Ready(Ok(()))
    }
}

fn not_found(name: &str) -> io::Error {
    io::Error::new(io::ErrorKind::NotFound, format!("{name} not found"))
}

impl Storage for MemoryStorage {
    type Reader = Cursor<Vec<u8>>;
    type Writer = MemoryWriter;

    async fn open_read(&self, name: &str) -> Result<Cursor<Vec<u8>>> {
        let data = self
            .get(name)?
            .ok_or_else(|| VaultError::open(name, not_found(name)))?;
        Ok(Cursor::new(data))
    }

    async fn open_write(&self, name: &str) -> Result<MemoryWriter> {
        self.put(name, Vec::new())?;
        Ok(MemoryWriter {
            files: Arc::clone(&self.files),
            name: name.to_string(),
        })
    }

    async fn size(&self, name: &str) -> Result<u64> {
        self.lock()?
            .get(name)
            .map(|data| data.len() as u64)
            .ok_or_else(|| VaultError::storage(format!("{name} not found")))
    }

    async fn exists(&self, name: &str) -> Result<bool> {
        Ok(self.lock()?.contains_key(name))
    }

    async fn delete(&self, name: &str) -> Result<()> {
        self.lock()?
            .remove(name)
            .map(|_| ())
            .ok_or_else(|| VaultError::storage(format!("{name} not found")))
    }
}

/// Named storage locations plus the one used when none is selected.
#[derive(Debug, Clone)]
pub struct Disks<S> {
    default: String,
    disks: HashMap<String, S>,
}

impl<S: Storage> Disks<S> {
    pub fn new(default: impl Into<String>) -> Self {
        Self {
            default: default.into(),
            disks: HashMap::new(),
        }
    }

    /// A registry holding one disk, which is also the default.
    pub fn single(name: impl Into<String>, storage: S) -> Self {
        let name = name.into();
        Self::new(name.clone()).with_disk(name, storage)
    }

    pub fn with_disk(mut self, name: impl Into<String>, storage: S) -> Self {
        self.insert(name, storage);
        self
    }

    pub fn insert(&mut self, name: impl Into<String>, storage: S) {
        self.disks.insert(name.into(), storage);
    }

    pub fn default_name(&self) -> &str {
        &self.default
    }

    pub fn disk(&self, name: &str) -> Result<&S> {
        self.disks
            .get(name)
            .ok_or_else(|| VaultError::UnknownDisk(name.to_string()))
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.disks.keys().map(String::as_str)
    }
}
