//! The capability interface the navigator consumes. A backend is nothing more than a pair of
//! handle types: directories that can hand out their children, and files that can be read or
//! opened for writing. Where the handles come from (browser origin-private storage, a local
//! directory, an in-memory tree) is up to the implementor.

mod error;
pub mod memory;

#[cfg(all(feature = "local-store", not(target_arch = "wasm32")))]
pub mod local;

pub use error::BackendError;

use async_trait::async_trait;
use futures::AsyncRead;

/// A capability token for a directory. Acquiring children may be denied by the backend, in which
/// case the error is surfaced unchanged.
#[async_trait(?Send)]
pub trait DirectoryHandle: Clone + Sized {
    type File: FileHandle;

    /// Get the child directory `name`, creating it when absent and `create` is set. Reports
    /// [`BackendError::NotFound`] when the child is missing and nothing was created.
    async fn directory(&self, name: &str, create: bool) -> Result<Self, BackendError>;

    /// Get the child file `name`, creating an empty one when absent and `create` is set.
    async fn file(&self, name: &str, create: bool) -> Result<Self::File, BackendError>;

    /// Enumerate the immediate children of this directory. Order is whatever the backend
    /// reports and must be stable for an unchanged directory.
    async fn entries(&self) -> Result<Vec<(String, Entry<Self>)>, BackendError>;

    /// Whether both handles refer to the same underlying directory.
    async fn is_same_entry(&self, other: &Self) -> Result<bool, BackendError>;

    /// Reverse lookup of `entry` relative to this directory. `Ok(None)` when the entry is not
    /// reachable from here, an empty list when it is this directory itself.
    async fn resolve(&self, entry: &Entry<Self>) -> Result<Option<Vec<String>>, BackendError>;
}

#[async_trait(?Send)]
pub trait FileHandle: Clone + Sized {
    type Reader: AsyncRead + Unpin;
    type Writable: WritableStream;

    async fn is_same_entry(&self, other: &Self) -> Result<bool, BackendError>;

    /// Open a stream over the current committed content of the file.
    async fn reader(&self) -> Result<Self::Reader, BackendError>;

    /// Current committed length of the file in bytes.
    async fn size(&self) -> Result<u64, BackendError>;

    /// Open a writable stream. Writes are not visible to readers until the stream has been
    /// closed.
    async fn writable(&self, options: WritableOptions) -> Result<Self::Writable, BackendError>;
}

/// A scoped writable stream. Backends may hold a lock on the file for as long as the stream is
/// open, callers must always finish with [`WritableStream::close`].
#[async_trait(?Send)]
pub trait WritableStream {
    async fn close(self) -> Result<(), BackendError>;

    async fn seek(&mut self, position: u64) -> Result<(), BackendError>;

    async fn write(&mut self, data: &[u8]) -> Result<(), BackendError>;
}

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct WritableOptions {
    /// Start the stream from the existing file content instead of an empty file.
    pub keep_existing_data: bool,
}

impl WritableOptions {
    pub fn keep_existing_data() -> Self {
        Self {
            keep_existing_data: true,
        }
    }
}

/// Rejects names a single directory entry can't carry: empty, traversal segments, or anything
/// containing a separator or NUL.
pub(crate) fn validate_name(name: &str) -> Result<(), BackendError> {
    if name.is_empty() || name == "." || name == ".." || name.contains(['/', '\0']) {
        return Err(BackendError::InvalidName(name.to_string()));
    }

    Ok(())
}

/// Either kind of handle a directory can contain.
pub enum Entry<D: DirectoryHandle> {
    Directory(D),
    File(D::File),
}

impl<D: DirectoryHandle> Entry<D> {
    pub fn as_directory(&self) -> Option<&D> {
        match self {
            Entry::Directory(dir) => Some(dir),
            Entry::File(_) => None,
        }
    }

    pub fn as_file(&self) -> Option<&D::File> {
        match self {
            Entry::Directory(_) => None,
            Entry::File(file) => Some(file),
        }
    }

    pub fn is_directory(&self) -> bool {
        matches!(self, Entry::Directory(_))
    }

    pub fn is_file(&self) -> bool {
        matches!(self, Entry::File(_))
    }

    /// Identity comparison, entries of different kinds are never the same.
    pub async fn is_same_entry(&self, other: &Entry<D>) -> Result<bool, BackendError> {
        match (self, other) {
            (Entry::Directory(a), Entry::Directory(b)) => a.is_same_entry(b).await,
            (Entry::File(a), Entry::File(b)) => a.is_same_entry(b).await,
            _ => Ok(false),
        }
    }
}

impl<D: DirectoryHandle> Clone for Entry<D> {
    fn clone(&self) -> Self {
        match self {
            Entry::Directory(dir) => Entry::Directory(dir.clone()),
            Entry::File(file) => Entry::File(file.clone()),
        }
    }
}

impl<D: DirectoryHandle> std::fmt::Debug for Entry<D> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Entry::Directory(_) => f.write_str("Entry::Directory"),
            Entry::File(_) => f.write_str("Entry::File"),
        }
    }
}
