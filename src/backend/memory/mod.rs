//! A backend that keeps the whole tree in memory. Useful as scratch space and for exercising the
//! navigator, every lookup and stream is recorded in [`MemoryMetrics`] so callers can see exactly
//! which handles were asked for what.

mod inner;

use std::sync::Arc;

use async_std::sync::RwLock;
use async_trait::async_trait;
use futures::io::Cursor;
use tracing::{instrument, trace, Level};

use crate::backend::{
    validate_name, BackendError, DirectoryHandle, Entry, FileHandle, WritableOptions,
    WritableStream,
};

pub(crate) use inner::{MemoryInner, MemoryNodeKind};

pub type NodeId = usize;

/// Owner of an in-memory tree. Cloning shares the same tree.
#[derive(Clone)]
pub struct MemoryTree {
    inner: Arc<RwLock<MemoryInner>>,
}

impl MemoryTree {
    pub async fn metrics(&self) -> MemoryMetrics {
        self.inner.read().await.metrics.clone()
    }

    pub fn new() -> Self {
        Self {
            inner: Arc::new(RwLock::new(MemoryInner::initialize())),
        }
    }

    pub async fn reset_metrics(&self) {
        self.inner.write().await.metrics = MemoryMetrics::default();
    }

    pub async fn root(&self) -> MemoryDirectory {
        let root_id = self.inner.read().await.root_id;

        MemoryDirectory {
            inner: self.inner.clone(),
            node_id: root_id,
        }
    }

    /// Limit the size any single file may reach, writes past the limit fail. `None` removes the
    /// limit.
    pub async fn set_quota(&self, quota: Option<usize>) {
        self.inner.write().await.quota = quota;
    }
}

impl Default for MemoryTree {
    fn default() -> Self {
        Self::new()
    }
}

/// Record of the calls made against a [`MemoryTree`].
#[derive(Clone, Debug, Default)]
pub struct MemoryMetrics {
    /// Every child directory request as `(parent node, name)`, in call order.
    pub directory_lookups: Vec<(NodeId, String)>,

    /// Every child file request as `(parent node, name)`, in call order.
    pub file_lookups: Vec<(NodeId, String)>,

    pub bytes_written: usize,
    pub writables_closed: usize,
    pub writables_opened: usize,
}

#[derive(Clone)]
pub struct MemoryDirectory {
    inner: Arc<RwLock<MemoryInner>>,
    node_id: NodeId,
}

impl MemoryDirectory {
    pub fn id(&self) -> NodeId {
        self.node_id
    }

    fn same_tree(&self, other: &Arc<RwLock<MemoryInner>>) -> bool {
        Arc::ptr_eq(&self.inner, other)
    }
}

impl std::fmt::Debug for MemoryDirectory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "MemoryDirectory({})", self.node_id)
    }
}

#[async_trait(?Send)]
impl DirectoryHandle for MemoryDirectory {
    type File = MemoryFile;

    #[instrument(level = Level::TRACE, skip(self))]
    async fn directory(&self, name: &str, create: bool) -> Result<Self, BackendError> {
        validate_name(name)?;

        let mut inner_write = self.inner.write().await;
        inner_write
            .metrics
            .directory_lookups
            .push((self.node_id, name.to_string()));

        let node_id = inner_write.child_or_insert(
            self.node_id,
            name,
            create,
            MemoryNodeKind::empty_directory,
        )?;

        if !matches!(
            inner_write.node(node_id)?.kind,
            MemoryNodeKind::Directory { .. }
        ) {
            return Err(BackendError::TypeMismatch(name.to_string()));
        }

        trace!(node_id, "memory::directory::found");

        Ok(Self {
            inner: self.inner.clone(),
            node_id,
        })
    }

    #[instrument(level = Level::TRACE, skip(self))]
    async fn file(&self, name: &str, create: bool) -> Result<MemoryFile, BackendError> {
        validate_name(name)?;

        let mut inner_write = self.inner.write().await;
        inner_write
            .metrics
            .file_lookups
            .push((self.node_id, name.to_string()));

        let node_id =
            inner_write.child_or_insert(self.node_id, name, create, MemoryNodeKind::empty_file)?;

        if !matches!(inner_write.node(node_id)?.kind, MemoryNodeKind::File { .. }) {
            return Err(BackendError::TypeMismatch(name.to_string()));
        }

        trace!(node_id, "memory::file::found");

        Ok(MemoryFile {
            inner: self.inner.clone(),
            node_id,
        })
    }

    #[instrument(level = Level::TRACE, skip_all)]
    async fn entries(&self) -> Result<Vec<(String, Entry<Self>)>, BackendError> {
        let inner_read = self.inner.read().await;

        let mut entries = Vec::new();
        for (name, child_id) in inner_read.children(self.node_id)? {
            let entry = match inner_read.node(*child_id)?.kind {
                MemoryNodeKind::Directory { .. } => Entry::Directory(MemoryDirectory {
                    inner: self.inner.clone(),
                    node_id: *child_id,
                }),
                MemoryNodeKind::File { .. } => Entry::File(MemoryFile {
                    inner: self.inner.clone(),
                    node_id: *child_id,
                }),
            };

            entries.push((name.clone(), entry));
        }

        Ok(entries)
    }

    #[instrument(level = Level::TRACE, skip_all)]
    async fn is_same_entry(&self, other: &Self) -> Result<bool, BackendError> {
        Ok(self.same_tree(&other.inner) && self.node_id == other.node_id)
    }

    #[instrument(level = Level::TRACE, skip_all)]
    async fn resolve(&self, entry: &Entry<Self>) -> Result<Option<Vec<String>>, BackendError> {
        let (entry_inner, entry_id) = match entry {
            Entry::Directory(dir) => (&dir.inner, dir.node_id),
            Entry::File(file) => (&file.inner, file.node_id),
        };

        if !self.same_tree(entry_inner) {
            return Ok(None);
        }

        let inner_read = self.inner.read().await;
        Ok(inner_read.path_between(self.node_id, entry_id))
    }
}

#[derive(Clone)]
pub struct MemoryFile {
    inner: Arc<RwLock<MemoryInner>>,
    node_id: NodeId,
}

impl MemoryFile {
    pub fn id(&self) -> NodeId {
        self.node_id
    }

    /// Number of writable streams currently open on this file.
    pub async fn open_writables(&self) -> Result<usize, BackendError> {
        match self.inner.read().await.node(self.node_id)?.kind {
            MemoryNodeKind::File { open_writables, .. } => Ok(open_writables),
            MemoryNodeKind::Directory { .. } => Err(not_a_file(self.node_id)),
        }
    }
}

impl std::fmt::Debug for MemoryFile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "MemoryFile({})", self.node_id)
    }
}

#[async_trait(?Send)]
impl FileHandle for MemoryFile {
    type Reader = Cursor<Vec<u8>>;
    type Writable = MemoryWritable;

    #[instrument(level = Level::TRACE, skip_all)]
    async fn is_same_entry(&self, other: &Self) -> Result<bool, BackendError> {
        Ok(Arc::ptr_eq(&self.inner, &other.inner) && self.node_id == other.node_id)
    }

    async fn reader(&self) -> Result<Self::Reader, BackendError> {
        match &self.inner.read().await.node(self.node_id)?.kind {
            MemoryNodeKind::File { content, .. } => Ok(Cursor::new(content.clone())),
            MemoryNodeKind::Directory { .. } => Err(not_a_file(self.node_id)),
        }
    }

    async fn size(&self) -> Result<u64, BackendError> {
        match &self.inner.read().await.node(self.node_id)?.kind {
            MemoryNodeKind::File { content, .. } => Ok(content.len() as u64),
            MemoryNodeKind::Directory { .. } => Err(not_a_file(self.node_id)),
        }
    }

    #[instrument(level = Level::TRACE, skip(self))]
    async fn writable(&self, options: WritableOptions) -> Result<MemoryWritable, BackendError> {
        let mut inner_write = self.inner.write().await;
        let quota = inner_write.quota;

        let buffer = match &mut inner_write.node_mut(self.node_id)?.kind {
            MemoryNodeKind::File {
                content,
                open_writables,
            } => {
                *open_writables += 1;

                if options.keep_existing_data {
                    content.clone()
                } else {
                    Vec::new()
                }
            }
            MemoryNodeKind::Directory { .. } => return Err(not_a_file(self.node_id)),
        };

        inner_write.metrics.writables_opened += 1;

        Ok(MemoryWritable {
            inner: self.inner.clone(),
            node_id: self.node_id,
            buffer,
            position: 0,
            quota,
        })
    }
}

/// Stages writes in a private buffer and swaps it in as the file content on close.
pub struct MemoryWritable {
    inner: Arc<RwLock<MemoryInner>>,
    node_id: NodeId,
    buffer: Vec<u8>,
    position: usize,
    quota: Option<usize>,
}

#[async_trait(?Send)]
impl WritableStream for MemoryWritable {
    async fn close(self) -> Result<(), BackendError> {
        let mut inner_write = self.inner.write().await;
        inner_write.metrics.writables_closed += 1;

        match &mut inner_write.node_mut(self.node_id)?.kind {
            MemoryNodeKind::File {
                content,
                open_writables,
            } => {
                *open_writables = open_writables.saturating_sub(1);
                *content = self.buffer;
            }
            MemoryNodeKind::Directory { .. } => return Err(not_a_file(self.node_id)),
        }

        trace!(node_id = self.node_id, "memory::writable::committed");

        Ok(())
    }

    async fn seek(&mut self, position: u64) -> Result<(), BackendError> {
        self.position = usize::try_from(position)
            .map_err(|_| BackendError::Implementation(format!("seek past addressable memory: {position}")))?;

        Ok(())
    }

    async fn write(&mut self, data: &[u8]) -> Result<(), BackendError> {
        let end = self.position.checked_add(data.len()).ok_or_else(|| {
            BackendError::Implementation(format!(
                "write of {} bytes at {} overflows the file size",
                data.len(),
                self.position
            ))
        })?;

        if let Some(quota) = self.quota {
            if end > quota {
                return Err(BackendError::Io(std::io::Error::new(
                    std::io::ErrorKind::Other,
                    format!("write would grow file to {end} bytes, quota is {quota}"),
                )));
            }
        }

        if self.buffer.len() < end {
            self.buffer.resize(end, 0);
        }

        self.buffer[self.position..end].copy_from_slice(data);
        self.position = end;

        self.inner.write().await.metrics.bytes_written += data.len();

        Ok(())
    }
}

fn not_a_file(node_id: NodeId) -> BackendError {
    BackendError::Implementation(format!("node {node_id} is not a file"))
}
