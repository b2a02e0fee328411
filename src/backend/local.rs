//! Backend over a directory of the host filesystem. Writable streams stage their data in a swap
//! file beside the target and rename it into place on close, so readers never observe a partial
//! write.

use std::io::{ErrorKind, SeekFrom};
use std::sync::atomic::{AtomicUsize, Ordering};

use async_std::fs::{self, File, OpenOptions};
use async_std::path::{Path, PathBuf};
use async_trait::async_trait;
use futures::{AsyncSeekExt, AsyncWriteExt, StreamExt};
use tracing::{debug, instrument, trace, warn, Level};

use crate::backend::{
    validate_name, BackendError, DirectoryHandle, Entry, FileHandle, WritableOptions,
    WritableStream,
};

const SWAP_SUFFIX: &str = ".dirnav-swap";

static SWAP_COUNTER: AtomicUsize = AtomicUsize::new(0);

#[derive(Clone, Debug)]
pub struct LocalDirectory {
    path: PathBuf,
}

impl LocalDirectory {
    /// Use an existing host directory as a handle.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self, BackendError> {
        let path = path.as_ref();
        let display_name = path.display().to_string();

        let path = fs::canonicalize(path)
            .await
            .map_err(|err| io_error(&display_name, err))?;

        let metadata = fs::metadata(&path)
            .await
            .map_err(|err| io_error(&display_name, err))?;

        if !metadata.is_dir() {
            return Err(BackendError::TypeMismatch(display_name));
        }

        Ok(Self { path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Open (creating when needed) the per-user data directory of an application, the usual
    /// place to root a navigator for persistent local storage.
    pub async fn project_data(
        qualifier: &str,
        organization: &str,
        application: &str,
    ) -> Result<Self, BackendError> {
        let project_dirs = directories::ProjectDirs::from(qualifier, organization, application)
            .ok_or_else(|| {
                BackendError::Implementation("unable to determine a home directory".to_string())
            })?;

        let data_dir = Path::new(project_dirs.data_dir().as_os_str());
        fs::create_dir_all(data_dir).await?;
        debug!(path = ?data_dir, "local::project_data::opened");

        Self::open(data_dir).await
    }
}

#[async_trait(?Send)]
impl DirectoryHandle for LocalDirectory {
    type File = LocalFile;

    #[instrument(level = Level::TRACE, skip(self))]
    async fn directory(&self, name: &str, create: bool) -> Result<Self, BackendError> {
        validate_name(name)?;
        let child_path = self.path.join(name);

        match fs::metadata(&child_path).await {
            Ok(metadata) if metadata.is_dir() => {}
            Ok(_) => return Err(BackendError::TypeMismatch(name.to_string())),
            Err(err) if err.kind() == ErrorKind::NotFound && create => {
                trace!(path = ?child_path, "local::directory::creating");
                fs::create_dir(&child_path)
                    .await
                    .map_err(|err| io_error(name, err))?;
            }
            Err(err) => return Err(io_error(name, err)),
        }

        Ok(Self { path: child_path })
    }

    #[instrument(level = Level::TRACE, skip(self))]
    async fn file(&self, name: &str, create: bool) -> Result<LocalFile, BackendError> {
        validate_name(name)?;
        let child_path = self.path.join(name);

        match fs::metadata(&child_path).await {
            Ok(metadata) if metadata.is_file() => {}
            Ok(_) => return Err(BackendError::TypeMismatch(name.to_string())),
            Err(err) if err.kind() == ErrorKind::NotFound && create => {
                trace!(path = ?child_path, "local::file::creating");
                OpenOptions::new()
                    .write(true)
                    .create(true)
                    .open(&child_path)
                    .await
                    .map_err(|err| io_error(name, err))?;
            }
            Err(err) => return Err(io_error(name, err)),
        }

        Ok(LocalFile { path: child_path })
    }

    #[instrument(level = Level::TRACE, skip_all)]
    async fn entries(&self) -> Result<Vec<(String, Entry<Self>)>, BackendError> {
        let mut read_dir = fs::read_dir(&self.path).await?;
        let mut entries = Vec::new();

        while let Some(dir_entry) = read_dir.next().await {
            let dir_entry = dir_entry?;
            let name = dir_entry.file_name().to_string_lossy().into_owned();

            // In-flight writes from this backend
            if name.ends_with(SWAP_SUFFIX) {
                continue;
            }

            let path = dir_entry.path();
            let file_type = dir_entry.file_type().await?;

            let entry = if file_type.is_dir() {
                Entry::Directory(LocalDirectory { path })
            } else {
                Entry::File(LocalFile { path })
            };

            entries.push((name, entry));
        }

        // Host enumeration order is arbitrary, keep it stable for callers
        entries.sort_by(|(a, _), (b, _)| a.cmp(b));

        Ok(entries)
    }

    #[instrument(level = Level::TRACE, skip_all)]
    async fn is_same_entry(&self, other: &Self) -> Result<bool, BackendError> {
        same_path(&self.path, &other.path).await
    }

    #[instrument(level = Level::TRACE, skip_all)]
    async fn resolve(&self, entry: &Entry<Self>) -> Result<Option<Vec<String>>, BackendError> {
        let entry_path = match entry {
            Entry::Directory(dir) => &dir.path,
            Entry::File(file) => &file.path,
        };

        let (base, target) = match (canonical(&self.path).await?, canonical(entry_path).await?) {
            (Some(base), Some(target)) => (base, target),
            _ => return Ok(None),
        };

        let relative = match target.strip_prefix(&base) {
            Ok(relative) => relative,
            Err(_) => return Ok(None),
        };

        let names = relative
            .components()
            .map(|component| component.as_os_str().to_string_lossy().into_owned())
            .collect();

        Ok(Some(names))
    }
}

#[derive(Clone, Debug)]
pub struct LocalFile {
    path: PathBuf,
}

impl LocalFile {
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn name(&self) -> String {
        self.path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default()
    }
}

#[async_trait(?Send)]
impl FileHandle for LocalFile {
    type Reader = File;
    type Writable = LocalWritable;

    #[instrument(level = Level::TRACE, skip_all)]
    async fn is_same_entry(&self, other: &Self) -> Result<bool, BackendError> {
        same_path(&self.path, &other.path).await
    }

    async fn reader(&self) -> Result<File, BackendError> {
        File::open(&self.path)
            .await
            .map_err(|err| io_error(&self.name(), err))
    }

    async fn size(&self) -> Result<u64, BackendError> {
        let metadata = fs::metadata(&self.path)
            .await
            .map_err(|err| io_error(&self.name(), err))?;

        Ok(metadata.len())
    }

    #[instrument(level = Level::TRACE, skip(self))]
    async fn writable(&self, options: WritableOptions) -> Result<LocalWritable, BackendError> {
        let name = self.name();
        let swap_id = SWAP_COUNTER.fetch_add(1, Ordering::Relaxed);
        let swap_path = self.path.with_file_name(format!(
            ".{name}.{}-{swap_id}{SWAP_SUFFIX}",
            std::process::id()
        ));

        let opened = async {
            if options.keep_existing_data {
                fs::copy(&self.path, &swap_path).await?;
            }

            OpenOptions::new()
                .write(true)
                .create(true)
                .truncate(!options.keep_existing_data)
                .open(&swap_path)
                .await
        }
        .await;

        let file = match opened {
            Ok(file) => file,
            Err(err) => {
                discard_swap(&swap_path).await;
                return Err(io_error(&name, err));
            }
        };

        trace!(swap = ?swap_path, "local::writable::opened");

        Ok(LocalWritable {
            file: Some(file),
            swap_path,
            target_path: self.path.clone(),
            committed: false,
        })
    }
}

/// Stream into a swap file next to the target. The swap file is removed again unless `close`
/// managed to rename it over the target, including when the stream is dropped unclosed.
pub struct LocalWritable {
    file: Option<File>,
    swap_path: PathBuf,
    target_path: PathBuf,
    committed: bool,
}

impl LocalWritable {
    fn file(&mut self) -> Result<&mut File, BackendError> {
        self.file
            .as_mut()
            .ok_or_else(|| BackendError::Implementation("writable already closed".to_string()))
    }
}

impl Drop for LocalWritable {
    fn drop(&mut self) {
        if self.committed {
            return;
        }

        // Windows refuses to remove files with open handles
        self.file.take();

        if let Err(err) = std::fs::remove_file(self.swap_path.as_os_str()) {
            if err.kind() != ErrorKind::NotFound {
                warn!(swap = ?self.swap_path, "local::writable::swap_cleanup_failed: {err}");
            }
        }
    }
}

#[async_trait(?Send)]
impl WritableStream for LocalWritable {
    async fn close(mut self) -> Result<(), BackendError> {
        if let Some(mut file) = self.file.take() {
            file.flush().await?;
            file.sync_all().await?;
        }

        fs::rename(&self.swap_path, &self.target_path).await?;
        self.committed = true;
        trace!(target = ?self.target_path, "local::writable::committed");

        Ok(())
    }

    async fn seek(&mut self, position: u64) -> Result<(), BackendError> {
        self.file()?.seek(SeekFrom::Start(position)).await?;
        Ok(())
    }

    async fn write(&mut self, data: &[u8]) -> Result<(), BackendError> {
        self.file()?.write_all(data).await?;
        Ok(())
    }
}

async fn discard_swap(swap_path: &Path) {
    if let Err(err) = fs::remove_file(swap_path).await {
        if err.kind() != ErrorKind::NotFound {
            warn!(swap = ?swap_path, "local::writable::swap_cleanup_failed: {err}");
        }
    }
}

async fn canonical(path: &Path) -> Result<Option<PathBuf>, BackendError> {
    match fs::canonicalize(path).await {
        Ok(path) => Ok(Some(path)),
        Err(err) if err.kind() == ErrorKind::NotFound => Ok(None),
        Err(err) => Err(BackendError::Io(err)),
    }
}

fn io_error(name: &str, err: std::io::Error) -> BackendError {
    match err.kind() {
        ErrorKind::NotFound => BackendError::NotFound(name.to_string()),
        ErrorKind::PermissionDenied => BackendError::PermissionDenied(name.to_string()),
        _ => BackendError::Io(err),
    }
}

async fn same_path(a: &Path, b: &Path) -> Result<bool, BackendError> {
    match (canonical(a).await?, canonical(b).await?) {
        (Some(a), Some(b)) => Ok(a == b),
        _ => Ok(false),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use futures::AsyncReadExt;
    use rand::Rng;

    struct ScratchDir(std::path::PathBuf);

    impl ScratchDir {
        fn new() -> Self {
            let suffix: u64 = rand::thread_rng().gen();
            let path = std::env::temp_dir().join(format!("dirnav-local-{suffix:016x}"));
            std::fs::create_dir_all(&path).unwrap();
            Self(path)
        }
    }

    impl Drop for ScratchDir {
        fn drop(&mut self) {
            let _ = std::fs::remove_dir_all(&self.0);
        }
    }

    async fn read_all(file: &LocalFile) -> Vec<u8> {
        let mut reader = file.reader().await.unwrap();
        let mut content = Vec::new();
        reader.read_to_end(&mut content).await.unwrap();
        content
    }

    #[tokio::test]
    async fn test_directory_walk_and_creation() {
        let scratch = ScratchDir::new();
        let root = LocalDirectory::open(scratch.0.as_os_str()).await.unwrap();

        assert!(matches!(
            root.directory("missing", false).await,
            Err(BackendError::NotFound(name)) if name == "missing"
        ));

        let created = root.directory("dir_1", true).await.unwrap();
        let found = root.directory("dir_1", false).await.unwrap();
        assert!(created.is_same_entry(&found).await.unwrap());
        assert!(!created.is_same_entry(&root).await.unwrap());
        assert!(scratch.0.join("dir_1").is_dir());

        root.file("file_1", true).await.unwrap();
        assert!(matches!(
            root.directory("file_1", false).await,
            Err(BackendError::TypeMismatch(_))
        ));
        assert!(matches!(
            root.file("a/b", true).await,
            Err(BackendError::InvalidName(_))
        ));
    }

    #[tokio::test]
    async fn test_swap_file_writes() {
        let scratch = ScratchDir::new();
        let root = LocalDirectory::open(scratch.0.as_os_str()).await.unwrap();
        let file = root.file("notes.txt", true).await.unwrap();

        let mut writable = file.writable(WritableOptions::default()).await.unwrap();
        writable.write(b"hello world").await.unwrap();

        // Not visible until committed, and the swap file stays out of listings
        assert!(read_all(&file).await.is_empty());
        let names: Vec<_> = root
            .entries()
            .await
            .unwrap()
            .into_iter()
            .map(|(name, _)| name)
            .collect();
        assert_eq!(names, vec!["notes.txt".to_string()]);

        writable.close().await.unwrap();
        assert_eq!(read_all(&file).await, b"hello world");

        let mut writable = file
            .writable(WritableOptions::keep_existing_data())
            .await
            .unwrap();
        writable.seek(file.size().await.unwrap()).await.unwrap();
        writable.write(b"!").await.unwrap();
        writable.close().await.unwrap();
        assert_eq!(read_all(&file).await, b"hello world!");
    }

    fn host_listing(scratch: &ScratchDir) -> Vec<String> {
        let mut names: Vec<_> = std::fs::read_dir(&scratch.0)
            .unwrap()
            .map(|entry| entry.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        names.sort();
        names
    }

    #[tokio::test]
    async fn test_swap_file_removed_without_commit() {
        let scratch = ScratchDir::new();
        let root = LocalDirectory::open(scratch.0.as_os_str()).await.unwrap();
        let file = root.file("f", true).await.unwrap();

        let mut writable = file.writable(WritableOptions::default()).await.unwrap();
        writable.write(b"abandoned").await.unwrap();
        assert_eq!(host_listing(&scratch).len(), 2);

        drop(writable);
        assert_eq!(host_listing(&scratch), vec!["f".to_string()]);
        assert!(read_all(&file).await.is_empty());

        // A rename that can't replace the target leaves nothing behind either
        let mut writable = file
            .writable(WritableOptions::keep_existing_data())
            .await
            .unwrap();
        writable.write(b"lost").await.unwrap();

        std::fs::remove_file(scratch.0.join("f")).unwrap();
        std::fs::create_dir(scratch.0.join("f")).unwrap();
        std::fs::write(scratch.0.join("f").join("occupied"), b"").unwrap();

        assert!(writable.close().await.is_err());
        assert_eq!(host_listing(&scratch), vec!["f".to_string()]);
    }

    #[tokio::test]
    async fn test_reverse_resolution() {
        let scratch = ScratchDir::new();
        let root = LocalDirectory::open(scratch.0.as_os_str()).await.unwrap();

        let nested = root
            .directory("a", true)
            .await
            .unwrap()
            .directory("b", true)
            .await
            .unwrap();
        let file = nested.file("c.txt", true).await.unwrap();

        let resolved = root.resolve(&Entry::File(file)).await.unwrap();
        assert_eq!(
            resolved.unwrap(),
            vec!["a".to_string(), "b".to_string(), "c.txt".to_string()]
        );

        assert!(nested
            .resolve(&Entry::Directory(root.clone()))
            .await
            .unwrap()
            .is_none());
    }
}
