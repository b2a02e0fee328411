mod error;
mod locator;

pub use error::NavigatorError;
pub use locator::Locator;

use error::settle;

use std::cell::RefCell;
use std::future::Future;

use async_recursion::async_recursion;
use futures::future::join_all;
use futures::{AsyncRead, AsyncReadExt};
use tracing::{debug, instrument, trace, Level};

use crate::backend::{
    BackendError, DirectoryHandle, Entry, FileHandle, WritableOptions, WritableStream,
};
use crate::path::{self, Segments, ROOT_SENTINEL};

/// Size of the chunks moved from a reader into a writable while copying file content.
pub const COPY_CHUNK_SIZE: usize = 64 * 1024;

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct WriteOptions {
    /// Position the stream at the end of the existing content before writing. Implies
    /// `keep_existing_data`.
    pub append: bool,

    /// Start from the existing content rather than an empty file. Without `append` the new
    /// content overwrites the beginning of the file.
    pub keep_existing_data: bool,
}

impl WriteOptions {
    pub fn append() -> Self {
        Self {
            append: true,
            keep_existing_data: true,
        }
    }
}

/// Tracks a current working directory on top of a root directory handle and resolves POSIX style
/// paths against it.
///
/// The handle of the current directory is kept alongside its absolute path. Walks to anything at
/// or below the current directory start from that handle, everything else is walked from the
/// root.
///
/// The navigator does no locking of its own. Changing directory while another walk is in flight
/// on the same navigator is allowed but which directory that walk starts from is unspecified;
/// callers needing a consistent view across several calls have to serialize them.
pub struct Navigator<D: DirectoryHandle> {
    root: D,
    working_directory: RefCell<WorkingDirectory<D>>,
}

struct WorkingDirectory<D> {
    handle: D,
    path: Segments,
}

impl<D: DirectoryHandle> Navigator<D> {
    pub fn new(root: D) -> Self {
        let working_directory = WorkingDirectory {
            handle: root.clone(),
            path: Segments::root(),
        };

        Self {
            root,
            working_directory: RefCell::new(working_directory),
        }
    }

    /// Resolve `path` against the current working directory into an absolute, normalized path.
    /// Traversing above the root stops at the root.
    pub fn absolute(&self, path: impl Into<Segments>) -> Segments {
        let relative = path.into();
        let working_path = self.working_directory.borrow().path.clone();

        path::resolve(&[working_path, relative])
    }

    /// Like [`Navigator::absolute`] but refuses paths ending up outside the current working
    /// directory. Relative paths may not step above it at any point, even when they come back
    /// into it later. Escapes are reported as [`NavigatorError::InvalidTraversal`].
    pub fn absolute_within(&self, path: impl Into<Segments>) -> Result<Segments, NavigatorError> {
        let requested = path.into();
        let working_path = self.working_directory.borrow().path.clone();

        if requested.is_absolute() {
            let target = path::normalize(requested.as_slice(), false);
            if !target.starts_with(&working_path) {
                return Err(NavigatorError::InvalidTraversal(requested.to_string()));
            }

            return Ok(target);
        }

        let relative = path::try_normalize(requested.as_slice())?;
        Ok(path::resolve(&[working_path, relative]))
    }

    #[instrument(level = Level::DEBUG, skip_all)]
    pub async fn cd(&self, path: impl Into<Segments>) -> Result<(), NavigatorError> {
        let target = self.absolute(path);
        debug!(target = %target, "navigator::cd");

        let handle = self.walk_directory(&target, false).await?;

        // Both halves at once, the walk origin check relies on them describing the same entry
        *self.working_directory.borrow_mut() = WorkingDirectory {
            handle,
            path: target,
        };

        Ok(())
    }

    /// Copy every entry below `src` into `dst`, creating `dst` and anything missing below it.
    /// Siblings are copied concurrently. When `dst` lives inside `src` it is skipped during the
    /// walk so the copy never recurses into itself.
    #[instrument(level = Level::DEBUG, skip_all)]
    pub async fn copy_directory(
        &self,
        src: impl Into<Locator<D>>,
        dst: impl Into<Locator<D>>,
    ) -> Result<(), NavigatorError> {
        let source = self.directory_handle(src.into(), false).await?;
        let destination = self.directory_handle(dst.into(), true).await?;

        if source.is_same_entry(&destination).await? {
            debug!("navigator::copy_directory::same_entry");
            return Ok(());
        }

        mirror_directory(&source, &destination, &destination).await
    }

    /// Replace the content of `dst` with the content of `src`, creating `dst` when needed.
    /// Copying a file onto itself does nothing.
    #[instrument(level = Level::DEBUG, skip_all)]
    pub async fn copy_file(
        &self,
        src: impl Into<Locator<D::File>>,
        dst: impl Into<Locator<D::File>>,
    ) -> Result<(), NavigatorError> {
        let source = self.file_handle(src.into(), false).await?;
        let destination = self.file_handle(dst.into(), true).await?;

        if source.is_same_entry(&destination).await? {
            debug!("navigator::copy_file::same_entry");
            return Ok(());
        }

        copy_contents(&source, &destination).await
    }

    #[instrument(level = Level::DEBUG, skip(self, path))]
    pub async fn get_directory(
        &self,
        path: impl Into<Segments>,
        create: bool,
    ) -> Result<D, NavigatorError> {
        let target = self.absolute(path);
        debug!(target = %target, "navigator::get_directory");
        self.walk_directory(&target, create).await
    }

    #[instrument(level = Level::DEBUG, skip(self, path))]
    pub async fn get_file(
        &self,
        path: impl Into<Segments>,
        create: bool,
    ) -> Result<D::File, NavigatorError> {
        let target = self.absolute(path);
        debug!(target = %target, "navigator::get_file");
        self.walk_file(&target, create).await
    }

    #[instrument(level = Level::DEBUG, skip_all)]
    pub async fn ls(
        &self,
        target: impl Into<Locator<D>>,
    ) -> Result<Vec<(String, Entry<D>)>, NavigatorError> {
        let directory = self.directory_handle(target.into(), false).await?;
        let entries = directory.entries().await?;
        debug!(count = entries.len(), "navigator::ls");

        Ok(entries)
    }

    /// List the entries of a directory that pass `filter`. The filter runs for every entry
    /// concurrently, the surviving entries keep their enumeration order.
    #[instrument(level = Level::DEBUG, skip_all)]
    pub async fn ls_filtered<F, Fut>(
        &self,
        target: impl Into<Locator<D>>,
        filter: F,
    ) -> Result<Vec<(String, Entry<D>)>, NavigatorError>
    where
        F: Fn(String, Entry<D>) -> Fut,
        Fut: Future<Output = Result<bool, NavigatorError>>,
    {
        let entries = self.ls(target).await?;

        let checks = entries
            .iter()
            .map(|(name, entry)| filter(name.clone(), entry.clone()));
        let verdicts = settle(join_all(checks).await)?;

        let filtered = entries
            .into_iter()
            .zip(verdicts)
            .filter_map(|(entry, keep)| keep.then_some(entry))
            .collect();

        Ok(filtered)
    }

    /// The current working directory rendered as a string.
    pub fn pwd(&self) -> String {
        self.working_directory.borrow().path.to_string()
    }

    #[instrument(level = Level::DEBUG, skip_all)]
    pub async fn read(&self, target: impl Into<Locator<D::File>>) -> Result<Vec<u8>, NavigatorError> {
        let file = self.file_handle(target.into(), false).await?;
        let mut reader = file.reader().await?;

        let mut content = Vec::new();
        reader
            .read_to_end(&mut content)
            .await
            .map_err(BackendError::Io)?;
        debug!(byte_count = content.len(), "navigator::read");

        Ok(content)
    }

    pub async fn read_to_string(
        &self,
        target: impl Into<Locator<D::File>>,
    ) -> Result<String, NavigatorError> {
        let content = self.read(target).await?;
        Ok(String::from_utf8(content)?)
    }

    /// Absolute path of a path or handle. Paths are resolved against the working directory,
    /// handles are looked up from the root and fail with [`NavigatorError::NotFound`] when they
    /// can't be reached from it.
    #[instrument(level = Level::DEBUG, skip_all)]
    pub async fn resolve(
        &self,
        target: impl Into<Locator<Entry<D>>>,
    ) -> Result<String, NavigatorError> {
        match target.into() {
            Locator::Path(path) => Ok(self.absolute(path).to_string()),
            Locator::Handle(entry) => {
                let names = self.root.resolve(&entry).await?.ok_or_else(|| {
                    NavigatorError::NotFound("handle is not reachable from the root".to_string())
                })?;

                let mut segments = Vec::with_capacity(names.len() + 1);
                segments.push(ROOT_SENTINEL.to_string());
                segments.extend(names);

                let resolved = Segments::from(segments).to_string();
                debug!(resolved = %resolved, "navigator::resolve::handle");

                Ok(resolved)
            }
        }
    }

    pub fn root(&self) -> &D {
        &self.root
    }

    /// Handle of the current working directory.
    pub fn working_directory(&self) -> D {
        self.working_directory.borrow().handle.clone()
    }

    /// Write `content` into a file, creating it and any missing parent directories. The
    /// writable stream is closed whether or not the write succeeded.
    #[instrument(level = Level::DEBUG, skip_all)]
    pub async fn write(
        &self,
        target: impl Into<Locator<D::File>>,
        content: impl AsRef<[u8]>,
        options: WriteOptions,
    ) -> Result<(), NavigatorError> {
        let file = self.file_handle(target.into(), true).await?;

        let writable_options = WritableOptions {
            keep_existing_data: options.append || options.keep_existing_data,
        };
        let mut writable = file.writable(writable_options).await?;

        let written = async {
            if options.append {
                let size = file.size().await?;
                writable.seek(size).await?;
            }

            writable.write(content.as_ref()).await
        }
        .await;

        let closed = writable.close().await;
        trace!(append = options.append, "navigator::write::closed");

        written?;
        closed?;

        Ok(())
    }

    async fn directory_handle(
        &self,
        target: Locator<D>,
        create: bool,
    ) -> Result<D, NavigatorError> {
        match target {
            Locator::Path(path) => self.get_directory(path, create).await,
            Locator::Handle(handle) => Ok(handle),
        }
    }

    async fn file_handle(
        &self,
        target: Locator<D::File>,
        create: bool,
    ) -> Result<D::File, NavigatorError> {
        match target {
            Locator::Path(path) => self.get_file(path, create).await,
            Locator::Handle(handle) => Ok(handle),
        }
    }

    /// Where a walk to the absolute `target` starts: the cached working directory handle when
    /// the target is at or below it, the root otherwise. Returns the handle and how many leading
    /// segments it already covers.
    fn walk_origin(&self, target: &Segments) -> (D, usize) {
        let working_directory = self.working_directory.borrow();

        if target.starts_with(&working_directory.path) {
            trace!(cwd = %working_directory.path, "navigator::walk_origin::working_directory");
            (
                working_directory.handle.clone(),
                working_directory.path.len(),
            )
        } else {
            trace!("navigator::walk_origin::root");
            // The root sentinel is satisfied by the root handle itself
            (self.root.clone(), 1)
        }
    }

    #[instrument(level = Level::TRACE, skip(self))]
    async fn walk_directory(&self, target: &Segments, create: bool) -> Result<D, NavigatorError> {
        let (mut current, covered) = self.walk_origin(target);

        for name in target.iter().skip(covered) {
            current = current.directory(name, create).await?;
        }

        Ok(current)
    }

    #[instrument(level = Level::TRACE, skip(self))]
    async fn walk_file(&self, target: &Segments, create: bool) -> Result<D::File, NavigatorError> {
        let name = target.leaf().ok_or(NavigatorError::UnexpectedEmptyPath)?;
        let parent = self.walk_directory(&target.parent(), create).await?;

        Ok(parent.file(name, create).await?)
    }
}

#[async_recursion(?Send)]
async fn mirror_directory<D: DirectoryHandle>(
    source: &D,
    destination: &D,
    original_destination: &D,
) -> Result<(), NavigatorError> {
    let entries = source.entries().await?;
    trace!(count = entries.len(), "navigator::mirror_directory::entries");

    let copies = entries.into_iter().map(|(name, entry)| async move {
        match entry {
            Entry::Directory(child) => {
                if child.is_same_entry(original_destination).await? {
                    debug!(name = %name, "navigator::mirror_directory::skipping_destination");
                    return Ok(());
                }

                let target = destination.directory(&name, true).await?;
                mirror_directory(&child, &target, original_destination).await
            }
            Entry::File(child) => {
                let target = destination.file(&name, true).await?;
                copy_contents(&child, &target).await
            }
        }
    });

    settle(join_all(copies).await)?;

    Ok(())
}

async fn copy_contents<F: FileHandle>(source: &F, destination: &F) -> Result<(), NavigatorError> {
    let mut reader = source.reader().await?;
    let mut writable = destination.writable(WritableOptions::default()).await?;

    let copied = pump(&mut reader, &mut writable).await;
    let closed = writable.close().await;

    let byte_count = copied?;
    closed?;
    trace!(byte_count, "navigator::copy_contents::complete");

    Ok(())
}

async fn pump<R, W>(reader: &mut R, writable: &mut W) -> Result<u64, BackendError>
where
    R: AsyncRead + Unpin,
    W: WritableStream,
{
    let mut buffer = vec![0u8; COPY_CHUNK_SIZE];
    let mut byte_count = 0u64;

    loop {
        let read = reader.read(&mut buffer).await?;
        if read == 0 {
            return Ok(byte_count);
        }

        writable.write(&buffer[..read]).await?;
        byte_count += read as u64;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::backend::memory::{MemoryDirectory, MemoryTree};

    #[cfg(target_arch = "wasm32")]
    use wasm_bindgen_test::*;

    async fn navigator() -> (MemoryTree, Navigator<MemoryDirectory>) {
        let tree = MemoryTree::new();
        let navigator = Navigator::new(tree.root().await);
        (tree, navigator)
    }

    #[cfg_attr(target_arch = "wasm32", wasm_bindgen_test(async))]
    #[cfg_attr(not(target_arch = "wasm32"), tokio::test)]
    async fn test_absolute_resolution() {
        let (_, navigator) = navigator().await;
        assert_eq!(navigator.absolute("a/../b").to_string(), "/b");
        assert_eq!(navigator.absolute("../../..").to_string(), "/");
        assert_eq!(navigator.absolute("").to_string(), "/");

        navigator.get_directory("/projects/dirnav", true).await.unwrap();
        navigator.cd("/projects/dirnav").await.unwrap();
        assert_eq!(navigator.absolute("src").to_string(), "/projects/dirnav/src");
        assert_eq!(navigator.absolute("..").to_string(), "/projects");
        assert_eq!(navigator.absolute("/etc").to_string(), "/etc");
        assert_eq!(navigator.absolute("").to_string(), "/projects/dirnav");
    }

    #[cfg_attr(target_arch = "wasm32", wasm_bindgen_test(async))]
    #[cfg_attr(not(target_arch = "wasm32"), tokio::test)]
    async fn test_walks_reuse_working_directory() {
        let (tree, navigator) = navigator().await;

        let projects = navigator.get_directory("/projects", true).await.unwrap();
        navigator.cd("projects").await.unwrap();
        tree.reset_metrics().await;

        navigator.get_directory("src/bin", true).await.unwrap();
        let metrics = tree.metrics().await;
        assert_eq!(metrics.directory_lookups.len(), 2);
        assert_eq!(metrics.directory_lookups[0], (projects.id(), "src".to_string()));

        // The working directory itself needs no lookups at all
        tree.reset_metrics().await;
        let same = navigator.get_directory(".", false).await.unwrap();
        assert!(same.is_same_entry(&projects).await.unwrap());
        assert!(tree.metrics().await.directory_lookups.is_empty());
    }

    #[cfg_attr(target_arch = "wasm32", wasm_bindgen_test(async))]
    #[cfg_attr(not(target_arch = "wasm32"), tokio::test)]
    async fn test_failed_cd_keeps_state() {
        let (_, navigator) = navigator().await;

        navigator.get_directory("/projects", true).await.unwrap();
        navigator.cd("/projects").await.unwrap();

        let err = navigator.cd("missing").await.unwrap_err();
        assert!(matches!(err, NavigatorError::NotFound(ref name) if name == "missing"));
        assert_eq!(navigator.pwd(), "/projects");

        navigator.write("/projects/file", b"data", WriteOptions::default()).await.unwrap();
        assert!(matches!(
            navigator.cd("file").await,
            Err(NavigatorError::Backend(BackendError::TypeMismatch(_)))
        ));
        assert_eq!(navigator.pwd(), "/projects");
    }

    #[cfg_attr(target_arch = "wasm32", wasm_bindgen_test(async))]
    #[cfg_attr(not(target_arch = "wasm32"), tokio::test)]
    async fn test_root_is_not_a_file() {
        let (_, navigator) = navigator().await;

        assert!(matches!(
            navigator.get_file("/", true).await,
            Err(NavigatorError::UnexpectedEmptyPath)
        ));
        assert!(matches!(
            navigator.get_file("..", true).await,
            Err(NavigatorError::UnexpectedEmptyPath)
        ));
    }

    #[cfg_attr(target_arch = "wasm32", wasm_bindgen_test(async))]
    #[cfg_attr(not(target_arch = "wasm32"), tokio::test)]
    async fn test_absolute_within_working_directory() {
        let (_, navigator) = navigator().await;
        navigator.get_directory("/projects/dirnav", true).await.unwrap();
        navigator.cd("/projects").await.unwrap();

        assert_eq!(
            navigator.absolute_within("dirnav/./src/..").unwrap().to_string(),
            "/projects/dirnav"
        );
        assert_eq!(navigator.absolute_within("").unwrap().to_string(), "/projects");
        assert_eq!(
            navigator.absolute_within("/projects/../projects/x").unwrap().to_string(),
            "/projects/x"
        );

        for escaping in ["..", "dirnav/../../etc", "../projects/dirnav", "/etc"] {
            assert!(
                matches!(
                    navigator.absolute_within(escaping),
                    Err(NavigatorError::InvalidTraversal(ref path)) if path == escaping
                ),
                "{escaping} was accepted"
            );
        }
    }

    #[cfg(not(target_arch = "wasm32"))]
    struct SpanNames(std::sync::Arc<std::sync::Mutex<Vec<String>>>);

    #[cfg(not(target_arch = "wasm32"))]
    impl<S: tracing::Subscriber> tracing_subscriber::Layer<S> for SpanNames {
        fn on_new_span(
            &self,
            attrs: &tracing::span::Attributes<'_>,
            _id: &tracing::span::Id,
            _ctx: tracing_subscriber::layer::Context<'_, S>,
        ) {
            self.0.lock().unwrap().push(attrs.metadata().name().to_string());
        }
    }

    #[cfg(not(target_arch = "wasm32"))]
    #[tokio::test]
    async fn test_public_operations_open_spans() {
        use tracing_subscriber::layer::SubscriberExt;

        let recorded = std::sync::Arc::new(std::sync::Mutex::new(Vec::new()));
        let subscriber = tracing_subscriber::registry().with(SpanNames(recorded.clone()));
        let _guard = tracing::subscriber::set_default(subscriber);

        let (_, navigator) = navigator().await;
        navigator.write("/a/b", b"x", WriteOptions::default()).await.unwrap();
        navigator.get_directory("/a", false).await.unwrap();
        navigator.get_file("/a/b", false).await.unwrap();
        navigator.ls("/a").await.unwrap();
        navigator.read("/a/b").await.unwrap();
        navigator.resolve("/a").await.unwrap();

        let recorded = recorded.lock().unwrap().clone();
        for operation in ["write", "get_directory", "get_file", "ls", "read", "resolve", "entries"] {
            assert!(
                recorded.iter().any(|name| name == operation),
                "no span for {operation} in {recorded:?}"
            );
        }
    }

    #[cfg_attr(target_arch = "wasm32", wasm_bindgen_test(async))]
    #[cfg_attr(not(target_arch = "wasm32"), tokio::test)]
    async fn test_write_closes_stream_on_failure() {
        let (tree, navigator) = navigator().await;
        navigator.write("/big", b"keep", WriteOptions::default()).await.unwrap();

        tree.set_quota(Some(8)).await;
        let err = navigator
            .write("/big", b"far too much content", WriteOptions::append())
            .await
            .unwrap_err();
        assert!(matches!(err, NavigatorError::Backend(BackendError::Io(_))));

        let metrics = tree.metrics().await;
        assert_eq!(metrics.writables_opened, 2);
        assert_eq!(metrics.writables_closed, 2);

        let file = navigator.get_file("/big", false).await.unwrap();
        assert_eq!(file.open_writables().await.unwrap(), 0);
    }
}
