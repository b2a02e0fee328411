//! Backend over the browser's origin-private file system. Handles here are thin wrappers around
//! the `FileSystemHandle` objects the browser hands out, every operation is a promise awaited
//! through `wasm-bindgen-futures`.

use async_trait::async_trait;
use futures::io::Cursor;
use js_sys::{Array, AsyncIterator, IteratorNext, Promise, Uint8Array};
use tracing::{instrument, trace, warn, Level};
use wasm_bindgen::{JsCast, JsValue};
use wasm_bindgen_futures::JsFuture;
use web_sys::{
    DomException, File, FileSystemCreateWritableOptions, FileSystemDirectoryHandle,
    FileSystemFileHandle, FileSystemGetDirectoryOptions, FileSystemGetFileOptions,
    FileSystemHandle, FileSystemHandleKind, FileSystemWritableFileStream, StorageManager,
    WorkerGlobalScope,
};

use crate::backend::{
    validate_name, BackendError, DirectoryHandle, Entry, FileHandle, WritableOptions,
    WritableStream,
};

#[derive(Clone, Debug)]
pub struct OpfsDirectory {
    handle: FileSystemDirectoryHandle,
}

impl OpfsDirectory {
    pub fn handle(&self) -> &FileSystemDirectoryHandle {
        &self.handle
    }

    /// The root of this origin's private file system, available from both windows and workers.
    pub async fn origin_root() -> Result<Self, BackendError> {
        let storage_manager = storage_manager()?;

        let root = settle(storage_manager.get_directory(), "origin root").await?;
        Ok(Self {
            handle: root.unchecked_into(),
        })
    }
}

impl From<FileSystemDirectoryHandle> for OpfsDirectory {
    fn from(handle: FileSystemDirectoryHandle) -> Self {
        Self { handle }
    }
}

#[async_trait(?Send)]
impl DirectoryHandle for OpfsDirectory {
    type File = OpfsFile;

    #[instrument(level = Level::TRACE, skip(self))]
    async fn directory(&self, name: &str, create: bool) -> Result<Self, BackendError> {
        validate_name(name)?;

        let options = FileSystemGetDirectoryOptions::new();
        options.set_create(create);

        let promise = self.handle.get_directory_handle_with_options(name, &options);
        let handle = settle(promise, name).await?;

        Ok(Self {
            handle: handle.unchecked_into(),
        })
    }

    #[instrument(level = Level::TRACE, skip(self))]
    async fn file(&self, name: &str, create: bool) -> Result<OpfsFile, BackendError> {
        validate_name(name)?;

        let options = FileSystemGetFileOptions::new();
        options.set_create(create);

        let promise = self.handle.get_file_handle_with_options(name, &options);
        let handle = settle(promise, name).await?;

        Ok(OpfsFile {
            handle: handle.unchecked_into(),
        })
    }

    #[instrument(level = Level::TRACE, skip_all)]
    async fn entries(&self) -> Result<Vec<(String, Entry<Self>)>, BackendError> {
        let iterator: AsyncIterator = self.handle.entries();
        let mut entries = Vec::new();

        loop {
            let next_promise = iterator.next().map_err(|err| js_failure("entries", err))?;
            let step: IteratorNext = settle(next_promise, "entries").await?.unchecked_into();

            if step.done() {
                break;
            }

            let pair = Array::from(&step.value());
            let name = match pair.get(0).as_string() {
                Some(name) => name,
                None => {
                    warn!("directory iterator produced an entry without a name");
                    continue;
                }
            };

            let handle: FileSystemHandle = pair.get(1).unchecked_into();
            let entry = match handle.kind() {
                FileSystemHandleKind::Directory => Entry::Directory(OpfsDirectory {
                    handle: handle.unchecked_into(),
                }),
                _ => Entry::File(OpfsFile {
                    handle: handle.unchecked_into(),
                }),
            };

            entries.push((name, entry));
        }

        Ok(entries)
    }

    #[instrument(level = Level::TRACE, skip_all)]
    async fn is_same_entry(&self, other: &Self) -> Result<bool, BackendError> {
        same_entry(&self.handle, &other.handle).await
    }

    #[instrument(level = Level::TRACE, skip_all)]
    async fn resolve(&self, entry: &Entry<Self>) -> Result<Option<Vec<String>>, BackendError> {
        let target: &FileSystemHandle = match entry {
            Entry::Directory(dir) => &dir.handle,
            Entry::File(file) => &file.handle,
        };

        let resolved = settle(self.handle.resolve(target), "resolve").await?;
        if resolved.is_null() || resolved.is_undefined() {
            return Ok(None);
        }

        let names = Array::from(&resolved)
            .iter()
            .filter_map(|name| name.as_string())
            .collect();

        Ok(Some(names))
    }
}

#[derive(Clone, Debug)]
pub struct OpfsFile {
    handle: FileSystemFileHandle,
}

impl OpfsFile {
    pub fn handle(&self) -> &FileSystemFileHandle {
        &self.handle
    }

    async fn snapshot(&self) -> Result<File, BackendError> {
        let file = settle(self.handle.get_file(), &self.handle.name()).await?;
        Ok(file.unchecked_into())
    }
}

#[async_trait(?Send)]
impl FileHandle for OpfsFile {
    type Reader = Cursor<Vec<u8>>;
    type Writable = OpfsWritable;

    #[instrument(level = Level::TRACE, skip_all)]
    async fn is_same_entry(&self, other: &Self) -> Result<bool, BackendError> {
        same_entry(&self.handle, &other.handle).await
    }

    async fn reader(&self) -> Result<Self::Reader, BackendError> {
        let file = self.snapshot().await?;
        let buffer = settle(file.array_buffer(), &self.handle.name()).await?;

        Ok(Cursor::new(Uint8Array::new(&buffer).to_vec()))
    }

    async fn size(&self) -> Result<u64, BackendError> {
        Ok(self.snapshot().await?.size() as u64)
    }

    #[instrument(level = Level::TRACE, skip(self))]
    async fn writable(&self, options: WritableOptions) -> Result<OpfsWritable, BackendError> {
        let writable_options = FileSystemCreateWritableOptions::new();
        writable_options.set_keep_existing_data(options.keep_existing_data);

        let promise = self.handle.create_writable_with_options(&writable_options);
        let stream = settle(promise, &self.handle.name()).await?;
        trace!(name = %self.handle.name(), "opfs::writable::opened");

        Ok(OpfsWritable {
            stream: stream.unchecked_into(),
        })
    }
}

pub struct OpfsWritable {
    stream: FileSystemWritableFileStream,
}

#[async_trait(?Send)]
impl WritableStream for OpfsWritable {
    async fn close(self) -> Result<(), BackendError> {
        settle(self.stream.close(), "close").await?;
        Ok(())
    }

    async fn seek(&mut self, position: u64) -> Result<(), BackendError> {
        let promise = self
            .stream
            .seek_with_f64(position as f64)
            .map_err(|err| js_failure("seek", err))?;

        settle(promise, "seek").await?;
        Ok(())
    }

    async fn write(&mut self, data: &[u8]) -> Result<(), BackendError> {
        let promise = self
            .stream
            .write_with_u8_array(data)
            .map_err(|err| js_failure("write", err))?;

        settle(promise, "write").await?;
        Ok(())
    }
}

/// Map a rejected promise onto the backend error kinds by DOM exception name.
fn dom_failure(name: &str, err: JsValue) -> BackendError {
    let exception_name = err.dyn_ref::<DomException>().map(|exception| exception.name());

    match exception_name.as_deref() {
        Some("NotFoundError") => BackendError::NotFound(name.to_string()),
        Some("TypeMismatchError") => BackendError::TypeMismatch(name.to_string()),
        Some("NotAllowedError") | Some("SecurityError") => {
            BackendError::PermissionDenied(name.to_string())
        }
        Some("TypeError") => BackendError::InvalidName(name.to_string()),
        _ => js_failure(name, err),
    }
}

fn js_failure(context: &str, err: JsValue) -> BackendError {
    BackendError::Implementation(format!("{context}: {err:?}"))
}

async fn same_entry(a: &FileSystemHandle, b: &FileSystemHandle) -> Result<bool, BackendError> {
    let same = settle(a.is_same_entry(b), "is_same_entry").await?;
    Ok(same.as_bool().unwrap_or(false))
}

async fn settle(promise: Promise, name: &str) -> Result<JsValue, BackendError> {
    JsFuture::from(promise)
        .await
        .map_err(|err| dom_failure(name, err))
}

fn storage_manager() -> Result<StorageManager, BackendError> {
    if let Some(window) = web_sys::window() {
        return Ok(window.navigator().storage());
    }

    if let Ok(worker) = js_sys::global().dyn_into::<WorkerGlobalScope>() {
        return Ok(worker.navigator().storage());
    }

    Err(BackendError::Implementation(
        "no storage manager available in this context".to_string(),
    ))
}
