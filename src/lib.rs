// Note: wasm-pack test does not run any unit tests that are pub reachable from the root module, I
// think this includes the test module itself

pub mod backend;
pub mod error;
pub mod navigator;
pub mod path;
pub mod version;

#[cfg(target_arch = "wasm32")]
pub mod wasm;

// Re-export some of our dependencies for QoL, backends implement these traits through it
pub use async_trait;

pub mod prelude {
    pub use crate::backend::memory::{MemoryDirectory, MemoryFile, MemoryTree};
    pub use crate::backend::{
        BackendError, DirectoryHandle, Entry, FileHandle, WritableOptions, WritableStream,
    };
    pub use crate::error::*;
    pub use crate::navigator::{Locator, Navigator, NavigatorError, WriteOptions};
    pub use crate::path::{Segments, SEPARATOR};
    pub use crate::version::*;

    #[cfg(all(feature = "local-store", not(target_arch = "wasm32")))]
    pub use crate::backend::local::{LocalDirectory, LocalFile};

    #[cfg(target_arch = "wasm32")]
    pub use crate::wasm::opfs::{OpfsDirectory, OpfsFile};
}
