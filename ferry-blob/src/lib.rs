//! # ferry-blob: streaming blob storage for Ferry
//!
//! `ferry-blob` is the leaf of the Ferry workspace: durable byte storage keyed
//! by opaque relative paths, with streams in and streams out so a multi-gigabyte
//! upload never has to sit in memory.
//!
//! ## Key Features
//!
//! - **Streaming-first**: `put` consumes a [`ByteStream`], `get` hands one back
//! - **Two backends**: [`FsBlobStore`] for real deployments, [`MemoryBlobStore`] for tests
//! - **Safe keys**: traversal and absolute paths are refused before touching a backend
//! - **Key strategy**: [`DefaultKeyStrategy`] keeps finished files, chunk staging
//!   areas and transport spools apart
//!
//! ## Quick Start
//!
//! ```rust
//! use ferry_blob::prelude::*;
//!
//! # #[tokio::main]
//! # async fn main() -> BlobResult<()> {
//! let store = MemoryBlobStore::new();
//! let keys = DefaultKeyStrategy;
//!
//! let key = keys.file_key("hello.txt");
//! store.put(&key, ferry_blob::bytes_stream(&b"Hello, world!"[..])).await?;
//!
//! let opened = store.get(&key).await?;
//! let data = ferry_blob::collect_stream(opened.stream).await?;
//! assert_eq!(data, b"Hello, world!");
//! # Ok(())
//! # }
//! ```

mod config;
mod error;
mod fs_store;
mod memory_store;
pub mod store;
mod types;

pub use config::BlobConfig;
pub use error::{BlobError, BlobResult};
pub use fs_store::FsBlobStore;
pub use memory_store::MemoryBlobStore;
pub use store::{safe_segment, BlobKeyStrategy, BlobStore, DefaultKeyStrategy, GetResult, PutResult};
pub use types::{bytes_stream, collect_stream, empty_stream, validate_key, ByteStream};

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::{
        BlobConfig, BlobError, BlobKeyStrategy, BlobResult, BlobStore, ByteStream,
        DefaultKeyStrategy, FsBlobStore, MemoryBlobStore,
    };
}
