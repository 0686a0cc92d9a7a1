//! # ferry-bundle: one-time file bundles
//!
//! A bundle is a short-lived drop box named by a six-digit code. Producers
//! attach files to it, either whole or as chunks that are stitched back
//! together, and whoever holds the code can download everything as one zip
//! archive, exactly once, before the bundle expires.
//!
//! ## Key Features
//!
//! - **Short-lived**: bundles die 300 seconds after creation, no sweeper required
//! - **Exactly-once download**: a lease flips the bundle before any byte is sent
//! - **Chunked uploads**: chunks arrive in any order and are reassembled by index
//! - **Streaming archives**: entries are copied a buffer at a time into any `AsyncWrite`
//! - **Pluggable storage**: any [`ferry_blob::BlobStore`] and any [`BundleRepository`]
//!
//! ## Quick Start
//!
//! ```rust
//! use ferry_bundle::prelude::*;
//!
//! # #[tokio::main]
//! # async fn main() -> BundleResult<()> {
//! let ferry = Ferry::in_memory();
//!
//! let bundle = ferry.create_bundle().await?;
//! ferry
//!     .upload_file(&bundle.code, "hello.txt", ferry_blob::bytes_stream(&b"Hello!"[..]))
//!     .await?;
//!
//! let mut archive = Vec::new();
//! let summary = ferry.download(&bundle.code, &mut archive).await?;
//! assert_eq!(summary.entries, vec!["hello.txt".to_string()]);
//!
//! // Gone after the first download
//! assert!(ferry.resolve(&bundle.code).await.is_err());
//! # Ok(())
//! # }
//! ```

mod archive;
mod chunks;
pub mod clock;
pub mod code;
mod config;
mod error;
mod ferry;
mod memory_repository;
mod model;
mod reaper;
mod registry;
pub mod repository;

pub use archive::{ArchiveStreamer, ArchiveSummary};
pub use chunks::{ChunkAssembler, ChunkUpload};
pub use clock::{Clock, ManualClock, SystemClock};
pub use code::{CodeGenerator, RandomCodes, SequenceCodes};
pub use config::{ArchiveCompression, BundleConfig, DEFAULT_TTL_SECS};
pub use error::{BundleError, BundleResult};
pub use ferry::{Ferry, FerryBuilder};
pub use memory_repository::MemoryRepository;
pub use model::{
    clean_display_name, Bundle, BundleCode, BundleId, BundleState, ChunkReceipt, ChunkRecord,
    ConsumeLease, FileId, FileRef, LeaseToken, PurgeReport, UploadId,
};
pub use reaper::BundleReaper;
pub use registry::BundleRegistry;
pub use repository::{BundleRepository, ChunkRepository, InsertOutcome};

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::{
        ArchiveSummary, Bundle, BundleCode, BundleConfig, BundleError, BundleResult, ChunkUpload,
        FileRef, Ferry, MemoryRepository, UploadId,
    };
}
