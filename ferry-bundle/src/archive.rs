use std::collections::HashSet;
use std::sync::Arc;

use async_zip::base::write::ZipFileWriter;
use async_zip::{Compression, ZipEntryBuilder};
use ferry_blob::BlobStore;
use futures::io::AsyncWriteExt;
use futures_util::StreamExt;
use tokio::io::AsyncWrite;
use tracing::{debug, warn};

use crate::{ArchiveCompression, BundleError, BundleResult, FileRef};

/// What ended up in an archive
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ArchiveSummary {
    /// Entry names in archive order
    pub entries: Vec<String>,
    /// Display names of files whose blob was gone
    pub skipped: Vec<String>,
    /// Uncompressed content bytes written
    pub bytes: u64,
}

/// Writes a bundle's files into a zip archive on any async sink
pub struct ArchiveStreamer {
    store: Arc<dyn BlobStore>,
    compression: ArchiveCompression,
}

impl ArchiveStreamer {
    pub fn new(store: Arc<dyn BlobStore>, compression: ArchiveCompression) -> Self {
        Self { store, compression }
    }

    /// Stream `files` into `sink` as one zip archive, one entry per file.
    ///
    /// Files whose blob no longer exists are skipped. Blob content is copied
    /// one read buffer at a time; nothing is held in memory whole. The sink is
    /// shut down once the central directory is written.
    pub async fn stream<W>(&self, files: &[FileRef], sink: W) -> BundleResult<ArchiveSummary>
    where
        W: AsyncWrite + Unpin + Send,
    {
        let mut writer = ZipFileWriter::with_tokio(sink);
        let mut names = EntryNames::default();
        let mut summary = ArchiveSummary::default();

        for file in files {
            let blob = match self.store.get(&file.blob_path).await {
                Ok(blob) => blob,
                Err(e) if e.is_not_found() => {
                    warn!(file = %file.display_name, key = %file.blob_path, "Blob missing, skipping entry");
                    summary.skipped.push(file.display_name.clone());
                    continue;
                }
                Err(e) => return Err(e.into()),
            };

            let name = names.claim(&file.display_name);
            let builder = ZipEntryBuilder::new(name.clone().into(), self.zip_compression());
            let mut entry = writer
                .write_entry_stream(builder)
                .await
                .map_err(|e| BundleError::streaming(e.to_string()))?;

            let mut content = blob.stream;
            while let Some(chunk) = content.next().await {
                let chunk = chunk.map_err(BundleError::storage)?;
                entry
                    .write_all(&chunk)
                    .await
                    .map_err(|e| BundleError::streaming(e.to_string()))?;
                summary.bytes += chunk.len() as u64;
            }
            entry
                .close()
                .await
                .map_err(|e| BundleError::streaming(e.to_string()))?;

            debug!(entry = %name, "Archive entry written");
            summary.entries.push(name);
        }

        let mut sink = writer
            .close()
            .await
            .map_err(|e| BundleError::streaming(e.to_string()))?;
        AsyncWriteExt::close(&mut sink)
            .await
            .map_err(|e| BundleError::streaming(e.to_string()))?;

        Ok(summary)
    }

    fn zip_compression(&self) -> Compression {
        match self.compression {
            ArchiveCompression::Stored => Compression::Stored,
            ArchiveCompression::Deflate => Compression::Deflate,
        }
    }
}

/// Hands out unique entry names: `a.txt`, `a (1).txt`, `a (2).txt`, ...
#[derive(Debug, Default)]
struct EntryNames {
    taken: HashSet<String>,
}

impl EntryNames {
    fn claim(&mut self, name: &str) -> String {
        if self.taken.insert(name.to_string()) {
            return name.to_string();
        }

        let (stem, ext) = match name.rfind('.') {
            Some(dot) if dot > 0 => name.split_at(dot),
            _ => (name, ""),
        };
        let mut n = 1;
        loop {
            let candidate = format!("{} ({}){}", stem, n, ext);
            if self.taken.insert(candidate.clone()) {
                return candidate;
            }
            n += 1;
        }
    }
}
