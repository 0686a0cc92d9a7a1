use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use futures_util::StreamExt;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tokio_util::io::ReaderStream;
use uuid::Uuid;

use crate::types::validate_key;
use crate::{BlobConfig, BlobError, BlobResult, BlobStore, ByteStream, GetResult, PutResult};

/// Blob store rooted at a local directory.
///
/// Writes go to a hidden temp file next to the target and are renamed into
/// place, so a reader never observes a half-written blob and a failed upload
/// leaves the previous version intact.
#[derive(Debug, Clone)]
pub struct FsBlobStore {
    root: PathBuf,
    config: BlobConfig,
}

impl FsBlobStore {
    /// Create a store without touching the disk
    pub fn new<P: Into<PathBuf>>(root: P, config: BlobConfig) -> Self {
        Self {
            root: root.into(),
            config,
        }
    }

    /// Create a store and make sure its root directory exists
    pub async fn open<P: Into<PathBuf>>(root: P, config: BlobConfig) -> BlobResult<Self> {
        let store = Self::new(root, config);
        fs::create_dir_all(&store.root).await?;
        Ok(store)
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path_for(&self, key: &str) -> BlobResult<PathBuf> {
        validate_key(key)?;
        Ok(self.root.join(key))
    }

    fn temp_path_for(path: &Path) -> PathBuf {
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        path.with_file_name(format!(".{}.{}.tmp", name, Uuid::new_v4().simple()))
    }

    async fn write_stream(path: &Path, mut stream: ByteStream) -> BlobResult<u64> {
        let file = fs::File::create(path).await?;
        let mut writer = tokio::io::BufWriter::new(file);
        let mut size = 0u64;

        while let Some(chunk) = stream.next().await {
            let chunk = chunk?;
            writer.write_all(&chunk).await?;
            size += chunk.len() as u64;
        }

        writer.flush().await?;
        writer.into_inner().sync_all().await?;
        Ok(size)
    }
}

#[async_trait]
impl BlobStore for FsBlobStore {
    async fn put(&self, key: &str, stream: ByteStream) -> BlobResult<PutResult> {
        let path = self.path_for(key)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }

        let temp = Self::temp_path_for(&path);
        let written = match Self::write_stream(&temp, stream).await {
            Ok(size) => fs::rename(&temp, &path).await.map(|_| size).map_err(BlobError::from),
            Err(e) => Err(e),
        };

        match written {
            Ok(size_bytes) => Ok(PutResult { size_bytes }),
            Err(e) => {
                let _ = fs::remove_file(&temp).await;
                Err(e)
            }
        }
    }

    async fn get(&self, key: &str) -> BlobResult<GetResult> {
        let path = self.path_for(key)?;
        let file = match fs::File::open(&path).await {
            Ok(file) => file,
            Err(e) if e.kind() == ErrorKind::NotFound => return Err(BlobError::not_found(key)),
            Err(e) => return Err(e.into()),
        };
        let size_bytes = file.metadata().await?.len();
        let stream = ReaderStream::with_capacity(file, self.config.read_buffer_bytes);

        Ok(GetResult {
            stream: Box::pin(stream),
            size_bytes,
        })
    }

    async fn delete(&self, key: &str) -> BlobResult<()> {
        let path = self.path_for(key)?;
        match fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    async fn exists(&self, key: &str) -> BlobResult<bool> {
        let path = self.path_for(key)?;
        match fs::metadata(&path).await {
            Ok(meta) => Ok(meta.is_file()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    async fn delete_prefix(&self, prefix: &str) -> BlobResult<()> {
        let path = self.path_for(prefix)?;
        let result = match fs::metadata(&path).await {
            Ok(meta) if meta.is_dir() => fs::remove_dir_all(&path).await,
            Ok(_) => fs::remove_file(&path).await,
            Err(e) => Err(e),
        };
        match result {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}
