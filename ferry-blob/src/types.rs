use bytes::Bytes;
use futures_core::Stream;
use futures_util::StreamExt;
use std::pin::Pin;

use crate::{BlobError, BlobResult};

/// Stream of bytes for blob content
pub type ByteStream = Pin<Box<dyn Stream<Item = Result<Bytes, std::io::Error>> + Send>>;

/// Wrap an in-memory buffer as a single-item byte stream
pub fn bytes_stream<B: Into<Bytes>>(data: B) -> ByteStream {
    let data = data.into();
    Box::pin(futures::stream::once(async move { Ok::<_, std::io::Error>(data) }))
}

/// An empty byte stream
pub fn empty_stream() -> ByteStream {
    Box::pin(futures::stream::empty::<Result<Bytes, std::io::Error>>())
}

/// Drain a stream into memory. Only meant for small payloads and tests.
pub async fn collect_stream(mut stream: ByteStream) -> BlobResult<Vec<u8>> {
    let mut data = Vec::new();
    while let Some(chunk) = stream.next().await {
        data.extend_from_slice(&chunk.map_err(BlobError::from)?);
    }
    Ok(data)
}

/// Check that a key is a relative `/`-separated path without traversal.
///
/// Keys map straight onto file-system paths in [`crate::FsBlobStore`], so
/// anything that could escape the root is refused for every backend.
pub fn validate_key(key: &str) -> BlobResult<()> {
    if key.is_empty() {
        return Err(BlobError::invalid("empty key"));
    }
    if key.starts_with('/') || key.contains('\\') {
        return Err(BlobError::invalid(format!("key must be relative: {}", key)));
    }
    for segment in key.split('/') {
        if segment.is_empty() || segment == "." || segment == ".." {
            return Err(BlobError::invalid(format!("bad key segment in {}", key)));
        }
    }
    Ok(())
}
