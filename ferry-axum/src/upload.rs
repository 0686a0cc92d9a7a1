//! Multipart plumbing: hand request parts to Ferry as streams.

use std::future::Future;
use std::io;

use axum::extract::multipart::{Field, Multipart};
use bytes::Bytes;
use ferry_blob::ByteStream;
use ferry_bundle::{
    BundleCode, BundleError, BundleResult, ChunkReceipt, ChunkUpload, Ferry, FileRef, UploadId,
};
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::FerryAxumError;

/// Parts buffered between the request reader and the consumer
const FIELD_CHANNEL_DEPTH: usize = 4;

/// Feed one multipart field into `consume` as a [`ByteStream`].
///
/// A field borrows the whole request, so its bytes are forwarded through a
/// small channel while both sides run in the current task.
async fn pump_field<T, F, Fut>(field: Field<'_>, consume: F) -> Result<T, FerryAxumError>
where
    F: FnOnce(ByteStream) -> Fut,
    Fut: Future<Output = BundleResult<T>>,
{
    let (tx, mut rx) = mpsc::channel::<Result<Bytes, io::Error>>(FIELD_CHANNEL_DEPTH);
    let stream: ByteStream = Box::pin(async_stream::stream! {
        while let Some(item) = rx.recv().await {
            yield item;
        }
    });

    let feed = async move {
        let mut field = field;
        loop {
            match field.chunk().await {
                Ok(Some(bytes)) => {
                    if tx.send(Ok(bytes)).await.is_err() {
                        return None;
                    }
                }
                Ok(None) => return None,
                Err(e) => {
                    let relay = io::Error::new(io::ErrorKind::InvalidData, e.to_string());
                    let _ = tx.send(Err(relay)).await;
                    return Some(e);
                }
            }
        }
    };

    let (request_error, result) = tokio::join!(feed, consume(stream));
    if let Some(e) = request_error {
        return Err(e.into());
    }
    Ok(result?)
}

/// Attach the `file` part of a request to the bundle
pub(crate) async fn receive_file(
    ferry: &Ferry,
    code: &BundleCode,
    mut multipart: Multipart,
) -> Result<FileRef, FerryAxumError> {
    while let Some(field) = multipart.next_field().await? {
        if field.name() != Some("file") {
            continue;
        }
        let name = field.file_name().unwrap_or("file").to_string();
        return pump_field(field, |stream| ferry.upload_file(code, &name, stream)).await;
    }
    Err(FerryAxumError::bad_request("multipart field `file` is required"))
}

/// Text fields describing a chunk, in whatever order they arrived
#[derive(Debug, Default)]
struct ChunkForm {
    file_name: Option<String>,
    chunk_index: Option<u32>,
    total_chunks: Option<u32>,
    upload_id: Option<UploadId>,
    /// Filename on the `chunk` part itself, used when `fileName` is absent
    part_file_name: Option<String>,
}

impl ChunkForm {
    fn set(&mut self, field: &str, value: &str) -> Result<(), FerryAxumError> {
        match field {
            "fileName" => self.file_name = Some(value.to_string()),
            "chunkIndex" => self.chunk_index = Some(parse_number(field, value)?),
            "totalChunks" => self.total_chunks = Some(parse_number(field, value)?),
            "uploadId" => self.upload_id = Some(UploadId::parse(value.trim())?),
            other => debug!(field = %other, "Ignoring unknown multipart field"),
        }
        Ok(())
    }

    fn ready(&self) -> Option<ChunkUpload> {
        Some(ChunkUpload {
            upload_id: self.upload_id.clone()?,
            display_name: self.file_name.clone().or_else(|| self.part_file_name.clone())?,
            chunk_index: self.chunk_index?,
            total_chunks: self.total_chunks?,
        })
    }

    fn require(&self) -> Result<ChunkUpload, FerryAxumError> {
        self.ready().ok_or_else(|| {
            let missing: Vec<&str> = [
                ("fileName", self.file_name.is_none() && self.part_file_name.is_none()),
                ("chunkIndex", self.chunk_index.is_none()),
                ("totalChunks", self.total_chunks.is_none()),
                ("uploadId", self.upload_id.is_none()),
            ]
            .into_iter()
            .filter_map(|(name, absent)| absent.then_some(name))
            .collect();
            FerryAxumError::bad_request(format!("missing multipart fields: {}", missing.join(", ")))
        })
    }
}

fn parse_number(field: &str, value: &str) -> Result<u32, FerryAxumError> {
    value
        .trim()
        .parse()
        .map_err(|_| FerryAxumError::bad_request(format!("{} must be a non-negative integer", field)))
}

/// Scratch blob for a chunk that arrived before its metadata
struct Spool<'a> {
    ferry: &'a Ferry,
    key: Option<String>,
}

impl Spool<'_> {
    async fn discard(self) {
        if let Some(key) = self.key {
            if let Err(e) = self.ferry.blobs().delete(&key).await {
                warn!(key = %key, error = %e, "Failed to remove spooled chunk");
            }
        }
    }
}

/// Accept one chunk. Metadata fields may come before or after the `chunk` part.
pub(crate) async fn receive_chunk(
    ferry: &Ferry,
    code: &BundleCode,
    multipart: Multipart,
) -> Result<ChunkReceipt, FerryAxumError> {
    // Nothing gets spooled for a dead bundle
    ferry.registry().live_bundle(code).await?;

    let mut spool = Spool { ferry, key: None };
    let result = read_chunk(ferry, code, multipart, &mut spool).await;
    spool.discard().await;
    result
}

async fn read_chunk(
    ferry: &Ferry,
    code: &BundleCode,
    mut multipart: Multipart,
    spool: &mut Spool<'_>,
) -> Result<ChunkReceipt, FerryAxumError> {
    let mut form = ChunkForm::default();
    let mut receipt = None;

    while let Some(field) = multipart.next_field().await? {
        let Some(name) = field.name().map(str::to_string) else {
            continue;
        };
        if name != "chunk" {
            let value = field.text().await?;
            form.set(&name, &value)?;
            continue;
        }

        if receipt.is_some() || spool.key.is_some() {
            return Err(FerryAxumError::bad_request("only one chunk per request"));
        }
        form.part_file_name = field.file_name().map(str::to_string);

        match form.ready() {
            Some(upload) => {
                let accepted =
                    pump_field(field, |stream| ferry.upload_chunk(code, &upload, stream)).await?;
                receipt = Some(accepted);
            }
            None => {
                let key = ferry.keys().spool_key();
                spool.key = Some(key.clone());
                let spool_key = key.as_str();
                pump_field(field, |stream| async move {
                    ferry
                        .blobs()
                        .put(spool_key, stream)
                        .await
                        .map_err(BundleError::from)
                })
                .await?;
                debug!(key = %key, "Chunk spooled until its metadata arrives");
            }
        }
    }

    if let Some(receipt) = receipt {
        return Ok(receipt);
    }

    let upload = form.require()?;
    let key = spool
        .key
        .as_deref()
        .ok_or_else(|| FerryAxumError::bad_request("multipart field `chunk` is required"))?;
    let spooled = ferry.blobs().get(key).await.map_err(BundleError::from)?;
    Ok(ferry.upload_chunk(code, &upload, spooled.stream).await?)
}
