#![allow(dead_code)]

use std::io;
use std::pin::Pin;
use std::task::{Context, Poll};

use bytes::Bytes;
use chrono::{TimeZone, Utc};
use ferry_blob::{ByteStream, MemoryBlobStore};
use ferry_bundle::{
    BundleCode, BundleConfig, Ferry, ManualClock, MemoryRepository, SequenceCodes,
};
use tokio::io::AsyncWrite;

pub struct Fixture {
    pub ferry: Ferry,
    pub clock: ManualClock,
    pub blobs: MemoryBlobStore,
    pub repo: MemoryRepository,
}

pub fn fixture() -> Fixture {
    fixture_with(BundleConfig::default(), SequenceCodes::default())
}

pub fn fixture_with(config: BundleConfig, codes: SequenceCodes) -> Fixture {
    let clock = ManualClock::new(Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap());
    let blobs = MemoryBlobStore::new();
    let repo = MemoryRepository::new();
    let ferry = Ferry::builder(repo.clone(), blobs.clone())
        .with_config(config)
        .with_clock(clock.clone())
        .with_codes(codes)
        .build();
    Fixture {
        ferry,
        clock,
        blobs,
        repo,
    }
}

pub fn codes(numbers: &[u32]) -> SequenceCodes {
    SequenceCodes::new(numbers.iter().map(|n| BundleCode::from_number(*n)))
}

pub fn body(data: &[u8]) -> ByteStream {
    ferry_blob::bytes_stream(Bytes::copy_from_slice(data))
}

/// Unpack a zip archive into (entry name, contents) pairs in archive order
pub async fn read_zip(archive: Vec<u8>) -> Vec<(String, Vec<u8>)> {
    let reader = async_zip::base::read::mem::ZipFileReader::new(archive)
        .await
        .expect("valid zip archive");

    let mut entries = Vec::new();
    for index in 0..reader.file().entries().len() {
        let name = reader.file().entries()[index]
            .filename()
            .as_str()
            .expect("utf-8 entry name")
            .to_string();
        let mut content = Vec::new();
        let mut entry = reader.reader_with_entry(index).await.expect("entry reader");
        entry
            .read_to_end_checked(&mut content)
            .await
            .expect("entry content");
        entries.push((name, content));
    }
    entries
}

/// Sink that accepts `budget` bytes and then fails like a dropped connection
pub struct FailingSink {
    pub written: usize,
    pub budget: usize,
}

impl FailingSink {
    pub fn after(budget: usize) -> Self {
        Self { written: 0, budget }
    }
}

impl AsyncWrite for FailingSink {
    fn poll_write(self: Pin<&mut Self>, _cx: &mut Context<'_>, buf: &[u8]) -> Poll<io::Result<usize>> {
        let this = self.get_mut();
        if this.written + buf.len() > this.budget {
            return Poll::Ready(Err(io::Error::new(io::ErrorKind::BrokenPipe, "client disconnected")));
        }
        this.written += buf.len();
        Poll::Ready(Ok(buf.len()))
    }

    fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Poll::Ready(Ok(()))
    }

    fn poll_shutdown(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Poll::Ready(Ok(()))
    }
}
