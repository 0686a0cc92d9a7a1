//! Chunked uploads: arrival order, completeness checks, abandonment.

mod common;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Duration;
use common::{body, fixture, read_zip, Fixture};
use ferry_blob::{
    collect_stream, BlobError, BlobResult, BlobStore, ByteStream, GetResult, MemoryBlobStore,
    PutResult,
};
use ferry_bundle::{BundleCode, BundleError, ChunkUpload, Ferry, MemoryRepository, UploadId};

fn chunk(upload_id: &str, name: &str, index: u32, total: u32) -> ChunkUpload {
    ChunkUpload {
        upload_id: UploadId::parse(upload_id).unwrap(),
        display_name: name.to_string(),
        chunk_index: index,
        total_chunks: total,
    }
}

async fn send(fx: &Fixture, code: &BundleCode, upload: ChunkUpload, data: &[u8]) {
    fx.ferry.upload_chunk(code, &upload, body(data)).await.unwrap();
}

fn upload_id(id: &str) -> UploadId {
    UploadId::parse(id).unwrap()
}

#[tokio::test]
async fn arrival_order_does_not_matter() {
    let orders: [[u32; 4]; 4] = [[0, 1, 2, 3], [3, 2, 1, 0], [2, 0, 3, 1], [1, 3, 0, 2]];
    let parts: [&[u8]; 4] = [b"aa", b"bbb", b"c", b"dddd"];

    for order in orders {
        let fx = fixture();
        let bundle = fx.ferry.create_bundle().await.unwrap();
        for index in order {
            send(&fx, &bundle.code, chunk("up", "data.bin", index, 4), parts[index as usize]).await;
        }

        let file = fx.ferry.finalize_upload(&bundle.code, &upload_id("up")).await.unwrap();
        let stored = fx.blobs.get(&file.blob_path).await.unwrap();
        assert_eq!(
            collect_stream(stored.stream).await.unwrap(),
            b"aabbbcdddd",
            "order {:?}",
            order
        );
        // Only the assembled file remains
        assert_eq!(fx.blobs.keys(), vec![file.blob_path.clone()]);
        assert_eq!(fx.repo.upload_count(), 0);
    }
}

#[tokio::test]
async fn receipts_count_distinct_chunks() {
    let fx = fixture();
    let bundle = fx.ferry.create_bundle().await.unwrap();

    let first = fx
        .ferry
        .upload_chunk(&bundle.code, &chunk("up", "f.bin", 1, 3), body(b"x"))
        .await
        .unwrap();
    assert_eq!(first.chunks_received, 1);

    // Same index again replaces rather than adds
    let again = fx
        .ferry
        .upload_chunk(&bundle.code, &chunk("up", "f.bin", 1, 3), body(b"yy"))
        .await
        .unwrap();
    assert_eq!(again.chunks_received, 1);
    assert_eq!(again.size_bytes, 2);
}

#[tokio::test]
async fn resent_chunk_wins() {
    let fx = fixture();
    let bundle = fx.ferry.create_bundle().await.unwrap();
    send(&fx, &bundle.code, chunk("up", "f.txt", 0, 2), b"old-").await;
    send(&fx, &bundle.code, chunk("up", "f.txt", 1, 2), b"tail").await;
    send(&fx, &bundle.code, chunk("up", "f.txt", 0, 2), b"new-").await;

    fx.ferry.finalize_upload(&bundle.code, &upload_id("up")).await.unwrap();
    let mut archive: Vec<u8> = Vec::new();
    fx.ferry.download(&bundle.code, &mut archive).await.unwrap();
    assert_eq!(read_zip(archive).await[0].1, b"new-tail".to_vec());
}

#[tokio::test]
async fn missing_chunk_is_incomplete_and_recoverable() {
    let fx = fixture();
    let bundle = fx.ferry.create_bundle().await.unwrap();
    send(&fx, &bundle.code, chunk("up", "f.bin", 0, 3), b"a").await;
    send(&fx, &bundle.code, chunk("up", "f.bin", 2, 3), b"c").await;

    let err = fx
        .ferry
        .finalize_upload(&bundle.code, &upload_id("up"))
        .await
        .unwrap_err();
    match err {
        BundleError::IncompleteUpload { upload_id, reason } => {
            assert_eq!(upload_id, "up");
            assert!(reason.contains("missing [1]"), "{reason}");
        }
        other => panic!("expected incomplete upload, got {other}"),
    }
    assert!(fx.ferry.resolve(&bundle.code).await.unwrap().is_empty());

    // The chunks survive, so sending the gap completes the upload
    send(&fx, &bundle.code, chunk("up", "f.bin", 1, 3), b"b").await;
    let file = fx.ferry.finalize_upload(&bundle.code, &upload_id("up")).await.unwrap();
    assert_eq!(file.size_bytes, 3);
}

#[tokio::test]
async fn disagreeing_total_is_incomplete() {
    let fx = fixture();
    let bundle = fx.ferry.create_bundle().await.unwrap();
    send(&fx, &bundle.code, chunk("up", "f.bin", 0, 2), b"a").await;
    send(&fx, &bundle.code, chunk("up", "f.bin", 1, 3), b"b").await;

    let err = fx
        .ferry
        .finalize_upload(&bundle.code, &upload_id("up"))
        .await
        .unwrap_err();
    assert!(matches!(err, BundleError::IncompleteUpload { .. }), "{err}");
}

#[tokio::test]
async fn unknown_upload_and_second_finalize_are_incomplete() {
    let fx = fixture();
    let bundle = fx.ferry.create_bundle().await.unwrap();

    let err = fx
        .ferry
        .finalize_upload(&bundle.code, &upload_id("never-sent"))
        .await
        .unwrap_err();
    assert!(matches!(err, BundleError::IncompleteUpload { .. }));

    send(&fx, &bundle.code, chunk("up", "f.bin", 0, 1), b"only").await;
    fx.ferry.finalize_upload(&bundle.code, &upload_id("up")).await.unwrap();
    let err = fx
        .ferry
        .finalize_upload(&bundle.code, &upload_id("up"))
        .await
        .unwrap_err();
    assert!(matches!(err, BundleError::IncompleteUpload { .. }));
    assert_eq!(fx.ferry.resolve(&bundle.code).await.unwrap().len(), 1);
}

#[tokio::test]
async fn finalize_on_dead_bundle_leaves_chunks() {
    let fx = fixture();
    let bundle = fx.ferry.create_bundle().await.unwrap();
    send(&fx, &bundle.code, chunk("up", "f.bin", 0, 1), b"data").await;

    fx.clock.advance(Duration::seconds(300));
    let err = fx
        .ferry
        .finalize_upload(&bundle.code, &upload_id("up"))
        .await
        .unwrap_err();
    assert!(err.is_not_found());
    assert_eq!(fx.blobs.keys(), vec!["chunks/up/part-000000".to_string()]);
    assert_eq!(fx.repo.upload_count(), 1);
}

#[tokio::test]
async fn chunks_for_dead_bundle_are_refused() {
    let fx = fixture();
    let bundle = fx.ferry.create_bundle().await.unwrap();
    fx.clock.advance(Duration::seconds(301));

    let err = fx
        .ferry
        .upload_chunk(&bundle.code, &chunk("up", "f.bin", 0, 1), body(b"x"))
        .await
        .unwrap_err();
    assert!(err.is_not_found());
    assert!(fx.blobs.is_empty());
}

#[tokio::test]
async fn bad_chunk_metadata_is_invalid() {
    let fx = fixture();
    let bundle = fx.ferry.create_bundle().await.unwrap();

    for upload in [
        chunk("up", "f.bin", 0, 0),
        chunk("up", "f.bin", 3, 3),
        chunk("up", "f.bin", 0, 10_001),
        chunk("up", "", 0, 1),
    ] {
        let err = fx
            .ferry
            .upload_chunk(&bundle.code, &upload, body(b"x"))
            .await
            .unwrap_err();
        assert!(matches!(err, BundleError::Invalid { .. }), "{upload:?}: {err}");
    }
    assert!(fx.blobs.is_empty());
}

#[tokio::test]
async fn abandon_removes_chunks() {
    let fx = fixture();
    let bundle = fx.ferry.create_bundle().await.unwrap();
    send(&fx, &bundle.code, chunk("up", "f.bin", 0, 3), b"a").await;
    send(&fx, &bundle.code, chunk("up", "f.bin", 1, 3), b"b").await;
    send(&fx, &bundle.code, chunk("other", "g.bin", 0, 1), b"g").await;

    let removed = fx.ferry.abandon_upload(&bundle.code, &upload_id("up")).await.unwrap();
    assert_eq!(removed, 2);
    assert_eq!(fx.blobs.keys(), vec!["chunks/other/part-000000".to_string()]);

    let err = fx
        .ferry
        .finalize_upload(&bundle.code, &upload_id("up"))
        .await
        .unwrap_err();
    assert!(matches!(err, BundleError::IncompleteUpload { .. }));

    // Abandoning twice is harmless
    assert_eq!(fx.ferry.abandon_upload(&bundle.code, &upload_id("up")).await.unwrap(), 0);
}

#[tokio::test]
async fn stale_uploads_are_purged() {
    let fx = fixture();
    let bundle = fx.ferry.create_bundle().await.unwrap();
    send(&fx, &bundle.code, chunk("stale", "f.bin", 0, 2), b"a").await;

    fx.clock.advance(Duration::seconds(250));
    let fresh = fx.ferry.create_bundle().await.unwrap();
    send(&fx, &fresh.code, chunk("fresh", "g.bin", 0, 2), b"b").await;

    fx.clock.advance(Duration::seconds(100));
    let report = fx.ferry.purge_expired().await.unwrap();
    assert_eq!(report.uploads, 1);
    assert_eq!(report.bundles, 1);
    assert_eq!(fx.blobs.keys(), vec!["chunks/fresh/part-000000".to_string()]);
}

/// Memory store whose next write under `files/` reads the whole stream and then fails
#[derive(Clone, Default)]
struct FullDiskOnce {
    inner: MemoryBlobStore,
    armed: Arc<AtomicBool>,
}

#[async_trait]
impl BlobStore for FullDiskOnce {
    async fn put(&self, key: &str, stream: ByteStream) -> BlobResult<PutResult> {
        if key.starts_with("files/") && self.armed.swap(false, Ordering::SeqCst) {
            let _ = collect_stream(stream).await;
            return Err(BlobError::from(std::io::Error::other("disk full")));
        }
        self.inner.put(key, stream).await
    }

    async fn get(&self, key: &str) -> BlobResult<GetResult> {
        self.inner.get(key).await
    }

    async fn delete(&self, key: &str) -> BlobResult<()> {
        self.inner.delete(key).await
    }

    async fn exists(&self, key: &str) -> BlobResult<bool> {
        self.inner.exists(key).await
    }

    async fn delete_prefix(&self, prefix: &str) -> BlobResult<()> {
        self.inner.delete_prefix(prefix).await
    }
}

#[tokio::test]
async fn failed_assembly_drops_the_upload() {
    let store = FullDiskOnce::default();
    let repo = MemoryRepository::new();
    let ferry = Ferry::builder(repo.clone(), store.clone()).build();
    let bundle = ferry.create_bundle().await.unwrap();

    for (index, data) in [(0u32, &b"left-"[..]), (1, &b"right"[..])] {
        ferry
            .upload_chunk(&bundle.code, &chunk("up", "f.bin", index, 2), body(data))
            .await
            .unwrap();
    }

    store.armed.store(true, Ordering::SeqCst);
    let err = ferry
        .finalize_upload(&bundle.code, &upload_id("up"))
        .await
        .unwrap_err();
    assert!(matches!(err, BundleError::Storage { .. }), "{err}");

    // Nothing claims chunks that were consumed by the failed write
    assert!(store.inner.is_empty(), "left behind: {:?}", store.inner.keys());
    assert_eq!(repo.upload_count(), 0);
    let err = ferry
        .finalize_upload(&bundle.code, &upload_id("up"))
        .await
        .unwrap_err();
    assert!(matches!(err, BundleError::IncompleteUpload { .. }), "{err}");

    // Sending the chunks again recovers
    for (index, data) in [(1u32, &b"right"[..]), (0, &b"left-"[..])] {
        ferry
            .upload_chunk(&bundle.code, &chunk("up", "f.bin", index, 2), body(data))
            .await
            .unwrap();
    }
    let file = ferry.finalize_upload(&bundle.code, &upload_id("up")).await.unwrap();
    let stored = store.inner.get(&file.blob_path).await.unwrap();
    assert_eq!(collect_stream(stored.stream).await.unwrap(), b"left-right");
}
