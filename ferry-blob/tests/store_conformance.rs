use bytes::Bytes;
use ferry_blob::{
    bytes_stream, collect_stream, BlobConfig, BlobError, BlobStore, ByteStream, FsBlobStore,
    MemoryBlobStore,
};
use futures::StreamExt;

fn stream_of(parts: &[&'static [u8]]) -> ByteStream {
    let items: Vec<Result<Bytes, std::io::Error>> =
        parts.iter().map(|p| Ok(Bytes::from_static(*p))).collect();
    Box::pin(futures::stream::iter(items))
}

fn failing_stream() -> ByteStream {
    let items: Vec<Result<Bytes, std::io::Error>> = vec![
        Ok(Bytes::from_static(b"partial")),
        Err(std::io::Error::new(std::io::ErrorKind::ConnectionReset, "client went away")),
    ];
    Box::pin(futures::stream::iter(items))
}

/// Shared behaviour every backend must provide.
async fn run_store_conformance(store: &dyn BlobStore) {
    put_then_get_round_trips(store).await;
    put_overwrites(store).await;
    missing_blob_is_not_found(store).await;
    delete_is_idempotent(store).await;
    delete_prefix_removes_staging_area(store).await;
    failed_put_keeps_previous_version(store).await;
    traversal_keys_are_rejected(store).await;
}

async fn put_then_get_round_trips(store: &dyn BlobStore) {
    let put = store
        .put("files/a.txt", stream_of(&[&b"hel"[..], &b"lo"[..]]))
        .await
        .unwrap();
    assert_eq!(put.size_bytes, 5);
    assert!(store.exists("files/a.txt").await.unwrap());

    let got = store.get("files/a.txt").await.unwrap();
    assert_eq!(got.size_bytes, 5);
    assert_eq!(collect_stream(got.stream).await.unwrap(), b"hello");
}

async fn put_overwrites(store: &dyn BlobStore) {
    store.put("chunks/u1/part-000000", bytes_stream(&b"first"[..])).await.unwrap();
    store.put("chunks/u1/part-000000", bytes_stream(&b"second"[..])).await.unwrap();

    let got = store.get("chunks/u1/part-000000").await.unwrap();
    assert_eq!(collect_stream(got.stream).await.unwrap(), b"second");
}

async fn missing_blob_is_not_found(store: &dyn BlobStore) {
    let err = store.get("files/nope").await.unwrap_err();
    assert!(matches!(err, BlobError::NotFound { .. }));
    assert!(err.is_not_found());
    assert!(!store.exists("files/nope").await.unwrap());
}

async fn delete_is_idempotent(store: &dyn BlobStore) {
    store.put("files/gone.txt", bytes_stream(&b"x"[..])).await.unwrap();
    store.delete("files/gone.txt").await.unwrap();
    store.delete("files/gone.txt").await.unwrap();
    assert!(!store.exists("files/gone.txt").await.unwrap());
}

async fn delete_prefix_removes_staging_area(store: &dyn BlobStore) {
    store.put("chunks/up9/part-000000", bytes_stream(&b"a"[..])).await.unwrap();
    store.put("chunks/up9/part-000001", bytes_stream(&b"b"[..])).await.unwrap();
    store.put("chunks/up90/part-000000", bytes_stream(&b"c"[..])).await.unwrap();

    store.delete_prefix("chunks/up9").await.unwrap();
    assert!(!store.exists("chunks/up9/part-000000").await.unwrap());
    assert!(!store.exists("chunks/up9/part-000001").await.unwrap());
    // A sibling that merely shares the textual prefix survives
    assert!(store.exists("chunks/up90/part-000000").await.unwrap());

    // Removing an absent prefix is fine
    store.delete_prefix("chunks/never").await.unwrap();
}

async fn failed_put_keeps_previous_version(store: &dyn BlobStore) {
    store.put("files/keep.bin", bytes_stream(&b"original"[..])).await.unwrap();
    let err = store.put("files/keep.bin", failing_stream()).await;
    assert!(err.is_err());

    let got = store.get("files/keep.bin").await.unwrap();
    assert_eq!(collect_stream(got.stream).await.unwrap(), b"original");
}

async fn traversal_keys_are_rejected(store: &dyn BlobStore) {
    let err = store.put("../escape", bytes_stream(&b"x"[..])).await.unwrap_err();
    assert!(matches!(err, BlobError::Invalid { .. }));
    assert!(store.get("/abs").await.is_err());
}

#[tokio::test]
async fn memory_store_conformance() {
    let store = MemoryBlobStore::new();
    run_store_conformance(&store).await;
}

#[tokio::test]
async fn fs_store_conformance() {
    let dir = tempfile::tempdir().unwrap();
    let store = FsBlobStore::open(dir.path().join("blobs"), BlobConfig::default())
        .await
        .unwrap();
    run_store_conformance(&store).await;
}

#[tokio::test]
async fn fs_store_leaves_no_temp_files_behind() {
    let dir = tempfile::tempdir().unwrap();
    let store = FsBlobStore::open(dir.path(), BlobConfig::default()).await.unwrap();

    store.put("files/a.txt", bytes_stream(&b"abc"[..])).await.unwrap();
    let _ = store.put("files/b.txt", failing_stream()).await;

    let mut names = Vec::new();
    let mut entries = tokio::fs::read_dir(dir.path().join("files")).await.unwrap();
    while let Some(entry) = entries.next_entry().await.unwrap() {
        names.push(entry.file_name().to_string_lossy().into_owned());
    }
    assert_eq!(names, vec!["a.txt".to_string()]);
}

#[tokio::test]
async fn reads_are_bounded_by_the_configured_buffer() {
    let config = BlobConfig::new().with_read_buffer_bytes(4);
    let store = MemoryBlobStore::with_config(config.clone());
    store.put("files/ten", bytes_stream(vec![7u8; 10])).await.unwrap();

    let got = store.get("files/ten").await.unwrap();
    let sizes: Vec<usize> = got.stream.map(|c| c.unwrap().len()).collect().await;
    assert_eq!(sizes, vec![4, 4, 2]);

    let dir = tempfile::tempdir().unwrap();
    let fs_store = FsBlobStore::open(dir.path(), config).await.unwrap();
    fs_store.put("files/ten", bytes_stream(vec![7u8; 10])).await.unwrap();
    let got = fs_store.get("files/ten").await.unwrap();
    let sizes: Vec<usize> = got.stream.map(|c| c.unwrap().len()).collect().await;
    assert!(sizes.iter().all(|s| *s <= 4));
    assert_eq!(sizes.iter().sum::<usize>(), 10);
}
