use bytes::Bytes;
use dirstore::services::{
    chunk_decoder::UploadEncoding,
    storage_service::{ListObjectsParams, StorageError, StorageService},
};
use futures::{Stream, stream};
use std::io;

fn test_store() -> (tempfile::TempDir, StorageService) {
    let dir = tempfile::tempdir().unwrap();
    let store = StorageService::new(dir.path());
    (dir, store)
}

fn body(parts: &[&'static [u8]]) -> impl Stream<Item = io::Result<Bytes>> + Send + use<> {
    let chunks: Vec<io::Result<Bytes>> = parts.iter().map(|p| Ok(Bytes::from_static(p))).collect();
    stream::iter(chunks)
}

async fn put_raw(store: &StorageService, bucket: &str, key: &str, data: &'static [u8]) -> String {
    store
        .add_object(bucket, key, UploadEncoding::Raw, body(&[data]))
        .await
        .unwrap()
        .key
}

fn list_params(max_keys: usize) -> ListObjectsParams {
    ListObjectsParams {
        max_keys,
        ..Default::default()
    }
}

#[tokio::test]
async fn test_create_then_check_bucket() {
    let (_dir, store) = test_store();
    assert!(!store.check_bucket_exists("b").await.unwrap());

    store.create_bucket("b").await.unwrap();
    assert!(store.check_bucket_exists("b").await.unwrap());

    // creating again is a no-op at the store level
    store.create_bucket("b").await.unwrap();
}

#[tokio::test]
async fn test_delete_missing_bucket_is_not_found() {
    let (_dir, store) = test_store();
    let err = store.delete_bucket("ghost").await.unwrap_err();
    assert!(matches!(err, StorageError::BucketNotFound(name) if name == "ghost"));
}

#[tokio::test]
async fn test_delete_bucket_removes_contents() {
    let (dir, store) = test_store();
    store.create_bucket("b").await.unwrap();
    put_raw(&store, "b", "one.txt", b"1").await;
    put_raw(&store, "b", "nested/two.txt", b"2").await;

    store.delete_bucket("b").await.unwrap();

    assert!(!store.check_bucket_exists("b").await.unwrap());
    assert!(!dir.path().join("b").exists());
}

#[tokio::test]
async fn test_list_buckets_only_reports_directories() {
    let (dir, store) = test_store();
    store.create_bucket("zeta").await.unwrap();
    store.create_bucket("alpha").await.unwrap();
    std::fs::write(dir.path().join("stray-file"), b"x").unwrap();
    std::fs::create_dir(dir.path().join(".hidden")).unwrap();

    let names: Vec<_> = store
        .list_buckets()
        .await
        .into_iter()
        .map(|b| b.name)
        .collect();
    assert_eq!(names, ["alpha", "zeta"]);
}

#[tokio::test]
async fn test_list_buckets_swallows_missing_root() {
    let dir = tempfile::tempdir().unwrap();
    let store = StorageService::new(dir.path().join("does-not-exist"));
    assert!(store.list_buckets().await.is_empty());
}

#[tokio::test]
async fn test_raw_round_trip() {
    let (_dir, store) = test_store();
    store.create_bucket("b").await.unwrap();

    let stored = store
        .add_object("b", "o1", UploadEncoding::Raw, body(&[b"hel", b"lo"]))
        .await
        .unwrap();
    assert_eq!(stored.key, "o1");
    assert_eq!(stored.size, 5);
    assert_eq!(stored.etag, format!("{:x}", md5::compute(b"hello")));

    let (data, info) = store.get_object("b", "o1").await.unwrap();
    assert_eq!(data.as_ref(), b"hello");
    assert_eq!(info.size, 5);
    assert_eq!(info.key, "o1");
}

#[tokio::test]
async fn test_streaming_signal_decodes_chunks() {
    let (_dir, store) = test_store();
    store.create_bucket("b").await.unwrap();

    let framed: &[&'static [u8]] = &[
        b"5;chunk-signature=aaaa\r\nhel",
        b"lo\r\n0;chunk-signature=bbbb\r\n\r\n",
    ];
    let stored = store
        .add_object("b", "greeting.txt", UploadEncoding::AwsChunked, body(framed))
        .await
        .unwrap();
    assert_eq!(stored.size, 5);

    let (data, _) = store.get_object("b", "greeting.txt").await.unwrap();
    assert_eq!(data.as_ref(), b"hello");
}

#[tokio::test]
async fn test_malformed_chunks_fail_and_leave_nothing_behind() {
    let (dir, store) = test_store();
    store.create_bucket("b").await.unwrap();

    let err = store
        .add_object(
            "b",
            "broken",
            UploadEncoding::AwsChunked,
            body(&[b"10;chunk-signature=aaaa\r\nshort"]),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, StorageError::MalformedStream(_)));
    assert!(!dir.path().join("b").join("broken").exists());
}

#[tokio::test]
async fn test_put_into_missing_bucket_is_not_found() {
    let (_dir, store) = test_store();
    let err = store
        .add_object("nope", "k", UploadEncoding::Raw, body(&[b"x"]))
        .await
        .unwrap_err();
    assert!(matches!(err, StorageError::BucketNotFound(_)));
}

#[tokio::test]
async fn test_second_put_is_renamed_not_overwritten() {
    let (_dir, store) = test_store();
    store.create_bucket("b").await.unwrap();

    assert_eq!(put_raw(&store, "b", "report.pdf", b"first").await, "report.pdf");
    assert_eq!(put_raw(&store, "b", "report.pdf", b"second").await, "report-1.pdf");
    assert_eq!(put_raw(&store, "b", "report.pdf", b"third").await, "report-2.pdf");

    let (first, _) = store.get_object("b", "report.pdf").await.unwrap();
    let (second, _) = store.get_object("b", "report-1.pdf").await.unwrap();
    assert_eq!(first.as_ref(), b"first");
    assert_eq!(second.as_ref(), b"second");
}

#[tokio::test]
async fn test_check_object_exist_reports_absence_as_none() {
    let (_dir, store) = test_store();
    store.create_bucket("b").await.unwrap();
    assert!(store.check_object_exist("b", "missing").await.unwrap().is_none());

    put_raw(&store, "b", "present", b"1234").await;
    let info = store.check_object_exist("b", "present").await.unwrap().unwrap();
    assert_eq!(info.size, 4);
}

#[tokio::test]
async fn test_get_and_delete_missing_object() {
    let (_dir, store) = test_store();
    store.create_bucket("b").await.unwrap();

    assert!(matches!(
        store.get_object("b", "missing").await.unwrap_err(),
        StorageError::ObjectNotFound { .. }
    ));
    assert!(matches!(
        store.delete_object("b", "missing").await.unwrap_err(),
        StorageError::ObjectNotFound { .. }
    ));
}

#[tokio::test]
async fn test_delete_nested_object_prunes_empty_dirs() {
    let (dir, store) = test_store();
    store.create_bucket("b").await.unwrap();
    put_raw(&store, "b", "a/b/c.txt", b"deep").await;

    store.delete_object("b", "a/b/c.txt").await.unwrap();

    assert!(!dir.path().join("b").join("a").exists());
    assert!(dir.path().join("b").exists());
}

#[tokio::test]
async fn test_traversal_keys_are_rejected() {
    let (_dir, store) = test_store();
    store.create_bucket("b").await.unwrap();

    let err = store
        .add_object("b", "../escape", UploadEncoding::Raw, body(&[b"x"]))
        .await
        .unwrap_err();
    assert!(matches!(err, StorageError::InvalidObjectKey { .. }));

    let err = store.create_bucket("../up").await.unwrap_err();
    assert!(matches!(err, StorageError::InvalidBucketName { .. }));
}

#[tokio::test]
async fn test_list_objects_truncates_at_max_keys() {
    let (_dir, store) = test_store();
    store.create_bucket("b").await.unwrap();
    for key in ["c", "a", "b", "d"] {
        put_raw(&store, "b", key, b"x").await;
    }

    let page = store.list_objects("b", &list_params(3)).await.unwrap();
    let keys: Vec<_> = page.objects.iter().map(|o| o.key.as_str()).collect();
    assert_eq!(keys, ["a", "b", "c"]);
    assert!(page.is_truncated);
    assert_eq!(page.next_marker.as_deref(), Some("c"));

    let all = store.list_objects("b", &list_params(4)).await.unwrap();
    assert_eq!(all.objects.len(), 4);
    assert!(!all.is_truncated);
    assert!(all.next_marker.is_none());
}

#[tokio::test]
async fn test_list_objects_prefix_and_marker() {
    let (_dir, store) = test_store();
    store.create_bucket("b").await.unwrap();
    for key in ["img-1", "img-2", "img-3", "doc-1"] {
        put_raw(&store, "b", key, b"x").await;
    }

    let params = ListObjectsParams {
        prefix: Some("img-".into()),
        marker: Some("img-1".into()),
        max_keys: 1000,
        ..Default::default()
    };
    let page = store.list_objects("b", &params).await.unwrap();
    let keys: Vec<_> = page.objects.iter().map(|o| o.key.as_str()).collect();
    assert_eq!(keys, ["img-2", "img-3"]);
}

#[tokio::test]
async fn test_list_objects_groups_by_delimiter() {
    let (_dir, store) = test_store();
    store.create_bucket("b").await.unwrap();
    for key in ["top.txt", "photos/a.jpg", "photos/b.jpg", "docs/x/y.md"] {
        put_raw(&store, "b", key, b"x").await;
    }

    let params = ListObjectsParams {
        delimiter: Some("/".into()),
        max_keys: 1000,
        ..Default::default()
    };
    let page = store.list_objects("b", &params).await.unwrap();
    let keys: Vec<_> = page.objects.iter().map(|o| o.key.as_str()).collect();
    assert_eq!(keys, ["top.txt"]);
    assert_eq!(page.common_prefixes, ["docs/", "photos/"]);
}

#[tokio::test]
async fn test_list_objects_zero_max_keys() {
    let (_dir, store) = test_store();
    store.create_bucket("b").await.unwrap();
    put_raw(&store, "b", "only", b"x").await;

    let page = store.list_objects("b", &list_params(0)).await.unwrap();
    assert!(page.objects.is_empty());
    assert!(page.is_truncated);
}

#[tokio::test]
async fn test_list_objects_missing_bucket() {
    let (_dir, store) = test_store();
    let err = store.list_objects("nope", &list_params(10)).await.unwrap_err();
    assert!(matches!(err, StorageError::BucketNotFound(_)));
}

#[tokio::test]
async fn test_key_below_an_object_is_absent() {
    let (_dir, store) = test_store();
    store.create_bucket("b").await.unwrap();
    put_raw(&store, "b", "a", b"file").await;

    assert!(store.check_object_exist("b", "a/x").await.unwrap().is_none());
    assert!(matches!(
        store.get_object("b", "a/x").await.unwrap_err(),
        StorageError::ObjectNotFound { .. }
    ));
    assert!(matches!(
        store.delete_object("b", "a/x").await.unwrap_err(),
        StorageError::ObjectNotFound { .. }
    ));

    let err = store
        .add_object("b", "a/y", UploadEncoding::Raw, body(&[b"x"]))
        .await
        .unwrap_err();
    assert!(matches!(err, StorageError::InvalidObjectKey { .. }));

    let (data, _) = store.get_object("b", "a").await.unwrap();
    assert_eq!(data.as_ref(), b"file");
}

#[tokio::test]
async fn test_bucket_name_taken_by_a_file() {
    let (dir, store) = test_store();
    std::fs::write(dir.path().join("taken"), b"x").unwrap();

    assert!(!store.check_bucket_exists("taken").await.unwrap());
    let err = store.create_bucket("taken").await.unwrap_err();
    assert!(matches!(err, StorageError::BucketAlreadyExists(name) if name == "taken"));
}
