use bytes::Bytes;
use link_hub::blob_store::{blob_key, BlobStore, BlobStoreError, LocalStore};

#[tokio::test]
async fn test_local_store_put_get() {
    let dir = tempfile::tempdir().unwrap();
    let store = LocalStore::new(dir.path()).unwrap();

    let data = Bytes::from("https://example.com\n");
    store.put("1/urls.txt", data.clone()).await.unwrap();

    let retrieved = store.get("1/urls.txt").await.unwrap();
    assert_eq!(retrieved, data);
    assert!(dir.path().join("1").join("urls.txt").exists());
}

#[tokio::test]
async fn test_local_store_is_write_once() {
    let dir = tempfile::tempdir().unwrap();
    let store = LocalStore::new(dir.path()).unwrap();

    store.put("key.txt", Bytes::from("first")).await.unwrap();
    let result = store.put("key.txt", Bytes::from("second")).await;
    assert!(matches!(result, Err(BlobStoreError::AlreadyExists(_))));

    let data = store.get("key.txt").await.unwrap();
    assert_eq!(data, Bytes::from("first"));
}

#[tokio::test]
async fn test_local_store_exists_and_delete() {
    let dir = tempfile::tempdir().unwrap();
    let store = LocalStore::new(dir.path()).unwrap();

    assert!(!store.exists("present.txt").await.unwrap());
    store.put("present.txt", Bytes::from("data")).await.unwrap();
    assert!(store.exists("present.txt").await.unwrap());

    store.delete("present.txt").await.unwrap();
    assert!(!store.exists("present.txt").await.unwrap());

    // Deleting a nonexistent key should not error
    store.delete("present.txt").await.unwrap();
}

#[tokio::test]
async fn test_local_store_get_not_found() {
    let dir = tempfile::tempdir().unwrap();
    let store = LocalStore::new(dir.path()).unwrap();

    let result = store.get("missing.txt").await;
    assert!(matches!(result, Err(BlobStoreError::NotFound(_))));
}

#[tokio::test]
async fn test_local_store_rejects_escaping_keys() {
    let dir = tempfile::tempdir().unwrap();
    let store = LocalStore::new(dir.path().join("blobs")).unwrap();

    for key in ["../outside.txt", "/etc/passwd", "a/../../b.txt", ""] {
        let result = store.put(key, Bytes::from("x")).await;
        assert!(
            matches!(result, Err(BlobStoreError::InvalidKey(_))),
            "key {key:?} should be rejected"
        );
    }
}

#[tokio::test]
async fn test_generated_keys_store_side_by_side() {
    let dir = tempfile::tempdir().unwrap();
    let store = LocalStore::new(dir.path()).unwrap();

    let first = blob_key("7", ".txt");
    let second = blob_key("7", ".txt");
    store.put(&first, Bytes::from("a")).await.unwrap();
    store.put(&second, Bytes::from("b")).await.unwrap();

    assert_eq!(store.get(&first).await.unwrap(), Bytes::from("a"));
    assert_eq!(store.get(&second).await.unwrap(), Bytes::from("b"));
}
