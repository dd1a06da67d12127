//! Folder transfers between the local filesystem and a bucket.

mod common;

use common::{BUCKET, Script, local_client, scripted_client};
use s3bridge::{ErrorKind, PutOptions, StoreError};
use std::path::Path;

async fn write_tree(root: &Path, files: &[(&str, &str)]) {
    for (relative, body) in files {
        let path = root.join(relative);
        tokio::fs::create_dir_all(path.parent().unwrap()).await.unwrap();
        tokio::fs::write(path, body).await.unwrap();
    }
}

#[tokio::test]
async fn upload_then_download_preserves_layout() {
    let (_root, client) = local_client().await;
    let source = tempfile::tempdir().unwrap();
    write_tree(
        source.path(),
        &[("a.txt", "aaa"), ("sub/b.txt", "bb"), ("sub/deeper/c.txt", "c")],
    )
    .await;

    let uploaded = client
        .upload_folder(source.path(), BUCKET, "backup")
        .await
        .unwrap();
    assert_eq!(uploaded.objects, 3);
    assert_eq!(uploaded.bytes, 6);

    let keys = client
        .list(BUCKET, "backup/")
        .unwrap()
        .collect_keys()
        .await
        .unwrap();
    assert_eq!(
        keys,
        vec!["backup/a.txt", "backup/sub/b.txt", "backup/sub/deeper/c.txt"]
    );

    let destination = tempfile::tempdir().unwrap();
    let downloaded = client
        .download_folder(BUCKET, "backup/", destination.path())
        .await
        .unwrap();
    assert_eq!(downloaded, uploaded);
    assert_eq!(
        tokio::fs::read_to_string(destination.path().join("sub/deeper/c.txt"))
            .await
            .unwrap(),
        "c"
    );
}

#[tokio::test]
async fn upload_of_missing_directory_is_a_local_error() {
    let (_root, client) = local_client().await;
    let scratch = tempfile::tempdir().unwrap();

    let err = client
        .upload_folder(scratch.path().join("absent"), BUCKET, "x")
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::LocalIo);
}

#[tokio::test]
async fn copy_folder_rebases_keys() {
    let (_root, client) = local_client().await;
    client.create_bucket("archive-bucket").await.unwrap();
    for key in ["logs/1.log", "logs/2023/2.log", "other/3.log"] {
        client
            .put(BUCKET, key, "line", &PutOptions::default())
            .await
            .unwrap();
    }

    let summary = client
        .copy_folder(BUCKET, "logs", "archive-bucket", "old/logs")
        .await
        .unwrap();
    assert_eq!(summary.objects, 2);

    let copied = client
        .list("archive-bucket", "")
        .unwrap()
        .collect_keys()
        .await
        .unwrap();
    assert_eq!(copied, vec!["old/logs/1.log", "old/logs/2023/2.log"]);
}

#[tokio::test]
async fn delete_folder_removes_only_that_folder() {
    let (_root, client) = local_client().await;
    for key in ["tmp/1", "tmp/nested/2", "tmpfile", "keep/3"] {
        client
            .put(BUCKET, key, "x", &PutOptions::default())
            .await
            .unwrap();
    }

    let summary = client.delete_folder(BUCKET, "tmp").await.unwrap();
    assert_eq!(summary.objects, 2);

    let left = client.list(BUCKET, "").unwrap().collect_keys().await.unwrap();
    assert_eq!(left, vec!["keep/3", "tmpfile"]);

    let err = client.delete_folder(BUCKET, "").await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Validation);
}

#[tokio::test]
async fn failures_are_collected_not_short_circuited() {
    let (_root, _storage, client) = scripted_client(Script::Unavailable).await;
    let source = tempfile::tempdir().unwrap();
    write_tree(source.path(), &[("one", "1"), ("two", "2"), ("three", "3")]).await;

    let err = client
        .upload_folder(source.path(), BUCKET, "dest")
        .await
        .unwrap_err();

    match err {
        StoreError::Incomplete { total, failures } => {
            assert_eq!(total, 3);
            let keys: Vec<&str> = failures.iter().map(|(key, _)| key.as_str()).collect();
            assert_eq!(keys, vec!["dest/one", "dest/three", "dest/two"]);
            assert!(failures.iter().all(|(_, e)| e.is_retryable()));
        }
        other => panic!("expected Incomplete, got {other:?}"),
    }
}
