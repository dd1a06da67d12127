//! Listing, pagination and folder-style views.

mod common;

use common::{BUCKET, Script, local_client, scripted_client};
use futures::TryStreamExt;
use regex::Regex;
use s3bridge::{ErrorKind, KeyFilter, ListOptions, ObjectStoreClient, PutOptions};

async fn seed(client: &ObjectStoreClient, keys: &[&str]) {
    for key in keys {
        client
            .put(BUCKET, key, key.as_bytes().to_vec(), &PutOptions::default())
            .await
            .unwrap();
    }
}

#[tokio::test]
async fn list_returns_exactly_the_live_keys_under_prefix() {
    let (_root, client) = local_client().await;
    seed(
        &client,
        &["a/1.txt", "a/2.txt", "a/deep/3.txt", "ab.txt", "b/4.txt"],
    )
    .await;
    client.delete(BUCKET, "a/2.txt").await.unwrap();

    let keys = client.list(BUCKET, "a/").unwrap().collect_keys().await.unwrap();
    assert_eq!(keys, vec!["a/1.txt", "a/deep/3.txt"]);

    let everything = client.list(BUCKET, "").unwrap().collect_keys().await.unwrap();
    assert_eq!(everything.len(), 4);
}

#[tokio::test]
async fn list_follows_continuation_tokens() {
    let (_root, client) = local_client().await;
    seed(&client, &["p/1", "p/2", "p/3", "q/4"]).await;

    let listing = client
        .list_with(BUCKET, "p/", ListOptions::default().with_page_size(1))
        .unwrap();

    let pages: Vec<_> = listing.pages().try_collect().await.unwrap();
    assert_eq!(pages.len(), 3);
    assert!(pages.iter().all(|page| page.objects.len() == 1));
    assert!(pages.last().unwrap().next_token.is_none());

    let keys = listing.collect_keys().await.unwrap();
    assert_eq!(keys, vec!["p/1", "p/2", "p/3"]);
}

#[tokio::test]
async fn listing_is_restartable() {
    let (_root, client) = local_client().await;
    seed(&client, &["x/1", "x/2"]).await;

    let listing = client.list(BUCKET, "x/").unwrap();
    let first = listing.collect_keys().await.unwrap();

    seed(&client, &["x/3"]).await;
    let second = listing.collect_keys().await.unwrap();

    assert_eq!(first, vec!["x/1", "x/2"]);
    assert_eq!(second, vec!["x/1", "x/2", "x/3"]);
}

#[tokio::test]
async fn empty_prefix_listing_yields_nothing() {
    let (_root, client) = local_client().await;

    let keys = client
        .list(BUCKET, "nothing/")
        .unwrap()
        .collect_keys()
        .await
        .unwrap();
    assert!(keys.is_empty());
}

#[tokio::test]
async fn delimiter_groups_common_prefixes() {
    let (_root, client) = local_client().await;
    seed(&client, &["r/a.txt", "r/s/b.txt", "r/t/c.txt"]).await;

    let listing = client
        .list_with(BUCKET, "r/", ListOptions::default().with_delimiter("/"))
        .unwrap();

    assert_eq!(listing.collect_keys().await.unwrap(), vec!["r/a.txt"]);
    let prefixes: Vec<String> = listing.common_prefixes().try_collect().await.unwrap();
    assert_eq!(prefixes, vec!["r/s/", "r/t/"]);
}

#[tokio::test]
async fn non_advancing_token_is_a_transfer_error() {
    let (_root, _storage, client) = scripted_client(Script::StuckPagination).await;

    let err = client
        .list(BUCKET, "")
        .unwrap()
        .collect_keys()
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Transfer);
}

#[tokio::test]
async fn invalid_listing_options_are_rejected() {
    let (_root, client) = local_client().await;

    let err = client
        .list_with(BUCKET, "", ListOptions::default().with_page_size(0))
        .err()
        .unwrap();
    assert_eq!(err.kind(), ErrorKind::Validation);

    let err = client.list("x", "").err().unwrap();
    assert_eq!(err.kind(), ErrorKind::Validation);
}

#[tokio::test]
async fn listing_a_missing_bucket_fails() {
    let (_root, client) = local_client().await;

    let err = client
        .list("other-bucket", "")
        .unwrap()
        .collect_keys()
        .await
        .unwrap_err();
    assert!(err.is_missing_bucket());
}

#[tokio::test]
async fn folder_views_apply_filters() {
    let (_root, client) = local_client().await;
    seed(
        &client,
        &[
            "data/2024.csv",
            "data/2025.CSV",
            "data/notes.json",
            "data/raw/x.csv",
            "data/reports/y.csv",
        ],
    )
    .await;

    let files = client
        .list_files(BUCKET, "data", &KeyFilter::default())
        .await
        .unwrap();
    assert_eq!(
        files,
        vec!["data/2024.csv", "data/2025.CSV", "data/notes.json"]
    );

    let csv = client
        .list_files(BUCKET, "data/", &KeyFilter::default().extension("csv"))
        .await
        .unwrap();
    assert_eq!(csv, vec!["data/2024.csv", "data/2025.CSV"]);

    let folders = client
        .list_folders(BUCKET, "data", &KeyFilter::default().ends_with("raw"))
        .await
        .unwrap();
    assert_eq!(folders, vec!["data/raw/"]);

    let contents = client
        .list_folder_contents(
            BUCKET,
            "data",
            &KeyFilter::default().pattern(Regex::new(r"/(2024|r)").unwrap()),
        )
        .await
        .unwrap();
    assert_eq!(contents, vec!["data/2024.csv", "data/raw/", "data/reports/"]);
}

#[tokio::test]
async fn single_entry_pages_step_over_common_prefixes() {
    let (_root, client) = local_client().await;
    seed(
        &client,
        &[
            "r/a.txt",
            "r/s-x.txt",
            "r/s/1.txt",
            "r/s/2.txt",
            "r/t/3.txt",
            "r/u.txt",
        ],
    )
    .await;

    let listing = client
        .list_with(
            BUCKET,
            "r/",
            ListOptions::default().with_delimiter("/").with_page_size(1),
        )
        .unwrap();

    let pages: Vec<_> = listing.pages().try_collect().await.unwrap();
    let names: Vec<String> = pages
        .iter()
        .flat_map(|page| {
            page.objects
                .iter()
                .map(|object| object.key.clone())
                .chain(page.common_prefixes.iter().cloned())
        })
        .collect();
    assert_eq!(
        names,
        vec!["r/a.txt", "r/s-x.txt", "r/s/", "r/t/", "r/u.txt"]
    );
    assert_eq!(pages.len(), 5);
    assert_eq!(pages[2].next_token.as_deref(), Some("r/s/"));
    assert!(pages.last().unwrap().next_token.is_none());
}

#[tokio::test]
async fn folder_exists_checks_for_any_key_below() {
    let (_root, storage, client) = scripted_client(Script::PassThrough).await;
    seed(&client, &["data/raw/x.csv", "database.txt"]).await;
    storage.reset_calls();

    assert!(client.folder_exists(BUCKET, "data").await.unwrap());
    assert!(client.folder_exists(BUCKET, "data/raw/").await.unwrap());
    assert!(!client.folder_exists(BUCKET, "data/raw/x.csv").await.unwrap());
    assert!(!client.folder_exists(BUCKET, "databa").await.unwrap());
    assert_eq!(storage.calls(), 4);

    let err = client.folder_exists(BUCKET, "").await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Validation);

    let err = client.folder_exists("other-bucket", "data").await.unwrap_err();
    assert!(err.is_missing_bucket());
}
