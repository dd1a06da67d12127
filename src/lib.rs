#![forbid(unsafe_code)]

//! # s3bridge
//!
//! A convenience layer over the AWS S3 SDK. [`ObjectStoreClient`] exposes
//! upload, download, listing, delete, copy, existence checks and presigned
//! URLs behind one API, validates arguments before anything reaches the
//! network, and reports every failure through [`StoreError`].
//!
//! ```no_run
//! use s3bridge::{Credentials, ObjectStoreClient, PutOptions, S3Config, StoreConfig};
//! use std::time::Duration;
//!
//! # async fn run() -> s3bridge::StoreResult<()> {
//! let config = StoreConfig::s3(S3Config::new(
//!     "eu-west-1",
//!     Credentials::Profile { name: "default".into() },
//! ));
//! let client = ObjectStoreClient::connect(config).await?;
//!
//! client.put("my-bucket", "a/b.txt", "hello", &PutOptions::default()).await?;
//! let keys = client.list("my-bucket", "a/")?.collect_keys().await?;
//! let link = client.presigned_url("my-bucket", "a/b.txt", Duration::from_secs(60)).await?;
//! # let _ = (keys, link);
//! # Ok(())
//! # }
//! ```

/// Tracing target for every event emitted by this crate.
pub const TRACING_TARGET: &str = "s3bridge";

mod client;
mod core;
mod listing;
mod scope;
mod transfer;

pub mod config;
pub mod error;
pub mod storage_clients;

pub use client::ObjectStoreClient;
pub use config::{
    BackendConfig, Credentials, LocalConfig, S3Config, StoreConfig, TimeoutSettings,
    TransferConfig,
};
pub use crate::core::filter::KeyFilter;
pub use crate::core::metadata::{
    DeleteMode, LinkStyle, ListPage, ObjectInfo, ObjectSummary, PageRequest, Payload,
    PresignMethod, PresignedRequest, PutOptions, PutReceipt, WaitOptions,
};
pub use crate::core::uri::{S3Uri, is_folder_key};
pub use error::{ErrorKind, Missing, StoreError, StoreResult};
pub use listing::{ListOptions, ObjectListing};
pub use scope::ScopedStore;
pub use storage_clients::{ClientStorage, LocalClientStorage, S3ClientStorage};
pub use transfer::TransferSummary;
