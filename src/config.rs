//! Client configuration.
//!
//! Everything a client needs is spelled out here, including which credential
//! source to use: nothing is picked up from the process environment unless
//! [`Credentials::Environment`] is selected explicitly.

use crate::error::{StoreError, StoreResult};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

const SECRET_MASK: &str = "********";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoreConfig {
    pub backend: BackendConfig,
    #[serde(default)]
    pub transfer: TransferConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum BackendConfig {
    S3(S3Config),
    Local(LocalConfig),
}

impl BackendConfig {
    pub fn backend_name(&self) -> &'static str {
        match self {
            BackendConfig::S3(_) => "s3",
            BackendConfig::Local(_) => "local",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct S3Config {
    #[serde(default = "default_region")]
    pub region: String,
    pub credentials: Credentials,
    /// Alternate service URL (MinIO, R2, a VPC endpoint...).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub endpoint_override: Option<String>,
    #[serde(default)]
    pub force_path_style: bool,
    #[serde(default)]
    pub timeouts: TimeoutSettings,
    /// Attempts per request, handed to the SDK's standard retry strategy.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_attempts: Option<u32>,
}

fn default_region() -> String {
    "us-east-1".to_string()
}

impl S3Config {
    pub fn new(region: impl Into<String>, credentials: Credentials) -> Self {
        Self {
            region: region.into(),
            credentials,
            endpoint_override: None,
            force_path_style: false,
            timeouts: TimeoutSettings::default(),
            max_attempts: None,
        }
    }

    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint_override = Some(endpoint.into());
        self
    }

    pub fn with_path_style(mut self, force_path_style: bool) -> Self {
        self.force_path_style = force_path_style;
        self
    }

    pub fn with_operation_timeout(mut self, timeout: Duration) -> Self {
        self.timeouts.operation_secs = Some(timeout.as_secs());
        self
    }

    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = Some(max_attempts);
        self
    }

    pub(crate) fn validate(&self) -> StoreResult<()> {
        if self.region.trim().is_empty() || self.region.contains(char::is_whitespace) {
            return Err(StoreError::config(format!(
                "'{}' is not a valid region",
                self.region
            )));
        }

        if let Some(endpoint) = &self.endpoint_override {
            if !endpoint.starts_with("http://") && !endpoint.starts_with("https://") {
                return Err(StoreError::config(format!(
                    "endpoint_override '{}' must be an http(s) URL",
                    endpoint
                )));
            }
        }

        if self.max_attempts == Some(0) {
            return Err(StoreError::config("max_attempts must be at least 1"));
        }

        self.timeouts.validate()?;
        self.credentials.validate()
    }
}

/// Where the S3 client gets its credentials from.
#[derive(Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "source", rename_all = "snake_case")]
pub enum Credentials {
    /// A fixed access key pair.
    Static {
        access_key_id: String,
        secret_access_key: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        session_token: Option<String>,
    },
    /// A named profile from the shared AWS config/credentials files.
    Profile { name: String },
    /// A role assumed through STS, using the default chain as source identity.
    AssumeRole {
        role_arn: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        session_name: Option<String>,
    },
    /// The SDK default provider chain (environment, profile, IMDS...).
    Environment,
}

impl Credentials {
    pub fn access_key(
        access_key_id: impl Into<String>,
        secret_access_key: impl Into<String>,
    ) -> Self {
        Credentials::Static {
            access_key_id: access_key_id.into(),
            secret_access_key: secret_access_key.into(),
            session_token: None,
        }
    }

    fn validate(&self) -> StoreResult<()> {
        match self {
            Credentials::Static {
                access_key_id,
                secret_access_key,
                ..
            } => {
                if access_key_id.is_empty() || secret_access_key.is_empty() {
                    return Err(StoreError::config(
                        "static credentials need both access_key_id and secret_access_key",
                    ));
                }
            }
            Credentials::Profile { name } => {
                if name.is_empty() {
                    return Err(StoreError::config("profile name must not be empty"));
                }
            }
            Credentials::AssumeRole { role_arn, .. } => {
                if !role_arn.starts_with("arn:") {
                    return Err(StoreError::config(format!(
                        "'{}' is not a role ARN",
                        role_arn
                    )));
                }
            }
            Credentials::Environment => {}
        }

        Ok(())
    }

    fn describe(&self) -> String {
        match self {
            Credentials::Static { .. } => format!("static ({})", SECRET_MASK),
            Credentials::Profile { name } => format!("profile '{}'", name),
            Credentials::AssumeRole { role_arn, .. } => format!("role '{}'", role_arn),
            Credentials::Environment => "environment".to_string(),
        }
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Credentials::Static { session_token, .. } => f
                .debug_struct("Static")
                .field("access_key_id", &SECRET_MASK)
                .field("secret_access_key", &SECRET_MASK)
                .field("session_token", &session_token.as_ref().map(|_| SECRET_MASK))
                .finish(),
            Credentials::Profile { name } => f.debug_struct("Profile").field("name", name).finish(),
            Credentials::AssumeRole {
                role_arn,
                session_name,
            } => f
                .debug_struct("AssumeRole")
                .field("role_arn", role_arn)
                .field("session_name", session_name)
                .finish(),
            Credentials::Environment => f.write_str("Environment"),
        }
    }
}

/// Per-request time limits passed to the SDK. Unset means the SDK default.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeoutSettings {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub operation_secs: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attempt_secs: Option<u64>,
}

impl TimeoutSettings {
    pub fn operation(&self) -> Option<Duration> {
        self.operation_secs.map(Duration::from_secs)
    }

    pub fn attempt(&self) -> Option<Duration> {
        self.attempt_secs.map(Duration::from_secs)
    }

    pub fn is_empty(&self) -> bool {
        self.operation_secs.is_none() && self.attempt_secs.is_none()
    }

    fn validate(&self) -> StoreResult<()> {
        if self.operation_secs == Some(0) || self.attempt_secs == Some(0) {
            return Err(StoreError::config("timeouts must be positive"));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocalConfig {
    pub root: PathBuf,
    #[serde(default = "default_create_root")]
    pub create_root: bool,
}

fn default_create_root() -> bool {
    true
}

impl LocalConfig {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            create_root: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferConfig {
    /// Upper bound on concurrent backend calls in folder operations.
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
}

fn default_concurrency() -> usize {
    num_cpus::get() * 2
}

impl Default for TransferConfig {
    fn default() -> Self {
        Self {
            concurrency: default_concurrency(),
        }
    }
}

impl StoreConfig {
    pub fn s3(config: S3Config) -> Self {
        Self {
            backend: BackendConfig::S3(config),
            transfer: TransferConfig::default(),
        }
    }

    pub fn local(root: impl Into<PathBuf>) -> Self {
        Self {
            backend: BackendConfig::Local(LocalConfig::new(root)),
            transfer: TransferConfig::default(),
        }
    }

    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.transfer.concurrency = concurrency;
        self
    }

    /// Parses and validates a JSON document.
    pub fn from_json(json: &str) -> StoreResult<Self> {
        let config: StoreConfig = serde_json::from_str(json)
            .map_err(|e| StoreError::config(format!("failed to parse config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_path(path: impl AsRef<Path>) -> StoreResult<Self> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path).map_err(|e| StoreError::local_io(path, e))?;
        Self::from_json(&json)
    }

    pub fn validate(&self) -> StoreResult<()> {
        if self.transfer.concurrency == 0 {
            return Err(StoreError::config("transfer concurrency must be at least 1"));
        }

        match &self.backend {
            BackendConfig::S3(s3) => s3.validate(),
            BackendConfig::Local(local) => {
                if local.root.as_os_str().is_empty() {
                    return Err(StoreError::config("local root must not be empty"));
                }
                Ok(())
            }
        }
    }

    /// One-line summary safe to log: secrets are masked.
    pub fn describe(&self) -> String {
        let mut parts = vec![format!("backend: {}", self.backend.backend_name())];

        match &self.backend {
            BackendConfig::S3(s3) => {
                parts.push(format!("region: {}", s3.region));
                if let Some(endpoint) = &s3.endpoint_override {
                    parts.push(format!("endpoint: {}", endpoint));
                }
                parts.push(format!("credentials: {}", s3.credentials.describe()));
            }
            BackendConfig::Local(local) => {
                parts.push(format!("root: {}", local.root.display()));
            }
        }

        parts.push(format!("concurrency: {}", self.transfer.concurrency));
        parts.join(", ")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    #[test]
    fn parses_an_s3_config_with_defaults() {
        let config = StoreConfig::from_json(
            r#"{
                "backend": {
                    "type": "s3",
                    "credentials": {
                        "source": "static",
                        "access_key_id": "AKIDEXAMPLE",
                        "secret_access_key": "wJalrXUtnFEMI"
                    },
                    "endpoint_override": "http://localhost:9000",
                    "force_path_style": true
                },
                "transfer": { "concurrency": 4 }
            }"#,
        )
        .unwrap();

        let BackendConfig::S3(s3) = &config.backend else {
            panic!("expected an s3 backend");
        };
        assert_eq!(s3.region, "us-east-1");
        assert!(s3.force_path_style);
        assert!(s3.timeouts.is_empty());
        assert_eq!(config.transfer.concurrency, 4);
    }

    #[test]
    fn credentials_must_be_chosen_explicitly() {
        let err = StoreConfig::from_json(r#"{ "backend": { "type": "s3" } }"#).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Config);

        let config = StoreConfig::from_json(
            r#"{ "backend": { "type": "s3", "credentials": { "source": "environment" } } }"#,
        )
        .unwrap();
        assert_eq!(config.transfer, TransferConfig::default());
    }

    #[test]
    fn rejects_invalid_fields() {
        let bad_endpoint = StoreConfig::s3(
            S3Config::new("eu-west-1", Credentials::Environment).with_endpoint("localhost:9000"),
        );
        assert!(bad_endpoint.validate().is_err());

        let bad_keys = StoreConfig::s3(S3Config::new("eu-west-1", Credentials::access_key("", "")));
        assert!(bad_keys.validate().is_err());

        let bad_role = StoreConfig::s3(S3Config::new(
            "eu-west-1",
            Credentials::AssumeRole {
                role_arn: "my-role".into(),
                session_name: None,
            },
        ));
        assert!(bad_role.validate().is_err());

        let no_workers = StoreConfig::local("/tmp/store").with_concurrency(0);
        assert!(no_workers.validate().is_err());

        let zero_timeout = StoreConfig::s3(
            S3Config::new("eu-west-1", Credentials::Environment)
                .with_operation_timeout(Duration::ZERO),
        );
        assert!(zero_timeout.validate().is_err());
    }

    #[test]
    fn secrets_never_show_up_in_debug_or_describe() {
        let config = StoreConfig::s3(S3Config::new(
            "eu-west-1",
            Credentials::access_key("AKIDEXAMPLE", "wJalrXUtnFEMI"),
        ));

        let debug = format!("{:?}", config);
        let described = config.describe();
        for text in [&debug, &described] {
            assert!(!text.contains("AKIDEXAMPLE"), "{text}");
            assert!(!text.contains("wJalrXUtnFEMI"), "{text}");
        }
        assert!(described.contains("region: eu-west-1"));
    }

    #[test]
    fn loads_local_config_from_a_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("store.json");
        std::fs::write(
            &path,
            r#"{ "backend": { "type": "local", "root": "/srv/objects" } }"#,
        )
        .unwrap();

        let config = StoreConfig::from_path(&path).unwrap();
        assert_eq!(
            config.backend,
            BackendConfig::Local(LocalConfig::new("/srv/objects"))
        );

        let missing = StoreConfig::from_path(dir.path().join("nope.json")).unwrap_err();
        assert_eq!(missing.kind(), ErrorKind::LocalIo);
    }
}
