//! The stanza configuration record handed over by the reconciliation layer,
//! and its environment encoding.

mod credentials;
mod restore;

pub use credentials::{SecretResolver, credentials_env, selected_repository_env};
pub use restore::{RecoveryTarget, RestoreOptions};

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::envvar::{self, EnvField, EnvRecord, FieldMeta, FieldValue};

pub const ENV_PREFIX: &str = "PGBACKREST_";
pub const DEFAULT_LOCK_PATH: &str = "/controller/tmp/pgbackrest-cnpg-plugin.lock";

/// Reference to a single key inside a named secret.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SecretKeySelector {
    pub name: String,
    pub key: String,
}

/// Retention strategy for a repository.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Retention {
    /// Number of backups worth of continuous WAL to retain.
    pub archive: i32,
    /// `full`, `diff` or `incr`.
    pub archive_type: String,
    /// Full backup retention count or days, depending on `full_type`.
    pub full: i32,
    /// `count` or `time`.
    pub full_type: String,
    pub diff: i32,
    /// Days of backup history manifests to keep; `0` is meaningful.
    pub history: Option<i32>,
}

impl EnvRecord for Retention {
    fn env_fields(&self) -> Vec<EnvField<'_>> {
        vec![
            EnvField::new(FieldMeta::key("ARCHIVE"), FieldValue::scalar(self.archive)),
            EnvField::new(FieldMeta::key("ARCHIVE_TYPE"), FieldValue::scalar(&self.archive_type)),
            EnvField::new(FieldMeta::key("FULL"), FieldValue::scalar(self.full)),
            EnvField::new(FieldMeta::key("FULL_TYPE"), FieldValue::scalar(&self.full_type)),
            EnvField::new(FieldMeta::key("DIFF"), FieldValue::scalar(self.diff)),
            EnvField::new(FieldMeta::key("HISTORY"), FieldValue::optional(self.history)),
        ]
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CipherConfig {
    /// Secret holding the repository encryption passphrase.
    #[serde(default, rename = "encryptionPass")]
    pub pass_reference: Option<SecretKeySelector>,
    #[serde(default, rename = "type")]
    pub cipher_type: String,
}

impl EnvRecord for CipherConfig {
    fn env_fields(&self) -> Vec<EnvField<'_>> {
        vec![EnvField::new(FieldMeta::key("TYPE"), FieldValue::scalar(&self.cipher_type))]
    }
}

/// Credentials of an S3 repository.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct S3SecretRef {
    #[serde(default)]
    pub access_key_id: Option<SecretKeySelector>,
    #[serde(default)]
    pub secret_access_key: Option<SecretKeySelector>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct S3Repository {
    pub bucket: String,
    pub endpoint: String,
    pub region: String,
    #[serde(default)]
    pub uri_style: String,
    #[serde(default, rename = "verifyTLS")]
    pub verify_tls: Option<bool>,
    #[serde(default)]
    pub secret_ref: Option<S3SecretRef>,
    pub repo_path: String,
    #[serde(default)]
    pub retention_policy: Retention,
    #[serde(default, rename = "cipherConfig")]
    pub cipher: Option<CipherConfig>,
}

impl EnvRecord for S3Repository {
    fn env_fields(&self) -> Vec<EnvField<'_>> {
        vec![
            EnvField::new(FieldMeta::key("_S3_BUCKET"), FieldValue::scalar(&self.bucket)),
            EnvField::new(FieldMeta::key("_S3_ENDPOINT"), FieldValue::scalar(&self.endpoint)),
            EnvField::new(FieldMeta::key("_S3_REGION"), FieldValue::scalar(&self.region)),
            EnvField::new(FieldMeta::key("_S3_URI_STYLE"), FieldValue::scalar(&self.uri_style)),
            EnvField::new(FieldMeta::key("_S3_VERIFY_TLS"), FieldValue::optional(self.verify_tls)),
            EnvField::new(FieldMeta::key("_PATH"), FieldValue::scalar(&self.repo_path)),
            EnvField::new(
                FieldMeta::nested("_RETENTION_"),
                FieldValue::record(&self.retention_policy),
            ),
            EnvField::new(
                FieldMeta::nested("_CIPHER_"),
                FieldValue::optional_record(self.cipher.as_ref()),
            ),
        ]
    }
}

/// Credentials of an Azure repository.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AzureSecretRef {
    #[serde(default)]
    pub key_reference: Option<SecretKeySelector>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AzureRepository {
    pub account: String,
    pub container: String,
    #[serde(default)]
    pub endpoint: String,
    #[serde(default)]
    pub uri_style: String,
    /// `shared` or `sas`.
    #[serde(default)]
    pub key_type: String,
    #[serde(default, rename = "verifyTLS")]
    pub verify_tls: Option<bool>,
    #[serde(default)]
    pub secret_ref: Option<AzureSecretRef>,
    pub repo_path: String,
    #[serde(default)]
    pub retention_policy: Retention,
    #[serde(default, rename = "cipherConfig")]
    pub cipher: Option<CipherConfig>,
}

impl EnvRecord for AzureRepository {
    fn env_fields(&self) -> Vec<EnvField<'_>> {
        vec![
            EnvField::new(FieldMeta::key("_AZURE_ACCOUNT"), FieldValue::scalar(&self.account)),
            EnvField::new(FieldMeta::key("_AZURE_CONTAINER"), FieldValue::scalar(&self.container)),
            EnvField::new(FieldMeta::key("_AZURE_ENDPOINT"), FieldValue::scalar(&self.endpoint)),
            EnvField::new(FieldMeta::key("_AZURE_URI_STYLE"), FieldValue::scalar(&self.uri_style)),
            EnvField::new(FieldMeta::key("_AZURE_KEY_TYPE"), FieldValue::scalar(&self.key_type)),
            EnvField::new(
                FieldMeta::key("_AZURE_VERIFY_TLS"),
                FieldValue::optional(self.verify_tls),
            ),
            EnvField::new(FieldMeta::key("_PATH"), FieldValue::scalar(&self.repo_path)),
            EnvField::new(
                FieldMeta::nested("_RETENTION_"),
                FieldValue::record(&self.retention_policy),
            ),
            EnvField::new(
                FieldMeta::nested("_CIPHER_"),
                FieldValue::optional_record(self.cipher.as_ref()),
            ),
        ]
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ArchiveOption {
    #[serde(rename = "async")]
    pub async_mode: bool,
    /// e.g. `1GiB`
    pub push_queue_max: Option<String>,
    pub get_queue_max: Option<String>,
}

impl EnvRecord for ArchiveOption {
    fn env_fields(&self) -> Vec<EnvField<'_>> {
        vec![
            EnvField::new(FieldMeta::key("_ASYNC"), FieldValue::scalar(self.async_mode)),
            EnvField::new(
                FieldMeta::key("_PUSH_QUEUE_MAX"),
                FieldValue::optional(self.push_queue_max.as_ref()),
            ),
            EnvField::new(
                FieldMeta::key("_GET_QUEUE_MAX"),
                FieldValue::optional(self.get_queue_max.as_ref()),
            ),
        ]
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CompressConfig {
    /// `bz2`, `gz`, `lz4` or `zst`.
    #[serde(rename = "type")]
    pub compress_type: Option<String>,
    pub level: i32,
}

impl EnvRecord for CompressConfig {
    fn env_fields(&self) -> Vec<EnvField<'_>> {
        vec![
            EnvField::new(
                FieldMeta::key("_TYPE"),
                FieldValue::optional(self.compress_type.as_ref()),
            ),
            EnvField::new(FieldMeta::key("_LEVEL"), FieldValue::scalar(self.level)),
        ]
    }
}

/// Named backup target understood by pgbackrest.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Stanza {
    #[serde(default)]
    pub s3_repositories: Vec<S3Repository>,
    /// Numbered after the S3 repositories.
    #[serde(default)]
    pub azure_repositories: Vec<AzureRepository>,
    pub name: String,
    #[serde(default)]
    pub process_max: u32,
    #[serde(default)]
    pub archive: ArchiveOption,
    #[serde(default, rename = "compressConfig")]
    pub compress: Option<CompressConfig>,
    #[serde(default)]
    pub start_fast: bool,
    #[serde(default)]
    pub delta: bool,
    #[serde(default)]
    pub log_level: String,
    /// Appended verbatim as `key=value`.
    #[serde(default, rename = "customEnvVar")]
    pub custom_env_vars: BTreeMap<String, String>,
}

impl EnvRecord for Stanza {
    fn env_fields(&self) -> Vec<EnvField<'_>> {
        vec![
            EnvField::new(FieldMeta::nested("REPO"), FieldValue::group(&self.s3_repositories)),
            EnvField::new(FieldMeta::nested("REPO"), FieldValue::group(&self.azure_repositories)),
            EnvField::new(FieldMeta::key("STANZA"), FieldValue::scalar(&self.name)),
            EnvField::new(FieldMeta::key("PROCESS_MAX"), FieldValue::scalar(self.process_max)),
            EnvField::new(FieldMeta::nested("ARCHIVE"), FieldValue::record(&self.archive)),
            EnvField::new(
                FieldMeta::nested("COMPRESS"),
                FieldValue::optional_record(self.compress.as_ref()),
            ),
            EnvField::new(FieldMeta::key("START_FAST"), FieldValue::scalar(self.start_fast)),
            EnvField::new(FieldMeta::key("DELTA"), FieldValue::scalar(self.delta)),
            EnvField::new(FieldMeta::key("LOG_LEVEL_CONSOLE"), FieldValue::scalar(&self.log_level)),
        ]
    }
}

impl Stanza {
    /// Environment for pgbackrest: encoded fields, lock path, file logging
    /// disabled, then the custom variables.
    pub fn to_env(&self, lock_path: Option<&str>) -> Vec<String> {
        let mut env = envvar::encode(self, ENV_PREFIX);
        env.push(format!(
            "{}LOCK_PATH={}",
            ENV_PREFIX,
            lock_path.unwrap_or(DEFAULT_LOCK_PATH)
        ));
        env.push(format!("{}LOG_LEVEL_FILE=off", ENV_PREFIX));
        env.extend(self.custom_env_vars.iter().map(|(k, v)| format!("{}={}", k, v)));
        env
    }

    /// Number of configured repositories, all kinds included.
    pub fn repository_count(&self) -> usize {
        self.s3_repositories.len() + self.azure_repositories.len()
    }
}
