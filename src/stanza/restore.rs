use serde::{Deserialize, Serialize};

use super::ENV_PREFIX;
use crate::envvar::{self, EnvField, EnvRecord, FieldMeta, FieldValue};

/// Point-in-time target as described by the cluster's recovery bootstrap.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RecoveryTarget {
    #[serde(rename = "targetLSN")]
    pub target_lsn: String,
    pub target_time: String,
    pub target_xid: String,
    pub target_name: String,
    pub target_immediate: bool,
    #[serde(rename = "targetTLI")]
    pub target_tli: String,
}

/// Options passed to `pgbackrest restore` through the environment.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RestoreOptions {
    pub target: String,
    /// `lsn`, `time`, `xid`, `name` or `immediate`.
    #[serde(rename = "type")]
    pub target_type: String,
    pub target_timeline: String,
}

impl EnvRecord for RestoreOptions {
    fn env_fields(&self) -> Vec<EnvField<'_>> {
        vec![
            EnvField::new(FieldMeta::key("TARGET"), FieldValue::scalar(&self.target)),
            EnvField::new(FieldMeta::key("TYPE"), FieldValue::scalar(&self.target_type)),
            EnvField::new(
                FieldMeta::key("TARGET_TIMELINE"),
                FieldValue::scalar(&self.target_timeline),
            ),
        ]
    }
}

impl RestoreOptions {
    pub fn to_env(&self) -> Vec<String> {
        envvar::encode(self, ENV_PREFIX)
    }

    pub fn is_empty(&self) -> bool {
        self == &RestoreOptions::default()
    }
}

impl From<&RecoveryTarget> for RestoreOptions {
    fn from(target: &RecoveryTarget) -> Self {
        let candidates = [
            (&target.target_lsn, "lsn"),
            (&target.target_time, "time"),
            (&target.target_xid, "xid"),
            (&target.target_name, "name"),
        ];
        let mut options = candidates
            .into_iter()
            .find(|(value, _)| !value.is_empty())
            .map(|(value, kind)| RestoreOptions {
                target: value.clone(),
                target_type: kind.to_string(),
                target_timeline: String::new(),
            })
            .unwrap_or_default();
        if options.target_type.is_empty() && target.target_immediate {
            options.target_type = "immediate".to_string();
        }
        options.target_timeline = target.target_tli.clone();
        options
    }
}
