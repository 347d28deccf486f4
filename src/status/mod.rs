//! Decoding of `pgbackrest info --output=json` and backup selection.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize};

use crate::error::{BridgeError, Result};

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct RepoStatus {
    #[serde(default)]
    pub code: Option<i64>,
    #[serde(default)]
    pub message: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct Repo {
    #[serde(default)]
    pub status: RepoStatus,
}

/// One stanza entry of the info output, reduced to its repositories.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct RepoGroup {
    #[serde(default)]
    pub repo: Vec<Repo>,
}

/// True when at least one repository is listed and every repository of
/// every group reports status code 0.
pub fn all_repos_healthy(groups: &[RepoGroup]) -> bool {
    let mut repos = groups.iter().flat_map(|g| g.repo.iter()).peekable();
    repos.peek().is_some() && repos.all(|r| r.status.code == Some(0))
}

pub fn parse_status(json: &[u8]) -> Result<bool> {
    let groups: Vec<RepoGroup> = serde_json::from_slice(json)?;
    Ok(all_repos_healthy(&groups))
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Timestamp {
    pub start: i64,
    pub stop: i64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Lsn {
    #[serde(default, deserialize_with = "null_as_empty")]
    pub start: String,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub stop: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Archive {
    #[serde(default, deserialize_with = "null_as_empty")]
    pub start: String,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub stop: String,
}

/// One completed backup as reported by pgbackrest.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(default)]
pub struct BackupInfo {
    pub archive: Archive,
    #[serde(deserialize_with = "null_as_empty")]
    pub label: String,
    pub lsn: Lsn,
    /// Label of the backup this one depends on, empty for full backups.
    #[serde(deserialize_with = "null_as_empty")]
    pub prior: String,
    pub timestamp: Timestamp,
    #[serde(rename = "type", deserialize_with = "null_as_empty")]
    pub backup_type: String,
}

impl BackupInfo {
    pub fn kind(&self) -> Option<BackupType> {
        self.backup_type.parse().ok()
    }
}

fn null_as_empty<'de, D>(deserializer: D) -> std::result::Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<String>::deserialize(deserializer)?.unwrap_or_default())
}

#[derive(Debug, Clone, Default, Deserialize)]
struct BackupData {
    #[serde(default)]
    backup: Vec<BackupInfo>,
}

/// Backups of the first stanza entry in the info output.
pub fn parse_backups(json: &[u8]) -> Result<Vec<BackupInfo>> {
    let data: Vec<BackupData> = serde_json::from_slice(json)?;
    data.into_iter()
        .next()
        .map(|d| d.backup)
        .ok_or(BridgeError::EmptyInfo)
}

/// Backup with the greatest stop timestamp; the first one wins on ties.
pub fn latest(backups: &[BackupInfo]) -> Option<&BackupInfo> {
    backups.iter().reduce(|found, b| {
        if b.timestamp.stop > found.timestamp.stop {
            b
        } else {
            found
        }
    })
}

/// Backup with the smallest stop timestamp; the first one wins on ties.
pub fn earliest(backups: &[BackupInfo]) -> Option<&BackupInfo> {
    backups.iter().reduce(|found, b| {
        if b.timestamp.stop < found.timestamp.stop {
            b
        } else {
            found
        }
    })
}

/// Oldest and newest backups currently retained.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecoveryWindow {
    pub first_backup: BackupInfo,
    pub last_backup: BackupInfo,
}

impl RecoveryWindow {
    pub fn from_backups(backups: &[BackupInfo]) -> Option<Self> {
        Some(Self {
            first_backup: earliest(backups)?.clone(),
            last_backup: latest(backups)?.clone(),
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BackupType {
    Full,
    Differential,
    Incremental,
}

impl BackupType {
    /// Value understood by `pgbackrest backup --type`.
    pub fn as_str(&self) -> &'static str {
        match self {
            BackupType::Full => "full",
            BackupType::Differential => "diff",
            BackupType::Incremental => "incr",
        }
    }
}

impl fmt::Display for BackupType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BackupType {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "full" => Ok(BackupType::Full),
            "diff" | "differential" => Ok(BackupType::Differential),
            "incr" | "incremental" => Ok(BackupType::Incremental),
            other => Err(format!("unknown backup type: {}", other)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn backup(label: &str, stop: i64) -> BackupInfo {
        BackupInfo {
            label: label.to_string(),
            timestamp: Timestamp {
                start: stop - 60,
                stop,
            },
            backup_type: "full".to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn health_requires_every_repo_at_code_zero() {
        let cases = [
            (r#"[{"repo": [{"status": {"code": 2, "message": "BLA"}}]}]"#, false),
            (r#"[{"repo": [{"status": {"message": "Machin"}}]}]"#, false),
            (r#"[{"repo": [{"status": {"code": 0, "message": "OK"}}]}]"#, true),
            (
                r#"[{"repo":[{"key":1,"status":{"code":0,"message":"ok"}},{"key":2,"status":{"code":1,"message":"missing stanza path"}}]}]"#,
                false,
            ),
            (
                r#"[{"repo":[{"status":{"code":0}}]},{"repo":[{"status":{"code":0}}]}]"#,
                true,
            ),
            (r#"[{"repo":[{"status":{"code":0}}]},{"repo":[{}]}]"#, false),
            (r#"[{"repo": []}]"#, false),
            (r#"[{"name": "main"}]"#, false),
            ("[]", false),
        ];
        for (json, want) in cases {
            assert_eq!(parse_status(json.as_bytes()).unwrap(), want, "input: {}", json);
        }
    }

    #[test]
    fn status_decode_error_is_propagated() {
        assert!(matches!(parse_status(b"not json"), Err(BridgeError::Decode(_))));
        assert!(matches!(parse_status(b"{\"repo\": []}"), Err(BridgeError::Decode(_))));
    }

    #[test]
    fn parses_backup_list_from_info_output() {
        let json = r#"[{
            "archive": [{"id": "16-1", "max": "000000010000000000000004"}],
            "backup": [{
                "archive": {"start": "000000010000000000000001", "stop": "000000010000000000000002"},
                "label": "20250306-101010F",
                "lsn": {"start": "0/16B2D80", "stop": "0/16B2E00"},
                "prior": null,
                "timestamp": {"start": 1710000000, "stop": 1710003600},
                "type": "full",
                "info": {"size": 1024}
            }, {
                "archive": {"start": "000000010000000000000003", "stop": "000000010000000000000004"},
                "label": "20250306-101010F_20250307-101010I",
                "lsn": {"start": "0/16C2D80", "stop": "0/16C2E00"},
                "prior": "20250306-101010F",
                "timestamp": {"start": 1810007200, "stop": 1810010800},
                "type": "incr"
            }],
            "name": "main"
        }]"#;
        let backups = parse_backups(json.as_bytes()).unwrap();
        assert_eq!(backups.len(), 2);
        assert_eq!(backups[0].prior, "");
        assert_eq!(backups[0].lsn.stop, "0/16B2E00");
        assert_eq!(backups[1].prior, "20250306-101010F");
        assert_eq!(backups[1].kind(), Some(BackupType::Incremental));
        assert_eq!(backups[1].archive.stop, "000000010000000000000004");
    }

    #[test]
    fn empty_info_is_an_error() {
        assert!(matches!(parse_backups(b"[]"), Err(BridgeError::EmptyInfo)));
        assert!(matches!(parse_backups(b"[{]"), Err(BridgeError::Decode(_))));
        assert!(parse_backups(br#"[{"name": "main"}]"#).unwrap().is_empty());
    }

    #[test]
    fn latest_and_earliest_by_stop_timestamp() {
        let backups = vec![backup("a", 100), backup("b", 300), backup("c", 200)];
        assert_eq!(latest(&backups).map(|b| b.label.as_str()), Some("b"));
        assert_eq!(earliest(&backups).map(|b| b.label.as_str()), Some("a"));
        assert!(latest(&[]).is_none());
        assert!(earliest(&[]).is_none());
    }

    #[test]
    fn ties_keep_first_seen() {
        let backups = vec![backup("first", 100), backup("second", 100)];
        assert_eq!(latest(&backups).map(|b| b.label.as_str()), Some("first"));
        assert_eq!(earliest(&backups).map(|b| b.label.as_str()), Some("first"));
    }

    #[test]
    fn recovery_window_spans_retained_backups() {
        let backups = vec![backup("mid", 200), backup("new", 300), backup("old", 100)];
        let window = RecoveryWindow::from_backups(&backups).unwrap();
        assert_eq!(window.first_backup.label, "old");
        assert_eq!(window.last_backup.label, "new");
        assert!(RecoveryWindow::from_backups(&[]).is_none());

        let json = serde_json::to_value(&window).unwrap();
        assert_eq!(json["firstBackup"]["label"], "old");
        assert_eq!(json["lastBackup"]["timestamp"]["stop"], 300);
    }

    #[test]
    fn backup_type_parsing() {
        assert_eq!("full".parse::<BackupType>(), Ok(BackupType::Full));
        assert_eq!("differential".parse::<BackupType>(), Ok(BackupType::Differential));
        assert_eq!("incr".parse::<BackupType>(), Ok(BackupType::Incremental));
        assert!("weekly".parse::<BackupType>().is_err());
        assert_eq!(BackupType::Differential.to_string(), "diff");
    }
}
