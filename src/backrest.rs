//! Entry points the reconciliation layer calls: stanza creation, WAL
//! archiving, backups and restores.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::config::BridgeConfig;
use crate::error::Result;
use crate::logging::OutputRelay;
use crate::process::{BackgroundTask, CommandFactory, CommandRunner};
use crate::stanza::{ENV_PREFIX, RestoreOptions};
use crate::status::{self, BackupInfo, BackupType};

/// Options for a single `pgbackrest backup` run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BackupOptions {
    /// Backup type; pgbackrest picks its configured default when unset.
    pub kind: Option<BackupType>,
    /// Repository number to write to.
    pub repository: Option<u32>,
}

impl BackupOptions {
    pub fn to_env(&self) -> Vec<String> {
        let mut env = Vec::new();
        if let Some(kind) = self.kind {
            env.push(format!("{}TYPE={}", ENV_PREFIX, kind));
        }
        if let Some(repo) = self.repository {
            env.push(format!("{}REPO={}", ENV_PREFIX, repo));
        }
        env
    }
}

fn archive_check_disabled() -> String {
    format!("{}ARCHIVE_CHECK=n", ENV_PREFIX)
}

fn args(list: &[&str]) -> Vec<String> {
    list.iter().map(|s| s.to_string()).collect()
}

/// Drives the pgbackrest binary with a fixed base environment.
#[derive(Debug, Clone)]
pub struct PgBackrest {
    runner: CommandRunner,
}

impl PgBackrest {
    pub fn new(base_env: Vec<String>) -> Self {
        Self {
            runner: CommandRunner::new("pgbackrest", base_env),
        }
    }

    pub fn from_config(config: &BridgeConfig) -> Self {
        Self {
            runner: CommandRunner::new(config.binary.clone(), config.base_env())
                .inherit_env(config.inherit_env),
        }
    }

    /// Same bridge, but processes come from `factory`.
    pub fn with_factory(mut self, factory: Arc<dyn CommandFactory>) -> Self {
        self.runner = self.runner.with_factory(factory);
        self
    }

    /// Same bridge, with streaming output also published to `relay`.
    pub fn with_output_relay(mut self, relay: OutputRelay) -> Self {
        self.runner = self.runner.with_output_relay(relay);
        self
    }

    pub fn with_runner(runner: CommandRunner) -> Self {
        Self { runner }
    }

    pub fn runner(&self) -> &CommandRunner {
        &self.runner
    }

    /// True when every configured repository reports a usable stanza.
    pub async fn stanza_exists(&self) -> Result<bool> {
        let output = self
            .runner
            .run_to_completion(&args(&["info", "--output=json"]), &[])
            .await?;
        status::parse_status(&output.stdout)
    }

    /// Create the stanza unless it is already usable. Returns whether
    /// `stanza-create` ran.
    pub async fn ensure_stanza_exists(&self, stanza: &str) -> Result<bool> {
        if self.stanza_exists().await? {
            return Ok(false);
        }
        info!("Creating stanza {}", stanza);
        self.runner
            .run_to_completion(&[String::from("stanza-create"), format!("--stanza={}", stanza)], &[])
            .await?;
        Ok(true)
    }

    /// Archive one WAL segment, streaming pgbackrest's output.
    ///
    /// # Panics
    ///
    /// Must be called from within a Tokio runtime.
    pub fn push_wal(&self, wal_name: &str, token: CancellationToken) -> BackgroundTask {
        self.runner
            .run_in_background(args(&["archive-push", wal_name]), &[], token)
    }

    /// Fetch one WAL segment into `destination`.
    ///
    /// # Panics
    ///
    /// Must be called from within a Tokio runtime.
    pub fn get_wal(&self, wal_name: &str, destination: &str, token: CancellationToken) -> BackgroundTask {
        self.runner
            .run_in_background(args(&["archive-get", wal_name, destination]), &[], token)
    }

    /// Take a backup, then return the backup list as reported afterwards.
    pub async fn run_backup(&self, options: &BackupOptions) -> Result<Vec<BackupInfo>> {
        let mut env = vec![archive_check_disabled()];
        env.extend(options.to_env());
        info!("Starting backup ({:?})", options);
        self.runner.run_to_completion(&args(&["backup"]), &env).await?;
        self.backup_info().await
    }

    /// Backups of the configured stanza.
    pub async fn backup_info(&self) -> Result<Vec<BackupInfo>> {
        let output = self
            .runner
            .run_to_completion(&args(&["info", "--output", "json"]), &[])
            .await?;
        let backups = status::parse_backups(&output.stdout)?;
        if backups.is_empty() {
            warn!("pgbackrest reports no backup for this stanza");
        }
        Ok(backups)
    }

    /// Restore into the data directory with the archive check disabled.
    ///
    /// # Panics
    ///
    /// Must be called from within a Tokio runtime.
    pub fn run_restore(&self, options: &RestoreOptions, token: CancellationToken) -> BackgroundTask {
        let mut env = vec![archive_check_disabled()];
        env.extend(options.to_env());
        self.runner.run_in_background(args(&["restore"]), &env, token)
    }
}
