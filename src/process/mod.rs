//! The operating-system seam for running the backup utility, plus the
//! orchestration built on top of it.

mod runner;
#[cfg(test)]
pub(crate) mod testing;

pub use runner::{BackgroundTask, CommandRunner, RunState};

use std::io;
use std::process::Stdio;

use async_trait::async_trait;
use tokio::io::AsyncRead;
use tokio::process::{Child, Command};
use tracing::warn;

use crate::error::ExitState;
use crate::platform::{NativePlatform, Platform};

pub type OutputStream = Box<dyn AsyncRead + Send + Unpin>;

/// Captured result of a run-to-completion invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandOutput {
    pub status: ExitState,
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
}

impl CommandOutput {
    /// Standard output followed by standard error, lossily decoded.
    pub fn combined(&self) -> String {
        let mut text = String::from_utf8_lossy(&self.stdout).into_owned();
        text.push_str(&String::from_utf8_lossy(&self.stderr));
        text
    }
}

/// One invocation of an external program. Everything that touches a real
/// process goes through this trait so tests can script a fake.
#[async_trait]
pub trait CommandExecutor: Send {
    /// Replace the whole environment of the process.
    fn set_env(&mut self, env: Vec<(String, String)>);

    /// Spawn the process with both output streams piped.
    fn start(&mut self) -> io::Result<()>;

    fn take_stdout(&mut self) -> Option<OutputStream>;

    fn take_stderr(&mut self) -> Option<OutputStream>;

    async fn wait(&mut self) -> io::Result<ExitState>;

    /// Forcibly terminate the process and whatever it spawned.
    async fn kill(&mut self) -> io::Result<()>;

    /// Spawn, wait, and capture both streams in one step.
    async fn combined_output(&mut self) -> io::Result<CommandOutput>;
}

/// Builds executors for a program and its arguments.
pub trait CommandFactory: Send + Sync {
    fn command(&self, program: &str, args: &[String]) -> Box<dyn CommandExecutor>;
}

/// Executor backed by `tokio::process`.
pub struct SystemCommand {
    command: Command,
    child: Option<Child>,
    /// Kept after the child is reaped; it still names the process group.
    pid: Option<u32>,
}

impl SystemCommand {
    pub fn new(program: &str, args: &[String]) -> Self {
        let mut command = Command::new(program);
        command.args(args).stdin(Stdio::null()).kill_on_drop(true);
        NativePlatform::isolate_process_group(&mut command);
        Self {
            command,
            child: None,
            pid: None,
        }
    }

    fn child(&mut self) -> io::Result<&mut Child> {
        self.child
            .as_mut()
            .ok_or_else(|| io::Error::other("process was not started"))
    }
}

#[async_trait]
impl CommandExecutor for SystemCommand {
    fn set_env(&mut self, env: Vec<(String, String)>) {
        self.command.env_clear().envs(env);
    }

    fn start(&mut self) -> io::Result<()> {
        let child = self
            .command
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()?;
        self.pid = child.id();
        self.child = Some(child);
        Ok(())
    }

    fn take_stdout(&mut self) -> Option<OutputStream> {
        let stdout = self.child.as_mut()?.stdout.take()?;
        Some(Box::new(stdout))
    }

    fn take_stderr(&mut self) -> Option<OutputStream> {
        let stderr = self.child.as_mut()?.stderr.take()?;
        Some(Box::new(stderr))
    }

    async fn wait(&mut self) -> io::Result<ExitState> {
        let status = self.child()?.wait().await?;
        Ok(status.into())
    }

    async fn kill(&mut self) -> io::Result<()> {
        if let Some(pid) = self.pid
            && let Err(e) = NativePlatform::kill_process_tree(pid)
        {
            warn!("Failed to kill process group of {}: {}", pid, e);
        }
        let child = self.child()?;
        if child.try_wait()?.is_some() {
            // Already reaped; only its descendants were left to kill.
            return Ok(());
        }
        child.kill().await
    }

    async fn combined_output(&mut self) -> io::Result<CommandOutput> {
        let output = self
            .command
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .await?;
        Ok(CommandOutput {
            status: output.status.into(),
            stdout: output.stdout,
            stderr: output.stderr,
        })
    }
}

/// Factory producing [`SystemCommand`]s.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemCommandFactory;

impl CommandFactory for SystemCommandFactory {
    fn command(&self, program: &str, args: &[String]) -> Box<dyn CommandExecutor> {
        Box::new(SystemCommand::new(program, args))
    }
}
