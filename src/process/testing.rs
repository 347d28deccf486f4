//! Scripted stand-in for the system process, used by unit tests.

use std::collections::VecDeque;
use std::io::{self, Cursor};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::io::{AsyncReadExt, DuplexStream};

use super::{CommandExecutor, CommandFactory, CommandOutput, OutputStream};
use crate::error::ExitState;

/// What a fake process prints and how it ends.
#[derive(Debug, Clone, Default)]
pub struct FakeScript {
    stdout: Vec<u8>,
    stderr: Vec<u8>,
    exit_code: i32,
    hang: bool,
    hold_pipes: bool,
    fail_start: bool,
}

impl FakeScript {
    pub fn exit(code: i32) -> Self {
        Self {
            exit_code: code,
            ..Default::default()
        }
    }

    /// A process that never exits on its own.
    pub fn hang() -> Self {
        Self {
            hang: true,
            ..Default::default()
        }
    }

    pub fn start_failure() -> Self {
        Self {
            fail_start: true,
            ..Default::default()
        }
    }

    pub fn stdout(self, text: &str) -> Self {
        self.stdout_bytes(text.as_bytes())
    }

    pub fn stderr(self, text: &str) -> Self {
        self.stderr_bytes(text.as_bytes())
    }

    pub fn stdout_bytes(mut self, bytes: &[u8]) -> Self {
        self.stdout = bytes.to_vec();
        self
    }

    pub fn stderr_bytes(mut self, bytes: &[u8]) -> Self {
        self.stderr = bytes.to_vec();
        self
    }

    /// Output streams stay open after the process exits, as when a
    /// descendant inherited them. They close when the command is dropped.
    pub fn hold_pipes(mut self) -> Self {
        self.hold_pipes = true;
        self
    }
}

/// Everything observed about one fake invocation.
#[derive(Debug, Clone, Default)]
pub struct Invocation {
    pub program: String,
    pub args: Vec<String>,
    pub env: Vec<(String, String)>,
    pub started: bool,
    pub killed: bool,
}

impl Invocation {
    pub fn env_value(&self, key: &str) -> Option<&str> {
        self.env
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }
}

/// Hands out scripts in order; once exhausted every command exits 0 silently.
#[derive(Clone, Default)]
pub struct FakeFactory {
    scripts: Arc<Mutex<VecDeque<FakeScript>>>,
    invocations: Arc<Mutex<Vec<Invocation>>>,
}

impl FakeFactory {
    pub fn new(scripts: Vec<FakeScript>) -> Self {
        Self {
            scripts: Arc::new(Mutex::new(scripts.into())),
            invocations: Arc::default(),
        }
    }

    pub fn invocations(&self) -> Vec<Invocation> {
        self.invocations.lock().unwrap().clone()
    }
}

impl CommandFactory for FakeFactory {
    fn command(&self, program: &str, args: &[String]) -> Box<dyn CommandExecutor> {
        let script = self.scripts.lock().unwrap().pop_front().unwrap_or_default();
        let mut invocations = self.invocations.lock().unwrap();
        invocations.push(Invocation {
            program: program.to_string(),
            args: args.to_vec(),
            ..Default::default()
        });
        Box::new(FakeCommand {
            stdout: Some(script.stdout.clone()),
            stderr: Some(script.stderr.clone()),
            script,
            held: Vec::new(),
            index: invocations.len() - 1,
            invocations: self.invocations.clone(),
        })
    }
}

pub struct FakeCommand {
    script: FakeScript,
    stdout: Option<Vec<u8>>,
    stderr: Option<Vec<u8>>,
    held: Vec<DuplexStream>,
    index: usize,
    invocations: Arc<Mutex<Vec<Invocation>>>,
}

impl FakeCommand {
    fn record(&self, f: impl FnOnce(&mut Invocation)) {
        f(&mut self.invocations.lock().unwrap()[self.index]);
    }

    fn stream(&mut self, bytes: Vec<u8>) -> OutputStream {
        if !self.script.hold_pipes {
            return Box::new(Cursor::new(bytes));
        }
        let (writer, reader) = tokio::io::duplex(64);
        self.held.push(writer);
        Box::new(Cursor::new(bytes).chain(reader))
    }

    fn try_start(&self) -> io::Result<()> {
        if self.script.fail_start {
            return Err(io::Error::new(
                io::ErrorKind::NotFound,
                "No such file or directory",
            ));
        }
        self.record(|inv| inv.started = true);
        Ok(())
    }
}

#[async_trait]
impl CommandExecutor for FakeCommand {
    fn set_env(&mut self, env: Vec<(String, String)>) {
        self.record(|inv| inv.env = env);
    }

    fn start(&mut self) -> io::Result<()> {
        self.try_start()
    }

    fn take_stdout(&mut self) -> Option<OutputStream> {
        let bytes = self.stdout.take()?;
        Some(self.stream(bytes))
    }

    fn take_stderr(&mut self) -> Option<OutputStream> {
        let bytes = self.stderr.take()?;
        Some(self.stream(bytes))
    }

    async fn wait(&mut self) -> io::Result<ExitState> {
        if self.script.hang {
            std::future::pending::<()>().await;
        }
        Ok(ExitState::with_code(self.script.exit_code))
    }

    async fn kill(&mut self) -> io::Result<()> {
        self.record(|inv| inv.killed = true);
        Ok(())
    }

    async fn combined_output(&mut self) -> io::Result<CommandOutput> {
        self.try_start()?;
        Ok(CommandOutput {
            status: ExitState::with_code(self.script.exit_code),
            stdout: self.stdout.take().unwrap_or_default(),
            stderr: self.stderr.take().unwrap_or_default(),
        })
    }
}
