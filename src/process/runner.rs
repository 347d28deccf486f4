use std::sync::Arc;

use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::{CommandExecutor, CommandFactory, CommandOutput, OutputStream, SystemCommandFactory};
use crate::envvar::merge_env;
use crate::error::{BridgeError, ExitState, Result};
use crate::logging::{OutputKind, OutputRelay};

/// Upper bound on the standard-error text attached to an error.
const STDERR_CAPTURE_LIMIT: usize = 2000;

/// Lifecycle of one streaming invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    Created,
    Started,
    Running,
    Completed,
    Killed,
    StartFailed,
}

impl RunState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            RunState::Completed | RunState::Killed | RunState::StartFailed
        )
    }
}

/// Completion signal of a streaming invocation. Resolves exactly once.
#[derive(Debug)]
pub struct BackgroundTask {
    rx: oneshot::Receiver<(RunState, Result<()>)>,
}

impl BackgroundTask {
    /// Wait for the invocation and return its terminal error, if any.
    pub async fn wait(self) -> Result<()> {
        self.wait_with_state().await.1
    }

    /// Like [`wait`](Self::wait) but also reports the state the run ended in.
    pub async fn wait_with_state(self) -> (RunState, Result<()>) {
        self.rx
            .await
            .unwrap_or((RunState::Completed, Err(BridgeError::TaskLost)))
    }
}

/// Launches the backup utility with a merged environment, either to
/// completion or as a cancellable streaming run.
#[derive(Clone)]
pub struct CommandRunner {
    binary: String,
    factory: Arc<dyn CommandFactory>,
    base_env: Vec<String>,
    inherit_env: bool,
    relay: Option<OutputRelay>,
}

impl CommandRunner {
    pub fn new(binary: impl Into<String>, base_env: Vec<String>) -> Self {
        Self {
            binary: binary.into(),
            factory: Arc::new(SystemCommandFactory),
            base_env,
            inherit_env: true,
            relay: None,
        }
    }

    pub fn with_factory(mut self, factory: Arc<dyn CommandFactory>) -> Self {
        self.factory = factory;
        self
    }

    /// Whether the parent's environment forms the lowest merge layer.
    pub fn inherit_env(mut self, inherit: bool) -> Self {
        self.inherit_env = inherit;
        self
    }

    /// Publish every line of streaming runs to `relay` as well as the log.
    pub fn with_output_relay(mut self, relay: OutputRelay) -> Self {
        self.relay = Some(relay);
        self
    }

    pub fn binary(&self) -> &str {
        &self.binary
    }

    pub fn base_env(&self) -> &[String] {
        &self.base_env
    }

    /// Final environment for a call: parent (optional), then base, then
    /// call-specific overrides. Later layers win.
    pub fn environment(&self, extra: &[String]) -> Vec<(String, String)> {
        let inherited: Vec<String> = if self.inherit_env {
            std::env::vars().map(|(k, v)| format!("{}={}", k, v)).collect()
        } else {
            Vec::new()
        };
        merge_env(inherited.iter().chain(&self.base_env).chain(extra))
    }

    fn command(&self, args: &[String], extra: &[String]) -> Box<dyn CommandExecutor> {
        let mut cmd = self.factory.command(&self.binary, args);
        cmd.set_env(self.environment(extra));
        cmd
    }

    /// Run the utility and capture its output. A non-zero exit becomes
    /// [`BridgeError::Execution`] carrying everything it printed.
    pub async fn run_to_completion(&self, args: &[String], extra: &[String]) -> Result<CommandOutput> {
        debug!("Running {} {:?}", self.binary, args);
        let mut cmd = self.command(args, extra);
        let output = cmd
            .combined_output()
            .await
            .map_err(|source| BridgeError::Spawn {
                program: self.binary.clone(),
                args: args.to_vec(),
                source,
            })?;

        if !output.status.success() {
            return Err(BridgeError::Execution {
                program: self.binary.clone(),
                args: args.to_vec(),
                status: output.status,
                output: output.combined(),
            });
        }
        Ok(output)
    }

    /// Start a streaming run. Output lines are logged as they arrive and the
    /// returned task resolves once the process exits and both streams are
    /// closed, or once `token` is cancelled, whichever happens first.
    ///
    /// # Panics
    ///
    /// Must be called from within a Tokio runtime.
    pub fn run_in_background(
        &self,
        args: Vec<String>,
        extra: &[String],
        token: CancellationToken,
    ) -> BackgroundTask {
        let (tx, rx) = oneshot::channel();
        let cmd = self.command(&args, extra);
        let program = self.binary.clone();
        let relay = self.relay.clone();

        tokio::spawn(async move {
            let outcome = stream_command(cmd, program, args, token, relay).await;
            let _ = tx.send(outcome);
        });

        BackgroundTask { rx }
    }
}

impl std::fmt::Debug for CommandRunner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // base_env carries credentials
        f.debug_struct("CommandRunner")
            .field("binary", &self.binary)
            .field("base_env_len", &self.base_env.len())
            .field("inherit_env", &self.inherit_env)
            .field("relay", &self.relay.is_some())
            .finish()
    }
}

struct StderrSummary {
    lines: usize,
    text: String,
}

enum Exit {
    Status(std::io::Result<ExitState>),
    Cancelled,
}

fn advance(state: &mut RunState, next: RunState, verb: &str) {
    debug!("[{}] {:?} -> {:?}", verb, state, next);
    *state = next;
}

async fn stream_command(
    mut cmd: Box<dyn CommandExecutor>,
    program: String,
    args: Vec<String>,
    token: CancellationToken,
    relay: Option<OutputRelay>,
) -> (RunState, Result<()>) {
    let verb = args.first().cloned().unwrap_or_else(|| program.clone());
    let mut state = RunState::Created;

    if token.is_cancelled() {
        debug!("[{}] cancelled before start, not spawning {}", verb, program);
        return (state, Err(BridgeError::Cancelled));
    }

    if let Err(source) = cmd.start() {
        error!("[{}] failed to start {}: {}", verb, program, source);
        advance(&mut state, RunState::StartFailed, &verb);
        return (state, Err(BridgeError::Spawn { program, args, source }));
    }
    advance(&mut state, RunState::Started, &verb);

    // Drains start before the exit wait so fast processes lose no output.
    let mut stdout_task = tokio::spawn(drain_stdout(
        cmd.take_stdout(),
        verb.clone(),
        relay.clone(),
    ));
    let mut stderr_task = tokio::spawn(drain_stderr(cmd.take_stderr(), verb.clone(), relay));
    advance(&mut state, RunState::Running, &verb);

    let exit = tokio::select! {
        status = cmd.wait() => Exit::Status(status),
        _ = token.cancelled() => Exit::Cancelled,
    };
    let status = match exit {
        Exit::Status(status) => status,
        Exit::Cancelled => {
            info!("[{}] cancellation requested, killing {}", verb, program);
            kill_run(cmd.as_mut(), &stdout_task, &stderr_task, &verb).await;
            advance(&mut state, RunState::Killed, &verb);
            return (state, Err(BridgeError::Cancelled));
        }
    };

    // Descendants may keep the pipes open after the direct child is gone.
    let drained = tokio::select! {
        summary = join_drains(&mut stdout_task, &mut stderr_task) => Some(summary),
        _ = token.cancelled() => None,
    };
    let Some(stderr) = drained else {
        info!("[{}] cancellation requested while output is still open, killing process group", verb);
        kill_run(cmd.as_mut(), &stdout_task, &stderr_task, &verb).await;
        advance(&mut state, RunState::Killed, &verb);
        return (state, Err(BridgeError::Cancelled));
    };
    advance(&mut state, RunState::Completed, &verb);

    let result = match status {
        Err(e) => Err(BridgeError::Io(e)),
        Ok(status) if !status.success() => Err(BridgeError::Execution {
            program,
            args,
            status,
            output: stderr.text,
        }),
        Ok(_) if stderr.lines > 0 => Err(BridgeError::StderrReported {
            program,
            args,
            stderr: stderr.text,
        }),
        Ok(_) => Ok(()),
    };
    (state, result)
}

async fn kill_run(
    cmd: &mut dyn CommandExecutor,
    stdout_task: &JoinHandle<()>,
    stderr_task: &JoinHandle<StderrSummary>,
    verb: &str,
) {
    if let Err(e) = cmd.kill().await {
        warn!("[{}] failed to kill: {}", verb, e);
    }
    stdout_task.abort();
    stderr_task.abort();
}

async fn join_drains(
    stdout_task: &mut JoinHandle<()>,
    stderr_task: &mut JoinHandle<StderrSummary>,
) -> StderrSummary {
    if let Err(e) = stdout_task.await {
        warn!("stdout reader ended abnormally: {}", e);
    }
    match stderr_task.await {
        Ok(summary) => summary,
        Err(e) => {
            warn!("stderr reader ended abnormally: {}", e);
            StderrSummary {
                lines: 0,
                text: String::new(),
            }
        }
    }
}

/// Newline-delimited reader that never gives up on undecodable bytes: each
/// line is decoded lossily and reading goes on until end of stream.
struct LossyLines {
    reader: BufReader<OutputStream>,
    buf: Vec<u8>,
}

impl LossyLines {
    fn new(stream: OutputStream) -> Self {
        Self {
            reader: BufReader::new(stream),
            buf: Vec::new(),
        }
    }

    async fn next_line(&mut self) -> Option<String> {
        self.buf.clear();
        match self.reader.read_until(b'\n', &mut self.buf).await {
            Ok(0) => None,
            Ok(_) => {
                if self.buf.last() == Some(&b'\n') {
                    self.buf.pop();
                    if self.buf.last() == Some(&b'\r') {
                        self.buf.pop();
                    }
                }
                Some(String::from_utf8_lossy(&self.buf).into_owned())
            }
            Err(e) => {
                debug!("output stream read failed: {}", e);
                None
            }
        }
    }
}

async fn drain_stdout(stream: Option<OutputStream>, verb: String, relay: Option<OutputRelay>) {
    let Some(stream) = stream else {
        return;
    };
    let mut lines = LossyLines::new(stream);
    while let Some(line) = lines.next_line().await {
        info!("[{}] {}", verb, line);
        if let Some(relay) = &relay {
            relay.publish(&verb, OutputKind::Stdout, &line);
        }
    }
}

async fn drain_stderr(
    stream: Option<OutputStream>,
    verb: String,
    relay: Option<OutputRelay>,
) -> StderrSummary {
    let mut summary = StderrSummary {
        lines: 0,
        text: String::new(),
    };
    let Some(stream) = stream else {
        return summary;
    };
    let mut lines = LossyLines::new(stream);
    while let Some(line) = lines.next_line().await {
        error!("[{}] {}", verb, line);
        if let Some(relay) = &relay {
            relay.publish(&verb, OutputKind::Stderr, &line);
        }
        summary.lines += 1;
        if summary.text.len() < STDERR_CAPTURE_LIMIT {
            summary.text.push_str(&line);
            summary.text.push('\n');
        }
    }
    summary
}
