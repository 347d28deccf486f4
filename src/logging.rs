use tokio::sync::broadcast;
use tracing::Level;
use tracing_subscriber::FmtSubscriber;

/// Stream a pgbackrest output line was read from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputKind {
    Stdout,
    Stderr,
}

/// One line of pgbackrest output, tagged with the verb that produced it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputLine {
    pub verb: String,
    pub kind: OutputKind,
    pub line: String,
}

/// Fans out the output of streaming runs (`archive-push`, `archive-get`,
/// `restore`) so a host can forward it to its own clients.
#[derive(Debug, Clone)]
pub struct OutputRelay {
    sender: broadcast::Sender<OutputLine>,
}

impl OutputRelay {
    /// Slow subscribers lose the oldest lines beyond `capacity`.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<OutputLine> {
        self.sender.subscribe()
    }

    pub(crate) fn publish(&self, verb: &str, kind: OutputKind, line: &str) {
        if self.sender.receiver_count() == 0 {
            return;
        }
        let _ = self.sender.send(OutputLine {
            verb: verb.to_string(),
            kind,
            line: line.to_string(),
        });
    }
}

/// Parse a level name (`error`, `warn`, `info`, `debug`, `trace`),
/// falling back to `info`.
pub fn parse_level(level: &str) -> Level {
    level.trim().parse().unwrap_or(Level::INFO)
}

/// Install the global fmt subscriber. Does nothing if one is already set.
pub fn init(level: &str) {
    let subscriber = FmtSubscriber::builder()
        .with_max_level(parse_level(level))
        .finish();
    tracing::subscriber::set_global_default(subscriber).ok();
}
