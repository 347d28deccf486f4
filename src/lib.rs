//! Bridge between a declarative pgbackrest configuration and the pgbackrest
//! binary: environment encoding, process orchestration and status parsing.

pub mod backrest;
pub mod config;
pub mod envvar;
pub mod error;
pub mod logging;
pub mod platform;
pub mod process;
pub mod stanza;
pub mod status;

pub use backrest::{BackupOptions, PgBackrest};
pub use config::BridgeConfig;
pub use error::{BridgeError, ExitState, Result};
pub use logging::{OutputKind, OutputLine, OutputRelay};
pub use process::{BackgroundTask, CommandRunner};
pub use stanza::Stanza;
pub use status::{BackupInfo, BackupType, RecoveryWindow};
