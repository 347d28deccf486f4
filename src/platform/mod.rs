/// Process-management operations that differ between operating systems.
/// Each OS provides its own `NativePlatform` implementation so call sites
/// remain free of `#[cfg]` blocks.
pub trait Platform {
    /// Place the child in a fresh process group so the whole tree it spawns
    /// can be terminated together (no-op where groups don't exist).
    fn isolate_process_group(cmd: &mut tokio::process::Command);

    /// Forcibly terminate `pid` and its descendants.
    fn kill_process_tree(pid: u32) -> std::io::Result<()>;
}

#[cfg(unix)]
mod unix;
#[cfg(unix)]
pub use unix::NativePlatform;

#[cfg(windows)]
mod windows;
#[cfg(windows)]
pub use windows::NativePlatform;
