use super::Platform;

pub struct NativePlatform;

impl Platform for NativePlatform {
    fn isolate_process_group(_cmd: &mut tokio::process::Command) {}

    fn kill_process_tree(pid: u32) -> std::io::Result<()> {
        let status = std::process::Command::new("taskkill")
            .args(["/T", "/F", "/PID", &pid.to_string()])
            .stdout(std::process::Stdio::null())
            .stderr(std::process::Stdio::null())
            .status()?;
        if status.success() {
            Ok(())
        } else {
            Err(std::io::Error::other(format!(
                "taskkill /T /F /PID {} exited with {}",
                pid, status
            )))
        }
    }
}
