use super::Platform;

pub struct NativePlatform;

impl Platform for NativePlatform {
    fn isolate_process_group(cmd: &mut tokio::process::Command) {
        cmd.process_group(0);
    }

    fn kill_process_tree(pid: u32) -> std::io::Result<()> {
        // Negative pid addresses the process group led by the child.
        let status = std::process::Command::new("kill")
            .arg("-KILL")
            .arg("--")
            .arg(format!("-{}", pid))
            .stdout(std::process::Stdio::null())
            .stderr(std::process::Stdio::null())
            .status()?;
        if status.success() {
            Ok(())
        } else {
            Err(std::io::Error::other(format!(
                "kill -KILL -{} exited with {}",
                pid, status
            )))
        }
    }
}
