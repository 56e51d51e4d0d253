use crate::{AdapterError, Result};
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};
use std::time::Duration;
use tokio::io::AsyncReadExt;
use tokio::process::{Child, Command};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

const DEFAULT_GRACE: Duration = Duration::from_secs(5);
const STDERR_TAIL_BYTES: usize = 2_048;

/// A subprocess invocation with explicit bounds. The child starts from an
/// empty environment (only `PATH` and the listed variables are passed) and
/// is terminated with SIGTERM, then SIGKILL after `grace`.
#[derive(Debug, Clone)]
pub struct ProcessSpec {
    pub program: OsString,
    pub args: Vec<OsString>,
    pub cwd: PathBuf,
    pub env: Vec<(String, String)>,
    pub max_memory_mb: Option<u64>,
    pub grace: Duration,
}

impl ProcessSpec {
    pub fn new(program: impl Into<OsString>, cwd: impl AsRef<Path>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            cwd: cwd.as_ref().to_path_buf(),
            env: Vec::new(),
            max_memory_mb: None,
            grace: DEFAULT_GRACE,
        }
    }

    pub fn arg(mut self, arg: impl Into<OsString>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<OsString>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }

    pub fn max_memory_mb(mut self, limit: Option<u64>) -> Self {
        self.max_memory_mb = limit;
        self
    }

    pub fn grace(mut self, grace: Duration) -> Self {
        self.grace = grace;
        self
    }
}

#[derive(Debug)]
pub struct ProcessOutput {
    pub status: ExitStatus,
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
}

impl ProcessOutput {
    pub fn success(&self) -> bool {
        self.status.success()
    }

    /// Last bytes of stderr, for diagnostics.
    pub fn stderr_tail(&self) -> String {
        let start = self.stderr.len().saturating_sub(STDERR_TAIL_BYTES);
        String::from_utf8_lossy(&self.stderr[start..]).trim().to_string()
    }
}

/// Locate `program` on `PATH` (or accept it as a path when it has a
/// separator).
pub fn find_program(program: &str) -> Option<PathBuf> {
    let candidate = Path::new(program);
    if candidate.components().count() > 1 {
        return candidate.is_file().then(|| candidate.to_path_buf());
    }
    let path = std::env::var_os("PATH")?;
    std::env::split_paths(&path)
        .map(|dir| dir.join(program))
        .find(|full| full.is_file())
}

/// Run a subprocess until it exits, the token is cancelled, or the deadline
/// passes; whichever comes first.
pub async fn run_bounded(
    spec: &ProcessSpec,
    cancel: &CancellationToken,
    deadline: Instant,
) -> Result<ProcessOutput> {
    let mut command = Command::new(&spec.program);
    command
        .args(&spec.args)
        .current_dir(&spec.cwd)
        .env_clear()
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);
    if let Some(path) = std::env::var_os("PATH") {
        command.env("PATH", path);
    }
    command.env("HOME", &spec.cwd);
    for (key, value) in &spec.env {
        command.env(key, value);
    }
    apply_limits(&mut command, spec.max_memory_mb);

    let mut child = command.spawn().map_err(|e| {
        AdapterError::External(format!(
            "failed to spawn {}: {e}",
            spec.program.to_string_lossy()
        ))
    })?;

    let stdout = child.stdout.take();
    let stderr = child.stderr.take();
    let stdout_task = tokio::spawn(read_all(stdout));
    let stderr_task = tokio::spawn(read_all(stderr));

    let outcome = tokio::select! {
        status = child.wait() => Ok(status?),
        _ = cancel.cancelled() => Err(AdapterError::Cancelled),
        _ = tokio::time::sleep_until(deadline) => Err(AdapterError::Timeout(format!(
            "{} exceeded its time budget",
            spec.program.to_string_lossy()
        ))),
    };

    let status = match outcome {
        Ok(status) => status,
        Err(err) => {
            terminate(&mut child, spec.grace).await;
            stdout_task.abort();
            stderr_task.abort();
            return Err(err);
        }
    };

    let stdout = stdout_task.await.unwrap_or_default();
    let stderr = stderr_task.await.unwrap_or_default();
    Ok(ProcessOutput {
        status,
        stdout,
        stderr,
    })
}

async fn read_all<R>(reader: Option<R>) -> Vec<u8>
where
    R: tokio::io::AsyncRead + Unpin,
{
    let mut buf = Vec::new();
    if let Some(mut reader) = reader {
        if let Err(e) = reader.read_to_end(&mut buf).await {
            log::debug!("subprocess pipe read failed: {e}");
        }
    }
    buf
}

/// SIGTERM, wait up to `grace`, then SIGKILL.
async fn terminate(child: &mut Child, grace: Duration) {
    #[cfg(unix)]
    {
        if let Some(pid) = child.id() {
            unsafe {
                let _ = libc::kill(pid as i32, libc::SIGTERM);
            }
            if tokio::time::timeout(grace, child.wait()).await.is_ok() {
                return;
            }
            log::warn!("subprocess {pid} ignored SIGTERM for {grace:?}; killing");
        }
    }
    #[cfg(not(unix))]
    let _ = grace;

    if let Err(e) = child.kill().await {
        log::debug!("failed to kill subprocess: {e}");
    }
}

#[cfg(unix)]
fn apply_limits(command: &mut Command, max_memory_mb: Option<u64>) {
    let max_bytes = max_memory_mb.map(|mb| mb.saturating_mul(1024 * 1024));
    unsafe {
        command.pre_exec(move || {
            let no_core = libc::rlimit {
                rlim_cur: 0,
                rlim_max: 0,
            };
            libc::setrlimit(libc::RLIMIT_CORE, &no_core);
            if let Some(bytes) = max_bytes {
                let limit = libc::rlimit {
                    rlim_cur: bytes as libc::rlim_t,
                    rlim_max: bytes as libc::rlim_t,
                };
                if libc::setrlimit(libc::RLIMIT_AS, &limit) == -1 {
                    return Err(std::io::Error::last_os_error());
                }
            }
            Ok(())
        });
    }
}

#[cfg(not(unix))]
fn apply_limits(_command: &mut Command, _max_memory_mb: Option<u64>) {}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn captures_output_with_scrubbed_environment() {
        let dir = tempdir().unwrap();
        std::env::set_var("CODECITY_TEST_LEAK", "1");
        let spec = ProcessSpec::new("sh", dir.path())
            .arg("-c")
            .arg("echo \"${CODECITY_TEST_LEAK:-clean}:$EXTRA\"")
            .env("EXTRA", "x");
        let out = run_bounded(
            &spec,
            &CancellationToken::new(),
            Instant::now() + Duration::from_secs(10),
        )
        .await
        .unwrap();
        assert!(out.success());
        assert_eq!(String::from_utf8_lossy(&out.stdout).trim(), "clean:x");
    }

    #[tokio::test]
    async fn deadline_terminates_the_child() {
        let dir = tempdir().unwrap();
        let spec = ProcessSpec::new("sleep", dir.path())
            .arg("30")
            .grace(Duration::from_millis(200));
        let started = std::time::Instant::now();
        let err = run_bounded(
            &spec,
            &CancellationToken::new(),
            Instant::now() + Duration::from_millis(200),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, AdapterError::Timeout(_)));
        assert!(started.elapsed() < Duration::from_secs(10));
    }

    #[tokio::test]
    async fn cancellation_is_reported() {
        let dir = tempdir().unwrap();
        let cancel = CancellationToken::new();
        let spec = ProcessSpec::new("sleep", dir.path()).arg("30");
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(100)).await;
            trigger.cancel();
        });
        let err = run_bounded(&spec, &cancel, Instant::now() + Duration::from_secs(30))
            .await
            .unwrap_err();
        assert!(matches!(err, AdapterError::Cancelled));
    }

    #[test]
    fn finds_shell_on_path() {
        assert!(find_program("sh").is_some());
        assert!(find_program("definitely-not-a-real-binary-xyz").is_none());
    }
}
