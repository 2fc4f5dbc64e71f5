//! Headless office-suite engine (`soffice --convert-to pdf`).

use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::{Child, Command};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::{ConversionAdapter, expected_output};
use crate::error::{ConvertError, Result};
use crate::store::delete_file;

/// Upper bound on diagnostic text carried into an error.
const MAX_DIAGNOSTIC_BYTES: usize = 2048;
/// How long to keep draining pipes after the converter has exited.
const PIPE_DRAIN_TIMEOUT: Duration = Duration::from_secs(2);

#[derive(Debug, Clone)]
pub struct OfficeSettings {
    /// Binary name (looked up on `PATH`) or path.
    pub binary: PathBuf,
    /// Parent of the throwaway per-conversion profile directories.
    pub profile_root: PathBuf,
}

impl Default for OfficeSettings {
    fn default() -> Self {
        Self {
            binary: PathBuf::from("soffice"),
            profile_root: std::env::temp_dir().join("docpress-office-profiles"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct OfficeAdapter {
    settings: OfficeSettings,
}

impl OfficeAdapter {
    pub fn new(settings: OfficeSettings) -> Self {
        Self { settings }
    }

    /// Locate the configured binary without running it. Blocks on file metadata.
    pub fn resolve_binary(&self) -> Option<PathBuf> {
        let binary = &self.settings.binary;
        if binary.is_absolute() || binary.components().count() > 1 {
            return is_executable(binary).then(|| binary.clone());
        }
        let search = std::env::var_os("PATH")?;
        std::env::split_paths(&search).find_map(|dir| {
            let candidate = dir.join(binary);
            if is_executable(&candidate) {
                return Some(candidate);
            }
            #[cfg(windows)]
            {
                let exe = candidate.with_extension("exe");
                if is_executable(&exe) {
                    return Some(exe);
                }
            }
            None
        })
    }

    /// [`OfficeAdapter::resolve_binary`] on the blocking pool.
    async fn locate(&self) -> Option<PathBuf> {
        let adapter = self.clone();
        tokio::task::spawn_blocking(move || adapter.resolve_binary())
            .await
            .ok()
            .flatten()
    }

    async fn run(
        &self,
        binary: &Path,
        input: &Path,
        output_dir: &Path,
        invocation: &mut Invocation,
        timeout: Duration,
    ) -> Result<String> {
        let mut command = Command::new(binary);
        command
            .args(["--headless", "--norestore", "--nologo", "--nolockcheck"])
            .arg(format!("-env:UserInstallation={}", file_url(&invocation.profile)))
            .args(["--convert-to", "pdf", "--outdir"])
            .arg(output_dir)
            .arg(input)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        // The suite forks helpers; a dedicated group lets us kill all of them.
        #[cfg(unix)]
        command.process_group(0);

        let mut child = command.spawn().map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound | std::io::ErrorKind::PermissionDenied => {
                ConvertError::EngineUnavailable(format!("cannot execute {}: {e}", binary.display()))
            }
            _ => ConvertError::failed(format!("failed to launch converter: {e}")),
        })?;
        let pid = child.id();
        invocation.pid = pid;
        debug!(pid, input = %input.display(), "converter process started");

        let stdout = drain(child.stdout.take());
        let stderr = drain(child.stderr.take());

        let status: ExitStatus = match tokio::time::timeout(timeout, child.wait()).await {
            Ok(Ok(status)) => {
                // Helpers forked by the leader must not outlive it.
                invocation.kill_group();
                status
            }
            Ok(Err(e)) => {
                terminate(&mut child, pid).await;
                return Err(ConvertError::failed(format!("waiting for converter: {e}")));
            }
            Err(_) => {
                warn!(pid, timeout_secs = timeout.as_secs(), input = %input.display(), "converter timed out; killing process group");
                terminate(&mut child, pid).await;
                stdout.abort();
                stderr.abort();
                return Err(ConvertError::Timeout(timeout));
            }
        };

        let stdout = collect(stdout).await;
        let stderr = collect(stderr).await;
        let detail = diagnostic(&stderr, &stdout);

        if status.success() {
            Ok(detail)
        } else {
            Err(ConvertError::failed(format!("converter exited with {status}: {detail}")))
        }
    }
}

#[async_trait]
impl ConversionAdapter for OfficeAdapter {
    fn name(&self) -> &str {
        "office"
    }

    async fn is_available(&self) -> bool {
        self.locate().await.is_some()
    }

    async fn convert(&self, input: &Path, output_dir: &Path, timeout: Duration) -> Result<PathBuf> {
        let binary = self.locate().await.ok_or_else(|| {
            ConvertError::EngineUnavailable(format!(
                "'{}' was not found or is not executable",
                self.settings.binary.display()
            ))
        })?;
        let expected = expected_output(input, output_dir);
        let mut invocation = Invocation::new(
            self.settings.profile_root.join(Uuid::new_v4().to_string()),
            expected.clone(),
        );

        let result = self.run(&binary, input, output_dir, &mut invocation, timeout).await;
        invocation.finish().await;

        match result {
            Ok(detail) => {
                if tokio::fs::try_exists(&expected).await? {
                    info!(output = %expected.display(), "office conversion finished");
                    Ok(expected)
                } else {
                    let name = expected
                        .file_name()
                        .map(|n| n.to_string_lossy().into_owned())
                        .unwrap_or_default();
                    Err(ConvertError::OutputMissing(format!("{name}; converter said: {detail}")))
                }
            }
            Err(e) => {
                // A killed or failed run may leave a partial file behind.
                if let Err(rm) = delete_file(&expected).await {
                    warn!(output = %expected.display(), error = %rm, "failed to remove partial output");
                }
                Err(e)
            }
        }
    }
}

/// Process group and scratch files of one converter run.
///
/// [`Invocation::finish`] tears it down on the normal path. If the request is
/// dropped mid-conversion, `Drop` kills the group and removes the profile and
/// any partial output synchronously.
#[derive(Debug)]
struct Invocation {
    pid: Option<u32>,
    profile: PathBuf,
    partial: Option<PathBuf>,
    finished: bool,
}

impl Invocation {
    fn new(profile: PathBuf, partial: PathBuf) -> Self {
        Self {
            pid: None,
            profile,
            partial: Some(partial),
            finished: false,
        }
    }

    fn kill_group(&self) {
        #[cfg(unix)]
        if let Some(pid) = self.pid {
            kill_group(pid);
        }
    }

    async fn finish(&mut self) {
        self.kill_group();
        self.pid = None;
        // The caller owns the output from here on.
        self.partial = None;
        if let Err(e) = tokio::fs::remove_dir_all(&self.profile).await {
            if e.kind() != std::io::ErrorKind::NotFound {
                warn!(profile = %self.profile.display(), error = %e, "failed to remove converter profile");
            }
        }
        self.finished = true;
    }
}

impl Drop for Invocation {
    fn drop(&mut self) {
        if self.finished {
            return;
        }
        if self.pid.is_some() {
            self.kill_group();
            warn!(pid = self.pid, "conversion abandoned; converter process group killed");
        }
        if let Err(e) = std::fs::remove_dir_all(&self.profile) {
            if e.kind() != std::io::ErrorKind::NotFound {
                warn!(profile = %self.profile.display(), error = %e, "failed to remove converter profile");
            }
        }
        if let Some(partial) = self.partial.take() {
            if let Err(e) = std::fs::remove_file(&partial) {
                if e.kind() != std::io::ErrorKind::NotFound {
                    warn!(output = %partial.display(), error = %e, "failed to remove partial output");
                }
            }
        }
    }
}

fn drain<R>(pipe: Option<R>) -> JoinHandle<Vec<u8>>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut buf = Vec::new();
        if let Some(mut pipe) = pipe {
            let _ = pipe.read_to_end(&mut buf).await;
        }
        buf
    })
}

/// Helpers that outlive the converter can hold its pipes open; don't wait on them forever.
async fn collect(handle: JoinHandle<Vec<u8>>) -> Vec<u8> {
    let abort = handle.abort_handle();
    match tokio::time::timeout(PIPE_DRAIN_TIMEOUT, handle).await {
        Ok(Ok(buf)) => buf,
        Ok(Err(_)) => Vec::new(),
        Err(_) => {
            abort.abort();
            Vec::new()
        }
    }
}

async fn terminate(child: &mut Child, pid: Option<u32>) {
    #[cfg(unix)]
    if let Some(pid) = pid {
        kill_group(pid);
    }
    #[cfg(not(unix))]
    let _ = pid;

    // Reaps the leader; with kill_on_drop this is the last line of defence.
    if let Err(e) = child.kill().await {
        debug!(error = %e, "converter already exited when killed");
    }
}

#[cfg(unix)]
fn kill_group(pid: u32) {
    let Ok(pgid) = libc::pid_t::try_from(pid) else {
        return;
    };
    // SAFETY: killpg only delivers a signal. The child was spawned with
    // process_group(0), so its pid is the id of a group we created.
    let rc = unsafe { libc::killpg(pgid, libc::SIGKILL) };
    if rc != 0 {
        let err = std::io::Error::last_os_error();
        if err.raw_os_error() != Some(libc::ESRCH) {
            warn!(pgid, error = %err, "failed to kill converter process group");
        }
    }
}

fn diagnostic(stderr: &[u8], stdout: &[u8]) -> String {
    let primary = String::from_utf8_lossy(stderr);
    let text = if primary.trim().is_empty() {
        String::from_utf8_lossy(stdout)
    } else {
        primary
    };
    let text = text.trim();
    if text.is_empty() {
        return "no diagnostic output".to_owned();
    }
    if text.len() <= MAX_DIAGNOSTIC_BYTES {
        return text.to_owned();
    }
    let mut end = MAX_DIAGNOSTIC_BYTES;
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}…", &text[..end])
}

fn is_executable(path: &Path) -> bool {
    let Ok(meta) = std::fs::metadata(path) else {
        return false;
    };
    if !meta.is_file() {
        return false;
    }
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        meta.permissions().mode() & 0o111 != 0
    }
    #[cfg(not(unix))]
    {
        true
    }
}

fn file_url(path: &Path) -> String {
    let absolute = std::path::absolute(path).unwrap_or_else(|_| path.to_path_buf());
    let raw = absolute.to_string_lossy().replace('\\', "/").replace(' ', "%20");
    if raw.starts_with('/') {
        format!("file://{raw}")
    } else {
        format!("file:///{raw}")
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn diagnostic_prefers_stderr_and_truncates() {
        assert_eq!(diagnostic(b"  bad file \n", b"ignored"), "bad file");
        assert_eq!(diagnostic(b"", b"from stdout"), "from stdout");
        assert_eq!(diagnostic(b"", b""), "no diagnostic output");

        let long = "é".repeat(MAX_DIAGNOSTIC_BYTES);
        let d = diagnostic(long.as_bytes(), b"");
        assert!(d.ends_with('…'));
        assert!(d.len() <= MAX_DIAGNOSTIC_BYTES + '…'.len_utf8());
    }

    #[cfg(unix)]
    #[test]
    fn file_url_is_absolute() {
        assert_eq!(file_url(Path::new("/tmp/a b")), "file:///tmp/a%20b");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn binary_is_found_on_path() {
        let adapter = OfficeAdapter::new(OfficeSettings {
            binary: PathBuf::from("sh"),
            ..OfficeSettings::default()
        });
        assert!(adapter.is_available().await);
        assert!(adapter.locate().await.is_some_and(|p| p.is_absolute()));
    }

    #[tokio::test]
    async fn missing_binary_is_unavailable() {
        let adapter = OfficeAdapter::new(OfficeSettings {
            binary: PathBuf::from("docpress-no-such-office-binary"),
            ..OfficeSettings::default()
        });
        assert!(!adapter.is_available().await);

        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("in.docx");
        std::fs::write(&input, b"PK").unwrap();
        let err = adapter
            .convert(&input, dir.path(), Duration::from_secs(5))
            .await
            .unwrap_err();
        assert!(matches!(err, ConvertError::EngineUnavailable(_)), "{err}");
    }
}
