//! `pdflatex` backend for the compile pipeline.
//!
//! Flow: validate → workspace → write `document.tex` → check binary →
//!       spawn with timeout → inspect exit status → read `document.pdf`.
//!
//! Each step returns a distinct `LatexError`. The compiler is never retried.

use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::Command;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::compile::error::LatexError;
use crate::compile::workspace::Workspace;
use crate::compile::{validate_source, Artifact, DocumentCompiler};
use crate::config::Config;

const NO_OUTPUT: &str = "No output from pdflatex";
/// Floor on the time given to drain output once pdflatex has exited.
const MIN_PIPE_DRAIN: Duration = Duration::from_millis(250);

/// Captured result of a finished compiler process.
struct ProcessOutput {
    status: ExitStatus,
    stdout: Vec<u8>,
    stderr: Vec<u8>,
}

impl ProcessOutput {
    /// Prefers stderr, falls back to stdout. pdflatex writes most of its
    /// errors to stdout, so the fallback is the common case.
    fn diagnostics(&self) -> String {
        let stderr = String::from_utf8_lossy(&self.stderr);
        if !stderr.trim().is_empty() {
            return stderr.into_owned();
        }
        let stdout = String::from_utf8_lossy(&self.stdout);
        if !stdout.trim().is_empty() {
            return stdout.into_owned();
        }
        NO_OUTPUT.to_string()
    }
}

/// Runs the system `pdflatex` at a fixed path in batch mode with shell-escape
/// disabled.
#[derive(Debug, Clone)]
pub struct PdfLatexCompiler {
    binary: PathBuf,
    timeout: Duration,
    workdir: PathBuf,
}

impl PdfLatexCompiler {
    pub fn new(binary: impl Into<PathBuf>, timeout: Duration, workdir: impl Into<PathBuf>) -> Self {
        Self {
            binary: binary.into(),
            timeout,
            workdir: workdir.into(),
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(
            config.pdflatex_path.clone(),
            config.compile_timeout,
            config.compile_workdir.clone(),
        )
    }

    pub fn binary(&self) -> &Path {
        &self.binary
    }

    async fn ensure_binary(&self) -> Result<(), LatexError> {
        let executable = match tokio::fs::metadata(&self.binary).await {
            Ok(meta) => is_executable(&meta),
            Err(_) => false,
        };

        if !executable {
            error!(
                "pdflatex NOT executable / not found at: {}",
                self.binary.display()
            );
            return Err(LatexError::DependencyMissing {
                path: self.binary.clone(),
            });
        }
        Ok(())
    }

    /// Builds the invocation. The workspace is both input and output
    /// directory; `-no-shell-escape` keeps `\write18` from reaching the host.
    fn command(&self, workspace: &Workspace) -> Command {
        let mut output_dir = OsString::from("-output-directory=");
        output_dir.push(workspace.path());

        let mut command = Command::new(&self.binary);
        command
            .arg(output_dir)
            .arg("-halt-on-error")
            .arg("-interaction=nonstopmode")
            .arg("-no-shell-escape")
            .arg(workspace.source_path())
            .current_dir(workspace.path())
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            // Backstop for a dropped request future (client disconnect).
            .kill_on_drop(true);
        #[cfg(unix)]
        command.process_group(0);
        command
    }

    async fn run(&self, workspace: &Workspace) -> Result<ProcessOutput, LatexError> {
        let mut command = self.command(workspace);
        debug!("Executing: {:?}", command.as_std());

        let started = Instant::now();
        let mut child = command
            .spawn()
            .map_err(|e| LatexError::io("Failed to start pdflatex", e))?;
        // Leader of its own group, so pgid == pid
        let group = child.id();

        // Pipes are drained on their own tasks so a descendant holding them
        // open cannot hold up the exit status.
        let stdout_task = tokio::spawn(read_pipe(child.stdout.take()));
        let stderr_task = tokio::spawn(read_pipe(child.stderr.take()));

        let waited = tokio::time::timeout(self.timeout, child.wait()).await;
        let status = match waited {
            Ok(Ok(status)) => status,
            Ok(Err(e)) => {
                kill_process_group(group);
                stdout_task.abort();
                stderr_task.abort();
                return Err(LatexError::io("Failed to wait for pdflatex", e));
            }
            Err(_) => {
                warn!(
                    "pdflatex exceeded {:?} budget, killing process group {:?}",
                    self.timeout, group
                );
                kill_process_group(group);
                // kill() also reaps, so nothing is left behind as a zombie
                if let Err(e) = child.kill().await {
                    warn!("Failed to kill timed-out pdflatex: {e}");
                }
                stdout_task.abort();
                stderr_task.abort();
                return Err(LatexError::Timeout {
                    budget: self.timeout,
                });
            }
        };

        // Helpers pdflatex left running (mktexpk and friends) go with it
        kill_process_group(group);

        let drain = self
            .timeout
            .saturating_sub(started.elapsed())
            .max(MIN_PIPE_DRAIN);
        let deadline = tokio::time::Instant::now() + drain;
        let stdout = collect_pipe(stdout_task, deadline, "stdout").await;
        let stderr = collect_pipe(stderr_task, deadline, "stderr").await;

        debug!(
            "pdflatex exited with {} after {}ms",
            status,
            started.elapsed().as_millis()
        );
        Ok(ProcessOutput {
            status,
            stdout,
            stderr,
        })
    }
}

#[async_trait]
impl DocumentCompiler for PdfLatexCompiler {
    async fn compile(&self, source: &str) -> Result<Artifact, LatexError> {
        validate_source(source)?;
        info!("Compile request: {} bytes of LaTeX", source.len());

        let workspace = Workspace::create(&self.workdir).await?;
        let source_path = workspace.write_source(source).await?;
        debug!("Wrote tex file to: {}", source_path.display());

        self.ensure_binary().await?;

        let output = self.run(&workspace).await?;
        if !output.status.success() {
            let diagnostics = output.diagnostics();
            warn!(
                "pdflatex FAILED ({}): {} bytes of diagnostics",
                output.status,
                diagnostics.len()
            );
            return Err(LatexError::Compilation { diagnostics });
        }

        let bytes = workspace.read_artifact().await.map_err(|e| {
            error!("pdflatex reported success but no PDF was readable: {e:?}");
            e
        })?;
        let artifact = Artifact::new(bytes);
        if artifact.is_empty() {
            error!("pdflatex reported success but wrote an empty PDF");
            return Err(LatexError::ArtifactMissing {
                source: std::io::Error::new(std::io::ErrorKind::InvalidData, "empty PDF"),
            });
        }
        info!("Compiled PDF: {} bytes", artifact.len());

        Ok(artifact)
    }

    async fn is_available(&self) -> bool {
        tokio::fs::metadata(&self.binary)
            .await
            .map(|meta| is_executable(&meta))
            .unwrap_or(false)
    }
}

/// Waits until `deadline` for a pipe reader. Output that cannot be collected
/// in time is dropped rather than failing a compile that already finished.
async fn collect_pipe(
    mut task: JoinHandle<std::io::Result<Vec<u8>>>,
    deadline: tokio::time::Instant,
    name: &str,
) -> Vec<u8> {
    match tokio::time::timeout_at(deadline, &mut task).await {
        Ok(Ok(Ok(buf))) => buf,
        Ok(Ok(Err(e))) => {
            warn!("Failed to read pdflatex {name}: {e}");
            Vec::new()
        }
        Ok(Err(e)) => {
            warn!("pdflatex {name} reader panicked: {e}");
            Vec::new()
        }
        Err(_) => {
            warn!("pdflatex {name} still open after exit, giving up on it");
            task.abort();
            Vec::new()
        }
    }
}

#[cfg(unix)]
fn kill_process_group(group: Option<u32>) {
    let Some(pgid) = group.and_then(|id| libc::pid_t::try_from(id).ok()) else {
        return;
    };
    // SAFETY: killpg only sends a signal; no memory is shared with the callee.
    let rc = unsafe { libc::killpg(pgid, libc::SIGKILL) };
    if rc != 0 {
        let err = std::io::Error::last_os_error();
        // ESRCH just means the group is already empty
        if err.raw_os_error() != Some(libc::ESRCH) {
            warn!("Failed to kill process group {pgid}: {err}");
        }
    }
}

#[cfg(not(unix))]
fn kill_process_group(_group: Option<u32>) {}

async fn read_pipe<R>(pipe: Option<R>) -> std::io::Result<Vec<u8>>
where
    R: AsyncRead + Unpin,
{
    let mut buf = Vec::new();
    if let Some(mut pipe) = pipe {
        pipe.read_to_end(&mut buf).await?;
    }
    Ok(buf)
}

#[cfg(unix)]
fn is_executable(meta: &std::fs::Metadata) -> bool {
    use std::os::unix::fs::PermissionsExt;
    meta.is_file() && meta.permissions().mode() & 0o111 != 0
}

#[cfg(not(unix))]
fn is_executable(meta: &std::fs::Metadata) -> bool {
    meta.is_file()
}

// ────────────────────────────────────────────────────────────────────────────
// Tests
//
// Shell scripts stand in for pdflatex. They see the same argv the real binary
// would and write into the workspace the same way.
// ────────────────────────────────────────────────────────────────────────────

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use std::os::unix::fs::PermissionsExt;
    use tempfile::TempDir;

    const SAMPLE: &str = "\\documentclass{article}\n\\begin{document}\nHello\n\\end{document}\n";

    /// Extracts the workspace from `-output-directory=` into `$out`.
    const FIND_OUT_DIR: &str = r#"for arg in "$@"; do
  case "$arg" in
    -output-directory=*) out="${arg#-output-directory=}" ;;
  esac
done"#;

    const WRITE_PDF: &str = r#"printf '%%PDF-1.5 fake artifact' > "$out/document.pdf""#;

    struct Harness {
        scripts: TempDir,
        workdir: TempDir,
    }

    impl Harness {
        fn new() -> Self {
            Self {
                scripts: tempfile::tempdir().unwrap(),
                workdir: tempfile::tempdir().unwrap(),
            }
        }

        fn script(&self, name: &str, body: &str) -> PathBuf {
            let path = self.scripts.path().join(name);
            std::fs::write(&path, ["#!/bin/sh", FIND_OUT_DIR, body, ""].join("\n")).unwrap();
            let mut perms = std::fs::metadata(&path).unwrap().permissions();
            perms.set_mode(0o755);
            std::fs::set_permissions(&path, perms).unwrap();
            path
        }

        fn scratch(&self, name: &str) -> PathBuf {
            self.scripts.path().join(name)
        }

        fn compiler(&self, binary: PathBuf) -> PdfLatexCompiler {
            self.compiler_with_timeout(binary, Duration::from_secs(10))
        }

        fn compiler_with_timeout(&self, binary: PathBuf, timeout: Duration) -> PdfLatexCompiler {
            PdfLatexCompiler::new(binary, timeout, self.workdir.path())
        }

        fn leftover_workspaces(&self) -> usize {
            std::fs::read_dir(self.workdir.path()).unwrap().count()
        }
    }

    #[tokio::test]
    async fn test_successful_compile_returns_pdf_and_cleans_up() {
        let h = Harness::new();
        let compiler = h.compiler(h.script("pdflatex", WRITE_PDF));

        let artifact = compiler.compile(SAMPLE).await.unwrap();

        assert!(!artifact.is_empty());
        assert!(artifact.bytes.starts_with(b"%PDF"));
        assert_eq!(h.leftover_workspaces(), 0);
    }

    #[tokio::test]
    async fn test_blank_input_never_touches_disk_or_spawns() {
        let h = Harness::new();
        let marker = h.scratch("spawned");
        let body = format!("touch '{}'", marker.display());
        let compiler = h.compiler(h.script("pdflatex", &body));

        for source in ["", "   ", "\n\t\r\n"] {
            let err = compiler.compile(source).await.unwrap_err();
            assert!(matches!(err, LatexError::Validation));
        }

        assert!(!marker.exists());
        assert_eq!(h.leftover_workspaces(), 0);
    }

    #[tokio::test]
    async fn test_compiler_rejection_surfaces_stdout_diagnostics() {
        let h = Harness::new();
        let body = "echo '! Missing } inserted.'\necho 'l.3 \\textbf{unclosed'\nexit 1";
        let compiler = h.compiler(h.script("pdflatex", body));

        let err = compiler
            .compile("\\documentclass{article}\\begin{document}\\textbf{unclosed")
            .await
            .unwrap_err();

        match err {
            LatexError::Compilation { diagnostics } => {
                assert!(diagnostics.contains("! Missing } inserted."));
                assert!(diagnostics.contains("l.3"));
            }
            other => panic!("expected Compilation, got {other:?}"),
        }
        assert_eq!(h.leftover_workspaces(), 0);
    }

    #[tokio::test]
    async fn test_stderr_is_preferred_over_stdout() {
        let h = Harness::new();
        let body = "echo 'This is pdfTeX, Version 3.14'\necho 'fatal: font not found' >&2\nexit 1";
        let compiler = h.compiler(h.script("pdflatex", body));

        let err = compiler.compile(SAMPLE).await.unwrap_err();
        match err {
            LatexError::Compilation { diagnostics } => {
                assert!(diagnostics.contains("fatal: font not found"));
                assert!(!diagnostics.contains("pdfTeX"));
            }
            other => panic!("expected Compilation, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_silent_failure_gets_placeholder_diagnostics() {
        let h = Harness::new();
        let compiler = h.compiler(h.script("pdflatex", "exit 3"));

        let err = compiler.compile(SAMPLE).await.unwrap_err();
        match err {
            LatexError::Compilation { diagnostics } => assert_eq!(diagnostics, NO_OUTPUT),
            other => panic!("expected Compilation, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_success_without_pdf_is_artifact_missing() {
        let h = Harness::new();
        let compiler = h.compiler(h.script("pdflatex", "echo 'Output written nowhere'\nexit 0"));

        let err = compiler.compile(SAMPLE).await.unwrap_err();
        assert!(matches!(err, LatexError::ArtifactMissing { .. }));
        assert_eq!(h.leftover_workspaces(), 0);
    }

    #[tokio::test]
    async fn test_empty_pdf_is_artifact_missing() {
        let h = Harness::new();
        let compiler = h.compiler(h.script("pdflatex", r#": > "$out/document.pdf""#));

        let err = compiler.compile(SAMPLE).await.unwrap_err();
        assert!(matches!(err, LatexError::ArtifactMissing { .. }));
    }

    #[tokio::test]
    async fn test_missing_binary_is_dependency_error() {
        let h = Harness::new();
        let compiler = h.compiler(h.scratch("no-such-pdflatex"));

        let err = compiler.compile(SAMPLE).await.unwrap_err();
        assert!(matches!(err, LatexError::DependencyMissing { .. }));
        assert!(!compiler.is_available().await);
        assert_eq!(h.leftover_workspaces(), 0);
    }

    #[tokio::test]
    async fn test_non_executable_binary_is_dependency_error() {
        let h = Harness::new();
        let path = h.scratch("pdflatex");
        std::fs::write(&path, "#!/bin/sh\nexit 0\n").unwrap();
        let mut perms = std::fs::metadata(&path).unwrap().permissions();
        perms.set_mode(0o644);
        std::fs::set_permissions(&path, perms).unwrap();
        let compiler = h.compiler(path);

        let err = compiler.compile(SAMPLE).await.unwrap_err();
        assert!(matches!(err, LatexError::DependencyMissing { .. }));
    }

    #[tokio::test]
    async fn test_directory_is_not_a_binary() {
        let h = Harness::new();
        let compiler = h.compiler(h.scripts.path().to_path_buf());
        assert!(!compiler.is_available().await);
    }

    #[tokio::test]
    async fn test_runaway_compile_times_out_and_child_is_killed() {
        let h = Harness::new();
        let pid_file = h.scratch("pid");
        let body = format!("echo $$ > '{}'\nexec sleep 30", pid_file.display());
        let budget = Duration::from_millis(500);
        let compiler = h.compiler_with_timeout(h.script("pdflatex", &body), budget);

        let started = Instant::now();
        let err = compiler
            .compile("\\def\\loop{\\loop}\\loop")
            .await
            .unwrap_err();
        let elapsed = started.elapsed();

        assert!(matches!(err, LatexError::Timeout { .. }));
        assert!(elapsed >= budget);
        assert!(elapsed < Duration::from_secs(10), "took {elapsed:?}");
        assert_eq!(h.leftover_workspaces(), 0);

        #[cfg(target_os = "linux")]
        {
            let pid = std::fs::read_to_string(&pid_file).unwrap();
            let proc_entry = PathBuf::from(format!("/proc/{}", pid.trim()));
            assert!(!proc_entry.exists(), "pdflatex stand-in still running");
        }
    }

    /// True once `pid` has exited. Zombies count as gone: they hold no
    /// resources beyond the process table entry their new parent reaps.
    #[cfg(target_os = "linux")]
    async fn process_gone(pid: &str) -> bool {
        let stat = PathBuf::from(format!("/proc/{}/stat", pid.trim()));
        for _ in 0..40 {
            match std::fs::read_to_string(&stat) {
                Err(_) => return true,
                Ok(line) => {
                    let state = line
                        .rsplit(')')
                        .next()
                        .and_then(|rest| rest.trim().chars().next());
                    if state == Some('Z') {
                        return true;
                    }
                }
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
        false
    }

    #[cfg(target_os = "linux")]
    #[tokio::test]
    async fn test_timeout_kills_helpers_spawned_by_compiler() {
        let h = Harness::new();
        let helper_pid = h.scratch("helper-pid");
        let body = format!(
            "sleep 60 &\necho $! > '{}'\nexec sleep 60",
            helper_pid.display()
        );
        let compiler =
            h.compiler_with_timeout(h.script("pdflatex", &body), Duration::from_millis(500));

        let err = compiler.compile(SAMPLE).await.unwrap_err();

        assert!(matches!(err, LatexError::Timeout { .. }));
        let pid = std::fs::read_to_string(&helper_pid).unwrap();
        assert!(process_gone(&pid).await, "helper {pid} outlived the timeout");
        assert_eq!(h.leftover_workspaces(), 0);
    }

    #[tokio::test]
    async fn test_background_helper_holding_pipes_does_not_fail_compile() {
        let h = Harness::new();
        let helper_pid = h.scratch("helper-pid");
        let body = format!(
            "{}\nsleep 30 &\necho $! > '{}'\nexit 0",
            WRITE_PDF,
            helper_pid.display()
        );
        let compiler = h.compiler_with_timeout(h.script("pdflatex", &body), Duration::from_secs(2));

        let started = Instant::now();
        let artifact = compiler.compile(SAMPLE).await.unwrap();

        assert!(artifact.bytes.starts_with(b"%PDF"));
        assert!(started.elapsed() < Duration::from_secs(2));
        assert_eq!(h.leftover_workspaces(), 0);

        #[cfg(target_os = "linux")]
        {
            let pid = std::fs::read_to_string(&helper_pid).unwrap();
            assert!(process_gone(&pid).await, "helper {pid} left running");
        }
    }

    #[tokio::test]
    async fn test_invocation_disables_shell_escape_and_prompts() {
        let h = Harness::new();
        let args_file = h.scratch("argv");
        let body = format!("echo \"$@\" > '{}'\n{}", args_file.display(), WRITE_PDF);
        let compiler = h.compiler(h.script("pdflatex", &body));

        compiler
            .compile("\\immediate\\write18{touch /tmp/pwned}\\end")
            .await
            .unwrap();

        let argv = std::fs::read_to_string(&args_file).unwrap();
        assert!(argv.contains("-no-shell-escape"));
        assert!(argv.contains("-interaction=nonstopmode"));
        assert!(argv.contains("-halt-on-error"));
        assert!(argv.contains("-output-directory="));
        assert!(argv.trim_end().ends_with("document.tex"));
    }

    #[tokio::test]
    async fn test_command_arguments() {
        let h = Harness::new();
        let compiler = h.compiler(PathBuf::from("/usr/bin/pdflatex"));
        let workspace = Workspace::create(h.workdir.path()).await.unwrap();

        let command = compiler.command(&workspace);
        let std_command = command.as_std();
        let args: Vec<String> = std_command
            .get_args()
            .map(|a| a.to_string_lossy().into_owned())
            .collect();

        assert_eq!(std_command.get_program(), "/usr/bin/pdflatex");
        assert_eq!(
            args[0],
            format!("-output-directory={}", workspace.path().display())
        );
        assert_eq!(
            &args[1..4],
            &["-halt-on-error", "-interaction=nonstopmode", "-no-shell-escape"]
        );
        assert_eq!(args[4], workspace.source_path().to_string_lossy());
        assert_eq!(std_command.get_current_dir(), Some(workspace.path()));
    }

    #[tokio::test]
    async fn test_source_reaches_compiler_verbatim() {
        let h = Harness::new();
        let capture = h.scratch("captured.tex");
        let body = format!("cp \"$out/document.tex\" '{}'\n{}", capture.display(), WRITE_PDF);
        let compiler = h.compiler(h.script("pdflatex", &body));

        let source = "\n  \\documentclass{article}  \n% ünïcode\n\\begin{document}x\\end{document}\n\n";
        compiler.compile(source).await.unwrap();

        assert_eq!(std::fs::read_to_string(&capture).unwrap(), source);
    }

    #[tokio::test]
    async fn test_repeated_and_concurrent_compiles_are_independent() {
        let h = Harness::new();
        let log = h.scratch("workspaces.log");
        let body = format!("echo \"$out\" >> '{}'\n{}", log.display(), WRITE_PDF);
        let compiler = h.compiler(h.script("pdflatex", &body));

        let (a, b) = tokio::join!(compiler.compile(SAMPLE), compiler.compile(SAMPLE));
        let c = compiler.compile(SAMPLE).await;

        let (a, b, c) = (a.unwrap(), b.unwrap(), c.unwrap());
        assert_eq!(a.bytes, b.bytes);
        assert_eq!(b.bytes, c.bytes);

        let dirs: std::collections::HashSet<String> = std::fs::read_to_string(&log)
            .unwrap()
            .lines()
            .map(str::to_string)
            .collect();
        assert_eq!(dirs.len(), 3, "each compile must get its own workspace");
        assert_eq!(h.leftover_workspaces(), 0);
    }

    #[test]
    fn test_diagnostics_ignore_whitespace_only_stderr() {
        use std::os::unix::process::ExitStatusExt;

        let output = ProcessOutput {
            status: ExitStatus::from_raw(1 << 8),
            stdout: b"! Undefined control sequence.".to_vec(),
            stderr: b"\n  \n".to_vec(),
        };
        assert_eq!(output.diagnostics(), "! Undefined control sequence.");
    }
}
