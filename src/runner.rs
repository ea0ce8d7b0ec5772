use std::env;
use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWriteExt, BufReader};
use tokio::process::{ChildStdin, Command};
use tokio::sync::mpsc;
use tokio::time;
use tracing::{debug, info, warn};

use crate::artifacts::ArtifactStore;
use crate::types::{ToolInvocation, ToolResult};

/// What a runner reports back before persistence is attached.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolOutcome {
    pub ok: bool,
    pub output: String,
}

impl ToolOutcome {
    pub fn success(output: impl Into<String>) -> Self {
        Self {
            ok: true,
            output: output.into(),
        }
    }

    pub fn failure(message: impl Into<String>) -> Self {
        Self {
            ok: false,
            output: message.into(),
        }
    }
}

/// One line of tool output, forwarded to an observer as it arrives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolLine {
    pub tool: String,
    pub line: String,
}

/// Executes one external tool. Implementations never fail: every problem is
/// reported as `ok = false` with a readable message.
#[async_trait]
pub trait ToolRunner: Send + Sync {
    async fn run(&self, invocation: &ToolInvocation) -> ToolOutcome;
}

/// Run `invocation` through `runner` and persist its output as a raw artifact.
///
/// Persistence is attempted for every invocation, including missing tools and
/// timeouts, and its failure only leaves `raw_artifact_path` empty.
pub async fn run_tool<R>(
    runner: &R,
    store: &ArtifactStore,
    scan_name: &str,
    invocation: &ToolInvocation,
) -> ToolResult
where
    R: ToolRunner + ?Sized,
{
    let outcome = runner.run(invocation).await;
    if outcome.ok {
        info!(tool = %invocation.tool_name, bytes = outcome.output.len(), "tool finished");
    } else {
        warn!(tool = %invocation.tool_name, "tool degraded: {}", outcome.output.lines().next().unwrap_or(""));
    }
    let raw_artifact_path = store.write_raw(scan_name, &invocation.tool_name, &outcome.output);
    ToolResult {
        ok: outcome.ok,
        output: outcome.output,
        raw_artifact_path,
    }
}

/// [`ToolRunner`] backed by real child processes.
#[derive(Debug, Clone, Default)]
pub struct ProcessRunner {
    observer: Option<mpsc::UnboundedSender<ToolLine>>,
}

impl ProcessRunner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stream every output line to `observer`. Does not change the returned result.
    pub fn with_observer(mut self, observer: mpsc::UnboundedSender<ToolLine>) -> Self {
        self.observer = Some(observer);
        self
    }

    async fn execute(&self, invocation: &ToolInvocation) -> std::io::Result<(ExitStatus, String)> {
        let program = invocation.program();
        let mut cmd = Command::new(program);
        cmd.args(&invocation.command[1..])
            .stdin(if invocation.stdin.is_some() {
                Stdio::piped()
            } else {
                Stdio::null()
            })
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let mut child = cmd.spawn()?;
        debug!(tool = %invocation.tool_name, pid = ?child.id(), "spawned");

        let stdin = child.stdin.take();
        let stdout = child.stdout.take();
        let stderr = child.stderr.take();

        let (tx, mut rx) = mpsc::unbounded_channel::<String>();
        let collect = async {
            let mut output = String::new();
            while let Some(line) = rx.recv().await {
                if let Some(observer) = &self.observer {
                    let _ = observer.send(ToolLine {
                        tool: invocation.tool_name.clone(),
                        line: line.clone(),
                    });
                }
                output.push_str(&line);
                output.push('\n');
            }
            output
        };

        let (_, _, _, output) = tokio::join!(
            feed_stdin(stdin, invocation.stdin.as_deref()),
            pump_lines(stdout, tx.clone()),
            pump_lines(stderr, tx),
            collect,
        );

        let status = child.wait().await?;
        Ok((status, output))
    }
}

#[async_trait]
impl ToolRunner for ProcessRunner {
    async fn run(&self, invocation: &ToolInvocation) -> ToolOutcome {
        let tool = &invocation.tool_name;
        let program = invocation.program();
        if program.is_empty() {
            return ToolOutcome::failure(format!("{tool} has an empty command line"));
        }
        if resolve_executable(program).is_none() {
            return ToolOutcome::failure(format!("{program} not found on PATH; skipping {tool}."));
        }

        let deadline = Duration::from_secs(invocation.timeout_secs);
        match time::timeout(deadline, self.execute(invocation)).await {
            Ok(Ok((status, output))) if status.success() => ToolOutcome::success(output),
            Ok(Ok((status, output))) => {
                ToolOutcome::failure(format!("{tool} exited with {status}\n{output}"))
            }
            Ok(Err(e)) => ToolOutcome::failure(format!("{tool} failed: {e}")),
            // Dropping the execute future drops the child, which kills it.
            Err(_) => ToolOutcome::failure(format!(
                "{tool} timed out after {}s",
                invocation.timeout_secs
            )),
        }
    }
}

/// Write all of `input` and close the pipe so the child sees EOF.
async fn feed_stdin(stdin: Option<ChildStdin>, input: Option<&str>) {
    let (Some(mut stdin), Some(input)) = (stdin, input) else {
        return;
    };
    if let Err(e) = stdin.write_all(input.as_bytes()).await {
        // Child may exit without draining stdin.
        debug!("stdin write stopped early: {e}");
    }
    if !input.ends_with('\n') && !input.is_empty() {
        let _ = stdin.write_all(b"\n").await;
    }
    let _ = stdin.shutdown().await;
}

async fn pump_lines<R>(reader: Option<R>, tx: mpsc::UnboundedSender<String>)
where
    R: AsyncRead + Unpin,
{
    let Some(reader) = reader else {
        return;
    };
    let mut reader = BufReader::new(reader);
    let mut buf = Vec::new();
    loop {
        buf.clear();
        match reader.read_until(b'\n', &mut buf).await {
            Ok(0) => break,
            Ok(_) => {
                let line = String::from_utf8_lossy(&buf);
                let line = line.trim_end_matches(['\n', '\r']).to_string();
                if tx.send(line).is_err() {
                    break;
                }
            }
            Err(e) => {
                debug!("output read failed: {e}");
                break;
            }
        }
    }
}

/// Locate `program` the way a shell would: explicit paths are checked on disk,
/// bare names are searched in `PATH`.
pub fn resolve_executable(program: &str) -> Option<PathBuf> {
    let candidate = Path::new(program);
    if candidate.components().count() > 1 || program.contains(std::path::MAIN_SEPARATOR) {
        return is_executable(candidate).then(|| candidate.to_path_buf());
    }
    let paths = env::var_os("PATH")?;
    env::split_paths(&paths)
        .map(|dir| dir.join(program))
        .find(|p| is_executable(p))
}

#[cfg(unix)]
fn is_executable(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;
    path.metadata()
        .map(|m| m.is_file() && m.permissions().mode() & 0o111 != 0)
        .unwrap_or(false)
}

#[cfg(not(unix))]
fn is_executable(path: &Path) -> bool {
    path.is_file() || path.with_extension("exe").is_file()
}
