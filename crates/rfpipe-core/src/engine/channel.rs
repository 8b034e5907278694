//! The execution channel into the worker.
//!
//! Every command runs as a non-interactive login shell inside the worker, with
//! combined stdout/stderr streamed back incrementally. Each chunk is appended to the
//! stage log on disk, retained in a bounded [`TailBuffer`], and emitted line by line
//! to the operational log.

use super::command::quote;
use super::config::{Launcher, PipelineConfig, WorkerConfig};
use super::error::PipelineError;
use super::job::JobLayout;
use super::tail::TailBuffer;
use std::future::Future;
use std::io;
use std::path::Path;
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;
use tokio::fs::{self, File, OpenOptions};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tokio::process::Command;
use tokio::sync::{Semaphore, SemaphorePermit, mpsc};
use tracing::{debug, info, warn};

const READ_CHUNK_BYTES: usize = 8 * 1024;
const MAX_PENDING_LINE_BYTES: usize = 64 * 1024;

/// Environment variable tagging every process of one command session. It is
/// inherited by the whole process tree, which lets the watchdog find and stop the
/// tree wherever it runs.
pub const SESSION_ENV: &str = "RFPIPE_SESSION";

fn session_token(job_id: &str, stage: &str) -> String {
    format!("{job_id}.{stage}.{:08x}", rand::random::<u32>())
}

/// Shell script that SIGKILLs every process whose environment carries `token`.
fn terminate_script(token: &str) -> String {
    let needle = quote(&format!("^{SESSION_ENV}={token}$"));
    format!(
        "for p in /proc/[0-9]*; do \
         if grep -qsz {needle} \"$p/environ\"; then kill -KILL \"${{p#/proc/}}\" 2>/dev/null; fi; \
         done; true"
    )
}

/// What a finished command left behind.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecOutcome {
    /// Exit status of the command; `-1` when it was killed or ended by a signal.
    pub exit_code: i32,
    /// Most recent output, decoded lossily.
    pub tail: String,
    /// The watchdog limit, set only when the watchdog stopped the command.
    pub timed_out: Option<Duration>,
}

/// Runs a shell command on behalf of a job stage.
///
/// Implementations write the full output to `job.log_file(stage)` and return the
/// exit status with a bounded tail. A missing or stopped worker is a fatal
/// [`PipelineError`], never an outcome.
pub trait CommandExecutor: Send + Sync {
    fn execute(
        &self,
        command: &str,
        job: &JobLayout,
        stage: &str,
    ) -> impl Future<Output = Result<ExecOutcome, PipelineError>> + Send;
}

struct OutputSink<'a> {
    log: File,
    tail: TailBuffer,
    pending: Vec<u8>,
    job: &'a str,
    stage: &'a str,
}

impl<'a> OutputSink<'a> {
    async fn open(path: &Path, tail_bytes: usize, job: &'a str, stage: &'a str) -> io::Result<Self> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }
        let log = OpenOptions::new().create(true).append(true).open(path).await?;
        Ok(Self {
            log,
            tail: TailBuffer::new(tail_bytes),
            pending: Vec::new(),
            job,
            stage,
        })
    }

    async fn push(&mut self, chunk: &[u8]) -> io::Result<()> {
        self.log.write_all(chunk).await?;
        self.log.flush().await?;
        self.tail.push(chunk);

        self.pending.extend_from_slice(chunk);
        while let Some(pos) = self.pending.iter().position(|&b| b == b'\n' || b == b'\r') {
            let line: Vec<u8> = self.pending.drain(..=pos).collect();
            self.emit(&line[..line.len() - 1]);
        }
        if self.pending.len() > MAX_PENDING_LINE_BYTES {
            let line = std::mem::take(&mut self.pending);
            self.emit(&line);
        }
        Ok(())
    }

    fn emit(&self, line: &[u8]) {
        if line.iter().all(u8::is_ascii_whitespace) {
            return;
        }
        info!(
            target: "rfpipe::worker",
            job = self.job,
            stage = self.stage,
            "{}",
            String::from_utf8_lossy(line)
        );
    }

    async fn finish(mut self) -> io::Result<String> {
        let rest = std::mem::take(&mut self.pending);
        self.emit(&rest);
        self.log.sync_data().await?;
        Ok(self.tail.to_text())
    }
}

async fn forward<R: AsyncRead + Unpin>(mut reader: R, tx: mpsc::Sender<Vec<u8>>) -> io::Result<()> {
    let mut buf = vec![0u8; READ_CHUNK_BYTES];
    loop {
        let n = reader.read(&mut buf).await?;
        if n == 0 {
            return Ok(());
        }
        if tx.send(buf[..n].to_vec()).await.is_err() {
            return Ok(());
        }
    }
}

/// Execution channel backed by a local shell or `docker exec`.
#[derive(Debug, Clone)]
pub struct ShellChannel {
    worker: WorkerConfig,
    tail_bytes: usize,
}

impl ShellChannel {
    pub fn new(worker: WorkerConfig, tail_bytes: usize) -> Self {
        Self { worker, tail_bytes }
    }

    pub fn from_config(config: &PipelineConfig) -> Self {
        Self::new(config.worker.clone(), config.tail_bytes)
    }

    fn program(&self) -> &str {
        match self.worker.launcher {
            Launcher::Docker => "docker",
            Launcher::Local => &self.worker.shell,
        }
    }

    fn process(&self, command: &str, session: &str) -> Command {
        let mut process = match self.worker.launcher {
            Launcher::Docker => {
                let mut process = Command::new("docker");
                process
                    .arg("exec")
                    .arg("-e")
                    .arg(format!("{SESSION_ENV}={session}"))
                    .arg("-w")
                    .arg(&self.worker.workdir)
                    .arg(&self.worker.name)
                    .arg(&self.worker.shell)
                    .arg("-lc")
                    .arg(command);
                process
            }
            Launcher::Local => {
                let mut process = Command::new(&self.worker.shell);
                process
                    .arg("-lc")
                    .arg(command)
                    .env(SESSION_ENV, session)
                    .current_dir(&self.worker.workdir);
                process
            }
        };
        process
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        process
    }

    /// Kills every process of a session, inside the worker for `Launcher::Docker`.
    /// Killing the local `docker exec` client alone leaves the command running in
    /// the container.
    async fn terminate_session(&self, session: &str) -> io::Result<()> {
        let script = terminate_script(session);
        let mut killer = match self.worker.launcher {
            Launcher::Docker => {
                let mut killer = Command::new("docker");
                killer
                    .arg("exec")
                    .arg(&self.worker.name)
                    .arg(&self.worker.shell)
                    .arg("-c")
                    .arg(&script);
                killer
            }
            Launcher::Local => {
                let mut killer = Command::new(&self.worker.shell);
                killer.arg("-c").arg(&script);
                killer
            }
        };
        let status = killer
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .await?;
        if !status.success() {
            return Err(io::Error::other(format!(
                "session cleanup exited with {status}"
            )));
        }
        Ok(())
    }

    /// Verifies that the worker container exists and is running.
    pub async fn ensure_worker(&self) -> Result<(), PipelineError> {
        if self.worker.launcher == Launcher::Local {
            return Ok(());
        }
        let unavailable = |reason: String| PipelineError::WorkerUnavailable {
            worker: self.worker.name.clone(),
            reason,
        };

        let output = Command::new("docker")
            .args(["inspect", "--format", "{{.State.Running}}"])
            .arg(&self.worker.name)
            .stdin(Stdio::null())
            .output()
            .await
            .map_err(|e| unavailable(format!("could not run docker: {e}")))?;

        if !output.status.success() {
            return Err(unavailable(
                String::from_utf8_lossy(&output.stderr).trim().to_string(),
            ));
        }
        if String::from_utf8_lossy(&output.stdout).trim() != "true" {
            return Err(unavailable("container is not running".to_string()));
        }
        Ok(())
    }

    async fn run(&self, command: &str, job: &JobLayout, stage: &str) -> Result<ExecOutcome, PipelineError> {
        self.ensure_worker().await?;

        let log_path = job.log_file(stage);
        let job_id = job.id().as_str();
        let mut sink = OutputSink::open(&log_path, self.tail_bytes, job_id, stage)
            .await
            .map_err(PipelineError::job_io(&log_path))?;

        let session = session_token(job_id, stage);
        info!(job = job_id, stage, "exec in {}: {}", self.worker.name, command);
        let mut child = self
            .process(command, &session)
            .spawn()
            .map_err(|source| PipelineError::Launch {
                program: self.program().to_string(),
                source,
            })?;

        let (tx, mut rx) = mpsc::channel::<Vec<u8>>(64);
        let readers = [
            child.stdout.take().map(|out| tokio::spawn(forward(out, tx.clone()))),
            child.stderr.take().map(|err| tokio::spawn(forward(err, tx.clone()))),
        ];
        drop(tx);

        let streamed = async {
            while let Some(chunk) = rx.recv().await {
                sink.push(&chunk).await?;
            }
            let status = child.wait().await?;
            Ok::<_, io::Error>(status)
        };
        let finished = match self.worker.stage_timeout {
            Some(limit) => tokio::time::timeout(limit, streamed).await.ok(),
            None => Some(streamed.await),
        };

        let (exit_code, timed_out) = match finished {
            Some(status) => {
                let status = status.map_err(PipelineError::job_io(&log_path))?;
                (status.code().unwrap_or(-1), None)
            }
            None => {
                warn!(job = job_id, stage, "command exceeded the stage timeout, killing it");
                if let Err(e) = self.terminate_session(&session).await {
                    warn!(job = job_id, stage, "failed to stop session {}: {}", session, e);
                }
                if let Err(e) = child.kill().await {
                    warn!(job = job_id, stage, "failed to kill timed-out command: {}", e);
                }
                // Background processes of the killed shell may still hold the pipes.
                for reader in readers.iter().flatten() {
                    reader.abort();
                }
                while let Ok(chunk) = rx.try_recv() {
                    sink.push(&chunk)
                        .await
                        .map_err(PipelineError::job_io(&log_path))?;
                }
                (-1, self.worker.stage_timeout)
            }
        };

        for reader in readers.into_iter().flatten() {
            match reader.await {
                Ok(Err(e)) if timed_out.is_none() => {
                    return Err(PipelineError::job_io(&log_path)(e));
                }
                Ok(_) => {}
                Err(e) => debug!(job = job_id, stage, "output reader task ended abnormally: {}", e),
            }
        }

        let tail = sink
            .finish()
            .await
            .map_err(PipelineError::job_io(&log_path))?;
        info!(job = job_id, stage, "exec exit code {}", exit_code);

        Ok(ExecOutcome {
            exit_code,
            tail,
            timed_out,
        })
    }
}

impl CommandExecutor for ShellChannel {
    fn execute(
        &self,
        command: &str,
        job: &JobLayout,
        stage: &str,
    ) -> impl Future<Output = Result<ExecOutcome, PipelineError>> + Send {
        self.run(command, job, stage)
    }
}

/// Single-slot guard around the shared worker.
///
/// One orchestration holds the permit from its first stage to its last, so jobs
/// sharing a worker never interleave commands inside it.
#[derive(Debug, Clone)]
pub struct WorkerLock {
    slot: Arc<Semaphore>,
}

impl WorkerLock {
    pub fn new() -> Self {
        Self {
            slot: Arc::new(Semaphore::new(1)),
        }
    }

    pub async fn acquire(&self) -> Result<SemaphorePermit<'_>, PipelineError> {
        self.slot
            .acquire()
            .await
            .map_err(|_| PipelineError::WorkerUnavailable {
                worker: "<lock>".to_string(),
                reason: "worker lock was closed".to_string(),
            })
    }

    pub fn is_busy(&self) -> bool {
        self.slot.available_permits() == 0
    }
}

impl Default for WorkerLock {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;
    use tempfile::{TempDir, tempdir};

    fn local_channel(workdir: &Path, tail_bytes: usize, timeout: Option<Duration>) -> ShellChannel {
        ShellChannel::new(
            WorkerConfig {
                name: "local".to_string(),
                workdir: workdir.to_path_buf(),
                shell: "bash".to_string(),
                launcher: Launcher::Local,
                stage_timeout: timeout,
            },
            tail_bytes,
        )
    }

    fn job() -> (TempDir, JobLayout) {
        let root = tempdir().unwrap();
        let layout = JobLayout::create(root.path(), "chan").unwrap();
        (root, layout)
    }

    #[tokio::test]
    async fn streams_both_outputs_to_log_and_tail() {
        let (_root, job) = job();
        let channel = local_channel(job.root(), 10_000, None);

        let outcome = channel
            .execute("echo to-stdout; echo to-stderr >&2; exit 3", &job, "stage_a")
            .await
            .unwrap();

        assert_eq!(outcome.exit_code, 3);
        assert_eq!(outcome.timed_out, None);
        assert!(outcome.tail.contains("to-stdout"));
        assert!(outcome.tail.contains("to-stderr"));

        let log = std::fs::read_to_string(job.log_file("stage_a")).unwrap();
        assert!(log.contains("to-stdout"));
        assert!(log.contains("to-stderr"));
    }

    #[tokio::test]
    async fn tail_is_bounded_while_log_keeps_everything() {
        let (_root, job) = job();
        let channel = local_channel(job.root(), 100, None);

        let outcome = channel
            .execute("head -c 50000 /dev/zero | tr '\\0' 'x'", &job, "bulk")
            .await
            .unwrap();

        assert_eq!(outcome.exit_code, 0);
        assert_eq!(outcome.tail.len(), 100);
        assert!(outcome.tail.chars().all(|c| c == 'x'));

        let log = std::fs::read(job.log_file("bulk")).unwrap();
        assert!(log.len() >= 50_000);
        assert!(log.ends_with(&[b'x'; 100]));
    }

    #[tokio::test]
    async fn log_file_is_appended_across_commands() {
        let (_root, job) = job();
        let channel = local_channel(job.root(), 10_000, None);

        channel.execute("echo first", &job, "same").await.unwrap();
        channel.execute("echo second", &job, "same").await.unwrap();

        let log = std::fs::read_to_string(job.log_file("same")).unwrap();
        let first = log.find("first").unwrap();
        let second = log.find("second").unwrap();
        assert!(first < second);
    }

    #[tokio::test]
    async fn runs_in_the_configured_workdir() {
        let (_root, job) = job();
        let channel = local_channel(&job.output_dir(), 10_000, None);

        let outcome = channel.execute("pwd", &job, "where").await.unwrap();
        let expected = std::fs::canonicalize(job.output_dir()).unwrap();
        assert!(outcome.tail.contains(expected.to_str().unwrap()));
    }

    #[tokio::test]
    async fn watchdog_stops_stalled_commands() {
        let (_root, job) = job();
        let channel = local_channel(job.root(), 10_000, Some(Duration::from_millis(300)));

        let outcome = channel
            .execute("echo started; sleep 30", &job, "stall")
            .await
            .unwrap();

        assert_eq!(outcome.timed_out, Some(Duration::from_millis(300)));
        assert_eq!(outcome.exit_code, -1);
    }

    #[tokio::test]
    async fn commands_run_tagged_with_their_session() {
        let (_root, job) = job();
        let channel = local_channel(job.root(), 10_000, None);

        let outcome = channel
            .execute("echo \"session=$RFPIPE_SESSION\"", &job, "tagged")
            .await
            .unwrap();

        let prefix = format!("session={}.tagged.", job.id());
        assert!(outcome.tail.contains(&prefix), "tail was {:?}", outcome.tail);
    }

    #[test]
    fn terminate_script_matches_the_whole_session_variable() {
        let script = terminate_script("abx_01.rf2.0000beef");
        assert!(script.contains("grep -qsz '^RFPIPE_SESSION=abx_01.rf2.0000beef$'"));
        assert!(script.contains("kill -KILL"));
    }

    fn is_gone(pid: &str) -> bool {
        match std::fs::read_to_string(format!("/proc/{pid}/stat")) {
            Err(_) => true,
            Ok(stat) => stat
                .rsplit(')')
                .next()
                .is_some_and(|rest| rest.trim_start().starts_with('Z')),
        }
    }

    #[tokio::test]
    async fn watchdog_stops_background_processes_of_the_session() {
        let (_root, job) = job();
        let pid_file = job.root().join("background.pid");
        let channel = local_channel(job.root(), 10_000, Some(Duration::from_millis(300)));

        let command = format!(
            "sleep 30 & echo $! > {}; wait",
            crate::engine::command::quote(&pid_file.to_string_lossy())
        );
        let outcome = channel.execute(&command, &job, "background").await.unwrap();
        assert!(outcome.timed_out.is_some());

        let pid = std::fs::read_to_string(&pid_file).unwrap().trim().to_string();
        let mut stopped = is_gone(&pid);
        for _ in 0..40 {
            if stopped {
                break;
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
            stopped = is_gone(&pid);
        }
        assert!(stopped, "background process {pid} outlived the watchdog");
    }

    #[tokio::test]
    async fn missing_docker_worker_is_a_fatal_error() {
        let (_root, job) = job();
        let channel = ShellChannel::new(
            WorkerConfig {
                name: "rfpipe-test-no-such-worker-5f0c".to_string(),
                workdir: PathBuf::from("/home"),
                shell: "/bin/bash".to_string(),
                launcher: Launcher::Docker,
                stage_timeout: None,
            },
            10_000,
        );

        let result = channel.execute("true", &job, "never").await;
        assert!(matches!(
            result,
            Err(PipelineError::WorkerUnavailable { ref worker, .. }) if worker == "rfpipe-test-no-such-worker-5f0c"
        ));
        assert!(!job.log_file("never").exists());
    }

    #[tokio::test]
    async fn worker_lock_admits_one_holder_at_a_time() {
        let lock = WorkerLock::new();
        let shared = lock.clone();

        let permit = lock.acquire().await.unwrap();
        assert!(shared.is_busy());

        let waiter = tokio::spawn(async move {
            let _permit = shared.acquire().await.unwrap();
        });
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!waiter.is_finished());

        drop(permit);
        waiter.await.unwrap();
        assert!(!lock.is_busy());
    }
}
