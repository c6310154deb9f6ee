//! Blocklist checker adapter.
//!
//! The registry only exposes a browser UI, so the actual lookup is done by an external
//! checker program (typically a headless-browser script). Contract with that program:
//! - stdin: the batch, one domain per line, then EOF
//! - stdout: one JSON object per line, `{"domain": "...", "status": "..."}`
//! - exit status 0 on success; anything else fails the whole batch

use std::{collections::VecDeque, path::PathBuf, process::Stdio, sync::Arc};

use async_trait::async_trait;
use serde::Deserialize;
use tokio::{
    io::{AsyncBufReadExt, AsyncWriteExt, BufReader},
    process::Command,
    sync::Mutex,
};
use tracing::debug;

use nawala_core::{
    config::Config,
    domain::{BlockStatus, DomainStatus},
    errors::Error,
    formatting::truncate_text,
    ports::BlocklistQuery,
    Result,
};

const STDERR_TAIL_MAX_BYTES: usize = 16 * 1024;
const STDERR_TAIL_MAX_LINES: usize = 200;

#[derive(Clone, Debug)]
pub struct CommandChecker {
    program: PathBuf,
    args: Vec<String>,
}

#[derive(Clone, Debug, Default)]
struct StderrTail {
    lines: VecDeque<String>,
    bytes: usize,
}

impl StderrTail {
    fn push_line(&mut self, line: String) {
        // +1 for the '\n' we join with later.
        self.bytes = self.bytes.saturating_add(line.len() + 1);
        self.lines.push_back(line);

        while self.lines.len() > STDERR_TAIL_MAX_LINES || self.bytes > STDERR_TAIL_MAX_BYTES {
            if let Some(front) = self.lines.pop_front() {
                self.bytes = self.bytes.saturating_sub(front.len() + 1);
            } else {
                break;
            }
        }
    }

    fn snapshot(&self) -> String {
        self.lines.iter().cloned().collect::<Vec<_>>().join("\n")
    }
}

#[derive(Debug, Deserialize)]
struct CheckerLine {
    domain: String,
    status: String,
}

impl CommandChecker {
    pub fn new(program: impl Into<PathBuf>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
        }
    }

    pub fn from_config(cfg: &Config) -> Self {
        Self::new(cfg.checker_program.clone(), cfg.checker_args.clone())
    }
}

#[async_trait]
impl BlocklistQuery for CommandChecker {
    async fn query_batch(&self, domains: &[String]) -> Result<Vec<DomainStatus>> {
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            // Dropping the query future (timeout) must not leave a browser running.
            .kill_on_drop(true);

        let mut child = cmd.spawn().map_err(|e| {
            Error::External(format!(
                "failed to start checker {}: {e}",
                self.program.display()
            ))
        })?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| Error::External("checker stdout was not captured".to_string()))?;
        let stderr_tail: Arc<Mutex<StderrTail>> = Arc::new(Mutex::new(StderrTail::default()));

        // Drain stderr in background to avoid blocking on a full pipe.
        if let Some(stderr) = child.stderr.take() {
            let tail = stderr_tail.clone();
            tokio::spawn(async move {
                let mut r = BufReader::new(stderr).lines();
                while let Ok(Some(line)) = r.next_line().await {
                    tail.lock().await.push_line(line);
                }
            });
        }

        if let Some(mut stdin) = child.stdin.take() {
            let mut input = domains.join("\n");
            input.push('\n');
            // A checker that exits early closes the pipe; its exit status tells the story.
            let written = match stdin.write_all(input.as_bytes()).await {
                Ok(()) => stdin.shutdown().await,
                Err(e) => Err(e),
            };
            if let Err(e) = written {
                if e.kind() != std::io::ErrorKind::BrokenPipe {
                    return Err(Error::Io(e));
                }
            }
        }

        let mut raw_lines = Vec::new();
        let mut reader = BufReader::new(stdout).lines();
        while let Some(line) = reader.next_line().await? {
            raw_lines.push(line);
        }

        let status = child.wait().await?;
        if !status.success() {
            let stderr = stderr_tail.lock().await.snapshot();
            if !stderr.trim().is_empty() {
                return Err(Error::External(format!(
                    "checker exited with status {status}\nstderr (tail):\n{stderr}"
                )));
            }
            return Err(Error::External(format!("checker exited with status {status}")));
        }

        let statuses = parse_checker_output(domains, &raw_lines)?;
        debug!(
            batch = domains.len(),
            blocked = statuses.iter().filter(|s| s.is_blocked()).count(),
            "checker finished"
        );
        Ok(statuses)
    }
}

/// Classify every batch domain from the checker's NDJSON lines.
///
/// Domains the checker did not mention are absent; lines for domains outside the
/// batch are ignored.
fn parse_checker_output(batch: &[String], lines: &[String]) -> Result<Vec<DomainStatus>> {
    let mut reported: Vec<CheckerLine> = Vec::new();
    for line in lines.iter().map(|l| l.trim()).filter(|l| !l.is_empty()) {
        let parsed: CheckerLine = serde_json::from_str(line).map_err(|e| {
            Error::External(format!(
                "checker output parse failed: {e}\nstdout line: {}",
                truncate_text(line, 500)
            ))
        })?;
        reported.push(parsed);
    }

    Ok(batch
        .iter()
        .map(|domain| {
            let status = reported
                .iter()
                .find(|r| r.domain.trim().eq_ignore_ascii_case(domain))
                .map(|r| classify_status(&r.status))
                .unwrap_or(BlockStatus::Absent);
            DomainStatus {
                domain: domain.clone(),
                status,
            }
        })
        .collect())
}

/// `Ada` is the registry's own wording for "listed".
fn classify_status(raw: &str) -> BlockStatus {
    match raw.trim().to_lowercase().as_str() {
        "ada" | "present" | "blocked" => BlockStatus::Present,
        _ => BlockStatus::Absent,
    }
}
