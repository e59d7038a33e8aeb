//! Hook-command renderer: run an external converter per job.
//!
//! Every run gets its own scratch directory under the scratch root, holding
//! `job.json`. The hook sees the job through `RELAY_*` environment variables
//! and runs with the scratch directory as its working directory.

use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio::process::Command;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::{RenderHandler, RenderJob};
use crate::error::{Error, Result};
use crate::workflow::RenderHook;

/// Exit status a hook uses to say "not now, try next cycle" (`EX_TEMPFAIL`).
pub const EXIT_DEFER: i32 = 75;

enum HookExit {
    Done,
    Deferred,
}

pub struct CommandRenderer {
    hook: RenderHook,
    scratch_root: PathBuf,
}

impl CommandRenderer {
    pub fn new(hook: RenderHook, scratch_root: PathBuf) -> Self {
        Self { hook, scratch_root }
    }

    async fn run_attempts(&self, job: &RenderJob, dir: &Path) -> Result<bool> {
        let timeout = Duration::from_secs(self.hook.timeout_secs);
        let attempts = self.hook.attempts.max(1);

        let mut last_error = None;
        for attempt in 1..=attempts {
            match run_hook(&self.hook.command, job, dir, timeout).await {
                Ok(HookExit::Done) => return Ok(true),
                Ok(HookExit::Deferred) => return Ok(false),
                Err(e) => {
                    warn!(
                        instance_id = %job.instance_id,
                        attempt,
                        attempts,
                        error = %e,
                        "render attempt failed"
                    );
                    last_error = Some(e);
                }
            }
        }

        if let Some(fallback) = &self.hook.fallback {
            info!(
                instance_id = %job.instance_id,
                fallback = %fallback.display(),
                "primary renderer exhausted, trying fallback"
            );
            return match run_hook(fallback, job, dir, timeout).await? {
                HookExit::Done => Ok(true),
                HookExit::Deferred => Ok(false),
            };
        }

        Err(last_error.unwrap_or_else(|| Error::Render("renderer never ran".to_string())))
    }
}

#[async_trait]
impl RenderHandler for CommandRenderer {
    async fn handle(&self, job: &RenderJob) -> Result<bool> {
        let start = Instant::now();
        let dir = self.scratch_root.join(Uuid::new_v4().to_string());
        tokio::fs::create_dir_all(&dir).await?;

        let job_json = serde_json::to_string_pretty(job)
            .map_err(|e| Error::Other(format!("serialize render job: {e}")))?;
        let result = match tokio::fs::write(dir.join("job.json"), job_json).await {
            Ok(()) => self.run_attempts(job, &dir).await,
            Err(e) => Err(e.into()),
        };

        if let Err(e) = tokio::fs::remove_dir_all(&dir).await {
            warn!(dir = %dir.display(), "scratch cleanup error: {e}");
        }

        debug!(
            instance_id = %job.instance_id,
            duration_ms = start.elapsed().as_millis() as u64,
            ok = result.is_ok(),
            "render finished"
        );
        result
    }
}

/// Run one hook command with a timeout.
async fn run_hook(
    command: &Path,
    job: &RenderJob,
    dir: &Path,
    timeout: Duration,
) -> Result<HookExit> {
    // Relative commands are resolved against the process cwd, not the
    // scratch dir the child runs in.
    let abs_command = if command.is_relative() {
        std::env::current_dir()?.join(command)
    } else {
        command.to_path_buf()
    };

    debug!(
        instance_id = %job.instance_id,
        command = %abs_command.display(),
        "running render hook"
    );

    let mut child = Command::new(&abs_command)
        .current_dir(dir)
        .env("RELAY_INSTANCE_ID", &job.instance_id)
        .env("RELAY_WORKFLOW_KIND", &job.workflow_kind)
        .env("RELAY_STATUS", &job.status)
        .env("RELAY_TITLE", &job.title)
        .env("RELAY_SCRATCH_DIR", dir)
        .env("RELAY_NO_PRINT", if job.no_print { "1" } else { "0" })
        .kill_on_drop(true)
        .spawn()
        .map_err(|e| Error::Render(format!("cannot start {}: {e}", abs_command.display())))?;

    let status = match tokio::time::timeout(timeout, child.wait()).await {
        Ok(status) => status?,
        Err(_) => {
            if let Err(e) = child.kill().await {
                warn!(command = %abs_command.display(), error = %e, "kill after timeout failed");
            }
            return Err(Error::Render(format!(
                "{} timed out after {}s",
                abs_command.display(),
                timeout.as_secs()
            )));
        }
    };

    match status.code() {
        Some(0) => Ok(HookExit::Done),
        Some(EXIT_DEFER) => Ok(HookExit::Deferred),
        code => Err(Error::Render(format!(
            "{} exited with status {}",
            abs_command.display(),
            code.unwrap_or(-1)
        ))),
    }
}
