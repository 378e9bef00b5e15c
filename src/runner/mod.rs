pub mod relay;

use std::io;
use std::path::PathBuf;
use std::process::{ExitStatus, Stdio};
use std::sync::Arc;

use futures::future::join_all;
use tokio::process::Command;
use tracing::{debug, info, warn};

use crate::command::ParsedCommand;
use crate::config::{ArgMode, CommandConfig, OutputConfig};
use crate::platform::{post_best_effort, ChatBackend};
use relay::{spawn_relay, RelayEnd, RelayTarget};

/// Posted to the thread when a run starts.
pub const START_DELIMITER: &str = "---";

/// Why a run failed
#[derive(Debug, thiserror::Error)]
pub enum RunError {
    #[error("could not capture {0} of the process")]
    MissingStream(&'static str),
    #[error("failed to start {path}: {source}")]
    Spawn {
        path: String,
        #[source]
        source: io::Error,
    },
    #[error("failed waiting for process: {0}")]
    Wait(#[source] io::Error),
    #[error("{0}")]
    Exit(ExitStatus),
}

/// Terminal result of one execution
#[derive(Debug)]
pub enum RunOutcome {
    Success,
    Failure(RunError),
}

impl RunOutcome {
    #[cfg(test)]
    pub fn is_success(&self) -> bool {
        matches!(self, RunOutcome::Success)
    }

    /// The terminal status message for a run of `command`.
    pub fn notice(&self, command: &str) -> String {
        match self {
            RunOutcome::Success => format!("---\n:white_check_mark: cmd {} executed", command),
            RunOutcome::Failure(e) => format!("---\n:red_circle: cmd {} ERROR: {}", command, e),
        }
    }
}

/// Starts the configured executable for a command and streams its output to the channel
pub struct ProcessRunner {
    executable: PathBuf,
    working_dir: Option<PathBuf>,
    arg_mode: ArgMode,
    output: OutputConfig,
    backend: Arc<dyn ChatBackend>,
}

impl ProcessRunner {
    pub fn new(
        command: &CommandConfig,
        output: &OutputConfig,
        backend: Arc<dyn ChatBackend>,
    ) -> Self {
        Self {
            executable: command.executable.clone(),
            working_dir: command.working_dir.clone(),
            arg_mode: command.args,
            output: output.clone(),
            backend,
        }
    }

    /// Run `command` to completion. Output lines go to `channel_id`; the start
    /// delimiter is threaded under `thread_id`.
    ///
    /// Returns only after the process has exited and both of its output streams
    /// have been drained, so every output line is posted before the caller
    /// reports the outcome.
    pub async fn execute(
        &self,
        command: &ParsedCommand,
        channel_id: &str,
        thread_id: &str,
    ) -> RunOutcome {
        post_best_effort(self.backend.as_ref(), channel_id, START_DELIMITER, Some(thread_id)).await;

        match self.run(command, channel_id).await {
            Ok(()) => {
                info!("CMD:SUCCESS {}", command.name);
                RunOutcome::Success
            }
            Err(e) => {
                warn!("CMD:ERROR {}: {}", command.name, e);
                RunOutcome::Failure(e)
            }
        }
    }

    async fn run(&self, command: &ParsedCommand, channel_id: &str) -> Result<(), RunError> {
        let argv = command.argv(self.arg_mode);
        debug!("Starting {} {:?}", self.executable.display(), argv);

        let mut cmd = Command::new(&self.executable);
        cmd.args(&argv)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        if let Some(dir) = &self.working_dir {
            cmd.current_dir(dir);
        }

        let mut child = cmd.spawn().map_err(|source| RunError::Spawn {
            path: self.executable.display().to_string(),
            source,
        })?;

        let (stdout, stderr) = match (child.stdout.take(), child.stderr.take()) {
            (Some(stdout), Some(stderr)) => (stdout, stderr),
            (None, _) => {
                child.start_kill().ok();
                return Err(RunError::MissingStream("stdout"));
            }
            (_, None) => {
                child.start_kill().ok();
                return Err(RunError::MissingStream("stderr"));
            }
        };

        let relays = vec![
            spawn_relay(
                stdout,
                self.backend.clone(),
                RelayTarget {
                    channel_id: channel_id.to_string(),
                    prefix: self.output.stdout_prefix.clone(),
                    emphasis: self.output.stdout_emphasis.clone(),
                },
            ),
            spawn_relay(
                stderr,
                self.backend.clone(),
                RelayTarget {
                    channel_id: channel_id.to_string(),
                    prefix: self.output.stderr_prefix.clone(),
                    emphasis: self.output.stderr_emphasis.clone(),
                },
            ),
        ];

        let status = child.wait().await;

        for end in join_all(relays).await {
            match end {
                Ok(RelayEnd::Eof) => {}
                Ok(RelayEnd::Aborted(e)) => debug!("Output relay for {} stopped: {}", command.name, e),
                Err(e) => warn!("Output relay for {} panicked: {}", command.name, e),
            }
        }

        let status = status.map_err(RunError::Wait)?;
        if !status.success() {
            return Err(RunError::Exit(status));
        }
        Ok(())
    }
}
