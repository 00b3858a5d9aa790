use super::{BackendKind, SubmissionResult};
use crate::{
    process::ProcessRunner,
    workspace::{Workspace, ENTRY_SCRIPT},
};
use std::time::Duration;
use tracing::{error, info, warn};

/// Log artifact the submitted job writes into its workspace.
pub const SCHEDULER_LOG: &str = "slurm.log";

/// Executor that hands the entry script to a batch scheduler binary.
///
/// The submission call returns once the scheduler has accepted the job, not
/// once the job has finished; the eventual job outcome is never inspected.
#[derive(Debug)]
pub struct SchedulerExecutor<R> {
    command: String,
    runner: R,
    timeout: Duration,
}

impl<R: ProcessRunner> SchedulerExecutor<R> {
    pub fn new(command: String, runner: R, timeout: Duration) -> Self {
        Self {
            command,
            runner,
            timeout,
        }
    }

    #[cfg(test)]
    pub(crate) fn runner(&self) -> &R {
        &self.runner
    }

    pub fn dispatch(&self, workspace: &Workspace) -> SubmissionResult {
        let log_path = workspace.path.join(SCHEDULER_LOG);

        let accepted = match self.runner.run(
            &self.command,
            &[ENTRY_SCRIPT],
            &workspace.path,
            self.timeout,
        ) {
            Ok(output) => {
                if output.timed_out {
                    warn!(
                        chunk = workspace.chunk_index,
                        "Submission call exceeded its timeout and was killed"
                    );
                }

                if output.success() {
                    match parse_job_id(&output.stdout) {
                        Some(job_id) => {
                            info!(chunk = workspace.chunk_index, job_id, "Job accepted")
                        }
                        None => info!(chunk = workspace.chunk_index, "Job accepted"),
                    }
                }

                output.success()
            }
            Err(e) => {
                error!(
                    chunk = workspace.chunk_index,
                    "Failed to invoke {}: {e}", self.command
                );

                false
            }
        };

        SubmissionResult {
            chunk_index: workspace.chunk_index,
            backend: BackendKind::Scheduler,
            log_path,
            accepted,
        }
    }
}

// Expect a message from sbatch like: "Submitted batch job 11"
fn parse_job_id(line: &str) -> Option<i64> {
    let marker = "job ";
    let idx = line.find(marker)?;

    line[idx + marker.len()..].trim().parse().ok()
}
