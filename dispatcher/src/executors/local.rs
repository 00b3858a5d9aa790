use super::{BackendKind, SubmissionResult};
use crate::{
    process::{ProcessRunner, RunOutput},
    workspace::{Workspace, ENTRY_SCRIPT},
};
use std::{fs::File, io::Write, path::Path, time::Duration};
use tracing::{debug, error, warn};

/// Log artifact capturing the entry script's output in local runs.
pub const RUN_LOG: &str = "run.log";

/// Executor that runs the entry script synchronously in the current shell
/// environment; used only for debug runs.
#[derive(Debug)]
pub struct LocalExecutor<R> {
    runner: R,
    timeout: Duration,
}

impl<R: ProcessRunner> LocalExecutor<R> {
    pub fn new(runner: R, timeout: Duration) -> Self {
        Self { runner, timeout }
    }

    #[cfg(test)]
    pub(crate) fn runner(&self) -> &R {
        &self.runner
    }

    /// Blocks until the entry script exits or the timeout kills it.
    pub fn dispatch(&self, workspace: &Workspace) -> SubmissionResult {
        let log_path = workspace.path.join(RUN_LOG);

        let accepted = match self
            .runner
            .run("bash", &[ENTRY_SCRIPT], &workspace.path, self.timeout)
        {
            Ok(output) => {
                if let Err(e) = write_log(&log_path, &output) {
                    warn!(
                        chunk = workspace.chunk_index,
                        "Failed to write {RUN_LOG}: {e}"
                    );
                }

                if output.timed_out {
                    warn!(
                        chunk = workspace.chunk_index,
                        "Local run exceeded its timeout and was killed"
                    );
                }

                debug!(
                    chunk = workspace.chunk_index,
                    "Finished in {} ms | status: {:?}",
                    output.runtime.as_millis(),
                    output.status
                );

                output.success()
            }
            Err(e) => {
                error!(
                    chunk = workspace.chunk_index,
                    "Failed to run entry script: {e}"
                );

                false
            }
        };

        SubmissionResult {
            chunk_index: workspace.chunk_index,
            backend: BackendKind::Local,
            log_path,
            accepted,
        }
    }
}

fn write_log(path: &Path, output: &RunOutput) -> std::io::Result<()> {
    let mut log = File::create(path)?;
    log.write_all(output.stdout.as_bytes())?;
    log.write_all(output.stderr.as_bytes())
}
