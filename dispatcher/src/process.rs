use std::{
    io::Read,
    path::Path,
    process::{Command, Stdio},
    time::{Duration, Instant},
};
use tracing::debug;
use wait_timeout::ChildExt;

/// Container for information extracted from running an external command.
#[derive(Debug, Clone)]
pub struct RunOutput {
    pub runtime: Duration,
    pub stdout: String,
    pub stderr: String,
    /// Exit code of the command, `None` when it was killed (timeout or signal)
    pub status: Option<i32>,
    pub timed_out: bool,
}

impl RunOutput {
    pub fn success(&self) -> bool {
        self.status == Some(0)
    }
}

/// The single seam through which the dispatcher talks to the operating
/// system: run a command with a working directory, capture its exit status.
pub trait ProcessRunner {
    fn run(
        &self,
        program: &str,
        args: &[&str],
        cwd: &Path,
        timeout: Duration,
    ) -> std::io::Result<RunOutput>;
}

/// OS-backed runner used outside of tests.
#[derive(Clone, Copy, Debug, Default)]
pub struct OsRunner;

impl ProcessRunner for OsRunner {
    fn run(
        &self,
        program: &str,
        args: &[&str],
        cwd: &Path,
        timeout: Duration,
    ) -> std::io::Result<RunOutput> {
        let start = Instant::now();
        let mut child = Command::new(program)
            .args(args)
            .current_dir(cwd)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()?;

        debug!("Waiting on {program} ({})", child.id());

        let (status, timed_out) = match child.wait_timeout(timeout)? {
            Some(status) => (status.code(), false),
            None => {
                // child hasn't exited yet
                child.kill()?;
                child.wait()?;
                (None, true)
            }
        };

        let mut stdout = String::new();
        if let Some(mut pipe) = child.stdout.take() {
            pipe.read_to_string(&mut stdout)?;
        }
        let mut stderr = String::new();
        if let Some(mut pipe) = child.stderr.take() {
            pipe.read_to_string(&mut stderr)?;
        }

        Ok(RunOutput {
            runtime: start.elapsed(),
            stdout,
            stderr,
            status,
            timed_out,
        })
    }
}
