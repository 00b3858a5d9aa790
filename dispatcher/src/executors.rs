mod local;
mod scheduler;

use crate::{
    config::{ConfigErrors, RunConfig},
    process::ProcessRunner,
    workspace::Workspace,
};
use serde::Serialize;
use std::{path::PathBuf, time::Duration};

/// Which execution target handled a dispatch call.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BackendKind {
    Local,
    Scheduler,
}

/// Outcome of one dispatch attempt. `accepted` reflects the exit status of
/// the invocation itself, never the eventual job outcome.
#[derive(Clone, Debug, Serialize)]
pub struct SubmissionResult {
    pub chunk_index: usize,
    pub backend: BackendKind,
    pub log_path: PathBuf,
    pub accepted: bool,
}

/// All possible executor variants, selected once per run.
/// (this is deliberately not made with dynamic dispatch to avoid the headache)
#[derive(Debug)]
pub enum Executors<R> {
    Local(local::LocalExecutor<R>),
    Scheduler(scheduler::SchedulerExecutor<R>),
}

impl<R: ProcessRunner> Executors<R> {
    pub fn load(config: &RunConfig, runner: R) -> Result<Self, ConfigErrors> {
        if config.debug {
            Ok(Self::Local(local::LocalExecutor::new(
                runner,
                Duration::from_secs(config.local_timeout_secs),
            )))
        } else if config.scheduler.is_empty() {
            Err(ConfigErrors::EmptyScheduler)
        } else {
            Ok(Self::Scheduler(scheduler::SchedulerExecutor::new(
                config.scheduler.clone(),
                runner,
                Duration::from_secs(config.submit_timeout_secs),
            )))
        }
    }

    pub fn backend(&self) -> BackendKind {
        match self {
            Self::Local(_) => BackendKind::Local,
            Self::Scheduler(_) => BackendKind::Scheduler,
        }
    }

    /// One dispatch attempt for one materialized workspace; rejections are
    /// recorded, never retried here.
    pub fn dispatch(&self, workspace: &Workspace) -> SubmissionResult {
        match self {
            Self::Local(executor) => executor.dispatch(workspace),
            Self::Scheduler(executor) => executor.dispatch(workspace),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::process::fake::FakeRunner;
    use crate::workspace::ENTRY_SCRIPT;
    use std::path::Path;
    use tempfile::tempdir;

    fn workspace_at(path: &Path, chunk_index: usize) -> Workspace {
        Workspace {
            chunk_index,
            path: path.to_owned(),
        }
    }

    fn debug_config() -> RunConfig {
        let mut config = RunConfig::new("/out".into(), "/conf".into());
        config.debug = true;
        config
    }

    #[test]
    fn debug_mode_selects_the_local_backend() {
        let executors = Executors::load(&debug_config(), FakeRunner::succeeding()).unwrap();

        assert_eq!(executors.backend(), BackendKind::Local);
    }

    #[test]
    fn scheduler_mode_selects_the_scheduler_backend() {
        let config = RunConfig::new("/out".into(), "/conf".into());
        let executors = Executors::load(&config, FakeRunner::succeeding()).unwrap();

        assert_eq!(executors.backend(), BackendKind::Scheduler);
    }

    #[test]
    fn empty_scheduler_fails_to_load() {
        let mut config = RunConfig::new("/out".into(), "/conf".into());
        config.scheduler = String::new();

        assert!(matches!(
            Executors::load(&config, FakeRunner::succeeding()),
            Err(ConfigErrors::EmptyScheduler)
        ));
    }

    #[test]
    fn local_runs_the_entry_script_through_bash_in_the_workspace() {
        let dir = tempdir().unwrap();
        let runner = FakeRunner::succeeding();
        let executors = Executors::load(&debug_config(), runner).unwrap();

        let result = executors.dispatch(&workspace_at(dir.path(), 2));

        assert!(result.accepted);
        assert_eq!(result.chunk_index, 2);
        assert_eq!(result.backend, BackendKind::Local);
        let Executors::Local(executor) = &executors else {
            unreachable!()
        };
        let calls = executor.runner().invocations();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].program, "bash");
        assert_eq!(calls[0].args, vec![ENTRY_SCRIPT.to_string()]);
        assert_eq!(calls[0].cwd, dir.path());
    }

    #[test]
    fn scheduler_invokes_the_configured_command_in_the_workspace() {
        let dir = tempdir().unwrap();
        let mut config = RunConfig::new("/out".into(), "/conf".into());
        config.scheduler = "sbatch".to_string();
        let executors = Executors::load(&config, FakeRunner::succeeding()).unwrap();

        let result = executors.dispatch(&workspace_at(dir.path(), 0));

        assert!(result.accepted);
        assert_eq!(result.backend, BackendKind::Scheduler);
        let Executors::Scheduler(executor) = &executors else {
            unreachable!()
        };
        let calls = executor.runner().invocations();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].program, "sbatch");
        assert_eq!(calls[0].args, vec![ENTRY_SCRIPT.to_string()]);
        assert_eq!(calls[0].cwd, dir.path());
    }

    #[test]
    fn nonzero_exit_status_is_recorded_as_rejected() {
        let dir = tempdir().unwrap();
        let config = RunConfig::new("/out".into(), "/conf".into());
        let executors = Executors::load(&config, FakeRunner::with_status(Some(1))).unwrap();

        assert!(!executors.dispatch(&workspace_at(dir.path(), 0)).accepted);
    }

    #[test]
    fn timed_out_invocation_is_recorded_as_rejected() {
        let dir = tempdir().unwrap();
        let config = RunConfig::new("/out".into(), "/conf".into());
        let executors = Executors::load(&config, FakeRunner::timing_out()).unwrap();

        assert!(!executors.dispatch(&workspace_at(dir.path(), 0)).accepted);
    }

    #[test]
    fn spawn_failure_is_recorded_as_rejected() {
        let dir = tempdir().unwrap();
        let config = RunConfig::new("/out".into(), "/conf".into());
        let executors = Executors::load(&config, FakeRunner::failing_to_spawn()).unwrap();

        assert!(!executors.dispatch(&workspace_at(dir.path(), 0)).accepted);
    }

    #[test]
    fn local_dispatch_writes_the_run_log() {
        let dir = tempdir().unwrap();
        let mut runner = FakeRunner::succeeding();
        runner.stdout = "processed 4 files\n".to_string();
        let executors = Executors::load(&debug_config(), runner).unwrap();

        let result = executors.dispatch(&workspace_at(dir.path(), 0));

        assert_eq!(result.log_path, dir.path().join(local::RUN_LOG));
        assert_eq!(
            std::fs::read_to_string(&result.log_path).unwrap(),
            "processed 4 files\n"
        );
    }

    #[test]
    fn scheduler_log_path_points_into_the_workspace() {
        let dir = tempdir().unwrap();
        let config = RunConfig::new("/out".into(), "/conf".into());
        let executors = Executors::load(&config, FakeRunner::succeeding()).unwrap();

        let result = executors.dispatch(&workspace_at(dir.path(), 5));

        assert_eq!(result.log_path, dir.path().join(scheduler::SCHEDULER_LOG));
    }
}
