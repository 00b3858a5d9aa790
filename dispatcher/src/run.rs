use crate::{
    chunk::{self, Chunk},
    config::{ConfigErrors, RunConfig},
    executors::{Executors, SubmissionResult},
    process::ProcessRunner,
    workspace::{self, MaterializeError, ENTRY_SCRIPT},
};
use itertools::Itertools;
use rayon::{prelude::*, ThreadPoolBuilder};
use std::{fs, path::Path};
use thiserror::Error;
use tracing::{debug, error, info, warn};

#[derive(Error, Debug)]
pub enum RunError {
    #[error(transparent)]
    Config(#[from] ConfigErrors),
    #[error(transparent)]
    Materialize(#[from] MaterializeError),
    #[error("Failed to build worker pool: {0}")]
    Pool(#[from] rayon::ThreadPoolBuildError),
}

/// Owns the chunk sequence and result list for exactly one invocation:
/// partition, then materialize and dispatch every chunk in index order.
pub struct RunController<R> {
    config: RunConfig,
    executors: Executors<R>,
}

impl<R: ProcessRunner + Sync> RunController<R> {
    pub fn new(config: RunConfig, runner: R) -> Result<Self, ConfigErrors> {
        let executors = Executors::load(&config, runner)?;

        Ok(Self { config, executors })
    }

    #[cfg(test)]
    pub(crate) fn executors(&self) -> &Executors<R> {
        &self.executors
    }

    pub fn run(&self) -> Result<Vec<SubmissionResult>, RunError> {
        self.config.ensure_output_root()?;

        let items = self.config.load_input_list()?;
        info!("Found {} files to process", items.len());

        let chunks = chunk::partition(&items, self.config.files_per_job, self.config.debug)?;
        if chunks.is_empty() {
            info!("Input list is empty, nothing to do");
            return Ok(Vec::new());
        }

        if self.config.debug {
            info!("Debug mode: running all files in one chunk");
        } else {
            info!(
                "Splitting files into {} chunks with up to {} files each",
                chunks.len(),
                self.config.files_per_job
            );
        }

        log_entry_script(&self.config.template);

        let total = chunks.len();
        let workers = self.config.worker_threads();

        // chunks own disjoint workspaces and independent submissions, so they
        // can run on a bounded pool; collecting par_iter results keeps the
        // chunk-index order regardless of completion order
        let results = if workers > 1 {
            debug!("Starting worker pool with {workers} threads");
            let pool = ThreadPoolBuilder::new().num_threads(workers).build()?;

            pool.install(|| {
                chunks
                    .par_iter()
                    .map(|chunk| self.process(chunk, total))
                    .collect::<Result<Vec<_>, RunError>>()
            })?
        } else {
            chunks
                .iter()
                .map(|chunk| self.process(chunk, total))
                .collect::<Result<Vec<_>, _>>()?
        };

        self.summarize(&results);
        self.write_report(&results);

        Ok(results)
    }

    // One chunk's lifecycle: materialize, then a single dispatch attempt. A
    // materialization failure aborts the whole run (previously completed
    // workspaces and already-accepted jobs are left untouched); a rejected
    // submission is recorded and the remaining chunks proceed.
    fn process(&self, chunk: &Chunk, total: usize) -> Result<SubmissionResult, RunError> {
        info!("Submitting chunk {}/{}", chunk.index + 1, total);
        for item in &chunk.items {
            debug!("{item}");
        }

        let workspace = workspace::materialize(chunk, &self.config.template, &self.config.output)?;
        let result = self.executors.dispatch(&workspace);

        if !result.accepted {
            warn!(
                chunk = chunk.index,
                "Submission rejected, continuing with the remaining chunks"
            );
        }

        Ok(result)
    }

    fn summarize(&self, results: &[SubmissionResult]) {
        let rejected = results
            .iter()
            .filter(|result| !result.accepted)
            .map(|result| result.chunk_index)
            .collect_vec();

        if rejected.is_empty() {
            info!("All {} submissions accepted", results.len());
        } else {
            warn!(
                "{} of {} submissions rejected: chunks {:?}",
                rejected.len(),
                results.len(),
                rejected
            );
        }
    }

    fn write_report(&self, results: &[SubmissionResult]) {
        let Some(report) = &self.config.report else {
            return;
        };

        // the report is advisory, a write failure doesn't fail the run
        match serde_yaml::to_string(results) {
            Ok(rendered) => {
                if let Err(e) = fs::write(report, rendered) {
                    error!("Failed to write report {}: {e}", report.display());
                }
            }
            Err(e) => error!("Failed to render report: {e}"),
        }
    }
}

fn log_entry_script(template: &Path) {
    match fs::read_to_string(template.join(ENTRY_SCRIPT)) {
        Ok(script) => info!("Using {ENTRY_SCRIPT}:\n{script}"),
        Err(e) => warn!("Failed to read {ENTRY_SCRIPT}: {e}"),
    }
}
