use crate::workspace::ENTRY_SCRIPT;
use serde::{Deserialize, Serialize};
use std::{
    fs,
    os::unix::fs::MetadataExt,
    path::{Path, PathBuf},
};
use thiserror::Error;
use tracing::{error, info, warn};

/// Scheduler binary used when none is configured.
pub const DEFAULT_SCHEDULER: &str = "sbatch";

/// Input list looked up inside the template directory when no explicit list
/// file is given.
pub const DEFAULT_INPUT_LIST: &str = "inputfiles.txt";

// check if a file is executable
pub fn check_executable(path: &Path) -> std::io::Result<bool> {
    let metadata = fs::metadata(path)?;
    Ok((metadata.mode() & 0o111) != 0)
}

#[derive(Error, Debug)]
pub enum ConfigErrors {
    #[error("Files per job must be at least 1, got {0}")]
    InvalidChunkSize(usize),
    #[error("Scheduler command is empty")]
    EmptyScheduler,
    #[error("Configuration template directory not found: {0}")]
    TemplateMissing(PathBuf),
    #[error("Entry script not found in template: {0}")]
    EntryScriptMissing(PathBuf),
    #[error("Failed to read input list {path}: {source}")]
    InputListUnreadable {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Failed to prepare output directory {path}: {source}")]
    OutputUnavailable {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Failed to read run config {path}: {source}")]
    ConfigFileUnreadable {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Malformed run config")]
    MalformedConfig(#[from] serde_yaml::Error),
    #[error("Run configuration failed preflight checks")]
    FailedPreflight,
}

/// Everything one invocation needs: where the inputs come from, where
/// workspaces go, how large chunks are and which backend runs them.
///
/// Can be loaded from a YAML file; command line flags override single fields.
#[derive(Deserialize, Serialize, Clone, Debug)]
#[serde(deny_unknown_fields)]
pub struct RunConfig {
    /// Output root; one workspace directory per chunk is created below it
    pub output: PathBuf,
    /// Configuration template directory, copied into every workspace
    pub template: PathBuf,
    /// Input list file; defaults to `inputfiles.txt` inside the template
    #[serde(default)]
    pub input_list: Option<PathBuf>,
    #[serde(default = "default_files_per_job", alias = "chunk_size")]
    pub files_per_job: usize,
    /// Debug mode: one chunk, local execution, no scheduler involved
    #[serde(default)]
    pub debug: bool,
    #[serde(default = "default_scheduler")]
    pub scheduler: String,
    /// Worker threads for chunk processing; 1 is strictly sequential, 0 uses
    /// all cores
    #[serde(default = "default_jobs")]
    pub jobs: usize,
    /// Upper bound on a local (debug) execution, in seconds
    #[serde(default = "default_local_timeout")]
    pub local_timeout_secs: u64,
    /// Upper bound on one scheduler submission call, in seconds; acceptance
    /// is expected to be quick regardless of cluster load
    #[serde(default = "default_submit_timeout")]
    pub submit_timeout_secs: u64,
    /// Optional YAML report of all submission results
    #[serde(default)]
    pub report: Option<PathBuf>,
}

impl RunConfig {
    pub fn new(output: PathBuf, template: PathBuf) -> Self {
        Self {
            output,
            template,
            input_list: None,
            files_per_job: default_files_per_job(),
            debug: false,
            scheduler: default_scheduler(),
            jobs: default_jobs(),
            local_timeout_secs: default_local_timeout(),
            submit_timeout_secs: default_submit_timeout(),
            report: None,
        }
    }

    pub fn load(path: &Path) -> Result<Self, ConfigErrors> {
        let raw = fs::read_to_string(path).map_err(|source| ConfigErrors::ConfigFileUnreadable {
            path: path.to_owned(),
            source,
        })?;

        Ok(serde_yaml::from_str(&raw)?)
    }

    pub fn input_list_path(&self) -> PathBuf {
        self.input_list
            .clone()
            .unwrap_or_else(|| self.template.join(DEFAULT_INPUT_LIST))
    }

    /// Read the ordered input list, one path per line; surrounding whitespace
    /// is trimmed and blank lines are dropped.
    pub fn load_input_list(&self) -> Result<Vec<String>, ConfigErrors> {
        let path = self.input_list_path();
        let raw =
            fs::read_to_string(&path).map_err(|source| ConfigErrors::InputListUnreadable {
                path: path.clone(),
                source,
            })?;

        Ok(raw
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .map(str::to_string)
            .collect())
    }

    /// Create the output root when absent.
    pub fn ensure_output_root(&self) -> Result<(), ConfigErrors> {
        if !self.output.exists() {
            info!("Creating output directory {}", self.output.display());
            fs::create_dir_all(&self.output).map_err(|source| ConfigErrors::OutputUnavailable {
                path: self.output.clone(),
                source,
            })?;
        }

        Ok(())
    }

    /// Number of chunks processed at the same time.
    pub fn worker_threads(&self) -> usize {
        if self.jobs == 0 {
            num_cpus::get()
        } else {
            self.jobs
        }
    }

    /// Validate everything visible before the first chunk is touched.
    ///
    /// Returns whether an error was found; attempts to catch all errors
    /// instead of piece-by-piece to make debugging easier for users.
    pub fn preflight_checks(&self) -> bool {
        let mut contains_error = false;

        if !self.debug && self.files_per_job == 0 {
            error!("files_per_job must be at least 1");
            contains_error = true;
        }

        if !self.debug && self.scheduler.is_empty() {
            error!("Scheduler command is empty, unable to submit jobs");
            contains_error = true;
        }

        if !self.template.is_dir() {
            error!(
                "Configuration template directory not found at {}",
                self.template.display()
            );
            contains_error = true;
        } else {
            let entry_script = self.template.join(ENTRY_SCRIPT);

            if !entry_script.is_file() {
                error!(
                    "Template is missing its entry script {}",
                    entry_script.display()
                );
                contains_error = true;
            } else {
                match check_executable(&entry_script) {
                    // not fatal, local mode runs the script through bash
                    Ok(false) => warn!(
                        "Entry script {} is not executable",
                        entry_script.display()
                    ),
                    Ok(true) => {}
                    Err(e) => {
                        error!(
                            "Failed to inspect entry script {}: {e}",
                            entry_script.display()
                        );
                        contains_error = true;
                    }
                }
            }

            let input_list = self.input_list_path();
            if !input_list.is_file() {
                error!("Input list not found at {}", input_list.display());
                contains_error = true;
            }
        }

        contains_error
    }
}

fn default_files_per_job() -> usize {
    1
}

fn default_scheduler() -> String {
    DEFAULT_SCHEDULER.to_string()
}

fn default_jobs() -> usize {
    1
}

fn default_local_timeout() -> u64 {
    86_400
}

fn default_submit_timeout() -> u64 {
    60
}
