mod chunk;
mod config;
mod executors;
mod process;
mod run;
mod workspace;

use clap::Parser;
use config::RunConfig;
use process::OsRunner;
use run::RunController;
use std::{path::PathBuf, process::exit};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

/// Fan a large input list out to a batch scheduler, one isolated workspace
/// per chunk.
#[derive(Parser, Debug)]
#[command(version, about)]
struct Cli {
    /// YAML run config supplying defaults for the flags below
    #[arg(long)]
    config: Option<PathBuf>,

    /// The output directory; one workspace per chunk is created below it
    #[arg(long, short = 'o')]
    output: Option<PathBuf>,

    /// Folder containing the configuration files copied into every workspace
    /// (must include runcommand.sh)
    #[arg(long, short = 't', alias = "configuration")]
    template: Option<PathBuf>,

    /// txt file with the input files; defaults to inputfiles.txt in the
    /// template directory
    #[arg(long, short = 'i')]
    input_list: Option<PathBuf>,

    /// The number of files to process per job
    #[arg(long, short = 'n')]
    files_per_job: Option<usize>,

    /// Debug mode: no job is submitted, the command runs locally in a shell
    #[arg(long)]
    debug: bool,

    /// The scheduler to use
    #[arg(long)]
    scheduler: Option<String>,

    /// Chunks processed concurrently; 0 uses all cores
    #[arg(long, short = 'j')]
    jobs: Option<usize>,

    /// Timeout for a local (debug) run, in seconds
    #[arg(long)]
    local_timeout: Option<u64>,

    /// Timeout for one scheduler submission call, in seconds
    #[arg(long)]
    submit_timeout: Option<u64>,

    /// Write a YAML report of all submission results to this path
    #[arg(long)]
    report: Option<PathBuf>,
}

fn assemble_config(cli: Cli) -> Option<RunConfig> {
    let mut config = match &cli.config {
        Some(path) => match RunConfig::load(path) {
            Ok(config) => config,
            Err(e) => {
                error!("{e}");
                return None;
            }
        },
        None => {
            let (Some(output), Some(template)) = (cli.output.clone(), cli.template.clone())
            else {
                error!("--output and --template are required unless --config is given");
                return None;
            };

            RunConfig::new(output, template)
        }
    };

    if let Some(output) = cli.output {
        config.output = output;
    }
    if let Some(template) = cli.template {
        config.template = template;
    }
    if let Some(input_list) = cli.input_list {
        config.input_list = Some(input_list);
    }
    if let Some(files_per_job) = cli.files_per_job {
        config.files_per_job = files_per_job;
    }
    if cli.debug {
        config.debug = true;
    }
    if let Some(scheduler) = cli.scheduler {
        config.scheduler = scheduler;
    }
    if let Some(jobs) = cli.jobs {
        config.jobs = jobs;
    }
    if let Some(timeout) = cli.local_timeout {
        config.local_timeout_secs = timeout;
    }
    if let Some(timeout) = cli.submit_timeout {
        config.submit_timeout_secs = timeout;
    }
    if let Some(report) = cli.report {
        config.report = Some(report);
    }

    Some(config)
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let Some(config) = assemble_config(cli) else {
        exit(1);
    };

    info!("Using input files {}", config.input_list_path().display());

    if config.preflight_checks() {
        exit(1);
    }

    let controller = match RunController::new(config, OsRunner) {
        Ok(controller) => controller,
        Err(e) => {
            error!("{e}");
            exit(1);
        }
    };

    // rejected submissions are reported in the summary but, like the batch
    // jobs themselves, don't fail the dispatching process
    if let Err(e) = controller.run() {
        error!("{e}");
        exit(1);
    }
}
