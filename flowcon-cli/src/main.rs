mod joblist;

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use flowcon_core::{LogLevel, Logger, TrialConfig};
use flowcon_runtime::DockerCliRuntime;
use flowcon_trial::Trial;

#[derive(Parser)]
#[command(name = "flowcon")]
#[command(about = "Growth-efficiency CPU controller for containerized training jobs")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a trial: launch the jobs in a job-list CSV and drive the control
    /// algorithm until every container has finished.
    RunTrial {
        /// A CSV of jobs to run, with `seconds` and `images` columns.
        joblist: PathBuf,

        /// The interval at which to run algorithm 1, in seconds.
        #[arg(short, long, default_value_t = 30)]
        interval: u64,

        /// Rate at which to change resource allocation.
        #[arg(short, long, default_value_t = 0.03)]
        alpha: f64,

        /// Number of seconds between calls to `docker stats`.
        #[arg(long, default_value_t = 30)]
        docker_stats_interval: u64,

        /// Run the algorithm but do not update any container limits.
        #[arg(long, conflicts_with = "no_algo")]
        no_update: bool,

        /// Do not run the algorithm at all.
        #[arg(long)]
        no_algo: bool,
    },
    /// Generate a job-list CSV to use across experiments.
    MakeJoblist {
        /// Name for the job table; output is `<name>_jobtable.csv`.
        name: String,

        #[arg(short, long, default_value_t = 100)]
        seconds: u64,

        #[arg(short, long, default_value_t = 2)]
        models: usize,

        #[arg(short, long, default_value_t = 10)]
        containers: usize,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::RunTrial {
            joblist,
            interval,
            alpha,
            docker_stats_interval,
            no_update,
            no_algo,
        } => {
            let experiment_name = if no_algo {
                "no_algo".to_string()
            } else if no_update {
                "no_update".to_string()
            } else {
                format!("a{alpha}_i{interval}")
            };

            let config = TrialConfig {
                experiment_name,
                interval_secs: interval,
                alpha,
                docker_stats_interval_secs: docker_stats_interval,
                no_algo,
                no_update,
                log_level: LogLevel::Info,
                ..TrialConfig::default()
            };
            config.validate()?;

            Logger::new(config.log_level, config.log_file.clone())
                .init()
                .map_err(|err| anyhow::anyhow!(err))?;

            tracing::info!(
                name = %config.experiment_name,
                alpha = config.alpha,
                interval = config.interval_secs,
                "running trial"
            );

            let runtime = Arc::new(DockerCliRuntime::default());
            let trial = Trial::new(config, runtime.clone()).await?;

            joblist::launch_jobs(runtime, &joblist).await?;
            trial.wait_until_drained().await;
        }
        Commands::MakeJoblist {
            name,
            seconds,
            models,
            containers,
        } => {
            joblist::make_joblist(&name, seconds, models, containers)?;
        }
    }

    Ok(())
}
