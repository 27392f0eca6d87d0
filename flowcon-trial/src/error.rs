use thiserror::Error;

#[derive(Debug, Error)]
pub enum TrialError {
    #[error(
        "logs for an experiment named '{0}' already exist; use a unique experiment name"
    )]
    DuplicateExperiment(String),

    #[error("runtime error: {0}")]
    Runtime(#[from] flowcon_runtime::RuntimeError),

    #[error("stats error: {0}")]
    Stats(#[from] flowcon_stats::StatsError),

    #[error("algorithm error: {0}")]
    Algorithm(#[from] flowcon_algorithm::AlgorithmError),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("csv error: {0}")]
    Csv(#[from] csv::Error),

    #[error("zip error: {0}")]
    Zip(#[from] zip::result::ZipError),
}

pub type Result<T> = std::result::Result<T, TrialError>;
