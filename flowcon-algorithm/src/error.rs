use thiserror::Error;

#[derive(Debug, Error)]
pub enum AlgorithmError {
    #[error("runtime error: {0}")]
    Runtime(#[from] flowcon_runtime::RuntimeError),

    #[error("stats error: {0}")]
    Stats(#[from] flowcon_stats::StatsError),

    #[error("failed writing csv: {0}")]
    Csv(#[from] csv::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invariant violated: {0}")]
    InvalidState(String),
}

pub type Result<T> = std::result::Result<T, AlgorithmError>;
