use thiserror::Error;

#[derive(Debug, Error)]
pub enum StatsError {
    #[error("runtime error while sampling stats: {0}")]
    Runtime(#[from] flowcon_runtime::RuntimeError),

    #[error("failed writing stats csv: {0}")]
    Csv(#[from] csv::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, StatsError>;
