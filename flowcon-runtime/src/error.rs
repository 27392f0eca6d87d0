use thiserror::Error;

#[derive(Error, Debug)]
pub enum RuntimeError {
    #[error("container runtime command `{command}` failed (exit {code:?}): {stderr}")]
    CommandFailed {
        command: String,
        code: Option<i32>,
        stderr: String,
    },

    #[error("failed to parse container runtime output: {0}")]
    Parse(String),

    #[error("IO error launching container runtime command: {0}")]
    Io(#[from] std::io::Error),

    #[error("container not found: {0}")]
    NotFound(String),
}

pub type Result<T> = std::result::Result<T, RuntimeError>;
