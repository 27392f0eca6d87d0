//! The container-runtime interface and its `docker`-CLI backed
//! implementation. Everything in this crate is a thin, blocking-shaped
//! wrapper around one subprocess call per method.

pub mod docker_cli;
pub mod error;
pub mod runtime;
pub mod stats;

#[cfg(any(test, feature = "test-util"))]
pub mod fake;

pub use docker_cli::DockerCliRuntime;
pub use error::{Result, RuntimeError};
pub use runtime::ContainerRuntime;
pub use stats::ResourceSample;

#[cfg(any(test, feature = "test-util"))]
pub use fake::FakeRuntime;
