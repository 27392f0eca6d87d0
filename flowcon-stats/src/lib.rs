//! The Stats Sampler: periodic `docker stats` polling accumulated into
//! a concurrently-readable history table.

pub mod error;
pub mod sampler;

pub use error::{Result, StatsError};
pub use sampler::StatsSampler;
