pub mod config;
pub mod display;
pub mod ensemble;
pub mod error;
pub mod pipeline;
pub mod sampler;
pub mod scorers;
pub mod slips;

pub use error::{PipelineError, ScorerError, SlipError};
pub use pipeline::Pipeline;
