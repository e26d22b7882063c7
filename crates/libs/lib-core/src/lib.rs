//! Core domain logic for the price oracle: configuration, error handling,
//! the domain model and durable store, cache, oracle client, interpolation
//! engine, job queue, lifecycle manager, and the resolution pipeline that
//! ties them together.

pub mod cache;
pub mod config;
pub mod error;
pub mod interpolation;
pub mod lifecycle;
pub mod model;
pub mod oracle;
pub mod pipeline;
pub mod queue;

pub use config::{core_config, init_config, Config};
pub use error::{AppError, Result};
pub use lifecycle::LifecycleManager;
pub use pipeline::{Reply, ResolutionPipeline};
