//! Training job engine.
//!
//! Contains the job registry, the background runner that drives a job from
//! `pending` to a terminal status, and the glue that carries trainer ticks
//! to the progress publisher.

pub mod progress;
pub mod registry;
pub mod runner;

pub use registry::JobRegistry;
pub use runner::JobRunner;
