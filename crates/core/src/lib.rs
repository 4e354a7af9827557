//! Oilcast domain types shared by the server, the trainer and the client.
//!
//! Nothing in this crate performs I/O. It defines the job lifecycle, the
//! progress tick wire format, the canonical correlation representation and
//! the feature set used for training and prediction.

pub mod correlation;
pub mod error;
pub mod features;
pub mod job;
pub mod prediction;
pub mod progress;
pub mod stream_events;
pub mod types;
