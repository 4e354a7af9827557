//! Oilcast progress fan-out.
//!
//! - [`ProgressPublisher`]: per-job publish/subscribe hub backed by
//!   `tokio::sync::broadcast`, with a bounded drop-oldest buffer per observer.
//! - [`Subscription`]: one observer's live view of a job, yielding
//!   [`Delivery`] values until the job's channel is closed.

pub mod publisher;

pub use publisher::{Delivery, ProgressPublisher, Subscription, DEFAULT_BUFFER};
