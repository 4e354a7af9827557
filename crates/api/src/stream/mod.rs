//! Server-sent event progress streams.
//!
//! One stream session per HTTP connection. A session subscribes to the
//! job's progress channel, forwards ticks as `progress` frames and ends
//! after the terminal tick or when the client goes away.

mod handler;
mod session;

pub use handler::{progress_stream, ProgressQuery};
pub use session::{session_stream, Session};
