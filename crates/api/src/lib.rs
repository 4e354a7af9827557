//! Oilcast API server library.
//!
//! Exposes the building blocks (config, state, engine, error handling,
//! routes, progress streams) so integration tests and the binary entrypoint
//! can both access them.

pub mod config;
pub mod engine;
pub mod error;
pub mod handlers;
pub mod router;
pub mod routes;
pub mod state;
pub mod stream;
