//! Client side of oilcast training progress.
//!
//! Opens the server's progress stream, folds ticks into an ordered history
//! with the [`Reconciler`](reconcile::Reconciler) and keeps the latest view
//! in a [`SnapshotStore`](snapshot::SnapshotStore) so it survives restarts.

pub mod api;
pub mod config;
pub mod consumer;
pub mod error;
pub mod reconcile;
pub mod snapshot;
pub mod sse;
