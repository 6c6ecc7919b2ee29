//! `TaskClock`: a task list where at most one task is activated at a time,
//! mirrored to a per-user remote record store.

pub mod activation;
pub mod config;
pub mod remote;
pub mod store;
