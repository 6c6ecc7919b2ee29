//! `taskclock-cloud`: per-user record service for `TaskClock`.
//!
//! Exposes the server for use in tests and embedding. Each WebSocket
//! connection registers a user id and then fetches, saves, deletes and
//! queries records in that user's private zone.

pub mod config;
pub mod server;
pub mod store;
