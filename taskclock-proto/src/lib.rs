//! Shared record model and wire protocol for `TaskClock`.

pub mod cloud;
pub mod record;
pub mod schedule;
pub mod task;
