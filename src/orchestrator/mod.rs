//! Application-level orchestration.
//!
//! This module owns the backend run lifecycle (start, live output, reconcile) and the
//! post-run data refresh. The dashboard and CLI layers call into it and never touch the
//! output stream directly.

mod controller;
mod post_process;
mod state;

pub use controller::{RunController, RunUpdate};
pub use state::RunPhase;
