//! Dispenser operations: ordering and monitoring.

mod dispatcher;
mod monitor;

pub use dispatcher::*;
pub use monitor::*;
