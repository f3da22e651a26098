//! Wireless link to the dispenser: transport bindings and the connection state machine.

use thiserror::Error;

mod driver;
mod event_receiver;
mod link_bt;
mod link_simulate;
mod manager;

pub use driver::{LinkDriver, LinkEvent, PeripheralId, RadioState};
#[cfg(test)]
pub(crate) use driver::test as driver_test;
pub use event_receiver::LinkEventReceiver;
pub use link_bt::{scan as bt_scan, LinkBT};
pub use link_simulate::{get_link_simulator, SIMULATED_DEVICES};
pub use manager::{ConnectionManager, DisconnectCause, LinkConfig, LinkHandle, LinkState};

/// Name the dispenser advertises.
pub const DEFAULT_DEVICE_NAME: &str = "=Team 306";
/// Payload sent once the serial channel is ready.
pub const DEFAULT_GREETING: &str = "Howdy";

#[derive(Error, Debug)]
pub enum LinkError {
    #[error("not found")]
    NotFound,
    #[error("not connected")]
    NotConnected,
    #[error("radio unavailable")]
    RadioUnavailable,
    #[error("link task has shut down")]
    ChannelClosed,
    #[error(transparent)]
    BTError(#[from] btleplug::Error),
    #[error(transparent)]
    IOError(#[from] std::io::Error),
    #[error("Unknown error")]
    Unknown,
}
