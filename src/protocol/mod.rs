//! Wire protocol for the dispenser: outbound command frames and inbound text messages.

mod frame;
mod order;
mod resource;

pub use frame::*;
pub use order::*;
pub use resource::*;
