//! Order resources from a Bluetooth-serial dispenser.
//!
//! Dispenser is an API and command-line application that drives a single paired dispensing device over a
//! Bluetooth LE serial link. An order is a resource and a quantity in grams, gated behind a local
//! authentication step, and encoded as a three-byte command frame. The device streams back weight readings
//! while it dispenses.
//!
//! # Examples
//!
//! Order 75 grams of wheat:
//! ```text
//! $ dispenser order --quantity 75 --resource 1
//! Connected to =Team 306
//! Passcode:
//! Ordering 75 g of wheat
//! ⚖ 75 g
//! ```
//!
//! Watch weight readings without ordering:
//!
//! ```text
//! $ dispenser monitor
//! ```
//!
//! Try things out without hardware:
//!
//! ```text
//! $ dispenser interactive --simulate
//! ```

pub mod auth;
pub mod console;
pub mod display;
pub mod link;
pub mod logging;
pub mod operations;
mod prelude;
pub mod protocol;
