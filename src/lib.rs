//! dcc-check - Bounded-time DCC checksum reputation client.

pub mod check;
pub mod config;
pub mod transport;
