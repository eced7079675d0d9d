//! The MQTT protocol works by exchanging a series of MQTT Control Packets in a defined way.
//!
//! This crate describes the wire format of these packets for protocol version 3.1.1.
#![warn(missing_docs)]

#[macro_use]
extern crate bitflags;

mod decode;
mod encode;
mod packet;

pub use crate::encode::WriteTo;
pub use crate::packet::*;
