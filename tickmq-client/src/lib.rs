//! A tick-driven MQTT 3.1.1 client core.
//!
//! The caller owns the transport and the clock: finished packets leave
//! through a [`Sink`], complete inbound frames come back in through
//! [`Action::ParseInputStream`], and the keepalive only advances when the
//! caller reports elapsed time. Everything in between - the codec, the
//! connection state machine and the callbacks - lives here.

#[macro_use]
extern crate log;

pub extern crate tickmq_packet as packet;

mod client;
mod framed;
mod io;
mod session;
mod status;

pub use self::client::Client;
pub use self::framed::FrameReader;
pub use self::io::{Events, Sink};
pub use self::session::{
    Action, ConnectRequest, ConnectionState, PublishRequest, Session, SubscribeRequest,
};
pub use self::status::Status;
