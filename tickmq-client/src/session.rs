use bytes::BytesMut;

use crate::io::{Events, Sink};
use crate::packet::{
    Connect, ConnectReturnCode, LastWill, Packet, PacketId, Publish, QoS, Subscribe,
    SubscribeReturnCode, Type, WriteTo, MAX_REMAINING_LENGTH,
};
use crate::status::Status;

/// Sentinel for "keepalive disabled" in [`Session::keepalive_total_ms`].
const KEEPALIVE_DISABLED: i32 = i32::min_value();

/// PINGREQ goes out this many milliseconds before the broker's grace period expires.
const KEEPALIVE_GUARD_MS: i32 = 500;

const CLIENT_ID_MAX_LEN: usize = 23;

/// Connection lifecycle of a session.
#[derive(Debug, Eq, PartialEq, Copy, Clone)]
pub enum ConnectionState {
    /// No CONNECT has been sent, or the broker refused the last one.
    Disconnected,
    /// A CONNECT was sent and has not been refused.
    Connected,
}

/// Parameters for the CONNECT packet.
///
/// Optional fields drive the connect-flags byte: an empty string counts as
/// absent, and a last will is only armed when both its topic and its message
/// are present and non-empty.
#[derive(Debug, Clone)]
pub struct ConnectRequest<'a> {
    /// identifies the Client to the Server; must be 1 to 23 bytes.
    pub client_id: &'a str,
    /// a time interval measured in seconds; 0 disables the keepalive.
    pub keep_alive: u16,
    /// the handling of the Session state.
    pub clean_session: bool,
    /// the topic the broker publishes the will message to.
    pub last_will_topic: Option<&'a str>,
    /// the will message body.
    pub last_will_message: Option<&'a [u8]>,
    /// the QoS level to be used when publishing the Will Message.
    pub last_will_qos: QoS,
    /// the Will Message is to be Retained when it is published.
    pub will_retain: bool,
    /// username can be used by the Server for authentication and authorization.
    pub username: Option<&'a str>,
    /// password can be used by the Server for authentication and authorization.
    pub password: Option<&'a [u8]>,
}

impl<'a> ConnectRequest<'a> {
    /// A clean-session request with the keepalive disabled.
    pub fn new(client_id: &'a str) -> Self {
        ConnectRequest {
            client_id,
            keep_alive: 0,
            clean_session: true,
            last_will_topic: None,
            last_will_message: None,
            last_will_qos: QoS::AtMostOnce,
            will_retain: false,
            username: None,
            password: None,
        }
    }
}

/// Parameters for an outbound PUBLISH packet.
#[derive(Debug, Clone)]
pub struct PublishRequest<'a> {
    /// re-delivery of an earlier attempt
    pub dup: bool,
    /// the broker stores the message for future subscribers
    pub retain: bool,
    /// The level of assurance for delivery of the Application Message.
    pub qos: QoS,
    /// the information channel to which payload data is published; no wildcards.
    pub topic_name: &'a str,
    /// the Application Message that is being published.
    pub payload: &'a [u8],
}

impl<'a> PublishRequest<'a> {
    /// A plain QoS 0 publication.
    pub fn new(topic_name: &'a str, payload: &'a [u8]) -> Self {
        PublishRequest {
            dup: false,
            retain: false,
            qos: QoS::AtMostOnce,
            topic_name,
            payload,
        }
    }
}

/// Parameters for an outbound SUBSCRIBE packet, one Topic Filter at a time.
#[derive(Debug, Clone)]
pub struct SubscribeRequest<'a> {
    /// the Topic Filter to subscribe to; wildcards are allowed.
    pub topic_filter: &'a str,
    /// the maximum QoS the broker may use when forwarding matching messages.
    pub qos: QoS,
}

/// Caller intent, dispatched one action at a time against a session.
#[derive(Debug)]
pub enum Action<'a> {
    /// Reset the session to its initial, disconnected state.
    ///
    /// Every other action is refused with `InvalidArgument` until this has run.
    Init,
    /// Encode and send a CONNECT packet, then assume the connection until a
    /// CONNACK says otherwise.
    Connect(ConnectRequest<'a>),
    /// Send a DISCONNECT packet.
    Disconnect,
    /// Encode and send a PUBLISH packet.
    Publish(PublishRequest<'a>),
    /// Encode and send a SUBSCRIBE packet.
    Subscribe(SubscribeRequest<'a>),
    /// Advance the keepalive countdown, emitting a PINGREQ when it runs out.
    Keepalive {
        /// milliseconds elapsed since the previous tick
        elapsed_ms: u32,
    },
    /// Classify one complete inbound packet, update the connection state and
    /// fire the matching callback.
    ParseInputStream(&'a [u8]),
}

/// A single MQTT connection: codec state, keepalive countdown and callbacks.
///
/// The session is strictly single threaded; a caller with a reader thread must
/// serialize its `ParseInputStream` dispatches against all other actions.
pub struct Session<S, E> {
    sink: S,
    events: E,
    buffer: BytesMut,
    capacity: usize,
    initialized: bool,
    state: ConnectionState,
    packet_id: u32,
    keepalive_total_ms: i32,
    keepalive_remaining_ms: i32,
    last_connack: Option<ConnectReturnCode>,
}

impl<S, E> Session<S, E> {
    /// Creates a session writing packets of at most `capacity` bytes into `sink`.
    ///
    /// The session refuses every action until `Action::Init` is dispatched.
    pub fn new(sink: S, events: E, capacity: usize) -> Self {
        Session {
            sink,
            events,
            buffer: BytesMut::with_capacity(capacity),
            capacity,
            initialized: false,
            state: ConnectionState::Disconnected,
            packet_id: 0,
            keepalive_total_ms: 0,
            keepalive_remaining_ms: 0,
            last_connack: None,
        }
    }

    /// The current connection state.
    pub fn state(&self) -> ConnectionState {
        self.state
    }

    /// The return code of the most recently parsed CONNACK, if any arrived
    /// since the session was initialized.
    pub fn last_connect_code(&self) -> Option<ConnectReturnCode> {
        self.last_connack
    }

    /// The caller's sink.
    pub fn sink_mut(&mut self) -> &mut S {
        &mut self.sink
    }

    /// The caller's event handler.
    pub fn events_mut(&mut self) -> &mut E {
        &mut self.events
    }

    fn next_packet_id(&mut self) -> PacketId {
        self.packet_id = self.packet_id.wrapping_add(1);
        self.packet_id as PacketId
    }
}

impl<S, E> Session<S, E>
where
    S: Sink,
    E: Events,
{
    /// Dispatches one action, enforcing its state preconditions first.
    ///
    /// Nothing is written to the sink when a precondition fails.
    pub fn dispatch(&mut self, action: Action) -> Status {
        trace!("dispatch {:?}", action);

        if !self.initialized {
            return match action {
                Action::Init => self.init(),
                _ => Status::InvalidArgument,
            };
        }

        match action {
            Action::Init => self.init(),
            Action::Connect(ref request) => self.connect(request),
            Action::Disconnect => self.disconnect(),
            Action::Publish(ref request) => self.publish(request),
            Action::Subscribe(ref request) => self.subscribe(request),
            Action::Keepalive { elapsed_ms } => self.keepalive(elapsed_ms),
            Action::ParseInputStream(input) => self.parse_input_stream(input),
        }
    }

    fn init(&mut self) -> Status {
        self.initialized = true;
        self.state = ConnectionState::Disconnected;
        self.packet_id = 0;
        self.keepalive_total_ms = 0;
        self.keepalive_remaining_ms = 0;
        self.last_connack = None;
        Status::Successful
    }

    fn connect(&mut self, request: &ConnectRequest) -> Status {
        if self.state == ConnectionState::Connected {
            return Status::AlreadyConnected;
        }
        if request.client_id.is_empty() || request.client_id.len() > CLIENT_ID_MAX_LEN {
            return Status::InvalidArgument;
        }

        let last_will = match (request.last_will_topic, request.last_will_message) {
            (Some(topic_name), Some(message)) if !topic_name.is_empty() && !message.is_empty() => {
                Some(LastWill {
                    qos: request.last_will_qos,
                    retain: request.will_retain,
                    topic_name,
                    message,
                })
            }
            // an incomplete will is dropped entirely, its QoS with it
            _ => None,
        };

        let packet = Packet::Connect(Connect {
            clean_session: request.clean_session,
            keep_alive: request.keep_alive,
            client_id: request.client_id,
            last_will,
            username: request.username.filter(|s| !s.is_empty()),
            password: request.password.filter(|s| !s.is_empty()),
        });

        match self.send(&packet) {
            Status::Successful => {
                self.keepalive_total_ms = if request.keep_alive != 0 {
                    i32::from(request.keep_alive) * 1000 - KEEPALIVE_GUARD_MS
                } else {
                    KEEPALIVE_DISABLED
                };
                // zero, so the first tick after connecting pings immediately
                self.keepalive_remaining_ms = 0;
                // optimistic: demoted again if the CONNACK carries a non-zero code
                self.state = ConnectionState::Connected;
                Status::Successful
            }
            status => status,
        }
    }

    fn disconnect(&mut self) -> Status {
        if self.state != ConnectionState::Connected {
            return Status::NoConnection;
        }

        match self.send(&Packet::Disconnect) {
            Status::Successful => {
                self.state = ConnectionState::Disconnected;
                Status::Successful
            }
            status => status,
        }
    }

    fn publish(&mut self, request: &PublishRequest) -> Status {
        if self.state != ConnectionState::Connected {
            return Status::NoConnection;
        }
        if request.topic_name.is_empty()
            || request.topic_name.bytes().any(|c| c == b'#' || c == b'+')
        {
            return Status::InvalidArgument;
        }

        // advances at QoS 0 too, where it never reaches the wire
        let packet_id = self.next_packet_id();
        let packet = Packet::Publish(Publish {
            dup: request.dup,
            qos: request.qos,
            retain: request.retain,
            topic_name: request.topic_name,
            packet_id: if request.qos > QoS::AtMostOnce {
                Some(packet_id)
            } else {
                None
            },
            payload: request.payload,
        });

        match self.send(&packet) {
            Status::Successful => {
                self.keepalive_remaining_ms = self.keepalive_total_ms;
                Status::Successful
            }
            status => status,
        }
    }

    fn subscribe(&mut self, request: &SubscribeRequest) -> Status {
        if self.state != ConnectionState::Connected {
            return Status::NoConnection;
        }
        if request.topic_filter.is_empty() {
            return Status::InvalidArgument;
        }

        let packet = Packet::Subscribe(Subscribe {
            packet_id: self.next_packet_id(),
            topic_filter: request.topic_filter,
            qos: request.qos,
        });

        match self.send(&packet) {
            Status::Successful => {
                self.keepalive_remaining_ms = self.keepalive_total_ms;
                Status::Successful
            }
            status => status,
        }
    }

    fn keepalive(&mut self, elapsed_ms: u32) -> Status {
        if self.state != ConnectionState::Connected {
            return Status::Successful;
        }
        if self.keepalive_total_ms == KEEPALIVE_DISABLED {
            return Status::Successful;
        }

        let remaining = i64::from(self.keepalive_remaining_ms) - i64::from(elapsed_ms);
        self.keepalive_remaining_ms = remaining.max(0) as i32;

        if self.keepalive_remaining_ms <= 0 {
            match self.send(&Packet::Ping) {
                Status::Successful => {
                    self.keepalive_remaining_ms = self.keepalive_total_ms;
                    Status::Successful
                }
                _ => Status::ServerUnavailable,
            }
        } else {
            Status::PingNotSent
        }
    }

    fn parse_input_stream(&mut self, input: &[u8]) -> Status {
        let packet = match Packet::parse::<()>(input) {
            Ok((_, packet)) => packet,
            Err(_) => {
                // only a PUBLISH body failure is reported through the callback
                if input.first().map_or(false, |&b| b >> 4 == Type::PUBLISH as u8) {
                    debug!("dropping malformed publish frame of {} bytes", input.len());
                    self.events.on_subscribe(Status::PublishDecodeError, &[], &[]);
                    return Status::PublishDecodeError;
                }
                return Status::InvalidArgument;
            }
        };

        trace!("read {:?} packet", packet.packet_type());

        match packet {
            Packet::ConnectAck(ack) => {
                self.state = if ack.return_code == ConnectReturnCode::ConnectionAccepted {
                    ConnectionState::Connected
                } else {
                    ConnectionState::Disconnected
                };
                self.last_connack = Some(ack.return_code);
                self.events.on_connected(ack.return_code.into());
            }
            Packet::Publish(publish) => {
                self.events.on_subscribe(
                    Status::Successful,
                    publish.payload,
                    publish.topic_name.as_bytes(),
                );
            }
            Packet::SubscribeAck(ack) => {
                let status = match ack.status {
                    SubscribeReturnCode::Success(_) => Status::Successful,
                    SubscribeReturnCode::Failure => Status::PublishDecodeError,
                };
                self.events.on_subscribe(status, &[], &[]);
            }
            Packet::Pong => {}
            Packet::PublishAck(_)
            | Packet::PublishReceived(_)
            | Packet::PublishRelease(_)
            | Packet::PublishComplete(_)
            | Packet::UnsubscribeAck(_) => {
                // no delivery assurance is kept on this side
            }
            Packet::Connect(_)
            | Packet::Subscribe(_)
            | Packet::Unsubscribe(_)
            | Packet::Ping
            | Packet::Disconnect => return Status::InvalidArgument,
        }

        // inbound traffic proves the connection is alive
        self.keepalive_remaining_ms = self.keepalive_total_ms;
        Status::Successful
    }

    fn send(&mut self, packet: &Packet) -> Status {
        if packet.remaining_length() > MAX_REMAINING_LENGTH {
            return Status::InvalidArgument;
        }

        let size = packet.size();
        if size > self.capacity {
            warn!(
                "{:?} packet of {} bytes exceeds the {} byte output buffer",
                packet.packet_type(),
                size,
                self.capacity
            );
            return Status::InvalidArgument;
        }

        self.buffer.clear();
        packet.write_to(&mut self.buffer);

        match self.sink.write_packet(&self.buffer) {
            Ok(()) => Status::Successful,
            Err(err) => {
                warn!(
                    "transport rejected {:?} packet: {}",
                    packet.packet_type(),
                    err
                );
                Status::ServerUnavailable
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::io;

    use super::*;

    #[derive(Default)]
    struct Wire {
        packets: Vec<Vec<u8>>,
        broken: bool,
    }

    impl Sink for Wire {
        fn write_packet(&mut self, packet: &[u8]) -> io::Result<()> {
            if self.broken {
                return Err(io::Error::new(io::ErrorKind::BrokenPipe, "sink closed"));
            }
            self.packets.push(packet.to_vec());
            Ok(())
        }
    }

    #[derive(Default)]
    struct EventLog {
        connected: Vec<Status>,
        subscribed: Vec<(Status, Vec<u8>, Vec<u8>)>,
    }

    impl Events for EventLog {
        fn on_connected(&mut self, status: Status) {
            self.connected.push(status);
        }

        fn on_subscribe(&mut self, status: Status, payload: &[u8], topic: &[u8]) {
            self.subscribed
                .push((status, payload.to_vec(), topic.to_vec()));
        }
    }

    fn session() -> Session<Wire, EventLog> {
        let mut session = Session::new(Wire::default(), EventLog::default(), 1024);
        assert_eq!(session.dispatch(Action::Init), Status::Successful);
        session
    }

    fn connected(keep_alive: u16) -> Session<Wire, EventLog> {
        let mut session = session();
        let request = ConnectRequest {
            keep_alive,
            ..ConnectRequest::new("A")
        };
        assert_eq!(session.dispatch(Action::Connect(request)), Status::Successful);
        session.sink_mut().packets.clear();
        session
    }

    #[test]
    fn test_dispatch_requires_init() {
        let mut session = Session::new(Wire::default(), EventLog::default(), 1024);

        assert_eq!(
            session.dispatch(Action::Connect(ConnectRequest::new("A"))),
            Status::InvalidArgument
        );
        assert_eq!(
            session.dispatch(Action::Keepalive { elapsed_ms: 100 }),
            Status::InvalidArgument
        );
        assert_eq!(
            session.dispatch(Action::ParseInputStream(b"\xd0\x00")),
            Status::InvalidArgument
        );
        assert!(session.sink_mut().packets.is_empty());

        assert_eq!(session.dispatch(Action::Init), Status::Successful);
        assert_eq!(session.state(), ConnectionState::Disconnected);
    }

    #[test]
    fn test_connect_minimal() {
        let mut session = session();

        assert_eq!(
            session.dispatch(Action::Connect(ConnectRequest::new("A"))),
            Status::Successful
        );
        assert_eq!(
            session.sink_mut().packets,
            vec![b"\x10\x0D\x00\x04MQTT\x04\x02\x00\x00\x00\x01A".to_vec()]
        );
        // optimistic until the CONNACK arrives
        assert_eq!(session.state(), ConnectionState::Connected);

        assert_eq!(
            session.dispatch(Action::Connect(ConnectRequest::new("A"))),
            Status::AlreadyConnected
        );
    }

    #[test]
    fn test_connect_with_will_and_credentials() {
        let mut session = session();

        let request = ConnectRequest {
            keep_alive: 60,
            last_will_topic: Some("t"),
            last_will_message: Some(b"m"),
            username: Some("u"),
            password: Some(b"p"),
            ..ConnectRequest::new("A")
        };
        assert_eq!(session.dispatch(Action::Connect(request)), Status::Successful);

        let packet = &session.sink_mut().packets[0];
        // user | password | will | clean session
        assert_eq!(packet[9], 0xC6);
        assert_eq!(
            &packet[..],
            &b"\x10\x19\x00\x04MQTT\x04\xC6\x00\x3C\x00\x01A\x00\x01t\x00\x01m\x00\x01u\x00\x01p"[..]
        );
    }

    #[test]
    fn test_connect_drops_incomplete_will() {
        let mut session = session();

        let request = ConnectRequest {
            last_will_topic: Some("t"),
            last_will_message: Some(b""),
            last_will_qos: QoS::AtLeastOnce,
            ..ConnectRequest::new("A")
        };
        assert_eq!(session.dispatch(Action::Connect(request)), Status::Successful);

        // the will flag, its QoS and both payload fields are gone
        assert_eq!(
            session.sink_mut().packets,
            vec![b"\x10\x0D\x00\x04MQTT\x04\x02\x00\x00\x00\x01A".to_vec()]
        );
    }

    #[test]
    fn test_connect_rejects_bad_client_id() {
        let mut session = session();

        assert_eq!(
            session.dispatch(Action::Connect(ConnectRequest::new(""))),
            Status::InvalidArgument
        );
        assert_eq!(
            session.dispatch(Action::Connect(ConnectRequest::new(
                "123456789012345678901234"
            ))),
            Status::InvalidArgument
        );
        assert!(session.sink_mut().packets.is_empty());
        assert_eq!(session.state(), ConnectionState::Disconnected);
    }

    #[test]
    fn test_connect_send_failure() {
        let mut session = session();
        session.sink_mut().broken = true;

        assert_eq!(
            session.dispatch(Action::Connect(ConnectRequest::new("A"))),
            Status::ServerUnavailable
        );
        assert_eq!(session.state(), ConnectionState::Disconnected);
    }

    #[test]
    fn test_connack_transitions() {
        let mut session = connected(0);

        assert_eq!(
            session.dispatch(Action::ParseInputStream(b"\x20\x02\x00\x00")),
            Status::Successful
        );
        assert_eq!(session.state(), ConnectionState::Connected);
        assert_eq!(session.events_mut().connected, vec![Status::Successful]);
        assert_eq!(
            session.last_connect_code(),
            Some(ConnectReturnCode::ConnectionAccepted)
        );

        assert_eq!(
            session.dispatch(Action::ParseInputStream(b"\x20\x02\x00\x05")),
            Status::Successful
        );
        assert_eq!(session.state(), ConnectionState::Disconnected);
        assert_eq!(
            session.events_mut().connected,
            vec![Status::Successful, Status::NotAuthorized]
        );
    }

    #[test]
    fn test_publish() {
        let mut session = connected(0);

        assert_eq!(
            session.dispatch(Action::Publish(PublishRequest::new("a/b", b"hi"))),
            Status::Successful
        );
        assert_eq!(
            session.sink_mut().packets,
            vec![b"\x30\x07\x00\x03a/bhi".to_vec()]
        );
    }

    #[test]
    fn test_publish_preconditions() {
        let mut session = session();
        assert_eq!(
            session.dispatch(Action::Publish(PublishRequest::new("a/b", b"hi"))),
            Status::NoConnection
        );

        let mut session = connected(0);
        assert_eq!(
            session.dispatch(Action::Publish(PublishRequest::new("", b"hi"))),
            Status::InvalidArgument
        );
        assert_eq!(
            session.dispatch(Action::Publish(PublishRequest::new("a/#", b"hi"))),
            Status::InvalidArgument
        );
        assert!(session.sink_mut().packets.is_empty());
    }

    #[test]
    fn test_packet_id_advances() {
        let mut session = connected(0);

        for _ in 0..3 {
            assert_eq!(
                session.dispatch(Action::Publish(PublishRequest::new("a/b", b"hi"))),
                Status::Successful
            );
        }
        assert_eq!(
            session.dispatch(Action::Subscribe(SubscribeRequest {
                topic_filter: "a/b",
                qos: QoS::AtMostOnce,
            })),
            Status::Successful
        );

        // three QoS 0 publishes consumed ids 1..3; the subscribe carries 4
        let subscribe = session.sink_mut().packets.last().unwrap().clone();
        assert_eq!(&subscribe[2..4], &[0x00, 0x04]);
    }

    #[test]
    fn test_publish_qos1_carries_packet_id() {
        let mut session = connected(0);

        let request = PublishRequest {
            qos: QoS::AtLeastOnce,
            ..PublishRequest::new("a/b", b"hi")
        };
        assert_eq!(session.dispatch(Action::Publish(request)), Status::Successful);
        assert_eq!(
            session.sink_mut().packets,
            vec![b"\x32\x09\x00\x03a/b\x00\x01hi".to_vec()]
        );
    }

    #[test]
    fn test_subscribe() {
        let mut session = connected(0);

        assert_eq!(
            session.dispatch(Action::Subscribe(SubscribeRequest {
                topic_filter: "a/b",
                qos: QoS::AtMostOnce,
            })),
            Status::Successful
        );
        assert_eq!(
            session.sink_mut().packets,
            vec![b"\x82\x08\x00\x01\x00\x03a/b\x00".to_vec()]
        );

        assert_eq!(
            session.dispatch(Action::ParseInputStream(b"\x90\x03\x00\x01\x00")),
            Status::Successful
        );
        assert_eq!(
            session.events_mut().subscribed,
            vec![(Status::Successful, vec![], vec![])]
        );
    }

    #[test]
    fn test_suback_failure() {
        let mut session = connected(0);

        assert_eq!(
            session.dispatch(Action::ParseInputStream(b"\x90\x03\x00\x01\x80")),
            Status::Successful
        );
        assert_eq!(
            session.events_mut().subscribed,
            vec![(Status::PublishDecodeError, vec![], vec![])]
        );
    }

    #[test]
    fn test_receive_publish() {
        let mut session = connected(0);

        assert_eq!(
            session.dispatch(Action::ParseInputStream(b"\x30\x07\x00\x03a/bhi")),
            Status::Successful
        );
        assert_eq!(
            session.events_mut().subscribed,
            vec![(Status::Successful, b"hi".to_vec(), b"a/b".to_vec())]
        );
    }

    #[test]
    fn test_receive_malformed_publish() {
        let mut session = connected(0);

        // QoS 3 in the fixed header flags
        assert_eq!(
            session.dispatch(Action::ParseInputStream(b"\x36\x07\x00\x03a/bhi")),
            Status::PublishDecodeError
        );
        assert_eq!(
            session.events_mut().subscribed,
            vec![(Status::PublishDecodeError, vec![], vec![])]
        );
    }

    #[test]
    fn test_receive_garbage() {
        let mut session = connected(0);

        assert_eq!(
            session.dispatch(Action::ParseInputStream(b"\x00\x00")),
            Status::InvalidArgument
        );
        assert_eq!(session.dispatch(Action::ParseInputStream(b"")), Status::InvalidArgument);
        assert!(session.events_mut().subscribed.is_empty());
        assert!(session.events_mut().connected.is_empty());
    }

    #[test]
    fn test_ignored_acknowledgements() {
        let mut session = connected(0);

        for frame in &[
            &b"\x40\x02\x00\x01"[..], // PUBACK
            &b"\x50\x02\x00\x01"[..], // PUBREC
            &b"\x62\x02\x00\x01"[..], // PUBREL
            &b"\x70\x02\x00\x01"[..], // PUBCOMP
            &b"\xb0\x02\x00\x01"[..], // UNSUBACK
        ] {
            assert_eq!(
                session.dispatch(Action::ParseInputStream(frame)),
                Status::Successful
            );
        }
        assert!(session.events_mut().subscribed.is_empty());
    }

    #[test]
    fn test_inbound_client_packets_are_invalid() {
        let mut session = connected(0);

        assert_eq!(
            session.dispatch(Action::ParseInputStream(b"\x82\x08\x00\x01\x00\x03a/b\x00")),
            Status::InvalidArgument
        );
        assert_eq!(
            session.dispatch(Action::ParseInputStream(b"\xc0\x00")),
            Status::InvalidArgument
        );
    }

    #[test]
    fn test_keepalive_countdown() {
        let mut session = connected(2); // total_ms = 1500

        // the countdown starts at zero, so the first tick pings right away
        assert_eq!(
            session.dispatch(Action::Keepalive { elapsed_ms: 1600 }),
            Status::Successful
        );
        assert_eq!(session.sink_mut().packets, vec![b"\xc0\x00".to_vec()]);

        assert_eq!(
            session.dispatch(Action::Keepalive { elapsed_ms: 100 }),
            Status::PingNotSent
        );
        assert_eq!(session.sink_mut().packets.len(), 1);

        // 100 + 1400 uses up the full 1500ms countdown
        assert_eq!(
            session.dispatch(Action::Keepalive { elapsed_ms: 1400 }),
            Status::Successful
        );
        assert_eq!(session.sink_mut().packets.len(), 2);
    }

    #[test]
    fn test_keepalive_disabled() {
        let mut session = connected(0);

        assert_eq!(
            session.dispatch(Action::Keepalive { elapsed_ms: 100_000 }),
            Status::Successful
        );
        assert!(session.sink_mut().packets.is_empty());
    }

    #[test]
    fn test_keepalive_disconnected_is_noop() {
        let mut session = session();

        assert_eq!(
            session.dispatch(Action::Keepalive { elapsed_ms: 100_000 }),
            Status::Successful
        );
        assert!(session.sink_mut().packets.is_empty());
    }

    #[test]
    fn test_keepalive_send_failure() {
        let mut session = connected(2);
        session.sink_mut().broken = true;

        assert_eq!(
            session.dispatch(Action::Keepalive { elapsed_ms: 1600 }),
            Status::ServerUnavailable
        );
    }

    #[test]
    fn test_activity_resets_keepalive() {
        let mut session = connected(2);

        // the publish rewinds the countdown to the full 1500ms
        assert_eq!(
            session.dispatch(Action::Publish(PublishRequest::new("a/b", b"hi"))),
            Status::Successful
        );
        assert_eq!(
            session.dispatch(Action::Keepalive { elapsed_ms: 100 }),
            Status::PingNotSent
        );

        // so does a successful inbound parse
        assert_eq!(
            session.dispatch(Action::ParseInputStream(b"\xd0\x00")),
            Status::Successful
        );
        assert_eq!(
            session.dispatch(Action::Keepalive { elapsed_ms: 1400 }),
            Status::PingNotSent
        );
    }

    #[test]
    fn test_disconnect() {
        let mut session = connected(0);

        assert_eq!(session.dispatch(Action::Disconnect), Status::Successful);
        assert_eq!(session.sink_mut().packets, vec![b"\xe0\x00".to_vec()]);
        assert_eq!(session.state(), ConnectionState::Disconnected);

        assert_eq!(session.dispatch(Action::Disconnect), Status::NoConnection);
    }

    #[test]
    fn test_oversize_packet_is_refused() {
        let mut session = Session::new(Wire::default(), EventLog::default(), 16);
        assert_eq!(session.dispatch(Action::Init), Status::Successful);
        assert_eq!(
            session.dispatch(Action::Connect(ConnectRequest::new("A"))),
            Status::Successful
        );
        session.sink_mut().packets.clear();

        let payload = [0u8; 64];
        assert_eq!(
            session.dispatch(Action::Publish(PublishRequest::new("a/b", &payload))),
            Status::InvalidArgument
        );
        assert!(session.sink_mut().packets.is_empty());
    }

    #[test]
    fn test_reinit_resets_the_session() {
        let mut session = connected(2);

        assert_eq!(session.dispatch(Action::Init), Status::Successful);
        assert_eq!(session.state(), ConnectionState::Disconnected);
        assert_eq!(session.last_connect_code(), None);

        // the packet id counter restarts as well
        assert_eq!(
            session.dispatch(Action::Connect(ConnectRequest::new("A"))),
            Status::Successful
        );
        session.sink_mut().packets.clear();
        assert_eq!(
            session.dispatch(Action::Subscribe(SubscribeRequest {
                topic_filter: "a/b",
                qos: QoS::AtMostOnce,
            })),
            Status::Successful
        );
        let subscribe = session.sink_mut().packets.last().unwrap().clone();
        assert_eq!(&subscribe[2..4], &[0x00, 0x01]);
    }
}
