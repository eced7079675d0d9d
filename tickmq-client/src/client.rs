use std::io;
use std::time::{Duration, Instant};

use crate::framed::FrameReader;
use crate::io::{Events, Sink};
use crate::packet::QoS;
use crate::session::{
    Action, ConnectRequest, PublishRequest, Session, SubscribeRequest,
};
use crate::status::Status;

/// An imperative surface over the action dispatcher, for callers that do not
/// want to build actions themselves.
///
/// `input` is the read half of the transport and `sink` the write half; a
/// `TcpStream` and its `try_clone` twin fit. Blocking behavior follows the
/// transport's own configuration, read timeouts included.
pub struct Client<R, S, E> {
    input: FrameReader<R>,
    session: Session<S, E>,
}

impl<R, S, E> Client<R, S, E> {
    /// Couples the two transport halves with a session of the given
    /// output-buffer capacity. Call [`Client::connect`] next.
    pub fn new(input: R, sink: S, events: E, capacity: usize) -> Self {
        Client {
            input: FrameReader::new(input),
            session: Session::new(sink, events, capacity),
        }
    }

    /// The wrapped session, for callers that outgrow this surface.
    pub fn session_mut(&mut self) -> &mut Session<S, E> {
        &mut self.session
    }
}

impl<R, S, E> Client<R, S, E>
where
    R: io::Read,
    S: Sink,
    E: Events,
{
    /// Initializes the session, sends CONNECT and waits up to `timeout` for
    /// the broker's CONNACK, returning its return code as a status.
    ///
    /// Frames that arrive while waiting go through the normal parse path, so
    /// an early PUBLISH is delivered instead of lost. The deadline is checked
    /// between reads; a transport without a read timeout can overrun it.
    pub fn connect(&mut self, request: ConnectRequest, timeout: Duration) -> Status {
        let status = self.session.dispatch(Action::Init);
        if status != Status::Successful {
            return status;
        }
        let status = self.session.dispatch(Action::Connect(request));
        if status != Status::Successful {
            return status;
        }

        let deadline = Instant::now() + timeout;
        loop {
            match self.input.read_frame() {
                Ok(frame) => {
                    self.session.dispatch(Action::ParseInputStream(frame));
                    if let Some(code) = self.session.last_connect_code() {
                        return code.into();
                    }
                }
                Err(ref err)
                    if err.kind() == io::ErrorKind::WouldBlock
                        || err.kind() == io::ErrorKind::TimedOut => {}
                Err(err) => {
                    warn!("fail to read CONNACK: {}", err);
                    return Status::ServerUnavailable;
                }
            }

            if Instant::now() >= deadline {
                return Status::ServerUnavailable;
            }
        }
    }

    /// Publishes `payload` on `topic_name` at QoS 0.
    pub fn publish(&mut self, topic_name: &str, payload: &[u8]) -> Status {
        self.session
            .dispatch(Action::Publish(PublishRequest::new(topic_name, payload)))
    }

    /// Subscribes to `topic_filter` at QoS 0. The result arrives through
    /// [`Events::on_subscribe`] once the SUBACK is parsed.
    pub fn subscribe(&mut self, topic_filter: &str) -> Status {
        self.session.dispatch(Action::Subscribe(SubscribeRequest {
            topic_filter,
            qos: QoS::AtMostOnce,
        }))
    }

    /// Sends DISCONNECT. The caller owns the socket shutdown.
    pub fn disconnect(&mut self) -> Status {
        self.session.dispatch(Action::Disconnect)
    }

    /// Advances the keepalive countdown by `elapsed_ms`.
    pub fn keepalive(&mut self, elapsed_ms: u32) -> Status {
        self.session.dispatch(Action::Keepalive { elapsed_ms })
    }

    /// Entry point for transport threads holding a fully framed packet.
    pub fn receive(&mut self, frame: &[u8]) -> Status {
        self.session.dispatch(Action::ParseInputStream(frame))
    }

    /// Reads one frame from the input and runs it through the parser.
    pub fn poll(&mut self) -> Status {
        match self.input.read_frame() {
            Ok(frame) => self.session.dispatch(Action::ParseInputStream(frame)),
            Err(err) => {
                debug!("fail to read frame: {}", err);
                Status::ServerUnavailable
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use super::*;
    use crate::session::ConnectionState;

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

    const TIMEOUT: Duration = Duration::from_secs(5);

    fn client(inbound: &[u8]) -> Client<Cursor<Vec<u8>>, Vec<u8>, EventLog> {
        Client::new(
            Cursor::new(inbound.to_vec()),
            Vec::new(),
            EventLog::default(),
            1024,
        )
    }

    #[test]
    fn test_connect_accepted() {
        let mut client = client(b"\x20\x02\x00\x00");

        assert_eq!(
            client.connect(ConnectRequest::new("A"), TIMEOUT),
            Status::Successful
        );
        assert_eq!(
            client.session_mut().sink_mut(),
            &b"\x10\x0D\x00\x04MQTT\x04\x02\x00\x00\x00\x01A".to_vec()
        );
        assert_eq!(client.session_mut().state(), ConnectionState::Connected);
        assert_eq!(
            client.session_mut().events_mut().connected,
            vec![Status::Successful]
        );
    }

    #[test]
    fn test_connect_refused() {
        let mut client = client(b"\x20\x02\x00\x04");

        assert_eq!(
            client.connect(ConnectRequest::new("A"), TIMEOUT),
            Status::BadUsernameOrPassword
        );
        assert_eq!(client.session_mut().state(), ConnectionState::Disconnected);
    }

    #[test]
    fn test_connect_delivers_early_publish() {
        let mut client = client(b"\x30\x07\x00\x03a/bhi\x20\x02\x00\x00");

        assert_eq!(
            client.connect(ConnectRequest::new("A"), TIMEOUT),
            Status::Successful
        );
        assert_eq!(
            client.session_mut().events_mut().subscribed,
            vec![(Status::Successful, b"hi".to_vec(), b"a/b".to_vec())]
        );
    }

    #[test]
    fn test_connect_broker_gone() {
        let mut client = client(b"");

        assert_eq!(
            client.connect(ConnectRequest::new("A"), TIMEOUT),
            Status::ServerUnavailable
        );
    }

    #[test]
    fn test_facade_wraps_the_dispatcher() {
        let mut client = client(b"\x20\x02\x00\x00\x90\x03\x00\x01\x00");
        assert_eq!(
            client.connect(ConnectRequest::new("A"), TIMEOUT),
            Status::Successful
        );
        client.session_mut().sink_mut().clear();

        assert_eq!(client.subscribe("a/b"), Status::Successful);
        assert_eq!(client.poll(), Status::Successful);
        assert_eq!(
            client.session_mut().events_mut().subscribed,
            vec![(Status::Successful, vec![], vec![])]
        );
        client.session_mut().sink_mut().clear();

        assert_eq!(client.publish("a/b", b"hi"), Status::Successful);
        assert_eq!(
            client.session_mut().sink_mut(),
            &b"\x30\x07\x00\x03a/bhi".to_vec()
        );
        client.session_mut().sink_mut().clear();

        assert_eq!(client.receive(b"\x30\x07\x00\x03a/bhi"), Status::Successful);
        assert_eq!(client.keepalive(100), Status::Successful);

        assert_eq!(client.disconnect(), Status::Successful);
        assert_eq!(client.session_mut().sink_mut(), &b"\xe0\x00".to_vec());
    }
}
