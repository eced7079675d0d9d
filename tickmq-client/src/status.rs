use derive_more::Display;

use crate::packet::ConnectReturnCode;

/// The result of dispatching an action against a session.
///
/// Negative values are caller or transport failures detected on this side;
/// positive values mirror the CONNACK return codes the broker can answer with.
#[repr(i32)]
#[derive(Debug, Eq, PartialEq, Copy, Clone, Display)]
pub enum Status {
    /// A precondition on the action failed; nothing was sent.
    #[display(fmt = "invalid argument")]
    InvalidArgument = -64,
    /// The action requires a connected session.
    #[display(fmt = "no connection")]
    NoConnection = -63,
    /// Connect was dispatched while the session is already connected.
    #[display(fmt = "already connected")]
    AlreadyConnected = -62,
    /// Non-fatal: the keepalive countdown has not yet reached the ping deadline.
    #[display(fmt = "ping not sent")]
    PingNotSent = -61,
    /// The action completed.
    #[display(fmt = "successful")]
    Successful = 0,
    /// The broker refused the protocol version.
    #[display(fmt = "unacceptable protocol version")]
    InvalidVersion = 1,
    /// The broker rejected the client identifier.
    #[display(fmt = "identifier rejected")]
    InvalidIdentifier = 2,
    /// The broker is unavailable, or the transport failed to take a packet.
    #[display(fmt = "server unavailable")]
    ServerUnavailable = 3,
    /// The broker rejected the credentials.
    #[display(fmt = "bad user name or password")]
    BadUsernameOrPassword = 4,
    /// The client is not authorized to connect.
    #[display(fmt = "not authorized")]
    NotAuthorized = 5,
    /// An inbound PUBLISH frame failed to decode, or a subscription was refused.
    #[display(fmt = "publish decode error")]
    PublishDecodeError = 6,
}

impl From<ConnectReturnCode> for Status {
    fn from(code: ConnectReturnCode) -> Self {
        match code {
            ConnectReturnCode::ConnectionAccepted => Status::Successful,
            ConnectReturnCode::UnacceptableProtocolVersion => Status::InvalidVersion,
            ConnectReturnCode::IdentifierRejected => Status::InvalidIdentifier,
            ConnectReturnCode::ServiceUnavailable => Status::ServerUnavailable,
            ConnectReturnCode::BadUserNameOrPassword => Status::BadUsernameOrPassword,
            ConnectReturnCode::NotAuthorized => Status::NotAuthorized,
        }
    }
}
