use core::convert::TryFrom;
use core::str;

use nom::{
    bytes::complete::{tag, take, take_while_m_n},
    combinator::{all_consuming, cond, map, map_opt, map_res, recognize, rest, verify},
    error::{context, ErrorKind::Verify, ParseError},
    multi::length_data,
    number::complete::{be_u16, be_u8},
    sequence::{pair, tuple},
    IResult,
};

use crate::packet::*;

impl FixedHeader {
    /// Parses the type-and-flags octet and the Remaining Length varint.
    ///
    /// The returned input is positioned at the start of the variable header.
    pub fn parse<'a, E: ParseError<&'a [u8]>>(input: &'a [u8]) -> IResult<&'a [u8], Self, E> {
        map(
            tuple((
                map_res(
                    be_u8,
                    |b| -> Result<_, num_enum::TryFromPrimitiveError<Type>> {
                        let packet_type = Type::try_from((b >> 4) & 0x0F)?;
                        let packet_flags = b & 0x0F;

                        Ok((packet_type, packet_flags))
                    },
                ),
                varint,
            )),
            |((packet_type, packet_flags), remaining_length)| FixedHeader {
                packet_type,
                packet_flags,
                remaining_length,
            },
        )(input)
    }
}

const CONTINUATION_BIT: u8 = 0x80;

fn varint<'a, E: ParseError<&'a [u8]>>(input: &'a [u8]) -> IResult<&'a [u8], usize, E> {
    context(
        "variable length",
        map(
            verify(
                recognize(pair(
                    take_while_m_n(0, 3, |b| (b & CONTINUATION_BIT) != 0),
                    verify(be_u8, |b| (b & CONTINUATION_BIT) == 0),
                )),
                |s: &[u8]| s.len() <= 4,
            ),
            |s: &[u8]| {
                s.iter().enumerate().fold(0, |value, (i, b)| {
                    value + (usize::from(*b & !CONTINUATION_BIT) << (7 * i))
                })
            },
        ),
    )(input)
}

/// Binary Data is represented by a Two Byte Integer length which indicates the number of data bytes,
/// followed by that number of bytes.
fn binary_data<'a, E: ParseError<&'a [u8]>>(input: &'a [u8]) -> IResult<&'a [u8], &'a [u8], E> {
    context("binary data", length_data(be_u16))(input)
}

/// Text fields in the Control Packets described later are encoded as UTF-8 strings.
fn utf8_str<'a, E: ParseError<&'a [u8]>>(input: &'a [u8]) -> IResult<&'a [u8], &'a str, E> {
    context("utf8 string", map_res(length_data(be_u16), str::from_utf8))(input)
}

const CLIENT_ID_MIN_LEN: usize = 1;
const CLIENT_ID_MAX_LEN: usize = 23;

/// The Client Identifier (ClientId) identifies the Client to the Server.
///
/// The Server MUST allow ClientIds which are between 1 and 23 UTF-8 encoded bytes
/// in length [MQTT-3.1.3-5].
fn client_id<'a, E: ParseError<&'a [u8]>>(input: &'a [u8]) -> IResult<&'a [u8], &'a str, E> {
    context(
        "client id",
        verify(utf8_str, |s: &str| {
            CLIENT_ID_MIN_LEN <= s.len() && s.len() <= CLIENT_ID_MAX_LEN
        }),
    )(input)
}

/// The Topic Name identifies the information channel to which payload data is published.
///
/// Topic Names sent in a PUBLISH Packet must not contain wildcard characters.
fn topic_name<'a, E: ParseError<&'a [u8]>>(input: &'a [u8]) -> IResult<&'a [u8], &'a str, E> {
    context(
        "topic name",
        verify(utf8_str, |s: &str| {
            !s.is_empty() && s.bytes().all(|c| c != b'#' && c != b'+')
        }),
    )(input)
}

/// An expression contained in a Subscription, to indicate an interest in one or more topics.
///
/// A Topic Filter can include wildcard characters.
fn topic_filter<'a, E: ParseError<&'a [u8]>>(input: &'a [u8]) -> IResult<&'a [u8], &'a str, E> {
    context("topic filter", utf8_str)(input)
}

fn packet_id<'a, E: ParseError<&'a [u8]>>(input: &'a [u8]) -> IResult<&'a [u8], PacketId, E> {
    context("packet id", be_u16)(input)
}

impl Packet<'_> {
    /// Parses one complete control packet.
    ///
    /// The returned input is positioned past the parsed packet.
    pub fn parse<'a, E: ParseError<&'a [u8]>>(input: &'a [u8]) -> IResult<&'a [u8], Packet<'a>, E> {
        let (input, fixed_header) = FixedHeader::parse(input)?;
        let (input, remaining) = take(fixed_header.remaining_length)(input)?;

        match fixed_header.packet_type {
            Type::CONNECT => {
                context("Connect", all_consuming(map(connect, Packet::Connect)))(remaining)
            }
            Type::CONNACK => context(
                "ConnectAck",
                all_consuming(map(connect_ack, Packet::ConnectAck)),
            )(remaining),
            Type::PUBLISH => context(
                "Publish",
                all_consuming(map(
                    |input| {
                        publish(
                            input,
                            PublishFlags::from_bits_truncate(fixed_header.packet_flags),
                        )
                    },
                    Packet::Publish,
                )),
            )(remaining),
            Type::PUBACK => context(
                "PublishAck",
                all_consuming(map(packet_id, |packet_id| {
                    Packet::PublishAck(PublishAck { packet_id })
                })),
            )(remaining),
            Type::PUBREC => context(
                "PublishReceived",
                all_consuming(map(packet_id, |packet_id| {
                    Packet::PublishReceived(PublishReceived { packet_id })
                })),
            )(remaining),
            Type::PUBREL => context(
                "PublishRelease",
                all_consuming(map(packet_id, |packet_id| {
                    Packet::PublishRelease(PublishRelease { packet_id })
                })),
            )(remaining),
            Type::PUBCOMP => context(
                "PublishComplete",
                all_consuming(map(packet_id, |packet_id| {
                    Packet::PublishComplete(PublishComplete { packet_id })
                })),
            )(remaining),
            Type::SUBSCRIBE => context(
                "Subscribe",
                all_consuming(map(subscribe, Packet::Subscribe)),
            )(remaining),
            Type::SUBACK => context(
                "SubscribeAck",
                all_consuming(map(subscribe_ack, Packet::SubscribeAck)),
            )(remaining),
            Type::UNSUBSCRIBE => context(
                "Unsubscribe",
                all_consuming(map(unsubscribe, Packet::Unsubscribe)),
            )(remaining),
            Type::UNSUBACK => context(
                "UnsubscribeAck",
                all_consuming(map(packet_id, |packet_id| {
                    Packet::UnsubscribeAck(UnsubscribeAck { packet_id })
                })),
            )(remaining),
            Type::PINGREQ => context("Ping", map(all_consuming(rest), |_| Packet::Ping))(remaining),
            Type::PINGRESP => context("Pong", map(all_consuming(rest), |_| Packet::Pong))(remaining),
            Type::DISCONNECT => context(
                "Disconnect",
                map(all_consuming(rest), |_| Packet::Disconnect),
            )(remaining),
        }
        .map(|(_, packet)| (input, packet))
    }
}

fn connect<'a, E: ParseError<&'a [u8]>>(input: &'a [u8]) -> IResult<&'a [u8], Connect<'a>, E> {
    let (input, (_, _, flags, keep_alive)) = tuple((
        context("protocol name", tag(PROTOCOL_NAME)),
        context(
            "protocol level",
            verify(be_u8, |&level| level == PROTOCOL_LEVEL),
        ),
        context("flags", map_opt(be_u8, ConnectFlags::from_bits)),
        context("keepalive", be_u16),
    ))(input)?;

    let will_qos = flags
        .qos()
        .ok_or_else(|| nom::Err::Error(E::from_error_kind(input, Verify)))?;

    let (input, (client_id, last_will, username, password)) = tuple((
        client_id,
        cond(
            flags.contains(ConnectFlags::LAST_WILL),
            context(
                "will",
                map(
                    tuple((
                        context("will topic", utf8_str),
                        context("will message", binary_data),
                    )),
                    |(topic_name, message)| LastWill {
                        qos: will_qos,
                        retain: flags.contains(ConnectFlags::WILL_RETAIN),
                        topic_name,
                        message,
                    },
                ),
            ),
        ),
        cond(
            flags.contains(ConnectFlags::USERNAME),
            context("username", utf8_str),
        ),
        cond(
            flags.contains(ConnectFlags::PASSWORD),
            context("password", binary_data),
        ),
    ))(input)?;

    Ok((
        input,
        Connect {
            clean_session: flags.contains(ConnectFlags::CLEAN_SESSION),
            keep_alive,
            client_id,
            last_will,
            username,
            password,
        },
    ))
}

fn connect_ack<'a, E: ParseError<&'a [u8]>>(input: &'a [u8]) -> IResult<&'a [u8], ConnectAck, E> {
    map(
        tuple((
            context("flags", map_opt(be_u8, ConnectAckFlags::from_bits)),
            context("return code", map_res(be_u8, ConnectReturnCode::try_from)),
        )),
        |(flags, return_code)| ConnectAck {
            session_present: flags.contains(ConnectAckFlags::SESSION_PRESENT),
            return_code,
        },
    )(input)
}

fn publish<'a, E: ParseError<&'a [u8]>>(
    input: &'a [u8],
    flags: PublishFlags,
) -> IResult<&'a [u8], Publish<'a>, E> {
    let qos = flags
        .qos()
        .ok_or_else(|| nom::Err::Error(E::from_error_kind(input, Verify)))?;

    let (input, (topic_name, packet_id, payload)) = tuple((
        topic_name,
        cond(qos >= QoS::AtLeastOnce, packet_id),
        rest,
    ))(input)?;

    Ok((
        input,
        Publish {
            dup: flags.contains(PublishFlags::DUP),
            qos,
            retain: flags.contains(PublishFlags::RETAIN),
            topic_name,
            packet_id,
            payload,
        },
    ))
}

fn subscribe<'a, E: ParseError<&'a [u8]>>(input: &'a [u8]) -> IResult<&'a [u8], Subscribe<'a>, E> {
    map(
        tuple((
            packet_id,
            context("subscription", topic_filter),
            context("QoS", map_res(be_u8, QoS::try_from)),
        )),
        |(packet_id, topic_filter, qos)| Subscribe {
            packet_id,
            topic_filter,
            qos,
        },
    )(input)
}

fn subscribe_ack<'a, E: ParseError<&'a [u8]>>(
    input: &'a [u8],
) -> IResult<&'a [u8], SubscribeAck, E> {
    map(
        tuple((
            packet_id,
            context(
                "return code",
                map_res(be_u8, |b| {
                    if b == SubscribeReturnCode::FAILURE {
                        Ok(SubscribeReturnCode::Failure)
                    } else {
                        QoS::try_from(b).map(SubscribeReturnCode::Success)
                    }
                }),
            ),
        )),
        |(packet_id, status)| SubscribeAck { packet_id, status },
    )(input)
}

fn unsubscribe<'a, E: ParseError<&'a [u8]>>(
    input: &'a [u8],
) -> IResult<&'a [u8], Unsubscribe<'a>, E> {
    map(
        tuple((packet_id, context("topic filter", topic_filter))),
        |(packet_id, topic_filter)| Unsubscribe {
            packet_id,
            topic_filter,
        },
    )(input)
}
