//! MQTT 3.1.1 control packet codec.
//!
//! Encoding writes a complete frame (fixed header, variable header, payload)
//! into any [`BufMut`] sink, refusing up front when the frame does not fit.
//! Decoding works on complete frames; [`FrameHeader::parse`] tells the caller
//! how many bytes a frame needs before it can be decoded, so that partial
//! deliveries never consume anything.
//!
//! Only single-topic SUBSCRIBE/UNSUBSCRIBE are modelled, which is all the
//! client ever sends.

use super::buffer::BufMut;
use super::error::{Error, ProtocolError};
use serde::Deserialize;

/// Protocol name carried by CONNECT.
const PROTOCOL_NAME: &str = "MQTT";
/// Protocol level for version 3.1.1.
const PROTOCOL_LEVEL: u8 = 4;

/// Largest value the remaining-length field can express.
pub const MAX_REMAINING_LENGTH: usize = 268_435_455;

/// SUBACK return code signalling a refused subscription.
pub const SUBACK_FAILURE: u8 = 0x80;

/// DUP bit in the PUBLISH fixed header.
const DUP_FLAG: u8 = 0x08;
/// RETAIN bit in the PUBLISH fixed header.
const RETAIN_FLAG: u8 = 0x01;

// CONNECT flags
const CLEAN_SESSION: u8 = 0x02;
const WILL_FLAG: u8 = 0x04;
const WILL_RETAIN: u8 = 0x20;
const PASSWORD_FLAG: u8 = 0x40;
const USERNAME_FLAG: u8 = 0x80;

/// Quality of Service levels for MQTT messages.
///
/// # Examples
///
/// ```rust
/// use cellmqtt::network::application::mqtt::QoS;
///
/// assert_eq!(QoS::AtMostOnce as u8, 0);
/// assert_eq!(QoS::try_from(2), Ok(QoS::ExactlyOnce));
/// assert!(QoS::try_from(3).is_err());
/// ```
#[derive(Debug, PartialEq, Eq, Clone, Copy, Deserialize)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[serde(try_from = "u8")]
pub enum QoS {
    /// **QoS 0**: fire and forget. No packet identifier, no acknowledgement.
    AtMostOnce = 0,
    /// **QoS 1**: acknowledged by PUBACK; duplicates are possible.
    AtLeastOnce = 1,
    /// **QoS 2**: four-way PUBREC/PUBREL/PUBCOMP handshake.
    ExactlyOnce = 2,
}

impl TryFrom<u8> for QoS {
    type Error = ProtocolError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(QoS::AtMostOnce),
            1 => Ok(QoS::AtLeastOnce),
            2 => Ok(QoS::ExactlyOnce),
            _ => Err(ProtocolError::InvalidQoS),
        }
    }
}

/// Control packet type, the high nibble of the first header byte.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum PacketType {
    Connect = 1,
    Connack = 2,
    Publish = 3,
    Puback = 4,
    Pubrec = 5,
    Pubrel = 6,
    Pubcomp = 7,
    Subscribe = 8,
    Suback = 9,
    Unsubscribe = 10,
    Unsuback = 11,
    Pingreq = 12,
    Pingresp = 13,
    Disconnect = 14,
}

impl TryFrom<u8> for PacketType {
    type Error = ProtocolError;

    /// Converts a whole first header byte; only the high nibble is inspected.
    fn try_from(byte: u8) -> Result<Self, Self::Error> {
        Ok(match byte >> 4 {
            1 => PacketType::Connect,
            2 => PacketType::Connack,
            3 => PacketType::Publish,
            4 => PacketType::Puback,
            5 => PacketType::Pubrec,
            6 => PacketType::Pubrel,
            7 => PacketType::Pubcomp,
            8 => PacketType::Subscribe,
            9 => PacketType::Suback,
            10 => PacketType::Unsubscribe,
            11 => PacketType::Unsuback,
            12 => PacketType::Pingreq,
            13 => PacketType::Pingresp,
            14 => PacketType::Disconnect,
            _ => return Err(ProtocolError::InvalidPacketType),
        })
    }
}

/// Last-will message registered with CONNECT.
#[derive(Debug, PartialEq, Eq, Clone, Copy, Deserialize)]
pub struct Will<'a> {
    /// Topic the broker publishes the will on.
    pub topic: &'a str,
    /// Will message body.
    pub message: &'a str,
    /// Will quality of service.
    #[serde(default = "default_will_qos")]
    pub qos: QoS,
    /// Whether the broker retains the will.
    #[serde(default)]
    pub retain: bool,
}

fn default_will_qos() -> QoS {
    QoS::AtMostOnce
}

/// CONNECT fields.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub struct Connect<'a> {
    pub client_id: &'a str,
    pub keep_alive: u16,
    pub clean_session: bool,
    pub username: Option<&'a str>,
    pub password: Option<&'a str>,
    pub will: Option<Will<'a>>,
}

/// PUBLISH fields.
///
/// `packet_id` is 0 for QoS 0, which never carries an identifier on the wire.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub struct Publish<'a> {
    pub topic: &'a str,
    pub payload: &'a [u8],
    pub qos: QoS,
    pub packet_id: u16,
    pub dup: bool,
    pub retain: bool,
}

/// A decoded or to-be-encoded control packet borrowing its strings.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum Packet<'a> {
    Connect(Connect<'a>),
    Connack { session_present: bool, code: u8 },
    Publish(Publish<'a>),
    Puback(u16),
    Pubrec(u16),
    Pubrel(u16),
    Pubcomp(u16),
    Subscribe { packet_id: u16, topic: &'a str, qos: QoS },
    Suback { packet_id: u16, code: u8 },
    Unsubscribe { packet_id: u16, topic: &'a str },
    Unsuback(u16),
    Pingreq,
    Pingresp,
    Disconnect,
}

/// Parsed fixed header of a frame that may still be incomplete.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub struct FrameHeader {
    /// Length of the fixed header, type byte included (2..=5).
    pub header_len: usize,
    /// Value of the remaining-length field.
    pub remaining_len: usize,
}

impl FrameHeader {
    /// Parse a fixed header through a byte accessor.
    ///
    /// `byte(i)` returns the `i`-th buffered byte or `None` past the end.
    /// Returns `Ok(None)` while the header itself is incomplete, so callers can
    /// wait for more data without consuming anything.
    pub fn parse(byte: impl Fn(usize) -> Option<u8>) -> Result<Option<Self>, ProtocolError> {
        let Some(first) = byte(0) else {
            return Ok(None);
        };
        PacketType::try_from(first)?;

        let mut remaining_len = 0usize;
        let mut multiplier = 1usize;
        for i in 1..=4 {
            let Some(encoded) = byte(i) else {
                return Ok(None);
            };
            remaining_len += (encoded & 0x7F) as usize * multiplier;
            if encoded & 0x80 == 0 {
                return Ok(Some(Self {
                    header_len: i + 1,
                    remaining_len,
                }));
            }
            multiplier *= 128;
        }
        Err(ProtocolError::MalformedRemainingLength)
    }

    /// Total frame length.
    pub fn frame_len(&self) -> usize {
        self.header_len + self.remaining_len
    }
}

/// Number of bytes the remaining-length field takes for `len`.
pub fn remaining_length_len(len: usize) -> usize {
    match len {
        0..=127 => 1,
        128..=16_383 => 2,
        16_384..=2_097_151 => 3,
        _ => 4,
    }
}

/// Encode the remaining length field for an MQTT packet.
///
/// Each byte carries seven bits of the value, least significant group first;
/// the high bit marks that another byte follows.
pub fn encode_remaining_length<B: BufMut>(buf: &mut B, mut len: usize) -> Result<(), Error> {
    if len > MAX_REMAINING_LENGTH {
        return Err(Error::PacketTooLarge);
    }
    loop {
        let mut byte = (len % 128) as u8;
        len /= 128;
        if len > 0 {
            byte |= 0x80;
        }
        buf.put_u8(byte)?;
        if len == 0 {
            return Ok(());
        }
    }
}

/// Set the DUP flag on an encoded PUBLISH frame. Other frames are untouched.
pub fn mark_duplicate(frame: &mut [u8]) {
    if let Some(first) = frame.first_mut() {
        if *first >> 4 == PacketType::Publish as u8 {
            *first |= DUP_FLAG;
        }
    }
}

fn str_len(s: &str) -> Result<usize, Error> {
    if s.len() > u16::MAX as usize {
        return Err(Error::InvalidArgument);
    }
    Ok(2 + s.len())
}

fn put_str<B: BufMut>(buf: &mut B, s: &str) -> Result<(), Error> {
    buf.put_u16(s.len() as u16)?;
    buf.put_slice(s.as_bytes())
}

impl<'a> Packet<'a> {
    /// The packet's type nibble.
    pub fn packet_type(&self) -> PacketType {
        match self {
            Packet::Connect(_) => PacketType::Connect,
            Packet::Connack { .. } => PacketType::Connack,
            Packet::Publish(_) => PacketType::Publish,
            Packet::Puback(_) => PacketType::Puback,
            Packet::Pubrec(_) => PacketType::Pubrec,
            Packet::Pubrel(_) => PacketType::Pubrel,
            Packet::Pubcomp(_) => PacketType::Pubcomp,
            Packet::Subscribe { .. } => PacketType::Subscribe,
            Packet::Suback { .. } => PacketType::Suback,
            Packet::Unsubscribe { .. } => PacketType::Unsubscribe,
            Packet::Unsuback(_) => PacketType::Unsuback,
            Packet::Pingreq => PacketType::Pingreq,
            Packet::Pingresp => PacketType::Pingresp,
            Packet::Disconnect => PacketType::Disconnect,
        }
    }

    fn flags(&self) -> u8 {
        match self {
            Packet::Publish(p) => {
                let mut flags = (p.qos as u8) << 1;
                if p.dup {
                    flags |= DUP_FLAG;
                }
                if p.retain {
                    flags |= RETAIN_FLAG;
                }
                flags
            }
            Packet::Pubrel(_) | Packet::Subscribe { .. } | Packet::Unsubscribe { .. } => 0x02,
            _ => 0,
        }
    }

    /// Length of variable header plus payload, validating string sizes.
    fn remaining_len(&self) -> Result<usize, Error> {
        Ok(match self {
            Packet::Connect(c) => {
                let mut len = str_len(PROTOCOL_NAME)? + 1 + 1 + 2 + str_len(c.client_id)?;
                if let Some(will) = &c.will {
                    len += str_len(will.topic)? + str_len(will.message)?;
                }
                if let Some(user) = c.username {
                    len += str_len(user)?;
                }
                if let Some(pass) = c.password {
                    len += str_len(pass)?;
                }
                len
            }
            Packet::Connack { .. } => 2,
            Packet::Publish(p) => {
                let id_len = if p.qos == QoS::AtMostOnce { 0 } else { 2 };
                str_len(p.topic)? + id_len + p.payload.len()
            }
            Packet::Puback(_) | Packet::Pubrec(_) | Packet::Pubrel(_) | Packet::Pubcomp(_) => 2,
            Packet::Subscribe { topic, .. } => 2 + str_len(topic)? + 1,
            Packet::Suback { .. } => 3,
            Packet::Unsubscribe { topic, .. } => 2 + str_len(topic)?,
            Packet::Unsuback(_) => 2,
            Packet::Pingreq | Packet::Pingresp | Packet::Disconnect => 0,
        })
    }

    /// Full encoded size of the frame.
    pub fn encoded_len(&self) -> Result<usize, Error> {
        let remaining = self.remaining_len()?;
        if remaining > MAX_REMAINING_LENGTH {
            return Err(Error::PacketTooLarge);
        }
        Ok(1 + remaining_length_len(remaining) + remaining)
    }

    /// Encode the frame into `buf` and return its length.
    ///
    /// Nothing is written unless the whole frame fits.
    pub fn encode<B: BufMut>(&self, buf: &mut B) -> Result<usize, Error> {
        let total = self.encoded_len()?;
        if total > buf.remaining_mut() {
            return Err(Error::PacketTooLarge);
        }
        let remaining = self.remaining_len()?;

        buf.put_u8(((self.packet_type() as u8) << 4) | self.flags())?;
        encode_remaining_length(buf, remaining)?;

        match self {
            Packet::Connect(c) => {
                put_str(buf, PROTOCOL_NAME)?;
                buf.put_u8(PROTOCOL_LEVEL)?;

                let mut flags = 0;
                if c.clean_session {
                    flags |= CLEAN_SESSION;
                }
                if let Some(will) = &c.will {
                    flags |= WILL_FLAG | ((will.qos as u8) << 3);
                    if will.retain {
                        flags |= WILL_RETAIN;
                    }
                }
                if c.username.is_some() {
                    flags |= USERNAME_FLAG;
                }
                if c.password.is_some() {
                    flags |= PASSWORD_FLAG;
                }
                buf.put_u8(flags)?;
                buf.put_u16(c.keep_alive)?;

                put_str(buf, c.client_id)?;
                if let Some(will) = &c.will {
                    put_str(buf, will.topic)?;
                    put_str(buf, will.message)?;
                }
                if let Some(user) = c.username {
                    put_str(buf, user)?;
                }
                if let Some(pass) = c.password {
                    put_str(buf, pass)?;
                }
            }
            Packet::Connack {
                session_present,
                code,
            } => {
                buf.put_u8(*session_present as u8)?;
                buf.put_u8(*code)?;
            }
            Packet::Publish(p) => {
                put_str(buf, p.topic)?;
                if p.qos != QoS::AtMostOnce {
                    buf.put_u16(p.packet_id)?;
                }
                buf.put_slice(p.payload)?;
            }
            Packet::Puback(id)
            | Packet::Pubrec(id)
            | Packet::Pubrel(id)
            | Packet::Pubcomp(id)
            | Packet::Unsuback(id) => buf.put_u16(*id)?,
            Packet::Subscribe {
                packet_id,
                topic,
                qos,
            } => {
                buf.put_u16(*packet_id)?;
                put_str(buf, topic)?;
                buf.put_u8(*qos as u8)?;
            }
            Packet::Suback { packet_id, code } => {
                buf.put_u16(*packet_id)?;
                buf.put_u8(*code)?;
            }
            Packet::Unsubscribe { packet_id, topic } => {
                buf.put_u16(*packet_id)?;
                put_str(buf, topic)?;
            }
            Packet::Pingreq | Packet::Pingresp | Packet::Disconnect => {}
        }
        Ok(total)
    }

    /// Decode one complete frame.
    ///
    /// `frame` must hold exactly the bytes described by its fixed header.
    pub fn decode(frame: &'a [u8]) -> Result<Self, ProtocolError> {
        let header = FrameHeader::parse(|i| frame.get(i).copied())?
            .ok_or(ProtocolError::MalformedPacket)?;
        if header.frame_len() != frame.len() {
            return Err(ProtocolError::MalformedPacket);
        }

        let first = frame[0];
        let flags = first & 0x0F;
        let kind = PacketType::try_from(first)?;
        let expected_flags = match kind {
            PacketType::Publish => flags,
            PacketType::Pubrel | PacketType::Subscribe | PacketType::Unsubscribe => 0x02,
            _ => 0,
        };
        if flags != expected_flags {
            return Err(ProtocolError::InvalidFlags);
        }

        let mut r = Reader::new(&frame[header.header_len..]);
        let packet = match kind {
            PacketType::Connect => Packet::Connect(decode_connect(&mut r)?),
            PacketType::Connack => {
                let ack_flags = r.u8()?;
                if ack_flags & !0x01 != 0 {
                    return Err(ProtocolError::MalformedPacket);
                }
                Packet::Connack {
                    session_present: ack_flags & 0x01 != 0,
                    code: r.u8()?,
                }
            }
            PacketType::Publish => {
                let qos = QoS::try_from((flags >> 1) & 0x03)?;
                let dup = flags & DUP_FLAG != 0;
                if qos == QoS::AtMostOnce && dup {
                    return Err(ProtocolError::InvalidFlags);
                }
                let topic = r.str()?;
                let packet_id = if qos == QoS::AtMostOnce {
                    0
                } else {
                    let id = r.u16()?;
                    if id == 0 {
                        return Err(ProtocolError::MalformedPacket);
                    }
                    id
                };
                Packet::Publish(Publish {
                    topic,
                    payload: r.rest(),
                    qos,
                    packet_id,
                    dup,
                    retain: flags & RETAIN_FLAG != 0,
                })
            }
            PacketType::Puback => Packet::Puback(r.u16()?),
            PacketType::Pubrec => Packet::Pubrec(r.u16()?),
            PacketType::Pubrel => Packet::Pubrel(r.u16()?),
            PacketType::Pubcomp => Packet::Pubcomp(r.u16()?),
            PacketType::Subscribe => {
                let packet_id = r.u16()?;
                let topic = r.str()?;
                let qos = QoS::try_from(r.u8()?)?;
                Packet::Subscribe {
                    packet_id,
                    topic,
                    qos,
                }
            }
            PacketType::Suback => {
                let packet_id = r.u16()?;
                let code = r.u8()?;
                if code > 2 && code != SUBACK_FAILURE {
                    return Err(ProtocolError::MalformedPacket);
                }
                Packet::Suback { packet_id, code }
            }
            PacketType::Unsubscribe => Packet::Unsubscribe {
                packet_id: r.u16()?,
                topic: r.str()?,
            },
            PacketType::Unsuback => Packet::Unsuback(r.u16()?),
            PacketType::Pingreq => Packet::Pingreq,
            PacketType::Pingresp => Packet::Pingresp,
            PacketType::Disconnect => Packet::Disconnect,
        };
        r.finish()?;
        Ok(packet)
    }
}

/// Try to decode the first frame of a contiguous buffer.
///
/// Returns `Ok(None)` without touching anything when `buf` does not yet hold a
/// whole frame, otherwise the packet and the number of bytes it occupied.
pub fn try_decode(buf: &[u8]) -> Result<Option<(Packet<'_>, usize)>, ProtocolError> {
    let Some(header) = FrameHeader::parse(|i| buf.get(i).copied())? else {
        return Ok(None);
    };
    let len = header.frame_len();
    if buf.len() < len {
        return Ok(None);
    }
    Packet::decode(&buf[..len]).map(|packet| Some((packet, len)))
}

fn decode_connect<'a>(r: &mut Reader<'a>) -> Result<Connect<'a>, ProtocolError> {
    if r.str()? != PROTOCOL_NAME || r.u8()? != PROTOCOL_LEVEL {
        return Err(ProtocolError::MalformedPacket);
    }
    let flags = r.u8()?;
    if flags & 0x01 != 0 {
        return Err(ProtocolError::InvalidFlags);
    }
    let keep_alive = r.u16()?;
    let client_id = r.str()?;

    let will = if flags & WILL_FLAG != 0 {
        Some(Will {
            topic: r.str()?,
            message: r.str()?,
            qos: QoS::try_from((flags >> 3) & 0x03)?,
            retain: flags & WILL_RETAIN != 0,
        })
    } else {
        None
    };
    let username = if flags & USERNAME_FLAG != 0 {
        Some(r.str()?)
    } else {
        None
    };
    let password = if flags & PASSWORD_FLAG != 0 {
        Some(r.str()?)
    } else {
        None
    };

    Ok(Connect {
        client_id,
        keep_alive,
        clean_session: flags & CLEAN_SESSION != 0,
        username,
        password,
        will,
    })
}

/// Cursor over a frame body.
struct Reader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8], ProtocolError> {
        let end = self
            .pos
            .checked_add(n)
            .filter(|&end| end <= self.buf.len())
            .ok_or(ProtocolError::MalformedPacket)?;
        let bytes = &self.buf[self.pos..end];
        self.pos = end;
        Ok(bytes)
    }

    fn u8(&mut self) -> Result<u8, ProtocolError> {
        Ok(self.take(1)?[0])
    }

    fn u16(&mut self) -> Result<u16, ProtocolError> {
        let bytes = self.take(2)?;
        Ok(u16::from_be_bytes([bytes[0], bytes[1]]))
    }

    fn str(&mut self) -> Result<&'a str, ProtocolError> {
        let len = self.u16()? as usize;
        core::str::from_utf8(self.take(len)?).map_err(|_| ProtocolError::InvalidUtf8)
    }

    fn rest(&mut self) -> &'a [u8] {
        let bytes = &self.buf[self.pos..];
        self.pos = self.buf.len();
        bytes
    }

    fn finish(&self) -> Result<(), ProtocolError> {
        if self.pos == self.buf.len() {
            Ok(())
        } else {
            Err(ProtocolError::MalformedPacket)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use heapless::Vec;

    fn encode(packet: &Packet<'_>) -> Vec<u8, 512> {
        let mut buf = Vec::new();
        packet.encode(&mut buf).unwrap();
        buf
    }

    #[test]
    fn test_every_packet_kind_survives_encode_decode() {
        let packets = [
            Packet::Connect(Connect {
                client_id: "sensor-01",
                keep_alive: 60,
                clean_session: true,
                username: Some("user"),
                password: Some("secret"),
                will: Some(Will {
                    topic: "status/sensor-01",
                    message: "offline",
                    qos: QoS::AtLeastOnce,
                    retain: true,
                }),
            }),
            Packet::Connack {
                session_present: false,
                code: 5,
            },
            Packet::Publish(Publish {
                topic: "topic/a",
                payload: b"23.5",
                qos: QoS::ExactlyOnce,
                packet_id: 7,
                dup: true,
                retain: false,
            }),
            Packet::Publish(Publish {
                topic: "topic/a",
                payload: b"",
                qos: QoS::AtMostOnce,
                packet_id: 0,
                dup: false,
                retain: true,
            }),
            Packet::Puback(1),
            Packet::Pubrec(2),
            Packet::Pubrel(3),
            Packet::Pubcomp(4),
            Packet::Subscribe {
                packet_id: 5,
                topic: "commands/+",
                qos: QoS::AtLeastOnce,
            },
            Packet::Suback {
                packet_id: 5,
                code: SUBACK_FAILURE,
            },
            Packet::Unsubscribe {
                packet_id: 6,
                topic: "commands/+",
            },
            Packet::Unsuback(6),
            Packet::Pingreq,
            Packet::Pingresp,
            Packet::Disconnect,
        ];

        for packet in &packets {
            let bytes = encode(packet);
            assert_eq!(bytes.len(), packet.encoded_len().unwrap());
            assert_eq!(Packet::decode(&bytes), Ok(*packet));
        }
    }

    #[test]
    fn test_connect_wire_format() {
        let packet = Packet::Connect(Connect {
            client_id: "id",
            keep_alive: 10,
            clean_session: true,
            username: None,
            password: None,
            will: None,
        });
        let bytes = encode(&packet);
        assert_eq!(
            &bytes[..],
            &[
                0x10, 14, 0, 4, b'M', b'Q', b'T', b'T', 4, 0x02, 0, 10, 0, 2, b'i', b'd'
            ]
        );
    }

    #[test]
    fn test_remaining_length_boundaries() {
        let cases: [(usize, &[u8]); 6] = [
            (0, &[0x00]),
            (127, &[0x7F]),
            (128, &[0x80, 0x01]),
            (16_383, &[0xFF, 0x7F]),
            (16_384, &[0x80, 0x80, 0x01]),
            (MAX_REMAINING_LENGTH, &[0xFF, 0xFF, 0xFF, 0x7F]),
        ];
        for (len, expected) in cases {
            let mut buf: Vec<u8, 4> = Vec::new();
            encode_remaining_length(&mut buf, len).unwrap();
            assert_eq!(&buf[..], expected);
            assert_eq!(remaining_length_len(len), expected.len());

            let mut frame: Vec<u8, 5> = Vec::new();
            frame.push(0x30).unwrap();
            frame.extend_from_slice(expected).unwrap();
            let header = FrameHeader::parse(|i| frame.get(i).copied()).unwrap().unwrap();
            assert_eq!(header.remaining_len, len);
            assert_eq!(header.header_len, 1 + expected.len());
        }

        let mut buf: Vec<u8, 8> = Vec::new();
        assert_eq!(
            encode_remaining_length(&mut buf, MAX_REMAINING_LENGTH + 1),
            Err(Error::PacketTooLarge)
        );
    }

    #[test]
    fn test_header_rejects_bad_type_and_long_length() {
        assert_eq!(
            FrameHeader::parse(|i| [0x00u8, 0x00].get(i).copied()),
            Err(ProtocolError::InvalidPacketType)
        );
        assert_eq!(
            FrameHeader::parse(|i| [0xF0u8].get(i).copied()),
            Err(ProtocolError::InvalidPacketType)
        );
        assert_eq!(
            FrameHeader::parse(|i| [0x30u8, 0x80, 0x80, 0x80, 0x80].get(i).copied()),
            Err(ProtocolError::MalformedRemainingLength)
        );
    }

    #[test]
    fn test_incomplete_frame_needs_more_data() {
        let bytes = encode(&Packet::Suback {
            packet_id: 9,
            code: 1,
        });
        for cut in 0..bytes.len() {
            assert_eq!(try_decode(&bytes[..cut]), Ok(None));
        }
        assert_eq!(
            try_decode(&bytes),
            Ok(Some((
                Packet::Suback {
                    packet_id: 9,
                    code: 1
                },
                bytes.len()
            )))
        );
    }

    #[test]
    fn test_decode_rejects_reserved_flags_and_trailing_bytes() {
        // PUBREL without the mandatory 0b0010 flags
        assert_eq!(
            Packet::decode(&[0x60, 0x02, 0x00, 0x01]),
            Err(ProtocolError::InvalidFlags)
        );
        // PUBACK with one byte too many
        assert_eq!(
            Packet::decode(&[0x40, 0x03, 0x00, 0x01, 0x00]),
            Err(ProtocolError::MalformedPacket)
        );
        // PUBLISH with QoS 3
        assert_eq!(
            Packet::decode(&[0x36, 0x03, 0x00, 0x01, b'a']),
            Err(ProtocolError::InvalidQoS)
        );
        // Topic that is not UTF-8
        assert_eq!(
            Packet::decode(&[0x30, 0x03, 0x00, 0x01, 0xFF]),
            Err(ProtocolError::InvalidUtf8)
        );
    }

    #[test]
    fn test_encode_refuses_without_writing_when_short_of_space() {
        let packet = Packet::Subscribe {
            packet_id: 1,
            topic: "topic/b",
            qos: QoS::ExactlyOnce,
        };
        let mut small: Vec<u8, 8> = Vec::new();
        assert_eq!(packet.encode(&mut small), Err(Error::PacketTooLarge));
        assert!(small.is_empty());
    }

    #[test]
    fn test_mark_duplicate_only_touches_publish() {
        let mut publish = [0x32u8, 0x05, 0, 1, b'a', 0, 1];
        mark_duplicate(&mut publish);
        assert_eq!(publish[0], 0x3A);

        let mut subscribe = [0x82u8, 0x00];
        mark_duplicate(&mut subscribe);
        assert_eq!(subscribe[0], 0x82);
    }
}
