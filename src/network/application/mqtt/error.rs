//! Error types for the MQTT engine.

/// Errors returned by the MQTT client and carried inside its events.
///
/// The first group is returned synchronously by user calls and never enqueues
/// any bytes. The second group describes how an in-flight request ended and is
/// delivered through [`Event`](super::Event) results.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum Error {
    /// The operation is not permitted in the current connection state.
    InvalidState,
    /// The request table or the TX buffer has no room right now; retry after
    /// acknowledgements free some space.
    Busy,
    /// An argument is unusable (empty topic, empty client id, password
    /// without user name, ...).
    InvalidArgument,
    /// The encoded packet can never fit into the TX buffer.
    PacketTooLarge,
    /// The peer sent bytes that violate MQTT framing.
    Protocol(ProtocolError),
    /// The transport rejected an open, write or close.
    Transport,
    /// No acknowledgement arrived after every permitted retransmission.
    Timeout,
    /// The broker refused the request (SUBACK failure return code).
    Refused,
    /// The request was released because the connection went down.
    Disconnected,
    /// Configuration could not be parsed.
    Config,
}

/// Malformed input detected while decoding a frame.
///
/// Every protocol error is fatal to the connection: once framing is lost the
/// byte stream cannot be resynchronised.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ProtocolError {
    /// The packet type nibble is 0 or 15.
    InvalidPacketType,
    /// Reserved fixed-header flags have the wrong value.
    InvalidFlags,
    /// The remaining length uses more than four bytes.
    MalformedRemainingLength,
    /// The frame is larger than the RX buffer can ever hold.
    FrameTooLarge,
    /// The variable header or payload is inconsistent with the remaining length.
    MalformedPacket,
    /// A topic or string field is not valid UTF-8.
    InvalidUtf8,
    /// The QoS bits hold the reserved value 3.
    InvalidQoS,
    /// The packet is valid MQTT but not expected from a broker in this state.
    UnexpectedPacket,
    /// The CONNACK return code is outside 0..=5.
    InvalidConnackCode,
}

impl core::fmt::Display for ProtocolError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let msg = match self {
            ProtocolError::InvalidPacketType => "invalid packet type",
            ProtocolError::InvalidFlags => "invalid fixed header flags",
            ProtocolError::MalformedRemainingLength => "malformed remaining length",
            ProtocolError::FrameTooLarge => "frame exceeds receive buffer",
            ProtocolError::MalformedPacket => "malformed packet",
            ProtocolError::InvalidUtf8 => "string is not UTF-8",
            ProtocolError::InvalidQoS => "invalid QoS level",
            ProtocolError::UnexpectedPacket => "unexpected packet",
            ProtocolError::InvalidConnackCode => "invalid CONNACK return code",
        };
        f.write_str(msg)
    }
}

impl From<ProtocolError> for Error {
    fn from(e: ProtocolError) -> Self {
        Error::Protocol(e)
    }
}

#[cfg(feature = "defmt")]
impl defmt::Format for Error {
    fn format(&self, f: defmt::Formatter) {
        match self {
            Error::InvalidState => defmt::write!(f, "InvalidState"),
            Error::Busy => defmt::write!(f, "Busy"),
            Error::InvalidArgument => defmt::write!(f, "InvalidArgument"),
            Error::PacketTooLarge => defmt::write!(f, "PacketTooLarge"),
            Error::Protocol(e) => defmt::write!(f, "Protocol({})", e),
            Error::Transport => defmt::write!(f, "Transport"),
            Error::Timeout => defmt::write!(f, "Timeout"),
            Error::Refused => defmt::write!(f, "Refused"),
            Error::Disconnected => defmt::write!(f, "Disconnected"),
            Error::Config => defmt::write!(f, "Config"),
        }
    }
}
