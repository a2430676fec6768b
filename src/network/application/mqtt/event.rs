//! Events delivered to the user callback.

use super::error::{Error, ProtocolError};
use super::packet::QoS;

/// Outcome of a connection attempt.
///
/// The first six values mirror the MQTT 3.1.1 CONNACK return codes.
/// [`ConnectStatus::TcpFailed`] covers everything that fails before a CONNACK
/// can arrive: the socket did not open, dropped during the handshake, or the
/// CONNACK did not come in time.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ConnectStatus {
    /// Connection accepted and ready to use.
    Accepted = 0x00,
    /// Unacceptable protocol version.
    RefusedProtocolVersion = 0x01,
    /// Client identifier rejected.
    RefusedId = 0x02,
    /// Server unavailable.
    RefusedServer = 0x03,
    /// Bad user name or password.
    RefusedUserPass = 0x04,
    /// Not authorized.
    RefusedNotAuthorized = 0x05,
    /// Transport-level failure or timeout.
    TcpFailed = 0x100,
}

impl TryFrom<u8> for ConnectStatus {
    type Error = ProtocolError;

    fn try_from(code: u8) -> Result<Self, Self::Error> {
        Ok(match code {
            0x00 => ConnectStatus::Accepted,
            0x01 => ConnectStatus::RefusedProtocolVersion,
            0x02 => ConnectStatus::RefusedId,
            0x03 => ConnectStatus::RefusedServer,
            0x04 => ConnectStatus::RefusedUserPass,
            0x05 => ConnectStatus::RefusedNotAuthorized,
            _ => return Err(ProtocolError::InvalidConnackCode),
        })
    }
}

/// A PUBLISH received from the broker.
///
/// Topic and payload borrow the engine's receive scratch space and are only
/// valid for the duration of the callback; copy them out to keep them.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub struct Message<'a> {
    /// Topic the message was published on.
    pub topic: &'a str,
    /// Message body.
    pub payload: &'a [u8],
    /// Quality of service the broker delivered it with.
    pub qos: QoS,
    /// Broker marked the frame as a retransmission.
    pub dup: bool,
    /// Message came from the broker's retained store.
    pub retain: bool,
}

/// Everything the client reports to the application.
///
/// Each logical occurrence is reported exactly once.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum Event<'a> {
    /// Connection attempt finished.
    Connect {
        /// Broker verdict or transport failure.
        status: ConnectStatus,
    },
    /// Connection is down.
    Disconnect {
        /// The broker had accepted the client before the connection ended.
        is_accepted: bool,
    },
    /// SUBSCRIBE finished; on success carries the granted QoS.
    Subscribe {
        /// Argument passed to [`subscribe`](super::Client::subscribe).
        arg: usize,
        /// Granted QoS, or why the subscription failed.
        result: Result<QoS, Error>,
    },
    /// UNSUBSCRIBE finished.
    Unsubscribe {
        /// Argument passed to [`unsubscribe`](super::Client::unsubscribe).
        arg: usize,
        /// Whether the broker acknowledged it.
        result: Result<(), Error>,
    },
    /// QoS 1 or 2 PUBLISH finished. Never raised for QoS 0.
    Publish {
        /// Argument passed to [`publish`](super::Client::publish).
        arg: usize,
        /// Whether the handshake completed.
        result: Result<(), Error>,
    },
    /// Broker delivered a message on a subscribed topic.
    PublishRecv(Message<'a>),
    /// PINGREQ answered by PINGRESP.
    KeepAlive,
}

/// Event callback.
///
/// Receives the client's user argument (see
/// [`Client::arg`](super::Client::arg)) and the event.
///
/// # Examples
///
/// ```rust
/// use cellmqtt::network::application::mqtt::{Event, EventFn};
///
/// #[derive(Default)]
/// struct App {
///     received: usize,
/// }
///
/// let on_event: EventFn<App> = |app, event| {
///     if let Event::PublishRecv(_) = event {
///         app.received += 1;
///     }
/// };
/// # let _ = on_event;
/// ```
pub type EventFn<A> = fn(&mut A, &Event<'_>);
