//! An MQTT 3.1.1 client engine driven by transport notifications.
//!
//! The client never blocks and never reads from the socket itself. The
//! integrator wires it to the modem driver:
//!
//! - user code calls [`Client::connect`], [`Client::subscribe`],
//!   [`Client::publish`], ...;
//! - the modem driver reports [`Client::on_transport_connected`],
//!   [`Client::on_transport_failed`], [`Client::receive`] and
//!   [`Client::on_transport_closed`];
//! - a periodic timer calls [`Client::poll`], which retries partial writes,
//!   drives keep-alive and expires unacknowledged requests.
//!
//! Everything the broker answers comes back through a single [`EventFn`]
//! callback.

use super::buffer::{BufMut, RingBuffer};
use super::config::{ClientInfo, Config};
use super::error::{Error, ProtocolError};
use super::event::{ConnectStatus, Event, EventFn, Message};
use super::packet::{self, FrameHeader, Packet, Publish, QoS, SUBACK_FAILURE};
use super::request::{Request, RequestKind, RequestTable, RetryState};
use crate::network::{Clock, Transport};
use heapless::Vec;

/// Connection state of the client.
///
/// ```text
/// Disconnected ──connect()──▶ ConnectingTransport ──socket open──▶ ConnectingMqtt
///      ▲                                                               │ CONNACK accepted
///      │                                                               ▼
///      └──────────── socket closed ◀── Disconnecting ◀──disconnect()── Connected
/// ```
///
/// Any transport failure moves straight to `Disconnected`.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum State {
    /// No connection and no attempt in progress.
    Disconnected,
    /// Waiting for the transport to open the socket.
    ConnectingTransport,
    /// CONNECT sent, CONNACK pending.
    ConnectingMqtt,
    /// Broker accepted the client.
    Connected,
    /// Closing the socket after a disconnect request.
    Disconnecting,
}

/// Final event of a teardown.
#[derive(Debug, Clone, Copy)]
enum Notify {
    Connect(ConnectStatus),
    Disconnect,
}

/// Holds the callback and the user argument it receives.
struct Dispatcher<A> {
    callback: Option<EventFn<A>>,
    arg: A,
}

impl<A> Dispatcher<A> {
    fn emit(&mut self, event: &Event<'_>) {
        if let Some(callback) = self.callback {
            callback(&mut self.arg, event);
        }
    }
}

/// Terminal failure event for a request of `kind`.
fn request_failed(kind: RequestKind, arg: usize, error: Error) -> Event<'static> {
    match kind {
        RequestKind::Subscribe => Event::Subscribe {
            arg,
            result: Err(error),
        },
        RequestKind::Unsubscribe => Event::Unsubscribe {
            arg,
            result: Err(error),
        },
        RequestKind::Publish(_) => Event::Publish {
            arg,
            result: Err(error),
        },
    }
}

fn valid_topic_name(topic: &str) -> bool {
    !topic.is_empty() && !topic.contains(['+', '#'])
}

/// An MQTT 3.1.1 client over a chunked, non-blocking transport.
///
/// # Type Parameters
///
/// * `T` - The transport, usually a modem socket
/// * `K` - Millisecond clock
/// * `A` - User argument handed to the event callback
/// * `TX` - TX ring capacity in bytes; also the largest frame the client can send
/// * `RX` - RX ring capacity in bytes; also the largest frame the client can receive
/// * `REQS` - In-flight request slots, and remembered inbound QoS 2 identifiers
///
/// Each request slot keeps a copy of its frame for retransmission, so the
/// table costs roughly `REQS × TX` bytes.
///
/// At most `REQS` inbound QoS 2 messages can sit between PUBLISH and PUBREL.
/// A further QoS 2 PUBLISH is neither acknowledged nor delivered. MQTT 3.1.1
/// brokers only have to resend it when the client reconnects with
/// `clean_session` cleared, so with a clean session that message can be
/// lost. Size `REQS` for the broker's inbound QoS 2 window.
///
/// # Examples
///
/// ```rust
/// use cellmqtt::network::application::mqtt::{Client, ClientInfo, Event, QoS, State};
/// use cellmqtt::network::{Open, Shutdown, Write};
///
/// struct Modem;
/// impl Open for Modem {
///     type Error = ();
///     fn open(&mut self, _host: &str, _port: u16) -> Result<(), ()> { Ok(()) }
/// }
/// impl Write for Modem {
///     type Error = ();
///     fn write(&mut self, buf: &[u8]) -> Result<usize, ()> { Ok(buf.len()) }
///     fn flush(&mut self) -> Result<(), ()> { Ok(()) }
/// }
/// impl Shutdown for Modem {
///     type Error = ();
///     fn shutdown(&mut self) -> Result<(), ()> { Ok(()) }
/// }
///
/// #[derive(Default)]
/// struct App {
///     connected: bool,
/// }
///
/// let mut client: Client<_, _, App, 256, 256> = Client::new(Modem, || 0u32, App::default());
/// let info = ClientInfo::new("sensor-01").keep_alive(60);
///
/// client
///     .connect("broker.example.com", 1883, &info, |app, event| {
///         if let Event::Connect { status } = event {
///             app.connected = *status == cellmqtt::network::application::mqtt::ConnectStatus::Accepted;
///         }
///     })
///     .unwrap();
/// assert_eq!(client.state(), State::ConnectingTransport);
///
/// // The modem driver reports the socket is open, then hands over CONNACK.
/// client.on_transport_connected();
/// client.receive(&[0x20, 0x02, 0x00, 0x00]).unwrap();
/// assert!(client.arg().connected);
///
/// client.publish("sensors/temperature", b"23.5", QoS::AtMostOnce, false, 0).unwrap();
/// ```
pub struct Client<T, K, A, const TX: usize, const RX: usize, const REQS: usize = 8>
where
    T: Transport,
    K: Clock,
{
    transport: T,
    clock: K,
    config: Config,
    state: State,
    state_since: u32,
    is_accepted: bool,
    closing: bool,
    keep_alive_ms: u32,
    last_tx: u32,
    ping_sent: Option<u32>,
    tx: RingBuffer<TX>,
    rx: RingBuffer<RX>,
    requests: RequestTable<REQS, TX>,
    // QoS 2 packet ids delivered to the user and awaiting PUBREL
    inbound: Vec<u16, REQS>,
    events: Dispatcher<A>,
}

impl<T, K, A, const TX: usize, const RX: usize, const REQS: usize> core::fmt::Debug
    for Client<T, K, A, TX, RX, REQS>
where
    T: Transport,
    K: Clock,
{
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Client")
            .field("state", &self.state)
            .field("is_accepted", &self.is_accepted)
            .field("tx_pending", &self.tx.len())
            .field("rx_pending", &self.rx.len())
            .field("requests", &self.requests.len())
            .finish_non_exhaustive()
    }
}

impl<T, K, A, const TX: usize, const RX: usize, const REQS: usize> Client<T, K, A, TX, RX, REQS>
where
    T: Transport,
    K: Clock,
{
    /// Create a disconnected client with the default [`Config`].
    pub fn new(transport: T, clock: K, arg: A) -> Self {
        Self::with_config(transport, clock, Config::default(), arg)
    }

    /// Create a disconnected client with explicit timing and retry policy.
    pub fn with_config(transport: T, clock: K, config: Config, arg: A) -> Self {
        const {
            assert!(RX >= 5, "RX buffer must hold at least a full fixed header");
            assert!(REQS > 0, "request table needs at least one slot");
        };
        Self {
            transport,
            clock,
            config,
            state: State::Disconnected,
            state_since: 0,
            is_accepted: false,
            closing: false,
            keep_alive_ms: 0,
            last_tx: 0,
            ping_sent: None,
            tx: RingBuffer::new(),
            rx: RingBuffer::new(),
            requests: RequestTable::new(),
            inbound: Vec::new(),
            events: Dispatcher {
                callback: None,
                arg,
            },
        }
    }

    /// Current connection state.
    pub fn state(&self) -> State {
        self.state
    }

    /// Returns `true` once the broker has accepted the client and until the
    /// connection starts closing.
    pub fn is_connected(&self) -> bool {
        self.state == State::Connected
    }

    /// Engine configuration.
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// User argument passed to every callback invocation.
    pub fn arg(&self) -> &A {
        &self.events.arg
    }

    /// Mutable access to the user argument.
    pub fn arg_mut(&mut self) -> &mut A {
        &mut self.events.arg
    }

    /// Replace the user argument, returning the previous one.
    ///
    /// The argument is independent of the connection and survives reconnects.
    pub fn set_arg(&mut self, arg: A) -> A {
        core::mem::replace(&mut self.events.arg, arg)
    }

    /// The underlying transport.
    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Mutable access to the underlying transport.
    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    /// Number of requests waiting for an acknowledgement.
    pub fn pending_requests(&self) -> usize {
        self.requests.len()
    }

    /// Take the client apart, returning transport and user argument.
    ///
    /// Only possible while disconnected; otherwise the client is handed back.
    pub fn into_parts(self) -> Result<(T, A), Self> {
        if self.state != State::Disconnected {
            return Err(self);
        }
        Ok((self.transport, self.events.arg))
    }

    /// Start connecting to an MQTT broker.
    ///
    /// The CONNECT packet is encoded immediately and sent as soon as the
    /// transport reports the socket open via
    /// [`on_transport_connected`](Self::on_transport_connected). The outcome
    /// arrives as an [`Event::Connect`].
    ///
    /// # Arguments
    ///
    /// * `host` - Broker host name or address
    /// * `port` - Broker port
    /// * `info` - Client identity; only borrowed for the duration of the call
    /// * `callback` - Receives every event of this connection
    ///
    /// # Errors
    ///
    /// * [`Error::InvalidState`] - The client is not disconnected
    /// * [`Error::InvalidArgument`] - `info` violates a CONNECT rule
    /// * [`Error::PacketTooLarge`] - CONNECT does not fit the TX buffer
    /// * [`Error::Transport`] - The transport refused to start opening
    pub fn connect(
        &mut self,
        host: &str,
        port: u16,
        info: &ClientInfo<'_>,
        callback: EventFn<A>,
    ) -> Result<(), Error> {
        if self.state != State::Disconnected {
            return Err(Error::InvalidState);
        }
        info.validate()?;

        self.tx.clear();
        self.rx.clear();
        self.queue(&Packet::Connect(info.to_connect()))?;

        if self.transport.open(host, port).is_err() {
            self.tx.clear();
            return Err(Error::Transport);
        }

        info!("connecting to {}:{}", host, port);
        self.events.callback = Some(callback);
        self.keep_alive_ms = u32::from(info.keep_alive) * 1000;
        self.is_accepted = false;
        self.closing = false;
        self.ping_sent = None;
        self.set_state(State::ConnectingTransport);
        Ok(())
    }

    /// Close the connection.
    ///
    /// Sends DISCONNECT when the broker had accepted the client, then closes
    /// the transport. Every in-flight request is reported as
    /// [`Error::Disconnected`], followed by one [`Event::Disconnect`] once the
    /// transport confirms the close.
    ///
    /// # Errors
    ///
    /// * [`Error::InvalidState`] - The client is already disconnected
    pub fn disconnect(&mut self) -> Result<(), Error> {
        match self.state {
            State::Disconnected => return Err(Error::InvalidState),
            State::Disconnecting => return Ok(()),
            State::Connected => {
                if self.queue(&Packet::Disconnect).is_err() {
                    warn!("no room for DISCONNECT, closing without it");
                }
                self.set_state(State::Disconnecting);
                self.flush_or_teardown();
            }
            State::ConnectingTransport | State::ConnectingMqtt => {
                self.tx.clear();
                self.set_state(State::Disconnecting);
            }
        }
        if self.state == State::Disconnecting && self.tx.is_empty() {
            self.close_transport();
        }
        Ok(())
    }

    /// Subscribe to a topic filter.
    ///
    /// Completion is reported as [`Event::Subscribe`] carrying `arg` and the
    /// granted QoS, or [`Error::Refused`] if the broker rejected the filter.
    ///
    /// # Errors
    ///
    /// * [`Error::InvalidState`] - Not connected
    /// * [`Error::InvalidArgument`] - Empty topic filter
    /// * [`Error::Busy`] - No free request slot or TX space; retry later
    /// * [`Error::PacketTooLarge`] - SUBSCRIBE can never fit the TX buffer
    pub fn subscribe(&mut self, topic: &str, qos: QoS, arg: usize) -> Result<(), Error> {
        self.ensure_connected()?;
        if topic.is_empty() {
            return Err(Error::InvalidArgument);
        }
        let packet_id = self.send_request(RequestKind::Subscribe, arg, |packet_id| {
            Packet::Subscribe {
                packet_id,
                topic,
                qos,
            }
        })?;
        debug!("subscribe {} as {}", topic, packet_id);
        Ok(())
    }

    /// Unsubscribe from a topic filter.
    ///
    /// Completion is reported as [`Event::Unsubscribe`] carrying `arg`.
    ///
    /// # Errors
    ///
    /// Same as [`subscribe`](Self::subscribe).
    pub fn unsubscribe(&mut self, topic: &str, arg: usize) -> Result<(), Error> {
        self.ensure_connected()?;
        if topic.is_empty() {
            return Err(Error::InvalidArgument);
        }
        let packet_id = self.send_request(RequestKind::Unsubscribe, arg, |packet_id| {
            Packet::Unsubscribe { packet_id, topic }
        })?;
        debug!("unsubscribe {} as {}", topic, packet_id);
        Ok(())
    }

    /// Publish a message.
    ///
    /// QoS 0 messages are written to the TX buffer and forgotten: no request
    /// slot, no [`Event::Publish`]. QoS 1 and 2 messages occupy a request slot
    /// until the broker completes the handshake, then raise
    /// [`Event::Publish`] with `arg`.
    ///
    /// # Errors
    ///
    /// * [`Error::InvalidState`] - Not connected
    /// * [`Error::InvalidArgument`] - Empty topic or topic with wildcards
    /// * [`Error::Busy`] - No free request slot or TX space; nothing was queued
    /// * [`Error::PacketTooLarge`] - Payload above 65535 bytes or frame larger
    ///   than the TX buffer
    pub fn publish(
        &mut self,
        topic: &str,
        payload: &[u8],
        qos: QoS,
        retain: bool,
        arg: usize,
    ) -> Result<(), Error> {
        self.ensure_connected()?;
        if !valid_topic_name(topic) {
            return Err(Error::InvalidArgument);
        }
        if payload.len() > u16::MAX as usize {
            return Err(Error::PacketTooLarge);
        }

        let build = |packet_id| {
            Packet::Publish(Publish {
                topic,
                payload,
                qos,
                packet_id,
                dup: false,
                retain,
            })
        };

        if qos == QoS::AtMostOnce {
            self.queue(&build(0))?;
            trace!("publish {} qos 0", topic);
            self.flush_or_teardown();
            return Ok(());
        }

        let packet_id = self.send_request(RequestKind::Publish(qos), arg, build)?;
        trace!("publish {} as {}", topic, packet_id);
        Ok(())
    }

    /// The transport finished opening the socket.
    ///
    /// Sends the pending CONNECT and starts waiting for CONNACK.
    pub fn on_transport_connected(&mut self) {
        if self.state != State::ConnectingTransport {
            warn!("socket opened in state {:?}, ignoring", self.state);
            return;
        }
        self.set_state(State::ConnectingMqtt);
        self.flush_or_teardown();
    }

    /// The transport could not open the socket.
    pub fn on_transport_failed(&mut self) {
        match self.state {
            State::Disconnected => {}
            State::ConnectingTransport => {
                warn!("socket open failed");
                self.teardown(Notify::Connect(ConnectStatus::TcpFailed), false);
            }
            _ => self.on_transport_closed(),
        }
    }

    /// The transport closed the socket, either on request or because the link
    /// dropped.
    pub fn on_transport_closed(&mut self) {
        match self.state {
            State::Disconnected => {}
            State::ConnectingTransport | State::ConnectingMqtt => {
                warn!("socket closed before CONNACK");
                self.teardown(Notify::Connect(ConnectStatus::TcpFailed), false);
            }
            State::Connected | State::Disconnecting => {
                self.teardown(Notify::Disconnect, false);
            }
        }
    }

    /// Feed bytes received from the transport.
    ///
    /// Bytes may arrive in any fragmentation; complete frames are processed in
    /// arrival order and incomplete ones wait in the RX buffer. Bytes received
    /// while no session is open are discarded.
    ///
    /// # Errors
    ///
    /// * [`Error::Protocol`] - The broker violated MQTT framing. The
    ///   connection has already been torn down and the matching event raised.
    pub fn receive(&mut self, data: &[u8]) -> Result<(), Error> {
        let mut rest = data;
        while self.session_open() {
            let taken = self.rx.fill(rest);
            rest = &rest[taken..];

            while self.session_open() {
                match self.process_frame() {
                    Ok(true) => {}
                    Ok(false) => break,
                    Err(e) => {
                        error!("protocol error: {:?}, closing", e);
                        self.abort();
                        return Err(e);
                    }
                }
            }

            if rest.is_empty() {
                break;
            }
            if taken == 0 && self.rx.free() == 0 {
                // Cannot happen while frames are bounded by RX.
                self.abort();
                return Err(ProtocolError::FrameTooLarge.into());
            }
        }
        self.flush_or_teardown();
        Ok(())
    }

    /// Periodic tick.
    ///
    /// Resumes partial writes, enforces connect and disconnect timeouts,
    /// retransmits or fails overdue requests, and sends PINGREQ when the link
    /// has been idle for the keep-alive interval. Call it at least a few times
    /// per keep-alive period.
    pub fn poll(&mut self) {
        let now = self.clock.now_ms();
        let in_state = now.wrapping_sub(self.state_since);

        match self.state {
            State::Disconnected => {}
            State::ConnectingTransport | State::ConnectingMqtt => {
                if in_state >= self.config.connect_timeout_ms {
                    warn!("connect timed out in state {:?}", self.state);
                    self.teardown(Notify::Connect(ConnectStatus::TcpFailed), true);
                    return;
                }
                self.flush_or_teardown();
            }
            State::Connected => {
                self.flush_or_teardown();
                if self.state != State::Connected {
                    return;
                }
                self.queue_deferred();
                self.expire_requests(now);
                if self.state != State::Connected {
                    return;
                }
                self.keep_alive(now);
                self.flush_or_teardown();
            }
            State::Disconnecting => {
                if in_state >= self.config.connect_timeout_ms {
                    warn!("socket did not close in time");
                    self.teardown(Notify::Disconnect, !self.closing);
                    return;
                }
                self.flush_or_teardown();
                if self.state == State::Disconnecting && self.tx.is_empty() {
                    self.close_transport();
                }
            }
        }
    }

    fn set_state(&mut self, state: State) {
        info!("state {:?} -> {:?}", self.state, state);
        self.state = state;
        self.state_since = self.clock.now_ms();
    }

    fn ensure_connected(&self) -> Result<(), Error> {
        if self.state == State::Connected {
            Ok(())
        } else {
            Err(Error::InvalidState)
        }
    }

    fn session_open(&self) -> bool {
        matches!(
            self.state,
            State::ConnectingMqtt | State::Connected | State::Disconnecting
        )
    }

    /// Encode `packet` straight into the TX buffer.
    fn queue(&mut self, packet: &Packet<'_>) -> Result<(), Error> {
        let len = packet.encoded_len()?;
        if len > TX {
            return Err(Error::PacketTooLarge);
        }
        if len > self.tx.free() {
            return Err(Error::Busy);
        }
        packet.encode(&mut self.tx)?;
        Ok(())
    }

    /// Queue an acknowledgement; the broker retransmits if it gets lost.
    fn queue_ack(&mut self, packet: Packet<'_>) {
        if self.queue(&packet).is_err() {
            warn!("TX full, dropping {:?}", packet.packet_type());
        }
    }

    /// Allocate a request slot, keep a copy of the frame and queue it.
    fn send_request<'p>(
        &mut self,
        kind: RequestKind,
        arg: usize,
        build: impl Fn(u16) -> Packet<'p>,
    ) -> Result<u16, Error> {
        let len = build(0).encoded_len()?;
        if len > TX {
            return Err(Error::PacketTooLarge);
        }
        if len > self.tx.free() {
            return Err(Error::Busy);
        }

        let packet_id = self.requests.allocate(kind, arg)?;
        let Some(req) = self.requests.find_mut(packet_id) else {
            return Err(Error::Busy);
        };
        let staged = build(packet_id)
            .encode(req.frame_mut())
            .and_then(|_| self.tx.put_slice(req.frame()));
        if let Err(e) = staged {
            self.requests.release(packet_id);
            return Err(e);
        }
        req.queued(self.tx.len());

        self.flush_or_teardown();
        Ok(packet_id)
    }

    /// Hand as much of the TX buffer to the transport as it accepts.
    fn flush(&mut self) -> Result<(), Error> {
        if !self.session_open() {
            return Ok(());
        }
        let now = self.clock.now_ms();
        let mut progressed = false;
        while !self.tx.is_empty() {
            let accepted = self
                .transport
                .write(self.tx.chunk())
                .map_err(|_| Error::Transport)?;
            if accepted == 0 {
                break;
            }
            let accepted = self.tx.consume(accepted);
            self.requests.on_flushed(accepted, now);
            self.last_tx = now;
            progressed = true;
        }
        if progressed {
            self.transport.flush().map_err(|_| Error::Transport)?;
        }
        Ok(())
    }

    fn flush_or_teardown(&mut self) {
        if self.flush().is_err() {
            error!("transport write failed");
            self.abort();
        }
    }

    fn close_transport(&mut self) {
        if self.closing {
            return;
        }
        self.closing = true;
        if self.transport.shutdown().is_err() {
            warn!("transport refused to close");
            self.teardown(Notify::Disconnect, false);
        }
    }

    /// Tear down after a fatal error, reporting according to the phase.
    fn abort(&mut self) {
        let notify = match self.state {
            State::ConnectingTransport | State::ConnectingMqtt => {
                Notify::Connect(ConnectStatus::TcpFailed)
            }
            _ => Notify::Disconnect,
        };
        self.teardown(notify, true);
    }

    /// Return to `Disconnected`, resolving every in-flight request.
    fn teardown(&mut self, notify: Notify, close: bool) {
        if self.state == State::Disconnected {
            return;
        }
        if close && !self.closing && self.transport.shutdown().is_err() {
            warn!("transport refused to close");
        }

        let was_accepted = self.is_accepted;
        self.set_state(State::Disconnected);
        self.is_accepted = false;
        self.closing = false;
        self.ping_sent = None;
        self.tx.clear();
        self.rx.clear();
        self.inbound.clear();

        for req in self.requests.drain() {
            self.events
                .emit(&request_failed(req.kind, req.arg, Error::Disconnected));
        }

        let event = match notify {
            Notify::Connect(status) => Event::Connect { status },
            Notify::Disconnect => Event::Disconnect {
                is_accepted: was_accepted,
            },
        };
        self.events.emit(&event);
    }

    /// Decode and handle one frame if the RX buffer holds a complete one.
    fn process_frame(&mut self) -> Result<bool, Error> {
        let Some(header) = FrameHeader::parse(|i| self.rx.peek(i))? else {
            return Ok(false);
        };
        let len = header.frame_len();
        if len > RX {
            return Err(ProtocolError::FrameTooLarge.into());
        }
        if self.rx.len() < len {
            return Ok(false);
        }

        let mut frame: Vec<u8, RX> = Vec::new();
        frame
            .resize(len, 0)
            .map_err(|_| Error::from(ProtocolError::FrameTooLarge))?;
        self.rx.read(&mut frame);

        let packet = Packet::decode(&frame)?;
        self.handle(packet)?;
        Ok(true)
    }

    fn handle(&mut self, packet: Packet<'_>) -> Result<(), Error> {
        trace!("received {:?}", packet.packet_type());
        match (self.state, packet) {
            (State::ConnectingMqtt, Packet::Connack { code, .. }) => self.on_connack(code),
            (State::Connected, packet) => self.on_session_packet(packet),
            // Late traffic after DISCONNECT; requests resolve on teardown.
            (State::Disconnecting, _) => Ok(()),
            _ => Err(ProtocolError::UnexpectedPacket.into()),
        }
    }

    fn on_connack(&mut self, code: u8) -> Result<(), Error> {
        let status = ConnectStatus::try_from(code)?;
        if status != ConnectStatus::Accepted {
            warn!("broker refused connection: {:?}", status);
            self.teardown(Notify::Connect(status), true);
            return Ok(());
        }
        self.is_accepted = true;
        self.last_tx = self.clock.now_ms();
        self.set_state(State::Connected);
        self.events.emit(&Event::Connect { status });
        Ok(())
    }

    fn on_session_packet(&mut self, packet: Packet<'_>) -> Result<(), Error> {
        match packet {
            Packet::Publish(publish) => self.on_publish(&publish),
            Packet::Puback(id) => {
                if let Some(arg) = self.finish_request(id, |req| {
                    req.kind == RequestKind::Publish(QoS::AtLeastOnce)
                }) {
                    self.events.emit(&Event::Publish {
                        arg,
                        result: Ok(()),
                    });
                }
            }
            Packet::Pubrec(id) => self.on_pubrec(id),
            Packet::Pubcomp(id) => {
                if let Some(arg) = self.finish_request(id, |req| {
                    req.kind == RequestKind::Publish(QoS::ExactlyOnce) && req.released
                }) {
                    self.events.emit(&Event::Publish {
                        arg,
                        result: Ok(()),
                    });
                }
            }
            Packet::Pubrel(id) => {
                if let Some(pos) = self.inbound.iter().position(|&known| known == id) {
                    self.inbound.swap_remove(pos);
                }
                self.queue_ack(Packet::Pubcomp(id));
            }
            Packet::Suback { packet_id, code } => {
                if let Some(arg) =
                    self.finish_request(packet_id, |req| req.kind == RequestKind::Subscribe)
                {
                    let result = if code == SUBACK_FAILURE {
                        Err(Error::Refused)
                    } else {
                        QoS::try_from(code).map_err(Error::from)
                    };
                    self.events.emit(&Event::Subscribe { arg, result });
                }
            }
            Packet::Unsuback(id) => {
                if let Some(arg) =
                    self.finish_request(id, |req| req.kind == RequestKind::Unsubscribe)
                {
                    self.events.emit(&Event::Unsubscribe {
                        arg,
                        result: Ok(()),
                    });
                }
            }
            Packet::Pingresp => {
                if self.ping_sent.take().is_some() {
                    self.events.emit(&Event::KeepAlive);
                } else {
                    warn!("unsolicited PINGRESP");
                }
            }
            other => {
                error!("unexpected {:?} from broker", other.packet_type());
                return Err(ProtocolError::UnexpectedPacket.into());
            }
        }
        Ok(())
    }

    fn on_publish(&mut self, publish: &Publish<'_>) {
        let id = publish.packet_id;
        match publish.qos {
            QoS::AtMostOnce => {}
            QoS::AtLeastOnce => self.queue_ack(Packet::Puback(id)),
            QoS::ExactlyOnce => {
                if self.inbound.contains(&id) {
                    debug!("duplicate QoS 2 publish {}, not delivered again", id);
                    self.queue_ack(Packet::Pubrec(id));
                    return;
                }
                if self.inbound.push(id).is_err() {
                    // No slot to de-duplicate it; the broker resends while unacknowledged.
                    warn!("too many QoS 2 messages in flight, deferring {}", id);
                    return;
                }
                self.queue_ack(Packet::Pubrec(id));
            }
        }

        self.events.emit(&Event::PublishRecv(Message {
            topic: publish.topic,
            payload: publish.payload,
            qos: publish.qos,
            dup: publish.dup,
            retain: publish.retain,
        }));
    }

    fn on_pubrec(&mut self, id: u16) {
        let Some(req) = self.requests.find_mut(id) else {
            warn!("PUBREC for unknown packet {}", id);
            return;
        };
        if req.kind != RequestKind::Publish(QoS::ExactlyOnce) {
            warn!("PUBREC for packet {} that is not a QoS 2 publish", id);
            return;
        }

        if !req.released {
            req.released = true;
            req.retry = RetryState::Unsent;
            req.frame_mut().clear();
            if Packet::Pubrel(id).encode(req.frame_mut()).is_err() {
                warn!("cannot store PUBREL for {}", id);
            }
        }

        if self.tx.put_slice(req.frame()).is_ok() {
            req.queued(self.tx.len());
        } else {
            debug!("TX full, PUBREL {} waits for room", id);
            req.defer();
        }
    }

    /// Push deferred frames into TX while they fit, without spending retries.
    fn queue_deferred(&mut self) {
        for id in self.requests.deferred() {
            let Some(req) = self.requests.find_mut(id) else {
                continue;
            };
            if req.frame().len() > self.tx.free() {
                break;
            }
            if self.tx.put_slice(req.frame()).is_ok() {
                req.queued(self.tx.len());
            }
        }
    }

    /// Release the request for `id` if `expected` accepts it, returning its argument.
    fn finish_request(
        &mut self,
        id: u16,
        expected: impl Fn(&Request<TX>) -> bool,
    ) -> Option<usize> {
        match self.requests.find(id) {
            Some(req) if expected(req) => self.requests.release(id).map(|req| req.arg),
            _ => {
                warn!("unmatched acknowledgement for packet {}", id);
                None
            }
        }
    }

    /// Retransmit or fail requests whose acknowledgement is overdue.
    fn expire_requests(&mut self, now: u32) {
        let overdue = self.requests.expired(now, self.config.request_timeout_ms);
        for id in overdue {
            let Some(req) = self.requests.find_mut(id) else {
                continue;
            };
            let attempts = match req.retry {
                RetryState::Unsent | RetryState::Sent => 0,
                RetryState::Retried(n) => n,
            };

            if attempts < self.config.max_retries {
                if req.frame().len() > self.tx.free() {
                    // Try again on a later tick.
                    continue;
                }
                packet::mark_duplicate(req.frame_mut());
                if self.tx.put_slice(req.frame()).is_ok() {
                    req.queued(self.tx.len());
                    req.retry = RetryState::Retried(attempts + 1);
                    warn!("retransmitting packet {} (attempt {})", id, attempts + 1);
                }
                continue;
            }

            if let Some(req) = self.requests.release(id) {
                warn!("packet {} timed out", id);
                self.events
                    .emit(&request_failed(req.kind, req.arg, Error::Timeout));
            }
        }
    }

    fn keep_alive(&mut self, now: u32) {
        if self.keep_alive_ms == 0 {
            return;
        }
        if let Some(sent) = self.ping_sent {
            let limit = self
                .keep_alive_ms
                .saturating_mul(u32::from(self.config.ping_timeout_factor.max(1)));
            if now.wrapping_sub(sent) >= limit {
                error!("no PINGRESP, dropping connection");
                self.teardown(Notify::Disconnect, true);
            }
            return;
        }
        if now.wrapping_sub(self.last_tx) >= self.keep_alive_ms {
            match self.queue(&Packet::Pingreq) {
                Ok(()) => {
                    trace!("PINGREQ");
                    self.ping_sent = Some(now);
                }
                Err(_) => warn!("TX full, PINGREQ postponed"),
            }
        }
    }
}
