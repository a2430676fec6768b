#![allow(dead_code)]

use cellmqtt::network::application::mqtt::{
    Client, ClientInfo, Config, ConnectStatus, Error, Event, Packet, QoS, State,
};
use cellmqtt::network::error::Error as TransportError;
use cellmqtt::network::{Clock, Open, Shutdown, Write};
use std::cell::Cell;
use std::rc::Rc;

/// Modem socket that records everything written to it.
#[derive(Debug, Default)]
pub struct MockModem {
    pub written: Vec<u8>,
    /// Bytes the modem still accepts before it reports a full send buffer.
    /// `None` accepts everything.
    pub budget: Option<usize>,
    pub opened: Option<(String, u16)>,
    pub shutdowns: usize,
    pub fail_open: bool,
    pub fail_write: bool,
}

impl MockModem {
    /// Drain the recorded bytes.
    pub fn take_written(&mut self) -> Vec<u8> {
        std::mem::take(&mut self.written)
    }
}

impl Open for MockModem {
    type Error = TransportError;

    fn open(&mut self, host: &str, port: u16) -> Result<(), Self::Error> {
        if self.fail_open {
            return Err(TransportError::ConnectionRefused);
        }
        self.opened = Some((host.to_string(), port));
        Ok(())
    }
}

impl Write for MockModem {
    type Error = TransportError;

    fn write(&mut self, buf: &[u8]) -> Result<usize, Self::Error> {
        if self.fail_write {
            return Err(TransportError::WriteError);
        }
        let len = match self.budget {
            Some(budget) => buf.len().min(budget),
            None => buf.len(),
        };
        if let Some(budget) = self.budget.as_mut() {
            *budget -= len;
        }
        self.written.extend_from_slice(&buf[..len]);
        Ok(len)
    }

    fn flush(&mut self) -> Result<(), Self::Error> {
        Ok(())
    }
}

impl Shutdown for MockModem {
    type Error = TransportError;

    fn shutdown(&mut self) -> Result<(), Self::Error> {
        self.shutdowns += 1;
        Ok(())
    }
}

/// Manually advanced millisecond clock shared between test and client.
#[derive(Debug, Clone, Default)]
pub struct TestClock(Rc<Cell<u32>>);

impl TestClock {
    pub fn advance(&self, ms: u32) {
        self.0.set(self.0.get().wrapping_add(ms));
    }
}

impl Clock for TestClock {
    fn now_ms(&self) -> u32 {
        self.0.get()
    }
}

/// Owned copy of an event, so tests can inspect it after the callback returns.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Seen {
    Connect(ConnectStatus),
    Disconnect { is_accepted: bool },
    Subscribe(usize, Result<QoS, Error>),
    Unsubscribe(usize, Result<(), Error>),
    Publish(usize, Result<(), Error>),
    Received {
        topic: String,
        payload: Vec<u8>,
        qos: QoS,
        dup: bool,
        retain: bool,
    },
    KeepAlive,
}

pub fn record(seen: &mut Vec<Seen>, event: &Event<'_>) {
    seen.push(match event {
        Event::Connect { status } => Seen::Connect(*status),
        Event::Disconnect { is_accepted } => Seen::Disconnect {
            is_accepted: *is_accepted,
        },
        Event::Subscribe { arg, result } => Seen::Subscribe(*arg, *result),
        Event::Unsubscribe { arg, result } => Seen::Unsubscribe(*arg, *result),
        Event::Publish { arg, result } => Seen::Publish(*arg, *result),
        Event::PublishRecv(msg) => Seen::Received {
            topic: msg.topic.to_string(),
            payload: msg.payload.to_vec(),
            qos: msg.qos,
            dup: msg.dup,
            retain: msg.retain,
        },
        Event::KeepAlive => Seen::KeepAlive,
    });
}

pub type TestClient = Client<MockModem, TestClock, Vec<Seen>, 256, 256, 4>;

pub fn test_config() -> Config {
    Config {
        request_timeout_ms: 1_000,
        max_retries: 1,
        connect_timeout_ms: 5_000,
        ping_timeout_factor: 2,
    }
}

pub fn new_client() -> (TestClient, TestClock) {
    let clock = TestClock::default();
    let client = Client::with_config(MockModem::default(), clock.clone(), test_config(), Vec::new());
    (client, clock)
}

/// Encode a broker-side packet.
pub fn frame(packet: Packet<'_>) -> Vec<u8> {
    let mut buf: heapless::Vec<u8, 512> = heapless::Vec::new();
    packet.encode(&mut buf).unwrap();
    buf.to_vec()
}

pub fn connack(code: u8) -> Vec<u8> {
    frame(Packet::Connack {
        session_present: false,
        code,
    })
}

/// Split a byte stream written by the client into decoded packets.
pub fn packets(bytes: &[u8]) -> Vec<Packet<'_>> {
    let mut out = Vec::new();
    let mut rest = bytes;
    while !rest.is_empty() {
        let (packet, used) = cellmqtt::network::application::mqtt::try_decode(rest)
            .unwrap()
            .expect("client wrote a truncated frame");
        out.push(packet);
        rest = &rest[used..];
    }
    out
}

/// A client that completed CONNECT/CONNACK, with the modem output and the
/// event log cleared.
pub fn connected(keep_alive: u16) -> (TestClient, TestClock) {
    let (mut client, clock) = new_client();
    let info = ClientInfo::new("test-device").keep_alive(keep_alive);
    client.connect("broker.test", 1883, &info, record).unwrap();
    client.on_transport_connected();
    client.receive(&connack(0)).unwrap();
    assert_eq!(client.state(), State::Connected);
    assert_eq!(client.arg().as_slice(), &[Seen::Connect(ConnectStatus::Accepted)]);

    client.transport_mut().take_written();
    client.arg_mut().clear();
    (client, clock)
}
