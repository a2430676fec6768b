//! MQTT 3.1.1 client protocol engine for modem-backed links.
//!
//! The engine turns user intents (connect, subscribe, unsubscribe, publish)
//! into MQTT control packets, tracks every acknowledgement through a bounded
//! table of packet identifiers, retransmits or times out unacknowledged work,
//! keeps the connection alive, and reports everything back through one event
//! callback.
//!
//! It sits on top of a chunked, non-blocking byte transport such as an
//! AT-command modem socket: writes may be accepted partially and received
//! bytes arrive in arbitrary fragments.
//!
//! # Key Features
//!
//! - QoS 0, 1 and 2 in both directions, with exactly-once delivery of inbound
//!   QoS 2 messages to the application
//! - Fixed TX/RX rings and request table sized by const generics, no heap
//! - Retry-then-fail policy and keep-alive driven from a periodic tick
//! - Configuration and client identity loadable from JSON
//!
//! # Usage
//!
//! ```rust,no_run
//! use cellmqtt::network::application::mqtt::{Client, ClientInfo, Event, QoS};
//! # use cellmqtt::network::{Open, Shutdown, Write};
//! # struct Modem;
//! # impl Open for Modem {
//! #     type Error = ();
//! #     fn open(&mut self, _host: &str, _port: u16) -> Result<(), ()> { Ok(()) }
//! # }
//! # impl Write for Modem {
//! #     type Error = ();
//! #     fn write(&mut self, buf: &[u8]) -> Result<usize, ()> { Ok(buf.len()) }
//! #     fn flush(&mut self) -> Result<(), ()> { Ok(()) }
//! # }
//! # impl Shutdown for Modem {
//! #     type Error = ();
//! #     fn shutdown(&mut self) -> Result<(), ()> { Ok(()) }
//! # }
//! # fn millis() -> u32 { 0 }
//!
//! fn on_event(_: &mut (), event: &Event<'_>) {
//!     if let Event::PublishRecv(msg) = event {
//!         let _ = (msg.topic, msg.payload);
//!     }
//! }
//!
//! let mut client: Client<_, _, (), 512, 512> = Client::new(Modem, millis, ());
//! let info = ClientInfo::new("tracker-7").keep_alive(120);
//! client.connect("broker.example.com", 1883, &info, on_event)?;
//!
//! // From the modem driver and a periodic timer:
//! client.on_transport_connected();
//! client.receive(&[0x20, 0x02, 0x00, 0x00])?;
//! client.poll();
//!
//! client.subscribe("fleet/tracker-7/cmd", QoS::AtLeastOnce, 1)?;
//! client.publish("fleet/tracker-7/pos", b"52.52,13.40", QoS::AtLeastOnce, false, 2)?;
//! # Ok::<(), cellmqtt::network::application::mqtt::Error>(())
//! ```

pub mod buffer;
pub mod client;
pub mod config;
pub mod error;
pub mod event;
pub mod packet;
pub mod request;

pub use buffer::{BufMut, RingBuffer};
pub use client::{Client, State};
pub use config::{ClientInfo, Config};
pub use error::{Error, ProtocolError};
pub use event::{ConnectStatus, Event, EventFn, Message};
pub use packet::{Connect, Packet, PacketType, Publish, QoS, Will, try_decode};
pub use request::{RetryState, next_packet_id};
