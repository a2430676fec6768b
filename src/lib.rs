//! # cellmqtt - MQTT over cellular modems
//!
//! An MQTT 3.1.1 client engine for devices that reach the network through an
//! AT-command modem. The modem driver owns the socket; this crate owns the
//! protocol. It is designed for embedded systems and supports `no_std`
//! environments with no heap allocation.
//!
//! ## Features
//!
//! - **MQTT Client**: connect, subscribe, unsubscribe and publish at QoS 0/1/2
//! - **Chunked transports**: partial writes and fragmented reads are the norm
//! - **Bounded memory**: TX/RX rings and the request table are const generics
//! - **Retries and keep-alive**: driven by a periodic [`poll`](network::application::mqtt::Client::poll)
//!
//! ## Usage
//!
//! Add this to your `Cargo.toml`:
//!
//! ```toml
//! [dependencies]
//! cellmqtt = "0.1.0"
//! ```
//!
//! ### MQTT Client Example
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
//!
//! let mut client: Client<_, _, u32, 256, 256> = Client::new(Modem, || 0u32, 0);
//! let info = ClientInfo::new("my_device").keep_alive(60);
//!
//! client.connect("broker.example.com", 1883, &info, |count, event| {
//!     if let Event::PublishRecv(_) = event {
//!         *count += 1;
//!     }
//! })?;
//! // ... once the modem reports the socket open and CONNACK arrives:
//! client.publish("sensors/temperature", b"23.5", QoS::AtMostOnce, false, 0)?;
//! # Ok::<(), cellmqtt::network::application::mqtt::Error>(())
//! ```
//!
//! ## Optional Features
//!
//! - `std`: Enable standard library support (default: disabled)
//! - `log`: Route internal logging to the `log` crate
//! - `defmt`: Route internal logging to `defmt` and derive `defmt::Format`

#![cfg_attr(not(any(test, feature = "std")), no_std)]
#![deny(missing_docs)]
#![warn(missing_debug_implementations)]

#[macro_use]
mod fmt;

/// Network abstraction layer: transport traits and protocol engines.
pub mod network;
