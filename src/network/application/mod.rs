//! # Application Layer Network Protocols
//!
//! Protocol engines built on the transport traits in [`crate::network`].
//! Each engine owns fixed-size buffers and works in `no_std` environments.
//!
//! ## Available Protocols
//!
//! - **[`mqtt`]**: MQTT 3.1.1 client for lightweight publish-subscribe messaging

/// MQTT client implementation.
///
/// Provides an MQTT 3.1.1 client for lightweight publish-subscribe messaging
/// over a chunked modem transport.
pub mod mqtt;
