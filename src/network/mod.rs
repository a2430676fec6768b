//! A network abstraction layer for embedded systems
//!
//! This module defines the small set of traits the protocol engines need from
//! the device's network stack. On a cellular device the stack usually lives
//! behind an AT-command modem: opening a socket completes asynchronously,
//! writes may be accepted only partially, and received bytes arrive in
//! arbitrary chunks. The traits below model exactly that and nothing more.
//!
//! The engines never read from the transport themselves. The integrator
//! forwards received bytes and socket notifications to the engine, which keeps
//! the engine free of any blocking call.

#![allow(missing_docs)]
#![deny(unsafe_code)]

/// Common error types for network operations
pub mod error;

/// Application layer protocol engines
pub mod application;

/// Re-exports of common traits
pub mod prelude {
    pub use super::{Clock, Open, Shutdown, Transport, Write};
}

/// Byte sink side of a connection.
pub trait Write {
    /// Associated error type
    type Error: core::fmt::Debug;
    /// Offer bytes to the connection.
    ///
    /// Returns how many bytes were accepted, which may be fewer than
    /// `buf.len()` (including zero when the link is momentarily busy).
    fn write(&mut self, buf: &[u8]) -> Result<usize, Self::Error>;
    /// Flush the write buffer
    fn flush(&mut self) -> Result<(), Self::Error>;
}

/// Starts a connection to a remote host.
pub trait Open {
    /// Associated error type
    type Error: core::fmt::Debug;
    /// Begin opening a connection to `host:port`.
    ///
    /// Returning `Ok` only means the attempt has started. The integrator
    /// reports the outcome later, once the modem answers.
    fn open(&mut self, host: &str, port: u16) -> Result<(), Self::Error>;
}

/// Closes an open connection without consuming the handle.
pub trait Shutdown {
    /// Associated error type
    type Error: core::fmt::Debug;
    /// Begin closing the connection.
    fn shutdown(&mut self) -> Result<(), Self::Error>;
}

/// A reusable stream transport, such as a modem TCP socket.
pub trait Transport: Open + Write + Shutdown {}

impl<T: Open + Write + Shutdown> Transport for T {}

/// A monotonic millisecond clock.
///
/// The value is allowed to wrap; consumers only ever compare differences.
///
/// # Examples
///
/// ```rust
/// use cellmqtt::network::Clock;
///
/// let clock = || 1_500u32;
/// assert_eq!(clock.now_ms(), 1_500);
/// ```
pub trait Clock {
    /// Current time in milliseconds.
    fn now_ms(&self) -> u32;
}

impl<F: Fn() -> u32> Clock for F {
    fn now_ms(&self) -> u32 {
        self()
    }
}
