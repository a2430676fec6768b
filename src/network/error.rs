//! Common error types for network operations

/// A common error type for transport operations.
///
/// Transports are free to use their own error type; this one is provided for
/// modem drivers and mocks that only need to report the usual socket
/// failures. It is designed to be simple and portable for `no_std`
/// environments.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum Error {
    /// An operation was attempted on a socket that is not open.
    NotOpen,
    /// The modem rejected or failed a send command.
    WriteError,
    /// The remote host refused the connection.
    ConnectionRefused,
    /// The connection was closed.
    ConnectionClosed,
    /// The host name or port could not be used.
    InvalidAddress,
}

#[cfg(feature = "defmt")]
impl defmt::Format for Error {
    fn format(&self, f: defmt::Formatter) {
        match self {
            Error::NotOpen => defmt::write!(f, "NotOpen"),
            Error::WriteError => defmt::write!(f, "WriteError"),
            Error::ConnectionRefused => defmt::write!(f, "ConnectionRefused"),
            Error::ConnectionClosed => defmt::write!(f, "ConnectionClosed"),
            Error::InvalidAddress => defmt::write!(f, "InvalidAddress"),
        }
    }
}
