//! Engine tuning and per-connection identity.
//!
//! Both types can be built in code or parsed from JSON, which lets a device
//! keep its broker settings in a provisioning blob.

use super::error::Error;
use super::packet::{Connect, Will};
use serde::Deserialize;

/// Engine timing and retry policy.
///
/// # Examples
///
/// ```rust
/// use cellmqtt::network::application::mqtt::Config;
///
/// let config = Config::from_json(br#"{"request_timeout_ms":2000}"#).unwrap();
/// assert_eq!(config.request_timeout_ms, 2000);
/// assert_eq!(config.max_retries, Config::default().max_retries);
/// ```
#[derive(Debug, PartialEq, Eq, Clone, Copy, Deserialize)]
#[serde(default)]
pub struct Config {
    /// How long a publish, subscribe or unsubscribe waits for its
    /// acknowledgement once its last byte has left the TX buffer.
    pub request_timeout_ms: u32,
    /// Retransmissions before a timed-out request is reported as failed.
    pub max_retries: u8,
    /// Upper bound for opening the socket, for CONNECT→CONNACK, and for the
    /// socket to close after a disconnect.
    pub connect_timeout_ms: u32,
    /// PINGRESP must arrive within `keep_alive × ping_timeout_factor`.
    pub ping_timeout_factor: u8,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            request_timeout_ms: 10_000,
            max_retries: 1,
            connect_timeout_ms: 10_000,
            ping_timeout_factor: 2,
        }
    }
}

impl Config {
    /// Parse a configuration from JSON; absent fields keep their defaults.
    pub fn from_json(json: &[u8]) -> Result<Self, Error> {
        serde_json_core::from_slice(json)
            .map(|(config, _)| config)
            .map_err(|_| Error::Config)
    }
}

/// Identity and options presented in CONNECT.
///
/// The client encodes CONNECT as soon as [`connect`](super::Client::connect)
/// is called, so the borrowed strings only need to live for that call.
#[derive(Debug, PartialEq, Eq, Clone, Copy, Deserialize)]
pub struct ClientInfo<'a> {
    /// Client identifier. Required and must not be empty.
    pub id: &'a str,
    /// Authentication user name.
    #[serde(borrow, default)]
    pub user: Option<&'a str>,
    /// Authentication password; requires `user`.
    #[serde(borrow, default)]
    pub pass: Option<&'a str>,
    /// Keep-alive interval in seconds; 0 disables keep-alive.
    #[serde(default)]
    pub keep_alive: u16,
    /// Ask the broker to discard any previous session.
    #[serde(default = "default_clean_session")]
    pub clean_session: bool,
    /// Last-will message.
    #[serde(borrow, default)]
    pub will: Option<Will<'a>>,
}

fn default_clean_session() -> bool {
    true
}

impl<'a> ClientInfo<'a> {
    /// Identity with no credentials, no will, a clean session and
    /// keep-alive disabled.
    pub fn new(id: &'a str) -> Self {
        Self {
            id,
            user: None,
            pass: None,
            keep_alive: 0,
            clean_session: true,
            will: None,
        }
    }

    /// Set the keep-alive interval in seconds.
    pub fn keep_alive(mut self, seconds: u16) -> Self {
        self.keep_alive = seconds;
        self
    }

    /// Set user name and password.
    pub fn credentials(mut self, user: &'a str, pass: Option<&'a str>) -> Self {
        self.user = Some(user);
        self.pass = pass;
        self
    }

    /// Register a last-will message.
    pub fn will(mut self, will: Will<'a>) -> Self {
        self.will = Some(will);
        self
    }

    /// Parse an identity from JSON, borrowing strings from `json`.
    ///
    /// Strings containing JSON escapes cannot be borrowed and are rejected.
    pub fn from_json(json: &'a [u8]) -> Result<Self, Error> {
        serde_json_core::from_slice(json)
            .map(|(info, _)| info)
            .map_err(|_| Error::Config)
    }

    /// Check the invariants CONNECT relies on.
    pub(crate) fn validate(&self) -> Result<(), Error> {
        if self.id.is_empty() || (self.pass.is_some() && self.user.is_none()) {
            return Err(Error::InvalidArgument);
        }
        if let Some(will) = &self.will {
            if will.topic.is_empty() {
                return Err(Error::InvalidArgument);
            }
        }
        Ok(())
    }

    pub(crate) fn to_connect(&self) -> Connect<'a> {
        Connect {
            client_id: self.id,
            keep_alive: self.keep_alive,
            clean_session: self.clean_session,
            username: self.user,
            password: self.pass,
            will: self.will,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::network::application::mqtt::QoS;

    #[test]
    fn test_config_defaults_fill_missing_fields() {
        let config = Config::from_json(br#"{"max_retries":3,"ping_timeout_factor":4}"#).unwrap();
        assert_eq!(config.max_retries, 3);
        assert_eq!(config.ping_timeout_factor, 4);
        assert_eq!(config.request_timeout_ms, 10_000);
        assert_eq!(config.connect_timeout_ms, 10_000);
    }

    #[test]
    fn test_config_rejects_garbage() {
        assert_eq!(Config::from_json(b"{\"max_retries\":\"x\"}"), Err(Error::Config));
    }

    #[test]
    fn test_client_info_from_json() {
        let json = br#"{
            "id": "modem-42",
            "user": "fleet",
            "pass": "hunter2",
            "keep_alive": 30,
            "will": {"topic": "fleet/modem-42/status", "message": "offline", "qos": 1, "retain": true}
        }"#;
        let info = ClientInfo::from_json(json).unwrap();
        assert_eq!(info.id, "modem-42");
        assert_eq!(info.user, Some("fleet"));
        assert_eq!(info.pass, Some("hunter2"));
        assert_eq!(info.keep_alive, 30);
        assert!(info.clean_session);

        let will = info.will.unwrap();
        assert_eq!(will.topic, "fleet/modem-42/status");
        assert_eq!(will.qos, QoS::AtLeastOnce);
        assert!(will.retain);
    }

    #[test]
    fn test_will_qos_is_range_checked() {
        let json = br#"{"id":"a","will":{"topic":"t","message":"m","qos":3}}"#;
        assert_eq!(ClientInfo::from_json(json), Err(Error::Config));
    }

    #[test]
    fn test_validate() {
        assert!(ClientInfo::new("dev").validate().is_ok());
        assert_eq!(ClientInfo::new("").validate(), Err(Error::InvalidArgument));

        let mut info = ClientInfo::new("dev");
        info.pass = Some("secret");
        assert_eq!(info.validate(), Err(Error::InvalidArgument));

        let info = ClientInfo::new("dev").credentials("user", Some("secret"));
        assert!(info.validate().is_ok());
    }
}
