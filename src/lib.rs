//! # wsengine: WebSocket protocol engine
//!
//! Turns a bidirectional byte stream (handed over after an HTTP upgrade)
//! into typed WebSocket messages, keeps the connection alive with
//! ping/pong heartbeats, and optionally compresses payloads with
//! permessage-deflate.
//!
//! ## Layers
//!
//! - [`frame`]: RFC 6455 frame codec (pure `decode`, `FrameCodec` for tokio-util)
//! - [`deflate`]: permessage-deflate stream pair (RFC 7692)
//! - [`protocol`]: sans-io message assembly and encoding
//! - [`session`]: async session over any `AsyncRead + AsyncWrite` transport
//!
//! ## Example
//!
//! ```no_run
//! use std::time::Duration;
//! use wsengine::{Config, Role, WebSocket};
//!
//! # async fn run(socket: tokio::net::TcpStream) -> wsengine::Result<()> {
//! let config = Config::builder(Role::Server)
//!     .ping_interval(Duration::from_secs(30))
//!     .timeout(Duration::from_secs(10))
//!     .build()?;
//!
//! let mut ws = WebSocket::new(socket, config)?;
//! while let Some(msg) = ws.recv().await {
//!     let msg = msg?;
//!     if let Some(text) = msg.as_text() {
//!         ws.send_text(text).await?;
//!     }
//! }
//! # Ok(())
//! # }
//! ```

use std::time::Duration;

pub mod error;
pub mod frame;
pub mod mask;
pub mod protocol;
pub mod session;
pub mod utf8;

#[cfg(feature = "permessage-deflate")]
pub mod deflate;

mod heartbeat;

pub use error::{CloseReason, Error, ErrorKind, Result};
pub use frame::{DecodeOptions, Frame, FrameCodec, OpCode};
pub use protocol::{Event, Message, Protocol, Role};
pub use session::{State, WebSocket};

#[cfg(feature = "permessage-deflate")]
pub use deflate::{DeflateConfig, DeflateContext};

/// Default receive buffer size
pub const RECV_BUFFER_SIZE: usize = 64 * 1024;

/// Maximum WebSocket frame header size (2 + 8 + 4 = 14 bytes)
pub const MAX_FRAME_HEADER_SIZE: usize = 14;

/// Largest payload a control frame may carry
pub const MAX_CONTROL_PAYLOAD: usize = 125;

/// Largest payload length encoded in the 7-bit field
pub const SMALL_MESSAGE_THRESHOLD: usize = 125;

/// Largest payload length encoded in the 16-bit field
pub const MEDIUM_MESSAGE_THRESHOLD: usize = 65535;

/// Default maximum frame payload (16MB)
pub const DEFAULT_MAX_FRAME_SIZE: usize = 16 * 1024 * 1024;

/// Default maximum message size (64MB)
pub const DEFAULT_MAX_MESSAGE_SIZE: usize = 64 * 1024 * 1024;

/// Default time to wait for a pong
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(15);

/// Default time to wait for the peer's closing Close frame
pub const DEFAULT_CLOSE_TIMEOUT: Duration = Duration::from_secs(5);

/// Configuration for a WebSocket session
///
/// Build one with [`Config::builder`]; [`ConfigBuilder::build`] rejects
/// inconsistent values. [`WebSocket::new`] validates again, so a `Config`
/// assembled by hand is checked too.
#[derive(Debug, Clone)]
pub struct Config {
    /// Endpoint role
    pub role: Role,
    /// Heartbeat period (default: none, heartbeat disabled)
    pub ping_interval: Option<Duration>,
    /// How long to wait for a pong (default: 15s)
    pub timeout: Duration,
    /// How long to wait for the peer's Close after sending ours (default: 5s)
    pub close_timeout: Duration,
    /// Maximum frame payload (default: 16MB)
    pub max_frame_size: usize,
    /// Maximum reassembled or inflated message size (default: 64MB)
    pub max_message_size: usize,
    /// Mask outbound frames (default: true for clients, false for servers)
    pub masking: bool,
    /// Negotiated permessage-deflate parameters (default: disabled)
    #[cfg(feature = "permessage-deflate")]
    pub compression: Option<DeflateConfig>,
}

impl Config {
    /// Default configuration for the given role
    pub fn new(role: Role) -> Self {
        Self {
            role,
            ping_interval: None,
            timeout: DEFAULT_TIMEOUT,
            close_timeout: DEFAULT_CLOSE_TIMEOUT,
            max_frame_size: DEFAULT_MAX_FRAME_SIZE,
            max_message_size: DEFAULT_MAX_MESSAGE_SIZE,
            masking: role.masks_outbound(),
            #[cfg(feature = "permessage-deflate")]
            compression: None,
        }
    }

    /// Default client configuration
    pub fn client() -> Self {
        Self::new(Role::Client)
    }

    /// Default server configuration
    pub fn server() -> Self {
        Self::new(Role::Server)
    }

    /// Create a new config builder
    pub fn builder(role: Role) -> ConfigBuilder {
        ConfigBuilder::new(role)
    }

    /// Check the configuration for inconsistent values
    pub fn validate(&self) -> Result<()> {
        if self.timeout.is_zero() {
            return Err(Error::InvalidConfig("timeout must be non-zero"));
        }
        if self.close_timeout.is_zero() {
            return Err(Error::InvalidConfig("close_timeout must be non-zero"));
        }
        if self.ping_interval.is_some_and(|p| p.is_zero()) {
            return Err(Error::InvalidConfig("ping_interval must be non-zero"));
        }
        if self.max_frame_size == 0 || self.max_message_size == 0 {
            return Err(Error::InvalidConfig("size limits must be non-zero"));
        }
        if self.max_frame_size > self.max_message_size {
            return Err(Error::InvalidConfig(
                "max_frame_size must not exceed max_message_size",
            ));
        }
        if self.masking != self.role.masks_outbound() {
            return Err(Error::InvalidConfig(
                "clients must mask outbound frames and servers must not",
            ));
        }
        Ok(())
    }

    /// Protocol handler matching this configuration
    pub fn protocol(&self) -> Protocol {
        let protocol = Protocol::new(self.role, self.max_message_size).with_masking(self.masking);
        #[cfg(feature = "permessage-deflate")]
        let protocol = match &self.compression {
            Some(deflate) => protocol.with_compression(deflate.clone()),
            None => protocol,
        };
        protocol
    }
}

/// Builder for session configuration
#[derive(Debug, Clone)]
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    /// Create a new builder with default values for the role
    pub fn new(role: Role) -> Self {
        Self {
            config: Config::new(role),
        }
    }

    /// Set the heartbeat period; `None` disables the heartbeat
    pub fn ping_interval(mut self, interval: impl Into<Option<Duration>>) -> Self {
        self.config.ping_interval = interval.into();
        self
    }

    /// Set the pong timeout
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.config.timeout = timeout;
        self
    }

    /// Set the close handshake timeout
    pub fn close_timeout(mut self, timeout: Duration) -> Self {
        self.config.close_timeout = timeout;
        self
    }

    /// Set maximum frame size
    pub fn max_frame_size(mut self, size: usize) -> Self {
        self.config.max_frame_size = size;
        self
    }

    /// Set maximum message size
    pub fn max_message_size(mut self, size: usize) -> Self {
        self.config.max_message_size = size;
        self
    }

    /// Set both frame and message limits
    pub fn max_payload_length(mut self, size: usize) -> Self {
        self.config.max_message_size = size;
        self.config.max_frame_size = size;
        self
    }

    /// Override outbound masking
    pub fn masking(mut self, masking: bool) -> Self {
        self.config.masking = masking;
        self
    }

    /// Enable permessage-deflate with negotiated parameters
    #[cfg(feature = "permessage-deflate")]
    pub fn compression(mut self, config: DeflateConfig) -> Self {
        self.config.compression = Some(config);
        self
    }

    /// Validate and build the configuration
    pub fn build(self) -> Result<Config> {
        self.config.validate()?;
        Ok(self.config)
    }
}

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::error::{CloseReason, Error, ErrorKind, Result};
    pub use crate::protocol::{Message, Role};
    pub use crate::session::{State, WebSocket};
    pub use crate::{Config, ConfigBuilder};
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let client = Config::client();
        assert!(client.masking);
        assert_eq!(client.ping_interval, None);
        assert_eq!(client.timeout, Duration::from_secs(15));
        assert_eq!(client.close_timeout, Duration::from_secs(5));
        assert_eq!(client.max_frame_size, 16 * 1024 * 1024);
        assert_eq!(client.max_message_size, 64 * 1024 * 1024);
        assert!(client.validate().is_ok());

        assert!(!Config::server().masking);
    }

    #[test]
    fn test_builder() {
        let config = Config::builder(Role::Server)
            .ping_interval(Duration::from_secs(30))
            .timeout(Duration::from_secs(5))
            .max_payload_length(4096)
            .build()
            .unwrap();
        assert_eq!(config.ping_interval, Some(Duration::from_secs(30)));
        assert_eq!(config.max_frame_size, 4096);
        assert_eq!(config.max_message_size, 4096);

        let config = Config::builder(Role::Client)
            .ping_interval(Duration::from_secs(30))
            .ping_interval(None)
            .build()
            .unwrap();
        assert!(config.ping_interval.is_none());
    }

    #[test]
    fn test_validation() {
        let err = |b: ConfigBuilder| b.build().unwrap_err().kind();

        assert_eq!(
            err(Config::builder(Role::Client).timeout(Duration::ZERO)),
            ErrorKind::Config
        );
        assert_eq!(
            err(Config::builder(Role::Client).ping_interval(Duration::ZERO)),
            ErrorKind::Config
        );
        assert_eq!(
            err(Config::builder(Role::Client)
                .max_frame_size(2048)
                .max_message_size(1024)),
            ErrorKind::Config
        );
        assert_eq!(
            err(Config::builder(Role::Client).masking(false)),
            ErrorKind::Config
        );
        assert_eq!(
            err(Config::builder(Role::Server).masking(true)),
            ErrorKind::Config
        );
    }

    #[cfg(feature = "permessage-deflate")]
    #[test]
    fn test_protocol_from_config() {
        let plain = Config::server().protocol();
        assert!(!plain.compression_enabled());

        let config = Config::builder(Role::Server)
            .compression(DeflateConfig::default())
            .build()
            .unwrap();
        let protocol = config.protocol();
        assert!(protocol.compression_enabled());
        assert!(protocol.decode_options(config.max_frame_size).allow_rsv1);
        assert!(protocol.decode_options(config.max_frame_size).expect_masked);
    }
}
