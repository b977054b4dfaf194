//! Sensor endpoint addressing

use std::fmt;

use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::handshake::client::Request;
use tokio_tungstenite::tungstenite::http::header::SEC_WEBSOCKET_PROTOCOL;
use tokio_tungstenite::tungstenite::http::HeaderValue;

use super::{ClientError, ClientResult};

/// Port the sensor's WebSocket server listens on
pub const DEFAULT_PORT: u16 = 81;

/// Sub-protocol token the sensor's bundled page requests
pub const DEFAULT_SUBPROTOCOL: &str = "arduino";

/// mDNS name the sensor announces in wizard mode
pub const DEFAULT_HOST: &str = "soilsensor.local";

/// Address of a sensor's WebSocket server
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    /// Host name or IP address
    pub host: String,
    /// TCP port
    pub port: u16,
    /// Request path
    pub path: String,
    /// Optional `Sec-WebSocket-Protocol` token
    pub subprotocol: Option<String>,
}

impl Default for Endpoint {
    fn default() -> Self {
        Self::new(DEFAULT_HOST)
    }
}

impl Endpoint {
    /// Create an endpoint on the default port with the default sub-protocol
    pub fn new(host: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            port: DEFAULT_PORT,
            path: "/".to_string(),
            subprotocol: Some(DEFAULT_SUBPROTOCOL.to_string()),
        }
    }

    /// Set the port
    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// Set or clear the sub-protocol token
    pub fn with_subprotocol(mut self, subprotocol: Option<String>) -> Self {
        self.subprotocol = subprotocol;
        self
    }

    /// WebSocket URL of the endpoint
    ///
    /// IPv6 literals are bracketed.
    pub fn url(&self) -> String {
        if self.host.contains(':') && !self.host.starts_with('[') {
            format!("ws://[{}]:{}{}", self.host, self.port, self.path)
        } else {
            format!("ws://{}:{}{}", self.host, self.port, self.path)
        }
    }

    /// Build the client handshake request
    pub fn to_request(&self) -> ClientResult<Request> {
        if self.host.trim().is_empty() {
            return Err(ClientError::InvalidEndpoint("host cannot be empty".to_string()));
        }

        let mut request = self.url().into_client_request()?;

        if let Some(protocol) = &self.subprotocol {
            let value = HeaderValue::from_str(protocol).map_err(|e| {
                ClientError::InvalidEndpoint(format!("invalid sub-protocol {:?}: {}", protocol, e))
            })?;
            request.headers_mut().insert(SEC_WEBSOCKET_PROTOCOL, value);
        }

        Ok(request)
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.url())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_endpoint() {
        let endpoint = Endpoint::default();
        assert_eq!(endpoint.url(), "ws://soilsensor.local:81/");
        assert_eq!(endpoint.subprotocol.as_deref(), Some("arduino"));
    }

    #[test]
    fn test_endpoint_builder() {
        let endpoint = Endpoint::new("192.168.178.109")
            .with_port(8181)
            .with_subprotocol(None);
        assert_eq!(endpoint.to_string(), "ws://192.168.178.109:8181/");
        assert!(endpoint.subprotocol.is_none());
    }

    #[test]
    fn test_request_carries_subprotocol() {
        let request = Endpoint::new("127.0.0.1").to_request().unwrap();
        assert_eq!(request.uri().to_string(), "ws://127.0.0.1:81/");
        assert_eq!(
            request.headers().get(SEC_WEBSOCKET_PROTOCOL).unwrap(),
            "arduino"
        );
    }

    #[test]
    fn test_request_without_subprotocol() {
        let request = Endpoint::new("127.0.0.1")
            .with_subprotocol(None)
            .to_request()
            .unwrap();
        assert!(request.headers().get(SEC_WEBSOCKET_PROTOCOL).is_none());
    }

    #[test]
    fn test_empty_host_rejected() {
        let err = Endpoint::new("  ").to_request().unwrap_err();
        assert!(err.to_string().contains("host cannot be empty"));
    }

    #[test]
    fn test_invalid_subprotocol_rejected() {
        let err = Endpoint::new("127.0.0.1")
            .with_subprotocol(Some("bad\nvalue".to_string()))
            .to_request()
            .unwrap_err();
        assert!(err.to_string().contains("invalid sub-protocol"));
    }

    #[test]
    fn test_ipv6_host_is_bracketed() {
        let endpoint = Endpoint::new("::1");
        assert_eq!(endpoint.url(), "ws://[::1]:81/");
        assert!(endpoint.to_request().is_ok());

        let bracketed = Endpoint::new("[fe80::1]").with_port(8081);
        assert_eq!(bracketed.url(), "ws://[fe80::1]:8081/");
    }
}
