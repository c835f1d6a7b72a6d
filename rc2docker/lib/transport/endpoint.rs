use std::{fmt, path::PathBuf, str::FromStr};

use crate::{config::DEFAULT_SOCKET_PATH, TransportError};

//--------------------------------------------------------------------------------------------------
// Types
//--------------------------------------------------------------------------------------------------

/// Where the docker engine listens.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Endpoint {
    /// A unix domain socket.
    Unix(PathBuf),

    /// A plain (unencrypted) tcp listener.
    Tcp {
        /// The host name or address.
        host: String,

        /// The port.
        port: u16,
    },
}

//--------------------------------------------------------------------------------------------------
// Trait Implementations
//--------------------------------------------------------------------------------------------------

impl Default for Endpoint {
    fn default() -> Self {
        Endpoint::Unix(PathBuf::from(DEFAULT_SOCKET_PATH))
    }
}

impl FromStr for Endpoint {
    type Err = TransportError;

    /// Accepts `unix:///path`, a bare absolute path, `tcp://host:port` and `http://host:port`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if let Some(path) = s.strip_prefix("unix://") {
            if path.is_empty() {
                return Err(TransportError::InvalidEndpoint(s.to_string()));
            }
            return Ok(Endpoint::Unix(PathBuf::from(path)));
        }

        if s.starts_with('/') {
            return Ok(Endpoint::Unix(PathBuf::from(s)));
        }

        let address = s
            .strip_prefix("tcp://")
            .or_else(|| s.strip_prefix("http://"))
            .ok_or_else(|| TransportError::InvalidEndpoint(s.to_string()))?;
        let address = address.trim_end_matches('/');

        let (host, port) = address
            .rsplit_once(':')
            .ok_or_else(|| TransportError::InvalidEndpoint(s.to_string()))?;
        let port = port
            .parse()
            .map_err(|_| TransportError::InvalidEndpoint(s.to_string()))?;
        if host.is_empty() {
            return Err(TransportError::InvalidEndpoint(s.to_string()));
        }

        Ok(Endpoint::Tcp {
            host: host.to_string(),
            port,
        })
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Endpoint::Unix(path) => write!(f, "unix://{}", path.display()),
            Endpoint::Tcp { host, port } => write!(f, "tcp://{host}:{port}"),
        }
    }
}

//--------------------------------------------------------------------------------------------------
// Tests
//--------------------------------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_endpoint_parse_unix() -> anyhow::Result<()> {
        assert_eq!(
            "unix:///var/run/docker.sock".parse::<Endpoint>()?,
            Endpoint::default()
        );
        assert_eq!(
            "/tmp/docker.sock".parse::<Endpoint>()?,
            Endpoint::Unix("/tmp/docker.sock".into())
        );
        Ok(())
    }

    #[test]
    fn test_endpoint_parse_tcp() -> anyhow::Result<()> {
        let endpoint: Endpoint = "tcp://127.0.0.1:2375".parse()?;
        assert_eq!(
            endpoint,
            Endpoint::Tcp {
                host: "127.0.0.1".into(),
                port: 2375
            }
        );
        assert_eq!(endpoint.to_string(), "tcp://127.0.0.1:2375");
        Ok(())
    }

    #[test]
    fn test_endpoint_parse_invalid() {
        for input in ["unix://", "docker.sock", "tcp://localhost", "tcp://:80", "ssh://host:22"] {
            assert!(input.parse::<Endpoint>().is_err(), "{input} should not parse");
        }
    }
}
