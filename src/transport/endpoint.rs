//! Endpoint addresses.
//!
//! Accepted forms:
//! - `tcp://host:port` or bare `host:port`
//! - `unix:/path/to.sock` or `unix:///path/to.sock` (Unix only)

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use crate::error::{GloveError, Result};

/// Where to connect or listen.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Endpoint {
    /// `host:port` for a TCP socket.
    Tcp(String),
    /// Filesystem path of a Unix domain socket.
    Unix(PathBuf),
}

impl Endpoint {
    /// Parse an endpoint string.
    pub fn parse(s: &str) -> Result<Self> {
        let s = s.trim();
        if let Some(path) = s.strip_prefix("unix://").or_else(|| s.strip_prefix("unix:")) {
            if path.is_empty() {
                return Err(GloveError::Config(format!("empty unix socket path in `{s}`")));
            }
            return Ok(Endpoint::Unix(PathBuf::from(path)));
        }

        let addr = s.strip_prefix("tcp://").unwrap_or(s);
        match addr.rsplit_once(':') {
            Some((host, port)) if !host.is_empty() && port.parse::<u16>().is_ok() => {
                Ok(Endpoint::Tcp(addr.to_string()))
            }
            _ => Err(GloveError::Config(format!(
                "invalid endpoint `{s}` (expected tcp://host:port or unix:/path)"
            ))),
        }
    }

    /// Check whether a string looks like a network endpoint rather than a
    /// device path.
    pub fn looks_like_endpoint(s: &str) -> bool {
        s.starts_with("tcp://") || s.starts_with("unix:")
    }
}

impl FromStr for Endpoint {
    type Err = GloveError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Endpoint::Tcp(addr) => write!(f, "tcp://{addr}"),
            Endpoint::Unix(path) => write!(f, "unix:{}", path.display()),
        }
    }
}
