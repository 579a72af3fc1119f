//! Server addresses.

use crate::error::{GearError, GearResult};
use crate::DEFAULT_PORT;
use std::fmt;
use std::str::FromStr;

/// Host and port of a job server.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ServerAddress {
    pub host: String,
    pub port: u16,
}

impl ServerAddress {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }

    /// Parses `host`, `host:port`, `[v6]` or `[v6]:port`.
    ///
    /// A missing port means [`DEFAULT_PORT`].
    ///
    /// # Example
    /// ```
    /// use gearmux::ServerAddress;
    /// let addr = ServerAddress::parse("jobs.internal").unwrap();
    /// assert_eq!(addr.port, 4730);
    /// let addr = ServerAddress::parse("[::1]:4731").unwrap();
    /// assert_eq!(addr.host, "::1");
    /// ```
    pub fn parse(input: &str) -> GearResult<Self> {
        let input = input.trim();
        let invalid = || GearError::InvalidAddress(input.to_string());

        let (host, port) = if let Some(rest) = input.strip_prefix('[') {
            let (host, after) = rest.split_once(']').ok_or_else(invalid)?;
            match after {
                "" => (host, None),
                _ => (host, Some(after.strip_prefix(':').ok_or_else(invalid)?)),
            }
        } else {
            match input.split_once(':') {
                // A bare IPv6 literal has more than one colon and no port.
                Some((_, rest)) if rest.contains(':') => (input, None),
                Some((host, port)) => (host, Some(port)),
                None => (input, None),
            }
        };

        if host.is_empty() {
            return Err(invalid());
        }
        let port = match port {
            Some(port) => port.parse::<u16>().map_err(|_| invalid())?,
            None => DEFAULT_PORT,
        };
        Ok(Self::new(host, port))
    }
}

impl FromStr for ServerAddress {
    type Err = GearError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl From<(&str, u16)> for ServerAddress {
    fn from((host, port): (&str, u16)) -> Self {
        Self::new(host, port)
    }
}

impl From<(String, u16)> for ServerAddress {
    fn from((host, port): (String, u16)) -> Self {
        Self::new(host, port)
    }
}

impl fmt::Display for ServerAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.host.contains(':') {
            write!(f, "[{}]:{}", self.host, self.port)
        } else {
            write!(f, "{}:{}", self.host, self.port)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_host_only() {
        let addr = ServerAddress::parse("localhost").unwrap();
        assert_eq!(addr, ServerAddress::new("localhost", DEFAULT_PORT));
    }

    #[test]
    fn test_parse_host_and_port() {
        let addr: ServerAddress = "10.0.0.7:4800".parse().unwrap();
        assert_eq!(addr, ServerAddress::new("10.0.0.7", 4800));
    }

    #[test]
    fn test_parse_ipv6() {
        assert_eq!(
            ServerAddress::parse("[::1]:4731").unwrap(),
            ServerAddress::new("::1", 4731)
        );
        assert_eq!(
            ServerAddress::parse("[fe80::1]").unwrap(),
            ServerAddress::new("fe80::1", DEFAULT_PORT)
        );
        assert_eq!(
            ServerAddress::parse("::1").unwrap(),
            ServerAddress::new("::1", DEFAULT_PORT)
        );
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!(ServerAddress::parse("").is_err());
        assert!(ServerAddress::parse(":4730").is_err());
        assert!(ServerAddress::parse("host:port").is_err());
        assert!(ServerAddress::parse("host:99999").is_err());
        assert!(ServerAddress::parse("[::1").is_err());
        assert!(ServerAddress::parse("[::1]4730").is_err());
    }

    #[test]
    fn test_display() {
        assert_eq!(ServerAddress::new("gm1", 4730).to_string(), "gm1:4730");
        assert_eq!(ServerAddress::new("::1", 4730).to_string(), "[::1]:4730");
    }
}
