//! File-based settings: the upstream nameservers to delegate to, and
//! the UDP truncation threshold.  The `config` crate figures out the
//! file format from the extension.

use config::{Config, ConfigError, File};
use serde::Deserialize;
use std::net::Ipv4Addr;

use dns_delegate::delegate::Upstream;

/// The RFC 1035 limit on what fits in a UDP datagram.
pub const DEFAULT_UDP_TRUNCATE_LENGTH: usize = 512;

#[derive(Debug, Clone, Eq, PartialEq, Deserialize)]
pub struct Settings {
    /// Where unanswered questions get delegated to, probed in
    /// parallel.
    #[serde(default)]
    pub upstream_nameservers: Vec<UpstreamSetting>,

    /// Responses whose encoding exceeds this many octets are sent
    /// over UDP as an empty message with the TC flag set.
    #[serde(default = "default_udp_truncate_length")]
    pub udp_truncate_length: usize,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            upstream_nameservers: Vec::new(),
            udp_truncate_length: DEFAULT_UDP_TRUNCATE_LENGTH,
        }
    }
}

#[derive(Debug, Copy, Clone, Eq, PartialEq, Deserialize)]
pub struct UpstreamSetting {
    pub address: Ipv4Addr,
    #[serde(default = "default_upstream_port")]
    pub port: u16,
}

fn default_udp_truncate_length() -> usize {
    DEFAULT_UDP_TRUNCATE_LENGTH
}

fn default_upstream_port() -> u16 {
    53
}

impl Settings {
    pub fn new(filename: &str) -> Result<Self, ConfigError> {
        Config::builder()
            .add_source(File::with_name(filename))
            .build()?
            .try_deserialize()
    }

    pub fn upstreams(&self) -> Vec<Upstream> {
        self.upstream_nameservers
            .iter()
            .map(|u| Upstream {
                address: u.address,
                port: u.port,
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use config::FileFormat;

    fn from_toml(source: &str) -> Settings {
        Config::builder()
            .add_source(File::from_str(source, FileFormat::Toml))
            .build()
            .unwrap()
            .try_deserialize()
            .unwrap()
    }

    #[test]
    fn parses_upstreams_with_default_port() {
        let settings = from_toml(
            r#"
            [[upstream_nameservers]]
            address = "1.1.1.1"

            [[upstream_nameservers]]
            address = "10.0.0.53"
            port = 5353
            "#,
        );

        assert_eq!(
            vec![
                Upstream {
                    address: Ipv4Addr::new(1, 1, 1, 1),
                    port: 53
                },
                Upstream {
                    address: Ipv4Addr::new(10, 0, 0, 53),
                    port: 5353
                },
            ],
            settings.upstreams()
        );
        assert_eq!(DEFAULT_UDP_TRUNCATE_LENGTH, settings.udp_truncate_length);
    }

    #[test]
    fn truncate_length_is_overridable() {
        let settings = from_toml("udp_truncate_length = 1232");

        assert_eq!(1232, settings.udp_truncate_length);
        assert_eq!(Vec::<Upstream>::new(), settings.upstreams());
    }
}
