//! Connection-tracking table rows

use std::fmt;

/// Protocol token that marks a UDP row
const UDP_MARKER: &str = "udp";

/// Address and port as written in the table
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Endpoint {
    /// Address literal
    pub host: String,
    /// Port literal, empty if the row carried none
    pub port: String,
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.port.is_empty() {
            write!(f, "{}", self.host)
        } else {
            write!(f, "{}:{}", self.host, self.port)
        }
    }
}

/// Which occurrence of each repeated key has been consumed
///
/// Every row lists `src`, `sport`, `dst` and `dport` twice: first for the
/// original direction, then for the reply direction.
#[derive(Debug, Default)]
struct Seen {
    src: bool,
    sport: bool,
    dst: bool,
    dport: bool,
}

/// One UDP flow from the tracking table
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConnectionRecord {
    /// Original-direction source
    pub local_source: Endpoint,
    /// Original-direction destination, i.e. where the client meant to go
    pub local_destination: Endpoint,
    /// Reply-direction source
    pub remote_source: Endpoint,
    /// Reply-direction destination
    pub remote_destination: Endpoint,
    /// Reply-direction source port, the port of the local listener
    pub proxy_port: String,
}

impl ConnectionRecord {
    /// Parse a table line, `None` unless it is a UDP row
    pub fn parse(line: &str) -> Option<Self> {
        if !line.split_whitespace().any(|token| token == UDP_MARKER) {
            return None;
        }

        let mut seen = Seen::default();
        let mut record = Self::default();

        for token in line.split_whitespace() {
            let Some((key, value)) = token.split_once('=') else {
                continue;
            };
            match key {
                "src" if !seen.src => {
                    seen.src = true;
                    record.local_source.host = value.to_string();
                }
                "src" => record.remote_source.host = value.to_string(),
                "sport" if !seen.sport => {
                    seen.sport = true;
                    record.local_source.port = value.to_string();
                }
                "sport" => {
                    record.remote_source.port = value.to_string();
                    record.proxy_port = value.to_string();
                }
                "dst" if !seen.dst => {
                    seen.dst = true;
                    record.local_destination.host = value.to_string();
                }
                "dst" => record.remote_destination.host = value.to_string(),
                "dport" if !seen.dport => {
                    seen.dport = true;
                    record.local_destination.port = value.to_string();
                }
                "dport" => record.remote_destination.port = value.to_string(),
                _ => {}
            }
        }

        Some(record)
    }

    /// Whether the reply side of this flow goes to `client` from `listen_port`
    pub fn matches(&self, client: &str, listen_port: &str) -> bool {
        self.remote_destination.to_string() == client && self.proxy_port == listen_port
    }
}

impl fmt::Display for ConnectionRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "l_src={}, l_dst={}, r_src={}, r_dst={}, proxy_port={}",
            self.local_source,
            self.local_destination,
            self.remote_source,
            self.remote_destination,
            self.proxy_port
        )
    }
}
