//! URL validator (§4.4): rejects malformed drain URLs, unsupported schemes,
//! and URLs whose resolved host falls inside a forbidden IP range.

use std::net::IpAddr;
use tokio::net::lookup_host;
use url::Url;

use crate::error::SinkError;

/// An inclusive `[start, end]` IP range, compared by the numeric ordering of
/// the address (IPv4 and IPv6 ranges never overlap with each other).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IpRange {
    pub start: IpAddr,
    pub end: IpAddr,
}

impl IpRange {
    pub fn new(start: IpAddr, end: IpAddr) -> Self {
        Self { start, end }
    }

    fn contains(&self, addr: IpAddr) -> bool {
        match (self.start, self.end, addr) {
            (IpAddr::V4(s), IpAddr::V4(e), IpAddr::V4(a)) => {
                u32::from(a) >= u32::from(s) && u32::from(a) <= u32::from(e)
            }
            (IpAddr::V6(s), IpAddr::V6(e), IpAddr::V6(a)) => {
                u128::from(a) >= u128::from(s) && u128::from(a) <= u128::from(e)
            }
            _ => false,
        }
    }
}

/// Scheme support named in §4.4: `syslog`, `syslog-tls`, `https`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scheme {
    Syslog,
    SyslogTls,
    Https,
}

impl Scheme {
    fn parse(s: &str) -> Option<Self> {
        match s {
            "syslog" => Some(Self::Syslog),
            "syslog-tls" => Some(Self::SyslogTls),
            "https" => Some(Self::Https),
            _ => None,
        }
    }
}

struct ParsedUrl {
    scheme: String,
    host: String,
    port: u16,
}

/// Drain URLs are `scheme://host:port`, no path/query. The port is required
/// explicitly: `Url::port()` only returns a default for schemes `url` treats
/// as "special" (http/https/ws/...), and a missing port should still be
/// rejected as malformed regardless of scheme.
fn parse_url(url: &str) -> Option<ParsedUrl> {
    let parsed = Url::parse(url).ok()?;
    let host = parsed.host_str()?;
    let port = parsed.port()?;
    if host.is_empty() {
        return None;
    }
    Some(ParsedUrl { scheme: parsed.scheme().to_string(), host: host.to_string(), port })
}

/// The URL validator. Holds the list of forbidden IP ranges passed to
/// `SinkManager::new` at construction time.
#[derive(Debug, Clone, Default)]
pub struct Blacklist {
    ranges: Vec<IpRange>,
}

impl Blacklist {
    pub fn new(ranges: Vec<IpRange>) -> Self {
        Self { ranges }
    }

    fn is_blacklisted(&self, addr: IpAddr) -> bool {
        self.ranges.iter().any(|r| r.contains(addr))
    }

    /// Validate a drain URL: scheme support, well-formedness, and whether
    /// the resolved host falls inside any configured range.
    ///
    /// Resolution tries the host as a literal IP first; only if that fails
    /// does it perform a DNS lookup, matching §4.4's "literal IP when
    /// possible, otherwise a single DNS lookup" rule.
    pub async fn validate(&self, url: &str) -> Result<(), SinkError> {
        let parsed = parse_url(url).ok_or_else(|| SinkError::MalformedDrainUrl { url: url.to_string() })?;

        if Scheme::parse(&parsed.scheme).is_none() {
            return Err(SinkError::UnsupportedScheme { scheme: parsed.scheme });
        }

        if let Ok(addr) = parsed.host.parse::<IpAddr>() {
            return self.check(addr, url);
        }

        let lookup_target = format!("{}:{}", parsed.host, parsed.port);
        let mut addrs = lookup_host(&lookup_target)
            .await
            .map_err(|_| SinkError::MalformedDrainUrl { url: url.to_string() })?;

        let Some(first) = addrs.next() else {
            return Err(SinkError::MalformedDrainUrl { url: url.to_string() });
        };

        self.check(first.ip(), url)
    }

    fn check(&self, addr: IpAddr, url: &str) -> Result<(), SinkError> {
        if self.is_blacklisted(addr) {
            Err(SinkError::BlacklistedDrainUrl { url: url.to_string() })
        } else {
            Ok(())
        }
    }
}
