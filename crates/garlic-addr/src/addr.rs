//! Generic layered addresses
//!
//! The surrounding stack routes on addresses built from protocol-tagged
//! segments rendered as `/tag/value` paths, e.g. `/garlic64/<text>` or
//! `/ip4/127.0.0.1/tcp/4001`. Only the two garlic families are dialable
//! by this transport; the IP/TCP tags exist so foreign addresses can be
//! represented and cheaply rejected.

use crate::dest::{DestForm, Destination};
use crate::error::AddrError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::Ipv4Addr;
use std::str::FromStr;

/// Protocol tags a layered address can carry
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Protocol {
    /// Full-form overlay destination
    Garlic64,
    /// Hash-form overlay destination
    Garlic32,
    /// IPv4 host
    Ip4,
    /// TCP port
    Tcp,
}

impl Protocol {
    /// Textual tag used in the path rendering
    pub fn tag(&self) -> &'static str {
        match self {
            Protocol::Garlic64 => "garlic64",
            Protocol::Garlic32 => "garlic32",
            Protocol::Ip4 => "ip4",
            Protocol::Tcp => "tcp",
        }
    }
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}

/// One protocol-tagged component of a layered address
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum Segment {
    /// Full-form destination text
    Garlic64(String),
    /// Hash-form destination payload, without the DNS-style suffix
    Garlic32(String),
    Ip4(Ipv4Addr),
    Tcp(u16),
}

impl Segment {
    /// The protocol tag of this segment
    pub fn protocol(&self) -> Protocol {
        match self {
            Segment::Garlic64(_) => Protocol::Garlic64,
            Segment::Garlic32(_) => Protocol::Garlic32,
            Segment::Ip4(_) => Protocol::Ip4,
            Segment::Tcp(_) => Protocol::Tcp,
        }
    }
}

impl fmt::Display for Segment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Segment::Garlic64(text) => write!(f, "/garlic64/{text}"),
            Segment::Garlic32(text) => write!(f, "/garlic32/{text}"),
            Segment::Ip4(ip) => write!(f, "/ip4/{ip}"),
            Segment::Tcp(port) => write!(f, "/tcp/{port}"),
        }
    }
}

/// A non-empty sequence of segments
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct LayeredAddr {
    segments: Vec<Segment>,
}

impl LayeredAddr {
    /// Build from segments; at least one is required
    pub fn from_segments(segments: Vec<Segment>) -> Result<Self, AddrError> {
        if segments.is_empty() {
            return Err(AddrError::Malformed("empty address".to_string()));
        }
        Ok(Self { segments })
    }

    /// All segments in order
    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    /// The outermost (first) segment
    pub fn first(&self) -> &Segment {
        &self.segments[0]
    }

    /// Whether this address names an overlay destination
    pub fn is_overlay(&self) -> bool {
        matches!(
            self.first().protocol(),
            Protocol::Garlic64 | Protocol::Garlic32
        )
    }
}

impl From<Segment> for LayeredAddr {
    fn from(segment: Segment) -> Self {
        Self {
            segments: vec![segment],
        }
    }
}

impl fmt::Display for LayeredAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for segment in &self.segments {
            write!(f, "{segment}")?;
        }
        Ok(())
    }
}

impl FromStr for LayeredAddr {
    type Err = AddrError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut parts = s.split('/');
        match parts.next() {
            Some("") => {}
            _ => {
                return Err(AddrError::Malformed(format!(
                    "address must start with '/': {s:?}"
                )))
            }
        }

        let mut segments = Vec::new();
        while let Some(tag) = parts.next() {
            let value = parts
                .next()
                .ok_or_else(|| AddrError::Malformed(format!("tag {tag:?} has no value")))?;
            let segment = match tag {
                "garlic64" => {
                    let dest = Destination::parse(value)?;
                    if dest.form() != DestForm::Full {
                        return Err(AddrError::Malformed(
                            "garlic64 requires a full-form destination".to_string(),
                        ));
                    }
                    Segment::Garlic64(value.to_string())
                }
                "garlic32" => {
                    let dest = Destination::parse(value)?;
                    match dest.short_payload() {
                        Some(payload) => Segment::Garlic32(payload.to_string()),
                        None => {
                            return Err(AddrError::Malformed(
                                "garlic32 requires a hash-form destination".to_string(),
                            ))
                        }
                    }
                }
                "ip4" => Segment::Ip4(value.parse().map_err(|_| {
                    AddrError::Malformed(format!("invalid ip4 value {value:?}"))
                })?),
                "tcp" => Segment::Tcp(value.parse().map_err(|_| {
                    AddrError::Malformed(format!("invalid tcp port {value:?}"))
                })?),
                other => return Err(AddrError::UnsupportedFamily(other.to_string())),
            };
            segments.push(segment);
        }
        Self::from_segments(segments)
    }
}

impl TryFrom<String> for LayeredAddr {
    type Error = AddrError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<LayeredAddr> for String {
    fn from(value: LayeredAddr) -> Self {
        value.to_string()
    }
}
