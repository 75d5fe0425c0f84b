//! Translation between destination text and layered addresses
//!
//! Both directions are pure and re-validate their input, so a segment
//! assembled by hand cannot smuggle an invalid destination through.

use crate::addr::{LayeredAddr, Segment};
use crate::dest::{Destination, SHORT_SUFFIX};
use crate::error::AddrError;

/// Wrap destination text in the matching garlic address
pub fn to_overlay_addr(dest_text: &str) -> Result<LayeredAddr, AddrError> {
    let dest = Destination::parse(dest_text)?;
    let segment = match dest.short_payload() {
        None => Segment::Garlic64(dest.as_str().to_string()),
        Some(payload) => Segment::Garlic32(payload.to_string()),
    };
    Ok(LayeredAddr::from(segment))
}

/// Extract the destination a garlic address names
///
/// Accepts exactly the two garlic families on the outermost segment and
/// rejects everything else. Hash-form destinations render with the
/// DNS-style suffix so the router can resolve them by name.
pub fn to_destination(addr: &LayeredAddr) -> Result<Destination, AddrError> {
    match addr.first() {
        Segment::Garlic64(text) => Destination::parse(text),
        Segment::Garlic32(payload) => Destination::parse(&format!("{payload}{SHORT_SUFFIX}")),
        other => Err(AddrError::UnsupportedFamily(other.protocol().to_string())),
    }
}
