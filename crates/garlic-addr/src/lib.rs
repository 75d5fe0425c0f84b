//! Address layer for the garlic transport
//!
//! This crate provides:
//! - Validation of the overlay's two destination encodings
//! - The layered address format the surrounding stack routes on
//! - The pure translator between the two representations
//!
//! Everything here is side-effect free: no I/O, no shared state, safe to
//! call from any number of tasks.

pub mod addr;
pub mod dest;
pub mod encoding;
pub mod error;
pub mod translate;

pub use addr::{LayeredAddr, Protocol, Segment};
pub use dest::{DestForm, Destination};
pub use error::AddrError;
pub use translate::{to_destination, to_overlay_addr};
