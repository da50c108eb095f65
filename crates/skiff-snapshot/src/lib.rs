#![forbid(unsafe_code)]

//! Snapshot codec infrastructure for live update.
//!
//! Live-update snapshots are built out of fixed-width little-endian fields
//! with pure length-driven framing: no delimiters, no padding, and no length
//! prefix around a whole record. A parent codec locates the next section by
//! feeding the previous section's returned byte count forward as an offset.
//! That only works if every encode/decode accounts for exactly the bytes it
//! produced or consumed, so the primitives here are a growable byte sink
//! ([`Encoder`]) and a bounds-checked cursor ([`Decoder`]) that make the
//! accounting explicit.
//!
//! Snapshots are transient (they live only in memory across an image
//! replacement) but are still treated as untrusted input on decode: every
//! read is bounds-checked and counts/lengths are validated by the callers.

mod codec;
mod error;

pub use codec::{Decoder, Encoder};
pub use error::{Result, SnapshotError};
