use thiserror::Error;

pub type Result<T> = std::result::Result<T, SnapshotError>;

/// Errors shared by every live-update snapshot codec.
///
/// None of these are retryable: a record that fails to decode is abandoned
/// and the batch orchestrator moves on to the next one.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SnapshotError {
    /// The record was written by a different codec build. Version mismatches
    /// are never translated.
    #[error("snapshot version mismatch (running version {expected}, record version {found})")]
    VersionMismatch { expected: u16, found: u16 },

    /// A state tag outside the closed TCP state set.
    #[error("unknown TCP state tag {0}")]
    UnknownState(u8),

    /// A read or write would run past the supplied region.
    #[error("snapshot region too small ({needed} bytes needed, {available} available)")]
    BoundsExceeded { needed: usize, available: usize },

    /// A structural invariant of the record does not hold.
    #[error("corrupt snapshot: {0}")]
    Corrupt(&'static str),
}
