#![forbid(unsafe_code)]

//! TCP connection state transfer for live update.
//!
//! A live update replaces the running unikernel image with a new one without
//! dropping established TCP connections: immediately before the old image is
//! torn down, every live connection is encoded into a flat in-memory record;
//! immediately after the new image boots (and before packet processing
//! resumes), each record is decoded back into a live connection and inserted
//! into its owning stack's active-connection table.
//!
//! This crate carries the connection-side state the codec snapshots (the
//! transmission control block, the outbound write queue with its progress
//! cursors, the inbound reassembly buffer, and the retransmission-timer
//! armed bit) plus the serializers themselves in [`serialize`]. The TCP
//! protocol engine itself (segment parsing, congestion control,
//! retransmission) is not part of this crate; only its state crosses the
//! update.
//!
//! Encode and decode run single-threaded at exactly two points in the image
//! lifecycle and are never concurrent with live protocol processing, so
//! nothing here locks.

mod connection;
mod read_buffer;
pub mod serialize;
mod stack;
mod write_queue;

pub use connection::{Connection, Endpoint, RttEstimator, RtxTimer, Tcb, TcpState};
pub use read_buffer::ReadBuffer;
pub use serialize::{
    restore_batch, restore_connection, snapshot_connections, RestoreContext, RestoreReport,
    TCP_SNAPSHOT_VERSION,
};
pub use skiff_snapshot::{Result, SnapshotError};
pub use stack::{NetworkStack, StackId};
pub use write_queue::WriteQueue;
