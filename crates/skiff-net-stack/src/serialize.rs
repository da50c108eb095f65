//! Live-update serializers for TCP connection state.
//!
//! A connection snapshot is one flat record: a fixed-width scalar header,
//! then the write-queue section, then the read-buffer section, back to back
//! with no delimiters. Nothing is self-delimiting beyond its fixed width;
//! each codec returns the exact byte count it produced or consumed and the
//! parent uses that count as the next section's start offset.
//!
//! All integers are little-endian. "Word-sized" counts from the original
//! layout are pinned to `u64`.
//!
//! Endpoint identity is written into the record (the restore factory needs
//! it to build the connection shell) but is never restored onto an existing
//! connection: identity is supplied at construction and stays fixed.

use std::collections::BTreeSet;

use core::net::Ipv4Addr;
use skiff_snapshot::{Decoder, Encoder, Result, SnapshotError};

use crate::connection::{Connection, Endpoint, TcpState};
use crate::read_buffer::ReadBuffer;
use crate::stack::{NetworkStack, StackId};
use crate::write_queue::WriteQueue;

/// Version of the on-wire connection record layout. Any layout change bumps
/// this; a record carrying a different version is never translated, its
/// restore is abandoned.
pub const TCP_SNAPSHOT_VERSION: u16 = 1;

/// Fixed scalar header size: version, endpoints, TCB scalars, RTT state,
/// retransmit counters, flags, both state tags, timer-armed flag.
pub const CONNECTION_HEADER_LEN: usize = 108;

/// Write-queue section header: three cursors plus the chunk count.
pub const WRITEQ_HEADER_LEN: usize = 20;

/// Read-buffer section header: capacity, start seq, head, hole, FIN flag.
pub const READBUF_HEADER_LEN: usize = 21;

// Records are built by the image being replaced, but decode still treats
// them as untrusted: a corrupted region must not force pathological
// allocations.
const MAX_WRITEQ_CHUNKS: u64 = 65_536;
const MAX_CHUNK_BYTES: u64 = 16 * 1024 * 1024;
const MAX_READ_BUFFER_BYTES: u64 = 16 * 1024 * 1024;

impl TcpState {
    /// Compact tag for the state machine identity, 0-10.
    pub fn tag(self) -> u8 {
        match self {
            TcpState::Closed => 0,
            TcpState::Listen => 1,
            TcpState::SynSent => 2,
            TcpState::SynReceived => 3,
            TcpState::Established => 4,
            TcpState::FinWait1 => 5,
            TcpState::FinWait2 => 6,
            TcpState::CloseWait => 7,
            TcpState::Closing => 8,
            TcpState::LastAck => 9,
            TcpState::TimeWait => 10,
        }
    }

    /// Inverse of [`TcpState::tag`]. There is no fallback state: a tag
    /// outside 0-10 fails.
    pub fn from_tag(tag: u8) -> Result<Self> {
        Ok(match tag {
            0 => TcpState::Closed,
            1 => TcpState::Listen,
            2 => TcpState::SynSent,
            3 => TcpState::SynReceived,
            4 => TcpState::Established,
            5 => TcpState::FinWait1,
            6 => TcpState::FinWait2,
            7 => TcpState::CloseWait,
            8 => TcpState::Closing,
            9 => TcpState::LastAck,
            10 => TcpState::TimeWait,
            _ => return Err(SnapshotError::UnknownState(tag)),
        })
    }
}

fn encode_endpoint(enc: Encoder, ep: Endpoint) -> Encoder {
    enc.bytes(&ep.addr.octets()).u16(ep.port)
}

fn decode_endpoint(d: &mut Decoder<'_>) -> Result<Endpoint> {
    let b = d.bytes(4)?;
    let addr = Ipv4Addr::new(b[0], b[1], b[2], b[3]);
    let port = d.u16()?;
    Ok(Endpoint::new(addr, port))
}

impl WriteQueue {
    /// Encode the backlog into `dest`, returning the bytes written.
    pub fn serialize_into(&self, dest: &mut [u8]) -> Result<usize> {
        self.encode_onto(Encoder::with_capacity(self.snapshot_len()))
            .finish_into(dest)
    }

    /// Decode a backlog from the front of `src`, returning it with the bytes
    /// consumed. Cursors come back verbatim, never recomputed.
    pub fn deserialize_from(src: &[u8]) -> Result<(WriteQueue, usize)> {
        let mut d = Decoder::new(src);
        let q = Self::decode(&mut d)?;
        Ok((q, d.position()))
    }

    /// Exact encoded size of this backlog.
    pub fn snapshot_len(&self) -> usize {
        WRITEQ_HEADER_LEN + self.chunks().map(|chunk| 8 + chunk.len()).sum::<usize>()
    }

    pub(crate) fn encode_onto(&self, enc: Encoder) -> Encoder {
        let mut enc = enc
            .u32(self.current())
            .u32(self.offset())
            .u32(self.acked())
            .u64(self.len() as u64);
        for chunk in self.chunks() {
            enc = enc.u64(chunk.len() as u64).bytes(chunk);
        }
        enc
    }

    pub(crate) fn decode(d: &mut Decoder<'_>) -> Result<WriteQueue> {
        let current = d.u32()?;
        let offset = d.u32()?;
        let acked = d.u32()?;
        let count = d.u64()?;
        if count > MAX_WRITEQ_CHUNKS {
            return Err(SnapshotError::Corrupt("write queue chunk count"));
        }

        let mut q = WriteQueue::new();
        q.restore_cursors(current, offset, acked);
        for _ in 0..count {
            let len = d.u64()?;
            if len > MAX_CHUNK_BYTES {
                return Err(SnapshotError::Corrupt("write queue chunk length"));
            }
            q.push(d.bytes(len as usize)?.to_vec());
        }
        Ok(q)
    }
}

struct ReadBufferHeader {
    cap: u64,
    seq: u32,
    head: i32,
    hole: i32,
    fin_seen: bool,
}

impl ReadBufferHeader {
    fn decode(d: &mut Decoder<'_>) -> Result<Self> {
        let cap = d.u64()?;
        let seq = d.u32()?;
        let head = d.i32()?;
        let hole = d.i32()?;
        let fin_seen = d.bool()?;
        if cap > MAX_READ_BUFFER_BYTES {
            return Err(SnapshotError::Corrupt("read buffer capacity"));
        }
        if cap > 0 {
            if head < 0 || head as u64 > cap {
                return Err(SnapshotError::Corrupt("read buffer head past capacity"));
            }
            if hole < 0 || hole > head {
                return Err(SnapshotError::Corrupt("read buffer hole past head"));
            }
        }
        Ok(Self {
            cap,
            seq,
            head,
            hole,
            fin_seen,
        })
    }
}

impl ReadBuffer {
    /// Encode the buffer into `dest`: header then the buffered `[0, head)`
    /// bytes. Returns the bytes written.
    pub fn serialize_into(&self, dest: &mut [u8]) -> Result<usize> {
        self.encode_onto(Encoder::with_capacity(self.snapshot_len()))
            .finish_into(dest)
    }

    /// Restore head, hole, the FIN flag and the buffered bytes from the
    /// front of `src`, returning the bytes consumed.
    ///
    /// Capacity and start sequence must already have been established when
    /// this buffer was allocated; the record's declared values must match.
    pub fn deserialize_from(&mut self, src: &[u8]) -> Result<usize> {
        let mut d = Decoder::new(src);
        let hdr = ReadBufferHeader::decode(&mut d)?;
        if hdr.cap as usize != self.capacity() {
            return Err(SnapshotError::Corrupt("read buffer capacity mismatch"));
        }
        if hdr.seq != self.start_seq() {
            return Err(SnapshotError::Corrupt("read buffer start sequence mismatch"));
        }
        let data = d.bytes(hdr.head.max(0) as usize)?;
        self.restore(hdr.head, hdr.hole, hdr.fin_seen, data);
        Ok(d.position())
    }

    /// Exact encoded size of this buffer.
    pub fn snapshot_len(&self) -> usize {
        READBUF_HEADER_LEN + self.size()
    }

    pub(crate) fn encode_onto(&self, enc: Encoder) -> Encoder {
        enc.u64(self.capacity() as u64)
            .u32(self.start_seq())
            .i32(self.head())
            .i32(self.hole())
            .bool(self.fin_seen())
            .bytes(self.data())
    }
}

/// Zero-capacity read-buffer placeholder: written when a connection has no
/// pending read request, decoded as "materialize no buffer".
fn encode_readbuf_placeholder(enc: Encoder) -> Encoder {
    enc.u64(0).u32(0).i32(0).i32(0).bool(false)
}

impl Connection {
    /// Exact encoded size of this connection's record. Callers size the
    /// destination region with this (summed across connections) before
    /// committing an encode pass; the codec itself imposes no upper bound.
    pub fn snapshot_len(&self) -> usize {
        CONNECTION_HEADER_LEN
            + self.write_queue.snapshot_len()
            + match &self.read_request {
                Some(buffer) => buffer.snapshot_len(),
                None => READBUF_HEADER_LEN,
            }
    }

    /// Encode the full connection state into `dest`, returning the bytes
    /// written. When the region is too small this fails with
    /// [`SnapshotError::BoundsExceeded`] and leaves `dest` untouched.
    pub fn serialize_into(&self, dest: &mut [u8]) -> Result<usize> {
        let mut enc = Encoder::with_capacity(self.snapshot_len()).u16(TCP_SNAPSHOT_VERSION);
        enc = encode_endpoint(enc, self.local);
        enc = encode_endpoint(enc, self.remote);

        enc = enc
            .u32(self.tcb.snd_una)
            .u32(self.tcb.snd_nxt)
            .u32(self.tcb.snd_wnd)
            .u32(self.tcb.snd_wl1)
            .u32(self.tcb.snd_wl2)
            .u32(self.tcb.iss)
            .u32(self.tcb.rcv_nxt)
            .u32(self.tcb.rcv_wnd)
            .u32(self.tcb.irs)
            .u32(self.tcb.ssthresh)
            .u32(self.tcb.cwnd)
            .u32(self.tcb.recover)
            .u32(self.rtt.srtt_us)
            .u32(self.rtt.rttvar_us)
            .u32(self.rtt.rto_ms)
            .u8(self.rtx_attempt)
            .u8(self.syn_rtx)
            .u32(self.queued)
            .bool(self.fast_recovery)
            .bool(self.reno_fpack_seen)
            .bool(self.limited_tx)
            .u8(self.dup_acks)
            .u32(self.highest_ack)
            .u32(self.prev_highest_ack)
            .u64(self.last_acked_ts_ms)
            .u32(self.dack)
            .bool(self.last_ack_sent)
            .u8(self.state.tag())
            .u8(self.prev_state.tag())
            .bool(self.rtx_timer.is_running());
        debug_assert_eq!(enc.len(), CONNECTION_HEADER_LEN);

        enc = self.write_queue.encode_onto(enc);
        enc = match &self.read_request {
            Some(buffer) => buffer.encode_onto(enc),
            None => encode_readbuf_placeholder(enc),
        };
        enc.finish_into(dest)
    }

    /// Restore this connection from the record at the front of `src`,
    /// returning the bytes consumed.
    ///
    /// The version gate runs before any field is written into `self`. After
    /// the scalar header, the write queue is restored; if it still holds
    /// undelivered data the owning stack is registered in `ctx` rather than
    /// woken here, because mid-batch its infrastructure may be only half
    /// restored. Then the read buffer is restored (allocating a read request
    /// iff the record's capacity is non-zero), and finally a previously
    /// armed retransmission timer is re-armed.
    pub fn deserialize_from(&mut self, src: &[u8], ctx: &mut RestoreContext) -> Result<usize> {
        let mut d = Decoder::new(src);

        let version = d.u16()?;
        if version != TCP_SNAPSHOT_VERSION {
            return Err(SnapshotError::VersionMismatch {
                expected: TCP_SNAPSHOT_VERSION,
                found: version,
            });
        }

        // Identity was fixed at construction; skip the record's copy.
        let _local = decode_endpoint(&mut d)?;
        let _remote = decode_endpoint(&mut d)?;

        self.tcb.snd_una = d.u32()?;
        self.tcb.snd_nxt = d.u32()?;
        self.tcb.snd_wnd = d.u32()?;
        self.tcb.snd_wl1 = d.u32()?;
        self.tcb.snd_wl2 = d.u32()?;
        self.tcb.iss = d.u32()?;
        self.tcb.rcv_nxt = d.u32()?;
        self.tcb.rcv_wnd = d.u32()?;
        self.tcb.irs = d.u32()?;
        self.tcb.ssthresh = d.u32()?;
        self.tcb.cwnd = d.u32()?;
        self.tcb.recover = d.u32()?;
        self.rtt.srtt_us = d.u32()?;
        self.rtt.rttvar_us = d.u32()?;
        self.rtt.rto_ms = d.u32()?;
        self.rtx_attempt = d.u8()?;
        self.syn_rtx = d.u8()?;
        self.queued = d.u32()?;
        self.fast_recovery = d.bool()?;
        self.reno_fpack_seen = d.bool()?;
        self.limited_tx = d.bool()?;
        self.dup_acks = d.u8()?;
        self.highest_ack = d.u32()?;
        self.prev_highest_ack = d.u32()?;
        self.last_acked_ts_ms = d.u64()?;
        self.dack = d.u32()?;
        self.last_ack_sent = d.bool()?;
        self.state = TcpState::from_tag(d.u8()?)?;
        self.prev_state = TcpState::from_tag(d.u8()?)?;
        let rtx_running = d.bool()?;

        self.write_queue = WriteQueue::decode(&mut d)?;
        if self.write_queue.remaining() > 0 {
            ctx.register(self.stack);
        }

        let hdr = ReadBufferHeader::decode(&mut d)?;
        self.read_request = if hdr.cap > 0 {
            let mut buffer = ReadBuffer::new(hdr.cap as usize, hdr.seq);
            let data = d.bytes(hdr.head.max(0) as usize)?;
            buffer.restore(hdr.head, hdr.hole, hdr.fin_seen, data);
            Some(buffer)
        } else {
            None
        };

        if rtx_running {
            self.rtx_timer.start();
        }

        Ok(d.position())
    }
}

/// Restore a connection from scratch: read the endpoint identity from the
/// record header, build a shell owned by `stack`, restore it, and insert it
/// into the stack's active-connection table. Returns the bytes consumed.
pub fn restore_connection(
    src: &[u8],
    stack: &mut NetworkStack,
    ctx: &mut RestoreContext,
) -> Result<usize> {
    let mut d = Decoder::new(src);
    let version = d.u16()?;
    if version != TCP_SNAPSHOT_VERSION {
        return Err(SnapshotError::VersionMismatch {
            expected: TCP_SNAPSHOT_VERSION,
            found: version,
        });
    }
    let local = decode_endpoint(&mut d)?;
    let remote = decode_endpoint(&mut d)?;

    let mut conn = Connection::new(stack.id(), local, remote);
    let consumed = conn.deserialize_from(src, ctx)?;
    stack.insert_connection(conn);
    Ok(consumed)
}

/// Tracks which stacks ended a restore batch owing retransmission work.
///
/// Owned by the restore orchestrator and threaded through every decode.
/// Registration happens during decode; the wake itself is deferred to one
/// [`RestoreContext::flush_all`] after the whole batch, so no stack resumes
/// transmission while its siblings are half restored.
#[derive(Debug, Default)]
pub struct RestoreContext {
    slumbering: BTreeSet<StackId>,
}

impl RestoreContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark a stack as owing a post-restore wake. Idempotent.
    pub fn register(&mut self, stack: StackId) {
        self.slumbering.insert(stack);
    }

    pub fn is_registered(&self, stack: StackId) -> bool {
        self.slumbering.contains(&stack)
    }

    /// Wake every slumbering stack exactly once. Consumes the context; call
    /// once at the end of the restore batch.
    pub fn flush_all<'a, I>(self, stacks: I)
    where
        I: IntoIterator<Item = &'a mut NetworkStack>,
    {
        for stack in stacks {
            if self.slumbering.contains(&stack.id()) {
                stack.force_start_send_queues();
            }
        }
    }
}

/// Outcome of a restore batch: how many records restored, and which were
/// skipped with what error.
#[derive(Debug, Default)]
pub struct RestoreReport {
    pub restored: usize,
    pub skipped: Vec<(usize, SnapshotError)>,
}

/// Encode every live connection of `stack`, one record per connection.
pub fn snapshot_connections(stack: &NetworkStack) -> Result<Vec<Vec<u8>>> {
    let mut records = Vec::with_capacity(stack.connection_count());
    for conn in stack.connections() {
        let mut record = vec![0u8; conn.snapshot_len()];
        let written = conn.serialize_into(&mut record)?;
        record.truncate(written);
        records.push(record);
    }
    Ok(records)
}

/// Restore a batch of connection records into `stack`.
///
/// A record that fails to decode is skipped and reported; the remaining
/// records are still restored. One bad record never aborts the batch.
/// Callers finish with [`RestoreContext::flush_all`] once every stack in the
/// image has been through its batch.
pub fn restore_batch<'a, I>(
    records: I,
    stack: &mut NetworkStack,
    ctx: &mut RestoreContext,
) -> RestoreReport
where
    I: IntoIterator<Item = &'a [u8]>,
{
    let mut report = RestoreReport::default();
    for (index, record) in records.into_iter().enumerate() {
        match restore_connection(record, stack, ctx) {
            Ok(_) => report.restored += 1,
            Err(err) => {
                tracing::warn!(record = index, %err, "skipping unrestorable tcp connection");
                report.skipped.push((index, err));
            }
        }
    }
    tracing::debug!(
        stack = stack.id().0,
        restored = report.restored,
        skipped = report.skipped.len(),
        "tcp connection restore batch complete"
    );
    report
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_len_matches_layout() {
        // version + 2 endpoints + 12 TCB + 3 RTT + 2 retransmit counters +
        // queued + 3 flags + dup_acks + 2 acks + timestamp + dack +
        // last_ack_sent + 2 state tags + timer flag.
        let len = 2 + 2 * 6 + 12 * 4 + 3 * 4 + 2 + 4 + 3 + 1 + 2 * 4 + 8 + 4 + 1 + 2 + 1;
        assert_eq!(len, CONNECTION_HEADER_LEN);
    }

    #[test]
    fn empty_queue_snapshot_is_header_only() {
        let q = WriteQueue::new();
        assert_eq!(q.snapshot_len(), WRITEQ_HEADER_LEN);
        let mut buf = [0u8; WRITEQ_HEADER_LEN];
        assert_eq!(q.serialize_into(&mut buf).unwrap(), WRITEQ_HEADER_LEN);
        let (restored, consumed) = WriteQueue::deserialize_from(&buf).unwrap();
        assert_eq!(consumed, WRITEQ_HEADER_LEN);
        assert!(restored.is_empty());
    }

    #[test]
    fn chunk_count_bound_is_enforced() {
        let bytes = Encoder::new()
            .u32(0)
            .u32(0)
            .u32(0)
            .u64(u64::MAX)
            .finish();
        assert_eq!(
            WriteQueue::deserialize_from(&bytes).unwrap_err(),
            SnapshotError::Corrupt("write queue chunk count")
        );
    }
}
