use core::net::Ipv4Addr;

use crate::read_buffer::ReadBuffer;
use crate::stack::StackId;
use crate::write_queue::WriteQueue;

/// One side of a TCP connection: IPv4 address plus port.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Endpoint {
    pub addr: Ipv4Addr,
    pub port: u16,
}

impl Endpoint {
    pub const fn new(addr: Ipv4Addr, port: u16) -> Self {
        Self { addr, port }
    }
}

/// The closed TCP state machine.
///
/// Exactly these eleven states exist; the snapshot codec maps them to tags
/// 0-10 in declaration order and rejects everything else.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TcpState {
    Closed,
    Listen,
    SynSent,
    SynReceived,
    Established,
    FinWait1,
    FinWait2,
    CloseWait,
    Closing,
    LastAck,
    TimeWait,
}

/// Transmission control block: the per-connection sequence/window scalars.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Tcb {
    pub snd_una: u32,
    pub snd_nxt: u32,
    pub snd_wnd: u32,
    pub snd_wl1: u32,
    pub snd_wl2: u32,
    pub iss: u32,
    pub rcv_nxt: u32,
    pub rcv_wnd: u32,
    pub irs: u32,
    pub ssthresh: u32,
    pub cwnd: u32,
    pub recover: u32,
}

/// Smoothed round-trip measurement state.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RttEstimator {
    pub srtt_us: u32,
    pub rttvar_us: u32,
    pub rto_ms: u32,
}

/// Handle to the connection's retransmission timer.
///
/// Only the armed/disarmed bit is connection state; the timer's schedule
/// lives in the timer wheel and cannot cross an image replacement. Restore
/// re-derives a running timer by arming a fresh one.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RtxTimer {
    running: bool,
}

impl RtxTimer {
    pub fn is_running(&self) -> bool {
        self.running
    }

    pub fn start(&mut self) {
        self.running = true;
    }

    pub fn stop(&mut self) {
        self.running = false;
    }
}

/// A live TCP connection, as seen by the live-update codec.
///
/// Everything here is either restored verbatim from a snapshot record or,
/// for the endpoint identity and owning stack, supplied out of band when the
/// connection shell is constructed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Connection {
    /// Owning network-stack instance. Fixed at construction.
    pub stack: StackId,
    /// Fixed at construction; never restored by the codec.
    pub local: Endpoint,
    pub remote: Endpoint,

    pub tcb: Tcb,
    pub state: TcpState,
    pub prev_state: TcpState,
    pub rtt: RttEstimator,

    pub rtx_attempt: u8,
    pub syn_rtx: u8,
    pub queued: u32,

    pub fast_recovery: bool,
    pub reno_fpack_seen: bool,
    pub limited_tx: bool,
    pub dup_acks: u8,

    pub highest_ack: u32,
    pub prev_highest_ack: u32,
    pub last_acked_ts_ms: u64,
    pub dack: u32,
    pub last_ack_sent: bool,

    pub rtx_timer: RtxTimer,
    pub write_queue: WriteQueue,
    /// Pending read request, if the application has one outstanding. `None`
    /// snapshots as a zero-capacity placeholder.
    pub read_request: Option<ReadBuffer>,
}

impl Connection {
    /// Build a connection shell with identity only; every other field starts
    /// at its quiescent default and is filled in by the protocol engine or
    /// by snapshot restore.
    pub fn new(stack: StackId, local: Endpoint, remote: Endpoint) -> Self {
        Self {
            stack,
            local,
            remote,
            tcb: Tcb::default(),
            state: TcpState::Closed,
            prev_state: TcpState::Closed,
            rtt: RttEstimator::default(),
            rtx_attempt: 0,
            syn_rtx: 0,
            queued: 0,
            fast_recovery: false,
            reno_fpack_seen: false,
            limited_tx: false,
            dup_acks: 0,
            highest_ack: 0,
            prev_highest_ack: 0,
            last_acked_ts_ms: 0,
            dack: 0,
            last_ack_sent: false,
            rtx_timer: RtxTimer::default(),
            write_queue: WriteQueue::new(),
            read_request: None,
        }
    }

    /// Outbound bytes still owed to the peer.
    pub fn sendq_remaining(&self) -> u64 {
        self.write_queue.remaining()
    }
}
