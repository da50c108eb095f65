/// Inbound reassembly buffer for one connection.
///
/// A fixed allocation of `capacity` bytes staging received data before the
/// application reads it. `head` counts bytes received and buffered; `hole`
/// marks the position of the first gap left by out-of-order arrival, with
/// `hole <= head` always. Capacity and starting sequence are fixed when the
/// buffer is allocated; a snapshot restores only head, hole, the FIN-seen
/// flag, and the buffered bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReadBuffer {
    buf: Vec<u8>,
    start_seq: u32,
    head: i32,
    hole: i32,
    fin_seen: bool,
}

impl ReadBuffer {
    pub fn new(capacity: usize, start_seq: u32) -> Self {
        Self {
            buf: vec![0; capacity],
            start_seq,
            head: 0,
            hole: 0,
            fin_seen: false,
        }
    }

    pub fn capacity(&self) -> usize {
        self.buf.len()
    }

    pub fn start_seq(&self) -> u32 {
        self.start_seq
    }

    pub fn head(&self) -> i32 {
        self.head
    }

    pub fn hole(&self) -> i32 {
        self.hole
    }

    pub fn fin_seen(&self) -> bool {
        self.fin_seen
    }

    /// Bytes received and buffered so far.
    pub fn size(&self) -> usize {
        self.head.max(0) as usize
    }

    /// The buffered prefix `[0, head)`.
    pub fn data(&self) -> &[u8] {
        &self.buf[..self.size()]
    }

    /// Append received bytes at the head, returning how many fit.
    pub fn write(&mut self, data: &[u8]) -> usize {
        let at = self.size();
        let n = data.len().min(self.capacity() - at);
        self.buf[at..at + n].copy_from_slice(&data[..n]);
        self.head = (at + n) as i32;
        n
    }

    /// Record the position of the first gap left by out-of-order arrival.
    pub fn set_hole(&mut self, hole: i32) {
        debug_assert!(hole >= 0 && hole <= self.head);
        self.hole = hole;
    }

    /// Record that a FIN was seen in the byte stream.
    pub fn set_fin_seen(&mut self, fin_seen: bool) {
        self.fin_seen = fin_seen;
    }

    /// Used by snapshot restore: put back progress offsets and buffered
    /// bytes into an allocation whose capacity was already established.
    pub(crate) fn restore(&mut self, head: i32, hole: i32, fin_seen: bool, data: &[u8]) {
        debug_assert_eq!(data.len(), head.max(0) as usize);
        self.head = head;
        self.hole = hole;
        self.fin_seen = fin_seen;
        self.buf[..data.len()].copy_from_slice(data);
    }
}
