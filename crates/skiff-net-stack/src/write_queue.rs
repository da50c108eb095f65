use std::collections::VecDeque;

/// Ordered outbound data backlog with sent/acknowledged progress cursors.
///
/// `current`/`offset` locate the next byte to transmit (chunk index plus
/// offset within that chunk); `acked` counts bytes acknowledged across the
/// whole queue. The cursors are snapshot state: restore puts them back
/// verbatim so transmission resumes from exactly the byte position it was
/// at, rather than recomputing progress from the chunk contents.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WriteQueue {
    q: VecDeque<Vec<u8>>,
    current: u32,
    offset: u32,
    acked: u32,
}

impl WriteQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a chunk to the backlog. Zero-length chunks are legal (an empty
    /// placeholder) and survive snapshots unchanged.
    pub fn push(&mut self, data: Vec<u8>) {
        self.q.push_back(data);
    }

    /// Advance the send cursor by `bytes`, crossing chunk boundaries.
    pub fn mark_sent(&mut self, mut bytes: u32) {
        while bytes > 0 {
            let Some(chunk) = self.q.get(self.current as usize) else {
                break;
            };
            let left = chunk.len() as u32 - self.offset;
            if bytes < left {
                self.offset += bytes;
                break;
            }
            bytes -= left;
            self.current += 1;
            self.offset = 0;
        }
    }

    pub fn acknowledge(&mut self, bytes: u32) {
        self.acked = self.acked.saturating_add(bytes);
    }

    pub fn chunks(&self) -> impl Iterator<Item = &[u8]> {
        self.q.iter().map(Vec::as_slice)
    }

    /// Number of chunks in the backlog.
    pub fn len(&self) -> usize {
        self.q.len()
    }

    pub fn is_empty(&self) -> bool {
        self.q.is_empty()
    }

    pub fn current(&self) -> u32 {
        self.current
    }

    pub fn offset(&self) -> u32 {
        self.offset
    }

    pub fn acked(&self) -> u32 {
        self.acked
    }

    pub fn total_bytes(&self) -> u64 {
        self.q.iter().map(|chunk| chunk.len() as u64).sum()
    }

    /// Bytes queued but not yet acknowledged by the peer.
    pub fn remaining(&self) -> u64 {
        self.total_bytes().saturating_sub(u64::from(self.acked))
    }

    pub(crate) fn restore_cursors(&mut self, current: u32, offset: u32, acked: u32) {
        self.current = current;
        self.offset = offset;
        self.acked = acked;
    }
}
