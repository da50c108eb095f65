use std::collections::HashMap;

use crate::connection::{Connection, Endpoint};

/// Identity of one network-stack instance. A unikernel image may run several
/// stacks (one per interface); connections and the restore context refer to
/// their owner by id rather than by reference.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct StackId(pub u32);

/// A network-stack instance's TCP side: the active-connection table plus the
/// send-queue wake hook used after a restore batch.
#[derive(Debug)]
pub struct NetworkStack {
    id: StackId,
    connections: HashMap<(Endpoint, Endpoint), Connection>,
    send_wakeups: u64,
}

impl NetworkStack {
    pub fn new(id: StackId) -> Self {
        Self {
            id,
            connections: HashMap::new(),
            send_wakeups: 0,
        }
    }

    pub fn id(&self) -> StackId {
        self.id
    }

    pub fn insert_connection(&mut self, conn: Connection) {
        self.connections.insert((conn.local, conn.remote), conn);
    }

    pub fn connection(&self, local: Endpoint, remote: Endpoint) -> Option<&Connection> {
        self.connections.get(&(local, remote))
    }

    pub fn connection_mut(&mut self, local: Endpoint, remote: Endpoint) -> Option<&mut Connection> {
        self.connections.get_mut(&(local, remote))
    }

    pub fn connections(&self) -> impl Iterator<Item = &Connection> {
        self.connections.values()
    }

    pub fn connection_count(&self) -> usize {
        self.connections.len()
    }

    /// Resume send-queue processing for every connection still owing data to
    /// its peer. Called once per stack at the end of a restore batch, never
    /// per connection: during decode the stack's own infrastructure may not
    /// be reinitialized yet.
    pub fn force_start_send_queues(&mut self) {
        self.send_wakeups += 1;
        let mut resumed = 0usize;
        for conn in self.connections.values_mut() {
            if conn.sendq_remaining() > 0 {
                conn.rtx_timer.start();
                resumed += 1;
            }
        }
        tracing::debug!(stack = self.id.0, resumed, "send queues restarted");
    }

    /// How many times the send path has been woken. Exposed so restore
    /// orchestration can assert the once-per-batch contract.
    pub fn send_wakeups(&self) -> u64 {
        self.send_wakeups
    }
}
