use crate::id::Pid;
use crate::messages::{DriverMessage, ExecutorMessage, MasterMessage};

/// Point-to-point typed-message delivery between the agent and its peers.
///
/// Sends are fire-and-forget enqueues: implementations deliver messages
/// to a single peer in the order they were enqueued, on a best-effort
/// basis. Undeliverable messages are dropped silently; the agent relies
/// on its own retry loops (registration, status updates) rather than on
/// transport-level errors. Implementations should arrange for an
/// [`AgentEvent::PeerLost`](crate::agent::AgentEvent::PeerLost) event
/// when a linked peer becomes unreachable.
///
/// The wire codec and the underlying transport are chosen by the
/// embedder; the agent core never observes them.
pub trait Transport: Send + Sync + 'static {
    /// Request liveness monitoring of a peer.
    fn link(&self, peer: &Pid);

    fn send_to_master(&self, master: &Pid, message: MasterMessage);

    fn send_to_executor(&self, executor: &Pid, message: ExecutorMessage);

    fn send_to_driver(&self, driver: &Pid, message: DriverMessage);

    /// Reply to a liveness ping from a peer.
    fn send_pong(&self, peer: &Pid);
}
