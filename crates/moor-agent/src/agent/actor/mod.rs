mod core;
mod handler;

use std::collections::HashMap;

use chrono::{DateTime, Utc};

use crate::agent::options::AgentOptions;
use crate::agent::state::{AgentStats, Framework};
use crate::id::{FrameworkId, Pid, SlaveId};
use crate::messages::SlaveInfo;

/// The supervision kernel of the node agent.
///
/// The actor owns the in-memory model of frameworks, executors, and
/// tasks, drives the task and executor state machines, guarantees
/// at-least-once delivery of status updates across master failover, and
/// orchestrates the isolation backend. All state is touched exclusively
/// from the actor event loop, so no locking is involved.
pub struct AgentActor {
    options: AgentOptions,
    info: SlaveInfo,
    master: Option<Pid>,
    connected: bool,
    /// The agent id assigned by the master, unset until the first
    /// successful registration.
    slave_id: Option<SlaveId>,
    /// Registration attempts since the current master appeared, used to
    /// pace the registration retry.
    registration_attempt: u32,
    frameworks: HashMap<FrameworkId, Framework>,
    stats: AgentStats,
    started_at: DateTime<Utc>,
}
