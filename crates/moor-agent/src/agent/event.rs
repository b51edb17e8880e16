use std::collections::HashMap;
use std::path::PathBuf;

use tokio::sync::oneshot;
use uuid::Uuid;

use crate::agent::state::AgentSnapshot;
use crate::id::{ExecutorId, FrameworkId, Pid, SlaveId, TaskId};
use crate::messages::{FrameworkInfo, ResourceStatistics, StatusUpdate, TaskInfo, UsageMessage};

/// The agent inbox. Peer messages, isolation backend upcalls, and the
/// agent's own timers all arrive here and are processed one at a time.
pub enum AgentEvent {
    // Master link lifecycle.
    NewMasterDetected {
        master: Pid,
    },
    NoMasterDetected,
    Registered {
        slave_id: SlaveId,
    },
    Reregistered {
        slave_id: SlaveId,
    },
    // Task management requests from the master.
    RunTask {
        framework_info: FrameworkInfo,
        framework_id: FrameworkId,
        /// The framework driver pid.
        pid: Pid,
        task: TaskInfo,
    },
    KillTask {
        framework_id: FrameworkId,
        task_id: TaskId,
    },
    ShutdownFramework {
        framework_id: FrameworkId,
    },
    FrameworkToExecutor {
        slave_id: SlaveId,
        framework_id: FrameworkId,
        executor_id: ExecutorId,
        data: Vec<u8>,
    },
    UpdateFramework {
        framework_id: FrameworkId,
        pid: Pid,
    },
    StatusUpdateAcknowledgement {
        slave_id: SlaveId,
        framework_id: FrameworkId,
        task_id: TaskId,
        uuid: Uuid,
    },
    SetFrameworkPriorities {
        priorities: HashMap<FrameworkId, f64>,
    },
    // Messages from executors.
    RegisterExecutor {
        framework_id: FrameworkId,
        executor_id: ExecutorId,
        from: Pid,
    },
    StatusUpdate {
        update: StatusUpdate,
    },
    ExecutorToFramework {
        slave_id: SlaveId,
        framework_id: FrameworkId,
        executor_id: ExecutorId,
        data: Vec<u8>,
    },
    // Transport notifications.
    Ping {
        from: Pid,
    },
    PeerLost {
        peer: Pid,
    },
    // Isolation backend upcalls.
    ExecutorStarted {
        framework_id: FrameworkId,
        executor_id: ExecutorId,
        os_pid: u32,
    },
    ExecutorExited {
        framework_id: FrameworkId,
        executor_id: ExecutorId,
        /// The raw process exit status.
        status: i32,
    },
    SendUsage {
        usage: UsageMessage,
    },
    // Timers. Each carries enough data to validate itself against the
    // current registry state when it fires; stale timers are no-ops.
    RetryRegistration,
    RetryStatusUpdate {
        framework_id: FrameworkId,
        uuid: Uuid,
    },
    ProbeExecutorShutdown {
        framework_id: FrameworkId,
        executor_id: ExecutorId,
        /// The executor incarnation this timer was armed for.
        uuid: Uuid,
    },
    SampleUsage,
    CollectStatistics {
        framework_id: FrameworkId,
        executor_id: ExecutorId,
        previous: Option<ResourceStatistics>,
    },
    StatisticsCollected {
        framework_id: FrameworkId,
        executor_id: ExecutorId,
        previous: Option<ResourceStatistics>,
        statistics: Option<ResourceStatistics>,
    },
    RemoveDirectories {
        paths: Vec<PathBuf>,
    },
    // Introspection and termination.
    ObserveState {
        result: oneshot::Sender<AgentSnapshot>,
    },
    Shutdown,
}
