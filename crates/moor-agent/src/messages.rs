use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::id::{ExecutorId, FrameworkId, Pid, SlaveId, TaskId};
use crate::resources::{Attributes, Resources};

/// The state of a task as tracked by the agent.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TaskState {
    Staging,
    Starting,
    Running,
    Finished,
    Failed,
    Killed,
    Lost,
}

impl TaskState {
    pub const ALL: [TaskState; 7] = [
        TaskState::Staging,
        TaskState::Starting,
        TaskState::Running,
        TaskState::Finished,
        TaskState::Failed,
        TaskState::Killed,
        TaskState::Lost,
    ];

    /// Whether a task in this state can never transition again.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            TaskState::Finished | TaskState::Failed | TaskState::Killed | TaskState::Lost
        )
    }
}

impl fmt::Display for TaskState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TaskState::Staging => write!(f, "STAGING"),
            TaskState::Starting => write!(f, "STARTING"),
            TaskState::Running => write!(f, "RUNNING"),
            TaskState::Finished => write!(f, "FINISHED"),
            TaskState::Failed => write!(f, "FAILED"),
            TaskState::Killed => write!(f, "KILLED"),
            TaskState::Lost => write!(f, "LOST"),
        }
    }
}

/// A command to run inside an executor process.
#[derive(Debug, Clone, Default, Eq, PartialEq, Serialize, Deserialize)]
pub struct CommandInfo {
    pub value: String,
    pub arguments: Vec<String>,
    pub environment: BTreeMap<String, String>,
}

impl CommandInfo {
    pub fn shell(value: impl Into<String>) -> Self {
        Self {
            value: value.into(),
            ..Default::default()
        }
    }
}

/// The descriptor of an executor process.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutorInfo {
    pub executor_id: ExecutorId,
    /// The owning framework, stamped by the agent where the source
    /// of the descriptor leaves it unset.
    pub framework_id: Option<FrameworkId>,
    pub command: CommandInfo,
    pub resources: Resources,
}

impl ExecutorInfo {
    pub fn new(executor_id: impl Into<ExecutorId>, command: CommandInfo) -> Self {
        Self {
            executor_id: executor_id.into(),
            framework_id: None,
            command,
            resources: Resources::default(),
        }
    }

    pub fn with_framework_id(mut self, framework_id: FrameworkId) -> Self {
        self.framework_id = Some(framework_id);
        self
    }
}

/// The descriptor of a framework (a tenant workload).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FrameworkInfo {
    pub user: String,
    pub name: String,
    /// The default executor for tasks that do not carry their own.
    pub executor: Option<ExecutorInfo>,
}

/// A task assignment received from the master.
/// A task carries either an explicit executor or a raw command; in the
/// latter case the agent wraps the command in a synthesized executor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskInfo {
    pub task_id: TaskId,
    pub name: String,
    pub slave_id: SlaveId,
    pub resources: Resources,
    pub executor: Option<ExecutorInfo>,
    pub command: Option<CommandInfo>,
    pub data: Vec<u8>,
}

impl TaskInfo {
    /// Whether the task carries its own command rather than an executor.
    /// The failure of a synthesized executor is reported as the failure
    /// of such a task itself.
    pub fn has_command(&self) -> bool {
        self.command.is_some()
    }
}

/// A launched task as mirrored to the master.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    pub task_id: TaskId,
    pub name: String,
    pub framework_id: FrameworkId,
    /// The explicit executor of the task, or [`None`] for a task that
    /// runs under a synthesized command executor.
    pub executor_id: Option<ExecutorId>,
    pub slave_id: SlaveId,
    pub resources: Resources,
    pub state: TaskState,
}

impl Task {
    pub fn from_info(info: &TaskInfo, framework_id: &FrameworkId) -> Self {
        Self {
            task_id: info.task_id.clone(),
            name: info.name.clone(),
            framework_id: framework_id.clone(),
            executor_id: info.executor.as_ref().map(|x| x.executor_id.clone()),
            slave_id: info.slave_id.clone(),
            resources: info.resources.clone(),
            state: TaskState::Staging,
        }
    }
}

/// An observed task state transition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskStatus {
    pub task_id: TaskId,
    pub state: TaskState,
    pub message: Option<String>,
}

/// A task state transition report.
/// This is the unit of retry: the agent resends the update to the master
/// until an acknowledgement for its uuid arrives.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusUpdate {
    pub framework_id: FrameworkId,
    pub executor_id: Option<ExecutorId>,
    pub slave_id: SlaveId,
    pub status: TaskStatus,
    pub timestamp: DateTime<Utc>,
    pub uuid: Uuid,
}

/// The immutable description of the agent sent at registration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SlaveInfo {
    pub hostname: String,
    pub webui_hostname: String,
    pub webui_port: u16,
    pub resources: Resources,
    pub attributes: Attributes,
}

/// A point-in-time sample of the resources consumed by an executor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceStatistics {
    pub timestamp: DateTime<Utc>,
    pub cpu_user_time_secs: f64,
    pub cpu_system_time_secs: f64,
    pub memory_rss_bytes: u64,
}

impl ResourceStatistics {
    /// The average cpu usage (in cpus) between a previous sample and this one,
    /// or [`None`] if no time has passed between the samples.
    pub fn cpu_usage_since(&self, previous: &ResourceStatistics) -> Option<f64> {
        let elapsed = (self.timestamp - previous.timestamp).num_milliseconds() as f64 / 1000.0;
        if elapsed <= 0.0 {
            return None;
        }
        let cpu_time = (self.cpu_user_time_secs + self.cpu_system_time_secs)
            - (previous.cpu_user_time_secs + previous.cpu_system_time_secs);
        Some(cpu_time / elapsed)
    }
}

/// A per-executor usage report forwarded to the master.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UsageMessage {
    pub slave_id: SlaveId,
    pub framework_id: FrameworkId,
    pub executor_id: ExecutorId,
    pub statistics: ResourceStatistics,
    /// The cpu usage derived from the previous sample, if any.
    pub cpu_usage: Option<f64>,
    /// The resources currently allocated to the executor,
    /// or [`None`] if the executor is gone.
    pub expected_resources: Option<Resources>,
    pub still_running: bool,
}

/// Messages sent by the agent to the master.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum MasterMessage {
    RegisterSlave {
        slave: SlaveInfo,
    },
    ReregisterSlave {
        slave_id: SlaveId,
        slave: SlaveInfo,
        executor_infos: Vec<ExecutorInfo>,
        tasks: Vec<Task>,
    },
    StatusUpdate {
        update: StatusUpdate,
        /// The agent pid that acknowledgements should be sent to.
        pid: Pid,
    },
    ExitedExecutor {
        slave_id: SlaveId,
        framework_id: FrameworkId,
        executor_id: ExecutorId,
        status: i32,
    },
    Usage(UsageMessage),
}

/// Messages sent by the agent to an executor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ExecutorMessage {
    ExecutorRegistered {
        executor_info: ExecutorInfo,
        framework_id: FrameworkId,
        framework_info: FrameworkInfo,
        slave_id: SlaveId,
        slave_info: SlaveInfo,
    },
    RunTask {
        framework_id: FrameworkId,
        framework_info: FrameworkInfo,
        /// The framework driver pid, for direct executor-to-driver traffic.
        pid: Pid,
        task: TaskInfo,
    },
    KillTask {
        framework_id: FrameworkId,
        task_id: TaskId,
    },
    FrameworkToExecutor {
        slave_id: SlaveId,
        framework_id: FrameworkId,
        executor_id: ExecutorId,
        data: Vec<u8>,
    },
    ShutdownExecutor,
}

/// Messages sent by the agent to a framework driver.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum DriverMessage {
    ExecutorToFramework {
        slave_id: SlaveId,
        framework_id: FrameworkId,
        executor_id: ExecutorId,
        data: Vec<u8>,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_terminal_task_states() {
        let terminal: Vec<_> = TaskState::ALL
            .iter()
            .filter(|state| state.is_terminal())
            .collect();
        assert_eq!(
            terminal,
            vec![
                &TaskState::Finished,
                &TaskState::Failed,
                &TaskState::Killed,
                &TaskState::Lost
            ]
        );
    }

    #[test]
    fn test_cpu_usage_between_samples() {
        let previous = ResourceStatistics {
            timestamp: "2024-01-01T00:00:00Z".parse().unwrap(),
            cpu_user_time_secs: 1.0,
            cpu_system_time_secs: 0.5,
            memory_rss_bytes: 1024,
        };
        let current = ResourceStatistics {
            timestamp: "2024-01-01T00:00:10Z".parse().unwrap(),
            cpu_user_time_secs: 5.0,
            cpu_system_time_secs: 1.5,
            memory_rss_bytes: 2048,
        };
        assert_eq!(current.cpu_usage_since(&previous), Some(0.5));
        assert_eq!(previous.cpu_usage_since(&previous), None);
    }
}
