use std::collections::HashMap;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use log::warn;
use serde::Serialize;
use uuid::Uuid;

use crate::id::{ExecutorId, FrameworkId, Pid, SlaveId, TaskId};
use crate::messages::{ExecutorInfo, FrameworkInfo, StatusUpdate, Task, TaskInfo, TaskState};
use crate::resources::Resources;

/// A tenant workload known to the agent.
///
/// A framework exists while at least one executor or at least one
/// unacknowledged status update references it. It exclusively owns its
/// executors, which in turn exclusively own their tasks; destruction
/// cascades downward.
pub struct Framework {
    pub id: FrameworkId,
    pub info: FrameworkInfo,
    /// The master-visible pid of the framework driver.
    pub pid: Pid,
    executors: HashMap<ExecutorId, Executor>,
    /// Outbound status updates awaiting master acknowledgement,
    /// keyed by update uuid.
    pub updates: HashMap<Uuid, StatusUpdate>,
    /// The owning executor of every queued or launched task.
    task_index: HashMap<TaskId, ExecutorId>,
}

impl Framework {
    pub fn new(id: FrameworkId, info: FrameworkInfo, pid: Pid) -> Self {
        Self {
            id,
            info,
            pid,
            executors: HashMap::new(),
            updates: HashMap::new(),
            task_index: HashMap::new(),
        }
    }

    /// Derive the executor descriptor for a task: the task's own executor,
    /// the framework's default executor, or a synthesized command executor
    /// wrapping the task's command.
    pub fn executor_info_for_task(&self, task: &TaskInfo) -> ExecutorInfo {
        if let Some(executor) = &task.executor {
            executor.clone()
        } else if let Some(executor) = &self.info.executor {
            executor.clone()
        } else {
            ExecutorInfo {
                executor_id: ExecutorId::new(task.task_id.as_str()),
                framework_id: Some(self.id.clone()),
                command: task.command.clone().unwrap_or_default(),
                resources: Resources::default(),
            }
        }
    }

    pub fn create_executor(&mut self, info: ExecutorInfo, directory: PathBuf) -> &mut Executor {
        let executor_id = info.executor_id.clone();
        let executor = Executor::new(info, directory);
        self.executors.entry(executor_id).or_insert(executor)
    }

    pub fn get_executor(&self, executor_id: &ExecutorId) -> Option<&Executor> {
        self.executors.get(executor_id)
    }

    pub fn get_executor_mut(&mut self, executor_id: &ExecutorId) -> Option<&mut Executor> {
        self.executors.get_mut(executor_id)
    }

    /// The executor owning a task with the given id, whether the task is
    /// queued or launched.
    pub fn executor_id_for_task(&self, task_id: &TaskId) -> Option<&ExecutorId> {
        self.task_index.get(task_id)
    }

    pub fn executors(&self) -> impl Iterator<Item = &Executor> {
        self.executors.values()
    }

    pub fn executor_ids(&self) -> Vec<ExecutorId> {
        self.executors.keys().cloned().collect()
    }

    pub fn has_executors(&self) -> bool {
        !self.executors.is_empty()
    }

    /// Whether nothing references the framework anymore.
    pub fn idle(&self) -> bool {
        self.executors.is_empty() && self.updates.is_empty()
    }

    pub fn destroy_executor(&mut self, executor_id: &ExecutorId) -> Option<Executor> {
        let executor = self.executors.remove(executor_id)?;
        self.task_index.retain(|_, owner| owner != executor_id);
        Some(executor)
    }

    pub fn queue_task(&mut self, executor_id: &ExecutorId, task: TaskInfo) {
        let Some(executor) = self.executors.get_mut(executor_id) else {
            warn!("executor '{executor_id}' of framework {} not found", self.id);
            return;
        };
        self.task_index
            .insert(task.task_id.clone(), executor_id.clone());
        executor.queued_tasks.insert(task.task_id.clone(), task);
    }

    pub fn launch_task(&mut self, executor_id: &ExecutorId, task: Task) {
        let Some(executor) = self.executors.get_mut(executor_id) else {
            warn!("executor '{executor_id}' of framework {} not found", self.id);
            return;
        };
        self.task_index
            .insert(task.task_id.clone(), executor_id.clone());
        executor.launched_tasks.insert(task.task_id.clone(), task);
    }

    pub fn remove_queued_task(&mut self, task_id: &TaskId) -> Option<TaskInfo> {
        let executor_id = self.task_index.get(task_id)?.clone();
        let executor = self.executors.get_mut(&executor_id)?;
        let task = executor.queued_tasks.shift_remove(task_id)?;
        self.task_index.remove(task_id);
        Some(task)
    }

    pub fn remove_launched_task(&mut self, task_id: &TaskId) -> Option<Task> {
        let executor_id = self.task_index.get(task_id)?.clone();
        let executor = self.executors.get_mut(&executor_id)?;
        let task = executor.launched_tasks.remove(task_id)?;
        self.task_index.remove(task_id);
        Some(task)
    }

    /// Remove all queued tasks of an executor and return them in the
    /// order they were queued.
    pub fn take_queued_tasks(&mut self, executor_id: &ExecutorId) -> Vec<TaskInfo> {
        let Some(executor) = self.executors.get_mut(executor_id) else {
            return vec![];
        };
        let tasks: Vec<TaskInfo> = executor.queued_tasks.drain(..).map(|(_, task)| task).collect();
        for task in &tasks {
            self.task_index.remove(&task.task_id);
        }
        tasks
    }

    /// Record a new state for a launched task.
    /// Queued tasks carry no state and are left untouched.
    pub fn update_task_state(&mut self, task_id: &TaskId, state: TaskState) -> bool {
        let Some(executor_id) = self.task_index.get(task_id) else {
            return false;
        };
        let Some(executor) = self.executors.get_mut(executor_id) else {
            return false;
        };
        let Some(task) = executor.launched_tasks.get_mut(task_id) else {
            return false;
        };
        task.state = state;
        true
    }

    pub fn snapshot(&self) -> FrameworkSnapshot {
        let mut executors: Vec<ExecutorSnapshot> =
            self.executors.values().map(Executor::snapshot).collect();
        executors.sort_by(|a, b| a.id.cmp(&b.id));
        let mut pending_updates: Vec<Uuid> = self.updates.keys().copied().collect();
        pending_updates.sort();
        FrameworkSnapshot {
            id: self.id.clone(),
            name: self.info.name.clone(),
            user: self.info.user.clone(),
            pending_updates,
            executors,
        }
    }
}

/// A per-framework executor process as tracked by the agent.
pub struct Executor {
    pub id: ExecutorId,
    pub info: ExecutorInfo,
    /// Fresh per executor incarnation; disambiguates stale shutdown timers
    /// from a previous incarnation with the same executor id.
    pub uuid: Uuid,
    /// The executor's transport identity, unset until it registers.
    pub pid: Option<Pid>,
    /// A shut-down executor never accepts new tasks.
    pub shutdown: bool,
    pub directory: PathBuf,
    /// Tasks accepted but not yet dispatched because the executor has not
    /// registered, in arrival order.
    pub queued_tasks: IndexMap<TaskId, TaskInfo>,
    /// Tasks that have been dispatched to the executor.
    pub launched_tasks: HashMap<TaskId, Task>,
}

impl Executor {
    fn new(info: ExecutorInfo, directory: PathBuf) -> Self {
        Self {
            id: info.executor_id.clone(),
            info,
            uuid: Uuid::new_v4(),
            pid: None,
            shutdown: false,
            directory,
            queued_tasks: IndexMap::new(),
            launched_tasks: HashMap::new(),
        }
    }

    pub fn is_registered(&self) -> bool {
        self.pid.is_some()
    }

    /// The sum of the per-task resource vectors currently on the executor,
    /// reported to the isolation backend as its limits.
    pub fn isolation_resources(&self) -> Resources {
        let mut resources = Resources::default();
        for task in self.launched_tasks.values() {
            resources.merge(&task.resources);
        }
        for task in self.queued_tasks.values() {
            resources.merge(&task.resources);
        }
        resources
    }

    pub fn snapshot(&self) -> ExecutorSnapshot {
        let mut launched_tasks: Vec<TaskSnapshot> = self
            .launched_tasks
            .values()
            .map(|task| TaskSnapshot {
                id: task.task_id.clone(),
                state: task.state,
            })
            .collect();
        launched_tasks.sort_by(|a, b| a.id.cmp(&b.id));
        ExecutorSnapshot {
            id: self.id.clone(),
            uuid: self.uuid,
            registered: self.is_registered(),
            shutdown: self.shutdown,
            directory: self.directory.clone(),
            queued_tasks: self.queued_tasks.keys().cloned().collect(),
            launched_tasks,
        }
    }
}

/// Counters exposed by the agent, mirroring what a stats endpoint would
/// serve.
#[derive(Debug, Clone, Serialize)]
pub struct AgentStats {
    pub tasks: HashMap<TaskState, u64>,
    pub valid_status_updates: u64,
    pub invalid_status_updates: u64,
    pub valid_framework_messages: u64,
    pub invalid_framework_messages: u64,
}

impl AgentStats {
    pub fn new() -> Self {
        Self {
            tasks: TaskState::ALL.iter().map(|state| (*state, 0)).collect(),
            valid_status_updates: 0,
            invalid_status_updates: 0,
            valid_framework_messages: 0,
            invalid_framework_messages: 0,
        }
    }

    pub fn record_task_state(&mut self, state: TaskState) {
        *self.tasks.entry(state).or_insert(0) += 1;
    }

    pub fn task_count(&self, state: TaskState) -> u64 {
        self.tasks.get(&state).copied().unwrap_or(0)
    }
}

impl Default for AgentStats {
    fn default() -> Self {
        Self::new()
    }
}

/// A point-in-time view of the agent registry and counters.
/// This is the seam a state endpoint would serve.
#[derive(Debug, Clone, Serialize)]
pub struct AgentSnapshot {
    pub slave_id: Option<SlaveId>,
    pub master: Option<String>,
    pub connected: bool,
    pub hostname: String,
    pub resources: Resources,
    pub started_at: DateTime<Utc>,
    pub frameworks: Vec<FrameworkSnapshot>,
    pub stats: AgentStats,
}

impl AgentSnapshot {
    pub fn framework(&self, framework_id: &FrameworkId) -> Option<&FrameworkSnapshot> {
        self.frameworks.iter().find(|x| &x.id == framework_id)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct FrameworkSnapshot {
    pub id: FrameworkId,
    pub name: String,
    pub user: String,
    pub pending_updates: Vec<Uuid>,
    pub executors: Vec<ExecutorSnapshot>,
}

impl FrameworkSnapshot {
    pub fn executor(&self, executor_id: &ExecutorId) -> Option<&ExecutorSnapshot> {
        self.executors.iter().find(|x| &x.id == executor_id)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ExecutorSnapshot {
    pub id: ExecutorId,
    pub uuid: Uuid,
    pub registered: bool,
    pub shutdown: bool,
    pub directory: PathBuf,
    pub queued_tasks: Vec<TaskId>,
    pub launched_tasks: Vec<TaskSnapshot>,
}

#[derive(Debug, Clone, Serialize)]
pub struct TaskSnapshot {
    pub id: TaskId,
    pub state: TaskState,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::messages::CommandInfo;

    fn framework() -> Framework {
        Framework::new(
            FrameworkId::new("f1"),
            FrameworkInfo {
                user: "tester".to_string(),
                name: "test framework".to_string(),
                executor: None,
            },
            Pid::new("framework(1)", "localhost", 8083),
        )
    }

    fn task_info(task_id: &str) -> TaskInfo {
        TaskInfo {
            task_id: TaskId::new(task_id),
            name: format!("task {task_id}"),
            slave_id: SlaveId::new("s1"),
            resources: "cpus:1;mem:128".parse().unwrap(),
            executor: Some(ExecutorInfo::new("e1", CommandInfo::shell("run"))),
            command: None,
            data: vec![],
        }
    }

    fn executor_info() -> ExecutorInfo {
        ExecutorInfo::new("e1", CommandInfo::shell("run"))
    }

    #[test]
    fn test_executor_info_for_task_prefers_task_executor() {
        let framework = framework();
        let task = task_info("t1");
        let info = framework.executor_info_for_task(&task);
        assert_eq!(info.executor_id, ExecutorId::new("e1"));
    }

    #[test]
    fn test_executor_info_for_task_falls_back_to_framework_template() {
        let mut framework = framework();
        framework.info.executor = Some(ExecutorInfo::new("template", CommandInfo::shell("run")));
        let mut task = task_info("t1");
        task.executor = None;
        let info = framework.executor_info_for_task(&task);
        assert_eq!(info.executor_id, ExecutorId::new("template"));
    }

    #[test]
    fn test_executor_info_for_task_synthesizes_command_executor() {
        let framework = framework();
        let mut task = task_info("t1");
        task.executor = None;
        task.command = Some(CommandInfo::shell("echo hello"));
        let info = framework.executor_info_for_task(&task);
        assert_eq!(info.executor_id, ExecutorId::new("t1"));
        assert_eq!(info.framework_id, Some(FrameworkId::new("f1")));
        assert_eq!(info.command.value, "echo hello");
    }

    #[test]
    fn test_task_index_tracks_queued_and_launched_tasks() {
        let mut framework = framework();
        let executor_id = ExecutorId::new("e1");
        framework.create_executor(executor_info(), PathBuf::from("/tmp/run"));

        framework.queue_task(&executor_id, task_info("t1"));
        assert_eq!(framework.executor_id_for_task(&TaskId::new("t1")), Some(&executor_id));

        let task = Task::from_info(&task_info("t2"), &framework.id);
        framework.launch_task(&executor_id, task);
        assert_eq!(framework.executor_id_for_task(&TaskId::new("t2")), Some(&executor_id));

        assert!(framework.remove_queued_task(&TaskId::new("t1")).is_some());
        assert_eq!(framework.executor_id_for_task(&TaskId::new("t1")), None);
        // A launched task is not queued.
        assert!(framework.remove_queued_task(&TaskId::new("t2")).is_none());
        assert_eq!(framework.executor_id_for_task(&TaskId::new("t2")), Some(&executor_id));
        assert!(framework.remove_launched_task(&TaskId::new("t2")).is_some());
        assert_eq!(framework.executor_id_for_task(&TaskId::new("t2")), None);
    }

    #[test]
    fn test_take_queued_tasks_preserves_order() {
        let mut framework = framework();
        let executor_id = ExecutorId::new("e1");
        framework.create_executor(executor_info(), PathBuf::from("/tmp/run"));
        for task_id in ["t3", "t1", "t2"] {
            framework.queue_task(&executor_id, task_info(task_id));
        }
        let tasks = framework.take_queued_tasks(&executor_id);
        let task_ids: Vec<&str> = tasks.iter().map(|x| x.task_id.as_str()).collect();
        assert_eq!(task_ids, vec!["t3", "t1", "t2"]);
        assert_eq!(framework.executor_id_for_task(&TaskId::new("t3")), None);
    }

    #[test]
    fn test_destroy_executor_clears_task_index() {
        let mut framework = framework();
        let executor_id = ExecutorId::new("e1");
        framework.create_executor(executor_info(), PathBuf::from("/tmp/run"));
        framework.queue_task(&executor_id, task_info("t1"));
        assert!(framework.destroy_executor(&executor_id).is_some());
        assert!(!framework.has_executors());
        assert_eq!(framework.executor_id_for_task(&TaskId::new("t1")), None);
    }

    #[test]
    fn test_isolation_resources_sums_task_resources() {
        let mut framework = framework();
        let executor_id = ExecutorId::new("e1");
        framework.create_executor(executor_info(), PathBuf::from("/tmp/run"));
        framework.queue_task(&executor_id, task_info("t1"));
        framework.launch_task(&executor_id, Task::from_info(&task_info("t2"), &framework.id));
        let resources = framework.get_executor(&executor_id).unwrap().isolation_resources();
        assert_eq!(resources.cpus(), Some(2.0));
        assert_eq!(resources.mem(), Some(256.0));
    }

    #[test]
    fn test_framework_idle() {
        let mut framework = framework();
        assert!(framework.idle());
        framework.create_executor(executor_info(), PathBuf::from("/tmp/run"));
        assert!(!framework.idle());
        framework.destroy_executor(&ExecutorId::new("e1"));
        assert!(framework.idle());
    }

    #[test]
    fn test_update_task_state() {
        let mut framework = framework();
        let executor_id = ExecutorId::new("e1");
        framework.create_executor(executor_info(), PathBuf::from("/tmp/run"));
        framework.launch_task(&executor_id, Task::from_info(&task_info("t1"), &framework.id));
        assert!(framework.update_task_state(&TaskId::new("t1"), TaskState::Running));
        let executor = framework.get_executor(&executor_id).unwrap();
        assert_eq!(
            executor.launched_tasks[&TaskId::new("t1")].state,
            TaskState::Running
        );
        assert!(!framework.update_task_state(&TaskId::new("t9"), TaskState::Running));
    }
}
