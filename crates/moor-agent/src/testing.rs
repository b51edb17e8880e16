use std::collections::{HashMap, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use moor_server::actor::ActorHandle;
use moor_server::retry::RetryStrategy;

use crate::agent::{AgentActor, AgentOptions};
use crate::error::AgentResult;
use crate::id::{ExecutorId, FrameworkId, Pid};
use crate::isolation::Isolator;
use crate::messages::{
    CommandInfo, DriverMessage, ExecutorInfo, ExecutorMessage, FrameworkInfo, MasterMessage,
    ResourceStatistics, TaskInfo,
};
use crate::resources::Resources;
use crate::transport::Transport;

/// A transport that records every outbound message for inspection.
#[derive(Default)]
pub(crate) struct TestTransport {
    master: Mutex<Vec<(Pid, MasterMessage)>>,
    executors: Mutex<Vec<(Pid, ExecutorMessage)>>,
    drivers: Mutex<Vec<(Pid, DriverMessage)>>,
    pongs: Mutex<Vec<Pid>>,
    linked: Mutex<Vec<Pid>>,
}

impl TestTransport {
    pub fn master_messages(&self) -> Vec<MasterMessage> {
        self.master.lock().unwrap().iter().map(|(_, x)| x.clone()).collect()
    }

    pub fn executor_messages(&self) -> Vec<ExecutorMessage> {
        self.executors.lock().unwrap().iter().map(|(_, x)| x.clone()).collect()
    }

    pub fn driver_sends(&self) -> Vec<(Pid, DriverMessage)> {
        self.drivers.lock().unwrap().clone()
    }

    pub fn pong_peers(&self) -> Vec<Pid> {
        self.pongs.lock().unwrap().clone()
    }

    pub fn linked_peers(&self) -> Vec<Pid> {
        self.linked.lock().unwrap().clone()
    }
}

impl Transport for TestTransport {
    fn link(&self, peer: &Pid) {
        self.linked.lock().unwrap().push(peer.clone());
    }

    fn send_to_master(&self, master: &Pid, message: MasterMessage) {
        self.master.lock().unwrap().push((master.clone(), message));
    }

    fn send_to_executor(&self, executor: &Pid, message: ExecutorMessage) {
        self.executors.lock().unwrap().push((executor.clone(), message));
    }

    fn send_to_driver(&self, driver: &Pid, message: DriverMessage) {
        self.drivers.lock().unwrap().push((driver.clone(), message));
    }

    fn send_pong(&self, peer: &Pid) {
        self.pongs.lock().unwrap().push(peer.clone());
    }
}

/// The calls an isolation backend receives from the agent.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum IsolationCall {
    LaunchExecutor {
        framework_id: FrameworkId,
        executor_id: ExecutorId,
        directory: PathBuf,
    },
    KillExecutor {
        framework_id: FrameworkId,
        executor_id: ExecutorId,
    },
    ResourcesChanged {
        framework_id: FrameworkId,
        executor_id: ExecutorId,
        resources: Resources,
    },
    SetFrameworkPriorities {
        priorities: Vec<(FrameworkId, f64)>,
    },
    SampleUsage {
        framework_id: FrameworkId,
        executor_id: ExecutorId,
    },
    CollectStatistics {
        framework_id: FrameworkId,
        executor_id: ExecutorId,
    },
}

/// A deterministic isolation backend that records every call and replies
/// to statistics collection with scripted samples. Executor lifecycle
/// upcalls are driven by the test itself through the agent handle.
#[derive(Default)]
pub(crate) struct TestIsolator {
    calls: Mutex<Vec<IsolationCall>>,
    statistics: Mutex<VecDeque<Option<ResourceStatistics>>>,
}

impl TestIsolator {
    pub fn calls(&self) -> Vec<IsolationCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn push_statistics(&self, statistics: Option<ResourceStatistics>) {
        self.statistics.lock().unwrap().push_back(statistics);
    }

    fn record(&self, call: IsolationCall) {
        self.calls.lock().unwrap().push(call);
    }
}

#[async_trait]
impl Isolator for TestIsolator {
    fn initialize(&self, _local: bool, _agent: ActorHandle<AgentActor>) {}

    async fn launch_executor(
        &self,
        framework_id: FrameworkId,
        _framework_info: FrameworkInfo,
        executor_info: ExecutorInfo,
        directory: PathBuf,
        _resources: Resources,
    ) -> AgentResult<()> {
        self.record(IsolationCall::LaunchExecutor {
            framework_id,
            executor_id: executor_info.executor_id,
            directory,
        });
        Ok(())
    }

    async fn kill_executor(
        &self,
        framework_id: FrameworkId,
        executor_id: ExecutorId,
    ) -> AgentResult<()> {
        self.record(IsolationCall::KillExecutor {
            framework_id,
            executor_id,
        });
        Ok(())
    }

    async fn resources_changed(
        &self,
        framework_id: FrameworkId,
        executor_id: ExecutorId,
        resources: Resources,
    ) -> AgentResult<()> {
        self.record(IsolationCall::ResourcesChanged {
            framework_id,
            executor_id,
            resources,
        });
        Ok(())
    }

    async fn set_framework_priorities(
        &self,
        priorities: HashMap<FrameworkId, f64>,
    ) -> AgentResult<()> {
        let mut priorities: Vec<(FrameworkId, f64)> = priorities.into_iter().collect();
        priorities.sort_by(|a, b| a.0.cmp(&b.0));
        self.record(IsolationCall::SetFrameworkPriorities { priorities });
        Ok(())
    }

    async fn sample_usage(&self, framework_id: FrameworkId, executor_id: ExecutorId) {
        self.record(IsolationCall::SampleUsage {
            framework_id,
            executor_id,
        });
    }

    async fn collect_statistics(
        &self,
        framework_id: FrameworkId,
        executor_id: ExecutorId,
    ) -> AgentResult<Option<ResourceStatistics>> {
        self.record(IsolationCall::CollectStatistics {
            framework_id,
            executor_id,
        });
        Ok(self.statistics.lock().unwrap().pop_front().flatten())
    }
}

pub(crate) fn agent_pid() -> Pid {
    Pid::new("agent(1)", "localhost", 5051)
}

pub(crate) fn agent_options(
    work_dir: &Path,
    transport: Arc<dyn Transport>,
    isolator: Arc<dyn Isolator>,
) -> AgentOptions {
    AgentOptions {
        pid: agent_pid(),
        hostname: "localhost".to_string(),
        webui_hostname: "localhost".to_string(),
        webui_port: 8081,
        resources: "cpus:4;mem:4096".parse().unwrap(),
        attributes: "rack:r1".parse().unwrap(),
        work_dir: work_dir.to_path_buf(),
        no_create_work_dir: false,
        local: true,
        gc_timeout: Duration::from_secs(3600),
        executor_shutdown_timeout: Duration::from_secs(5),
        status_update_retry_interval: Duration::from_secs(10),
        usage_sample_interval: Duration::from_secs(1),
        registration_retry_strategy: RetryStrategy::Fixed {
            delay: Duration::from_secs(1),
        },
        transport,
        isolator,
    }
}

pub(crate) fn framework_info() -> FrameworkInfo {
    FrameworkInfo {
        user: "tester".to_string(),
        name: "test framework".to_string(),
        executor: None,
    }
}

/// A task bound to an explicit executor.
pub(crate) fn task_with_executor(task_id: &str, executor_id: &str) -> TaskInfo {
    TaskInfo {
        task_id: task_id.into(),
        name: format!("task {task_id}"),
        slave_id: Default::default(),
        resources: "cpus:1;mem:128".parse().unwrap(),
        executor: Some(ExecutorInfo::new(
            executor_id,
            CommandInfo::shell("./executor"),
        )),
        command: None,
        data: vec![],
    }
}

/// A task that carries its own command; the agent wraps it in a
/// synthesized command executor.
pub(crate) fn command_task(task_id: &str, command: &str) -> TaskInfo {
    TaskInfo {
        task_id: task_id.into(),
        name: format!("task {task_id}"),
        slave_id: Default::default(),
        resources: "cpus:1;mem:128".parse().unwrap(),
        executor: None,
        command: Some(CommandInfo::shell(command)),
        data: vec![],
    }
}
