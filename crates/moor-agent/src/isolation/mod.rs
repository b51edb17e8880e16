mod process;

use std::collections::HashMap;
use std::path::PathBuf;

use async_trait::async_trait;
use moor_server::actor::ActorHandle;

pub use process::ProcessIsolator;

use crate::agent::AgentActor;
use crate::error::AgentResult;
use crate::id::{ExecutorId, FrameworkId};
use crate::messages::{ExecutorInfo, FrameworkInfo, ResourceStatistics};
use crate::resources::Resources;

/// The pluggable backend that launches, constrains, measures, and
/// terminates executor processes on behalf of the agent.
///
/// The backend reports executor lifecycle transitions back into the
/// agent inbox via the handle passed to [`Isolator::initialize`]
/// ([`AgentEvent::ExecutorStarted`](crate::agent::AgentEvent::ExecutorStarted),
/// [`AgentEvent::ExecutorExited`](crate::agent::AgentEvent::ExecutorExited),
/// and [`AgentEvent::SendUsage`](crate::agent::AgentEvent::SendUsage)).
#[async_trait]
pub trait Isolator: Send + Sync + 'static {
    /// Called once when the agent starts, before any executor is launched.
    fn initialize(&self, local: bool, agent: ActorHandle<AgentActor>);

    async fn launch_executor(
        &self,
        framework_id: FrameworkId,
        framework_info: FrameworkInfo,
        executor_info: ExecutorInfo,
        directory: PathBuf,
        resources: Resources,
    ) -> AgentResult<()>;

    async fn kill_executor(
        &self,
        framework_id: FrameworkId,
        executor_id: ExecutorId,
    ) -> AgentResult<()>;

    /// Recompute the resource limits of a running executor.
    /// There is no guarantee that the new limits take effect before any
    /// task dispatched to the executor afterwards is observed by it.
    async fn resources_changed(
        &self,
        framework_id: FrameworkId,
        executor_id: ExecutorId,
        resources: Resources,
    ) -> AgentResult<()>;

    async fn set_framework_priorities(
        &self,
        priorities: HashMap<FrameworkId, f64>,
    ) -> AgentResult<()>;

    /// Ask the backend to push a usage report for an executor at its own
    /// convenience. Fire-and-forget.
    async fn sample_usage(&self, framework_id: FrameworkId, executor_id: ExecutorId);

    /// Collect a point-in-time resource sample for an executor.
    /// An error or [`None`] suppresses the sample; the agent retries on
    /// its next collection tick.
    async fn collect_statistics(
        &self,
        framework_id: FrameworkId,
        executor_id: ExecutorId,
    ) -> AgentResult<Option<ResourceStatistics>>;
}
