use std::collections::HashMap;

use async_trait::async_trait;
use chrono::Utc;
use log::info;
use moor_server::actor::{Actor, ActorAction, ActorContext};

use crate::agent::actor::AgentActor;
use crate::agent::state::AgentStats;
use crate::agent::{AgentEvent, AgentOptions};
use crate::messages::SlaveInfo;

#[async_trait]
impl Actor for AgentActor {
    type Message = AgentEvent;
    type Options = AgentOptions;

    fn name() -> &'static str {
        "AgentActor"
    }

    fn new(options: AgentOptions) -> Self {
        let info = SlaveInfo {
            hostname: options.hostname.clone(),
            webui_hostname: options.webui_hostname.clone(),
            webui_port: options.webui_port,
            resources: options.resources.clone(),
            attributes: options.attributes.clone(),
        };
        Self {
            options,
            info,
            master: None,
            connected: false,
            slave_id: None,
            registration_attempt: 0,
            frameworks: HashMap::new(),
            stats: AgentStats::new(),
            started_at: Utc::now(),
        }
    }

    async fn start(&mut self, ctx: &mut ActorContext<Self>) {
        info!("agent started at {}", self.options.pid);
        info!("agent resources: {}", self.info.resources);
        self.options
            .isolator
            .initialize(self.options.local, ctx.handle().clone());
        ctx.send_with_delay(AgentEvent::SampleUsage, self.options.usage_sample_interval);
    }

    fn receive(&mut self, ctx: &mut ActorContext<Self>, message: AgentEvent) -> ActorAction {
        match message {
            AgentEvent::NewMasterDetected { master } => {
                self.handle_new_master_detected(ctx, master)
            }
            AgentEvent::NoMasterDetected => self.handle_no_master_detected(ctx),
            AgentEvent::Registered { slave_id } => self.handle_registered(ctx, slave_id),
            AgentEvent::Reregistered { slave_id } => self.handle_reregistered(ctx, slave_id),
            AgentEvent::RunTask {
                framework_info,
                framework_id,
                pid,
                task,
            } => self.handle_run_task(ctx, framework_info, framework_id, pid, task),
            AgentEvent::KillTask {
                framework_id,
                task_id,
            } => self.handle_kill_task(ctx, framework_id, task_id),
            AgentEvent::ShutdownFramework { framework_id } => {
                self.handle_shutdown_framework(ctx, framework_id)
            }
            AgentEvent::FrameworkToExecutor {
                slave_id,
                framework_id,
                executor_id,
                data,
            } => self.handle_framework_to_executor(ctx, slave_id, framework_id, executor_id, data),
            AgentEvent::UpdateFramework { framework_id, pid } => {
                self.handle_update_framework(ctx, framework_id, pid)
            }
            AgentEvent::StatusUpdateAcknowledgement {
                slave_id,
                framework_id,
                task_id,
                uuid,
            } => self.handle_status_update_acknowledgement(
                ctx,
                slave_id,
                framework_id,
                task_id,
                uuid,
            ),
            AgentEvent::SetFrameworkPriorities { priorities } => {
                self.handle_set_framework_priorities(ctx, priorities)
            }
            AgentEvent::RegisterExecutor {
                framework_id,
                executor_id,
                from,
            } => self.handle_register_executor(ctx, framework_id, executor_id, from),
            AgentEvent::StatusUpdate { update } => self.handle_status_update(ctx, update),
            AgentEvent::ExecutorToFramework {
                slave_id,
                framework_id,
                executor_id,
                data,
            } => self.handle_executor_to_framework(ctx, slave_id, framework_id, executor_id, data),
            AgentEvent::Ping { from } => self.handle_ping(ctx, from),
            AgentEvent::PeerLost { peer } => self.handle_peer_lost(ctx, peer),
            AgentEvent::ExecutorStarted {
                framework_id,
                executor_id,
                os_pid,
            } => self.handle_executor_started(ctx, framework_id, executor_id, os_pid),
            AgentEvent::ExecutorExited {
                framework_id,
                executor_id,
                status,
            } => self.handle_executor_exited(ctx, framework_id, executor_id, status),
            AgentEvent::SendUsage { usage } => self.handle_send_usage(ctx, usage),
            AgentEvent::RetryRegistration => self.handle_retry_registration(ctx),
            AgentEvent::RetryStatusUpdate { framework_id, uuid } => {
                self.handle_retry_status_update(ctx, framework_id, uuid)
            }
            AgentEvent::ProbeExecutorShutdown {
                framework_id,
                executor_id,
                uuid,
            } => self.handle_probe_executor_shutdown(ctx, framework_id, executor_id, uuid),
            AgentEvent::SampleUsage => self.handle_sample_usage(ctx),
            AgentEvent::CollectStatistics {
                framework_id,
                executor_id,
                previous,
            } => self.handle_collect_statistics(ctx, framework_id, executor_id, previous),
            AgentEvent::StatisticsCollected {
                framework_id,
                executor_id,
                previous,
                statistics,
            } => self.handle_statistics_collected(
                ctx,
                framework_id,
                executor_id,
                previous,
                statistics,
            ),
            AgentEvent::RemoveDirectories { paths } => self.handle_remove_directories(ctx, paths),
            AgentEvent::ObserveState { result } => self.handle_observe_state(ctx, result),
            AgentEvent::Shutdown => self.handle_shutdown(ctx),
        }
    }

    async fn stop(self, _ctx: &mut ActorContext<Self>) {
        info!("agent terminating");
    }
}
