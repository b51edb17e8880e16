use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use chrono::Utc;
use log::{debug, error, info, warn};
use moor_server::actor::{ActorAction, ActorContext};
use tokio::sync::oneshot;
use uuid::Uuid;

use crate::agent::actor::AgentActor;
use crate::agent::paths;
use crate::agent::state::{AgentSnapshot, Framework, FrameworkSnapshot};
use crate::agent::AgentEvent;
use crate::id::{ExecutorId, FrameworkId, Pid, SlaveId, TaskId};
use crate::messages::{
    DriverMessage, ExecutorMessage, FrameworkInfo, MasterMessage, ResourceStatistics, StatusUpdate,
    Task, TaskInfo, TaskState, TaskStatus, UsageMessage,
};
use crate::resources::Resources;

impl AgentActor {
    pub(super) fn handle_new_master_detected(
        &mut self,
        ctx: &mut ActorContext<Self>,
        master: Pid,
    ) -> ActorAction {
        info!("new master detected at {master}");
        self.options.transport.link(&master);
        self.master = Some(master);
        self.connected = false;
        self.registration_attempt = 0;
        self.reliable_registration(ctx);
        ActorAction::Continue
    }

    pub(super) fn handle_no_master_detected(
        &mut self,
        _ctx: &mut ActorContext<Self>,
    ) -> ActorAction {
        info!("lost master(s), waiting for a new master to be elected");
        self.connected = false;
        self.master = None;
        ActorAction::Continue
    }

    pub(super) fn handle_registered(
        &mut self,
        ctx: &mut ActorContext<Self>,
        slave_id: SlaveId,
    ) -> ActorAction {
        info!("registered with master; given agent id {slave_id}");
        if let Some(existing) = &self.slave_id {
            if existing != &slave_id {
                error!("agent registered with id {slave_id} but already has id {existing}");
                return ActorAction::Stop;
            }
        }
        self.slave_id = Some(slave_id);
        self.connected = true;
        self.garbage_collect_slave_directories(ctx);
        ActorAction::Continue
    }

    pub(super) fn handle_reregistered(
        &mut self,
        _ctx: &mut ActorContext<Self>,
        slave_id: SlaveId,
    ) -> ActorAction {
        info!("re-registered with master");
        if self.slave_id.as_ref() != Some(&slave_id) {
            error!(
                "agent re-registered with id {slave_id} but expected id {}",
                self.slave_id
                    .as_ref()
                    .map(|x| x.as_str())
                    .unwrap_or("<none>")
            );
            return ActorAction::Stop;
        }
        self.connected = true;
        ActorAction::Continue
    }

    pub(super) fn handle_retry_registration(
        &mut self,
        ctx: &mut ActorContext<Self>,
    ) -> ActorAction {
        self.reliable_registration(ctx);
        ActorAction::Continue
    }

    /// Send a registration (or a re-registration carrying the full executor
    /// and launched-task inventory) to the current master, and re-arm the
    /// retry. Registration is idempotent on the master side, so resending
    /// until acknowledged is safe.
    fn reliable_registration(&mut self, ctx: &mut ActorContext<Self>) {
        if self.connected || self.master.is_none() {
            return;
        }
        match self.slave_id.clone() {
            None => {
                self.send_to_master(MasterMessage::RegisterSlave {
                    slave: self.info.clone(),
                });
            }
            Some(slave_id) => {
                let mut executor_infos = vec![];
                let mut tasks = vec![];
                for framework in self.frameworks.values() {
                    for executor in framework.executors() {
                        executor_infos
                            .push(executor.info.clone().with_framework_id(framework.id.clone()));
                        tasks.extend(executor.launched_tasks.values().cloned());
                    }
                }
                self.send_to_master(MasterMessage::ReregisterSlave {
                    slave_id,
                    slave: self.info.clone(),
                    executor_infos,
                    tasks,
                });
            }
        }
        let delay = self
            .options
            .registration_retry_strategy
            .delay(self.registration_attempt);
        self.registration_attempt = self.registration_attempt.saturating_add(1);
        ctx.send_with_delay(AgentEvent::RetryRegistration, delay);
    }

    pub(super) fn handle_run_task(
        &mut self,
        ctx: &mut ActorContext<Self>,
        framework_info: FrameworkInfo,
        framework_id: FrameworkId,
        pid: Pid,
        task: TaskInfo,
    ) -> ActorAction {
        info!(
            "got assigned task {} for framework {framework_id}",
            task.task_id
        );
        let framework = self.frameworks.entry(framework_id.clone()).or_insert_with(|| {
            Framework::new(framework_id.clone(), framework_info, pid.clone())
        });
        // Keep the driver pid current for frameworks that already exist.
        framework.pid = pid;
        let framework_info = framework.info.clone();
        let framework_pid = framework.pid.clone();
        let executor_info = framework.executor_info_for_task(&task);
        let executor_id = executor_info.executor_id.clone();

        enum Disposition {
            Reject,
            Queue,
            Dispatch(Pid),
            Launch,
        }
        let disposition = match framework.get_executor(&executor_id) {
            Some(executor) if executor.shutdown => Disposition::Reject,
            Some(executor) => match executor.pid.clone() {
                Some(pid) => Disposition::Dispatch(pid),
                None => Disposition::Queue,
            },
            None => Disposition::Launch,
        };
        match disposition {
            Disposition::Reject => {
                warn!(
                    "asked to run task '{}' for framework {framework_id} with executor '{executor_id}' which is being shut down",
                    task.task_id
                );
                let update = self.create_status_update(
                    &framework_id,
                    Some(&executor_id),
                    &task.task_id,
                    TaskState::Lost,
                    "executor is being shut down",
                );
                self.forward_status_update(update);
            }
            Disposition::Queue => {
                info!(
                    "queuing task '{}' for executor '{executor_id}' of framework {framework_id}",
                    task.task_id
                );
                if let Some(framework) = self.frameworks.get_mut(&framework_id) {
                    framework.queue_task(&executor_id, task);
                }
            }
            Disposition::Dispatch(executor_pid) => {
                let resources = {
                    let Some(framework) = self.frameworks.get_mut(&framework_id) else {
                        return ActorAction::Continue;
                    };
                    framework.launch_task(&executor_id, Task::from_info(&task, &framework_id));
                    framework
                        .get_executor(&executor_id)
                        .map(|x| x.isolation_resources())
                };
                self.stats.record_task_state(TaskState::Staging);
                if let Some(resources) = resources {
                    self.dispatch_resources_changed(
                        ctx,
                        framework_id.clone(),
                        executor_id.clone(),
                        resources,
                    );
                }
                self.options.transport.send_to_executor(
                    &executor_pid,
                    ExecutorMessage::RunTask {
                        framework_id,
                        framework_info,
                        pid: framework_pid,
                        task,
                    },
                );
            }
            Disposition::Launch => {
                let slave_id = self.slave_id.clone().unwrap_or_default();
                let directory = match paths::create_unique_work_directory(
                    &self.options.work_dir,
                    &slave_id,
                    &framework_id,
                    &executor_id,
                    self.options.no_create_work_dir,
                ) {
                    Ok(directory) => directory,
                    Err(e) => {
                        error!(
                            "failed to create work directory for executor '{executor_id}' of framework {framework_id}: {e}"
                        );
                        return ActorAction::Stop;
                    }
                };
                info!(
                    "using '{}' as work directory for executor '{executor_id}' of framework {framework_id}",
                    directory.display()
                );
                let executor_info = executor_info.with_framework_id(framework_id.clone());
                let resources = {
                    let Some(framework) = self.frameworks.get_mut(&framework_id) else {
                        return ActorAction::Continue;
                    };
                    framework.create_executor(executor_info.clone(), directory.clone());
                    framework.queue_task(&executor_id, task);
                    framework
                        .get_executor(&executor_id)
                        .map(|x| x.isolation_resources())
                        .unwrap_or_default()
                };
                let isolator = Arc::clone(&self.options.isolator);
                ctx.spawn(async move {
                    if let Err(e) = isolator
                        .launch_executor(
                            framework_id.clone(),
                            framework_info,
                            executor_info,
                            directory,
                            resources,
                        )
                        .await
                    {
                        error!("failed to launch executor of framework {framework_id}: {e}");
                    }
                });
            }
        }
        ActorAction::Continue
    }

    pub(super) fn handle_kill_task(
        &mut self,
        ctx: &mut ActorContext<Self>,
        framework_id: FrameworkId,
        task_id: TaskId,
    ) -> ActorAction {
        info!("asked to kill task {task_id} of framework {framework_id}");
        let Some(framework) = self.frameworks.get(&framework_id) else {
            warn!(
                "cannot kill task {task_id} of framework {framework_id} because no such framework is running"
            );
            let update = self.create_status_update(
                &framework_id,
                None,
                &task_id,
                TaskState::Lost,
                "framework is not running on this agent",
            );
            self.forward_status_update(update);
            return ActorAction::Continue;
        };
        let Some(executor_id) = framework.executor_id_for_task(&task_id).cloned() else {
            warn!(
                "cannot kill task {task_id} of framework {framework_id} because no such task is running"
            );
            let update = self.create_status_update(
                &framework_id,
                None,
                &task_id,
                TaskState::Lost,
                "task is not running on this agent",
            );
            self.forward_status_update(update);
            return ActorAction::Continue;
        };
        let executor_pid = framework
            .get_executor(&executor_id)
            .and_then(|x| x.pid.clone());
        match executor_pid {
            None => {
                // The executor has not registered; the agent answers for it.
                // The update flows through the reliability engine, which also
                // drops the queued task and recomputes the resource limits.
                let update = self.create_status_update(
                    &framework_id,
                    Some(&executor_id),
                    &task_id,
                    TaskState::Killed,
                    "task killed before the executor registered",
                );
                self.status_update(ctx, update);
            }
            Some(pid) => {
                // The executor is expected to answer with a status update.
                self.options.transport.send_to_executor(
                    &pid,
                    ExecutorMessage::KillTask {
                        framework_id,
                        task_id,
                    },
                );
            }
        }
        ActorAction::Continue
    }

    pub(super) fn handle_shutdown_framework(
        &mut self,
        ctx: &mut ActorContext<Self>,
        framework_id: FrameworkId,
    ) -> ActorAction {
        info!("asked to shut down framework {framework_id}");
        let Some(framework) = self.frameworks.get(&framework_id) else {
            return ActorAction::Continue;
        };
        // Framework destruction is deferred until all pending updates drain.
        for executor_id in framework.executor_ids() {
            self.shutdown_executor(ctx, &framework_id, &executor_id);
        }
        ActorAction::Continue
    }

    pub(super) fn handle_framework_to_executor(
        &mut self,
        _ctx: &mut ActorContext<Self>,
        slave_id: SlaveId,
        framework_id: FrameworkId,
        executor_id: ExecutorId,
        data: Vec<u8>,
    ) -> ActorAction {
        let Some(framework) = self.frameworks.get(&framework_id) else {
            warn!("dropping message for framework {framework_id} because the framework does not exist");
            self.stats.invalid_framework_messages += 1;
            return ActorAction::Continue;
        };
        match framework.get_executor(&executor_id) {
            None => {
                warn!(
                    "dropping message for executor '{executor_id}' of framework {framework_id} because the executor does not exist"
                );
                self.stats.invalid_framework_messages += 1;
            }
            Some(executor) => match executor.pid.clone() {
                None => {
                    // Contractual: frameworks gate sending on an
                    // executor-ready signal they arrange themselves.
                    warn!(
                        "dropping message for executor '{executor_id}' of framework {framework_id} because the executor has not registered"
                    );
                    self.stats.invalid_framework_messages += 1;
                }
                Some(pid) => {
                    self.options.transport.send_to_executor(
                        &pid,
                        ExecutorMessage::FrameworkToExecutor {
                            slave_id,
                            framework_id: framework_id.clone(),
                            executor_id: executor_id.clone(),
                            data,
                        },
                    );
                    self.stats.valid_framework_messages += 1;
                }
            },
        }
        ActorAction::Continue
    }

    pub(super) fn handle_update_framework(
        &mut self,
        _ctx: &mut ActorContext<Self>,
        framework_id: FrameworkId,
        pid: Pid,
    ) -> ActorAction {
        match self.frameworks.get_mut(&framework_id) {
            Some(framework) => {
                info!("updating framework {framework_id} pid to {pid}");
                framework.pid = pid;
            }
            None => {
                warn!("dropping pid update for unknown framework {framework_id}");
            }
        }
        ActorAction::Continue
    }

    pub(super) fn handle_status_update_acknowledgement(
        &mut self,
        _ctx: &mut ActorContext<Self>,
        _slave_id: SlaveId,
        framework_id: FrameworkId,
        task_id: TaskId,
        uuid: Uuid,
    ) -> ActorAction {
        let Some(framework) = self.frameworks.get_mut(&framework_id) else {
            return ActorAction::Continue;
        };
        if framework.updates.remove(&uuid).is_some() {
            info!(
                "got acknowledgement of status update for task {task_id} of framework {framework_id}"
            );
            let idle = framework.idle();
            if idle {
                debug!("cleaning up framework {framework_id}");
                self.frameworks.remove(&framework_id);
            }
        }
        ActorAction::Continue
    }

    pub(super) fn handle_set_framework_priorities(
        &mut self,
        ctx: &mut ActorContext<Self>,
        priorities: HashMap<FrameworkId, f64>,
    ) -> ActorAction {
        let isolator = Arc::clone(&self.options.isolator);
        ctx.spawn(async move {
            if let Err(e) = isolator.set_framework_priorities(priorities).await {
                warn!("failed to set framework priorities: {e}");
            }
        });
        ActorAction::Continue
    }

    pub(super) fn handle_register_executor(
        &mut self,
        ctx: &mut ActorContext<Self>,
        framework_id: FrameworkId,
        executor_id: ExecutorId,
        from: Pid,
    ) -> ActorAction {
        info!("got registration for executor '{executor_id}' of framework {framework_id}");
        let disposition = match self.frameworks.get(&framework_id) {
            None => Err("the framework does not exist (it may have been torn down)"),
            Some(framework) => match framework.get_executor(&executor_id) {
                None => Err("the executor is not expected"),
                Some(executor) if executor.is_registered() => {
                    Err("the executor is already running")
                }
                Some(executor) if executor.shutdown => Err("the executor is being shut down"),
                Some(_) => Ok(()),
            },
        };
        if let Err(reason) = disposition {
            warn!(
                "refusing registration for executor '{executor_id}' of framework {framework_id}: {reason}; telling executor to exit"
            );
            self.options
                .transport
                .send_to_executor(&from, ExecutorMessage::ShutdownExecutor);
            return ActorAction::Continue;
        }

        let (queued, resources, executor_info, framework_info, framework_pid) = {
            let Some(framework) = self.frameworks.get_mut(&framework_id) else {
                return ActorAction::Continue;
            };
            if let Some(executor) = framework.get_executor_mut(&executor_id) {
                executor.pid = Some(from.clone());
            }
            // Account for the tasks the executor is about to receive before
            // recomputing its resource limits.
            let queued = framework.take_queued_tasks(&executor_id);
            for task in &queued {
                framework.launch_task(&executor_id, Task::from_info(task, &framework_id));
            }
            let Some(executor) = framework.get_executor(&executor_id) else {
                return ActorAction::Continue;
            };
            (
                queued,
                executor.isolation_resources(),
                executor.info.clone(),
                framework.info.clone(),
                framework.pid.clone(),
            )
        };
        self.dispatch_resources_changed(ctx, framework_id.clone(), executor_id.clone(), resources);
        self.options.transport.send_to_executor(
            &from,
            ExecutorMessage::ExecutorRegistered {
                executor_info,
                framework_id: framework_id.clone(),
                framework_info: framework_info.clone(),
                slave_id: self.slave_id.clone().unwrap_or_default(),
                slave_info: self.info.clone(),
            },
        );
        info!(
            "flushing {} queued tasks for framework {framework_id}",
            queued.len()
        );
        for task in queued {
            self.stats.record_task_state(TaskState::Staging);
            self.options.transport.send_to_executor(
                &from,
                ExecutorMessage::RunTask {
                    framework_id: framework_id.clone(),
                    framework_info: framework_info.clone(),
                    pid: framework_pid.clone(),
                    task,
                },
            );
        }
        ActorAction::Continue
    }

    pub(super) fn handle_status_update(
        &mut self,
        ctx: &mut ActorContext<Self>,
        update: StatusUpdate,
    ) -> ActorAction {
        self.status_update(ctx, update);
        ActorAction::Continue
    }

    /// The reliability engine for status updates. Applies the transition to
    /// the task, forwards the update to the master, and records it for
    /// periodic resend until the master acknowledges its uuid.
    fn status_update(&mut self, ctx: &mut ActorContext<Self>, update: StatusUpdate) {
        let framework_id = update.framework_id.clone();
        let task_id = update.status.task_id.clone();
        let state = update.status.state;
        info!("status update: task {task_id} of framework {framework_id} is now in state {state}");

        let Some(framework) = self.frameworks.get(&framework_id) else {
            warn!("could not find framework {framework_id} for a status update");
            self.stats.invalid_status_updates += 1;
            return;
        };
        let Some(executor_id) = framework.executor_id_for_task(&task_id).cloned() else {
            warn!(
                "could not find an executor of framework {framework_id} that owns task {task_id}"
            );
            self.stats.invalid_status_updates += 1;
            return;
        };

        let recompute = {
            let Some(framework) = self.frameworks.get_mut(&framework_id) else {
                return;
            };
            if state.is_terminal() {
                let removed = framework.remove_launched_task(&task_id).is_some()
                    || framework.remove_queued_task(&task_id).is_some();
                if removed {
                    framework
                        .get_executor(&executor_id)
                        .map(|x| x.isolation_resources())
                } else {
                    None
                }
            } else {
                framework.update_task_state(&task_id, state);
                None
            }
        };
        if let Some(resources) = recompute {
            self.dispatch_resources_changed(ctx, framework_id.clone(), executor_id, resources);
        }

        // Forward to the master, stamped with the agent pid so that the
        // acknowledgement finds its way back here.
        self.send_to_master(MasterMessage::StatusUpdate {
            update: update.clone(),
            pid: self.options.pid.clone(),
        });

        let uuid = update.uuid;
        if let Some(framework) = self.frameworks.get_mut(&framework_id) {
            framework.updates.insert(uuid, update);
        }
        ctx.send_with_delay(
            AgentEvent::RetryStatusUpdate { framework_id, uuid },
            self.options.status_update_retry_interval,
        );

        self.stats.record_task_state(state);
        self.stats.valid_status_updates += 1;
    }

    pub(super) fn handle_retry_status_update(
        &mut self,
        ctx: &mut ActorContext<Self>,
        framework_id: FrameworkId,
        uuid: Uuid,
    ) -> ActorAction {
        // The framework or the update may be gone by now, in which case the
        // retry is obsolete.
        let Some(framework) = self.frameworks.get(&framework_id) else {
            return ActorAction::Continue;
        };
        let Some(update) = framework.updates.get(&uuid) else {
            return ActorAction::Continue;
        };
        info!(
            "resending status update for task {} of framework {framework_id}",
            update.status.task_id
        );
        let update = update.clone();
        self.send_to_master(MasterMessage::StatusUpdate {
            update,
            pid: self.options.pid.clone(),
        });
        ctx.send_with_delay(
            AgentEvent::RetryStatusUpdate { framework_id, uuid },
            self.options.status_update_retry_interval,
        );
        ActorAction::Continue
    }

    pub(super) fn handle_executor_to_framework(
        &mut self,
        _ctx: &mut ActorContext<Self>,
        slave_id: SlaveId,
        framework_id: FrameworkId,
        executor_id: ExecutorId,
        data: Vec<u8>,
    ) -> ActorAction {
        let Some(framework) = self.frameworks.get(&framework_id) else {
            warn!(
                "cannot send a message from executor '{executor_id}' to framework {framework_id} because the framework does not exist"
            );
            self.stats.invalid_framework_messages += 1;
            return ActorAction::Continue;
        };
        info!("sending message for framework {framework_id} to {}", framework.pid);
        self.options.transport.send_to_driver(
            &framework.pid,
            DriverMessage::ExecutorToFramework {
                slave_id,
                framework_id: framework_id.clone(),
                executor_id,
                data,
            },
        );
        self.stats.valid_framework_messages += 1;
        ActorAction::Continue
    }

    pub(super) fn handle_ping(&mut self, _ctx: &mut ActorContext<Self>, from: Pid) -> ActorAction {
        self.options.transport.send_pong(&from);
        ActorAction::Continue
    }

    pub(super) fn handle_peer_lost(
        &mut self,
        _ctx: &mut ActorContext<Self>,
        peer: Pid,
    ) -> ActorAction {
        info!("peer exited: {peer}");
        if self.master.as_ref() == Some(&peer) {
            // Keep serving local state until a new master appears.
            warn!("master disconnected, waiting for a new master to be elected");
        }
        ActorAction::Continue
    }

    /// Graceful executor shutdown: notify the executor, refuse new tasks,
    /// and arm the kill fallback stamped with the executor incarnation.
    fn shutdown_executor(
        &mut self,
        ctx: &mut ActorContext<Self>,
        framework_id: &FrameworkId,
        executor_id: &ExecutorId,
    ) {
        let (executor_pid, uuid) = {
            let Some(framework) = self.frameworks.get_mut(framework_id) else {
                return;
            };
            let Some(executor) = framework.get_executor_mut(executor_id) else {
                return;
            };
            info!("shutting down executor '{executor_id}' of framework {framework_id}");
            executor.shutdown = true;
            (executor.pid.clone(), executor.uuid)
        };
        // The message is dropped on the floor if the executor has not
        // registered yet.
        if let Some(pid) = executor_pid {
            self.options
                .transport
                .send_to_executor(&pid, ExecutorMessage::ShutdownExecutor);
        }
        ctx.send_with_delay(
            AgentEvent::ProbeExecutorShutdown {
                framework_id: framework_id.clone(),
                executor_id: executor_id.clone(),
                uuid,
            },
            self.options.executor_shutdown_timeout,
        );
    }

    pub(super) fn handle_probe_executor_shutdown(
        &mut self,
        ctx: &mut ActorContext<Self>,
        framework_id: FrameworkId,
        executor_id: ExecutorId,
        uuid: Uuid,
    ) -> ActorAction {
        let Some(framework) = self.frameworks.get_mut(&framework_id) else {
            return ActorAction::Continue;
        };
        // The uuid guard makes timers from a previous incarnation of the
        // same executor id a no-op.
        let matched = framework
            .get_executor(&executor_id)
            .is_some_and(|x| x.uuid == uuid);
        if !matched {
            return ActorAction::Continue;
        }
        info!("killing executor '{executor_id}' of framework {framework_id}");
        let directory = framework.destroy_executor(&executor_id).map(|x| x.directory);
        let has_executors = framework.has_executors();
        if !has_executors {
            // Any updates still pending are dropped with the framework.
            self.frameworks.remove(&framework_id);
        }
        let isolator = Arc::clone(&self.options.isolator);
        {
            let framework_id = framework_id.clone();
            let executor_id = executor_id.clone();
            ctx.spawn(async move {
                if let Err(e) = isolator
                    .kill_executor(framework_id.clone(), executor_id.clone())
                    .await
                {
                    warn!(
                        "failed to kill executor '{executor_id}' of framework {framework_id}: {e}"
                    );
                }
            });
        }
        if let Some(directory) = directory {
            self.schedule_executor_directory_gc(ctx, directory);
        }
        ActorAction::Continue
    }

    pub(super) fn handle_executor_started(
        &mut self,
        ctx: &mut ActorContext<Self>,
        framework_id: FrameworkId,
        executor_id: ExecutorId,
        os_pid: u32,
    ) -> ActorAction {
        debug!("executor '{executor_id}' of framework {framework_id} started as process {os_pid}");
        ctx.send(AgentEvent::CollectStatistics {
            framework_id,
            executor_id,
            previous: None,
        });
        ActorAction::Continue
    }

    pub(super) fn handle_executor_exited(
        &mut self,
        ctx: &mut ActorContext<Self>,
        framework_id: FrameworkId,
        executor_id: ExecutorId,
        status: i32,
    ) -> ActorAction {
        info!("executor '{executor_id}' of framework {framework_id} has exited with status {status}");
        let Some(framework) = self.frameworks.get(&framework_id) else {
            warn!("framework {framework_id} for exited executor '{executor_id}' is no longer valid");
            return ActorAction::Continue;
        };
        let Some(executor) = framework.get_executor(&executor_id) else {
            warn!("unknown executor '{executor_id}' of framework {framework_id} has exited");
            return ActorAction::Continue;
        };
        let directory = executor.directory.clone();
        // A task that ran under a synthesized command executor failed with
        // the executor itself; any other task is merely lost.
        let mut command_executor = false;
        let mut updates = vec![];
        for task in executor.launched_tasks.values() {
            if task.state.is_terminal() {
                continue;
            }
            let is_command = task.executor_id.is_none();
            command_executor |= is_command;
            updates.push(self.exit_status_update(
                &framework_id,
                &executor_id,
                &task.task_id,
                is_command,
                status,
            ));
        }
        for task in executor.queued_tasks.values() {
            let is_command = task.has_command();
            command_executor |= is_command;
            updates.push(self.exit_status_update(
                &framework_id,
                &executor_id,
                &task.task_id,
                is_command,
                status,
            ));
        }
        for update in updates {
            self.status_update(ctx, update);
        }
        if !command_executor {
            self.send_to_master(MasterMessage::ExitedExecutor {
                slave_id: self.slave_id.clone().unwrap_or_default(),
                framework_id: framework_id.clone(),
                executor_id: executor_id.clone(),
                status,
            });
        }
        self.schedule_executor_directory_gc(ctx, directory);
        let idle = match self.frameworks.get_mut(&framework_id) {
            Some(framework) => {
                framework.destroy_executor(&executor_id);
                framework.idle()
            }
            None => false,
        };
        if idle {
            debug!("cleaning up framework {framework_id}");
            self.frameworks.remove(&framework_id);
        }
        ActorAction::Continue
    }

    fn exit_status_update(
        &self,
        framework_id: &FrameworkId,
        executor_id: &ExecutorId,
        task_id: &TaskId,
        is_command: bool,
        status: i32,
    ) -> StatusUpdate {
        if is_command {
            self.create_status_update(
                framework_id,
                Some(executor_id),
                task_id,
                TaskState::Failed,
                format!("executor running the task's command failed (exit status {status})"),
            )
        } else {
            self.create_status_update(
                framework_id,
                Some(executor_id),
                task_id,
                TaskState::Lost,
                format!("executor exited (exit status {status})"),
            )
        }
    }

    pub(super) fn handle_sample_usage(&mut self, ctx: &mut ActorContext<Self>) -> ActorAction {
        for (framework_id, framework) in &self.frameworks {
            for executor in framework.executors() {
                let isolator = Arc::clone(&self.options.isolator);
                let framework_id = framework_id.clone();
                let executor_id = executor.id.clone();
                ctx.spawn(async move {
                    isolator.sample_usage(framework_id, executor_id).await;
                });
            }
        }
        ctx.send_with_delay(AgentEvent::SampleUsage, self.options.usage_sample_interval);
        ActorAction::Continue
    }

    pub(super) fn handle_collect_statistics(
        &mut self,
        ctx: &mut ActorContext<Self>,
        framework_id: FrameworkId,
        executor_id: ExecutorId,
        previous: Option<ResourceStatistics>,
    ) -> ActorAction {
        let isolator = Arc::clone(&self.options.isolator);
        let handle = ctx.handle().clone();
        ctx.spawn(async move {
            let statistics = match isolator
                .collect_statistics(framework_id.clone(), executor_id.clone())
                .await
            {
                Ok(statistics) => statistics,
                Err(e) => {
                    warn!(
                        "failed to collect statistics for executor '{executor_id}' of framework {framework_id}: {e}"
                    );
                    None
                }
            };
            let _ = handle
                .send(AgentEvent::StatisticsCollected {
                    framework_id,
                    executor_id,
                    previous,
                    statistics,
                })
                .await;
        });
        ActorAction::Continue
    }

    pub(super) fn handle_statistics_collected(
        &mut self,
        ctx: &mut ActorContext<Self>,
        framework_id: FrameworkId,
        executor_id: ExecutorId,
        previous: Option<ResourceStatistics>,
        statistics: Option<ResourceStatistics>,
    ) -> ActorAction {
        let expected_resources = self
            .frameworks
            .get(&framework_id)
            .and_then(|x| x.get_executor(&executor_id))
            .map(|x| x.isolation_resources());
        let still_running = expected_resources.is_some();
        match statistics {
            Some(current) => {
                let usage = UsageMessage {
                    slave_id: self.slave_id.clone().unwrap_or_default(),
                    framework_id: framework_id.clone(),
                    executor_id: executor_id.clone(),
                    cpu_usage: previous.as_ref().and_then(|x| current.cpu_usage_since(x)),
                    statistics: current.clone(),
                    expected_resources,
                    still_running,
                };
                self.send_to_master(MasterMessage::Usage(usage));
                if still_running {
                    ctx.send_with_delay(
                        AgentEvent::CollectStatistics {
                            framework_id,
                            executor_id,
                            previous: Some(current),
                        },
                        self.options.usage_sample_interval,
                    );
                }
            }
            None => {
                // The sample was suppressed; retry while the executor lives.
                if still_running {
                    ctx.send_with_delay(
                        AgentEvent::CollectStatistics {
                            framework_id,
                            executor_id,
                            previous,
                        },
                        self.options.usage_sample_interval,
                    );
                }
            }
        }
        ActorAction::Continue
    }

    pub(super) fn handle_send_usage(
        &mut self,
        _ctx: &mut ActorContext<Self>,
        mut usage: UsageMessage,
    ) -> ActorAction {
        usage.slave_id = self.slave_id.clone().unwrap_or_default();
        self.send_to_master(MasterMessage::Usage(usage));
        ActorAction::Continue
    }

    pub(super) fn handle_remove_directories(
        &mut self,
        ctx: &mut ActorContext<Self>,
        paths: Vec<PathBuf>,
    ) -> ActorAction {
        ctx.spawn(async move {
            for path in paths {
                info!("deleting directory {}", path.display());
                if let Err(e) = tokio::fs::remove_dir_all(&path).await {
                    warn!("failed to delete directory {}: {e}", path.display());
                }
            }
        });
        ActorAction::Continue
    }

    pub(super) fn handle_observe_state(
        &mut self,
        _ctx: &mut ActorContext<Self>,
        result: oneshot::Sender<AgentSnapshot>,
    ) -> ActorAction {
        let _ = result.send(self.snapshot());
        ActorAction::Continue
    }

    pub(super) fn handle_shutdown(&mut self, ctx: &mut ActorContext<Self>) -> ActorAction {
        info!("agent asked to shut down");
        let framework_ids: Vec<FrameworkId> = self.frameworks.keys().cloned().collect();
        for framework_id in framework_ids {
            let executor_ids = self
                .frameworks
                .get(&framework_id)
                .map(|x| x.executor_ids())
                .unwrap_or_default();
            for executor_id in executor_ids {
                self.shutdown_executor(ctx, &framework_id, &executor_id);
            }
        }
        ActorAction::Stop
    }

    fn snapshot(&self) -> AgentSnapshot {
        let mut frameworks: Vec<FrameworkSnapshot> =
            self.frameworks.values().map(Framework::snapshot).collect();
        frameworks.sort_by(|a, b| a.id.cmp(&b.id));
        AgentSnapshot {
            slave_id: self.slave_id.clone(),
            master: self.master.as_ref().map(|x| x.to_string()),
            connected: self.connected,
            hostname: self.info.hostname.clone(),
            resources: self.info.resources.clone(),
            started_at: self.started_at,
            frameworks,
            stats: self.stats.clone(),
        }
    }

    fn create_status_update(
        &self,
        framework_id: &FrameworkId,
        executor_id: Option<&ExecutorId>,
        task_id: &TaskId,
        state: TaskState,
        reason: impl Into<String>,
    ) -> StatusUpdate {
        StatusUpdate {
            framework_id: framework_id.clone(),
            executor_id: executor_id.cloned(),
            slave_id: self.slave_id.clone().unwrap_or_default(),
            status: TaskStatus {
                task_id: task_id.clone(),
                state,
                message: Some(reason.into()),
            },
            timestamp: Utc::now(),
            uuid: Uuid::new_v4(),
        }
    }

    /// Forward a status update to the master without recording it for
    /// retry. Used for references the agent has no framework record for.
    fn forward_status_update(&self, update: StatusUpdate) {
        self.send_to_master(MasterMessage::StatusUpdate {
            update,
            pid: self.options.pid.clone(),
        });
    }

    fn dispatch_resources_changed(
        &self,
        ctx: &mut ActorContext<Self>,
        framework_id: FrameworkId,
        executor_id: ExecutorId,
        resources: Resources,
    ) {
        let isolator = Arc::clone(&self.options.isolator);
        ctx.spawn(async move {
            if let Err(e) = isolator
                .resources_changed(framework_id.clone(), executor_id.clone(), resources)
                .await
            {
                warn!(
                    "failed to update resources of executor '{executor_id}' of framework {framework_id}: {e}"
                );
            }
        });
    }

    fn schedule_executor_directory_gc(&self, ctx: &mut ActorContext<Self>, directory: PathBuf) {
        info!(
            "scheduling executor directory {} for deletion",
            directory.display()
        );
        ctx.send_with_delay(
            AgentEvent::RemoveDirectories {
                paths: vec![directory],
            },
            self.options.gc_timeout,
        );
    }

    fn garbage_collect_slave_directories(&self, ctx: &mut ActorContext<Self>) {
        let Some(slave_id) = &self.slave_id else {
            return;
        };
        let stale = paths::find_stale_slave_directories(
            &self.options.work_dir,
            slave_id,
            self.options.gc_timeout,
        );
        for path in &stale {
            info!(
                "scheduling stale agent directory {} for deletion",
                path.display()
            );
        }
        if !stale.is_empty() {
            ctx.send(AgentEvent::RemoveDirectories { paths: stale });
        }
    }

    fn send_to_master(&self, message: MasterMessage) {
        let Some(master) = &self.master else {
            debug!("dropping an outbound message because no master is detected");
            return;
        };
        self.options.transport.send_to_master(master, message);
    }
}
