use std::collections::HashMap;
use std::path::PathBuf;
use std::process::Stdio;
use std::sync::{Arc, OnceLock};

use async_trait::async_trait;
use chrono::Utc;
use log::{debug, info, warn};
use moor_server::actor::ActorHandle;
use tokio::process::Command;
use tokio::sync::{oneshot, Mutex};

use crate::agent::{AgentActor, AgentEvent};
use crate::error::{AgentError, AgentResult};
use crate::id::{ExecutorId, FrameworkId, SlaveId};
use crate::isolation::Isolator;
use crate::messages::{ExecutorInfo, FrameworkInfo, ResourceStatistics, UsageMessage};
use crate::resources::Resources;

// `USER_HZ` and the page size on all common Linux configurations.
const CLOCK_TICKS_PER_SEC: f64 = 100.0;
const PAGE_SIZE_BYTES: u64 = 4096;

struct ExecutorProcess {
    os_pid: u32,
    /// Fires a kill of the executor process through the monitor task.
    kill: Option<oneshot::Sender<()>>,
    /// The resource limits last reported by the agent.
    /// The process isolator records them but does not enforce them.
    resources: Resources,
}

type ExecutorProcesses = Arc<Mutex<HashMap<(FrameworkId, ExecutorId), ExecutorProcess>>>;

/// An isolation backend that runs each executor as a plain child process
/// with no resource enforcement. The executor command is interpreted by
/// `sh` in the executor work directory.
pub struct ProcessIsolator {
    agent: OnceLock<ActorHandle<AgentActor>>,
    executors: ExecutorProcesses,
}

impl Default for ProcessIsolator {
    fn default() -> Self {
        Self::new()
    }
}

impl ProcessIsolator {
    pub fn new() -> Self {
        Self {
            agent: OnceLock::new(),
            executors: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    fn agent(&self) -> AgentResult<&ActorHandle<AgentActor>> {
        self.agent.get().ok_or_else(|| {
            AgentError::InternalError("the process isolator has not been initialized".to_string())
        })
    }
}

#[async_trait]
impl Isolator for ProcessIsolator {
    fn initialize(&self, _local: bool, agent: ActorHandle<AgentActor>) {
        if self.agent.set(agent).is_err() {
            warn!("the process isolator has already been initialized");
        }
    }

    async fn launch_executor(
        &self,
        framework_id: FrameworkId,
        _framework_info: FrameworkInfo,
        executor_info: ExecutorInfo,
        directory: PathBuf,
        resources: Resources,
    ) -> AgentResult<()> {
        let agent = self.agent()?.clone();
        let executor_id = executor_info.executor_id.clone();
        info!(
            "launching executor '{executor_id}' of framework {framework_id}: {}",
            executor_info.command.value
        );
        let mut child = Command::new("sh")
            .arg("-c")
            .arg(&executor_info.command.value)
            .args(&executor_info.command.arguments)
            .envs(&executor_info.command.environment)
            .env("MOOR_FRAMEWORK_ID", framework_id.as_str())
            .env("MOOR_EXECUTOR_ID", executor_id.as_str())
            .env("MOOR_WORK_DIRECTORY", &directory)
            .current_dir(&directory)
            .stdin(Stdio::null())
            .spawn()?;
        let os_pid = child.id().ok_or_else(|| {
            AgentError::InternalError(format!(
                "executor '{executor_id}' of framework {framework_id} exited before it was observed"
            ))
        })?;
        let (kill_tx, kill_rx) = oneshot::channel();
        {
            let mut executors = self.executors.lock().await;
            executors.insert(
                (framework_id.clone(), executor_id.clone()),
                ExecutorProcess {
                    os_pid,
                    kill: Some(kill_tx),
                    resources,
                },
            );
        }
        let _ = agent
            .send(AgentEvent::ExecutorStarted {
                framework_id: framework_id.clone(),
                executor_id: executor_id.clone(),
                os_pid,
            })
            .await;

        // The monitor owns the child; it reports the exit status back into
        // the agent inbox and drops the process record.
        let executors = Arc::clone(&self.executors);
        let key = (framework_id, executor_id);
        tokio::spawn(async move {
            let status = tokio::select! {
                status = child.wait() => Some(status),
                _ = kill_rx => None,
            };
            let status = match status {
                Some(status) => status,
                None => {
                    let _ = child.start_kill();
                    child.wait().await
                }
            };
            let status = match status {
                Ok(status) => raw_exit_status(status),
                Err(e) => {
                    warn!("failed to wait for executor process: {e}");
                    -1
                }
            };
            executors.lock().await.remove(&key);
            let (framework_id, executor_id) = key;
            let _ = agent
                .send(AgentEvent::ExecutorExited {
                    framework_id,
                    executor_id,
                    status,
                })
                .await;
        });
        Ok(())
    }

    async fn kill_executor(
        &self,
        framework_id: FrameworkId,
        executor_id: ExecutorId,
    ) -> AgentResult<()> {
        let mut executors = self.executors.lock().await;
        match executors.get_mut(&(framework_id.clone(), executor_id.clone())) {
            Some(process) => {
                if let Some(kill) = process.kill.take() {
                    info!("killing executor '{executor_id}' of framework {framework_id}");
                    let _ = kill.send(());
                }
            }
            None => {
                // The executor may have exited on its own already.
                debug!("executor '{executor_id}' of framework {framework_id} is not running");
            }
        }
        Ok(())
    }

    async fn resources_changed(
        &self,
        framework_id: FrameworkId,
        executor_id: ExecutorId,
        resources: Resources,
    ) -> AgentResult<()> {
        let mut executors = self.executors.lock().await;
        if let Some(process) = executors.get_mut(&(framework_id.clone(), executor_id.clone())) {
            debug!(
                "updating resources of executor '{executor_id}' of framework {framework_id} to {resources}"
            );
            process.resources = resources;
        }
        Ok(())
    }

    async fn set_framework_priorities(
        &self,
        priorities: HashMap<FrameworkId, f64>,
    ) -> AgentResult<()> {
        // The process isolator has no scheduler knobs to apply these to.
        debug!(
            "ignoring framework priorities for {} frameworks",
            priorities.len()
        );
        Ok(())
    }

    async fn sample_usage(&self, framework_id: FrameworkId, executor_id: ExecutorId) {
        let Ok(agent) = self.agent() else {
            return;
        };
        let (os_pid, resources) = {
            let executors = self.executors.lock().await;
            let Some(process) = executors.get(&(framework_id.clone(), executor_id.clone())) else {
                return;
            };
            (process.os_pid, process.resources.clone())
        };
        let Some(statistics) = read_statistics(os_pid) else {
            return;
        };
        let usage = UsageMessage {
            // The agent stamps its id when forwarding the report.
            slave_id: SlaveId::default(),
            framework_id,
            executor_id,
            statistics,
            cpu_usage: None,
            expected_resources: Some(resources),
            still_running: true,
        };
        let _ = agent.send(AgentEvent::SendUsage { usage }).await;
    }

    async fn collect_statistics(
        &self,
        framework_id: FrameworkId,
        executor_id: ExecutorId,
    ) -> AgentResult<Option<ResourceStatistics>> {
        let executors = self.executors.lock().await;
        let Some(process) = executors.get(&(framework_id, executor_id)) else {
            return Ok(None);
        };
        Ok(read_statistics(process.os_pid))
    }
}

#[cfg(unix)]
fn raw_exit_status(status: std::process::ExitStatus) -> i32 {
    use std::os::unix::process::ExitStatusExt;
    status.into_raw()
}

#[cfg(not(unix))]
fn raw_exit_status(status: std::process::ExitStatus) -> i32 {
    status.code().unwrap_or(-1)
}

#[cfg(target_os = "linux")]
fn read_statistics(os_pid: u32) -> Option<ResourceStatistics> {
    let stat = std::fs::read_to_string(format!("/proc/{os_pid}/stat")).ok()?;
    parse_proc_stat(&stat)
}

#[cfg(not(target_os = "linux"))]
fn read_statistics(_os_pid: u32) -> Option<ResourceStatistics> {
    None
}

/// Parse the cpu times and resident set size from a `/proc/<pid>/stat`
/// line, per proc(5). The command name may contain spaces, so fields are
/// counted from the closing parenthesis.
#[cfg_attr(not(target_os = "linux"), allow(dead_code))]
fn parse_proc_stat(stat: &str) -> Option<ResourceStatistics> {
    let (_, rest) = stat.rsplit_once(')')?;
    let fields: Vec<&str> = rest.split_whitespace().collect();
    let utime: f64 = fields.get(11)?.parse().ok()?;
    let stime: f64 = fields.get(12)?.parse().ok()?;
    let rss_pages: u64 = fields.get(21)?.parse().ok()?;
    Some(ResourceStatistics {
        timestamp: Utc::now(),
        cpu_user_time_secs: utime / CLOCK_TICKS_PER_SEC,
        cpu_system_time_secs: stime / CLOCK_TICKS_PER_SEC,
        memory_rss_bytes: rss_pages * PAGE_SIZE_BYTES,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_proc_stat() {
        let stat = "1234 (sh -c) S 1 1234 1234 0 -1 4194304 100 0 0 0 7 3 0 0 20 0 1 0 100 10000000 256 18446744073709551615 0 0 0 0 0 0 0 0 0 0 0 0 17 0 0 0 0 0 0";
        let statistics = parse_proc_stat(stat).unwrap();
        assert_eq!(statistics.cpu_user_time_secs, 0.07);
        assert_eq!(statistics.cpu_system_time_secs, 0.03);
        assert_eq!(statistics.memory_rss_bytes, 256 * PAGE_SIZE_BYTES);
    }

    #[test]
    fn test_parse_proc_stat_rejects_garbage() {
        assert!(parse_proc_stat("").is_none());
        assert!(parse_proc_stat("1234 (sh) S 1").is_none());
    }
}
