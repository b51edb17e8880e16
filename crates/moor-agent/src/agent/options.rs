use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use moor_common::config::AppConfig;
use moor_server::retry::RetryStrategy;
use sysinfo::System;

use crate::error::{AgentError, AgentResult};
use crate::id::Pid;
use crate::isolation::Isolator;
use crate::resources::{Attributes, Resources};
use crate::transport::Transport;

const SECS_PER_HOUR: u64 = 3600;

pub struct AgentOptions {
    /// The agent's own transport identity, stamped on forwarded status
    /// updates so the master knows where to send acknowledgements.
    pub pid: Pid,
    pub hostname: String,
    pub webui_hostname: String,
    pub webui_port: u16,
    pub resources: Resources,
    pub attributes: Attributes,
    pub work_dir: PathBuf,
    /// When set, work directory paths are computed but never created.
    pub no_create_work_dir: bool,
    /// Whether the agent runs in local (in-process) mode.
    pub local: bool,
    pub gc_timeout: Duration,
    pub executor_shutdown_timeout: Duration,
    pub status_update_retry_interval: Duration,
    pub usage_sample_interval: Duration,
    pub registration_retry_strategy: RetryStrategy,
    pub transport: Arc<dyn Transport>,
    pub isolator: Arc<dyn Isolator>,
}

impl AgentOptions {
    pub fn from_config(
        config: &AppConfig,
        pid: Pid,
        transport: Arc<dyn Transport>,
        isolator: Arc<dyn Isolator>,
    ) -> AgentResult<Self> {
        let agent = &config.agent;
        let hostname = match &agent.hostname {
            Some(hostname) => hostname.clone(),
            None => System::host_name().ok_or_else(|| {
                AgentError::InternalError("failed to determine the agent hostname".to_string())
            })?,
        };
        let webui_hostname = agent.public_dns.clone().unwrap_or_else(|| hostname.clone());
        let resources = match &agent.resources {
            Some(resources) => resources.parse()?,
            None => Resources::detect(),
        };
        let attributes = match &agent.attributes {
            Some(attributes) => attributes.parse()?,
            None => Attributes::default(),
        };
        Ok(Self {
            pid,
            hostname,
            webui_hostname,
            webui_port: agent.webui_port,
            resources,
            attributes,
            work_dir: PathBuf::from(&agent.work_dir),
            no_create_work_dir: agent.no_create_work_dir,
            local: agent.local,
            gc_timeout: Duration::from_secs(agent.gc_timeout_hours * SECS_PER_HOUR),
            executor_shutdown_timeout: Duration::from_secs(agent.executor_shutdown_timeout_secs),
            status_update_retry_interval: Duration::from_secs(
                agent.status_update_retry_interval_secs,
            ),
            usage_sample_interval: Duration::from_secs(agent.usage_sample_interval_secs),
            registration_retry_strategy: RetryStrategy::from(&agent.registration_retry_strategy),
            transport,
            isolator,
        })
    }
}
