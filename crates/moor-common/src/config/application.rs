use figment::providers::{Env, Format, Toml};
use figment::Figment;
use serde::{Deserialize, Serialize};

use crate::config::loader::deserialize_non_empty_string;
use crate::error::{CommonError, CommonResult};

const DEFAULT_CONFIG: &str = include_str!("default.toml");

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub agent: AgentConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    /// The hostname reported to the master,
    /// or empty to detect the hostname of the machine.
    #[serde(deserialize_with = "deserialize_non_empty_string")]
    pub hostname: Option<String>,
    /// The public DNS name shown in the master web UI,
    /// or empty to reuse the hostname.
    #[serde(deserialize_with = "deserialize_non_empty_string")]
    pub public_dns: Option<String>,
    pub webui_port: u16,
    /// The resources offered by the agent (e.g. `cpus:4;mem:2048`),
    /// or empty to auto-detect the machine resources.
    #[serde(deserialize_with = "deserialize_non_empty_string")]
    pub resources: Option<String>,
    /// Opaque key-value attributes attached to the agent (e.g. `rack:r1;floor:2`).
    #[serde(deserialize_with = "deserialize_non_empty_string")]
    pub attributes: Option<String>,
    pub work_dir: String,
    /// When set, work directory paths are computed but never created.
    pub no_create_work_dir: bool,
    /// Whether the agent runs in local (in-process) mode.
    pub local: bool,
    pub gc_timeout_hours: u64,
    pub executor_shutdown_timeout_secs: u64,
    pub status_update_retry_interval_secs: u64,
    pub usage_sample_interval_secs: u64,
    pub registration_retry_strategy: RetryStrategy,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RetryStrategy {
    Fixed {
        delay_secs: u64,
    },
    ExponentialBackoff {
        initial_delay_secs: u64,
        max_delay_secs: u64,
        factor: u32,
    },
}

impl AppConfig {
    pub fn load() -> CommonResult<Self> {
        Figment::from(Toml::string(DEFAULT_CONFIG))
            .merge(Env::prefixed("MOOR_").map(|p| p.as_str().replace("__", ".").into()))
            .extract()
            .map_err(|e| CommonError::InvalidArgument(e.to_string()))
    }
}
