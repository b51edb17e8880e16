use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::AgentError;

macro_rules! define_id_type {
    ($name:ident) => {
        #[derive(
            Debug, Clone, Default, Eq, PartialEq, Ord, PartialOrd, Hash, Serialize, Deserialize,
        )]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            pub fn new(value: impl Into<String>) -> Self {
                Self(value.into())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl From<&str> for $name {
            fn from(value: &str) -> Self {
                Self(value.to_string())
            }
        }

        impl From<String> for $name {
            fn from(value: String) -> Self {
                Self(value)
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

// SlaveId is assigned by the master at registration; the other ids
// arrive on inbound messages and are opaque to the agent.
define_id_type!(SlaveId);
define_id_type!(FrameworkId);
define_id_type!(ExecutorId);
define_id_type!(TaskId);

/// The identity of a message-addressable peer, such as the master,
/// a framework driver, or an executor.
#[derive(Debug, Clone, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub struct Pid {
    pub id: String,
    pub host: String,
    pub port: u16,
}

impl Pid {
    pub fn new(id: impl Into<String>, host: impl Into<String>, port: u16) -> Self {
        Self {
            id: id.into(),
            host: host.into(),
            port,
        }
    }
}

impl fmt::Display for Pid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}:{}", self.id, self.host, self.port)
    }
}

impl FromStr for Pid {
    type Err = AgentError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let error = || AgentError::InvalidArgument(format!("invalid pid: {s}"));
        let (id, address) = s.split_once('@').ok_or_else(error)?;
        let (host, port) = address.rsplit_once(':').ok_or_else(error)?;
        if id.is_empty() || host.is_empty() {
            return Err(error());
        }
        let port = port.parse().map_err(|_| error())?;
        Ok(Self::new(id, host, port))
    }
}
