mod actor;
mod event;
mod options;
mod paths;
mod state;

pub use actor::AgentActor;
pub use event::AgentEvent;
pub use options::AgentOptions;
pub use state::{
    AgentSnapshot, AgentStats, ExecutorSnapshot, FrameworkSnapshot, TaskSnapshot,
};
