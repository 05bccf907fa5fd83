pub mod types;
pub mod error;
pub mod config;
pub mod engine;
pub mod lifecycle;
pub mod supervisor;
pub mod providers;
pub mod storage;
pub mod events;
pub mod tools;

pub use config::Config;
pub use engine::ExplorationAgent;
pub use error::ExplorationError;
pub use supervisor::AgentSupervisor;
pub use types::*;
