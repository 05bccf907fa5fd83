pub mod handlers;
pub mod state_machine;

pub use handlers::{HandlerDeps, StateHandler};
pub use state_machine::ExplorationStateMachine;
