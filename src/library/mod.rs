pub mod logger;
pub mod state_machine;
pub mod task;
