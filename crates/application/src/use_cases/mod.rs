pub mod commands;
pub mod planning_executor;
