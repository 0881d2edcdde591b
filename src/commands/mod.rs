pub mod classify_commands;
pub mod classify_pipeline;
pub mod offline_workflow;
pub mod server;
