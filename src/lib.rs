pub mod acquire;
pub mod config;
pub mod digest;
pub mod handlers;
pub mod humanize;
pub mod observability;
pub mod orchestrator;
pub mod package;
pub mod process;
