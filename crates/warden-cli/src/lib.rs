//! Warden CLI Library
//!
//! Subcommands for running a supervised worker, sweeping orphaned workers
//! and inspecting classification and configuration.

pub mod classify_cmd;
pub mod cleanup_cmd;
pub mod config_cmd;
pub mod run_cmd;
pub mod settings;
