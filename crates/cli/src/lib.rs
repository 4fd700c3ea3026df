//! `capsule-bridge` command-line front end.

pub mod cli;
pub mod commands;
pub mod config;
pub mod error;
pub mod logging;
