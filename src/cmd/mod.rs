//! CLI subcommand implementations

pub mod config;
pub mod cookies;
pub mod providers;
pub mod streams;
