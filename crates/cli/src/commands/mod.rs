//! Subcommand implementations

pub mod activity;
pub mod findings;
pub mod health;
pub mod recommendations;
