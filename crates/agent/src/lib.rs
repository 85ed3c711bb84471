//! Insight agent: runs the detection engine and serves the dashboard API

pub mod api;
pub mod config;
