//! CLI commands module

pub mod ask;
pub mod config;
pub mod plan;
pub mod render;
