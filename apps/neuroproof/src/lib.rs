//! # neuroproof
//!
//! CLI and HTTP front ends of the neuroproof merge engine.

pub mod api;
pub mod cli;
pub mod config;
