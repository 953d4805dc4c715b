//! Persistent settings for the target host.

pub mod config;
