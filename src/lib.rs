// ABOUTME: Library root for skyplan - exposes public types for testing.
// ABOUTME: The main binary is in main.rs.

pub mod analyzer;
pub mod backend;
pub mod config;
pub mod deploy;
pub mod diagnostics;
pub mod error;
pub mod output;
pub mod remediation;
pub mod resource;
pub mod store;
pub mod types;
