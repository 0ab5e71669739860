//! Utility modules for the CLI

pub mod session;
