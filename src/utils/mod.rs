//! Utility modules for common functionality
//!
//! Provides resolver contexts over the process environment and property maps,
//! and subprocess probing.

pub mod env;
pub mod process;

pub use env::{EnvContext, PropertiesContext};
pub use process::ProcessProbe;
