//! Configuration module for archive conversion
//!
//! This module provides the `ConvertConfig` struct and its builder, with
//! validation and the defaults the command line uses.

pub mod builder;
pub mod getters;
pub mod types;

pub use builder::ConvertConfigBuilder;
pub use types::ConvertConfig;
