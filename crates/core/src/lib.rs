//! Core types, errors, and configuration shared by the shardwell crates.

#![forbid(unsafe_code)]

pub mod config;
pub mod error;
pub mod result;

pub use config::ClusterConfig;
pub use error::Error;
pub use result::{OptionExt, Result, ResultExt};
