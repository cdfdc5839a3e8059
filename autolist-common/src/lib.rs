//! # Autolist Common Library
//!
//! Shared code for the autolist workspace:
//! - Error type shared by stores and the engine
//! - Configuration loading (TOML bootstrap, root folder resolution)
//! - Durable key-value store contract and its backends
//! - Event types and the broadcast EventBus

pub mod config;
pub mod error;
pub mod events;
pub mod kv;

pub use error::{Error, Result, ValidationError, ValidationIssue};
