//! Leadforge Shared Types and Utilities
//!
//! This crate contains types, errors, and the durable key-value store shared
//! across the Leadforge entitlement core.

pub mod error;
pub mod kv;
pub mod types;

pub use error::*;
pub use kv::{JsonFileStore, KeyValueStore, MemoryStore};
pub use types::*;
