//! Integration tests for the Leadforge billing crate
//!
//! Each scenario drives the public API end to end: a file-backed entitlement
//! store, the real card gateway, and a mocked backend for persistence and
//! invoice delivery.
//!
//! ## Running Tests
//! ```bash
//! cargo test -p leadforge-billing --test integration
//! ```

#![allow(clippy::unwrap_used)]

mod metering;
mod purchase_flow;
mod support;
