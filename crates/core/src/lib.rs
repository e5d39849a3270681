//! # ssq-core
//!
//! Shared types and utilities for the ssq walk-forward engine.
//!
//! This crate provides the foundational building blocks used across all other
//! crates in the workspace: validated draw records, the ordered draw history,
//! layered configuration, and the logging setup.

pub mod config;
pub mod logging;
pub mod types;
