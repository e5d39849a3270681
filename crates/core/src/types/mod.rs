//! Core data types.
//!
//! A [`Draw`] can only be built from valid values, and a [`DrawHistory`] can
//! only hold draws in strictly ascending issue order. Everything downstream
//! relies on both.

pub mod draw;
pub mod history;

// Re-export primary types for convenient access via `ssq_core::types::*`.
pub use draw::{DataError, Draw, DrawRecord, PRIMARY_DOMAIN, PRIMARY_PICK, SECONDARY_DOMAIN};
pub use history::DrawHistory;
