//! Public facade crate for `deepsearch`.
//!
//! This crate intentionally contains no IO or provider-specific logic.
//! It re-exports the backend-agnostic types/traits from `deepsearch-core`.

pub use deepsearch_core::*;
