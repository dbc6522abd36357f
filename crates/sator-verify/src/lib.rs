//! # sator-verify
//!
//! Integrity verification for SATOR audit chains.
//!
//! This crate provides [`engine::ChainVerifier`], which recomputes every
//! hash in a chain and checks its linkage:
//!
//! 1. **Full verification**: `verify_chain` / `verify_records` report the
//!    first failing event and exact pass/fail counts.
//! 2. **Quick verification**: `quick_verify` compares snapshot metadata
//!    only.
//! 3. **Range queries**: `verify_range` answers whether the trail between
//!    two event ids is intact.
//!
//! ## Quick start
//!
//! ```rust,ignore
//! use sator_verify::ChainVerifier;
//!
//! let result = ChainVerifier::new().verify_chain(&events, None);
//! println!("{}", result.summary_message());
//! ```

pub mod engine;

pub use engine::{verify_decision_receipt, ChainVerifier};
