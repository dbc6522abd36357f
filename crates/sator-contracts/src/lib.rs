//! # sator-contracts
//!
//! Shared types and contracts for the SATOR operations backend.
//!
//! All crates in the workspace import from here. No business logic lives in
//! this crate, only data definitions, timestamp helpers and error types.

pub mod action;
pub mod audit;
pub mod error;
pub mod events;
pub mod telemetry;
pub mod time;
pub mod timeline;
pub mod verify;
