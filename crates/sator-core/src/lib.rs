//! # sator-core
//!
//! The seams and configuration shared by the SATOR audit and replay crates:
//!
//! - `ChainStore` and `AuditAnchor` traits (see [`traits`])
//! - `SatorConfig`, the TOML runtime configuration (see [`config`])

pub mod config;
pub mod traits;

pub use config::SatorConfig;
