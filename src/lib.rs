//! Nyota decision engine library.
//!
//! Turns indicator snapshots into risk-gated order intents for
//! leveraged derivatives, on a fixed cycle and through a pluggable
//! exchange client.

pub mod config;
pub mod domain;
pub mod infrastructure;
