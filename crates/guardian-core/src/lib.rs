//! Core install evaluation and alerting engine for guardiand
//!
//! This crate is the heart of guardiand, containing:
//! - Install evaluation (block/allow, which alert to raise)
//! - The `Guardian` engine: ownership checks, installs, alerts, policies,
//!   screen time
//! - Seeding a store from configuration

mod engine;
mod evaluator;
mod events;
mod seed;

pub use engine::*;
pub use evaluator::*;
pub use events::*;
pub use seed::*;
