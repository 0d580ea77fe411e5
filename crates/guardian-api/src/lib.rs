//! Data model and protocol types for guardiand
//!
//! This crate defines the records shared by every layer and the stable API
//! between guardiand and dashboard clients:
//! - Records (apps, children, policies, installations, alerts, screen time)
//! - Commands (requests from clients) and responses
//! - Events (service -> clients)
//! - Versioning

mod commands;
mod events;
mod types;

pub use commands::*;
pub use events::*;
pub use types::*;

/// Current API version
pub const API_VERSION: u32 = 1;
