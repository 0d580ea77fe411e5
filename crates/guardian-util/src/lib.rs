//! Shared utilities for guardian
//!
//! This crate provides:
//! - ID types (ParentId, ChildId, AppId, AlertId, ClientId)
//! - Time utilities (mockable wall clock, HH:MM parsing, calendar days)
//! - Error types
//! - Rate limiting helpers
//! - Default paths for socket, data, and config files

mod error;
mod ids;
mod paths;
mod rate_limit;
mod time;

pub use error::*;
pub use ids::*;
pub use paths::*;
pub use rate_limit::*;
pub use time::*;
