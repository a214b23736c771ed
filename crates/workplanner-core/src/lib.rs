//! # WorkPlanner Core
//!
//! Shared building blocks used by the engine and the gateway:
//! configuration, the error taxonomy, the caller identity with its
//! authorization predicates, and week-key arithmetic.

pub mod config;
pub mod error;
pub mod identity;
pub mod week;

pub use config::PlannerConfig;
pub use error::{FieldError, PlannerError, Result};
pub use identity::{Identity, Role};
pub use week::WeekKey;
