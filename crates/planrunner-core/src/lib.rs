//! Shared configuration and error types for the planrunner workspace.

pub mod config;
pub mod error;

pub use config::PlanrunnerConfig;
pub use error::{CoreError, Result};
