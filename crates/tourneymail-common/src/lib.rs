//! TourneyMail Common - Shared types and configuration
//!
//! This crate provides configuration, the error type, and the small
//! value types shared across all TourneyMail components.

pub mod config;
pub mod error;
pub mod types;

pub use config::Config;
pub use error::{Error, Result};
