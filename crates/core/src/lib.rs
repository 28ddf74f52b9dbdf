//! Ragchat Core Library
//!
//! This crate provides the foundational utilities shared by every ragchat crate:
//! - Error handling (`AppError`, `AppResult`)
//! - Bounded remote calls (timeout plus one retry)
//! - Logging infrastructure
//! - Configuration management (`AppConfig` and the typed settings sections)

pub mod call;
pub mod config;
pub mod error;
pub mod logging;
pub mod settings;

// Re-export commonly used types
pub use call::{bounded_call, CallPolicy};
pub use config::AppConfig;
pub use error::{AppError, AppResult};
