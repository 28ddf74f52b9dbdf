//! Prompt system for ragchat.
//!
//! This crate provides structured prompt management with:
//! - YAML-based prompt definitions
//! - Handlebars template rendering for system and user messages
//! - A built-in registry for the chat graph's model calls
//! - Per-workspace overrides from `.ragchat/prompts/<id>.yml`

pub mod builder;
pub mod loader;
pub mod registry;
pub mod types;

// Re-export main types
pub use builder::build_prompt;
pub use loader::{list_prompts, load_prompt};
pub use registry::PromptRegistry;
pub use types::{BuiltPrompt, BuiltPromptMetadata, PromptDefinition, PromptOutputSpec};
