//! Built-in prompts for the chat graph, with workspace overrides.

use crate::builder::build_prompt;
use crate::loader::{list_prompts, load_prompt, parse_prompt};
use crate::types::{BuiltPrompt, PromptDefinition};
use ragchat_core::{AppError, AppResult};
use std::collections::HashMap;
use std::path::Path;

pub const LANGUAGE_DETECTION: &str = "language_detection";
pub const REPHRASING: &str = "rephrasing";
pub const HARMFULNESS: &str = "harmfulness";
pub const ANSWER_GENERATION: &str = "answer_generation";
pub const HELPFULNESS: &str = "helpfulness";

const BUILTIN: [(&str, &str); 5] = [
    (
        LANGUAGE_DETECTION,
        include_str!("../prompts/language_detection.yml"),
    ),
    (REPHRASING, include_str!("../prompts/rephrasing.yml")),
    (HARMFULNESS, include_str!("../prompts/harmfulness.yml")),
    (
        ANSWER_GENERATION,
        include_str!("../prompts/answer_generation.yml"),
    ),
    (HELPFULNESS, include_str!("../prompts/helpfulness.yml")),
];

/// Prompt definitions by id.
#[derive(Debug, Clone)]
pub struct PromptRegistry {
    prompts: HashMap<String, PromptDefinition>,
}

impl PromptRegistry {
    /// The prompts shipped with the crate.
    pub fn builtin() -> AppResult<Self> {
        let mut prompts = HashMap::new();
        for (id, contents) in BUILTIN {
            let definition = parse_prompt(contents, id)?;
            prompts.insert(id.to_string(), definition);
        }
        Ok(Self { prompts })
    }

    /// Built-in prompts, replaced by any `.ragchat/prompts/<id>.yml` in the workspace.
    pub fn for_workspace(workspace_path: &Path) -> AppResult<Self> {
        let mut registry = Self::builtin()?;
        for id in list_prompts(workspace_path)? {
            let definition = load_prompt(workspace_path, &id)?;
            registry.insert(definition);
        }
        Ok(registry)
    }

    pub fn insert(&mut self, definition: PromptDefinition) {
        self.prompts.insert(definition.id.clone(), definition);
    }

    pub fn get(&self, id: &str) -> AppResult<&PromptDefinition> {
        self.prompts
            .get(id)
            .ok_or_else(|| AppError::Prompt(format!("Unknown prompt: {}", id)))
    }

    /// Render prompt `id` with `variables`.
    pub fn render(&self, id: &str, variables: &HashMap<String, String>) -> AppResult<BuiltPrompt> {
        build_prompt(self.get(id)?, variables)
    }
}
