//! Prompt builder for rendering templates.

use crate::types::{BuiltPrompt, PromptDefinition};
use handlebars::Handlebars;
use ragchat_core::{AppError, AppResult};
use std::collections::HashMap;

/// Build a prompt from a definition and input variables.
///
/// Every name in `definition.variables` must be present in `variables`
/// (an empty value is fine). Both the system and the user template are
/// rendered with the same variables.
///
/// # Example
/// ```no_run
/// use ragchat_prompt::{build_prompt, PromptRegistry};
/// use std::collections::HashMap;
///
/// # fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let registry = PromptRegistry::builtin()?;
/// let mut vars = HashMap::new();
/// vars.insert("question".to_string(), "What is Rust?".to_string());
///
/// let built = build_prompt(registry.get("language_detection")?, &vars)?;
/// println!("User prompt: {}", built.user);
/// # Ok(())
/// # }
/// ```
pub fn build_prompt(
    definition: &PromptDefinition,
    variables: &HashMap<String, String>,
) -> AppResult<BuiltPrompt> {
    tracing::trace!("Building prompt: {}", definition.id);

    if let Some(missing) = definition
        .variables
        .iter()
        .find(|name| !variables.contains_key(*name))
    {
        return Err(AppError::Prompt(format!(
            "Prompt {} is missing variable '{}'",
            definition.id, missing
        )));
    }

    let system = definition
        .system
        .as_deref()
        .map(|template| render_template(template, variables))
        .transpose()?;
    let user = render_template(&definition.template, variables)?;

    Ok(BuiltPrompt::new(
        system,
        user,
        definition.id.clone(),
        variables.clone(),
    ))
}

/// Render a Handlebars template with variables.
pub(crate) fn render_template(
    template: &str,
    variables: &HashMap<String, String>,
) -> AppResult<String> {
    let mut handlebars = Handlebars::new();

    // Plain text, not HTML
    handlebars.register_escape_fn(handlebars::no_escape);

    handlebars
        .register_template_string("prompt", template)
        .map_err(|e| AppError::Prompt(format!("Failed to register template: {}", e)))?;

    handlebars
        .render("prompt", variables)
        .map_err(|e| AppError::Prompt(format!("Failed to render template: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::PromptOutputSpec;

    fn create_test_definition() -> PromptDefinition {
        PromptDefinition {
            id: "test.prompt".to_string(),
            title: "Test".to_string(),
            api_version: "1.0".to_string(),
            created_by: "test".to_string(),
            variables: vec!["question".to_string()],
            system: Some("Answer in {{language}}.".to_string()),
            template: "Question: {{question}}{{#if hint}} ({{hint}}){{/if}}".to_string(),
            output: PromptOutputSpec {
                format: "text".to_string(),
            },
        }
    }

    #[test]
    fn test_render_does_not_escape() {
        let mut vars = HashMap::new();
        vars.insert("question".to_string(), "Is 1 < 2 & \"true\"?".to_string());

        let rendered = render_template("Question: {{question}}", &vars).unwrap();
        assert_eq!(rendered, "Question: Is 1 < 2 & \"true\"?");
    }

    #[test]
    fn test_build_prompt_renders_system_and_user() {
        let mut vars = HashMap::new();
        vars.insert("question".to_string(), "Wer?".to_string());
        vars.insert("language".to_string(), "de".to_string());

        let built = build_prompt(&create_test_definition(), &vars).unwrap();
        assert_eq!(built.system.as_deref(), Some("Answer in de."));
        assert_eq!(built.user, "Question: Wer?");
        assert_eq!(built.metadata.source_prompt_id, "test.prompt");
    }

    #[test]
    fn test_optional_block() {
        let mut vars = HashMap::new();
        vars.insert("question".to_string(), "Q".to_string());
        vars.insert("hint".to_string(), "try again".to_string());

        let built = build_prompt(&create_test_definition(), &vars).unwrap();
        assert_eq!(built.user, "Question: Q (try again)");
    }

    #[test]
    fn test_missing_required_variable() {
        let vars = HashMap::new();
        let result = build_prompt(&create_test_definition(), &vars);
        assert!(matches!(result, Err(AppError::Prompt(_))));
    }
}
