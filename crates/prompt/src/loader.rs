//! Prompt loader for YAML prompt definitions.

use crate::types::PromptDefinition;
use ragchat_core::{AppError, AppResult};
use std::path::{Path, PathBuf};

/// Directory holding workspace prompt overrides.
pub fn prompts_dir(workspace_path: &Path) -> PathBuf {
    workspace_path.join(".ragchat/prompts")
}

/// Load a prompt definition by ID from `.ragchat/prompts/<id>.yml`.
///
/// # Example
/// ```no_run
/// use ragchat_prompt::load_prompt;
/// use std::path::Path;
///
/// # fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let prompt = load_prompt(Path::new("."), "answer_generation")?;
/// println!("Loaded prompt: {}", prompt.title);
/// # Ok(())
/// # }
/// ```
pub fn load_prompt(workspace_path: &Path, prompt_id: &str) -> AppResult<PromptDefinition> {
    let prompt_file = prompts_dir(workspace_path).join(format!("{}.yml", prompt_id));

    tracing::debug!("Loading prompt from: {:?}", prompt_file);

    if !prompt_file.exists() {
        return Err(AppError::Prompt(format!(
            "Prompt file not found: {:?}",
            prompt_file
        )));
    }

    let contents = std::fs::read_to_string(&prompt_file).map_err(|e| {
        AppError::Prompt(format!(
            "Failed to read prompt file {:?}: {}",
            prompt_file, e
        ))
    })?;

    let definition = parse_prompt(&contents, &prompt_file.display().to_string())?;

    if definition.id != prompt_id {
        return Err(AppError::Prompt(format!(
            "Prompt file {:?} declares id '{}', expected '{}'",
            prompt_file, definition.id, prompt_id
        )));
    }

    tracing::info!("Loaded prompt override: {} ({})", definition.id, definition.title);

    Ok(definition)
}

/// Parse and validate a prompt definition.
pub fn parse_prompt(contents: &str, origin: &str) -> AppResult<PromptDefinition> {
    let definition: PromptDefinition = serde_yaml::from_str(contents)
        .map_err(|e| AppError::Prompt(format!("Failed to parse prompt YAML {}: {}", origin, e)))?;

    validate_prompt(&definition)?;
    Ok(definition)
}

/// List all prompt IDs overridden in the workspace.
pub fn list_prompts(workspace_path: &Path) -> AppResult<Vec<String>> {
    let dir = prompts_dir(workspace_path);

    if !dir.exists() {
        return Ok(Vec::new());
    }

    let mut prompt_ids = Vec::new();

    for entry in walkdir::WalkDir::new(&dir)
        .max_depth(1)
        .sort_by_file_name()
        .into_iter()
        .filter_map(|e| e.ok())
    {
        let path = entry.path();
        if path.is_file() && path.extension().and_then(|s| s.to_str()) == Some("yml") {
            if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                prompt_ids.push(stem.to_string());
            }
        }
    }

    Ok(prompt_ids)
}

fn validate_prompt(def: &PromptDefinition) -> AppResult<()> {
    if def.id.is_empty() {
        return Err(AppError::Prompt("Prompt ID cannot be empty".to_string()));
    }

    if def.title.is_empty() {
        return Err(AppError::Prompt("Prompt title cannot be empty".to_string()));
    }

    if def.template.is_empty() {
        return Err(AppError::Prompt(
            "Prompt template cannot be empty".to_string(),
        ));
    }

    if !def.api_version.contains('.') {
        return Err(AppError::Prompt(format!(
            "Invalid apiVersion format: {}. Expected format: 'x.y'",
            def.api_version
        )));
    }

    if !matches!(def.output.format.as_str(), "text" | "json") {
        return Err(AppError::Prompt(format!(
            "Unsupported output format: {}",
            def.output.format
        )));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn create_test_prompt(dir: &Path, id: &str, valid: bool) -> PathBuf {
        let dir = prompts_dir(dir);
        fs::create_dir_all(&dir).unwrap();

        let content = if valid {
            format!(
                r#"
id: {}
title: "Test Prompt"
apiVersion: "1.0"
createdBy: test
variables: [question]
template: "Test template: {{{{question}}}}"
output:
  format: text
"#,
                id
            )
        } else {
            "invalid: yaml: content:".to_string()
        };

        let file_path = dir.join(format!("{}.yml", id));
        fs::write(&file_path, content).unwrap();
        file_path
    }

    #[test]
    fn test_load_valid_prompt() {
        let temp_dir = TempDir::new().unwrap();
        create_test_prompt(temp_dir.path(), "rephrasing", true);

        let prompt = load_prompt(temp_dir.path(), "rephrasing").unwrap();
        assert_eq!(prompt.id, "rephrasing");
        assert_eq!(prompt.template, "Test template: {{question}}");
    }

    #[test]
    fn test_load_nonexistent_prompt() {
        let temp_dir = TempDir::new().unwrap();
        assert!(load_prompt(temp_dir.path(), "nonexistent").is_err());
    }

    #[test]
    fn test_load_invalid_yaml() {
        let temp_dir = TempDir::new().unwrap();
        create_test_prompt(temp_dir.path(), "invalid", false);
        assert!(load_prompt(temp_dir.path(), "invalid").is_err());
    }

    #[test]
    fn test_id_must_match_file_name() {
        let temp_dir = TempDir::new().unwrap();
        let path = create_test_prompt(temp_dir.path(), "rephrasing", true);
        fs::rename(&path, path.with_file_name("helpfulness.yml")).unwrap();
        assert!(load_prompt(temp_dir.path(), "helpfulness").is_err());
    }

    #[test]
    fn test_unsupported_output_format() {
        let yaml = r#"
id: x
title: X
apiVersion: "1.0"
template: "t"
output:
  format: xml
"#;
        assert!(parse_prompt(yaml, "inline").is_err());
    }

    #[test]
    fn test_list_prompts() {
        let temp_dir = TempDir::new().unwrap();
        create_test_prompt(temp_dir.path(), "prompt2", true);
        create_test_prompt(temp_dir.path(), "prompt1", true);

        let prompts = list_prompts(temp_dir.path()).unwrap();
        assert_eq!(prompts, vec!["prompt1".to_string(), "prompt2".to_string()]);
    }
}
