//! Prompt loader for YAML prompt definitions.

use crate::types::PromptDefinition;
use blogsearch_core::{AppError, AppResult};
use std::path::{Path, PathBuf};

/// Identifier of the built-in grounded-answer prompt.
pub const DEFAULT_PROMPT_ID: &str = "blog.answer.vi";

/// Fixed reply for questions the context cannot answer.
pub const DEFAULT_FALLBACK: &str = "Mình chưa thấy thông tin trong dữ liệu.";

const DEFAULT_SYSTEM: &str = "Bạn là trợ lý chỉ được phép trả lời dựa trên CONTEXT sau.
- Nếu câu trả lời có trong CONTEXT, hãy trích nguyên văn hoặc diễn giải ngắn gọn.
- Nếu không có, hãy trả lời đúng câu: \"{{fallback}}\"
- Trả lời bằng tiếng Việt.
CONTEXT:
{{context}}";

const DEFAULT_TEMPLATE: &str = "Câu hỏi: {{query}}
Trả lời:";

/// The built-in Vietnamese grounded-answer prompt.
pub fn default_definition() -> PromptDefinition {
    PromptDefinition {
        id: DEFAULT_PROMPT_ID.to_string(),
        title: "Grounded blog answer (Vietnamese)".to_string(),
        api_version: "1.0".to_string(),
        fallback: DEFAULT_FALLBACK.to_string(),
        system: DEFAULT_SYSTEM.to_string(),
        template: DEFAULT_TEMPLATE.to_string(),
        chunk_label: "Nội dung bài viết {{ordinal}}: {{content}}".to_string(),
        chunk_separator: "\n".to_string(),
    }
}

fn prompts_dir(workspace_path: &Path) -> PathBuf {
    workspace_path.join(".blogsearch/prompts")
}

/// Load a prompt definition by ID from the workspace.
///
/// This function reads `<id>.yml` from `.blogsearch/prompts/`.
///
/// # Example
/// ```no_run
/// use blogsearch_prompt::load_prompt;
/// use std::path::Path;
///
/// # fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let prompt = load_prompt(Path::new("."), "blog.answer.en")?;
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

    let definition: PromptDefinition = serde_yaml::from_str(&contents).map_err(|e| {
        AppError::Prompt(format!(
            "Failed to parse prompt YAML {:?}: {}",
            prompt_file, e
        ))
    })?;

    validate_prompt(&definition)?;

    tracing::info!("Loaded prompt: {} ({})", definition.id, definition.title);

    Ok(definition)
}

/// Resolve a prompt: a workspace file wins, the built-in default is the fallback.
pub fn resolve_prompt(workspace_path: &Path, prompt_id: &str) -> AppResult<PromptDefinition> {
    let prompt_file = prompts_dir(workspace_path).join(format!("{}.yml", prompt_id));
    if prompt_file.exists() {
        return load_prompt(workspace_path, prompt_id);
    }

    if prompt_id == DEFAULT_PROMPT_ID {
        tracing::debug!("Using built-in prompt '{}'", DEFAULT_PROMPT_ID);
        return Ok(default_definition());
    }

    let available = list_prompts(workspace_path)?;
    Err(AppError::Prompt(format!(
        "Prompt '{}' not found in {:?} (available: {})",
        prompt_id,
        prompts_dir(workspace_path),
        if available.is_empty() {
            "none".to_string()
        } else {
            available.join(", ")
        }
    )))
}

/// List all prompt IDs available in the workspace.
pub fn list_prompts(workspace_path: &Path) -> AppResult<Vec<String>> {
    let dir = prompts_dir(workspace_path);

    if !dir.exists() {
        return Ok(Vec::new());
    }

    let mut prompt_ids = Vec::new();

    for entry in walkdir::WalkDir::new(&dir)
        .max_depth(1)
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

    prompt_ids.sort();
    Ok(prompt_ids)
}

/// Validate a prompt definition.
pub(crate) fn validate_prompt(def: &PromptDefinition) -> AppResult<()> {
    if def.id.is_empty() {
        return Err(AppError::Prompt("Prompt ID cannot be empty".to_string()));
    }

    if def.title.is_empty() {
        return Err(AppError::Prompt("Prompt title cannot be empty".to_string()));
    }

    if !def.api_version.contains('.') {
        return Err(AppError::Prompt(format!(
            "Invalid apiVersion format: {}. Expected format: 'x.y'",
            def.api_version
        )));
    }

    if def.fallback.trim().is_empty() {
        return Err(AppError::Prompt(
            "Prompt fallback sentence cannot be empty".to_string(),
        ));
    }

    let combined = format!("{}{}", def.system, def.template);
    for variable in ["context", "query"] {
        if !references(&combined, variable) {
            return Err(AppError::Prompt(format!(
                "Prompt '{}' never references {{{{{}}}}}",
                def.id, variable
            )));
        }
    }

    if !references(&def.chunk_label, "content") {
        return Err(AppError::Prompt(format!(
            "Prompt '{}' chunkLabel must reference {{{{content}}}}",
            def.id
        )));
    }

    Ok(())
}

fn references(template: &str, variable: &str) -> bool {
    template.contains(&format!("{{{{{}}}}}", variable))
        || template.contains(&format!("{{{{ {} }}}}", variable))
}
