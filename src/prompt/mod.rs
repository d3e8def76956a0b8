use crate::project::ExtensionFile;

/// Domain rules attached to every generate/refine call.
pub fn system_instruction(comment_language: &str) -> String {
    format!(
        r#"You are a friendly, expert Chrome extension developer.
IMPORTANT RULES:
1. NEVER declare an "icons" section in manifest.json.
2. NEVER declare "default_icon" inside the "action" section.
3. manifest.json MUST use Manifest V3 ("manifest_version": 3).
4. Code must be clean, with clear inline comments written in {comment_language}."#
    )
}

fn explanation_style() -> &'static str {
    r#"ANSWER STYLE:
- Explain like you are talking to a friend: plain words, concrete everyday examples.
- When the user asks about a specific website (e.g. labs.google, youtube), assume they want to know how to write code (a content script) that interacts with that site.
- When needed, use web search to find the current HTML/CSS structure (selectors, element IDs and classes) of that site so the guidance is precise.
- Always focus on: "how do I apply this to the current extension code"."#
}

pub fn system_prompt_generate(comment_language: &str) -> String {
    format!(
        "{}\nReturn the result as JSON following the provided schema.",
        system_instruction(comment_language)
    )
}

pub fn system_prompt_refine(comment_language: &str) -> String {
    format!(
        "{}\n{}\nUpdate the source code and return JSON containing the COMPLETE new file set together with an 'explanation' that describes every change in {comment_language}, in the simplest possible terms.",
        system_instruction(comment_language),
        explanation_style()
    )
}

pub fn system_prompt_converse() -> String {
    format!(
        "You are a friendly Chrome extension programming advisor.\n{}\nFocus on explaining logic or looking up a site's structure to help write code that works with that site.",
        explanation_style()
    )
}

pub fn user_prompt_generate(idea: &str) -> String {
    format!("New extension request: {}", idea.trim())
}

/// Every file is rendered in full behind a path header.
pub fn render_files(files: &[ExtensionFile]) -> String {
    files
        .iter()
        .map(|f| format!("--- FILE: {} ---\n{}", f.path, f.content))
        .collect::<Vec<_>>()
        .join("\n\n")
}

pub fn user_prompt_refine(files: &[ExtensionFile], instruction: &str) -> String {
    format!(
        "Here is the current source code:\n{}\n\nRequested change or new feature: {}",
        render_files(files),
        instruction.trim()
    )
}

/// Paths only; contents are not sent for chat.
pub fn user_prompt_converse(files: &[ExtensionFile], question: &str) -> String {
    let summary = files
        .iter()
        .map(|f| format!("File: {}", f.path))
        .collect::<Vec<_>>()
        .join(", ");
    format!(
        "The current project contains these files: {summary}. User question: {}",
        question.trim()
    )
}
