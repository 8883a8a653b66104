// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! Prompt text used by the pipeline

use std::collections::BTreeMap;

use super::request::ChatMode;

/// Body of the synthetic user message that resumes a truncated reply
pub const CONTINUE_PROMPT: &str = "Continue your prior response. IMPORTANT: Immediately begin from where you left off without any interruptions. Do not repeat any content, including artifact and action tags.";

/// Virtual project root shared with the client
pub const PROJECT_ROOT: &str = "/home/project/";

const BUILD_PROMPT: &str = "You are an expert software engineer working inside a browser-based \
development environment. Produce complete, working code for the user's project. When you \
create or change files, write out their full contents.";

const DISCUSS_PROMPT: &str = "You are an expert software engineer acting as a technical \
advisor. Discuss the user's project, explain trade-offs and suggest approaches. Do not write \
out file contents or action tags; describe changes in prose instead.";

/// System prompt for the streaming calls
pub fn system_prompt(
    mode: ChatMode,
    files: &BTreeMap<String, String>,
    design_scheme: Option<&serde_json::Value>,
) -> String {
    let mut prompt = String::from(match mode {
        ChatMode::Build => BUILD_PROMPT,
        ChatMode::Discuss => DISCUSS_PROMPT,
    });

    if let Some(scheme) = design_scheme.filter(|s| !s.is_null()) {
        prompt.push_str("\n\n<design_scheme>\n");
        prompt.push_str(&scheme.to_string());
        prompt.push_str("\n</design_scheme>");
    }

    if !files.is_empty() {
        prompt.push_str("\n\nBelow are the files of the project that are relevant to this request.\n");
        for (path, content) in files {
            prompt.push_str(&format!(
                "\n<file path=\"{}\">\n{}\n</file>\n",
                relative_path(path),
                content
            ));
        }
    }

    prompt
}

/// System prompt for the conversation summary call
pub const SUMMARY_SYSTEM_PROMPT: &str = "You are a software engineer. Summarize the conversation \
so far for a colleague who will continue the work. Keep the user's goals, the decisions made, \
the current state of the project and any open questions. Be concise and do not invent details.";

/// System prompt for the file selection call
pub const CONTEXT_SYSTEM_PROMPT: &str = "You are a software engineer choosing which project files \
are needed to answer the user's next request. Reply only with one \
<includeFile path=\"...\"/> tag per file, using paths exactly as listed.";

/// User message for the file selection call
pub fn context_selection_prompt(summary: &str, last_user_message: &str, paths: &[&str]) -> String {
    let listing: Vec<String> = paths.iter().map(|p| format!("- {}", relative_path(p))).collect();
    format!(
        "<summary>\n{}\n</summary>\n\n<request>\n{}\n</request>\n\n<files>\n{}\n</files>",
        summary,
        last_user_message,
        listing.join("\n")
    )
}

/// Strip the virtual project root from a path
pub fn relative_path(path: &str) -> &str {
    path.strip_prefix(PROJECT_ROOT).unwrap_or(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_modes_differ() {
        let files = BTreeMap::new();
        let build = system_prompt(ChatMode::Build, &files, None);
        let discuss = system_prompt(ChatMode::Discuss, &files, None);
        assert_ne!(build, discuss);
        assert!(!build.contains("<file"));
    }

    #[test]
    fn test_files_rendered_relative() {
        let mut files = BTreeMap::new();
        files.insert("/home/project/src/app.ts".to_string(), "let x = 1;".to_string());
        let prompt = system_prompt(ChatMode::Build, &files, None);
        assert!(prompt.contains("<file path=\"src/app.ts\">\nlet x = 1;\n</file>"));
    }

    #[test]
    fn test_design_scheme_included() {
        let scheme = serde_json::json!({"palette": {"primary": "#000"}});
        let prompt = system_prompt(ChatMode::Build, &BTreeMap::new(), Some(&scheme));
        assert!(prompt.contains("<design_scheme>"));
        assert!(prompt.contains("#000"));
    }

    #[test]
    fn test_relative_path() {
        assert_eq!(relative_path("/home/project/a/b.rs"), "a/b.rs");
        assert_eq!(relative_path("/etc/hosts"), "/etc/hosts");
    }

    #[test]
    fn test_context_selection_prompt_lists_paths() {
        let prompt = context_selection_prompt("sum", "add login", &["/home/project/a.ts", "b.ts"]);
        assert!(prompt.contains("- a.ts\n- b.ts"));
        assert!(prompt.contains("add login"));
    }
}
