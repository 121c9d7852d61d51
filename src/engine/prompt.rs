//! Prompt Builder: compose base + platform + project + task sections,
//! `---`-separated, with variable substitution (spec §4.6 step 2).

use crate::task::Task;
use std::path::Path;

const BASE_PROMPT: &str = "You are operating as an autonomous coding agent. \
Complete the current task, then emit exactly one status marker on its own \
line: DONE when finished, NEXT if more turns are needed, FIXED if you \
corrected a prior failure, or ERROR: <reason> if you cannot proceed.";

const PLATFORM_SECTION: &str = "Work only within the given project directory. \
Do not modify files outside it.";

pub struct PromptBuilder {
    base: String,
    platform: String,
}

impl Default for PromptBuilder {
    fn default() -> Self {
        Self {
            base: BASE_PROMPT.to_string(),
            platform: PLATFORM_SECTION.to_string(),
        }
    }
}

impl PromptBuilder {
    pub fn new(base: impl Into<String>, platform: impl Into<String>) -> Self {
        Self {
            base: base.into(),
            platform: platform.into(),
        }
    }

    pub fn build(&self, project_dir: &Path, task: &Task) -> String {
        let project_section = format!("Project directory: {}", project_dir.display());
        let task_section = format!(
            "Task id: {}\nTitle: {}\n\n{}",
            task.id, task.title, task.body
        );

        [
            self.base.as_str(),
            self.platform.as_str(),
            project_section.as_str(),
            task_section.as_str(),
        ]
        .join("\n---\n")
    }
}
