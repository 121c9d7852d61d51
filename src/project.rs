//! Project directory discovery and `.ralph/` filesystem layout.
//!
//! A Ralph project is any directory containing a `.ralph/` subdirectory.
//! This module walks up from a starting directory to find one, and exposes
//! the paths of the documents the loop engine reads and writes, per the
//! filesystem layout in the spec's external-interfaces section.

use anyhow::{bail, Result};
use std::env;
use std::path::{Path, PathBuf};

/// Paths into a discovered project's `.ralph/` directory.
#[derive(Debug, Clone)]
pub struct ProjectLayout {
    pub root: PathBuf,
}

impl ProjectLayout {
    pub fn new(root: PathBuf) -> Self {
        Self { root }
    }

    pub fn ralph_dir(&self) -> PathBuf {
        self.root.join(".ralph")
    }

    pub fn config_path(&self) -> PathBuf {
        self.ralph_dir().join("config.yaml")
    }

    pub fn tasks_path(&self) -> PathBuf {
        self.ralph_dir().join("tasks.json")
    }

    pub fn sessions_dir(&self) -> PathBuf {
        self.ralph_dir().join("sessions")
    }

    pub fn session_path(&self, session_id: &str) -> PathBuf {
        self.sessions_dir().join(format!("{session_id}.json"))
    }

    pub fn logs_dir(&self) -> PathBuf {
        self.ralph_dir().join("logs")
    }

    /// Path to the control file a detached `ralph pause|resume|skip|abort`
    /// invocation writes a command line into, for [`crate::control::watch_control_file`]
    /// to pick up.
    pub fn control_path(&self) -> PathBuf {
        self.ralph_dir().join("control")
    }

    pub fn project_analysis_path(&self) -> PathBuf {
        self.ralph_dir().join("project_analysis.json")
    }

    /// Ensure the `.ralph/` directory and its subdirectories exist.
    pub fn ensure_dirs(&self) -> Result<()> {
        std::fs::create_dir_all(self.ralph_dir())?;
        std::fs::create_dir_all(self.sessions_dir())?;
        std::fs::create_dir_all(self.logs_dir())?;
        Ok(())
    }

    /// Load the caller-written `project_analysis.json` cache, if present.
    /// A missing file yields a default (non-greenfield-assuming) analysis
    /// rather than an error, since the analyzer that writes it is an
    /// external collaborator out of this crate's scope (spec §1).
    pub fn load_analysis(&self) -> Result<crate::verification::ProjectAnalysis> {
        let path = self.project_analysis_path();
        if !path.exists() {
            return Ok(crate::verification::ProjectAnalysis::default());
        }
        let content = std::fs::read_to_string(&path)?;
        Ok(serde_json::from_str(&content)?)
    }
}

/// Discover the project root by walking up from the current directory.
pub fn discover() -> Result<ProjectLayout> {
    let cwd = env::current_dir()?;
    discover_from(&cwd)
}

/// Discover the project root starting from a specific directory, walking up
/// parent directories until a `.ralph/` directory is found.
pub fn discover_from(start: &Path) -> Result<ProjectLayout> {
    let mut current = start;

    loop {
        if current.join(".ralph").is_dir() {
            return Ok(ProjectLayout::new(current.to_path_buf()));
        }

        match current.parent() {
            Some(parent) => current = parent,
            None => bail!(
                "no .ralph directory found above {}; run `ralph init` to create one",
                start.display()
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn discovers_ralph_dir_in_cwd() {
        let tmp = TempDir::new().unwrap();
        std::fs::create_dir(tmp.path().join(".ralph")).unwrap();

        let layout = discover_from(tmp.path()).unwrap();
        assert_eq!(layout.root, tmp.path());
    }

    #[test]
    fn discovers_ralph_dir_from_subdirectory() {
        let tmp = TempDir::new().unwrap();
        std::fs::create_dir(tmp.path().join(".ralph")).unwrap();
        let sub = tmp.path().join("src").join("nested");
        std::fs::create_dir_all(&sub).unwrap();

        let layout = discover_from(&sub).unwrap();
        assert_eq!(layout.root, tmp.path());
    }

    #[test]
    fn errors_when_no_ralph_dir_found() {
        let tmp = TempDir::new().unwrap();
        let result = discover_from(tmp.path());
        assert!(result.is_err());
    }

    #[test]
    fn layout_paths_are_rooted_under_ralph_dir() {
        let layout = ProjectLayout::new(PathBuf::from("/proj"));
        assert_eq!(layout.tasks_path(), PathBuf::from("/proj/.ralph/tasks.json"));
        assert_eq!(
            layout.session_path("abc"),
            PathBuf::from("/proj/.ralph/sessions/abc.json")
        );
        assert_eq!(
            layout.config_path(),
            PathBuf::from("/proj/.ralph/config.yaml")
        );
        assert_eq!(layout.control_path(), PathBuf::from("/proj/.ralph/control"));
    }

    #[test]
    fn load_analysis_missing_file_yields_default() {
        let tmp = TempDir::new().unwrap();
        let layout = ProjectLayout::new(tmp.path().to_path_buf());
        let analysis = layout.load_analysis().unwrap();
        assert!(!analysis.greenfield);
    }

    #[test]
    fn load_analysis_reads_cached_json() {
        let tmp = TempDir::new().unwrap();
        let layout = ProjectLayout::new(tmp.path().to_path_buf());
        layout.ensure_dirs().unwrap();
        std::fs::write(
            layout.project_analysis_path(),
            r#"{"greenfield": true, "tests_ready": false, "has_test_files": false}"#,
        )
        .unwrap();

        let analysis = layout.load_analysis().unwrap();
        assert!(analysis.greenfield);
    }
}
