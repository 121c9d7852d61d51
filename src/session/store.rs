//! Atomic JSON persistence for a [`super::SessionContext`], one document
//! per session id under `.ralph/sessions/<id>.json`.

use anyhow::{Context, Result};
use std::path::PathBuf;

use super::SessionContext;
use crate::task::store::write_atomic;

pub struct SessionStore {
    sessions_dir: PathBuf,
}

impl SessionStore {
    pub fn new(sessions_dir: PathBuf) -> Self {
        Self { sessions_dir }
    }

    fn path_for(&self, session_id: &str) -> PathBuf {
        self.sessions_dir.join(format!("{session_id}.json"))
    }

    pub fn save(&self, ctx: &SessionContext) -> Result<()> {
        write_atomic(&self.path_for(&ctx.id), serde_json::to_string_pretty(ctx)?.as_bytes())
    }

    pub fn load(&self, session_id: &str) -> Result<SessionContext> {
        let path = self.path_for(session_id);
        let content = std::fs::read_to_string(&path)
            .with_context(|| format!("failed to read session file {}", path.display()))?;
        serde_json::from_str(&content)
            .with_context(|| format!("failed to parse session file {}", path.display()))
    }

    pub fn exists(&self, session_id: &str) -> bool {
        self.path_for(session_id).exists()
    }
}
