//! Per-user session context.
//!
//! Holds the single active workspace and the last submitted source. Passed
//! explicitly by `&mut` to every operation that needs it.

use crate::workspace::Workspace;
use chrono::{DateTime, Utc};
use uuid::Uuid;

#[derive(Debug)]
pub struct Session {
    id: Uuid,
    started_at: DateTime<Utc>,
    pub(crate) workspace: Option<Workspace>,
    previous_source: String,
    previous_language: Option<String>,
}

impl Session {
    pub fn new() -> Self {
        Self {
            id: Uuid::new_v4(),
            started_at: Utc::now(),
            workspace: None,
            previous_source: String::new(),
            previous_language: None,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    pub fn workspace(&self) -> Option<&Workspace> {
        self.workspace.as_ref()
    }

    /// Source of the most recent execution request, for refilling the editor.
    pub fn previous_source(&self) -> &str {
        &self.previous_source
    }

    pub fn previous_language(&self) -> Option<&str> {
        self.previous_language.as_deref()
    }

    /// Detach the workspace so it outlives the session.
    pub fn take_workspace(&mut self) -> Option<Workspace> {
        self.workspace.take()
    }

    pub(crate) fn remember(&mut self, language: &str, source: &str) {
        self.previous_language = Some(language.to_string());
        self.previous_source = source.to_string();
    }
}

impl Default for Session {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        if let Some(workspace) = self.workspace.take() {
            log::debug!("Session {} ended, removing its workspace", self.id);
            workspace.destroy();
        }
    }
}
