//! Dispatch handlers that carry out remediation side effects.

use std::collections::HashMap;
use std::fs;
use std::io::Write;
use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use tempfile::NamedTempFile;

use crate::domain::{RemediationAction, RemediationKind};
use crate::error::RemediationError;

/// Applies one kind of remediation action.
///
/// Must be safe to call again with the same action if a caller retries.
#[async_trait]
pub trait RemediationHandler: Send + Sync {
    fn kind(&self) -> RemediationKind;

    async fn apply(&self, action: &RemediationAction) -> Result<(), RemediationError>;
}

/// Handlers keyed by the action kind they serve.
#[derive(Clone, Default)]
pub struct HandlerSet {
    handlers: HashMap<RemediationKind, Arc<dyn RemediationHandler>>,
}

impl HandlerSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, handler: Arc<dyn RemediationHandler>) {
        self.handlers.insert(handler.kind(), handler);
    }

    pub fn with(mut self, handler: Arc<dyn RemediationHandler>) -> Self {
        self.register(handler);
        self
    }

    pub fn get(&self, kind: RemediationKind) -> Option<Arc<dyn RemediationHandler>> {
        self.handlers.get(&kind).cloned()
    }
}

impl std::fmt::Debug for HandlerSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HandlerSet")
            .field("kinds", &self.handlers.keys().collect::<Vec<_>>())
            .finish()
    }
}

#[derive(Debug, Deserialize)]
struct Replacement {
    find: String,
    replace: String,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum FileChanges {
    Content { content: String },
    Replacements { replacements: Vec<Replacement> },
}

/// Built-in handler for `file_modification` actions.
///
/// `changes` is either `{"content": "..."}` to rewrite the file, or
/// `{"replacements": [{"find": "...", "replace": "..."}]}` for in-place edits.
#[derive(Debug, Default, Clone)]
pub struct FileModificationHandler;

impl FileModificationHandler {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl RemediationHandler for FileModificationHandler {
    fn kind(&self) -> RemediationKind {
        RemediationKind::FileModification
    }

    async fn apply(&self, action: &RemediationAction) -> Result<(), RemediationError> {
        let changes: FileChanges =
            serde_json::from_value(action.changes.clone()).map_err(|e| {
                RemediationError::MalformedChanges {
                    action_id: action.id.clone(),
                    reason: e.to_string(),
                }
            })?;

        let path = &action.target_path;
        let updated = match changes {
            FileChanges::Content { content } => content,
            FileChanges::Replacements { replacements } => {
                let mut text = fs::read_to_string(path)?;
                for r in replacements {
                    if r.find.is_empty() {
                        return Err(RemediationError::MalformedChanges {
                            action_id: action.id.clone(),
                            reason: "replacement 'find' must not be empty".into(),
                        });
                    }
                    text = text.replace(&r.find, &r.replace);
                }
                text
            }
        };

        write_atomic(path, updated.as_bytes())?;
        tracing::debug!(action_id = %action.id, path = %path.display(), "file modification applied");
        Ok(())
    }
}

/// Write through a temp file in the target directory, then rename over the target.
pub(crate) fn write_atomic(path: &Path, data: &[u8]) -> std::io::Result<()> {
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => std::env::current_dir()?,
    };
    fs::create_dir_all(&dir)?;
    let mut tmp = NamedTempFile::new_in(&dir)?;
    tmp.write_all(data)?;
    tmp.persist(path).map_err(|e| e.error)?;
    Ok(())
}
