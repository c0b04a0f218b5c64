//! Workspace path confinement for file actions.

use std::path::{Component, Path, PathBuf};

use stepwise_core::error::ActionError;

/// A directory that file actions may not leave.
#[derive(Debug, Clone)]
pub struct Workspace {
    root: PathBuf,
}

impl Workspace {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Resolve `path` (relative to the root, or absolute) to a location
    /// inside the workspace.
    ///
    /// `..` components are applied lexically, then symlinks in the longest
    /// existing ancestor are resolved, so neither can escape the root.
    pub fn resolve(&self, action_id: &str, path: &str) -> Result<PathBuf, ActionError> {
        let denied = |reason: String| ActionError::PermissionDenied {
            action_id: action_id.to_string(),
            reason,
        };

        if path.trim().is_empty() {
            return Err(ActionError::InvalidArguments("'path' must not be empty".into()));
        }

        let root = self.root.canonicalize().map_err(|e| ActionError::ExecutionFailed {
            action_id: action_id.to_string(),
            reason: format!("workspace root {} is unavailable: {e}", self.root.display()),
        })?;

        let requested = Path::new(path);
        let joined = if requested.is_absolute() {
            requested.to_path_buf()
        } else {
            root.join(requested)
        };

        let mut normalized = PathBuf::new();
        for component in joined.components() {
            match component {
                Component::CurDir => {}
                Component::ParentDir => {
                    if !normalized.pop() {
                        return Err(denied(format!("'{path}' escapes the workspace")));
                    }
                }
                other => normalized.push(other.as_os_str()),
            }
        }

        let mut existing = normalized.as_path();
        let mut missing = Vec::new();
        while !existing.exists() {
            match (existing.parent(), existing.file_name()) {
                (Some(parent), Some(name)) => {
                    missing.push(name.to_os_string());
                    existing = parent;
                }
                _ => break,
            }
        }
        let mut resolved = existing
            .canonicalize()
            .unwrap_or_else(|_| existing.to_path_buf());
        for name in missing.iter().rev() {
            resolved.push(name);
        }

        if !resolved.starts_with(&root) {
            return Err(denied(format!("'{path}' is outside the workspace")));
        }
        Ok(resolved)
    }

    /// `path` relative to the root, for display.
    pub fn display_path(&self, path: &Path) -> String {
        let root = self.root.canonicalize().unwrap_or_else(|_| self.root.clone());
        path.strip_prefix(&root)
            .unwrap_or(path)
            .display()
            .to_string()
    }
}
