//! Request-scoped staging directory holding the submitted script.

use std::fs;
use std::path::{Path, PathBuf};

use tempfile::TempDir;
use tracing::{debug, warn};

use super::error::SandboxError;

/// A uniquely named directory containing exactly one script file.
///
/// The whole tree is removed when the value is dropped.
#[derive(Debug)]
pub(crate) struct Workspace {
    dir: Option<TempDir>,
    script_name: String,
}

impl Workspace {
    /// Stages `code` verbatim in a fresh directory.
    ///
    /// The directory is created under `root` when given, otherwise under the
    /// system temp dir. The script name embeds a random v4 UUID.
    pub fn provision(
        root: Option<&Path>,
        prefix: &str,
        extension: &str,
        code: &str,
    ) -> Result<Self, SandboxError> {
        let mut builder = tempfile::Builder::new();
        builder.prefix("coderun-");
        let dir = match root {
            Some(root) => builder.tempdir_in(root),
            None => builder.tempdir(),
        }
        .map_err(|e| SandboxError::workspace(format!("cannot create directory: {e}")))?;

        let script_name = format!("{prefix}{}.{extension}", uuid::Uuid::new_v4().simple());
        let script_path = dir.path().join(&script_name);
        fs::write(&script_path, code).map_err(|e| {
            SandboxError::workspace(format!("cannot write {}: {e}", script_path.display()))
        })?;

        debug!(
            "Staged {} bytes in {}",
            code.len(),
            script_path.display()
        );

        Ok(Self {
            dir: Some(dir),
            script_name,
        })
    }

    /// Host path of the staging directory.
    pub fn path(&self) -> &Path {
        self.dir.as_ref().map_or(Path::new(""), TempDir::path)
    }

    /// File name of the staged script, relative to the directory.
    pub fn script_name(&self) -> &str {
        &self.script_name
    }

    /// Host path of the staged script.
    #[cfg(test)]
    pub fn script_path(&self) -> PathBuf {
        self.path().join(&self.script_name)
    }
}

impl Drop for Workspace {
    fn drop(&mut self) {
        let Some(dir) = self.dir.take() else {
            return;
        };
        let path = dir.path().to_path_buf();
        // Files written by the sandboxed program may not be removable by us.
        if let Err(e) = dir.close() {
            warn!("Failed to remove workspace {}: {}", path.display(), e);
        } else {
            debug!("Removed workspace {}", path.display());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_script_content_is_verbatim() {
        let root = tempdir().unwrap();
        let code = "print(input())\r\n# ünïcödé\n\n";
        let ws = Workspace::provision(Some(root.path()), "user_script_", "py", code).unwrap();

        assert_eq!(fs::read_to_string(ws.script_path()).unwrap(), code);
        assert!(ws.script_name().starts_with("user_script_"));
        assert!(ws.script_name().ends_with(".py"));
    }

    #[test]
    fn test_directory_holds_one_file() {
        let root = tempdir().unwrap();
        let ws = Workspace::provision(Some(root.path()), "s_", "py", "").unwrap();
        let entries: Vec<_> = fs::read_dir(ws.path()).unwrap().collect();
        assert_eq!(entries.len(), 1);
    }

    #[test]
    fn test_names_do_not_collide() {
        let root = tempdir().unwrap();
        let a = Workspace::provision(Some(root.path()), "s_", "py", "a").unwrap();
        let b = Workspace::provision(Some(root.path()), "s_", "py", "b").unwrap();
        assert_ne!(a.path(), b.path());
        assert_ne!(a.script_name(), b.script_name());
    }

    #[test]
    fn test_drop_removes_tree() {
        let root = tempdir().unwrap();
        let ws = Workspace::provision(Some(root.path()), "s_", "py", "x = 1").unwrap();
        let path = ws.path().to_path_buf();
        fs::write(path.join("extra.txt"), "written by the program").unwrap();
        assert!(path.exists());

        drop(ws);
        assert!(!path.exists());
    }

    #[test]
    fn test_missing_root_is_workspace_error() {
        let root = tempdir().unwrap();
        let missing = root.path().join("does-not-exist");
        let err = Workspace::provision(Some(&missing), "s_", "py", "").unwrap_err();
        assert!(err.is_setup());
        assert!(err.to_string().starts_with("Failed to prepare workspace"));
    }
}
