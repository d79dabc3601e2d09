use std::{
    io,
    path::{Path, PathBuf},
};

use anyhow::Context;
use uuid::Uuid;

use crate::language::LanguageProfile;

/// File the program input is written to, next to the source file.
pub const INPUT_FILE_NAME: &str = "input.txt";

/// Creates and tears down per-request directories under a common root.
#[derive(Debug, Clone)]
pub struct WorkspaceManager {
    root: PathBuf,
}

/// A request-scoped directory holding the submitted source and input.
///
/// Owned by exactly one request. `dispose` removes it; if the owner is
/// dropped without disposing (panic, cancelled future) `Drop` removes it.
#[derive(Debug)]
pub struct Workspace {
    id: Uuid,
    dir: PathBuf,
    source_path: PathBuf,
    input_path: Option<PathBuf>,
    disposed: bool,
}

impl WorkspaceManager {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub async fn provision(
        &self,
        id: Uuid,
        profile: &LanguageProfile,
        code: &str,
        stdin: Option<&str>,
    ) -> anyhow::Result<Workspace> {
        tokio::fs::create_dir_all(&self.root)
            .await
            .with_context(|| format!("failed to create workspace root {}", self.root.display()))?;

        let dir = self.root.join(format!("exec-{}", id.as_simple()));
        // create_dir, not create_dir_all: an existing directory is a collision.
        tokio::fs::create_dir(&dir)
            .await
            .with_context(|| format!("failed to create workspace {}", dir.display()))?;

        let mut workspace = Workspace {
            id,
            source_path: profile.source_path(&dir),
            input_path: None,
            dir,
            disposed: false,
        };

        if let Err(err) = workspace.materialize(code, stdin).await {
            workspace.dispose().await;
            return Err(err);
        }

        tracing::debug!(
            execution_id = %id,
            source = %workspace.source_path().display(),
            has_input = workspace.input_path().is_some(),
            "workspace provisioned"
        );
        Ok(workspace)
    }
}

impl Workspace {
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn source_path(&self) -> &Path {
        &self.source_path
    }

    pub fn input_path(&self) -> Option<&Path> {
        self.input_path.as_deref()
    }

    async fn materialize(&mut self, code: &str, stdin: Option<&str>) -> anyhow::Result<()> {
        tokio::fs::write(&self.source_path, code.as_bytes())
            .await
            .with_context(|| format!("failed to write {}", self.source_path.display()))?;

        if let Some(input) = stdin {
            let input_path = self.dir.join(INPUT_FILE_NAME);
            tokio::fs::write(&input_path, input.as_bytes())
                .await
                .with_context(|| format!("failed to write {}", input_path.display()))?;
            self.input_path = Some(input_path);
        }
        Ok(())
    }

    /// Removes the directory and everything in it. Safe to call repeatedly.
    pub async fn dispose(&mut self) {
        if self.disposed {
            return;
        }
        self.disposed = true;
        match tokio::fs::remove_dir_all(&self.dir).await {
            Ok(()) => {}
            Err(err) if err.kind() == io::ErrorKind::NotFound => {}
            Err(err) => {
                tracing::error!(
                    execution_id = %self.id,
                    path = %self.dir.display(),
                    error = %err,
                    "failed to remove workspace"
                );
            }
        }
    }
}

impl Drop for Workspace {
    fn drop(&mut self) {
        if self.disposed {
            return;
        }
        tracing::warn!(
            execution_id = %self.id,
            "workspace dropped without dispose, removing synchronously"
        );
        let _ = std::fs::remove_dir_all(&self.dir);
    }
}
