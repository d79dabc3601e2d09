mod docker;
mod process;

#[cfg(test)]
pub mod fake;

use std::{path::PathBuf, sync::Arc};

use async_trait::async_trait;
use uuid::Uuid;

use crate::{
    config::{EngineConfig, SandboxLimits},
    language::LanguageProfile,
};

pub use docker::DockerSandbox;

#[derive(Debug, Clone)]
pub struct SandboxResult {
    pub stdout: String,
    pub stderr: String,
    pub exit_code: i32,
    pub duration_ms: u128,
    pub timed_out: bool,
    pub truncated: bool,
}

/// Everything a backend needs to run one request.
#[derive(Debug, Clone)]
pub struct RunSpec {
    pub id: Uuid,
    pub profile: LanguageProfile,
    pub workspace_dir: PathBuf,
    pub stdin: Option<String>,
    pub limits: SandboxLimits,
}

/// Runs a provisioned workspace inside an isolation boundary.
///
/// `Ok` means the program ran (whatever its exit status or whether it hit
/// the timeout); `Err` means the sandbox itself could not run it.
#[async_trait]
pub trait SandboxBackend: Send + Sync {
    fn name(&self) -> &'static str;
    async fn execute(&self, spec: RunSpec) -> anyhow::Result<SandboxResult>;
}

pub struct SandboxFactory;

impl SandboxFactory {
    pub fn from_config(config: &EngineConfig) -> Arc<dyn SandboxBackend> {
        Arc::new(DockerSandbox::new(config.container_runtime.clone()))
    }
}
