use std::{
    path::PathBuf,
    sync::{Arc, Mutex},
    time::Duration,
};

use async_trait::async_trait;

use crate::sandbox::{RunSpec, SandboxBackend, SandboxResult};

type Script = dyn Fn(&RunSpec, &str) -> anyhow::Result<SandboxResult> + Send + Sync;

/// What the fake saw when a run started.
#[derive(Debug, Clone)]
pub struct ObservedRun {
    pub workspace_dir: PathBuf,
    pub source: Option<String>,
    pub input_file: Option<String>,
    pub stdin: Option<String>,
}

/// Backend that answers from a closure instead of starting a container.
/// The closure receives the spec and the source file contents.
#[derive(Clone)]
pub struct ScriptedSandbox {
    script: Arc<Script>,
    delay: Duration,
    observed: Arc<Mutex<Vec<ObservedRun>>>,
}

impl ScriptedSandbox {
    pub fn new<F>(script: F) -> Self
    where
        F: Fn(&RunSpec, &str) -> anyhow::Result<SandboxResult> + Send + Sync + 'static,
    {
        Self {
            script: Arc::new(script),
            delay: Duration::ZERO,
            observed: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Echoes the source back on stdout, like a program printing its own text.
    pub fn echo_source() -> Self {
        Self::new(|_, source| Ok(result(source, "", 0, false)))
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn observed(&self) -> Vec<ObservedRun> {
        self.observed.lock().unwrap().clone()
    }
}

pub fn result(stdout: &str, stderr: &str, exit_code: i32, timed_out: bool) -> SandboxResult {
    SandboxResult {
        stdout: stdout.to_string(),
        stderr: stderr.to_string(),
        exit_code,
        duration_ms: 1,
        timed_out,
        truncated: false,
    }
}

#[async_trait]
impl SandboxBackend for ScriptedSandbox {
    fn name(&self) -> &'static str {
        "scripted"
    }

    async fn execute(&self, spec: RunSpec) -> anyhow::Result<SandboxResult> {
        let source = std::fs::read_to_string(spec.profile.source_path(&spec.workspace_dir)).ok();
        let input_file =
            std::fs::read_to_string(spec.workspace_dir.join(crate::workspace::INPUT_FILE_NAME)).ok();
        self.observed.lock().unwrap().push(ObservedRun {
            workspace_dir: spec.workspace_dir.clone(),
            source: source.clone(),
            input_file,
            stdin: spec.stdin.clone(),
        });

        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        (self.script)(&spec, source.as_deref().unwrap_or_default())
    }
}
