use std::{ffi::OsString, process::Stdio, time::Duration};

use async_trait::async_trait;
use uuid::Uuid;

use crate::sandbox::{RunSpec, SandboxBackend, SandboxResult, process::run_supervised};

/// Where the workspace is mounted inside the container.
pub const CONTAINER_MOUNT: &str = "/code";

/// Creating a container may pull its image first.
const CREATE_TIMEOUT: Duration = Duration::from_secs(60);
const CREATE_OUTPUT_BYTES: usize = 64 * 1024;

const REMOVE_TIMEOUT: Duration = Duration::from_secs(10);

/// Runs each request in a throwaway container via the container CLI.
///
/// The container is created first and only then started attached. A failed
/// `create` is the runtime's own failure; once `start` runs, every exit code
/// belongs to the program, 125 included.
pub struct DockerSandbox {
    runtime: String,
}

impl DockerSandbox {
    pub fn new(runtime: impl Into<String>) -> Self {
        Self {
            runtime: runtime.into(),
        }
    }

    pub fn container_name(id: Uuid) -> String {
        format!("code-runner-{}", id.as_simple())
    }

    fn create_args(&self, spec: &RunSpec, name: &str) -> Vec<OsString> {
        let limits = &spec.limits;
        let mut mount = spec.workspace_dir.as_os_str().to_os_string();
        mount.push(":");
        mount.push(CONTAINER_MOUNT);

        let mut args: Vec<OsString> = [
            "create".to_string(),
            "-i".to_string(),
            "--rm".to_string(),
            "--name".to_string(),
            name.to_string(),
            "--memory".to_string(),
            format!("{}m", limits.memory_mb),
            "--memory-swap".to_string(),
            format!("{}m", limits.memory_swap_mb),
            "--cpus".to_string(),
            format!("{:.2}", limits.cpus),
            "--cpuset-cpus".to_string(),
            limits.cpuset_cpus.clone(),
            "--net".to_string(),
            "none".to_string(),
            "-v".to_string(),
        ]
        .into_iter()
        .map(OsString::from)
        .collect();
        args.push(mount);
        args.push(OsString::from(spec.profile.image));
        args
    }

    fn start_args(name: &str) -> [&str; 4] {
        ["start", "-a", "-i", name]
    }

    async fn create(&self, spec: &RunSpec, name: &str) -> anyhow::Result<()> {
        let mut cmd = std::process::Command::new(&self.runtime);
        cmd.args(self.create_args(spec, name));

        let created = run_supervised(cmd, None, CREATE_TIMEOUT, CREATE_OUTPUT_BYTES).await?;
        if created.timed_out {
            anyhow::bail!("container runtime timed out creating {}", spec.profile.image);
        }
        if created.exit_code != 0 {
            anyhow::bail!(
                "container runtime failed to start {}: {}",
                spec.profile.image,
                created.stderr.trim()
            );
        }
        Ok(())
    }
}

#[async_trait]
impl SandboxBackend for DockerSandbox {
    fn name(&self) -> &'static str {
        "docker"
    }

    async fn execute(&self, spec: RunSpec) -> anyhow::Result<SandboxResult> {
        let name = Self::container_name(spec.id);
        let guard = ContainerGuard::new(self.runtime.clone(), name.clone());

        if let Err(err) = self.create(&spec, &name).await {
            // A timed-out create may still have left the container behind.
            guard.remove().await;
            return Err(err);
        }

        let mut cmd = std::process::Command::new(&self.runtime);
        cmd.args(Self::start_args(&name));
        let result = run_supervised(
            cmd,
            spec.stdin.as_deref(),
            spec.limits.timeout(),
            spec.limits.max_output_bytes,
        )
        .await;

        match result {
            Ok(result) if !result.timed_out => {
                guard.disarm();
                Ok(result)
            }
            other => {
                // Killing the attached client leaves the container running.
                guard.remove().await;
                other
            }
        }
    }
}

/// Force-removes a container unless disarmed. Removal on drop covers the
/// request future being cancelled while the container is running.
struct ContainerGuard {
    runtime: String,
    name: String,
    armed: bool,
}

impl ContainerGuard {
    fn new(runtime: String, name: String) -> Self {
        Self {
            runtime,
            name,
            armed: true,
        }
    }

    async fn remove(mut self) {
        self.armed = false;
        force_remove(&self.runtime, &self.name).await;
    }

    fn disarm(mut self) {
        self.armed = false;
    }
}

impl Drop for ContainerGuard {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        let Ok(handle) = tokio::runtime::Handle::try_current() else {
            tracing::warn!(container = %self.name, "no runtime to remove container on drop");
            return;
        };
        let runtime = std::mem::take(&mut self.runtime);
        let name = std::mem::take(&mut self.name);
        handle.spawn(async move {
            force_remove(&runtime, &name).await;
        });
    }
}

async fn force_remove(runtime: &str, name: &str) {
    let mut cmd = tokio::process::Command::new(runtime);
    cmd.args(["rm", "--force", name])
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .kill_on_drop(true);

    match tokio::time::timeout(REMOVE_TIMEOUT, cmd.status()).await {
        Ok(Ok(status)) if status.success() => {
            tracing::debug!(container = %name, "container removed");
        }
        Ok(Ok(status)) => {
            tracing::warn!(container = %name, %status, "container removal failed");
        }
        Ok(Err(err)) => {
            tracing::warn!(container = %name, error = %err, "could not run container removal");
        }
        Err(_) => {
            tracing::warn!(container = %name, "container removal timed out");
        }
    }
}
