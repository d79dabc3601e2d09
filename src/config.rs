use std::{env, net::SocketAddr, path::PathBuf, str::FromStr, time::Duration};

use anyhow::{Context, Result, anyhow};

#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub bind_addr: SocketAddr,
    pub container_runtime: String,
    pub workspace_root: PathBuf,
    pub limits: SandboxLimits,
    pub max_concurrent_executions: usize,
    pub admission_wait: Duration,
    pub max_body_bytes: usize,
    pub log_level: String,
    pub log_format: LogFormat,
}

/// Constraints applied to every sandboxed process. Fixed per deployment.
#[derive(Debug, Clone, PartialEq)]
pub struct SandboxLimits {
    pub memory_mb: u64,
    pub memory_swap_mb: u64,
    pub cpus: f32,
    pub cpuset_cpus: String,
    pub timeout_ms: u64,
    pub max_output_bytes: usize,
}

impl Default for SandboxLimits {
    fn default() -> Self {
        Self {
            memory_mb: 512,
            memory_swap_mb: 1024,
            cpus: 1.0,
            cpuset_cpus: "0,1".to_string(),
            timeout_ms: 20_000,
            max_output_bytes: 4 * 1024 * 1024,
        }
    }
}

impl SandboxLimits {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

impl EngineConfig {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    fn from_lookup(var: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let bind_addr = var("BIND_ADDR")
            .unwrap_or_else(|| "0.0.0.0:8080".to_string())
            .parse::<SocketAddr>()
            .context("invalid BIND_ADDR")?;

        let log_format = var("LOG_FORMAT")
            .unwrap_or_else(|| "json".to_string())
            .parse::<LogFormat>()
            .map_err(|err| anyhow!(err))?;

        let defaults = SandboxLimits::default();
        // 6 MiB is the smallest memory ceiling docker accepts.
        let limits = SandboxLimits {
            memory_mb: env_parse(&var, "SANDBOX_MEMORY_MB", defaults.memory_mb).max(6),
            memory_swap_mb: env_parse(&var, "SANDBOX_MEMORY_SWAP_MB", defaults.memory_swap_mb),
            cpus: env_parse(&var, "SANDBOX_CPUS", defaults.cpus),
            cpuset_cpus: var("SANDBOX_CPUSET").unwrap_or(defaults.cpuset_cpus),
            timeout_ms: env_parse(&var, "EXECUTION_TIMEOUT_MS", defaults.timeout_ms).max(1),
            max_output_bytes: env_parse(&var, "MAX_OUTPUT_BYTES", defaults.max_output_bytes)
                .max(1),
        }
        .normalized();

        Ok(Self {
            bind_addr,
            container_runtime: var("CONTAINER_RUNTIME").unwrap_or_else(|| "docker".to_string()),
            workspace_root: var("WORKSPACE_ROOT")
                .map(PathBuf::from)
                .unwrap_or_else(env::temp_dir),
            limits,
            max_concurrent_executions: env_parse(&var, "MAX_CONCURRENT_EXECUTIONS", 16usize),
            admission_wait: Duration::from_millis(env_parse(&var, "ADMISSION_WAIT_MS", 5_000u64)),
            max_body_bytes: env_parse(&var, "MAX_BODY_BYTES", 1_048_576usize),
            log_level: var("LOG_LEVEL").unwrap_or_else(|| "info".to_string()),
            log_format,
        })
    }
}

impl SandboxLimits {
    /// Docker rejects a swap ceiling below the memory ceiling.
    fn normalized(mut self) -> Self {
        self.memory_swap_mb = self.memory_swap_mb.max(self.memory_mb);
        if !(self.cpus.is_finite() && self.cpus > 0.0) {
            self.cpus = 1.0;
        }
        self
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LogFormat {
    #[default]
    Json,
    Compact,
}

impl FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "json" => Ok(Self::Json),
            "compact" | "text" => Ok(Self::Compact),
            _ => Err(format!("unsupported LOG_FORMAT: {s}")),
        }
    }
}

/// Unset or unparsable values fall back to `default`.
fn env_parse<T>(var: impl Fn(&str) -> Option<String>, key: &str, default: T) -> T
where
    T: FromStr,
{
    var(key)
        .and_then(|raw| raw.parse().ok())
        .unwrap_or(default)
}
