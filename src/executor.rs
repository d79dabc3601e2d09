use std::sync::Arc;

use uuid::Uuid;

use crate::{
    admission::AdmissionGate,
    config::SandboxLimits,
    error::EngineError,
    metrics::MetricsRegistry,
    models::{ExecuteRequest, ExecutionOutcome},
    report::classify,
    sandbox::{RunSpec, SandboxBackend},
    validation::validate,
    workspace::WorkspaceManager,
};

/// Validates, provisions, runs and tears down one request at a time per call.
///
/// Holds no per-request state; concurrent calls share only the read-only
/// registry, the admission gate and the metrics counters.
#[derive(Clone)]
pub struct Executor {
    backend: Arc<dyn SandboxBackend>,
    workspaces: WorkspaceManager,
    gate: AdmissionGate,
    limits: SandboxLimits,
    metrics: Arc<MetricsRegistry>,
}

impl Executor {
    pub fn new(
        backend: Arc<dyn SandboxBackend>,
        workspaces: WorkspaceManager,
        gate: AdmissionGate,
        limits: SandboxLimits,
        metrics: Arc<MetricsRegistry>,
    ) -> Self {
        Self {
            backend,
            workspaces,
            gate,
            limits,
            metrics,
        }
    }

    pub fn metrics(&self) -> &MetricsRegistry {
        &self.metrics
    }

    pub async fn execute(&self, raw: ExecuteRequest) -> Result<ExecutionOutcome, EngineError> {
        self.metrics.received();

        let request = validate(raw).inspect_err(|err| {
            self.metrics.rejected();
            tracing::info!(reason = %err, "execution request rejected");
        })?;

        let _permit = self.gate.acquire().await.inspect_err(|_| {
            self.metrics.busy();
            tracing::warn!(
                in_use = self.gate.in_use(),
                "admission gate full, turning request away"
            );
        })?;

        let id = Uuid::new_v4();
        let language = request.profile.language;
        let _in_flight = self.metrics.started();

        let mut workspace = match self
            .workspaces
            .provision(id, &request.profile, &request.code, request.stdin.as_deref())
            .await
        {
            Ok(workspace) => workspace,
            Err(err) => {
                tracing::error!(
                    execution_id = %id,
                    %language,
                    error = %format!("{err:#}"),
                    "workspace provisioning failed"
                );
                let outcome = classify(Err(err));
                self.metrics.finished(&outcome);
                return Ok(outcome);
            }
        };

        tracing::info!(
            execution_id = %id,
            %language,
            backend = self.backend.name(),
            "starting execution"
        );

        let result = self
            .backend
            .execute(RunSpec {
                id,
                profile: request.profile,
                workspace_dir: workspace.dir().to_path_buf(),
                stdin: request.stdin,
                limits: self.limits.clone(),
            })
            .await;
        workspace.dispose().await;

        let (exit_code, duration_ms) = match &result {
            Ok(run) => {
                if run.truncated {
                    tracing::warn!(
                        execution_id = %id,
                        limit = self.limits.max_output_bytes,
                        "program output exceeded the capture limit and was cut"
                    );
                }
                (Some(run.exit_code), Some(run.duration_ms as u64))
            }
            Err(_) => (None, None),
        };

        let outcome = classify(result);
        match &outcome {
            ExecutionOutcome::InfrastructureFailure { message } => {
                tracing::error!(
                    execution_id = %id,
                    %language,
                    error = %message,
                    "sandbox failed to run program"
                );
            }
            ExecutionOutcome::TimedOut { .. } => {
                tracing::warn!(
                    execution_id = %id,
                    %language,
                    timeout_ms = self.limits.timeout_ms,
                    "execution timed out"
                );
            }
            ExecutionOutcome::Success { .. } | ExecutionOutcome::RuntimeFailure { .. } => {
                tracing::info!(
                    execution_id = %id,
                    %language,
                    status = outcome.status_label(),
                    exit_code,
                    duration_ms,
                    "execution finished"
                );
            }
        }
        self.metrics.finished(&outcome);
        Ok(outcome)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use std::{collections::HashSet, path::Path, sync::Arc, time::Duration};

    use super::Executor;
    use crate::{
        admission::AdmissionGate,
        config::SandboxLimits,
        error::EngineError,
        language::Language,
        metrics::MetricsRegistry,
        models::{ExecuteRequest, ExecutionOutcome},
        sandbox::{
            SandboxBackend,
            fake::{ScriptedSandbox, result},
        },
        workspace::WorkspaceManager,
    };

    pub(crate) fn executor(root: &Path, backend: Arc<dyn SandboxBackend>) -> Executor {
        Executor::new(
            backend,
            WorkspaceManager::new(root),
            AdmissionGate::new(0, Duration::from_secs(1)),
            SandboxLimits::default(),
            Arc::new(MetricsRegistry::new()),
        )
    }

    fn request(code: &str, language: &str, stdin: Option<&str>) -> ExecuteRequest {
        ExecuteRequest {
            code: Some(code.to_string()),
            stdin_input: stdin.map(str::to_string),
            language: Some(language.to_string()),
        }
    }

    fn leftovers(root: &Path) -> usize {
        std::fs::read_dir(root).map(|dir| dir.count()).unwrap_or(0)
    }

    #[tokio::test]
    async fn every_language_succeeds_and_cleans_up() {
        let root = tempfile::tempdir().unwrap();
        let fake = ScriptedSandbox::new(|_, _| Ok(result("fixed\n", "", 0, false)));
        let executor = executor(root.path(), Arc::new(fake.clone()));

        for lang in Language::ALL {
            let outcome = executor
                .execute(request("print('fixed')", lang.id(), None))
                .await
                .unwrap();
            assert_eq!(
                outcome,
                ExecutionOutcome::Success {
                    stdout: "fixed\n".into(),
                    stderr: String::new()
                }
            );
        }

        let runs = fake.observed();
        assert_eq!(runs.len(), Language::ALL.len());
        for run in &runs {
            assert_eq!(run.source.as_deref(), Some("print('fixed')"));
            assert!(!run.workspace_dir.exists());
        }
        assert_eq!(leftovers(root.path()), 0);
    }

    #[tokio::test]
    async fn validation_failures_touch_no_resources() {
        let root = tempfile::tempdir().unwrap();
        let fake = ScriptedSandbox::echo_source();
        let executor = executor(root.path(), Arc::new(fake.clone()));

        let err = executor.execute(request("", "python", None)).await.unwrap_err();
        assert_eq!(err, EngineError::MissingCode);

        let err = executor
            .execute(request("IDENTIFICATION DIVISION.", "cobol", None))
            .await
            .unwrap_err();
        assert_eq!(err, EngineError::UnsupportedLanguage("cobol".into()));

        assert!(fake.observed().is_empty());
        assert_eq!(leftovers(root.path()), 0);
    }

    #[tokio::test]
    async fn input_is_delivered_as_file_and_stdin() {
        let root = tempfile::tempdir().unwrap();
        let fake = ScriptedSandbox::new(|spec, _| {
            Ok(result(spec.stdin.as_deref().unwrap_or_default(), "", 0, false))
        });
        let executor = executor(root.path(), Arc::new(fake.clone()));

        let outcome = executor
            .execute(request("print(input())", "python", Some("hello")))
            .await
            .unwrap();
        assert!(matches!(
            outcome,
            ExecutionOutcome::Success { stdout, .. } if stdout.contains("hello")
        ));

        let run = &fake.observed()[0];
        assert_eq!(run.stdin.as_deref(), Some("hello"));
        assert_eq!(run.input_file.as_deref(), Some("hello"));
    }

    #[tokio::test]
    async fn timeout_and_runtime_failure_still_clean_up() {
        let root = tempfile::tempdir().unwrap();
        let fake = ScriptedSandbox::new(|_, source| {
            if source.contains("sleep") {
                Ok(result("tick\n", "", -1, true))
            } else {
                Ok(result("", "exit status 2\n", 2, false))
            }
        });
        let executor = executor(root.path(), Arc::new(fake));

        let timed_out = executor
            .execute(request("sleep(60)", "python", None))
            .await
            .unwrap();
        assert_eq!(
            timed_out,
            ExecutionOutcome::TimedOut {
                stdout: "tick\n".into(),
                stderr: String::new()
            }
        );

        let failed = executor
            .execute(request("exit(2)", "ruby", None))
            .await
            .unwrap();
        assert_eq!(
            failed,
            ExecutionOutcome::RuntimeFailure {
                stdout: String::new(),
                stderr: "exit status 2\n".into()
            }
        );
        assert_eq!(leftovers(root.path()), 0);
    }

    #[tokio::test]
    async fn backend_error_is_infrastructure_failure_and_cleans_up() {
        let root = tempfile::tempdir().unwrap();
        let fake =
            ScriptedSandbox::new(|_, _| anyhow::bail!("Cannot connect to the Docker daemon"));
        let executor = executor(root.path(), Arc::new(fake));

        let outcome = executor.execute(request("x", "go", None)).await.unwrap();
        assert!(matches!(
            outcome,
            ExecutionOutcome::InfrastructureFailure { message } if message.contains("Docker daemon")
        ));
        assert_eq!(leftovers(root.path()), 0);
    }

    #[tokio::test]
    async fn provisioning_failure_is_infrastructure_failure() {
        let root = tempfile::tempdir().unwrap();
        let blocked = root.path().join("file");
        std::fs::write(&blocked, b"x").unwrap();
        let fake = ScriptedSandbox::echo_source();
        let executor = executor(&blocked, Arc::new(fake.clone()));

        let outcome = executor.execute(request("x", "c", None)).await.unwrap();
        assert!(matches!(outcome, ExecutionOutcome::InfrastructureFailure { .. }));
        assert!(fake.observed().is_empty());
    }

    #[tokio::test]
    async fn concurrent_requests_are_isolated() {
        let root = tempfile::tempdir().unwrap();
        let fake = ScriptedSandbox::echo_source().with_delay(Duration::from_millis(50));
        let executor = executor(root.path(), Arc::new(fake.clone()));

        let handles: Vec<_> = (0..16)
            .map(|i| {
                let executor = executor.clone();
                tokio::spawn(async move {
                    let code = format!("print({i})");
                    let outcome = executor.execute(request(&code, "python", None)).await;
                    (code, outcome)
                })
            })
            .collect();

        for handle in handles {
            let (code, outcome) = handle.await.unwrap();
            assert_eq!(
                outcome.unwrap(),
                ExecutionOutcome::Success {
                    stdout: code,
                    stderr: String::new()
                }
            );
        }

        let dirs: HashSet<_> = fake
            .observed()
            .into_iter()
            .map(|run| run.workspace_dir)
            .collect();
        assert_eq!(dirs.len(), 16);
        assert_eq!(leftovers(root.path()), 0);
    }

    #[tokio::test]
    async fn cancelled_request_still_removes_workspace() {
        let root = tempfile::tempdir().unwrap();
        let fake = ScriptedSandbox::echo_source().with_delay(Duration::from_secs(30));
        let executor = executor(root.path(), Arc::new(fake.clone()));

        let run = executor.execute(request("loop {}", "rust", None));
        assert!(tokio::time::timeout(Duration::from_millis(100), run).await.is_err());

        assert_eq!(fake.observed().len(), 1);
        assert_eq!(leftovers(root.path()), 0);
    }

    #[tokio::test]
    async fn full_gate_turns_request_away_before_provisioning() {
        let root = tempfile::tempdir().unwrap();
        let fake = ScriptedSandbox::echo_source();
        let gate = AdmissionGate::new(1, Duration::from_millis(20));
        let executor = Executor::new(
            Arc::new(fake.clone()),
            WorkspaceManager::new(root.path()),
            gate.clone(),
            SandboxLimits::default(),
            Arc::new(MetricsRegistry::new()),
        );

        let _held = gate.acquire().await.unwrap();
        let err = executor.execute(request("x", "php", None)).await.unwrap_err();
        assert!(matches!(err, EngineError::Busy { .. }));
        assert!(fake.observed().is_empty());
        assert_eq!(leftovers(root.path()), 0);
        assert!(
            executor
                .metrics()
                .render_prometheus()
                .contains("execution_busy_total 1")
        );
    }
}
