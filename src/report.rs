use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;

use crate::{models::ExecutionOutcome, sandbox::SandboxResult};

pub const TIMEOUT_MESSAGE: &str = "Process timed out. Please optimize your code.";

/// Turns what the sandbox returned into an outcome.
pub fn classify(result: anyhow::Result<SandboxResult>) -> ExecutionOutcome {
    match result {
        Err(err) => ExecutionOutcome::InfrastructureFailure {
            message: format!("{err:#}"),
        },
        Ok(run) if run.timed_out => ExecutionOutcome::TimedOut {
            stdout: run.stdout,
            stderr: run.stderr,
        },
        Ok(run) if run.exit_code == 0 => ExecutionOutcome::Success {
            stdout: run.stdout,
            stderr: run.stderr,
        },
        Ok(run) => ExecutionOutcome::RuntimeFailure {
            stdout: run.stdout,
            stderr: run.stderr,
        },
    }
}

// Partial output rides along on failures and timeouts only when present.
#[derive(Debug, Serialize)]
#[serde(untagged)]
enum ReportBody<'a> {
    Output {
        stdout: &'a str,
        stderr: &'a str,
    },
    Failure {
        #[serde(skip_serializing_if = "str::is_empty")]
        stdout: &'a str,
        stderr: &'a str,
    },
    TimedOut {
        error: &'static str,
        #[serde(skip_serializing_if = "str::is_empty")]
        stdout: &'a str,
        #[serde(skip_serializing_if = "str::is_empty")]
        stderr: &'a str,
    },
    Infrastructure {
        message: &'a str,
    },
}

impl IntoResponse for ExecutionOutcome {
    fn into_response(self) -> Response {
        let (status, body) = match &self {
            ExecutionOutcome::Success { stdout, stderr } => {
                (StatusCode::OK, ReportBody::Output { stdout, stderr })
            }
            ExecutionOutcome::RuntimeFailure { stdout, stderr } => {
                (StatusCode::OK, ReportBody::Failure { stdout, stderr })
            }
            ExecutionOutcome::TimedOut { stdout, stderr } => (
                StatusCode::OK,
                ReportBody::TimedOut {
                    error: TIMEOUT_MESSAGE,
                    stdout,
                    stderr,
                },
            ),
            ExecutionOutcome::InfrastructureFailure { message } => (
                StatusCode::INTERNAL_SERVER_ERROR,
                ReportBody::Infrastructure { message },
            ),
        };
        (status, Json(body)).into_response()
    }
}
