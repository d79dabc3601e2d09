use serde::{Deserialize, Serialize};

use crate::language::LanguageProfile;

/// Body of `POST /api/execution/executeCode` as the caller sent it.
///
/// Every field is optional at this layer so that missing fields turn into
/// the validator's messages rather than a generic deserialization error.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecuteRequest {
    #[serde(default)]
    pub code: Option<String>,
    #[serde(default)]
    pub stdin_input: Option<String>,
    #[serde(default)]
    pub language: Option<String>,
}

/// A request that passed validation and resolved to a runnable profile.
#[derive(Debug, Clone)]
pub struct ValidatedRequest {
    pub code: String,
    pub stdin: Option<String>,
    pub profile: LanguageProfile,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExecutionOutcome {
    Success { stdout: String, stderr: String },
    RuntimeFailure { stdout: String, stderr: String },
    TimedOut { stdout: String, stderr: String },
    InfrastructureFailure { message: String },
}

impl ExecutionOutcome {
    pub fn status_label(&self) -> &'static str {
        match self {
            ExecutionOutcome::Success { .. } => "success",
            ExecutionOutcome::RuntimeFailure { .. } => "runtime_failure",
            ExecutionOutcome::TimedOut { .. } => "timed_out",
            ExecutionOutcome::InfrastructureFailure { .. } => "infrastructure_failure",
        }
    }
}
