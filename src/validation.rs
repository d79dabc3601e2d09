use crate::{
    error::EngineError,
    language::Language,
    models::{ExecuteRequest, ValidatedRequest},
};

/// Checks a raw request and resolves its language.
///
/// Runs to completion before any workspace or container is allocated, so a
/// request that cannot run never costs more than this call.
pub fn validate(request: ExecuteRequest) -> Result<ValidatedRequest, EngineError> {
    let code = request
        .code
        .filter(|code| !code.is_empty())
        .ok_or(EngineError::MissingCode)?;

    let raw_language = request
        .language
        .filter(|language| !language.is_empty())
        .ok_or(EngineError::MissingLanguage)?;

    let language = Language::resolve(&raw_language)
        .ok_or_else(|| EngineError::UnsupportedLanguage(raw_language.clone()))?;

    // An empty input is the same as no input.
    let stdin = request.stdin_input.filter(|input| !input.is_empty());

    Ok(ValidatedRequest {
        code,
        stdin,
        profile: language.profile(),
    })
}
