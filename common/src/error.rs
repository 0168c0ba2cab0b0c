use async_openai::error::OpenAIError;
use thiserror::Error;
use tokio::task::JoinError;

/// Structured, stringifiable error taxonomy shared by every crate in the
/// workspace. Variants map onto the error kinds of the retrieval engine:
/// `config_error` -> `Config`, `strategy_unknown` -> `StrategyUnknown`,
/// `adapter_unavailable` -> `AdapterUnavailable`, `timeout` -> `Timeout`,
/// `eval_parse_failure` -> `EvalParse`. `retrieval_empty` and
/// `sub_strategy_failure` are not errors in this taxonomy: they degrade to
/// `Ok` values with zero results, per policy.
#[derive(Error, Debug)]
pub enum AppError {
    #[error("config error: {0}")]
    Config(String),
    #[error("unknown retrieval strategy '{name}', known strategies: {known:?}")]
    StrategyUnknown { name: String, known: Vec<String> },
    #[error("adapter unavailable: {0}")]
    AdapterUnavailable(String),
    #[error("operation timed out: {0}")]
    Timeout(String),
    #[error("LLM reply could not be parsed: {0}")]
    EvalParse(String),
    #[error("OpenAI error: {0}")]
    OpenAI(#[from] OpenAIError),
    #[error("validation error: {0}")]
    Validation(String),
    #[error("not found: {0}")]
    NotFound(String),
    #[error("task join error: {0}")]
    Join(#[from] JoinError),
    #[error("internal error: {0}")]
    Internal(String),
}
