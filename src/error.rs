use thiserror::Error;

/// Errors a capability or search provider can surface. Kept as a closed set
/// so the pipeline's failure branch can be matched on instead of parsing
/// free-text messages.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProviderError {
    #[error("authentication failed: {0}")]
    Auth(String),

    #[error("rate limited: {0}")]
    RateLimit(String),

    #[error("transport error: {0}")]
    Transport(String),

    #[error("malformed provider response: {0}")]
    Malformed(String),
}

/// Errors from a single agent invocation. The pipeline catches these at the
/// stage boundary; they never escape `Orchestrator::run`.
#[derive(Debug, Error)]
pub enum AgentError {
    #[error(transparent)]
    Provider(#[from] ProviderError),

    #[error("agent exceeded {0} iterations without producing a final answer")]
    IterationLimit(usize),
}
