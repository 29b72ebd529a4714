pub mod agent;
pub mod config;
pub mod error;
pub mod ollama;
pub mod pipeline;
pub mod search;
pub mod store;
pub mod task;

pub use error::{AgentError, ProviderError};
pub use ollama::CapabilityProvider;
pub use pipeline::{Orchestrator, PipelineProgress, SessionResult};
pub use search::SearchProvider;
pub use store::{SessionStatus, SessionStore};
pub use task::Stage;
