//! Agent orchestration for Evidex.
//!
//! Takes the geometric extraction of `evidex-core`, fans each table and figure
//! out to a fixed set of expert agents (every call protected by a per-agent
//! circuit breaker and retry policy), and merges the answers into
//! confidence-scored records.

pub mod agents;
pub mod consensus;
pub mod error;
pub mod orchestrator;
pub mod pipeline;
pub mod resilience;

pub use agents::{AgentKind, AgentOutput, AgentResult, ExtractedData, ValidationStatus};
pub use consensus::{Consensus, ConsensusBuilder, ConsensusData, ReviewStatus};
pub use error::{FailureReason, InvokeError, PipelineError, Result};
pub use orchestrator::{AgentOrchestrator, Enhanced, EnhancedFigure, EnhancedTable, EnhancementBatch, PipelineStats};
pub use pipeline::{ExtractionPipeline, PageFailure, PageOutput, PipelineRun, backend_from_config};
pub use resilience::{
    BreakerConfig, BreakerRegistry, CircuitBreaker, CircuitState, CircuitStatus, RateLimiter, ResilientInvoker,
    RetryPolicy,
};
