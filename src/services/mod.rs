pub mod candidate_processor;
pub mod discovery_service;
pub mod domain_registry;
pub mod metadata_judge;
pub mod query_cache;
pub mod query_generation;
pub mod search;
pub mod search_orchestrator;
pub mod session_service;
pub mod spam_filter;

pub use candidate_processor::{CandidateProcessor, ProcessingStats};
pub use discovery_service::{DiscoveryRequest, DiscoveryService, StartedDiscovery};
pub use domain_registry::{DomainError, DomainRegistry, normalize_domain};
pub use metadata_judge::{JudgeScore, MetadataJudge, MetadataJudgment};
pub use query_cache::{CacheStats, QueryCache};
pub use query_generation::{
    ChatCompletionClient, GenerationError, QueryGenerationService, QueryStrategy,
};
pub use search::{AdapterError, AdapterSet, BreakerState, CircuitBreaker, SearchAdapter};
pub use search_orchestrator::{BatchOutcome, EngineQuery, SearchOrchestrator};
pub use session_service::{SessionBatchStats, SessionError, SessionService};
pub use spam_filter::{SpamFilter, SpamVerdict};
