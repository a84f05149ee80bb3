//! Northstar Library
//!
//! Funding-source discovery pipeline: multi-engine search fan-out,
//! domain registry, metadata judging, and session orchestration.

use sqlx::SqlitePool;
use std::sync::Arc;

pub mod config;
pub mod db;
pub mod handlers;
pub mod models;
pub mod services;
pub mod utils;

// Re-export commonly used types
pub use config::Config;
pub use services::{
    AdapterSet, CandidateProcessor, DiscoveryService, DomainRegistry, MetadataJudge, QueryCache,
    QueryGenerationService, SearchOrchestrator, SessionService, SpamFilter,
};

/// Application shared state
///
/// Design Philosophy: Keep it simple - Rust's type system IS our DI container.
/// All services are wrapped in Arc for cheap cloning and thread safety.
#[derive(Clone)]
pub struct AppState {
    pub db: SqlitePool,

    pub domain_registry: Arc<DomainRegistry>,
    pub session_service: Arc<SessionService>,
    pub query_generation: Arc<QueryGenerationService>,
    pub adapters: Arc<AdapterSet>,
    pub discovery_service: DiscoveryService,
}
