pub mod acquisition;
pub mod canonical;
pub mod date_parser;
pub mod embedder;
pub mod entity_linker;
pub mod event_extractor;
pub mod keyword_extractor;
pub mod merger;
pub mod orchestrator;
pub mod relevance;
pub mod testing;
pub mod traits;

pub use canonical::{CanonicalOutcome, CanonicalViewpointService};
pub use orchestrator::{MergerStrategy, OrchestratorConfig, TimelineOrchestrator};
pub use traits::{Llm, StoreProgressSink, TimelineStore, WikiFetcher};
