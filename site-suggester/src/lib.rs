pub mod types;
pub mod config;
pub mod similarity;
pub mod topics;
pub mod parser;
pub mod dedup;
pub mod retry;
pub mod state;
pub mod traits;
pub mod fetcher;
pub mod llm_adapter;
pub mod discussions;
pub mod pipeline;
pub mod utils;

pub use types::*;
pub use config::AgentConfig;
pub use similarity::similarity;
pub use topics::{is_covered, select_topic, Topic, TopicRoster};
pub use parser::ResponseParser;
pub use dedup::{DuplicateGuard, DuplicateMatch};
pub use retry::{RetryDelay, RetryPolicy};
pub use state::{RunState, Stage};
pub use traits::{DiscussionBoard, PageSource, TextGenerator};
pub use fetcher::{PageFetcher, StaticPageSource};
pub use llm_adapter::{GenerationRequest, OpenAiCompatibleGenerator, ScriptedGenerator};
pub use discussions::{GitHubDiscussions, InMemoryBoard};
pub use pipeline::{PipelineBuilder, RunMode, RunOutcome, SuggestionPipeline};
