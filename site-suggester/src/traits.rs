use crate::llm_adapter::GenerationRequest;
use crate::types::{ExistingPost, NewPost, PageSnapshot, Result, SiteReport};
use async_trait::async_trait;

/// Reads a page of the site under review
#[async_trait]
pub trait PageSource: Send + Sync {
    /// Human-readable name for logs
    fn source_name(&self) -> String;

    /// Fetch `url` and reduce it to a snapshot.
    /// HTTP error statuses come back as errors so the caller can retry them.
    async fn snapshot(&self, url: &str) -> Result<PageSnapshot>;

    /// The snapshot of `url` plus whatever site-wide checks the source supports.
    /// Only the page itself is required; auxiliary checks degrade to empty fields.
    async fn report(&self, url: &str) -> Result<SiteReport> {
        Ok(SiteReport::from(self.snapshot(url).await?))
    }
}

/// The text-generation service. Its replies are free-form and may or may not
/// contain well-formed JSON.
#[async_trait]
pub trait TextGenerator: Send + Sync {
    fn generator_name(&self) -> String;

    async fn generate(&self, request: &GenerationRequest) -> Result<String>;
}

/// The shared discussion board suggestions are published to
#[async_trait]
pub trait DiscussionBoard: Send + Sync {
    fn board_name(&self) -> String;

    /// Existing posts in `category`, newest first.
    async fn list_posts(&self, category: &str) -> Result<Vec<ExistingPost>>;

    /// Create a post and return its URL.
    /// An unknown category is reported as `SuggesterError::CategoryNotFound`.
    async fn create_post(&self, post: &NewPost) -> Result<String>;
}
