use serde::{Deserialize, Serialize};
// Shared data contracts live in the interfaces crate
pub use interfaces::defs::{
    ExistingPost, NewPost, PageSnapshot, ResponseHeaders, SiteReport, StructuredData, Suggestion,
};

/// Label-aware similarity thresholds.
///
/// Posts carrying one of `rejection_labels` are matched with the lower
/// `rejected` threshold.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ThresholdPolicy {
    pub normal: f64,
    pub rejected: f64,
    #[serde(default = "default_rejection_labels")]
    pub rejection_labels: Vec<String>,
}

impl ThresholdPolicy {
    pub fn new(normal: f64, rejected: f64) -> Self {
        Self {
            normal,
            rejected,
            rejection_labels: default_rejection_labels(),
        }
    }

    /// Thresholds for deciding whether a roster topic is already covered.
    pub fn coverage() -> Self {
        Self::new(0.25, 0.15)
    }

    /// Thresholds for deciding whether a generated suggestion is a duplicate.
    pub fn duplicate() -> Self {
        Self::new(0.35, 0.20)
    }

    pub fn with_rejection_labels(mut self, labels: Vec<String>) -> Self {
        self.rejection_labels = labels;
        self
    }

    pub fn is_rejected(&self, post: &ExistingPost) -> bool {
        match post.resolution_label.as_deref() {
            Some(label) => self
                .rejection_labels
                .iter()
                .any(|l| l.eq_ignore_ascii_case(label.trim())),
            None => false,
        }
    }

    pub fn threshold_for(&self, post: &ExistingPost) -> f64 {
        if self.is_rejected(post) {
            self.rejected
        } else {
            self.normal
        }
    }
}

impl Default for ThresholdPolicy {
    fn default() -> Self {
        Self::coverage()
    }
}

pub fn default_rejection_labels() -> Vec<String> {
    ["wontfix", "will-not-fix", "declined", "rejected"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

#[derive(Debug, thiserror::Error)]
pub enum SuggesterError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("HTTP {status} from {url}")]
    HttpStatus { status: u16, url: String },

    #[error("Generation service error: {0}")]
    Generation(String),

    #[error("Discussion platform error: {0}")]
    Platform(String),

    #[error("Discussion category '{category}' not found (available: {available:?})")]
    CategoryNotFound {
        category: String,
        available: Vec<String>,
    },

    #[error("Missing credential: {0}")]
    MissingCredential(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Config file error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("General error: {0}")]
    General(String),
}

impl SuggesterError {
    /// Transient failures are worth another attempt; misconfiguration is not.
    pub fn is_retryable(&self) -> bool {
        !matches!(
            self,
            SuggesterError::CategoryNotFound { .. }
                | SuggesterError::MissingCredential(_)
                | SuggesterError::Config(_)
                | SuggesterError::InvalidUrl(_)
                | SuggesterError::Yaml(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, SuggesterError>;
