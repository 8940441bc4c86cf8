//! Agent configuration.
//!
//! Values come from three layers, later ones winning: built-in defaults, an
//! optional YAML file, and environment variables. Loading always ends with
//! [`AgentConfig::validate`].

use crate::retry::RetryPolicy;
use crate::topics::{Topic, TopicRoster};
use crate::types::{Result, SuggesterError, ThresholdPolicy};
use serde::{Deserialize, Serialize};
use std::env;
use std::path::Path;
use std::time::Duration;
use tracing::{debug, info};
use url::Url;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SiteConfig {
    pub url: String,
    pub user_agent: String,
    pub timeout_seconds: u64,
    pub max_redirects: usize,
    pub max_page_size_mb: usize,
    /// Article pages sampled from the sitemap on every run
    pub max_articles: usize,
}

impl Default for SiteConfig {
    fn default() -> Self {
        Self {
            url: "https://blog.alimov.top".to_string(),
            user_agent: "SiteSuggester/1.0 (site analysis bot)".to_string(),
            timeout_seconds: 30,
            max_redirects: 5,
            max_page_size_mb: 10,
            max_articles: 2,
        }
    }
}

#[derive(Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GitHubConfig {
    pub token: String,
    pub repo: String,
    pub category: String,
    pub api_url: String,
    /// Discussions requested per GraphQL page (GitHub caps this at 100)
    pub page_size: u32,
    /// Listing stops after this many pages
    pub max_pages: u32,
    pub timeout_seconds: u64,
}

impl Default for GitHubConfig {
    fn default() -> Self {
        Self {
            token: String::new(),
            repo: "KlimDos/my-blog".to_string(),
            category: "For Developers".to_string(),
            api_url: "https://api.github.com/graphql".to_string(),
            page_size: 50,
            max_pages: 20,
            timeout_seconds: 30,
        }
    }
}

// Hand-written so the token never ends up in logs
impl std::fmt::Debug for GitHubConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GitHubConfig")
            .field("token_set", &!self.token.is_empty())
            .field("repo", &self.repo)
            .field("category", &self.category)
            .field("api_url", &self.api_url)
            .field("page_size", &self.page_size)
            .field("max_pages", &self.max_pages)
            .finish()
    }
}

#[derive(Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    pub base_url: String,
    pub api_key: String,
    pub model: String,
    pub temperature: f32,
    pub language: String,
    pub timeout_seconds: u64,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            base_url: "https://openrouter.ai/api/v1".to_string(),
            api_key: String::new(),
            model: "meta-llama/llama-3.3-70b-instruct:free".to_string(),
            temperature: 0.35,
            language: "English".to_string(),
            timeout_seconds: 180,
        }
    }
}

impl std::fmt::Debug for LlmConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LlmConfig")
            .field("base_url", &self.base_url)
            .field("api_key_set", &!self.api_key.is_empty())
            .field("model", &self.model)
            .field("temperature", &self.temperature)
            .field("language", &self.language)
            .finish()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DelayStrategy {
    Fixed,
    Linear,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrySettings {
    pub max_attempts: u32,
    pub delay_seconds: u64,
    pub strategy: DelayStrategy,
}

impl RetrySettings {
    pub fn policy(&self) -> RetryPolicy {
        let delay = Duration::from_secs(self.delay_seconds);
        match self.strategy {
            DelayStrategy::Fixed => RetryPolicy::fixed(self.max_attempts, delay),
            DelayStrategy::Linear => RetryPolicy::linear(self.max_attempts, delay),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    pub fetch: RetrySettings,
    pub generation: RetrySettings,
    pub publish: RetrySettings,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            fetch: RetrySettings {
                max_attempts: 3,
                delay_seconds: 10,
                strategy: DelayStrategy::Fixed,
            },
            generation: RetrySettings {
                max_attempts: 3,
                delay_seconds: 15,
                strategy: DelayStrategy::Linear,
            },
            publish: RetrySettings {
                max_attempts: 3,
                delay_seconds: 15,
                strategy: DelayStrategy::Linear,
            },
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ThresholdConfig {
    pub coverage: ThresholdPolicy,
    pub duplicate: ThresholdPolicy,
}

impl Default for ThresholdConfig {
    fn default() -> Self {
        Self {
            coverage: ThresholdPolicy::coverage(),
            duplicate: ThresholdPolicy::duplicate(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentConfig {
    pub site: SiteConfig,
    pub github: GitHubConfig,
    pub llm: LlmConfig,
    pub retry: RetryConfig,
    pub thresholds: ThresholdConfig,
    pub schedule_interval_minutes: u64,
    pub log_level: String,
    /// Replaces the built-in topic roster when set
    pub topics: Option<Vec<Topic>>,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            site: SiteConfig::default(),
            github: GitHubConfig::default(),
            llm: LlmConfig::default(),
            retry: RetryConfig::default(),
            thresholds: ThresholdConfig::default(),
            schedule_interval_minutes: 60,
            log_level: "INFO".to_string(),
            topics: None,
        }
    }
}

impl AgentConfig {
    /// Defaults, then the YAML file at `path` (if given), then the environment.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        config.apply_env(|key| env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        info!("Loaded config file: {}", path.display());
        Self::from_yaml(&content)
    }

    pub fn from_yaml(content: &str) -> Result<Self> {
        if content.trim().is_empty() {
            return Ok(Self::default());
        }
        Ok(serde_yaml::from_str(content)?)
    }

    /// Override fields from environment variables, looked up through `lookup`.
    pub fn apply_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let set = |target: &mut String, key: &str| {
            if let Some(value) = lookup(key).filter(|v| !v.is_empty()) {
                debug!("Config override from {}", key);
                *target = value;
            }
        };

        set(&mut self.github.token, "GITHUB_TOKEN");
        set(&mut self.github.repo, "GITHUB_REPO");
        set(&mut self.github.category, "DISCUSSIONS_CATEGORY");
        set(&mut self.site.url, "SITE_URL");
        set(&mut self.llm.api_key, "OPENROUTER_API_KEY");
        set(&mut self.llm.model, "OPENROUTER_MODEL");
        set(&mut self.llm.base_url, "LLM_BASE_URL");
        set(&mut self.log_level, "LOG_LEVEL");
    }

    pub fn validate(&self) -> Result<()> {
        Url::parse(&self.site.url)?;

        match self.github.repo.split_once('/') {
            Some((owner, name)) if !owner.is_empty() && !name.is_empty() && !name.contains('/') => {}
            _ => {
                return Err(SuggesterError::Config(format!(
                    "github.repo must look like owner/name, got '{}'",
                    self.github.repo
                )))
            }
        }

        if self.github.category.trim().is_empty() {
            return Err(SuggesterError::Config("github.category must not be empty".to_string()));
        }

        if !(1..=100).contains(&self.github.page_size) || self.github.max_pages == 0 {
            return Err(SuggesterError::Config(
                "github.page_size must be within 1..=100 and github.max_pages at least 1".to_string(),
            ));
        }

        for (name, policy) in [("coverage", &self.thresholds.coverage), ("duplicate", &self.thresholds.duplicate)] {
            for value in [policy.normal, policy.rejected] {
                if !(0.0..=1.0).contains(&value) {
                    return Err(SuggesterError::Config(format!(
                        "thresholds.{} values must be within [0, 1], got {}",
                        name, value
                    )));
                }
            }
        }

        for (name, settings) in [
            ("fetch", &self.retry.fetch),
            ("generation", &self.retry.generation),
            ("publish", &self.retry.publish),
        ] {
            if settings.max_attempts == 0 {
                return Err(SuggesterError::Config(format!("retry.{}.max_attempts must be at least 1", name)));
            }
        }

        if let Some(topics) = &self.topics {
            if topics.is_empty() {
                return Err(SuggesterError::Config("topics must not be an empty list".to_string()));
            }
            let mut ids = std::collections::HashSet::new();
            for topic in topics {
                if !ids.insert(topic.id.as_str()) {
                    return Err(SuggesterError::Config(format!("duplicate topic id '{}'", topic.id)));
                }
            }
        }

        if self.schedule_interval_minutes == 0 {
            return Err(SuggesterError::Config("schedule_interval_minutes must be at least 1".to_string()));
        }

        Ok(())
    }

    pub fn roster(&self) -> TopicRoster {
        match &self.topics {
            Some(topics) => TopicRoster::new(topics.clone()),
            None => TopicRoster::default(),
        }
    }

    pub fn schedule_interval(&self) -> Duration {
        Duration::from_secs(self.schedule_interval_minutes * 60)
    }
}
