use crate::config::AgentConfig;
use crate::dedup::DuplicateGuard;
use crate::llm_adapter::GenerationRequest;
use crate::parser::ResponseParser;
use crate::retry::RetryPolicy;
use crate::similarity::normalize;
use crate::state::{RunState, Stage};
use crate::topics::{select_topic, Topic, TopicRoster};
use crate::traits::{DiscussionBoard, PageSource, TextGenerator};
use crate::types::{ExistingPost, NewPost, Result, SiteReport, Suggestion, SuggesterError, ThresholdPolicy};
use crate::utils::time::format_duration;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, info_span, warn, Instrument};
use url::Url;

/// How a run ended when nothing went wrong.
#[derive(Debug, Clone, PartialEq)]
pub enum RunOutcome {
    Published {
        topic_id: String,
        title: String,
        url: String,
    },
    /// A suggestion passed every check but publishing was switched off.
    DryRun {
        topic_id: String,
        suggestion: Suggestion,
    },
    /// Every topic was covered or rejected during this run.
    NoTopicAvailable { rejected: Vec<String> },
}

impl fmt::Display for RunOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RunOutcome::Published { topic_id, title, url } => {
                write!(f, "published [{}] {:?} at {}", topic_id, title, url)
            }
            RunOutcome::DryRun { topic_id, suggestion } => {
                write!(f, "dry run [{}] {:?} (not published)", topic_id, suggestion.title)
            }
            RunOutcome::NoTopicAvailable { rejected } if rejected.is_empty() => {
                write!(f, "no topic available: every topic is already covered")
            }
            RunOutcome::NoTopicAvailable { rejected } => {
                write!(f, "no topic available (rejected this run: {})", rejected.join(", "))
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunMode {
    Once,
    Every(Duration),
}

/// One suggestion per run: fetch context, pick a topic, generate, check, publish.
pub struct SuggestionPipeline {
    source: Arc<dyn PageSource>,
    generator: Arc<dyn TextGenerator>,
    board: Arc<dyn DiscussionBoard>,
    roster: TopicRoster,
    parser: ResponseParser,
    guard: DuplicateGuard,
    coverage: ThresholdPolicy,
    site_url: String,
    category: String,
    language: String,
    fetch_retry: RetryPolicy,
    generation_retry: RetryPolicy,
    publish_retry: RetryPolicy,
    dry_run: bool,
}

pub struct PipelineBuilder {
    source: Arc<dyn PageSource>,
    generator: Arc<dyn TextGenerator>,
    board: Arc<dyn DiscussionBoard>,
    roster: TopicRoster,
    coverage: ThresholdPolicy,
    duplicate: ThresholdPolicy,
    site_url: String,
    category: String,
    language: String,
    fetch_retry: RetryPolicy,
    generation_retry: RetryPolicy,
    publish_retry: RetryPolicy,
    dry_run: bool,
}

impl PipelineBuilder {
    pub fn new(
        source: Arc<dyn PageSource>,
        generator: Arc<dyn TextGenerator>,
        board: Arc<dyn DiscussionBoard>,
    ) -> Self {
        let defaults = AgentConfig::default();
        Self {
            source,
            generator,
            board,
            roster: TopicRoster::default(),
            coverage: defaults.thresholds.coverage,
            duplicate: defaults.thresholds.duplicate,
            site_url: defaults.site.url,
            category: defaults.github.category,
            language: defaults.llm.language,
            fetch_retry: defaults.retry.fetch.policy(),
            generation_retry: defaults.retry.generation.policy(),
            publish_retry: defaults.retry.publish.policy(),
            dry_run: false,
        }
    }

    /// Take roster, thresholds, retry policies and targets from a loaded config.
    pub fn with_config(mut self, config: &AgentConfig) -> Self {
        self.roster = config.roster();
        self.coverage = config.thresholds.coverage.clone();
        self.duplicate = config.thresholds.duplicate.clone();
        self.site_url = config.site.url.clone();
        self.category = config.github.category.clone();
        self.language = config.llm.language.clone();
        self.fetch_retry = config.retry.fetch.policy();
        self.generation_retry = config.retry.generation.policy();
        self.publish_retry = config.retry.publish.policy();
        self
    }

    pub fn roster(mut self, roster: TopicRoster) -> Self {
        self.roster = roster;
        self
    }

    pub fn coverage_policy(mut self, policy: ThresholdPolicy) -> Self {
        self.coverage = policy;
        self
    }

    pub fn duplicate_policy(mut self, policy: ThresholdPolicy) -> Self {
        self.duplicate = policy;
        self
    }

    pub fn site_url(mut self, url: &str) -> Self {
        self.site_url = url.to_string();
        self
    }

    pub fn category(mut self, category: &str) -> Self {
        self.category = category.to_string();
        self
    }

    pub fn language(mut self, language: &str) -> Self {
        self.language = language.to_string();
        self
    }

    pub fn fetch_retry(mut self, policy: RetryPolicy) -> Self {
        self.fetch_retry = policy;
        self
    }

    pub fn generation_retry(mut self, policy: RetryPolicy) -> Self {
        self.generation_retry = policy;
        self
    }

    pub fn publish_retry(mut self, policy: RetryPolicy) -> Self {
        self.publish_retry = policy;
        self
    }

    pub fn dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    pub fn build(self) -> Result<SuggestionPipeline> {
        Url::parse(&self.site_url)?;
        if self.roster.is_empty() {
            return Err(SuggesterError::Config("topic roster is empty".to_string()));
        }
        if self.category.trim().is_empty() {
            return Err(SuggesterError::Config("discussion category is empty".to_string()));
        }

        Ok(SuggestionPipeline {
            source: self.source,
            generator: self.generator,
            board: self.board,
            roster: self.roster,
            parser: ResponseParser::new(),
            guard: DuplicateGuard::new(self.duplicate),
            coverage: self.coverage,
            site_url: self.site_url,
            category: self.category,
            language: self.language,
            fetch_retry: self.fetch_retry,
            generation_retry: self.generation_retry,
            publish_retry: self.publish_retry,
            dry_run: self.dry_run,
        })
    }
}

impl SuggestionPipeline {
    pub fn roster(&self) -> &TopicRoster {
        &self.roster
    }

    pub fn is_dry_run(&self) -> bool {
        self.dry_run
    }

    pub async fn run(&self, mode: RunMode) -> Result<()> {
        match mode {
            RunMode::Once => {
                let outcome = self.run_once().await?;
                info!("Run finished: {}", outcome);
                Ok(())
            }
            RunMode::Every(interval) => {
                self.run_forever(interval).await;
                Ok(())
            }
        }
    }

    /// Run, log, sleep, forever. A failed run never stops the loop.
    pub async fn run_forever(&self, interval: Duration) {
        info!(
            interval = %format_duration(interval),
            dry_run = self.dry_run,
            "periodic mode started"
        );
        let mut cycle: u64 = 0;
        loop {
            cycle += 1;
            let _ = self.run_cycle(cycle).await;
            info!(cycle = cycle, next_run_in = %format_duration(interval), "sleeping until next run");
            tokio::time::sleep(interval).await;
        }
    }

    /// `cycles` runs of the periodic loop, without a pause after the last one.
    pub async fn run_cycles(&self, interval: Duration, cycles: u64) -> Vec<Result<RunOutcome>> {
        let mut results = Vec::new();
        for cycle in 1..=cycles {
            results.push(self.run_cycle(cycle).await);
            if cycle < cycles {
                tokio::time::sleep(interval).await;
            }
        }
        results
    }

    async fn run_cycle(&self, cycle: u64) -> Result<RunOutcome> {
        info!(cycle = cycle, "periodic run starting");
        let result = self.run_once().await;
        if let Err(ref e) = result {
            error!(cycle = cycle, error = %e, retryable = e.is_retryable(), "periodic run failed, continuing");
        }
        result
    }

    /// A single run. `Err` carries the last error of the I/O stage that gave up.
    pub async fn run_once(&self) -> Result<RunOutcome> {
        let mut state = RunState::new();
        let span = info_span!("run", run_id = %state.run_id());

        async {
            info!(site = %self.site_url, category = %self.category, dry_run = self.dry_run, "run starting");
            let result = self.execute(&mut state).await;
            match &result {
                Ok(outcome) => info!(
                    outcome = %outcome,
                    fetch_attempts = state.attempts(Stage::FetchingContext),
                    generate_attempts = state.attempts(Stage::Generating),
                    publish_attempts = state.attempts(Stage::Publishing),
                    elapsed = %format_duration(state.elapsed()),
                    "run finished"
                ),
                Err(e) => error!(
                    stage = %state.stage(),
                    error = %e,
                    elapsed = %format_duration(state.elapsed()),
                    "run failed"
                ),
            }
            result
        }
        .instrument(span)
        .await
    }

    async fn execute(&self, state: &mut RunState) -> Result<RunOutcome> {
        state.enter(Stage::FetchingContext);
        let report = self.fetch_report(state).await?;
        let posts = self.fetch_posts(state).await?;
        info!(
            posts = posts.len(),
            words = report.homepage.word_count,
            articles = report.articles.len(),
            fetch_time = %format_duration(state.time_in(Stage::FetchingContext)),
            "context fetched"
        );

        loop {
            state.enter(Stage::SelectingTopic);
            let Some(topic) = select_topic(&self.roster, &posts, state.excluded(), &self.coverage) else {
                state.enter(Stage::NoTopicAvailable);
                let mut rejected: Vec<String> = state.excluded().iter().cloned().collect();
                rejected.sort();
                return Ok(RunOutcome::NoTopicAvailable { rejected });
            };
            info!(topic = %topic.id, name = %topic.display_name, "topic selected");

            state.enter(Stage::Generating);
            let raw = self.generate(state, topic, &report, &posts).await?;

            state.enter(Stage::Parsing);
            let suggestion = self.parser.parse(&raw);
            if suggestion.is_empty() {
                info!(topic = %topic.id, "nothing to suggest for topic, selecting another");
                state.exclude(&topic.id);
                continue;
            }
            if !suggestion.is_publishable() {
                warn!(
                    topic = %topic.id,
                    has_title = !suggestion.title.trim().is_empty(),
                    has_body = !suggestion.body.trim().is_empty(),
                    "suggestion lacks a title or body, selecting another topic"
                );
                state.exclude(&topic.id);
                continue;
            }

            state.enter(Stage::Guarding);
            if let Some(duplicate) = self.guard.check(&suggestion, &posts) {
                warn!(topic = %topic.id, title = %suggestion.title, reason = %duplicate, "suggestion rejected as duplicate");
                state.exclude(&topic.id);
                continue;
            }

            if self.dry_run {
                state.enter(Stage::Done);
                info!(topic = %topic.id, title = %suggestion.title, "dry run, not publishing");
                return Ok(RunOutcome::DryRun {
                    topic_id: topic.id.clone(),
                    suggestion,
                });
            }

            state.enter(Stage::Publishing);
            let post = NewPost {
                title: suggestion.title.clone(),
                body: suggestion.body.clone(),
                category: self.category.clone(),
            };
            let url = self.publish(state, &post).await?;

            state.enter(Stage::Done);
            return Ok(RunOutcome::Published {
                topic_id: topic.id.clone(),
                title: post.title,
                url,
            });
        }
    }

    async fn fetch_report(&self, state: &mut RunState) -> Result<SiteReport> {
        let source = &self.source;
        let url = self.site_url.as_str();
        self.fetch_retry
            .retry_if(
                "fetch_site",
                |_| {
                    state.record_attempt(Stage::FetchingContext);
                    source.report(url)
                },
                SuggesterError::is_retryable,
            )
            .await
    }

    // Listed on every attempt; the board is never cached between attempts or runs
    async fn fetch_posts(&self, state: &mut RunState) -> Result<Vec<ExistingPost>> {
        let board = &self.board;
        let category = self.category.as_str();
        self.fetch_retry
            .retry_if(
                "list_posts",
                |_| {
                    state.record_attempt(Stage::FetchingContext);
                    board.list_posts(category)
                },
                SuggesterError::is_retryable,
            )
            .await
    }

    async fn generate(
        &self,
        state: &mut RunState,
        topic: &Topic,
        report: &SiteReport,
        posts: &[ExistingPost],
    ) -> Result<String> {
        let request = GenerationRequest::new(topic, report, posts, &self.language);
        let generator = &self.generator;
        debug!(generator = %generator.generator_name(), topic = %topic.id, "requesting suggestion");

        self.generation_retry
            .retry_if(
                "generate",
                |_| {
                    state.record_attempt(Stage::Generating);
                    generator.generate(&request)
                },
                SuggesterError::is_retryable,
            )
            .await
    }

    async fn publish(&self, state: &mut RunState, post: &NewPost) -> Result<String> {
        self.publish_retry
            .retry_if(
                "publish",
                |attempt| {
                    state.record_attempt(Stage::Publishing);
                    async move {
                        // A failed attempt may still have created the post
                        if attempt > 1 {
                            if let Some(url) = self.find_published(post).await? {
                                info!(attempt = attempt, url = %url, "post already exists, not creating it again");
                                return Ok(url);
                            }
                        }
                        self.board.create_post(post).await
                    }
                },
                SuggesterError::is_retryable,
            )
            .await
    }

    async fn find_published(&self, post: &NewPost) -> Result<Option<String>> {
        let wanted = title_key(&post.title);
        let existing = self.board.list_posts(&post.category).await?;
        Ok(existing
            .into_iter()
            .find(|p| title_key(&p.title) == wanted)
            .map(|p| p.url.unwrap_or(p.id)))
    }
}

fn title_key(title: &str) -> String {
    normalize(title).split_whitespace().collect::<Vec<_>>().join(" ")
}
