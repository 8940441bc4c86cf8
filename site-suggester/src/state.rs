use std::collections::{HashMap, HashSet};
use std::fmt;
use std::time::Duration;
use tokio::time::Instant;
use tracing::debug;
use uuid::Uuid;

/// Where a run currently is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
    FetchingContext,
    SelectingTopic,
    Generating,
    Parsing,
    Guarding,
    Publishing,
    Done,
    NoTopicAvailable,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::FetchingContext => "fetching_context",
            Stage::SelectingTopic => "selecting_topic",
            Stage::Generating => "generating",
            Stage::Parsing => "parsing",
            Stage::Guarding => "guarding",
            Stage::Publishing => "publishing",
            Stage::Done => "done",
            Stage::NoTopicAvailable => "no_topic_available",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Bookkeeping for a single pipeline run. Dropped when the run ends.
#[derive(Debug)]
pub struct RunState {
    run_id: Uuid,
    started: Instant,
    stage: Stage,
    stage_started: Instant,
    excluded: HashSet<String>,
    attempts: HashMap<Stage, u32>,
    stage_time: HashMap<Stage, Duration>,
}

impl RunState {
    pub fn new() -> Self {
        let now = Instant::now();
        Self {
            run_id: Uuid::new_v4(),
            started: now,
            stage: Stage::FetchingContext,
            stage_started: now,
            excluded: HashSet::new(),
            attempts: HashMap::new(),
            stage_time: HashMap::new(),
        }
    }

    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    pub fn stage(&self) -> Stage {
        self.stage
    }

    /// Move to `next`, charging the time spent so far to the current stage.
    pub fn enter(&mut self, next: Stage) {
        let now = Instant::now();
        *self.stage_time.entry(self.stage).or_default() += now.duration_since(self.stage_started);
        debug!(run_id = %self.run_id, from = %self.stage, to = %next, "stage transition");
        self.stage = next;
        self.stage_started = now;
    }

    pub fn record_attempt(&mut self, stage: Stage) {
        *self.attempts.entry(stage).or_default() += 1;
    }

    pub fn attempts(&self, stage: Stage) -> u32 {
        self.attempts.get(&stage).copied().unwrap_or(0)
    }

    pub fn exclude(&mut self, topic_id: &str) {
        self.excluded.insert(topic_id.to_string());
    }

    pub fn excluded(&self) -> &HashSet<String> {
        &self.excluded
    }

    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    pub fn time_in(&self, stage: Stage) -> Duration {
        let mut total = self.stage_time.get(&stage).copied().unwrap_or_default();
        if stage == self.stage {
            total += self.stage_started.elapsed();
        }
        total
    }
}

impl Default for RunState {
    fn default() -> Self {
        Self::new()
    }
}
