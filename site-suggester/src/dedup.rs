use crate::similarity::similarity;
use crate::types::{ExistingPost, Suggestion, ThresholdPolicy};
use std::fmt;
use tracing::{debug, info};

/// The existing post a generated suggestion collided with.
#[derive(Debug, Clone, PartialEq)]
pub struct DuplicateMatch {
    pub post_id: String,
    pub post_title: String,
    pub similarity: f64,
    pub threshold: f64,
    pub rejected_post: bool,
}

impl DuplicateMatch {
    pub fn reason(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for DuplicateMatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "similar to post {} ({:?}): similarity {:.3} >= threshold {:.2}{}",
            self.post_id,
            self.post_title,
            self.similarity,
            self.threshold,
            if self.rejected_post { " (post was declined)" } else { "" }
        )
    }
}

/// Rejects generated suggestions whose wording is too close to an existing post.
pub struct DuplicateGuard {
    policy: ThresholdPolicy,
}

impl DuplicateGuard {
    pub fn new(policy: ThresholdPolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> &ThresholdPolicy {
        &self.policy
    }

    /// First existing post that the suggestion duplicates, if any.
    pub fn check(&self, suggestion: &Suggestion, posts: &[ExistingPost]) -> Option<DuplicateMatch> {
        let text = suggestion.text();

        for post in posts {
            let score = similarity(&text, &post.text());
            let threshold = self.policy.threshold_for(post);
            debug!(post = %post.id, score = score, threshold = threshold, "duplicate check");

            if score >= threshold {
                let found = DuplicateMatch {
                    post_id: post.id.clone(),
                    post_title: post.title.clone(),
                    similarity: score,
                    threshold,
                    rejected_post: self.policy.is_rejected(post),
                };
                info!("Suggestion rejected as duplicate: {}", found);
                return Some(found);
            }
        }

        None
    }

    /// `(true, reason)` on the first match, `(false, None)` otherwise.
    pub fn is_duplicate(&self, suggestion: &Suggestion, posts: &[ExistingPost]) -> (bool, Option<String>) {
        match self.check(suggestion, posts) {
            Some(found) => (true, Some(found.reason())),
            None => (false, None),
        }
    }
}

impl Default for DuplicateGuard {
    fn default() -> Self {
        Self::new(ThresholdPolicy::duplicate())
    }
}
