use crate::similarity::similarity;
use crate::types::{ExistingPost, ThresholdPolicy};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use tracing::debug;

/// A predefined analysis subject.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Topic {
    pub id: String,
    pub display_name: String,
    pub analysis_focus: String,
    pub fingerprint_terms: Vec<String>,
}

impl Topic {
    pub fn new(id: &str, display_name: &str, analysis_focus: &str, terms: &[&str]) -> Self {
        Self {
            id: id.to_string(),
            display_name: display_name.to_string(),
            analysis_focus: analysis_focus.to_string(),
            fingerprint_terms: terms.iter().map(|t| t.to_string()).collect(),
        }
    }

    /// Synthetic text used to test whether existing posts already cover this topic.
    pub fn fingerprint(&self) -> String {
        let mut text = self.fingerprint_terms.join(" ");
        if !text.is_empty() {
            text.push(' ');
        }
        text.push_str(&self.display_name);
        text
    }
}

/// Fixed, ordered list of topics. Earlier entries win when several are uncovered.
#[derive(Debug, Clone)]
pub struct TopicRoster {
    topics: Vec<Topic>,
}

impl TopicRoster {
    pub fn new(topics: Vec<Topic>) -> Self {
        Self { topics }
    }

    pub fn topics(&self) -> &[Topic] {
        &self.topics
    }

    pub fn len(&self) -> usize {
        self.topics.len()
    }

    pub fn is_empty(&self) -> bool {
        self.topics.is_empty()
    }

    pub fn get(&self, id: &str) -> Option<&Topic> {
        self.topics.iter().find(|t| t.id == id)
    }
}

impl Default for TopicRoster {
    fn default() -> Self {
        Self::new(vec![
            Topic::new(
                "translation",
                "Translation quality",
                "Look for translation errors, awkward phrasing, untranslated fragments and terminology that is used inconsistently across articles.",
                &["translation", "translated", "wording", "terminology", "grammar", "перевод", "ошибки перевода"],
            ),
            Topic::new(
                "navigation",
                "Navigation and UX",
                "Assess how readers move through the site: menus, breadcrumbs, pagination, search and links between related articles.",
                &["navigation", "menu", "breadcrumbs", "pagination", "search", "usability", "навигация"],
            ),
            Topic::new(
                "seo",
                "SEO and metadata",
                "Check titles, meta descriptions, canonical URLs, Open Graph tags, structured data and the sitemap.",
                &["seo", "meta description", "canonical", "open graph", "structured data", "sitemap", "метаданные"],
            ),
            Topic::new(
                "visual-design",
                "Visual design",
                "Review typography, spacing, colour contrast, dark mode and how images are laid out in articles.",
                &["design", "typography", "layout", "colors", "contrast", "dark mode", "оформление"],
            ),
            Topic::new(
                "content-structure",
                "Content structure",
                "Evaluate article structure: headings hierarchy, introductions, summaries, reading time and table of contents.",
                &["headings", "structure", "table of contents", "summary", "reading time", "структура"],
            ),
            Topic::new(
                "broken-links",
                "Broken links and images",
                "Find links and images that fail to load, redirect loops and references to missing pages.",
                &["broken links", "missing images", "404", "dead links", "redirects", "битые ссылки"],
            ),
            Topic::new(
                "taxonomy",
                "Categories and tags",
                "Inspect how categories and tags are assigned and whether the taxonomy pages help readers find related content.",
                &["categories", "tags", "taxonomy", "archive", "categorization", "категории", "теги"],
            ),
            Topic::new(
                "performance",
                "Page performance",
                "Look at page weight, image sizes, caching headers, compression and anything that slows down the first render.",
                &["performance", "page speed", "caching", "compression", "image size", "lazy loading", "скорость"],
            ),
            Topic::new(
                "accessibility",
                "Accessibility",
                "Check alt text, keyboard navigation, ARIA landmarks, language attributes and readable font sizes.",
                &["accessibility", "alt text", "keyboard", "aria", "screen reader", "доступность"],
            ),
            Topic::new(
                "feeds-feedback",
                "Feeds and reader feedback",
                "Review RSS availability, subscription options, comments and other ways readers can give feedback.",
                &["rss", "feed", "subscription", "comments", "feedback", "newsletter", "обратная связь"],
            ),
        ])
    }
}

/// True when any post is lexically close enough to the topic's fingerprint.
pub fn is_covered(topic: &Topic, posts: &[ExistingPost], policy: &ThresholdPolicy) -> bool {
    let fingerprint = topic.fingerprint();

    posts.iter().any(|post| {
        let score = similarity(&fingerprint, &post.text());
        let threshold = policy.threshold_for(post);
        if score >= threshold {
            debug!(
                topic = %topic.id,
                post = %post.id,
                score = score,
                threshold = threshold,
                "topic covered by existing post"
            );
            true
        } else {
            false
        }
    })
}

/// First roster topic that is neither excluded nor covered.
pub fn select_topic<'a>(
    roster: &'a TopicRoster,
    posts: &[ExistingPost],
    excluded: &HashSet<String>,
    policy: &ThresholdPolicy,
) -> Option<&'a Topic> {
    roster
        .topics()
        .iter()
        .filter(|topic| !excluded.contains(&topic.id))
        .find(|topic| !is_covered(topic, posts, policy))
}
