use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// What the page reader hands back for one URL.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct PageSnapshot {
    pub url: String,
    pub title: String,
    pub meta_description: String,
    pub word_count: usize,
    pub headings: Vec<String>,
    pub links: Vec<String>,
    pub content_excerpt: String,
    #[serde(default)]
    pub structured_data: StructuredData,
    #[serde(default)]
    pub headers: ResponseHeaders,
}

/// Machine-readable metadata embedded in a page.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StructuredData {
    /// `og:*` properties
    pub open_graph: BTreeMap<String, String>,
    /// `twitter:*` card tags
    pub twitter: BTreeMap<String, String>,
    /// `@type` of every JSON-LD block that decoded
    pub json_ld_types: Vec<String>,
    pub canonical: String,
    /// RSS or Atom feed advertised by a `<link rel="alternate">`
    pub feed_url: String,
    pub lang: String,
}

/// Response headers that matter for caching, compression and security advice.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResponseHeaders {
    pub cache_control: String,
    pub content_encoding: String,
    pub server: String,
    pub strict_transport_security: String,
    pub content_security_policy: String,
    pub x_frame_options: String,
    pub content_type: String,
}

/// The homepage plus the site-wide checks around it.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct SiteReport {
    pub homepage: PageSnapshot,
    /// A sample of article pages found through the sitemap
    pub articles: Vec<PageSnapshot>,
    pub sitemap_url_count: usize,
    pub sitemap_urls: Vec<String>,
    pub robots_txt: String,
    /// Advertised feed, or one found at a well-known path
    pub feed_url: Option<String>,
}

impl From<PageSnapshot> for SiteReport {
    fn from(homepage: PageSnapshot) -> Self {
        let feed_url = Some(homepage.structured_data.feed_url.clone()).filter(|f| !f.is_empty());
        Self {
            homepage,
            feed_url,
            ..Default::default()
        }
    }
}

/// A prior publication on the discussion board.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct ExistingPost {
    pub id: String,
    pub title: String,
    pub body: String,
    pub resolution_label: Option<String>,
    pub url: Option<String>,
}

impl ExistingPost {
    pub fn text(&self) -> String {
        format!("{} {}", self.title, self.body)
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Suggestion {
    pub title: String,
    pub body: String,
}

impl Suggestion {
    pub fn new(title: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            body: body.into(),
        }
    }

    /// Both fields empty means "nothing to suggest for this topic".
    pub fn is_empty(&self) -> bool {
        self.title.trim().is_empty() && self.body.trim().is_empty()
    }

    /// A post needs both a title and a body.
    pub fn is_publishable(&self) -> bool {
        !self.title.trim().is_empty() && !self.body.trim().is_empty()
    }

    pub fn text(&self) -> String {
        format!("{} {}", self.title, self.body)
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct NewPost {
    pub title: String,
    pub body: String,
    pub category: String,
}

// Object style note:
// These are snapshots. A pipeline run reads them fresh from the collaborators
// and drops them when the run ends; nothing here is meant to be cached or
// mutated across runs.
