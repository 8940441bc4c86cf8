use crate::config::SiteConfig;
use crate::traits::PageSource;
use crate::types::{PageSnapshot, ResponseHeaders, Result, SiteReport, StructuredData, SuggesterError};
use crate::utils::text::{single_line, truncate_chars, truncate_to_char_boundary};
use crate::utils::url::same_site_link;
use async_trait::async_trait;
use quick_xml::events::Event;
use quick_xml::Reader;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT_ENCODING};
use reqwest::Client;
use scraper::{ElementRef, Html, Selector};
use serde_json::Value;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::LazyLock;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};
use url::Url;

const MAX_LINKS: usize = 50;
const MAX_EXCERPT_BYTES: usize = 3000;
const MAX_REPORTED_SITEMAP_URLS: usize = 50;
const MAX_ROBOTS_CHARS: usize = 2000;
const FEED_PATHS: [&str; 3] = ["/index.xml", "/feed.xml", "/rss.xml"];
const NOISE_TAGS: [&str; 5] = ["script", "style", "noscript", "nav", "footer"];
const NON_ARTICLE_SEGMENTS: [&str; 3] = ["/tags/", "/categories/", "/page/"];

fn selector(css: &str) -> Selector {
    Selector::parse(css).expect("static selector is valid")
}

static TITLE: LazyLock<Selector> = LazyLock::new(|| selector("title"));
static META_DESCRIPTION: LazyLock<Selector> = LazyLock::new(|| selector(r#"meta[name="description"]"#));
static HEADINGS: LazyLock<Selector> = LazyLock::new(|| selector("h1, h2, h3, h4"));
static ANCHORS: LazyLock<Selector> = LazyLock::new(|| selector("a[href]"));
static CONTENT_ROOTS: LazyLock<[Selector; 3]> = LazyLock::new(|| [selector("main"), selector("article"), selector("body")]);
static META_PROPERTY: LazyLock<Selector> = LazyLock::new(|| selector("meta[property][content]"));
static META_NAME: LazyLock<Selector> = LazyLock::new(|| selector("meta[name][content]"));
static JSON_LD: LazyLock<Selector> = LazyLock::new(|| selector(r#"script[type="application/ld+json"]"#));
static CANONICAL: LazyLock<Selector> = LazyLock::new(|| selector(r#"link[rel="canonical"][href]"#));
static FEED_LINK: LazyLock<Selector> = LazyLock::new(|| {
    selector(r#"link[type="application/rss+xml"][href], link[type="application/atom+xml"][href]"#)
});
static HTML_ROOT: LazyLock<Selector> = LazyLock::new(|| selector("html"));

/// Reads pages of the reviewed site over HTTP.
pub struct PageFetcher {
    client: Client,
    // Without decompression, so `Content-Encoding` survives for header analysis
    raw_client: Client,
    config: SiteConfig,
}

impl PageFetcher {
    pub fn new(config: SiteConfig) -> Result<Self> {
        let client = Client::builder()
            .user_agent(&config.user_agent)
            .timeout(Duration::from_secs(config.timeout_seconds))
            .gzip(true)
            .deflate(true)
            .brotli(true)
            .redirect(reqwest::redirect::Policy::limited(config.max_redirects))
            .build()?;

        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT_ENCODING, HeaderValue::from_static("gzip, deflate, br"));
        let raw_client = Client::builder()
            .user_agent(&config.user_agent)
            .timeout(Duration::from_secs(config.timeout_seconds))
            .default_headers(headers)
            .no_gzip()
            .no_deflate()
            .no_brotli()
            .redirect(reqwest::redirect::Policy::limited(config.max_redirects))
            .build()?;

        Ok(Self {
            client,
            raw_client,
            config,
        })
    }

    async fn fetch_html(&self, url: &str) -> Result<String> {
        let response = self.client.get(url).send().await?;
        let status = response.status();

        if !status.is_success() {
            return Err(SuggesterError::HttpStatus {
                status: status.as_u16(),
                url: url.to_string(),
            });
        }

        if let Some(content_length) = response.content_length() {
            let size_mb = content_length as usize / (1024 * 1024);
            if size_mb > self.config.max_page_size_mb {
                return Err(SuggesterError::General(format!("Page too large: {}MB", size_mb)));
            }
        }

        Ok(response.text().await?)
    }

    /// Body of an auxiliary resource; a failure is logged and reported as `None`.
    async fn fetch_optional(&self, url: &str) -> Option<String> {
        match self.fetch_html(url).await {
            Ok(body) => Some(body),
            Err(e) => {
                warn!(url = url, error = %e, "optional resource unavailable");
                None
            }
        }
    }

    async fn analyze_headers(&self, url: &str) -> ResponseHeaders {
        match self.raw_client.get(url).send().await {
            Ok(response) => response_headers(response.headers()),
            Err(e) => {
                warn!(url = url, error = %e, "header analysis failed");
                ResponseHeaders::default()
            }
        }
    }

    async fn find_feed(&self, base: &Url) -> Option<String> {
        for path in FEED_PATHS {
            let Ok(candidate) = base.join(path) else {
                continue;
            };
            match self.client.head(candidate.as_str()).send().await {
                Ok(response) if response.status().is_success() => return Some(candidate.to_string()),
                Ok(response) => debug!(url = %candidate, status = response.status().as_u16(), "no feed"),
                Err(e) => debug!(url = %candidate, error = %e, "feed check failed"),
            }
        }
        None
    }
}

#[async_trait]
impl PageSource for PageFetcher {
    fn source_name(&self) -> String {
        format!("HTTP page fetcher ({})", self.config.user_agent)
    }

    async fn snapshot(&self, url: &str) -> Result<PageSnapshot> {
        let start_time = Instant::now();
        debug!("Fetching page: {}", url);

        let html = self.fetch_html(url).await?;
        let snapshot = extract_snapshot(url, &html)?;

        info!(
            url = url,
            title = %snapshot.title,
            word_count = snapshot.word_count,
            links = snapshot.links.len(),
            headings = snapshot.headings.len(),
            response_time_ms = start_time.elapsed().as_millis() as u64,
            "page fetched"
        );
        Ok(snapshot)
    }

    async fn report(&self, url: &str) -> Result<SiteReport> {
        let start_time = Instant::now();
        let base = Url::parse(url)?;

        let mut homepage = self.snapshot(url).await?;
        homepage.headers = self.analyze_headers(url).await;

        let sitemap_urls = match base.join("/sitemap.xml") {
            Ok(sitemap) => self
                .fetch_optional(sitemap.as_str())
                .await
                .map(|xml| parse_sitemap(&xml))
                .unwrap_or_default(),
            Err(_) => Vec::new(),
        };

        let mut articles = Vec::new();
        for article_url in article_candidates(&sitemap_urls, url, self.config.max_articles) {
            match self.snapshot(&article_url).await {
                Ok(article) => articles.push(article),
                Err(e) => warn!(url = %article_url, error = %e, "article fetch failed, skipping"),
            }
        }

        let robots_txt = match base.join("/robots.txt") {
            Ok(robots) => self
                .fetch_optional(robots.as_str())
                .await
                .map(|text| truncate_chars(text.trim(), MAX_ROBOTS_CHARS))
                .unwrap_or_default(),
            Err(_) => String::new(),
        };

        let feed_url = match homepage.structured_data.feed_url.as_str() {
            "" => self.find_feed(&base).await,
            advertised => Some(advertised.to_string()),
        };

        info!(
            url = url,
            sitemap_pages = sitemap_urls.len(),
            articles = articles.len(),
            has_open_graph = !homepage.structured_data.open_graph.is_empty(),
            has_json_ld = !homepage.structured_data.json_ld_types.is_empty(),
            has_robots = !robots_txt.is_empty(),
            has_feed = feed_url.is_some(),
            elapsed_ms = start_time.elapsed().as_millis() as u64,
            "site report built"
        );

        Ok(SiteReport {
            homepage,
            articles,
            sitemap_url_count: sitemap_urls.len(),
            sitemap_urls: sitemap_urls.into_iter().take(MAX_REPORTED_SITEMAP_URLS).collect(),
            robots_txt,
            feed_url,
        })
    }
}

/// Reduce an HTML document to the snapshot the generation service sees.
///
/// Response headers are not part of the document and are left empty.
pub fn extract_snapshot(url: &str, html: &str) -> Result<PageSnapshot> {
    let base = Url::parse(url)?;
    let document = Html::parse_document(html);

    let title = document
        .select(&TITLE)
        .next()
        .map(element_text)
        .unwrap_or_default();

    let meta_description = document
        .select(&META_DESCRIPTION)
        .next()
        .and_then(|el| el.value().attr("content"))
        .map(single_line)
        .unwrap_or_default();

    let headings = document
        .select(&HEADINGS)
        .filter_map(|el| {
            let text = element_text(el);
            (!text.is_empty()).then(|| format!("{}: {}", el.value().name(), text))
        })
        .collect();

    let mut links: Vec<String> = Vec::new();
    for anchor in document.select(&ANCHORS) {
        let Some(link) = anchor.value().attr("href").and_then(|href| same_site_link(&base, href)) else {
            continue;
        };
        if !links.contains(&link) {
            links.push(link);
        }
        if links.len() >= MAX_LINKS {
            break;
        }
    }

    let content = CONTENT_ROOTS
        .iter()
        .find_map(|sel| document.select(sel).next())
        .map(visible_text)
        .unwrap_or_else(|| visible_text(document.root_element()));
    let word_count = content.split_whitespace().count();

    Ok(PageSnapshot {
        url: url.to_string(),
        title,
        meta_description,
        word_count,
        headings,
        links,
        content_excerpt: truncate_to_char_boundary(&content, MAX_EXCERPT_BYTES).to_string(),
        structured_data: extract_structured_data(&base, &document),
        headers: ResponseHeaders::default(),
    })
}

fn extract_structured_data(base: &Url, document: &Html) -> StructuredData {
    let mut data = StructuredData::default();

    for meta in document.select(&META_PROPERTY) {
        let (Some(property), Some(content)) = (meta.value().attr("property"), meta.value().attr("content")) else {
            continue;
        };
        if property.starts_with("og:") && !content.trim().is_empty() {
            data.open_graph.insert(property.to_string(), content.trim().to_string());
        }
    }

    for meta in document.select(&META_NAME) {
        let (Some(name), Some(content)) = (meta.value().attr("name"), meta.value().attr("content")) else {
            continue;
        };
        if name.starts_with("twitter:") && !content.trim().is_empty() {
            data.twitter.insert(name.to_string(), content.trim().to_string());
        }
    }

    for script in document.select(&JSON_LD) {
        let raw: String = script.text().collect();
        match serde_json::from_str::<Value>(&raw) {
            Ok(value) => collect_json_ld_types(&value, &mut data.json_ld_types),
            Err(e) => debug!(error = %e, "skipping JSON-LD block that does not decode"),
        }
    }

    let absolute = |href: &str| base.join(href.trim()).map(|u| u.to_string()).unwrap_or_default();

    if let Some(href) = document.select(&CANONICAL).next().and_then(|el| el.value().attr("href")) {
        data.canonical = absolute(href);
    }
    if let Some(href) = document.select(&FEED_LINK).next().and_then(|el| el.value().attr("href")) {
        data.feed_url = absolute(href);
    }
    if let Some(lang) = document.select(&HTML_ROOT).next().and_then(|el| el.value().attr("lang")) {
        data.lang = lang.trim().to_string();
    }

    data
}

fn collect_json_ld_types(value: &Value, types: &mut Vec<String>) {
    match value {
        Value::Array(items) => items.iter().for_each(|item| collect_json_ld_types(item, types)),
        Value::Object(object) => {
            match object.get("@type") {
                Some(Value::String(t)) => types.push(t.clone()),
                Some(Value::Array(ts)) => types.extend(ts.iter().filter_map(|t| t.as_str()).map(String::from)),
                _ => {}
            }
            if let Some(graph) = object.get("@graph") {
                collect_json_ld_types(graph, types);
            }
        }
        _ => {}
    }
}

fn element_text(element: ElementRef<'_>) -> String {
    single_line(&element.text().collect::<Vec<_>>().join(" "))
}

/// Text under `element`, skipping scripts, styles and page chrome.
fn visible_text(element: ElementRef<'_>) -> String {
    let mut text = String::new();
    push_visible_text(element, &mut text);
    single_line(&text)
}

fn push_visible_text(element: ElementRef<'_>, out: &mut String) {
    for child in element.children() {
        if let Some(child_element) = ElementRef::wrap(child) {
            if !NOISE_TAGS.contains(&child_element.value().name()) {
                push_visible_text(child_element, out);
            }
        } else if let Some(text) = child.value().as_text() {
            out.push_str(text);
            out.push(' ');
        }
    }
}

/// Headers worth reporting, read from a response that was not decompressed.
pub fn response_headers(headers: &HeaderMap) -> ResponseHeaders {
    let get = |name: &str| {
        headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
            .to_string()
    };

    ResponseHeaders {
        cache_control: get("cache-control"),
        content_encoding: get("content-encoding"),
        server: get("server"),
        strict_transport_security: get("strict-transport-security"),
        content_security_policy: get("content-security-policy"),
        x_frame_options: get("x-frame-options"),
        content_type: get("content-type"),
    }
}

/// Every `<loc>` of a sitemap or sitemap index, in document order.
///
/// Malformed XML keeps whatever was read before the error.
pub fn parse_sitemap(xml: &str) -> Vec<String> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);

    let mut urls = Vec::new();
    let mut in_loc = false;
    loop {
        match reader.read_event() {
            Ok(Event::Start(tag)) if tag.local_name().as_ref() == b"loc" => in_loc = true,
            Ok(Event::End(tag)) if tag.local_name().as_ref() == b"loc" => in_loc = false,
            Ok(Event::Text(text)) if in_loc => match text.unescape() {
                Ok(loc) if !loc.trim().is_empty() => urls.push(loc.trim().to_string()),
                Ok(_) => {}
                Err(e) => debug!(error = %e, "skipping undecodable sitemap entry"),
            },
            Ok(Event::Eof) => break,
            Err(e) => {
                warn!(position = reader.buffer_position(), error = %e, "sitemap is not well-formed");
                break;
            }
            _ => {}
        }
    }
    urls
}

/// Up to `max` sitemap URLs that look like articles of the site at `site_url`.
///
/// The homepage, taxonomy listings, pagination and nested sitemaps are skipped.
pub fn article_candidates(sitemap_urls: &[String], site_url: &str, max: usize) -> Vec<String> {
    let Ok(site) = Url::parse(site_url) else {
        return Vec::new();
    };
    let homepage = site_url.trim_end_matches('/');

    sitemap_urls
        .iter()
        .filter(|u| u.trim_end_matches('/') != homepage)
        .filter(|u| {
            Url::parse(u)
                .map(|parsed| parsed.host_str() == site.host_str())
                .unwrap_or(false)
        })
        .filter(|u| !NON_ARTICLE_SEGMENTS.iter().any(|segment| u.contains(segment)))
        .filter(|u| !u.ends_with(".xml"))
        .take(max)
        .cloned()
        .collect()
}

/// Serves a fixed snapshot, optionally failing the first few calls.
pub struct StaticPageSource {
    snapshot: PageSnapshot,
    failures_left: AtomicUsize,
    calls: AtomicUsize,
}

impl StaticPageSource {
    pub fn new(snapshot: PageSnapshot) -> Self {
        Self {
            snapshot,
            failures_left: AtomicUsize::new(0),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn failing_first(self, failures: usize) -> Self {
        self.failures_left.store(failures, Ordering::SeqCst);
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PageSource for StaticPageSource {
    fn source_name(&self) -> String {
        format!("Static page source ({})", self.snapshot.url)
    }

    async fn snapshot(&self, url: &str) -> Result<PageSnapshot> {
        self.calls.fetch_add(1, Ordering::SeqCst);

        let failing = self
            .failures_left
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failing {
            return Err(SuggesterError::HttpStatus {
                status: 503,
                url: url.to_string(),
            });
        }

        let mut snapshot = self.snapshot.clone();
        snapshot.url = url.to_string();
        Ok(snapshot)
    }
}
