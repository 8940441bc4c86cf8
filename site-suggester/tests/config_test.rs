use site_suggester::config::{DelayStrategy, GitHubConfig};
use site_suggester::fetcher::extract_snapshot;
use site_suggester::{
    AgentConfig, ExistingPost, GenerationRequest, GitHubDiscussions, Result, RetryPolicy, SiteReport, SuggesterError,
    Topic,
};
use std::collections::HashMap;
use std::time::Duration;
use tracing::info;

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::INFO)
        .try_init();
}

#[test]
fn test_defaults() -> Result<()> {
    let config = AgentConfig::default();
    config.validate()?;

    assert_eq!(config.schedule_interval(), Duration::from_secs(3600));
    assert_eq!(config.retry.fetch.policy(), RetryPolicy::fixed(3, Duration::from_secs(10)));
    assert_eq!(config.retry.generation.policy(), RetryPolicy::linear(3, Duration::from_secs(15)));
    assert_eq!(config.retry.publish.policy(), RetryPolicy::linear(3, Duration::from_secs(15)));
    assert_eq!(config.thresholds.coverage.normal, 0.25);
    assert_eq!(config.thresholds.coverage.rejected, 0.15);
    assert_eq!(config.thresholds.duplicate.normal, 0.35);
    assert_eq!(config.thresholds.duplicate.rejected, 0.20);
    assert_eq!(config.roster().len(), 10);
    Ok(())
}

#[test]
fn test_yaml_overrides_defaults() -> Result<()> {
    init_tracing();
    let yaml = r#"
site:
  url: https://docs.example.org
github:
  repo: acme/website
  category: Ideas
llm:
  base_url: http://localhost:11434/v1
  model: qwen2.5:14b
  language: Russian
schedule_interval_minutes: 180
retry:
  generation:
    max_attempts: 5
    delay_seconds: 30
    strategy: fixed
thresholds:
  duplicate:
    normal: 0.4
    rejected: 0.25
    rejection_labels: [not-planned]
topics:
  - id: speed
    display_name: Page speed
    analysis_focus: Look at page weight and caching.
    fingerprint_terms: [images, cache, lighthouse]
"#;

    let config = AgentConfig::from_yaml(yaml)?;
    config.validate()?;
    info!("Loaded: {:?}", config);

    assert_eq!(config.site.url, "https://docs.example.org");
    assert_eq!(config.site.timeout_seconds, 30, "unset fields keep their defaults");
    assert_eq!(config.github.repo, "acme/website");
    assert_eq!(config.github.category, "Ideas");
    assert_eq!(config.llm.model, "qwen2.5:14b");
    assert_eq!(config.llm.language, "Russian");
    assert_eq!(config.schedule_interval_minutes, 180);
    assert_eq!(config.retry.generation.strategy, DelayStrategy::Fixed);
    assert_eq!(config.retry.generation.policy().delays(), vec![Duration::from_secs(30); 4]);
    assert_eq!(config.retry.publish.policy(), RetryPolicy::linear(3, Duration::from_secs(15)));
    assert_eq!(config.thresholds.duplicate.rejection_labels, vec!["not-planned".to_string()]);
    assert_eq!(config.thresholds.coverage.normal, 0.25);

    let roster = config.roster();
    assert_eq!(roster.len(), 1);
    assert_eq!(
        roster.topics()[0],
        Topic::new("speed", "Page speed", "Look at page weight and caching.", &["images", "cache", "lighthouse"])
    );
    Ok(())
}

#[test]
fn test_empty_yaml_is_default() -> Result<()> {
    let config = AgentConfig::from_yaml("  \n")?;
    assert_eq!(config.github.category, AgentConfig::default().github.category);
    Ok(())
}

#[test]
fn test_environment_wins_over_file() -> Result<()> {
    let mut config = AgentConfig::from_yaml("github:\n  repo: acme/website\n")?;
    let env: HashMap<&str, &str> = [
        ("GITHUB_TOKEN", "ghp_test"),
        ("GITHUB_REPO", "acme/blog"),
        ("SITE_URL", "https://blog.example.net"),
        ("OPENROUTER_API_KEY", "sk-test"),
        ("OPENROUTER_MODEL", "some/model"),
        ("LOG_LEVEL", "debug"),
        ("DISCUSSIONS_CATEGORY", ""),
    ]
    .into_iter()
    .collect();

    config.apply_env(|key| env.get(key).map(|v| v.to_string()));
    config.validate()?;

    assert_eq!(config.github.token, "ghp_test");
    assert_eq!(config.github.repo, "acme/blog");
    assert_eq!(config.site.url, "https://blog.example.net");
    assert_eq!(config.llm.api_key, "sk-test");
    assert_eq!(config.llm.model, "some/model");
    assert_eq!(config.log_level, "debug");
    assert_eq!(config.github.category, "For Developers", "empty variables are ignored");

    let printed = format!("{:?}", config);
    assert!(!printed.contains("ghp_test"), "token leaked into debug output");
    assert!(!printed.contains("sk-test"), "api key leaked into debug output");
    Ok(())
}

#[test]
fn test_validation_errors() {
    let cases = [
        "github:\n  repo: no-slash\n",
        "github:\n  repo: acme/web/site\n",
        "site:\n  url: not a url\n",
        "thresholds:\n  coverage:\n    normal: 1.5\n    rejected: 0.1\n",
        "retry:\n  fetch:\n    max_attempts: 0\n    delay_seconds: 1\n    strategy: fixed\n",
        "schedule_interval_minutes: 0\n",
        "topics: []\n",
        "github:\n  page_size: 0\n",
        "github:\n  page_size: 500\n",
        "github:\n  max_pages: 0\n",
    ];

    for yaml in cases {
        let config = AgentConfig::from_yaml(yaml).expect("yaml parses");
        let result = config.validate();
        assert!(result.is_err(), "expected validation failure for {:?}", yaml);
        assert!(!result.unwrap_err().is_retryable());
    }

    // Partial threshold sections are rejected rather than silently mixed with defaults
    assert!(matches!(
        AgentConfig::from_yaml("thresholds:\n  duplicate:\n    normal: 0.5\n"),
        Err(SuggesterError::Yaml(_))
    ));
}

#[test]
fn test_extract_snapshot() -> Result<()> {
    let html = r#"<!DOCTYPE html>
<html>
<head>
  <title>Example &amp; Co | Blog</title>
  <meta charset="utf-8">
  <meta name="description" content="Notes on Rust &amp; the web">
  <style>body { color: grey; }</style>
</head>
<body>
  <nav><a href="/">Home</a> <a href="/about#team">About</a></nav>
  <main>
    <h1>Latest posts</h1>
    <h2 class="post">Writing a <em>parser</em></h2>
    <p>Parsing is fun. <a href="/posts/parser">Read more</a> or see <a href="https://other.example.com/x">elsewhere</a>.</p>
    <p><a href='/about'>About us</a> <a href="mailto:me@example.com">mail</a></p>
    <script>var tracking = "ignored words here";</script>
  </main>
  <footer>Copyright</footer>
</body>
</html>"#;

    let snapshot = extract_snapshot("https://example.com/", html)?;
    info!("Snapshot: {:?}", snapshot);

    assert_eq!(snapshot.title, "Example & Co | Blog");
    assert_eq!(snapshot.meta_description, "Notes on Rust & the web");
    assert_eq!(snapshot.headings, vec!["h1: Latest posts".to_string(), "h2: Writing a parser".to_string()]);
    assert_eq!(
        snapshot.links,
        vec![
            "https://example.com/".to_string(),
            "https://example.com/about".to_string(),
            "https://example.com/posts/parser".to_string(),
        ]
    );
    assert!(snapshot.content_excerpt.starts_with("Latest posts Writing a parser"));
    assert!(!snapshot.content_excerpt.contains("tracking"));
    assert!(!snapshot.content_excerpt.contains("Copyright"));
    assert_eq!(snapshot.word_count, snapshot.content_excerpt.split_whitespace().count());
    Ok(())
}

#[test]
fn test_generation_request_digest() -> Result<()> {
    let topic = Topic::new("seo", "Search visibility", "Check meta descriptions.", &["sitemap"]);
    let snapshot = extract_snapshot("https://example.com", "<title>Home</title><body>Hello world</body>")?;
    let report = SiteReport {
        sitemap_url_count: 12,
        robots_txt: "User-agent: *".to_string(),
        ..SiteReport::from(snapshot)
    };
    let posts: Vec<ExistingPost> = (0..40)
        .map(|i| ExistingPost {
            id: i.to_string(),
            title: format!("Existing idea {}", i),
            ..Default::default()
        })
        .collect();

    let request = GenerationRequest::new(&topic, &report, &posts, "Russian");
    let prompt = request.user_prompt()?;

    assert_eq!(request.existing_titles.len(), 30);
    assert!(prompt.contains("Search visibility"));
    assert!(prompt.contains("Check meta descriptions."));
    assert!(prompt.contains("- Existing idea 0"));
    assert!(!prompt.contains("Existing idea 35"));
    assert!(prompt.contains("\"title\": \"Home\""));
    assert!(prompt.contains("\"sitemap_url_count\": 12"));
    assert!(prompt.contains("User-agent: *"));
    assert!(request.system_prompt().contains("Russian"));
    Ok(())
}

#[test]
fn test_github_client_requires_token_and_repo() {
    let missing_token = GitHubDiscussions::new(&GitHubConfig::default(), Vec::new());
    assert!(matches!(missing_token, Err(SuggesterError::MissingCredential(_))));

    let bad_repo = GitHubDiscussions::new(
        &GitHubConfig {
            token: "ghp_test".to_string(),
            repo: "no-slash".to_string(),
            ..GitHubConfig::default()
        },
        Vec::new(),
    );
    assert!(matches!(bad_repo, Err(SuggesterError::Config(_))));

    let ok = GitHubDiscussions::new(
        &GitHubConfig {
            token: "ghp_test".to_string(),
            ..GitHubConfig::default()
        },
        vec!["wontfix".to_string()],
    );
    assert!(ok.is_ok());
}
