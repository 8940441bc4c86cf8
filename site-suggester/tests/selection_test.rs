use site_suggester::{
    is_covered, select_topic, similarity, DuplicateGuard, ExistingPost, Result, Suggestion, ThresholdPolicy, Topic,
    TopicRoster,
};
use std::collections::HashSet;
use tracing::info;

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::INFO)
        .try_init();
}

fn roster() -> TopicRoster {
    TopicRoster::new(vec![
        Topic::new(
            "navigation",
            "Navigation",
            "Review menus and breadcrumbs.",
            &["menu", "navigation", "breadcrumbs"],
        ),
        Topic::new(
            "seo",
            "Search visibility",
            "Review meta tags and the sitemap.",
            &["meta description", "sitemap", "search engine"],
        ),
        Topic::new(
            "accessibility",
            "Accessibility",
            "Review contrast and alt text.",
            &["contrast", "alt text", "screen reader"],
        ),
    ])
}

fn post(id: &str, title: &str, body: &str, label: Option<&str>) -> ExistingPost {
    ExistingPost {
        id: id.to_string(),
        title: title.to_string(),
        body: body.to_string(),
        resolution_label: label.map(|l| l.to_string()),
        url: None,
    }
}

#[test]
fn test_similarity_properties() {
    init_tracing();

    let text = "Add breadcrumbs to long article series";
    assert_eq!(similarity(text, text), 1.0, "identical text must score 1.0");
    assert_eq!(similarity(text, ""), 0.0, "empty side must score 0.0");
    assert_eq!(similarity("", ""), 0.0);

    let other = "Breadcrumb trail for the article archive";
    assert_eq!(similarity(text, other), similarity(other, text), "similarity must be symmetric");

    let score = similarity(text, other);
    assert!(score > 0.0 && score < 1.0, "partial overlap should be strictly between 0 and 1, got {}", score);

    // Words shorter than three characters contribute nothing
    assert_eq!(similarity("to be or", "to be or"), 0.0);
}

#[test]
fn test_similarity_ignores_case_and_punctuation() {
    assert_eq!(similarity("Sitemap, RSS & Feeds!", "sitemap rss feeds"), 1.0);
    assert_eq!(similarity("НАВИГАЦИЯ по сайту", "навигация, по сайту."), 1.0);
}

#[test]
fn test_select_first_topic_when_board_is_empty() {
    init_tracing();
    let roster = roster();

    let selected = select_topic(&roster, &[], &HashSet::new(), &ThresholdPolicy::coverage());

    assert_eq!(selected.map(|t| t.id.as_str()), Some("navigation"));
}

#[test]
fn test_covered_topic_is_skipped() {
    init_tracing();
    let roster = roster();
    let first = &roster.topics()[0];
    let posts = vec![post("17", "Menu", &first.fingerprint(), None)];

    assert!(is_covered(first, &posts, &ThresholdPolicy::coverage()));
    let selected = select_topic(&roster, &posts, &HashSet::new(), &ThresholdPolicy::coverage());

    info!("Selected topic: {:?}", selected.map(|t| &t.id));
    assert_eq!(selected.map(|t| t.id.as_str()), Some("seo"));
}

#[test]
fn test_excluded_topic_is_never_returned() {
    let roster = roster();
    let excluded: HashSet<String> = ["navigation".to_string(), "seo".to_string()].into_iter().collect();

    for _ in 0..5 {
        let selected = select_topic(&roster, &[], &excluded, &ThresholdPolicy::coverage());
        assert_eq!(selected.map(|t| t.id.as_str()), Some("accessibility"));
    }

    let everything: HashSet<String> = roster.topics().iter().map(|t| t.id.clone()).collect();
    assert!(select_topic(&roster, &[], &everything, &ThresholdPolicy::coverage()).is_none());
}

#[test]
fn test_rejected_post_covers_at_lower_similarity() {
    init_tracing();
    let topic = Topic::new("nav", "Navigation", "", &["menu", "navigation", "breadcrumbs"]);
    let text = "navigation menu proposal for mobile layouts and sticky headers on small screens";
    let score = similarity(&topic.fingerprint(), text);
    info!("Fingerprint similarity: {:.3}", score);
    assert!(
        (0.15..0.25).contains(&score),
        "fixture should fall between the two thresholds, got {:.3}",
        score
    );

    let policy = ThresholdPolicy::coverage();
    assert!(!is_covered(&topic, &[post("1", "", text, None)], &policy));
    assert!(is_covered(&topic, &[post("1", "", text, Some("wontfix"))], &policy));
    assert!(is_covered(&topic, &[post("1", "", text, Some("Declined"))], &policy));

    // Labels outside the configured taxonomy keep the normal threshold
    let custom = ThresholdPolicy::coverage().with_rejection_labels(vec!["not-planned".to_string()]);
    assert!(!is_covered(&topic, &[post("1", "", text, Some("wontfix"))], &custom));
    assert!(is_covered(&topic, &[post("1", "", text, Some("not-planned"))], &custom));
}

#[test]
fn test_default_roster() {
    let roster = TopicRoster::default();
    assert_eq!(roster.len(), 10);

    let ids: HashSet<&str> = roster.topics().iter().map(|t| t.id.as_str()).collect();
    assert_eq!(ids.len(), roster.len(), "topic ids must be unique");
    assert!(roster.get("accessibility").is_some());
    assert!(roster.topics().iter().all(|t| !t.fingerprint_terms.is_empty()));
}

#[test]
fn test_identical_suggestion_is_duplicate() -> Result<()> {
    init_tracing();
    let guard = DuplicateGuard::default();
    let posts = vec![
        post("3", "Dark mode", "Offer a dark colour scheme for night reading.", None),
        post("42", "Add breadcrumbs to article pages", "Readers lose track of where they are in long series.", None),
    ];
    let suggestion = Suggestion::new(
        "Add breadcrumbs to article pages",
        "Readers lose track of where they are in long series.",
    );

    let (duplicate, reason) = guard.is_duplicate(&suggestion, &posts);

    assert!(duplicate);
    let reason = reason.unwrap_or_default();
    info!("Duplicate reason: {}", reason);
    assert!(reason.contains("42"), "reason should name the matching post: {}", reason);
    Ok(())
}

#[test]
fn test_unrelated_suggestion_passes_guard() {
    let guard = DuplicateGuard::default();
    let posts = vec![post("3", "Dark mode", "Offer a dark colour scheme for night reading.", None)];
    let suggestion = Suggestion::new("Publish an XML sitemap", "Search engines cannot find the older articles.");

    assert_eq!(guard.is_duplicate(&suggestion, &posts), (false, None));
    assert!(guard.check(&suggestion, &[]).is_none());
}

#[test]
fn test_declined_post_blocks_looser_matches() {
    let guard = DuplicateGuard::default();
    let suggestion = Suggestion::new("Breadcrumbs", "Show breadcrumbs above every article for orientation.");
    let body = "Show a breadcrumb trail on category pages, tags and the archive";
    let score = similarity(&suggestion.text(), &format!("Navigation trail {}", body));
    assert!((0.20..0.35).contains(&score), "fixture out of range: {:.3}", score);

    assert!(guard.check(&suggestion, &[post("9", "Navigation trail", body, None)]).is_none());

    let found = guard
        .check(&suggestion, &[post("9", "Navigation trail", body, Some("wontfix"))])
        .expect("declined post should match");
    assert_eq!(found.post_id, "9");
    assert!(found.rejected_post);
    assert_eq!(found.threshold, 0.20);
}
