use site_suggester::retry::LinearBackoff;
use site_suggester::{Result, RetryPolicy, SuggesterError};
use backoff::backoff::Backoff;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;
use tokio::time::Instant;
use tracing::info;

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::INFO)
        .try_init();
}

#[tokio::test(start_paused = true)]
async fn test_recovers_after_two_failures_without_trailing_sleep() -> Result<()> {
    init_tracing();
    let policy = RetryPolicy::linear(3, Duration::from_secs(15));
    let calls = AtomicU32::new(0);
    let started = Instant::now();

    let value = policy
        .retry("flaky", |attempt| {
            calls.fetch_add(1, Ordering::SeqCst);
            async move {
                if attempt < 3 {
                    Err(SuggesterError::Generation(format!("attempt {} failed", attempt)))
                } else {
                    Ok("done")
                }
            }
        })
        .await?;

    let elapsed = started.elapsed();
    info!("Recovered after {:?}", elapsed);
    assert_eq!(value, "done");
    assert_eq!(calls.load(Ordering::SeqCst), 3);
    // 15s after the first failure, 30s after the second, nothing after the success
    assert!(elapsed >= Duration::from_secs(45), "slept too little: {:?}", elapsed);
    assert!(elapsed < Duration::from_secs(46), "slept after the final attempt: {:?}", elapsed);
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_first_attempt_success_never_sleeps() -> Result<()> {
    let policy = RetryPolicy::linear(3, Duration::from_secs(15));
    let started = Instant::now();

    let value = policy.retry("steady", |_| async { Ok::<_, SuggesterError>(7) }).await?;

    assert_eq!(value, 7);
    assert_eq!(started.elapsed(), Duration::ZERO);
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_exhausted_attempts_return_last_error() {
    init_tracing();
    let policy = RetryPolicy::fixed(3, Duration::from_secs(10));
    let calls = AtomicU32::new(0);
    let started = Instant::now();

    let result: Result<()> = policy
        .retry("always_down", |attempt| {
            calls.fetch_add(1, Ordering::SeqCst);
            async move { Err(SuggesterError::Platform(format!("outage on attempt {}", attempt))) }
        })
        .await;

    let elapsed = started.elapsed();
    assert_eq!(calls.load(Ordering::SeqCst), 3);
    match result {
        Err(SuggesterError::Platform(message)) => assert_eq!(message, "outage on attempt 3"),
        other => panic!("expected the last platform error, got {:?}", other),
    }
    assert!(elapsed >= Duration::from_secs(20) && elapsed < Duration::from_secs(21), "elapsed {:?}", elapsed);
}

#[tokio::test(start_paused = true)]
async fn test_non_retryable_error_stops_immediately() {
    let policy = RetryPolicy::linear(5, Duration::from_secs(15));
    let calls = AtomicU32::new(0);
    let started = Instant::now();

    let result: Result<()> = policy
        .retry_if(
            "publish",
            |_| {
                calls.fetch_add(1, Ordering::SeqCst);
                async {
                    Err(SuggesterError::CategoryNotFound {
                        category: "Ideas".to_string(),
                        available: vec!["General".to_string()],
                    })
                }
            },
            SuggesterError::is_retryable,
        )
        .await;

    assert!(matches!(result, Err(SuggesterError::CategoryNotFound { .. })));
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert_eq!(started.elapsed(), Duration::ZERO);
}

#[tokio::test(start_paused = true)]
async fn test_single_attempt_policy() {
    let calls = AtomicU32::new(0);

    let result: Result<()> = RetryPolicy::none()
        .retry("once", |_| {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(SuggesterError::General("boom".to_string())) }
        })
        .await;

    assert!(result.is_err());
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[test]
fn test_delay_sequences() {
    assert_eq!(
        RetryPolicy::linear(4, Duration::from_secs(15)).delays(),
        vec![Duration::from_secs(15), Duration::from_secs(30), Duration::from_secs(45)]
    );
    assert_eq!(
        RetryPolicy::fixed(3, Duration::from_secs(10)).delays(),
        vec![Duration::from_secs(10), Duration::from_secs(10)]
    );
    assert!(RetryPolicy::none().delays().is_empty());

    let mut backoff = LinearBackoff::new(Duration::from_millis(100));
    assert_eq!(backoff.next_backoff(), Some(Duration::from_millis(100)));
    assert_eq!(backoff.next_backoff(), Some(Duration::from_millis(200)));
    backoff.reset();
    assert_eq!(backoff.next_backoff(), Some(Duration::from_millis(100)));
}

#[test]
fn test_error_classification() {
    assert!(SuggesterError::Generation("timeout".to_string()).is_retryable());
    assert!(SuggesterError::HttpStatus { status: 503, url: "https://example.com".to_string() }.is_retryable());
    assert!(SuggesterError::Platform("rate limited".to_string()).is_retryable());
    assert!(!SuggesterError::MissingCredential("GITHUB_TOKEN".to_string()).is_retryable());
    assert!(!SuggesterError::Config("bad repo".to_string()).is_retryable());
}
