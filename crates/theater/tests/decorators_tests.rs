//! Decorator Integration Tests
//!
//! Decorators stacked the way applications stack them, exercised through the
//! public fluent API.

use anyhow::Result;
use rstest::rstest;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;
use theater::{
    Backoff, Behavior, BehaviorExt, Cause, CauseExt, Effect, FnBehavior, FnCause, TheaterError,
};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// Fails `failures` times, then yields `Some(attempt)` forever.
fn flaky(failures: u32, calls: &Arc<AtomicU32>) -> impl Cause {
    let calls = Arc::clone(calls);
    FnCause::new(move || {
        let attempt = calls.fetch_add(1, Ordering::SeqCst) + 1;
        if attempt <= failures {
            return Err(anyhow::anyhow!("attempt {attempt} failed").into());
        }
        Ok(Some(Effect::value(attempt)))
    })
}

/// Test that k retries absorb exactly k failures
#[rstest]
#[case(0)]
#[case(1)]
#[case(4)]
#[tokio::test]
async fn retry_cause_absorbs_k_failures(#[case] k: u32) -> Result<()> {
    let calls = Arc::new(AtomicU32::new(0));
    let cause = flaky(k, &calls).with_retry(k);

    let effect = cause.check(&CancellationToken::new()).await?.expect("effect");

    assert_eq!(effect.downcast_ref::<u32>(), Some(&(k + 1)));
    assert_eq!(calls.load(Ordering::SeqCst), k + 1);
    Ok(())
}

/// Test that k retries give up on the (k+1)th consecutive failure
#[rstest]
#[case(0)]
#[case(2)]
#[case(5)]
#[tokio::test]
async fn retry_cause_gives_up_after_k_plus_one(#[case] k: u32) {
    let calls = Arc::new(AtomicU32::new(0));
    let cause = flaky(u32::MAX, &calls).with_retry(k);

    let err = cause.check(&CancellationToken::new()).await.unwrap_err();

    assert_eq!(err.to_string(), format!("attempt {} failed", k + 1));
    assert_eq!(calls.load(Ordering::SeqCst), k + 1);
}

/// Test that a retried behavior runs exactly max_attempts times
#[rstest]
#[case(1)]
#[case(3)]
#[tokio::test]
async fn retry_behavior_runs_max_attempts(#[case] attempts: u32) -> Result<()> {
    let calls = Arc::new(AtomicU32::new(0));
    let counter = Arc::clone(&calls);
    let behavior = FnBehavior::new(move |_: &Effect| {
        counter.fetch_add(1, Ordering::SeqCst);
        Err(anyhow::anyhow!("sink unavailable").into())
    })
    .with_retry(attempts)?;

    let result = behavior
        .act(&Effect::value(()), &CancellationToken::new())
        .await;

    assert!(result.is_err());
    assert_eq!(calls.load(Ordering::SeqCst), attempts);
    Ok(())
}

/// Test that exponential backoff delays are actually waited out
#[tokio::test(start_paused = true)]
async fn retry_backoff_spaces_attempts() {
    let calls = Arc::new(AtomicU32::new(0));
    let cause = flaky(2, &calls).with_retry(2).with_backoff(Backoff::Exponential {
        initial: Duration::from_millis(100),
        base: 2.0,
        max: Duration::from_secs(10),
        jitter: false,
    });

    let started = Instant::now();
    let effect = cause.check(&CancellationToken::new()).await.unwrap();

    assert!(effect.is_some());
    assert!(started.elapsed() >= Duration::from_millis(300));
}

/// Test that suppression above retry turns exhausted retries into "nothing"
#[tokio::test]
async fn suppression_over_retry_swallows_final_failure() -> Result<()> {
    let calls = Arc::new(AtomicU32::new(0));
    let cause = flaky(u32::MAX, &calls).with_retry(2).with_suppression();

    assert!(cause.check(&CancellationToken::new()).await?.is_none());
    assert_eq!(calls.load(Ordering::SeqCst), 3);
    Ok(())
}

/// Test that suppression never hides cancellation
#[tokio::test]
async fn suppression_lets_cancellation_through() {
    let cause = FnCause::new(|| Err(TheaterError::Cancelled)).with_suppression();
    let err = cause.check(&CancellationToken::new()).await.unwrap_err();
    assert!(err.is_cancelled());
}

/// Test that required keeps asking until something turns up
#[tokio::test]
async fn required_over_poll_waits_for_a_value() -> Result<()> {
    let calls = Arc::new(AtomicU32::new(0));
    let counter = Arc::clone(&calls);
    let cause = FnCause::new(move || {
        let n = counter.fetch_add(1, Ordering::SeqCst) + 1;
        Ok((n == 4).then(|| Effect::value(n)))
    })
    .with_required();

    let effect = cause.check(&CancellationToken::new()).await?;
    assert_eq!(effect.and_then(|e| e.downcast_ref::<u32>().copied()), Some(4));
    Ok(())
}

/// Test that poll backoff only pauses after an empty check
#[tokio::test(start_paused = true)]
async fn poll_pauses_only_after_misses() -> Result<()> {
    let period = Duration::from_millis(500);
    let script = Arc::new(parking_lot::Mutex::new(vec![false, true, true, false]));
    let source = Arc::clone(&script);
    let cause = FnCause::new(move || {
        let mut script = source.lock();
        let found = if script.is_empty() { false } else { script.remove(0) };
        Ok(found.then(|| Effect::value(())))
    })
    .with_poll(period, true)?;
    let token = CancellationToken::new();

    // First check runs at once and misses.
    let started = Instant::now();
    assert!(cause.check(&token).await?.is_none());
    assert_eq!(started.elapsed(), Duration::ZERO);

    // After the miss, the next check waits a full period.
    assert!(cause.check(&token).await?.is_some());
    let after_miss = started.elapsed();
    assert!(after_miss >= period);

    // After a hit, no wait.
    assert!(cause.check(&token).await?.is_some());
    assert_eq!(started.elapsed(), after_miss);
    Ok(())
}

/// Test that descriptions show the decorator stack outermost first
#[test]
fn decorator_stack_is_described_outermost_first() -> Result<()> {
    let cause = FnCause::named("source", || Ok(None))
        .with_pause(Duration::from_secs(1), true)?
        .with_retry(3)
        .with_suppression();
    assert_eq!(cause.describe(), "Suppress>Retry>Pause>source");

    let behavior = FnBehavior::named("sink", |_: &Effect| Ok(()))
        .with_debug()
        .with_suppression();
    assert!(behavior.describe().starts_with("Suppress>Debug("));
    assert!(behavior.describe().ends_with(")>sink"));
    Ok(())
}
