//! Composite Cause Integration Tests
//!
//! - queue batching and ordering
//! - revolver fairness
//! - multi-timer scheduling
//! - bus bridge feeding a running character

use anyhow::Result;
use proptest::prelude::*;
use std::sync::Arc;
use std::time::Duration;
use theater::{
    BridgeCause, Bus, Cause, CauseExt, Character, Effect, FnBehavior, FnCause, MultiTimerCause,
    PushMessage, QueueCause, RevolverCause, TaskCharacter,
};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

fn block_on<F: std::future::Future>(future: F) -> F::Output {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .expect("test runtime")
        .block_on(future)
}

/// Drain a batched queue, returning the size of every batch and the values in
/// the order they came out.
async fn drain(queue: &QueueCause<u32>) -> (Vec<usize>, Vec<u32>) {
    let token = CancellationToken::new();
    let mut sizes = Vec::new();
    let mut values = Vec::new();

    while let Some(effect) = queue.check(&token).await.expect("queue never fails") {
        let batch = effect.as_batch().expect("batched mode yields batches");
        sizes.push(batch.len());
        values.extend(batch.iter().filter_map(|e| e.downcast_ref::<u32>().copied()));
    }
    (sizes, values)
}

proptest! {
    #[test]
    fn queue_batches_preserve_order(count in 0usize..200, batch_size in 1usize..16) {
        let queue = QueueCause::<u32>::batched(batch_size).unwrap();
        queue.enqueue_all(0..count as u32);

        let (sizes, values) = block_on(drain(&queue));

        prop_assert_eq!(sizes.len(), count.div_ceil(batch_size));
        prop_assert!(sizes.iter().all(|size| (1..=batch_size).contains(size)));
        prop_assert_eq!(values, (0..count as u32).collect::<Vec<_>>());
        prop_assert!(queue.is_empty());
    }

    #[test]
    fn revolver_serves_every_chamber_equally(chambers in 1usize..8, rounds in 1usize..10) {
        let revolver = RevolverCause::with_chambers((0..chambers).map(|index| {
            Arc::new(FnCause::new(move || Ok(Some(Effect::value(index))))) as Arc<dyn Cause>
        }));

        let served = block_on(async {
            let token = CancellationToken::new();
            let mut served = vec![0usize; chambers];
            for _ in 0..chambers * rounds {
                let effect = revolver.check(&token).await.unwrap().unwrap();
                served[*effect.downcast_ref::<usize>().unwrap()] += 1;
            }
            served
        });

        prop_assert!(served.iter().all(|&count| count == rounds));
    }
}

/// Test that an idle chamber does not block a busy one behind it
#[tokio::test]
async fn revolver_skips_idle_chambers() -> Result<()> {
    let idle: Arc<dyn Cause> = Arc::new(FnCause::named("idle", || Ok(None)));
    let busy: Arc<dyn Cause> = Arc::new(FnCause::named("busy", || Ok(Some(Effect::value(7u8)))));
    let revolver = RevolverCause::with_chambers([Arc::clone(&idle), busy]);
    assert!(!revolver.add_chamber(idle));
    assert_eq!(revolver.chamber_count(), 2);

    let token = CancellationToken::new();
    for _ in 0..5 {
        let effect = revolver.check(&token).await?.expect("busy chamber");
        assert_eq!(effect.downcast_ref::<u8>(), Some(&7));
    }
    Ok(())
}

/// Test that each interval fires on its own schedule
#[tokio::test(start_paused = true)]
async fn multi_timer_fires_intervals_in_due_order() -> Result<()> {
    let timer = MultiTimerCause::blocking()
        .with_interval(Duration::from_millis(300))?
        .with_interval(Duration::from_millis(500))?;
    let token = CancellationToken::new();
    let started = Instant::now();

    let mut fired = Vec::new();
    for _ in 0..4 {
        let effect = timer.check(&token).await?.expect("blocking timer always fires");
        let elapsed = effect.as_timer().expect("timer effect");
        fired.push((elapsed.interval.as_millis(), started.elapsed().as_millis()));
    }

    let intervals: Vec<_> = fired.iter().map(|(interval, _)| *interval).collect();
    assert_eq!(intervals, vec![300, 500, 300, 500]);
    for ((_, at), expected) in fired.iter().zip([0, 0, 300, 500]) {
        assert!(*at >= expected && *at < expected + 10, "fired at {at}ms, expected {expected}ms");
    }
    Ok(())
}

/// Test that a blocking timer fires as soon as an interval is registered
#[tokio::test(start_paused = true)]
async fn blocking_timer_fires_at_registration() -> Result<()> {
    let period = Duration::from_secs(3600);
    let timer = MultiTimerCause::blocking().with_interval(period)?;
    let token = CancellationToken::new();
    let started = Instant::now();

    let first = timer.check(&token).await?.expect("blocking timer always fires");
    assert_eq!(started.elapsed(), Duration::ZERO);
    assert_eq!(first.as_timer().map(|t| t.elapsed), Some(started));

    timer.check(&token).await?.expect("blocking timer always fires");
    assert!(started.elapsed() >= period);
    assert!(started.elapsed() < period + Duration::from_millis(10));
    Ok(())
}

/// Test that a non-blocking timer reports nothing until an interval is due
#[tokio::test(start_paused = true)]
async fn non_blocking_timer_returns_none_before_due() -> Result<()> {
    let timer = MultiTimerCause::non_blocking().with_interval(Duration::from_secs(1))?;
    let token = CancellationToken::new();

    assert!(timer.check(&token).await?.is_none());
    tokio::time::advance(Duration::from_secs(1)).await;
    assert!(timer.check(&token).await?.is_some());
    assert!(timer.check(&token).await?.is_none());
    Ok(())
}

/// Test the full push-to-pull path: bus message in, behavior act out
#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn bridge_feeds_a_running_character() -> Result<()> {
    let bus = Bus::new();
    let bridge = Arc::new(BridgeCause::<String>::new());
    bridge.attach(&bus);

    let received = Arc::new(parking_lot::Mutex::new(Vec::new()));
    let sink = Arc::clone(&received);
    let character = TaskCharacter::new(
        Arc::clone(&bridge).with_required(),
        FnBehavior::new(move |effect: &Effect| {
            if let Some(text) = effect.downcast_ref::<String>() {
                sink.lock().push(text.clone());
            }
            Ok(())
        }),
    )?;
    character.start().await?;

    for word in ["check", "then", "act"] {
        bus.send(PushMessage::new(word.to_string()));
    }

    let delivered = tokio::time::timeout(Duration::from_secs(5), async {
        while received.lock().len() < 3 {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await;
    assert!(delivered.is_ok(), "bridge did not deliver every push");
    assert_eq!(*received.lock(), vec!["check", "then", "act"]);

    character.dispose().await?;
    assert!(bridge.detach(&bus));
    Ok(())
}

/// Test that a blocked bridge check honours cancellation
#[tokio::test]
async fn bridge_wait_is_cancellable() {
    let bridge = Arc::new(BridgeCause::<u32>::new());
    let token = CancellationToken::new();
    let canceller = token.clone();
    tokio::spawn(async move {
        tokio::task::yield_now().await;
        canceller.cancel();
    });

    let err = bridge.check(&token).await.unwrap_err();
    assert!(err.is_cancelled());
}
