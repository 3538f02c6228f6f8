//! Property and concurrency tests for the bounded channel

use std::sync::Arc;
use std::time::Duration;

use coopsync::channel::{Channel, PopError, PushError};
use coopsync::timeout::Timeout;
use proptest::prelude::*;

proptest! {
    #[test]
    fn prop_capacity_bounds_non_blocking_pushes(capacity in 1usize..16, values in prop::collection::vec(any::<u32>(), 0..40)) {
        let chan = Channel::new(capacity).unwrap();

        let mut accepted = Vec::new();
        for v in &values {
            match chan.try_push(*v) {
                Ok(()) => accepted.push(*v),
                Err(PushError::Timeout(back)) => {
                    prop_assert_eq!(back, *v);
                }
                Err(PushError::Closed(_)) => {
                    prop_assert!(false, "channel is open");
                }
            }
            prop_assert!(chan.len() <= capacity);
        }

        prop_assert_eq!(accepted.len(), values.len().min(capacity));
        prop_assert_eq!(&accepted[..], &values[..accepted.len()]);
        prop_assert_eq!(chan.is_full(), values.len() >= capacity);
    }

    #[test]
    fn prop_drain_after_close_is_fifo(capacity in 1usize..16, values in prop::collection::vec(any::<i64>(), 0..16)) {
        let chan = Channel::new(capacity).unwrap();
        let queued: Vec<_> = values.iter().copied().take(capacity).collect();
        for v in &queued {
            chan.try_push(*v).unwrap();
        }
        chan.close();

        let mut drained = Vec::new();
        while let Ok(v) = chan.try_pop() {
            drained.push(v);
        }
        prop_assert_eq!(drained, queued);
        prop_assert_eq!(chan.try_pop(), Err(PopError::Closed));
    }
}

#[tokio::test(start_paused = true)]
async fn test_full_channel_push_waits_for_pop_or_close() {
    let chan = Arc::new(Channel::new(2).unwrap());
    chan.try_push(1).unwrap();
    chan.try_push(2).unwrap();
    assert_eq!(chan.push(3, Timeout::Poll).await, Err(PushError::Timeout(3)));

    let blocked: Vec<_> = (10..13)
        .map(|v| {
            let chan = chan.clone();
            tokio::spawn(async move { chan.push(v, Timeout::Forever).await })
        })
        .collect();
    tokio::time::sleep(Duration::from_millis(1)).await;
    assert_eq!(chan.stats().producers, 3);

    // One pop frees exactly one slot
    assert_eq!(chan.pop(Timeout::Poll).await, Ok(1));
    tokio::time::sleep(Duration::from_millis(1)).await;
    assert_eq!(chan.stats().producers, 2);
    assert!(chan.is_full());

    // Close releases the rest
    chan.close();
    let mut closed = 0;
    for handle in blocked {
        if handle.await.unwrap().is_err() {
            closed += 1;
        }
    }
    assert_eq!(closed, 2);
    assert_eq!(chan.stats().producers, 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_close_releases_consumers_across_threads() {
    let chan = Arc::new(Channel::<u64>::new(4).unwrap());
    let consumers: Vec<_> = (0..32)
        .map(|_| {
            let chan = chan.clone();
            tokio::spawn(async move { chan.pop(Timeout::Forever).await })
        })
        .collect();

    while chan.stats().consumers < 32 {
        tokio::task::yield_now().await;
    }
    chan.close();

    let results = tokio::time::timeout(Duration::from_secs(5), futures::future::join_all(consumers))
        .await
        .expect("every consumer must wake on close");
    for result in results {
        assert_eq!(result.unwrap(), Err(PopError::Closed));
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_producers_and_consumers_exchange_everything() {
    let chan = Arc::new(Channel::new(3).unwrap());

    let producers: Vec<_> = (0..4u64)
        .map(|p| {
            let chan = chan.clone();
            tokio::spawn(async move {
                for i in 0..250 {
                    chan.push(p * 1000 + i, Timeout::Forever).await.unwrap();
                }
            })
        })
        .collect();
    let consumer = {
        let chan = chan.clone();
        tokio::spawn(async move {
            let mut sum = 0u64;
            let count = chan.pop_loop(|v| sum += v).await;
            (count, sum)
        })
    };

    for producer in producers {
        producer.await.unwrap();
    }
    chan.close();

    let (count, sum) = consumer.await.unwrap();
    let expected: u64 = (0..4u64).map(|p| (0..250).map(|i| p * 1000 + i).sum::<u64>()).sum();
    assert_eq!(count, 1000);
    assert_eq!(sum, expected);
}
