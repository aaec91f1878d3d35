
use std::collections::HashSet;
use std::sync::Arc;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use dispatcher::error::DispatcherError;
use dispatcher::scheduler::{SlotQueue, WorkItem};
use dispatcher::storage::Store;
use test_harness::TestQueue;

#[tokio::test]
async fn test_inserts_fill_distinct_slots_round_robin() {
    let tq = TestQueue::new(5).await;

    let slots = tq.fill(&[(1, 1), (1, 2), (2, 1), (3, 7), (4, 4)]).await;
    assert_eq!(slots, vec![0, 1, 2, 3, 4]);

    assert_eq!(tq.queue.occupancy().await.unwrap(), 5);
    assert_eq!(tq.queue.available_space().await.unwrap(), 0);
    assert_eq!(tq.mailbox.pending_count().await.unwrap(), 0);
}

#[tokio::test]
async fn test_freed_slot_is_found_by_forward_scan() {
    let tq = TestQueue::new(3).await;
    tq.fill(&[(1, 1), (1, 2), (1, 3)]).await;

    assert!(tq.queue.delete_slot(1).await.unwrap());
    assert_eq!(tq.queue.available_space().await.unwrap(), 1);

    // Cursor wrapped to 0 after the last insert; slot 0 is taken, 1 is free.
    let outcome = tq.queue.insert(WorkItem::new(9, 9)).await.unwrap();
    assert_eq!(outcome.slot, 1);
    assert!(outcome.evicted.is_none());
}

#[tokio::test]
async fn test_cursor_does_not_restart_at_zero() {
    let tq = TestQueue::new(4).await;
    tq.fill(&[(1, 1), (1, 2)]).await;

    // Slot 0 frees up, but the scan resumes after the last written slot.
    tq.queue.delete_slot(0).await.unwrap();
    let outcome = tq.queue.insert(WorkItem::new(5, 5)).await.unwrap();
    assert_eq!(outcome.slot, 2);
}

#[tokio::test]
async fn test_full_queue_evicts_smallest_pair() {
    let tq = TestQueue::new(3).await;
    let slots = tq.fill(&[(3, 1), (1, 2), (2, 5)]).await;
    let victim_slot = slots[1];

    let outcome = tq.queue.insert(WorkItem::new(5, 7)).await.unwrap();

    assert_eq!(outcome.slot, victim_slot);
    let evicted = outcome.evicted.expect("full insert must evict");
    assert_eq!(evicted.item, WorkItem::new(1, 2));
    assert!(evicted.removal_time >= evicted.arrival_time);

    assert_eq!(tq.queue.occupancy().await.unwrap(), 3);
    let items: HashSet<WorkItem> = tq.items().await.into_iter().collect();
    assert!(items.contains(&WorkItem::new(5, 7)));
    assert!(!items.contains(&WorkItem::new(1, 2)));
    assert_eq!(tq.mailbox.pending_count().await.unwrap(), 1);
}

#[tokio::test]
async fn test_eviction_ignores_arrival_order() {
    let tq = TestQueue::new(2).await;
    // (9, 9) arrives first but (1, 1) has the smaller pair.
    tq.fill(&[(9, 9), (1, 1)]).await;

    let outcome = tq.queue.insert(WorkItem::new(4, 4)).await.unwrap();
    assert_eq!(outcome.evicted.unwrap().item, WorkItem::new(1, 1));

    let outcome = tq.queue.insert(WorkItem::new(6, 6)).await.unwrap();
    assert_eq!(outcome.evicted.unwrap().item, WorkItem::new(4, 4));

    let mut items = tq.items().await;
    items.sort_by_key(|i| i.order_key());
    assert_eq!(items, vec![WorkItem::new(6, 6), WorkItem::new(9, 9)]);
}

#[tokio::test]
async fn test_request_id_breaks_source_ties() {
    let tq = TestQueue::new(3).await;
    tq.fill(&[(2, 9), (2, 3), (3, 0)]).await;

    let oldest = tq.queue.pop_oldest().await.unwrap().unwrap();
    assert_eq!(oldest.item, WorkItem::new(2, 3));
}

#[tokio::test]
async fn test_pop_oldest_does_not_remove() {
    let tq = TestQueue::new(4).await;
    assert!(tq.queue.pop_oldest().await.unwrap().is_none());

    let slots = tq.fill(&[(7, 1), (2, 2), (2, 1)]).await;

    let first = tq.queue.pop_oldest().await.unwrap().unwrap();
    let second = tq.queue.pop_oldest().await.unwrap().unwrap();
    assert_eq!(first, second);
    assert_eq!(first.item, WorkItem::new(2, 1));
    assert_eq!(first.slot, slots[2]);
    assert_eq!(tq.queue.occupancy().await.unwrap(), 3);
}

#[tokio::test]
async fn test_delete_slot_is_idempotent() {
    let tq = TestQueue::new(2).await;
    let slots = tq.fill(&[(1, 1)]).await;

    assert!(tq.queue.delete_slot(slots[0]).await.unwrap());
    assert!(!tq.queue.delete_slot(slots[0]).await.unwrap());
    assert!(!tq.queue.delete_slot(1).await.unwrap());
    assert_eq!(tq.queue.occupancy().await.unwrap(), 0);
}

#[tokio::test]
async fn test_delete_entry_spares_a_reused_slot() {
    let tq = TestQueue::new(1).await;
    tq.fill(&[(1, 1)]).await;
    let looked_up = tq.queue.pop_oldest().await.unwrap().unwrap();

    // Eviction hands slot 0 to a newer item before the delete lands.
    tq.queue.insert(WorkItem::new(2, 2)).await.unwrap();

    assert!(!tq.queue.delete_entry(&looked_up).await.unwrap());
    assert_eq!(tq.items().await, vec![WorkItem::new(2, 2)]);

    let current = tq.queue.pop_oldest().await.unwrap().unwrap();
    assert!(tq.queue.delete_entry(&current).await.unwrap());
    assert!(!tq.queue.delete_entry(&current).await.unwrap());
    assert_eq!(tq.queue.occupancy().await.unwrap(), 0);
}

#[tokio::test]
async fn test_zero_capacity_is_rejected() {
    let store = Arc::new(Store::in_memory());
    let result = SlotQueue::open(store, 0).await;
    assert!(matches!(result, Err(DispatcherError::Config(_))));
}

#[tokio::test]
async fn test_random_operations_match_model() {
    const N: u32 = 6;
    let tq = TestQueue::new(N).await;
    let mut rng = StdRng::seed_from_u64(0x5107);
    let mut model: Vec<WorkItem> = Vec::new();

    for _ in 0..500 {
        if rng.gen_bool(0.7) {
            let item = WorkItem::new(rng.gen_range(0..5), rng.gen_range(0..20));
            let outcome = tq.queue.insert(item).await.unwrap();

            if model.len() == N as usize {
                let (idx, _) = model
                    .iter()
                    .enumerate()
                    .min_by_key(|(_, i)| i.order_key())
                    .unwrap();
                let expected = model.remove(idx);
                assert_eq!(outcome.evicted.map(|e| e.item), Some(expected));
            } else {
                assert!(outcome.evicted.is_none());
            }
            model.push(item);
        } else if let Some(oldest) = tq.queue.pop_oldest().await.unwrap() {
            assert!(tq.queue.delete_slot(oldest.slot).await.unwrap());
            let idx = model.iter().position(|i| *i == oldest.item).unwrap();
            model.remove(idx);
        }

        let entries = tq.queue.entries().await.unwrap();
        assert_eq!(tq.queue.occupancy().await.unwrap() as usize, model.len());
        assert_eq!(entries.len(), model.len());

        let slots: HashSet<u32> = entries.iter().map(|e| e.slot).collect();
        assert_eq!(slots.len(), entries.len(), "two entries share a slot");
        assert!(slots.iter().all(|&s| s < N));

        let mut live: Vec<_> = entries.iter().map(|e| e.item.order_key()).collect();
        let mut expected: Vec<_> = model.iter().map(|i| i.order_key()).collect();
        live.sort();
        expected.sort();
        assert_eq!(live, expected);
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_inserts_claim_distinct_slots() {
    const K: u32 = 48;
    let tq = TestQueue::new(64).await;

    let mut handles = Vec::new();
    for i in 0..K {
        let queue = tq.queue.clone();
        handles.push(tokio::spawn(async move {
            queue.insert(WorkItem::new(i % 4, i)).await.unwrap()
        }));
    }

    let mut slots = HashSet::new();
    for handle in handles {
        let outcome = handle.await.unwrap();
        assert!(outcome.evicted.is_none());
        assert!(slots.insert(outcome.slot), "slot {} claimed twice", outcome.slot);
    }

    assert_eq!(slots.len(), K as usize);
    assert_eq!(tq.queue.occupancy().await.unwrap(), K);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_inserts_into_full_queue_keep_capacity() {
    let tq = TestQueue::new(8).await;
    tq.fill(&[(0, 0), (0, 1), (0, 2), (0, 3), (0, 4), (0, 5), (0, 6), (0, 7)])
        .await;

    let mut handles = Vec::new();
    for i in 0..16 {
        let queue = tq.queue.clone();
        handles.push(tokio::spawn(async move {
            queue.insert(WorkItem::new(10, i)).await.unwrap()
        }));
    }
    for handle in handles {
        assert!(handle.await.unwrap().evicted.is_some());
    }

    assert_eq!(tq.queue.occupancy().await.unwrap(), 8);
    // Every pre-filled entry had a smaller pair than the newcomers.
    assert!(tq.items().await.iter().all(|i| i.source_id == 10));
    // 16 evictions landed in the mailbox.
    assert_eq!(tq.mailbox.pending_count().await.unwrap(), 16);
}

#[tokio::test]
async fn test_queue_survives_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("queue.json");

    {
        let store = Arc::new(Store::open(&path).await.unwrap());
        assert!(store.is_persistent());
        let queue = SlotQueue::open(store, 3).await.unwrap();
        queue.insert(WorkItem::new(1, 1)).await.unwrap();
        queue.insert(WorkItem::new(2, 2)).await.unwrap();
    }

    let store = Arc::new(Store::open(&path).await.unwrap());
    let queue = SlotQueue::open(store, 3).await.unwrap();
    assert_eq!(queue.occupancy().await.unwrap(), 2);
    assert_eq!(
        queue.pop_oldest().await.unwrap().unwrap().item,
        WorkItem::new(1, 1)
    );

    // The allocation cursor is persisted with the entries.
    let outcome = queue.insert(WorkItem::new(3, 3)).await.unwrap();
    assert_eq!(outcome.slot, 2);
}

#[tokio::test]
async fn test_reopen_with_smaller_capacity_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("queue.json");

    {
        let store = Arc::new(Store::open(&path).await.unwrap());
        let queue = SlotQueue::open(store, 5).await.unwrap();
        for i in 0..5 {
            queue.insert(WorkItem::new(i, i)).await.unwrap();
        }
    }

    let store = Arc::new(Store::open(&path).await.unwrap());
    let result = SlotQueue::open(store, 3).await;
    assert!(matches!(result, Err(DispatcherError::Config(_))));
}

#[tokio::test]
async fn test_corrupt_snapshot_fails_to_open() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("queue.json");
    std::fs::write(&path, b"{ not json").unwrap();

    let result = Store::open(&path).await;
    assert!(matches!(result, Err(DispatcherError::Snapshot(_))));
}
