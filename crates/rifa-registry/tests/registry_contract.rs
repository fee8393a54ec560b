// SPDX-License-Identifier: Apache-2.0

use rifa_model::TicketNumber;
use rifa_registry::{RegistryConfig, RegistryEvent, SellError, TicketRegistry, ToggleError};
use rifa_store::{MemoryStore, StoreError};
use std::sync::Arc;
use std::time::Duration;

fn test_config() -> RegistryConfig {
    RegistryConfig {
        poll_interval: Duration::from_millis(10),
        ..RegistryConfig::default()
    }
}

fn registry() -> TicketRegistry {
    TicketRegistry::new(Arc::new(MemoryStore::default()), test_config())
}

fn n(value: i64) -> TicketNumber {
    TicketNumber::parse(value).expect("test ticket number")
}

#[tokio::test]
async fn second_sell_reports_the_first_buyer() {
    let reg = registry();
    reg.sell(5, "Ana", "0414").await.expect("first sell");
    match reg.sell(5, "Luis", "").await {
        Err(SellError::AlreadySold { existing_buyer }) => assert_eq!(existing_buyer, "Ana"),
        other => panic!("expected AlreadySold, got {other:?}"),
    }
}

#[tokio::test]
async fn boundary_numbers_sell_and_out_of_range_is_rejected() {
    let reg = registry();
    assert!(reg.sell(0, "A", "").await.is_ok());
    assert!(reg.sell(99, "B", "").await.is_ok());
    assert!(matches!(
        reg.sell(-1, "A", "").await,
        Err(SellError::InvalidInput(_))
    ));
    assert!(matches!(
        reg.sell(100, "A", "").await,
        Err(SellError::InvalidInput(_))
    ));
}

#[tokio::test]
async fn empty_buyer_is_rejected_before_any_write() {
    let store = Arc::new(MemoryStore::default());
    let reg = TicketRegistry::new(store.clone(), test_config());
    assert!(matches!(
        reg.sell(5, "", "123").await,
        Err(SellError::InvalidInput(_))
    ));
    assert_eq!(
        store.write_calls.load(std::sync::atomic::Ordering::Relaxed),
        0
    );
}

#[tokio::test]
async fn over_length_buyer_and_phone_are_rejected() {
    let reg = registry();
    assert!(matches!(
        reg.sell(5, &"x".repeat(21), "").await,
        Err(SellError::InvalidInput(_))
    ));
    assert!(matches!(
        reg.sell(5, "Ana", &"1".repeat(12)).await,
        Err(SellError::InvalidInput(_))
    ));
}

#[tokio::test]
async fn paid_toggles_both_ways_and_is_idempotent() {
    let reg = registry();
    reg.sell(7, "Ana", "0414").await.expect("sell");

    reg.set_paid(7, true).await.expect("mark paid");
    reg.set_paid(7, true).await.expect("idempotent re-mark");
    reg.wait_ready().await;
    let mut watch = reg.subscribe();
    let snapshot = wait_until(&mut watch, |s| {
        s.get(n(7)).is_some_and(|t| t.paid)
    })
    .await;
    let ticket = snapshot.get(n(7)).expect("sold ticket");
    assert!(ticket.paid);
    assert_eq!(ticket.buyer.as_str(), "Ana");
    assert_eq!(ticket.phone.as_str(), "0414");

    reg.set_paid(7, false).await.expect("unmark paid");
    let snapshot = wait_until(&mut watch, |s| {
        s.get(n(7)).is_some_and(|t| !t.paid)
    })
    .await;
    assert!(!snapshot.get(n(7)).expect("sold ticket").paid);
}

#[tokio::test]
async fn toggle_before_sale_is_not_sold() {
    let reg = registry();
    assert!(matches!(
        reg.set_paid(42, true).await,
        Err(ToggleError::NotSold)
    ));
}

#[tokio::test]
async fn end_to_end_board_counts() {
    let reg = registry();
    reg.wait_ready().await;

    let mut watch = reg.subscribe();
    let initial = watch.current();
    assert_eq!(initial.sold_count(), 0);
    assert_eq!(initial.remaining(), 100);

    reg.sell(3, "Luis", "04121112222").await.expect("sell");
    let snapshot = wait_until(&mut watch, |s| s.is_sold(n(3))).await;
    assert_eq!(snapshot.sold_count(), 1);
    assert_eq!(snapshot.remaining(), 99);
    let ticket = snapshot.get(n(3)).expect("sold ticket");
    assert_eq!(ticket.buyer.as_str(), "Luis");
    assert_eq!(ticket.phone.as_str(), "04121112222");
    assert!(!ticket.paid);
}

#[tokio::test]
async fn concurrent_sells_for_one_number_yield_exactly_one_sale() {
    let reg = Arc::new(registry());
    let a = {
        let reg = reg.clone();
        tokio::spawn(async move { reg.sell(5, "Ana", "").await })
    };
    let b = {
        let reg = reg.clone();
        tokio::spawn(async move { reg.sell(5, "Luis", "").await })
    };
    let (a, b) = (a.await.expect("join"), b.await.expect("join"));
    let successes = [&a, &b].iter().filter(|r| r.is_ok()).count();
    assert_eq!(successes, 1, "exactly one concurrent sell may win");
    let loser = if a.is_ok() { b } else { a };
    assert!(matches!(loser, Err(SellError::AlreadySold { .. })));
}

#[tokio::test]
async fn slow_store_surfaces_timeout() {
    let store = Arc::new(MemoryStore::with_latency(Duration::from_millis(200)));
    let reg = TicketRegistry::new(
        store,
        RegistryConfig {
            op_timeout: Duration::from_millis(30),
            poll_interval: Duration::from_millis(10),
            ..RegistryConfig::default()
        },
    );
    assert!(matches!(
        reg.sell(1, "Ana", "").await,
        Err(SellError::Store(StoreError::Timeout))
    ));
    assert!(matches!(
        reg.set_paid(1, true).await,
        Err(ToggleError::Store(StoreError::Timeout))
    ));
}

#[tokio::test]
async fn events_fire_on_successful_writes_only() {
    let reg = registry();
    let mut events = reg.events();

    reg.sell(8, "Ana", "").await.expect("sell");
    match events.recv().await.expect("sold event") {
        RegistryEvent::TicketSold { number, buyer } => {
            assert_eq!(number.as_u8(), 8);
            assert_eq!(buyer.as_str(), "Ana");
        }
        other => panic!("expected TicketSold, got {other:?}"),
    }

    let _ = reg.sell(8, "Luis", "").await;
    reg.set_paid(8, true).await.expect("mark paid");
    match events.recv().await.expect("paid event") {
        RegistryEvent::PaidChanged { number, paid } => {
            assert_eq!(number.as_u8(), 8);
            assert!(paid);
        }
        other => panic!("expected PaidChanged, got {other:?}"),
    }
}

#[tokio::test]
async fn snapshot_is_populated_by_the_subscription_not_by_writes() {
    let store = Arc::new(MemoryStore::default());
    let reg = TicketRegistry::new(store.clone(), test_config());
    reg.wait_ready().await;

    // Cut the read path: writes still land, but the subscription cannot
    // deliver, so the cache must not move.
    store
        .fail_reads
        .store(true, std::sync::atomic::Ordering::Relaxed);
    reg.sell(5, "Ana", "").await.expect("sell");
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(!reg.snapshot().is_sold(n(5)));

    // Once reads recover, the sale arrives through the subscription.
    store
        .fail_reads
        .store(false, std::sync::atomic::Ordering::Relaxed);
    let mut watch = reg.subscribe();
    let snapshot = wait_until(&mut watch, |s| s.is_sold(n(5))).await;
    assert_eq!(snapshot.get(n(5)).expect("sold ticket").buyer.as_str(), "Ana");
}

async fn wait_until<F>(watch: &mut rifa_registry::BoardWatch, predicate: F) -> rifa_model::BoardSnapshot
where
    F: Fn(&rifa_model::BoardSnapshot) -> bool,
{
    let current = watch.current();
    if predicate(&current) {
        return current;
    }
    loop {
        let snapshot = tokio::time::timeout(Duration::from_secs(2), watch.next())
            .await
            .expect("snapshot delivery within deadline")
            .expect("registry alive");
        if predicate(&snapshot) {
            return snapshot;
        }
    }
}
