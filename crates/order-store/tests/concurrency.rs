//! Racing writers and readers against the in-memory and cached repositories.

use std::sync::Arc;

use domain::{DownpaymentTerms, Money, NewOrder, OrderState};
use order_store::{
    CachedOrderRepository, InMemoryOrderCache, InMemoryOrderRepository, OrderRepository,
    StoreError, Version,
};

fn new_order() -> NewOrder {
    NewOrder::new("buyer-1", "rainbow-trout", 5_000, Money::from_cents(20_000))
}

async fn race<R>(repo: Arc<R>, racers: usize) -> Vec<Result<Version, StoreError>>
where
    R: OrderRepository + 'static,
{
    let created = repo.create(new_order()).await.unwrap();

    let handles: Vec<_> = (0..racers)
        .map(|_| {
            let repo = repo.clone();
            let mut order = created.clone();
            tokio::spawn(async move {
                order.reserve(DownpaymentTerms::default()).unwrap();
                repo.conditional_update(&order).await
            })
        })
        .collect();

    futures_util::future::join_all(handles)
        .await
        .into_iter()
        .map(|joined| joined.unwrap())
        .collect()
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn exactly_one_writer_wins_on_the_same_version() {
    let repo = Arc::new(InMemoryOrderRepository::new());

    let results = race(repo, 16).await;

    let winners = results.iter().filter(|r| r.is_ok()).count();
    let conflicts = results
        .iter()
        .filter(|r| matches!(r, Err(StoreError::OptimisticLockConflict { .. })))
        .count();
    assert_eq!(winners, 1);
    assert_eq!(conflicts, 15);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn exactly_one_writer_wins_through_the_cache() {
    let repo = Arc::new(CachedOrderRepository::new(
        InMemoryOrderRepository::new(),
        InMemoryOrderCache::new(),
    ));

    let results = race(repo, 16).await;

    assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn reload_and_retry_eventually_applies_every_step() {
    // Each task loads, transitions and writes; losers reload and retry until
    // the order has left the state they expected to act on.
    let repo = Arc::new(InMemoryOrderRepository::new());
    let order = repo.create(new_order()).await.unwrap();
    let id = order.id();

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let repo = repo.clone();
            tokio::spawn(async move {
                loop {
                    let mut current = match repo.lock_read(id).await {
                        Ok(order) => order,
                        Err(StoreError::Busy(_)) => {
                            tokio::task::yield_now().await;
                            continue;
                        }
                        Err(e) => panic!("unexpected error: {e}"),
                    };
                    if current.reserve(DownpaymentTerms::default()).is_err() {
                        return false;
                    }
                    match repo.conditional_update(&current).await {
                        Ok(_) => return true,
                        Err(StoreError::OptimisticLockConflict { .. }) => continue,
                        Err(e) => panic!("unexpected error: {e}"),
                    }
                }
            })
        })
        .collect();

    let applied = futures_util::future::join_all(handles)
        .await
        .into_iter()
        .filter(|joined| *joined.as_ref().unwrap())
        .count();

    assert_eq!(applied, 1);
    let stored = repo.get(id).await.unwrap();
    assert_eq!(stored.state(), OrderState::Reserved);
    assert_eq!(stored.version(), Version::new(2));
}
