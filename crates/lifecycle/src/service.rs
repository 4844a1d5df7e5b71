use std::time::Duration;

use common::OrderId;
use domain::{DownpaymentTerms, NewOrder, Order};
use order_store::{OrderRepository, OrderRepositoryExt, StoreError};
use publisher::{CancelReason, EventDispatcher, OrderCancelled, OrderReserved};

use crate::Result;

/// Deadline applied to each repository call on the request path.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(5);

/// Runs order transitions on behalf of request handlers.
///
/// Every transition is load, apply, version-checked write, then a detached
/// publish. Nothing is retried here; a lost race surfaces as a conflict.
#[derive(Clone)]
pub struct ReservationService<R> {
    repo: R,
    dispatcher: EventDispatcher,
    terms: DownpaymentTerms,
    request_timeout: Duration,
}

impl<R: OrderRepository> ReservationService<R> {
    pub fn new(repo: R, dispatcher: EventDispatcher, terms: DownpaymentTerms) -> Self {
        Self {
            repo,
            dispatcher,
            terms,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
        }
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Validates and stores a new draft order.
    #[tracing::instrument(skip(self, new_order), fields(buyer_id = %new_order.buyer_id))]
    pub async fn create_order(&self, new_order: NewOrder) -> Result<Order> {
        new_order.validate()?;
        let order = self.repo.create(new_order).await?;
        tracing::info!(order_id = %order.id(), "order created");
        Ok(order)
    }

    /// Reads an order through the row try-lock.
    #[tracing::instrument(skip(self))]
    pub async fn get_order(&self, id: OrderId) -> Result<Order> {
        Ok(self.repo.lock_read_within(id, self.request_timeout).await?)
    }

    /// Reserves the downpayment of a draft order and announces it.
    #[tracing::instrument(skip(self))]
    pub async fn reserve(&self, id: OrderId) -> Result<Order> {
        let mut order = self.repo.lock_read_within(id, self.request_timeout).await?;
        order.reserve(self.terms)?;
        self.write(&order).await?;

        metrics::counter!("order_reservations_total").increment(1);
        tracing::info!(
            downpayment = %order.downpayment(),
            expires_at = ?order.expires_at(),
            version = %order.version(),
            "downpayment reserved"
        );

        if let Some(expires_at) = order.expires_at() {
            self.dispatcher.dispatch(&OrderReserved {
                order_id: order.id(),
                buyer_id: order.buyer_id().to_string(),
                amount: order.downpayment().cents(),
                expires_at,
            });
        }

        Ok(order)
    }

    /// Confirms payment of a reservation that has not expired.
    #[tracing::instrument(skip(self))]
    pub async fn confirm_payment(&self, id: OrderId) -> Result<Order> {
        let mut order = self.repo.lock_read_within(id, self.request_timeout).await?;
        order.confirm_payment()?;
        self.write(&order).await?;

        tracing::info!(version = %order.version(), "payment confirmed");
        Ok(order)
    }

    /// Cancels an order at the buyer's request and announces it.
    #[tracing::instrument(skip(self))]
    pub async fn cancel(&self, id: OrderId) -> Result<Order> {
        let mut order = self.repo.lock_read_within(id, self.request_timeout).await?;
        order.cancel()?;
        self.write(&order).await?;

        tracing::info!(version = %order.version(), "order cancelled by buyer");
        self.dispatcher.dispatch(&OrderCancelled {
            order_id: order.id(),
            reason: CancelReason::BuyerRequest,
        });

        Ok(order)
    }

    async fn write(&self, order: &Order) -> Result<()> {
        match self
            .repo
            .conditional_update_within(order, self.request_timeout)
            .await
        {
            Ok(_) => Ok(()),
            Err(e) => {
                if matches!(e, StoreError::OptimisticLockConflict { .. }) {
                    metrics::counter!("order_update_conflicts_total", "source" => "request")
                        .increment(1);
                    tracing::warn!(error = %e, "order changed since it was read");
                }
                Err(e.into())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use chrono::{Duration as ChronoDuration, Utc};
    use domain::{Money, OrderError, OrderState};
    use order_store::{CachedOrderRepository, InMemoryOrderCache, InMemoryOrderRepository, Version};
    use publisher::{InMemoryPublisher, ORDER_CANCELLED_TOPIC, ORDER_RESERVED_TOPIC};

    use super::*;
    use crate::LifecycleError;

    const WAIT: Duration = Duration::from_secs(1);

    fn setup() -> (
        ReservationService<InMemoryOrderRepository>,
        InMemoryOrderRepository,
        Arc<InMemoryPublisher>,
    ) {
        let repo = InMemoryOrderRepository::new();
        let publisher = Arc::new(InMemoryPublisher::new());
        let service = ReservationService::new(
            repo.clone(),
            EventDispatcher::new(publisher.clone()),
            DownpaymentTerms::default(),
        );
        (service, repo, publisher)
    }

    fn new_order() -> NewOrder {
        NewOrder::new("buyer-1", "rainbow-trout", 5_000, Money::from_cents(1000))
    }

    #[tokio::test]
    async fn create_rejects_invalid_input() {
        let (service, repo, _) = setup();

        let result = service
            .create_order(NewOrder::new("", "rainbow-trout", 1, Money::from_cents(1)))
            .await;

        assert!(matches!(
            result,
            Err(LifecycleError::Order(OrderError::BuyerIdRequired))
        ));
        assert_eq!(repo.order_count().await, 0);
    }

    #[tokio::test]
    async fn reserve_prices_holds_and_publishes() {
        let (service, repo, publisher) = setup();
        let created = service.create_order(new_order()).await.unwrap();
        let before = Utc::now();

        let reserved = service.reserve(created.id()).await.unwrap();

        assert_eq!(reserved.state(), OrderState::Reserved);
        assert_eq!(reserved.downpayment().cents(), 150);
        assert_eq!(reserved.version(), Version::new(2));
        let expires_at = reserved.expires_at().unwrap();
        assert!(expires_at >= before + ChronoDuration::hours(48));
        assert!(expires_at <= Utc::now() + ChronoDuration::hours(48));
        assert_eq!(repo.get(created.id()).await.unwrap(), reserved);

        let messages = publisher.wait_for(1, WAIT).await;
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].topic, ORDER_RESERVED_TOPIC);
        let payload = &messages[0].payload;
        assert_eq!(payload["order_id"], created.id().to_string());
        assert_eq!(payload["buyer_id"], "buyer-1");
        assert_eq!(payload["amount"], 150);
        assert!(payload["expires_at"].is_string());
    }

    #[tokio::test]
    async fn second_reserve_is_an_invalid_transition() {
        let (service, _, publisher) = setup();
        let created = service.create_order(new_order()).await.unwrap();
        service.reserve(created.id()).await.unwrap();

        let result = service.reserve(created.id()).await;

        assert!(matches!(
            result,
            Err(LifecycleError::Order(OrderError::InvalidStateTransition { .. }))
        ));
        publisher.wait_for(2, Duration::from_millis(50)).await;
        assert_eq!(publisher.messages_for(ORDER_RESERVED_TOPIC).await.len(), 1);
    }

    #[tokio::test]
    async fn reserve_of_unknown_order_is_not_found() {
        let (service, _, publisher) = setup();

        let result = service.reserve(OrderId::new()).await;

        assert!(matches!(
            result,
            Err(LifecycleError::Store(StoreError::NotFound(_)))
        ));
        assert_eq!(publisher.attempts().await, 0);
    }

    #[tokio::test]
    async fn reserve_while_row_is_held_is_busy() {
        let (service, repo, _) = setup();
        let created = service.create_order(new_order()).await.unwrap();
        let _guard = repo.hold_row(created.id()).await.unwrap();

        let err = service.reserve(created.id()).await.unwrap_err();

        assert!(err.is_conflict());
        assert!(matches!(err, LifecycleError::Store(StoreError::Busy(_))));
    }

    #[tokio::test]
    async fn stale_cached_read_loses_to_the_version_check() {
        let repo = CachedOrderRepository::new(InMemoryOrderRepository::new(), InMemoryOrderCache::new());
        let publisher = Arc::new(InMemoryPublisher::new());
        let service = ReservationService::new(
            repo.clone(),
            EventDispatcher::new(publisher.clone()),
            DownpaymentTerms::default(),
        );
        let created = service.create_order(new_order()).await.unwrap();
        // warm the cache with the draft
        service.get_order(created.id()).await.unwrap();

        // another writer moves the order on behind the cache's back
        let mut elsewhere = created.clone();
        elsewhere.reserve(DownpaymentTerms::default()).unwrap();
        repo.inner().conditional_update(&elsewhere).await.unwrap();

        let err = service.reserve(created.id()).await.unwrap_err();
        assert!(matches!(
            err,
            LifecycleError::Store(StoreError::OptimisticLockConflict { .. })
        ));
        assert!(err.is_conflict());

        // the failed write dropped the stale entry
        let fresh = service.get_order(created.id()).await.unwrap();
        assert_eq!(fresh.version(), Version::new(2));
        assert_eq!(publisher.attempts().await, 0);
    }

    #[tokio::test]
    async fn confirm_then_cancel() {
        let (service, _, publisher) = setup();
        let created = service.create_order(new_order()).await.unwrap();
        service.reserve(created.id()).await.unwrap();

        let confirmed = service.confirm_payment(created.id()).await.unwrap();
        assert_eq!(confirmed.state(), OrderState::Confirmed);
        assert_eq!(confirmed.version(), Version::new(3));

        let cancelled = service.cancel(created.id()).await.unwrap();
        assert_eq!(cancelled.state(), OrderState::Cancelled);
        assert_eq!(cancelled.version(), Version::new(4));

        let messages = publisher.wait_for(2, WAIT).await;
        let cancellations: Vec<_> = messages
            .iter()
            .filter(|m| m.topic == ORDER_CANCELLED_TOPIC)
            .collect();
        assert_eq!(cancellations.len(), 1);
        assert_eq!(cancellations[0].payload["reason"], "buyer_request");
    }

    #[tokio::test]
    async fn confirm_after_expiry_is_rejected() {
        let (service, repo, _) = setup();
        let created = service.create_order(new_order()).await.unwrap();

        let mut lapsed = created.clone();
        lapsed
            .reserve_at(
                DownpaymentTerms::default(),
                Utc::now() - ChronoDuration::hours(49),
            )
            .unwrap();
        repo.conditional_update(&lapsed).await.unwrap();

        let result = service.confirm_payment(created.id()).await;

        assert!(matches!(
            result,
            Err(LifecycleError::Order(OrderError::InvalidStateTransition { .. }))
        ));
        assert_eq!(
            repo.get(created.id()).await.unwrap().state(),
            OrderState::Reserved
        );
    }

    #[tokio::test]
    async fn cancel_of_draft_is_rejected() {
        let (service, _, _) = setup();
        let created = service.create_order(new_order()).await.unwrap();

        let result = service.cancel(created.id()).await;

        assert!(matches!(
            result,
            Err(LifecycleError::Order(OrderError::InvalidStateTransition { .. }))
        ));
    }

    #[tokio::test]
    async fn publish_failure_does_not_fail_the_request() {
        let (service, repo, publisher) = setup();
        publisher.set_fail(true).await;
        let created = service.create_order(new_order()).await.unwrap();

        let reserved = service.reserve(created.id()).await.unwrap();

        assert_eq!(reserved.state(), OrderState::Reserved);
        assert_eq!(
            repo.get(created.id()).await.unwrap().state(),
            OrderState::Reserved
        );
        assert_eq!(publisher.wait_for_attempts(1, WAIT).await, 1);
    }
}
