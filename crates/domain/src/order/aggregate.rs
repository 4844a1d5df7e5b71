//! Order aggregate implementation.

use chrono::{DateTime, Utc};
use common::{OrderId, Version};
use serde::{Deserialize, Serialize};

use super::{BuyerId, DownpaymentTerms, EggType, Money, OrderError, OrderState};

/// Largest quantity a single order may carry; matches the storage column.
pub const MAX_QUANTITY: u32 = i32::MAX as u32;

/// Attributes of an order that has not been persisted yet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewOrder {
    pub buyer_id: BuyerId,
    pub egg_type: EggType,
    pub quantity: u32,
    pub total_amount: Money,
}

impl NewOrder {
    /// Creates a new order request.
    pub fn new(
        buyer_id: impl Into<BuyerId>,
        egg_type: impl Into<EggType>,
        quantity: u32,
        total_amount: Money,
    ) -> Self {
        Self {
            buyer_id: buyer_id.into(),
            egg_type: egg_type.into(),
            quantity,
            total_amount,
        }
    }

    /// Checks the attributes before they are handed to a repository.
    pub fn validate(&self) -> Result<(), OrderError> {
        if self.buyer_id.as_str().trim().is_empty() {
            return Err(OrderError::BuyerIdRequired);
        }
        if self.quantity == 0 || self.quantity > MAX_QUANTITY {
            return Err(OrderError::InvalidQuantity {
                quantity: self.quantity,
            });
        }
        if !self.total_amount.is_positive() {
            return Err(OrderError::InvalidTotalAmount {
                cents: self.total_amount.cents(),
            });
        }
        Ok(())
    }
}

/// Flat view of every persisted field of an order.
///
/// Used by storage backends to rebuild an [`Order`] from a row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderSnapshot {
    pub id: OrderId,
    pub buyer_id: BuyerId,
    pub egg_type: EggType,
    pub quantity: u32,
    pub state: OrderState,
    pub expires_at: Option<DateTime<Utc>>,
    pub version: Version,
    pub downpayment: Money,
    pub total_amount: Money,
}

/// Order aggregate root.
///
/// Every transition validates the current state, mutates the order in place
/// and advances `version` by exactly one. A copy that went stale while being
/// mutated is rejected when it is written back, because the store compares
/// against [`Order::expected_version`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Order {
    /// Unique order identifier.
    id: OrderId,

    /// Buyer who placed the order.
    buyer_id: BuyerId,

    /// Egg product ordered.
    egg_type: EggType,

    /// Number of units ordered.
    quantity: u32,

    /// Current state of the order.
    state: OrderState,

    /// Deadline for confirming payment; only meaningful while reserved.
    expires_at: Option<DateTime<Utc>>,

    /// Concurrency token.
    version: Version,

    /// Amount held at reservation time.
    downpayment: Money,

    /// Full value of the order.
    total_amount: Money,
}

impl Order {
    /// Builds a fresh draft order at version 1.
    pub fn draft(id: OrderId, new_order: NewOrder) -> Self {
        Self {
            id,
            buyer_id: new_order.buyer_id,
            egg_type: new_order.egg_type,
            quantity: new_order.quantity,
            state: OrderState::Draft,
            expires_at: None,
            version: Version::first(),
            downpayment: Money::zero(),
            total_amount: new_order.total_amount,
        }
    }

    /// Returns every field as a flat snapshot.
    pub fn snapshot(&self) -> OrderSnapshot {
        OrderSnapshot {
            id: self.id,
            buyer_id: self.buyer_id.clone(),
            egg_type: self.egg_type.clone(),
            quantity: self.quantity,
            state: self.state,
            expires_at: self.expires_at,
            version: self.version,
            downpayment: self.downpayment,
            total_amount: self.total_amount,
        }
    }
}

impl From<OrderSnapshot> for Order {
    fn from(snapshot: OrderSnapshot) -> Self {
        Self {
            id: snapshot.id,
            buyer_id: snapshot.buyer_id,
            egg_type: snapshot.egg_type,
            quantity: snapshot.quantity,
            state: snapshot.state,
            expires_at: snapshot.expires_at,
            version: snapshot.version,
            downpayment: snapshot.downpayment,
            total_amount: snapshot.total_amount,
        }
    }
}

// Query methods
impl Order {
    pub fn id(&self) -> OrderId {
        self.id
    }

    pub fn buyer_id(&self) -> &BuyerId {
        &self.buyer_id
    }

    pub fn egg_type(&self) -> &EggType {
        &self.egg_type
    }

    pub fn quantity(&self) -> u32 {
        self.quantity
    }

    pub fn state(&self) -> OrderState {
        self.state
    }

    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        self.expires_at
    }

    pub fn version(&self) -> Version {
        self.version
    }

    pub fn downpayment(&self) -> Money {
        self.downpayment
    }

    pub fn total_amount(&self) -> Money {
        self.total_amount
    }

    /// Version the store must still hold for this order to be written back.
    ///
    /// Each transition advances the in-memory version by one, so the stored
    /// comparand is the version the order was loaded at.
    pub fn expected_version(&self) -> Version {
        self.version.prev()
    }

    /// Returns true if the order is in a terminal state.
    pub fn is_terminal(&self) -> bool {
        self.state.is_terminal()
    }

    /// Returns true if the order is reserved and its hold ran out at or before `now`.
    pub fn is_reservation_expired(&self, now: DateTime<Utc>) -> bool {
        self.state == OrderState::Reserved && self.expires_at.is_none_or(|at| now >= at)
    }
}

// Transitions
impl Order {
    /// Reserves the downpayment, starting the hold from the current time.
    pub fn reserve(&mut self, terms: DownpaymentTerms) -> Result<(), OrderError> {
        self.reserve_at(terms, Utc::now())
    }

    /// Reserves the downpayment with the hold starting at `now`.
    pub fn reserve_at(
        &mut self,
        terms: DownpaymentTerms,
        now: DateTime<Utc>,
    ) -> Result<(), OrderError> {
        if !self.state.can_reserve() {
            return Err(OrderError::InvalidStateTransition {
                current_state: self.state,
                action: "reserve",
            });
        }

        let expires_at = now.checked_add_signed(terms.hold()).ok_or_else(|| {
            OrderError::InvalidTerms(format!("hold {} overflows the deadline", terms.hold()))
        })?;

        self.downpayment = self.total_amount.fraction(terms.percent());
        self.expires_at = Some(expires_at);
        self.state = OrderState::Reserved;
        self.version = self.version.next();
        Ok(())
    }

    /// Confirms payment of a reservation that has not expired yet.
    pub fn confirm_payment(&mut self) -> Result<(), OrderError> {
        self.confirm_payment_at(Utc::now())
    }

    /// Confirms payment as of `now`.
    ///
    /// An expired reservation is rejected but left reserved; cancelling it is
    /// the expiration sweeper's job.
    pub fn confirm_payment_at(&mut self, now: DateTime<Utc>) -> Result<(), OrderError> {
        if !self.state.can_confirm_payment() {
            return Err(OrderError::InvalidStateTransition {
                current_state: self.state,
                action: "confirm payment",
            });
        }
        if self.is_reservation_expired(now) {
            return Err(OrderError::InvalidStateTransition {
                current_state: self.state,
                action: "confirm payment on an expired reservation",
            });
        }

        self.state = OrderState::Confirmed;
        self.version = self.version.next();
        Ok(())
    }

    /// Cancels a reserved or confirmed order.
    pub fn cancel(&mut self) -> Result<(), OrderError> {
        if !self.state.can_cancel() {
            return Err(OrderError::InvalidStateTransition {
                current_state: self.state,
                action: "cancel",
            });
        }

        self.state = OrderState::Cancelled;
        self.version = self.version.next();
        Ok(())
    }

    /// Hands a confirmed order over to fulfillment.
    pub fn ship(&mut self) -> Result<(), OrderError> {
        if !self.state.can_ship() {
            return Err(OrderError::InvalidStateTransition {
                current_state: self.state,
                action: "ship",
            });
        }

        self.state = OrderState::Shipped;
        self.version = self.version.next();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, TimeZone};

    use super::*;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap()
    }

    fn draft_order(total_cents: i64) -> Order {
        Order::draft(
            OrderId::new(),
            NewOrder::new("buyer-1", "rainbow-trout", 10_000, Money::from_cents(total_cents)),
        )
    }

    fn reserved_order() -> Order {
        let mut order = draft_order(1000);
        order
            .reserve_at(DownpaymentTerms::default(), now())
            .unwrap();
        order
    }

    #[test]
    fn test_draft_starts_at_version_one() {
        let order = draft_order(1000);
        assert_eq!(order.state(), OrderState::Draft);
        assert_eq!(order.version(), Version::first());
        assert!(order.downpayment().is_zero());
        assert!(order.expires_at().is_none());
    }

    #[test]
    fn test_reserve_computes_downpayment_and_expiry() {
        let mut order = draft_order(1000);
        let terms = DownpaymentTerms::new(0.15, Duration::hours(48)).unwrap();

        order.reserve_at(terms, now()).unwrap();

        assert_eq!(order.downpayment().cents(), 150);
        assert_eq!(order.state(), OrderState::Reserved);
        assert_eq!(order.expires_at(), Some(now() + Duration::hours(48)));
        assert_eq!(order.version(), Version::new(2));
        assert_eq!(order.expected_version(), Version::first());
    }

    #[test]
    fn test_reserve_with_unrepresentable_deadline_leaves_order_untouched() {
        let mut order = draft_order(1000);
        let terms = DownpaymentTerms::new(0.15, crate::order::MAX_HOLD).unwrap();
        let before = order.clone();

        let result = order.reserve_at(terms, DateTime::<Utc>::MAX_UTC);

        assert!(matches!(result, Err(OrderError::InvalidTerms(_))));
        assert_eq!(order, before);
    }

    #[test]
    fn test_second_reserve_fails() {
        let mut order = reserved_order();
        let before = order.clone();

        let result = order.reserve_at(DownpaymentTerms::default(), now());

        assert!(matches!(
            result,
            Err(OrderError::InvalidStateTransition {
                current_state: OrderState::Reserved,
                ..
            })
        ));
        assert_eq!(order, before);
    }

    #[test]
    fn test_confirm_payment_before_expiry() {
        let mut order = reserved_order();
        order
            .confirm_payment_at(now() + Duration::hours(47))
            .unwrap();
        assert_eq!(order.state(), OrderState::Confirmed);
        assert_eq!(order.version(), Version::new(3));
    }

    #[test]
    fn test_confirm_payment_at_or_after_expiry_fails() {
        for offset in [Duration::hours(48), Duration::hours(49)] {
            let mut order = reserved_order();
            let result = order.confirm_payment_at(now() + offset);
            assert!(matches!(
                result,
                Err(OrderError::InvalidStateTransition { .. })
            ));
            assert_eq!(order.state(), OrderState::Reserved);
            assert_eq!(order.version(), Version::new(2));
        }
    }

    #[test]
    fn test_confirm_payment_from_draft_fails() {
        let mut order = draft_order(1000);
        assert!(order.confirm_payment_at(now()).is_err());
    }

    #[test]
    fn test_cancel_from_reserved_and_confirmed() {
        let mut reserved = reserved_order();
        reserved.cancel().unwrap();
        assert_eq!(reserved.state(), OrderState::Cancelled);
        assert_eq!(reserved.version(), Version::new(3));

        let mut confirmed = reserved_order();
        confirmed.confirm_payment_at(now()).unwrap();
        confirmed.cancel().unwrap();
        assert_eq!(confirmed.state(), OrderState::Cancelled);
        assert!(confirmed.is_terminal());
    }

    #[test]
    fn test_cancel_from_draft_or_terminal_fails() {
        let mut draft = draft_order(1000);
        assert!(draft.cancel().is_err());

        let mut cancelled = reserved_order();
        cancelled.cancel().unwrap();
        assert!(cancelled.cancel().is_err());

        let mut shipped = reserved_order();
        shipped.confirm_payment_at(now()).unwrap();
        shipped.ship().unwrap();
        assert!(shipped.cancel().is_err());
        assert!(shipped.reserve_at(DownpaymentTerms::default(), now()).is_err());
    }

    #[test]
    fn test_ship_requires_confirmation() {
        let mut order = reserved_order();
        assert!(order.ship().is_err());
        order.confirm_payment_at(now()).unwrap();
        order.ship().unwrap();
        assert_eq!(order.state(), OrderState::Shipped);
        assert_eq!(order.version(), Version::new(4));
    }

    #[test]
    fn test_expiry_only_applies_while_reserved() {
        let order = reserved_order();
        assert!(!order.is_reservation_expired(now()));
        assert!(order.is_reservation_expired(now() + Duration::hours(48)));

        let draft = draft_order(1000);
        assert!(!draft.is_reservation_expired(now() + Duration::days(365)));
    }

    #[test]
    fn test_new_order_validation() {
        assert!(NewOrder::new("b", "e", 1, Money::from_cents(1)).validate().is_ok());
        assert!(matches!(
            NewOrder::new(" ", "e", 1, Money::from_cents(1)).validate(),
            Err(OrderError::BuyerIdRequired)
        ));
        assert!(matches!(
            NewOrder::new("b", "e", 0, Money::from_cents(1)).validate(),
            Err(OrderError::InvalidQuantity { quantity: 0 })
        ));
        assert!(NewOrder::new("b", "e", MAX_QUANTITY, Money::from_cents(1)).validate().is_ok());
        assert!(matches!(
            NewOrder::new("b", "e", MAX_QUANTITY + 1, Money::from_cents(1)).validate(),
            Err(OrderError::InvalidQuantity { .. })
        ));
        assert!(matches!(
            NewOrder::new("b", "e", 1, Money::zero()).validate(),
            Err(OrderError::InvalidTotalAmount { cents: 0 })
        ));
    }

    #[test]
    fn test_snapshot_round_trip() {
        let order = reserved_order();
        assert_eq!(Order::from(order.snapshot()), order);
    }

    #[test]
    fn test_serialization() {
        let order = reserved_order();
        let json = serde_json::to_string(&order).unwrap();
        let deserialized: Order = serde_json::from_str(&json).unwrap();
        assert_eq!(deserialized, order);
    }
}
