//! Order status progression.

use serde::{Deserialize, Serialize};

use crate::DomainError;

/// The status of an order in its lifecycle.
///
/// Transitions follow a fixed table, see [`OrderStatus::next_statuses`]. The
/// main line runs
/// ```text
/// Pending ─► AwaitingPayment ─► Paid ─► Confirmed ─► Processing ─► ReadyToShip
///   ─► Shipped ─► InTransit ─► OutForDelivery ─► Delivered ─► Completed
/// ```
/// with a few shortcuts: `Pending ─► Paid`, `Paid ─► Processing`, and
/// `Delivered` straight from `Shipped` or `InTransit`. `Cancelled` stays open
/// until `ReadyToShip`. Refunds follow `Paid`, `Delivered`, `Completed` or
/// `Cancelled` and end the lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    #[default]
    Pending,
    AwaitingPayment,
    Paid,
    Confirmed,
    Processing,
    ReadyToShip,
    Shipped,
    InTransit,
    OutForDelivery,
    Delivered,
    Completed,
    Cancelled,
    Refunded,
    PartiallyRefunded,
}

impl OrderStatus {
    /// Statuses an order may move to from `self`.
    pub fn next_statuses(&self) -> &'static [OrderStatus] {
        use OrderStatus::*;

        match self {
            Pending => &[AwaitingPayment, Paid, Cancelled],
            AwaitingPayment => &[Paid, Cancelled],
            Paid => &[Confirmed, Processing, Cancelled, Refunded, PartiallyRefunded],
            Confirmed => &[Processing, Cancelled],
            Processing => &[ReadyToShip, Cancelled],
            ReadyToShip => &[Shipped, Cancelled],
            Shipped => &[InTransit, Delivered],
            InTransit => &[OutForDelivery, Delivered],
            OutForDelivery => &[Delivered],
            Delivered => &[Completed, Refunded, PartiallyRefunded],
            Completed | Cancelled => &[Refunded, PartiallyRefunded],
            Refunded | PartiallyRefunded => &[],
        }
    }

    /// Returns true if moving from `self` to `to` is allowed.
    pub fn can_transition_to(&self, to: OrderStatus) -> bool {
        self.next_statuses().contains(&to)
    }

    /// Checks a transition, returning an error when it is not allowed.
    pub fn transition_to(&self, to: OrderStatus) -> Result<OrderStatus, DomainError> {
        if self.can_transition_to(to) {
            Ok(to)
        } else {
            Err(DomainError::InvalidStatusTransition { from: *self, to })
        }
    }

    /// Returns the status name as stored.
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::Pending => "pending",
            OrderStatus::AwaitingPayment => "awaiting_payment",
            OrderStatus::Paid => "paid",
            OrderStatus::Confirmed => "confirmed",
            OrderStatus::Processing => "processing",
            OrderStatus::ReadyToShip => "ready_to_ship",
            OrderStatus::Shipped => "shipped",
            OrderStatus::InTransit => "in_transit",
            OrderStatus::OutForDelivery => "out_for_delivery",
            OrderStatus::Delivered => "delivered",
            OrderStatus::Completed => "completed",
            OrderStatus::Cancelled => "cancelled",
            OrderStatus::Refunded => "refunded",
            OrderStatus::PartiallyRefunded => "partially_refunded",
        }
    }

    /// All statuses in declaration order.
    pub const ALL: [OrderStatus; 14] = [
        OrderStatus::Pending,
        OrderStatus::AwaitingPayment,
        OrderStatus::Paid,
        OrderStatus::Confirmed,
        OrderStatus::Processing,
        OrderStatus::ReadyToShip,
        OrderStatus::Shipped,
        OrderStatus::InTransit,
        OrderStatus::OutForDelivery,
        OrderStatus::Delivered,
        OrderStatus::Completed,
        OrderStatus::Cancelled,
        OrderStatus::Refunded,
        OrderStatus::PartiallyRefunded,
    ];
}

impl std::fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for OrderStatus {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        OrderStatus::ALL
            .into_iter()
            .find(|status| status.as_str() == s)
            .ok_or_else(|| DomainError::UnknownValue {
                kind: "order status",
                value: s.to_string(),
            })
    }
}
