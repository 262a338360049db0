//! Outbox messages announcing order changes.

use common::OrderId;
use domain::{ItemType, NewOrder, Order, OrderStatus};
use serde_json::json;
use storage::OutboxMessage;

pub const ORDER_CREATED: &str = "order.created";
pub const ORDER_STATUS_CHANGED: &str = "order.status_changed";

/// `order.created` for an order about to be written under `id`.
pub fn order_created(id: OrderId, order: &NewOrder) -> OutboxMessage {
    let seller_id = order
        .items
        .iter()
        .find(|item| item.item_type == ItemType::SellerProduct)
        .and_then(|item| item.seller_id);

    OutboxMessage::new(
        ORDER_CREATED,
        id,
        json!({
            "orderId": id,
            "orderNumber": order.order_number.as_str(),
            "userId": order.buyer_id,
            "sellerId": seller_id,
            "sourceCartId": order.source_cart_id,
            "itemCount": order.items.len(),
            "totalAmount": order.total_amount,
            "currency": order.currency,
        }),
    )
}

/// `order.status_changed` for an order already moved to its new status.
pub fn status_changed(
    order: &Order,
    from: OrderStatus,
    reason: Option<&str>,
    notes: Option<&str>,
) -> OutboxMessage {
    OutboxMessage::new(
        ORDER_STATUS_CHANGED,
        order.id,
        json!({
            "orderId": order.id,
            "orderNumber": order.order_number.as_str(),
            "fromStatus": from,
            "toStatus": order.status,
            "reason": reason,
            "notes": notes,
        }),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use common::BuyerId;
    use domain::order::{CheckoutRequest, assemble_order};
    use domain::{CustomerContact, OrderNumber, ShippingAddress};

    fn new_order() -> NewOrder {
        let address = ShippingAddress {
            recipient_name: "Dewi".to_string(),
            phone: "0812".to_string(),
            street: "Jl. Merdeka 1".to_string(),
            district: None,
            city: "Jakarta".to_string(),
            province: "DKI Jakarta".to_string(),
            postal_code: "10110".to_string(),
            country: "Indonesia".to_string(),
        };
        let request = CheckoutRequest {
            buyer_id: BuyerId::new(),
            contact: CustomerContact::from_address(&address),
            shipping_address: address,
            currency: "IDR".to_string(),
        };
        assemble_order(None, request, OrderNumber::generate(Utc::now()), Utc::now())
    }

    #[test]
    fn test_order_created_payload() {
        let order = new_order();
        let id = OrderId::new();

        let message = order_created(id, &order);

        assert_eq!(message.topic, ORDER_CREATED);
        assert_eq!(message.aggregate_id, id.as_uuid());
        assert_eq!(message.payload["orderNumber"], order.order_number.as_str());
        assert_eq!(message.payload["itemCount"], 0);
        assert!(message.payload["sellerId"].is_null());
    }

    #[test]
    fn test_status_changed_payload() {
        let mut order = new_order().persisted(OrderId::new());
        let from = order.advance(OrderStatus::Cancelled, Utc::now()).unwrap();

        let message = status_changed(&order, from, Some("buyer request"), None);

        assert_eq!(message.topic, ORDER_STATUS_CHANGED);
        assert_eq!(message.payload["fromStatus"], "pending");
        assert_eq!(message.payload["toStatus"], "cancelled");
        assert_eq!(message.payload["reason"], "buyer request");
        assert!(message.payload["notes"].is_null());
    }
}
