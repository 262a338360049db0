//! Order data model, status progression, and assembly from a cart.

mod address;
mod assembly;
mod model;
mod number;
mod status;

pub use address::{CustomerContact, DEFAULT_COUNTRY, DEFAULT_POSTAL_CODE, ShippingAddress};
pub use assembly::{CheckoutRequest, NewOrder, NewOrderItem, assemble_order};
pub use model::{Order, OrderItem, OrderSource};
pub use number::OrderNumber;
pub use status::OrderStatus;
