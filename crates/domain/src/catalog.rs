//! Live product information as reported by the catalog.

use common::{BrandId, ProductId, SellerId, VariantId};
use serde::{Deserialize, Serialize};

use crate::Money;
use crate::cart::ItemType;

/// Where the catalog says a product comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ProductSource {
    /// Sold by the platform from its own warehouse (a brand product).
    #[default]
    Warehouse,

    /// Listed by a third-party seller.
    Seller,
}

/// Snapshot of a product's current catalog state.
///
/// This is the input to cart reconciliation: the cart copies name, price and
/// imagery from here at add-time and refreshes the current price and
/// availability from here whenever the line is touched again.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProductSnapshot {
    pub product_id: ProductId,
    pub name: String,
    pub sku: Option<String>,
    pub price: Money,
    pub compare_price: Option<Money>,
    pub seller_id: Option<SellerId>,
    pub seller_name: Option<String>,
    pub brand_id: Option<BrandId>,
    pub brand_name: Option<String>,
    pub variant_id: Option<VariantId>,
    pub variant_name: Option<String>,
    pub is_available: bool,
    pub image_url: Option<String>,
    pub source: ProductSource,
}

impl ProductSnapshot {
    /// Creates an available warehouse product with just a name and price.
    pub fn new(product_id: ProductId, name: impl Into<String>, price: Money) -> Self {
        Self {
            product_id,
            name: name.into(),
            sku: None,
            price,
            compare_price: None,
            seller_id: None,
            seller_name: None,
            brand_id: None,
            brand_name: None,
            variant_id: None,
            variant_name: None,
            is_available: true,
            image_url: None,
            source: ProductSource::Warehouse,
        }
    }

    /// Marks the product as listed by the given seller.
    pub fn with_seller(mut self, seller_id: SellerId) -> Self {
        self.seller_id = Some(seller_id);
        self.source = ProductSource::Seller;
        self
    }

    /// Sets the brand that owns the product.
    pub fn with_brand(mut self, brand_id: BrandId, brand_name: impl Into<String>) -> Self {
        self.brand_id = Some(brand_id);
        self.brand_name = Some(brand_name.into());
        self
    }

    /// Sets the availability flag.
    pub fn with_availability(mut self, is_available: bool) -> Self {
        self.is_available = is_available;
        self
    }

    /// Sets the product image.
    pub fn with_image(mut self, image_url: impl Into<String>) -> Self {
        self.image_url = Some(image_url.into());
        self
    }

    /// Rounds the prices to the scale carts and orders store them at, so a
    /// stored line compares equal to the catalog price it was copied from.
    pub fn rounded(mut self) -> Self {
        self.price = self.price.round_to_scale();
        self.compare_price = self.compare_price.map(Money::round_to_scale);
        self
    }

    /// Classifies the product as a brand or seller line.
    ///
    /// A product is a seller product exactly when it carries a seller id.
    pub fn item_type(&self) -> ItemType {
        if self.seller_id.is_some() {
            ItemType::SellerProduct
        } else {
            ItemType::BrandProduct
        }
    }
}
