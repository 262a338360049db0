//! Frozen shipping address and buyer contact.

use serde::{Deserialize, Serialize};

use crate::DomainError;

/// Postal code recorded when the buyer leaves it blank.
pub const DEFAULT_POSTAL_CODE: &str = "00000";

/// Country recorded when the buyer leaves it blank.
pub const DEFAULT_COUNTRY: &str = "Indonesia";

/// Where an order ships to, copied onto the order at creation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ShippingAddress {
    pub recipient_name: String,
    pub phone: String,
    pub street: String,
    #[serde(default)]
    pub district: Option<String>,
    pub city: String,
    pub province: String,
    #[serde(default)]
    pub postal_code: String,
    #[serde(default)]
    pub country: String,
}

impl ShippingAddress {
    /// Checks required fields and fills the postal code and country defaults.
    pub fn normalized(mut self) -> Result<Self, DomainError> {
        let required: [(&'static str, &str); 5] = [
            ("recipientName", self.recipient_name.as_str()),
            ("phone", self.phone.as_str()),
            ("street", self.street.as_str()),
            ("city", self.city.as_str()),
            ("province", self.province.as_str()),
        ];
        if let Some(&(field, _)) = required.iter().find(|(_, value)| value.trim().is_empty()) {
            return Err(DomainError::MissingField { field });
        }

        if self.postal_code.trim().is_empty() {
            self.postal_code = DEFAULT_POSTAL_CODE.to_string();
        }
        if self.country.trim().is_empty() {
            self.country = DEFAULT_COUNTRY.to_string();
        }
        self.district = self.district.filter(|d| !d.trim().is_empty());
        Ok(self)
    }
}

/// Buyer contact details frozen onto an order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CustomerContact {
    pub name: String,
    pub phone: String,
    #[serde(default)]
    pub email: Option<String>,
}

impl CustomerContact {
    /// Uses the recipient on the shipping address as the contact.
    pub fn from_address(address: &ShippingAddress) -> Self {
        Self {
            name: address.recipient_name.clone(),
            phone: address.phone.clone(),
            email: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn address() -> ShippingAddress {
        ShippingAddress {
            recipient_name: "Sari".to_string(),
            phone: "+62811000000".to_string(),
            street: "Jl. Merdeka 1".to_string(),
            district: Some("".to_string()),
            city: "Bandung".to_string(),
            province: "Jawa Barat".to_string(),
            postal_code: "".to_string(),
            country: "".to_string(),
        }
    }

    #[test]
    fn test_normalized_fills_defaults() {
        let addr = address().normalized().unwrap();
        assert_eq!(addr.postal_code, DEFAULT_POSTAL_CODE);
        assert_eq!(addr.country, DEFAULT_COUNTRY);
        assert_eq!(addr.district, None);
    }

    #[test]
    fn test_normalized_keeps_given_values() {
        let mut addr = address();
        addr.postal_code = "40111".to_string();
        addr.country = "Malaysia".to_string();

        let addr = addr.normalized().unwrap();
        assert_eq!(addr.postal_code, "40111");
        assert_eq!(addr.country, "Malaysia");
    }

    #[test]
    fn test_normalized_rejects_blank_required_field() {
        let mut addr = address();
        addr.city = "  ".to_string();
        assert_eq!(
            addr.normalized(),
            Err(DomainError::MissingField { field: "city" })
        );
    }

    #[test]
    fn test_address_deserializes_camel_case_with_defaults() {
        let json = r#"{
            "recipientName": "Sari",
            "phone": "0811",
            "street": "Jl. Merdeka 1",
            "city": "Bandung",
            "province": "Jawa Barat"
        }"#;
        let addr: ShippingAddress = serde_json::from_str(json).unwrap();
        assert_eq!(addr.district, None);
        assert!(addr.postal_code.is_empty());
    }

    #[test]
    fn test_contact_from_address() {
        let contact = CustomerContact::from_address(&address());
        assert_eq!(contact.name, "Sari");
        assert_eq!(contact.phone, "+62811000000");
    }
}
