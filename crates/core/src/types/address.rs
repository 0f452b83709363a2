//! Shipping address snapshot.

use serde::{Deserialize, Serialize};

/// Validation failures for a [`ShippingAddress`].
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum AddressError {
    #[error("{field} is required")]
    Missing { field: &'static str },
    #[error("{field} must be at most {max} characters")]
    TooLong { field: &'static str, max: usize },
}

/// A postal address as captured on an order.
///
/// Orders embed a copy of this at checkout, so later edits to a saved
/// address never change what an existing order ships to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShippingAddress {
    pub recipient_name: String,
    pub phone: String,
    pub address_line1: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address_line2: Option<String>,
    pub city: String,
    pub state: String,
    pub postal_code: String,
    pub country: String,
}

impl ShippingAddress {
    const MAX_FIELD: usize = 255;

    /// Check that every required field is present and within bounds.
    ///
    /// # Errors
    ///
    /// Returns the first field that is blank or too long.
    pub fn validate(&self) -> Result<(), AddressError> {
        let required = [
            ("recipient_name", &self.recipient_name),
            ("phone", &self.phone),
            ("address_line1", &self.address_line1),
            ("city", &self.city),
            ("state", &self.state),
            ("postal_code", &self.postal_code),
            ("country", &self.country),
        ];
        for (field, value) in required {
            if value.trim().is_empty() {
                return Err(AddressError::Missing { field });
            }
            if value.len() > Self::MAX_FIELD {
                return Err(AddressError::TooLong {
                    field,
                    max: Self::MAX_FIELD,
                });
            }
        }
        if self
            .address_line2
            .as_ref()
            .is_some_and(|line2| line2.len() > Self::MAX_FIELD)
        {
            return Err(AddressError::TooLong {
                field: "address_line2",
                max: Self::MAX_FIELD,
            });
        }
        Ok(())
    }

    /// One-line form used in payment requests: `"{line1}, {city} {postal}"`.
    #[must_use]
    pub fn one_line(&self) -> String {
        format!("{}, {} {}", self.address_line1, self.city, self.postal_code)
    }
}
