//! Stock counter keys.

use core::fmt;

use serde::{Deserialize, Serialize};

use super::id::{ProductId, SizeId};

/// Identifies one stock counter: a product, or one size variant of it.
///
/// Keys sort by product then size (product-level first), which is the order
/// stock rows are locked in during checkout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct StockKey {
    pub product_id: ProductId,
    #[serde(default)]
    pub size_id: Option<SizeId>,
}

impl StockKey {
    #[must_use]
    pub const fn product(product_id: ProductId) -> Self {
        Self {
            product_id,
            size_id: None,
        }
    }

    #[must_use]
    pub const fn variant(product_id: ProductId, size_id: SizeId) -> Self {
        Self {
            product_id,
            size_id: Some(size_id),
        }
    }

    #[must_use]
    pub const fn is_variant(&self) -> bool {
        self.size_id.is_some()
    }
}

impl fmt::Display for StockKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.size_id {
            Some(size) => write!(f, "product {} size {size}", self.product_id),
            None => write!(f, "product {}", self.product_id),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lock_order() {
        let mut keys = vec![
            StockKey::variant(ProductId::new(2), SizeId::new(1)),
            StockKey::variant(ProductId::new(1), SizeId::new(9)),
            StockKey::product(ProductId::new(2)),
            StockKey::variant(ProductId::new(1), SizeId::new(3)),
        ];
        keys.sort();
        assert_eq!(
            keys,
            vec![
                StockKey::variant(ProductId::new(1), SizeId::new(3)),
                StockKey::variant(ProductId::new(1), SizeId::new(9)),
                StockKey::product(ProductId::new(2)),
                StockKey::variant(ProductId::new(2), SizeId::new(1)),
            ]
        );
    }

    #[test]
    fn test_display() {
        assert_eq!(StockKey::product(ProductId::new(4)).to_string(), "product 4");
        assert_eq!(
            StockKey::variant(ProductId::new(4), SizeId::new(2)).to_string(),
            "product 4 size 2"
        );
    }
}
