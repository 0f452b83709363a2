//! Status enums for orders, callers and the payment provider.

use core::fmt;
use core::str::FromStr;

use serde::{Deserialize, Serialize};

/// Order lifecycle status.
///
/// ```text
/// pending ──► paid ──► shipped ──► delivered
///    │          │         │
///    └──────────┴─────────┴──► cancelled
/// ```
///
/// `delivered` is terminal. `cancelled` is terminal for the normal lifecycle;
/// leaving it is an administrative reactivation that must re-reserve stock.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[cfg_attr(feature = "postgres", derive(sqlx::Type))]
#[cfg_attr(
    feature = "postgres",
    sqlx(type_name = "shop.order_status", rename_all = "lowercase")
)]
#[serde(rename_all = "lowercase")]
pub enum OrderStatus {
    #[default]
    Pending,
    Paid,
    Shipped,
    Delivered,
    Cancelled,
}

impl OrderStatus {
    /// All statuses, in lifecycle order.
    pub const ALL: [Self; 5] = [
        Self::Pending,
        Self::Paid,
        Self::Shipped,
        Self::Delivered,
        Self::Cancelled,
    ];

    /// Returns the wire name of the status.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Paid => "paid",
            Self::Shipped => "shipped",
            Self::Delivered => "delivered",
            Self::Cancelled => "cancelled",
        }
    }

    /// Whether the order can no longer move through the normal lifecycle.
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        matches!(self, Self::Delivered | Self::Cancelled)
    }

    /// The next status in the forward chain, if any.
    #[must_use]
    pub const fn next(&self) -> Option<Self> {
        match self {
            Self::Pending => Some(Self::Paid),
            Self::Paid => Some(Self::Shipped),
            Self::Shipped => Some(Self::Delivered),
            Self::Delivered | Self::Cancelled => None,
        }
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OrderStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|status| status.as_str() == s)
            .ok_or_else(|| format!("invalid order status: {s}"))
    }
}

/// Role of the caller, as asserted by the identity collaborator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum CallerRole {
    /// Shopper acting on their own cart and orders.
    #[default]
    Customer,
    /// Staff member allowed to manage any order.
    Admin,
}

impl fmt::Display for CallerRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Customer => write!(f, "customer"),
            Self::Admin => write!(f, "admin"),
        }
    }
}

impl FromStr for CallerRole {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "customer" | "user" => Ok(Self::Customer),
            "admin" => Ok(Self::Admin),
            _ => Err(format!("invalid caller role: {s}")),
        }
    }
}

/// Payment status as reported by the payment provider.
///
/// The provider vocabulary is open-ended; anything unrecognised is kept
/// verbatim in [`ProviderStatus::Other`].
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ProviderStatus {
    Success,
    Cancelled,
    Failed,
    Other(String),
}

impl ProviderStatus {
    /// Parse a provider status string (case-insensitive).
    #[must_use]
    pub fn parse(raw: &str) -> Self {
        match raw.trim().to_ascii_uppercase().as_str() {
            "SUCCESS" => Self::Success,
            "CANCELLED" | "CANCELED" => Self::Cancelled,
            "FAILED" => Self::Failed,
            _ => Self::Other(raw.trim().to_owned()),
        }
    }

    /// The order status this provider status drives the order to.
    ///
    /// `None` means the notification carries no transition and the order is
    /// left as it is.
    #[must_use]
    pub const fn target_order_status(&self) -> Option<OrderStatus> {
        match self {
            Self::Success => Some(OrderStatus::Paid),
            Self::Cancelled | Self::Failed => Some(OrderStatus::Cancelled),
            Self::Other(_) => None,
        }
    }
}

impl fmt::Display for ProviderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Success => f.write_str("SUCCESS"),
            Self::Cancelled => f.write_str("CANCELLED"),
            Self::Failed => f.write_str("FAILED"),
            Self::Other(raw) => f.write_str(raw),
        }
    }
}

/// Payment status shown alongside order details.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PaymentStatus {
    /// No provider transaction exists for the order yet.
    NotInitiated,
    /// The provider could not be reached or answered unintelligibly.
    Unknown,
    /// Status reported by the provider.
    Reported(ProviderStatus),
}

impl fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotInitiated => f.write_str("not_initiated"),
            Self::Unknown => f.write_str("unknown"),
            Self::Reported(status) => status.fmt(f),
        }
    }
}

impl Serialize for PaymentStatus {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}
