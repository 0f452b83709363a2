//! Externally visible order numbers.

use core::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::id::CallerId;

/// Errors from parsing an [`OrderNumber`].
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum OrderNumberError {
    #[error("order number cannot be empty")]
    Empty,
    #[error("order number must be at most {max} characters")]
    TooLong { max: usize },
}

/// Order number of the form `ORD-{caller}-{unix millis}`.
///
/// Generated numbers follow that pattern, but numbers received from outside
/// (URLs, webhooks) are treated as opaque strings and only bounded in length.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OrderNumber(String);

impl OrderNumber {
    pub const MAX_LENGTH: usize = 64;

    /// Generate the order number for an order placed by `caller` at `at`.
    #[must_use]
    pub fn generate(caller: CallerId, at: DateTime<Utc>) -> Self {
        Self(format!("ORD-{caller}-{}", at.timestamp_millis()))
    }

    /// Accept an order number supplied by a client or the payment provider.
    ///
    /// # Errors
    ///
    /// Returns an error if the value is blank or longer than
    /// [`Self::MAX_LENGTH`].
    pub fn parse(raw: &str) -> Result<Self, OrderNumberError> {
        let s = raw.trim();
        if s.is_empty() {
            return Err(OrderNumberError::Empty);
        }
        if s.len() > Self::MAX_LENGTH {
            return Err(OrderNumberError::TooLong {
                max: Self::MAX_LENGTH,
            });
        }
        Ok(Self(s.to_owned()))
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for OrderNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(feature = "postgres")]
impl ::sqlx::Type<::sqlx::Postgres> for OrderNumber {
    fn type_info() -> ::sqlx::postgres::PgTypeInfo {
        <String as ::sqlx::Type<::sqlx::Postgres>>::type_info()
    }

    fn compatible(ty: &::sqlx::postgres::PgTypeInfo) -> bool {
        <String as ::sqlx::Type<::sqlx::Postgres>>::compatible(ty)
    }
}

#[cfg(feature = "postgres")]
impl<'r> ::sqlx::Decode<'r, ::sqlx::Postgres> for OrderNumber {
    fn decode(
        value: ::sqlx::postgres::PgValueRef<'r>,
    ) -> Result<Self, ::sqlx::error::BoxDynError> {
        Ok(Self(<String as ::sqlx::Decode<::sqlx::Postgres>>::decode(value)?))
    }
}

#[cfg(feature = "postgres")]
impl ::sqlx::Encode<'_, ::sqlx::Postgres> for OrderNumber {
    fn encode_by_ref(
        &self,
        buf: &mut ::sqlx::postgres::PgArgumentBuffer,
    ) -> Result<::sqlx::encode::IsNull, ::sqlx::error::BoxDynError> {
        <String as ::sqlx::Encode<::sqlx::Postgres>>::encode_by_ref(&self.0, buf)
    }
}
