//! Caller identity supplied by the upstream gateway.

use cartwright_core::{CallerId, CallerRole, Email};

/// The authenticated caller of a request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Caller {
    pub id: CallerId,
    pub role: CallerRole,
    pub email: Option<Email>,
}

impl Caller {
    #[must_use]
    pub const fn customer(id: CallerId) -> Self {
        Self {
            id,
            role: CallerRole::Customer,
            email: None,
        }
    }

    #[must_use]
    pub const fn admin(id: CallerId) -> Self {
        Self {
            id,
            role: CallerRole::Admin,
            email: None,
        }
    }

    #[must_use]
    pub fn with_email(mut self, email: Email) -> Self {
        self.email = Some(email);
        self
    }

    #[must_use]
    pub const fn is_admin(&self) -> bool {
        matches!(self.role, CallerRole::Admin)
    }
}
