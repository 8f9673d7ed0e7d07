use std::error::Error;

use thiserror::Error;

/// Why a coupon code was refused. Each variant has a stable machine code.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CouponRejection {
    #[error("Coupon not found")]
    NotFound,
    #[error("Coupon is not active")]
    Inactive,
    #[error("Coupon is not valid yet")]
    NotYetValid,
    #[error("Coupon has expired")]
    Expired,
    #[error("Coupon usage limit reached")]
    UsageLimitReached,
    #[error("You have already used this coupon the maximum number of times")]
    UserLimitReached,
    #[error("Minimum purchase of {min} required")]
    MinimumNotMet { min: String },
    #[error("Coupon does not apply to any product in the cart")]
    NotApplicable,
    #[error("Coupon cannot be used with some products in the cart")]
    ExcludedProduct,
}

impl CouponRejection {
    pub fn code(&self) -> &'static str {
        match self {
            CouponRejection::NotFound => "COUPON_NOT_FOUND",
            CouponRejection::Inactive => "COUPON_INACTIVE",
            CouponRejection::NotYetValid => "COUPON_NOT_YET_VALID",
            CouponRejection::Expired => "COUPON_EXPIRED",
            CouponRejection::UsageLimitReached => "COUPON_USAGE_LIMIT",
            CouponRejection::UserLimitReached => "COUPON_USER_LIMIT",
            CouponRejection::MinimumNotMet { .. } => "COUPON_MIN_PURCHASE",
            CouponRejection::NotApplicable => "COUPON_NOT_APPLICABLE",
            CouponRejection::ExcludedProduct => "COUPON_EXCLUDED_PRODUCT",
        }
    }
}

#[derive(Debug, Error)]
pub enum CommerceError {
    #[error("{0} not found")]
    NotFound(String),

    #[error("{0}")]
    Validation(String),

    #[error("{0}")]
    Conflict(String),

    #[error(transparent)]
    CouponRejected(#[from] CouponRejection),

    #[error("Cannot change {entity} status from {from} to {to}")]
    InvalidTransition { entity: &'static str, from: String, to: String },

    #[error("Insufficient stock for {0}")]
    InsufficientStock(String),

    #[error("{0}")]
    Unauthorized(String),

    #[error("{0}")]
    Forbidden(String),

    #[error("Storage error: {0}")]
    Storage(#[source] Box<dyn Error + Send + Sync>),
}

impl CommerceError {
    pub fn not_found(what: impl Into<String>) -> Self {
        Self::NotFound(what.into())
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        Self::Conflict(message.into())
    }

    pub fn transition(entity: &'static str, from: impl ToString, to: impl ToString) -> Self {
        Self::InvalidTransition { entity, from: from.to_string(), to: to.to_string() }
    }

    pub fn storage(error: impl Into<Box<dyn Error + Send + Sync>>) -> Self {
        Self::Storage(error.into())
    }
}

impl From<sea_orm::DbErr> for CommerceError {
    fn from(error: sea_orm::DbErr) -> Self {
        match error {
            sea_orm::DbErr::RecordNotFound(what) => CommerceError::NotFound(what),
            other => CommerceError::Storage(Box::new(other)),
        }
    }
}

pub type CommerceResult<T> = Result<T, CommerceError>;
