//! Storage seams. Every method either fully succeeds or leaves the store
//! untouched; multi-row operations (checkout, cancellation, coupon
//! redemption) are atomic in each implementation.

pub mod in_memory;

pub use in_memory::InMemoryStore;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::checkout::CartLine;
use crate::error::{CommerceError, CommerceResult};
use crate::model::*;
use crate::products::ProductEdit;

#[async_trait]
pub trait CatalogStorage: Send + Sync {
    /// Sorted by `sort_order`, then name.
    async fn list_categories(&self, include_inactive: bool) -> CommerceResult<Vec<Category>>;

    async fn find_category(&self, id_or_slug: &str) -> CommerceResult<Option<Category>>;

    async fn create_category(&self, category: &Category) -> CommerceResult<()>;

    async fn update_category(&self, category: &Category) -> CommerceResult<()>;

    /// Refused while any product still references the category.
    async fn delete_category(&self, id: Uuid) -> CommerceResult<()>;

    async fn list_products(&self, filter: &ProductFilter, page: PageRequest) -> CommerceResult<Page<Product>>;

    async fn all_products(&self) -> CommerceResult<Vec<Product>>;

    async fn find_product(&self, id_or_slug: &str) -> CommerceResult<Option<Product>>;

    async fn products_by_ids(&self, ids: &[Uuid]) -> CommerceResult<Vec<Product>>;

    async fn create_product(&self, product: &Product) -> CommerceResult<()>;

    /// Applies the edit to the current product, holding it until the result
    /// is written. Stock moved by checkouts meanwhile is kept, and variants
    /// are changed one by one rather than rewritten.
    async fn edit_product(&self, id: Uuid, edit: ProductEdit, now: DateTime<Utc>) -> CommerceResult<Product>;
}

#[async_trait]
pub trait OrderStorage: Send + Sync {
    /// Decrements stock, redeems the claimed coupon (re-validated under lock)
    /// and writes the order with its first tracking event, all or nothing.
    async fn place_order(&self, order: NewOrder) -> CommerceResult<Order>;

    async fn get_order(&self, id: Uuid) -> CommerceResult<Option<Order>>;

    /// Newest first.
    async fn list_orders(&self, filter: &OrderFilter, page: PageRequest) -> CommerceResult<Page<Order>>;

    /// Unpaginated, for reporting.
    async fn find_orders(&self, filter: &OrderFilter) -> CommerceResult<Vec<Order>>;

    /// Moves the order along its state machine and appends a tracking event.
    /// A move to CANCELLED behaves like [`OrderStorage::cancel_order`].
    /// Status changes that belong to a delivery go through
    /// [`DeliveryStorage::transition_delivery`].
    async fn transition_order(
        &self,
        id: Uuid,
        to: OrderStatus,
        note: Option<String>,
        actor: Option<Uuid>,
        now: DateTime<Utc>,
    ) -> CommerceResult<Order>;

    /// Cancels, puts the items back in stock and fails the open delivery.
    async fn cancel_order(&self, id: Uuid, reason: String, actor: Option<Uuid>, now: DateTime<Utc>) -> CommerceResult<Order>;

    async fn update_payment_status(&self, id: Uuid, to: PaymentStatus, now: DateTime<Utc>) -> CommerceResult<Order>;

    /// Redeems a coupon against an existing pending order of the claimant.
    async fn apply_coupon(&self, order_id: Uuid, claim: &CouponClaim, now: DateTime<Utc>) -> CommerceResult<(Order, CouponUsage)>;

    /// Oldest first.
    async fn tracking_events(&self, order_id: Uuid) -> CommerceResult<Vec<OrderTrackingEvent>>;
}

#[async_trait]
pub trait CouponStorage: Send + Sync {
    async fn create_coupon(&self, coupon: &Coupon) -> CommerceResult<()>;

    async fn update_coupon(&self, coupon: &Coupon) -> CommerceResult<()>;

    /// Refused once the coupon has been redeemed; deactivate it instead.
    async fn delete_coupon(&self, id: Uuid) -> CommerceResult<()>;

    async fn get_coupon(&self, id: Uuid) -> CommerceResult<Option<Coupon>>;

    async fn find_coupon_by_code(&self, code: &str) -> CommerceResult<Option<Coupon>>;

    async fn list_coupons(&self, filter: &CouponFilter, page: PageRequest) -> CommerceResult<Page<Coupon>>;

    async fn all_coupons(&self) -> CommerceResult<Vec<Coupon>>;

    async fn count_user_usages(&self, coupon_id: Uuid, user_id: Uuid) -> CommerceResult<i64>;

    /// Newest first.
    async fn user_usages(&self, user_id: Uuid) -> CommerceResult<Vec<CouponUsage>>;
}

#[async_trait]
pub trait DeliveryStorage: Send + Sync {
    /// Refused while the order already has an open delivery.
    async fn create_delivery(&self, delivery: &Delivery) -> CommerceResult<()>;

    async fn get_delivery(&self, id: Uuid) -> CommerceResult<Option<Delivery>>;

    async fn latest_delivery_for_order(&self, order_id: Uuid) -> CommerceResult<Option<Delivery>>;

    /// Newest first.
    async fn list_deliveries(&self, driver_id: Uuid, status: Option<DeliveryStatus>) -> CommerceResult<Vec<Delivery>>;

    /// Moves the driver's delivery along its state machine together with the
    /// order status the new delivery status implies, all or nothing. Other
    /// drivers' deliveries are reported as not found.
    async fn transition_delivery(
        &self,
        id: Uuid,
        driver_id: Uuid,
        to: DeliveryStatus,
        notes: Option<String>,
        now: DateTime<Utc>,
    ) -> CommerceResult<DeliveryProgress>;

    /// Writes the driver's position and nothing else, and only while the
    /// delivery is open.
    async fn record_location(&self, id: Uuid, driver_id: Uuid, point: GeoPoint, now: DateTime<Utc>) -> CommerceResult<Delivery>;

    /// Rates a delivered delivery. A second rating is a conflict.
    async fn rate_delivery(&self, id: Uuid, rating: i16, now: DateTime<Utc>) -> CommerceResult<Delivery>;
}

#[async_trait]
pub trait UserStorage: Send + Sync {
    /// Refused when the e-mail is taken.
    async fn create_user(&self, user: &User) -> CommerceResult<()>;

    async fn get_user(&self, id: Uuid) -> CommerceResult<Option<User>>;

    async fn find_user_by_email(&self, email: &str) -> CommerceResult<Option<User>>;

    async fn list_users(&self, filter: &UserFilter, page: PageRequest) -> CommerceResult<Page<User>>;

    async fn users_by_ids(&self, ids: &[Uuid]) -> CommerceResult<Vec<User>>;

    async fn update_user(&self, user: &User) -> CommerceResult<()>;

    async fn count_users(&self, role: Option<UserRole>) -> CommerceResult<u64>;
}

#[async_trait]
pub trait LoyaltyStorage: Send + Sync {
    async fn get_account(&self, user_id: Uuid) -> CommerceResult<Option<LoyaltyAccount>>;

    /// Settles the change against the (possibly new) account. An earn tied to
    /// an order that already earned points is refused with a conflict.
    async fn record_points(
        &self,
        user_id: Uuid,
        change: &PointsChange,
        now: DateTime<Utc>,
    ) -> CommerceResult<(LoyaltyAccount, LoyaltyTransaction)>;

    /// Newest first.
    async fn list_transactions(&self, user_id: Uuid, page: PageRequest) -> CommerceResult<Page<LoyaltyTransaction>>;
}

#[async_trait]
pub trait GamificationStorage: Send + Sync {
    /// Refused when the code is taken.
    async fn create_badge(&self, badge: &Badge) -> CommerceResult<()>;

    /// Active badges by `sort_order`, then rarity.
    async fn list_badges(&self, include_secret: bool) -> CommerceResult<Vec<Badge>>;

    /// Newest first.
    async fn user_badges(&self, user_id: Uuid) -> CommerceResult<Vec<UserBadge>>;

    /// `None` when the user already holds the badge.
    async fn award_badge(&self, user_id: Uuid, badge_id: Uuid, now: DateTime<Utc>) -> CommerceResult<Option<UserBadge>>;

    /// Clears the new flag on every badge of the user; returns how many changed.
    async fn mark_badges_viewed(&self, user_id: Uuid, now: DateTime<Utc>) -> CommerceResult<u64>;

    /// Refused when the code is taken.
    async fn create_challenge(&self, challenge: &Challenge) -> CommerceResult<()>;

    /// With `open_at`, only challenges running at that instant. Easiest first,
    /// then by reward, highest first.
    async fn list_challenges(&self, open_at: Option<DateTime<Utc>>) -> CommerceResult<Vec<Challenge>>;

    /// Most recent progress first.
    async fn user_challenges(&self, user_id: Uuid) -> CommerceResult<Vec<UserChallenge>>;

    /// Adds to the user's open attempt, starting one when there is none. `None`
    /// when a challenge that cannot be repeated was already completed.
    async fn advance_challenge(
        &self,
        user_id: Uuid,
        challenge: &Challenge,
        amount: i64,
        now: DateTime<Utc>,
    ) -> CommerceResult<Option<UserChallenge>>;

    /// Marks the reward of a completed attempt as paid. Paying twice is a
    /// conflict, an unfinished attempt a validation error.
    async fn claim_challenge_reward(&self, attempt_id: Uuid, points: i64, now: DateTime<Utc>) -> CommerceResult<UserChallenge>;
}

#[async_trait]
pub trait CartStorage: Send + Sync {
    /// Oldest first.
    async fn cart_items(&self, user_id: Uuid) -> CommerceResult<Vec<CartItem>>;

    /// Adds to the item for the same product and variant, or creates one. The
    /// merged quantity must stay within `1..=MAX_LINE_QUANTITY`.
    async fn add_cart_item(&self, user_id: Uuid, line: CartLine, now: DateTime<Utc>) -> CommerceResult<CartItem>;

    /// Other users' items are reported as not found.
    async fn set_cart_quantity(&self, user_id: Uuid, item_id: Uuid, quantity: i32, now: DateTime<Utc>) -> CommerceResult<CartItem>;

    async fn remove_cart_item(&self, user_id: Uuid, item_id: Uuid) -> CommerceResult<()>;

    /// Returns the number of items removed.
    async fn clear_cart(&self, user_id: Uuid) -> CommerceResult<u64>;
}

/// Everything the API needs from a single backing store.
pub trait Store:
    CatalogStorage + OrderStorage + CouponStorage + DeliveryStorage + UserStorage + LoyaltyStorage + GamificationStorage + CartStorage
{
}

impl<T> Store for T where
    T: CatalogStorage
        + OrderStorage
        + CouponStorage
        + DeliveryStorage
        + UserStorage
        + LoyaltyStorage
        + GamificationStorage
        + CartStorage
{
}

/// A coupon can only be attached to a pending, unpaid order without one.
pub fn check_coupon_target(order: &Order) -> CommerceResult<()> {
    if order.coupon_id.is_some() {
        return Err(CommerceError::conflict("Order already has a coupon"));
    }
    if order.status != OrderStatus::Pending || order.payment_status == PaymentStatus::Paid {
        return Err(CommerceError::validation("Coupons can only be applied to pending orders"));
    }
    Ok(())
}
