use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use uuid::Uuid;

use crate::checkout::{apply_coupon_quote, check_quantity, merge_lines, CartLine};
use crate::coupons::{self, normalize_code, CouponContext, CouponQuote};
use crate::error::{CommerceError, CommerceResult, CouponRejection};
use crate::loyalty;
use crate::model::*;
use crate::products::ProductEdit;
use crate::status::{advance_delivery, check_order_transition, check_payment_transition, order_status_for_delivery};

use super::{
    check_coupon_target, CartStorage, CatalogStorage, CouponStorage, DeliveryStorage, GamificationStorage, LoyaltyStorage,
    OrderStorage, UserStorage,
};

#[derive(Default)]
struct State {
    categories: HashMap<Uuid, Category>,
    products: HashMap<Uuid, Product>,
    orders: HashMap<Uuid, Order>,
    tracking: Vec<OrderTrackingEvent>,
    coupons: HashMap<Uuid, Coupon>,
    usages: Vec<CouponUsage>,
    deliveries: HashMap<Uuid, Delivery>,
    users: HashMap<Uuid, User>,
    accounts: HashMap<Uuid, LoyaltyAccount>,
    loyalty_log: Vec<LoyaltyTransaction>,
    badges: HashMap<Uuid, Badge>,
    user_badges: Vec<UserBadge>,
    challenges: HashMap<Uuid, Challenge>,
    attempts: HashMap<Uuid, UserChallenge>,
    cart: HashMap<Uuid, CartItem>,
}

impl State {
    fn available_stock(&self, item: &OrderItem) -> CommerceResult<i32> {
        let product = self
            .products
            .get(&item.product_id)
            .filter(|p| p.is_active)
            .ok_or_else(|| CommerceError::not_found(format!("Product {}", item.product_id)))?;
        match item.variant_id {
            Some(variant_id) => product
                .variant(variant_id)
                .filter(|v| v.is_active)
                .map(|v| v.stock)
                .ok_or_else(|| CommerceError::not_found(format!("Variant {}", variant_id))),
            None => Ok(product.stock),
        }
    }

    fn adjust_stock(&mut self, items: &[OrderItem], direction: i32) {
        for item in items {
            let Some(product) = self.products.get_mut(&item.product_id) else {
                continue;
            };
            let delta = item.quantity * direction;
            match item.variant_id {
                Some(variant_id) => {
                    if let Some(variant) = product.variants.iter_mut().find(|v| v.id == variant_id) {
                        variant.stock += delta;
                    }
                }
                None => product.stock += delta,
            }
        }
    }

    /// Validates a claim against the current coupon row without mutating anything.
    fn quote_claim(
        &self,
        claim: &CouponClaim,
        order_id: Uuid,
        subtotal: Decimal,
        product_ids: &[Uuid],
        now: DateTime<Utc>,
    ) -> CommerceResult<(CouponQuote, CouponUsage)> {
        let code = normalize_code(&claim.code);
        let coupon = self
            .coupons
            .values()
            .find(|c| c.code == code)
            .ok_or(CouponRejection::NotFound)?;
        let used = self
            .usages
            .iter()
            .filter(|u| u.coupon_id == coupon.id && u.user_id == claim.user_id)
            .count() as i64;
        let ctx = CouponContext { subtotal, product_ids, user_usage_count: Some(used) };
        let quote = coupons::validate(coupon, &ctx, now)?;
        let usage = CouponUsage {
            id: Uuid::new_v4(),
            coupon_id: coupon.id,
            user_id: claim.user_id,
            order_id,
            discount_amount: quote.discount,
            used_at: now,
        };
        Ok((quote, usage))
    }

    fn record_usage(&mut self, usage: CouponUsage, now: DateTime<Utc>) {
        if let Some(coupon) = self.coupons.get_mut(&usage.coupon_id) {
            coupon.times_used += 1;
            coupon.total_discount += usage.discount_amount;
            coupon.updated_at = now;
        }
        self.usages.push(usage);
    }

    fn order_mut(&mut self, id: Uuid) -> CommerceResult<&mut Order> {
        self.orders
            .get_mut(&id)
            .ok_or_else(|| CommerceError::not_found(format!("Order {}", id)))
    }

    fn cancel(&mut self, id: Uuid, reason: String, actor: Option<Uuid>, now: DateTime<Utc>) -> CommerceResult<Order> {
        let order = self.order_mut(id)?;
        check_order_transition(order.status, OrderStatus::Cancelled)?;
        order.status = OrderStatus::Cancelled;
        order.cancelled_at = Some(now);
        order.cancel_reason = Some(reason.clone());
        order.updated_at = now;
        let order = order.clone();

        self.adjust_stock(&order.items, 1);
        for delivery in self.deliveries.values_mut().filter(|d| d.order_id == id && d.is_open()) {
            delivery.status = DeliveryStatus::Failed;
            delivery.updated_at = now;
        }
        self.tracking.push(OrderTrackingEvent::new(
            id,
            OrderStatus::Cancelled,
            format!("Order cancelled: {}", reason),
            actor,
            now,
        ));
        Ok(order)
    }

    /// Any move except cancellation.
    fn advance_order(
        &mut self,
        id: Uuid,
        to: OrderStatus,
        note: Option<String>,
        actor: Option<Uuid>,
        now: DateTime<Utc>,
    ) -> CommerceResult<Order> {
        let order = self.order_mut(id)?;
        check_order_transition(order.status, to)?;
        order.status = to;
        order.updated_at = now;
        if to == OrderStatus::Delivered {
            order.delivered_at = Some(now);
        }
        let order = order.clone();
        self.tracking.push(OrderTrackingEvent::new(
            id,
            to,
            note.unwrap_or_else(|| to.description().to_string()),
            actor,
            now,
        ));
        Ok(order)
    }

    fn driver_delivery(&self, id: Uuid, driver_id: Uuid) -> CommerceResult<&Delivery> {
        self.deliveries
            .get(&id)
            .filter(|d| d.driver_id == driver_id)
            .ok_or_else(|| CommerceError::not_found(format!("Delivery {}", id)))
    }
}

/// Process-local store used by tests and the demo backend.
#[derive(Default)]
pub struct InMemoryStore {
    state: Mutex<State>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> CommerceResult<MutexGuard<'_, State>> {
        self.state
            .lock()
            .map_err(|_| CommerceError::storage("in-memory store lock poisoned"))
    }

    /// Stores an order as is, skipping checkout.
    #[cfg(test)]
    pub(crate) fn insert_order(&self, order: Order) {
        if let Ok(mut state) = self.state() {
            state.orders.insert(order.id, order);
        }
    }
}

#[async_trait]
impl CatalogStorage for InMemoryStore {
    async fn list_categories(&self, include_inactive: bool) -> CommerceResult<Vec<Category>> {
        let state = self.state()?;
        let mut categories: Vec<Category> = state
            .categories
            .values()
            .filter(|c| include_inactive || c.is_active)
            .cloned()
            .collect();
        categories.sort_by(|a, b| a.sort_order.cmp(&b.sort_order).then_with(|| a.name.cmp(&b.name)));
        Ok(categories)
    }

    async fn find_category(&self, id_or_slug: &str) -> CommerceResult<Option<Category>> {
        let state = self.state()?;
        Ok(state
            .categories
            .values()
            .find(|c| matches_id_or_slug(c.id, &c.slug, id_or_slug))
            .cloned())
    }

    async fn create_category(&self, category: &Category) -> CommerceResult<()> {
        let mut state = self.state()?;
        if state.categories.values().any(|c| c.slug == category.slug) {
            return Err(CommerceError::conflict(format!("Category slug '{}' already exists", category.slug)));
        }
        state.categories.insert(category.id, category.clone());
        Ok(())
    }

    async fn update_category(&self, category: &Category) -> CommerceResult<()> {
        let mut state = self.state()?;
        if !state.categories.contains_key(&category.id) {
            return Err(CommerceError::not_found(format!("Category {}", category.id)));
        }
        if state.categories.values().any(|c| c.slug == category.slug && c.id != category.id) {
            return Err(CommerceError::conflict(format!("Category slug '{}' already exists", category.slug)));
        }
        state.categories.insert(category.id, category.clone());
        Ok(())
    }

    async fn delete_category(&self, id: Uuid) -> CommerceResult<()> {
        let mut state = self.state()?;
        if !state.categories.contains_key(&id) {
            return Err(CommerceError::not_found(format!("Category {}", id)));
        }
        let in_use = state.products.values().filter(|p| p.category_id == id).count();
        if in_use > 0 {
            return Err(CommerceError::conflict(format!("Category has {} products", in_use)));
        }
        state.categories.remove(&id);
        Ok(())
    }

    async fn list_products(&self, filter: &ProductFilter, page: PageRequest) -> CommerceResult<Page<Product>> {
        let state = self.state()?;
        let mut products: Vec<Product> = state.products.values().filter(|p| filter.matches(p)).cloned().collect();
        filter.sort(&mut products);
        Ok(page.apply(products))
    }

    async fn all_products(&self) -> CommerceResult<Vec<Product>> {
        let state = self.state()?;
        let mut products: Vec<Product> = state.products.values().cloned().collect();
        products.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(products)
    }

    async fn find_product(&self, id_or_slug: &str) -> CommerceResult<Option<Product>> {
        let state = self.state()?;
        Ok(state
            .products
            .values()
            .find(|p| matches_id_or_slug(p.id, &p.slug, id_or_slug))
            .cloned())
    }

    async fn products_by_ids(&self, ids: &[Uuid]) -> CommerceResult<Vec<Product>> {
        let state = self.state()?;
        Ok(ids.iter().filter_map(|id| state.products.get(id).cloned()).collect())
    }

    async fn create_product(&self, product: &Product) -> CommerceResult<()> {
        let mut state = self.state()?;
        check_product_uniqueness(&state, product)?;
        state.products.insert(product.id, product.clone());
        Ok(())
    }

    async fn edit_product(&self, id: Uuid, edit: ProductEdit, now: DateTime<Utc>) -> CommerceResult<Product> {
        let mut state = self.state()?;
        let mut product = state
            .products
            .get(&id)
            .cloned()
            .ok_or_else(|| CommerceError::not_found(format!("Product {}", id)))?;
        edit.apply(&mut product, now)?;
        check_product_uniqueness(&state, &product)?;
        state.products.insert(id, product.clone());
        Ok(product)
    }
}

fn check_product_uniqueness(state: &State, product: &Product) -> CommerceResult<()> {
    if !state.categories.contains_key(&product.category_id) {
        return Err(CommerceError::validation(format!("Category {} does not exist", product.category_id)));
    }
    for other in state.products.values().filter(|p| p.id != product.id) {
        if other.slug == product.slug {
            return Err(CommerceError::conflict(format!("Product slug '{}' already exists", product.slug)));
        }
        if other.sku == product.sku {
            return Err(CommerceError::conflict(format!("Product SKU '{}' already exists", product.sku)));
        }
    }
    Ok(())
}

#[async_trait]
impl OrderStorage for InMemoryStore {
    async fn place_order(&self, new_order: NewOrder) -> CommerceResult<Order> {
        let mut state = self.state()?;
        for item in &new_order.items {
            if item.quantity > state.available_stock(item)? {
                return Err(CommerceError::InsufficientStock(item.name.clone()));
            }
        }

        let redemption = match &new_order.coupon {
            Some(claim) => {
                let product_ids: Vec<Uuid> = new_order.items.iter().map(|i| i.product_id).collect();
                Some(state.quote_claim(claim, new_order.id, new_order.totals.subtotal, &product_ids, new_order.created_at)?)
            }
            None => None,
        };

        let now = new_order.created_at;
        state.adjust_stock(&new_order.items, -1);
        let (totals, coupon_id) = match redemption {
            Some((quote, usage)) => {
                let totals = apply_coupon_quote(new_order.totals, &quote);
                state.record_usage(usage, now);
                (totals, Some(quote.coupon_id))
            }
            None => (new_order.totals, None),
        };

        let order = new_order.into_order(totals, coupon_id);
        state.tracking.push(OrderTrackingEvent::new(
            order.id,
            OrderStatus::Pending,
            OrderStatus::Pending.description(),
            Some(order.user_id),
            now,
        ));
        state.orders.insert(order.id, order.clone());
        Ok(order)
    }

    async fn get_order(&self, id: Uuid) -> CommerceResult<Option<Order>> {
        Ok(self.state()?.orders.get(&id).cloned())
    }

    async fn list_orders(&self, filter: &OrderFilter, page: PageRequest) -> CommerceResult<Page<Order>> {
        let orders = self.find_orders(filter).await?;
        Ok(page.apply(orders))
    }

    async fn find_orders(&self, filter: &OrderFilter) -> CommerceResult<Vec<Order>> {
        let state = self.state()?;
        let mut orders: Vec<Order> = state.orders.values().filter(|o| filter.matches(o)).cloned().collect();
        orders.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(orders)
    }

    async fn transition_order(
        &self,
        id: Uuid,
        to: OrderStatus,
        note: Option<String>,
        actor: Option<Uuid>,
        now: DateTime<Utc>,
    ) -> CommerceResult<Order> {
        let mut state = self.state()?;
        if to == OrderStatus::Cancelled {
            let reason = note.unwrap_or_else(|| "Cancelled by staff".to_string());
            return state.cancel(id, reason, actor, now);
        }

        state.advance_order(id, to, note, actor, now)
    }

    async fn cancel_order(&self, id: Uuid, reason: String, actor: Option<Uuid>, now: DateTime<Utc>) -> CommerceResult<Order> {
        self.state()?.cancel(id, reason, actor, now)
    }

    async fn update_payment_status(&self, id: Uuid, to: PaymentStatus, now: DateTime<Utc>) -> CommerceResult<Order> {
        let mut state = self.state()?;
        let order = state.order_mut(id)?;
        check_payment_transition(order.payment_status, to)?;
        order.payment_status = to;
        order.updated_at = now;
        if to == PaymentStatus::Paid {
            order.paid_at = Some(now);
        }
        Ok(order.clone())
    }

    async fn apply_coupon(&self, order_id: Uuid, claim: &CouponClaim, now: DateTime<Utc>) -> CommerceResult<(Order, CouponUsage)> {
        let mut state = self.state()?;
        let order = state
            .orders
            .get(&order_id)
            .filter(|o| o.user_id == claim.user_id)
            .ok_or_else(|| CommerceError::not_found(format!("Order {}", order_id)))?;
        check_coupon_target(order)?;

        let (quote, usage) = state.quote_claim(claim, order_id, order.totals.subtotal, &order.product_ids(), now)?;
        state.record_usage(usage.clone(), now);

        let order = state.order_mut(order_id)?;
        order.totals = apply_coupon_quote(order.totals, &quote);
        order.coupon_id = Some(quote.coupon_id);
        order.updated_at = now;
        Ok((order.clone(), usage))
    }

    async fn tracking_events(&self, order_id: Uuid) -> CommerceResult<Vec<OrderTrackingEvent>> {
        let state = self.state()?;
        let mut events: Vec<OrderTrackingEvent> =
            state.tracking.iter().filter(|e| e.order_id == order_id).cloned().collect();
        events.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(events)
    }
}

#[async_trait]
impl CouponStorage for InMemoryStore {
    async fn create_coupon(&self, coupon: &Coupon) -> CommerceResult<()> {
        let mut state = self.state()?;
        if state.coupons.values().any(|c| c.code == coupon.code) {
            return Err(CommerceError::conflict(format!("Coupon code '{}' already exists", coupon.code)));
        }
        state.coupons.insert(coupon.id, coupon.clone());
        Ok(())
    }

    async fn update_coupon(&self, coupon: &Coupon) -> CommerceResult<()> {
        let mut state = self.state()?;
        let stored = state
            .coupons
            .get_mut(&coupon.id)
            .ok_or_else(|| CommerceError::not_found(format!("Coupon {}", coupon.id)))?;
        // Counters belong to redemptions, never to admin edits.
        let (times_used, total_discount) = (stored.times_used, stored.total_discount);
        *stored = Coupon { times_used, total_discount, ..coupon.clone() };
        Ok(())
    }

    async fn delete_coupon(&self, id: Uuid) -> CommerceResult<()> {
        let mut state = self.state()?;
        if !state.coupons.contains_key(&id) {
            return Err(CommerceError::not_found(format!("Coupon {}", id)));
        }
        if state.usages.iter().any(|u| u.coupon_id == id) {
            return Err(CommerceError::conflict("Coupon has been redeemed; deactivate it instead"));
        }
        state.coupons.remove(&id);
        Ok(())
    }

    async fn get_coupon(&self, id: Uuid) -> CommerceResult<Option<Coupon>> {
        Ok(self.state()?.coupons.get(&id).cloned())
    }

    async fn find_coupon_by_code(&self, code: &str) -> CommerceResult<Option<Coupon>> {
        let code = normalize_code(code);
        Ok(self.state()?.coupons.values().find(|c| c.code == code).cloned())
    }

    async fn list_coupons(&self, filter: &CouponFilter, page: PageRequest) -> CommerceResult<Page<Coupon>> {
        let mut coupons: Vec<Coupon> = self.all_coupons().await?.into_iter().filter(|c| filter.matches(c)).collect();
        coupons.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(page.apply(coupons))
    }

    async fn all_coupons(&self) -> CommerceResult<Vec<Coupon>> {
        let state = self.state()?;
        let mut coupons: Vec<Coupon> = state.coupons.values().cloned().collect();
        coupons.sort_by(|a, b| a.code.cmp(&b.code));
        Ok(coupons)
    }

    async fn count_user_usages(&self, coupon_id: Uuid, user_id: Uuid) -> CommerceResult<i64> {
        let state = self.state()?;
        Ok(state
            .usages
            .iter()
            .filter(|u| u.coupon_id == coupon_id && u.user_id == user_id)
            .count() as i64)
    }

    async fn user_usages(&self, user_id: Uuid) -> CommerceResult<Vec<CouponUsage>> {
        let state = self.state()?;
        let mut usages: Vec<CouponUsage> = state.usages.iter().filter(|u| u.user_id == user_id).cloned().collect();
        usages.sort_by(|a, b| b.used_at.cmp(&a.used_at));
        Ok(usages)
    }
}

#[async_trait]
impl DeliveryStorage for InMemoryStore {
    async fn create_delivery(&self, delivery: &Delivery) -> CommerceResult<()> {
        let mut state = self.state()?;
        if state.deliveries.values().any(|d| d.order_id == delivery.order_id && d.is_open()) {
            return Err(CommerceError::conflict("Order already has an open delivery"));
        }
        state.deliveries.insert(delivery.id, delivery.clone());
        Ok(())
    }

    async fn get_delivery(&self, id: Uuid) -> CommerceResult<Option<Delivery>> {
        Ok(self.state()?.deliveries.get(&id).cloned())
    }

    async fn latest_delivery_for_order(&self, order_id: Uuid) -> CommerceResult<Option<Delivery>> {
        let state = self.state()?;
        Ok(state
            .deliveries
            .values()
            .filter(|d| d.order_id == order_id)
            .max_by_key(|d| d.created_at)
            .cloned())
    }

    async fn list_deliveries(&self, driver_id: Uuid, status: Option<DeliveryStatus>) -> CommerceResult<Vec<Delivery>> {
        let state = self.state()?;
        let mut deliveries: Vec<Delivery> = state
            .deliveries
            .values()
            .filter(|d| d.driver_id == driver_id && status.is_none_or(|s| d.status == s))
            .cloned()
            .collect();
        deliveries.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(deliveries)
    }

    async fn transition_delivery(
        &self,
        id: Uuid,
        driver_id: Uuid,
        to: DeliveryStatus,
        notes: Option<String>,
        now: DateTime<Utc>,
    ) -> CommerceResult<DeliveryProgress> {
        let mut state = self.state()?;
        let mut delivery = state.driver_delivery(id, driver_id)?.clone();
        advance_delivery(&mut delivery, to, notes, now)?;
        let order = state
            .orders
            .get(&delivery.order_id)
            .cloned()
            .ok_or_else(|| CommerceError::not_found(format!("Order {}", delivery.order_id)))?;

        let progress = match order_status_for_delivery(to, order.status) {
            Some(target) => {
                let order = state.advance_order(order.id, target, None, Some(driver_id), now)?;
                DeliveryProgress { delivery, order, order_changed: true }
            }
            None => DeliveryProgress { delivery, order, order_changed: false },
        };
        state.deliveries.insert(id, progress.delivery.clone());
        Ok(progress)
    }

    async fn record_location(&self, id: Uuid, driver_id: Uuid, point: GeoPoint, now: DateTime<Utc>) -> CommerceResult<Delivery> {
        let mut state = self.state()?;
        state.driver_delivery(id, driver_id)?;
        let delivery = state
            .deliveries
            .get_mut(&id)
            .ok_or_else(|| CommerceError::not_found(format!("Delivery {}", id)))?;
        if !delivery.is_open() {
            return Err(CommerceError::validation(format!("Delivery is already {}", delivery.status)));
        }
        delivery.current_location = Some(point);
        delivery.location_updated_at = Some(now);
        delivery.updated_at = now;
        Ok(delivery.clone())
    }

    async fn rate_delivery(&self, id: Uuid, rating: i16, now: DateTime<Utc>) -> CommerceResult<Delivery> {
        let mut state = self.state()?;
        let delivery = state
            .deliveries
            .get_mut(&id)
            .ok_or_else(|| CommerceError::not_found(format!("Delivery {}", id)))?;
        if delivery.status != DeliveryStatus::Delivered {
            return Err(CommerceError::validation("Only delivered orders can be rated"));
        }
        if delivery.rating.is_some() {
            return Err(CommerceError::conflict("Delivery already rated"));
        }
        delivery.rating = Some(rating);
        delivery.updated_at = now;
        Ok(delivery.clone())
    }
}

#[async_trait]
impl UserStorage for InMemoryStore {
    async fn create_user(&self, user: &User) -> CommerceResult<()> {
        let mut state = self.state()?;
        if state.users.values().any(|u| u.email.eq_ignore_ascii_case(&user.email)) {
            return Err(CommerceError::conflict("Email is already registered"));
        }
        state.users.insert(user.id, user.clone());
        Ok(())
    }

    async fn get_user(&self, id: Uuid) -> CommerceResult<Option<User>> {
        Ok(self.state()?.users.get(&id).cloned())
    }

    async fn find_user_by_email(&self, email: &str) -> CommerceResult<Option<User>> {
        let state = self.state()?;
        Ok(state.users.values().find(|u| u.email.eq_ignore_ascii_case(email.trim())).cloned())
    }

    async fn list_users(&self, filter: &UserFilter, page: PageRequest) -> CommerceResult<Page<User>> {
        let state = self.state()?;
        let mut users: Vec<User> = state.users.values().filter(|u| filter.matches(u)).cloned().collect();
        users.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(page.apply(users))
    }

    async fn users_by_ids(&self, ids: &[Uuid]) -> CommerceResult<Vec<User>> {
        let state = self.state()?;
        Ok(ids.iter().filter_map(|id| state.users.get(id).cloned()).collect())
    }

    async fn update_user(&self, user: &User) -> CommerceResult<()> {
        let mut state = self.state()?;
        let stored = state
            .users
            .get_mut(&user.id)
            .ok_or_else(|| CommerceError::not_found(format!("User {}", user.id)))?;
        *stored = user.clone();
        Ok(())
    }

    async fn count_users(&self, role: Option<UserRole>) -> CommerceResult<u64> {
        let state = self.state()?;
        Ok(state.users.values().filter(|u| role.is_none_or(|r| u.role == r)).count() as u64)
    }
}

#[async_trait]
impl LoyaltyStorage for InMemoryStore {
    async fn get_account(&self, user_id: Uuid) -> CommerceResult<Option<LoyaltyAccount>> {
        Ok(self.state()?.accounts.get(&user_id).cloned())
    }

    async fn record_points(
        &self,
        user_id: Uuid,
        change: &PointsChange,
        now: DateTime<Utc>,
    ) -> CommerceResult<(LoyaltyAccount, LoyaltyTransaction)> {
        let mut state = self.state()?;
        if let PointsChange::Earn { order_id: Some(order_id), .. } = change {
            let already = state
                .loyalty_log
                .iter()
                .any(|t| t.user_id == user_id && t.order_id == Some(*order_id) && t.kind == LoyaltyTransactionKind::Earned);
            if already {
                return Err(CommerceError::conflict(format!("Points for order {} already awarded", order_id)));
            }
        }

        let mut account = state
            .accounts
            .get(&user_id)
            .cloned()
            .unwrap_or_else(|| LoyaltyAccount::new(user_id, now));
        let transaction = loyalty::apply_change(&mut account, change, now)?;
        state.accounts.insert(user_id, account.clone());
        state.loyalty_log.push(transaction.clone());
        Ok((account, transaction))
    }

    async fn list_transactions(&self, user_id: Uuid, page: PageRequest) -> CommerceResult<Page<LoyaltyTransaction>> {
        let state = self.state()?;
        let mut log: Vec<LoyaltyTransaction> = state.loyalty_log.iter().filter(|t| t.user_id == user_id).cloned().collect();
        log.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(page.apply(log))
    }
}

#[async_trait]
impl GamificationStorage for InMemoryStore {
    async fn create_badge(&self, badge: &Badge) -> CommerceResult<()> {
        let mut state = self.state()?;
        if state.badges.values().any(|b| b.code == badge.code) {
            return Err(CommerceError::conflict(format!("Badge '{}' already exists", badge.code)));
        }
        state.badges.insert(badge.id, badge.clone());
        Ok(())
    }

    async fn list_badges(&self, include_secret: bool) -> CommerceResult<Vec<Badge>> {
        let state = self.state()?;
        let mut badges: Vec<Badge> = state
            .badges
            .values()
            .filter(|b| b.is_active && (include_secret || !b.is_secret))
            .cloned()
            .collect();
        badges.sort_by(|a, b| {
            a.sort_order
                .cmp(&b.sort_order)
                .then_with(|| a.rarity.cmp(&b.rarity))
                .then_with(|| a.code.cmp(&b.code))
        });
        Ok(badges)
    }

    async fn user_badges(&self, user_id: Uuid) -> CommerceResult<Vec<UserBadge>> {
        let state = self.state()?;
        let mut held: Vec<UserBadge> = state.user_badges.iter().filter(|b| b.user_id == user_id).cloned().collect();
        held.sort_by(|a, b| b.earned_at.cmp(&a.earned_at));
        Ok(held)
    }

    async fn award_badge(&self, user_id: Uuid, badge_id: Uuid, now: DateTime<Utc>) -> CommerceResult<Option<UserBadge>> {
        let mut state = self.state()?;
        if !state.badges.contains_key(&badge_id) {
            return Err(CommerceError::not_found(format!("Badge {}", badge_id)));
        }
        if state.user_badges.iter().any(|b| b.user_id == user_id && b.badge_id == badge_id) {
            return Ok(None);
        }
        let earned = UserBadge::new(user_id, badge_id, now);
        state.user_badges.push(earned.clone());
        Ok(Some(earned))
    }

    async fn mark_badges_viewed(&self, user_id: Uuid, now: DateTime<Utc>) -> CommerceResult<u64> {
        let mut state = self.state()?;
        let mut changed = 0;
        for held in state.user_badges.iter_mut().filter(|b| b.user_id == user_id && b.is_new) {
            held.is_new = false;
            held.viewed_at = Some(now);
            changed += 1;
        }
        Ok(changed)
    }

    async fn create_challenge(&self, challenge: &Challenge) -> CommerceResult<()> {
        let mut state = self.state()?;
        if state.challenges.values().any(|c| c.code == challenge.code) {
            return Err(CommerceError::conflict(format!("Challenge '{}' already exists", challenge.code)));
        }
        state.challenges.insert(challenge.id, challenge.clone());
        Ok(())
    }

    async fn list_challenges(&self, open_at: Option<DateTime<Utc>>) -> CommerceResult<Vec<Challenge>> {
        let state = self.state()?;
        let mut challenges: Vec<Challenge> = state
            .challenges
            .values()
            .filter(|c| open_at.is_none_or(|now| c.is_open_at(now)))
            .cloned()
            .collect();
        challenges.sort_by(|a, b| {
            a.difficulty
                .cmp(&b.difficulty)
                .then_with(|| b.points_reward.cmp(&a.points_reward))
                .then_with(|| a.code.cmp(&b.code))
        });
        Ok(challenges)
    }

    async fn user_challenges(&self, user_id: Uuid) -> CommerceResult<Vec<UserChallenge>> {
        let state = self.state()?;
        let mut attempts: Vec<UserChallenge> = state.attempts.values().filter(|a| a.user_id == user_id).cloned().collect();
        attempts.sort_by(|a, b| b.last_progress_at.cmp(&a.last_progress_at));
        Ok(attempts)
    }

    async fn advance_challenge(
        &self,
        user_id: Uuid,
        challenge: &Challenge,
        amount: i64,
        now: DateTime<Utc>,
    ) -> CommerceResult<Option<UserChallenge>> {
        let mut state = self.state()?;
        let mine = || state.attempts.values().filter(|a| a.user_id == user_id && a.challenge_id == challenge.id);
        let open = mine().find(|a| !a.is_completed).cloned();
        let mut attempt = match open {
            Some(attempt) => attempt,
            None if !challenge.is_repeatable && mine().any(|a| a.is_completed) => return Ok(None),
            None => UserChallenge::start(user_id, challenge, now),
        };
        attempt.advance(amount, now);
        state.attempts.insert(attempt.id, attempt.clone());
        Ok(Some(attempt))
    }

    async fn claim_challenge_reward(&self, attempt_id: Uuid, points: i64, now: DateTime<Utc>) -> CommerceResult<UserChallenge> {
        let mut state = self.state()?;
        let attempt = state
            .attempts
            .get_mut(&attempt_id)
            .ok_or_else(|| CommerceError::not_found(format!("Challenge attempt {}", attempt_id)))?;
        if !attempt.is_completed {
            return Err(CommerceError::validation("Challenge is not completed yet"));
        }
        if attempt.reward_claimed {
            return Err(CommerceError::conflict("Challenge reward already claimed"));
        }
        attempt.reward_claimed = true;
        attempt.claimed_at = Some(now);
        attempt.points_earned = points;
        Ok(attempt.clone())
    }
}

#[async_trait]
impl CartStorage for InMemoryStore {
    async fn cart_items(&self, user_id: Uuid) -> CommerceResult<Vec<CartItem>> {
        let state = self.state()?;
        let mut items: Vec<CartItem> = state.cart.values().filter(|i| i.user_id == user_id).cloned().collect();
        items.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
        Ok(items)
    }

    async fn add_cart_item(&self, user_id: Uuid, line: CartLine, now: DateTime<Utc>) -> CommerceResult<CartItem> {
        let mut state = self.state()?;
        let existing = state.cart.values().find(|i| i.user_id == user_id && i.holds(&line)).cloned();
        let item = match existing {
            Some(mut item) => {
                let merged = merge_lines(&[item.line(), line])?;
                item.quantity = merged.first().map_or(item.quantity, |m| m.quantity);
                item.updated_at = now;
                item
            }
            None => {
                check_quantity(line.quantity)?;
                CartItem::new(user_id, line, now)
            }
        };
        state.cart.insert(item.id, item.clone());
        Ok(item)
    }

    async fn set_cart_quantity(&self, user_id: Uuid, item_id: Uuid, quantity: i32, now: DateTime<Utc>) -> CommerceResult<CartItem> {
        check_quantity(quantity)?;
        let mut state = self.state()?;
        let item = state
            .cart
            .get_mut(&item_id)
            .filter(|i| i.user_id == user_id)
            .ok_or_else(|| CommerceError::not_found(format!("Cart item {}", item_id)))?;
        item.quantity = quantity;
        item.updated_at = now;
        Ok(item.clone())
    }

    async fn remove_cart_item(&self, user_id: Uuid, item_id: Uuid) -> CommerceResult<()> {
        let mut state = self.state()?;
        match state.cart.get(&item_id) {
            Some(item) if item.user_id == user_id => {
                state.cart.remove(&item_id);
                Ok(())
            }
            _ => Err(CommerceError::not_found(format!("Cart item {}", item_id))),
        }
    }

    async fn clear_cart(&self, user_id: Uuid) -> CommerceResult<u64> {
        let mut state = self.state()?;
        let before = state.cart.len();
        state.cart.retain(|_, item| item.user_id != user_id);
        Ok((before - state.cart.len()) as u64)
    }
}
