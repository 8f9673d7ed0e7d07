use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::debug;
use uuid::Uuid;

use crate::cart::{cart_view, CartSummary, CartView};
use crate::checkout::{check_quantity, price_lines, CartLine, PricingRules};
use crate::error::{CommerceError, CommerceResult};
use crate::model::CartItem;
use crate::storage::{CartStorage, CatalogStorage};

/// The customer's saved cart. Writes are checked against the catalog the same
/// way checkout checks them, so a saved cart can always be bought as saved
/// until stock or prices change.
#[derive(Clone)]
pub struct CartService {
    carts: Arc<dyn CartStorage>,
    catalog: Arc<dyn CatalogStorage>,
    pricing: PricingRules,
}

impl CartService {
    pub fn new(carts: Arc<dyn CartStorage>, catalog: Arc<dyn CatalogStorage>, pricing: PricingRules) -> Self {
        Self { carts, catalog, pricing }
    }

    pub async fn view(&self, user_id: Uuid) -> CommerceResult<CartView> {
        let items = self.carts.cart_items(user_id).await?;
        let ids: Vec<Uuid> = items.iter().map(|i| i.product_id).collect();
        let products = self.catalog.products_by_ids(&ids).await?;
        Ok(cart_view(items, &products, &self.pricing))
    }

    pub async fn summary(&self, user_id: Uuid) -> CommerceResult<CartSummary> {
        Ok(self.view(user_id).await?.summary)
    }

    /// Adds to the matching item when there is one. The merged quantity must
    /// be in stock.
    pub async fn add(&self, user_id: Uuid, line: CartLine, now: DateTime<Utc>) -> CommerceResult<(CartItem, CartView)> {
        check_quantity(line.quantity)?;
        let existing = self.carts.cart_items(user_id).await?.into_iter().find(|i| i.holds(&line));
        let mut lines = vec![line];
        lines.extend(existing.map(|i| i.line()));
        self.check_lines(&lines).await?;

        let item = self.carts.add_cart_item(user_id, line, now).await?;
        debug!(user_id = %user_id, product_id = %item.product_id, quantity = item.quantity, "Cart item saved");
        Ok((item, self.view(user_id).await?))
    }

    pub async fn update_quantity(
        &self,
        user_id: Uuid,
        item_id: Uuid,
        quantity: i32,
        now: DateTime<Utc>,
    ) -> CommerceResult<(CartItem, CartView)> {
        check_quantity(quantity)?;
        let item = self
            .carts
            .cart_items(user_id)
            .await?
            .into_iter()
            .find(|i| i.id == item_id)
            .ok_or_else(|| CommerceError::not_found(format!("Cart item {}", item_id)))?;
        self.check_lines(&[CartLine { quantity, ..item.line() }]).await?;

        let item = self.carts.set_cart_quantity(user_id, item_id, quantity, now).await?;
        Ok((item, self.view(user_id).await?))
    }

    pub async fn remove(&self, user_id: Uuid, item_id: Uuid) -> CommerceResult<CartView> {
        self.carts.remove_cart_item(user_id, item_id).await?;
        self.view(user_id).await
    }

    pub async fn clear(&self, user_id: Uuid) -> CommerceResult<u64> {
        let removed = self.carts.clear_cart(user_id).await?;
        debug!(user_id = %user_id, removed, "Cart cleared");
        Ok(removed)
    }

    async fn check_lines(&self, lines: &[CartLine]) -> CommerceResult<()> {
        let ids: Vec<Uuid> = lines.iter().map(|l| l.product_id).collect();
        let products = self.catalog.products_by_ids(&ids).await?;
        price_lines(lines, &products).map(|_| ())
    }
}
