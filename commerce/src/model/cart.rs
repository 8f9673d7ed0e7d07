use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::checkout::CartLine;

/// A product, or one of its variants, saved in a customer's cart. A cart
/// holds at most one item per product and variant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CartItem {
    pub id: Uuid,
    pub user_id: Uuid,
    pub product_id: Uuid,
    pub variant_id: Option<Uuid>,
    pub quantity: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl CartItem {
    pub fn new(user_id: Uuid, line: CartLine, now: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            user_id,
            product_id: line.product_id,
            variant_id: line.variant_id,
            quantity: line.quantity,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn line(&self) -> CartLine {
        CartLine { product_id: self.product_id, variant_id: self.variant_id, quantity: self.quantity }
    }

    pub fn holds(&self, line: &CartLine) -> bool {
        self.product_id == line.product_id && self.variant_id == line.variant_id
    }
}
