use chrono::{DateTime, TimeZone, Utc};
use rust_decimal::Decimal;
use uuid::Uuid;

use crate::model::*;

pub fn at(y: i32, m: u32, d: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(y, m, d, 12, 0, 0).single().unwrap_or_else(Utc::now)
}

pub fn category(name: &str) -> Category {
    let now = at(2024, 1, 1);
    Category {
        id: Uuid::new_v4(),
        name: name.to_string(),
        slug: slugify(name),
        description: None,
        image_url: None,
        sort_order: 0,
        is_active: true,
        created_at: now,
        updated_at: now,
    }
}

pub fn product(category_id: Uuid, name: &str, price: Decimal, stock: i32) -> Product {
    let now = at(2024, 1, 1);
    let slug = slugify(name);
    Product {
        id: Uuid::new_v4(),
        name: name.to_string(),
        sku: format!("SKU-{}", slug.to_uppercase()),
        slug,
        description: None,
        price,
        compare_price: None,
        stock,
        unit: "kg".to_string(),
        category_id,
        is_active: true,
        is_featured: false,
        images: Vec::new(),
        variants: Vec::new(),
        created_at: now,
        updated_at: now,
    }
}

pub fn user(email: &str, role: UserRole) -> User {
    let now = at(2024, 1, 1);
    User {
        id: Uuid::new_v4(),
        email: email.to_string(),
        password_hash: String::new(),
        first_name: "Test".to_string(),
        last_name: "User".to_string(),
        phone: None,
        role,
        is_active: true,
        last_login_at: None,
        created_at: now,
        updated_at: now,
    }
}

pub fn coupon(code: &str, coupon_type: CouponType, value: Decimal) -> Coupon {
    let now = at(2024, 1, 1);
    Coupon {
        id: Uuid::new_v4(),
        code: code.to_string(),
        name: code.to_string(),
        description: None,
        coupon_type,
        value,
        min_purchase: None,
        max_discount: None,
        max_usage: None,
        max_usage_per_user: DEFAULT_MAX_USAGE_PER_USER,
        times_used: 0,
        total_discount: Decimal::ZERO,
        valid_from: now,
        valid_until: None,
        is_active: true,
        is_public: true,
        applicable_products: Vec::new(),
        excluded_products: Vec::new(),
        created_at: now,
        updated_at: now,
    }
}

/// One line of `quantity` units of `product`, priced at list price.
pub fn new_order(user_id: Uuid, product: &Product, quantity: i32, coupon: Option<&str>) -> NewOrder {
    let id = Uuid::new_v4();
    let total = product.price * Decimal::from(quantity);
    let totals = crate::checkout::PricingRules::default().totals_for(total);
    NewOrder {
        id,
        order_number: crate::checkout::generate_order_number(at(2024, 3, 1)),
        user_id,
        items: vec![OrderItem {
            id: Uuid::new_v4(),
            order_id: id,
            product_id: product.id,
            variant_id: None,
            name: product.name.clone(),
            quantity,
            price: product.price,
            total,
        }],
        totals,
        coupon: coupon.map(|code| CouponClaim { code: code.to_string(), user_id }),
        shipping_address: "{}".to_string(),
        notes: None,
        created_at: at(2024, 3, 1),
    }
}

/// A delivered single-line order charging exactly `total`.
pub fn delivered_order(user_id: Uuid, total: Decimal) -> Order {
    let product = product(Uuid::new_v4(), "Rib Eye", total, 10);
    let new = new_order(user_id, &product, 1, None);
    let totals = OrderTotals { total, ..new.totals };
    let mut order = new.into_order(totals, None);
    order.status = OrderStatus::Delivered;
    order.delivered_at = Some(at(2024, 3, 2));
    order
}
