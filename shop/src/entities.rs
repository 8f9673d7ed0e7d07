//! SeaORM entities for the PostgreSQL schema, plus conversions to and from
//! the `commerce::model` records.
//!
//! Status enums are shared with the domain model (they derive
//! `DeriveActiveEnum`), so columns store their SCREAMING_SNAKE_CASE names.

use commerce::error::{CommerceError, CommerceResult};
use commerce::model::{
    Badge, CartItem, Category, Challenge, Coupon, CouponUsage, Delivery, GeoPoint, LoyaltyAccount, LoyaltyTransaction,
    Order, OrderItem, OrderTotals, OrderTrackingEvent, Product, ProductVariant, User, UserBadge, UserChallenge,
};
use sea_orm::ActiveValue::Set;
use serde::de::DeserializeOwned;
use serde::Serialize;

fn from_json<T: DeserializeOwned>(value: serde_json::Value, column: &str) -> CommerceResult<T> {
    serde_json::from_value(value).map_err(|e| CommerceError::storage(format!("Malformed {} column: {}", column, e)))
}

fn to_json<T: Serialize>(value: &T) -> serde_json::Value {
    serde_json::to_value(value).unwrap_or(serde_json::Value::Null)
}

pub mod category {
    use sea_orm::entity::prelude::*;

    #[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
    #[sea_orm(table_name = "categories")]
    pub struct Model {
        #[sea_orm(primary_key, auto_increment = false)]
        pub id: Uuid,
        pub name: String,
        #[sea_orm(unique)]
        pub slug: String,
        pub description: Option<String>,
        pub image_url: Option<String>,
        pub sort_order: i32,
        pub is_active: bool,
        pub created_at: DateTimeUtc,
        pub updated_at: DateTimeUtc,
    }

    #[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
    pub enum Relation {
        #[sea_orm(has_many = "super::product::Entity")]
        Products,
    }

    impl Related<super::product::Entity> for Entity {
        fn to() -> RelationDef {
            Relation::Products.def()
        }
    }

    impl ActiveModelBehavior for ActiveModel {}
}

pub mod product {
    use sea_orm::entity::prelude::*;

    #[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
    #[sea_orm(table_name = "products")]
    pub struct Model {
        #[sea_orm(primary_key, auto_increment = false)]
        pub id: Uuid,
        pub name: String,
        #[sea_orm(unique)]
        pub slug: String,
        #[sea_orm(unique)]
        pub sku: String,
        pub description: Option<String>,
        #[sea_orm(column_type = "Decimal(Some((12, 2)))")]
        pub price: Decimal,
        #[sea_orm(column_type = "Decimal(Some((12, 2)))", nullable)]
        pub compare_price: Option<Decimal>,
        pub stock: i32,
        pub unit: String,
        pub category_id: Uuid,
        pub is_active: bool,
        pub is_featured: bool,
        #[sea_orm(column_type = "JsonBinary")]
        pub images: Json,
        pub created_at: DateTimeUtc,
        pub updated_at: DateTimeUtc,
    }

    #[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
    pub enum Relation {
        #[sea_orm(
            belongs_to = "super::category::Entity",
            from = "Column::CategoryId",
            to = "super::category::Column::Id"
        )]
        Category,
        #[sea_orm(has_many = "super::product_variant::Entity")]
        Variants,
    }

    impl Related<super::category::Entity> for Entity {
        fn to() -> RelationDef {
            Relation::Category.def()
        }
    }

    impl Related<super::product_variant::Entity> for Entity {
        fn to() -> RelationDef {
            Relation::Variants.def()
        }
    }

    impl ActiveModelBehavior for ActiveModel {}
}

pub mod product_variant {
    use sea_orm::entity::prelude::*;

    #[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
    #[sea_orm(table_name = "product_variants")]
    pub struct Model {
        #[sea_orm(primary_key, auto_increment = false)]
        pub id: Uuid,
        pub product_id: Uuid,
        pub name: String,
        pub sku: String,
        #[sea_orm(column_type = "Decimal(Some((12, 2)))")]
        pub price: Decimal,
        pub stock: i32,
        pub is_active: bool,
    }

    #[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
    pub enum Relation {
        #[sea_orm(
            belongs_to = "super::product::Entity",
            from = "Column::ProductId",
            to = "super::product::Column::Id"
        )]
        Product,
    }

    impl Related<super::product::Entity> for Entity {
        fn to() -> RelationDef {
            Relation::Product.def()
        }
    }

    impl ActiveModelBehavior for ActiveModel {}
}

pub mod user {
    use commerce::model::UserRole;
    use sea_orm::entity::prelude::*;

    #[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
    #[sea_orm(table_name = "users")]
    pub struct Model {
        #[sea_orm(primary_key, auto_increment = false)]
        pub id: Uuid,
        /// Stored lower-case.
        #[sea_orm(unique)]
        pub email: String,
        pub password_hash: String,
        pub first_name: String,
        pub last_name: String,
        pub phone: Option<String>,
        pub role: UserRole,
        pub is_active: bool,
        pub last_login_at: Option<DateTimeUtc>,
        pub created_at: DateTimeUtc,
        pub updated_at: DateTimeUtc,
    }

    #[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
    pub enum Relation {}

    impl ActiveModelBehavior for ActiveModel {}
}

pub mod order {
    use commerce::model::{OrderStatus, PaymentStatus};
    use sea_orm::entity::prelude::*;

    #[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
    #[sea_orm(table_name = "orders")]
    pub struct Model {
        #[sea_orm(primary_key, auto_increment = false)]
        pub id: Uuid,
        #[sea_orm(unique)]
        pub order_number: String,
        pub user_id: Uuid,
        pub status: OrderStatus,
        pub payment_status: PaymentStatus,
        #[sea_orm(column_type = "Decimal(Some((12, 2)))")]
        pub subtotal: Decimal,
        #[sea_orm(column_type = "Decimal(Some((12, 2)))")]
        pub discount: Decimal,
        #[sea_orm(column_type = "Decimal(Some((12, 2)))")]
        pub tax: Decimal,
        #[sea_orm(column_type = "Decimal(Some((12, 2)))")]
        pub shipping: Decimal,
        #[sea_orm(column_type = "Decimal(Some((12, 2)))")]
        pub total: Decimal,
        pub coupon_id: Option<Uuid>,
        #[sea_orm(column_type = "Text")]
        pub shipping_address: String,
        pub notes: Option<String>,
        pub paid_at: Option<DateTimeUtc>,
        pub delivered_at: Option<DateTimeUtc>,
        pub cancelled_at: Option<DateTimeUtc>,
        pub cancel_reason: Option<String>,
        pub created_at: DateTimeUtc,
        pub updated_at: DateTimeUtc,
    }

    #[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
    pub enum Relation {
        #[sea_orm(has_many = "super::order_item::Entity")]
        Items,
        #[sea_orm(has_many = "super::order_tracking::Entity")]
        Tracking,
    }

    impl Related<super::order_item::Entity> for Entity {
        fn to() -> RelationDef {
            Relation::Items.def()
        }
    }

    impl Related<super::order_tracking::Entity> for Entity {
        fn to() -> RelationDef {
            Relation::Tracking.def()
        }
    }

    impl ActiveModelBehavior for ActiveModel {}
}

pub mod order_item {
    use sea_orm::entity::prelude::*;

    #[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
    #[sea_orm(table_name = "order_items")]
    pub struct Model {
        #[sea_orm(primary_key, auto_increment = false)]
        pub id: Uuid,
        pub order_id: Uuid,
        pub product_id: Uuid,
        pub variant_id: Option<Uuid>,
        pub name: String,
        pub quantity: i32,
        #[sea_orm(column_type = "Decimal(Some((12, 2)))")]
        pub price: Decimal,
        #[sea_orm(column_type = "Decimal(Some((12, 2)))")]
        pub total: Decimal,
    }

    #[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
    pub enum Relation {
        #[sea_orm(belongs_to = "super::order::Entity", from = "Column::OrderId", to = "super::order::Column::Id")]
        Order,
    }

    impl Related<super::order::Entity> for Entity {
        fn to() -> RelationDef {
            Relation::Order.def()
        }
    }

    impl ActiveModelBehavior for ActiveModel {}
}

pub mod order_tracking {
    use commerce::model::OrderStatus;
    use sea_orm::entity::prelude::*;

    #[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
    #[sea_orm(table_name = "order_tracking")]
    pub struct Model {
        #[sea_orm(primary_key, auto_increment = false)]
        pub id: Uuid,
        pub order_id: Uuid,
        pub status: OrderStatus,
        pub description: String,
        pub created_by: Option<Uuid>,
        pub created_at: DateTimeUtc,
    }

    #[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
    pub enum Relation {
        #[sea_orm(belongs_to = "super::order::Entity", from = "Column::OrderId", to = "super::order::Column::Id")]
        Order,
    }

    impl Related<super::order::Entity> for Entity {
        fn to() -> RelationDef {
            Relation::Order.def()
        }
    }

    impl ActiveModelBehavior for ActiveModel {}
}

pub mod coupon {
    use commerce::model::CouponType;
    use sea_orm::entity::prelude::*;

    #[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
    #[sea_orm(table_name = "coupons")]
    pub struct Model {
        #[sea_orm(primary_key, auto_increment = false)]
        pub id: Uuid,
        #[sea_orm(unique)]
        pub code: String,
        pub name: String,
        pub description: Option<String>,
        pub coupon_type: CouponType,
        #[sea_orm(column_type = "Decimal(Some((12, 2)))")]
        pub value: Decimal,
        #[sea_orm(column_type = "Decimal(Some((12, 2)))", nullable)]
        pub min_purchase: Option<Decimal>,
        #[sea_orm(column_type = "Decimal(Some((12, 2)))", nullable)]
        pub max_discount: Option<Decimal>,
        pub max_usage: Option<i32>,
        pub max_usage_per_user: i32,
        pub times_used: i32,
        #[sea_orm(column_type = "Decimal(Some((14, 2)))")]
        pub total_discount: Decimal,
        pub valid_from: DateTimeUtc,
        pub valid_until: Option<DateTimeUtc>,
        pub is_active: bool,
        pub is_public: bool,
        #[sea_orm(column_type = "JsonBinary")]
        pub applicable_products: Json,
        #[sea_orm(column_type = "JsonBinary")]
        pub excluded_products: Json,
        pub created_at: DateTimeUtc,
        pub updated_at: DateTimeUtc,
    }

    #[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
    pub enum Relation {
        #[sea_orm(has_many = "super::coupon_usage::Entity")]
        Usages,
    }

    impl Related<super::coupon_usage::Entity> for Entity {
        fn to() -> RelationDef {
            Relation::Usages.def()
        }
    }

    impl ActiveModelBehavior for ActiveModel {}
}

pub mod coupon_usage {
    use sea_orm::entity::prelude::*;

    #[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
    #[sea_orm(table_name = "coupon_usages")]
    pub struct Model {
        #[sea_orm(primary_key, auto_increment = false)]
        pub id: Uuid,
        pub coupon_id: Uuid,
        pub user_id: Uuid,
        pub order_id: Uuid,
        #[sea_orm(column_type = "Decimal(Some((12, 2)))")]
        pub discount_amount: Decimal,
        pub used_at: DateTimeUtc,
    }

    #[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
    pub enum Relation {
        #[sea_orm(belongs_to = "super::coupon::Entity", from = "Column::CouponId", to = "super::coupon::Column::Id")]
        Coupon,
    }

    impl Related<super::coupon::Entity> for Entity {
        fn to() -> RelationDef {
            Relation::Coupon.def()
        }
    }

    impl ActiveModelBehavior for ActiveModel {}
}

pub mod delivery {
    use commerce::model::DeliveryStatus;
    use sea_orm::entity::prelude::*;

    #[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
    #[sea_orm(table_name = "deliveries")]
    pub struct Model {
        #[sea_orm(primary_key, auto_increment = false)]
        pub id: Uuid,
        pub order_id: Uuid,
        pub driver_id: Uuid,
        pub status: DeliveryStatus,
        pub latitude: Option<f64>,
        pub longitude: Option<f64>,
        pub location_updated_at: Option<DateTimeUtc>,
        pub estimated_time: Option<DateTimeUtc>,
        pub actual_time: Option<DateTimeUtc>,
        pub notes: Option<String>,
        pub rating: Option<i16>,
        pub created_at: DateTimeUtc,
        pub updated_at: DateTimeUtc,
    }

    #[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
    pub enum Relation {}

    impl ActiveModelBehavior for ActiveModel {}
}

pub mod loyalty_account {
    use commerce::model::LoyaltyTier;
    use sea_orm::entity::prelude::*;

    #[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
    #[sea_orm(table_name = "loyalty_accounts")]
    pub struct Model {
        #[sea_orm(primary_key, auto_increment = false)]
        pub user_id: Uuid,
        pub current_points: i64,
        pub lifetime_points: i64,
        pub total_redeemed: i64,
        pub tier: LoyaltyTier,
        pub last_tier_upgrade: Option<DateTimeUtc>,
        pub created_at: DateTimeUtc,
        pub updated_at: DateTimeUtc,
    }

    #[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
    pub enum Relation {}

    impl ActiveModelBehavior for ActiveModel {}
}

pub mod loyalty_transaction {
    use commerce::model::LoyaltyTransactionKind;
    use sea_orm::entity::prelude::*;

    #[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
    #[sea_orm(table_name = "loyalty_transactions")]
    pub struct Model {
        #[sea_orm(primary_key, auto_increment = false)]
        pub id: Uuid,
        pub user_id: Uuid,
        pub kind: LoyaltyTransactionKind,
        pub points: i64,
        pub balance_before: i64,
        pub balance_after: i64,
        #[sea_orm(column_type = "Decimal(Some((4, 2)))")]
        pub multiplier: Decimal,
        pub order_id: Option<Uuid>,
        pub description: String,
        pub created_at: DateTimeUtc,
    }

    #[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
    pub enum Relation {}

    impl ActiveModelBehavior for ActiveModel {}
}

pub mod badge {
    use commerce::model::{BadgeRarity, BadgeRequirement};
    use sea_orm::entity::prelude::*;

    #[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
    #[sea_orm(table_name = "badges")]
    pub struct Model {
        #[sea_orm(primary_key, auto_increment = false)]
        pub id: Uuid,
        #[sea_orm(unique)]
        pub code: String,
        pub name: String,
        pub description: String,
        pub icon: String,
        pub color: String,
        pub rarity: BadgeRarity,
        pub requirement: BadgeRequirement,
        pub requirement_value: i64,
        pub points_reward: i64,
        pub is_secret: bool,
        pub is_active: bool,
        pub sort_order: i32,
        pub created_at: DateTimeUtc,
    }

    #[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
    pub enum Relation {}

    impl ActiveModelBehavior for ActiveModel {}
}

pub mod user_badge {
    use sea_orm::entity::prelude::*;

    #[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
    #[sea_orm(table_name = "user_badges")]
    pub struct Model {
        #[sea_orm(primary_key, auto_increment = false)]
        pub id: Uuid,
        pub user_id: Uuid,
        pub badge_id: Uuid,
        pub is_new: bool,
        pub earned_at: DateTimeUtc,
        pub viewed_at: Option<DateTimeUtc>,
    }

    #[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
    pub enum Relation {}

    impl ActiveModelBehavior for ActiveModel {}
}

pub mod challenge {
    use commerce::model::{ChallengeDifficulty, ChallengeTarget, ChallengeType};
    use sea_orm::entity::prelude::*;

    #[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
    #[sea_orm(table_name = "challenges")]
    pub struct Model {
        #[sea_orm(primary_key, auto_increment = false)]
        pub id: Uuid,
        #[sea_orm(unique)]
        pub code: String,
        pub name: String,
        pub description: String,
        pub icon: String,
        pub challenge_type: ChallengeType,
        pub target: ChallengeTarget,
        pub target_value: i64,
        pub points_reward: i64,
        pub difficulty: ChallengeDifficulty,
        pub is_repeatable: bool,
        pub is_active: bool,
        pub starts_at: DateTimeUtc,
        pub ends_at: Option<DateTimeUtc>,
        pub created_at: DateTimeUtc,
    }

    #[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
    pub enum Relation {}

    impl ActiveModelBehavior for ActiveModel {}
}

pub mod user_challenge {
    use sea_orm::entity::prelude::*;

    #[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
    #[sea_orm(table_name = "user_challenges")]
    pub struct Model {
        #[sea_orm(primary_key, auto_increment = false)]
        pub id: Uuid,
        pub user_id: Uuid,
        pub challenge_id: Uuid,
        pub current_progress: i64,
        pub target_progress: i64,
        pub is_completed: bool,
        pub completed_at: Option<DateTimeUtc>,
        pub reward_claimed: bool,
        pub claimed_at: Option<DateTimeUtc>,
        pub points_earned: i64,
        pub last_progress_at: DateTimeUtc,
        pub created_at: DateTimeUtc,
    }

    #[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
    pub enum Relation {}

    impl ActiveModelBehavior for ActiveModel {}
}

pub mod cart_item {
    use sea_orm::entity::prelude::*;

    #[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
    #[sea_orm(table_name = "cart_items")]
    pub struct Model {
        #[sea_orm(primary_key, auto_increment = false)]
        pub id: Uuid,
        pub user_id: Uuid,
        pub product_id: Uuid,
        pub variant_id: Option<Uuid>,
        pub quantity: i32,
        pub created_at: DateTimeUtc,
        pub updated_at: DateTimeUtc,
    }

    #[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
    pub enum Relation {}

    impl ActiveModelBehavior for ActiveModel {}
}

// ---------------------------------------------------------------------------
// Row <-> record conversions
// ---------------------------------------------------------------------------

impl From<category::Model> for Category {
    fn from(m: category::Model) -> Self {
        Category {
            id: m.id,
            name: m.name,
            slug: m.slug,
            description: m.description,
            image_url: m.image_url,
            sort_order: m.sort_order,
            is_active: m.is_active,
            created_at: m.created_at,
            updated_at: m.updated_at,
        }
    }
}

impl From<&Category> for category::ActiveModel {
    fn from(c: &Category) -> Self {
        category::ActiveModel {
            id: Set(c.id),
            name: Set(c.name.clone()),
            slug: Set(c.slug.clone()),
            description: Set(c.description.clone()),
            image_url: Set(c.image_url.clone()),
            sort_order: Set(c.sort_order),
            is_active: Set(c.is_active),
            created_at: Set(c.created_at),
            updated_at: Set(c.updated_at),
        }
    }
}

impl product::Model {
    pub fn into_product(self, variants: Vec<ProductVariant>) -> CommerceResult<Product> {
        Ok(Product {
            id: self.id,
            name: self.name,
            slug: self.slug,
            sku: self.sku,
            description: self.description,
            price: self.price,
            compare_price: self.compare_price,
            stock: self.stock,
            unit: self.unit,
            category_id: self.category_id,
            is_active: self.is_active,
            is_featured: self.is_featured,
            images: from_json(self.images, "products.images")?,
            variants,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

impl From<&Product> for product::ActiveModel {
    fn from(p: &Product) -> Self {
        product::ActiveModel {
            id: Set(p.id),
            name: Set(p.name.clone()),
            slug: Set(p.slug.clone()),
            sku: Set(p.sku.clone()),
            description: Set(p.description.clone()),
            price: Set(p.price),
            compare_price: Set(p.compare_price),
            stock: Set(p.stock),
            unit: Set(p.unit.clone()),
            category_id: Set(p.category_id),
            is_active: Set(p.is_active),
            is_featured: Set(p.is_featured),
            images: Set(to_json(&p.images)),
            created_at: Set(p.created_at),
            updated_at: Set(p.updated_at),
        }
    }
}

impl From<product_variant::Model> for ProductVariant {
    fn from(m: product_variant::Model) -> Self {
        ProductVariant {
            id: m.id,
            product_id: m.product_id,
            name: m.name,
            sku: m.sku,
            price: m.price,
            stock: m.stock,
            is_active: m.is_active,
        }
    }
}

impl From<&ProductVariant> for product_variant::ActiveModel {
    fn from(v: &ProductVariant) -> Self {
        product_variant::ActiveModel {
            id: Set(v.id),
            product_id: Set(v.product_id),
            name: Set(v.name.clone()),
            sku: Set(v.sku.clone()),
            price: Set(v.price),
            stock: Set(v.stock),
            is_active: Set(v.is_active),
        }
    }
}

impl From<user::Model> for User {
    fn from(m: user::Model) -> Self {
        User {
            id: m.id,
            email: m.email,
            password_hash: m.password_hash,
            first_name: m.first_name,
            last_name: m.last_name,
            phone: m.phone,
            role: m.role,
            is_active: m.is_active,
            last_login_at: m.last_login_at,
            created_at: m.created_at,
            updated_at: m.updated_at,
        }
    }
}

impl From<&User> for user::ActiveModel {
    fn from(u: &User) -> Self {
        user::ActiveModel {
            id: Set(u.id),
            email: Set(u.email.trim().to_lowercase()),
            password_hash: Set(u.password_hash.clone()),
            first_name: Set(u.first_name.clone()),
            last_name: Set(u.last_name.clone()),
            phone: Set(u.phone.clone()),
            role: Set(u.role),
            is_active: Set(u.is_active),
            last_login_at: Set(u.last_login_at),
            created_at: Set(u.created_at),
            updated_at: Set(u.updated_at),
        }
    }
}

impl order::Model {
    pub fn into_order(self, items: Vec<OrderItem>) -> Order {
        Order {
            id: self.id,
            order_number: self.order_number,
            user_id: self.user_id,
            status: self.status,
            payment_status: self.payment_status,
            totals: OrderTotals {
                subtotal: self.subtotal,
                discount: self.discount,
                tax: self.tax,
                shipping: self.shipping,
                total: self.total,
            },
            coupon_id: self.coupon_id,
            shipping_address: self.shipping_address,
            notes: self.notes,
            items,
            paid_at: self.paid_at,
            delivered_at: self.delivered_at,
            cancelled_at: self.cancelled_at,
            cancel_reason: self.cancel_reason,
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
    }
}

impl From<&Order> for order::ActiveModel {
    fn from(o: &Order) -> Self {
        order::ActiveModel {
            id: Set(o.id),
            order_number: Set(o.order_number.clone()),
            user_id: Set(o.user_id),
            status: Set(o.status),
            payment_status: Set(o.payment_status),
            subtotal: Set(o.totals.subtotal),
            discount: Set(o.totals.discount),
            tax: Set(o.totals.tax),
            shipping: Set(o.totals.shipping),
            total: Set(o.totals.total),
            coupon_id: Set(o.coupon_id),
            shipping_address: Set(o.shipping_address.clone()),
            notes: Set(o.notes.clone()),
            paid_at: Set(o.paid_at),
            delivered_at: Set(o.delivered_at),
            cancelled_at: Set(o.cancelled_at),
            cancel_reason: Set(o.cancel_reason.clone()),
            created_at: Set(o.created_at),
            updated_at: Set(o.updated_at),
        }
    }
}

impl From<order_item::Model> for OrderItem {
    fn from(m: order_item::Model) -> Self {
        OrderItem {
            id: m.id,
            order_id: m.order_id,
            product_id: m.product_id,
            variant_id: m.variant_id,
            name: m.name,
            quantity: m.quantity,
            price: m.price,
            total: m.total,
        }
    }
}

impl From<&OrderItem> for order_item::ActiveModel {
    fn from(i: &OrderItem) -> Self {
        order_item::ActiveModel {
            id: Set(i.id),
            order_id: Set(i.order_id),
            product_id: Set(i.product_id),
            variant_id: Set(i.variant_id),
            name: Set(i.name.clone()),
            quantity: Set(i.quantity),
            price: Set(i.price),
            total: Set(i.total),
        }
    }
}

impl From<order_tracking::Model> for OrderTrackingEvent {
    fn from(m: order_tracking::Model) -> Self {
        OrderTrackingEvent {
            id: m.id,
            order_id: m.order_id,
            status: m.status,
            description: m.description,
            created_by: m.created_by,
            created_at: m.created_at,
        }
    }
}

impl From<&OrderTrackingEvent> for order_tracking::ActiveModel {
    fn from(e: &OrderTrackingEvent) -> Self {
        order_tracking::ActiveModel {
            id: Set(e.id),
            order_id: Set(e.order_id),
            status: Set(e.status),
            description: Set(e.description.clone()),
            created_by: Set(e.created_by),
            created_at: Set(e.created_at),
        }
    }
}

impl TryFrom<coupon::Model> for Coupon {
    type Error = CommerceError;

    fn try_from(m: coupon::Model) -> CommerceResult<Self> {
        Ok(Coupon {
            id: m.id,
            code: m.code,
            name: m.name,
            description: m.description,
            coupon_type: m.coupon_type,
            value: m.value,
            min_purchase: m.min_purchase,
            max_discount: m.max_discount,
            max_usage: m.max_usage,
            max_usage_per_user: m.max_usage_per_user,
            times_used: m.times_used,
            total_discount: m.total_discount,
            valid_from: m.valid_from,
            valid_until: m.valid_until,
            is_active: m.is_active,
            is_public: m.is_public,
            applicable_products: from_json(m.applicable_products, "coupons.applicable_products")?,
            excluded_products: from_json(m.excluded_products, "coupons.excluded_products")?,
            created_at: m.created_at,
            updated_at: m.updated_at,
        })
    }
}

impl From<&Coupon> for coupon::ActiveModel {
    fn from(c: &Coupon) -> Self {
        coupon::ActiveModel {
            id: Set(c.id),
            code: Set(c.code.clone()),
            name: Set(c.name.clone()),
            description: Set(c.description.clone()),
            coupon_type: Set(c.coupon_type),
            value: Set(c.value),
            min_purchase: Set(c.min_purchase),
            max_discount: Set(c.max_discount),
            max_usage: Set(c.max_usage),
            max_usage_per_user: Set(c.max_usage_per_user),
            times_used: Set(c.times_used),
            total_discount: Set(c.total_discount),
            valid_from: Set(c.valid_from),
            valid_until: Set(c.valid_until),
            is_active: Set(c.is_active),
            is_public: Set(c.is_public),
            applicable_products: Set(to_json(&c.applicable_products)),
            excluded_products: Set(to_json(&c.excluded_products)),
            created_at: Set(c.created_at),
            updated_at: Set(c.updated_at),
        }
    }
}

impl From<coupon_usage::Model> for CouponUsage {
    fn from(m: coupon_usage::Model) -> Self {
        CouponUsage {
            id: m.id,
            coupon_id: m.coupon_id,
            user_id: m.user_id,
            order_id: m.order_id,
            discount_amount: m.discount_amount,
            used_at: m.used_at,
        }
    }
}

impl From<&CouponUsage> for coupon_usage::ActiveModel {
    fn from(u: &CouponUsage) -> Self {
        coupon_usage::ActiveModel {
            id: Set(u.id),
            coupon_id: Set(u.coupon_id),
            user_id: Set(u.user_id),
            order_id: Set(u.order_id),
            discount_amount: Set(u.discount_amount),
            used_at: Set(u.used_at),
        }
    }
}

impl From<delivery::Model> for Delivery {
    fn from(m: delivery::Model) -> Self {
        let current_location = match (m.latitude, m.longitude) {
            (Some(latitude), Some(longitude)) => Some(GeoPoint { latitude, longitude }),
            _ => None,
        };
        Delivery {
            id: m.id,
            order_id: m.order_id,
            driver_id: m.driver_id,
            status: m.status,
            current_location,
            location_updated_at: m.location_updated_at,
            estimated_time: m.estimated_time,
            actual_time: m.actual_time,
            notes: m.notes,
            rating: m.rating,
            created_at: m.created_at,
            updated_at: m.updated_at,
        }
    }
}

impl From<&Delivery> for delivery::ActiveModel {
    fn from(d: &Delivery) -> Self {
        delivery::ActiveModel {
            id: Set(d.id),
            order_id: Set(d.order_id),
            driver_id: Set(d.driver_id),
            status: Set(d.status),
            latitude: Set(d.current_location.map(|p| p.latitude)),
            longitude: Set(d.current_location.map(|p| p.longitude)),
            location_updated_at: Set(d.location_updated_at),
            estimated_time: Set(d.estimated_time),
            actual_time: Set(d.actual_time),
            notes: Set(d.notes.clone()),
            rating: Set(d.rating),
            created_at: Set(d.created_at),
            updated_at: Set(d.updated_at),
        }
    }
}

impl From<loyalty_account::Model> for LoyaltyAccount {
    fn from(m: loyalty_account::Model) -> Self {
        LoyaltyAccount {
            user_id: m.user_id,
            current_points: m.current_points,
            lifetime_points: m.lifetime_points,
            total_redeemed: m.total_redeemed,
            tier: m.tier,
            last_tier_upgrade: m.last_tier_upgrade,
            created_at: m.created_at,
            updated_at: m.updated_at,
        }
    }
}

impl From<&LoyaltyAccount> for loyalty_account::ActiveModel {
    fn from(a: &LoyaltyAccount) -> Self {
        loyalty_account::ActiveModel {
            user_id: Set(a.user_id),
            current_points: Set(a.current_points),
            lifetime_points: Set(a.lifetime_points),
            total_redeemed: Set(a.total_redeemed),
            tier: Set(a.tier),
            last_tier_upgrade: Set(a.last_tier_upgrade),
            created_at: Set(a.created_at),
            updated_at: Set(a.updated_at),
        }
    }
}

impl From<loyalty_transaction::Model> for LoyaltyTransaction {
    fn from(m: loyalty_transaction::Model) -> Self {
        LoyaltyTransaction {
            id: m.id,
            user_id: m.user_id,
            kind: m.kind,
            points: m.points,
            balance_before: m.balance_before,
            balance_after: m.balance_after,
            multiplier: m.multiplier,
            order_id: m.order_id,
            description: m.description,
            created_at: m.created_at,
        }
    }
}

impl From<&LoyaltyTransaction> for loyalty_transaction::ActiveModel {
    fn from(t: &LoyaltyTransaction) -> Self {
        loyalty_transaction::ActiveModel {
            id: Set(t.id),
            user_id: Set(t.user_id),
            kind: Set(t.kind),
            points: Set(t.points),
            balance_before: Set(t.balance_before),
            balance_after: Set(t.balance_after),
            multiplier: Set(t.multiplier),
            order_id: Set(t.order_id),
            description: Set(t.description.clone()),
            created_at: Set(t.created_at),
        }
    }
}

impl From<badge::Model> for Badge {
    fn from(m: badge::Model) -> Self {
        Badge {
            id: m.id,
            code: m.code,
            name: m.name,
            description: m.description,
            icon: m.icon,
            color: m.color,
            rarity: m.rarity,
            requirement: m.requirement,
            requirement_value: m.requirement_value,
            points_reward: m.points_reward,
            is_secret: m.is_secret,
            is_active: m.is_active,
            sort_order: m.sort_order,
            created_at: m.created_at,
        }
    }
}

impl From<&Badge> for badge::ActiveModel {
    fn from(b: &Badge) -> Self {
        badge::ActiveModel {
            id: Set(b.id),
            code: Set(b.code.clone()),
            name: Set(b.name.clone()),
            description: Set(b.description.clone()),
            icon: Set(b.icon.clone()),
            color: Set(b.color.clone()),
            rarity: Set(b.rarity),
            requirement: Set(b.requirement),
            requirement_value: Set(b.requirement_value),
            points_reward: Set(b.points_reward),
            is_secret: Set(b.is_secret),
            is_active: Set(b.is_active),
            sort_order: Set(b.sort_order),
            created_at: Set(b.created_at),
        }
    }
}

impl From<user_badge::Model> for UserBadge {
    fn from(m: user_badge::Model) -> Self {
        UserBadge {
            id: m.id,
            user_id: m.user_id,
            badge_id: m.badge_id,
            is_new: m.is_new,
            earned_at: m.earned_at,
            viewed_at: m.viewed_at,
        }
    }
}

impl From<&UserBadge> for user_badge::ActiveModel {
    fn from(b: &UserBadge) -> Self {
        user_badge::ActiveModel {
            id: Set(b.id),
            user_id: Set(b.user_id),
            badge_id: Set(b.badge_id),
            is_new: Set(b.is_new),
            earned_at: Set(b.earned_at),
            viewed_at: Set(b.viewed_at),
        }
    }
}

impl From<challenge::Model> for Challenge {
    fn from(m: challenge::Model) -> Self {
        Challenge {
            id: m.id,
            code: m.code,
            name: m.name,
            description: m.description,
            icon: m.icon,
            challenge_type: m.challenge_type,
            target: m.target,
            target_value: m.target_value,
            points_reward: m.points_reward,
            difficulty: m.difficulty,
            is_repeatable: m.is_repeatable,
            is_active: m.is_active,
            starts_at: m.starts_at,
            ends_at: m.ends_at,
            created_at: m.created_at,
        }
    }
}

impl From<&Challenge> for challenge::ActiveModel {
    fn from(c: &Challenge) -> Self {
        challenge::ActiveModel {
            id: Set(c.id),
            code: Set(c.code.clone()),
            name: Set(c.name.clone()),
            description: Set(c.description.clone()),
            icon: Set(c.icon.clone()),
            challenge_type: Set(c.challenge_type),
            target: Set(c.target),
            target_value: Set(c.target_value),
            points_reward: Set(c.points_reward),
            difficulty: Set(c.difficulty),
            is_repeatable: Set(c.is_repeatable),
            is_active: Set(c.is_active),
            starts_at: Set(c.starts_at),
            ends_at: Set(c.ends_at),
            created_at: Set(c.created_at),
        }
    }
}

impl From<user_challenge::Model> for UserChallenge {
    fn from(m: user_challenge::Model) -> Self {
        UserChallenge {
            id: m.id,
            user_id: m.user_id,
            challenge_id: m.challenge_id,
            current_progress: m.current_progress,
            target_progress: m.target_progress,
            is_completed: m.is_completed,
            completed_at: m.completed_at,
            reward_claimed: m.reward_claimed,
            claimed_at: m.claimed_at,
            points_earned: m.points_earned,
            last_progress_at: m.last_progress_at,
            created_at: m.created_at,
        }
    }
}

impl From<&UserChallenge> for user_challenge::ActiveModel {
    fn from(a: &UserChallenge) -> Self {
        user_challenge::ActiveModel {
            id: Set(a.id),
            user_id: Set(a.user_id),
            challenge_id: Set(a.challenge_id),
            current_progress: Set(a.current_progress),
            target_progress: Set(a.target_progress),
            is_completed: Set(a.is_completed),
            completed_at: Set(a.completed_at),
            reward_claimed: Set(a.reward_claimed),
            claimed_at: Set(a.claimed_at),
            points_earned: Set(a.points_earned),
            last_progress_at: Set(a.last_progress_at),
            created_at: Set(a.created_at),
        }
    }
}

impl From<cart_item::Model> for CartItem {
    fn from(m: cart_item::Model) -> Self {
        CartItem {
            id: m.id,
            user_id: m.user_id,
            product_id: m.product_id,
            variant_id: m.variant_id,
            quantity: m.quantity,
            created_at: m.created_at,
            updated_at: m.updated_at,
        }
    }
}

impl From<&CartItem> for cart_item::ActiveModel {
    fn from(i: &CartItem) -> Self {
        cart_item::ActiveModel {
            id: Set(i.id),
            user_id: Set(i.user_id),
            product_id: Set(i.product_id),
            variant_id: Set(i.variant_id),
            quantity: Set(i.quantity),
            created_at: Set(i.created_at),
            updated_at: Set(i.updated_at),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use commerce::model::{CouponType, DeliveryStatus};
    use rust_decimal_macros::dec;
    use uuid::Uuid;

    #[test]
    fn test_delivery_location_needs_both_coordinates() {
        let now = Utc::now();
        let mut delivery = Delivery::new(Uuid::new_v4(), Uuid::new_v4(), None, now);
        delivery.status = DeliveryStatus::InTransit;
        delivery.current_location = Some(GeoPoint { latitude: 19.43, longitude: -99.13 });

        let row: delivery::ActiveModel = (&delivery).into();
        assert_eq!(row.latitude, Set(Some(19.43)));

        let model = delivery::Model {
            id: delivery.id,
            order_id: delivery.order_id,
            driver_id: delivery.driver_id,
            status: delivery.status,
            latitude: Some(19.43),
            longitude: None,
            location_updated_at: None,
            estimated_time: None,
            actual_time: None,
            notes: None,
            rating: None,
            created_at: now,
            updated_at: now,
        };
        assert!(Delivery::from(model).current_location.is_none());
    }

    #[test]
    fn test_coupon_product_lists_are_json_columns() {
        let now = Utc::now();
        let product = Uuid::new_v4();
        let model = coupon::Model {
            id: Uuid::new_v4(),
            code: "ASADO10".to_string(),
            name: "Asado".to_string(),
            description: None,
            coupon_type: CouponType::Percentage,
            value: dec!(10),
            min_purchase: None,
            max_discount: None,
            max_usage: None,
            max_usage_per_user: 1,
            times_used: 0,
            total_discount: dec!(0),
            valid_from: now,
            valid_until: None,
            is_active: true,
            is_public: true,
            applicable_products: serde_json::json!([product]),
            excluded_products: serde_json::json!([]),
            created_at: now,
            updated_at: now,
        };
        let coupon = Coupon::try_from(model.clone()).unwrap();
        assert_eq!(coupon.applicable_products, vec![product]);

        let broken = coupon::Model { excluded_products: serde_json::json!("nope"), ..model };
        assert!(Coupon::try_from(broken).is_err());
    }

    #[test]
    fn test_user_email_is_stored_lower_case() {
        let now = Utc::now();
        let user = User {
            id: Uuid::new_v4(),
            email: " Ana@Carnes.MX ".to_string(),
            password_hash: "hash".to_string(),
            first_name: "Ana".to_string(),
            last_name: "López".to_string(),
            phone: None,
            role: commerce::model::UserRole::Customer,
            is_active: true,
            last_login_at: None,
            created_at: now,
            updated_at: now,
        };
        let row: user::ActiveModel = (&user).into();
        assert_eq!(row.email, Set("ana@carnes.mx".to_string()));
    }
}
