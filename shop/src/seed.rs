//! Demo data for a fresh database.
//!
//! Every record is looked up by its natural key first, so running the
//! seeder twice leaves the second run with nothing to do.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use tracing::{debug, info};
use uuid::Uuid;

use commerce::error::{CommerceError, CommerceResult};
use commerce::gamification::{default_badges, default_challenges};
use commerce::model::{Coupon, CouponType, User, UserRole, DEFAULT_MAX_USAGE_PER_USER};
use commerce::products::{CategoryDraft, ProductDraft, VariantDraft};
use commerce::services::AuthService;
use commerce::storage::{CatalogStorage, CouponStorage, GamificationStorage, Store, UserStorage};
use common::config::AuthConfig;

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct SeedReport {
    pub users: usize,
    pub categories: usize,
    pub products: usize,
    pub coupons: usize,
    pub badges: usize,
    pub challenges: usize,
}

struct DemoUser {
    email: &'static str,
    password: &'static str,
    first_name: &'static str,
    last_name: &'static str,
    phone: &'static str,
    role: UserRole,
}

const USERS: &[DemoUser] = &[
    DemoUser {
        email: "admin@carnes.com",
        password: "admin123",
        first_name: "Admin",
        last_name: "Carnes",
        phone: "+1234567890",
        role: UserRole::Admin,
    },
    DemoUser {
        email: "cliente@test.com",
        password: "cliente123",
        first_name: "Cliente",
        last_name: "de Prueba",
        phone: "+1234567891",
        role: UserRole::Customer,
    },
    DemoUser {
        email: "repartidor@carnes.com",
        password: "repartidor123",
        first_name: "Repartidor",
        last_name: "Carnes",
        phone: "+1234567892",
        role: UserRole::Driver,
    },
];

fn categories() -> Vec<CategoryDraft> {
    [
        ("Carnes Rojas", "Las mejores carnes rojas premium", 1),
        ("Aves", "Pollo y pavo de granja", 2),
        ("Cerdo", "Cortes de cerdo seleccionados", 3),
    ]
    .into_iter()
    .map(|(name, description, sort_order)| CategoryDraft {
        name: name.to_string(),
        slug: None,
        description: Some(description.to_string()),
        image_url: None,
        sort_order,
        is_active: Some(true),
    })
    .collect()
}

struct DemoProduct {
    category: &'static str,
    name: &'static str,
    sku: &'static str,
    description: &'static str,
    price: Decimal,
    stock: i32,
    featured: bool,
    variants: &'static [(&'static str, &'static str, i64, i32)],
}

fn products() -> Vec<DemoProduct> {
    vec![
        DemoProduct {
            category: "carnes-rojas",
            name: "Carne de Res Premium",
            sku: "RES-001",
            description: "Carne de res de la mejor calidad",
            price: dec!(259.90),
            stock: 100,
            featured: true,
            variants: &[("1kg", "RES-001-1KG", 25990, 100), ("2kg", "RES-001-2KG", 49990, 40)],
        },
        DemoProduct {
            category: "carnes-rojas",
            name: "Rib Eye",
            sku: "RES-002",
            description: "Corte marmoleado a la parrilla",
            price: dec!(420.00),
            stock: 30,
            featured: true,
            variants: &[],
        },
        DemoProduct {
            category: "aves",
            name: "Pechuga de Pollo",
            sku: "AVE-001",
            description: "Pechuga sin hueso",
            price: dec!(129.50),
            stock: 60,
            featured: false,
            variants: &[],
        },
        DemoProduct {
            category: "cerdo",
            name: "Costilla de Cerdo",
            sku: "CER-001",
            description: "Costilla para asar",
            price: dec!(189.00),
            stock: 8,
            featured: false,
            variants: &[],
        },
    ]
}

fn coupons(now: DateTime<Utc>) -> Vec<Coupon> {
    let coupon = |code: &str, name: &str, coupon_type, value, min_purchase| Coupon {
        id: Uuid::new_v4(),
        code: code.to_string(),
        name: name.to_string(),
        description: None,
        coupon_type,
        value,
        min_purchase,
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
    };
    vec![
        coupon("BIENVENIDO10", "Bienvenida 10%", CouponType::Percentage, dec!(10), None),
        coupon("ENVIOGRATIS", "Envío gratis", CouponType::FreeShipping, Decimal::ZERO, Some(dec!(300))),
    ]
}

/// Inserts whatever part of the demo data set is missing.
pub async fn seed_demo_data<S: Store + 'static>(
    store: Arc<S>,
    auth: &AuthConfig,
    now: DateTime<Utc>,
) -> CommerceResult<SeedReport> {
    let mut report = SeedReport::default();
    let users: Arc<dyn UserStorage> = store.clone();
    let hasher = AuthService::new(users, auth);

    for demo in USERS {
        if store.find_user_by_email(demo.email).await?.is_some() {
            debug!(email = demo.email, "User already present");
            continue;
        }
        let user = User {
            id: Uuid::new_v4(),
            email: demo.email.to_string(),
            password_hash: hasher.hash_password(demo.password)?,
            first_name: demo.first_name.to_string(),
            last_name: demo.last_name.to_string(),
            phone: Some(demo.phone.to_string()),
            role: demo.role,
            is_active: true,
            last_login_at: None,
            created_at: now,
            updated_at: now,
        };
        store.create_user(&user).await?;
        report.users += 1;
    }

    for draft in categories() {
        let category = draft.into_category(now)?;
        if store.find_category(&category.slug).await?.is_some() {
            continue;
        }
        store.create_category(&category).await?;
        report.categories += 1;
    }

    for demo in products() {
        let Some(category) = store.find_category(demo.category).await? else {
            continue;
        };
        let draft = ProductDraft {
            name: demo.name.to_string(),
            slug: None,
            sku: demo.sku.to_string(),
            description: Some(demo.description.to_string()),
            price: demo.price,
            compare_price: None,
            stock: demo.stock,
            unit: None,
            category_id: category.id,
            is_active: Some(true),
            is_featured: Some(demo.featured),
            images: Vec::new(),
            variants: demo
                .variants
                .iter()
                .map(|&(name, sku, cents, stock)| VariantDraft {
                    name: name.to_string(),
                    sku: sku.to_string(),
                    price: Decimal::new(cents, 2),
                    stock,
                    is_active: Some(true),
                })
                .collect(),
        };
        let product = draft.into_product(now)?;
        if store.find_product(&product.slug).await?.is_some() {
            continue;
        }
        store.create_product(&product).await?;
        report.products += 1;
    }

    for coupon in coupons(now) {
        if store.find_coupon_by_code(&coupon.code).await?.is_some() {
            continue;
        }
        store.create_coupon(&coupon).await?;
        report.coupons += 1;
    }

    // Codes are unique, so a conflict means the record is already there.
    for badge in default_badges(now) {
        match store.create_badge(&badge).await {
            Ok(()) => report.badges += 1,
            Err(CommerceError::Conflict(_)) => debug!(code = %badge.code, "Badge already present"),
            Err(e) => return Err(e),
        }
    }
    for challenge in default_challenges(now) {
        match store.create_challenge(&challenge).await {
            Ok(()) => report.challenges += 1,
            Err(CommerceError::Conflict(_)) => debug!(code = %challenge.code, "Challenge already present"),
            Err(e) => return Err(e),
        }
    }

    info!(
        users = report.users,
        categories = report.categories,
        products = report.products,
        coupons = report.coupons,
        badges = report.badges,
        challenges = report.challenges,
        "Demo data seeded"
    );
    Ok(report)
}
