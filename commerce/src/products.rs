//! Admin input for the catalog: products, their variants and categories.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Deserialize;
use uuid::Uuid;

use crate::error::{CommerceError, CommerceResult};
use crate::model::{slugify, Category, Product, ProductVariant};

const DEFAULT_UNIT: &str = "kg";

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VariantDraft {
    pub name: String,
    pub sku: String,
    pub price: Decimal,
    #[serde(default)]
    pub stock: i32,
    pub is_active: Option<bool>,
}

impl VariantDraft {
    pub fn into_variant(self, product_id: Uuid) -> CommerceResult<ProductVariant> {
        let variant = ProductVariant {
            id: Uuid::new_v4(),
            product_id,
            name: self.name.trim().to_string(),
            sku: self.sku.trim().to_uppercase(),
            price: self.price,
            stock: self.stock,
            is_active: self.is_active.unwrap_or(true),
        };
        check_variant(&variant)?;
        Ok(variant)
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VariantPatch {
    pub name: Option<String>,
    pub sku: Option<String>,
    pub price: Option<Decimal>,
    pub stock: Option<i32>,
    pub is_active: Option<bool>,
}

impl VariantPatch {
    pub fn apply(self, variant: &mut ProductVariant) -> CommerceResult<()> {
        let mut updated = variant.clone();
        if let Some(name) = self.name {
            updated.name = name.trim().to_string();
        }
        if let Some(sku) = self.sku {
            updated.sku = sku.trim().to_uppercase();
        }
        if let Some(price) = self.price {
            updated.price = price;
        }
        if let Some(stock) = self.stock {
            updated.stock = stock;
        }
        if let Some(active) = self.is_active {
            updated.is_active = active;
        }
        check_variant(&updated)?;
        *variant = updated;
        Ok(())
    }
}

fn check_variant(variant: &ProductVariant) -> CommerceResult<()> {
    if variant.name.is_empty() || variant.sku.is_empty() {
        return Err(CommerceError::validation("Variant name and SKU are required"));
    }
    if variant.price < Decimal::ZERO || variant.stock < 0 {
        return Err(CommerceError::validation("Variant price and stock cannot be negative"));
    }
    Ok(())
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProductDraft {
    pub name: String,
    pub slug: Option<String>,
    pub sku: String,
    pub description: Option<String>,
    pub price: Decimal,
    pub compare_price: Option<Decimal>,
    #[serde(default)]
    pub stock: i32,
    pub unit: Option<String>,
    pub category_id: Uuid,
    pub is_active: Option<bool>,
    pub is_featured: Option<bool>,
    #[serde(default)]
    pub images: Vec<String>,
    #[serde(default)]
    pub variants: Vec<VariantDraft>,
}

impl ProductDraft {
    pub fn into_product(self, now: DateTime<Utc>) -> CommerceResult<Product> {
        let id = Uuid::new_v4();
        let variants = self
            .variants
            .into_iter()
            .map(|v| v.into_variant(id))
            .collect::<CommerceResult<Vec<_>>>()?;
        let product = Product {
            id,
            slug: self.slug.as_deref().map(slugify).unwrap_or_else(|| slugify(&self.name)),
            name: self.name.trim().to_string(),
            sku: self.sku.trim().to_uppercase(),
            description: self.description,
            price: self.price,
            compare_price: self.compare_price,
            stock: self.stock,
            unit: self.unit.unwrap_or_else(|| DEFAULT_UNIT.to_string()),
            category_id: self.category_id,
            is_active: self.is_active.unwrap_or(true),
            is_featured: self.is_featured.unwrap_or(false),
            images: self.images,
            variants,
            created_at: now,
            updated_at: now,
        };
        check_product(&product)?;
        Ok(product)
    }
}

/// Absent fields are left unchanged. Variants are edited through their own
/// endpoints.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProductPatch {
    pub name: Option<String>,
    pub slug: Option<String>,
    pub sku: Option<String>,
    pub description: Option<String>,
    pub price: Option<Decimal>,
    pub compare_price: Option<Decimal>,
    pub stock: Option<i32>,
    pub unit: Option<String>,
    pub category_id: Option<Uuid>,
    pub is_active: Option<bool>,
    pub is_featured: Option<bool>,
    pub images: Option<Vec<String>>,
}

impl ProductPatch {
    pub fn apply(self, product: &mut Product, now: DateTime<Utc>) -> CommerceResult<()> {
        let mut updated = product.clone();
        if let Some(name) = self.name {
            updated.name = name.trim().to_string();
        }
        if let Some(slug) = self.slug {
            updated.slug = slugify(&slug);
        }
        if let Some(sku) = self.sku {
            updated.sku = sku.trim().to_uppercase();
        }
        if self.description.is_some() {
            updated.description = self.description;
        }
        if let Some(price) = self.price {
            updated.price = price;
        }
        if self.compare_price.is_some() {
            updated.compare_price = self.compare_price;
        }
        if let Some(stock) = self.stock {
            updated.stock = stock;
        }
        if let Some(unit) = self.unit {
            updated.unit = unit;
        }
        if let Some(category_id) = self.category_id {
            updated.category_id = category_id;
        }
        if let Some(active) = self.is_active {
            updated.is_active = active;
        }
        if let Some(featured) = self.is_featured {
            updated.is_featured = featured;
        }
        if let Some(images) = self.images {
            updated.images = images;
        }
        check_product(&updated)?;
        updated.updated_at = now;
        *product = updated;
        Ok(())
    }
}

fn check_product(product: &Product) -> CommerceResult<()> {
    if product.name.is_empty() || product.slug.is_empty() || product.sku.is_empty() {
        return Err(CommerceError::validation("Product name, slug and SKU are required"));
    }
    if product.price < Decimal::ZERO || product.stock < 0 {
        return Err(CommerceError::validation("Price and stock cannot be negative"));
    }
    if product.compare_price.is_some_and(|c| c < product.price) {
        return Err(CommerceError::validation("Compare price must not be below the price"));
    }
    let mut skus: Vec<&str> = product.variants.iter().map(|v| v.sku.as_str()).collect();
    skus.sort_unstable();
    if skus.windows(2).any(|w| w[0] == w[1]) {
        return Err(CommerceError::validation("Variant SKUs must be unique"));
    }
    Ok(())
}

/// Adds a variant, keeping SKUs unique within the product.
pub fn add_variant(product: &mut Product, variant: ProductVariant, now: DateTime<Utc>) -> CommerceResult<()> {
    if variant.product_id != product.id {
        return Err(CommerceError::validation("Variant belongs to another product"));
    }
    if product.variants.iter().any(|v| v.sku == variant.sku || v.id == variant.id) {
        return Err(CommerceError::conflict(format!("Variant SKU '{}' already exists", variant.sku)));
    }
    product.variants.push(variant);
    product.updated_at = now;
    Ok(())
}

pub fn update_variant(product: &mut Product, variant_id: Uuid, patch: VariantPatch, now: DateTime<Utc>) -> CommerceResult<ProductVariant> {
    let mut candidate = product.clone();
    let variant = candidate
        .variants
        .iter_mut()
        .find(|v| v.id == variant_id)
        .ok_or_else(|| CommerceError::not_found(format!("Variant {}", variant_id)))?;
    patch.apply(variant)?;
    let updated = variant.clone();
    check_product(&candidate)?;
    candidate.updated_at = now;
    *product = candidate;
    Ok(updated)
}

pub fn remove_variant(product: &mut Product, variant_id: Uuid, now: DateTime<Utc>) -> CommerceResult<()> {
    let before = product.variants.len();
    product.variants.retain(|v| v.id != variant_id);
    if product.variants.len() == before {
        return Err(CommerceError::not_found(format!("Variant {}", variant_id)));
    }
    product.updated_at = now;
    Ok(())
}

/// One admin change to a product. Stores apply it to the current row while
/// holding the product, so stock sold in the meantime survives the edit.
#[derive(Debug, Clone)]
pub enum ProductEdit {
    Patch(ProductPatch),
    Deactivate,
    AddVariant(ProductVariant),
    UpdateVariant(Uuid, VariantPatch),
    RemoveVariant(Uuid),
}

impl ProductEdit {
    pub fn apply(self, product: &mut Product, now: DateTime<Utc>) -> CommerceResult<()> {
        match self {
            ProductEdit::Patch(patch) => patch.apply(product, now),
            ProductEdit::Deactivate => {
                product.is_active = false;
                product.updated_at = now;
                Ok(())
            }
            ProductEdit::AddVariant(variant) => add_variant(product, variant, now),
            ProductEdit::UpdateVariant(variant_id, patch) => update_variant(product, variant_id, patch, now).map(|_| ()),
            ProductEdit::RemoveVariant(variant_id) => remove_variant(product, variant_id, now),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CategoryDraft {
    pub name: String,
    pub slug: Option<String>,
    pub description: Option<String>,
    pub image_url: Option<String>,
    #[serde(default)]
    pub sort_order: i32,
    pub is_active: Option<bool>,
}

impl CategoryDraft {
    pub fn into_category(self, now: DateTime<Utc>) -> CommerceResult<Category> {
        let name = self.name.trim().to_string();
        let slug = self.slug.as_deref().map(slugify).unwrap_or_else(|| slugify(&name));
        if name.is_empty() || slug.is_empty() {
            return Err(CommerceError::validation("Category name is required"));
        }
        Ok(Category {
            id: Uuid::new_v4(),
            name,
            slug,
            description: self.description,
            image_url: self.image_url,
            sort_order: self.sort_order,
            is_active: self.is_active.unwrap_or(true),
            created_at: now,
            updated_at: now,
        })
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CategoryPatch {
    pub name: Option<String>,
    pub slug: Option<String>,
    pub description: Option<String>,
    pub image_url: Option<String>,
    pub sort_order: Option<i32>,
    pub is_active: Option<bool>,
}

impl CategoryPatch {
    pub fn apply(self, category: &mut Category, now: DateTime<Utc>) -> CommerceResult<()> {
        if self.name.as_deref().is_some_and(|n| n.trim().is_empty()) {
            return Err(CommerceError::validation("Category name is required"));
        }
        if let Some(name) = self.name {
            category.name = name.trim().to_string();
        }
        if let Some(slug) = self.slug.map(|s| slugify(&s)).filter(|s| !s.is_empty()) {
            category.slug = slug;
        }
        if self.description.is_some() {
            category.description = self.description;
        }
        if self.image_url.is_some() {
            category.image_url = self.image_url;
        }
        if let Some(order) = self.sort_order {
            category.sort_order = order;
        }
        if let Some(active) = self.is_active {
            category.is_active = active;
        }
        category.updated_at = now;
        Ok(())
    }
}
