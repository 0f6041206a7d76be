use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};

/// Shown wherever a product has no image of its own.
pub const PLACEHOLDER_IMAGE: &str = "https://via.placeholder.com/400";

/// Catalog entry. The catalog is the only authority on price, stock and
/// availability.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Product {
    #[schema(example = "1")]
    pub id: String,
    #[schema(example = "Nebula Orb")]
    pub name: String,
    pub description: String,
    #[serde(with = "rust_decimal::serde::float")]
    #[schema(value_type = f64, example = 24.99)]
    pub price: Decimal,
    #[schema(example = 15)]
    pub stock: u32,
    #[schema(example = "Resin")]
    pub category: String,
    pub is_active: bool,
    #[serde(default)]
    pub images: Vec<String>,
    pub created_at: DateTime<Utc>,
}

impl Product {
    /// First image, or the placeholder when the product has none.
    pub fn primary_image(&self) -> &str {
        self.images
            .first()
            .map(String::as_str)
            .unwrap_or(PLACEHOLDER_IMAGE)
    }

    /// Active and holding at least `quantity` units.
    pub fn can_fulfil(&self, quantity: u32) -> bool {
        self.is_active && self.stock >= quantity
    }
}

/// Partial product update. `id` and `createdAt` are not updatable.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ProductUpdate {
    pub name: Option<String>,
    pub description: Option<String>,
    #[serde(default, with = "rust_decimal::serde::float_option")]
    #[schema(value_type = Option<f64>)]
    pub price: Option<Decimal>,
    pub stock: Option<u32>,
    pub category: Option<String>,
    pub is_active: Option<bool>,
    pub images: Option<Vec<String>>,
}

impl ProductUpdate {
    pub fn apply(self, product: &mut Product) {
        if let Some(name) = self.name {
            product.name = name;
        }
        if let Some(description) = self.description {
            product.description = description;
        }
        if let Some(price) = self.price {
            product.price = price;
        }
        if let Some(stock) = self.stock {
            product.stock = stock;
        }
        if let Some(category) = self.category {
            product.category = category;
        }
        if let Some(is_active) = self.is_active {
            product.is_active = is_active;
        }
        if let Some(images) = self.images {
            product.images = images;
        }
    }
}

/// Query parameters accepted by the product listing.
#[derive(Debug, Clone, Default, Deserialize, IntoParams)]
#[serde(rename_all = "camelCase")]
#[into_params(parameter_in = Query)]
pub struct ProductFilter {
    /// Case-insensitive substring over name, description and category
    pub search: Option<String>,
    /// Exact category; "All" disables the filter
    pub category: Option<String>,
    /// Admin listings set this to see deactivated products
    #[serde(default)]
    pub include_inactive: bool,
    /// 1-indexed page number
    pub page: Option<u32>,
    /// Page size, 1..=100 (default 100)
    pub limit: Option<u32>,
}

/// One page of products, newest first.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ProductPage {
    pub data: Vec<Product>,
    pub total: usize,
    pub page: u32,
    pub total_pages: u32,
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use serde_json::json;

    fn orb() -> Product {
        Product {
            id: "1".into(),
            name: "Nebula Orb".into(),
            description: "A handcrafted resin orb.".into(),
            price: dec!(24.99),
            stock: 15,
            category: "Resin".into(),
            is_active: true,
            images: vec![],
            created_at: Utc::now(),
        }
    }

    #[test]
    fn primary_image_falls_back_to_placeholder() {
        let mut product = orb();
        assert_eq!(product.primary_image(), PLACEHOLDER_IMAGE);

        product.images = vec!["https://img/a.png".into(), "https://img/b.png".into()];
        assert_eq!(product.primary_image(), "https://img/a.png");
    }

    #[test]
    fn wire_format_is_camel_case_with_decimal_price() {
        let value = serde_json::to_value(orb()).unwrap();
        assert_eq!(value["price"], json!(24.99));
        assert_eq!(value["isActive"], json!(true));
        assert!(value.get("createdAt").is_some());

        let back: Product = serde_json::from_value(value).unwrap();
        assert_eq!(back.price, dec!(24.99));
    }

    #[test]
    fn update_merges_only_supplied_fields() {
        let mut product = orb();
        let created_at = product.created_at;
        ProductUpdate {
            price: Some(dec!(19.99)),
            is_active: Some(false),
            ..Default::default()
        }
        .apply(&mut product);

        assert_eq!(product.price, dec!(19.99));
        assert!(!product.is_active);
        assert_eq!(product.name, "Nebula Orb");
        assert_eq!(product.created_at, created_at);
    }

    #[test]
    fn inactive_product_cannot_fulfil() {
        let mut product = orb();
        assert!(product.can_fulfil(15));
        assert!(!product.can_fulfil(16));
        product.is_active = false;
        assert!(!product.can_fulfil(1));
    }
}
