use crate::{
    errors::ServiceError,
    events::{Event, EventSender},
    models::{Product, ProductFilter, ProductPage, ProductUpdate},
    repositories::ProductRepository,
};
use chrono::Utc;
use rand::Rng;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, instrument, warn};
use url::Url;
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

const DEFAULT_LIMIT: u32 = 100;
const MAX_LIMIT: u32 = 100;
const ALL_CATEGORIES: &str = "All";

/// Input for creating a product
#[derive(Debug, Clone, Deserialize, Serialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CreateProductInput {
    #[validate(length(min = 3, message = "name must be at least 3 characters"))]
    pub name: String,
    #[validate(length(min = 10, message = "description must be at least 10 characters"))]
    pub description: String,
    #[serde(with = "rust_decimal::serde::float")]
    #[schema(value_type = f64)]
    pub price: Decimal,
    pub stock: i64,
    #[validate(length(min = 1, message = "category is required"))]
    pub category: String,
    #[serde(default = "default_true")]
    pub is_active: bool,
    #[serde(default)]
    pub images: Vec<String>,
}

fn default_true() -> bool {
    true
}

/// Metadata of an uploaded image file. The bytes themselves are not kept.
#[derive(Debug, Clone)]
pub struct ImageUpload {
    pub file_name: String,
    pub content_type: Option<String>,
    pub size: usize,
}

fn ensure_price(price: Decimal) -> Result<(), ServiceError> {
    if price <= Decimal::ZERO {
        return Err(ServiceError::ValidationError(
            "price must be a positive number".to_string(),
        ));
    }
    Ok(())
}

fn ensure_images(images: &[String]) -> Result<(), ServiceError> {
    for image in images {
        Url::parse(image).map_err(|_| {
            ServiceError::ValidationError(format!("image '{}' must be a valid URL", image))
        })?;
    }
    Ok(())
}

fn ensure_min_len(value: &str, min: usize, field: &str) -> Result<(), ServiceError> {
    if value.trim().chars().count() < min {
        return Err(ServiceError::ValidationError(format!(
            "{} must be at least {} characters",
            field, min
        )));
    }
    Ok(())
}

/// Product catalog service. The single authority on price, stock and
/// availability for carts and orders.
#[derive(Clone)]
pub struct ProductCatalogService {
    products: Arc<dyn ProductRepository>,
    event_sender: Arc<EventSender>,
}

impl ProductCatalogService {
    pub fn new(products: Arc<dyn ProductRepository>, event_sender: Arc<EventSender>) -> Self {
        Self {
            products,
            event_sender,
        }
    }

    /// Filtered, paginated listing, newest first
    #[instrument(skip(self))]
    pub async fn list_products(&self, filter: ProductFilter) -> Result<ProductPage, ServiceError> {
        let page = filter.page.unwrap_or(1);
        if page < 1 {
            return Err(ServiceError::ValidationError(
                "page must be at least 1".to_string(),
            ));
        }
        let limit = filter.limit.unwrap_or(DEFAULT_LIMIT);
        if !(1..=MAX_LIMIT).contains(&limit) {
            return Err(ServiceError::ValidationError(format!(
                "limit must be between 1 and {}",
                MAX_LIMIT
            )));
        }

        let search = filter
            .search
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_lowercase);
        let category = filter
            .category
            .as_deref()
            .filter(|c| !c.is_empty() && *c != ALL_CATEGORIES);

        let mut products: Vec<Product> = self
            .products
            .find_all()
            .await?
            .into_iter()
            .filter(|p| filter.include_inactive || p.is_active)
            .filter(|p| match &search {
                Some(q) => {
                    p.name.to_lowercase().contains(q)
                        || p.description.to_lowercase().contains(q)
                        || p.category.to_lowercase().contains(q)
                }
                None => true,
            })
            .filter(|p| category.map_or(true, |c| p.category == c))
            .collect();

        products.sort_by(|a, b| b.created_at.cmp(&a.created_at));

        let total = products.len();
        let total_pages = total.div_ceil(limit as usize) as u32;
        let offset = (page as usize - 1) * limit as usize;
        let data = products
            .into_iter()
            .skip(offset)
            .take(limit as usize)
            .collect();

        Ok(ProductPage {
            data,
            total,
            page,
            total_pages,
        })
    }

    /// Get a product by ID
    #[instrument(skip(self))]
    pub async fn get_product(&self, id: &str) -> Result<Product, ServiceError> {
        self.products
            .find_by_id(id)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Product {} not found", id)))
    }

    /// Like `get_product`, but a missing product is `None` rather than an error
    pub async fn find_product(&self, id: &str) -> Result<Option<Product>, ServiceError> {
        self.products.find_by_id(id).await
    }

    /// Create a new product
    #[instrument(skip(self, input), fields(name = %input.name))]
    pub async fn create_product(&self, input: CreateProductInput) -> Result<Product, ServiceError> {
        input.validate()?;
        ensure_price(input.price)?;
        ensure_images(&input.images)?;
        let stock = u32::try_from(input.stock).map_err(|_| {
            ServiceError::ValidationError("stock must be a non-negative integer".to_string())
        })?;

        let product = Product {
            id: Uuid::new_v4().simple().to_string(),
            name: input.name.trim().to_string(),
            description: input.description.trim().to_string(),
            price: input.price,
            stock,
            category: input.category.trim().to_string(),
            is_active: input.is_active,
            images: input.images,
            created_at: Utc::now(),
        };

        self.products.insert(&product).await?;
        self.event_sender
            .send_or_log(Event::ProductCreated(product.id.clone()))
            .await;

        info!(product_id = %product.id, "Product created");
        Ok(product)
    }

    /// Merge the supplied fields onto an existing product
    #[instrument(skip(self, changes))]
    pub async fn update_product(
        &self,
        id: &str,
        changes: ProductUpdate,
    ) -> Result<Product, ServiceError> {
        if let Some(name) = &changes.name {
            ensure_min_len(name, 3, "name")?;
        }
        if let Some(description) = &changes.description {
            ensure_min_len(description, 10, "description")?;
        }
        if let Some(category) = &changes.category {
            ensure_min_len(category, 1, "category")?;
        }
        if let Some(price) = changes.price {
            ensure_price(price)?;
        }
        if let Some(images) = &changes.images {
            ensure_images(images)?;
        }

        let product = self
            .products
            .update(id, changes)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Product {} not found", id)))?;

        self.event_sender
            .send_or_log(Event::ProductUpdated(product.id.clone()))
            .await;

        info!(product_id = %product.id, "Product updated");
        Ok(product)
    }

    /// Delete a product
    #[instrument(skip(self))]
    pub async fn delete_product(&self, id: &str) -> Result<(), ServiceError> {
        if !self.products.delete(id).await? {
            return Err(ServiceError::NotFound(format!("Product {} not found", id)));
        }

        self.event_sender
            .send_or_log(Event::ProductDeleted(id.to_string()))
            .await;

        info!(product_id = %id, "Product deleted");
        Ok(())
    }

    /// Accept image uploads, returning one hosted URL per file.
    ///
    /// Files are not stored; each gets a placeholder image URL.
    #[instrument(skip(self, files), fields(count = files.len()))]
    pub async fn upload_images(&self, files: Vec<ImageUpload>) -> Result<Vec<String>, ServiceError> {
        if files.is_empty() {
            return Err(ServiceError::InvalidInput("No files uploaded".to_string()));
        }

        if let Some(bad) = files.iter().find(|f| {
            !f.content_type
                .as_deref()
                .is_some_and(|ct| ct.starts_with("image/"))
        }) {
            return Err(ServiceError::InvalidInput(format!(
                "File {} is not an image",
                bad.file_name
            )));
        }

        let mut rng = rand::thread_rng();
        Ok(files
            .iter()
            .map(|_| {
                format!(
                    "https://picsum.photos/400/400?random={}",
                    rng.gen_range(0..1000)
                )
            })
            .collect())
    }

    /// Remove `quantity` units from stock; refused if stock would go negative
    pub async fn deduct_stock(&self, id: &str, quantity: u32) -> Result<Product, ServiceError> {
        self.adjust_stock(id, -i64::from(quantity)).await
    }

    /// Put `quantity` units back into stock
    pub async fn restore_stock(&self, id: &str, quantity: u32) -> Result<Product, ServiceError> {
        self.adjust_stock(id, i64::from(quantity)).await
    }

    async fn adjust_stock(&self, id: &str, delta: i64) -> Result<Product, ServiceError> {
        match self.products.adjust_stock(id, delta).await {
            Ok(product) => {
                self.event_sender
                    .send_or_log(Event::StockAdjusted {
                        product_id: product.id.clone(),
                        delta,
                        new_stock: product.stock,
                    })
                    .await;
                Ok(product)
            }
            Err(err) => {
                warn!(product_id = %id, delta, error = %err, "stock adjustment refused");
                Err(err)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{events, repositories::DocumentProductRepository, store::InMemoryStore};
    use assert_matches::assert_matches;
    use chrono::Duration;
    use rust_decimal_macros::dec;

    fn catalog() -> ProductCatalogService {
        let (sender, _rx) = events::channel(64);
        let repo = Arc::new(DocumentProductRepository::new(Arc::new(InMemoryStore::new())));
        ProductCatalogService::new(repo, Arc::new(sender))
    }

    fn input(name: &str, category: &str) -> CreateProductInput {
        CreateProductInput {
            name: name.into(),
            description: "A lovingly made keychain.".into(),
            price: dec!(12.00),
            stock: 3,
            category: category.into(),
            is_active: true,
            images: vec![],
        }
    }

    #[tokio::test]
    async fn list_filters_search_category_and_inactive() {
        let catalog = catalog();
        catalog.create_product(input("Nebula Orb", "Resin")).await.unwrap();
        catalog.create_product(input("Cyber Skull", "3D Printed")).await.unwrap();
        let hidden = catalog.create_product(input("Old Orb", "Resin")).await.unwrap();
        catalog
            .update_product(
                &hidden.id,
                ProductUpdate {
                    is_active: Some(false),
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        let page = catalog.list_products(ProductFilter::default()).await.unwrap();
        assert_eq!(page.total, 2);
        assert!(page.data.iter().all(|p| p.is_active));

        let orbs = catalog
            .list_products(ProductFilter {
                search: Some("ORB".into()),
                include_inactive: true,
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(orbs.total, 2);

        let resin = catalog
            .list_products(ProductFilter {
                category: Some("Resin".into()),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(resin.total, 1);

        let all = catalog
            .list_products(ProductFilter {
                category: Some("All".into()),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(all.total, 2);
    }

    #[tokio::test]
    async fn list_paginates_newest_first() {
        let (sender, _rx) = events::channel(64);
        let repo = Arc::new(DocumentProductRepository::new(Arc::new(InMemoryStore::new())));
        let base = Utc::now();
        for i in 0..5 {
            repo.insert(&Product {
                id: format!("p{}", i),
                name: format!("Product {}", i),
                description: "Ten chars or more".into(),
                price: dec!(1),
                stock: 1,
                category: "Misc".into(),
                is_active: true,
                images: vec![],
                created_at: base + Duration::minutes(i),
            })
            .await
            .unwrap();
        }
        let catalog = ProductCatalogService::new(repo, Arc::new(sender));

        let page = catalog
            .list_products(ProductFilter {
                page: Some(2),
                limit: Some(2),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(page.total, 5);
        assert_eq!(page.total_pages, 3);
        let ids: Vec<_> = page.data.iter().map(|p| p.id.as_str()).collect();
        assert_eq!(ids, vec!["p2", "p1"]);

        let err = catalog
            .list_products(ProductFilter {
                limit: Some(101),
                ..Default::default()
            })
            .await
            .unwrap_err();
        assert_matches!(err, ServiceError::ValidationError(_));
    }

    #[tokio::test]
    async fn create_rejects_invalid_fields() {
        let catalog = catalog();

        let mut short = input("Ab", "Resin");
        assert_matches!(
            catalog.create_product(short.clone()).await,
            Err(ServiceError::ValidationError(_))
        );

        short.name = "Abc".into();
        short.price = dec!(0);
        assert_matches!(
            catalog.create_product(short.clone()).await,
            Err(ServiceError::ValidationError(_))
        );

        short.price = dec!(1);
        short.stock = -1;
        assert_matches!(
            catalog.create_product(short.clone()).await,
            Err(ServiceError::ValidationError(_))
        );

        short.stock = 0;
        short.images = vec!["not a url".into()];
        assert_matches!(
            catalog.create_product(short).await,
            Err(ServiceError::ValidationError(_))
        );
    }

    #[tokio::test]
    async fn update_and_delete_missing_product_is_not_found() {
        let catalog = catalog();
        assert!(catalog
            .update_product("ghost", ProductUpdate::default())
            .await
            .unwrap_err()
            .is_not_found());
        assert!(catalog.delete_product("ghost").await.unwrap_err().is_not_found());
        assert!(catalog.get_product("ghost").await.unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn upload_names_the_offending_file() {
        let catalog = catalog();
        let files = vec![
            ImageUpload {
                file_name: "front.png".into(),
                content_type: Some("image/png".into()),
                size: 10,
            },
            ImageUpload {
                file_name: "notes.txt".into(),
                content_type: Some("text/plain".into()),
                size: 10,
            },
        ];
        let err = catalog.upload_images(files).await.unwrap_err();
        assert_matches!(err, ServiceError::InvalidInput(ref msg) if msg.contains("notes.txt"));

        let urls = catalog
            .upload_images(vec![ImageUpload {
                file_name: "front.png".into(),
                content_type: Some("image/png".into()),
                size: 10,
            }])
            .await
            .unwrap();
        assert_eq!(urls.len(), 1);
        assert!(urls[0].starts_with("https://picsum.photos/400/400?random="));
    }
}
