/// Commerce services module - catalog and cart logic
pub mod cart_service;
pub mod product_catalog_service;

// Re-export services for convenience
pub use cart_service::{CartOwner, CartService};
pub use product_catalog_service::{CreateProductInput, ImageUpload, ProductCatalogService};
