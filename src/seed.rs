//! Startup seeding: the admin account and the launch catalog.
//!
//! Both steps are skipped when their data already exists, so seeding is safe
//! on every boot against a persistent store.

use crate::{
    auth::AuthService,
    errors::ServiceError,
    models::{Product, Role},
    repositories::{DocumentProductRepository, ProductRepository},
    store::DocumentStore,
};
use chrono::{DateTime, TimeZone, Utc};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::sync::Arc;
use tracing::info;

pub const ADMIN_EMAIL: &str = "admin@keycraft.com";
const ADMIN_NAME: &str = "Admin";

struct SeedProduct {
    id: &'static str,
    name: &'static str,
    description: &'static str,
    price: Decimal,
    image: &'static str,
    stock: u32,
    category: &'static str,
    created: (i32, u32, u32),
}

const CATALOG: [SeedProduct; 8] = [
    SeedProduct {
        id: "1",
        name: "Nebula Orb",
        description: "A handcrafted resin orb swirling with galaxy-like colors. Glows in the dark.",
        price: dec!(24.99),
        image: "https://images.unsplash.com/photo-1612036782180-6f0b6cd846fe?auto=format&fit=crop&q=80&w=400",
        stock: 15,
        category: "Resin",
        created: (2023, 1, 1),
    },
    SeedProduct {
        id: "2",
        name: "Cyber Skull",
        description: "Metallic finish 3D printed skull with neon accents. Perfect for cyberpunk aesthetics.",
        price: dec!(18.50),
        image: "https://images.unsplash.com/photo-1618423771880-2d64f0d61102?auto=format&fit=crop&q=80&w=400",
        stock: 42,
        category: "3D Printed",
        created: (2023, 1, 1),
    },
    SeedProduct {
        id: "3",
        name: "Rustic Leather Loop",
        description: "Genuine full-grain leather keychain with brass hardware. Ages beautifully.",
        price: dec!(29.00),
        image: "https://images.unsplash.com/photo-1598532163257-526437c35e36?auto=format&fit=crop&q=80&w=400",
        stock: 100,
        category: "Leather",
        created: (2023, 1, 1),
    },
    SeedProduct {
        id: "4",
        name: "Pixel Heart",
        description: "Acrylic pixel art heart. Durable and lightweight.",
        price: dec!(12.00),
        image: "https://images.unsplash.com/photo-1515516089376-88db1e26e9c0?auto=format&fit=crop&q=80&w=400",
        stock: 8,
        category: "Acrylic",
        created: (2023, 1, 1),
    },
    SeedProduct {
        id: "5",
        name: "Miniature Katana",
        description: "Detailed metal alloy replica of a katana. Dull edge for safety.",
        price: dec!(35.00),
        image: "https://images.unsplash.com/photo-1613535900593-9c59573887c9?auto=format&fit=crop&q=80&w=400",
        stock: 5,
        category: "Metal",
        created: (2023, 1, 1),
    },
    SeedProduct {
        id: "6",
        name: "Crystal Shard",
        description: "Natural quartz crystal wire-wrapped in copper.",
        price: dec!(22.00),
        image: "https://images.unsplash.com/photo-1563823267-33d3c8c64222?auto=format&fit=crop&q=80&w=400",
        stock: 20,
        category: "Gemstone",
        created: (2023, 1, 1),
    },
    SeedProduct {
        id: "7",
        name: "Retro Game Controller",
        description: "Classic console controller replica in silicone.",
        price: dec!(9.99),
        image: "https://images.unsplash.com/photo-1551103782-8ab07afd45c1?auto=format&fit=crop&q=80&w=400",
        stock: 150,
        category: "Silicone",
        created: (2023, 2, 15),
    },
    SeedProduct {
        id: "8",
        name: "Brass Compass",
        description: "Working miniature compass in solid brass casing.",
        price: dec!(45.00),
        image: "https://images.unsplash.com/photo-1628151016023-b1d5966601f0?auto=format&fit=crop&q=80&w=400",
        stock: 12,
        category: "Metal",
        created: (2023, 3, 10),
    },
];

/// What a seeding run actually wrote
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct SeedReport {
    pub admin_created: bool,
    pub products_created: usize,
}

fn midnight(year: i32, month: u32, day: u32) -> Result<DateTime<Utc>, ServiceError> {
    Utc.with_ymd_and_hms(year, month, day, 0, 0, 0)
        .single()
        .ok_or_else(|| {
            ServiceError::InternalError(format!("invalid seed date {}-{}-{}", year, month, day))
        })
}

/// Seed the admin account and, when the catalog is empty, the launch products.
pub async fn seed(
    store: Arc<dyn DocumentStore>,
    auth: &AuthService,
    admin_password: &str,
) -> Result<SeedReport, ServiceError> {
    let mut report = SeedReport::default();

    if auth.find_by_email(ADMIN_EMAIL).await?.is_none() {
        auth.create_user(ADMIN_NAME, ADMIN_EMAIL, admin_password, Role::Admin)
            .await?;
        report.admin_created = true;
        info!(email = ADMIN_EMAIL, "admin account seeded");
    }

    let products = DocumentProductRepository::new(store);
    if products.find_all().await?.is_empty() {
        for entry in &CATALOG {
            let (year, month, day) = entry.created;
            products
                .insert(&Product {
                    id: entry.id.to_string(),
                    name: entry.name.to_string(),
                    description: entry.description.to_string(),
                    price: entry.price,
                    stock: entry.stock,
                    category: entry.category.to_string(),
                    is_active: true,
                    images: vec![entry.image.to_string()],
                    created_at: midnight(year, month, day)?,
                })
                .await?;
            report.products_created += 1;
        }
        info!(count = report.products_created, "catalog seeded");
    }

    Ok(report)
}
