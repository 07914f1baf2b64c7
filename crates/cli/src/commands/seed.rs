//! Catalog seeding.
//!
//! Categories and products are matched by name, so running the command twice
//! inserts nothing the second time.
//!
//! # YAML format
//!
//! ```yaml
//! categories:
//!   - name: Canapele
//!     products:
//!       - name: Canapea Confort
//!         description: O canapea foarte confortabilă
//!         price: 350
//!         dimensions: 200x90x85 cm
//!         image_urls: [/uploads/products/canapea.jpg]
//! ```

use std::path::Path;

use rust_decimal::Decimal;
use serde::Deserialize;
use simonia_core::{CategoryId, Money, MoneyError};
use simonia_server::db::products::NewProduct;
use simonia_server::db::{CategoryRepository, ProductRepository, RepositoryError};
use sqlx::PgPool;
use thiserror::Error;
use tracing::{info, warn};

use super::{CommandError, connect};

/// Products generated per built-in category.
const BUILTIN_COPIES: u32 = 8;

#[derive(Debug, Error)]
pub enum SeedError {
    #[error(transparent)]
    Connect(#[from] CommandError),

    #[error("Failed to read {path}: {source}")]
    Read {
        path: String,
        source: std::io::Error,
    },

    #[error("Invalid catalog file: {0}")]
    Parse(#[from] serde_yaml::Error),

    #[error("Invalid price for {product}: {source}")]
    Price { product: String, source: MoneyError },

    #[error("Invalid catalog: {0}")]
    Invalid(String),

    #[error("Database error: {0}")]
    Repository(#[from] RepositoryError),
}

/// Catalog to seed.
#[derive(Debug, Deserialize)]
pub struct SeedCatalog {
    pub categories: Vec<SeedCategory>,
}

#[derive(Debug, Deserialize)]
pub struct SeedCategory {
    pub name: String,
    #[serde(default)]
    pub products: Vec<SeedProduct>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SeedProduct {
    pub name: String,
    #[serde(default)]
    pub description: String,
    /// Price in MDL.
    pub price: Decimal,
    #[serde(default)]
    pub dimensions: Option<String>,
    #[serde(default)]
    pub image_urls: Vec<String>,
}

/// Counts reported after seeding.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct SeedSummary {
    pub categories_created: usize,
    pub products_created: usize,
    pub products_skipped: usize,
}

/// Seed from `file`, or the built-in catalog when none is given.
pub async fn run(file: Option<&Path>) -> Result<(), SeedError> {
    let catalog = match file {
        Some(path) => {
            info!(path = %path.display(), "Loading catalog from file");
            load(path).await?
        }
        None => builtin_catalog(),
    };
    validate(&catalog)?;

    let pool = connect().await?;
    let summary = seed(&pool, &catalog).await?;

    info!("Seeding complete!");
    info!("  Categories created: {}", summary.categories_created);
    info!("  Products created: {}", summary.products_created);
    info!("  Products skipped (already exist): {}", summary.products_skipped);
    Ok(())
}

async fn load(path: &Path) -> Result<SeedCatalog, SeedError> {
    let content = tokio::fs::read_to_string(path)
        .await
        .map_err(|source| SeedError::Read {
            path: path.display().to_string(),
            source,
        })?;
    Ok(serde_yaml::from_str(&content)?)
}

fn validate(catalog: &SeedCatalog) -> Result<(), SeedError> {
    for category in &catalog.categories {
        if category.name.trim().is_empty() {
            return Err(SeedError::Invalid("category with empty name".to_string()));
        }
        for product in &category.products {
            if product.name.trim().is_empty() {
                return Err(SeedError::Invalid(format!(
                    "product with empty name in {}",
                    category.name
                )));
            }
            let price = price_of(product)?;
            if !price.is_positive() {
                return Err(SeedError::Invalid(format!(
                    "{} must have a positive price",
                    product.name
                )));
            }
        }
    }
    Ok(())
}

fn price_of(product: &SeedProduct) -> Result<Money, SeedError> {
    Money::from_decimal(product.price).map_err(|source| SeedError::Price {
        product: product.name.clone(),
        source,
    })
}

async fn seed(pool: &PgPool, catalog: &SeedCatalog) -> Result<SeedSummary, SeedError> {
    let categories = CategoryRepository::new(pool);
    let products = ProductRepository::new(pool);
    let mut summary = SeedSummary::default();

    for category in &catalog.categories {
        let name = category.name.trim();
        let category_id: CategoryId = if let Some(existing) = categories.get_by_name(name).await? {
            existing.id
        } else {
            summary.categories_created += 1;
            categories.create(name).await?.id
        };

        for product in &category.products {
            let product_name = product.name.trim();
            if products.get_by_name(product_name).await?.is_some() {
                summary.products_skipped += 1;
                continue;
            }

            let created = products
                .create(&NewProduct {
                    name: product_name.to_string(),
                    description: product.description.clone(),
                    price: price_of(product)?,
                    image_urls: product.image_urls.clone(),
                    dimensions: product.dimensions.clone(),
                    is_active: true,
                    is_available: true,
                    category_id: Some(category_id),
                })
                .await;

            match created {
                Ok(_) => summary.products_created += 1,
                Err(RepositoryError::Conflict(msg)) => {
                    warn!(product = product_name, %msg, "Skipping product");
                    summary.products_skipped += 1;
                }
                Err(e) => return Err(e.into()),
            }
        }
    }

    Ok(summary)
}

/// Default catalog: one template per category, numbered 1 to 8.
#[must_use]
pub fn builtin_catalog() -> SeedCatalog {
    let templates = [
        (
            "Canapele",
            "Canapea Confort",
            "O canapea foarte confortabilă",
            350,
            "200x90x85 cm",
            "canapea.jpg",
        ),
        (
            "Coltare",
            "Colțar Modern",
            "Colțar extensibil",
            1600,
            "250x150x90 cm",
            "coltar.jpg",
        ),
        (
            "Fotolii",
            "Fotoliu Relaxare",
            "Fotoliu confortabil",
            500,
            "90x90x100 cm",
            "fotoliu.jpg",
        ),
        (
            "Paturi",
            "Pat Matrimonial",
            "Pat confortabil",
            1400,
            "200x180x50 cm",
            "pat.jpg",
        ),
    ];

    let categories = templates
        .into_iter()
        .map(|(category, name, description, price, dimensions, image)| SeedCategory {
            name: category.to_string(),
            products: (1..=BUILTIN_COPIES)
                .map(|n| SeedProduct {
                    name: format!("{name} {n}"),
                    description: description.to_string(),
                    price: Decimal::from(price),
                    dimensions: Some(dimensions.to_string()),
                    image_urls: vec![format!("/uploads/products/{image}")],
                })
                .collect(),
        })
        .collect();

    SeedCatalog { categories }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_catalog_shape() {
        let catalog = builtin_catalog();
        assert_eq!(catalog.categories.len(), 4);
        for category in &catalog.categories {
            assert_eq!(category.products.len(), 8);
        }
        assert_eq!(catalog.categories[0].products[0].name, "Canapea Confort 1");
        assert_eq!(catalog.categories[3].products[7].name, "Pat Matrimonial 8");
        assert!(validate(&catalog).is_ok());
    }

    #[test]
    fn test_builtin_names_unique() {
        let catalog = builtin_catalog();
        let mut names: Vec<_> = catalog
            .categories
            .iter()
            .flat_map(|c| c.products.iter().map(|p| p.name.as_str()))
            .collect();
        let total = names.len();
        names.sort_unstable();
        names.dedup();
        assert_eq!(names.len(), total);
    }

    #[test]
    fn test_parse_yaml() {
        let yaml = r"
categories:
  - name: Mese
    products:
      - name: Masă Dining
        price: 899.99
        dimensions: 160x90x75 cm
  - name: Scaune
";
        let catalog: SeedCatalog = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(catalog.categories.len(), 2);
        let product = &catalog.categories[0].products[0];
        assert_eq!(price_of(product).unwrap(), Money::from_cents(89_999));
        assert!(product.image_urls.is_empty());
        assert!(catalog.categories[1].products.is_empty());
        assert!(validate(&catalog).is_ok());
    }

    #[test]
    fn test_validate_rejects_bad_entries() {
        let catalog: SeedCatalog = serde_yaml::from_str(
            "categories:\n  - name: Mese\n    products:\n      - name: Gratis\n        price: 0\n",
        )
        .unwrap();
        assert!(matches!(validate(&catalog), Err(SeedError::Invalid(_))));

        let catalog: SeedCatalog = serde_yaml::from_str("categories:\n  - name: '  '\n").unwrap();
        assert!(matches!(validate(&catalog), Err(SeedError::Invalid(_))));
    }
}
