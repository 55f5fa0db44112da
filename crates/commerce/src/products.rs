//! Catalog reads: filtered, paginated product listing.

use serde::Serialize;
use std::sync::Arc;

use oc_domain::commerce::Product;
use oc_domain::error::{Error, Result};
use oc_store::Store;

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Pagination {
    pub page: usize,
    pub limit: usize,
    pub total: usize,
    pub pages: usize,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProductPage {
    pub products: Vec<Product>,
    pub pagination: Pagination,
}

pub struct ProductService {
    store: Arc<Store>,
}

impl ProductService {
    pub fn new(store: Arc<Store>) -> Self {
        Self { store }
    }

    /// Substring search over name/description/brand, with optional
    /// category/brand/price filters. Page numbers are 1-based.
    #[allow(clippy::too_many_arguments)]
    pub fn list_products(
        &self,
        query: Option<&str>,
        category: Option<&str>,
        brand: Option<&str>,
        min_price: Option<f64>,
        max_price: Option<f64>,
        page: usize,
        limit: usize,
    ) -> ProductPage {
        let normalized_query = query.unwrap_or("").trim().to_lowercase();
        let normalized_category = category.unwrap_or("").trim().to_lowercase();
        let normalized_brand = brand.unwrap_or("").trim().to_lowercase();
        let safe_page = page.max(1);
        let safe_limit = limit.clamp(1, 100);

        let mut filtered: Vec<Product> = self
            .store
            .list_products()
            .into_iter()
            .filter(|item| {
                if !normalized_query.is_empty() {
                    let haystack = format!(
                        "{} {} {}",
                        item.name, item.description, item.brand
                    )
                    .to_lowercase();
                    if !haystack.contains(&normalized_query) {
                        return false;
                    }
                }
                if !normalized_category.is_empty()
                    && item.category.to_lowercase() != normalized_category
                {
                    return false;
                }
                if !normalized_brand.is_empty() && item.brand.to_lowercase() != normalized_brand {
                    return false;
                }
                if min_price.is_some_and(|min| item.price < min) {
                    return false;
                }
                if max_price.is_some_and(|max| item.price > max) {
                    return false;
                }
                true
            })
            .collect();
        filtered.sort_by(|a, b| a.id.cmp(&b.id));

        let total = filtered.len();
        let start = (safe_page - 1) * safe_limit;
        let page_items: Vec<Product> = filtered.into_iter().skip(start).take(safe_limit).collect();

        ProductPage {
            products: page_items,
            pagination: Pagination {
                page: safe_page,
                limit: safe_limit,
                total,
                pages: total.div_ceil(safe_limit),
            },
        }
    }

    pub fn get_product(&self, product_id: &str) -> Result<Product> {
        self.store
            .get_product(product_id)
            .ok_or_else(|| Error::NotFound(format!("product {product_id}")))
    }
}
