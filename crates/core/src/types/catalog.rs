//! Catalog entities.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::id::ProductId;

/// A product as served by the catalog API.
///
/// Immutable from the client's point of view: a product is replaced by a
/// newer fetch, never edited locally.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Product {
    /// Product ID.
    pub id: ProductId,
    /// Display name.
    pub name: String,
    /// Long-form description.
    #[serde(default)]
    pub description: String,
    /// Unit price.
    pub price: Decimal,
    /// Units in stock, as last reported by the server.
    #[serde(default)]
    pub stock: i64,
    /// Image reference: an absolute URL, a rooted path, or a bare file name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
}

impl Product {
    /// Whether `query` appears in the name or description, ignoring case.
    ///
    /// An empty query matches every product.
    #[must_use]
    pub fn matches(&self, query: &str) -> bool {
        let needle = query.to_lowercase();
        self.name.to_lowercase().contains(&needle)
            || self.description.to_lowercase().contains(&needle)
    }

    /// Whether the server reported any stock.
    #[must_use]
    pub const fn in_stock(&self) -> bool {
        self.stock > 0
    }

    /// Resolve the image reference against `image_base`.
    ///
    /// See [`resolve_image_url`].
    #[must_use]
    pub fn image_url(&self, image_base: &str) -> Option<String> {
        resolve_image_url(self.image_url.as_deref(), image_base)
    }
}

/// Resolve a product image reference into a full URL.
///
/// - `None` or empty: `None`
/// - `http://...` / `https://...`: returned as-is
/// - `/path/to.png`: appended to `image_base`
/// - `file.png`: placed under `image_base/images/`
#[must_use]
pub fn resolve_image_url(image_ref: Option<&str>, image_base: &str) -> Option<String> {
    let image_ref = image_ref.map(str::trim).filter(|r| !r.is_empty())?;

    if image_ref.starts_with("http://") || image_ref.starts_with("https://") {
        return Some(image_ref.to_string());
    }

    let base = image_base.trim_end_matches('/');
    if image_ref.starts_with('/') {
        Some(format!("{base}{image_ref}"))
    } else {
        Some(format!("{base}/images/{image_ref}"))
    }
}
