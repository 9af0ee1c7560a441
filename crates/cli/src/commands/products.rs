//! Catalog commands.

use shopkeep_core::{Product, ProductId};
use shopkeep_storefront::state::StorefrontState;

use super::{CommandError, failure};

#[allow(clippy::print_stdout)]
fn print_rows(products: &[Product]) {
    if products.is_empty() {
        println!("No products");
        return;
    }
    for product in products {
        println!(
            "{:>6}  {:<32}  {:>10.2}  {}",
            product.id,
            product.name,
            product.price,
            if product.in_stock() {
                format!("{} in stock", product.stock)
            } else {
                "sold out".to_string()
            }
        );
    }
}

async fn load_catalog(state: &StorefrontState) -> Result<(), CommandError> {
    let catalog = state.catalog();
    catalog
        .fetch_all()
        .await
        .map_err(|e| failure(catalog.error(), e))?;
    Ok(())
}

/// Print the whole catalog.
///
/// # Errors
///
/// Returns an error if the catalog cannot be fetched.
pub async fn list(state: &StorefrontState) -> Result<(), CommandError> {
    load_catalog(state).await?;
    print_rows(&state.catalog().products().await);
    Ok(())
}

/// Print one product.
///
/// # Errors
///
/// Returns an error if the product cannot be fetched.
#[allow(clippy::print_stdout)]
pub async fn show(state: &StorefrontState, id: ProductId) -> Result<(), CommandError> {
    let catalog = state.catalog();
    let product = catalog
        .get_by_id(id)
        .await
        .map_err(|e| failure(catalog.error(), e))?;

    println!("{} (#{})", product.name, product.id);
    println!("  Price: {:.2}", product.price);
    println!("  Stock: {}", product.stock);
    if !product.description.is_empty() {
        println!("  {}", product.description);
    }
    if let Some(image) = state.image_url(&product) {
        println!("  Image: {image}");
    }
    Ok(())
}

/// Load the catalog, then print products matching `query`.
///
/// # Errors
///
/// Returns an error if the catalog cannot be fetched.
pub async fn search(state: &StorefrontState, query: &str) -> Result<(), CommandError> {
    load_catalog(state).await?;
    print_rows(&state.catalog().search(query).await);
    Ok(())
}
