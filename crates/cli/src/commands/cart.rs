//! Cart commands. All of them need a stored session.

use shopkeep_core::{CartItemId, ProductId};
use shopkeep_storefront::services::CartAggregator;
use shopkeep_storefront::state::StorefrontState;

use super::{CommandError, failure, require_session};

#[allow(clippy::print_stdout)]
fn print_cart(cart: &CartAggregator) {
    if cart.is_empty() {
        println!("Cart is empty");
        return;
    }
    for item in cart.items() {
        println!(
            "{:>6}  {:<32}  {:>3} x {:>8.2}  {:>10.2}",
            item.id,
            item.product.name,
            item.quantity,
            item.product.price,
            CartAggregator::item_subtotal(&item)
        );
    }
    println!("Total: {:.2}", cart.total());
}

/// Print the cart.
///
/// # Errors
///
/// Returns an error if not signed in or the cart cannot be fetched.
pub async fn show(state: &StorefrontState) -> Result<(), CommandError> {
    require_session(state)?;
    let cart = state.cart();
    cart.fetch().await.map_err(|e| failure(cart.error(), e))?;
    print_cart(cart);
    Ok(())
}

/// Add a product and print the resulting cart.
///
/// # Errors
///
/// Returns an error if not signed in or the API rejects the line.
pub async fn add(
    state: &StorefrontState,
    product_id: ProductId,
    quantity: u32,
) -> Result<(), CommandError> {
    require_session(state)?;
    let cart = state.cart();
    cart.add(product_id, quantity)
        .await
        .map_err(|e| failure(cart.error(), e))?;
    print_cart(cart);
    Ok(())
}

/// Change a line's quantity and print the resulting cart.
///
/// # Errors
///
/// Returns an error if not signed in or the API rejects the change.
pub async fn update(
    state: &StorefrontState,
    item_id: CartItemId,
    quantity: u32,
) -> Result<(), CommandError> {
    require_session(state)?;
    let cart = state.cart();
    cart.update_quantity(item_id, quantity)
        .await
        .map_err(|e| failure(cart.error(), e))?;
    print_cart(cart);
    Ok(())
}

/// Remove a line and print the re-fetched cart.
///
/// # Errors
///
/// Returns an error if not signed in or either request fails.
pub async fn remove(state: &StorefrontState, item_id: CartItemId) -> Result<(), CommandError> {
    require_session(state)?;
    let cart = state.cart();
    cart.remove(item_id)
        .await
        .map_err(|e| failure(cart.error(), e))?;
    print_cart(cart);
    Ok(())
}

/// Check out a line and print the server's payload.
///
/// # Errors
///
/// Returns an error if not signed in, the checkout fails, or the payload
/// cannot be rendered.
#[allow(clippy::print_stdout)]
pub async fn checkout(state: &StorefrontState, item_id: CartItemId) -> Result<(), CommandError> {
    require_session(state)?;
    let cart = state.cart();
    let receipt = cart
        .checkout(item_id)
        .await
        .map_err(|e| failure(cart.error(), e))?;

    println!("{}", serde_json::to_string_pretty(&receipt)?);
    Ok(())
}
