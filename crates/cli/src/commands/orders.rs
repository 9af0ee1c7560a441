//! Order history commands. All of them need a stored session.

use shopkeep_core::{Order, OrderId};
use shopkeep_storefront::services::OrderHistory;
use shopkeep_storefront::state::StorefrontState;

use super::{CommandError, failure, require_session};
use crate::OrderFilter;

#[allow(clippy::print_stdout)]
fn print_summary(order: &Order) {
    println!(
        "#{:<6}  {:<10}  {:>10.2}  {}{}",
        order.id,
        order.status,
        order.total_amount,
        order.created_at.format("%Y-%m-%d %H:%M"),
        if OrderHistory::can_cancel(order) {
            "  (cancellable)"
        } else {
            ""
        }
    );
}

/// Print orders newest first, narrowed by `filter`.
///
/// # Errors
///
/// Returns an error if not signed in or the orders cannot be fetched.
#[allow(clippy::print_stdout)]
pub async fn list(state: &StorefrontState, filter: OrderFilter) -> Result<(), CommandError> {
    require_session(state)?;
    let history = state.orders();
    history
        .fetch_all()
        .await
        .map_err(|e| failure(history.error(), e))?;

    let orders = match filter {
        OrderFilter::All => history.sorted(),
        OrderFilter::Active => history.active(),
        OrderFilter::Cancelled => history.cancelled(),
        OrderFilter::Cancellable => history.cancellable(),
    };

    if orders.is_empty() {
        println!("No orders");
    }
    for order in &orders {
        print_summary(order);
    }
    Ok(())
}

/// Print one order with its lines.
///
/// # Errors
///
/// Returns an error if not signed in or the order cannot be fetched.
#[allow(clippy::print_stdout)]
pub async fn show(state: &StorefrontState, id: OrderId) -> Result<(), CommandError> {
    require_session(state)?;
    let history = state.orders();
    let order = history
        .get_by_id(id)
        .await
        .map_err(|e| failure(history.error(), e))?;

    print_summary(&order);
    for item in &order.line_items {
        println!(
            "    {:<32}  {:>3} x {:>8.2}  {:>10.2}",
            item.product_name, item.quantity, item.price, item.subtotal
        );
    }
    Ok(())
}

/// Cancel an order and print its new state.
///
/// # Errors
///
/// Returns an error if not signed in or the API refuses the cancellation.
pub async fn cancel(state: &StorefrontState, id: OrderId) -> Result<(), CommandError> {
    require_session(state)?;
    let history = state.orders();
    let order = history
        .cancel_order(id)
        .await
        .map_err(|e| failure(history.error(), e))?;

    print_summary(&order);
    Ok(())
}
