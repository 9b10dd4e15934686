//! Checkout flow: phone, then address, then an explicit confirm or cancel.

use crate::db::{
    CustomerProfile, Db, DELIVERY_METHOD_DELIVERY, NewOrder, NewOrderItem, PAYMENT_METHOD_CARD,
    PlacedOrder,
};
use crate::session::{CheckoutStep, Session};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CheckoutError {
    #[error("cart is empty")]
    EmptyCart,
    #[error("no order is waiting for confirmation")]
    NothingToConfirm,
    #[error("failed to store order: {0}")]
    Persistence(#[source] anyhow::Error),
}

/// What a free-text message did to the checkout.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepOutcome {
    /// Phone stored, address requested next.
    PhoneAccepted,
    /// Address stored, the order summary must be shown for confirmation.
    ReadyToConfirm,
    /// Text arrived while the summary is waiting for a button press.
    AwaitingDecision,
    /// Blank input, the current question stays open.
    EmptyInput,
    NotInCheckout,
}

/// Starts (or restarts) checkout. An empty cart leaves the step untouched.
pub fn begin(session: &mut Session) -> Result<(), CheckoutError> {
    if session.cart.is_empty() {
        return Err(CheckoutError::EmptyCart);
    }
    session.checkout = CheckoutStep::AwaitingPhone;
    tracing::debug!(user_id = session.user_id, "Checkout started");
    Ok(())
}

/// Feeds the next free-text message into the flow. Non-blank input is stored
/// verbatim.
pub fn submit(session: &mut Session, text: &str) -> StepOutcome {
    match &session.checkout {
        CheckoutStep::None => StepOutcome::NotInCheckout,
        CheckoutStep::Confirming { .. } => StepOutcome::AwaitingDecision,
        _ if text.trim().is_empty() => StepOutcome::EmptyInput,
        CheckoutStep::AwaitingPhone => {
            session.checkout = CheckoutStep::AwaitingAddress {
                phone: text.to_string(),
            };
            StepOutcome::PhoneAccepted
        }
        CheckoutStep::AwaitingAddress { phone } => {
            session.checkout = CheckoutStep::Confirming {
                phone: phone.clone(),
                address: text.to_string(),
            };
            StepOutcome::ReadyToConfirm
        }
    }
}

/// Drops the collected phone/address. The cart stays as it was.
pub fn cancel(session: &mut Session) -> bool {
    let was_active = session.checkout.is_active();
    session.checkout = CheckoutStep::None;
    was_active
}

/// Builds the order that confirming would place right now.
pub fn pending_order(
    session: &Session,
    customer: CustomerProfile,
) -> Result<NewOrder, CheckoutError> {
    let CheckoutStep::Confirming { phone, address } = &session.checkout else {
        return Err(CheckoutError::NothingToConfirm);
    };
    if session.cart.is_empty() {
        return Err(CheckoutError::EmptyCart);
    }

    let items = session
        .cart
        .lines()
        .iter()
        .map(|line| NewOrderItem {
            product_id: line.product.id,
            product_name: line.product.name.clone(),
            price: line.product.price,
            quantity: line.quantity,
        })
        .collect();

    Ok(NewOrder {
        telegram_id: session.user_id,
        customer,
        phone_number: phone.clone(),
        delivery_address: address.clone(),
        payment_method: PAYMENT_METHOD_CARD,
        delivery_method: DELIVERY_METHOD_DELIVERY,
        items,
    })
}

/// Places the order and resets the session. On a storage error the session
/// stays in the confirmation step so the user can press confirm again.
pub async fn confirm(
    db: &Db,
    session: &mut Session,
    customer: CustomerProfile,
) -> Result<PlacedOrder, CheckoutError> {
    let order = match pending_order(session, customer) {
        Ok(order) => order,
        Err(CheckoutError::EmptyCart) => {
            session.checkout = CheckoutStep::None;
            return Err(CheckoutError::EmptyCart);
        }
        Err(err) => return Err(err),
    };

    let placed = db
        .place_order(&order)
        .await
        .map_err(CheckoutError::Persistence)?;

    session.cart.clear();
    session.checkout = CheckoutStep::None;
    tracing::info!(
        user_id = session.user_id,
        order_id = placed.order_id,
        customer_id = placed.customer_id,
        total = placed.total_amount,
        items = placed.item_count,
        "Order placed"
    );
    Ok(placed)
}
