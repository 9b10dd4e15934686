use super::router::CallbackAction;
use super::shared::{
    callback_message_target, edit_cart, schedule_cart_render, send_cart, send_categories,
    send_category_products, send_main_menu, send_product, GENERIC_FAILURE, HandlerResult,
};
use super::state::{user_profile, BotState};
use crate::bot::keyboards;
use crate::cart::{Cart, ProductSnapshot};
use crate::checkout::{self, CheckoutError};
use crate::db::{Db, PAYMENT_METHOD_CARD};
use crate::notify::{fan_out_order, OrderNotice};
use crate::session::{CheckoutStep, Session};
use teloxide::dptree;
use teloxide::prelude::*;
use teloxide::types::InlineKeyboardMarkup;

type CallbackResult = Result<Option<&'static str>, Box<dyn std::error::Error + Send + Sync>>;

pub fn handler() -> teloxide::dispatching::UpdateHandler<Box<dyn std::error::Error + Send + Sync + 'static>> {
    Update::filter_callback_query()
        .branch(dptree::map(parse_callback_action).endpoint(handle_callback))
}

fn parse_callback_action(q: CallbackQuery) -> CallbackAction {
    CallbackAction::parse(q.data.as_deref().unwrap_or(""))
}

/// Every callback gets exactly one answer: the optional note on success, a
/// generic alert on failure.
async fn handle_callback(
    bot: Bot,
    q: CallbackQuery,
    action: CallbackAction,
    state: BotState,
) -> HandlerResult {
    let user_id = q.from.id.0 as i64;
    tracing::debug!(user_id = user_id, action = ?action, "Callback received");

    match dispatch(&bot, &q, action, &state, user_id).await {
        Ok(note) => {
            let answer = bot.answer_callback_query(q.id.clone());
            match note {
                Some(note) => answer.text(note).await?,
                None => answer.await?,
            };
        }
        Err(error) => {
            tracing::error!(
                user_id = user_id,
                action = ?action,
                error = %error,
                "Callback handling failed"
            );
            bot.answer_callback_query(q.id.clone())
                .text(GENERIC_FAILURE)
                .show_alert(true)
                .await?;
        }
    }
    Ok(())
}

async fn dispatch(
    bot: &Bot,
    q: &CallbackQuery,
    action: CallbackAction,
    state: &BotState,
    user_id: i64,
) -> CallbackResult {
    let chat_id = callback_message_target(q)
        .map(|(chat_id, _)| chat_id)
        .unwrap_or(ChatId(user_id));

    match action {
        CallbackAction::ShowCategories | CallbackAction::BackToCatalog => {
            send_categories(bot, chat_id, state).await?;
            Ok(None)
        }
        CallbackAction::MainMenu => {
            send_main_menu(bot, chat_id, "🏠 Bosh menyu").await?;
            Ok(None)
        }
        CallbackAction::Category(category_id) => {
            send_category_products(bot, chat_id, state, category_id).await?;
            Ok(None)
        }
        CallbackAction::Product(product_id) => {
            send_product(bot, chat_id, state, product_id).await?;
            Ok(None)
        }
        CallbackAction::Add(_)
        | CallbackAction::Quantity(..)
        | CallbackAction::Delete(_)
        | CallbackAction::CancelOrder
        | CallbackAction::Unknown => edit_session(bot, q, chat_id, action, state, user_id).await,
        CallbackAction::ViewCart => {
            let session = state.sessions.lock(user_id).await;
            send_cart(bot, chat_id, &session.cart, state.currency()).await?;
            Ok(None)
        }
        CallbackAction::Checkout => start_checkout(bot, chat_id, state, user_id).await,
        CallbackAction::ConfirmOrder => confirm_order(bot, q, chat_id, state, user_id).await,
        CallbackAction::Noop => Ok(None),
    }
}

/// What a cart, cancel or unrecognised button did to the user's session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum SessionEffect {
    Added { name: String, quantity: u32 },
    ProductMissing,
    /// A line changed or disappeared; the cart message needs a refresh.
    CartChanged,
    NotInCart,
    CheckoutCancelled,
    NothingToCancel,
    Untouched,
}

/// Applies a callback to the session. Only `Add` reads the catalog; nothing
/// here writes to the database.
pub(crate) async fn apply_session_action(
    db: &Db,
    session: &mut Session,
    action: CallbackAction,
) -> Result<SessionEffect, anyhow::Error> {
    let effect = match action {
        CallbackAction::Add(product_id) => {
            let Some(product) = db.get_product(product_id).await? else {
                return Ok(SessionEffect::ProductMissing);
            };
            let quantity = session.cart.add_item(ProductSnapshot::from(&product));
            SessionEffect::Added {
                name: product.name,
                quantity,
            }
        }
        CallbackAction::Quantity(product_id, change) => {
            if session.cart.quantity_of(product_id).is_none() {
                SessionEffect::NotInCart
            } else {
                session.cart.change_quantity(product_id, change);
                SessionEffect::CartChanged
            }
        }
        CallbackAction::Delete(product_id) => {
            if session.cart.remove_item(product_id) {
                SessionEffect::CartChanged
            } else {
                SessionEffect::NotInCart
            }
        }
        CallbackAction::CancelOrder => {
            if checkout::cancel(session) {
                SessionEffect::CheckoutCancelled
            } else {
                SessionEffect::NothingToCancel
            }
        }
        _ => SessionEffect::Untouched,
    };
    Ok(effect)
}

async fn edit_session(
    bot: &Bot,
    q: &CallbackQuery,
    chat_id: ChatId,
    action: CallbackAction,
    state: &BotState,
    user_id: i64,
) -> CallbackResult {
    let mut session = state.sessions.lock(user_id).await;
    let effect = apply_session_action(&state.db, &mut session, action).await?;
    match effect {
        SessionEffect::Added { name, quantity } => {
            drop(session);
            tracing::info!(
                user_id = user_id,
                action = ?action,
                quantity = quantity,
                "Product added to cart"
            );
            bot.send_message(
                chat_id,
                format!("✅ {} savatga qo'shildi (jami {} dona)", name, quantity),
            )
            .await?;
            schedule_cart_render(bot.clone(), state.clone(), chat_id, user_id);
            Ok(Some("Savatga qo'shildi"))
        }
        SessionEffect::ProductMissing => Ok(Some("Mahsulot topilmadi")),
        SessionEffect::CartChanged => {
            refresh_cart(bot, q, chat_id, &session.cart, state.currency()).await?;
            Ok(matches!(action, CallbackAction::Delete(_)).then_some("🗑 O'chirildi"))
        }
        SessionEffect::NotInCart => Ok(Some("Mahsulot savatda yo'q")),
        SessionEffect::CheckoutCancelled => {
            drop(session);
            clear_inline_keyboard(bot, q).await;
            send_main_menu(
                bot,
                chat_id,
                "❌ Buyurtma bekor qilindi. Savatingiz saqlanib qoldi.",
            )
            .await?;
            Ok(Some("Bekor qilindi"))
        }
        SessionEffect::NothingToCancel => {
            drop(session);
            clear_inline_keyboard(bot, q).await;
            Ok(Some("Bekor qilinadigan buyurtma yo'q"))
        }
        SessionEffect::Untouched => {
            tracing::debug!(
                user_id = user_id,
                data = ?q.data,
                "Ignoring unknown callback data"
            );
            Ok(None)
        }
    }
}

async fn refresh_cart(
    bot: &Bot,
    q: &CallbackQuery,
    chat_id: ChatId,
    cart: &Cart,
    currency: &str,
) -> HandlerResult {
    match callback_message_target(q) {
        Some((chat_id, message_id)) => edit_cart(bot, chat_id, message_id, cart, currency).await,
        None => send_cart(bot, chat_id, cart, currency).await,
    }
}

async fn start_checkout(
    bot: &Bot,
    chat_id: ChatId,
    state: &BotState,
    user_id: i64,
) -> CallbackResult {
    let started = {
        let mut session = state.sessions.lock(user_id).await;
        checkout::begin(&mut session)
    };
    match started {
        Ok(()) => {
            bot.send_message(
                chat_id,
                "📞 Telefon raqamingizni yuboring yoki tugmani bosing:",
            )
            .reply_markup(keyboards::share_phone())
            .await?;
            Ok(None)
        }
        Err(CheckoutError::EmptyCart) => {
            send_main_menu(bot, chat_id, "🛒 Savatingiz bo'sh.").await?;
            Ok(Some("Savatingiz bo'sh"))
        }
        Err(error) => Err(error.into()),
    }
}

/// The session stays locked from the step check until the order is stored,
/// so a repeated tap sees the reset session and is turned away.
async fn confirm_order(
    bot: &Bot,
    q: &CallbackQuery,
    chat_id: ChatId,
    state: &BotState,
    user_id: i64,
) -> CallbackResult {
    let profile = user_profile(&q.from);
    let mut session = state.sessions.lock(user_id).await;
    let contact = match &session.checkout {
        CheckoutStep::Confirming { phone, address } => (phone.clone(), address.clone()),
        _ => (String::new(), String::new()),
    };

    let confirmed = checkout::confirm(&state.db, &mut session, profile.clone()).await;
    let placed = match confirmed {
        Ok(placed) => placed,
        Err(CheckoutError::NothingToConfirm) => {
            return Ok(Some("Tasdiqlanadigan buyurtma yo'q"));
        }
        Err(CheckoutError::EmptyCart) => {
            drop(session);
            clear_inline_keyboard(bot, q).await;
            send_main_menu(bot, chat_id, "🛒 Savatingiz bo'sh.").await?;
            return Ok(Some("Savatingiz bo'sh"));
        }
        Err(error) => return Err(error.into()),
    };
    drop(session);

    clear_inline_keyboard(bot, q).await;
    let (phone_number, delivery_address) = contact;
    let notice = OrderNotice {
        order_id: placed.order_id,
        customer_chat_id: user_id,
        customer: profile,
        total_amount: placed.total_amount,
        phone_number,
        delivery_address,
        payment_method: PAYMENT_METHOD_CARD.to_string(),
        currency: state.currency().to_string(),
    };
    fan_out_order(bot, state.admin_contacts(), &notice).await;
    Ok(Some("✅ Buyurtma qabul qilindi"))
}

async fn clear_inline_keyboard(bot: &Bot, q: &CallbackQuery) {
    let Some((chat_id, message_id)) = callback_message_target(q) else {
        return;
    };
    if let Err(error) = bot
        .edit_message_reply_markup(chat_id, message_id)
        .reply_markup(InlineKeyboardMarkup::default())
        .await
    {
        tracing::debug!(error = %error, "Failed to remove inline keyboard");
    }
}
