use super::format::{help_text, render_checkout_summary};
use super::router::{Inbound, MenuAction};
use super::shared::{
    record_customer_message, report_failure, send_cart, send_categories, send_main_menu,
    send_my_orders, HandlerResult,
};
use super::state::{sender_profile, sender_user_id, BotState};
use crate::bot::keyboards;
use crate::checkout::{self, StepOutcome};
use crate::session::{CheckoutStep, Session};
use teloxide::prelude::*;
use teloxide::types::ParseMode;

/// Non-command messages in private chats: menu buttons, checkout answers
/// and free-form messages for the operators.
pub async fn handle_inbound(
    bot: Bot,
    msg: Message,
    inbound: Inbound,
    state: BotState,
) -> HandlerResult {
    if !msg.chat.is_private() {
        return Ok(());
    }
    let Some(user_id) = sender_user_id(&msg) else {
        return Ok(());
    };
    if inbound.is_ignored() {
        tracing::debug!(user_id = user_id, inbound = ?inbound, "Ignoring message");
        return Ok(());
    }

    if let Err(error) = route(&bot, &msg, inbound, &state, user_id).await {
        tracing::error!(user_id = user_id, error = %error, "Message handling failed");
        report_failure(&bot, msg.chat.id).await;
    }
    Ok(())
}

async fn route(
    bot: &Bot,
    msg: &Message,
    inbound: Inbound,
    state: &BotState,
    user_id: i64,
) -> HandlerResult {
    let chat_id = msg.chat.id;
    match inbound {
        Inbound::Menu(MenuAction::Catalog) => send_categories(bot, chat_id, state).await,
        Inbound::Menu(MenuAction::Cart) => {
            let session = state.sessions.lock(user_id).await;
            send_cart(bot, chat_id, &session.cart, state.currency()).await
        }
        Inbound::Menu(MenuAction::MyOrders) => send_my_orders(bot, chat_id, state, user_id).await,
        Inbound::Menu(MenuAction::Help) => {
            send_main_menu(bot, chat_id, &help_text(state.config.is_admin(user_id))).await
        }
        Inbound::SharedPhone(phone) => continue_checkout(bot, msg, state, user_id, &phone, true).await,
        Inbound::FreeText(text) => continue_checkout(bot, msg, state, user_id, &text, false).await,
        Inbound::Command(_) | Inbound::Unsupported => Ok(()),
    }
}

async fn continue_checkout(
    bot: &Bot,
    msg: &Message,
    state: &BotState,
    user_id: i64,
    text: &str,
    from_contact: bool,
) -> HandlerResult {
    let chat_id = msg.chat.id;
    let mut session = state.sessions.lock(user_id).await;

    // a shared contact only answers the phone question
    if from_contact && session.checkout != CheckoutStep::AwaitingPhone {
        if session.checkout.is_active() {
            return prompt_current_step(bot, chat_id, &session, state.currency()).await;
        }
        drop(session);
        return send_main_menu(bot, chat_id, "Raqam faqat buyurtma berishda kerak bo'ladi.").await;
    }

    let outcome = checkout::submit(&mut session, text);
    match outcome {
        StepOutcome::NotInCheckout => {
            drop(session);
            record_customer_message(bot, chat_id, state, user_id, &sender_profile(msg), text).await
        }
        StepOutcome::PhoneAccepted => {
            tracing::debug!(user_id = user_id, "Checkout phone received");
            bot.send_message(chat_id, "📍 Yetkazib berish manzilini yozing:")
                .reply_markup(keyboards::main_menu())
                .await?;
            Ok(())
        }
        StepOutcome::ReadyToConfirm => {
            tracing::debug!(user_id = user_id, "Checkout address received");
            prompt_current_step(bot, chat_id, &session, state.currency()).await
        }
        StepOutcome::AwaitingDecision => {
            bot.send_message(chat_id, "Iltimos, buyurtmani tasdiqlang yoki bekor qiling.")
                .await?;
            prompt_current_step(bot, chat_id, &session, state.currency()).await
        }
        StepOutcome::EmptyInput => prompt_current_step(bot, chat_id, &session, state.currency()).await,
    }
}

async fn prompt_current_step(
    bot: &Bot,
    chat_id: ChatId,
    session: &Session,
    currency: &str,
) -> HandlerResult {
    match &session.checkout {
        CheckoutStep::None => {}
        CheckoutStep::AwaitingPhone => {
            bot.send_message(chat_id, "📞 Telefon raqamingizni yuboring:")
                .reply_markup(keyboards::share_phone())
                .await?;
        }
        CheckoutStep::AwaitingAddress { .. } => {
            bot.send_message(chat_id, "📍 Yetkazib berish manzilini yozing:")
                .await?;
        }
        CheckoutStep::Confirming { phone, address } => {
            bot.send_message(
                chat_id,
                render_checkout_summary(&session.cart, phone, address, currency),
            )
            .parse_mode(ParseMode::Html)
            .reply_markup(keyboards::confirm_order())
            .await?;
        }
    }
    Ok(())
}
