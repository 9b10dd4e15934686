use super::format::{
    help_text, render_admin_order_line, render_order_detail, render_stats, status_label,
    welcome_text,
};
use super::shared::{
    command_args, deep_link_product, parse_add_product_args, parse_orders_filter,
    parse_reply_args, parse_set_status_args, parse_start_payload, product_deep_link,
    report_failure, send_cart, send_main_menu, send_my_orders, send_product, HandlerResult,
};
use super::state::{is_admin_message, sender_profile, sender_user_id, BotState};
use crate::bot::keyboards;
use crate::checkout;
use crate::db::MessageSender;
use teloxide::prelude::*;
use teloxide::utils::command::BotCommands;

const ADMIN_ORDERS_LIMIT: i64 = 20;

#[derive(BotCommands, Clone, Debug)]
#[command(rename_rule = "lowercase")]
pub enum BotCommand {
    #[command(description = "Botni ishga tushirish")]
    Start,
    #[command(description = "Yordam")]
    Help,
    #[command(description = "Savatcha")]
    Cart,
    #[command(description = "Buyurtmalarim")]
    MyOrders,
    #[command(description = "Buyurtma rasmiylashtirishni bekor qilish")]
    Cancel,
    #[command(description = "Buyurtmalar ro'yxati (admin)")]
    Orders,
    #[command(description = "Buyurtma tafsilotlari (admin)")]
    Order,
    #[command(description = "Buyurtma holatini o'zgartirish (admin)")]
    SetStatus,
    #[command(description = "Mijozga javob yozish (admin)")]
    Reply,
    #[command(description = "Kategoriya qo'shish (admin)")]
    AddCategory,
    #[command(description = "Mahsulot qo'shish (admin)")]
    AddProduct,
    #[command(description = "Statistika (admin)")]
    Stats,
}

impl BotCommand {
    fn admin_only(&self) -> bool {
        matches!(
            self,
            BotCommand::Orders
                | BotCommand::Order
                | BotCommand::SetStatus
                | BotCommand::Reply
                | BotCommand::AddCategory
                | BotCommand::AddProduct
                | BotCommand::Stats
        )
    }
}

pub fn handler() -> teloxide::dispatching::UpdateHandler<Box<dyn std::error::Error + Send + Sync + 'static>> {
    teloxide::filter_command::<BotCommand, _>().endpoint(handle_command)
}

async fn handle_command(bot: Bot, msg: Message, cmd: BotCommand, state: BotState) -> HandlerResult {
    let Some(user_id) = sender_user_id(&msg) else {
        tracing::warn!(command = ?cmd, "Received command without sender");
        return Ok(());
    };
    tracing::info!(user_id = user_id, command = ?cmd, "Received command");

    if cmd.admin_only() && !is_admin_message(&msg, &state) {
        bot.send_message(msg.chat.id, "⛔ Bu buyruq faqat administratorlar uchun.")
            .await?;
        return Ok(());
    }

    let result = match cmd {
        BotCommand::Start => start_cmd(&bot, &msg, &state, user_id).await,
        BotCommand::Help => {
            send_main_menu(&bot, msg.chat.id, &help_text(state.config.is_admin(user_id))).await
        }
        BotCommand::Cart => {
            let session = state.sessions.lock(user_id).await;
            send_cart(&bot, msg.chat.id, &session.cart, state.currency()).await
        }
        BotCommand::MyOrders => send_my_orders(&bot, msg.chat.id, &state, user_id).await,
        BotCommand::Cancel => cancel_cmd(&bot, &msg, &state, user_id).await,
        BotCommand::Orders => orders_cmd(&bot, &msg, &state).await,
        BotCommand::Order => order_detail_cmd(&bot, &msg, &state).await,
        BotCommand::SetStatus => set_status_cmd(&bot, &msg, &state, user_id).await,
        BotCommand::Reply => reply_cmd(&bot, &msg, &state, user_id).await,
        BotCommand::AddCategory => add_category_cmd(&bot, &msg, &state).await,
        BotCommand::AddProduct => add_product_cmd(&bot, &msg, &state).await,
        BotCommand::Stats => stats_cmd(&bot, &msg, &state).await,
    };

    if let Err(error) = result {
        tracing::error!(user_id = user_id, error = %error, "Command handling failed");
        report_failure(&bot, msg.chat.id).await;
    }
    Ok(())
}

async fn start_cmd(bot: &Bot, msg: &Message, state: &BotState, user_id: i64) -> HandlerResult {
    let profile = sender_profile(msg);
    let customer = state.db.get_or_create_customer(user_id, &profile).await?;
    tracing::info!(
        user_id = user_id,
        customer_id = customer.id,
        username = ?profile.username,
        "Customer started the bot"
    );

    send_main_menu(
        bot,
        msg.chat.id,
        &welcome_text(profile.first_name.as_deref(), &state.config.shop_name),
    )
    .await?;

    if let Some(webapp_url) = state.config.webapp_link() {
        bot.send_message(msg.chat.id, "Do'konni ilovada oching yoki katalogdan tanlang:")
            .reply_markup(keyboards::storefront(webapp_url))
            .await?;
    }

    let deep_link = msg
        .text()
        .and_then(parse_start_payload)
        .as_deref()
        .and_then(deep_link_product);
    if let Some(product_id) = deep_link {
        send_product(bot, msg.chat.id, state, product_id).await?;
    }
    Ok(())
}

async fn cancel_cmd(bot: &Bot, msg: &Message, state: &BotState, user_id: i64) -> HandlerResult {
    let cancelled = {
        let mut session = state.sessions.lock(user_id).await;
        checkout::cancel(&mut session)
    };
    let text = if cancelled {
        "❌ Buyurtma bekor qilindi. Savatingiz saqlanib qoldi."
    } else {
        "Bekor qilinadigan jarayon yo'q."
    };
    send_main_menu(bot, msg.chat.id, text).await
}

async fn orders_cmd(bot: &Bot, msg: &Message, state: &BotState) -> HandlerResult {
    let args = command_args(msg.text().unwrap_or(""));
    let Ok(status) = parse_orders_filter(args) else {
        bot.send_message(
            msg.chat.id,
            "Foydalanish: /orders [new|processing|completed|cancelled]",
        )
        .await?;
        return Ok(());
    };

    let orders = state.db.list_recent_orders(status, ADMIN_ORDERS_LIMIT).await?;
    let text = if orders.is_empty() {
        "Buyurtmalar yo'q.".to_string()
    } else {
        let lines: Vec<String> = orders
            .iter()
            .map(|order| render_admin_order_line(order, state.currency()))
            .collect();
        format!("📋 Buyurtmalar:\n\n{}", lines.join("\n"))
    };
    bot.send_message(msg.chat.id, text).await?;
    Ok(())
}

async fn order_detail_cmd(bot: &Bot, msg: &Message, state: &BotState) -> HandlerResult {
    let args = command_args(msg.text().unwrap_or(""));
    let Ok(order_id) = args.trim_start_matches('#').parse::<i64>() else {
        bot.send_message(msg.chat.id, "Foydalanish: /order <id>").await?;
        return Ok(());
    };
    let Some(order) = state.db.get_order(order_id).await? else {
        bot.send_message(msg.chat.id, format!("Buyurtma #{} topilmadi.", order_id))
            .await?;
        return Ok(());
    };
    let items = state.db.get_order_items(order_id).await?;
    bot.send_message(
        msg.chat.id,
        render_order_detail(&order, &items, state.currency()),
    )
    .await?;
    Ok(())
}

async fn set_status_cmd(bot: &Bot, msg: &Message, state: &BotState, admin_id: i64) -> HandlerResult {
    let args = command_args(msg.text().unwrap_or(""));
    let Some((order_id, status)) = parse_set_status_args(args) else {
        bot.send_message(
            msg.chat.id,
            "Foydalanish: /setstatus <id> <new|processing|completed|cancelled>",
        )
        .await?;
        return Ok(());
    };

    let Some(order) = state.db.update_order_status(order_id, status).await? else {
        bot.send_message(msg.chat.id, format!("Buyurtma #{} topilmadi.", order_id))
            .await?;
        return Ok(());
    };
    tracing::info!(
        admin_id = admin_id,
        order_id = order_id,
        status = %status,
        "Order status changed"
    );

    bot.send_message(
        msg.chat.id,
        format!("✅ Buyurtma #{} holati: {}", order_id, status_label(status)),
    )
    .await?;

    if let Err(error) = bot
        .send_message(
            ChatId(order.telegram_id),
            format!(
                "📦 Buyurtmangiz #{} holati o'zgardi: {}",
                order_id,
                status_label(status)
            ),
        )
        .await
    {
        tracing::warn!(
            order_id = order_id,
            telegram_id = order.telegram_id,
            error = %error,
            "Failed to notify customer about status change"
        );
    }
    Ok(())
}

async fn reply_cmd(bot: &Bot, msg: &Message, state: &BotState, admin_id: i64) -> HandlerResult {
    let args = command_args(msg.text().unwrap_or(""));
    let Some((telegram_id, text)) = parse_reply_args(args) else {
        bot.send_message(msg.chat.id, "Foydalanish: /reply <telegram_id> <matn>")
            .await?;
        return Ok(());
    };

    let Some(customer) = state.db.get_customer_by_telegram_id(telegram_id).await? else {
        bot.send_message(msg.chat.id, "Mijoz topilmadi.").await?;
        return Ok(());
    };
    let message_id = state
        .db
        .create_message(customer.id, MessageSender::Admin, &text)
        .await?;
    tracing::info!(
        admin_id = admin_id,
        customer_id = customer.id,
        message_id = message_id,
        "Admin reply stored"
    );

    let delivered = bot
        .send_message(ChatId(telegram_id), format!("💬 Operator javobi:\n\n{}", text))
        .await;
    let report = match delivered {
        Ok(_) => "✅ Javob yuborildi.".to_string(),
        Err(error) => {
            tracing::warn!(telegram_id = telegram_id, error = %error, "Failed to deliver admin reply");
            format!("⚠️ Javob saqlandi, lekin yetkazilmadi: {}", error)
        }
    };
    bot.send_message(msg.chat.id, report).await?;
    Ok(())
}

async fn stats_cmd(bot: &Bot, msg: &Message, state: &BotState) -> HandlerResult {
    let stats = state.db.stats().await?;
    bot.send_message(msg.chat.id, render_stats(&stats, state.currency()))
        .await?;
    Ok(())
}

async fn add_category_cmd(bot: &Bot, msg: &Message, state: &BotState) -> HandlerResult {
    let name = command_args(msg.text().unwrap_or(""));
    if name.is_empty() {
        bot.send_message(msg.chat.id, "Foydalanish: /addcategory <nomi>")
            .await?;
        return Ok(());
    }
    let category_id = state.db.create_category(name, None).await?;
    tracing::info!(category_id = category_id, name = %name, "Category created");
    bot.send_message(
        msg.chat.id,
        format!("✅ Kategoriya qo'shildi: #{} {}", category_id, name),
    )
    .await?;
    Ok(())
}

async fn add_product_cmd(bot: &Bot, msg: &Message, state: &BotState) -> HandlerResult {
    let args = command_args(msg.text().unwrap_or(""));
    let product = match parse_add_product_args(args) {
        Ok(product) => product,
        Err(reason) => {
            bot.send_message(
                msg.chat.id,
                format!(
                    "❌ {}\n\nFoydalanish: /addproduct <kategoriya_id> <narx> <qoldiq> <nomi> [| rasm]",
                    reason
                ),
            )
            .await?;
            return Ok(());
        }
    };

    if state.db.get_category(product.category_id).await?.is_none() {
        bot.send_message(
            msg.chat.id,
            format!("Kategoriya #{} topilmadi.", product.category_id),
        )
        .await?;
        return Ok(());
    }

    let product_id = state.db.create_product(&product).await?;
    tracing::info!(
        product_id = product_id,
        category_id = product.category_id,
        price = product.price,
        "Product created"
    );

    let mut text = format!("✅ Mahsulot qo'shildi: #{} {}", product_id, product.name);
    if let Some(bot_username) = state.bot_username.as_deref() {
        text.push_str(&format!(
            "\nHavola: {}",
            product_deep_link(bot_username, product_id)
        ));
    }
    bot.send_message(msg.chat.id, text).await?;
    Ok(())
}
